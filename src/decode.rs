//! The decoder engine: recursive descent over bytes, producing [`Value`]s
//! through tag dispatch while maintaining the share arena, string-reference
//! scopes and the immutable-context flag.

use std::fmt;
use std::mem;
use std::rc::Rc;

use half::f16;

use crate::cursor::Reader;
use crate::encode::DEFAULT_MAX_DEPTH;
use crate::head::{self, AI_INDEFINITE, MAJOR_ARRAY, MAJOR_BYTES, MAJOR_MAP, MAJOR_NEGATIVE,
    MAJOR_SIMPLE, MAJOR_TAG, MAJOR_TEXT, MAJOR_UNSIGNED};
use crate::share::ShareArena;
use crate::stringref::StringRefNamespace;
use crate::tags::{self, TagHook, TagRegistry};
use crate::value::{cbor_equal, Value};
use crate::{CborError, ErrorKind};

/// Policy for invalid UTF-8 in text strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrErrorPolicy {
    /// Reject the item as malformed.
    #[default]
    Strict,
    /// Substitute U+FFFD for invalid sequences.
    Replace,
    /// Drop invalid bytes.
    Ignore,
}

/// Hook invoked on every decoded map; its result replaces the map.
pub type ObjectHook =
    Rc<dyn for<'d> Fn(&mut Decoder<'d>, Vec<(Value, Value)>) -> Result<Value, CborError>>;

/// Options controlling a single decode pass.
#[derive(Clone)]
pub struct DecodeOptions {
    /// User tag decoders; consulted before the built-ins.
    pub tag_registry: TagRegistry,
    /// Hook invoked on every decoded map.
    pub object_hook: Option<ObjectHook>,
    /// Skip the built-in tag registry. This also disables the sharing and
    /// string-reference machinery (tags 25/28/29/256), which then decode to
    /// opaque tagged values.
    pub disable_builtin_tags: bool,
    /// Policy for invalid UTF-8 in text strings.
    pub str_errors: StrErrorPolicy,
    /// Reject non-shortest head encodings.
    pub canonical: bool,
    /// Recursion limit; exceeding it is `StackOverflow`.
    pub max_depth: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            tag_registry: TagRegistry::new(),
            object_hook: None,
            disable_builtin_tags: false,
            str_errors: StrErrorPolicy::Strict,
            canonical: false,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl fmt::Debug for DecodeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeOptions")
            .field("object_hook", &self.object_hook.is_some())
            .field("disable_builtin_tags", &self.disable_builtin_tags)
            .field("str_errors", &self.str_errors)
            .field("canonical", &self.canonical)
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

/// Decode exactly one data item from `data`.
///
/// # Errors
///
/// Returns an error if the bytes are malformed, or `TrailingData` if bytes
/// remain after the item.
pub fn decode(data: &[u8], opts: &DecodeOptions) -> Result<Value, CborError> {
    let mut dec = Decoder::new(data, opts.clone());
    let value = dec.decode()?;
    if !dec.is_eof() {
        return Err(CborError::new(ErrorKind::TrailingData, dec.position()));
    }
    Ok(value)
}

#[derive(Default)]
struct DecodeState {
    shareables: ShareArena,
    share_index: Option<usize>,
    namespace: Option<StringRefNamespace>,
    immutable: bool,
    depth: usize,
}

/// The decoder engine.
///
/// One decoder can decode several consecutive items from the same buffer;
/// the share arena, string-reference scopes and immutable flag are reset at
/// each top-level [`Decoder::decode`] call.
pub struct Decoder<'data> {
    reader: Reader<'data>,
    opts: DecodeOptions,
    state: DecodeState,
}

impl<'data> Decoder<'data> {
    /// Create a decoder over `data`.
    #[must_use]
    pub fn new(data: &'data [u8], opts: DecodeOptions) -> Self {
        Self {
            reader: Reader::new(data),
            opts,
            state: DecodeState::default(),
        }
    }

    /// The current byte position in the input.
    #[must_use]
    pub fn position(&self) -> usize {
        self.reader.position()
    }

    /// Whether the input is exhausted.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        self.reader.is_eof()
    }

    /// Move the read position; used by the sequence reader to skip the
    /// verified prolog.
    pub(crate) fn seek(&mut self, pos: usize) {
        self.reader.seek(pos);
    }

    /// Whether the value being decoded will be used as a map key or set
    /// element. Hooks observing this flag must return a representative safe
    /// for such use.
    #[must_use]
    pub fn immutable(&self) -> bool {
        self.state.immutable
    }

    /// Decode the next data item from the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are malformed. On error the position is
    /// left at the failure site.
    pub fn decode(&mut self) -> Result<Value, CborError> {
        self.state.shareables.clear();
        self.state.share_index = None;
        self.state.namespace = None;
        self.state.immutable = false;
        self.state.depth = 0;
        self.decode_item(false, false)
    }

    /// Install `value` in the slot reserved for the tag-28 item currently
    /// being decoded, if any, and return the value as it will appear in the
    /// decoded graph (the shared cell when a slot is pending).
    ///
    /// Intended for dynamic tag hooks whose objects reference themselves:
    /// installing a shell makes the identity observable before the object is
    /// fully built.
    pub fn set_shareable(&mut self, value: Value) -> Value {
        let Some(index) = self.state.share_index else {
            return value;
        };
        match self.state.shareables.get(index) {
            Some(cell) => {
                cell.set(value);
                Value::Shared(cell)
            }
            None => value,
        }
    }

    /// Decode one item from a detached buffer while keeping the current
    /// pass's share and string-reference state.
    ///
    /// Intended for tag hooks that carry nested CBOR payloads.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer does not hold a well-formed item.
    pub fn decode_from_bytes(&mut self, data: &[u8]) -> Result<Value, CborError> {
        let state = mem::take(&mut self.state);
        let mut sub = Decoder {
            reader: Reader::new(data),
            opts: self.opts.clone(),
            state,
        };
        let result = sub.decode_item(false, false);
        self.state = sub.state;
        result
    }

    pub(crate) fn resolve_stringref(&self, index: usize) -> Result<Value, CborError> {
        self.state
            .namespace
            .as_ref()
            .and_then(|ns| ns.resolve(index))
            .ok_or_else(|| CborError::new(ErrorKind::StringRefInvalid, self.position()))
    }

    fn err(&self, kind: ErrorKind) -> CborError {
        CborError::new(kind, self.position())
    }

    /// Decode one item; a break marker here is malformed.
    fn decode_item(&mut self, immutable: bool, unshared: bool) -> Result<Value, CborError> {
        let off = self.position();
        match self.decode_or_break(immutable, unshared)? {
            Some(value) => Ok(value),
            None => Err(CborError::new(ErrorKind::StrayBreak, off)),
        }
    }

    /// Decode one item or a break marker (`None`).
    fn decode_or_break(
        &mut self,
        immutable: bool,
        unshared: bool,
    ) -> Result<Option<Value>, CborError> {
        self.state.depth += 1;
        if self.state.depth > self.opts.max_depth {
            self.state.depth -= 1;
            return Err(self.err(ErrorKind::StackOverflow));
        }
        let old_immutable = self.state.immutable;
        let old_index = self.state.share_index;
        if immutable {
            self.state.immutable = true;
        }
        if unshared {
            self.state.share_index = None;
        }
        let result = self.decode_raw();
        self.state.immutable = old_immutable;
        self.state.share_index = old_index;
        self.state.depth -= 1;
        result
    }

    fn decode_raw(&mut self) -> Result<Option<Value>, CborError> {
        let off = self.position();
        let (major, ai) = head::read_initial(&mut self.reader)?;
        let minimal = self.opts.canonical;
        match major {
            MAJOR_UNSIGNED => {
                let v = head::read_arg(&mut self.reader, ai, off, minimal)?;
                Ok(Some(Value::Integer(i128::from(v))))
            }
            MAJOR_NEGATIVE => {
                let v = head::read_arg(&mut self.reader, ai, off, minimal)?;
                Ok(Some(Value::Integer(-1 - i128::from(v))))
            }
            MAJOR_BYTES => self.decode_bytes(ai, off).map(Some),
            MAJOR_TEXT => self.decode_text(ai, off).map(Some),
            MAJOR_ARRAY => self.decode_array(ai, off).map(Some),
            MAJOR_MAP => self.decode_map(ai, off).map(Some),
            MAJOR_TAG => self.decode_tag(ai, off).map(Some),
            _ => self.decode_simple(ai, off),
        }
    }

    fn decode_bytes(&mut self, ai: u8, off: usize) -> Result<Value, CborError> {
        let minimal = self.opts.canonical;
        if ai == AI_INDEFINITE {
            let mut buf = Vec::new();
            loop {
                let chunk_off = self.position();
                let (major, chunk_ai) = head::read_initial(&mut self.reader)?;
                if major == MAJOR_SIMPLE && chunk_ai == AI_INDEFINITE {
                    break;
                }
                if major != MAJOR_BYTES {
                    return Err(CborError::new(ErrorKind::MixedIndefiniteChunks, chunk_off));
                }
                let len = head::read_len(&mut self.reader, chunk_ai, chunk_off, minimal)?;
                buf.extend_from_slice(self.reader.read_exact(len)?);
            }
            // Chunked strings never enter the string-reference namespace.
            Ok(Value::Bytes(buf))
        } else {
            let len = head::read_len(&mut self.reader, ai, off, minimal)?;
            let bytes = self.reader.read_exact(len)?.to_vec();
            if let Some(ns) = self.state.namespace.as_mut() {
                ns.note_bytes(&bytes);
            }
            Ok(Value::Bytes(bytes))
        }
    }

    fn decode_text(&mut self, ai: u8, off: usize) -> Result<Value, CborError> {
        let minimal = self.opts.canonical;
        if ai == AI_INDEFINITE {
            // Each chunk is validated on its own: a UTF-8 sequence split
            // across chunks is malformed (RFC 8949 §3.2.3).
            let mut text = String::new();
            loop {
                let chunk_off = self.position();
                let (major, chunk_ai) = head::read_initial(&mut self.reader)?;
                if major == MAJOR_SIMPLE && chunk_ai == AI_INDEFINITE {
                    break;
                }
                if major != MAJOR_TEXT {
                    return Err(CborError::new(ErrorKind::MixedIndefiniteChunks, chunk_off));
                }
                let len = head::read_len(&mut self.reader, chunk_ai, chunk_off, minimal)?;
                let bytes = self.reader.read_exact(len)?;
                text.push_str(&decode_utf8(bytes, self.opts.str_errors, chunk_off)?);
            }
            Ok(Value::Text(text))
        } else {
            let len = head::read_len(&mut self.reader, ai, off, minimal)?;
            let bytes = self.reader.read_exact(len)?;
            let text = decode_utf8(bytes, self.opts.str_errors, off)?;
            if let Some(ns) = self.state.namespace.as_mut() {
                ns.note_text(&text);
            }
            Ok(Value::Text(text))
        }
    }

    fn decode_array(&mut self, ai: u8, off: usize) -> Result<Value, CborError> {
        let mut items = Vec::new();
        if ai == AI_INDEFINITE {
            while let Some(item) = self.decode_or_break(false, true)? {
                items.push(item);
            }
        } else {
            let len = head::read_len(&mut self.reader, ai, off, self.opts.canonical)?;
            // every element takes at least one byte
            items.reserve(len.min(self.reader.remaining()));
            for _ in 0..len {
                items.push(self.decode_item(false, true)?);
            }
        }
        Ok(Value::Array(items))
    }

    fn decode_map(&mut self, ai: u8, off: usize) -> Result<Value, CborError> {
        let mut entries: Vec<(Value, Value)> = Vec::new();
        if ai == AI_INDEFINITE {
            while let Some(key) = self.decode_or_break(true, true)? {
                let value = self.decode_item(false, true)?;
                insert_entry(&mut entries, key, value);
            }
        } else {
            let len = head::read_len(&mut self.reader, ai, off, self.opts.canonical)?;
            entries.reserve(len.min(self.reader.remaining() / 2));
            for _ in 0..len {
                let key = self.decode_item(true, true)?;
                let value = self.decode_item(false, true)?;
                insert_entry(&mut entries, key, value);
            }
        }
        if let Some(hook) = self.opts.object_hook.clone() {
            return hook(self, entries);
        }
        Ok(Value::Map(entries))
    }

    fn decode_tag(&mut self, ai: u8, off: usize) -> Result<Value, CborError> {
        let tag = head::read_arg(&mut self.reader, ai, off, self.opts.canonical)?;
        let machinery = !self.opts.disable_builtin_tags;

        if tag == tags::TAG_SHAREABLE && machinery {
            let old_index = self.state.share_index;
            let index = self.state.shareables.reserve();
            self.state.share_index = Some(index);
            let result = self.decode_item(false, false);
            self.state.share_index = old_index;
            let value = result?;
            let cell = self
                .state
                .shareables
                .get(index)
                .ok_or_else(|| self.err(ErrorKind::ShareIndexInvalid))?;
            // a hook may have installed the cell itself via set_shareable
            let already_installed = matches!(&value, Value::Shared(s) if s.ptr_eq(&cell));
            if !already_installed {
                cell.set(value);
            }
            return Ok(Value::Shared(cell));
        }

        if tag == tags::TAG_SHAREDREF && machinery {
            let index = self
                .decode_item(false, true)?
                .as_integer()
                .and_then(|i| usize::try_from(i).ok())
                .ok_or_else(|| self.err(ErrorKind::ShareIndexInvalid))?;
            let cell = self
                .state
                .shareables
                .get(index)
                .ok_or_else(|| self.err(ErrorKind::ShareIndexInvalid))?;
            return Ok(Value::Shared(cell));
        }

        if tag == tags::TAG_STRINGREF_NAMESPACE && machinery {
            // Fresh scope; nested scopes do not inherit parent entries.
            let old_namespace = self.state.namespace.take();
            self.state.namespace = Some(StringRefNamespace::new());
            let result = self.decode_item(false, true);
            self.state.namespace = old_namespace;
            return result;
        }

        let immutable = self.state.immutable || tag == tags::TAG_SET;
        let payload = self.decode_item(immutable, true)?;

        if let Some(hook) = self.opts.tag_registry.get(tag) {
            let result = match hook {
                TagHook::Static(f) => f(payload),
                TagHook::Dynamic(f) => f(self, payload),
            };
            return result.map_err(|cause| CborError::hook(tag, self.position(), cause));
        }

        if machinery {
            tags::decode_builtin(self, tag, payload)
        } else {
            Ok(Value::Tag(tag, Box::new(payload)))
        }
    }

    fn decode_simple(&mut self, ai: u8, off: usize) -> Result<Option<Value>, CborError> {
        let value = match ai {
            0..=19 => Value::Simple(ai),
            20 => Value::Bool(false),
            21 => Value::Bool(true),
            22 => Value::Null,
            23 => Value::Undefined,
            24 => {
                let v = self.reader.read_u8()?;
                if v < 32 {
                    return Err(CborError::new(ErrorKind::InvalidSimpleValue, off));
                }
                Value::Simple(v)
            }
            25 => {
                let bytes = self.reader.read_exact(2)?;
                Value::Float(f16::from_be_bytes([bytes[0], bytes[1]]).to_f64())
            }
            26 => {
                let bytes = self.reader.read_exact(4)?;
                Value::Float(f64::from(f32::from_be_bytes([
                    bytes[0], bytes[1], bytes[2], bytes[3],
                ])))
            }
            27 => {
                let bytes = self.reader.read_exact(8)?;
                Value::Float(f64::from_be_bytes([
                    bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
                ]))
            }
            28..=30 => return Err(CborError::new(ErrorKind::ReservedAdditionalInfo, off)),
            _ => return Ok(None),
        };
        Ok(Some(value))
    }
}

/// Replace the value for an equal key, keeping keys pairwise distinct.
fn insert_entry(entries: &mut Vec<(Value, Value)>, key: Value, value: Value) {
    if let Some(slot) = entries.iter_mut().find(|(k, _)| cbor_equal(k, &key)) {
        slot.1 = value;
    } else {
        entries.push((key, value));
    }
}

fn decode_utf8(bytes: &[u8], policy: StrErrorPolicy, off: usize) -> Result<String, CborError> {
    match policy {
        StrErrorPolicy::Strict => match simdutf8::basic::from_utf8(bytes) {
            Ok(s) => Ok(s.to_owned()),
            Err(_) => Err(CborError::new(ErrorKind::InvalidUtf8, off)),
        },
        StrErrorPolicy::Replace => Ok(String::from_utf8_lossy(bytes).into_owned()),
        StrErrorPolicy::Ignore => {
            let mut out = String::new();
            let mut rest = bytes;
            loop {
                match std::str::from_utf8(rest) {
                    Ok(s) => {
                        out.push_str(s);
                        break;
                    }
                    Err(err) => {
                        let valid = err.valid_up_to();
                        if let Ok(s) = std::str::from_utf8(&rest[..valid]) {
                            out.push_str(s);
                        }
                        let skip = valid + err.error_len().unwrap_or(rest.len() - valid);
                        rest = &rest[skip..];
                        if rest.is_empty() {
                            break;
                        }
                    }
                }
            }
            Ok(out)
        }
    }
}
