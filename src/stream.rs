//! Stream helpers: indefinite-length container writers and CBOR sequences
//! (RFC 8742) with an optional 12-byte protocol prolog.

use crate::decode::{DecodeOptions, Decoder};
use crate::encode::{EncodeOptions, Encoder};
use crate::head::{self, BREAK, MAJOR_ARRAY, MAJOR_BYTES, MAJOR_MAP, MAJOR_TAG, MAJOR_TEXT};
use crate::tags::TAG_SELF_DESCRIBE;
use crate::value::Value;
use crate::{CborError, ErrorKind};

/// The self-describe prefix: tag 55799 as emitted before a stream head.
const SELF_DESCRIBE_PREFIX: [u8; 3] = [0xd9, 0xd9, 0xf7];

/// Smallest protocol tag whose head is the fixed 4-byte form.
const PROTOCOL_TAG_MIN: u32 = 0x0100_0000;

/// Encode one item wrapped in the self-describe tag (55799).
///
/// # Errors
///
/// Returns an error if the value cannot be represented under `opts`.
pub fn encode_self_describing(value: &Value, opts: &EncodeOptions) -> Result<Vec<u8>, CborError> {
    let mut enc = Encoder::new(opts.clone());
    enc.write_raw(&SELF_DESCRIBE_PREFIX);
    enc.encode(value)?;
    Ok(enc.into_vec())
}

/// Writer producing a single indefinite-length array.
///
/// The result is one well-formed data item consumable by a one-shot decode.
pub struct IndefiniteArrayWriter {
    enc: Encoder,
}

impl IndefiniteArrayWriter {
    /// Start an indefinite-length array.
    #[must_use]
    pub fn new(opts: EncodeOptions) -> Self {
        let mut enc = Encoder::new(opts);
        let mut buf = Vec::new();
        head::write_indefinite(&mut buf, MAJOR_ARRAY);
        enc.write_raw(&buf);
        Self { enc }
    }

    /// Start an indefinite-length array preceded by the self-describe tag.
    #[must_use]
    pub fn self_describing(opts: EncodeOptions) -> Self {
        let mut enc = Encoder::new(opts);
        enc.write_raw(&SELF_DESCRIBE_PREFIX);
        let mut buf = Vec::new();
        head::write_indefinite(&mut buf, MAJOR_ARRAY);
        enc.write_raw(&buf);
        Self { enc }
    }

    /// Append one element.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be represented.
    pub fn push(&mut self, value: &Value) -> Result<(), CborError> {
        self.enc.encode(value)
    }

    /// Emit the break byte and return the finished item.
    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        self.enc.write_raw(&[BREAK]);
        self.enc.into_vec()
    }
}

/// Writer producing a single indefinite-length map.
pub struct IndefiniteMapWriter {
    enc: Encoder,
}

impl IndefiniteMapWriter {
    /// Start an indefinite-length map.
    #[must_use]
    pub fn new(opts: EncodeOptions) -> Self {
        let mut enc = Encoder::new(opts);
        let mut buf = Vec::new();
        head::write_indefinite(&mut buf, MAJOR_MAP);
        enc.write_raw(&buf);
        Self { enc }
    }

    /// Start an indefinite-length map preceded by the self-describe tag.
    #[must_use]
    pub fn self_describing(opts: EncodeOptions) -> Self {
        let mut enc = Encoder::new(opts);
        enc.write_raw(&SELF_DESCRIBE_PREFIX);
        let mut buf = Vec::new();
        head::write_indefinite(&mut buf, MAJOR_MAP);
        enc.write_raw(&buf);
        Self { enc }
    }

    /// Append one key/value pair.
    ///
    /// # Errors
    ///
    /// Returns an error if either value cannot be represented; on error the
    /// entry is partially written and the stream should be discarded.
    pub fn push(&mut self, key: &Value, value: &Value) -> Result<(), CborError> {
        self.enc.encode(key)?;
        self.enc.encode(value)
    }

    /// Emit the break byte and return the finished item.
    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        self.enc.write_raw(&[BREAK]);
        self.enc.into_vec()
    }
}

/// Writer producing one indefinite-length byte string from definite chunks.
pub struct ByteChunkWriter {
    out: Vec<u8>,
}

impl ByteChunkWriter {
    /// Start an indefinite-length byte string.
    #[must_use]
    pub fn new() -> Self {
        let mut out = Vec::new();
        head::write_indefinite(&mut out, MAJOR_BYTES);
        Self { out }
    }

    /// Append one definite-length chunk.
    pub fn push(&mut self, chunk: &[u8]) {
        head::write_head(&mut self.out, MAJOR_BYTES, chunk.len() as u64);
        self.out.extend_from_slice(chunk);
    }

    /// Emit the break byte and return the finished item.
    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        self.out.push(BREAK);
        self.out
    }
}

impl Default for ByteChunkWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Writer producing one indefinite-length text string from definite chunks.
///
/// Chunk boundaries are character boundaries by construction (`&str`).
pub struct TextChunkWriter {
    out: Vec<u8>,
}

impl TextChunkWriter {
    /// Start an indefinite-length text string.
    #[must_use]
    pub fn new() -> Self {
        let mut out = Vec::new();
        head::write_indefinite(&mut out, MAJOR_TEXT);
        Self { out }
    }

    /// Append one definite-length chunk.
    pub fn push(&mut self, chunk: &str) {
        head::write_head(&mut self.out, MAJOR_TEXT, chunk.len() as u64);
        self.out.extend_from_slice(chunk.as_bytes());
    }

    /// Emit the break byte and return the finished item.
    #[must_use]
    pub fn finish(mut self) -> Vec<u8> {
        self.out.push(BREAK);
        self.out
    }
}

impl Default for TextChunkWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Writer for a CBOR sequence (RFC 8742): independent items back to back,
/// optionally preceded by a fixed 12-byte protocol prolog.
pub struct SequenceWriter {
    enc: Encoder,
}

impl SequenceWriter {
    /// Start an empty sequence.
    #[must_use]
    pub fn new(opts: EncodeOptions) -> Self {
        Self {
            enc: Encoder::new(opts),
        }
    }

    /// Write the 12-byte prolog: the self-describe tag, the protocol tag and
    /// the text `"BOR"`. Call before writing any record.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedValue` if `protocol_tag` is below `0x0100_0000`
    /// (the smallest value whose head has the fixed 4-byte form).
    pub fn write_header(&mut self, protocol_tag: u32) -> Result<(), CborError> {
        if protocol_tag < PROTOCOL_TAG_MIN {
            return Err(CborError::new(
                ErrorKind::UnsupportedValue,
                self.enc.as_bytes().len(),
            ));
        }
        let mut buf = Vec::with_capacity(12);
        head::write_head(&mut buf, MAJOR_TAG, TAG_SELF_DESCRIBE);
        head::write_head(&mut buf, MAJOR_TAG, u64::from(protocol_tag));
        head::write_head(&mut buf, MAJOR_TEXT, 3);
        buf.extend_from_slice(b"BOR");
        self.enc.write_raw(&buf);
        Ok(())
    }

    /// Append one record as an independent data item.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be represented.
    pub fn push(&mut self, value: &Value) -> Result<(), CborError> {
        self.enc.encode(value)
    }

    /// Return the finished sequence bytes.
    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.enc.into_vec()
    }
}

/// Lazy, forward-only reader over a CBOR sequence.
///
/// When `header_tags` is non-empty the prolog is read and verified before
/// the first item; a mismatch fails before any item is produced. The
/// iterator ends when the input is exhausted on an item boundary and yields
/// `TrailingData` if exhaustion happens mid-item.
pub struct SequenceReader<'data> {
    dec: Decoder<'data>,
    done: bool,
}

impl<'data> std::fmt::Debug for SequenceReader<'data> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceReader").field("done", &self.done).finish()
    }
}

impl<'data> SequenceReader<'data> {
    /// Open a sequence, verifying the prolog against `header_tags`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSequenceHeader` if the prolog tags or the `"BOR"`
    /// marker do not match, or any decode error from the prolog item.
    pub fn new(
        data: &'data [u8],
        opts: DecodeOptions,
        header_tags: &[u64],
    ) -> Result<Self, CborError> {
        let mut dec = Decoder::new(data, opts.clone());
        if !header_tags.is_empty() {
            // Decode the prolog with built-in tags disabled so the
            // self-describe tag is not stripped before it is checked.
            let mut header_opts = opts;
            header_opts.disable_builtin_tags = true;
            header_opts.tag_registry = crate::tags::TagRegistry::new();
            let mut header_dec = Decoder::new(data, header_opts);
            let mut value = header_dec.decode()?;
            for &tag in header_tags {
                match value {
                    Value::Tag(t, inner) if t == tag => value = *inner,
                    _ => {
                        return Err(CborError::new(
                            ErrorKind::InvalidSequenceHeader,
                            header_dec.position(),
                        ))
                    }
                }
            }
            match value {
                Value::Text(marker) if marker == "BOR" => {}
                _ => {
                    return Err(CborError::new(
                        ErrorKind::InvalidSequenceHeader,
                        header_dec.position(),
                    ))
                }
            }
            dec.seek(header_dec.position());
        }
        Ok(Self { dec, done: false })
    }

    /// The byte position of the next unread item.
    #[must_use]
    pub fn position(&self) -> usize {
        self.dec.position()
    }
}

impl Iterator for SequenceReader<'_> {
    type Item = Result<Value, CborError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.dec.is_eof() {
            return None;
        }
        let start = self.dec.position();
        match self.dec.decode() {
            Ok(value) => Some(Ok(value)),
            Err(err) => {
                self.done = true;
                if err.kind == ErrorKind::UnexpectedEof {
                    Some(Err(CborError::new(ErrorKind::TrailingData, start)))
                } else {
                    Some(Err(err))
                }
            }
        }
    }
}
