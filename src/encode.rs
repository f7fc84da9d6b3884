//! The encoder engine: recursive descent over the value graph, emitting one
//! CBOR data item per top-level call.
//!
//! Per-value decision order: shareable check (identity of `Shared`/`Custom`
//! nodes), string-reference check, type dispatch, `default`-hook deferral.

use std::fmt;
use std::rc::Rc;

use chrono::{DateTime, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, SecondsFormat,
    TimeZone};
use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::canonical;
use crate::head::{self, MAJOR_ARRAY, MAJOR_BYTES, MAJOR_MAP, MAJOR_SIMPLE, MAJOR_TAG,
    MAJOR_TEXT, MAJOR_UNSIGNED};
use crate::share::EncodeShareTable;
use crate::stringref::{StrEntry, StringRefTable};
use crate::tags;
use crate::value::{CustomValue, Shareable, Value};
use crate::{CborError, ErrorKind};

/// Default recursion limit for both engines.
pub const DEFAULT_MAX_DEPTH: usize = 500;

/// The encoder's `default` hook: invoked once per [`CustomValue`] the core
/// cannot represent. The hook must write exactly one data item, typically by
/// re-entering [`Encoder::encode`] with a converted value.
pub type DefaultHook = Rc<dyn Fn(&mut Encoder, &CustomValue) -> Result<(), CborError>>;

/// Options controlling a single encode pass.
#[derive(Clone)]
pub struct EncodeOptions {
    /// Default offset attached to naive date-times. Naive date-times are
    /// rejected as `UnsupportedValue` when absent.
    pub timezone: Option<FixedOffset>,
    /// Encode date-times with tag 1 (epoch seconds, losing the offset)
    /// instead of tag 0 text.
    pub datetime_as_timestamp: bool,
    /// Promote dates to midnight date-times before encoding (legacy).
    pub date_as_datetime: bool,
    /// Enable tags 28/29 for identity-bearing nodes.
    pub value_sharing: bool,
    /// Enable tags 25/256, wrapping each top-level item in a namespace.
    pub string_referencing: bool,
    /// Enable the canonical discipline (sorted maps/sets, shortest floats).
    pub canonical: bool,
    /// Recursion limit; exceeding it is `StackOverflow`.
    pub max_depth: usize,
    /// Hook for [`Value::Custom`] nodes.
    pub default: Option<DefaultHook>,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            timezone: None,
            datetime_as_timestamp: false,
            date_as_datetime: false,
            value_sharing: false,
            string_referencing: false,
            canonical: false,
            max_depth: DEFAULT_MAX_DEPTH,
            default: None,
        }
    }
}

impl fmt::Debug for EncodeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodeOptions")
            .field("timezone", &self.timezone)
            .field("datetime_as_timestamp", &self.datetime_as_timestamp)
            .field("date_as_datetime", &self.date_as_datetime)
            .field("value_sharing", &self.value_sharing)
            .field("string_referencing", &self.string_referencing)
            .field("canonical", &self.canonical)
            .field("max_depth", &self.max_depth)
            .field("default", &self.default.is_some())
            .finish()
    }
}

/// Encode one data item to a fresh buffer.
///
/// # Errors
///
/// Returns an error if the value cannot be represented under `opts`.
pub fn encode(value: &Value, opts: &EncodeOptions) -> Result<Vec<u8>, CborError> {
    let mut enc = Encoder::new(opts.clone());
    enc.encode(value)?;
    Ok(enc.into_vec())
}

/// Encode one data item, appending to `out`.
///
/// On error nothing is appended; the caller's buffer is untouched.
///
/// # Errors
///
/// Returns an error if the value cannot be represented under `opts`.
pub fn encode_into(value: &Value, opts: &EncodeOptions, out: &mut Vec<u8>) -> Result<(), CborError> {
    let bytes = encode(value, opts)?;
    out.extend_from_slice(&bytes);
    Ok(())
}

/// The encoder engine.
///
/// Auxiliary state (share table, string-reference namespace, cycle set) is
/// reset at each top-level [`Encoder::encode`] call; re-entrant calls from a
/// `default` hook share the state of the pass that invoked the hook.
pub struct Encoder {
    out: Vec<u8>,
    opts: EncodeOptions,
    shared: EncodeShareTable,
    in_flight: Vec<usize>,
    stringrefs: Option<StringRefTable>,
    depth: usize,
}

impl Encoder {
    /// Create an encoder with an empty output buffer.
    #[must_use]
    pub fn new(opts: EncodeOptions) -> Self {
        Self {
            out: Vec::new(),
            opts,
            shared: EncodeShareTable::default(),
            in_flight: Vec::new(),
            stringrefs: None,
            depth: 0,
        }
    }

    /// Encode one data item.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be represented. On error the
    /// output buffer holds a prefix of a partial item and should be
    /// discarded.
    pub fn encode(&mut self, value: &Value) -> Result<(), CborError> {
        if self.depth > 0 {
            // Re-entered from a hook: keep the surrounding pass's state.
            return self.encode_item(value);
        }
        self.shared.clear();
        self.in_flight.clear();
        if self.opts.string_referencing {
            head::write_head(&mut self.out, MAJOR_TAG, tags::TAG_STRINGREF_NAMESPACE);
            self.stringrefs = Some(StringRefTable::new());
            let result = self.encode_item(value);
            self.stringrefs = None;
            result
        } else {
            self.encode_item(value)
        }
    }

    /// The bytes emitted so far.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.out
    }

    /// Append raw bytes; used by the stream helpers for heads and breaks.
    pub(crate) fn write_raw(&mut self, bytes: &[u8]) {
        self.out.extend_from_slice(bytes);
    }

    /// Consume the encoder and return the emitted bytes.
    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.out
    }

    fn position(&self) -> usize {
        self.out.len()
    }

    fn err(&self, kind: ErrorKind) -> CborError {
        CborError::new(kind, self.position())
    }

    fn encode_item(&mut self, value: &Value) -> Result<(), CborError> {
        self.depth += 1;
        if self.depth > self.opts.max_depth {
            self.depth -= 1;
            return Err(self.err(ErrorKind::StackOverflow));
        }
        let result = self.dispatch(value);
        self.depth -= 1;
        result
    }

    fn dispatch(&mut self, value: &Value) -> Result<(), CborError> {
        match value {
            Value::Shared(cell) => self.encode_shared(cell),
            Value::Custom(custom) => self.encode_custom(custom),
            Value::Integer(v) => self.encode_integer(*v),
            Value::BigNum(v) => self.encode_bignum(v),
            Value::Bytes(b) => self.encode_bytes(b),
            Value::Text(s) => self.encode_text(s),
            Value::Array(items) => {
                head::write_head(&mut self.out, MAJOR_ARRAY, items.len() as u64);
                for item in items {
                    self.encode_item(item)?;
                }
                Ok(())
            }
            Value::Map(entries) => self.encode_map(entries),
            Value::Set(items) => self.encode_set(items),
            Value::Tag(tag, inner) => {
                head::write_head(&mut self.out, MAJOR_TAG, *tag);
                if *tag == tags::TAG_STRINGREF_NAMESPACE && self.stringrefs.is_some() {
                    // an explicit namespace opens a fresh scope, as on decode
                    let outer = self.stringrefs.replace(StringRefTable::new());
                    let result = self.encode_item(inner);
                    self.stringrefs = outer;
                    result
                } else {
                    self.encode_item(inner)
                }
            }
            Value::Simple(n) => self.encode_simple(*n),
            Value::Bool(v) => {
                self.out.push(if *v { 0xf5 } else { 0xf4 });
                Ok(())
            }
            Value::Null => {
                self.out.push(0xf6);
                Ok(())
            }
            Value::Undefined => {
                self.out.push(0xf7);
                Ok(())
            }
            Value::Float(v) => {
                self.encode_float(*v);
                Ok(())
            }
            Value::DateTime(dt) => self.encode_datetime(dt),
            Value::NaiveDateTime(naive) => self.encode_naive_datetime(naive),
            Value::Date(date) => self.encode_date(date),
            Value::Decimal(d) => {
                head::write_head(&mut self.out, MAJOR_TAG, tags::TAG_DECIMAL);
                self.encode_exponent_pair(d.exponent, &d.mantissa)
            }
            Value::BigFloat(b) => {
                head::write_head(&mut self.out, MAJOR_TAG, tags::TAG_BIGFLOAT);
                self.encode_exponent_pair(b.exponent, &b.mantissa)
            }
            Value::Rational(r) => {
                head::write_head(&mut self.out, MAJOR_TAG, tags::TAG_RATIONAL);
                head::write_head(&mut self.out, MAJOR_ARRAY, 2);
                self.encode_bignum(r.numer())?;
                self.encode_bignum(r.denom())
            }
            Value::Regexp(r) => {
                head::write_head(&mut self.out, MAJOR_TAG, tags::TAG_REGEXP);
                self.encode_text(r.as_str())
            }
            Value::Mime(text) => {
                head::write_head(&mut self.out, MAJOR_TAG, tags::TAG_MIME);
                self.encode_text(text)
            }
            Value::Uuid(uuid) => {
                head::write_head(&mut self.out, MAJOR_TAG, tags::TAG_UUID);
                self.encode_bytes(uuid.as_bytes())
            }
            Value::Address(addr) => {
                head::write_head(&mut self.out, MAJOR_TAG, tags::TAG_IPADDRESS);
                match addr {
                    std::net::IpAddr::V4(v4) => self.encode_bytes(&v4.octets()),
                    std::net::IpAddr::V6(v6) => self.encode_bytes(&v6.octets()),
                }
            }
            Value::Network(net) => {
                head::write_head(&mut self.out, MAJOR_TAG, tags::TAG_IPNETWORK);
                head::write_head(&mut self.out, MAJOR_MAP, 1);
                match net.address {
                    std::net::IpAddr::V4(v4) => self.encode_bytes(&v4.octets())?,
                    std::net::IpAddr::V6(v6) => self.encode_bytes(&v6.octets())?,
                }
                self.encode_integer(i128::from(net.prefix))
            }
        }
    }

    fn encode_shared(&mut self, cell: &Shareable) -> Result<(), CborError> {
        let id = cell.ptr_id();
        if self.opts.value_sharing {
            if let Some(index) = self.shared.lookup(id) {
                head::write_head(&mut self.out, MAJOR_TAG, tags::TAG_SHAREDREF);
                head::write_head(&mut self.out, MAJOR_UNSIGNED, index as u64);
                return Ok(());
            }
            let offset = self.position();
            head::write_head(&mut self.out, MAJOR_TAG, tags::TAG_SHAREABLE);
            self.shared.register(id, offset);
            let inner = cell.get();
            self.encode_item(&inner)
        } else {
            if self.in_flight.contains(&id) {
                return Err(self.err(ErrorKind::CyclicReference));
            }
            self.in_flight.push(id);
            let inner = cell.get();
            let result = self.encode_item(&inner);
            self.in_flight.pop();
            result
        }
    }

    fn encode_custom(&mut self, custom: &CustomValue) -> Result<(), CborError> {
        let Some(hook) = self.opts.default.clone() else {
            return Err(self.err(ErrorKind::UnsupportedValue));
        };
        let id = custom.ptr_id();
        if self.opts.value_sharing {
            if let Some(index) = self.shared.lookup(id) {
                head::write_head(&mut self.out, MAJOR_TAG, tags::TAG_SHAREDREF);
                head::write_head(&mut self.out, MAJOR_UNSIGNED, index as u64);
                return Ok(());
            }
            let offset = self.position();
            head::write_head(&mut self.out, MAJOR_TAG, tags::TAG_SHAREABLE);
            self.shared.register(id, offset);
            hook(self, custom)
        } else {
            if self.in_flight.contains(&id) {
                return Err(self.err(ErrorKind::CyclicReference));
            }
            self.in_flight.push(id);
            let result = hook(self, custom);
            self.in_flight.pop();
            result
        }
    }

    fn encode_integer(&mut self, v: i128) -> Result<(), CborError> {
        if v >= 0 {
            if let Ok(u) = u64::try_from(v) {
                head::write_head(&mut self.out, MAJOR_UNSIGNED, u);
                return Ok(());
            }
        } else if let Ok(u) = u64::try_from(-1 - v) {
            head::write_head(&mut self.out, head::MAJOR_NEGATIVE, u);
            return Ok(());
        }
        self.encode_bignum(&BigInt::from(v))
    }

    fn encode_bignum(&mut self, v: &BigInt) -> Result<(), CborError> {
        use num_bigint::Sign;
        if v.sign() == Sign::Minus {
            let n = -(v + 1u32);
            if let Some(u) = n.to_u64() {
                head::write_head(&mut self.out, head::MAJOR_NEGATIVE, u);
                return Ok(());
            }
            head::write_head(&mut self.out, MAJOR_TAG, tags::TAG_NEGATIVE_BIGNUM);
            let (_, magnitude) = n.to_bytes_be();
            self.encode_bytes(&magnitude)
        } else {
            if let Some(u) = v.to_u64() {
                head::write_head(&mut self.out, MAJOR_UNSIGNED, u);
                return Ok(());
            }
            head::write_head(&mut self.out, MAJOR_TAG, tags::TAG_POSITIVE_BIGNUM);
            let (_, magnitude) = v.to_bytes_be();
            self.encode_bytes(&magnitude)
        }
    }

    fn encode_bytes(&mut self, b: &[u8]) -> Result<(), CborError> {
        if self.stringrefs.is_some() {
            let entry = StrEntry::Bytes(b.to_vec());
            if self.emit_stringref(&entry) {
                return Ok(());
            }
        }
        head::write_head(&mut self.out, MAJOR_BYTES, b.len() as u64);
        self.out.extend_from_slice(b);
        Ok(())
    }

    fn encode_text(&mut self, s: &str) -> Result<(), CborError> {
        if self.stringrefs.is_some() {
            let entry = StrEntry::Text(s.to_owned());
            if self.emit_stringref(&entry) {
                return Ok(());
            }
        }
        head::write_head(&mut self.out, MAJOR_TEXT, s.len() as u64);
        self.out.extend_from_slice(s.as_bytes());
        Ok(())
    }

    /// Emit a tag-25 reference if the string is already in the namespace;
    /// otherwise record it when eligible and report that the raw form must
    /// be written.
    fn emit_stringref(&mut self, entry: &StrEntry) -> bool {
        let Some(table) = self.stringrefs.as_mut() else {
            return false;
        };
        if let Some(index) = table.lookup(entry) {
            head::write_head(&mut self.out, MAJOR_TAG, tags::TAG_STRINGREF);
            head::write_head(&mut self.out, MAJOR_UNSIGNED, index as u64);
            true
        } else {
            table.note(entry);
            false
        }
    }

    fn encode_map(&mut self, entries: &[(Value, Value)]) -> Result<(), CborError> {
        head::write_head(&mut self.out, MAJOR_MAP, entries.len() as u64);
        if self.opts.canonical {
            let mut order = Vec::with_capacity(entries.len());
            for (i, (key, _)) in entries.iter().enumerate() {
                order.push((self.sort_encoding(key)?, i));
            }
            order.sort_by(|a, b| canonical::cmp_encoded(&a.0, &b.0).then(a.1.cmp(&b.1)));
            for (_, i) in order {
                let (key, val) = &entries[i];
                self.encode_item(key)?;
                self.encode_item(val)?;
            }
        } else {
            for (key, val) in entries {
                self.encode_item(key)?;
                self.encode_item(val)?;
            }
        }
        Ok(())
    }

    fn encode_set(&mut self, items: &[Value]) -> Result<(), CborError> {
        head::write_head(&mut self.out, MAJOR_TAG, tags::TAG_SET);
        head::write_head(&mut self.out, MAJOR_ARRAY, items.len() as u64);
        if self.opts.canonical {
            let mut order = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                order.push((self.sort_encoding(item)?, i));
            }
            order.sort_by(|a, b| canonical::cmp_encoded(&a.0, &b.0).then(a.1.cmp(&b.1)));
            for (_, i) in order {
                self.encode_item(&items[i])?;
            }
        } else {
            for item in items {
                self.encode_item(item)?;
            }
        }
        Ok(())
    }

    /// A value's plain canonical encoding, used only for ordering. Sharing
    /// and string referencing are disabled so sorting has no side effects on
    /// the live tables.
    fn sort_encoding(&self, value: &Value) -> Result<Vec<u8>, CborError> {
        let mut opts = self.opts.clone();
        opts.value_sharing = false;
        opts.string_referencing = false;
        opts.canonical = true;
        let mut sub = Encoder::new(opts);
        sub.encode(value)?;
        Ok(sub.into_vec())
    }

    fn encode_simple(&mut self, n: u8) -> Result<(), CborError> {
        if n < 24 {
            self.out.push((MAJOR_SIMPLE << 5) | n);
            Ok(())
        } else if n < 32 {
            Err(self.err(ErrorKind::UnsupportedValue))
        } else {
            self.out.push((MAJOR_SIMPLE << 5) | 24);
            self.out.push(n);
            Ok(())
        }
    }

    fn encode_float(&mut self, v: f64) {
        if self.opts.canonical {
            canonical::write_shortest_float(&mut self.out, v);
        } else {
            canonical::write_double(&mut self.out, v);
        }
    }

    fn encode_datetime(&mut self, dt: &DateTime<FixedOffset>) -> Result<(), CborError> {
        if self.opts.datetime_as_timestamp {
            head::write_head(&mut self.out, MAJOR_TAG, tags::TAG_EPOCH_DATETIME);
            let nanos = dt.timestamp_subsec_nanos();
            if nanos == 0 {
                self.encode_integer(i128::from(dt.timestamp()))
            } else {
                let seconds = dt.timestamp() as f64 + f64::from(nanos) * 1e-9;
                self.encode_float(seconds);
                Ok(())
            }
        } else {
            head::write_head(&mut self.out, MAJOR_TAG, tags::TAG_ISO_DATETIME);
            let text = dt.to_rfc3339_opts(SecondsFormat::AutoSi, true);
            self.encode_text(&text)
        }
    }

    fn encode_naive_datetime(&mut self, naive: &NaiveDateTime) -> Result<(), CborError> {
        let Some(tz) = self.opts.timezone else {
            return Err(self.err(ErrorKind::UnsupportedValue));
        };
        match tz.from_local_datetime(naive) {
            LocalResult::Single(dt) => self.encode_datetime(&dt),
            _ => Err(self.err(ErrorKind::UnsupportedValue)),
        }
    }

    // Dates have no tag of their own in the built-in set; they encode only
    // by promotion to a midnight date-time.
    fn encode_date(&mut self, date: &NaiveDate) -> Result<(), CborError> {
        if !self.opts.date_as_datetime {
            return Err(self.err(ErrorKind::UnsupportedValue));
        }
        let Some(naive) = date.and_hms_opt(0, 0, 0) else {
            return Err(self.err(ErrorKind::UnsupportedValue));
        };
        self.encode_naive_datetime(&naive)
    }

    fn encode_exponent_pair(&mut self, exponent: i64, mantissa: &BigInt) -> Result<(), CborError> {
        head::write_head(&mut self.out, MAJOR_ARRAY, 2);
        self.encode_integer(i128::from(exponent))?;
        self.encode_bignum(mantissa)
    }
}
