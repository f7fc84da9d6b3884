use std::any::Any;
use std::cell::{Ref, RefCell};
use std::fmt;
use std::net::IpAddr;
use std::rc::Rc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::ToPrimitive;
use regex::Regex;
use uuid::Uuid;

use crate::{CborError, ErrorKind};

/// A decimal fraction (tag 4): `mantissa * 10^exponent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecimalFraction {
    /// Base-10 exponent.
    pub exponent: i64,
    /// Arbitrary-precision mantissa.
    pub mantissa: BigInt,
}

/// A bigfloat (tag 5): `mantissa * 2^exponent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BigFloat {
    /// Base-2 exponent.
    pub exponent: i64,
    /// Arbitrary-precision mantissa.
    pub mantissa: BigInt,
}

/// An IP network (tag 261): an address plus a prefix length.
///
/// The codec stores the pair as-is; host-bit validation is left to the
/// application, mirroring the permissive behavior of the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpNetwork {
    /// The network address.
    pub address: IpAddr,
    /// The prefix length in bits.
    pub prefix: u8,
}

impl IpNetwork {
    /// Construct a network, rejecting a prefix longer than the address.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTagPayload` if the prefix exceeds 32 (IPv4) or
    /// 128 (IPv6) bits.
    pub fn new(address: IpAddr, prefix: u8) -> Result<Self, CborError> {
        let max = match address {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix > max {
            return Err(CborError::new(ErrorKind::InvalidTagPayload, 0));
        }
        Ok(Self { address, prefix })
    }
}

/// An identity-bearing cell holding a [`Value`].
///
/// Sharing (tags 28/29) keys on the identity of these cells: the encoder
/// emits a reference the second time it sees the same cell, and the decoder
/// returns clones of one cell for every reference to the same slot. Cyclic
/// graphs are built by creating a cell first and filling it once the values
/// that reference it exist.
#[derive(Clone)]
pub struct Shareable(Rc<RefCell<Value>>);

impl Shareable {
    /// Create a new cell holding `value`.
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self(Rc::new(RefCell::new(value)))
    }

    /// Borrow the current value.
    ///
    /// # Panics
    ///
    /// Panics if the cell is mutably borrowed, which cannot happen during
    /// encode or decode.
    #[must_use]
    pub fn get(&self) -> Ref<'_, Value> {
        self.0.borrow()
    }

    /// Replace the current value.
    pub fn set(&self, value: Value) {
        *self.0.borrow_mut() = value;
    }

    /// Identity comparison: do both handles point at the same cell?
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// A stable identity token for the cell, used by the share tables.
    pub(crate) fn ptr_id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }
}

impl fmt::Debug for Shareable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never recurse into the cell: the graph may be cyclic.
        write!(f, "Shareable({:p})", Rc::as_ptr(&self.0))
    }
}

impl PartialEq for Shareable {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || *self.get() == *other.get()
    }
}

/// An opaque application value deferred to the encoder's `default` hook.
///
/// Identity (the `Rc` pointer) participates in value sharing, so a custom
/// object reached twice encodes as one tag-28 item plus a tag-29 reference.
#[derive(Clone)]
pub struct CustomValue(Rc<dyn Any>);

impl CustomValue {
    /// Wrap an application value.
    #[must_use]
    pub fn new<T: Any>(value: T) -> Self {
        Self(Rc::new(value))
    }

    /// Wrap an already-shared application value.
    #[must_use]
    pub fn from_rc(value: Rc<dyn Any>) -> Self {
        Self(value)
    }

    /// Downcast to a concrete application type.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }

    pub(crate) fn ptr_id(&self) -> usize {
        Rc::as_ptr(&self.0).cast::<u8>() as usize
    }
}

impl fmt::Debug for CustomValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CustomValue({:p})", Rc::as_ptr(&self.0))
    }
}

impl PartialEq for CustomValue {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_id() == other.ptr_id()
    }
}

/// The universal CBOR value domain.
///
/// `Integer` covers the head-native range [−2^64, 2^64−1]; values outside it
/// are `BigNum`. Maps are ordered key/value pair sequences with keys
/// pairwise distinct by CBOR equality. The semantic variants are produced
/// and consumed by the built-in tag dispatch.
#[derive(Debug, Clone)]
pub enum Value {
    /// An integer in the head-native range.
    Integer(i128),
    /// An arbitrary-precision integer outside the head-native range (tag 2/3).
    BigNum(BigInt),
    /// A byte string.
    Bytes(Vec<u8>),
    /// A UTF-8 text string.
    Text(String),
    /// An ordered sequence of values.
    Array(Vec<Value>),
    /// An ordered sequence of key/value pairs.
    Map(Vec<(Value, Value)>),
    /// An opaque tagged value (no built-in or user decoder claimed the tag).
    Tag(u64, Box<Value>),
    /// A simple value in 0..=19 or 32..=255.
    Simple(u8),
    /// A boolean.
    Bool(bool),
    /// Null.
    Null,
    /// Undefined.
    Undefined,
    /// An IEEE-754 double (also carries decoded half/single floats).
    Float(f64),
    /// A timezone-aware date-time (tags 0/1).
    DateTime(DateTime<FixedOffset>),
    /// A naive date-time; encodable only when a default timezone is set.
    NaiveDateTime(NaiveDateTime),
    /// A calendar date; encodable only through the `date_as_datetime`
    /// promotion.
    Date(NaiveDate),
    /// A decimal fraction (tag 4).
    Decimal(DecimalFraction),
    /// A bigfloat (tag 5).
    BigFloat(BigFloat),
    /// A rational number (tag 30).
    Rational(BigRational),
    /// A compiled regular expression (tag 35).
    Regexp(Regex),
    /// A MIME message, kept as raw text (tag 36).
    Mime(String),
    /// A UUID (tag 37).
    Uuid(Uuid),
    /// An IP address (tag 260).
    Address(IpAddr),
    /// An IP network (tag 261).
    Network(IpNetwork),
    /// A set (tag 258); elements pairwise distinct by CBOR equality.
    Set(Vec<Value>),
    /// An identity-bearing shared node (tags 28/29).
    Shared(Shareable),
    /// An application value handled by the encoder's `default` hook.
    Custom(CustomValue),
}

impl Value {
    /// Wrap `value` in a fresh [`Shareable`] cell.
    #[must_use]
    pub fn shared(value: Value) -> Value {
        Value::Shared(Shareable::new(value))
    }

    /// Construct an opaque tagged value.
    #[must_use]
    pub fn tag(tag: u64, value: Value) -> Value {
        Value::Tag(tag, Box::new(value))
    }

    /// The integer value, if this is an `Integer` or in-range `BigNum`.
    #[must_use]
    pub fn as_integer(&self) -> Option<i128> {
        match self {
            Value::Integer(v) => Some(*v),
            Value::BigNum(b) => b.to_i128(),
            _ => None,
        }
    }

    /// The text content, if this is a `Text`.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The array elements, if this is an `Array`.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// The map entries, if this is a `Map`.
    #[must_use]
    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Look up a map entry by key, by CBOR equality.
    #[must_use]
    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.as_map()
            .and_then(|entries| entries.iter().find(|(k, _)| cbor_equal(k, key)))
            .map(|(_, v)| v)
    }
}

/// CBOR equality over the value domain.
///
/// Integers and bignums compare numerically across variants; floats compare
/// by bit pattern or numeric equality (so NaN round-trips compare equal);
/// maps and sets compare as unordered collections; shared nodes compare by
/// identity first, then contents. Comparing two distinct cyclic graphs does
/// not terminate; identity-equal cycles short-circuit.
#[must_use]
pub fn cbor_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => x == y,
        (Value::BigNum(x), Value::BigNum(y)) => x == y,
        (Value::Integer(x), Value::BigNum(y)) | (Value::BigNum(y), Value::Integer(x)) => {
            y.to_i128().is_some_and(|y| y == *x)
        }
        (Value::Bytes(x), Value::Bytes(y)) => x == y,
        (Value::Text(x), Value::Text(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| cbor_equal(a, b))
        }
        (Value::Map(x), Value::Map(y)) => {
            x.len() == y.len()
                && x.iter().all(|(k, v)| {
                    y.iter()
                        .any(|(k2, v2)| cbor_equal(k, k2) && cbor_equal(v, v2))
                })
        }
        (Value::Tag(tx, vx), Value::Tag(ty, vy)) => tx == ty && cbor_equal(vx, vy),
        (Value::Simple(x), Value::Simple(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Null, Value::Null) | (Value::Undefined, Value::Undefined) => true,
        (Value::Float(x), Value::Float(y)) => x.to_bits() == y.to_bits() || x == y,
        (Value::DateTime(x), Value::DateTime(y)) => x == y,
        (Value::NaiveDateTime(x), Value::NaiveDateTime(y)) => x == y,
        (Value::Date(x), Value::Date(y)) => x == y,
        (Value::Decimal(x), Value::Decimal(y)) => x == y,
        (Value::BigFloat(x), Value::BigFloat(y)) => x == y,
        (Value::Rational(x), Value::Rational(y)) => x == y,
        (Value::Regexp(x), Value::Regexp(y)) => x.as_str() == y.as_str(),
        (Value::Mime(x), Value::Mime(y)) => x == y,
        (Value::Uuid(x), Value::Uuid(y)) => x == y,
        (Value::Address(x), Value::Address(y)) => x == y,
        (Value::Network(x), Value::Network(y)) => x == y,
        (Value::Set(x), Value::Set(y)) => {
            x.len() == y.len() && x.iter().all(|a| y.iter().any(|b| cbor_equal(a, b)))
        }
        (Value::Shared(x), Value::Shared(y)) => x == y,
        (Value::Custom(x), Value::Custom(y)) => x == y,
        _ => false,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        cbor_equal(self, other)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(i128::from(v))
    }
}

impl From<i128> for Value {
    fn from(v: i128) -> Self {
        Value::Integer(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Integer(i128::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}
