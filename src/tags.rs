//! Semantic-tag dispatch: the built-in decoder set and the user registry.
//!
//! Dispatch order on a decoded tag: the engine tags (28/29/256) are handled
//! before descent, then the user registry, then the built-ins (unless
//! disabled), and finally an opaque [`Value::Tag`].

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::rc::Rc;

use chrono::DateTime;
use num_bigint::{BigInt, Sign};
use num_rational::BigRational;
use num_traits::Zero;
use regex::Regex;
use uuid::Uuid;

use crate::decode::Decoder;
use crate::value::{cbor_equal, BigFloat, DecimalFraction, IpNetwork, Value};
use crate::{CborError, ErrorKind};

pub(crate) const TAG_ISO_DATETIME: u64 = 0;
pub(crate) const TAG_EPOCH_DATETIME: u64 = 1;
pub(crate) const TAG_POSITIVE_BIGNUM: u64 = 2;
pub(crate) const TAG_NEGATIVE_BIGNUM: u64 = 3;
pub(crate) const TAG_DECIMAL: u64 = 4;
pub(crate) const TAG_BIGFLOAT: u64 = 5;
pub(crate) const TAG_STRINGREF: u64 = 25;
pub(crate) const TAG_SHAREABLE: u64 = 28;
pub(crate) const TAG_SHAREDREF: u64 = 29;
pub(crate) const TAG_RATIONAL: u64 = 30;
pub(crate) const TAG_REGEXP: u64 = 35;
pub(crate) const TAG_MIME: u64 = 36;
pub(crate) const TAG_UUID: u64 = 37;
pub(crate) const TAG_STRINGREF_NAMESPACE: u64 = 256;
pub(crate) const TAG_SET: u64 = 258;
pub(crate) const TAG_IPADDRESS: u64 = 260;
pub(crate) const TAG_IPNETWORK: u64 = 261;
pub(crate) const TAG_SELF_DESCRIBE: u64 = 55799;

/// A user decoder for one tag number.
#[derive(Clone)]
pub enum TagHook {
    /// Receives the decoded payload and returns its replacement.
    Static(Rc<dyn Fn(Value) -> Result<Value, CborError>>),
    /// Additionally receives the decoder, for `immutable`, `set_shareable`
    /// and `decode_from_bytes`.
    Dynamic(Rc<dyn for<'d> Fn(&mut Decoder<'d>, Value) -> Result<Value, CborError>>),
}

/// A registry mapping tag numbers to user decoders.
///
/// A registered hook takes precedence over the built-in decoder for the same
/// tag. Hook errors surface as `TagHookFailure` with the tag attached.
#[derive(Clone, Default)]
pub struct TagRegistry {
    hooks: HashMap<u64, TagHook>,
}

impl TagRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook for `tag`, replacing any previous one.
    pub fn register(&mut self, tag: u64, hook: TagHook) {
        self.hooks.insert(tag, hook);
    }

    /// Register a static hook for `tag`.
    pub fn register_static<F>(&mut self, tag: u64, hook: F)
    where
        F: Fn(Value) -> Result<Value, CborError> + 'static,
    {
        self.register(tag, TagHook::Static(Rc::new(hook)));
    }

    /// Register a dynamic hook for `tag`.
    pub fn register_dynamic<F>(&mut self, tag: u64, hook: F)
    where
        F: for<'d> Fn(&mut Decoder<'d>, Value) -> Result<Value, CborError> + 'static,
    {
        self.register(tag, TagHook::Dynamic(Rc::new(hook)));
    }

    pub(crate) fn get(&self, tag: u64) -> Option<TagHook> {
        self.hooks.get(&tag).cloned()
    }
}

fn payload_err(dec: &Decoder<'_>) -> CborError {
    CborError::new(ErrorKind::InvalidTagPayload, dec.position())
}

/// Collapse a bignum into the head-native range when it fits.
pub(crate) fn integer_from_bigint(v: BigInt) -> Value {
    const NATIVE_MIN: i128 = -(1i128 << 64);
    const NATIVE_MAX: i128 = (1i128 << 64) - 1;
    let narrowed: Result<i128, _> = v.try_into();
    match narrowed {
        Ok(i) if (NATIVE_MIN..=NATIVE_MAX).contains(&i) => Value::Integer(i),
        Ok(i) => Value::BigNum(BigInt::from(i)),
        Err(err) => Value::BigNum(err.into_original()),
    }
}

fn expect_exponent_pair(dec: &Decoder<'_>, payload: Value) -> Result<(i64, BigInt), CborError> {
    let Value::Array(items) = payload else {
        return Err(payload_err(dec));
    };
    let [exponent, mantissa]: [Value; 2] =
        items.try_into().map_err(|_| payload_err(dec))?;
    let exponent = exponent
        .as_integer()
        .and_then(|e| i64::try_from(e).ok())
        .ok_or_else(|| payload_err(dec))?;
    let mantissa = match mantissa {
        Value::Integer(i) => BigInt::from(i),
        Value::BigNum(b) => b,
        _ => return Err(payload_err(dec)),
    };
    Ok((exponent, mantissa))
}

fn decode_epoch_datetime(dec: &Decoder<'_>, payload: Value) -> Result<Value, CborError> {
    let utc = match payload {
        Value::Integer(secs) => i64::try_from(secs)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        Value::Float(seconds) if seconds.is_finite() => {
            let secs = seconds.floor();
            let mut nanos = ((seconds - secs) * 1e9).round() as u32;
            if nanos >= 1_000_000_000 {
                nanos = 999_999_999;
            }
            i64::try_from(secs as i128)
                .ok()
                .and_then(|secs| DateTime::from_timestamp(secs, nanos))
        }
        _ => None,
    };
    utc.map(|dt| Value::DateTime(dt.fixed_offset()))
        .ok_or_else(|| payload_err(dec))
}

/// Run the built-in decoder for `tag` over its decoded payload.
///
/// A tag no built-in claims comes back as an opaque [`Value::Tag`].
pub(crate) fn decode_builtin(
    dec: &mut Decoder<'_>,
    tag: u64,
    payload: Value,
) -> Result<Value, CborError> {
    let value = match tag {
        TAG_ISO_DATETIME => {
            let Value::Text(text) = payload else {
                return Err(payload_err(dec));
            };
            let dt = DateTime::parse_from_rfc3339(&text).map_err(|_| payload_err(dec))?;
            Value::DateTime(dt)
        }
        TAG_EPOCH_DATETIME => decode_epoch_datetime(dec, payload)?,
        TAG_POSITIVE_BIGNUM => {
            let Value::Bytes(magnitude) = payload else {
                return Err(payload_err(dec));
            };
            integer_from_bigint(BigInt::from_bytes_be(Sign::Plus, &magnitude))
        }
        TAG_NEGATIVE_BIGNUM => {
            let Value::Bytes(magnitude) = payload else {
                return Err(payload_err(dec));
            };
            let n = BigInt::from_bytes_be(Sign::Plus, &magnitude);
            integer_from_bigint(-(n + 1u32))
        }
        TAG_DECIMAL => {
            let (exponent, mantissa) = expect_exponent_pair(dec, payload)?;
            Value::Decimal(DecimalFraction { exponent, mantissa })
        }
        TAG_BIGFLOAT => {
            let (exponent, mantissa) = expect_exponent_pair(dec, payload)?;
            Value::BigFloat(BigFloat { exponent, mantissa })
        }
        TAG_STRINGREF => {
            let index = payload
                .as_integer()
                .and_then(|i| usize::try_from(i).ok())
                .ok_or_else(|| payload_err(dec))?;
            return dec.resolve_stringref(index);
        }
        TAG_RATIONAL => {
            let Value::Array(items) = payload else {
                return Err(payload_err(dec));
            };
            let [numer, denom]: [Value; 2] =
                items.try_into().map_err(|_| payload_err(dec))?;
            let numer = match numer {
                Value::Integer(i) => BigInt::from(i),
                Value::BigNum(b) => b,
                _ => return Err(payload_err(dec)),
            };
            let denom = match denom {
                Value::Integer(i) => BigInt::from(i),
                Value::BigNum(b) => b,
                _ => return Err(payload_err(dec)),
            };
            if denom.is_zero() {
                return Err(payload_err(dec));
            }
            Value::Rational(BigRational::new(numer, denom))
        }
        TAG_REGEXP => {
            let Value::Text(text) = payload else {
                return Err(payload_err(dec));
            };
            Value::Regexp(Regex::new(&text).map_err(|_| payload_err(dec))?)
        }
        TAG_MIME => {
            let Value::Text(text) = payload else {
                return Err(payload_err(dec));
            };
            Value::Mime(text)
        }
        TAG_UUID => {
            let Value::Bytes(bytes) = payload else {
                return Err(payload_err(dec));
            };
            Value::Uuid(Uuid::from_slice(&bytes).map_err(|_| payload_err(dec))?)
        }
        TAG_SET => {
            let Value::Array(items) = payload else {
                return Err(payload_err(dec));
            };
            let mut set: Vec<Value> = Vec::with_capacity(items.len());
            for item in items {
                if !set.iter().any(|existing| cbor_equal(existing, &item)) {
                    set.push(item);
                }
            }
            Value::Set(set)
        }
        TAG_IPADDRESS => {
            let Value::Bytes(bytes) = payload else {
                return Err(payload_err(dec));
            };
            match bytes.len() {
                4 => {
                    let octets: [u8; 4] = bytes.as_slice().try_into().expect("length checked");
                    Value::Address(IpAddr::V4(Ipv4Addr::from(octets)))
                }
                16 => {
                    let octets: [u8; 16] = bytes.as_slice().try_into().expect("length checked");
                    Value::Address(IpAddr::V6(Ipv6Addr::from(octets)))
                }
                // A 6-byte payload is a MAC address; without a user hook it
                // stays an opaque tagged value.
                6 => Value::Tag(TAG_IPADDRESS, Box::new(Value::Bytes(bytes))),
                _ => return Err(payload_err(dec)),
            }
        }
        TAG_IPNETWORK => {
            let Value::Map(entries) = payload else {
                return Err(payload_err(dec));
            };
            let [(addr, prefix)]: [(Value, Value); 1] =
                entries.try_into().map_err(|_| payload_err(dec))?;
            let Value::Bytes(bytes) = addr else {
                return Err(payload_err(dec));
            };
            let address = match bytes.len() {
                4 => {
                    let octets: [u8; 4] = bytes.as_slice().try_into().expect("length checked");
                    IpAddr::V4(Ipv4Addr::from(octets))
                }
                16 => {
                    let octets: [u8; 16] = bytes.as_slice().try_into().expect("length checked");
                    IpAddr::V6(Ipv6Addr::from(octets))
                }
                _ => return Err(payload_err(dec)),
            };
            let prefix = prefix
                .as_integer()
                .and_then(|p| u8::try_from(p).ok())
                .ok_or_else(|| payload_err(dec))?;
            let net = IpNetwork::new(address, prefix).map_err(|_| payload_err(dec))?;
            Value::Network(net)
        }
        TAG_SELF_DESCRIBE => payload,
        _ => Value::Tag(tag, Box::new(payload)),
    };
    Ok(value)
}
