//! # graph-cbor
//!
//! A CBOR (RFC 8949) codec for rich, possibly-cyclic value graphs.
//!
//! ## Design principles
//!
//! - **One value domain, two engines.** Encoding and decoding share a closed
//!   [`Value`] sum, a head codec, and the sharing/string-reference machinery;
//!   semantic tags map to concrete leaf types (`chrono`, `uuid`, `regex`,
//!   `std::net`) through an extensible dispatch.
//! - **Identity is explicit.** Graph positions that may be referenced more
//!   than once are [`Value::Shared`] cells. With `value_sharing` enabled the
//!   encoder emits tags 28/29 for them and the decoder reconstructs the same
//!   cell identities, including through cycles.
//! - **Deterministic bytes on demand.** Canonical mode produces shortest
//!   heads, sorted maps and sets, and shortest lossless floats; the decoder
//!   can reject non-minimal heads.
//!
//! ## Extension points
//!
//! The encoder defers [`Value::Custom`] nodes to a `default` hook; the
//! decoder routes unknown tags through a [`TagRegistry`] of static or
//! dynamic hooks and every decoded map through an optional `object_hook`.
//!
//! ## Streams
//!
//! [`stream`] provides writers for indefinite-length containers and
//! writers/readers for CBOR sequences (RFC 8742) with an optional fixed
//! 12-byte protocol prolog.
//!
//! ## Safety
//!
//! This crate forbids `unsafe` code.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

mod canonical;
mod cursor;
mod decode;
mod encode;
mod error;
mod head;
mod share;
mod stringref;
mod tags;
mod value;

pub mod stream;

pub use crate::decode::{decode, DecodeOptions, Decoder, ObjectHook, StrErrorPolicy};
pub use crate::encode::{
    encode, encode_into, DefaultHook, EncodeOptions, Encoder, DEFAULT_MAX_DEPTH,
};
pub use crate::error::{CborError, ErrorKind};
pub use crate::tags::{TagHook, TagRegistry};
pub use crate::value::{
    cbor_equal, BigFloat, CustomValue, DecimalFraction, IpNetwork, Shareable, Value,
};
