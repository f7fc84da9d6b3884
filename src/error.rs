use std::error::Error as StdError;
use std::fmt;

/// A structured error kind identifying why an encode or decode failed.
///
/// Kinds are intentionally string-free; [`CborError`] pairs a kind with the
/// byte offset at which the failure was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Unexpected end-of-input while decoding.
    UnexpectedEof,
    /// Arithmetic overflow while computing a length or offset.
    LengthOverflow,
    /// Reserved additional-info value (28..30) was used.
    ReservedAdditionalInfo,
    /// Non-shortest head encoding under canonical decoding.
    NonMinimalEncoding,
    /// A break byte (0xff) appeared outside an indefinite-length container.
    StrayBreak,
    /// An indefinite-length string contained a chunk of a different major type.
    MixedIndefiniteChunks,
    /// Text string is not valid UTF-8 under the strict policy.
    InvalidUtf8,
    /// Two-byte simple value encoding with a value below 32.
    InvalidSimpleValue,
    /// A built-in tag's payload does not match its contract.
    InvalidTagPayload,
    /// A CBOR sequence prolog did not match the expected header tags.
    InvalidSequenceHeader,
    /// The encoder cannot represent the given value.
    UnsupportedValue,
    /// A cycle was found while encoding with value sharing disabled.
    CyclicReference,
    /// Tag 29 referenced a share-table slot that does not exist.
    ShareIndexInvalid,
    /// Tag 25 referenced a string outside any namespace, or past its end.
    StringRefInvalid,
    /// Decoding finished with input bytes remaining.
    TrailingData,
    /// Nesting exceeded the configured recursion limit.
    StackOverflow,
    /// A user tag/object/default hook failed; the tag number is attached.
    TagHookFailure {
        /// The tag whose hook failed.
        tag: u64,
    },
}

/// An encode/decode error with a structured kind and a byte offset.
///
/// Offsets refer to the position in the input (decode) or output (encode)
/// stream where the error was detected. Hook failures additionally carry the
/// original cause, reachable through [`std::error::Error::source`].
#[derive(Debug)]
pub struct CborError {
    /// The error kind.
    pub kind: ErrorKind,
    /// Byte offset at which the error was detected.
    pub offset: usize,
    cause: Option<Box<dyn StdError + 'static>>,
}

impl CborError {
    /// Construct an error at `offset`.
    #[inline]
    #[must_use]
    pub const fn new(kind: ErrorKind, offset: usize) -> Self {
        Self {
            kind,
            offset,
            cause: None,
        }
    }

    /// Construct a hook failure for `tag`, wrapping the original cause.
    #[must_use]
    pub fn hook(tag: u64, offset: usize, cause: impl Into<Box<dyn StdError + 'static>>) -> Self {
        Self {
            kind: ErrorKind::TagHookFailure { tag },
            offset,
            cause: Some(cause.into()),
        }
    }
}

impl PartialEq for CborError {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.offset == other.offset
    }
}

impl fmt::Display for CborError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self.kind {
            ErrorKind::UnexpectedEof => "unexpected end of input",
            ErrorKind::LengthOverflow => "length overflow",
            ErrorKind::ReservedAdditionalInfo => "reserved additional info value",
            ErrorKind::NonMinimalEncoding => "non-minimal head encoding",
            ErrorKind::StrayBreak => "break outside indefinite-length item",
            ErrorKind::MixedIndefiniteChunks => "mixed chunk types in indefinite-length string",
            ErrorKind::InvalidUtf8 => "text must be valid UTF-8",
            ErrorKind::InvalidSimpleValue => "invalid two-byte simple value",
            ErrorKind::InvalidTagPayload => "tag payload violates its contract",
            ErrorKind::InvalidSequenceHeader => "sequence header tags do not match",
            ErrorKind::UnsupportedValue => "value cannot be represented in CBOR",
            ErrorKind::CyclicReference => "cyclic reference with value sharing disabled",
            ErrorKind::ShareIndexInvalid => "shared reference index not found",
            ErrorKind::StringRefInvalid => "string reference outside namespace",
            ErrorKind::TrailingData => "trailing bytes after CBOR item",
            ErrorKind::StackOverflow => "nesting depth limit exceeded",
            ErrorKind::TagHookFailure { tag } => {
                return match &self.cause {
                    Some(cause) => write!(
                        f,
                        "cbor error at {}: hook for tag {tag} failed: {cause}",
                        self.offset
                    ),
                    None => write!(f, "cbor error at {}: hook for tag {tag} failed", self.offset),
                };
            }
        };

        write!(f, "cbor error at {}: {msg}", self.offset)
    }
}

impl StdError for CborError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause.as_deref()
    }
}
