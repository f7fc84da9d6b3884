//! String-reference namespaces for tags 25/256.
//!
//! A namespace is a sequence of the byte/text strings emitted (or decoded)
//! within the current tag-256 scope. A string enters the namespace only when
//! referencing it later would be strictly shorter than re-emitting it: the
//! reference costs a 2-byte tag-25 head plus the head of the index, so the
//! eligibility threshold depends on the index the string would occupy.

use std::collections::HashMap;

use crate::head::head_len;
use crate::value::Value;

/// Is a string of `byte_len` raw bytes, occupying `next_index`, worth
/// referencing instead of re-emitting?
///
/// A reference costs the 2-byte tag-25 head plus the head of the index; the
/// raw string costs its own head plus its bytes. The resulting thresholds
/// are 3 bytes below index 24, then 4, 5, 7 and 11 at each head-width step.
pub(crate) const fn eligible(next_index: usize, byte_len: usize) -> bool {
    let reference = 2 + head_len(next_index as u64);
    let raw = head_len(byte_len as u64) + byte_len;
    reference < raw
}

/// A namespace entry; byte and text strings never alias each other.
#[derive(Clone, PartialEq, Eq, Hash)]
pub(crate) enum StrEntry {
    Bytes(Vec<u8>),
    Text(String),
}

impl StrEntry {
    pub(crate) fn byte_len(&self) -> usize {
        match self {
            StrEntry::Bytes(b) => b.len(),
            StrEntry::Text(s) => s.len(),
        }
    }

    pub(crate) fn to_value(&self) -> Value {
        match self {
            StrEntry::Bytes(b) => Value::Bytes(b.clone()),
            StrEntry::Text(s) => Value::Text(s.clone()),
        }
    }
}

/// Encode-side namespace: string → assigned index.
#[derive(Default)]
pub(crate) struct StringRefTable {
    indices: HashMap<StrEntry, usize>,
}

impl StringRefTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn lookup(&self, entry: &StrEntry) -> Option<usize> {
        self.indices.get(entry).copied()
    }

    /// Record `entry` if it meets the threshold for the index it would get.
    pub(crate) fn note(&mut self, entry: &StrEntry) {
        let next_index = self.indices.len();
        if eligible(next_index, entry.byte_len()) {
            self.indices.insert(entry.clone(), next_index);
        }
    }
}

/// Decode-side namespace: index → string, in assignment order.
#[derive(Default)]
pub(crate) struct StringRefNamespace {
    entries: Vec<StrEntry>,
}

impl StringRefNamespace {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn resolve(&self, index: usize) -> Option<Value> {
        self.entries.get(index).map(StrEntry::to_value)
    }

    /// Record a decoded definite-length byte string if it meets the threshold.
    pub(crate) fn note_bytes(&mut self, bytes: &[u8]) {
        if eligible(self.entries.len(), bytes.len()) {
            self.entries.push(StrEntry::Bytes(bytes.to_vec()));
        }
    }

    /// Record a decoded definite-length text string if it meets the threshold.
    pub(crate) fn note_text(&mut self, text: &str) {
        if eligible(self.entries.len(), text.len()) {
            self.entries.push(StrEntry::Text(text.to_owned()));
        }
    }
}
