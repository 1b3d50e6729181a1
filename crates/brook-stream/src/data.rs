//! Materialized body values produced by drain fast paths.

use bytes::Bytes;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

/// An immutable, typed byte payload.
///
/// Stands in for a full blob storage layer: the payload lives in memory and
/// clones share the underlying buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    data: Bytes,
    content_type: String,
}

impl Blob {
    /// Create a blob over the given bytes.
    pub fn new(data: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            content_type: content_type.into(),
        }
    }

    /// Payload size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// The MIME type recorded for this payload.
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Borrow the payload.
    #[must_use]
    pub fn bytes(&self) -> &Bytes {
        &self.data
    }

    /// Consume the blob, returning its payload.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

/// An ordered list of name/value form entries.
///
/// Only text entries are modeled; this is the drain target for
/// form-encoded bodies, not a full multipart implementation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData {
    entries: Vec<(String, String)>,
}

impl FormData {
    /// Create an empty form.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Duplicate names are kept in insertion order.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// All entries in insertion order.
    #[must_use]
    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the form has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encode as `application/x-www-form-urlencoded` bytes.
    ///
    /// This is the wire form a form-backed stream yields to readers.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut out = String::new();
        for (i, (name, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                out.push('&');
            }
            out.extend(utf8_percent_encode(name, NON_ALPHANUMERIC));
            out.push('=');
            out.extend(utf8_percent_encode(value, NON_ALPHANUMERIC));
        }
        Bytes::from(out)
    }
}
