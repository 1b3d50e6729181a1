//! Inline `data:` URL decoding.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use percent_encoding::percent_decode_str;
use url::Url;

use crate::error::{FetchError, Result};

const DEFAULT_MEDIA_TYPE: &str = "text/plain;charset=US-ASCII";

/// The decoded payload of a `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrlPayload {
    /// The declared media type, or the `text/plain` default.
    pub content_type: String,
    pub data: Bytes,
}

/// Decode `data:[<mediatype>][;base64],<payload>`.
///
/// The payload is percent-decoded; with the `;base64` marker it is then
/// base64-decoded (ASCII whitespace tolerated). Anything that does not
/// split at a comma, or fails base64 decoding, is a network error.
pub fn parse_data_url(url: &Url) -> Result<DataUrlPayload> {
    debug_assert_eq!(url.scheme(), "data");

    // The url crate keeps everything after "data:" in path (+ query when
    // the payload contains '?').
    let mut raw = url.path().to_string();
    if let Some(query) = url.query() {
        raw.push('?');
        raw.push_str(query);
    }

    let Some((meta, payload)) = raw.split_once(',') else {
        return Err(malformed(url));
    };

    let (media_type, is_base64) = match meta.strip_suffix(";base64") {
        Some(prefix) => (prefix, true),
        None => (meta, false),
    };
    let content_type = if media_type.is_empty() {
        DEFAULT_MEDIA_TYPE.to_string()
    } else {
        media_type.to_string()
    };

    let decoded: Vec<u8> = percent_decode_str(payload).collect();
    let data = if is_base64 {
        let text: Vec<u8> = decoded
            .into_iter()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        STANDARD.decode(text).map_err(|_| malformed(url))?
    } else {
        decoded
    };

    Ok(DataUrlPayload {
        content_type,
        data: Bytes::from(data),
    })
}

fn malformed(url: &Url) -> FetchError {
    FetchError::Network(format!("malformed data: URL '{url}'"))
}
