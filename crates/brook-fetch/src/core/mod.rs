//! Pure transformations: no I/O, no shared state.

pub use cors::{is_simple_header, is_simple_method, needs_preflight};
pub use data_url::{DataUrlPayload, parse_data_url};
pub use integrity::{IntegrityAlgorithm, IntegrityDigest, check_integrity, parse_metadata};
pub use tainting::{classify, is_redirect_status, redirect_location};

pub mod cors;
pub mod data_url;
pub mod integrity;
pub mod tainting;
