//! The security policy seam.

use url::{Origin, Url};

/// Security decisions the loader delegates to its embedder.
pub trait Policy: Send + Sync {
    /// CSP connect-source check, consulted before any dispatch.
    fn allow_connect_to_source(&self, _url: &Url) -> bool {
        true
    }

    /// Same-origin comparison.
    fn is_same_origin(&self, a: &Origin, b: &Origin) -> bool {
        a == b
    }
}

/// A policy that allows everything and compares origins structurally.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissivePolicy;

impl Policy for PermissivePolicy {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permissive_policy_defaults() {
        let policy = PermissivePolicy;
        let a = Url::parse("https://example.com/a").unwrap().origin();
        let b = Url::parse("https://example.com/b").unwrap().origin();
        let c = Url::parse("https://other.example/").unwrap().origin();
        assert!(policy.is_same_origin(&a, &b));
        assert!(!policy.is_same_origin(&a, &c));
        assert!(policy.allow_connect_to_source(&Url::parse("https://anywhere.example/").unwrap()));
    }
}
