//! Fetch request configuration.

use url::{Origin, Url};

/// How the fetch treats cross-origin targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// Only same-origin targets are allowed.
    SameOrigin,
    /// Cross-origin targets are allowed but the response is opaque.
    #[default]
    NoCors,
    /// Cross-origin targets go through the CORS protocol.
    Cors,
    /// CORS, with a preflight even for simple requests.
    CorsWithForcedPreflight,
    /// Navigation fetches. Not dispatchable cross-origin at this layer.
    Navigate,
}

impl RequestMode {
    /// The string representation of this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestMode::SameOrigin => "same-origin",
            RequestMode::NoCors => "no-cors",
            RequestMode::Cors => "cors",
            RequestMode::CorsWithForcedPreflight => "cors-with-forced-preflight",
            RequestMode::Navigate => "navigate",
        }
    }
}

/// Whether credentials accompany the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialsMode {
    #[default]
    Omit,
    SameOrigin,
    Include,
    Password,
}

/// How redirect responses are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RedirectMode {
    /// The loader follows the redirect, re-dispatching per hop.
    #[default]
    Follow,
    /// Any redirect is a failure.
    Error,
    /// The redirect is surfaced as an opaque-redirect response.
    Manual,
}

/// Priority hint passed through to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestPriority {
    Low,
    #[default]
    Normal,
    High,
}

/// An in-flight fetch request.
///
/// # Examples
///
/// ```
/// use brook_fetch::data::{FetchRequest, RequestMode};
/// use url::Url;
///
/// let url = Url::parse("https://example.com/data.json").unwrap();
/// let request = FetchRequest::new(url)
///     .mode(RequestMode::Cors)
///     .header("accept", "application/json");
/// ```
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Target URL.
    pub url: Url,

    /// HTTP method, uppercase.
    pub method: String,

    /// Request headers, in insertion order.
    pub headers: Vec<(String, String)>,

    /// The requestor's origin. Defaults to the target URL's own origin.
    pub origin: Origin,

    /// Cross-origin behavior.
    pub mode: RequestMode,

    /// Credentials behavior. Recorded for the transport; the loader does
    /// not interpret it.
    pub credentials: CredentialsMode,

    /// Redirect behavior.
    pub redirect: RedirectMode,

    /// Subresource-integrity metadata. Empty means no integrity gating.
    pub integrity_metadata: String,

    /// Priority hint for the transport.
    pub priority: RequestPriority,
}

impl FetchRequest {
    /// Create a GET request for `url`, originated from `url`'s own origin.
    pub fn new(url: Url) -> Self {
        let origin = url.origin();
        Self {
            url,
            method: "GET".to_string(),
            headers: Vec::new(),
            origin,
            mode: RequestMode::default(),
            credentials: CredentialsMode::default(),
            redirect: RedirectMode::default(),
            integrity_metadata: String::new(),
            priority: RequestPriority::default(),
        }
    }

    /// Set the HTTP method.
    #[must_use]
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into().to_ascii_uppercase();
        self
    }

    /// Add a request header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the requestor's origin.
    #[must_use]
    pub fn origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    /// Set the request mode.
    #[must_use]
    pub fn mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the credentials mode.
    #[must_use]
    pub fn credentials(mut self, credentials: CredentialsMode) -> Self {
        self.credentials = credentials;
        self
    }

    /// Set the redirect mode.
    #[must_use]
    pub fn redirect(mut self, redirect: RedirectMode) -> Self {
        self.redirect = redirect;
        self
    }

    /// Set the integrity metadata string.
    #[must_use]
    pub fn integrity(mut self, metadata: impl Into<String>) -> Self {
        self.integrity_metadata = metadata.into();
        self
    }

    /// Set the priority hint.
    #[must_use]
    pub fn priority(mut self, priority: RequestPriority) -> Self {
        self.priority = priority;
        self
    }
}
