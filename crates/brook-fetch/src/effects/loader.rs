//! The fetch dispatch state machine.
//!
//! One [`FetchLoader`] exists per in-flight request. `start` runs a fixed
//! decision ladder (CSP connect check, same-origin/`data:`/`about:` fast
//! path, mode checks, scheme check, preflight classification) and hands
//! the request to the transport; transport callbacks drive classification,
//! body construction, optional integrity gating and redirect following.
//!
//! Exactly one terminal result is ever delivered through the loader's
//! result channel: a [`FetchResponse`] or a [`FetchError`]. The channel's
//! consuming sender makes first-terminal-wins structural; later failures
//! only transition internal state.

use std::sync::{Arc, Mutex, MutexGuard};

use brook_stream::{BodyBuffer, ByteStream, StreamWriter};
use tokio::sync::oneshot;
use tracing::debug;
use url::Url;

use crate::core::{cors, data_url, tainting};
use crate::data::{
    FetchRequest, FetchResponse, RedirectMode, RequestMode, RequestPriority, ResponseHead,
    ResponseTainting, filtered_response,
};
use crate::effects::policy::Policy;
use crate::effects::transport::{
    DispatchOptions, Transport, TransportClient, TransportError, TransportErrorKind,
};
use crate::effects::verifier::{IntegrityVerifier, VerifierState};
use crate::error::{FetchError, Result};

const MAX_REDIRECTS: u32 = 20;

/// Observable loader states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    /// Created, not yet started.
    Idle,
    /// The request is in flight.
    Dispatched,
    /// A response arrived with integrity metadata; the verdict is pending.
    VerifyingIntegrity,
    /// Terminal success.
    Succeeded,
    /// Terminal failure (or disposal before completion).
    Failed,
}

struct Inner {
    request: FetchRequest,
    state: LoaderState,
    did_finish_loading: bool,
    /// Held back until the integrity verifier settles.
    pending_response: Option<FetchResponse>,
    result_tx: Option<oneshot::Sender<Result<FetchResponse>>>,
    follow_count: u32,
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl Inner {
    fn is_terminal(&self) -> bool {
        matches!(self.state, LoaderState::Succeeded | LoaderState::Failed)
    }
}

/// Per-request fetch orchestrator. Cheap to clone; clones share the same
/// in-flight request.
#[derive(Clone)]
pub struct FetchLoader {
    inner: Arc<Mutex<Inner>>,
    transport: Arc<Mutex<Box<dyn Transport>>>,
    policy: Arc<dyn Policy>,
}

enum DispatchAction {
    NetworkError(String),
    AboutFetch,
    DataFetch,
    Dispatch(DispatchOptions),
}

enum ResponseAction {
    Fail(FetchError),
    Resolve(FetchResponse),
    Redispatch(DispatchAction),
    DataFetchAt(Url),
    Verify {
        verifier: IntegrityVerifier,
        body: ByteStream,
        writer: StreamWriter,
    },
}

/// The pre-dispatch decision ladder. Exactly one action results.
fn decide(policy: &dyn Policy, request: &FetchRequest) -> DispatchAction {
    if !policy.allow_connect_to_source(&request.url) {
        return DispatchAction::NetworkError(format!(
            "refused to connect to '{}': blocked by connect-src policy",
            request.url
        ));
    }
    let scheme = request.url.scheme();
    let same_origin = policy.is_same_origin(&request.origin, &request.url.origin());
    if same_origin || scheme == "data" || scheme == "about" {
        return match scheme {
            "data" => DispatchAction::DataFetch,
            "about" => DispatchAction::AboutFetch,
            _ => DispatchAction::Dispatch(DispatchOptions::default()),
        };
    }
    if request.mode == RequestMode::SameOrigin {
        return DispatchAction::NetworkError(format!(
            "refused cross-origin request to '{}' in same-origin mode",
            request.url
        ));
    }
    if request.mode == RequestMode::NoCors {
        // Classification will taint the response opaque.
        return DispatchAction::Dispatch(DispatchOptions::default());
    }
    if !matches!(scheme, "http" | "https") {
        return DispatchAction::NetworkError(format!("unsupported URL scheme '{scheme}'"));
    }
    if request.mode == RequestMode::Navigate {
        return DispatchAction::NetworkError(
            "navigate mode is not supported for cross-origin requests".to_string(),
        );
    }
    let preflight =
        request.mode == RequestMode::CorsWithForcedPreflight || cors::needs_preflight(request);
    DispatchAction::Dispatch(DispatchOptions {
        cors_flag: true,
        preflight_flag: preflight,
    })
}

impl FetchLoader {
    /// Create a loader and the receiver its single terminal result arrives
    /// on. A receiver whose channel closes without a value observed a
    /// disposal.
    pub fn new(
        request: FetchRequest,
        transport: Box<dyn Transport>,
        policy: Arc<dyn Policy>,
    ) -> (Self, oneshot::Receiver<Result<FetchResponse>>) {
        let (result_tx, result_rx) = oneshot::channel();
        let loader = Self {
            inner: Arc::new(Mutex::new(Inner {
                request,
                state: LoaderState::Idle,
                did_finish_loading: false,
                pending_response: None,
                result_tx: Some(result_tx),
                follow_count: 0,
                detach: None,
            })),
            transport: Arc::new(Mutex::new(transport)),
            policy,
        };
        (loader, result_rx)
    }

    /// Current state.
    pub fn state(&self) -> LoaderState {
        self.lock_inner().state
    }

    /// Register a hook run once when the loader reaches a terminal state
    /// or is disposed; the owning manager uses this to drop its entry.
    pub fn set_detach_hook(&self, hook: Box<dyn FnOnce() + Send>) {
        self.lock_inner().detach = Some(hook);
    }

    /// Run the decision ladder and dispatch. Idempotent after the first
    /// call.
    pub fn start(&self) {
        let action = {
            let mut inner = self.lock_inner();
            if inner.state != LoaderState::Idle {
                return;
            }
            inner.state = LoaderState::Dispatched;
            decide(self.policy.as_ref(), &inner.request)
        };
        self.perform(action);
    }

    /// Update the priority hint on the in-flight request.
    pub fn set_priority(&self, priority: RequestPriority) {
        self.lock_inner().request.priority = priority;
        self.lock_transport().set_priority(priority);
    }

    /// Cancel the in-flight request and detach. Safe to call from within
    /// callbacks and at any point; a no-op after a terminal state.
    pub fn dispose(&self) {
        let (was_terminal, result_tx, detach) = {
            let mut inner = self.lock_inner();
            let was_terminal = inner.is_terminal();
            if !was_terminal {
                inner.state = LoaderState::Failed;
                inner.pending_response = None;
            }
            (was_terminal, inner.result_tx.take(), inner.detach.take())
        };
        if was_terminal {
            return;
        }
        debug!("loader disposed");
        self.lock_transport().cancel();
        // Dropping the sender closes the channel without a value.
        drop(result_tx);
        if let Some(detach) = detach {
            detach();
        }
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_transport(&self) -> MutexGuard<'_, Box<dyn Transport>> {
        self.transport.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn perform(&self, action: DispatchAction) {
        match action {
            DispatchAction::NetworkError(message) => self.fail(FetchError::Network(message)),
            DispatchAction::DataFetch => {
                let url = self.lock_inner().request.url.clone();
                self.perform_data_fetch(url);
            }
            DispatchAction::AboutFetch => self.perform_about_fetch(),
            DispatchAction::Dispatch(options) => self.dispatch(options),
        }
    }

    fn dispatch(&self, options: DispatchOptions) {
        let (request, priority) = {
            let inner = self.lock_inner();
            (inner.request.clone(), inner.request.priority)
        };
        debug!(
            url = %request.url,
            cors = options.cors_flag,
            preflight = options.preflight_flag,
            "dispatching request"
        );
        let client: Arc<dyn TransportClient> = Arc::new(LoaderClient {
            loader: self.clone(),
        });
        let mut transport = self.lock_transport();
        transport.set_priority(priority);
        transport.start(&request, options, client);
    }

    /// Decode a `data:` URL inline and feed it through the normal response
    /// path; the transport is never involved.
    fn perform_data_fetch(&self, url: Url) {
        match data_url::parse_data_url(&url) {
            Ok(payload) => {
                let head = ResponseHead::new(url, 200)
                    .header("content-type", payload.content_type.clone());
                self.handle_response(head, ByteStream::from_bytes(payload.data));
                self.handle_finished_loading();
            }
            Err(error) => self.fail(error),
        }
    }

    fn perform_about_fetch(&self) {
        let url = self.lock_inner().request.url.clone();
        if url.as_str() != "about:blank" {
            self.fail(FetchError::Network(format!(
                "unsupported about: URL '{url}'"
            )));
            return;
        }
        let head = ResponseHead::new(url, 200).header("content-type", "text/html;charset=utf-8");
        self.handle_response(head, ByteStream::empty());
        self.handle_finished_loading();
    }

    fn handle_response(&self, head: ResponseHead, body: ByteStream) {
        let action = {
            let mut inner = self.lock_inner();
            if inner.is_terminal() {
                return;
            }
            let same_origin = self
                .policy
                .is_same_origin(&inner.request.origin, &head.url.origin());
            match tainting::classify(&inner.request, same_origin, &head) {
                Err(error) => ResponseAction::Fail(error),
                Ok(ResponseTainting::OpaqueRedirect) => {
                    self.handle_redirect(&mut inner, head)
                }
                Ok(taint) => {
                    let metadata = inner.request.integrity_metadata.clone();
                    if metadata.is_empty() {
                        ResponseAction::Resolve(filtered_response(
                            head,
                            taint,
                            Some(BodyBuffer::new(body)),
                        ))
                    } else {
                        let (writer, placeholder) = ByteStream::channel();
                        inner.state = LoaderState::VerifyingIntegrity;
                        inner.pending_response = Some(filtered_response(
                            head,
                            taint,
                            Some(BodyBuffer::new(placeholder)),
                        ));
                        ResponseAction::Verify {
                            verifier: IntegrityVerifier::new(metadata),
                            body,
                            writer,
                        }
                    }
                }
            }
        };

        match action {
            ResponseAction::Fail(error) => self.fail(error),
            ResponseAction::Resolve(response) => self.resolve(response),
            ResponseAction::Redispatch(next) => self.perform(next),
            ResponseAction::DataFetchAt(url) => self.perform_data_fetch(url),
            ResponseAction::Verify {
                verifier,
                body,
                writer,
            } => {
                let loader = self.clone();
                tokio::spawn(async move {
                    let verdict = verifier.run(body, writer).await;
                    loader.handle_verification(verdict);
                });
            }
        }
    }

    /// Resolve a redirect response per the request's redirect mode. Runs
    /// under the inner lock.
    fn handle_redirect(&self, inner: &mut Inner, head: ResponseHead) -> ResponseAction {
        match inner.request.redirect {
            RedirectMode::Manual => ResponseAction::Resolve(filtered_response(
                head,
                ResponseTainting::OpaqueRedirect,
                None,
            )),
            RedirectMode::Error => ResponseAction::Fail(FetchError::RedirectCheck),
            RedirectMode::Follow => {
                inner.follow_count += 1;
                if inner.follow_count > MAX_REDIRECTS {
                    return ResponseAction::Fail(FetchError::RedirectCheck);
                }
                let location = match tainting::redirect_location(&head) {
                    Ok(Some(location)) => location,
                    // Classification only yields OpaqueRedirect for a
                    // single valid Location.
                    Ok(None) | Err(_) => {
                        return ResponseAction::Fail(FetchError::RedirectCheck);
                    }
                };
                debug!(hop = inner.follow_count, target = %location, "following redirect");
                if location.scheme() == "data" {
                    // The request URL is left unchanged so the data:
                    // response classifies as a redirect landing, not a
                    // direct data: fetch.
                    return if inner.request.mode == RequestMode::NoCors {
                        ResponseAction::DataFetchAt(location)
                    } else {
                        ResponseAction::Fail(FetchError::Network(
                            "redirects to data: URL are allowed only in no-cors mode".to_string(),
                        ))
                    };
                }
                if head.status == 303
                    || (matches!(head.status, 301 | 302) && inner.request.method == "POST")
                {
                    inner.request.method = "GET".to_string();
                }
                inner.request.url = location;
                ResponseAction::Redispatch(decide(self.policy.as_ref(), &inner.request))
            }
        }
    }

    fn handle_finished_loading(&self) {
        let finalize = {
            let mut inner = self.lock_inner();
            if inner.is_terminal() {
                return;
            }
            inner.did_finish_loading = true;
            if inner.state == LoaderState::VerifyingIntegrity {
                debug!("transport finished; integrity verdict pending");
                false
            } else {
                true
            }
        };
        if finalize {
            self.finalize_success();
        }
    }

    fn handle_verification(&self, verdict: VerifierState) {
        match verdict {
            VerifierState::Failed => self.fail(FetchError::Integrity),
            VerifierState::Verified => {
                let (response, finished) = {
                    let mut inner = self.lock_inner();
                    if inner.is_terminal() {
                        return;
                    }
                    inner.state = LoaderState::Dispatched;
                    (inner.pending_response.take(), inner.did_finish_loading)
                };
                if let Some(response) = response {
                    self.resolve(response);
                }
                if finished {
                    self.finalize_success();
                }
            }
        }
    }

    fn handle_transport_failure(&self, error: TransportError) {
        // Only internal-domain messages are safe to surface; cancellation
        // and timeout details stay redacted.
        let message = match error.kind {
            TransportErrorKind::Internal => error.message,
            _ => String::new(),
        };
        self.fail(FetchError::Transport(message));
    }

    fn resolve(&self, response: FetchResponse) {
        let result_tx = {
            let mut inner = self.lock_inner();
            if inner.is_terminal() {
                return;
            }
            inner.result_tx.take()
        };
        if let Some(tx) = result_tx {
            let _ = tx.send(Ok(response));
        }
    }

    fn finalize_success(&self) {
        let detach = {
            let mut inner = self.lock_inner();
            if inner.is_terminal() {
                return;
            }
            inner.state = LoaderState::Succeeded;
            inner.detach.take()
        };
        debug!("fetch succeeded");
        if let Some(detach) = detach {
            detach();
        }
    }

    fn fail(&self, error: FetchError) {
        let (result_tx, detach) = {
            let mut inner = self.lock_inner();
            if inner.is_terminal() {
                return;
            }
            inner.state = LoaderState::Failed;
            inner.pending_response = None;
            (inner.result_tx.take(), inner.detach.take())
        };
        debug!(%error, "fetch failed");
        if let Some(tx) = result_tx {
            let _ = tx.send(Err(error));
        }
        self.lock_transport().cancel();
        if let Some(detach) = detach {
            detach();
        }
    }
}

struct LoaderClient {
    loader: FetchLoader,
}

impl TransportClient for LoaderClient {
    fn on_response_received(&self, head: ResponseHead, body: ByteStream) {
        self.loader.handle_response(head, body);
    }

    fn on_finished_loading(&self) {
        self.loader.handle_finished_loading();
    }

    fn on_failed(&self, error: TransportError) {
        self.loader.handle_transport_failure(error);
    }

    fn on_failed_access_control_check(&self, message: String) {
        self.loader.fail(FetchError::AccessControl(message));
    }

    fn on_failed_redirect_check(&self) {
        self.loader.fail(FetchError::RedirectCheck);
    }
}
