//! Connection state machine: dispatch, connectivity tracking, retry.
//!
//! # Design
//! A `Connection` is a cheap cloneable handle over shared state. Issuing
//! a dispatch spawns a task on the ambient tokio runtime and returns
//! immediately; completion is delivered through the response handler and
//! observer callbacks. The mutex guarding the mutable state (default
//! parameters, connectivity flag, pending slot) is never held across an
//! await, so all observable mutation is serialized.
//!
//! On transport failure the engine parks the request in a single pending
//! slot and schedules a timer task that re-issues the identical dispatch
//! after a fixed delay. Retries are unbounded, the delay never grows,
//! and a scheduled retry cannot be cancelled. The host can also call
//! [`Connection::resume_pending`] when it knows connectivity is back;
//! that path re-merges the current default parameters into the parked
//! request body before re-dispatching, so a token that changed while the
//! request was stalled is honored on the wire.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::body;
use crate::error::ErrorKind;
use crate::http::{HttpMethod, RequestDescriptor, Transport};
use crate::observer::ConnectionObserver;
use crate::response;

/// Delay between a transport failure and the automatic re-dispatch.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Parameter name carrying the image count on upload requests.
pub const IMAGE_COUNT_PARAM: &str = "image_count";

/// Default name prefix for uploaded image fields (`image1`, `image2`, …).
pub const DEFAULT_IMAGE_PREFIX: &str = "image";

/// Callback receiving the raw response bytes of a successful exchange.
///
/// Shared (`Arc`) so the engine can park it for retry and re-invoke the
/// very same handler on each attempt.
pub type ResponseHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// One outstanding request together with its response handler.
///
/// Created transiently for every dispatch; stored in the connection's
/// single pending slot when the transport fails, and cleared when a
/// retry succeeds or the host resumes it.
#[derive(Clone)]
pub struct PendingProcess {
    descriptor: RequestDescriptor,
    handler: ResponseHandler,
}

impl PendingProcess {
    fn new(descriptor: RequestDescriptor, handler: ResponseHandler) -> Self {
        Self {
            descriptor,
            handler,
        }
    }

    pub fn descriptor(&self) -> &RequestDescriptor {
        &self.descriptor
    }
}

impl fmt::Debug for PendingProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingProcess")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

struct State {
    defaults: HashMap<String, String>,
    observer: Option<Arc<dyn ConnectionObserver>>,
    connectivity_lost: bool,
    pending: Option<PendingProcess>,
    retry_delay: Duration,
}

struct Inner {
    root: String,
    transport: Arc<dyn Transport>,
    state: Mutex<State>,
}

/// Handle to one logical client configuration: a root endpoint, default
/// parameters, connectivity state, and at most one pending request.
///
/// Clones share the same underlying state. Dispatch methods must be
/// called from within a tokio runtime.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    pub fn new(root: &str, transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(Inner {
                root: root.trim_end_matches('/').to_string(),
                transport,
                state: Mutex::new(State {
                    defaults: HashMap::new(),
                    observer: None,
                    connectivity_lost: false,
                    pending: None,
                    retry_delay: DEFAULT_RETRY_DELAY,
                }),
            }),
        }
    }

    pub fn root(&self) -> &str {
        &self.inner.root
    }

    pub fn set_observer(&self, observer: Arc<dyn ConnectionObserver>) {
        self.lock_state().observer = Some(observer);
    }

    pub fn clear_observer(&self) {
        self.lock_state().observer = None;
    }

    pub fn set_default_param(&self, key: &str, value: &str) {
        self.lock_state()
            .defaults
            .insert(key.to_string(), value.to_string());
    }

    pub fn remove_default_param(&self, key: &str) {
        self.lock_state().defaults.remove(key);
    }

    /// Snapshot of the current default parameters.
    pub fn default_params(&self) -> HashMap<String, String> {
        self.lock_state().defaults.clone()
    }

    /// Whether the most recent completed dispatch ended in a transport
    /// failure.
    pub fn connectivity_lost(&self) -> bool {
        self.lock_state().connectivity_lost
    }

    /// Whether a request is parked awaiting retry.
    pub fn has_pending(&self) -> bool {
        self.lock_state().pending.is_some()
    }

    pub fn set_retry_delay(&self, delay: Duration) {
        self.lock_state().retry_delay = delay;
    }

    // --- request building ---

    /// Build an ordinary form POST: the url-encoded default parameters,
    /// joined with `&` to the raw `extra` string when both are
    /// non-empty.
    pub fn build_post(&self, target: &str, extra: Option<&str>) -> RequestDescriptor {
        let encoded = body::encode_form(&self.lock_state().defaults);
        let joined = match extra {
            Some(extra) if !extra.is_empty() && !encoded.is_empty() => {
                format!("{encoded}&{extra}")
            }
            Some(extra) if !extra.is_empty() => extra.to_string(),
            _ => encoded,
        };
        self.form_descriptor(target, joined.into_bytes(), body::FORM_CONTENT_TYPE.to_string())
    }

    /// Build an upload POST carrying the images base64-inline: each
    /// payload is base64-encoded (76-char CRLF lines) under
    /// `{prefix}{i}`, an `image_count` parameter is added, defaults are
    /// merged in (caller-supplied values win), and the whole set is
    /// url-encoded like an ordinary form request.
    pub fn build_base64_upload(
        &self,
        target: &str,
        params: &HashMap<String, String>,
        images: &[Vec<u8>],
        name_prefix: Option<&str>,
    ) -> RequestDescriptor {
        let prefix = name_prefix.unwrap_or(DEFAULT_IMAGE_PREFIX);
        let mut merged = self.merged_upload_params(params, images.len());
        for (i, image) in images.iter().enumerate() {
            merged.insert(
                format!("{prefix}{}", i + 1),
                body::encode_base64_wrapped(image),
            );
        }
        let encoded = body::encode_form(&merged);
        self.form_descriptor(target, encoded.into_bytes(), body::FORM_CONTENT_TYPE.to_string())
    }

    /// Build an upload POST as `multipart/form-data` with a fresh
    /// random boundary: parameter parts first, then one file part per
    /// image (`{prefix}{i}` / `file{i}.jpg`), then the closing marker.
    pub fn build_multipart_upload(
        &self,
        target: &str,
        params: &HashMap<String, String>,
        images: &[Vec<u8>],
        name_prefix: Option<&str>,
    ) -> RequestDescriptor {
        let prefix = name_prefix.unwrap_or(DEFAULT_IMAGE_PREFIX);
        let merged = self.merged_upload_params(params, images.len());
        let boundary = body::multipart_boundary();
        let bytes = body::encode_multipart(&boundary, &merged, images, prefix);
        let content_type = format!("multipart/form-data; boundary={boundary}");
        self.form_descriptor(target, bytes, content_type)
    }

    /// Defaults merged under the caller's parameters (caller wins), with
    /// `image_count` always set.
    fn merged_upload_params(
        &self,
        params: &HashMap<String, String>,
        image_count: usize,
    ) -> HashMap<String, String> {
        let defaults = self.lock_state().defaults.clone();
        let mut merged = body::merge_params(&defaults, params);
        merged.insert(IMAGE_COUNT_PARAM.to_string(), image_count.to_string());
        merged
    }

    fn form_descriptor(
        &self,
        target: &str,
        bytes: Vec<u8>,
        content_type: String,
    ) -> RequestDescriptor {
        RequestDescriptor {
            target: self.resolve_target(target),
            method: HttpMethod::Post,
            headers: vec![
                ("Content-Type".to_string(), content_type),
                ("Content-Length".to_string(), bytes.len().to_string()),
            ],
            body: bytes,
        }
    }

    /// Absolute targets pass through; paths are joined to the root.
    fn resolve_target(&self, target: &str) -> String {
        if target.starts_with("http://") || target.starts_with("https://") {
            target.to_string()
        } else {
            format!("{}/{}", self.inner.root, target.trim_start_matches('/'))
        }
    }

    // --- dispatch ---

    /// Issue a request. Returns immediately; the handler receives the
    /// raw response bytes once a send succeeds and the observer accepts
    /// the response. Transport failures are retried indefinitely at the
    /// configured delay and never reach the handler.
    pub fn dispatch(&self, descriptor: RequestDescriptor, handler: ResponseHandler) {
        self.dispatch_process(PendingProcess::new(descriptor, handler));
    }

    /// Dispatch and decode the response as a string map. On a shape
    /// mismatch the observer receives
    /// [`ErrorKind::InvalidJson`](crate::error::ErrorKind) and the
    /// handler is not invoked; decode failures are terminal.
    pub fn dispatch_expecting_map<F>(&self, descriptor: RequestDescriptor, handler: F)
    where
        F: Fn(HashMap<String, String>) + Send + Sync + 'static,
    {
        let conn = self.clone();
        let raw: ResponseHandler = Arc::new(move |bytes: &[u8]| {
            match response::decode_string_map(bytes) {
                Ok(map) => handler(map),
                Err(kind) => conn.report_error(kind),
            }
        });
        self.dispatch(descriptor, raw);
    }

    /// Dispatch and decode the response as an array of string maps.
    /// Failure reporting matches [`Connection::dispatch_expecting_map`].
    pub fn dispatch_expecting_map_array<F>(&self, descriptor: RequestDescriptor, handler: F)
    where
        F: Fn(Vec<HashMap<String, String>>) + Send + Sync + 'static,
    {
        let conn = self.clone();
        let raw: ResponseHandler = Arc::new(move |bytes: &[u8]| {
            match response::decode_string_map_array(bytes) {
                Ok(maps) => handler(maps),
                Err(kind) => conn.report_error(kind),
            }
        });
        self.dispatch(descriptor, raw);
    }

    /// Re-dispatch the parked request, if any, with the current default
    /// parameters merged into its form body (current defaults win).
    /// Multipart bodies are replayed verbatim. Call this when the host
    /// determines connectivity has been reestablished externally.
    pub fn resume_pending(&self) {
        let taken = self.lock_state().pending.take();
        let Some(mut process) = taken else {
            return;
        };
        tracing::debug!(endpoint = %process.descriptor.target, "resuming pending request");
        if process.descriptor.header("Content-Type") == Some(body::FORM_CONTENT_TYPE) {
            let existing = body::decode_form(
                std::str::from_utf8(&process.descriptor.body).unwrap_or_default(),
            );
            let refreshed = body::merge_params(&existing, &self.lock_state().defaults);
            let encoded = body::encode_form(&refreshed);
            process
                .descriptor
                .set_header("Content-Length", encoded.len().to_string());
            process.descriptor.body = encoded.into_bytes();
        }
        self.dispatch_process(process);
    }

    fn dispatch_process(&self, process: PendingProcess) {
        let conn = self.clone();
        tokio::spawn(async move {
            conn.attempt(process).await;
        });
    }

    async fn attempt(&self, process: PendingProcess) {
        let observer = self.observer();
        if let Some(obs) = &observer {
            obs.loading_started();
        }
        tracing::debug!(endpoint = %process.descriptor.target, "dispatching request");

        let outcome = self
            .inner
            .transport
            .send(process.descriptor.clone())
            .await;

        // Stopped-loading always fires before the outcome is
        // interpreted.
        if let Some(obs) = &observer {
            obs.loading_stopped();
        }

        match outcome {
            Err(err) => {
                tracing::debug!(error = %err, "transport failure, scheduling retry");
                self.transition_connectivity(true);
                self.lock_state().pending = Some(process.clone());
                self.schedule_retry(process);
            }
            Ok(bytes) => {
                self.lock_state().pending = None;
                self.transition_connectivity(false);
                let valid = observer
                    .as_ref()
                    .map_or(true, |obs| obs.response_is_valid(&bytes, &process));
                if valid {
                    (process.handler)(&bytes);
                } else {
                    // Terminal and deliberately unreported.
                    tracing::debug!("response rejected by observer");
                }
            }
        }
    }

    fn schedule_retry(&self, process: PendingProcess) {
        let conn = self.clone();
        let delay = self.lock_state().retry_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            conn.dispatch_process(process);
        });
    }

    /// Flip the connectivity flag and notify the observer, but only on
    /// an actual transition.
    fn transition_connectivity(&self, lost: bool) {
        let changed = {
            let mut state = self.lock_state();
            if state.connectivity_lost == lost {
                false
            } else {
                state.connectivity_lost = lost;
                true
            }
        };
        if changed {
            tracing::debug!(lost, "connectivity transition");
            if let Some(obs) = self.observer() {
                if lost {
                    obs.connection_lost();
                } else {
                    obs.connection_regained();
                }
            }
        }
    }

    fn report_error(&self, kind: ErrorKind) {
        tracing::debug!(%kind, "response unusable");
        if let Some(obs) = self.observer() {
            obs.error_encountered(kind);
        }
    }

    fn observer(&self) -> Option<Arc<dyn ConnectionObserver>> {
        self.lock_state().observer.clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        // Recover from poisoning; state stays consistent because every
        // critical section is a plain field update.
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock_state();
        f.debug_struct("Connection")
            .field("root", &self.inner.root)
            .field("connectivity_lost", &state.connectivity_lost)
            .field("has_pending", &state.pending.is_some())
            .finish_non_exhaustive()
    }
}

// --- process-wide shared instance ---

static SHARED: Mutex<Option<Connection>> = Mutex::new(None);

fn lock_shared() -> MutexGuard<'static, Option<Connection>> {
    SHARED.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Install the process-wide shared connection. Callers own the
/// lifecycle: nothing installs or tears this down implicitly.
pub fn set_shared(connection: Connection) {
    *lock_shared() = Some(connection);
}

/// Handle to the process-wide shared connection, if one is installed.
pub fn shared() -> Option<Connection> {
    lock_shared().clone()
}

/// Tear down the process-wide shared connection.
pub fn clear_shared() {
    *lock_shared() = None;
}
