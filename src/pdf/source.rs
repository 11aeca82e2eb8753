//! Document sources and loading tasks

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use flume::{Sender, WeakSender};
use serde_json::Value;

use super::request::ViewerError;

/// Raw document bytes or a location to fetch them from
#[derive(Clone)]
pub enum DocumentSource {
    Url(String),
    Data(Arc<[u8]>),
}

impl fmt::Debug for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => f.debug_tuple("Url").field(url).finish(),
            Self::Data(data) => write!(f, "Data({} bytes)", data.len()),
        }
    }
}

/// What the host hands to `load_document`
#[derive(Clone, Debug)]
pub enum Source {
    Url(String),
    Bytes(Arc<[u8]>),
    /// A task the host created (and may observe) itself
    Task(LoadingTask),
}

impl Source {
    /// Convert a dynamic host property into a source.
    ///
    /// `null` and `""` mean "no document". Strings are URLs, arrays are byte
    /// buffers, objects are loading-task descriptors (`url` or `data` plus
    /// optional `withCredentials`, `httpHeaders`, `password`). Everything else
    /// is rejected with [`ViewerError::InvalidInput`].
    pub fn from_value(value: &Value) -> Result<Option<Self>, ViewerError> {
        match value {
            Value::Null => Ok(None),
            Value::String(s) if s.is_empty() => Ok(None),
            Value::String(s) => Ok(Some(Self::Url(s.clone()))),
            Value::Array(items) => Ok(Some(Self::Bytes(bytes_from_array(items)?))),
            Value::Object(map) => {
                let source = match (map.get("url"), map.get("data")) {
                    (Some(Value::String(url)), None) => DocumentSource::Url(url.clone()),
                    (None, Some(Value::Array(items))) => {
                        DocumentSource::Data(bytes_from_array(items)?)
                    }
                    _ => {
                        return Err(ViewerError::invalid_input(
                            "source object needs exactly one of `url` (string) or `data` (byte array)",
                        ));
                    }
                };

                let mut options = LoadOptions::default();
                match map.get("withCredentials") {
                    None => {}
                    Some(Value::Bool(flag)) => options.with_credentials = *flag,
                    Some(other) => {
                        return Err(ViewerError::invalid_input(format!(
                            "withCredentials must be a boolean, got {other}"
                        )));
                    }
                }
                match map.get("httpHeaders") {
                    None => {}
                    Some(Value::Object(headers)) => {
                        for (name, value) in headers {
                            let Value::String(value) = value else {
                                return Err(ViewerError::invalid_input(format!(
                                    "header {name} must be a string"
                                )));
                            };
                            options.http_headers.insert(name.clone(), value.clone());
                        }
                    }
                    Some(_) => {
                        return Err(ViewerError::invalid_input("httpHeaders must be an object"));
                    }
                }
                match map.get("password") {
                    None => {}
                    Some(Value::String(pw)) => options.password = Some(pw.clone()),
                    Some(_) => {
                        return Err(ViewerError::invalid_input("password must be a string"));
                    }
                }

                Ok(Some(Self::Task(create_loading_task(source, options))))
            }
            Value::Number(n) => Err(ViewerError::invalid_input(format!(
                "invalid src type: number {n}"
            ))),
            Value::Bool(b) => Err(ViewerError::invalid_input(format!(
                "invalid src type: boolean {b}"
            ))),
        }
    }
}

impl From<&str> for Source {
    fn from(url: &str) -> Self {
        Self::Url(url.to_string())
    }
}

impl From<Vec<u8>> for Source {
    fn from(data: Vec<u8>) -> Self {
        Self::Bytes(data.into())
    }
}

impl From<LoadingTask> for Source {
    fn from(task: LoadingTask) -> Self {
        Self::Task(task)
    }
}

fn bytes_from_array(items: &[Value]) -> Result<Arc<[u8]>, ViewerError> {
    items
        .iter()
        .map(|item| {
            item.as_u64()
                .and_then(|b| u8::try_from(b).ok())
                .ok_or_else(|| ViewerError::invalid_input(format!("{item} is not a byte")))
        })
        .collect()
}

/// Fetch options carried by a loading task
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadOptions {
    pub with_credentials: bool,
    pub http_headers: BTreeMap<String, String>,
    pub password: Option<String>,
}

/// Why the engine is asking for a password
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PasswordReason {
    NeedPassword,
    IncorrectPassword,
}

impl PasswordReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            PasswordReason::NeedPassword => "NEED_PASSWORD",
            PasswordReason::IncorrectPassword => "INCORRECT_PASSWORD",
        }
    }
}

/// Answers a pending password request. Dropping every copy without answering
/// fails the load.
#[derive(Clone)]
pub struct PasswordResponder(Sender<Option<String>>);

impl PasswordResponder {
    /// Returns false if the load no longer waits for an answer
    pub fn respond(&self, password: impl Into<String>) -> bool {
        self.0.try_send(Some(password.into())).is_ok()
    }
}

/// Lets a session give up on password prompts nobody answers.
///
/// Holds only a weak handle on the prompt, so dropped responders still fail
/// the request.
#[derive(Clone, Default)]
pub(crate) struct PromptGate(Arc<Mutex<GateState>>);

#[derive(Default)]
struct GateState {
    closed: bool,
    waiting: Option<WeakSender<Option<String>>>,
}

impl PromptGate {
    /// Abandon the prompt waiting right now, if any
    pub(crate) fn abandon(&self) {
        Self::give_up(&mut self.lock());
    }

    /// Abandon the current prompt and refuse every later one
    pub(crate) fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        Self::give_up(&mut state);
    }

    fn give_up(state: &mut GateState) {
        if let Some(tx) = state.waiting.take().and_then(|weak| weak.upgrade()) {
            let _ = tx.try_send(None);
        }
    }

    /// Register a prompt; false once the gate is closed
    fn enter(&self, tx: &Sender<Option<String>>) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        state.waiting = Some(tx.downgrade());
        true
    }

    fn leave(&self) {
        self.lock().waiting = None;
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for PasswordResponder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordResponder")
    }
}

pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;
pub type PasswordCallback = Arc<dyn Fn(PasswordResponder, PasswordReason) + Send + Sync>;

/// An in-progress document fetch/parse request
#[derive(Clone)]
pub struct LoadingTask {
    source: DocumentSource,
    options: LoadOptions,
    destroyed: Arc<AtomicBool>,
    on_progress: Option<ProgressCallback>,
    on_password: Option<PasswordCallback>,
    gate: Option<PromptGate>,
}

/// Build a loading task for a URL or byte buffer
#[must_use]
pub fn create_loading_task(source: DocumentSource, options: LoadOptions) -> LoadingTask {
    LoadingTask {
        source,
        options,
        destroyed: Arc::new(AtomicBool::new(false)),
        on_progress: None,
        on_password: None,
        gate: None,
    }
}

impl LoadingTask {
    #[must_use]
    pub fn on_progress(mut self, callback: impl Fn(f64) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    #[must_use]
    pub fn on_password(
        mut self,
        callback: impl Fn(PasswordResponder, PasswordReason) + Send + Sync + 'static,
    ) -> Self {
        self.on_password = Some(Arc::new(callback));
        self
    }

    /// Install callbacks for whichever of progress and password the host left
    /// unset
    pub(crate) fn with_fallback_callbacks(
        mut self,
        progress: ProgressCallback,
        password: PasswordCallback,
    ) -> Self {
        self.on_progress.get_or_insert(progress);
        self.on_password.get_or_insert(password);
        self
    }

    pub(crate) fn gated(mut self, gate: PromptGate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn source(&self) -> &DocumentSource {
        &self.source
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    pub fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Forward a progress report as a ratio clamped to `0..=1`.
    /// Reports with an unknown total are dropped.
    pub fn report_progress(&self, loaded: u64, total: u64) {
        if total == 0 {
            return;
        }
        if let Some(callback) = &self.on_progress {
            callback((loaded as f64 / total as f64).min(1.0));
        }
    }

    /// Ask the host for a password, blocking until it answers.
    ///
    /// Returns `None` when no password handler is attached, every responder
    /// was dropped unanswered, or the owning session gave up on the prompt.
    pub fn request_password(&self, reason: PasswordReason) -> Option<String> {
        let callback = self.on_password.as_ref()?;
        let (tx, rx) = flume::bounded(1);
        if let Some(gate) = &self.gate {
            if !gate.enter(&tx) {
                return None;
            }
        }

        callback(PasswordResponder(tx), reason);
        let answer = rx.recv().ok().flatten();

        if let Some(gate) = &self.gate {
            gate.leave();
        }
        answer
    }
}

impl fmt::Debug for LoadingTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadingTask")
            .field("source", &self.source)
            .field("options", &self.options)
            .field("destroyed", &self.is_destroyed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    #[test]
    fn empty_values_mean_no_document() {
        assert!(Source::from_value(&Value::Null).unwrap().is_none());
        assert!(Source::from_value(&json!("")).unwrap().is_none());
    }

    #[test]
    fn numbers_and_booleans_are_rejected() {
        for value in [json!(42), json!(0), json!(true), json!(false)] {
            let err = Source::from_value(&value).unwrap_err();
            assert!(matches!(err, ViewerError::InvalidInput { .. }), "{value}");
        }
    }

    #[test]
    fn strings_become_urls_and_arrays_become_bytes() {
        match Source::from_value(&json!("https://example.org/a.pdf")).unwrap() {
            Some(Source::Url(url)) => assert_eq!(url, "https://example.org/a.pdf"),
            other => panic!("unexpected {other:?}"),
        }
        match Source::from_value(&json!([37, 80, 68, 70])).unwrap() {
            Some(Source::Bytes(bytes)) => assert_eq!(&*bytes, b"%PDF"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(Source::from_value(&json!([1, 300])).is_err());
    }

    #[test]
    fn descriptor_objects_become_tasks_with_options() {
        let value = json!({
            "url": "doc.pdf",
            "withCredentials": true,
            "httpHeaders": { "Authorization": "Bearer x" },
            "password": "secret",
        });
        let Some(Source::Task(task)) = Source::from_value(&value).unwrap() else {
            panic!("expected task");
        };
        assert!(matches!(task.source(), DocumentSource::Url(u) if u == "doc.pdf"));
        assert!(task.options().with_credentials);
        assert_eq!(task.options().password.as_deref(), Some("secret"));
        assert_eq!(
            task.options().http_headers.get("Authorization").map(String::as_str),
            Some("Bearer x")
        );

        assert!(Source::from_value(&json!({ "withCredentials": true })).is_err());
    }

    #[test]
    fn progress_is_clamped_and_unknown_totals_skipped() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let task = create_loading_task(DocumentSource::Url("x".into()), LoadOptions::default())
            .on_progress(move |ratio| sink.lock().unwrap().push(ratio));

        task.report_progress(50, 100);
        task.report_progress(10, 0);
        task.report_progress(150, 100);

        assert_eq!(*seen.lock().unwrap(), vec![0.5, 1.0]);
    }

    #[test]
    fn password_round_trip() {
        let task = create_loading_task(DocumentSource::Url("x".into()), LoadOptions::default())
            .on_password(|responder, reason| {
                assert_eq!(reason, PasswordReason::NeedPassword);
                assert!(responder.respond("hunter2"));
            });

        assert_eq!(
            task.request_password(PasswordReason::NeedPassword).as_deref(),
            Some("hunter2")
        );
    }

    #[test]
    fn dropped_responder_fails_password_request() {
        let task = create_loading_task(DocumentSource::Url("x".into()), LoadOptions::default())
            .on_password(|_responder, _reason| {});
        assert!(task.request_password(PasswordReason::IncorrectPassword).is_none());

        let bare = create_loading_task(DocumentSource::Url("x".into()), LoadOptions::default());
        assert!(bare.request_password(PasswordReason::NeedPassword).is_none());
    }

    #[test]
    fn abandoned_prompt_unblocks_request() {
        let gate = PromptGate::default();
        let held = Arc::new(Mutex::new(Vec::new()));
        let keep = held.clone();
        let abandon = gate.clone();
        let task = create_loading_task(DocumentSource::Url("x".into()), LoadOptions::default())
            .on_password(move |responder, _reason| {
                keep.lock().unwrap().push(responder);
                abandon.abandon();
            })
            .gated(gate.clone());

        assert!(task.request_password(PasswordReason::NeedPassword).is_none());
        assert!(!held.lock().unwrap()[0].respond("late"));

        // abandoning is not sticky
        let answered = create_loading_task(DocumentSource::Url("x".into()), LoadOptions::default())
            .on_password(|responder, _reason| {
                responder.respond("hunter2");
            })
            .gated(gate);
        assert_eq!(
            answered.request_password(PasswordReason::NeedPassword).as_deref(),
            Some("hunter2")
        );
    }

    #[test]
    fn closed_gate_refuses_prompts() {
        let gate = PromptGate::default();
        gate.close();
        let task = create_loading_task(DocumentSource::Url("x".into()), LoadOptions::default())
            .on_password(|_responder, _reason| panic!("prompt after close"))
            .gated(gate);
        assert!(task.request_password(PasswordReason::NeedPassword).is_none());
    }

    #[test]
    fn destroy_marks_all_clones() {
        let task = create_loading_task(DocumentSource::Data(Arc::from(&b"x"[..])), LoadOptions::default());
        let clone = task.clone();
        task.destroy();
        assert!(clone.is_destroyed());
    }
}
