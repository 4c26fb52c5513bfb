//! The interaction controller.
//!
//! `Session` owns the transcript, the document snapshot and the busy flags,
//! and is their only writer. Network work runs on spawned tasks which report
//! back as `SessionEvent`s; the owner feeds those into `apply` from its own
//! loop, so state only ever changes on one flow.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{error, info, warn};

use crate::documents::DocumentRegistry;
use crate::error::{LexoraError, Result};
use crate::gateway::Gateway;
use crate::stream::{channel_sink, run_answer_stream, StreamEvent, STREAM_ERROR_TEXT};
use crate::transcript::{ChatRole, MessageId, Transcript};

/// First assistant message of every session.
pub const GREETING: &str = "Hello! I'm Lexora. Upload a document and ask me anything about it.";

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Fail an answer stream after this long without a chunk. `None` waits forever.
    pub stream_idle_timeout: Option<Duration>,
    pub greeting: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            stream_idle_timeout: None,
            greeting: true,
        }
    }
}

/// How an upload or delete went. A listing is only fetched once the
/// backend has accepted the change.
#[derive(Debug)]
pub enum ChangeOutcome {
    Rejected(LexoraError),
    /// Accepted, with the listing fetched afterwards.
    Applied(Result<Vec<String>>),
}

/// Completion reports from background tasks.
#[derive(Debug)]
pub enum SessionEvent {
    Stream(StreamEvent),
    DocumentsListed(Result<Vec<String>>),
    Uploaded { path: PathBuf, outcome: ChangeOutcome },
    Deleted { name: String, outcome: ChangeOutcome },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Started { user: MessageId, assistant: MessageId },
    /// Blank or whitespace-only input.
    EmptyInput,
    /// An answer is still streaming.
    Busy,
}

pub struct Session {
    gateway: Arc<dyn Gateway>,
    options: SessionOptions,
    events: UnboundedSender<SessionEvent>,

    transcript: Transcript,
    documents: DocumentRegistry,

    open_answer: Option<MessageId>,
    uploading: Option<PathBuf>,
    deleting: HashSet<String>,
    last_error: Option<String>,
}

impl Session {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        options: SessionOptions,
    ) -> (Self, UnboundedReceiver<SessionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();

        let mut transcript = Transcript::new();
        if options.greeting {
            transcript.push(ChatRole::Assistant, GREETING);
        }

        let session = Self {
            gateway,
            options,
            events,
            transcript,
            documents: DocumentRegistry::new(),
            open_answer: None,
            uploading: None,
            deleting: HashSet::new(),
            last_error: None,
        };
        (session, rx)
    }

    /// Ask a question. The user message is kept whatever happens to the
    /// answer; only the assistant placeholder reflects failure.
    pub fn send(&mut self, input: &str) -> SendOutcome {
        if input.trim().is_empty() {
            return SendOutcome::EmptyInput;
        }
        if self.open_answer.is_some() {
            return SendOutcome::Busy;
        }

        let user = self.transcript.push(ChatRole::User, input);
        let assistant = self.transcript.push(ChatRole::Assistant, "");
        self.open_answer = Some(assistant);
        info!(%user, %assistant, chars = input.chars().count(), "question sent");

        let gateway = self.gateway.clone();
        let question = input.to_string();
        let idle_timeout = self.options.stream_idle_timeout;
        let sink = channel_sink(self.events.clone(), SessionEvent::Stream);
        tokio::spawn(async move {
            run_answer_stream(gateway, question, assistant, idle_timeout, sink).await;
        });

        SendOutcome::Started { user, assistant }
    }

    /// Upload a file and refresh the listing. Ignored while another upload
    /// is in flight.
    pub fn upload(&mut self, path: impl AsRef<Path>) -> bool {
        if self.uploading.is_some() {
            return false;
        }
        let path = path.as_ref().to_path_buf();
        self.uploading = Some(path.clone());
        info!(path = %path.display(), "upload started");

        let gateway = self.gateway.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let change = gateway.upload_document(&path).await;
            let outcome = list_after(gateway.as_ref(), change).await;
            let _ = events.send(SessionEvent::Uploaded { path, outcome });
        });
        true
    }

    /// Delete by backend name and refresh the listing. Ignored while the
    /// same name is already being deleted.
    pub fn delete(&mut self, name: &str) -> bool {
        if !self.deleting.insert(name.to_string()) {
            return false;
        }
        info!(%name, "delete started");

        let gateway = self.gateway.clone();
        let events = self.events.clone();
        let name = name.to_string();
        tokio::spawn(async move {
            let change = gateway.delete_document(&name).await;
            let outcome = list_after(gateway.as_ref(), change).await;
            let _ = events.send(SessionEvent::Deleted { name, outcome });
        });
        true
    }

    pub fn refresh_documents(&self) {
        let gateway = self.gateway.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = gateway.list_documents().await;
            let _ = events.send(SessionEvent::DocumentsListed(result));
        });
    }

    /// Fold a task report into session state.
    pub fn apply(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Stream(event) => self.apply_stream(event),
            SessionEvent::DocumentsListed(result) => match result {
                Ok(names) => self.documents.replace(names),
                Err(e) => self.record_error("Failed to fetch documents", &e),
            },
            SessionEvent::Uploaded { path, outcome } => {
                if self.uploading.as_deref() == Some(path.as_path()) {
                    self.uploading = None;
                }
                let file = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                self.apply_change(outcome, "Upload failed", &format!("Uploaded {}", file));
            }
            SessionEvent::Deleted { name, outcome } => {
                self.deleting.remove(&name);
                self.apply_change(outcome, "Delete failed", &format!("Deleted {}", name));
            }
        }
    }

    fn apply_change(&mut self, outcome: ChangeOutcome, rejected: &str, applied: &str) {
        match outcome {
            ChangeOutcome::Rejected(e) => self.record_error(rejected, &e),
            ChangeOutcome::Applied(Ok(names)) => self.documents.replace(names),
            // The backend already holds the change; only our snapshot is stale
            ChangeOutcome::Applied(Err(e)) => {
                self.record_error(&format!("{} but refreshing documents failed", applied), &e)
            }
        }
    }

    fn apply_stream(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Progress { target, content } => {
                if !self.transcript.replace_content(target, content) {
                    warn!(%target, "chunk for unknown message dropped");
                }
            }
            StreamEvent::Finished { target } => self.close_answer(target),
            StreamEvent::Failed { target, error } => {
                // Partial answers are never left looking final
                self.transcript.replace_content(target, STREAM_ERROR_TEXT);
                error!(%target, %error, "Failed to ask question");
                self.last_error = Some(format!("Failed to ask question: {}", error));
                self.close_answer(target);
            }
        }
    }

    fn close_answer(&mut self, target: MessageId) {
        if self.open_answer == Some(target) {
            self.open_answer = None;
        }
    }

    fn record_error(&mut self, context: &str, err: &dyn std::fmt::Display) {
        error!(error = %err, "{}", context);
        self.last_error = Some(format!("{}: {}", context, err));
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn documents(&self) -> &DocumentRegistry {
        &self.documents
    }

    pub fn is_awaiting_answer(&self) -> bool {
        self.open_answer.is_some()
    }

    /// The placeholder currently receiving chunks, if any.
    pub fn open_answer(&self) -> Option<MessageId> {
        self.open_answer
    }

    pub fn is_uploading(&self) -> bool {
        self.uploading.is_some()
    }

    pub fn is_deleting(&self, name: &str) -> bool {
        self.deleting.contains(name)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn dismiss_error(&mut self) {
        self.last_error = None;
    }
}

async fn list_after(gateway: &dyn Gateway, change: Result<String>) -> ChangeOutcome {
    match change {
        Ok(message) => {
            info!(%message, "change accepted");
            ChangeOutcome::Applied(gateway.list_documents().await)
        }
        Err(e) => ChangeOutcome::Rejected(e),
    }
}
