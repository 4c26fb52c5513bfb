//! In-memory `Gateway` for tests.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};

use crate::error::{LexoraError, Result};
use crate::gateway::{ByteStream, Gateway};

/// One scripted step of an answer stream.
#[derive(Debug, Clone)]
pub enum StreamStep {
    Chunk(Vec<u8>),
    /// Interrupt the stream with a transport error.
    Error(String),
    /// Never deliver anything again.
    Stall,
}

impl StreamStep {
    pub fn text(text: &str) -> Self {
        StreamStep::Chunk(text.as_bytes().to_vec())
    }
}

/// Behaves like the backend: names are unique, deleting an unknown name
/// fails, and every ask replays the configured answer script.
#[derive(Default)]
pub struct FakeGateway {
    documents: Mutex<Vec<String>>,
    answer: Mutex<Vec<StreamStep>>,
    questions: Mutex<Vec<String>>,
    offline: AtomicBool,
    listing_down: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn connection_refused() -> LexoraError {
    LexoraError::Io(std::io::Error::new(
        std::io::ErrorKind::ConnectionRefused,
        "backend unreachable",
    ))
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents(names: &[&str]) -> Self {
        let gateway = Self::new();
        *lock(&gateway.documents) = names.iter().map(|n| n.to_string()).collect();
        gateway
    }

    pub fn with_answer(self, chunks: &[&str]) -> Self {
        self.set_answer(chunks.iter().map(|c| StreamStep::text(c)).collect());
        self
    }

    pub fn set_answer(&self, steps: Vec<StreamStep>) {
        *lock(&self.answer) = steps;
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Fail only `list_documents`, leaving uploads and deletes working.
    pub fn set_listing_down(&self, down: bool) {
        self.listing_down.store(down, Ordering::SeqCst);
    }

    pub fn documents(&self) -> Vec<String> {
        lock(&self.documents).clone()
    }

    /// Questions received by `ask` and `ask_stream`, in order.
    pub fn questions(&self) -> Vec<String> {
        lock(&self.questions).clone()
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(connection_refused());
        }
        Ok(())
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn list_documents(&self) -> Result<Vec<String>> {
        self.check_online()?;
        if self.listing_down.load(Ordering::SeqCst) {
            return Err(LexoraError::Status {
                status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                body: "Internal Server Error".to_string(),
            });
        }
        Ok(self.documents())
    }

    async fn upload_document(&self, path: &Path) -> Result<String> {
        self.check_online()?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| LexoraError::Config(format!("not a file: {}", path.display())))?;

        let mut documents = lock(&self.documents);
        if !documents.contains(&name) {
            documents.push(name.clone());
        }
        Ok(format!("Successfully uploaded and indexed {}", name))
    }

    async fn delete_document(&self, name: &str) -> Result<String> {
        self.check_online()?;
        let mut documents = lock(&self.documents);
        match documents.iter().position(|d| d == name) {
            Some(index) => {
                documents.remove(index);
                Ok(format!("Deleted {}", name))
            }
            None => Err(LexoraError::Status {
                status: reqwest::StatusCode::NOT_FOUND,
                body: r#"{"detail":"File not found"}"#.to_string(),
            }),
        }
    }

    async fn ask(&self, question: &str) -> Result<String> {
        self.check_online()?;
        lock(&self.questions).push(question.to_string());

        let mut bytes = Vec::new();
        for step in lock(&self.answer).iter() {
            match step {
                StreamStep::Chunk(chunk) => bytes.extend_from_slice(chunk),
                StreamStep::Error(message) => return Err(LexoraError::Config(message.clone())),
                StreamStep::Stall => break,
            }
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn ask_stream(&self, question: &str) -> Result<ByteStream> {
        self.check_online()?;
        lock(&self.questions).push(question.to_string());

        let steps = lock(&self.answer).clone();
        let stalls = steps.iter().any(|s| matches!(s, StreamStep::Stall));
        let items: Vec<Result<Vec<u8>>> = steps
            .into_iter()
            .take_while(|s| !matches!(s, StreamStep::Stall))
            .map(|step| match step {
                StreamStep::Chunk(chunk) => Ok(chunk),
                StreamStep::Error(message) => Err(LexoraError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    message,
                ))),
                StreamStep::Stall => unreachable!("filtered by take_while"),
            })
            .collect();

        let scripted = stream::iter(items);
        if stalls {
            Ok(scripted.chain(stream::pending::<Result<Vec<u8>>>()).boxed())
        } else {
            Ok(scripted.boxed())
        }
    }
}
