use std::path::Path;

use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LexoraError, Result};

/// Raw answer body, chunked however the transport delivered it.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>>>;

/// The backend operations the client depends on. Pure I/O, no state.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn list_documents(&self) -> Result<Vec<String>>;

    async fn upload_document(&self, path: &Path) -> Result<String>;

    async fn delete_document(&self, name: &str) -> Result<String>;

    /// Non-streaming ask; resolves once the whole answer is available.
    async fn ask(&self, question: &str) -> Result<String>;

    async fn ask_stream(&self, question: &str) -> Result<ByteStream>;
}

#[derive(Serialize)]
struct QuestionRequest<'a> {
    question: &'a str,
}

#[derive(Deserialize)]
struct AnswerResponse {
    answer: String,
}

#[derive(Deserialize)]
struct MessageResponse {
    message: String,
}

/// `/documents` returns either bare names or objects carrying a `name`.
#[derive(Deserialize)]
#[serde(untagged)]
enum DocumentEntry {
    Name(String),
    Object { name: String },
}

impl DocumentEntry {
    fn into_name(self) -> String {
        match self {
            DocumentEntry::Name(name) => name,
            DocumentEntry::Object { name } => name,
        }
    }
}

pub(crate) fn parse_document_names(body: &str) -> Result<Vec<String>> {
    let entries: Vec<DocumentEntry> = serde_json::from_str(body)?;
    Ok(entries.into_iter().map(DocumentEntry::into_name).collect())
}

/// Prefer the backend's `message` field, fall back to the raw body.
fn success_message(body: String) -> String {
    serde_json::from_str::<MessageResponse>(&body)
        .map(|m| m.message)
        .unwrap_or(body)
}

#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn document_url(&self, name: &str) -> Result<String> {
        let mut url = reqwest::Url::parse(&self.url("/documents"))
            .map_err(|e| LexoraError::Config(format!("invalid API url {}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| LexoraError::Config(format!("API url cannot be a base: {}", self.base_url)))?
            .push(name);
        Ok(url.to_string())
    }
}

/// Any non-success status is a failure; the body is kept for diagnostics.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(LexoraError::Status { status, body })
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn list_documents(&self) -> Result<Vec<String>> {
        let response = self.client.get(self.url("/documents")).send().await?;
        let body = check_status(response).await?.text().await?;
        parse_document_names(&body)
    }

    async fn upload_document(&self, path: &Path) -> Result<String> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| LexoraError::Config(format!("not a file: {}", path.display())))?;
        let bytes = tokio::fs::read(path).await?;
        debug!(file = %file_name, size = bytes.len(), "uploading document");

        let form = Form::new().part("file", Part::bytes(bytes).file_name(file_name));
        let response = self
            .client
            .post(self.url("/upload"))
            .multipart(form)
            .send()
            .await?;
        let body = check_status(response).await?.text().await?;
        Ok(success_message(body))
    }

    async fn delete_document(&self, name: &str) -> Result<String> {
        let response = self.client.delete(self.document_url(name)?).send().await?;
        let body = check_status(response).await?.text().await?;
        Ok(success_message(body))
    }

    async fn ask(&self, question: &str) -> Result<String> {
        let response = self
            .client
            .post(self.url("/ask"))
            .json(&QuestionRequest { question })
            .send()
            .await?;
        let answer: AnswerResponse = check_status(response).await?.json().await?;
        Ok(answer.answer)
    }

    async fn ask_stream(&self, question: &str) -> Result<ByteStream> {
        let response = self
            .client
            .post(self.url("/ask_stream"))
            .json(&QuestionRequest { question })
            .send()
            .await?;
        let response = check_status(response).await?;

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(LexoraError::from));
        Ok(stream.boxed())
    }
}
