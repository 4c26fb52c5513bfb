//! Streaming answer ingestion.
//!
//! `AnswerFragments` is the pull side: each `next()` waits for one network
//! chunk and hands back its decoded text. `run_answer_stream` drives it and
//! publishes the running answer after every chunk so partial text can be
//! rendered while the rest is still arriving.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::decode::Utf8StreamDecoder;
use crate::error::{LexoraError, Result};
use crate::gateway::{ByteStream, Gateway};
use crate::transcript::MessageId;

/// Shown in place of the answer when the stream cannot be completed.
pub const STREAM_ERROR_TEXT: &str =
    "Sorry, I encountered an error while processing your request. Make sure the backend is running.";

/// Decoded text fragments of one answer, pulled one chunk at a time.
pub struct AnswerFragments {
    bytes: ByteStream,
    decoder: Utf8StreamDecoder,
    idle_timeout: Option<Duration>,
    done: bool,
}

impl AnswerFragments {
    pub fn new(bytes: ByteStream, idle_timeout: Option<Duration>) -> Self {
        Self {
            bytes,
            decoder: Utf8StreamDecoder::new(),
            idle_timeout,
            done: false,
        }
    }

    /// Open `/ask_stream` for `question` and wrap the body.
    pub async fn open(
        gateway: &dyn Gateway,
        question: &str,
        idle_timeout: Option<Duration>,
    ) -> Result<Self> {
        let bytes = gateway.ask_stream(question).await?;
        Ok(Self::new(bytes, idle_timeout))
    }

    /// Next fragment, `None` once the stream has ended or failed.
    ///
    /// A fragment may be empty when a chunk held only part of a character.
    pub async fn next(&mut self) -> Option<Result<String>> {
        if self.done {
            return None;
        }

        let chunk = match self.idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.bytes.next()).await {
                Ok(chunk) => chunk,
                Err(_) => Some(Err(LexoraError::Timeout(limit.as_secs()))),
            },
            None => self.bytes.next().await,
        };

        match chunk {
            Some(Ok(bytes)) => Some(Ok(self.decoder.decode(&bytes))),
            Some(Err(e)) => {
                self.done = true;
                Some(Err(e))
            }
            None => {
                self.done = true;
                let tail = self.decoder.finish();
                if tail.is_empty() {
                    None
                } else {
                    Some(Ok(tail))
                }
            }
        }
    }
}

/// Progress of one streamed answer, addressed to its placeholder message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Everything received so far, not just the latest chunk.
    Progress { target: MessageId, content: String },
    Finished { target: MessageId },
    Failed { target: MessageId, error: String },
}

/// Stream the answer to `question` into `target`.
///
/// Emits one `Progress` per chunk, then exactly one `Finished` or `Failed`.
/// Returns early if the receiver is gone.
pub async fn run_answer_stream<F>(
    gateway: Arc<dyn Gateway>,
    question: String,
    target: MessageId,
    idle_timeout: Option<Duration>,
    sink: F,
) where
    F: Fn(StreamEvent) -> bool,
{
    info!(%target, "opening answer stream");

    let mut fragments = match AnswerFragments::open(gateway.as_ref(), &question, idle_timeout).await {
        Ok(fragments) => fragments,
        Err(e) => {
            warn!(%target, error = %e, "answer stream failed to open");
            sink(StreamEvent::Failed { target, error: e.to_string() });
            return;
        }
    };

    let mut content = String::new();
    let mut chunks = 0usize;

    while let Some(fragment) = fragments.next().await {
        match fragment {
            Ok(text) => {
                chunks += 1;
                content.push_str(&text);
                let delivered = sink(StreamEvent::Progress {
                    target,
                    content: content.clone(),
                });
                if !delivered {
                    debug!(%target, "answer receiver dropped, abandoning stream");
                    return;
                }
            }
            Err(e) => {
                warn!(%target, chunks, error = %e, "answer stream interrupted");
                sink(StreamEvent::Failed { target, error: e.to_string() });
                return;
            }
        }
    }

    info!(%target, chunks, chars = content.chars().count(), "answer stream finished");
    sink(StreamEvent::Finished { target });
}

/// `sink` adapter for an unbounded channel.
pub fn channel_sink<T>(
    tx: UnboundedSender<T>,
    wrap: impl Fn(StreamEvent) -> T,
) -> impl Fn(StreamEvent) -> bool {
    move |event| tx.send(wrap(event)).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeGateway, StreamStep};
    use crate::transcript::{ChatRole, Transcript};
    use std::sync::Mutex;

    fn target() -> MessageId {
        let mut transcript = Transcript::new();
        transcript.push(ChatRole::Assistant, "")
    }

    async fn collect(gateway: FakeGateway, idle_timeout: Option<Duration>) -> Vec<StreamEvent> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink_events = events.clone();
        run_answer_stream(
            Arc::new(gateway),
            "question".to_string(),
            target(),
            idle_timeout,
            move |event| {
                sink_events.lock().unwrap().push(event);
                true
            },
        )
        .await;
        let events = events.lock().unwrap().clone();
        events
    }

    #[tokio::test]
    async fn test_progress_carries_cumulative_prefix() {
        let gateway = FakeGateway::new().with_answer(&["Refunds ", "are accepted ", "within 30 days."]);
        let events = collect(gateway, None).await;
        let id = target();

        assert_eq!(
            events,
            vec![
                StreamEvent::Progress { target: id, content: "Refunds ".into() },
                StreamEvent::Progress { target: id, content: "Refunds are accepted ".into() },
                StreamEvent::Progress { target: id, content: "Refunds are accepted within 30 days.".into() },
                StreamEvent::Finished { target: id },
            ]
        );
    }

    #[tokio::test]
    async fn test_split_character_never_published_half_decoded() {
        let gateway = FakeGateway::new();
        let bytes = "naïve".as_bytes();
        gateway.set_answer(vec![
            StreamStep::Chunk(bytes[..3].to_vec()),
            StreamStep::Chunk(bytes[3..].to_vec()),
        ]);
        let events = collect(gateway, None).await;

        let contents: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Progress { content, .. } => Some(content.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(contents, vec!["na", "naïve"]);
    }

    #[tokio::test]
    async fn test_open_failure_reports_failed_only() {
        let gateway = FakeGateway::new().with_answer(&["never sent"]);
        gateway.set_offline(true);
        let events = collect(gateway, None).await;

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StreamEvent::Failed { .. }));
    }

    #[tokio::test]
    async fn test_interruption_after_partial_content() {
        let gateway = FakeGateway::new();
        gateway.set_answer(vec![
            StreamStep::text("Partial "),
            StreamStep::Error("connection reset".into()),
        ]);
        let events = collect(gateway, None).await;

        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], StreamEvent::Progress { .. }));
        match &events[1] {
            StreamEvent::Failed { error, .. } => assert!(error.contains("connection reset")),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_stream_finishes_without_progress() {
        let events = collect(FakeGateway::new(), None).await;
        assert_eq!(events, vec![StreamEvent::Finished { target: target() }]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_fails_stalled_stream() {
        let gateway = FakeGateway::new();
        gateway.set_answer(vec![StreamStep::text("Thinking about"), StreamStep::Stall]);
        let events = collect(gateway, Some(Duration::from_secs(30))).await;

        assert_eq!(events.len(), 2);
        match &events[1] {
            StreamEvent::Failed { error, .. } => assert!(error.contains("30 seconds")),
            other => panic!("expected timeout failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fragments_pull_loop_flushes_dangling_bytes() {
        let gateway = FakeGateway::new();
        gateway.set_answer(vec![StreamStep::Chunk(vec![b'o', b'k', 0xE2, 0x82])]);
        let mut fragments = AnswerFragments::open(&gateway, "q", None).await.unwrap();

        assert_eq!(fragments.next().await.unwrap().unwrap(), "ok");
        assert_eq!(fragments.next().await.unwrap().unwrap(), "\u{FFFD}");
        assert!(fragments.next().await.is_none());
        assert!(fragments.next().await.is_none());
    }

    #[tokio::test]
    async fn test_stops_when_receiver_dropped() {
        let gateway = FakeGateway::new().with_answer(&["a", "b", "c"]);
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        // Must return rather than loop on a closed channel
        run_answer_stream(Arc::new(gateway), "q".into(), target(), None, channel_sink(tx, |e| e)).await;
    }
}
