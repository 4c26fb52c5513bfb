pub mod config;
pub mod decode;
pub mod documents;
pub mod error;
pub mod gateway;
pub mod session;
pub mod stream;
pub mod transcript;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

// Re-export main types for convenience
pub use config::Config;
pub use documents::{Document, DocumentRegistry};
pub use error::{LexoraError, Result};
pub use gateway::{ByteStream, Gateway, HttpGateway};
pub use session::{ChangeOutcome, SendOutcome, Session, SessionEvent, SessionOptions, GREETING};
pub use stream::{AnswerFragments, StreamEvent, STREAM_ERROR_TEXT};
pub use transcript::{ChatMessage, ChatRole, MessageId, Transcript};
