//! External collaborators: position analysis and the streaming coach.

pub mod chat;
pub mod http_analysis;
pub mod stockfish;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisResult;
use crate::coach::Role;
use crate::error::TransportError;

pub use chat::{ChatCompletionsClient, TextStreamClient};
pub use http_analysis::HttpAnalyzer;
pub use stockfish::StockfishAnalyzer;

/// Answers "how good is this position" for a FEN.
#[async_trait]
pub trait PositionAnalyzer: Send + Sync {
    async fn analyze_position(&self, fen: &str, depth: u32) -> Result<AnalysisResult, TransportError>;
}

/// A finite, non-restartable sequence of reply fragments. The stream ends
/// (`None`) only after the service signalled completion; a transport
/// failure mid-reply is yielded as an `Err` item.
pub type FragmentStream = BoxStream<'static, Result<String, TransportError>>;

/// One entry of the conversation as sent to the coach service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

/// Opens one streaming exchange per submitted conversation.
#[async_trait]
pub trait CoachClient: Send + Sync {
    async fn stream_reply(&self, turns: Vec<ChatTurn>) -> Result<FragmentStream, TransportError>;
}
