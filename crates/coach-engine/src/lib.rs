//! Game replay and analysis synchronization: a navigable game record, engine
//! analysis that tracks the cursor, and a streaming coach conversation.

pub mod analysis;
pub mod clients;
pub mod coach;
pub mod config;
pub mod error;
pub mod navigation;
pub mod notify;
pub mod review;
pub mod session;

pub use analysis::{
    AnalysisOrchestrator, AnalysisOutcome, AnalysisResult, AnalysisStatus, CandidateMove, FailurePolicy, RequestToken,
};
pub use coach::{CoachSession, ConversationMessage, Role, TurnOutcome, TurnPhase, PENDING_CURSOR};
pub use config::{AnalysisBackend, CoachProtocol, EngineConfig};
pub use error::{ConfigError, SessionError, TransportError};
pub use navigation::{Navigation, Navigator, Transition};
pub use notify::ChangeNotifier;
pub use review::{review_game, GameReview, ReviewedMove};
pub use session::{EvalDisplay, Navigated, ReplaySession};
