//! Analysis request orchestration.
//!
//! Every request is tagged with a freshly minted `RequestToken`. A response
//! is installed only if its token is still the latest one when it arrives;
//! anything else is dropped silently. Navigation cancels logically, never at
//! the transport: superseded requests may still run to completion.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chess_core::EvaluationScore;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clients::PositionAnalyzer;
use crate::error::TransportError;
use crate::notify::ChangeNotifier;

/// One engine candidate, best-first within an `AnalysisResult`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateMove {
    pub uci: String,
    /// SAN in the analysed position, when the move is legal there.
    pub san: Option<String>,
    pub score: EvaluationScore,
    pub pv: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub fen: String,
    pub depth: u32,
    /// White-relative evaluation of the position.
    pub evaluation: EvaluationScore,
    pub top_moves: Vec<CandidateMove>,
}

impl AnalysisResult {
    pub fn best_move(&self) -> Option<&CandidateMove> {
        self.top_moves.first()
    }
}

/// Monotonic request identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RequestToken(u64);

impl RequestToken {
    pub fn value(self) -> u64 {
        self.0
    }

    fn next(self) -> Self {
        RequestToken(self.0 + 1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisStatus {
    /// Nothing requested for the current position.
    Idle,
    Loading,
    Success,
    Error(TransportError),
}

/// What happens to the displayed result when the current request fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    #[default]
    Clear,
    RetainLastGood,
}

/// How a single request ended, from the orchestrator's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisOutcome {
    Applied(RequestToken),
    /// Superseded before completion; nothing changed.
    Stale { token: RequestToken, current: RequestToken },
    Failed { token: RequestToken, error: TransportError },
}

#[derive(Debug)]
struct OrchestratorState {
    latest: RequestToken,
    status: AnalysisStatus,
    result: Option<AnalysisResult>,
}

#[derive(Clone)]
pub struct AnalysisOrchestrator {
    analyzer: Arc<dyn PositionAnalyzer>,
    depth: u32,
    policy: FailurePolicy,
    state: Arc<Mutex<OrchestratorState>>,
    notifier: ChangeNotifier,
}

impl AnalysisOrchestrator {
    pub fn new(analyzer: Arc<dyn PositionAnalyzer>, depth: u32, notifier: ChangeNotifier) -> Self {
        Self {
            analyzer,
            depth,
            policy: FailurePolicy::default(),
            state: Arc::new(Mutex::new(OrchestratorState {
                latest: RequestToken::default(),
                status: AnalysisStatus::Idle,
                result: None,
            })),
            notifier,
        }
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    fn lock(&self) -> MutexGuard<'_, OrchestratorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Supersede whatever is in flight and clear the displayed result.
    /// Called on every cursor change.
    pub fn invalidate(&self) -> RequestToken {
        let token = {
            let mut st = self.lock();
            st.latest = st.latest.next();
            st.result = None;
            st.status = AnalysisStatus::Idle;
            st.latest
        };
        self.notifier.bump();
        token
    }

    /// Issue a request for `fen`. The token is minted immediately, before
    /// the returned future is first polled, so call order is token order.
    /// The displayed result is left in place until the response lands.
    pub fn request_analysis(&self, fen: String) -> impl Future<Output = AnalysisOutcome> + Send + 'static {
        let token = {
            let mut st = self.lock();
            st.latest = st.latest.next();
            st.status = AnalysisStatus::Loading;
            st.latest
        };
        self.notifier.bump();
        debug!(token = token.value(), fen = %fen, "Analysis requested");

        let this = self.clone();
        async move {
            let response = this.analyzer.analyze_position(&fen, this.depth).await;
            this.complete(token, response)
        }
    }

    fn complete(&self, token: RequestToken, response: Result<AnalysisResult, TransportError>) -> AnalysisOutcome {
        let outcome = {
            let mut st = self.lock();
            if token != st.latest {
                debug!(
                    stale = token.value(),
                    current = st.latest.value(),
                    "Discarding stale analysis response"
                );
                return AnalysisOutcome::Stale {
                    token,
                    current: st.latest,
                };
            }

            match response {
                Ok(result) => {
                    st.result = Some(result);
                    st.status = AnalysisStatus::Success;
                    AnalysisOutcome::Applied(token)
                }
                Err(error) => {
                    warn!(token = token.value(), error = %error, "Analysis request failed");
                    if self.policy == FailurePolicy::Clear {
                        st.result = None;
                    }
                    st.status = AnalysisStatus::Error(error.clone());
                    AnalysisOutcome::Failed { token, error }
                }
            }
        };
        self.notifier.bump();
        outcome
    }

    pub fn latest_token(&self) -> RequestToken {
        self.lock().latest
    }

    pub fn status(&self) -> AnalysisStatus {
        self.lock().status.clone()
    }

    pub fn current_analysis(&self) -> Option<AnalysisResult> {
        self.lock().result.clone()
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Answers every position with the same fixed result, or fails.
    struct FixedAnalyzer {
        cp: Option<i32>,
    }

    #[async_trait]
    impl PositionAnalyzer for FixedAnalyzer {
        async fn analyze_position(&self, fen: &str, depth: u32) -> Result<AnalysisResult, TransportError> {
            match self.cp {
                Some(cp) => Ok(AnalysisResult {
                    fen: fen.to_string(),
                    depth,
                    evaluation: EvaluationScore::Centipawn(cp),
                    top_moves: vec![],
                }),
                None => Err(TransportError::Http("connection refused".into())),
            }
        }
    }

    fn orchestrator(cp: Option<i32>) -> AnalysisOrchestrator {
        AnalysisOrchestrator::new(Arc::new(FixedAnalyzer { cp }), 12, ChangeNotifier::new())
    }

    #[tokio::test]
    async fn test_applies_current_response() {
        let orch = orchestrator(Some(42));
        let outcome = orch.request_analysis("fen-a".to_string()).await;
        assert_eq!(outcome, AnalysisOutcome::Applied(orch.latest_token()));
        assert_eq!(orch.status(), AnalysisStatus::Success);
        assert_eq!(
            orch.current_analysis().map(|r| r.evaluation),
            Some(EvaluationScore::Centipawn(42))
        );
    }

    #[tokio::test]
    async fn test_invalidate_makes_in_flight_request_stale() {
        let orch = orchestrator(Some(42));
        let pending = orch.request_analysis("fen-a".to_string());
        let current = orch.invalidate();
        let outcome = pending.await;
        assert!(matches!(outcome, AnalysisOutcome::Stale { current: c, .. } if c == current));
        assert_eq!(orch.current_analysis(), None);
        assert_eq!(orch.status(), AnalysisStatus::Idle);
    }

    #[tokio::test]
    async fn test_tokens_are_minted_eagerly() {
        let orch = orchestrator(Some(1));
        let before = orch.latest_token();
        let _first = orch.request_analysis("a".to_string());
        let _second = orch.request_analysis("b".to_string());
        assert_eq!(orch.latest_token().value(), before.value() + 2);
    }

    #[tokio::test]
    async fn test_failure_clears_by_default() {
        let good = orchestrator(Some(10));
        good.request_analysis("a".to_string()).await;

        let failing = AnalysisOrchestrator {
            analyzer: Arc::new(FixedAnalyzer { cp: None }),
            ..good.clone()
        };
        let outcome = failing.request_analysis("a".to_string()).await;
        assert!(matches!(outcome, AnalysisOutcome::Failed { .. }));
        assert!(matches!(good.status(), AnalysisStatus::Error(_)));
        assert_eq!(good.current_analysis(), None);
    }

    #[tokio::test]
    async fn test_failure_can_retain_last_good() {
        let good = orchestrator(Some(10)).with_failure_policy(FailurePolicy::RetainLastGood);
        good.request_analysis("a".to_string()).await;

        let failing = AnalysisOrchestrator {
            analyzer: Arc::new(FixedAnalyzer { cp: None }),
            ..good.clone()
        };
        failing.request_analysis("a".to_string()).await;
        assert!(matches!(good.status(), AnalysisStatus::Error(_)));
        assert_eq!(
            good.current_analysis().map(|r| r.evaluation),
            Some(EvaluationScore::Centipawn(10))
        );
    }
}
