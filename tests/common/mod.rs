//! Shared fakes for integration tests: an analyzer whose responses the test
//! releases by hand, and a coach whose replies follow a script.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use coach_engine::clients::{ChatTurn, CoachClient, FragmentStream, PositionAnalyzer};
use coach_engine::{AnalysisResult, TransportError};
use chess_core::EvaluationScore;
use futures::stream::{self, StreamExt};
use tokio::sync::{mpsc, oneshot};

pub type AnalysisReply = Result<AnalysisResult, TransportError>;

pub const SCHOLARS_MATE: &str = r#"[Event "Casual Game"]
[Site "?"]
[Date "2024.03.01"]
[White "Alice"]
[Black "Bob"]
[Result "1-0"]

1. e4 e5 2. Bc4 Nc6 3. Qh5 Nf6 4. Qxf7# 1-0
"#;

pub const ITALIAN: &str = r#"[White "Carol"]
[Black "Dave"]
[Result "*"]

1. e4 e5 2. Nf3 Nc6 3. Bc4 Bc5 4. c3 Nf6 5. d4 exd4 6. cxd4 Bb4+ *
"#;

pub fn result_for(fen: &str, depth: u32, cp: i32) -> AnalysisResult {
    AnalysisResult {
        fen: fen.to_string(),
        depth,
        evaluation: EvaluationScore::Centipawn(cp),
        top_moves: vec![],
    }
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

/// Answers immediately with 0.00 unless the test has put a gate on the FEN,
/// in which case the call waits until the gate is released.
#[derive(Default)]
pub struct GatedAnalyzer {
    gates: Mutex<HashMap<String, VecDeque<oneshot::Receiver<AnalysisReply>>>>,
    scores: Mutex<HashMap<String, EvaluationScore>>,
    calls: Mutex<Vec<String>>,
}

impl GatedAnalyzer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Hold the next request for `fen` until the returned sender fires.
    pub fn hold(&self, fen: &str) -> oneshot::Sender<AnalysisReply> {
        let (tx, rx) = oneshot::channel();
        self.gates
            .lock()
            .unwrap()
            .entry(fen.to_string())
            .or_default()
            .push_back(rx);
        tx
    }

    /// Fixed evaluation for ungated requests on `fen`.
    pub fn score(&self, fen: &str, score: EvaluationScore) {
        self.scores.lock().unwrap().insert(fen.to_string(), score);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PositionAnalyzer for GatedAnalyzer {
    async fn analyze_position(&self, fen: &str, depth: u32) -> Result<AnalysisResult, TransportError> {
        self.calls.lock().unwrap().push(fen.to_string());
        let gate = self
            .gates
            .lock()
            .unwrap()
            .get_mut(fen)
            .and_then(|queue| queue.pop_front());

        match gate {
            Some(rx) => rx.await.unwrap_or(Err(TransportError::StreamClosed)),
            None => {
                let score = self
                    .scores
                    .lock()
                    .unwrap()
                    .get(fen)
                    .copied()
                    .unwrap_or(EvaluationScore::Centipawn(0));
                Ok(AnalysisResult {
                    fen: fen.to_string(),
                    depth,
                    evaluation: score,
                    top_moves: vec![],
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Coach
// ---------------------------------------------------------------------------

pub enum Script {
    /// Connection refused before any fragment.
    Refuse(TransportError),
    /// Complete reply.
    Reply(Vec<&'static str>),
    /// Some fragments, then a transport failure.
    Break(Vec<&'static str>, TransportError),
    /// Fragments fed by the test through a channel; the stream completes
    /// when the sender is dropped.
    Live(mpsc::UnboundedReceiver<Result<String, TransportError>>),
}

/// Plays back one `Script` per exchange, recording every payload.
#[derive(Default)]
pub struct ScriptedCoach {
    scripts: Mutex<VecDeque<Script>>,
    payloads: Mutex<Vec<Vec<ChatTurn>>>,
}

impl ScriptedCoach {
    pub fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            payloads: Mutex::new(Vec::new()),
        })
    }

    pub fn payloads(&self) -> Vec<Vec<ChatTurn>> {
        self.payloads.lock().unwrap().clone()
    }
}

/// A `Live` script and the sender that feeds it.
pub fn live_script() -> (mpsc::UnboundedSender<Result<String, TransportError>>, Script) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, Script::Live(rx))
}

#[async_trait]
impl CoachClient for ScriptedCoach {
    async fn stream_reply(&self, turns: Vec<ChatTurn>) -> Result<FragmentStream, TransportError> {
        self.payloads.lock().unwrap().push(turns);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Refuse(TransportError::Http("no script left".into())));

        match script {
            Script::Refuse(e) => Err(e),
            Script::Reply(parts) => {
                let items: Vec<Result<String, TransportError>> = parts.into_iter().map(|p| Ok(p.to_string())).collect();
                Ok(stream::iter(items).boxed())
            }
            Script::Break(parts, e) => {
                let mut items: Vec<Result<String, TransportError>> =
                    parts.into_iter().map(|p| Ok(p.to_string())).collect();
                items.push(Err(e));
                Ok(stream::iter(items).boxed())
            }
            Script::Live(rx) => Ok(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            })
            .boxed()),
        }
    }
}
