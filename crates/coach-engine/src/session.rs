//! Replay session: the loaded game, the navigation cursor and the analysis
//! that follows it.
//!
//! Cursor moves and request issuance happen under one lock, so request
//! tokens are minted in the same order as cursor changes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chess_core::{bar_position_with_cap, normalize, position_at, GameMove, GameRecord, PgnError, Snapshot};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::analysis::{AnalysisOrchestrator, AnalysisOutcome, AnalysisResult, AnalysisStatus};
use crate::navigation::{Navigation, Navigator, Transition};
use crate::notify::ChangeNotifier;

/// Result of a cursor change.
#[derive(Debug)]
pub struct Navigated {
    pub transition: Transition,
    /// Analysis request for the new position, when auto-analysis is on.
    pub analysis: Option<JoinHandle<AnalysisOutcome>>,
}

/// Evaluation as shown next to the board.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalDisplay {
    pub text: String,
    /// White's share of the bar in percent, `0.0..=100.0`.
    pub bar: f64,
}

#[derive(Debug)]
struct Replay {
    record: Arc<GameRecord>,
    navigator: Navigator,
}

/// A loaded game, its cursor and the analysis that follows it.
///
/// Analysis requests are spawned onto the current tokio runtime.
#[derive(Clone)]
pub struct ReplaySession {
    replay: Arc<Mutex<Replay>>,
    orchestrator: AnalysisOrchestrator,
    auto_analysis: Arc<AtomicBool>,
    eval_bar_cap: i32,
    notifier: ChangeNotifier,
}

impl ReplaySession {
    /// An empty session on the standard starting position. `notifier` should
    /// be the one the orchestrator publishes on.
    pub fn new(orchestrator: AnalysisOrchestrator, notifier: ChangeNotifier) -> Self {
        Self {
            replay: Arc::new(Mutex::new(Replay {
                record: Arc::new(GameRecord::default()),
                navigator: Navigator::at_end(0),
            })),
            orchestrator,
            auto_analysis: Arc::new(AtomicBool::new(true)),
            eval_bar_cap: chess_core::DEFAULT_EVAL_BAR_CAP,
            notifier,
        }
    }

    pub fn with_eval_bar_cap(mut self, cap: i32) -> Self {
        self.eval_bar_cap = cap.max(1);
        self
    }

    pub fn with_auto_analysis(self, enabled: bool) -> Self {
        self.auto_analysis.store(enabled, Ordering::SeqCst);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Replay> {
        self.replay.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Parse and install a new game. On error the current game, cursor and
    /// analysis are untouched. On success the cursor lands on the last ply.
    ///
    /// # Panics
    ///
    /// Outside a tokio runtime when auto-analysis is on.
    pub fn load_pgn(&self, pgn: &str) -> Result<Option<JoinHandle<AnalysisOutcome>>, PgnError> {
        let record = chess_core::load_pgn(pgn)?;
        Ok(self.load_record(record))
    }

    /// Install an already replayed game. Same panics as [`Self::load_pgn`].
    pub fn load_record(&self, record: GameRecord) -> Option<JoinHandle<AnalysisOutcome>> {
        let pending = {
            let mut replay = self.lock();
            info!(
                white = %record.metadata.white,
                black = %record.metadata.black,
                moves = record.len(),
                "Game loaded"
            );
            replay.navigator = Navigator::at_end(record.len());
            replay.record = Arc::new(record);
            self.orchestrator.invalidate();
            self.request_for(&replay)
        };
        self.notifier.bump();
        pending.map(tokio::spawn)
    }

    fn request_for(&self, replay: &Replay) -> Option<impl std::future::Future<Output = AnalysisOutcome> + Send + 'static> {
        if !self.auto_analysis.load(Ordering::SeqCst) {
            return None;
        }
        let fen = position_at(&replay.record, replay.navigator.cursor())?.fen().to_string();
        Some(self.orchestrator.request_analysis(fen))
    }

    /// Apply a navigation. Returns `None`, with no side effects, when the
    /// cursor would not move.
    ///
    /// # Panics
    ///
    /// Outside a tokio runtime when auto-analysis is on and the cursor moves.
    pub fn navigate(&self, nav: Navigation) -> Option<Navigated> {
        let (transition, pending) = {
            let mut replay = self.lock();
            let transition = replay.navigator.apply(nav)?;
            self.orchestrator.invalidate();
            (transition, self.request_for(&replay))
        };
        debug!(from = transition.from, to = transition.to, "Cursor moved");
        self.notifier.bump();
        Some(Navigated {
            transition,
            analysis: pending.map(tokio::spawn),
        })
    }

    pub fn next(&self) -> Option<Navigated> {
        self.navigate(Navigation::Next)
    }

    pub fn previous(&self) -> Option<Navigated> {
        self.navigate(Navigation::Previous)
    }

    pub fn jump_to(&self, index: isize) -> Option<Navigated> {
        self.navigate(Navigation::JumpTo(index))
    }

    pub fn go_to_start(&self) -> Option<Navigated> {
        self.navigate(Navigation::Start)
    }

    pub fn go_to_end(&self) -> Option<Navigated> {
        self.navigate(Navigation::End)
    }

    /// Request analysis of the current position regardless of the
    /// auto-analysis setting.
    ///
    /// # Panics
    ///
    /// Outside a tokio runtime.
    pub fn reanalyze(&self) -> JoinHandle<AnalysisOutcome> {
        let pending = {
            let replay = self.lock();
            let fen = position_at(&replay.record, replay.navigator.cursor())
                .map(|s| s.fen().to_string())
                .unwrap_or_else(|| replay.record.initial().fen().to_string());
            self.orchestrator.request_analysis(fen)
        };
        tokio::spawn(pending)
    }

    pub fn set_auto_analysis(&self, enabled: bool) {
        self.auto_analysis.store(enabled, Ordering::SeqCst);
        self.notifier.bump();
    }

    pub fn auto_analysis(&self) -> bool {
        self.auto_analysis.load(Ordering::SeqCst)
    }

    pub fn record(&self) -> Arc<GameRecord> {
        self.lock().record.clone()
    }

    pub fn cursor(&self) -> isize {
        self.lock().navigator.cursor()
    }

    pub fn current_position(&self) -> Snapshot {
        let replay = self.lock();
        position_at(&replay.record, replay.navigator.cursor())
            .cloned()
            .unwrap_or_else(|| replay.record.initial().clone())
    }

    /// The move that produced the current position; `None` at the start.
    pub fn current_move(&self) -> Option<GameMove> {
        let replay = self.lock();
        let cursor = usize::try_from(replay.navigator.cursor()).ok()?;
        replay.record.moves().get(cursor).cloned()
    }

    pub fn current_analysis(&self) -> Option<AnalysisResult> {
        self.orchestrator.current_analysis()
    }

    pub fn analysis_status(&self) -> AnalysisStatus {
        self.orchestrator.status()
    }

    pub fn orchestrator(&self) -> &AnalysisOrchestrator {
        &self.orchestrator
    }

    pub fn eval_display(&self) -> Option<EvalDisplay> {
        let analysis = self.current_analysis()?;
        Some(EvalDisplay {
            text: normalize(analysis.evaluation),
            bar: bar_position_with_cap(analysis.evaluation, self.eval_bar_cap),
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.notifier.subscribe()
    }
}
