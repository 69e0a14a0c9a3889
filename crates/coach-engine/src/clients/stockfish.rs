//! Stockfish engine wrapper using UCI protocol (async I/O)

use async_trait::async_trait;
use chess_core::replay::{position_from_fen, uci_to_san};
use chess_core::EvaluationScore;
use shakmaty::{Chess, Color, Position};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::debug;

use super::PositionAnalyzer;
use crate::analysis::{AnalysisResult, CandidateMove};
use crate::error::TransportError;

/// A single PV line from multi-PV analysis, engine-relative.
#[derive(Debug, Clone, Default)]
pub struct PvLine {
    /// Principal variation moves
    pub pv: Vec<String>,
    /// Centipawn score
    pub cp: Option<i32>,
    /// Mate in N
    pub mate: Option<i32>,
}

impl PvLine {
    fn score(&self) -> Option<EvaluationScore> {
        match (self.mate, self.cp) {
            (Some(m), _) => Some(EvaluationScore::Mate(m)),
            (None, Some(cp)) => Some(EvaluationScore::Centipawn(cp)),
            (None, None) => None,
        }
    }
}

/// Stockfish engine instance
pub struct StockfishEngine {
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl StockfishEngine {
    /// Start the engine process and complete the UCI handshake.
    pub async fn new(path: &str, threads: u32, hash_mb: u32) -> Result<Self, TransportError> {
        let mut process = Command::new(path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TransportError::Engine(format!("Failed to spawn Stockfish: {e}")))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| TransportError::Engine("Stockfish stdin unavailable".into()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| TransportError::Engine("Stockfish stdout unavailable".into()))?;

        let mut engine = Self {
            process,
            stdin,
            stdout: BufReader::new(stdout),
        };

        engine.send("uci").await?;
        engine.wait_for("uciok").await?;

        engine.send(&format!("setoption name Threads value {threads}")).await?;
        engine.send(&format!("setoption name Hash value {hash_mb}")).await?;
        engine.send("setoption name UCI_AnalyseMode value true").await?;
        engine.send("isready").await?;
        engine.wait_for("readyok").await?;

        Ok(engine)
    }

    /// Write one UCI command line.
    async fn send(&mut self, cmd: &str) -> Result<(), TransportError> {
        debug!(cmd, "SF <");
        self.stdin
            .write_all(format!("{cmd}\n").as_bytes())
            .await
            .map_err(|e| TransportError::Engine(format!("Failed to write to Stockfish: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| TransportError::Engine(format!("Failed to flush stdin: {e}")))?;
        Ok(())
    }

    async fn read_line(&mut self, line: &mut String) -> Result<(), TransportError> {
        line.clear();
        let read = self
            .stdout
            .read_line(line)
            .await
            .map_err(|e| TransportError::Engine(format!("Failed to read from Stockfish: {e}")))?;
        if read == 0 {
            return Err(TransportError::Engine("Stockfish exited unexpectedly".into()));
        }
        Ok(())
    }

    /// Read lines until one equals `expected`.
    async fn wait_for(&mut self, expected: &str) -> Result<(), TransportError> {
        let mut line = String::new();
        loop {
            self.read_line(&mut line).await?;
            let trimmed = line.trim();
            debug!(line = trimmed, "SF >");
            if trimmed == expected {
                return Ok(());
            }
        }
    }

    /// Search a position to `depth` and return up to `multipv` lines,
    /// best first. Lines the engine never reported are dropped.
    pub async fn analyze(
        &mut self,
        fen: &str,
        depth: u32,
        multipv: u32,
    ) -> Result<Vec<PvLine>, TransportError> {
        self.send(&format!("setoption name MultiPV value {multipv}")).await?;
        self.send(&format!("position fen {fen}")).await?;
        self.send(&format!("go depth {depth}")).await?;

        let mut lines: Vec<PvLine> = vec![PvLine::default(); multipv.max(1) as usize];
        let mut line = String::new();

        loop {
            self.read_line(&mut line).await?;
            let trimmed = line.trim();

            if trimmed.starts_with("info") && trimmed.contains(" score ") {
                // Bound scores are provisional
                if trimmed.contains("lowerbound") || trimmed.contains("upperbound") {
                    continue;
                }
                let pv_idx = parse_multipv_index(trimmed).unwrap_or(1).saturating_sub(1) as usize;
                if let Some(entry) = lines.get_mut(pv_idx) {
                    entry.cp = parse_cp(trimmed);
                    entry.mate = parse_mate(trimmed);
                    let pv = parse_pv(trimmed);
                    if !pv.is_empty() {
                        entry.pv = pv;
                    }
                }
            } else if trimmed.starts_with("bestmove") {
                debug!(line = trimmed, "SF >");
                break;
            }
        }

        lines.retain(|l| l.score().is_some());
        Ok(lines)
    }

    /// Ask the engine to exit and reap the process.
    pub async fn quit(&mut self) {
        let _ = self.send("quit").await;
        let _ = self.process.wait().await;
    }
}

impl Drop for StockfishEngine {
    fn drop(&mut self) {
        // Process may already be gone.
        let _ = self.process.start_kill();
    }
}

/// `PositionAnalyzer` backed by one local engine process. Concurrent
/// requests queue on the engine.
pub struct StockfishAnalyzer {
    engine: Mutex<StockfishEngine>,
    multipv: u32,
}

impl StockfishAnalyzer {
    pub async fn spawn(path: &str, threads: u32, hash_mb: u32, multipv: u32) -> Result<Self, TransportError> {
        let engine = StockfishEngine::new(path, threads, hash_mb).await?;
        Ok(Self {
            engine: Mutex::new(engine),
            multipv: multipv.max(1),
        })
    }

    pub async fn shutdown(&self) {
        self.engine.lock().await.quit().await;
    }
}

#[async_trait]
impl PositionAnalyzer for StockfishAnalyzer {
    async fn analyze_position(&self, fen: &str, depth: u32) -> Result<AnalysisResult, TransportError> {
        let position =
            position_from_fen(fen).map_err(|e| TransportError::MalformedPayload(e.to_string()))?;
        let turn = position.turn();

        let lines = {
            let mut engine = self.engine.lock().await;
            engine.analyze(fen, depth, self.multipv).await?
        };

        Ok(build_result(fen, depth, turn, &position, &lines))
    }
}

/// Turn engine-relative PV lines into a white-relative `AnalysisResult`.
fn build_result(
    fen: &str,
    depth: u32,
    turn: Color,
    position: &Chess,
    lines: &[PvLine],
) -> AnalysisResult {
    let top_moves: Vec<CandidateMove> = lines
        .iter()
        .filter_map(|l| {
            let score = EvaluationScore::from_side_to_move(l.score()?, turn);
            let uci = l.pv.first()?.clone();
            Some(CandidateMove {
                san: uci_to_san(position, &uci),
                uci,
                score,
                pv: l.pv.clone(),
            })
        })
        .collect();

    let evaluation = lines
        .first()
        .and_then(PvLine::score)
        .map(|s| EvaluationScore::from_side_to_move(s, turn))
        .unwrap_or(EvaluationScore::Centipawn(0));

    AnalysisResult {
        fen: fen.to_string(),
        depth,
        evaluation,
        top_moves,
    }
}

fn value_after(line: &str, key: &str) -> Option<i32> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    for (i, part) in parts.iter().enumerate() {
        if *part == key && i + 1 < parts.len() {
            return parts[i + 1].parse().ok();
        }
    }
    None
}

/// Parse centipawn score from info line
fn parse_cp(line: &str) -> Option<i32> {
    value_after(line, "cp")
}

/// Parse mate score from info line
fn parse_mate(line: &str) -> Option<i32> {
    value_after(line, "mate")
}

/// Parse multipv index from info line
fn parse_multipv_index(line: &str) -> Option<u32> {
    value_after(line, "multipv").and_then(|v| u32::try_from(v).ok())
}

/// Parse PV moves from info line
fn parse_pv(line: &str) -> Vec<String> {
    let mut in_pv = false;
    let mut moves = Vec::new();

    for part in line.split_whitespace() {
        if part == "pv" {
            in_pv = true;
            continue;
        }
        if in_pv {
            // PV ends at next keyword or end of line
            if part.starts_with("bmc") || part == "string" {
                break;
            }
            moves.push(part.to_string());
        }
    }

    moves
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess_core::bar_position;

    #[test]
    fn test_parse_cp() {
        let line = "info depth 20 seldepth 25 multipv 1 score cp 35 nodes 100000 pv e2e4";
        assert_eq!(parse_cp(line), Some(35));
        assert_eq!(parse_mate(line), None);
    }

    #[test]
    fn test_parse_mate() {
        let line = "info depth 20 score mate -3 nodes 100000 pv e2e4";
        assert_eq!(parse_mate(line), Some(-3));
    }

    #[test]
    fn test_parse_multipv_and_pv() {
        let line = "info depth 18 multipv 2 score cp 12 pv e2e4 e7e5 g1f3";
        assert_eq!(parse_multipv_index(line), Some(2));
        assert_eq!(parse_pv(line), vec!["e2e4", "e7e5", "g1f3"]);
    }

    #[test]
    fn test_build_result_flips_for_black() {
        let fen = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";
        let position = position_from_fen(fen).unwrap();
        let lines = vec![
            PvLine {
                pv: vec!["c7c5".into(), "g1f3".into()],
                cp: Some(-30),
                mate: None,
            },
            PvLine {
                pv: vec!["e7e5".into()],
                cp: Some(-40),
                mate: None,
            },
        ];
        let result = build_result(fen, 18, Color::Black, &position, &lines);
        assert_eq!(result.evaluation, EvaluationScore::Centipawn(30));
        assert_eq!(result.top_moves.len(), 2);
        assert_eq!(result.top_moves[0].san.as_deref(), Some("c5"));
        assert_eq!(result.top_moves[1].score, EvaluationScore::Centipawn(40));
    }

    #[test]
    fn test_mate_zero_on_mated_side_favors_winner() {
        // Scholar's mate, black to move and checkmated.
        let fen = "r1bqkb1r/pppp1Qpp/2n2n2/4p3/2B1P3/8/PPPP1PPP/RNB1K1NR b KQkq - 0 4";
        let position = position_from_fen(fen).unwrap();
        assert!(position.is_checkmate());
        let lines = vec![PvLine {
            pv: Vec::new(),
            cp: None,
            mate: Some(0),
        }];

        let result = build_result(fen, 0, position.turn(), &position, &lines);
        assert_eq!(result.evaluation, EvaluationScore::Mate(1));
        assert_eq!(bar_position(result.evaluation), 100.0);
        assert!(result.top_moves.is_empty());
    }

    #[test]
    fn test_build_result_without_lines() {
        let result = build_result("startpos", 10, Color::White, &Chess::default(), &[]);
        assert_eq!(result.evaluation, EvaluationScore::Centipawn(0));
        assert!(result.top_moves.is_empty());
    }
}
