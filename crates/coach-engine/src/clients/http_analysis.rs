use std::time::Duration;

use async_trait::async_trait;
use chess_core::replay::{position_from_fen, uci_to_san};
use chess_core::EvaluationScore;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::PositionAnalyzer;
use crate::analysis::{AnalysisResult, CandidateMove};
use crate::error::TransportError;

/// Client for a remote analysis service exposing `POST /analyze/position`.
/// The service reports white-relative scores.
pub struct HttpAnalyzer {
    client: Client,
    base_url: String,
    multipv: u32,
}

#[derive(Serialize)]
struct PositionRequest<'a> {
    fen: &'a str,
    depth: u32,
    multipv: u32,
}

#[derive(Debug, Deserialize)]
struct WireEvaluation {
    #[serde(rename = "type")]
    kind: String,
    value: i32,
}

#[derive(Debug, Deserialize)]
struct WireTopMove {
    #[serde(rename = "Move")]
    uci: String,
    #[serde(rename = "Centipawn")]
    centipawn: Option<i32>,
    #[serde(rename = "Mate")]
    mate: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct WirePositionAnalysis {
    evaluation: WireEvaluation,
    #[serde(default)]
    top_moves: Vec<WireTopMove>,
}

impl HttpAnalyzer {
    pub fn new(base_url: &str, multipv: u32, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent("ChessCoach/1.0")
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            multipv: multipv.clamp(1, 5),
        })
    }

    fn position_url(&self) -> String {
        format!("{}/analyze/position", self.base_url)
    }
}

#[async_trait]
impl PositionAnalyzer for HttpAnalyzer {
    async fn analyze_position(&self, fen: &str, depth: u32) -> Result<AnalysisResult, TransportError> {
        let resp = self
            .client
            .post(self.position_url())
            .json(&PositionRequest {
                fen,
                depth,
                multipv: self.multipv,
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.text().await?;
        decode_position_analysis(fen, depth, &body)
    }
}

fn decode_position_analysis(fen: &str, depth: u32, body: &str) -> Result<AnalysisResult, TransportError> {
    let wire: WirePositionAnalysis = serde_json::from_str(body)?;

    let evaluation = match wire.evaluation.kind.as_str() {
        "cp" => EvaluationScore::Centipawn(wire.evaluation.value),
        "mate" => EvaluationScore::Mate(wire.evaluation.value),
        other => {
            return Err(TransportError::MalformedPayload(format!(
                "unknown evaluation type '{other}'"
            )))
        }
    };

    let position = position_from_fen(fen).ok();
    let top_moves = wire
        .top_moves
        .into_iter()
        .filter_map(|m| {
            let score = match (m.mate, m.centipawn) {
                (Some(n), _) => EvaluationScore::Mate(n),
                (None, Some(cp)) => EvaluationScore::Centipawn(cp),
                (None, None) => return None,
            };
            Some(CandidateMove {
                san: position.as_ref().and_then(|p| uci_to_san(p, &m.uci)),
                pv: vec![m.uci.clone()],
                uci: m.uci,
                score,
            })
        })
        .collect();

    Ok(AnalysisResult {
        fen: fen.to_string(),
        depth,
        evaluation,
        top_moves,
    })
}
