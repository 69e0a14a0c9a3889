//! Engine configuration from environment variables

use std::env;
use std::str::FromStr;
use std::time::Duration;

use chess_core::DEFAULT_EVAL_BAR_CAP;

use crate::error::ConfigError;

/// Which collaborator answers position analysis requests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AnalysisBackend {
    /// Local Stockfish binary over UCI.
    Stockfish,
    /// Remote analysis service over HTTP.
    Http,
}

/// Wire protocol spoken by the coach service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CoachProtocol {
    /// OpenAI-style chat completions with server-sent events.
    OpenAi,
    /// Plain chunked text from a `/stream_ask` endpoint.
    Text,
}

const OPENAI_API_URL: &str = "https://api.openai.com/v1";
const TEXT_COACH_API_URL: &str = "http://localhost:8000/api/coach";
const ANALYSIS_API_URL: &str = "http://localhost:8000/api";

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub analysis_backend: AnalysisBackend,

    /// Path to Stockfish binary
    pub stockfish_path: String,
    pub stockfish_threads: u32,
    pub stockfish_hash_mb: u32,

    /// Base URL of the HTTP analysis service
    pub analysis_api_url: String,

    /// Search depth per position
    pub analysis_depth: u32,

    /// Number of candidate lines to request (1..=5)
    pub multipv: u32,

    /// Request analysis automatically on every cursor change
    pub auto_analysis: bool,

    /// Keep the last good analysis when a current request fails
    pub retain_analysis_on_error: bool,

    /// Evaluation bar saturation cap in centipawns
    pub eval_bar_cap: i32,

    pub coach_protocol: CoachProtocol,

    /// Base URL of the coach service
    pub coach_api_url: String,
    pub coach_api_key: Option<String>,
    pub coach_model: String,

    pub request_timeout: Duration,

    /// Analyze every N plies during a full game review (1..=10)
    pub review_interval: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            analysis_backend: AnalysisBackend::Stockfish,
            stockfish_path: "stockfish".to_string(),
            stockfish_threads: 1,
            stockfish_hash_mb: 128,
            analysis_api_url: ANALYSIS_API_URL.to_string(),
            analysis_depth: 18,
            multipv: 3,
            auto_analysis: true,
            retain_analysis_on_error: false,
            eval_bar_cap: DEFAULT_EVAL_BAR_CAP,
            coach_protocol: CoachProtocol::OpenAi,
            coach_api_url: OPENAI_API_URL.to_string(),
            coach_api_key: None,
            coach_model: "gpt-4".to_string(),
            request_timeout: Duration::from_secs(120),
            review_interval: 1,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let analysis_backend = match env::var("ANALYSIS_BACKEND") {
            Ok(v) => match v.to_ascii_lowercase().as_str() {
                "stockfish" => AnalysisBackend::Stockfish,
                "http" => AnalysisBackend::Http,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        name: "ANALYSIS_BACKEND",
                        value: v,
                    })
                }
            },
            Err(_) => defaults.analysis_backend,
        };

        let coach_protocol = match env::var("COACH_PROTOCOL") {
            Ok(v) => match v.to_ascii_lowercase().as_str() {
                "openai" => CoachProtocol::OpenAi,
                "text" => CoachProtocol::Text,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        name: "COACH_PROTOCOL",
                        value: v,
                    })
                }
            },
            Err(_) => defaults.coach_protocol,
        };
        let coach_api_url = env::var("COACH_API_URL").unwrap_or_else(|_| match coach_protocol {
            CoachProtocol::OpenAi => OPENAI_API_URL.to_string(),
            CoachProtocol::Text => TEXT_COACH_API_URL.to_string(),
        });

        let coach_api_key = env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty());

        Ok(Self {
            analysis_backend,
            stockfish_path: env::var("STOCKFISH_PATH").unwrap_or(defaults.stockfish_path),
            stockfish_threads: parse_var("STOCKFISH_THREADS", defaults.stockfish_threads)?,
            stockfish_hash_mb: parse_var("STOCKFISH_HASH_MB", defaults.stockfish_hash_mb)?,
            analysis_api_url: env::var("ANALYSIS_API_URL").unwrap_or(defaults.analysis_api_url),
            analysis_depth: parse_var("ANALYSIS_DEPTH", defaults.analysis_depth)?,
            multipv: parse_var("ANALYSIS_MULTIPV", defaults.multipv)?.clamp(1, 5),
            auto_analysis: parse_flag("AUTO_ANALYSIS", defaults.auto_analysis)?,
            retain_analysis_on_error: parse_flag(
                "RETAIN_ANALYSIS_ON_ERROR",
                defaults.retain_analysis_on_error,
            )?,
            eval_bar_cap: parse_var("EVAL_BAR_CAP_CP", defaults.eval_bar_cap)?.max(1),
            coach_protocol,
            coach_api_url,
            coach_api_key,
            coach_model: env::var("COACH_MODEL").unwrap_or(defaults.coach_model),
            request_timeout: Duration::from_secs(parse_var("REQUEST_TIMEOUT_SECS", 120u64)?),
            review_interval: parse_var("GAME_REVIEW_INTERVAL", defaults.review_interval)?.clamp(1, 10),
        })
    }
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value: v }),
        Err(_) => Ok(default),
    }
}

fn parse_flag(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(name) {
        Ok(v) => match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue { name, value: v }),
        },
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.analysis_depth, 18);
        assert_eq!(config.multipv, 3);
        assert_eq!(config.eval_bar_cap, 800);
        assert!(config.auto_analysis);
        assert!(!config.retain_analysis_on_error);
        assert_eq!(config.coach_protocol, CoachProtocol::OpenAi);
    }

    #[test]
    fn test_parse_helpers_fall_back_when_unset() {
        assert_eq!(parse_var("COACH_ENGINE_TEST_UNSET_NUMBER", 7u32).unwrap(), 7);
        assert!(parse_flag("COACH_ENGINE_TEST_UNSET_FLAG", true).unwrap());
    }

    #[test]
    fn test_bad_values_name_the_variable() {
        std::env::set_var("COACH_ENGINE_TEST_BAD_NUMBER", "lots");
        std::env::set_var("COACH_ENGINE_TEST_BAD_FLAG", "maybe");

        let err = parse_var("COACH_ENGINE_TEST_BAD_NUMBER", 7u32).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid value for COACH_ENGINE_TEST_BAD_NUMBER: lots"
        );
        assert!(matches!(
            parse_flag("COACH_ENGINE_TEST_BAD_FLAG", true),
            Err(ConfigError::InvalidValue { name: "COACH_ENGINE_TEST_BAD_FLAG", .. })
        ));
    }
}
