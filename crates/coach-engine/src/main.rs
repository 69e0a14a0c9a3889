//! coach-replay
//!
//! Terminal front end: load a PGN, step through it with engine analysis
//! following the cursor, run a full review, and talk to the coach.

use std::future::Future;
use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use coach_engine::clients::{
    ChatCompletionsClient, CoachClient, HttpAnalyzer, PositionAnalyzer, StockfishAnalyzer, TextStreamClient,
};
use coach_engine::{
    review_game, AnalysisBackend, AnalysisOrchestrator, AnalysisOutcome, ChangeNotifier, CoachProtocol, CoachSession,
    EngineConfig, FailurePolicy, ReplaySession, Role, SessionError, TurnOutcome,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const HELP: &str = "\
commands:
  load <file>     load a PGN file
  n | p           next / previous move
  start | end     jump to the initial position / last move
  j <ply>         jump to ply (-1 is the initial position)
  a               analyse the current position now
  auto on|off     toggle analysis on every move
  review          evaluate and annotate the whole game
  ask <text>      ask the coach about the current position
  retry <id>      resend a failed question
  log             show the conversation
  q               quit";

/// Parse --pgn <file> from CLI args
fn parse_pgn_arg() -> Option<String> {
    let args: Vec<String> = std::env::args().collect();
    args.iter()
        .position(|a| a == "--pgn")
        .and_then(|i| args.get(i + 1))
        .cloned()
}

async fn build_analyzer(config: &EngineConfig) -> anyhow::Result<Arc<dyn PositionAnalyzer>> {
    Ok(match config.analysis_backend {
        AnalysisBackend::Stockfish => {
            let engine = StockfishAnalyzer::spawn(
                &config.stockfish_path,
                config.stockfish_threads,
                config.stockfish_hash_mb,
                config.multipv,
            )
            .await
            .with_context(|| format!("Failed to start Stockfish at {}", config.stockfish_path))?;
            info!(path = %config.stockfish_path, "Stockfish ready");
            Arc::new(engine)
        }
        AnalysisBackend::Http => {
            info!(url = %config.analysis_api_url, "Using HTTP analysis service");
            Arc::new(HttpAnalyzer::new(&config.analysis_api_url, config.multipv, config.request_timeout)?)
        }
    })
}

fn build_coach_client(config: &EngineConfig) -> Result<Arc<dyn CoachClient>, coach_engine::TransportError> {
    Ok(match config.coach_protocol {
        CoachProtocol::OpenAi => Arc::new(ChatCompletionsClient::new(
            &config.coach_api_url,
            config.coach_api_key.as_deref(),
            &config.coach_model,
            config.request_timeout,
        )?),
        CoachProtocol::Text => Arc::new(TextStreamClient::new(&config.coach_api_url, config.request_timeout)?),
    })
}

fn print_position(session: &ReplaySession) {
    let position = session.current_position();
    match session.current_move() {
        Some(mv) => {
            let dots = if mv.ply % 2 == 0 { "." } else { "..." };
            println!("[{}] {}{} {}   {}", mv.ply, mv.move_number(), dots, mv.san, position.fen());
        }
        None => println!("[start]   {}", position.fen()),
    }
}

fn print_analysis(session: &ReplaySession) {
    let Some(analysis) = session.current_analysis() else {
        return;
    };
    if let Some(eval) = session.eval_display() {
        let filled = (eval.bar / 5.0).round() as usize;
        println!(
            "  eval {:>7}  [{}{}]  depth {}",
            eval.text,
            "#".repeat(filled),
            ".".repeat(20 - filled.min(20)),
            analysis.depth
        );
    }
    for (i, candidate) in analysis.top_moves.iter().enumerate() {
        let name = candidate.san.as_deref().unwrap_or(&candidate.uci);
        println!("  {}. {:<8} {}", i + 1, name, chess_core::normalize(candidate.score));
    }
}

async fn await_analysis(session: &ReplaySession, handle: tokio::task::JoinHandle<AnalysisOutcome>) {
    match handle.await {
        Ok(AnalysisOutcome::Applied(_)) => print_analysis(session),
        Ok(AnalysisOutcome::Failed { error, .. }) => println!("  analysis failed: {error}"),
        Ok(AnalysisOutcome::Stale { .. }) => {}
        Err(e) => warn!(error = %e, "Analysis task panicked"),
    }
}

/// Drive a coach turn while echoing the reply as it streams in.
async fn run_turn<F>(coach: &CoachSession, mut changes: watch::Receiver<u64>, turn: F)
where
    F: Future<Output = Result<TurnOutcome, SessionError>>,
{
    let newest_before = coach.conversation_log().last().map(|m| m.id).unwrap_or(0);
    let mut printed = 0usize;
    let echo = |printed: &mut usize| {
        let reply = coach
            .conversation_log()
            .into_iter()
            .rev()
            .find(|m| m.role == Role::Assistant && m.id > newest_before);
        if let Some(reply) = reply {
            if reply.content.len() > *printed {
                print!("{}", &reply.content[*printed..]);
                let _ = std::io::stdout().flush();
                *printed = reply.content.len();
            }
        }
    };

    tokio::pin!(turn);
    loop {
        tokio::select! {
            outcome = &mut turn => {
                echo(&mut printed);
                println!();
                match outcome {
                    Ok(TurnOutcome::Settled { .. }) => {}
                    Ok(TurnOutcome::Failed { message_id, error }) => {
                        println!("coach error: {error} (retry {message_id})");
                    }
                    Err(e) => println!("{e}"),
                }
                return;
            }
            Ok(()) = changes.changed() => echo(&mut printed),
        }
    }
}

fn print_log(coach: &CoachSession) {
    for msg in coach.conversation_log() {
        let who = match msg.role {
            Role::User => "you",
            Role::Assistant => "coach",
            Role::System => "system",
        };
        let flag = if msg.error { "  [failed]" } else { "" };
        println!("#{} {} {}: {}{}", msg.id, msg.created_at.format("%H:%M:%S"), who, msg.content, flag);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = EngineConfig::from_env()?;
    let analyzer = build_analyzer(&config).await?;

    let notifier = ChangeNotifier::new();
    let policy = if config.retain_analysis_on_error {
        FailurePolicy::RetainLastGood
    } else {
        FailurePolicy::Clear
    };
    let orchestrator =
        AnalysisOrchestrator::new(analyzer.clone(), config.analysis_depth, notifier.clone()).with_failure_policy(policy);
    let session = ReplaySession::new(orchestrator, notifier.clone())
        .with_eval_bar_cap(config.eval_bar_cap)
        .with_auto_analysis(config.auto_analysis);

    let coach = match build_coach_client(&config) {
        Ok(client) => Some(CoachSession::new(client, notifier.clone())),
        Err(e) => {
            warn!(error = %e, "Coach disabled");
            None
        }
    };

    if let Some(path) = parse_pgn_arg() {
        let text = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {path}"))?;
        if let Some(handle) = session.load_pgn(&text)? {
            print_position(&session);
            await_analysis(&session, handle).await;
        }
    }

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (cmd, arg) = line.split_once(' ').map(|(c, a)| (c, a.trim())).unwrap_or((line, ""));

        let navigated = match cmd {
            "" => continue,
            "q" | "quit" => break,
            "help" => {
                println!("{HELP}");
                continue;
            }
            "n" => session.next(),
            "p" => session.previous(),
            "start" => session.go_to_start(),
            "end" => session.go_to_end(),
            "j" => match arg.parse::<isize>() {
                Ok(ply) => session.jump_to(ply),
                Err(_) => {
                    println!("usage: j <ply>");
                    continue;
                }
            },
            "load" => {
                match tokio::fs::read_to_string(arg).await {
                    Ok(text) => match session.load_pgn(&text) {
                        Ok(handle) => {
                            let record = session.record();
                            println!(
                                "{} vs {} ({}), {} plies",
                                record.metadata.white,
                                record.metadata.black,
                                record.metadata.result,
                                record.len()
                            );
                            print_position(&session);
                            if let Some(handle) = handle {
                                await_analysis(&session, handle).await;
                            }
                        }
                        Err(e) => println!("could not load {arg}: {e}"),
                    },
                    Err(e) => println!("could not read {arg}: {e}"),
                }
                continue;
            }
            "a" => {
                let handle = session.reanalyze();
                await_analysis(&session, handle).await;
                continue;
            }
            "auto" => {
                session.set_auto_analysis(arg != "off");
                println!("auto-analysis {}", if session.auto_analysis() { "on" } else { "off" });
                continue;
            }
            "review" => {
                let record = session.record();
                match review_game(&record, analyzer.as_ref(), config.analysis_depth, config.review_interval).await {
                    Ok(review) => {
                        for mv in &review.moves {
                            println!(
                                "{:>3}. {:<8}{:<3} {:<11} {}",
                                mv.ply / 2 + 1,
                                mv.san,
                                mv.annotation.glyph().unwrap_or(""),
                                mv.annotation.as_str(),
                                mv.best_move.as_deref().map(|b| format!("best {b}")).unwrap_or_default()
                            );
                        }
                        println!(
                            "accuracy: white {:.1}, black {:.1}",
                            review.white.accuracy, review.black.accuracy
                        );
                    }
                    Err(e) => println!("review failed: {e}"),
                }
                continue;
            }
            "ask" | "retry" | "log" => {
                let Some(coach) = &coach else {
                    println!("coach is not configured");
                    continue;
                };
                match cmd {
                    "log" => print_log(coach),
                    "ask" => {
                        let position = session.current_position();
                        let question = format!("Position (FEN {}): {arg}", position.fen());
                        run_turn(coach, session.subscribe(), coach.submit_turn(&question)).await;
                    }
                    _ => match arg.parse::<u64>() {
                        Ok(id) => run_turn(coach, session.subscribe(), coach.retry_turn(id)).await,
                        Err(_) => println!("usage: retry <id>"),
                    },
                }
                continue;
            }
            other => {
                println!("unknown command: {other}");
                continue;
            }
        };

        match navigated {
            Some(nav) => {
                print_position(&session);
                if let Some(handle) = nav.analysis {
                    await_analysis(&session, handle).await;
                }
            }
            None => print_position(&session),
        }
    }

    Ok(())
}
