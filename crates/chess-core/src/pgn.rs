//! PGN loading. Parses a game-record string into a fully replayed `GameRecord`.
//!
//! Only the mainline is replayed; comments, NAGs and variations are skipped.
//! Loading is all-or-nothing: the first illegal move aborts the whole game.

use std::ops::ControlFlow;

use pgn_reader::{RawTag, Reader, SanPlus, Skip, Visitor};
use shakmaty::Chess;

use crate::error::PgnError;
use crate::game_data::{GameMetadata, GameRecord};
use crate::replay::Replayer;

const STANDARD_START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Tags collected during header parsing.
#[derive(Default)]
struct Headers {
    metadata: GameMetadata,
    setup: Option<String>,
    fen: Option<String>,
    seen_any: bool,
}

/// State during movetext parsing.
struct Movetext {
    metadata: GameMetadata,
    replayer: Replayer,
    had_headers: bool,
}

/// Visitor that builds a single `GameRecord`.
struct RecordBuilder;

impl Visitor for RecordBuilder {
    type Tags = Headers;
    type Movetext = Movetext;
    type Output = Result<GameRecord, PgnError>;

    fn begin_tags(&mut self) -> ControlFlow<Self::Output, Headers> {
        ControlFlow::Continue(Headers {
            metadata: GameMetadata {
                white: "Unknown".to_string(),
                black: "Unknown".to_string(),
                result: "*".to_string(),
                ..GameMetadata::default()
            },
            ..Headers::default()
        })
    }

    fn tag(&mut self, tags: &mut Headers, name: &[u8], value: RawTag<'_>) -> ControlFlow<Self::Output> {
        let value = value.decode_utf8_lossy().into_owned();
        tags.seen_any = true;
        match name {
            b"White" => tags.metadata.white = value,
            b"Black" => tags.metadata.black = value,
            b"Result" => tags.metadata.result = value,
            b"Date" => tags.metadata.date = Some(value),
            b"TimeControl" => tags.metadata.time_control = Some(value),
            b"ECO" => tags.metadata.eco = Some(value),
            b"Event" => tags.metadata.event = Some(value),
            b"Link" => tags.metadata.link = Some(value),
            b"SetUp" => tags.setup = Some(value),
            b"FEN" => tags.fen = Some(value),
            _ => {}
        }
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, tags: Headers) -> ControlFlow<Self::Output, Movetext> {
        // A FEN tag counts even when SetUp is missing; SetUp "0" forces the standard start.
        let start = match (tags.setup.as_deref(), tags.fen.as_deref()) {
            (Some("0"), _) | (_, None) => Ok(Replayer::new(Chess::default())),
            (_, Some(fen)) if fen.trim() == STANDARD_START_FEN => Ok(Replayer::new(Chess::default())),
            (_, Some(fen)) => Replayer::from_fen(fen),
        };

        match start {
            Ok(replayer) => ControlFlow::Continue(Movetext {
                metadata: tags.metadata,
                replayer,
                had_headers: tags.seen_any,
            }),
            Err(e) => ControlFlow::Break(Err(e)),
        }
    }

    fn san(&mut self, movetext: &mut Movetext, san_plus: SanPlus) -> ControlFlow<Self::Output> {
        match movetext.replayer.push_san(&san_plus.san) {
            Ok(()) => ControlFlow::Continue(()),
            Err(e) => ControlFlow::Break(Err(e)),
        }
    }

    fn begin_variation(&mut self, _movetext: &mut Movetext) -> ControlFlow<Self::Output, Skip> {
        ControlFlow::Continue(Skip(true))
    }

    fn end_game(&mut self, movetext: Movetext) -> Self::Output {
        if !movetext.had_headers && movetext.replayer.ply() == 0 {
            return Err(PgnError::Empty);
        }
        Ok(movetext.replayer.finish(movetext.metadata))
    }
}

/// Parse the first game in `pgn` into a `GameRecord`.
pub fn load_pgn(pgn: &str) -> Result<GameRecord, PgnError> {
    if pgn.trim().is_empty() {
        return Err(PgnError::Empty);
    }

    let mut reader = Reader::new(pgn.as_bytes());
    match reader.read_game(&mut RecordBuilder) {
        Ok(Some(result)) => result,
        Ok(None) => Err(PgnError::Empty),
        Err(e) => Err(PgnError::Io(e.to_string())),
    }
}

/// Parse every game in a multi-game PGN. Stops at the first failure.
pub fn load_all(pgn: &str) -> Result<Vec<GameRecord>, PgnError> {
    let mut reader = Reader::new(pgn.as_bytes());
    let mut games = Vec::new();
    loop {
        match reader.read_game(&mut RecordBuilder) {
            Ok(Some(result)) => games.push(result?),
            Ok(None) => break,
            Err(e) => return Err(PgnError::Io(e.to_string())),
        }
    }
    if games.is_empty() {
        return Err(PgnError::Empty);
    }
    Ok(games)
}
