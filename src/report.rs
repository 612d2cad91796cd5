// Game reports: the ordered audit trail of every turn event plus the final
// standings, compressed for storage.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;

use crate::engine::arena::Move;
use crate::engine::event::TurnEvent;
use crate::engine::game::EndReason;
use crate::engine::player::PlayerId;

/// Append-only consumer of turn events.
pub trait ReportSink: Send {
    fn record(&mut self, event: &TurnEvent);
}

/// Keeps every event in arrival order.
#[derive(Debug, Default)]
pub struct ReportRecorder {
    events: Vec<TurnEvent>,
}

impl ReportRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[TurnEvent] {
        &self.events
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Close the log into a full report.
    pub fn into_report(self, header: ReportHeader, players: Vec<PlayerSummary>) -> GameReport {
        GameReport {
            game_id: header.game_id,
            started_at: header.started_at,
            seed: header.seed,
            arena: header.arena,
            turns_played: header.turns_played,
            end_reason: header.end_reason,
            players,
            events: self.events,
        }
    }
}

impl ReportSink for ReportRecorder {
    fn record(&mut self, event: &TurnEvent) {
        self.events.push(event.clone());
    }
}

/// Game-level facts known once the game has ended.
#[derive(Debug, Clone)]
pub struct ReportHeader {
    pub game_id: String,
    pub started_at: DateTime<Utc>,
    pub seed: u64,
    pub arena: Vec<String>,
    pub turns_played: u32,
    pub end_reason: EndReason,
}

/// Final standing of one participant.
#[derive(Debug, Clone, Serialize)]
pub struct PlayerSummary {
    pub id: PlayerId,
    pub name: String,
    pub strategy: String,
    pub score: i32,
    pub length: usize,
    pub active: bool,
    /// Applied move per turn, turn 0 first.
    pub decisions: Vec<Move>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GameReport {
    pub game_id: String,
    pub started_at: DateTime<Utc>,
    pub seed: u64,
    pub arena: Vec<String>,
    pub turns_played: u32,
    pub end_reason: EndReason,
    pub players: Vec<PlayerSummary>,
    pub events: Vec<TurnEvent>,
}

impl GameReport {
    /// Participant(s) with the top score.
    pub fn leaders(&self) -> Vec<&PlayerSummary> {
        let Some(best) = self.players.iter().map(|p| p.score).max() else {
            return Vec::new();
        };
        self.players.iter().filter(|p| p.score == best).collect()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Gzipped JSON form of the report.
    pub fn compress(&self) -> std::io::Result<Vec<u8>> {
        let json = serde_json::to_vec(self)?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(&json)?;
        encoder.finish()
    }

    /// Store the compressed report as `<dir>/<game id>/report.json.gz`.
    pub fn save(&self, dir: &Path) -> std::io::Result<PathBuf> {
        let game_dir = dir.join(&self.game_id);
        std::fs::create_dir_all(&game_dir)?;
        let path = game_dir.join("report.json.gz");
        std::fs::write(&path, self.compress()?)?;
        Ok(path)
    }
}

/// Decompress gzipped report data back to the JSON string.
pub fn decompress_report(data: &[u8]) -> Result<String, std::io::Error> {
    let mut decoder = GzDecoder::new(data);
    let mut result = String::new();
    decoder.read_to_string(&mut result)?;
    Ok(result)
}
