// Prometheus metrics definitions for the worm arena.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Gauges ───────────────────────────────────────────────────────

    /// Games currently being simulated.
    pub static ref ACTIVE_GAMES: IntGauge =
        IntGauge::new("worm_active_games", "Games currently running").unwrap();

    // ── Counters ─────────────────────────────────────────────────────

    /// Total games started, by format (solo, 1v1, ffa).
    pub static ref GAMES_STARTED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("worm_games_started_total", "Total games started"),
        &["format"],
    )
    .unwrap();

    /// Total games completed, by end reason.
    pub static ref GAMES_COMPLETED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("worm_games_completed_total", "Total games completed"),
        &["end_reason"],
    )
    .unwrap();

    /// Total games aborted by an engine error, by format.
    pub static ref GAMES_ERRORED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("worm_games_errored_total", "Total games aborted by an error"),
        &["format"],
    )
    .unwrap();

    /// Decisions replaced by STAY, by reason.
    pub static ref DECISION_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("worm_decision_failures_total", "Decisions replaced by STAY"),
        &["reason"],
    )
    .unwrap();

    /// Collectibles spawned, by kind.
    pub static ref COLLECTIBLES_SPAWNED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("worm_collectibles_spawned_total", "Collectibles spawned"),
        &["kind"],
    )
    .unwrap();

    /// Collectibles collected, by kind.
    pub static ref COLLECTIBLES_COLLECTED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("worm_collectibles_collected_total", "Collectibles collected"),
        &["kind"],
    )
    .unwrap();

    /// Participants removed from play, by cause (crashed, deactivated).
    pub static ref PLAYERS_ELIMINATED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("worm_players_eliminated_total", "Participants removed from play"),
        &["cause"],
    )
    .unwrap();

    // ── Histograms ───────────────────────────────────────────────────

    /// Wall-clock game duration in seconds, by format.
    pub static ref GAME_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("worm_game_duration_seconds", "Game duration in seconds")
            .buckets(vec![0.1, 1.0, 5.0, 30.0, 60.0, 300.0, 900.0]),
        &["format"],
    )
    .unwrap();

    /// Per-turn processing time in milliseconds, decision round included.
    pub static ref TURN_DURATION_MS: Histogram = Histogram::with_opts(
        HistogramOpts::new("worm_turn_duration_ms", "Per-turn processing time in ms")
            .buckets(vec![0.1, 0.5, 1.0, 5.0, 25.0, 100.0, 500.0, 1000.0, 5000.0]),
    )
    .unwrap();
}

/// Register all metrics with the custom registry. Call once at startup.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(ACTIVE_GAMES.clone()),
        Box::new(GAMES_STARTED_TOTAL.clone()),
        Box::new(GAMES_COMPLETED_TOTAL.clone()),
        Box::new(GAMES_ERRORED_TOTAL.clone()),
        Box::new(DECISION_FAILURES_TOTAL.clone()),
        Box::new(COLLECTIBLES_SPAWNED_TOTAL.clone()),
        Box::new(COLLECTIBLES_COLLECTED_TOTAL.clone()),
        Box::new(PLAYERS_ELIMINATED_TOTAL.clone()),
        Box::new(GAME_DURATION_SECONDS.clone()),
        Box::new(TURN_DURATION_MS.clone()),
    ];

    for c in collectors {
        // Registering twice (tests, repeated runs) is harmless.
        let _ = REGISTRY.register(c);
    }
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {e}");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Label for a game by participant count.
pub fn format_label(players: usize) -> &'static str {
    match players {
        0 | 1 => "solo",
        2 => "1v1",
        _ => "ffa",
    }
}
