// Headless game runner: loads the arena and configuration, seats the
// participants, plays the game to the end and hands back the report.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use uuid::Uuid;

use super::arena::Arena;
use super::config::{parse_properties, GameConfig};
use super::game::Game;
use super::strategy::{create_strategy, Strategy};
use crate::error::{GameError, SetupError};
use crate::metrics;
use crate::report::{GameReport, PlayerSummary, ReportHeader, ReportRecorder};

/// One line of the players configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerEntry {
    pub name: String,
    pub strategy: String,
}

/// Everything needed to start a game with the built-in strategies.
#[derive(Debug, Clone)]
pub struct GameSetup {
    pub arena: Arena,
    pub config: GameConfig,
    pub players: Vec<PlayerEntry>,
    /// Overrides `game.seed` when set.
    pub seed: Option<u64>,
}

/// Parse `name=strategy` lines, keeping file order.
pub fn parse_players(text: &str) -> Result<Vec<PlayerEntry>, SetupError> {
    parse_properties(text)
        .into_iter()
        .map(|(name, strategy)| {
            if strategy.is_empty() {
                return Err(SetupError::Config {
                    key: name,
                    value: strategy,
                    reason: "a strategy name is required".into(),
                });
            }
            Ok(PlayerEntry { name, strategy })
        })
        .collect()
}

fn read_file(path: &Path) -> Result<String, SetupError> {
    std::fs::read_to_string(path).map_err(|source| SetupError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Read and parse an arena layout file.
pub fn load_arena(path: &Path) -> Result<Arena, SetupError> {
    let text = read_file(path)?;
    Ok(Arena::parse(&text)?)
}

/// Load game and player configuration files. A relative `playground.file` is
/// resolved against the game configuration's directory.
pub fn load_setup(game_config: &Path, players: &Path) -> Result<GameSetup, SetupError> {
    let config = GameConfig::parse(&read_file(game_config)?)?;
    let playground = config
        .playground_file
        .as_deref()
        .ok_or_else(|| SetupError::MissingSetting(super::config::KEY_PLAYGROUND_FILE.into()))?;
    let mut arena_path = PathBuf::from(playground);
    if arena_path.is_relative() {
        if let Some(dir) = game_config.parent() {
            arena_path = dir.join(arena_path);
        }
    }
    let arena = load_arena(&arena_path)?;
    let players = parse_players(&read_file(players)?)?;

    tracing::info!(
        arena = %arena_path.display(),
        players = players.len(),
        "Loaded game setup"
    );

    Ok(GameSetup {
        arena,
        config,
        players,
        seed: None,
    })
}

/// Build the built-in strategies named in `setup` and play the game.
pub async fn run_game(setup: GameSetup) -> Result<GameReport, GameError> {
    let seed = setup
        .seed
        .or(setup.config.seed)
        .unwrap_or_else(rand::random);

    let entries = setup
        .players
        .into_iter()
        .enumerate()
        .map(|(i, p)| {
            let strategy = create_strategy(&p.strategy, seed.wrapping_add(i as u64 + 1))?;
            Ok((p.name, strategy))
        })
        .collect::<Result<Vec<_>, SetupError>>()?;

    run_game_with(setup.arena, setup.config, entries, seed).await
}

/// Play a full game with caller-supplied decision modules. The seed drives
/// every random choice the engine makes.
pub async fn run_game_with(
    arena: Arena,
    config: GameConfig,
    entries: Vec<(String, Box<dyn Strategy>)>,
    seed: u64,
) -> Result<GameReport, GameError> {
    let arena = Arc::new(arena);
    let started_at = Utc::now();
    let game_id = Uuid::new_v4().to_string();
    let format = metrics::format_label(entries.len());

    let mut game = Game::new(arena.clone(), config, entries, StdRng::seed_from_u64(seed))?;

    tracing::info!(game_id = %game_id, seed, format, "Game started");
    metrics::GAMES_STARTED_TOTAL.with_label_values(&[format]).inc();
    metrics::ACTIVE_GAMES.inc();
    let clock = Instant::now();

    let mut recorder = ReportRecorder::new();
    let outcome = game.play(&mut recorder).await;

    metrics::ACTIVE_GAMES.dec();
    metrics::GAME_DURATION_SECONDS
        .with_label_values(&[format])
        .observe(clock.elapsed().as_secs_f64());

    let end_reason = match outcome {
        Ok(reason) => reason,
        Err(e) => {
            metrics::GAMES_ERRORED_TOTAL.with_label_values(&[format]).inc();
            return Err(e);
        }
    };
    metrics::GAMES_COMPLETED_TOTAL
        .with_label_values(&[end_reason.label()])
        .inc();

    let players = game
        .players()
        .iter()
        .filter_map(|p| {
            let worm = game.worm(p.id)?;
            Some(PlayerSummary {
                id: p.id,
                name: p.name.clone(),
                strategy: p.strategy.clone(),
                score: worm.score(),
                length: worm.length(),
                active: worm.is_active(),
                decisions: worm.decisions().values().copied().collect(),
            })
        })
        .collect();

    let header = ReportHeader {
        game_id,
        started_at,
        seed,
        arena: arena.to_lines(),
        turns_played: game.turn(),
        end_reason,
    };
    let report = recorder.into_report(header, players);
    game.mark_reported()?;

    for p in &report.players {
        tracing::info!(
            game_id = %report.game_id,
            player = %p.id,
            player_name = %p.name,
            score = p.score,
            length = p.length,
            "Final score"
        );
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_players_keeps_order() {
        let players = parse_players("# comment\nzed=idle\nanna = run-away\n").unwrap();
        assert_eq!(
            players,
            vec![
                PlayerEntry {
                    name: "zed".into(),
                    strategy: "idle".into()
                },
                PlayerEntry {
                    name: "anna".into(),
                    strategy: "run-away".into()
                },
            ]
        );
    }

    #[test]
    fn test_parse_players_requires_strategy() {
        assert!(matches!(
            parse_players("lonely="),
            Err(SetupError::Config { .. })
        ));
    }

    #[test]
    fn test_load_arena_missing_file() {
        let err = load_arena(Path::new("/definitely/not/here.txt")).unwrap_err();
        assert!(matches!(err, SetupError::Io { .. }));
    }

    #[tokio::test]
    async fn test_unknown_strategy_fails_before_turn_zero() {
        let setup = GameSetup {
            arena: Arena::parse("#####\n#A B#\n#####").unwrap(),
            config: GameConfig::default(),
            players: vec![
                PlayerEntry {
                    name: "a".into(),
                    strategy: "idle".into(),
                },
                PlayerEntry {
                    name: "b".into(),
                    strategy: "genius".into(),
                },
            ],
            seed: Some(3),
        };
        let err = run_game(setup).await.unwrap_err();
        assert!(matches!(
            err,
            GameError::Setup(SetupError::UnknownStrategy(ref s)) if s == "genius"
        ));
    }

    #[tokio::test]
    async fn test_run_game_produces_report() {
        let mut config = GameConfig::default();
        config.max_turns = 5;
        let setup = GameSetup {
            arena: Arena::parse("#######\n#A   B#\n#     #\n#######").unwrap(),
            config,
            players: vec![
                PlayerEntry {
                    name: "a".into(),
                    strategy: "idle".into(),
                },
                PlayerEntry {
                    name: "b".into(),
                    strategy: "idle".into(),
                },
            ],
            seed: Some(11),
        };
        let report = run_game(setup).await.unwrap();
        assert_eq!(report.seed, 11);
        assert_eq!(report.turns_played, 5);
        assert_eq!(report.players.len(), 2);
        // Both idle worms are removed for inactivity before moving on turn 4.
        assert_eq!(report.players[0].decisions.len(), 4);
        assert!(!report.players[0].active);
        assert_eq!(report.arena[1], "#A   B#");
        assert!(report.events.windows(2).all(|w| w[0].turn() <= w[1].turn()));
    }
}
