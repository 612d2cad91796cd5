// Command-line configuration, loaded from CLI flags and environment variables.

use std::path::PathBuf;

use crate::error::SetupError;

/// Where the binary reads its inputs and writes its report.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Game properties file (rules and `playground.file`).
    pub game_config: PathBuf,
    /// Players properties file, one `name=strategy` per line.
    pub players_config: PathBuf,
    pub report_dir: PathBuf,
    /// Overrides `game.seed` from the game properties.
    pub seed: Option<u64>,
    /// Print the Prometheus text exposition once the game is over.
    pub print_metrics: bool,
}

impl Config {
    /// Load configuration from CLI arguments and environment variables.
    ///
    /// CLI flags take precedence over the environment:
    /// - `--game <FILE>` / `WORM_GAME_CONFIG` (required)
    /// - `--players <FILE>` / `WORM_PLAYERS_CONFIG` (required)
    /// - `--report-dir <DIR>` / `WORM_REPORT_DIR` (default: `reports`)
    /// - `--seed <N>`
    /// - `--metrics`
    pub fn load() -> Result<Self, SetupError> {
        let args: Vec<String> = std::env::args().collect();
        Self::from_args(&args, |key| std::env::var(key).ok())
    }

    pub fn from_args<F>(args: &[String], env: F) -> Result<Self, SetupError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let game_config = Self::parse_cli_value(args, "--game")
            .or_else(|| env("WORM_GAME_CONFIG"))
            .map(PathBuf::from)
            .ok_or_else(|| SetupError::MissingSetting("--game".into()))?;

        let players_config = Self::parse_cli_value(args, "--players")
            .or_else(|| env("WORM_PLAYERS_CONFIG"))
            .map(PathBuf::from)
            .ok_or_else(|| SetupError::MissingSetting("--players".into()))?;

        let report_dir = Self::parse_cli_value(args, "--report-dir")
            .or_else(|| env("WORM_REPORT_DIR"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("reports"));

        let seed = match Self::parse_cli_value(args, "--seed") {
            Some(v) => Some(v.parse().map_err(|_| SetupError::Config {
                key: "--seed".into(),
                value: v.clone(),
                reason: "expected an unsigned integer".into(),
            })?),
            None => None,
        };

        let print_metrics = args.iter().any(|a| a == "--metrics");

        Ok(Config {
            game_config,
            players_config,
            report_dir,
            seed,
            print_metrics,
        })
    }

    /// Parse a CLI flag value like `--seed 42`.
    fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }
}
