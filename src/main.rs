use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use worm_arena::config::Config;
use worm_arena::engine::runner;
use worm_arena::error::GameError;
use worm_arena::metrics;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), GameError> {
    let config = Config::load()?;
    metrics::register_metrics();

    let mut setup = runner::load_setup(&config.game_config, &config.players_config)?;
    if config.seed.is_some() {
        setup.seed = config.seed;
    }

    let report = runner::run_game(setup).await?;

    match report.save(&config.report_dir) {
        Ok(path) => tracing::info!(path = %path.display(), "Report written"),
        Err(e) => tracing::error!(dir = %config.report_dir.display(), "Failed to write report: {e}"),
    }

    for leader in report.leaders() {
        tracing::info!(player_name = %leader.name, score = leader.score, "Top score");
    }

    if config.print_metrics {
        println!("{}", metrics::gather_metrics());
    }
    Ok(())
}
