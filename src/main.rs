use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use tracing_subscriber::{fmt, EnvFilter};

use policy_replicator::replay;
use policy_replicator::rules::StatementParser;
use policy_replicator::settings::Settings;
use policy_replicator::store::SqlStore;
use policy_replicator::transform::Replicator;

#[derive(Parser, Debug)]
#[command(
    name = "policy-replicator",
    version,
    about = "Mirrors directory account policies into a key-value store"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// JSON-lines changelog to replay (overrides replay.changelog_path)
    #[arg(long)]
    changelog: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");

    let changelog = match cli.changelog.or(settings.replay.changelog_path.clone()) {
        Some(path) => path,
        None => {
            tracing::warn!("No changelog given; pass --changelog or set replay.changelog_path");
            return Ok(());
        }
    };

    // init store (database)
    let store = SqlStore::connect(&settings.database).await.into_diagnostic()?;
    let parser = StatementParser::new(settings.rules.types.clone());
    let replicator = Replicator::new(Arc::new(store), parser);

    let stats = replay::replay_file(&replicator, &changelog, settings.replay.stop_on_error).await?;
    if stats.failed > 0 {
        return Err(miette::miette!(
            "{} changelog entr{} failed to apply",
            stats.failed,
            if stats.failed == 1 { "y" } else { "ies" }
        ));
    }
    Ok(())
}
