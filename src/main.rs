use anyhow::Result;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;

use pumpreader::cli::{build_cli, handle_offline_commands, handle_subcommands};
use pumpreader::output::{ConsoleFormatter, SnapshotFormatter};
use pumpreader::{Aggregator, Config, SensorRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = build_cli().get_matches();
    let config = Config::from_matches(&matches)?;

    if handle_offline_commands(&matches, &config)? {
        return Ok(());
    }

    info!("🚀 {} v{} starting", config.app_name, pumpreader::VERSION);
    let registry = Arc::new(SensorRegistry::open(&config)?);
    let aggregator = Aggregator::new(Arc::clone(&registry));

    if handle_subcommands(&matches, &aggregator).await? {
        return Ok(());
    }

    registry.start();

    #[cfg(feature = "api")]
    let mut api = if config.api.enabled {
        let mut api = pumpreader::services::ApiService::new(aggregator.clone());
        match api.start(&config.api).await {
            Ok(()) => Some(api),
            Err(e) => {
                error!("❌ Failed to start HTTP API: {}", e);
                None
            }
        }
    } else {
        info!("ℹ️  HTTP API disabled");
        None
    };

    let status_every = matches
        .get_one::<String>("status-every")
        .map(|s| s.parse::<u64>())
        .transpose()?
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs);

    info!("✅ Pump reader ready, press Ctrl+C to stop");
    match status_every {
        Some(period) => {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        print!("{}", ConsoleFormatter.format_status(&aggregator.status_view()));
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }
        None => {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("⚠️  Unable to listen for shutdown signal: {}", e);
            }
        }
    }

    info!("🛑 Shutdown requested");
    #[cfg(feature = "api")]
    if let Some(api) = api.as_mut() {
        api.stop().await;
    }
    registry.shutdown().await;

    for (id, counters) in aggregator.counters() {
        info!(
            "📈 {}: {} polls, {} faults, {} parse failures",
            id, counters.polls, counters.faults, counters.parse_failures
        );
    }
    info!("👋 Pump reader stopped");
    Ok(())
}
