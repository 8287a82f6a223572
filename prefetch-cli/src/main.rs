mod cli;
mod error;

use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use hls_prefetch_engine::{
    ControllerSnapshot, EngineConfig, HttpPrefetchBackend, PrefetchController,
};
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};
use url::Url;

use crate::cli::Args;
use crate::error::{AppError, Result};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!("Application error: {}", e);
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    init_logging(args.verbose, args.quiet)?;

    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(class) = args.network_class {
        config.initial_network_class = class;
    }
    if args.low_power {
        config.initial_low_power_mode = true;
    }
    debug!(?config, "Loaded configuration");

    let urls = parse_urls(&args.urls)?;

    let backend = HttpPrefetchBackend::new(config.http.clone())?;
    let (controller, worker) = PrefetchController::spawn_with_environment(
        Arc::new(backend.clone()),
        config.policy.clone(),
        config.initial_network_class,
        config.initial_low_power_mode,
    );

    controller.prefetch(urls.clone(), args.max_count);

    let wait = Duration::from_secs(args.wait_secs);
    tokio::select! {
        res = tokio::time::timeout(wait, controller.wait_idle()) => match res {
            Ok(res) => res?,
            Err(_) => {
                warn!(wait_secs = args.wait_secs, "Prefetch did not finish in time, cancelling");
                controller.cancel_prefetch();
            }
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, cancelling prefetch");
            controller.cancel_prefetch();
        }
    }

    let snapshot = controller.snapshot().await?;
    print_summary(&snapshot);
    for url in &urls {
        let cached = backend.cached(url).await.is_some();
        println!("  {url} cached: {cached}");
    }
    controller.stats().log_summary();

    controller.shutdown();
    if let Err(e) = worker.await {
        warn!(error = %e, "Prefetch controller task failed");
    }
    Ok(())
}

fn parse_urls(inputs: &[String]) -> Result<Vec<Url>> {
    inputs
        .iter()
        .map(|input| {
            Url::parse(input).map_err(|e| AppError::InvalidInput(format!("{input}: {e}")))
        })
        .collect()
}

fn print_summary(snapshot: &ControllerSnapshot) {
    let stats = &snapshot.stats;
    println!(
        "network: {} | low power: {} | max concurrent: {} | budget: {}",
        snapshot.network_class,
        snapshot.low_power_mode_enabled,
        snapshot.policy.max_concurrent(snapshot.network_class),
        snapshot.policy.max_items(snapshot.network_class),
    );
    println!(
        "admitted: {} | started: {} | finished: {} | dropped: {} | cancelled: {}",
        stats.admitted, stats.started, stats.finished, stats.dropped, stats.cancelled,
    );
    if !snapshot.is_idle() {
        println!(
            "left over: {} pending, {} in flight",
            snapshot.pending.len(),
            snapshot.in_flight.len()
        );
    }
}

fn init_logging(verbose: bool, quiet: bool) -> Result<()> {
    let filter = if quiet {
        EnvFilter::new("warn")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(verbose)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .map_err(|e| AppError::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_url_is_reported() {
        let err = parse_urls(&["not a url".to_string()]).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(msg) if msg.starts_with("not a url")));
    }

    #[test]
    fn urls_keep_input_order() {
        let urls = parse_urls(&[
            "https://cdn.example.com/b.m3u8".to_string(),
            "https://cdn.example.com/a.m3u8".to_string(),
        ])
        .expect("valid urls");
        assert_eq!(urls[0].path(), "/b.m3u8");
        assert_eq!(urls[1].path(), "/a.m3u8");
    }
}
