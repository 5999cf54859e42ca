use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use clap::Parser;
use clap_serde_derive::ClapSerde;
use tracing::{error, info};

use crate::config::Config;
use crate::idle::IdleTracker;
use crate::inference::loader::HubLoader;
use crate::inference::model_config::GenerationConfig;
use crate::worker::{Worker, WorkerLimits};

mod api;
mod config;
mod error;
mod extractors;
mod idle;
mod inference;
mod telemetry;
#[cfg(test)]
mod testing;
mod worker;

#[cfg(unix)]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

const DEFAULT_CONFIG_FILE: &str = "TextgenWorker.toml";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env, default_value = DEFAULT_CONFIG_FILE)]
    config_file: String,

    /// Configuration options
    #[command(flatten)]
    pub opt_config: <Config as ClapSerde>::Opt,
}

#[macro_export]
macro_rules! exit_err {
    ($code:expr, $fmt:expr $(, $arg:expr)*) => {
        {
            error!($fmt $(, $arg)*);
            std::process::exit($code);
        }
    };
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = Args::parse();
    let (config, generation) = match Config::from_toml(&args.config_file) {
        Ok((file_config, generation)) => (
            Config::from(file_config).merge(&mut args.opt_config),
            generation,
        ),
        Err(err) => {
            if args.config_file == DEFAULT_CONFIG_FILE && !Path::new(DEFAULT_CONFIG_FILE).exists()
            {
                (Config::from(&mut args.opt_config), GenerationConfig::default())
            } else {
                eprintln!(
                    "Failed to read configuration file {} with error: {:#}",
                    args.config_file, err
                );
                std::process::exit(1);
            }
        }
    };

    let _chrome_guard = telemetry::init_telemetry(
        config.otel_endpoint(),
        config.console,
        config.chrome_trace,
    )?;

    let limits = WorkerLimits {
        max_concurrent_requests: config.max_concurrent_requests,
        idle_timeout: config.idle_timeout(),
    };
    let loader = HubLoader::new(config.model_source(), generation);
    let worker = match Worker::start(loader, config.repo_id.clone(), limits).await {
        Ok(worker) => worker,
        Err(err) => exit_err!(1, "Worker failed to become ready: {:#}", err),
    };
    info!(
        "Supported features: avx: {}, neon: {}, simd128: {}, f16c: {}",
        candle_core::utils::with_avx(),
        candle_core::utils::with_neon(),
        candle_core::utils::with_simd128(),
        candle_core::utils::with_f16c()
    );

    let handle = Handle::new();
    tokio::spawn(shutdown_signal(handle.clone(), worker.idle.clone()));
    tokio::spawn(log_listening(handle.clone()));

    let router = api::router(worker, config.request_timeout());
    let addr: SocketAddr = format!("{}:{}", config.address, config.port)
        .parse()
        .context("Invalid listen address")?;

    match config.tls_paths() {
        Some((cert, key)) => {
            let tls = RustlsConfig::from_pem_file(cert, key)
                .await
                .context("Failed to load TLS certificate or key")?;
            axum_server::bind_rustls(addr, tls)
                .handle(handle)
                .serve(router.into_make_service())
                .await?;
        }
        None => {
            axum_server::bind(addr)
                .handle(handle)
                .serve(router.into_make_service())
                .await?;
        }
    }
    opentelemetry::global::shutdown_tracer_provider();
    Ok(())
}

async fn log_listening(handle: Handle) {
    if let Some(addr) = handle.listening().await {
        info!("Listening on {}", addr);
    }
}

async fn shutdown_signal(handle: Handle, idle: IdleTracker) {
    tokio::select! {
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => info!("Shutting down..."),
            Err(e) => {
                error!("Failed to listen for shutdown signal: {}", e);
                idle.wait_idle().await;
                info!("Idle timeout reached, shutting down...");
            }
        },
        _ = idle.wait_idle() => info!("Idle timeout reached, shutting down..."),
    }
    handle.graceful_shutdown(Some(Duration::from_secs(30)));
}
