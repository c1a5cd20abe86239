//! Leela Smoke Harness
//!
//! Runs one worker lifecycle against a live origin: install, activate, then
//! a fetch for every path on the command line. Prints a JSON summary of
//! what was cached and how each fetch was answered.
//!
//! ```text
//! leela-smoke [--origin URL] [--config FILE] [--log-format pretty|compact|json] [-v] [PATH...]
//! ```

use std::process::ExitCode;
use std::time::Instant;

use leela_common::{init_logging, LeelaError, LogConfig, LogFormat, Result};
use leela_net::{LoaderConfig, Request, ResourceLoader};
use leela_sw::{ServiceWorker, WorkerConfig};
use serde_json::json;
use tracing::{error, info, warn};
use url::Url;

/// Parse command line arguments
struct Args {
    origin: Option<Url>,
    config: Option<String>,
    log_format: LogFormat,
    verbose: bool,
    paths: Vec<String>,
}

impl Args {
    fn parse() -> Result<Self> {
        let mut args = std::env::args().skip(1);
        let mut origin = None;
        let mut config = None;
        let mut log_format = LogFormat::default();
        let mut verbose = false;
        let mut paths = Vec::new();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--origin" => {
                    let value = args.next().ok_or_else(|| {
                        LeelaError::InvalidArgument("--origin needs a URL".to_string())
                    })?;
                    let url = Url::parse(&value).map_err(|e| {
                        LeelaError::InvalidArgument(format!("invalid origin '{value}': {e}"))
                    })?;
                    origin = Some(url);
                }
                "--config" => {
                    config = args.next();
                }
                "--log-format" => {
                    if let Some(value) = args.next() {
                        log_format = value.parse()?;
                    }
                }
                "--verbose" | "-v" => {
                    verbose = true;
                }
                flag if flag.starts_with("--") => {
                    return Err(LeelaError::InvalidArgument(format!("unknown flag '{flag}'")));
                }
                _ => paths.push(arg),
            }
        }

        if paths.is_empty() {
            paths.push("/".to_string());
        }

        Ok(Self {
            origin,
            config,
            log_format,
            verbose,
            paths,
        })
    }

    fn worker_config(&self) -> Result<WorkerConfig> {
        let mut config = match &self.config {
            Some(path) => WorkerConfig::from_json_file(path)
                .map_err(|e| LeelaError::config_with_source(format!("loading {path}"), e))?,
            None => WorkerConfig::default(),
        };
        if let Some(origin) = &self.origin {
            config.origin = origin.clone();
        }
        Ok(config)
    }
}

/// Paths without a file extension are page navigations.
fn is_navigation(path: &str) -> bool {
    let last = path.rsplit('/').next().unwrap_or_default();
    !last.contains('.')
}

async fn run(args: Args) -> Result<serde_json::Value> {
    let config = args.worker_config()?;
    info!(origin = %config.origin, version = %config.version, "Starting Leela Smoke Harness");

    let loader = ResourceLoader::new(LoaderConfig {
        origin: Some(config.origin.clone()),
        ..Default::default()
    })
    .map_err(|e| LeelaError::network_with_source("creating resource loader", e))?;

    let worker = ServiceWorker::new(config, loader)
        .map_err(|e| LeelaError::worker_with_source("creating worker", e))?;

    let started = Instant::now();
    let install = worker
        .install()
        .await
        .map_err(|e| LeelaError::worker_with_source("install", e))?;
    if install.cached_count() == 0 && install.failed_count() > 0 {
        warn!(failed = install.failed_count(), "Nothing was pre-cached");
    }
    let activation = worker
        .activate()
        .await
        .map_err(|e| LeelaError::worker_with_source("activate", e))?;

    let mut fetches = Vec::with_capacity(args.paths.len());
    for path in &args.paths {
        let url = match worker.config().resolve(path) {
            Ok(url) => url,
            Err(e) => {
                fetches.push(json!({ "path": path, "error": e.to_string() }));
                continue;
            }
        };

        let mut request = Request::get(url);
        if is_navigation(path) {
            request = request.accept("text/html");
        }

        match worker.fetch(request).await {
            Ok(response) => fetches.push(json!({
                "path": path,
                "status": response.status.as_u16(),
                "from_cache": response.from_cache,
                "bytes": response.body().len(),
            })),
            Err(e) => {
                warn!(path = %path, error = %e, "Fetch failed");
                fetches.push(json!({ "path": path, "error": e.to_string() }));
            }
        }
    }

    worker.settle_background().await;

    let mut partitions = serde_json::Map::new();
    for name in worker.storage().keys().await {
        let len = worker.storage().len(&name).await;
        partitions.insert(name, json!(len));
    }

    Ok(json!({
        "version": worker.config().version,
        "elapsed_ms": started.elapsed().as_millis() as u64,
        "install": install,
        "activation": activation,
        "fetches": fetches,
        "partitions": partitions,
    }))
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::parse() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::from(2);
        }
    };

    let log_config = if args.verbose {
        LogConfig::debug()
    } else {
        LogConfig::default()
    };
    if let Err(e) = init_logging(log_config.with_format(args.log_format)) {
        eprintln!("Warning: {e}");
    }

    match run(args).await {
        Ok(summary) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).unwrap_or_else(|_| summary.to_string())
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(category = e.category(), error = %e, "Smoke run failed");
            ExitCode::FAILURE
        }
    }
}
