//! Command-line inspector for the MakerHub offline worker.
//!
//! Runs the worker against a real origin, outside the browser.
//!
//! ## Usage
//!
//! ```bash
//! # Which strategy would handle a request?
//! sw-inspect classify /api/products --destination empty
//!
//! # Install, activate, fetch a few pages and dump the partitions
//! sw-inspect warm --config worker.json / /blog/benchy
//!
//! # Replay a background sync tag once
//! sw-inspect sync wishlist-sync
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use http::Method;
use makerhub_common::{init_logging, LogConfig, LogFormat, OptionExt};
use makerhub_net::{Destination, LoaderConfig, Request, ResourceLoader};
use makerhub_sw::{FetchOutcome, OfflineWorker, RequestClassifier, WorkerConfig};
use serde_json::json;
use tracing::info;
use url::Url;

#[derive(Parser)]
#[command(name = "sw-inspect")]
#[command(about = "Command-line inspector for the MakerHub offline worker")]
struct Cli {
    /// Worker config (JSON); defaults are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "compact")]
    log_format: LogFormatArg,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the strategy chosen for a request
    Classify {
        /// Path or absolute URL
        url: String,
        /// HTTP method
        #[arg(short, long, default_value = "GET")]
        method: String,
        /// Request destination (document, image, script, ...)
        #[arg(short, long, default_value = "empty")]
        destination: String,
    },

    /// Install and activate the worker, then fetch URLs through it
    Warm {
        /// Paths or absolute URLs to fetch as navigations
        urls: Vec<String>,
        /// Only print this partition
        #[arg(short, long)]
        partition: Option<String>,
    },

    /// Replay one background sync tag
    Sync {
        /// Sync tag, e.g. wishlist-sync
        tag: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Compact => LogFormat::Compact,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::debug()
    } else {
        LogConfig::default()
    };
    init_logging(log_config.with_format(cli.log_format.into()))?;

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Classify {
            url,
            method,
            destination,
        } => {
            let request = build_request(&config, &url, &method, &destination)?;
            let classifier = RequestClassifier::new(&config)?;
            match classifier.classify(&request) {
                Some(strategy) => println!("{}", strategy.as_str()),
                None => println!("pass-through"),
            }
        }

        Commands::Warm { urls, partition } => {
            warm(config, &urls, partition.as_deref()).await?;
        }

        Commands::Sync { tag } => {
            let (worker, _events) = OfflineWorker::new(config, loader()?)?;
            let outcome = worker.sync(&tag).await?;
            println!("{outcome:?}");
        }
    }

    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<WorkerConfig> {
    match path {
        Some(path) => Ok(WorkerConfig::from_file(path)?),
        None => Ok(WorkerConfig::default()),
    }
}

fn loader() -> Result<Arc<ResourceLoader>> {
    Ok(Arc::new(ResourceLoader::new(LoaderConfig::default())?))
}

fn build_request(
    config: &WorkerConfig,
    url: &str,
    method: &str,
    destination: &str,
) -> Result<Request> {
    let url: Url = config
        .resolve(url)
        .with_context(|| format!("invalid URL {url}"))?;
    let method: Method = method
        .to_ascii_uppercase()
        .parse()
        .with_context(|| format!("invalid method {method}"))?;
    let Some(destination) = Destination::parse(destination) else {
        bail!("unknown destination {destination}");
    };

    Ok(Request::get(url).method(method).destination(destination))
}

async fn warm(config: WorkerConfig, urls: &[String], partition: Option<&str>) -> Result<()> {
    let targets = urls
        .iter()
        .map(|u| config.resolve(u).with_context(|| format!("invalid URL {u}")))
        .collect::<Result<Vec<Url>>>()?;

    let (worker, _events) = OfflineWorker::new(config, loader()?)?;
    let installed = worker.install().await?;
    let activated = worker.activate().await?;
    info!(precached = installed.precached, "Worker ready");

    let mut fetched = Vec::new();
    for url in targets {
        let outcome = worker.fetch(Request::navigate(url.clone())).await?;
        fetched.push(fetch_report(&url, &outcome));
    }

    let summaries = worker.caches().read().await.summaries();
    let partitions = match partition {
        Some(name) => vec![summaries
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_not_found(name)?],
        None => summaries,
    };

    let report = json!({
        "version": worker.partition_names().version,
        "precached": installed.precached,
        "deleted": activated.deleted,
        "fetched": fetched,
        "partitions": partitions,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn fetch_report(url: &Url, outcome: &FetchOutcome) -> serde_json::Value {
    match outcome {
        FetchOutcome::PassThrough => json!({ "url": url, "outcome": "pass-through" }),
        FetchOutcome::Respond(r) => json!({
            "url": url,
            "status": r.response.status.as_u16(),
            "content_type": r.response.content_type().map(|m| m.essence_str().to_string()),
            "source": format!("{:?}", r.source),
        }),
    }
}
