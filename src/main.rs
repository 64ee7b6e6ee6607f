//! vecbatch - batch import into a vector store
//!
//! Reads objects from a JSON-lines file and writes them through a batch
//! session, then prints a summary and the failed objects.

#![allow(missing_docs)]

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use vecbatch::config::Config;
use vecbatch::utils::format_duration;
use vecbatch::utils::logging::init_logging;
use vecbatch::{BatchClient, DrainTarget, ObjectItem};

#[derive(Debug, Parser)]
#[command(name = "vecbatch", version, about = "Batch ingestion into a vector store")]
struct Cli {
    /// YAML configuration file; VECBATCH_* variables override it
    #[arg(short, long, env = "VECBATCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Import a JSON-lines file of objects into a collection
    Import {
        /// Target collection
        #[arg(long)]
        collection: String,
        /// JSON-lines file; each line is an object with `properties` and
        /// optional `uuid`, `vector`, `tenant`, or a bare property map
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        batch_size: Option<usize>,
        #[arg(long)]
        concurrency: Option<usize>,
        /// Tenant applied to objects that do not name one
        #[arg(long)]
        tenant: Option<String>,
        /// Wait up to this many seconds for vector indexing to finish
        #[arg(long)]
        wait_indexing: Option<u64>,
    },
    /// Check that the store is ready
    Ready,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => Config::from_file(path).await?.apply_env()?,
        None => Config::from_env()?,
    };
    init_logging(&config.logging)?;

    match cli.command {
        Command::Ready => {
            let client = BatchClient::from_config(config)?;
            client.health_check().await?;
            println!("ready");
            Ok(())
        }
        Command::Import {
            collection,
            file,
            batch_size,
            concurrency,
            tenant,
            wait_indexing,
        } => {
            let mut config = config;
            if let Some(size) = batch_size {
                config.batch = config.batch.with_batch_size(size);
            }
            if let Some(concurrency) = concurrency {
                config.batch = config.batch.with_concurrency(concurrency);
            }

            let client = BatchClient::from_config(config)?;
            import(&client, &collection, &file, tenant.as_deref()).await?;

            if let Some(secs) = wait_indexing {
                let target = DrainTarget {
                    collection: collection.clone(),
                    tenant: tenant.clone(),
                };
                client
                    .wait_for_vector_indexing(Some(vec![target]), Duration::from_secs(secs))
                    .await?;
                println!("vector indexing complete");
            }
            Ok(())
        }
    }
}

async fn import(
    client: &BatchClient,
    collection: &str,
    file: &PathBuf,
    tenant: Option<&str>,
) -> anyhow::Result<()> {
    let handle = tokio::fs::File::open(file)
        .await
        .with_context(|| format!("cannot open {}", file.display()))?;
    let mut lines = BufReader::new(handle).lines();

    info!("Importing {} into {}", file.display(), collection);
    let started = std::time::Instant::now();
    let (skipped, summary) = client
        .with_session(async |session| {
            let mut skipped = 0usize;
            let mut line_no = 0usize;
            while let Some(line) = lines.next_line().await? {
                line_no += 1;
                if line.trim().is_empty() {
                    continue;
                }
                match parse_object(collection, &line, tenant) {
                    Ok(object) => {
                        session.add_object(object).await?;
                    }
                    Err(e) => {
                        error!("Skipping line {}: {}", line_no, e);
                        skipped += 1;
                    }
                }
            }
            Ok(skipped)
        })
        .await?;

    println!(
        "imported {} objects in {}: {} succeeded, {} failed, {} retried, {} skipped",
        summary.total,
        format_duration(started.elapsed().as_millis() as u64),
        summary.succeeded,
        summary.failed,
        summary.retried,
        skipped
    );
    for failed in client.failed_objects() {
        println!(
            "  failed {} ({}): {}",
            failed
                .item
                .uuid
                .map(|u| u.to_string())
                .unwrap_or_else(|| failed.id.to_string()),
            failed.class,
            failed.error
        );
    }
    Ok(())
}

fn parse_object(
    collection: &str,
    line: &str,
    tenant: Option<&str>,
) -> serde_json::Result<ObjectItem> {
    let mut value: serde_json::Value = serde_json::from_str(line)?;

    let mut object = if value.get("properties").is_some() {
        if let Some(map) = value.as_object_mut() {
            map.insert("collection".to_string(), serde_json::json!(collection));
        }
        serde_json::from_value(value)?
    } else {
        ObjectItem::new(collection, value)
    };

    if object.tenant.is_none() {
        object.tenant = tenant.map(str::to_string);
    }
    Ok(object)
}
