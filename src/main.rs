//! Quota Uploadr - concurrent batch uploader for S3-compatible buckets

use anyhow::Context;
use clap::{Parser, Subcommand};
use quota_uploadr::bucket::{ensure_bucket, resolve_bucket_name};
use quota_uploadr::config::Config;
use quota_uploadr::download::download_object;
use quota_uploadr::logging::{init_logging, LogFormat};
use quota_uploadr::s3::{CredentialsProvider, S3Client, S3ClientConfig};
use quota_uploadr::upload::Uploader;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Quota Uploadr - push a folder of files into a versioned bucket
#[derive(Parser, Debug)]
#[command(name = "quota-uploadr")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file; built-in defaults when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json, global = true)]
    log_format: LogFormat,

    /// Bucket name, overriding the configured or dated name
    #[arg(short, long, global = true)]
    bucket: Option<String>,

    /// Print Prometheus metrics to stdout before exiting
    #[arg(long, global = true)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload every file in the source folder
    Upload {
        /// Source folder, overriding upload.source_dir
        #[arg(short, long)]
        source: Option<PathBuf>,

        /// Print the per-file report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Download a single object
    Download {
        /// Object key
        key: String,

        /// Destination folder, overriding download.dest_dir
        #[arg(short, long)]
        dest: Option<PathBuf>,
    },
    /// Create the bucket with versioning if it does not exist
    EnsureBucket,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level, args.log_format)?;
    info!("Starting Quota Uploadr v{}", quota_uploadr::VERSION);

    let mut config = match &args.config {
        Some(path) => {
            let config = Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => Config::default(),
    };
    if let Some(bucket) = &args.bucket {
        config.bucket.name = Some(bucket.clone());
    }

    let credentials = CredentialsProvider::resolve(&config.storage)?;
    let client = S3Client::connect(S3ClientConfig {
        endpoint: config.storage.endpoint.clone(),
        region: config.storage.region.clone(),
        force_path_style: config.storage.force_path_style,
        credentials,
    })
    .await;
    let bucket = resolve_bucket_name(&config.bucket);

    let result = match args.command {
        Command::Upload { source, json } => {
            ensure_bucket(&client, &bucket)
                .await
                .with_context(|| format!("failed to prepare bucket {}", bucket))?;

            let source = source.unwrap_or_else(|| config.upload.source_dir.clone());
            let uploader = Uploader::new(Arc::new(client), bucket, config.upload.size_policy())
                .with_dependencies(config.upload.dependency_graph()?)
                .with_max_concurrency(config.upload.max_concurrency)
                .with_dependency_timeout(config.upload.dependency_timeout());

            let report = uploader.upload_folder(&source).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            report.combined().map_err(anyhow::Error::from)
        }
        Command::Download { key, dest } => {
            let dest = dest.unwrap_or_else(|| config.download.dest_dir.clone());
            download_object(&client, &bucket, &key, &dest)
                .await
                .map(|_| ())
                .map_err(anyhow::Error::from)
        }
        Command::EnsureBucket => ensure_bucket(&client, &bucket)
            .await
            .map(|status| info!(bucket = %bucket, ?status, "Bucket ready"))
            .map_err(anyhow::Error::from),
    };

    if args.print_metrics {
        print!("{}", quota_uploadr::metrics::gather_text());
    }

    result
}
