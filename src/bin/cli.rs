//! Stratasync CLI
//!
//! Mirrors a local directory into an S3-compatible bucket prefix.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stratasync::error::{Result, SyncError};
use stratasync::filter::Pattern;
use stratasync::fs::OsFileSystem;
use stratasync::store::S3Store;
use stratasync::{parse_remote_uri, ComparatorKind, ExecutionResult, SyncConfig, SyncManager};

#[derive(Parser)]
#[command(name = "stratasync")]
#[command(about = "Mirror a local directory into an S3 bucket prefix")]
#[command(version)]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true, env = "STRATASYNC_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload new and changed files, optionally deleting extra objects
    Sync(SyncArgs),
    /// Show what a sync would do without touching the bucket
    Plan(SyncArgs),
    /// Validate include/exclude patterns
    CheckPatterns {
        /// Patterns to validate
        #[arg(required = true)]
        patterns: Vec<String>,
        /// Relative paths to test against the valid patterns
        #[arg(short, long = "path")]
        paths: Vec<String>,
    },
}

#[derive(Args)]
struct SyncArgs {
    /// Local directory to mirror
    local: Option<String>,
    /// Target as s3://bucket/prefix
    remote: Option<String>,
    /// Delete remote objects with no local counterpart
    #[arg(long)]
    delete: bool,
    /// Plan only
    #[arg(long)]
    dry_run: bool,
    /// Maximum concurrent transfers
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,
    /// Only sync paths matching these patterns
    #[arg(long)]
    include: Vec<String>,
    /// Never sync paths matching these patterns
    #[arg(long)]
    exclude: Vec<String>,
    /// Change detection strategy (smart, size-time, checksum)
    #[arg(long)]
    compare: Option<String>,
    /// Follow symbolic links while scanning
    #[arg(long)]
    follow_symlinks: bool,
    /// Cancel the run after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,
    /// Custom endpoint for R2, MinIO and other S3-compatible stores
    #[arg(long, env = "AWS_ENDPOINT_URL")]
    endpoint_url: Option<String>,
    /// TOML config file; command-line flags override it
    #[arg(long, env = "STRATASYNC_CONFIG")]
    config: Option<String>,
    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn init_logging(json: bool) {
    let registry =
        tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::from_default_env());
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .init();
    }
}

impl SyncArgs {
    /// Merge the optional config file with command-line flags
    fn to_config(&self) -> Result<SyncConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let path = shellexpand::tilde(path).to_string();
                let mut config = SyncConfig::from_toml_file(&PathBuf::from(path))?;
                let root = config.local_root.to_string_lossy().into_owned();
                config.local_root = PathBuf::from(shellexpand::tilde(&root).to_string());
                config
            }
            None => {
                let missing = || {
                    SyncError::Config("LOCAL and REMOTE are required without --config".to_string())
                };
                let local = self.local.as_deref().ok_or_else(missing)?;
                let remote = self.remote.as_deref().ok_or_else(missing)?;
                let (bucket, prefix) = parse_remote_uri(remote)?;
                SyncConfig::new(shellexpand::tilde(local).to_string(), bucket, prefix)
            }
        };

        if self.config.is_some() {
            if let Some(local) = &self.local {
                config.local_root = PathBuf::from(shellexpand::tilde(local).to_string());
            }
            if let Some(remote) = &self.remote {
                let (bucket, prefix) = parse_remote_uri(remote)?;
                config.bucket = bucket;
                config.prefix = prefix;
            }
        }

        config.delete_extra |= self.delete;
        config.dry_run |= self.dry_run;
        config.follow_symlinks |= self.follow_symlinks;
        config.include_patterns.extend(self.include.iter().cloned());
        config.exclude_patterns.extend(self.exclude.iter().cloned());
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(compare) = &self.compare {
            config.comparator = compare.parse::<ComparatorKind>().map_err(SyncError::Config)?;
        }
        if self.timeout.is_some() {
            config.timeout_secs = self.timeout;
        }

        Ok(config)
    }
}

async fn run_sync(args: SyncArgs, force_dry_run: bool) -> Result<bool> {
    let mut config = args.to_config()?;
    config.dry_run |= force_dry_run;

    let store = S3Store::from_env(args.endpoint_url.as_deref()).await?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, waiting for in-flight operations");
            interrupt.cancel();
        }
    });

    let manager = SyncManager::new(Arc::new(OsFileSystem::new()), Arc::new(store))
        .with_cancellation(cancel);
    let result = manager.sync(&config).await?;
    print_result(&result, args.format)?;

    Ok(result.is_success())
}

fn print_result(result: &ExecutionResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(result)?),
        OutputFormat::Text => {
            if result.dry_run {
                for op in &result.operations {
                    println!("{}", op);
                }
                let stats = result.stats();
                println!(
                    "Would upload {} file(s) ({} bytes), delete {}, skip {}",
                    stats.uploads.count, stats.uploads.bytes, stats.deletes.count, stats.skips.count
                );
            } else {
                for failure in &result.errors {
                    println!("FAILED {}: {}", failure.operation, failure.error);
                }
                println!("{}", result.summary());
            }
        }
    }
    Ok(())
}

fn check_patterns(patterns: &[String], paths: &[String]) -> bool {
    let mut valid = Vec::new();
    let mut all_valid = true;

    for raw in patterns {
        match Pattern::new(raw) {
            Ok(pattern) => {
                println!("ok       {}", raw);
                valid.push(pattern);
            }
            Err(e) => {
                println!("invalid  {}: {}", raw, e);
                all_valid = false;
            }
        }
    }

    for path in paths {
        let matched: Vec<&str> = valid
            .iter()
            .filter(|p| p.matches(path))
            .map(|p| p.as_str())
            .collect();
        if matched.is_empty() {
            println!("{}: no match", path);
        } else {
            println!("{}: {}", path, matched.join(", "));
        }
    }

    all_valid
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json);

    let ok = match cli.command {
        Commands::Sync(args) => run_sync(args, false).await?,
        Commands::Plan(args) => run_sync(args, true).await?,
        Commands::CheckPatterns { patterns, paths } => check_patterns(&patterns, &paths),
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
