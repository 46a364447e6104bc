//! Run orchestration

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::SyncPhase;
use crate::compare::create_comparator;
use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::executor::Executor;
use crate::filter::validate_patterns;
use crate::fs::FileSystem;
use crate::planner::{validate_plan, Planner};
use crate::scanner::Scanner;
use crate::store::ObjectStore;
use crate::types::{ExecutionResult, OperationStats};

/// Per-run state shared by every phase
struct RunContext<'a> {
    config: &'a SyncConfig,
    prefix: String,
    cancel: CancellationToken,
    started_at: DateTime<Utc>,
}

/// Cancels the run when its deadline passes; aborted when the run ends
struct Deadline(Option<JoinHandle<()>>);

impl Deadline {
    fn start(timeout_secs: Option<u64>, cancel: &CancellationToken) -> Self {
        let handle = timeout_secs.map(|secs| {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(secs)).await;
                tracing::warn!("Run exceeded its {}s timeout, cancelling", secs);
                cancel.cancel();
            })
        });
        Self(handle)
    }
}

impl Drop for Deadline {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

/// Mirrors a local directory into a bucket prefix
pub struct SyncManager {
    fs: Arc<dyn FileSystem>,
    store: Arc<dyn ObjectStore>,
    cancel: CancellationToken,
}

impl SyncManager {
    pub fn new(fs: Arc<dyn FileSystem>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            fs,
            store,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned token, e.g. one tripped by Ctrl-C
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Cancelling this token stops every run of this manager
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run one sync.
    ///
    /// Scan and planning failures are returned as errors. Failed uploads
    /// and deletes are not: they are listed in the result's `errors`.
    pub async fn sync(&self, config: &SyncConfig) -> Result<ExecutionResult> {
        config.validate()?;
        for err in validate_patterns(&config.include_patterns)
            .into_iter()
            .chain(validate_patterns(&config.exclude_patterns))
        {
            tracing::warn!("{}, ignoring it", err);
        }

        let run = RunContext {
            config,
            prefix: config.key_prefix(),
            cancel: self.cancel.child_token(),
            started_at: Utc::now(),
        };
        let _deadline = Deadline::start(config.timeout_secs, &run.cancel);

        tracing::info!(
            "Syncing {} to s3://{}/{}{}",
            config.local_root.display(),
            config.bucket,
            run.prefix,
            if config.dry_run { " (dry run)" } else { "" }
        );

        let mut phase = SyncPhase::Scanning;
        loop {
            phase = match self.step(&run, phase).await? {
                SyncPhase::Done(result) => return Ok(result),
                next => {
                    tracing::debug!("Entering {} phase", next);
                    next
                }
            };
        }
    }

    async fn step(&self, run: &RunContext<'_>, phase: SyncPhase) -> Result<SyncPhase> {
        let config = run.config;

        match phase {
            SyncPhase::Scanning => {
                // Scoped to this phase so a failing side stops the other one.
                let scan_cancel = run.cancel.child_token();
                let scanner = Scanner::new(self.fs.clone(), self.store.clone(), scan_cancel.clone())
                    .follow_links(config.follow_symlinks);
                let scanned = tokio::try_join!(
                    scanner.scan_local(
                        &config.local_root,
                        &config.include_patterns,
                        &config.exclude_patterns,
                    ),
                    scanner.scan_remote_with_pattern(
                        &config.bucket,
                        &run.prefix,
                        &config.include_patterns,
                        &config.exclude_patterns,
                    ),
                );

                match scanned {
                    Ok((locals, remotes)) => Ok(SyncPhase::Planning { locals, remotes }),
                    Err(err) => {
                        scan_cancel.cancel();
                        Err(SyncError::inventory(err))
                    }
                }
            }

            SyncPhase::Planning { locals, remotes } => {
                let comparator =
                    create_comparator(config.comparator, self.fs.clone(), config.time_tolerance()?);
                tracing::debug!("Comparing with the {} strategy", comparator.name());

                let planner = Planner::new(comparator);
                let root: PathBuf = config.local_root.clone();
                let prefix = run.prefix.clone();
                let delete_extra = config.delete_extra;
                let plan = tokio::task::spawn_blocking(move || {
                    planner.plan(&root, &locals, &remotes, &prefix, delete_extra)
                })
                .await??;

                if run.cancel.is_cancelled() {
                    return Err(SyncError::Cancelled);
                }

                match validate_plan(&plan) {
                    Ok(()) => {}
                    Err(SyncError::EmptyPlan) => {
                        tracing::info!("Nothing to sync: both sides are empty");
                        return Ok(SyncPhase::Reporting { plan, report: None });
                    }
                    Err(err) => return Err(err),
                }

                let stats = OperationStats::from_operations(&plan);
                tracing::info!(
                    "Planned {} upload(s), {} delete(s), {} skip(s)",
                    stats.uploads.count,
                    stats.deletes.count,
                    stats.skips.count
                );

                if config.dry_run {
                    Ok(SyncPhase::Reporting { plan, report: None })
                } else {
                    Ok(SyncPhase::Executing { plan })
                }
            }

            SyncPhase::Executing { plan } => {
                let executor = Executor::new(
                    self.store.clone(),
                    self.fs.clone(),
                    config.bucket.clone(),
                    run.cancel.clone(),
                );
                let report = executor.execute(&plan, config.concurrency).await?;
                Ok(SyncPhase::Reporting {
                    plan,
                    report: Some(report),
                })
            }

            SyncPhase::Reporting { plan, report } => {
                let report = report.unwrap_or_default();
                let result = ExecutionResult {
                    files_uploaded: report.uploaded,
                    files_deleted: report.deleted,
                    bytes_uploaded: report.bytes_uploaded,
                    operations: plan,
                    errors: report.errors,
                    dry_run: config.dry_run,
                    started_at: run.started_at,
                    completed_at: Utc::now(),
                };
                tracing::info!("{}", result.summary());
                Ok(SyncPhase::Done(result))
            }

            SyncPhase::Done(result) => Ok(SyncPhase::Done(result)),
        }
    }
}
