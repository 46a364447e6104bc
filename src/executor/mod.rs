//! Applies a plan against the remote store with bounded concurrency
//!
//! Operations are dispatched in plan order; a semaphore caps how many are
//! in flight. Each outcome is recorded on its own, so one failed transfer
//! never stops the rest. Consecutive deletes travel together in batch
//! delete calls.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SyncError};
use crate::fs::FileSystem;
use crate::store::{ObjectStore, MAX_DELETE_KEYS};
use crate::types::{Operation, OperationError, OperationKind};

/// What happened to one operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum OutcomeStatus {
    Uploaded {
        bytes: u64,
        fingerprint: Option<String>,
    },
    Deleted,
    Skipped,
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationOutcome {
    pub operation: Operation,
    pub status: OutcomeStatus,
}

/// Aggregated outcomes of one execution, in completion order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub uploaded: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub bytes_uploaded: u64,
    pub outcomes: Vec<OperationOutcome>,
    pub errors: Vec<OperationError>,
}

impl ExecutionReport {
    fn record(&mut self, operation: Operation, status: OutcomeStatus) {
        match &status {
            OutcomeStatus::Uploaded { bytes, .. } => {
                self.uploaded += 1;
                self.bytes_uploaded += bytes;
            }
            OutcomeStatus::Deleted => self.deleted += 1,
            OutcomeStatus::Skipped => self.skipped += 1,
            OutcomeStatus::Failed { error } => {
                tracing::warn!("{} {} failed: {}", operation.kind, operation.remote_key, error);
                self.errors.push(OperationError {
                    operation: operation.clone(),
                    error: error.clone(),
                });
            }
        }
        self.outcomes.push(OperationOutcome { operation, status });
    }
}

enum WorkItem {
    Upload(Operation),
    DeleteBatch(Vec<Operation>),
}

impl WorkItem {
    fn operations(&self) -> Vec<Operation> {
        match self {
            WorkItem::Upload(op) => vec![op.clone()],
            WorkItem::DeleteBatch(ops) => ops.clone(),
        }
    }
}

/// Group a plan into dispatchable units; skips are returned separately
fn work_items(plan: &[Operation]) -> (Vec<WorkItem>, Vec<Operation>) {
    let mut items: Vec<WorkItem> = Vec::new();
    let mut skips = Vec::new();

    for op in plan {
        match op.kind {
            OperationKind::Upload => items.push(WorkItem::Upload(op.clone())),
            OperationKind::Delete => match items.last_mut() {
                Some(WorkItem::DeleteBatch(batch)) if batch.len() < MAX_DELETE_KEYS => {
                    batch.push(op.clone())
                }
                _ => items.push(WorkItem::DeleteBatch(vec![op.clone()])),
            },
            OperationKind::Skip => skips.push(op.clone()),
        }
    }

    (items, skips)
}

/// Runs uploads and deletes for one bucket
pub struct Executor {
    store: Arc<dyn ObjectStore>,
    fs: Arc<dyn FileSystem>,
    bucket: String,
    cancel: CancellationToken,
}

impl Executor {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        fs: Arc<dyn FileSystem>,
        bucket: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            fs,
            bucket: bucket.into(),
            cancel,
        }
    }

    /// Apply every upload and delete in `plan`, at most `concurrency` at once.
    ///
    /// Per-operation failures land in the report. The call itself only
    /// fails when cancellation stopped dispatching part of the plan;
    /// transfers already running are allowed to finish first.
    pub async fn execute(&self, plan: &[Operation], concurrency: usize) -> Result<ExecutionReport> {
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let report = Arc::new(Mutex::new(ExecutionReport::default()));
        let (items, skips) = work_items(plan);

        {
            let mut report = report.lock();
            for op in skips {
                report.record(op, OutcomeStatus::Skipped);
            }
        }

        tracing::info!(
            "Executing {} work item(s) with concurrency {}",
            items.len(),
            concurrency.max(1)
        );

        let mut tasks = JoinSet::new();
        // Operations each task owns, so a task that dies still gets an outcome
        let mut in_flight: HashMap<task::Id, Vec<Operation>> = HashMap::new();
        let mut interrupted = false;

        for item in items {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                interrupted = true;
                break;
            };

            let store = self.store.clone();
            let fs = self.fs.clone();
            let bucket = self.bucket.clone();
            let report = report.clone();
            let operations = item.operations();

            let handle = tasks.spawn(async move {
                let _permit = permit;
                match item {
                    WorkItem::Upload(op) => {
                        let status = upload(store.as_ref(), fs, &bucket, &op).await;
                        report.lock().record(op, status);
                    }
                    WorkItem::DeleteBatch(ops) => {
                        let statuses = delete_batch(store.as_ref(), &bucket, &ops).await;
                        let mut report = report.lock();
                        for (op, status) in ops.into_iter().zip(statuses) {
                            report.record(op, status);
                        }
                    }
                }
            });
            in_flight.insert(handle.id(), operations);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, ())) => {
                    in_flight.remove(&id);
                }
                Err(e) => {
                    tracing::error!("Transfer task failed to complete: {}", e);
                    let error = format!("transfer task failed: {}", e);
                    let mut report = report.lock();
                    for op in in_flight.remove(&e.id()).unwrap_or_default() {
                        report.record(
                            op,
                            OutcomeStatus::Failed {
                                error: error.clone(),
                            },
                        );
                    }
                }
            }
        }

        if interrupted {
            tracing::warn!("Execution cancelled before the plan was fully dispatched");
            return Err(SyncError::Cancelled);
        }

        let report = Arc::try_unwrap(report)
            .map(Mutex::into_inner)
            .unwrap_or_else(|shared| shared.lock().clone());

        tracing::info!(
            "Execution finished: {} uploaded, {} deleted, {} skipped, {} failed",
            report.uploaded,
            report.deleted,
            report.skipped,
            report.errors.len()
        );
        Ok(report)
    }
}

async fn upload(
    store: &dyn ObjectStore,
    fs: Arc<dyn FileSystem>,
    bucket: &str,
    op: &Operation,
) -> OutcomeStatus {
    let Some(path) = op.local_path.clone() else {
        return OutcomeStatus::Failed {
            error: "upload has no local path".to_string(),
        };
    };

    let data = match tokio::task::spawn_blocking(move || fs.read(&path)).await {
        Ok(Ok(data)) => data,
        Ok(Err(e)) => return OutcomeStatus::Failed { error: e.to_string() },
        Err(e) => {
            return OutcomeStatus::Failed {
                error: SyncError::from(e).to_string(),
            }
        }
    };

    let bytes = data.len() as u64;
    match store.put_object(bucket, &op.remote_key, data).await {
        Ok(fingerprint) => {
            tracing::debug!("Uploaded {} ({} bytes, {})", op.remote_key, bytes, op.reason);
            OutcomeStatus::Uploaded { bytes, fingerprint }
        }
        Err(e) => OutcomeStatus::Failed { error: e.to_string() },
    }
}

/// One status per entry of `ops`, in the same order
async fn delete_batch(store: &dyn ObjectStore, bucket: &str, ops: &[Operation]) -> Vec<OutcomeStatus> {
    let keys: Vec<String> = ops.iter().map(|op| op.remote_key.clone()).collect();

    match store.delete_objects(bucket, &keys).await {
        Ok(outcomes) => {
            let by_key: HashMap<String, Option<String>> = outcomes
                .into_iter()
                .map(|outcome| (outcome.key, outcome.error))
                .collect();

            ops.iter()
                .map(|op| match by_key.get(&op.remote_key) {
                    Some(None) => {
                        tracing::debug!("Deleted {}", op.remote_key);
                        OutcomeStatus::Deleted
                    }
                    Some(Some(error)) => OutcomeStatus::Failed {
                        error: error.clone(),
                    },
                    None => OutcomeStatus::Failed {
                        error: "store reported no outcome for key".to_string(),
                    },
                })
                .collect()
        }
        Err(e) => {
            let error = e.to_string();
            ops.iter()
                .map(|_| OutcomeStatus::Failed {
                    error: error.clone(),
                })
                .collect()
        }
    }
}
