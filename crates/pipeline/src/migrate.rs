//! S3 → Greenfield migration.
//!
//! Objects are processed one at a time through a private staging
//! directory, so at most one object occupies local disk:
//!
//! 1. **List** the source bucket (failure aborts the run)
//! 2. **Stage** each non-empty object to `staging/<basename>`
//! 3. **Upload** it with CreateObject + PutObject and wait for sealing
//! 4. **Clean** the staged file, and the staging directory at the end

use std::path::{Path, PathBuf};

use gnfd_protocol::{ObjectStatus, check_bucket};
use gnfd_transfer::staging_file_name;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chain::BoxFuture;
use crate::error::PipelineError;
use crate::task::{ObjectTaskStatus, TaskState, TaskStatus};
use crate::upload::{CreateObjectOptions, ObjectPipeline, ObjectSource, SealStatus};

/// One entry of a source bucket listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Object {
    pub key: String,
    pub size: u64,
    pub content_type: Option<String>,
}

/// Source-side S3 collaborator. Credentials and signing are its concern.
pub trait S3Source: Send + Sync {
    fn list_objects_v2<'a>(&'a self, region: &'a str, bucket: &'a str) -> BoxFuture<'a, Vec<S3Object>>;

    /// Streams `bucket/key` into `writer`, returning bytes written.
    fn download_to<'a>(
        &'a self,
        writer: &'a mut (dyn AsyncWrite + Send + Unpin),
        region: &'a str,
        bucket: &'a str,
        key: &'a str,
    ) -> BoxFuture<'a, u64>;
}

/// Where to persist per-object progress.
#[derive(Debug, Clone)]
pub struct TaskTarget {
    pub task_id: String,
    /// Directory holding `.<task-id>/state`; the home directory when unset.
    pub base: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct MigrationRequest {
    pub region: String,
    pub src_bucket: String,
    pub dst_bucket: String,
    /// Exclusive to this run; created 0700 if missing and removed at the end.
    pub staging_dir: PathBuf,
    pub options: CreateObjectOptions,
    pub task: Option<TaskTarget>,
}

/// Progress event emitted during a migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationEvent {
    Listed { count: usize },
    Skipped { key: String },
    Staged { key: String, bytes: u64 },
    Uploaded { object: String, tx_hash: String, etag: String },
    Sealed { object: String },
    NotSealed { object: String, status: ObjectStatus },
    Failed { key: String, error: String },
}

/// Final result for one source object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectOutcome {
    /// Zero-size entry, treated as a directory marker.
    Skipped,
    Sealed { tx_hash: String, etag: String },
    /// Uploaded, but sealing was not observed within the wait.
    Pending {
        tx_hash: String,
        etag: String,
        status: ObjectStatus,
    },
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectReport {
    pub key: String,
    /// Destination object name (the key's basename).
    pub object: String,
    pub outcome: ObjectOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub objects: Vec<ObjectReport>,
}

impl MigrationReport {
    fn count(&self, f: impl Fn(&ObjectOutcome) -> bool) -> usize {
        self.objects.iter().filter(|o| f(&o.outcome)).count()
    }

    pub fn sealed(&self) -> usize {
        self.count(|o| matches!(o, ObjectOutcome::Sealed { .. }))
    }

    pub fn pending(&self) -> usize {
        self.count(|o| matches!(o, ObjectOutcome::Pending { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ObjectOutcome::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ObjectOutcome::Failed(_)))
    }
}

// ---------------------------------------------------------------------------
// Migrator
// ---------------------------------------------------------------------------

/// Moves objects from an S3 bucket into a Greenfield bucket.
pub struct Migrator<'a> {
    pipeline: &'a ObjectPipeline,
    source: &'a dyn S3Source,
    events_tx: Option<mpsc::Sender<MigrationEvent>>,
}

impl<'a> Migrator<'a> {
    pub fn new(pipeline: &'a ObjectPipeline, source: &'a dyn S3Source) -> Self {
        Self {
            pipeline,
            source,
            events_tx: None,
        }
    }

    /// Sends progress events to `tx`.
    pub fn with_events(mut self, tx: mpsc::Sender<MigrationEvent>) -> Self {
        self.events_tx = Some(tx);
        self
    }

    /// Runs the migration.
    ///
    /// A failing object is reported and the run moves on; a failing listing
    /// or cancellation aborts. The staging directory is removed on every
    /// return path.
    pub async fn migrate(
        &self,
        req: &MigrationRequest,
        cancel: &CancellationToken,
    ) -> Result<MigrationReport, PipelineError> {
        check_bucket(&req.dst_bucket)?;
        prepare_staging(&req.staging_dir).await?;

        let mut task = req
            .task
            .as_ref()
            .map(|t| TaskState::new(&t.task_id, &req.src_bucket));
        let result = self.run(req, task.as_mut(), cancel).await;

        if let Err(e) = tokio::fs::remove_dir_all(&req.staging_dir).await {
            warn!(dir = %req.staging_dir.display(), error = %e, "failed to remove staging directory");
        }

        if let (Some(target), Some(state)) = (&req.task, task.as_mut()) {
            state.status = if result.is_ok() {
                TaskStatus::Completed
            } else {
                TaskStatus::Failed
            };
            save_task(target, state);
        }

        let report = result?;
        info!(
            src = %req.src_bucket,
            dst = %req.dst_bucket,
            sealed = report.sealed(),
            pending = report.pending(),
            skipped = report.skipped(),
            failed = report.failed(),
            "migration finished"
        );
        Ok(report)
    }

    async fn run(
        &self,
        req: &MigrationRequest,
        mut task: Option<&mut TaskState>,
        cancel: &CancellationToken,
    ) -> Result<MigrationReport, PipelineError> {
        let objects = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Canceled),
            r = self.source.list_objects_v2(&req.region, &req.src_bucket) => r?,
        };
        info!(src = %req.src_bucket, count = objects.len(), "listed source objects");
        self.emit(MigrationEvent::Listed {
            count: objects.len(),
        })
        .await;

        let mut report = MigrationReport::default();
        for entry in &objects {
            if cancel.is_cancelled() {
                return Err(PipelineError::Canceled);
            }

            let (object, outcome) = if entry.size == 0 {
                debug!(key = %entry.key, "skipping zero-size entry");
                self.emit(MigrationEvent::Skipped {
                    key: entry.key.clone(),
                })
                .await;
                (String::new(), ObjectOutcome::Skipped)
            } else {
                let object = staging_file_name(&entry.key).unwrap_or_default();
                match self.migrate_one(req, entry, cancel).await {
                    Ok(outcome) => (object, outcome),
                    Err(e) if e.is_canceled() => return Err(PipelineError::Canceled),
                    Err(e) => {
                        error!(key = %entry.key, error = %e, "failed to migrate object");
                        self.emit(MigrationEvent::Failed {
                            key: entry.key.clone(),
                            error: e.to_string(),
                        })
                        .await;
                        (object, ObjectOutcome::Failed(e.to_string()))
                    }
                }
            };

            if let (Some(target), Some(state)) = (&req.task, task.as_deref_mut()) {
                let (status, comment) = match &outcome {
                    ObjectOutcome::Skipped => (ObjectTaskStatus::Skipped, String::new()),
                    ObjectOutcome::Sealed { .. } => (ObjectTaskStatus::Sealed, String::new()),
                    ObjectOutcome::Pending { status, .. } => {
                        (ObjectTaskStatus::Pending, status.to_string())
                    }
                    ObjectOutcome::Failed(e) => (ObjectTaskStatus::Failed, e.clone()),
                };
                let name = if object.is_empty() { &entry.key } else { &object };
                state.record(name, status, comment);
                save_task(target, state);
            }

            report.objects.push(ObjectReport {
                key: entry.key.clone(),
                object,
                outcome,
            });
        }
        Ok(report)
    }

    async fn migrate_one(
        &self,
        req: &MigrationRequest,
        entry: &S3Object,
        cancel: &CancellationToken,
    ) -> Result<ObjectOutcome, PipelineError> {
        let object = staging_file_name(&entry.key)?;
        let path = req.staging_dir.join(&object);

        let result = self.stage_and_upload(req, entry, &object, &path, cancel).await;
        if let Err(e) = tokio::fs::remove_file(&path).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %path.display(), error = %e, "failed to remove staged file");
        }
        result
    }

    async fn stage_and_upload(
        &self,
        req: &MigrationRequest,
        entry: &S3Object,
        object: &str,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<ObjectOutcome, PipelineError> {
        let mut file = tokio::fs::File::create(path).await?;
        let bytes = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Canceled),
            r = self.source.download_to(&mut file, &req.region, &req.src_bucket, &entry.key) => r?,
        };
        file.flush().await?;
        drop(file);
        info!(key = %entry.key, bytes, "staged object");
        self.emit(MigrationEvent::Staged {
            key: entry.key.clone(),
            bytes,
        })
        .await;

        let mut options = req.options.clone();
        if options.content_type.is_none() {
            options.content_type = entry.content_type.clone();
        }
        let upload = self
            .pipeline
            .upload(
                &req.dst_bucket,
                object,
                &ObjectSource::File(path.to_path_buf()),
                &options,
                cancel,
            )
            .await?;

        let etag = upload.outcome.upload.etag.clone();
        self.emit(MigrationEvent::Uploaded {
            object: object.to_string(),
            tx_hash: upload.tx_hash.clone(),
            etag: etag.clone(),
        })
        .await;

        Ok(match upload.outcome.seal {
            SealStatus::Sealed => {
                info!(object, tx_hash = %upload.tx_hash, "object migrated and sealed");
                self.emit(MigrationEvent::Sealed {
                    object: object.to_string(),
                })
                .await;
                ObjectOutcome::Sealed {
                    tx_hash: upload.tx_hash,
                    etag,
                }
            }
            SealStatus::Pending(status) => {
                info!(object, %status, "object migrated, not sealed yet");
                self.emit(MigrationEvent::NotSealed {
                    object: object.to_string(),
                    status,
                })
                .await;
                ObjectOutcome::Pending {
                    tx_hash: upload.tx_hash,
                    etag,
                    status,
                }
            }
        })
    }

    async fn emit(&self, event: MigrationEvent) {
        if let Some(tx) = &self.events_tx {
            let _ = tx.send(event).await;
        }
    }
}

async fn prepare_staging(dir: &Path) -> Result<(), PipelineError> {
    if tokio::fs::metadata(dir).await.is_ok() {
        return Ok(());
    }
    tokio::fs::create_dir_all(dir).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)).await?;
    }
    debug!(dir = %dir.display(), "created staging directory");
    Ok(())
}

fn save_task(target: &TaskTarget, state: &TaskState) {
    let saved = match &target.base {
        Some(base) => state.save_in(base),
        None => state.save(),
    };
    if let Err(e) = saved {
        warn!(task = %state.task_id, error = %e, "failed to save task state");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockChain;
    use crate::test_util::{MockSp, approval_ok, pipeline, put_ok};
    use crate::upload::PipelineConfig;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct MockS3 {
        objects: Vec<S3Object>,
        data: HashMap<String, Vec<u8>>,
        list_error: Option<String>,
        downloads: Mutex<Vec<String>>,
    }

    impl MockS3 {
        fn new(entries: &[(&str, &str)]) -> Self {
            Self {
                objects: entries
                    .iter()
                    .map(|(k, v)| S3Object {
                        key: k.to_string(),
                        size: v.len() as u64,
                        content_type: None,
                    })
                    .collect(),
                data: entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
                    .collect(),
                list_error: None,
                downloads: Mutex::new(Vec::new()),
            }
        }
    }

    impl S3Source for MockS3 {
        fn list_objects_v2<'a>(
            &'a self,
            _region: &'a str,
            _bucket: &'a str,
        ) -> BoxFuture<'a, Vec<S3Object>> {
            Box::pin(async move {
                match &self.list_error {
                    Some(e) => Err(PipelineError::InvalidArgument(e.clone())),
                    None => Ok(self.objects.clone()),
                }
            })
        }

        fn download_to<'a>(
            &'a self,
            writer: &'a mut (dyn AsyncWrite + Send + Unpin),
            _region: &'a str,
            _bucket: &'a str,
            key: &'a str,
        ) -> BoxFuture<'a, u64> {
            Box::pin(async move {
                self.downloads.lock().unwrap().push(key.to_string());
                let data = self
                    .data
                    .get(key)
                    .ok_or_else(|| PipelineError::InvalidArgument(format!("no such key {key}")))?;
                writer.write_all(data).await?;
                Ok(data.len() as u64)
            })
        }
    }

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            segment_size: 16,
            ec_shards: 4,
            seal_poll_interval: Duration::from_millis(5),
            seal_timeout: Duration::from_millis(100),
        }
    }

    fn request(staging: &Path) -> MigrationRequest {
        MigrationRequest {
            region: "us-east-1".into(),
            src_bucket: "legacy".into(),
            dst_bucket: "data".into(),
            staging_dir: staging.to_path_buf(),
            options: CreateObjectOptions::default(),
            task: None,
        }
    }

    #[tokio::test]
    async fn migrates_flattened_objects_and_cleans_up() {
        let sp = MockSp::start(vec![
            approval_ok("s1"),
            put_ok("e1"),
            approval_ok("s2"),
            put_ok("e2"),
        ])
        .await;
        let chain = Arc::new(MockChain::sealing_after(0));
        let p = pipeline(&sp, chain.clone(), fast_config());
        let s3 = MockS3::new(&[
            ("photos/", ""),
            ("photos/2024/a.jpg", "aaaa"),
            ("b.txt", "bbbbbbb"),
        ]);

        let root = tempfile::tempdir().unwrap();
        let staging = root.path().join("staging");
        let (tx, mut rx) = mpsc::channel(64);
        let report = Migrator::new(&p, &s3)
            .with_events(tx)
            .migrate(&request(&staging), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.skipped(), 1);
        assert_eq!(report.sealed(), 2);
        assert_eq!(report.failed(), 0);
        assert_eq!(report.objects[1].object, "a.jpg");
        assert_eq!(
            report.objects[1].outcome,
            ObjectOutcome::Sealed {
                tx_hash: "TX1".into(),
                etag: "e1".into()
            }
        );
        assert!(!staging.exists());

        let requests = sp.requests();
        assert_eq!(requests[1].request_line(), "PUT /a.jpg?uploadtransaction HTTP/1.1");
        assert_eq!(requests[1].body, b"aaaa");
        assert_eq!(requests[3].request_line(), "PUT /b.txt?uploadtransaction HTTP/1.1");
        assert_eq!(s3.downloads.lock().unwrap().len(), 2);

        let mut events = Vec::new();
        while let Ok(e) = rx.try_recv() {
            events.push(e);
        }
        assert_eq!(events[0], MigrationEvent::Listed { count: 3 });
        assert!(events.contains(&MigrationEvent::Skipped {
            key: "photos/".into()
        }));
        assert!(events.contains(&MigrationEvent::Sealed {
            object: "b.txt".into()
        }));
    }

    #[tokio::test]
    async fn failed_object_does_not_stop_the_run() {
        // First approval is refused; the second object goes through.
        let sp = MockSp::start(vec![
            crate::test_util::xml_error("403 Forbidden", "AccessDenied", "no"),
            approval_ok("s2"),
            put_ok("e2"),
        ])
        .await;
        let chain = Arc::new(MockChain::sealing_after(0));
        let p = pipeline(&sp, chain, fast_config());
        let s3 = MockS3::new(&[("a.bin", "aa"), ("b.bin", "b")]);

        let root = tempfile::tempdir().unwrap();
        let staging = root.path().join("staging");
        let report = Migrator::new(&p, &s3)
            .migrate(&request(&staging), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.failed(), 1);
        assert_eq!(report.sealed(), 1);
        let ObjectOutcome::Failed(msg) = &report.objects[0].outcome else {
            panic!("expected failure");
        };
        assert!(msg.contains("approval rejected"), "{msg}");
        assert!(!staging.exists());
    }

    #[tokio::test]
    async fn list_failure_aborts_and_cleans_up() {
        let sp = MockSp::start(vec![]).await;
        let p = pipeline(&sp, Arc::new(MockChain::sealing_after(0)), fast_config());
        let mut s3 = MockS3::new(&[("a.bin", "aa")]);
        s3.list_error = Some("access denied".into());

        let root = tempfile::tempdir().unwrap();
        let staging = root.path().join("staging");
        let err = Migrator::new(&p, &s3)
            .migrate(&request(&staging), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("access denied"));
        assert!(!staging.exists());
        assert!(s3.downloads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn pending_seal_is_reported_not_failed() {
        let sp = MockSp::start(vec![approval_ok("s1"), put_ok("e1")]).await;
        let chain = Arc::new(MockChain::with_statuses(
            [ObjectStatus::Created].into_iter().collect(),
        ));
        let p = pipeline(&sp, chain, fast_config());
        let s3 = MockS3::new(&[("a.bin", "aa")]);

        let root = tempfile::tempdir().unwrap();
        let report = Migrator::new(&p, &s3)
            .migrate(&request(&root.path().join("s")), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.pending(), 1);
        assert_eq!(report.failed(), 0);
    }

    #[tokio::test]
    async fn records_task_state() {
        let sp = MockSp::start(vec![approval_ok("s1"), put_ok("e1")]).await;
        let p = pipeline(&sp, Arc::new(MockChain::sealing_after(0)), fast_config());
        let s3 = MockS3::new(&[("dir/", ""), ("dir/a.bin", "aa")]);

        let root = tempfile::tempdir().unwrap();
        let home = root.path().join("home");
        let mut req = request(&root.path().join("staging"));
        req.task = Some(TaskTarget {
            task_id: "mig-1".into(),
            base: Some(home.clone()),
        });

        Migrator::new(&p, &s3)
            .migrate(&req, &CancellationToken::new())
            .await
            .unwrap();

        let state = TaskState::load_in(&home, "mig-1").unwrap();
        assert_eq!(state.status, TaskStatus::Completed);
        assert_eq!(state.folder_name, "legacy");
        assert_eq!(state.object_state.len(), 2);
        assert_eq!(state.object_state[0].status, ObjectTaskStatus::Skipped);
        assert_eq!(state.object_state[1].object_name, "a.bin");
        assert_eq!(state.object_state[1].status, ObjectTaskStatus::Sealed);
    }

    #[tokio::test]
    async fn cancelled_run_cleans_up() {
        let sp = MockSp::start(vec![]).await;
        let p = pipeline(&sp, Arc::new(MockChain::sealing_after(0)), fast_config());
        let s3 = MockS3::new(&[("a.bin", "aa")]);

        let root = tempfile::tempdir().unwrap();
        let staging = root.path().join("staging");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = Migrator::new(&p, &s3)
            .migrate(&request(&staging), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_canceled());
        assert!(!staging.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn staging_dir_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("stage");
        prepare_staging(&dir).await.unwrap();
        let mode = std::fs::metadata(&dir).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }
}
