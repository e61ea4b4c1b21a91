//! Per-job state records in Redis hashes.
//!
//! Each job owns one hash holding its state, metadata, result and error.
//! Metadata writes flush synchronously so pollers never read a state that is
//! newer than the metadata describing it.

use redis::AsyncCommands;
use tracing::debug;

use genmedia_models::{JobId, JobKind, JobMetadata, JobOutcome, JobState};

use crate::error::{QueueError, QueueResult};

/// Full snapshot of a stored job.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub job_id: JobId,
    pub kind: JobKind,
    pub state: JobState,
    pub meta: JobMetadata,
    pub result: Option<JobOutcome>,
    pub error: Option<String>,
}

/// Handle to one job's stored record.
#[derive(Clone)]
pub struct JobHandle {
    client: redis::Client,
    job_id: JobId,
    key: String,
    result_ttl_secs: u64,
}

impl JobHandle {
    pub(crate) fn new(
        client: redis::Client,
        job_id: JobId,
        key_prefix: &str,
        result_ttl_secs: u64,
    ) -> Self {
        let key = format!("{}:job:{}", key_prefix, job_id);
        Self {
            client,
            job_id,
            key,
            result_ttl_secs,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    async fn conn(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Whether the record exists at all.
    pub async fn exists(&self) -> QueueResult<bool> {
        let mut conn = self.conn().await?;
        Ok(conn.exists(&self.key).await?)
    }

    /// Write the initial record for a freshly submitted job.
    pub async fn init(&self, kind: JobKind, meta: &JobMetadata) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let now = chrono::Utc::now().to_rfc3339();
        conn.hset_multiple::<_, _, _, ()>(
            &self.key,
            &[
                ("kind", kind.as_str().to_string()),
                ("state", JobState::Queued.as_str().to_string()),
                ("meta", serde_json::to_string(meta)?),
                ("created_at", now.clone()),
                ("updated_at", now),
            ],
        )
        .await?;
        Ok(())
    }

    /// Current queue state. `NotFound` for a missing record.
    pub async fn state(&self) -> QueueResult<JobState> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.hget(&self.key, "state").await?;
        Ok(match raw.as_deref() {
            None => JobState::NotFound,
            Some("queued") => JobState::Queued,
            Some("started") => JobState::Started,
            Some("finished") => JobState::Finished,
            Some("failed") => JobState::Failed,
            Some(_) => JobState::NotFound,
        })
    }

    /// Current metadata. Empty metadata for a missing record.
    pub async fn metadata(&self) -> QueueResult<JobMetadata> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.hget(&self.key, "meta").await?;
        match raw {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(JobMetadata::default()),
        }
    }

    /// Overwrite the metadata document. Flushes before returning.
    pub async fn set_metadata(&self, meta: &JobMetadata) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        conn.hset_multiple::<_, _, _, ()>(
            &self.key,
            &[
                ("meta", serde_json::to_string(meta)?),
                ("updated_at", chrono::Utc::now().to_rfc3339()),
            ],
        )
        .await?;
        Ok(())
    }

    /// Mark the job as claimed by a worker.
    pub async fn mark_started(&self) -> QueueResult<()> {
        self.set_state(JobState::Started).await
    }

    /// Record a successful outcome and flip the job to finished.
    pub async fn finish(&self, outcome: &JobOutcome, meta: &JobMetadata) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        conn.hset_multiple::<_, _, _, ()>(
            &self.key,
            &[
                ("state", JobState::Finished.as_str().to_string()),
                ("result", serde_json::to_string(outcome)?),
                ("meta", serde_json::to_string(meta)?),
                ("updated_at", chrono::Utc::now().to_rfc3339()),
            ],
        )
        .await?;
        self.apply_retention(&mut conn).await?;
        debug!(job_id = %self.job_id, "Job finished");
        Ok(())
    }

    /// Record a failure and flip the job to failed.
    pub async fn fail(&self, error: &str, meta: &JobMetadata) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        conn.hset_multiple::<_, _, _, ()>(
            &self.key,
            &[
                ("state", JobState::Failed.as_str().to_string()),
                ("error", error.to_string()),
                ("meta", serde_json::to_string(meta)?),
                ("updated_at", chrono::Utc::now().to_rfc3339()),
            ],
        )
        .await?;
        self.apply_retention(&mut conn).await?;
        debug!(job_id = %self.job_id, error, "Job failed");
        Ok(())
    }

    /// Stored outcome, if any.
    pub async fn result(&self) -> QueueResult<Option<JobOutcome>> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.hget(&self.key, "result").await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Stored error message, if any.
    pub async fn error(&self) -> QueueResult<Option<String>> {
        let mut conn = self.conn().await?;
        Ok(conn.hget(&self.key, "error").await?)
    }

    /// Full snapshot. Errors with `JobNotFound` for a missing record.
    pub async fn record(&self) -> QueueResult<JobRecord> {
        let mut conn = self.conn().await?;
        let fields: Vec<Option<String>> = conn
            .hget(&self.key, &["kind", "state", "meta", "result", "error"])
            .await?;
        let [kind, state, meta, result, error] = <[Option<String>; 5]>::try_from(fields)
            .map_err(|_| QueueError::DequeueFailed("malformed job record".to_string()))?;

        let kind = match kind.as_deref() {
            Some("video") => JobKind::Video,
            Some("audio") => JobKind::Audio,
            _ => return Err(QueueError::job_not_found(self.job_id.to_string())),
        };
        let state = match state.as_deref() {
            Some("queued") => JobState::Queued,
            Some("started") => JobState::Started,
            Some("finished") => JobState::Finished,
            Some("failed") => JobState::Failed,
            _ => JobState::NotFound,
        };
        let meta = match meta {
            Some(json) => serde_json::from_str(&json)?,
            None => JobMetadata::default(),
        };
        let result = match result {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        };

        Ok(JobRecord {
            job_id: self.job_id.clone(),
            kind,
            state,
            meta,
            result,
            error,
        })
    }

    async fn set_state(&self, state: JobState) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        conn.hset_multiple::<_, _, _, ()>(
            &self.key,
            &[
                ("state", state.as_str().to_string()),
                ("updated_at", chrono::Utc::now().to_rfc3339()),
            ],
        )
        .await?;
        Ok(())
    }

    async fn apply_retention(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
    ) -> QueueResult<()> {
        if self.result_ttl_secs > 0 {
            conn.expire::<_, ()>(&self.key, self.result_ttl_secs as i64)
                .await?;
        }
        Ok(())
    }
}
