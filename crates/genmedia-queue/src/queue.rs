//! Job queue using Redis Streams.

use redis::AsyncCommands;
use tracing::{debug, info, warn};

use genmedia_models::{JobId, JobMetadata};

use crate::error::{QueueError, QueueResult};
use crate::job::QueuedJob;
use crate::store::JobHandle;

/// Entries retained in the recency index behind `recent_job_ids`.
const RECENT_JOBS_KEPT: usize = 100;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for jobs
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Key prefix for job records
    pub key_prefix: String,
    /// How long terminal job records are retained, in seconds
    pub result_ttl_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "genmedia:jobs".to_string(),
            consumer_group: "genmedia:workers".to_string(),
            key_prefix: "genmedia".to_string(),
            result_ttl_secs: 86400,
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            stream_name: std::env::var("QUEUE_STREAM")
                .unwrap_or_else(|_| "genmedia:jobs".to_string()),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or_else(|_| "genmedia:workers".to_string()),
            key_prefix: std::env::var("QUEUE_KEY_PREFIX")
                .unwrap_or_else(|_| "genmedia".to_string()),
            result_ttl_secs: std::env::var("QUEUE_RESULT_TTL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(86400),
        }
    }
}

/// Job queue client.
#[derive(Clone)]
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl JobQueue {
    /// Create a new job queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    /// Initialize the queue (create consumer group if not exists).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Handle to one job's stored record. Does not check existence.
    pub fn handle(&self, job_id: JobId) -> JobHandle {
        JobHandle::new(
            self.client.clone(),
            job_id,
            &self.config.key_prefix,
            self.config.result_ttl_secs,
        )
    }

    /// Submit a job: write its initial record, then add it to the stream.
    ///
    /// The record is written first so a status poll issued immediately after
    /// submission finds the job in `queued` rather than `not_found`.
    pub async fn submit(&self, job: &QueuedJob) -> QueueResult<JobHandle> {
        let handle = self.handle(job.job_id.clone());
        let meta = JobMetadata::queued(job.request.total_steps());
        handle.init(job.kind(), &meta).await?;

        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(job)?;
        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .query_async(&mut conn)
            .await?;

        // Best-effort recency index; losing an entry only shortens listings.
        let recent_key = self.recent_key();
        let _: Result<(), redis::RedisError> = redis::pipe()
            .lpush(&recent_key, job.job_id.to_string())
            .ltrim(&recent_key, 0, (RECENT_JOBS_KEPT - 1) as isize)
            .query_async(&mut conn)
            .await;

        info!(job_id = %job.job_id, message_id, "Enqueued job");
        Ok(handle)
    }

    /// Most recently submitted job ids, newest first, capped at `limit`.
    pub async fn recent_job_ids(&self, limit: usize) -> QueueResult<Vec<JobId>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let ids: Vec<String> = conn
            .lrange(self.recent_key(), 0, (limit - 1) as isize)
            .await?;
        Ok(ids.into_iter().map(JobId::from_string).collect())
    }

    fn recent_key(&self) -> String {
        format!("{}:recent", self.config.key_prefix)
    }

    /// Acknowledge a job (mark as consumed).
    pub async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!("Acknowledged job: {}", message_id);
        Ok(())
    }

    /// Get queue length.
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
    }

    /// Consume jobs from the queue.
    /// Returns a batch of (message_id, job) pairs.
    pub async fn consume(
        &self,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<(String, QueuedJob)>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: redis::streams::StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let mut jobs = Vec::new();

        for stream_key in result.keys {
            for entry in stream_key.ids {
                let message_id = entry.id.clone();

                if let Some(redis::Value::BulkString(payload)) = entry.map.get("job") {
                    let payload_str = String::from_utf8_lossy(payload);
                    match serde_json::from_str::<QueuedJob>(&payload_str) {
                        Ok(job) => {
                            debug!(job_id = %job.job_id, "Consumed job from stream");
                            jobs.push((message_id, job));
                        }
                        Err(e) => {
                            warn!("Failed to parse job payload: {}", e);
                            // Ack the malformed message to prevent reprocessing
                            self.ack(&message_id).await.ok();
                        }
                    }
                }
            }
        }

        Ok(jobs)
    }
}
