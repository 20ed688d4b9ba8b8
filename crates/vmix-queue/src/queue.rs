//! Job queue using Redis Streams.
//!
//! Each [`QueueClass`] is a separate stream (`<prefix>:jobs:<class>`) read by
//! one consumer group, so a backlog of renders never delays uploads or
//! cleanup. Fan-in barriers are a hash holding the chain total and the
//! cleanup payload plus a set of finished chain indices, updated atomically
//! by a Lua script.

use std::time::Duration;

use async_trait::async_trait;
use redis::streams::{StreamClaimReply, StreamId, StreamPendingCountReply, StreamReadReply};
use redis::{AsyncCommands, Script};
use tracing::{debug, info, warn};
use vmix_models::TaskId;

use crate::backend::{FanIn, FanInProgress, JobBackend};
use crate::error::{QueueError, QueueResult};
use crate::job::{CleanupJob, QueueClass, QueueJob};

/// Atomically record a terminal chain.
///
/// Returns `{remaining, ""}`, `{0, cleanup_json}` on release (and on every
/// report after it until the barrier is closed), `{-1, ""}` when no barrier
/// exists and `{-2, ""}` for a repeated index.
const CHAIN_TERMINAL_SCRIPT: &str = r#"
local total = redis.call('HGET', KEYS[1], 'total')
if not total then
    return {-1, ''}
end
if redis.call('HEXISTS', KEYS[1], 'released') == 1 then
    return {0, redis.call('HGET', KEYS[1], 'cleanup')}
end
if redis.call('SADD', KEYS[2], ARGV[1]) == 0 then
    return {-2, ''}
end
redis.call('EXPIRE', KEYS[2], ARGV[2])
local done = redis.call('SCARD', KEYS[2])
if done >= tonumber(total) then
    redis.call('HSET', KEYS[1], 'released', 1)
    return {0, redis.call('HGET', KEYS[1], 'cleanup')}
end
return {tonumber(total) - done, ''}
"#;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Prefix for every key this queue owns
    pub key_prefix: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Dead letter queue stream name
    pub dlq_stream_name: String,
    /// Max retries before DLQ
    pub max_retries: u32,
    /// Idle time after which a delivered job may be claimed by another worker
    pub visibility_timeout: Duration,
    /// Lifetime of duplicate-suppression keys
    pub dedup_ttl: Duration,
    /// Lifetime of an unreleased fan-in barrier
    pub barrier_ttl: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "vmix".to_string(),
            consumer_group: "vmix:workers".to_string(),
            dlq_stream_name: "vmix:dlq".to_string(),
            max_retries: 3,
            visibility_timeout: Duration::from_secs(600), // 10 minutes
            dedup_ttl: Duration::from_secs(3600),
            barrier_ttl: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            key_prefix: std::env::var("QUEUE_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            dlq_stream_name: std::env::var("QUEUE_DLQ_STREAM").unwrap_or(defaults.dlq_stream_name),
            max_retries: std::env::var("QUEUE_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            visibility_timeout: std::env::var("QUEUE_VISIBILITY_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.visibility_timeout),
            dedup_ttl: defaults.dedup_ttl,
            barrier_ttl: std::env::var("QUEUE_BARRIER_TTL")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.barrier_ttl),
        }
    }

    /// Stream name for a queue class.
    pub fn stream_name(&self, class: QueueClass) -> String {
        format!("{}:jobs:{}", self.key_prefix, class.as_str())
    }

    fn class_for_stream(&self, stream: &str) -> Option<QueueClass> {
        QueueClass::ALL
            .into_iter()
            .find(|class| self.stream_name(*class) == stream)
    }

    fn dedup_key(&self, idempotency_key: &str) -> String {
        format!("{}:dedup:{}", self.key_prefix, idempotency_key)
    }

    fn retry_key(&self, message_id: &str) -> String {
        format!("{}:retry:{}", self.key_prefix, message_id)
    }

    fn barrier_keys(&self, task_id: &TaskId) -> (String, String) {
        let meta = format!("{}:fanin:{}", self.key_prefix, task_id);
        let done = format!("{}:done", meta);
        (meta, done)
    }
}

/// A job read from a class stream.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message_id: String,
    pub class: QueueClass,
    pub job: QueueJob,
}

/// Job queue client.
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
    chain_terminal: Script,
}

impl JobQueue {
    /// Create a new job queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            config,
            chain_terminal: Script::new(CHAIN_TERMINAL_SCRIPT),
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    async fn conn(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Initialize the queue (create consumer groups if not exists).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.conn().await?;

        for class in QueueClass::ALL {
            let stream = self.config.stream_name(class);
            let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
                .arg("CREATE")
                .arg(&stream)
                .arg(&self.config.consumer_group)
                .arg("$")
                .arg("MKSTREAM")
                .query_async(&mut conn)
                .await;

            match result {
                Ok(_) => info!("Created consumer group {} on {}", self.config.consumer_group, stream),
                Err(e) if e.to_string().contains("BUSYGROUP") => {
                    debug!("Consumer group already exists on {}", stream);
                }
                Err(e) => return Err(QueueError::Redis(e)),
            }
        }

        Ok(())
    }

    /// Ping the server.
    pub async fn health_check(&self) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }

    /// Acknowledge a job (mark as completed).
    pub async fn ack(&self, class: QueueClass, message_id: &str) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let stream = self.config.stream_name(class);

        redis::cmd("XACK")
            .arg(&stream)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        // Delete the message from the stream
        redis::cmd("XDEL")
            .arg(&stream)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        conn.del::<_, ()>(self.config.retry_key(message_id)).await?;

        debug!("Acknowledged job {} on {}", message_id, class);
        Ok(())
    }

    /// Move a job to the dead letter queue.
    pub async fn dlq(&self, delivery: &Delivery, error: &str) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(&delivery.job)?;

        redis::cmd("XADD")
            .arg(&self.config.dlq_stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(&delivery.message_id)
            .arg("class")
            .arg(delivery.class.as_str())
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(delivery.class, &delivery.message_id).await?;

        warn!(
            "Moved {} job for task {} to DLQ: {}",
            delivery.job.kind(),
            delivery.job.task_id(),
            error
        );
        Ok(())
    }

    /// Get queue length for a class.
    pub async fn len(&self, class: QueueClass) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        let len: u64 = conn.xlen(self.config.stream_name(class)).await?;
        Ok(len)
    }

    /// Get DLQ length.
    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        let len: u64 = conn.xlen(&self.config.dlq_stream_name).await?;
        Ok(len)
    }

    /// Read new jobs from the given classes.
    pub async fn consume(
        &self,
        consumer_name: &str,
        classes: &[QueueClass],
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        if classes.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.conn().await?;

        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS");
        for class in classes {
            cmd.arg(self.config.stream_name(*class));
        }
        for _ in classes {
            cmd.arg(">"); // Only new messages
        }

        let result: Option<StreamReadReply> = cmd.query_async(&mut conn).await?;
        let Some(result) = result else {
            return Ok(Vec::new());
        };

        let mut jobs = Vec::new();
        for stream_key in result.keys {
            let Some(class) = self.config.class_for_stream(&stream_key.key) else {
                warn!("Ignoring entries from unknown stream {}", stream_key.key);
                continue;
            };
            for entry in stream_key.ids {
                if let Some(delivery) = self.parse_entry(class, &entry).await {
                    debug!("Consumed {} job for task {}", delivery.job.kind(), delivery.job.task_id());
                    jobs.push(delivery);
                }
            }
        }

        Ok(jobs)
    }

    /// Claim jobs that have been pending for too long on one class.
    /// This handles jobs from crashed workers and jobs left for retry.
    pub async fn claim_pending(
        &self,
        consumer_name: &str,
        class: QueueClass,
        min_idle_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.conn().await?;
        let stream = self.config.stream_name(class);

        let pending: StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&stream)
            .arg(&self.config.consumer_group)
            .arg("-")
            .arg("+")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        let stale: Vec<String> = pending
            .ids
            .into_iter()
            .filter(|p| p.last_delivered_ms as u64 >= min_idle_ms)
            .map(|p| p.id)
            .collect();
        if stale.is_empty() {
            return Ok(Vec::new());
        }

        let result: StreamClaimReply = redis::cmd("XCLAIM")
            .arg(&stream)
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(min_idle_ms)
            .arg(&stale)
            .query_async(&mut conn)
            .await?;

        let mut jobs = Vec::new();
        for entry in result.ids {
            if let Some(delivery) = self.parse_entry(class, &entry).await {
                info!("Claimed pending {} job for task {}", delivery.job.kind(), delivery.job.task_id());
                jobs.push(delivery);
            }
        }

        Ok(jobs)
    }

    async fn parse_entry(&self, class: QueueClass, entry: &StreamId) -> Option<Delivery> {
        let payload: Option<String> = entry.get("job");
        match payload.map(|p| serde_json::from_str::<QueueJob>(&p)) {
            Some(Ok(job)) => Some(Delivery {
                message_id: entry.id.clone(),
                class,
                job,
            }),
            Some(Err(e)) => {
                warn!("Failed to parse job payload {}: {}", entry.id, e);
                // Ack the malformed message to prevent reprocessing
                self.ack(class, &entry.id).await.ok();
                None
            }
            None => {
                warn!("Stream entry {} has no job field", entry.id);
                self.ack(class, &entry.id).await.ok();
                None
            }
        }
    }

    /// Increment retry count for a job.
    pub async fn increment_retry(&self, message_id: &str) -> QueueResult<u32> {
        let mut conn = self.conn().await?;

        let key = self.config.retry_key(message_id);
        let count: u32 = conn.incr(&key, 1).await?;
        // Set TTL to 24 hours
        conn.expire::<_, ()>(&key, 86400).await?;
        Ok(count)
    }

    /// Get max retries from config.
    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }
}

#[async_trait]
impl JobBackend for JobQueue {
    async fn enqueue(&self, job: QueueJob) -> QueueResult<String> {
        let mut conn = self.conn().await?;

        let payload = serde_json::to_string(&job)?;
        let idempotency_key = job.idempotency_key();

        // SET NX doubles as the duplicate check
        let dedup_key = self.config.dedup_key(&idempotency_key);
        let fresh: bool = redis::cmd("SET")
            .arg(&dedup_key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(self.config.dedup_ttl.as_secs())
            .query_async::<Option<String>>(&mut conn)
            .await?
            .is_some();
        if !fresh {
            warn!("Duplicate job rejected: {}", idempotency_key);
            return Err(QueueError::Duplicate(idempotency_key));
        }

        let stream = self.config.stream_name(job.class());
        let added: Result<String, redis::RedisError> = redis::cmd("XADD")
            .arg(&stream)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("key")
            .arg(&idempotency_key)
            .query_async(&mut conn)
            .await;

        let message_id = match added {
            Ok(id) => id,
            Err(e) => {
                // Release the dedup key so the caller may try again
                conn.del::<_, ()>(&dedup_key).await.ok();
                return Err(e.into());
            }
        };

        info!(
            "Enqueued {} job for task {} on {} ({})",
            job.kind(),
            job.task_id(),
            stream,
            message_id
        );

        Ok(message_id)
    }

    async fn open_fan_in(&self, fan_in: &FanIn) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let (meta, _) = self.config.barrier_keys(&fan_in.task_id);
        let cleanup = serde_json::to_string(&fan_in.cleanup)?;

        let created: bool = conn.hset_nx(&meta, "total", fan_in.total).await?;
        if !created {
            return Err(QueueError::fan_in(format!(
                "barrier already open for {}",
                fan_in.task_id
            )));
        }
        conn.hset::<_, _, _, ()>(&meta, "cleanup", cleanup).await?;
        conn.expire::<_, ()>(&meta, self.config.barrier_ttl.as_secs() as i64)
            .await?;

        debug!(task_id = %fan_in.task_id, total = fan_in.total, "Opened fan-in barrier");
        Ok(())
    }

    async fn chain_terminal(&self, task_id: &TaskId, index: usize) -> QueueResult<FanInProgress> {
        let mut conn = self.conn().await?;
        let (meta, done) = self.config.barrier_keys(task_id);

        let (status, payload): (i64, String) = self
            .chain_terminal
            .key(&meta)
            .key(&done)
            .arg(index)
            .arg(self.config.barrier_ttl.as_secs())
            .invoke_async(&mut conn)
            .await?;

        Ok(match status {
            -1 => FanInProgress::Closed,
            -2 => FanInProgress::AlreadyCounted,
            0 => {
                let cleanup: CleanupJob = serde_json::from_str(&payload)?;
                FanInProgress::Released { cleanup }
            }
            remaining => FanInProgress::Pending {
                remaining: remaining as usize,
            },
        })
    }

    async fn close_fan_in(&self, task_id: &TaskId) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let (meta, done) = self.config.barrier_keys(task_id);
        conn.del::<_, ()>(vec![meta, done]).await?;
        Ok(())
    }
}
