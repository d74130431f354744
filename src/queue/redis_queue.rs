use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nanoid::nanoid;
use once_cell::sync::Lazy;
use redis::{AsyncCommands, Script};
use serde_json::{from_str, to_string};
use tokio::time::{sleep, Instant};
use tracing::{debug, error};

use super::{JobQueue, QueueSettings, QueueStats};
use crate::error::QueueResult;
use crate::job::{DeadLetter, Delivery, Job, JobId};
use crate::rdconfig::RedisConnector;

// Job hashes are addressed through ARGV prefixes, so these scripts assume a
// single Redis node, not a cluster.

// KEYS: pending, in-flight, delayed. ARGV: now ms, visibility ms, lease, job key prefix.
static RESERVE_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
local now = tonumber(ARGV[1])
for _, id in ipairs(redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', now)) do
  redis.call('ZREM', KEYS[2], id)
  redis.call('HDEL', ARGV[4] .. id, 'lease')
  redis.call('RPUSH', KEYS[1], id)
end
for _, id in ipairs(redis.call('ZRANGEBYSCORE', KEYS[3], '-inf', now)) do
  redis.call('ZREM', KEYS[3], id)
  redis.call('RPUSH', KEYS[1], id)
end
while true do
  local id = redis.call('LPOP', KEYS[1])
  if not id then
    return false
  end
  local job_key = ARGV[4] .. id
  if redis.call('EXISTS', job_key) == 1 then
    local attempts = redis.call('HINCRBY', job_key, 'attempts', 1)
    redis.call('HSET', job_key, 'lease', ARGV[3], 'status', 'in_flight')
    redis.call('ZADD', KEYS[2], now + tonumber(ARGV[2]), id)
    local fields = redis.call('HMGET', job_key, 'payload', 'enqueued_at')
    return {id, attempts, fields[1], fields[2]}
  end
end
"#,
    )
});

// KEYS: in-flight, job. ARGV: id, lease, now ms.
static ACK_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
local deadline = redis.call('ZSCORE', KEYS[1], ARGV[1])
if not deadline or tonumber(deadline) <= tonumber(ARGV[#ARGV]) then
  return 0
end
if redis.call('HGET', KEYS[2], 'lease') ~= ARGV[2] then
  return 0
end
redis.call('ZREM', KEYS[1], ARGV[1])
redis.call('DEL', KEYS[2])
return 1
"#,
    )
});

// KEYS: in-flight, job, delayed, pending. ARGV: id, lease, due ms (0 = now), error, now ms.
static RETRY_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
local deadline = redis.call('ZSCORE', KEYS[1], ARGV[1])
if not deadline or tonumber(deadline) <= tonumber(ARGV[#ARGV]) then
  return 0
end
if redis.call('HGET', KEYS[2], 'lease') ~= ARGV[2] then
  return 0
end
redis.call('ZREM', KEYS[1], ARGV[1])
redis.call('HDEL', KEYS[2], 'lease')
redis.call('HSET', KEYS[2], 'status', 'retrying', 'error', ARGV[4])
if tonumber(ARGV[3]) > 0 then
  redis.call('ZADD', KEYS[3], ARGV[3], ARGV[1])
else
  redis.call('RPUSH', KEYS[4], ARGV[1])
end
return 1
"#,
    )
});

// KEYS: in-flight, job, dead. ARGV: id, lease, error, failed_at, now ms.
static DEAD_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
local deadline = redis.call('ZSCORE', KEYS[1], ARGV[1])
if not deadline or tonumber(deadline) <= tonumber(ARGV[#ARGV]) then
  return 0
end
if redis.call('HGET', KEYS[2], 'lease') ~= ARGV[2] then
  return 0
end
redis.call('ZREM', KEYS[1], ARGV[1])
redis.call('HDEL', KEYS[2], 'lease')
redis.call('HSET', KEYS[2], 'status', 'dead', 'error', ARGV[3], 'failed_at', ARGV[4])
redis.call('LPUSH', KEYS[3], ARGV[1])
return 1
"#,
    )
});

// KEYS: dead, job, pending. ARGV: id.
static REQUEUE_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
if redis.call('LREM', KEYS[1], 0, ARGV[1]) == 0 then
  return 0
end
if redis.call('EXISTS', KEYS[2]) == 0 then
  return 0
end
redis.call('HSET', KEYS[2], 'attempts', 0, 'status', 'pending')
redis.call('HDEL', KEYS[2], 'error', 'failed_at')
redis.call('RPUSH', KEYS[3], ARGV[1])
return 1
"#,
    )
});

type Reserved = (String, u32, String, String);

/// Redis-backed queue.
///
/// Layout under `<prefix>`:
/// - `job:<id>` hash with payload, attempts, lease, status, timestamps
/// - `queue:<name>` list of ready ids
/// - `inflight:<name>` zset of leased ids scored by visibility deadline (ms)
/// - `delayed:<name>` zset of retrying ids scored by due time (ms)
/// - `dead:<name>` list of dead-lettered ids, newest first
pub struct RedisJobQueue {
    redis: Arc<RedisConnector>,
    settings: QueueSettings,
    job_prefix: String,
    pending_key: String,
    in_flight_key: String,
    delayed_key: String,
    dead_key: String,
}

impl RedisJobQueue {
    pub fn new(redis: Arc<RedisConnector>, prefix: &str, settings: QueueSettings) -> Self {
        let name = &settings.name;
        Self {
            job_prefix: format!("{prefix}:job:"),
            pending_key: format!("{prefix}:queue:{name}"),
            in_flight_key: format!("{prefix}:inflight:{name}"),
            delayed_key: format!("{prefix}:delayed:{name}"),
            dead_key: format!("{prefix}:dead:{name}"),
            redis,
            settings,
        }
    }

    fn job_key(&self, id: &JobId) -> String {
        format!("{}{}", self.job_prefix, id)
    }

    async fn reserve(&self) -> QueueResult<Option<(Reserved, String)>> {
        let now = Utc::now().timestamp_millis();
        let visibility = self.settings.visibility_timeout.as_millis() as i64;
        let lease = nanoid!(16);
        let lease_arg = lease.as_str();
        let reserved = self
            .redis
            .run(|mut conn| async move {
                let mut invocation = RESERVE_SCRIPT.prepare_invoke();
                invocation
                    .key(&self.pending_key)
                    .key(&self.in_flight_key)
                    .key(&self.delayed_key)
                    .arg(now)
                    .arg(visibility)
                    .arg(lease_arg)
                    .arg(&self.job_prefix);
                invocation
                    .invoke_async::<_, Option<Reserved>>(&mut conn)
                    .await
            })
            .await?;
        Ok(reserved.map(|reserved| (reserved, lease)))
    }

    /// Runs a settle script; the current time in ms is appended as the last ARGV.
    async fn finish(&self, script: &'static Script, keys: &[&str], args: &[&str]) -> QueueResult<bool> {
        let now = Utc::now().timestamp_millis();
        let done = self
            .redis
            .run(|mut conn| async move {
                let mut invocation = script.prepare_invoke();
                for key in keys {
                    invocation.key(*key);
                }
                for arg in args {
                    invocation.arg(*arg);
                }
                invocation.arg(now);
                invocation.invoke_async::<_, i32>(&mut conn).await
            })
            .await?;
        Ok(done == 1)
    }
}

fn parse_time(raw: Option<&String>) -> DateTime<Utc> {
    raw.and_then(|value| DateTime::parse_from_rfc3339(value).ok())
        .map(|time| time.with_timezone(&Utc))
        .unwrap_or_default()
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, job: &Job) -> QueueResult<JobId> {
        let payload = to_string(job)?;
        let id = JobId::generate();
        let now = Utc::now().to_rfc3339();
        let job_key = self.job_key(&id);
        let member = id.as_str();

        self.redis
            .run(|mut conn| async move {
                redis::pipe()
                    .atomic()
                    .hset_multiple(
                        &job_key,
                        &[
                            ("payload", payload.as_str()),
                            ("attempts", "0"),
                            ("status", "pending"),
                            ("enqueued_at", now.as_str()),
                        ],
                    )
                    .ignore()
                    .rpush(&self.pending_key, member)
                    .ignore()
                    .query_async::<_, ()>(&mut conn)
                    .await
            })
            .await?;

        debug!(job_id = %id, queue = %self.settings.name, "enqueued job");
        Ok(id)
    }

    async fn dequeue(&self, wait: Duration) -> QueueResult<Option<Delivery>> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(((id, attempt, payload, enqueued_at), lease)) = self.reserve().await? {
                let id = JobId::from(id);
                match from_str::<Job>(&payload) {
                    Ok(job) => {
                        return Ok(Some(Delivery {
                            id,
                            job,
                            attempt,
                            lease,
                            enqueued_at: parse_time(Some(&enqueued_at)),
                        }))
                    }
                    Err(err) => {
                        error!(job_id = %id, error = %err, "malformed job payload, dead-lettering");
                        let job_key = self.job_key(&id);
                        let failed_at = Utc::now().to_rfc3339();
                        let reason = format!("malformed payload: {err}");
                        self.finish(
                            &DEAD_SCRIPT,
                            &[&self.in_flight_key, &job_key, &self.dead_key],
                            &[id.as_str(), &lease, &reason, &failed_at],
                        )
                        .await?;
                        continue;
                    }
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            sleep((deadline - now).min(self.settings.poll_interval)).await;
        }
    }

    async fn ack(&self, delivery: &Delivery) -> QueueResult<bool> {
        let job_key = self.job_key(&delivery.id);
        self.finish(
            &ACK_SCRIPT,
            &[&self.in_flight_key, &job_key],
            &[delivery.id.as_str(), &delivery.lease],
        )
        .await
    }

    async fn retry(&self, delivery: &Delivery, delay: Duration, error: &str) -> QueueResult<bool> {
        let job_key = self.job_key(&delivery.id);
        let due = if delay.is_zero() {
            0
        } else {
            Utc::now().timestamp_millis() + delay.as_millis() as i64
        };
        let due = due.to_string();
        self.finish(
            &RETRY_SCRIPT,
            &[&self.in_flight_key, &job_key, &self.delayed_key, &self.pending_key],
            &[delivery.id.as_str(), &delivery.lease, &due, error],
        )
        .await
    }

    async fn dead_letter(&self, delivery: &Delivery, error: &str) -> QueueResult<bool> {
        let job_key = self.job_key(&delivery.id);
        let failed_at = Utc::now().to_rfc3339();
        self.finish(
            &DEAD_SCRIPT,
            &[&self.in_flight_key, &job_key, &self.dead_key],
            &[delivery.id.as_str(), &delivery.lease, error, &failed_at],
        )
        .await
    }

    async fn dead_letters(&self, limit: usize) -> QueueResult<Vec<DeadLetter>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let ids = self
            .redis
            .run(|mut conn| async move {
                conn.lrange::<_, Vec<String>>(&self.dead_key, 0, limit as isize - 1)
                    .await
            })
            .await?;

        let mut dead = Vec::with_capacity(ids.len());
        for id in ids {
            let id = JobId::from(id);
            let job_key = self.job_key(&id);
            let fields = self
                .redis
                .run(|mut conn| async move {
                    conn.hgetall::<_, HashMap<String, String>>(&job_key).await
                })
                .await?;
            if fields.is_empty() {
                continue;
            }
            let job = fields
                .get("payload")
                .and_then(|payload| from_str::<Job>(payload).ok());
            dead.push(DeadLetter {
                subject: job.as_ref().map(|j| j.subject.clone()).unwrap_or_default(),
                recipient: job.map(|j| j.recipient).unwrap_or_default(),
                attempts: fields
                    .get("attempts")
                    .and_then(|attempts| attempts.parse().ok())
                    .unwrap_or(0),
                error: fields.get("error").cloned().unwrap_or_default(),
                enqueued_at: parse_time(fields.get("enqueued_at")),
                failed_at: parse_time(fields.get("failed_at")),
                id,
            });
        }
        Ok(dead)
    }

    async fn requeue_dead(&self, id: &JobId) -> QueueResult<bool> {
        let job_key = self.job_key(id);
        self.finish(
            &REQUEUE_SCRIPT,
            &[&self.dead_key, &job_key, &self.pending_key],
            &[id.as_str()],
        )
        .await
    }

    async fn stats(&self) -> QueueResult<QueueStats> {
        let (pending, in_flight, delayed, dead) = self
            .redis
            .run(|mut conn| async move {
                redis::pipe()
                    .llen(&self.pending_key)
                    .zcard(&self.in_flight_key)
                    .zcard(&self.delayed_key)
                    .llen(&self.dead_key)
                    .query_async::<_, (usize, usize, usize, usize)>(&mut conn)
                    .await
            })
            .await?;
        Ok(QueueStats {
            pending,
            in_flight,
            delayed,
            dead,
        })
    }
}
