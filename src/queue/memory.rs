use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nanoid::nanoid;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::debug;

use super::{JobQueue, QueueSettings, QueueStats};
use crate::error::QueueResult;
use crate::job::{DeadLetter, Delivery, Job, JobId};

struct Entry {
    job: Job,
    attempts: u32,
    lease: Option<String>,
    enqueued_at: DateTime<Utc>,
}

#[derive(Default)]
struct State {
    jobs: HashMap<JobId, Entry>,
    pending: VecDeque<JobId>,
    delayed: Vec<(Instant, JobId)>,
    in_flight: HashMap<JobId, Instant>,
    dead: Vec<DeadLetter>,
}

impl State {
    /// Expired leases and due retries become pending again.
    fn reclaim(&mut self, now: Instant) {
        let expired: Vec<JobId> = self
            .in_flight
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            self.in_flight.remove(&id);
            if let Some(entry) = self.jobs.get_mut(&id) {
                entry.lease = None;
            }
            debug!(job_id = %id, "lease expired, job is visible again");
            self.pending.push_back(id);
        }

        let mut index = 0;
        while index < self.delayed.len() {
            if self.delayed[index].0 <= now {
                let (_, id) = self.delayed.swap_remove(index);
                self.pending.push_back(id);
            } else {
                index += 1;
            }
        }
    }

    /// The lease is current and its deadline has not passed.
    fn holds(&self, delivery: &Delivery, now: Instant) -> bool {
        self.in_flight
            .get(&delivery.id)
            .is_some_and(|deadline| *deadline > now)
            && self
                .jobs
                .get(&delivery.id)
                .and_then(|entry| entry.lease.as_deref())
                == Some(delivery.lease.as_str())
    }

    fn release(&mut self, id: &JobId) {
        self.in_flight.remove(id);
        if let Some(entry) = self.jobs.get_mut(id) {
            entry.lease = None;
        }
    }
}

/// Process-local queue with the same lease semantics as [`super::RedisJobQueue`].
///
/// Deadlines use `tokio::time`, so tests can drive visibility timeouts with a
/// paused clock.
pub struct InMemoryJobQueue {
    settings: QueueSettings,
    state: Mutex<State>,
    notify: Notify,
}

impl InMemoryJobQueue {
    pub fn new(settings: QueueSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(State::default()),
            notify: Notify::new(),
        }
    }

    async fn try_lease(&self) -> Option<Delivery> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let now = Instant::now();
        state.reclaim(now);

        while let Some(id) = state.pending.pop_front() {
            let Some(entry) = state.jobs.get_mut(&id) else {
                continue;
            };
            let lease = nanoid!(16);
            entry.attempts += 1;
            entry.lease = Some(lease.clone());
            state
                .in_flight
                .insert(id.clone(), now + self.settings.visibility_timeout);
            return Some(Delivery {
                id,
                job: entry.job.clone(),
                attempt: entry.attempts,
                lease,
                enqueued_at: entry.enqueued_at,
            });
        }
        None
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: &Job) -> QueueResult<JobId> {
        let id = JobId::generate();
        {
            let mut state = self.state.lock().await;
            state.jobs.insert(
                id.clone(),
                Entry {
                    job: job.clone(),
                    attempts: 0,
                    lease: None,
                    enqueued_at: Utc::now(),
                },
            );
            state.pending.push_back(id.clone());
        }
        self.notify.notify_one();
        Ok(id)
    }

    async fn dequeue(&self, wait: Duration) -> QueueResult<Option<Delivery>> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(delivery) = self.try_lease().await {
                return Ok(Some(delivery));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let nap = (deadline - now).min(self.settings.poll_interval);
            let _ = tokio::time::timeout(nap, self.notify.notified()).await;
        }
    }

    async fn ack(&self, delivery: &Delivery) -> QueueResult<bool> {
        let mut state = self.state.lock().await;
        if !state.holds(delivery, Instant::now()) {
            return Ok(false);
        }
        state.in_flight.remove(&delivery.id);
        state.jobs.remove(&delivery.id);
        Ok(true)
    }

    async fn retry(&self, delivery: &Delivery, delay: Duration, _error: &str) -> QueueResult<bool> {
        {
            let mut state = self.state.lock().await;
            if !state.holds(delivery, Instant::now()) {
                return Ok(false);
            }
            state.release(&delivery.id);
            if delay.is_zero() {
                state.pending.push_back(delivery.id.clone());
            } else {
                state.delayed.push((Instant::now() + delay, delivery.id.clone()));
            }
        }
        self.notify.notify_one();
        Ok(true)
    }

    async fn dead_letter(&self, delivery: &Delivery, error: &str) -> QueueResult<bool> {
        let mut state = self.state.lock().await;
        if !state.holds(delivery, Instant::now()) {
            return Ok(false);
        }
        state.release(&delivery.id);
        state.dead.push(DeadLetter::new(delivery, error));
        Ok(true)
    }

    async fn dead_letters(&self, limit: usize) -> QueueResult<Vec<DeadLetter>> {
        let state = self.state.lock().await;
        Ok(state.dead.iter().rev().take(limit).cloned().collect())
    }

    async fn requeue_dead(&self, id: &JobId) -> QueueResult<bool> {
        {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let Some(position) = state.dead.iter().position(|dead| &dead.id == id) else {
                return Ok(false);
            };
            state.dead.remove(position);
            match state.jobs.get_mut(id) {
                Some(entry) => entry.attempts = 0,
                None => return Ok(false),
            }
            state.pending.push_back(id.clone());
        }
        self.notify.notify_one();
        Ok(true)
    }

    async fn stats(&self) -> QueueResult<QueueStats> {
        let state = self.state.lock().await;
        Ok(QueueStats {
            pending: state.pending.len(),
            in_flight: state.in_flight.len(),
            delayed: state.delayed.len(),
            dead: state.dead.len(),
        })
    }
}
