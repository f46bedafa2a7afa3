use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::domain::{ExportJob, JobStatus, ProgressEvent};

/// Per-subscriber outbound buffer. `push` drops the oldest pending event
/// when full (§4.4 "latest-wins policy — progress is cumulative and
/// monotonic, so stale events add no information"); it never blocks the
/// publisher.
struct SubscriberQueue {
    events: Mutex<VecDeque<ProgressEvent>>,
    notify: Notify,
    capacity: usize,
}

impl SubscriberQueue {
    fn new(capacity: usize) -> Self {
        Self { events: Mutex::new(VecDeque::with_capacity(capacity)), notify: Notify::new(), capacity }
    }

    fn push(&self, event: ProgressEvent) {
        let mut events = self.events.lock().expect("subscriber queue mutex poisoned");
        if events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
        drop(events);
        self.notify.notify_one();
    }

    /// Waits for and returns the next event. Returns `None` once `closed`
    /// is set and the queue has drained, so a write loop can exit cleanly.
    async fn recv(&self, closed: &std::sync::atomic::AtomicBool) -> Option<ProgressEvent> {
        loop {
            {
                let mut events = self.events.lock().expect("subscriber queue mutex poisoned");
                if let Some(event) = events.pop_front() {
                    return Some(event);
                }
            }
            if closed.load(Ordering::Acquire) {
                return None;
            }
            self.notify.notified().await;
        }
    }
}

type ClosedFlag = Arc<std::sync::atomic::AtomicBool>;

struct JobChannel {
    seq: u64,
    subscribers: HashMap<u64, (Arc<SubscriberQueue>, ClosedFlag)>,
}

/// A live handle to one subscriber's event stream, returned by
/// `ProgressHub::subscribe`. Drop (or call `close`) to mark the subscriber
/// closed; the hub removes it from the fan-out set on the next publish or
/// unsubscribe call against its job.
pub struct Subscription {
    id: u64,
    job_id: String,
    queue: Arc<SubscriberQueue>,
    closed: Arc<std::sync::atomic::AtomicBool>,
}

impl Subscription {
    pub async fn recv(&self) -> Option<ProgressEvent> {
        self.queue.recv(&self.closed).await
    }

    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
        self.queue.notify.notify_one();
    }
}

/// In-memory, per-job fan-out of ephemeral progress events. Never persisted
/// — see `spec.md` §4.4. Correctness of job completion never depends on a
/// subscriber observing any event this hub delivers.
pub struct ProgressHub {
    capacity: usize,
    jobs: Mutex<HashMap<String, JobChannel>>,
    next_subscriber_id: AtomicU64,
}

impl ProgressHub {
    pub fn new(subscriber_queue_capacity: usize) -> Self {
        Self {
            capacity: subscriber_queue_capacity,
            jobs: Mutex::new(HashMap::new()),
            next_subscriber_id: AtomicU64::new(1),
        }
    }

    /// Register a subscriber for `job`. Immediately enqueues a synthetic
    /// "current status" event derived from the Job Store snapshot so the
    /// caller is caught up without waiting on the next publish. If the job
    /// is already terminal, the subscriber is not registered for further
    /// events — the synthetic event is the only one it will ever receive.
    pub fn subscribe(&self, job: &ExportJob) -> Subscription {
        let queue = Arc::new(SubscriberQueue::new(self.capacity));
        let closed = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);

        let mut jobs = self.jobs.lock().expect("progress hub mutex poisoned");
        let channel = jobs.entry(job.id.clone()).or_insert_with(|| JobChannel { seq: 0, subscribers: HashMap::new() });
        let synthetic = synthetic_event(job, channel.seq);
        queue.push(synthetic);

        if job.status.is_terminal() {
            closed.store(true, Ordering::Release);
        } else {
            channel.subscribers.insert(id, (queue.clone(), closed.clone()));
        }
        drop(jobs);

        tracing::debug!(job_id = %job.id, subscriber_id = id, "progress hub subscribe");
        Subscription { id, job_id: job.id.clone(), queue, closed }
    }

    pub fn unsubscribe(&self, subscription: &Subscription) {
        subscription.mark_closed();
        let mut jobs = self.jobs.lock().expect("progress hub mutex poisoned");
        if let Some(channel) = jobs.get_mut(&subscription.job_id) {
            channel.subscribers.remove(&subscription.id);
            if channel.subscribers.is_empty() {
                jobs.remove(&subscription.job_id);
            }
        }
        tracing::debug!(job_id = %subscription.job_id, subscriber_id = subscription.id, "progress hub unsubscribe");
    }

    /// Fan out `event` to every live subscriber of `job_id`, assigning the
    /// next monotonic sequence number for that job. If nobody is
    /// subscribed, this is an O(1) no-op (§4.4).
    pub fn publish(&self, job_id: &str, mut event: ProgressEvent) {
        let mut jobs = self.jobs.lock().expect("progress hub mutex poisoned");
        let Some(channel) = jobs.get_mut(job_id) else {
            return;
        };
        channel.seq += 1;
        event.seq = channel.seq;
        let terminal = event.status.is_terminal();
        for (queue, closed) in channel.subscribers.values() {
            queue.push(event.clone());
            if terminal {
                // Queue the close after the event so `recv` drains the
                // terminal event before reporting end-of-stream.
                closed.store(true, Ordering::Release);
            }
        }
        if terminal {
            jobs.remove(job_id);
        }
    }
}

fn synthetic_event(job: &ExportJob, current_seq: u64) -> ProgressEvent {
    match job.status {
        JobStatus::Pending => ProgressEvent::pending(job.id.clone()),
        JobStatus::Processing => ProgressEvent::processing(job.id.clone(), current_seq, 0, "in progress", "processing"),
        JobStatus::Complete => ProgressEvent::complete(
            job.id.clone(),
            current_seq,
            job.output_ref.clone().unwrap_or_default(),
            job.output_filename.clone().unwrap_or_default(),
        ),
        JobStatus::Error => ProgressEvent::error(job.id.clone(), current_seq, job.error.clone().unwrap_or_default()),
        JobStatus::Cancelled => ProgressEvent::cancelled(job.id.clone(), current_seq),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AspectRatio, ExportParams, FramingParams};

    fn job(status: JobStatus) -> ExportJob {
        let params = ExportParams::Framing(FramingParams {
            source_ref: "blob://s".into(),
            crop_keyframes: vec![],
            segments: vec![],
            target_aspect_ratio: AspectRatio { width: 9, height: 16 },
            target_frame_rate: 30.0,
            audio_include: false,
        });
        let mut j = ExportJob::new("job-1".into(), "owner".into(), "proj".into(), params);
        j.status = status;
        j
    }

    #[tokio::test]
    async fn subscribe_delivers_synthetic_event_first() {
        let hub = ProgressHub::new(32);
        let sub = hub.subscribe(&job(JobStatus::Pending));
        let event = sub.recv().await.unwrap();
        assert_eq!(event.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_is_noop() {
        let hub = ProgressHub::new(32);
        hub.publish("nonexistent", ProgressEvent::processing("nonexistent", 1, 10, "x", "y"));
    }

    #[tokio::test]
    async fn publish_assigns_monotonic_sequence() {
        let hub = ProgressHub::new(32);
        let sub = hub.subscribe(&job(JobStatus::Processing));
        let _synthetic = sub.recv().await.unwrap();

        hub.publish("job-1", ProgressEvent::processing("job-1", 0, 10, "a", "processing"));
        hub.publish("job-1", ProgressEvent::processing("job-1", 0, 20, "b", "processing"));

        let first = sub.recv().await.unwrap();
        let second = sub.recv().await.unwrap();
        assert!(second.seq > first.seq);
    }

    #[tokio::test]
    async fn full_queue_drops_oldest_not_newest() {
        let hub = ProgressHub::new(2);
        let sub = hub.subscribe(&job(JobStatus::Processing));
        let _synthetic = sub.recv().await.unwrap();

        for pct in [10u8, 20, 30] {
            hub.publish("job-1", ProgressEvent::processing("job-1", 0, pct, "m", "processing"));
        }

        let first = sub.recv().await.unwrap();
        let second = sub.recv().await.unwrap();
        assert_eq!(first.progress, Some(20));
        assert_eq!(second.progress, Some(30));
    }

    #[tokio::test]
    async fn terminal_publish_closes_subscription() {
        let hub = ProgressHub::new(32);
        let sub = hub.subscribe(&job(JobStatus::Processing));
        let _synthetic = sub.recv().await.unwrap();

        hub.publish("job-1", ProgressEvent::complete("job-1", 0, "blob://out", "out.mp4"));
        let terminal = sub.recv().await.unwrap();
        assert_eq!(terminal.status, JobStatus::Complete);
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn subscribing_to_terminal_job_does_not_register_for_future_events() {
        let hub = ProgressHub::new(32);
        let sub = hub.subscribe(&job(JobStatus::Complete));
        let synthetic = sub.recv().await.unwrap();
        assert_eq!(synthetic.status, JobStatus::Complete);
        assert!(sub.recv().await.is_none());
    }
}
