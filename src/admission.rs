// src/admission.rs
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Process-wide single-permit gate for heavy jobs.
///
/// Waiters are admitted strictly in arrival order. One instance is shared
/// by every consumer in the process.
pub struct AdmissionLock {
    semaphore: Arc<Semaphore>,
    waiting: Arc<AtomicUsize>,
    timeout: Duration,
}

/// Held while a job runs. Dropping it returns the permit.
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
    task_type: String,
    task_id: String,
    admitted_at: Instant,
    waiting: Arc<AtomicUsize>,
}

// Keeps the waiting count honest when an acquire future is dropped mid-wait
struct WaitSlot(Arc<AtomicUsize>);

impl Drop for WaitSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AdmissionLock {
    pub fn new(timeout: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
            waiting: Arc::new(AtomicUsize::new(0)),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Callers currently blocked in `acquire`.
    pub fn queue_length(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    pub fn is_available(&self) -> bool {
        self.semaphore.available_permits() > 0
    }

    pub async fn acquire(&self, task_type: &str, task_id: &str) -> Option<AdmissionPermit> {
        self.acquire_within(task_type, task_id, self.timeout).await
    }

    /// Waits up to `timeout` for the permit. `None` means the wait timed out.
    pub async fn acquire_within(
        &self,
        task_type: &str,
        task_id: &str,
        timeout: Duration,
    ) -> Option<AdmissionPermit> {
        let ahead = self.queue_length() + usize::from(!self.is_available());
        if ahead > 0 {
            log::info!(
                "⏳ {} task {} waiting for processing lock ({} ahead)",
                task_type,
                task_id,
                ahead
            );
        }

        let acquired = {
            self.waiting.fetch_add(1, Ordering::SeqCst);
            let _slot = WaitSlot(self.waiting.clone());
            tokio::time::timeout(timeout, self.semaphore.clone().acquire_owned()).await
        };

        match acquired {
            Ok(Ok(permit)) => {
                log::info!("🔒 {} task {} acquired processing lock", task_type, task_id);
                Some(AdmissionPermit {
                    _permit: permit,
                    task_type: task_type.to_string(),
                    task_id: task_id.to_string(),
                    admitted_at: Instant::now(),
                    waiting: self.waiting.clone(),
                })
            }
            Ok(Err(_)) => {
                log::error!("❌ Processing lock closed while {} task {} waited", task_type, task_id);
                None
            }
            Err(_) => {
                log::warn!(
                    "⌛ {} task {} timed out after {:?} waiting for processing lock",
                    task_type,
                    task_id,
                    timeout
                );
                None
            }
        }
    }

    /// Returns the permit. Equivalent to dropping it.
    pub fn release(&self, permit: AdmissionPermit) {
        drop(permit);
    }
}

impl AdmissionPermit {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        log::info!(
            "🔓 {} task {} released processing lock after {:?} ({} waiting)",
            self.task_type,
            self.task_id,
            self.admitted_at.elapsed(),
            self.waiting.load(Ordering::SeqCst)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_one_admitted_at_a_time() {
        let lock = Arc::new(AdmissionLock::new(Duration::from_secs(5)));
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for i in 0..10 {
            let (lock, inside, peak) = (lock.clone(), inside.clone(), peak.clone());
            tasks.push(tokio::spawn(async move {
                let permit = lock.acquire("TEST", &i.to_string()).await.unwrap();
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
                lock.release(permit);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert!(lock.is_available());
        assert_eq!(lock.queue_length(), 0);
    }

    #[tokio::test]
    async fn test_waiters_admitted_in_arrival_order() {
        let lock = Arc::new(AdmissionLock::new(Duration::from_secs(5)));
        let order = Arc::new(Mutex::new(Vec::new()));

        let holder = lock.acquire("TEST", "holder").await.unwrap();
        let mut tasks = Vec::new();
        for i in 0..5 {
            let (waiter, order) = (lock.clone(), order.clone());
            tasks.push(tokio::spawn(async move {
                let permit = waiter.acquire("TEST", &i.to_string()).await.unwrap();
                order.lock().unwrap().push(i);
                drop(permit);
            }));
            // Let each waiter enqueue before the next one arrives
            while lock.queue_length() < i + 1 {
                tokio::task::yield_now().await;
            }
        }

        drop(holder);
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_acquire_times_out() {
        let lock = AdmissionLock::new(Duration::from_millis(20));
        let held = lock.acquire("TEST", "a").await.unwrap();
        assert!(!lock.is_available());

        assert!(lock.acquire("TEST", "b").await.is_none());
        assert_eq!(lock.queue_length(), 0);

        lock.release(held);
        assert!(lock.is_available());
        assert!(lock.acquire("TEST", "c").await.is_some());
    }
}
