#[cfg(test)]
mod tests {
    use cutline_lib::admission::AdmissionLock;
    use cutline_lib::consumer::{ConsumerConfig, QueueConsumer};
    use cutline_lib::envelope::{JobEnvelope, TaskType};
    use cutline_lib::queue::{InMemoryQueue, MessageQueue};
    use cutline_lib::spool_queue::SpoolQueue;
    use cutline_lib::task_router::{HandlerError, TaskHandler, TaskRouter};
    use futures::future::BoxFuture;
    use serde_json::{json, Map};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    // Stands in for a heavy export: tracks how many run at once
    struct CriticalSection {
        inside: AtomicUsize,
        peak: AtomicUsize,
        finished: AtomicUsize,
    }

    impl TaskHandler for CriticalSection {
        fn handle<'a>(&'a self, _: &'a JobEnvelope) -> BoxFuture<'a, Result<(), HandlerError>> {
            Box::pin(async move {
                let now = self.inside.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                self.inside.fetch_sub(1, Ordering::SeqCst);
                self.finished.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }
    }

    fn export_body(project_id: &str) -> String {
        let mut payload = Map::new();
        payload.insert("projectId".into(), json!(project_id));
        JobEnvelope::new(TaskType::VideoExport, payload).to_body()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_two_exports_never_overlap() {
        let queue = Arc::new(InMemoryQueue::new(Duration::from_secs(30)));
        queue.send(export_body("p1")).await.unwrap();
        queue.send(export_body("p2")).await.unwrap();

        let handler = Arc::new(CriticalSection {
            inside: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        });
        let mut router = TaskRouter::new();
        router.register(TaskType::VideoExport, handler.clone());
        let router = Arc::new(router);

        // Shared lock, two consumers each taking one message per poll
        let lock = Arc::new(AdmissionLock::new(Duration::from_secs(5)));
        let config = ConsumerConfig {
            max_messages: 1,
            wait_time: Duration::ZERO,
            poll_interval: Duration::from_millis(10),
            max_retries: 3,
        };
        let consumers: Vec<Arc<QueueConsumer>> = (0..2)
            .map(|_| {
                Arc::new(QueueConsumer::new(
                    queue.clone(),
                    router.clone(),
                    lock.clone(),
                    config.clone(),
                ))
            })
            .collect();

        let polls: Vec<_> = consumers
            .iter()
            .map(|c| {
                let c = c.clone();
                tokio::spawn(async move { c.poll_once().await.unwrap() })
            })
            .collect();

        let mut completed = 0;
        for poll in polls {
            completed += poll.await.unwrap().completed;
        }

        assert_eq!(completed, 2);
        assert_eq!(handler.finished.load(Ordering::SeqCst), 2);
        assert_eq!(handler.peak.load(Ordering::SeqCst), 1);
        assert!(queue.is_empty());
        assert!(lock.is_available());
    }

    #[tokio::test]
    async fn test_job_file_from_another_process_is_consumed() {
        let dir = std::env::temp_dir().join(format!("cutline-jobs-{}", uuid::Uuid::new_v4()));
        let queue = Arc::new(SpoolQueue::new(&dir, Duration::from_secs(30)).unwrap());
        std::fs::write(queue.ready_dir().join("export-p9.json"), export_body("p9")).unwrap();

        let handler = Arc::new(CriticalSection {
            inside: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        });
        let mut router = TaskRouter::new();
        router.register(TaskType::VideoExport, handler.clone());
        let consumer = QueueConsumer::new(
            queue.clone(),
            Arc::new(router),
            Arc::new(AdmissionLock::new(Duration::from_secs(5))),
            ConsumerConfig {
                max_messages: 5,
                wait_time: Duration::ZERO,
                poll_interval: Duration::from_millis(10),
                max_retries: 3,
            },
        );

        let report = consumer.poll_once().await.unwrap();
        assert_eq!(report.completed, 1);
        assert_eq!(handler.finished.load(Ordering::SeqCst), 1);
        assert!(queue.is_empty());

        let _ = std::fs::remove_dir_all(dir);
    }
}
