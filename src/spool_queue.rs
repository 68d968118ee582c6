// src/spool_queue.rs
// Directory-backed queue that other processes can feed.
//
// Layout under the spool directory:
//   ready/<name>.json                                  waiting to be received
//   inflight/<id>.<count>.<deadline_ms>.<token>.json   received, hidden until the deadline
//
// Producers drop a JSON body into `ready/` (write elsewhere, then rename).
// A trailing `.<digits>` before `.json` is read as the receive count, so
// producer file names should not end in a number.
use crate::queue::{MessageQueue, QueueError, QueueMessage, RECEIVE_COUNT_ATTRIBUTE};
use chrono::Utc;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use uuid::Uuid;

const SCAN_INTERVAL: Duration = Duration::from_millis(250);

pub struct SpoolQueue {
    ready: PathBuf,
    inflight: PathBuf,
    visibility_timeout: Duration,
}

struct InflightName {
    message_id: String,
    receive_count: u32,
    deadline_ms: i64,
}

fn parse_ready_name(name: &str) -> Option<(String, u32)> {
    let stem = name.strip_suffix(".json")?;
    match stem.rsplit_once('.') {
        Some((id, count)) if !id.is_empty() => match count.parse() {
            Ok(count) => Some((id.to_string(), count)),
            Err(_) => Some((stem.to_string(), 0)),
        },
        _ => Some((stem.to_string(), 0)),
    }
}

fn parse_inflight_name(name: &str) -> Option<InflightName> {
    let stem = name.strip_suffix(".json")?;
    let mut parts = stem.rsplitn(4, '.');
    let _token = parts.next()?;
    let deadline_ms = parts.next()?.parse().ok()?;
    let receive_count = parts.next()?.parse().ok()?;
    let message_id = parts.next()?.to_string();
    Some(InflightName {
        message_id,
        receive_count,
        deadline_ms,
    })
}

// Oldest first. Dotfiles and anything not ending in .json are in-progress writes.
async fn list_json(dir: &Path) -> Result<Vec<String>, QueueError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut found = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || !name.ends_with(".json") {
            continue;
        }
        let modified = entry.metadata().await.and_then(|m| m.modified()).ok();
        found.push((modified, name));
    }
    found.sort();
    Ok(found.into_iter().map(|(_, name)| name).collect())
}

impl SpoolQueue {
    pub fn new(dir: impl Into<PathBuf>, visibility_timeout: Duration) -> Result<Self, QueueError> {
        let dir = dir.into();
        let ready = dir.join("ready");
        let inflight = dir.join("inflight");
        std::fs::create_dir_all(&ready)?;
        std::fs::create_dir_all(&inflight)?;
        Ok(Self {
            ready,
            inflight,
            visibility_timeout,
        })
    }

    pub fn ready_dir(&self) -> &Path {
        &self.ready
    }

    /// Messages not yet deleted, waiting or in flight.
    pub fn len(&self) -> usize {
        let count = |dir: &Path| {
            std::fs::read_dir(dir)
                .map(|entries| {
                    entries
                        .filter_map(Result::ok)
                        .filter(|e| {
                            let name = e.file_name().to_string_lossy().into_owned();
                            !name.starts_with('.') && name.ends_with(".json")
                        })
                        .count()
                })
                .unwrap_or(0)
        };
        count(&self.ready) + count(&self.inflight)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Moves in-flight messages whose visibility deadline passed back to ready/
    async fn requeue_expired(&self) -> Result<(), QueueError> {
        let now = Utc::now().timestamp_millis();
        for name in list_json(&self.inflight).await? {
            let inflight = match parse_inflight_name(&name) {
                Some(parsed) if parsed.deadline_ms <= now => parsed,
                _ => continue,
            };
            let ready = format!("{}.{}.json", inflight.message_id, inflight.receive_count);
            match tokio::fs::rename(self.inflight.join(&name), self.ready.join(&ready)).await {
                Ok(()) => log::debug!("🔁 Message {} visible again", inflight.message_id),
                // Deleted or requeued by another consumer in the meantime
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn claim(&self, max_messages: usize) -> Result<Vec<QueueMessage>, QueueError> {
        let mut received = Vec::new();
        for name in list_json(&self.ready).await? {
            if received.len() >= max_messages {
                break;
            }
            let (message_id, count) = match parse_ready_name(&name) {
                Some(parsed) => parsed,
                None => continue,
            };
            let attempt = count.saturating_add(1);
            let deadline =
                Utc::now().timestamp_millis() + self.visibility_timeout.as_millis() as i64;
            let receipt = format!(
                "{}.{}.{}.{}.json",
                message_id,
                attempt,
                deadline,
                Uuid::new_v4().simple()
            );

            // The rename is the claim; a consumer that loses the race skips the file
            match tokio::fs::rename(self.ready.join(&name), self.inflight.join(&receipt)).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
            let bytes = tokio::fs::read(self.inflight.join(&receipt)).await?;

            let mut attributes = HashMap::new();
            attributes.insert(RECEIVE_COUNT_ATTRIBUTE.to_string(), attempt.to_string());
            received.push(QueueMessage {
                message_id,
                receipt_handle: receipt,
                body: String::from_utf8_lossy(&bytes).into_owned(),
                attributes,
            });
        }
        Ok(received)
    }
}

impl MessageQueue for SpoolQueue {
    fn receive(
        &self,
        max_messages: usize,
        wait: Duration,
    ) -> BoxFuture<'_, Result<Vec<QueueMessage>, QueueError>> {
        Box::pin(async move {
            let deadline = Instant::now() + wait;
            loop {
                self.requeue_expired().await?;
                let received = self.claim(max_messages.max(1)).await?;
                if !received.is_empty() {
                    return Ok(received);
                }
                let now = Instant::now();
                if now >= deadline {
                    return Ok(received);
                }
                tokio::time::sleep((deadline - now).min(SCAN_INTERVAL)).await;
            }
        })
    }

    fn delete<'a>(&'a self, receipt_handle: &'a str) -> BoxFuture<'a, Result<(), QueueError>> {
        Box::pin(async move {
            let unknown = || QueueError::UnknownReceipt(receipt_handle.to_string());
            if receipt_handle.contains('/')
                || receipt_handle.contains('\\')
                || parse_inflight_name(receipt_handle).is_none()
            {
                return Err(unknown());
            }
            match tokio::fs::remove_file(self.inflight.join(receipt_handle)).await {
                Ok(()) => Ok(()),
                // Already redelivered under a new receipt, or deleted
                Err(e) if e.kind() == ErrorKind::NotFound => Err(unknown()),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn send(&self, body: String) -> BoxFuture<'_, Result<String, QueueError>> {
        Box::pin(async move {
            let message_id = Uuid::new_v4().to_string();
            let tmp = self.ready.join(format!(".{}.tmp", message_id));
            tokio::fs::write(&tmp, body).await?;
            tokio::fs::rename(&tmp, self.ready.join(format!("{}.0.json", message_id))).await?;
            Ok(message_id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn spool(visibility: Duration) -> (SpoolQueue, PathBuf) {
        let dir = std::env::temp_dir().join(format!("cutline-spool-{}", Uuid::new_v4()));
        (SpoolQueue::new(&dir, visibility).unwrap(), dir)
    }

    #[test]
    fn test_name_parsing() {
        assert_eq!(parse_ready_name("abc.0.json"), Some(("abc".into(), 0)));
        assert_eq!(parse_ready_name("abc.3.json"), Some(("abc".into(), 3)));
        assert_eq!(parse_ready_name("export-job.json"), Some(("export-job".into(), 0)));
        assert_eq!(parse_ready_name("job.v2.json"), Some(("job.v2".into(), 0)));
        assert_eq!(parse_ready_name("notes.txt"), None);

        let parsed = parse_inflight_name("job.v2.1.1700000000000.abcdef.json").unwrap();
        assert_eq!(parsed.message_id, "job.v2");
        assert_eq!(parsed.receive_count, 1);
        assert_eq!(parsed.deadline_ms, 1_700_000_000_000);
        assert!(parse_inflight_name("garbage.json").is_none());
    }

    #[tokio::test]
    async fn test_receive_hides_then_redelivers() {
        let (queue, dir) = spool(Duration::from_millis(50));
        let id = queue.send(r#"{"taskType":"VIDEO_EXPORT"}"#.into()).await.unwrap();

        let first = queue.receive(5, Duration::ZERO).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].message_id, id);
        assert_eq!(first[0].delivery_attempt(), 1);
        assert!(queue.receive(5, Duration::ZERO).await.unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(80)).await;
        let second = queue.receive(5, Duration::ZERO).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].message_id, id);
        assert_eq!(second[0].delivery_attempt(), 2);

        assert!(matches!(
            queue.delete(&first[0].receipt_handle).await,
            Err(QueueError::UnknownReceipt(_))
        ));
        queue.delete(&second[0].receipt_handle).await.unwrap();
        assert!(queue.is_empty());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_picks_up_files_dropped_by_producers() {
        let (queue, dir) = spool(Duration::from_secs(30));
        // What an outside producer does: write aside, then rename into ready/
        let staged = dir.join("staged.tmp");
        std::fs::write(&staged, r#"{"taskType":"VIDEO_FILTER","videoId":"v1"}"#).unwrap();
        std::fs::rename(&staged, queue.ready_dir().join("filter-request.json")).unwrap();
        std::fs::write(queue.ready_dir().join(".half-written.json"), "{").unwrap();

        let received = queue.receive(5, Duration::from_millis(500)).await.unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].message_id, "filter-request");
        assert_eq!(received[0].delivery_attempt(), 1);
        assert!(received[0].body.contains("VIDEO_FILTER"));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_competing_receivers_never_share_a_message() {
        let (queue, dir) = spool(Duration::from_secs(30));
        let queue = Arc::new(queue);
        for i in 0..6 {
            queue.send(format!("m{}", i)).await.unwrap();
        }

        let receivers: Vec<_> = (0..3)
            .map(|_| {
                let queue = queue.clone();
                tokio::spawn(async move { queue.receive(6, Duration::ZERO).await.unwrap() })
            })
            .collect();
        let mut ids = Vec::new();
        for receiver in receivers {
            ids.extend(receiver.await.unwrap().into_iter().map(|m| m.message_id));
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 6);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_rejects_foreign_receipts() {
        let (queue, dir) = spool(Duration::from_secs(30));
        assert!(queue.delete("../ready/x.0.json").await.is_err());
        assert!(queue.delete("nonsense").await.is_err());
        let _ = std::fs::remove_dir_all(dir);
    }
}
