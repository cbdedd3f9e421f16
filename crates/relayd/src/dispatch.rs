use relay_core::protocol::{OperatorCmd, Reply};
use relay_core::contacts::read_contacts;
use relay_core::{Outbox, RateLimiter};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Routes console commands to the outbox, one limiter grant per message.
pub struct Dispatcher {
    limiter: Arc<RateLimiter>,
    outbox: Arc<dyn Outbox>,
    concurrency: usize,
}

impl Dispatcher {
    pub fn new(limiter: Arc<RateLimiter>, outbox: Arc<dyn Outbox>, concurrency: usize) -> Self {
        Self {
            limiter,
            outbox,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn handle(&self, cmd: OperatorCmd) -> Reply {
        match cmd {
            OperatorCmd::Send { to, text } => self.send(&to, &text).await,
            OperatorCmd::Bulk { path, text } => match read_contacts(Path::new(&path)).await {
                Ok(contacts) => {
                    let recipients = contacts.into_iter().map(|c| c.phone).collect();
                    self.bulk(recipients, &text).await
                }
                Err(err) => {
                    let reason = format!("{err:#}");
                    warn!(%path, %reason, "bulk file rejected");
                    Reply::Sys {
                        text: format!("cannot use {path}: {reason}"),
                    }
                }
            },
            OperatorCmd::Status => self.status().await,
            OperatorCmd::Quit => Reply::Sys { text: "bye".into() },
        }
    }

    pub async fn send(&self, to: &str, text: &str) -> Reply {
        self.limiter.acquire().await;
        match self.outbox.deliver(to, text).await {
            Ok(()) => {
                info!(%to, "message sent");
                Reply::Sent { to: to.to_string() }
            }
            Err(err) => {
                warn!(%to, %err, "delivery failed");
                Reply::Failed {
                    to: to.to_string(),
                    reason: err.to_string(),
                }
            }
        }
    }

    pub async fn bulk(&self, recipients: Vec<String>, text: &str) -> Reply {
        let total = recipients.len();
        info!(total, concurrency = self.concurrency, "bulk run started");

        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        for to in recipients {
            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };
            let limiter = self.limiter.clone();
            let outbox = self.outbox.clone();
            let text = text.to_string();
            tasks.spawn(async move {
                let _permit = permit;
                limiter.acquire().await;
                let res = outbox.deliver(&to, &text).await;
                (to, res)
            });
        }

        let mut sent = 0;
        let mut failed = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((to, Ok(()))) => {
                    debug!(%to, "bulk message sent");
                    sent += 1;
                }
                Ok((to, Err(err))) => {
                    warn!(%to, %err, "bulk delivery failed");
                    failed += 1;
                }
                Err(err) => {
                    error!(%err, "bulk send task aborted");
                    failed += 1;
                }
            }
        }
        info!(sent, failed, "bulk run finished");
        Reply::Done { sent, failed }
    }

    pub async fn status(&self) -> Reply {
        Reply::Status(self.limiter.status().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use relay_core::InMemoryOutbox;
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::time::Instant;

    struct RejectingOutbox {
        reject: &'static str,
        inner: InMemoryOutbox,
    }

    #[async_trait]
    impl Outbox for RejectingOutbox {
        async fn deliver(&self, to: &str, text: &str) -> anyhow::Result<()> {
            if to == self.reject {
                anyhow::bail!("recipient blocked");
            }
            self.inner.deliver(to, text).await
        }
    }

    fn dispatcher(per_second: u32, outbox: Arc<dyn Outbox>) -> Dispatcher {
        let limiter = Arc::new(RateLimiter::new(per_second, 100).unwrap());
        Dispatcher::new(limiter, outbox, 4)
    }

    #[tokio::test(start_paused = true)]
    async fn send_consumes_one_grant() {
        let outbox = Arc::new(InMemoryOutbox::new(10));
        let dispatcher = dispatcher(10, outbox.clone());

        let reply = dispatcher.send("+111", "hello").await;
        assert_eq!(reply, Reply::Sent { to: "+111".into() });
        assert_eq!(outbox.list().await.len(), 1);

        match dispatcher.status().await {
            Reply::Status(status) => {
                assert_eq!(status.second_count, 1);
                assert_eq!(status.minute_count, 1);
            }
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn send_reports_outbox_failure() {
        let outbox = Arc::new(RejectingOutbox {
            reject: "+999",
            inner: InMemoryOutbox::new(10),
        });
        let dispatcher = dispatcher(10, outbox);
        let reply = dispatcher.send("+999", "hello").await;
        assert_eq!(
            reply,
            Reply::Failed {
                to: "+999".into(),
                reason: "recipient blocked".into(),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn bulk_is_throttled_by_limiter() {
        let outbox = Arc::new(InMemoryOutbox::new(10));
        let dispatcher = dispatcher(2, outbox.clone());
        let recipients = (1..=5).map(|i| format!("+{i}")).collect::<Vec<_>>();

        let start = Instant::now();
        let reply = dispatcher.bulk(recipients, "promo").await;
        assert_eq!(reply, Reply::Done { sent: 5, failed: 0 });
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert_eq!(outbox.list().await.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn bulk_counts_failures() {
        let outbox = Arc::new(RejectingOutbox {
            reject: "+2",
            inner: InMemoryOutbox::new(10),
        });
        let dispatcher = dispatcher(10, outbox);
        let recipients = vec!["+1".to_string(), "+2".to_string(), "+3".to_string()];
        let reply = dispatcher.bulk(recipients, "promo").await;
        assert_eq!(reply, Reply::Done { sent: 2, failed: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn handle_bulk_sends_to_normalised_contacts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("contacts.csv");
        std::fs::write(
            &path,
            "phone,name\n14155552671,John\n+1 (415) 555-2672,Jane\nnot a number,Bob\n",
        )
        .unwrap();

        let outbox = Arc::new(InMemoryOutbox::new(10));
        let dispatcher = dispatcher(10, outbox.clone());
        let reply = dispatcher
            .handle(OperatorCmd::Bulk {
                path: path.display().to_string(),
                text: "hi".into(),
            })
            .await;
        assert_eq!(reply, Reply::Done { sent: 2, failed: 0 });

        let mut sent = outbox.list().await.into_iter().map(|d| d.to).collect::<Vec<_>>();
        sent.sort();
        assert_eq!(sent, vec!["+14155552671", "+14155552672"]);
    }

    #[tokio::test(start_paused = true)]
    async fn handle_bulk_reports_unusable_files() {
        let dir = tempdir().unwrap();
        let outbox = Arc::new(InMemoryOutbox::new(10));
        let dispatcher = dispatcher(10, outbox.clone());

        let reply = dispatcher
            .handle(OperatorCmd::Bulk {
                path: dir.path().join("missing.csv").display().to_string(),
                text: "hi".into(),
            })
            .await;
        assert!(matches!(reply, Reply::Sys { text } if text.contains("read contacts")));

        let path = dir.path().join("junk.csv");
        std::fs::write(&path, "phone\nhello\n").unwrap();
        let reply = dispatcher
            .handle(OperatorCmd::Bulk {
                path: path.display().to_string(),
                text: "hi".into(),
            })
            .await;
        assert!(matches!(reply, Reply::Sys { text } if text.ends_with("no valid contacts found")));

        assert!(outbox.list().await.is_empty());
        match dispatcher.status().await {
            Reply::Status(status) => assert_eq!(status.minute_count, 0),
            other => panic!("unexpected reply {other:?}"),
        }
    }
}
