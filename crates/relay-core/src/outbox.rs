use crate::util::now_rfc3339;
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub to: String,
    pub text: String,
    pub sent_at: String,
}

impl Delivery {
    pub fn now(to: &str, text: &str) -> Self {
        Self {
            to: to.to_string(),
            text: text.to_string(),
            sent_at: now_rfc3339(),
        }
    }
}

/// Hands a message to whatever actually delivers it.
#[async_trait]
pub trait Outbox: Send + Sync {
    async fn deliver(&self, to: &str, text: &str) -> anyhow::Result<()>;
}

/// Dry run: every delivery becomes a log line.
#[derive(Debug, Default)]
pub struct LogOutbox;

#[async_trait]
impl Outbox for LogOutbox {
    async fn deliver(&self, to: &str, text: &str) -> anyhow::Result<()> {
        info!(%to, len = text.len(), "message delivered (dry run)");
        Ok(())
    }
}

/// Appends deliveries to a JSON-lines file.
#[derive(Debug)]
pub struct JournalOutbox {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JournalOutbox {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl Outbox for JournalOutbox {
    async fn deliver(&self, to: &str, text: &str) -> anyhow::Result<()> {
        let mut line = serde_json::to_string(&Delivery::now(to, text))?;
        line.push('\n');
        let _guard = self.lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .context("open journal")?;
        file.write_all(line.as_bytes()).await.context("write journal")?;
        file.flush().await.context("flush journal")?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct InMemoryOutbox {
    max: usize,
    items: Mutex<VecDeque<Delivery>>,
}

impl InMemoryOutbox {
    pub fn new(max: usize) -> Self {
        Self {
            max,
            items: Mutex::new(VecDeque::new()),
        }
    }

    pub async fn list(&self) -> Vec<Delivery> {
        let items = self.items.lock().await;
        items.iter().cloned().collect()
    }
}

#[async_trait]
impl Outbox for InMemoryOutbox {
    async fn deliver(&self, to: &str, text: &str) -> anyhow::Result<()> {
        let mut items = self.items.lock().await;
        items.push_back(Delivery::now(to, text));
        while items.len() > self.max {
            items.pop_front();
        }
        Ok(())
    }
}
