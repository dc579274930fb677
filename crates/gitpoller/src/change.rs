// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 gitpoller contributors

//! Change Emitter (spec §4.J) — assembles the normalized [`ChangeRecord`]
//! and submits it to a [`ChangeSink`]. The "real" downstream ingest API is
//! out of scope (spec §1/§6); this module defines the trait boundary plus
//! two usable implementations.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::metadata::CommitMetadata;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 3;

/// An immutable normalized change record (spec §3).
#[derive(Debug, Clone, Serialize)]
pub struct ChangeRecord {
    pub author: String,
    pub committer: String,
    pub branch: String,
    pub category: String,
    pub codebase: Option<String>,
    pub comments: String,
    pub files: Vec<String>,
    pub project: Option<String>,
    pub properties: HashMap<String, String>,
    pub repository: String,
    pub revision: String,
    pub revlink: Option<String>,
    pub src: &'static str,
    pub when_timestamp: i64,
}

impl ChangeRecord {
    /// Builds a record from extracted commit metadata plus the poller's
    /// static configuration, leaving `category` as an empty placeholder a
    /// [`Category`] then fills in.
    pub fn from_metadata(
        metadata: &CommitMetadata,
        sha: &str,
        branch: &str,
        repository: &str,
        project: Option<&str>,
        codebase: Option<&str>,
        revlink: Option<&str>,
    ) -> Self {
        ChangeRecord {
            author: metadata.author.clone(),
            committer: metadata.committer.clone(),
            branch: branch.to_string(),
            category: String::new(),
            codebase: codebase.map(str::to_string),
            comments: metadata.comments.clone(),
            files: metadata.files.clone(),
            project: project.map(str::to_string),
            properties: HashMap::new(),
            repository: repository.to_string(),
            revision: sha.to_string(),
            revlink: revlink.map(str::to_string),
            src: "git",
            when_timestamp: metadata.when_timestamp,
        }
    }
}

/// A static category string or a predicate evaluated against the fully
/// populated record (spec §4.J / SPEC_FULL.md §C.6: the callable runs
/// *after* the rest of the record is populated and its result replaces the
/// placeholder).
#[derive(Clone)]
pub enum Category {
    Static(String),
    Callable(Arc<dyn Fn(&ChangeRecord) -> String + Send + Sync>),
}

impl Category {
    pub fn resolve(&self, record: &ChangeRecord) -> String {
        match self {
            Category::Static(value) => value.clone(),
            Category::Callable(f) => f(record),
        }
    }
}

impl Default for Category {
    fn default() -> Self {
        Category::Static(String::new())
    }
}

impl std::fmt::Debug for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Static(s) => f.debug_tuple("Static").field(s).finish(),
            Category::Callable(_) => write!(f, "Callable(..)"),
        }
    }
}

/// Downstream change-ingest API (spec §6). Accepts one record per call;
/// idempotency is the cursor's job, not the sink's.
#[async_trait]
pub trait ChangeSink: Send + Sync {
    async fn changes_added(&self, record: &ChangeRecord) -> Result<()>;
}

/// Logs each change at info level. The default sink for the CLI and for
/// anyone embedding the poller without a real ingest endpoint yet.
#[derive(Debug, Default)]
pub struct LoggingChangeSink;

#[async_trait]
impl ChangeSink for LoggingChangeSink {
    async fn changes_added(&self, record: &ChangeRecord) -> Result<()> {
        info!(
            branch = %record.branch,
            revision = %record.revision,
            author = %record.author,
            "new change"
        );
        Ok(())
    }
}

/// Posts each record as JSON to a configured URL. Retries on network errors
/// and 5xx responses with exponential backoff, gives up immediately on 4xx —
/// the same retry shape as `gerrit.rs::GerritClient::get`, since submitting a
/// change to a downstream service and not letting a transient network blip
/// corrupt the cursor is exactly that problem.
pub struct WebhookChangeSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookChangeSink {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .user_agent(format!("gitpoller/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building webhook HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn post_once(&self, record: &ChangeRecord) -> std::result::Result<(), String> {
        let resp = self
            .client
            .post(&self.url)
            .json(record)
            .send()
            .await
            .map_err(|e| format!("network error: {e}"))?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else if status.is_server_error() {
            Err(format!("server error: HTTP {status}"))
        } else {
            Err(format!("rejected: HTTP {status}"))
        }
    }

    fn is_retryable(err: &str) -> bool {
        err.starts_with("network error") || err.starts_with("server error")
    }
}

#[async_trait]
impl ChangeSink for WebhookChangeSink {
    async fn changes_added(&self, record: &ChangeRecord) -> Result<()> {
        let mut last_err = None;
        for attempt in 0..=MAX_RETRIES {
            match self.post_once(record).await {
                Ok(()) => return Ok(()),
                Err(e) if Self::is_retryable(&e) && attempt < MAX_RETRIES => {
                    let delay = Duration::from_secs(1 << attempt);
                    warn!(
                        revision = %record.revision,
                        attempt = attempt + 1,
                        total = MAX_RETRIES + 1,
                        "webhook post failed: {e}, retrying in {}s",
                        delay.as_secs()
                    );
                    tokio::time::sleep(delay).await;
                    last_err = Some(e);
                }
                Err(e) => {
                    anyhow::bail!("webhook post for {} failed: {e}", record.revision);
                }
            }
        }
        anyhow::bail!(
            "webhook post for {} failed (exhausted retries): {}",
            record.revision,
            last_err.unwrap_or_default()
        );
    }
}
