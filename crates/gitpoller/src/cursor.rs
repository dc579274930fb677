// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 gitpoller contributors

//! Cursor (`lastRev`) Manager (spec §4.K) plus the state-store trait
//! boundary (spec §6). The persistent key-value store itself is out of
//! scope; [`JsonFileStateStore`] is an ambient, file-backed implementation
//! usable standalone (no external database dependency), following the
//! teacher's preference for plain `serde`-backed file IO (`config.rs`).

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

/// Mapping from branch-key to last-observed tip sha (spec §3 "Cursor").
pub type Cursor = HashMap<String, String>;

const STATE_CLASS: &str = "GitPoller";
const LAST_REV_KEY: &str = "lastRev";

/// Persistent key-value store (spec §6). Keyed by `(name, class_name, key)`.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get_state(&self, name: &str, class_name: &str, key: &str) -> Result<Option<Value>>;
    async fn set_state(&self, name: &str, class_name: &str, key: &str, value: Value) -> Result<()>;
}

/// Loads the cursor for a poller instance at startup (spec §4.K).
/// Returns an empty map if absent.
pub async fn load_cursor(store: &dyn StateStore, name: &str) -> Result<Cursor> {
    let value = store.get_state(name, STATE_CLASS, LAST_REV_KEY).await?;
    match value {
        Some(value) => serde_json::from_value(value).context("parsing persisted lastRev"),
        None => Ok(Cursor::new()),
    }
}

/// Persists the full cursor (not per-branch deltas) after a poll. The
/// persisted map contains exactly the keys polled this cycle — callers must
/// pass the already-pruned cursor, not merge it with the previous one
/// (spec §4.K / §6: "Entries for branches no longer polled are replaced").
pub async fn save_cursor(store: &dyn StateStore, name: &str, cursor: &Cursor) -> Result<()> {
    let value = serde_json::to_value(cursor).context("serializing lastRev")?;
    store.set_state(name, STATE_CLASS, LAST_REV_KEY, value).await
}

/// Simple JSON-file-backed [`StateStore`]. One file holds every poller
/// instance's state, keyed by `name\u{0}class_name\u{0}key`. Not suitable
/// for concurrent multi-process access (spec §5 requires the real store to
/// support concurrent keyed access); this is the single-process ambient
/// default.
pub struct JsonFileStateStore {
    path: PathBuf,
    data: tokio::sync::Mutex<BTreeMap<String, Value>>,
}

impl JsonFileStateStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            data: tokio::sync::Mutex::new(data),
        })
    }

    fn compound_key(name: &str, class_name: &str, key: &str) -> String {
        format!("{name}\u{0}{class_name}\u{0}{key}")
    }

    async fn flush(&self, data: &BTreeMap<String, Value>) -> Result<()> {
        let contents = serde_json::to_string_pretty(data).context("serializing state store")?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        tokio::fs::write(&self.path, contents)
            .await
            .with_context(|| format!("writing {}", self.path.display()))
    }
}

#[async_trait]
impl StateStore for JsonFileStateStore {
    async fn get_state(&self, name: &str, class_name: &str, key: &str) -> Result<Option<Value>> {
        let data = self.data.lock().await;
        Ok(data.get(&Self::compound_key(name, class_name, key)).cloned())
    }

    async fn set_state(&self, name: &str, class_name: &str, key: &str, value: Value) -> Result<()> {
        let mut data = self.data.lock().await;
        data.insert(Self::compound_key(name, class_name, key), value);
        self.flush(&data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;
    use tempfile::tempdir;

    #[tokio::test]
    async fn load_cursor_is_empty_when_absent() {
        let dir = tempdir().unwrap();
        let store = JsonFileStateStore::open(dir.path().join("state.json"))
            .await
            .unwrap();
        let cursor = load_cursor(&store, "repo").await.unwrap();
        assert!(cursor.is_empty());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = JsonFileStateStore::open(&path).await.unwrap();

        let mut cursor = Cursor::new();
        cursor.insert("master".to_string(), "abc123".to_string());
        save_cursor(&store, "repo", &cursor).await.unwrap();

        let reopened = JsonFileStateStore::open(&path).await.unwrap();
        let loaded = load_cursor(&reopened, "repo").await.unwrap();
        assert_eq!(loaded, cursor);
    }

    #[tokio::test]
    async fn saving_replaces_rather_than_merges() {
        let dir = tempdir().unwrap();
        let store = JsonFileStateStore::open(dir.path().join("state.json"))
            .await
            .unwrap();

        let mut first: Cursor = StdHashMap::new();
        first.insert("master".to_string(), "aaa".to_string());
        save_cursor(&store, "repo", &first).await.unwrap();

        let mut second: Cursor = StdHashMap::new();
        second.insert("release".to_string(), "bbb".to_string());
        save_cursor(&store, "repo", &second).await.unwrap();

        let loaded = load_cursor(&store, "repo").await.unwrap();
        assert_eq!(loaded, second, "stale 'master' key must not survive");
    }

    #[tokio::test]
    async fn distinct_repo_names_do_not_collide() {
        let dir = tempdir().unwrap();
        let store = JsonFileStateStore::open(dir.path().join("state.json"))
            .await
            .unwrap();

        let mut cursor_a: Cursor = StdHashMap::new();
        cursor_a.insert("master".to_string(), "aaa".to_string());
        save_cursor(&store, "repo-a", &cursor_a).await.unwrap();

        let mut cursor_b: Cursor = StdHashMap::new();
        cursor_b.insert("master".to_string(), "bbb".to_string());
        save_cursor(&store, "repo-b", &cursor_b).await.unwrap();

        assert_eq!(load_cursor(&store, "repo-a").await.unwrap(), cursor_a);
        assert_eq!(load_cursor(&store, "repo-b").await.unwrap(), cursor_b);
    }
}
