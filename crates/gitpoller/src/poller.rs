// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 gitpoller contributors

//! Orchestrator (spec §4.L) — wires every other component into the single
//! `poll()` pipeline described in spec §5/§7, and owns the feature-probe
//! cache, the running flag, and the cursor snapshot/replace discipline.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{error, info};

use crate::branches::{resolve as resolve_branches, PolledRef};
use crate::change::{ChangeRecord, ChangeSink};
use crate::command::CommandRunner;
use crate::commitset::{compute_new_commits, CommitSetOutcome};
use crate::config::GitPollerConfig;
use crate::credentials::{self, CredentialScratch, SshDecoration};
use crate::cursor::{load_cursor, save_cursor, Cursor, StateStore};
use crate::error::PollerError;
use crate::features::{check_ssh_support, probe_git_features, FeatureSet};
use crate::metadata::extract_commit_metadata;
use crate::remote::ls_remote;
use crate::workdir::Workdir;

/// A single polled repository instance. Holds no git state itself beyond the
/// cached feature probe; the cursor lives in the [`StateStore`] and the
/// mirror lives on disk at `config.workdir`.
pub struct GitPoller {
    config: GitPollerConfig,
    runner: Arc<dyn CommandRunner>,
    sink: Arc<dyn ChangeSink>,
    store: Arc<dyn StateStore>,
    workdir: Workdir,
    features: OnceCell<FeatureSet>,
    running: AtomicBool,
}

impl GitPoller {
    pub fn new(
        config: GitPollerConfig,
        runner: Arc<dyn CommandRunner>,
        sink: Arc<dyn ChangeSink>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        let workdir = Workdir::new(config.workdir.clone());
        Self {
            config,
            runner,
            sink,
            store,
            workdir,
            features: OnceCell::new(),
            running: AtomicBool::new(true),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        self.config.poll_interval
    }

    /// Stops this instance from mutating state on its next poll while still
    /// running the feature probe and `ls-remote` for their side effects
    /// (SPEC_FULL.md §C.5).
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    async fn features(&self) -> Result<FeatureSet, PollerError> {
        let runner = self.runner.clone();
        self.features
            .get_or_try_init(|| async move { run_sync(move || probe_git_features(runner.as_ref())).await })
            .await
            .map(|f| *f)
    }

    fn ssh_decoration(&self, features: FeatureSet) -> Result<Option<CredentialScratch>, PollerError> {
        match &self.config.ssh_material {
            None => Ok(None),
            Some(material) => {
                check_ssh_support(features)?;
                let scratch = credentials::materialize(self.workdir.path(), material, features)
                    .map_err(|e| PollerError::environment(format!("materializing SSH credentials: {e}")))?;
                Ok(Some(scratch))
            }
        }
    }

    /// Runs one polling cycle (spec §5 "Polling cycle"). Cheap to call
    /// repeatedly; the caller owns the interval timer (spec §6 non-goal:
    /// scheduling is out of scope). `init` and `ls-remote` run unconditionally,
    /// in that order, even when the poller is gated off (SPEC_FULL.md §C.1/§C.5);
    /// only fetch/rev-parse/log and the cursor are skipped while not running.
    pub async fn poll(&self) -> Result<(), PollerError> {
        let features = self.features().await?;

        {
            let runner = self.runner.clone();
            let workdir = Workdir::new(self.workdir.path().to_path_buf());
            run_sync(move || workdir.ensure_initialized(runner.as_ref())).await?;
        }

        let decoration_for_ls_remote = self.ssh_decoration(features)?;
        let decoration = decoration_for_ls_remote
            .as_ref()
            .map(|s| s.decoration.clone())
            .unwrap_or_default();
        let remote_refs = {
            let runner = self.runner.clone();
            let repourl = self.config.repourl.clone();
            run_sync(move || ls_remote(runner.as_ref(), &repourl, &decoration)).await?
        };
        drop(decoration_for_ls_remote);

        if !self.running.load(Ordering::SeqCst) {
            info!(repo = %self.config.name, "poller not running, skipping poll after probe");
            return Ok(());
        }

        let polled_refs = resolve_branches(&self.config.policy, &remote_refs);
        let selectors: Vec<String> = polled_refs.iter().map(|r| r.selector.clone()).collect();

        let decoration_for_fetch = self.ssh_decoration(features)?;
        let decoration = decoration_for_fetch
            .as_ref()
            .map(|s| s.decoration.clone())
            .unwrap_or_default();
        {
            let runner = self.runner.clone();
            let workdir = Workdir::new(self.workdir.path().to_path_buf());
            let repourl = self.config.repourl.clone();
            run_sync(move || {
                let refs: Vec<&str> = selectors.iter().map(String::as_str).collect();
                workdir.fetch_refs(runner.as_ref(), &repourl, &refs, &decoration)
            })
            .await?;
        }
        drop(decoration_for_fetch);

        let previous_cursor = load_cursor(self.store.as_ref(), &self.config.name)
            .await
            .map_err(|e| PollerError::environment(format!("loading cursor: {e}")))?;
        // Mutated in place as each branch is processed, so a branch's excludes
        // reflect *already-processed* branches' new tips rather than their
        // stale pre-poll values (DESIGN.md "Open Question decisions": the
        // original `test_poll_multipleBranches` fixture and spec §8 scenario 2
        // both exclude a preceding branch's new tip, not its old one).
        let mut working_cursor: Cursor = previous_cursor.clone();
        let mut new_cursor: Cursor = HashMap::new();

        for polled in &polled_refs {
            self.poll_one_branch(polled, &mut working_cursor, &mut new_cursor)
                .await?;
        }

        save_cursor(self.store.as_ref(), &self.config.name, &new_cursor)
            .await
            .map_err(|e| PollerError::environment(format!("saving cursor: {e}")))?;

        Ok(())
    }

    async fn poll_one_branch(
        &self,
        polled: &PolledRef,
        working_cursor: &mut Cursor,
        new_cursor: &mut Cursor,
    ) -> Result<(), PollerError> {
        let local_ref = Workdir::local_ref(&self.config.repourl, &polled.selector);
        let old = working_cursor.get(&polled.branch_key).cloned();

        let new = {
            let runner = self.runner.clone();
            let workdir = Workdir::new(self.workdir.path().to_path_buf());
            run_sync(move || workdir.rev_parse(runner.as_ref(), &local_ref)).await
        };
        let Some(new) = new else {
            error!(branch = %polled.branch_key, "rev-parse failed, skipping branch this poll");
            if let Some(old) = old {
                new_cursor.insert(polled.branch_key.clone(), old);
            }
            return Ok(());
        };

        // `working_cursor` still holds this branch's own old tip (not yet
        // overwritten) alongside every other branch's most recently known
        // tip — new if already processed this poll, old otherwise.
        let excludes: Vec<String> = working_cursor.values().cloned().collect();
        let old_for_match = old.clone();
        let outcome = {
            let runner = self.runner.clone();
            let workdir = self.workdir.path().to_path_buf();
            let new = new.clone();
            run_sync(move || compute_new_commits(runner.as_ref(), &workdir, &new, old.as_deref(), excludes))
                .await
        };

        match outcome {
            CommitSetOutcome::Initial { new } => {
                new_cursor.insert(polled.branch_key.clone(), new.clone());
                working_cursor.insert(polled.branch_key.clone(), new);
            }
            CommitSetOutcome::UpToDate => {
                new_cursor.insert(polled.branch_key.clone(), new.clone());
                working_cursor.insert(polled.branch_key.clone(), new);
            }
            CommitSetOutcome::NewCommits { new, shas } => {
                // `old` is guaranteed `Some` whenever `compute_new_commits` can
                // return `NewCommits` (it requires a prior tip to diff against).
                let previous_tip = old_for_match.expect("NewCommits implies a previous tip");
                match self.emit_all(polled, &shas).await {
                    Ok(()) => {
                        new_cursor.insert(polled.branch_key.clone(), new.clone());
                        working_cursor.insert(polled.branch_key.clone(), new);
                    }
                    Err(failed_at) => {
                        error!(
                            branch = %polled.branch_key,
                            sha = %failed_at,
                            "stopped emitting changes after failure, cursor held at previous tip"
                        );
                        new_cursor.insert(polled.branch_key.clone(), previous_tip.clone());
                        working_cursor.insert(polled.branch_key.clone(), previous_tip);
                    }
                }
            }
            CommitSetOutcome::FastForwardNoCommits { new } => {
                if self.config.build_pushes_with_no_commits {
                    self.emit_synthetic(polled, &new).await;
                }
                new_cursor.insert(polled.branch_key.clone(), new.clone());
                working_cursor.insert(polled.branch_key.clone(), new);
            }
            CommitSetOutcome::LogFailed { new } => {
                error!(branch = %polled.branch_key, "git log failed computing commit set, advancing cursor anyway");
                new_cursor.insert(polled.branch_key.clone(), new.clone());
                working_cursor.insert(polled.branch_key.clone(), new);
            }
        }

        Ok(())
    }

    /// Extracts metadata and submits a change for each sha, stopping at the
    /// first failure (spec §7: partial branch progress is never persisted as
    /// success). Returns `Err(sha)` naming the commit that failed.
    async fn emit_all(&self, polled: &PolledRef, shas: &[String]) -> Result<(), String> {
        for sha in shas {
            let metadata = {
                let runner = self.runner.clone();
                let workdir = self.workdir.path().to_path_buf();
                let sha = sha.clone();
                run_sync(move || extract_commit_metadata(runner.as_ref(), &workdir, &sha)).await
            };
            let metadata = match metadata {
                Ok(metadata) => metadata,
                Err(e) => {
                    error!(sha = %sha, error = %e, "metadata extraction failed");
                    return Err(sha.clone());
                }
            };

            let branch = short_branch_name(&polled.branch_key);
            let mut record = ChangeRecord::from_metadata(
                &metadata,
                sha,
                &branch,
                &self.config.repourl,
                self.config.project.as_deref(),
                self.config.codebase.as_deref(),
                None,
            );
            record.category = self.config.category.resolve(&record);

            if let Err(e) = self.sink.changes_added(&record).await {
                error!(sha = %sha, error = %e, "change sink rejected record");
                return Err(sha.clone());
            }
        }
        Ok(())
    }

    async fn emit_synthetic(&self, polled: &PolledRef, new: &str) {
        let metadata = {
            let runner = self.runner.clone();
            let workdir = self.workdir.path().to_path_buf();
            let new = new.to_string();
            run_sync(move || extract_commit_metadata(runner.as_ref(), &workdir, &new)).await
        };
        let metadata = match metadata {
            Ok(metadata) => metadata,
            Err(e) => {
                error!(sha = %new, error = %e, "metadata extraction failed for synthetic no-commit push");
                return;
            }
        };

        let branch = short_branch_name(&polled.branch_key);
        let mut record = ChangeRecord::from_metadata(
            &metadata,
            new,
            &branch,
            &self.config.repourl,
            self.config.project.as_deref(),
            self.config.codebase.as_deref(),
            None,
        );
        record.category = self.config.category.resolve(&record);

        if let Err(e) = self.sink.changes_added(&record).await {
            error!(sha = %new, error = %e, "change sink rejected synthetic no-commit record");
        }
    }
}

/// Strips a `refs/heads/` prefix for `ChangeRecord.branch` when the cursor
/// key is a full ref (`All`/`Predicate`/`OnlyTags` policies); explicit-list
/// keys are already short names. This mapping is not specified numerically
/// anywhere in the source material, so it is documented as a choice in the
/// grounding ledger rather than left implicit.
fn short_branch_name(branch_key: &str) -> String {
    branch_key
        .strip_prefix("refs/heads/")
        .map(str::to_string)
        .unwrap_or_else(|| branch_key.to_string())
}

/// Runs a blocking git-subprocess closure off the async executor thread
/// (SPEC_FULL.md §D.1: "the orchestrator is the only async component; it
/// wraps every synchronous git subprocess call in `spawn_blocking`").
async fn run_sync<F, T>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(value) => value,
        Err(e) => std::panic::resume_unwind(e.into_panic()),
    }
}
