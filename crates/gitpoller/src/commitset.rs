// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 gitpoller contributors

//! Commit-Set Computer (spec §4.H) — the state machine at the heart of the
//! poller: given previous and current tips across all polled branches,
//! enumerates commits newly reachable since the last poll.

use std::path::Path;

use crate::command::{CommandRequest, CommandRunner};

/// Outcome of computing the commit set for a single branch, modeled as an
/// enum so the orchestrator's cursor-update policy (spec §4.H) reads as a
/// match rather than nested booleans (SPEC_FULL.md §D.7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitSetOutcome {
    /// Branch not previously in the cursor: no changes emitted, cursor set
    /// to `new`.
    Initial { new: String },
    /// `new == old` and nothing changed.
    UpToDate,
    /// Commits newly reachable from `new`, in emission (git-log) order.
    NewCommits { new: String, shas: Vec<String> },
    /// `new != old` but `git log` found nothing reachable (fast-forward of
    /// an unrelated ref, or a force-push landing on an already-known
    /// ancestor). Cursor advances regardless of `buildPushesWithNoCommits`;
    /// the orchestrator decides whether to synthesize a change.
    FastForwardNoCommits { new: String },
    /// `git log` itself failed. Per spec §4.H / §9 this is an intentionally
    /// preserved quirk: the cursor still advances to `new` to avoid
    /// re-attempting the same broken range forever.
    LogFailed { new: String },
}

/// Computes the commit set for one branch.
///
/// `old` is `cursor[branch_key]` before this poll, if present. `excludes` is
/// every *other* sha currently in the previous cursor (deduplicated, sorted,
/// excluding `new` itself) — spec §4.H / §9: "the exclude list ... is all
/// other-branch tips from the *previous* cursor, not the new one".
pub fn compute_new_commits(
    runner: &dyn CommandRunner,
    workdir: &Path,
    new: &str,
    old: Option<&str>,
    mut excludes: Vec<String>,
) -> CommitSetOutcome {
    let Some(old) = old else {
        return CommitSetOutcome::Initial {
            new: new.to_string(),
        };
    };

    if new == old {
        return CommitSetOutcome::UpToDate;
    }

    excludes.retain(|sha| sha != new);
    excludes.sort();
    excludes.dedup();

    let mut args = vec![
        "log".to_string(),
        "--ignore-missing".to_string(),
        "--format=%H".to_string(),
        new.to_string(),
    ];
    for sha in &excludes {
        args.push(format!("^{sha}"));
    }
    args.push("--".to_string());

    let request = CommandRequest {
        args,
        workdir: Some(workdir.to_path_buf()),
        env_overlay: Vec::new(),
    };

    let output = match runner.run(&request) {
        Ok(output) if output.success() => output,
        _ => {
            return CommitSetOutcome::LogFailed {
                new: new.to_string(),
            }
        }
    };

    let shas: Vec<String> = output
        .stdout_str_lossy()
        .lines()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect();

    if shas.is_empty() {
        CommitSetOutcome::FastForwardNoCommits {
            new: new.to_string(),
        }
    } else {
        CommitSetOutcome::NewCommits {
            new: new.to_string(),
            shas,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{MockCommandRunner, MockExpectation};
    use std::path::Path;

    #[test]
    fn initial_branch_emits_nothing() {
        let mock = MockCommandRunner::new(vec![]);
        let outcome = compute_new_commits(&mock, Path::new("wd"), "new-sha", None, vec![]);
        assert_eq!(
            outcome,
            CommitSetOutcome::Initial {
                new: "new-sha".to_string()
            }
        );
    }

    #[test]
    fn unchanged_tip_is_noop() {
        let mock = MockCommandRunner::new(vec![]);
        let outcome = compute_new_commits(&mock, Path::new("wd"), "sha", Some("sha"), vec![]);
        assert_eq!(outcome, CommitSetOutcome::UpToDate);
    }

    #[test]
    fn excludes_are_sorted_and_deduplicated() {
        let mock = MockCommandRunner::new(vec![MockExpectation::new(&[
            "log",
            "--ignore-missing",
            "--format=%H",
            "new",
            "^bbb",
            "^ccc",
            "--",
        ])
        .stdout(&b""[..])]);
        let outcome = compute_new_commits(
            &mock,
            Path::new("wd"),
            "new",
            Some("bbb"),
            vec!["ccc".to_string(), "bbb".to_string(), "bbb".to_string()],
        );
        mock.assert_all_commands_ran();
        assert_eq!(outcome, CommitSetOutcome::FastForwardNoCommits { new: "new".into() });
    }

    #[test]
    fn new_commits_preserve_log_order() {
        let mock = MockCommandRunner::new(vec![MockExpectation::new(&[
            "log",
            "--ignore-missing",
            "--format=%H",
            "4423cdbcbb89c14e50dd5f4152415afd686c5241",
            "^bf0b01df6d00ae8d1ffa0b2e2acbe642a6cd35d5",
            "^fa3ae8ed68e664d4db24798611b352e3c6509930",
            "--",
        ])
        .stdout(
            &b"64a5dc2a4e6a5a98b3e88a1228c85ea36fcbb282\n4423cdbcbb89c14e50dd5f4152415afd686c5241\n"
                [..],
        )]);
        let outcome = compute_new_commits(
            &mock,
            Path::new("wd"),
            "4423cdbcbb89c14e50dd5f4152415afd686c5241",
            Some("fa3ae8ed68e664d4db24798611b352e3c6509930"),
            vec![
                "bf0b01df6d00ae8d1ffa0b2e2acbe642a6cd35d5".to_string(),
                "fa3ae8ed68e664d4db24798611b352e3c6509930".to_string(),
            ],
        );
        assert_eq!(
            outcome,
            CommitSetOutcome::NewCommits {
                new: "4423cdbcbb89c14e50dd5f4152415afd686c5241".to_string(),
                shas: vec![
                    "64a5dc2a4e6a5a98b3e88a1228c85ea36fcbb282".to_string(),
                    "4423cdbcbb89c14e50dd5f4152415afd686c5241".to_string(),
                ],
            }
        );
    }

    #[test]
    fn log_failure_still_reports_new_tip() {
        let mock = MockCommandRunner::new(vec![MockExpectation::new(&[
            "log",
            "--ignore-missing",
            "--format=%H",
            "4423cdbcbb89c14e50dd5f4152415afd686c5241",
            "^fa3ae8ed68e664d4db24798611b352e3c6509930",
            "--",
        ])
        .exit(1)]);
        let outcome = compute_new_commits(
            &mock,
            Path::new("wd"),
            "4423cdbcbb89c14e50dd5f4152415afd686c5241",
            Some("fa3ae8ed68e664d4db24798611b352e3c6509930"),
            vec!["fa3ae8ed68e664d4db24798611b352e3c6509930".to_string()],
        );
        assert_eq!(
            outcome,
            CommitSetOutcome::LogFailed {
                new: "4423cdbcbb89c14e50dd5f4152415afd686c5241".to_string()
            }
        );
    }

    #[test]
    fn new_sha_excluded_from_its_own_exclude_list() {
        let mock = MockCommandRunner::new(vec![MockExpectation::new(&[
            "log",
            "--ignore-missing",
            "--format=%H",
            "sha1",
            "^sha0",
            "--",
        ])
        .stdout(&b""[..])]);
        let outcome = compute_new_commits(
            &mock,
            Path::new("wd"),
            "sha1",
            Some("sha0"),
            vec!["sha1".to_string(), "sha0".to_string()],
        );
        mock.assert_all_commands_ran();
        assert_eq!(
            outcome,
            CommitSetOutcome::FastForwardNoCommits { new: "sha1".into() }
        );
    }
}
