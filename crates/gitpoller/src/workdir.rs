// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 gitpoller contributors

//! Fetcher and Revision Resolver (spec §4.F/§4.G), plus the per-poll bare
//! mirror initialization step documented in SPEC_FULL.md §C.1.

use std::path::{Path, PathBuf};

use crate::command::{CommandRequest, CommandRunner};
use crate::credentials::SshDecoration;
use crate::error::PollerError;
use crate::urlquote::url_quote;

/// The poller's exclusive bare-mirror directory (spec §3 "Workdir").
pub struct Workdir {
    path: PathBuf,
}

impl Workdir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `git init --bare <workdir>`. Safe to call every poll: initializing an
    /// already-bare repo is a no-op in real git, and the orchestrator relies
    /// on exactly that instead of special-casing "already initialized"
    /// (SPEC_FULL.md §C.1).
    pub fn ensure_initialized(&self, runner: &dyn CommandRunner) -> Result<(), PollerError> {
        let request = CommandRequest::new(&[
            "init",
            "--bare",
            &self.path.to_string_lossy(),
        ]);
        let output = runner
            .run(&request)
            .map_err(|e| PollerError::environment(format!("could not run git init: {e}")))?;
        if !output.success() {
            return Err(PollerError::environment(format!(
                "git init --bare {} failed (exit {:?}): {}",
                self.path.display(),
                output.status,
                output.stderr_str_lossy().trim()
            )));
        }
        Ok(())
    }

    /// The namespaced local ref a remote selector maps to:
    /// `refs/buildbot/<url-quoted>/<selector>` (spec §4.F / GLOSSARY).
    pub fn local_ref(repourl: &str, selector: &str) -> String {
        format!("refs/buildbot/{}/{selector}", url_quote(repourl))
    }

    /// `git fetch --progress <repourl> +<src>:<dst> ...` for every selected
    /// ref, decorated with SSH credentials when configured. A single
    /// invocation carries all selected refspecs (spec §4.F).
    pub fn fetch_refs(
        &self,
        runner: &dyn CommandRunner,
        repourl: &str,
        selectors: &[&str],
        decoration: &SshDecoration,
    ) -> Result<(), PollerError> {
        if selectors.is_empty() {
            return Ok(());
        }
        let mut args: Vec<String> = vec!["fetch".to_string(), "--progress".to_string(), repourl.to_string()];
        for selector in selectors {
            args.push(format!("+{selector}:{}", Self::local_ref(repourl, selector)));
        }
        let request = CommandRequest {
            args,
            workdir: Some(self.path.clone()),
            env_overlay: Vec::new(),
        }
        .prefixed(&decoration.args_prefix);
        let request = decoration
            .env_overlay
            .iter()
            .fold(request, |req, (k, v)| req.with_env(k, v));

        let output = runner
            .run(&request)
            .map_err(|e| PollerError::environment(format!("could not run git fetch: {e}")))?;
        if !output.success() {
            return Err(PollerError::environment(format!(
                "git fetch {repourl} failed (exit {:?}): {}",
                output.status,
                output.stderr_str_lossy().trim()
            )));
        }
        Ok(())
    }

    /// `git rev-parse <local_ref>`. A non-zero exit is a per-branch *soft*
    /// failure (spec §4.G) — the caller logs and skips this branch rather
    /// than aborting the poll.
    pub fn rev_parse(&self, runner: &dyn CommandRunner, local_ref: &str) -> Option<String> {
        let request = CommandRequest::new(&["rev-parse", local_ref]).with_workdir(&self.path);
        let output = runner.run(&request).ok()?;
        if !output.success() {
            return None;
        }
        Some(output.stdout_trimmed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{MockCommandRunner, MockExpectation};

    #[test]
    fn local_ref_uses_quoted_url() {
        assert_eq!(
            Workdir::local_ref("git@example.com:~foo/baz.git", "master"),
            "refs/buildbot/git%40example.com%3A%7Efoo%2Fbaz.git/master"
        );
    }

    #[test]
    fn ensure_initialized_runs_git_init_bare() {
        let workdir = Workdir::new("basedir/gitpoller-work");
        let mock = MockCommandRunner::new(vec![MockExpectation::new(&[
            "init",
            "--bare",
            "basedir/gitpoller-work",
        ])]);
        workdir.ensure_initialized(&mock).unwrap();
        mock.assert_all_commands_ran();
    }

    #[test]
    fn ensure_initialized_fails_hard_on_nonzero() {
        let workdir = Workdir::new("basedir/gitpoller-work");
        let mock = MockCommandRunner::new(vec![MockExpectation::new(&[
            "init",
            "--bare",
            "basedir/gitpoller-work",
        ])
        .exit(1)]);
        let err = workdir.ensure_initialized(&mock).unwrap_err();
        assert!(matches!(err, PollerError::Environment(_)));
    }

    #[test]
    fn fetch_refs_builds_refspec_per_selector() {
        let workdir = Workdir::new("basedir/gitpoller-work");
        let mock = MockCommandRunner::new(vec![MockExpectation::new(&[
            "fetch",
            "--progress",
            "git@example.com:~foo/baz.git",
            "+master:refs/buildbot/git%40example.com%3A%7Efoo%2Fbaz.git/master",
        ])
        .workdir(Path::new("basedir/gitpoller-work"))]);
        workdir
            .fetch_refs(
                &mock,
                "git@example.com:~foo/baz.git",
                &["master"],
                &SshDecoration::default(),
            )
            .unwrap();
        mock.assert_all_commands_ran();
    }

    #[test]
    fn rev_parse_returns_none_on_failure() {
        let workdir = Workdir::new("basedir/gitpoller-work");
        let mock = MockCommandRunner::new(vec![MockExpectation::new(&[
            "rev-parse",
            "refs/buildbot/url/master",
        ])
        .exit(1)]);
        assert_eq!(workdir.rev_parse(&mock, "refs/buildbot/url/master"), None);
    }

    #[test]
    fn rev_parse_trims_output() {
        let workdir = Workdir::new("basedir/gitpoller-work");
        let mock = MockCommandRunner::new(vec![MockExpectation::new(&[
            "rev-parse",
            "refs/buildbot/url/master",
        ])
        .stdout(&b"bf0b01df6d00ae8d1ffa0b2e2acbe642a6cd35d5\n"[..])]);
        assert_eq!(
            workdir.rev_parse(&mock, "refs/buildbot/url/master"),
            Some("bf0b01df6d00ae8d1ffa0b2e2acbe642a6cd35d5".to_string())
        );
    }
}
