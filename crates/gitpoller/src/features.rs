// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 gitpoller contributors

//! Feature Probe (spec §4.B) — parses `git --version` once per poller
//! lifetime and derives how SSH credentials must be threaded.

use crate::command::{CommandRequest, CommandRunner};
use crate::error::PollerError;

/// A parsed `git --version` output, e.g. `git version 2.39.2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct GitVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl GitVersion {
    const SSH_VIA_CONFIG_MIN: GitVersion = GitVersion {
        major: 2,
        minor: 10,
        patch: 0,
    };
    const SSH_VIA_ENV_MIN: GitVersion = GitVersion {
        major: 2,
        minor: 3,
        patch: 0,
    };

    fn parse(version_output: &str) -> Option<GitVersion> {
        let rest = version_output.trim().strip_prefix("git version ")?;
        // Some builds append a platform suffix ("2.39.2 (Apple Git-143)");
        // only the leading dotted-numeric prefix is meaningful here.
        let numeric_part = rest.split_whitespace().next()?;
        let mut parts = numeric_part.split('.');
        let major: u32 = parts.next()?.parse().ok()?;
        let minor: u32 = parts.next()?.parse().ok()?;
        let patch: u32 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        Some(GitVersion {
            major,
            minor,
            patch,
        })
    }
}

/// Derived SSH-threading capability for the probed git binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureSet {
    pub ssh_via_config: bool,
    pub ssh_via_env: bool,
}

impl FeatureSet {
    fn from_version(version: GitVersion) -> Self {
        FeatureSet {
            ssh_via_config: version >= GitVersion::SSH_VIA_CONFIG_MIN,
            ssh_via_env: version >= GitVersion::SSH_VIA_ENV_MIN,
        }
    }
}

/// Runs `git --version` and derives the [`FeatureSet`]. Fails with
/// [`PollerError::Environment`] when git is not installed or the version
/// output cannot be parsed.
pub fn probe_git_features(runner: &dyn CommandRunner) -> Result<FeatureSet, PollerError> {
    let request = CommandRequest::new(&["--version"]);
    let output = runner
        .run(&request)
        .map_err(|e| PollerError::environment(format!("could not run git --version: {e}")))?;

    if !output.success() {
        return Err(PollerError::environment(
            "git --version exited non-zero; is git installed?",
        ));
    }

    let text = output.stdout_str_lossy();
    let version = GitVersion::parse(&text).ok_or_else(|| {
        PollerError::environment(format!("unparseable `git --version` output: {text:?}"))
    })?;

    Ok(FeatureSet::from_version(version))
}

/// Validates that the probed feature set can actually carry the requested
/// SSH credentials; called when `sshPrivateKey`/`sshHostKey`/`sshKnownHosts`
/// are configured (spec §3 Feature Set / §8 scenario 6).
pub fn check_ssh_support(features: FeatureSet) -> Result<(), PollerError> {
    if features.ssh_via_config || features.ssh_via_env {
        Ok(())
    } else {
        Err(PollerError::environment(
            "git is too old to carry SSH private key credentials \
             (requires >= 2.3 for GIT_SSH_COMMAND, >= 2.10 for core.sshCommand)",
        ))
    }
}
