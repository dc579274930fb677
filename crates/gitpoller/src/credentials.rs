// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 gitpoller contributors

//! Credential Materializer (spec §4.C) — writes SSH key material into a
//! private, scoped temp directory for the lifetime of a single git
//! invocation, and builds the decoration ([`SshDecoration`]) that threads
//! it into that invocation's args/env.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::features::FeatureSet;

/// Name of the scratch directory created under the poller's workdir. Kept
/// fixed (not randomized via `tempfile::tempdir`) so every invocation that
/// needs credentials uses the same, predictable, workdir-scoped location —
/// mirroring the original `.buildbot-ssh@@@` name, renamed for this crate.
const SCRATCH_DIR_NAME: &str = ".gitpoller-ssh@@@";

/// Optional SSH credential material for a poller instance (spec §3
/// "Credential Scratch"). At most one of `host_key`/`known_hosts` may be set.
#[derive(Debug, Clone)]
pub struct SshMaterial {
    pub private_key: String,
    pub host_key: Option<String>,
    pub known_hosts: Option<String>,
}

impl SshMaterial {
    pub fn new(private_key: impl Into<String>) -> Self {
        Self {
            private_key: private_key.into(),
            host_key: None,
            known_hosts: None,
        }
    }

    pub fn with_host_key(mut self, host_key: impl Into<String>) -> Self {
        self.host_key = Some(host_key.into());
        self
    }

    pub fn with_known_hosts(mut self, known_hosts: impl Into<String>) -> Self {
        self.known_hosts = Some(known_hosts.into());
        self
    }

    fn known_hosts_contents(&self) -> Option<String> {
        if let Some(ref host_key) = self.host_key {
            Some(format!("* {host_key}"))
        } else {
            self.known_hosts.clone()
        }
    }
}

/// Decoration to apply to a git invocation that needs to reach the remote.
#[derive(Debug, Clone, Default)]
pub struct SshDecoration {
    /// Prepended to the git argv, e.g. `["-c", "core.sshCommand=..."]`.
    pub args_prefix: Vec<String>,
    /// Added to the invocation's environment overlay.
    pub env_overlay: Vec<(String, String)>,
}

/// RAII guard over the per-invocation credential scratch directory. The
/// directory (and the key material within it) is removed when this guard is
/// dropped, success or failure — spec §4.C step 6 / invariant "the private
/// key never leaves the private temp dir and is removed by the time the
/// poll returns".
pub struct CredentialScratch {
    dir: PathBuf,
    pub decoration: SshDecoration,
}

impl Drop for CredentialScratch {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.dir);
    }
}

/// Writes `material` into a fresh scratch directory under `workdir` and
/// builds the decoration needed to use it, given the poller's probed
/// [`FeatureSet`]. Each git invocation that touches the remote calls this
/// once and drops the result once it completes (spec §4.C / §5 "two
/// invocations in the same poll each create and destroy their own").
pub fn materialize(
    workdir: &Path,
    material: &SshMaterial,
    features: FeatureSet,
) -> Result<CredentialScratch> {
    let dir = workdir.join(SCRATCH_DIR_NAME);
    if dir.exists() {
        fs::remove_dir_all(&dir).context("clearing stale credential scratch directory")?;
    }
    fs::create_dir_all(&dir).context("creating credential scratch directory")?;
    set_mode(&dir, 0o700)?;

    let key_path = dir.join("ssh-key");
    let mut key_contents = material.private_key.clone();
    if !key_contents.ends_with('\n') {
        key_contents.push('\n');
    }
    fs::write(&key_path, &key_contents).context("writing ssh-key")?;
    set_mode(&key_path, 0o400)?;

    let known_hosts_path = dir.join("ssh-known-hosts");
    let known_hosts_written = if let Some(contents) = material.known_hosts_contents() {
        fs::write(&known_hosts_path, contents).context("writing ssh-known-hosts")?;
        true
    } else {
        false
    };

    let mut ssh_cmd = format!("ssh -o \"BatchMode=yes\" -i \"{}\"", key_path.display());
    if known_hosts_written {
        ssh_cmd.push_str(&format!(
            " -o \"UserKnownHostsFile={}\"",
            known_hosts_path.display()
        ));
    }

    let decoration = if features.ssh_via_config {
        SshDecoration {
            args_prefix: vec!["-c".to_string(), format!("core.sshCommand={ssh_cmd}")],
            env_overlay: Vec::new(),
        }
    } else if features.ssh_via_env {
        SshDecoration {
            args_prefix: Vec::new(),
            env_overlay: vec![("GIT_SSH_COMMAND".to_string(), ssh_cmd)],
        }
    } else {
        // Caller is expected to have already rejected this configuration via
        // `features::check_ssh_support`; fall back to no decoration rather
        // than silently leaking credentials into an unsupported git.
        SshDecoration::default()
    };

    Ok(CredentialScratch { dir, decoration })
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .with_context(|| format!("setting permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config_features() -> FeatureSet {
        FeatureSet {
            ssh_via_config: true,
            ssh_via_env: true,
        }
    }

    #[test]
    fn writes_key_with_trailing_newline_and_mode() {
        let dir = tempdir().unwrap();
        let material = SshMaterial::new("ssh-key-contents");
        let scratch = materialize(dir.path(), &material, config_features()).unwrap();
        let key_path = dir.path().join(".gitpoller-ssh@@@").join("ssh-key");
        let contents = fs::read_to_string(&key_path).unwrap();
        assert_eq!(contents, "ssh-key-contents\n");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&key_path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o400);
        }
        assert!(scratch.decoration.args_prefix[0] == "-c");
    }

    #[test]
    fn prefers_core_ssh_command_when_supported() {
        let dir = tempdir().unwrap();
        let material = SshMaterial::new("key");
        let scratch = materialize(dir.path(), &material, config_features()).unwrap();
        assert_eq!(scratch.decoration.args_prefix[0], "-c");
        assert!(scratch.decoration.args_prefix[1].starts_with("core.sshCommand=ssh"));
        assert!(scratch.decoration.env_overlay.is_empty());
    }

    #[test]
    fn falls_back_to_env_when_config_unsupported() {
        let dir = tempdir().unwrap();
        let material = SshMaterial::new("key");
        let features = FeatureSet {
            ssh_via_config: false,
            ssh_via_env: true,
        };
        let scratch = materialize(dir.path(), &material, features).unwrap();
        assert!(scratch.decoration.args_prefix.is_empty());
        assert_eq!(scratch.decoration.env_overlay[0].0, "GIT_SSH_COMMAND");
    }

    #[test]
    fn host_key_is_wrapped_with_wildcard() {
        let dir = tempdir().unwrap();
        let material = SshMaterial::new("key").with_host_key("ssh-host-key");
        materialize(dir.path(), &material, config_features()).unwrap();
        let known_hosts = dir
            .path()
            .join(".gitpoller-ssh@@@")
            .join("ssh-known-hosts");
        assert_eq!(fs::read_to_string(known_hosts).unwrap(), "* ssh-host-key");
    }

    #[test]
    fn known_hosts_is_written_verbatim() {
        let dir = tempdir().unwrap();
        let material = SshMaterial::new("key").with_known_hosts("ssh-known-hosts");
        materialize(dir.path(), &material, config_features()).unwrap();
        let known_hosts = dir
            .path()
            .join(".gitpoller-ssh@@@")
            .join("ssh-known-hosts");
        assert_eq!(fs::read_to_string(known_hosts).unwrap(), "ssh-known-hosts");
    }

    #[test]
    fn dropping_scratch_removes_directory() {
        let dir = tempdir().unwrap();
        let material = SshMaterial::new("key");
        let scratch_dir;
        {
            let scratch = materialize(dir.path(), &material, config_features()).unwrap();
            scratch_dir = dir.path().join(".gitpoller-ssh@@@");
            assert!(scratch_dir.exists());
            drop(scratch);
        }
        assert!(!scratch_dir.exists());
    }
}
