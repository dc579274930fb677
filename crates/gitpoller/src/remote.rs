// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 gitpoller contributors

//! Remote Enumerator (spec §4.D) — `git ls-remote --refs <repourl>`, parsed
//! into an ordered `ref -> sha` table.

use crate::command::{CommandRequest, CommandRunner};
use crate::credentials::SshDecoration;
use crate::error::PollerError;

/// One `<sha>\t<ref>` entry from `ls-remote`, in remote-reported order.
pub type RemoteRef = (String, String);

/// Runs `git ls-remote --refs <repourl>` (decorated with `decoration` when
/// SSH material is configured) and parses the output. Empty output is a
/// valid "no refs" result. Non-zero exit is an [`PollerError::Environment`].
pub fn ls_remote(
    runner: &dyn CommandRunner,
    repourl: &str,
    decoration: &SshDecoration,
) -> Result<Vec<RemoteRef>, PollerError> {
    let request = CommandRequest::new(&["ls-remote", "--refs", repourl])
        .prefixed(&decoration.args_prefix);
    let request = decoration
        .env_overlay
        .iter()
        .fold(request, |req, (k, v)| req.with_env(k, v));

    let output = runner
        .run(&request)
        .map_err(|e| PollerError::environment(format!("could not run git ls-remote: {e}")))?;

    if !output.success() {
        return Err(PollerError::environment(format!(
            "git ls-remote --refs {repourl} failed (exit {:?}): {}",
            output.status,
            output.stderr_str_lossy().trim()
        )));
    }

    parse_ls_remote(&output.stdout_str_lossy())
}

fn parse_ls_remote(text: &str) -> Result<Vec<RemoteRef>, PollerError> {
    let mut refs = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let mut parts = line.splitn(2, '\t');
        let sha = parts.next().unwrap_or_default();
        let ref_name = parts.next().ok_or_else(|| {
            PollerError::environment(format!("unparseable ls-remote line: {line:?}"))
        })?;
        refs.push((ref_name.to_string(), sha.to_string()));
    }
    Ok(refs)
}
