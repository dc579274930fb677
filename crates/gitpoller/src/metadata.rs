// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 gitpoller contributors

//! Commit Metadata Extractor (spec §4.I) — four `git log --no-walk`
//! invocations per new commit, plus the octal-escape decoding git applies
//! to quoted filenames in `--name-only` output.

use std::path::Path;

use crate::command::{CommandRequest, CommandRunner};
use crate::error::PollerError;

/// Metadata for a single commit, ready to fold into a [`crate::change::ChangeRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitMetadata {
    pub author: String,
    pub committer: String,
    pub when_timestamp: i64,
    pub comments: String,
    pub files: Vec<String>,
}

/// Runs the four `git log --no-walk` extraction commands for `sha` in
/// `workdir`. Empty author/committer/timestamp is an
/// [`PollerError::Environment`] (spec §4.I); empty comments/files are valid.
pub fn extract_commit_metadata(
    runner: &dyn CommandRunner,
    workdir: &Path,
    sha: &str,
) -> Result<CommitMetadata, PollerError> {
    let author = run_format(runner, workdir, sha, "%aN <%aE>")?;
    if author.is_empty() {
        return Err(PollerError::environment(format!(
            "git log for {sha} returned empty author"
        )));
    }

    let committer = run_format(runner, workdir, sha, "%cN <%cE>")?;
    if committer.is_empty() {
        return Err(PollerError::environment(format!(
            "git log for {sha} returned empty committer"
        )));
    }

    let timestamp_str = run_format(runner, workdir, sha, "%ct")?;
    if timestamp_str.is_empty() {
        return Err(PollerError::environment(format!(
            "git log for {sha} returned empty timestamp"
        )));
    }
    let when_timestamp = timestamp_str
        .parse::<f64>()
        .map_err(|_| {
            PollerError::environment(format!(
                "git log for {sha} returned unparseable timestamp: {timestamp_str:?}"
            ))
        })?
        .trunc() as i64;

    let comments = run_format(runner, workdir, sha, "%s%n%b")?;

    let files = extract_files(runner, workdir, sha)?;

    Ok(CommitMetadata {
        author,
        committer,
        when_timestamp,
        comments,
        files,
    })
}

fn run_format(
    runner: &dyn CommandRunner,
    workdir: &Path,
    sha: &str,
    format: &str,
) -> Result<String, PollerError> {
    let request = CommandRequest::new(&["log", "--no-walk", &format!("--format={format}"), sha, "--"])
        .with_workdir(workdir);
    let output = runner.run(&request).map_err(|e| {
        PollerError::environment(format!("could not run git log --format={format}: {e}"))
    })?;
    if !output.success() {
        return Err(PollerError::environment(format!(
            "git log --no-walk --format={format} {sha} failed (exit {:?}): {}",
            output.status,
            output.stderr_str_lossy().trim()
        )));
    }
    // All outputs are decoded UTF-8 with replacement for invalid sequences (spec §4.I).
    Ok(String::from_utf8_lossy(&output.stdout)
        .trim_end_matches('\n')
        .to_string())
}

fn extract_files(
    runner: &dyn CommandRunner,
    workdir: &Path,
    sha: &str,
) -> Result<Vec<String>, PollerError> {
    let request = CommandRequest::new(&[
        "log",
        "--name-only",
        "--no-walk",
        "--format=%n",
        sha,
        "--",
    ])
    .with_workdir(workdir);
    let output = runner
        .run(&request)
        .map_err(|e| PollerError::environment(format!("could not run git log --name-only: {e}")))?;
    if !output.success() {
        return Err(PollerError::environment(format!(
            "git log --name-only --no-walk {sha} failed (exit {:?}): {}",
            output.status,
            output.stderr_str_lossy().trim()
        )));
    }

    let text = String::from_utf8_lossy(&output.stdout);
    Ok(text
        .lines()
        .map(unquote_c_style)
        .filter(|line| !line.trim().is_empty())
        .collect())
}

/// Decodes git's C-quoted octal escapes in a filename
/// (e.g. `"\146ile_octal"` -> `file_octal`), preserving embedded spaces.
/// Lines git did not quote (no surrounding `"`) are returned unchanged.
pub fn unquote_c_style(line: &str) -> String {
    let Some(inner) = line.strip_prefix('"').and_then(|s| s.strip_suffix('"')) else {
        return line.to_string();
    };

    let bytes = inner.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 1 < bytes.len() {
            let next = bytes[i + 1];
            if next.is_ascii_digit() && i + 4 <= bytes.len() {
                let octal = &inner[i + 1..i + 4];
                if octal.bytes().all(|b| (b'0'..=b'7').contains(&b)) {
                    if let Ok(value) = u8::from_str_radix(octal, 8) {
                        out.push(value);
                        i += 4;
                        continue;
                    }
                }
            }
            match next {
                b'n' => {
                    out.push(b'\n');
                    i += 2;
                    continue;
                }
                b't' => {
                    out.push(b'\t');
                    i += 2;
                    continue;
                }
                b'\\' | b'"' => {
                    out.push(next);
                    i += 2;
                    continue;
                }
                _ => {}
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{MockCommandRunner, MockExpectation};

    #[test]
    fn unquotes_octal_escape() {
        assert_eq!(unquote_c_style(r#""\146ile_octal""#), "file_octal");
    }

    #[test]
    fn leaves_unquoted_names_untouched() {
        assert_eq!(unquote_c_style("file space"), "file space");
    }

    #[test]
    fn extracts_files_dropping_blank_lines() {
        let mock = MockCommandRunner::new(vec![MockExpectation::new(&[
            "log",
            "--name-only",
            "--no-walk",
            "--format=%n",
            "sha",
            "--",
        ])
        .stdout(&b"\n\nfile1\nfile2\n\"\\146ile_octal\"\nfile space\n"[..])]);
        let files = extract_files(&mock, Path::new("wd"), "sha").unwrap();
        assert_eq!(files, vec!["file1", "file2", "file_octal", "file space"]);
    }

    #[test]
    fn empty_author_is_environment_error() {
        let mock = MockCommandRunner::new(vec![MockExpectation::new(&[
            "log",
            "--no-walk",
            "--format=%aN <%aE>",
            "sha",
            "--",
        ])
        .stdout(&b""[..])]);
        let err = extract_commit_metadata(&mock, Path::new("wd"), "sha").unwrap_err();
        assert!(matches!(err, PollerError::Environment(_)));
    }

    #[test]
    fn full_extraction_round_trip() {
        let mock = MockCommandRunner::new(vec![
            MockExpectation::new(&["log", "--no-walk", "--format=%aN <%aE>", "sha", "--"])
                .stdout(&b"Sammy Jankis <email@example.com>\n"[..]),
            MockExpectation::new(&["log", "--no-walk", "--format=%cN <%cE>", "sha", "--"])
                .stdout(&b"Sammy Jankis <email@example.com>\n"[..]),
            MockExpectation::new(&["log", "--no-walk", "--format=%ct", "sha", "--"])
                .stdout(&b"1234567890\n"[..]),
            MockExpectation::new(&["log", "--no-walk", "--format=%s%n%b", "sha", "--"])
                .stdout(&b"a commit message\n\n"[..]),
            MockExpectation::new(&[
                "log",
                "--name-only",
                "--no-walk",
                "--format=%n",
                "sha",
                "--",
            ])
            .stdout(&b"\n\nfile1\n"[..]),
        ]);
        let meta = extract_commit_metadata(&mock, Path::new("wd"), "sha").unwrap();
        assert_eq!(meta.author, "Sammy Jankis <email@example.com>");
        assert_eq!(meta.when_timestamp, 1_234_567_890);
        assert_eq!(meta.files, vec!["file1".to_string()]);
        mock.assert_all_commands_ran();
    }
}
