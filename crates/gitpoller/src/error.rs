// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 gitpoller contributors

//! Error taxonomy for the poller (spec §7).
//!
//! `GitError` is an internal signal used only within a single `_dovccmd`-style
//! invocation; by the time it crosses the poll boundary it has always been
//! converted into [`PollerError::Environment`]. [`PollerError::Config`] is
//! raised at construction time and never from inside [`crate::poller::GitPoller::poll`].

use thiserror::Error;

/// Top-level error returned by a poll or by configuration construction.
#[derive(Debug, Error)]
pub enum PollerError {
    /// git is missing, unparseable, too old for the requested SSH mode, or a
    /// required git invocation exited non-zero. Hard failure: the poll aborts
    /// and the cursor is not persisted.
    #[error("{0}")]
    Environment(String),

    /// Rejected configuration (mutually exclusive options, deprecated keys).
    #[error("{0}")]
    Config(String),
}

impl PollerError {
    pub fn environment(msg: impl Into<String>) -> Self {
        PollerError::Environment(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        PollerError::Config(msg.into())
    }
}

/// Internal signal for a git invocation that exited with git's own "fatal"
/// status (128). Always caught within the orchestrator and logged, then
/// surfaced to the caller as [`PollerError::Environment`] — see spec §7.
#[derive(Debug, Error)]
#[error("git {args} failed with exit code 128: {stderr}")]
pub struct GitError {
    pub args: String,
    pub stderr: String,
}
