// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 gitpoller contributors

//! A polling-based git change source: watches one or more git remotes for
//! new commits and hands normalized change records to a downstream sink.

pub mod branches;
pub mod change;
pub mod command;
pub mod commitset;
pub mod config;
pub mod credentials;
pub mod cursor;
pub mod error;
pub mod features;
pub mod metadata;
pub mod poller;
pub mod remote;
pub mod urlquote;
pub mod workdir;
