// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 gitpoller contributors

//! Percent-encoding for embedding a repository URL in a local ref path
//! (spec §4.F / GLOSSARY "Url-quoted").
//!
//! `urlencoding::encode` treats `~` as an RFC 3986 "unreserved" character
//! and leaves it untouched, but the original tool's ref namespacing escapes
//! it too (`git@example.com:~foo/baz.git` →
//! `git%40example.com%3A%7Efoo%2Fbaz.git`). This wraps the crate's encoder
//! and additionally escapes `~`.

/// Percent-encode `repourl` for use as a path segment under `refs/buildbot/`.
pub fn url_quote(repourl: &str) -> String {
    urlencoding::encode(repourl).replace('~', "%7E")
}
