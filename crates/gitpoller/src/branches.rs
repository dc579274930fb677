// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 gitpoller contributors

//! Branch Selector (spec §4.E) — resolves the configured branch policy
//! against enumerated remote refs to a concrete, ordered list of refs to
//! poll, and decides the cursor's branch-key shape (spec §3, §9).

use std::sync::Arc;

use crate::remote::RemoteRef;

/// Branch-selection policy, modeled as a tagged union per spec §9 ("In a
/// systems language, the branch-selection input becomes a tagged union").
#[derive(Clone)]
pub enum BranchPolicy {
    /// Explicit short names; cursor keys are short names.
    List(Vec<String>),
    /// Every remote ref; cursor keys are full ref names.
    All,
    /// Predicate over full ref names; cursor keys are full ref names.
    Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
    /// `refs/tags/*` only; cursor keys are full ref names, the same key
    /// shape as `All`, since `only_tags` does not go through the short-name
    /// mapping spec §3 describes for explicit lists.
    OnlyTags,
}

impl std::fmt::Debug for BranchPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BranchPolicy::List(names) => f.debug_tuple("List").field(names).finish(),
            BranchPolicy::All => write!(f, "All"),
            BranchPolicy::Predicate(_) => write!(f, "Predicate(..)"),
            BranchPolicy::OnlyTags => write!(f, "OnlyTags"),
        }
    }
}

impl Default for BranchPolicy {
    /// Default policy: `["master"]` (spec §4.E).
    fn default() -> Self {
        BranchPolicy::List(vec!["master".to_string()])
    }
}

/// A ref the selector decided to poll this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolledRef {
    /// The selector form used for the fetch refspec's source side (short
    /// name for an explicit list/legacy branch, full ref otherwise).
    pub selector: String,
    /// The full remote ref name.
    pub full_ref: String,
    /// The cursor key this branch is tracked under (spec §3).
    pub branch_key: String,
}

/// Resolves `policy` against the enumerated `remote_refs`, returning polled
/// refs in deterministic (remote-enumeration) order.
pub fn resolve(policy: &BranchPolicy, remote_refs: &[RemoteRef]) -> Vec<PolledRef> {
    match policy {
        BranchPolicy::List(names) => names
            .iter()
            .filter_map(|name| {
                let full_ref = format!("refs/heads/{name}");
                remote_refs
                    .iter()
                    .find(|(r, _)| r == &full_ref)
                    .map(|_| PolledRef {
                        selector: name.clone(),
                        full_ref: full_ref.clone(),
                        branch_key: name.clone(),
                    })
            })
            .collect(),
        BranchPolicy::All => remote_refs
            .iter()
            .map(|(full_ref, _)| PolledRef {
                selector: full_ref.clone(),
                full_ref: full_ref.clone(),
                branch_key: full_ref.clone(),
            })
            .collect(),
        BranchPolicy::Predicate(pred) => remote_refs
            .iter()
            .filter(|(r, _)| pred(r))
            .map(|(full_ref, _)| PolledRef {
                selector: full_ref.clone(),
                full_ref: full_ref.clone(),
                branch_key: full_ref.clone(),
            })
            .collect(),
        BranchPolicy::OnlyTags => remote_refs
            .iter()
            .filter(|(r, _)| r.starts_with("refs/tags/"))
            .map(|(full_ref, _)| PolledRef {
                selector: full_ref.clone(),
                full_ref: full_ref.clone(),
                branch_key: full_ref.clone(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(pairs: &[(&str, &str)]) -> Vec<RemoteRef> {
        pairs
            .iter()
            .map(|(r, s)| (r.to_string(), s.to_string()))
            .collect()
    }

    #[test]
    fn explicit_list_maps_short_names_to_heads() {
        let refs = refs(&[("refs/heads/master", "aaa"), ("refs/heads/release", "bbb")]);
        let resolved = resolve(&BranchPolicy::List(vec!["master".into()]), &refs);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].branch_key, "master");
        assert_eq!(resolved[0].full_ref, "refs/heads/master");
    }

    #[test]
    fn explicit_list_silently_skips_missing_branch() {
        let refs = refs(&[("refs/heads/master", "aaa")]);
        let resolved = resolve(
            &BranchPolicy::List(vec!["master".into(), "not_on_remote".into()]),
            &refs,
        );
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].branch_key, "master");
    }

    #[test]
    fn all_policy_uses_full_ref_as_cursor_key() {
        let refs = refs(&[("refs/heads/master", "aaa"), ("refs/pull/410/head", "bbb")]);
        let resolved = resolve(&BranchPolicy::All, &refs);
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].branch_key, "refs/heads/master");
        assert_eq!(resolved[1].branch_key, "refs/pull/410/head");
    }

    #[test]
    fn predicate_filters_full_refs() {
        let refs = refs(&[("refs/heads/master", "aaa"), ("refs/heads/wip/x", "bbb")]);
        let predicate: Arc<dyn Fn(&str) -> bool + Send + Sync> =
            Arc::new(|r: &str| !r.starts_with("refs/heads/wip/"));
        let resolved = resolve(&BranchPolicy::Predicate(predicate), &refs);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].full_ref, "refs/heads/master");
    }

    #[test]
    fn only_tags_filters_to_tag_refs() {
        let refs = refs(&[("refs/heads/master", "aaa"), ("refs/tags/v1", "bbb")]);
        let resolved = resolve(&BranchPolicy::OnlyTags, &refs);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].full_ref, "refs/tags/v1");
    }

    #[test]
    fn default_policy_is_master() {
        match BranchPolicy::default() {
            BranchPolicy::List(names) => assert_eq!(names, vec!["master".to_string()]),
            _ => panic!("expected List"),
        }
    }
}
