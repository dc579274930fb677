// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 gitpoller contributors

//! Configuration surface (spec §6) plus construction-time `ConfigError`
//! validation (spec §7). Mirrors the teacher's layered, `toml::Table`-walking
//! config loader (`config.rs::load_config` in the original `grt`), adapted
//! here to a single TOML file listing `[[repo]]` entries for the CLI.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::branches::BranchPolicy;
use crate::change::Category;
use crate::credentials::SshMaterial;

/// Default poll interval when a `[[repo]]` entry omits `poll_interval_secs`,
/// matching the original GitPoller's own default cadence.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(600);

/// Rejected configuration combinations (spec §6/§7). Raised at construction,
/// never from inside [`crate::poller::GitPoller::poll`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("branch and branches are mutually exclusive")]
    BranchAndBranches,

    #[error("only_tags is mutually exclusive with branch/branches")]
    OnlyTagsWithBranches,

    #[error("fetch_refspec is no longer supported")]
    FetchRefspecUnsupported,

    #[error("repourl is required")]
    MissingRepoUrl,

    #[error("sshHostKey and sshKnownHosts are mutually exclusive")]
    SshHostKeyAndKnownHosts,
}

/// Configuration for a single polled repository (spec §6 "Configuration
/// surface").
#[derive(Clone)]
pub struct GitPollerConfig {
    pub repourl: String,
    /// Defaults to `repourl` (spec §3 "Repository Identity").
    pub name: String,
    pub policy: BranchPolicy,
    pub poll_interval: Duration,
    pub gitbin: String,
    pub category: Category,
    pub project: Option<String>,
    pub codebase: Option<String>,
    pub build_pushes_with_no_commits: bool,
    pub ssh_material: Option<SshMaterial>,
    pub workdir: PathBuf,
}

impl GitPollerConfig {
    /// Start building a config for `repourl`, using `basedir/gitpoller-work`
    /// as the default workdir (spec §6).
    pub fn builder(repourl: impl Into<String>, basedir: &std::path::Path) -> GitPollerConfigBuilder {
        GitPollerConfigBuilder {
            repourl: repourl.into(),
            name: None,
            branch: None,
            branches: None,
            only_tags: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            gitbin: "git".to_string(),
            category: Category::default(),
            project: None,
            codebase: None,
            build_pushes_with_no_commits: false,
            ssh_private_key: None,
            ssh_host_key: None,
            ssh_known_hosts: None,
            workdir: basedir.join("gitpoller-work"),
        }
    }
}

/// Builder validated at [`GitPollerConfigBuilder::build`] (spec §6/§7).
pub struct GitPollerConfigBuilder {
    repourl: String,
    name: Option<String>,
    branch: Option<String>,
    branches: Option<BranchPolicy>,
    only_tags: bool,
    poll_interval: Duration,
    gitbin: String,
    category: Category,
    project: Option<String>,
    codebase: Option<String>,
    build_pushes_with_no_commits: bool,
    ssh_private_key: Option<String>,
    ssh_host_key: Option<String>,
    ssh_known_hosts: Option<String>,
    workdir: PathBuf,
}

impl GitPollerConfigBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Legacy single-branch option; mutually exclusive with [`Self::branches`].
    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn branches(mut self, policy: BranchPolicy) -> Self {
        self.branches = Some(policy);
        self
    }

    pub fn only_tags(mut self) -> Self {
        self.only_tags = true;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn gitbin(mut self, gitbin: impl Into<String>) -> Self {
        self.gitbin = gitbin.into();
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn codebase(mut self, codebase: impl Into<String>) -> Self {
        self.codebase = Some(codebase.into());
        self
    }

    pub fn build_pushes_with_no_commits(mut self, value: bool) -> Self {
        self.build_pushes_with_no_commits = value;
        self
    }

    pub fn ssh_private_key(mut self, key: impl Into<String>) -> Self {
        self.ssh_private_key = Some(key.into());
        self
    }

    pub fn ssh_host_key(mut self, key: impl Into<String>) -> Self {
        self.ssh_host_key = Some(key.into());
        self
    }

    pub fn ssh_known_hosts(mut self, known_hosts: impl Into<String>) -> Self {
        self.ssh_known_hosts = Some(known_hosts.into());
        self
    }

    pub fn workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = workdir.into();
        self
    }

    pub fn build(self) -> Result<GitPollerConfig, ConfigError> {
        if self.repourl.is_empty() {
            return Err(ConfigError::MissingRepoUrl);
        }
        if self.branch.is_some() && self.branches.is_some() {
            return Err(ConfigError::BranchAndBranches);
        }
        if self.only_tags && (self.branch.is_some() || self.branches.is_some()) {
            return Err(ConfigError::OnlyTagsWithBranches);
        }
        if self.ssh_host_key.is_some() && self.ssh_known_hosts.is_some() {
            return Err(ConfigError::SshHostKeyAndKnownHosts);
        }

        let policy = if self.only_tags {
            BranchPolicy::OnlyTags
        } else if let Some(policy) = self.branches {
            policy
        } else if let Some(branch) = self.branch {
            BranchPolicy::List(vec![branch])
        } else {
            BranchPolicy::default()
        };

        let ssh_material = self.ssh_private_key.map(|key| {
            let mut material = SshMaterial::new(key);
            if let Some(host_key) = self.ssh_host_key {
                material = material.with_host_key(host_key);
            }
            if let Some(known_hosts) = self.ssh_known_hosts {
                material = material.with_known_hosts(known_hosts);
            }
            material
        });

        Ok(GitPollerConfig {
            name: self.name.unwrap_or_else(|| self.repourl.clone()),
            repourl: self.repourl,
            policy,
            poll_interval: self.poll_interval,
            gitbin: self.gitbin,
            category: self.category,
            project: self.project,
            codebase: self.codebase,
            build_pushes_with_no_commits: self.build_pushes_with_no_commits,
            ssh_material,
            workdir: self.workdir,
        })
    }
}

/// One `[[repo]]` entry in the CLI's multi-repository TOML config file.
#[derive(Debug, serde::Deserialize)]
struct RepoEntry {
    repourl: String,
    name: Option<String>,
    branch: Option<String>,
    branches: Option<Vec<String>>,
    only_tags: Option<bool>,
    poll_interval_secs: Option<u64>,
    gitbin: Option<String>,
    category: Option<String>,
    project: Option<String>,
    codebase: Option<String>,
    build_pushes_with_no_commits: Option<bool>,
    ssh_private_key_file: Option<PathBuf>,
    ssh_host_key: Option<String>,
    ssh_known_hosts_file: Option<PathBuf>,
    /// Deprecated; presence is a hard [`ConfigError`] (spec §6).
    fetch_refspec: Option<String>,
}

/// Top-level structure of the CLI's multi-repository config file.
#[derive(Debug, serde::Deserialize)]
struct ConfigFile {
    #[serde(default)]
    repo: Vec<RepoEntry>,
}

/// Parses a TOML config file listing `[[repo]]` entries into a list of
/// validated [`GitPollerConfig`]s, with each repo's workdir rooted under
/// `basedir/<name>/gitpoller-work`.
pub fn load_configs(
    toml_contents: &str,
    basedir: &std::path::Path,
) -> anyhow::Result<Vec<GitPollerConfig>> {
    let file: ConfigFile = toml::from_str(toml_contents)?;
    let mut configs = Vec::with_capacity(file.repo.len());
    for entry in file.repo {
        if entry.fetch_refspec.is_some() {
            return Err(ConfigError::FetchRefspecUnsupported.into());
        }

        let name = entry.name.clone().unwrap_or_else(|| entry.repourl.clone());
        let repo_basedir = basedir.join(&name);
        let mut builder = GitPollerConfig::builder(entry.repourl, &repo_basedir).name(name);

        if let Some(branch) = entry.branch {
            builder = builder.branch(branch);
        }
        if let Some(branches) = entry.branches {
            builder = builder.branches(BranchPolicy::List(branches));
        }
        if entry.only_tags.unwrap_or(false) {
            builder = builder.only_tags();
        }
        if let Some(secs) = entry.poll_interval_secs {
            builder = builder.poll_interval(Duration::from_secs(secs));
        }
        if let Some(gitbin) = entry.gitbin {
            builder = builder.gitbin(gitbin);
        }
        if let Some(category) = entry.category {
            builder = builder.category(Category::Static(category));
        }
        if let Some(project) = entry.project {
            builder = builder.project(project);
        }
        if let Some(codebase) = entry.codebase {
            builder = builder.codebase(codebase);
        }
        if let Some(value) = entry.build_pushes_with_no_commits {
            builder = builder.build_pushes_with_no_commits(value);
        }
        if let Some(path) = entry.ssh_private_key_file {
            let key = std::fs::read_to_string(&path)
                .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
            builder = builder.ssh_private_key(key);
        }
        if let Some(host_key) = entry.ssh_host_key {
            builder = builder.ssh_host_key(host_key);
        }
        if let Some(path) = entry.ssh_known_hosts_file {
            let known_hosts = std::fs::read_to_string(&path)
                .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
            builder = builder.ssh_known_hosts(known_hosts);
        }

        configs.push(builder.build()?);
    }
    Ok(configs)
}

/// Wraps a [`Category`] predicate so callers needn't import `Arc` themselves.
pub fn callable_category(f: impl Fn(&crate::change::ChangeRecord) -> String + Send + Sync + 'static) -> Category {
    Category::Callable(Arc::new(f))
}
