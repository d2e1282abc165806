//! `DEPS` manifest parsing.
//!
//! The manifest is read line by line through a two-state machine:
//!
//! - `Idle` - no allow-listed block is open
//! - `Accumulating(record)` - a block is open and collects its repository and commit
//!
//! Every third-party marker line flushes the open record, complete or not, and
//! may open a new one. End of input flushes nothing, so a block is only emitted
//! once another marker follows it.

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use regex::Regex;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// One nested dependency extracted from the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyRecord {
    /// Checkout-relative directory, prefix stripped.
    pub path: String,
    /// Matching allow-list entry.
    pub name: String,
    /// Repository path on the source host, `.git` stripped.
    pub repository_url: Option<String>,
    /// Pinned 40-char lowercase hex commit.
    pub commit_hash: Option<String>,
}

impl DependencyRecord {
    fn open(path: String, name: String) -> Self {
        Self {
            path,
            name,
            repository_url: None,
            commit_hash: None,
        }
    }

    /// Whether both the repository and the commit were found before the block closed.
    pub fn is_complete(&self) -> bool {
        self.repository_url.is_some() && self.commit_hash.is_some()
    }
}

/// Line classification rules derived from a [`SyncConfig`].
#[derive(Debug, Clone)]
pub struct ManifestRules {
    marker_token: String,
    path_prefix: String,
    allow_list: Vec<String>,
    repository_re: Regex,
    commit_re: Regex,
}

impl ManifestRules {
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let repository_pattern = format!(
            r"^Var\('{}'\)\s\+\s'([A-Za-z0-9_./\-]+)",
            regex::escape(&config.repository_var)
        );
        let repository_re = Regex::new(&repository_pattern)
            .map_err(|e| SyncError::Config(format!("repository_var: {}", e)))?;
        let commit_re = Regex::new(r"^'([0-9a-f]{40})'")
            .map_err(|e| SyncError::Config(e.to_string()))?;

        Ok(Self {
            marker_token: config.marker_token.clone(),
            path_prefix: config.path_prefix.clone(),
            allow_list: config.allow_list.clone(),
            repository_re,
            commit_re,
        })
    }

    fn is_marker(&self, line: &str) -> bool {
        line.contains(&self.marker_token)
    }

    /// First allow-list entry whose `<marker>/<name>` appears on the line.
    fn matching_dependency(&self, line: &str) -> Option<&str> {
        self.allow_list
            .iter()
            .find(|dep| line.contains(&format!("{}/{}", self.marker_token, dep)))
            .map(String::as_str)
    }

    fn start_record(&self, line: &str) -> Option<DependencyRecord> {
        let name = self.matching_dependency(line)?;
        let quoted = line.split('\'').nth(1)?;
        let path = quoted.strip_prefix(&self.path_prefix).unwrap_or(quoted);
        Some(DependencyRecord::open(path.to_string(), name.to_string()))
    }

    /// Apply at most one field from `line`; repository wins over commit.
    fn absorb(&self, record: DependencyRecord, line: &str) -> DependencyRecord {
        if let Some(caps) = self.repository_re.captures(line) {
            let repo = &caps[1];
            let repo = repo.strip_suffix(".git").unwrap_or(repo);
            return DependencyRecord {
                repository_url: Some(repo.to_string()),
                ..record
            };
        }
        if let Some(caps) = self.commit_re.captures(line) {
            return DependencyRecord {
                commit_hash: Some(caps[1].to_string()),
                ..record
            };
        }
        record
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ParseState {
    #[default]
    Idle,
    Accumulating(DependencyRecord),
}

/// Result of feeding one line into a [`ParseState`].
#[derive(Debug, PartialEq, Eq)]
pub struct Transition {
    pub state: ParseState,
    pub flushed: Option<DependencyRecord>,
}

impl ParseState {
    pub fn advance(self, line: &str, rules: &ManifestRules) -> Transition {
        let line = line.trim();

        if rules.is_marker(line) {
            let flushed = match self {
                ParseState::Accumulating(record) => Some(record),
                ParseState::Idle => None,
            };
            let state = rules
                .start_record(line)
                .map_or(ParseState::Idle, ParseState::Accumulating);
            return Transition { state, flushed };
        }

        let state = match self {
            ParseState::Idle => ParseState::Idle,
            ParseState::Accumulating(record) => {
                ParseState::Accumulating(rules.absorb(record, line))
            }
        };
        Transition {
            state,
            flushed: None,
        }
    }
}

/// Extract allow-listed records in manifest order. Never fails on content.
pub fn parse_manifest(content: &str, rules: &ManifestRules) -> Vec<DependencyRecord> {
    let mut records = Vec::new();
    let mut state = ParseState::Idle;

    for line in content.lines() {
        let transition = state.advance(line, rules);
        records.extend(transition.flushed);
        state = transition.state;
    }

    records
}

/// Read the manifest at `path` and parse it with rules built from `config`.
pub fn load_records(path: &Path, config: &SyncConfig) -> Result<Vec<DependencyRecord>> {
    let rules = ManifestRules::new(config)?;
    let content = fs::read_to_string(path).map_err(|source| SyncError::ManifestRead {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_manifest(&content, &rules))
}
