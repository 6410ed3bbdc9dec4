//! Forge access: keymap URL validation, ref resolution and snapshot downloads.

mod client;
mod location;
mod resolve;

use std::fmt;

pub use client::{ForgeApi, ForgeError, GithubApi};
pub use location::{parse_keymap_url, KeymapLocation, UrlIssue, KEYMAP_EXTENSION};
pub use resolve::resolve_commit;

/// Repository plus the user-supplied (possibly mutable) ref.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RepoCoordinate {
    pub owner: String,
    pub repo: String,
    pub reference: String,
}

/// Immutable commit identifier; the content-addressing half of a snapshot key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommitId(String);

impl CommitId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
