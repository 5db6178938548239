//! Branch-name value object and deterministic branch derivation.

use super::JobDomainError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length for a validated branch name.
const MAX_BRANCH_NAME_LENGTH: usize = 200;

/// Prefix shared by every derived job branch.
const DERIVED_PREFIX: &str = "agent";

/// Slug budget taken from the task description.
const MAX_SLUG_LENGTH: usize = 20;

/// Number of random characters appended to a derived branch.
const SUFFIX_LENGTH: usize = 6;

/// Hard ceiling for a derived branch name.
pub const MAX_DERIVED_BRANCH_LENGTH: usize = 40;

/// Slug used when the task contains no usable characters.
const FALLBACK_SLUG: &str = "task";

/// Radix covering `0-9a-z`, so `char::from_digit` yields lowercase output.
const SUFFIX_RADIX: u32 = 36;

/// Validated Git branch name.
///
/// Branch names must be non-empty after trimming, contain no whitespace or
/// characters Git rejects in ref names, and must not exceed
/// `MAX_BRANCH_NAME_LENGTH` characters.
///
/// # Examples
///
///     use coda::job::domain::BranchName;
///
///     let name = BranchName::new("release/1.2").expect("valid");
///     assert_eq!(name.as_str(), "release/1.2");
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchName(String);

impl BranchName {
    /// Creates a validated branch name.
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::InvalidBranchName`] when the value is empty,
    /// contains characters Git forbids in ref names, or exceeds the length
    /// limit.
    pub fn new(value: impl Into<String>) -> Result<Self, JobDomainError> {
        let raw = value.into();
        let normalized = raw.trim();

        if Self::is_invalid_branch_name(normalized) {
            return Err(JobDomainError::InvalidBranchName(raw));
        }

        Ok(Self(normalized.to_owned()))
    }

    /// Derives a job branch name from a task description.
    ///
    /// The result has the form `agent-<slug>-<random6>`, is at most
    /// [`MAX_DERIVED_BRANCH_LENGTH`] characters and always contains a hyphen.
    /// The suffix is drawn from the thread-local generator, so two calls with
    /// the same task almost always differ.
    #[must_use]
    pub fn derive_from_task(task: &str) -> Self {
        Self::derive_with_rng(task, &mut rand::rng())
    }

    /// Derives a job branch name using the supplied random source.
    ///
    /// # Examples
    ///
    ///     use coda::job::domain::BranchName;
    ///     use rand::SeedableRng;
    ///     use rand::rngs::StdRng;
    ///
    ///     let mut rng = StdRng::seed_from_u64(7);
    ///     let branch = BranchName::derive_with_rng("Add README badge!", &mut rng);
    ///     assert!(branch.as_str().starts_with("agent-add-readme-badge-"));
    #[must_use]
    pub fn derive_with_rng<R: Rng>(task: &str, rng: &mut R) -> Self {
        let slug = slugify(task);
        let suffix = random_suffix(rng);
        let combined = format!("{DERIVED_PREFIX}-{slug}-{suffix}");
        Self(combined.chars().take(MAX_DERIVED_BRANCH_LENGTH).collect())
    }

    fn is_invalid_branch_name(name: &str) -> bool {
        const FORBIDDEN: [char; 8] = [':', '~', '^', '?', '*', '[', '\\', ' '];

        let is_empty = name.is_empty();
        let contains_forbidden_char = name
            .chars()
            .any(|ch| FORBIDDEN.contains(&ch) || ch.is_whitespace() || ch.is_control());
        let has_bad_sequence = name.contains("..") || name.contains("@{") || name.contains("//");
        let has_bad_edges = name.starts_with('-')
            || name.starts_with('/')
            || name.ends_with('/')
            || name.ends_with('.')
            || name.ends_with(".lock");
        let exceeds_length_limit = name.len() > MAX_BRANCH_NAME_LENGTH;

        is_empty || contains_forbidden_char || has_bad_sequence || has_bad_edges || exceeds_length_limit
    }

    /// Returns the branch name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lower-cases the task, keeps `[a-z0-9\s-]`, turns whitespace runs into
/// single hyphens, and cuts the result to the slug budget.
fn slugify(task: &str) -> String {
    let lowered = task.to_lowercase();
    let kept: String = lowered
        .chars()
        .filter(|ch| {
            ch.is_ascii_lowercase() || ch.is_ascii_digit() || *ch == '-' || ch.is_whitespace()
        })
        .collect();
    let hyphenated = kept.split_whitespace().collect::<Vec<_>>().join("-");
    let truncated: String = hyphenated.chars().take(MAX_SLUG_LENGTH).collect();
    let trimmed = truncated.trim_end_matches('-');

    if trimmed.is_empty() {
        FALLBACK_SLUG.to_owned()
    } else {
        trimmed.to_owned()
    }
}

fn random_suffix<R: Rng>(rng: &mut R) -> String {
    (0..SUFFIX_LENGTH)
        .filter_map(|_| char::from_digit(rng.random_range(0..SUFFIX_RADIX), SUFFIX_RADIX))
        .collect()
}
