//! File-level patches produced by the generator.

use super::JobDomainError;
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operation a patch performs on its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOperation {
    /// Writes a new file.
    Create,
    /// Overwrites an existing file.
    Modify,
    /// Removes the file.
    Delete,
}

impl PatchOperation {
    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for PatchOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single file change carrying the complete resulting content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodePatch {
    /// Path relative to the repository root, as produced by the generator.
    #[serde(alias = "path")]
    pub file_path: String,
    /// Full file content; ignored for deletions.
    #[serde(default)]
    pub content: String,
    /// Operation to perform.
    pub operation: PatchOperation,
}

impl CodePatch {
    /// Creates a patch.
    #[must_use]
    pub fn new(
        file_path: impl Into<String>,
        content: impl Into<String>,
        operation: PatchOperation,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            content: content.into(),
            operation,
        }
    }

    /// Returns the character count contributed to the diff budget.
    #[must_use]
    pub fn content_len(&self) -> usize {
        self.content.chars().count()
    }

    /// Validates the patch path.
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::InvalidPatchPath`] when the path is unsafe.
    pub fn checked_path(&self) -> Result<PatchPath, JobDomainError> {
        PatchPath::parse(&self.file_path)
    }
}

/// Relative path that cannot escape the repository root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatchPath(Utf8PathBuf);

impl PatchPath {
    /// Parses and normalizes a repository-relative path.
    ///
    /// `.` components are dropped. Absolute paths, prefixes and `..`
    /// components are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::InvalidPatchPath`] for empty, absolute or
    /// escaping paths.
    pub fn parse(raw: &str) -> Result<Self, JobDomainError> {
        let invalid = || JobDomainError::InvalidPatchPath(raw.to_owned());
        if raw.contains('\0') || raw.contains('\\') {
            return Err(invalid());
        }

        let mut normalized = Utf8PathBuf::new();
        for component in Utf8Path::new(raw.trim()).components() {
            match component {
                Utf8Component::Normal(part) => normalized.push(part),
                Utf8Component::CurDir => {}
                Utf8Component::ParentDir | Utf8Component::RootDir | Utf8Component::Prefix(_) => {
                    return Err(invalid());
                }
            }
        }

        if normalized.as_str().is_empty() {
            return Err(invalid());
        }
        Ok(Self(normalized))
    }

    /// Returns the normalized relative path.
    #[must_use]
    pub fn as_path(&self) -> &Utf8Path {
        &self.0
    }

    /// Returns the parent directory, if the path is nested.
    #[must_use]
    pub fn parent(&self) -> Option<&Utf8Path> {
        self.0.parent().filter(|parent| !parent.as_str().is_empty())
    }
}

impl fmt::Display for PatchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}
