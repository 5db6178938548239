//! Skill context injected into generation requests.

use super::JobDomainError;
use serde::{Deserialize, Serialize};

/// Named guideline text that the generator must follow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SkillContext {
    name: String,
    content: String,
}

impl SkillContext {
    /// Creates a skill with a non-empty name.
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::EmptySkillName`] when the name is blank.
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Result<Self, JobDomainError> {
        let raw_name = name.into();
        let trimmed = raw_name.trim();
        if trimmed.is_empty() {
            return Err(JobDomainError::EmptySkillName);
        }
        Ok(Self {
            name: trimmed.to_owned(),
            content: content.into(),
        })
    }

    /// Returns the skill name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the skill body.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }
}
