//! Commit and review-request text derived from a job.

use minijinja::{Environment, context};

use crate::job::domain::{SkillContext, TaskDescription};

/// Longest commit summary, in characters, after the type prefix.
pub const MAX_SUMMARY_CHARS: usize = 72;

const REVIEW_BODY_TEMPLATE: &str = "## Summary

{{ explanation }}

## Task

{{ task }}
{%- if skills %}

## Applied Skills
{% for name in skills %}
- {{ name }}
{%- endfor %}
{%- endif %}

---
Generated automatically by coda.";

/// Infers the conventional-commit type from the first word of the task.
#[must_use]
pub fn commit_type(task: &str) -> &'static str {
    let first_word = task
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .trim_matches(|character: char| !character.is_alphanumeric())
        .to_lowercase();
    match first_word.as_str() {
        "fix" | "fixes" | "fixed" | "bug" | "bugfix" => "fix",
        "doc" | "docs" | "document" | "readme" => "docs",
        "refactor" => "refactor",
        "test" | "tests" => "test",
        "chore" | "bump" => "chore",
        _ => "feat",
    }
}

fn summary(task: &str) -> String {
    let first_line = task.lines().next().unwrap_or_default().trim();
    let trimmed = first_line.strip_suffix('.').unwrap_or(first_line);
    trimmed.chars().take(MAX_SUMMARY_CHARS).collect()
}

/// Formats the commit subject as `<type>: <summary>`.
#[must_use]
pub fn commit_message(task: &TaskDescription) -> String {
    let text = task.as_str();
    format!("{}: {}", commit_type(text), summary(text))
}

/// Formats the review-request title. Identical to the commit subject.
#[must_use]
pub fn review_title(task: &TaskDescription) -> String {
    commit_message(task)
}

/// Renders the review-request body.
///
/// # Errors
///
/// Returns the template engine error if rendering fails.
pub fn review_body(
    explanation: &str,
    task: &TaskDescription,
    skills: &[SkillContext],
) -> Result<String, minijinja::Error> {
    let names: Vec<&str> = skills.iter().map(SkillContext::name).collect();
    Environment::new().render_str(
        REVIEW_BODY_TEMPLATE,
        context! {
            explanation => explanation,
            task => task.as_str(),
            skills => names,
        },
    )
}
