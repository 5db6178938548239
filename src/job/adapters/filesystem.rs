//! Working-tree adapter: capability-scoped patch application and shell test
//! execution.

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

use super::process::run_captured;
use crate::job::{
    domain::{CodePatch, PatchOperation, PatchPath},
    ports::{PatchApplyError, TestReport, Workspace},
};

const README_CONTEXT_CHARS: usize = 2000;
const SOURCE_CONTEXT_CHARS: usize = 1500;
const SOURCE_CONTEXT_FILES: usize = 5;
const SOURCE_EXTENSIONS: [&str; 7] = ["rs", "ts", "tsx", "js", "jsx", "py", "go"];
const SKIPPED_DIRECTORIES: [&str; 3] = ["node_modules", "dist", "target"];

/// Applies patches to, and runs tests in, a local working tree.
#[derive(Debug, Clone)]
pub struct FsWorkspace {
    root: Utf8PathBuf,
}

impl FsWorkspace {
    /// Creates a workspace rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn open_root(&self) -> Result<Dir, PatchApplyError> {
        Dir::open_ambient_dir(&self.root, ambient_authority()).map_err(|source| {
            PatchApplyError::OpenRepository {
                path: self.root.to_string(),
                source: Arc::new(source),
            }
        })
    }
}

fn apply_one(dir: &Dir, path: &PatchPath, patch: &CodePatch) -> Result<(), PatchApplyError> {
    let relative = path.as_path();
    match patch.operation {
        PatchOperation::Create | PatchOperation::Modify => {
            if let Some(parent) = path.parent() {
                dir.create_dir_all(parent)
                    .map_err(|err| PatchApplyError::io("create directory", parent.as_str(), err))?;
            }
            dir.write(relative, patch.content.as_bytes())
                .map_err(|err| PatchApplyError::io("write", relative.as_str(), err))
        }
        PatchOperation::Delete => match dir.remove_file(relative) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(PatchApplyError::io("delete", relative.as_str(), err)),
        },
    }
}

#[async_trait]
impl Workspace for FsWorkspace {
    async fn apply(&self, patches: &[CodePatch]) -> Result<(), PatchApplyError> {
        let checked = patches
            .iter()
            .map(|patch| -> Result<_, PatchApplyError> { Ok((patch.checked_path()?, patch.clone())) })
            .collect::<Result<Vec<_>, _>>()?;
        let dir = self.open_root()?;

        tokio::task::spawn_blocking(move || {
            checked
                .iter()
                .try_for_each(|(path, patch)| apply_one(&dir, path, patch))
        })
        .await
        .map_err(|err| PatchApplyError::io("apply", "<patch set>", io::Error::other(err)))?
    }

    async fn run_tests(&self, commands: &[String], timeout: Duration) -> TestReport {
        let mut transcript = Vec::new();
        for command_line in commands {
            transcript.push(format!("$ {command_line}"));
            let mut command = Command::new("sh");
            command
                .arg("-c")
                .arg(command_line)
                .current_dir(self.root.as_std_path());

            match run_captured(&mut command, None, Some(timeout)).await {
                Ok(output) => {
                    push_stream(&mut transcript, &output.stdout);
                    push_stream(&mut transcript, &output.stderr);
                    if !output.success() {
                        transcript.push(format!("{command_line}: {}", output.status));
                        return TestReport {
                            success: false,
                            output: transcript.join("\n"),
                        };
                    }
                }
                Err(error) => {
                    transcript.push(format!("Error: {error}"));
                    return TestReport {
                        success: false,
                        output: transcript.join("\n"),
                    };
                }
            }
        }
        TestReport {
            success: true,
            output: transcript.join("\n"),
        }
    }
}

fn push_stream(transcript: &mut Vec<String>, stream: &str) {
    let trimmed = stream.trim_end();
    if !trimmed.is_empty() {
        transcript.push(trimmed.to_owned());
    }
}

/// Builds a short textual overview of a repository for generation prompts.
///
/// Includes the head of `README.md`, the top-level directories and the
/// beginning of the first few source files. Unreadable parts are skipped.
#[must_use]
pub fn gather_repo_context(root: &Utf8Path) -> String {
    let Ok(dir) = Dir::open_ambient_dir(root, ambient_authority()) else {
        return String::new();
    };
    let mut sections = Vec::new();

    if let Ok(readme) = dir.read_to_string("README.md") {
        sections.push(format!("README.md:\n{}\n", head(&readme, README_CONTEXT_CHARS)));
    }

    let directories: Vec<String> = sorted_entries(&dir)
        .into_iter()
        .filter(|(name, is_dir)| *is_dir && is_visible_directory(name))
        .map(|(name, _)| name)
        .collect();
    if !directories.is_empty() {
        sections.push(format!("Directories: {}\n", directories.join(", ")));
    }

    let mut sources = Vec::new();
    collect_sources(&dir, Utf8Path::new(""), &mut sources);
    for path in sources {
        if let Ok(content) = dir.read_to_string(&path) {
            sections.push(format!("File: {path}\n{}\n", head(&content, SOURCE_CONTEXT_CHARS)));
        }
    }

    sections.join("\n---\n")
}

fn head(content: &str, limit: usize) -> String {
    content.chars().take(limit).collect()
}

fn is_visible_directory(name: &str) -> bool {
    !name.starts_with('.') && !SKIPPED_DIRECTORIES.contains(&name)
}

fn sorted_entries(dir: &Dir) -> Vec<(String, bool)> {
    let Ok(entries) = dir.entries() else {
        return Vec::new();
    };
    let mut listed: Vec<(String, bool)> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name().ok()?;
            let is_dir = entry.file_type().ok()?.is_dir();
            Some((name, is_dir))
        })
        .collect();
    listed.sort();
    listed
}

fn collect_sources(dir: &Dir, prefix: &Utf8Path, found: &mut Vec<Utf8PathBuf>) {
    for (name, is_dir) in sorted_entries(dir) {
        if found.len() >= SOURCE_CONTEXT_FILES {
            return;
        }
        let path = prefix.join(&name);
        if is_dir {
            let subdirectory = Some(&name)
                .filter(|candidate| is_visible_directory(candidate))
                .and_then(|candidate| dir.open_dir(candidate).ok());
            if let Some(child) = subdirectory {
                collect_sources(&child, &path, found);
                found.truncate(SOURCE_CONTEXT_FILES);
            }
        } else if path
            .extension()
            .is_some_and(|extension| SOURCE_EXTENSIONS.contains(&extension))
        {
            found.push(path);
        }
    }
}
