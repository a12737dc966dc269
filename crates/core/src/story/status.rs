//! Story status collaborator and story file lookup.

use async_trait::async_trait;
use sc_protocol::OpResult;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Writes a new status into a story file.
#[async_trait]
pub trait StoryStatusUpdater: Send + Sync {
    async fn update_story_status(&self, file_path: &str, new_status: &str) -> OpResult;
}

/// Rewrites the status of a story markdown file in place.
///
/// Understands, in this order:
/// - a `status:` key in YAML front matter
/// - a `Status: <value>` line (optionally bold)
/// - a `## Status` heading followed by the value on the next non-empty line
#[derive(Debug, Clone)]
pub struct StoryFileStatus {
    project_root: PathBuf,
}

impl StoryFileStatus {
    /// Relative story paths are resolved against `project_root`.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
        }
    }

    fn resolve(&self, file_path: &str) -> PathBuf {
        let path = Path::new(file_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }
}

#[async_trait]
impl StoryStatusUpdater for StoryFileStatus {
    async fn update_story_status(&self, file_path: &str, new_status: &str) -> OpResult {
        let path = self.resolve(file_path);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => return OpResult::failed(format!("{}: {e}", path.display())),
        };

        let Some(updated) = rewrite_status(&content, new_status) else {
            return OpResult::failed(format!("{}: no status field found", path.display()));
        };

        match tokio::fs::write(&path, updated).await {
            Ok(()) => {
                debug!(path = %path.display(), new_status, "Updated story status");
                OpResult::ok()
            }
            Err(e) => OpResult::failed(format!("{}: {e}", path.display())),
        }
    }
}

/// Return `content` with its status replaced, or `None` when it has none.
pub fn rewrite_status(content: &str, new_status: &str) -> Option<String> {
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();

    let target = front_matter_status(&lines)
        .or_else(|| inline_status(&lines))
        .or_else(|| heading_status(&lines))?;

    let (index, prefix) = target;
    lines[index] = format!("{prefix}{new_status}");

    let mut out = lines.join("\n");
    if content.ends_with('\n') {
        out.push('\n');
    }
    Some(out)
}

/// Line index and the prefix to keep, for `status:` inside front matter.
fn front_matter_status(lines: &[String]) -> Option<(usize, String)> {
    if lines.first().map(|l| l.trim_end()) != Some("---") {
        return None;
    }
    let end = lines
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, l)| l.trim_end() == "---")
        .map(|(idx, _)| idx)?;

    lines[1..end].iter().enumerate().find_map(|(offset, line)| {
        let rest = line.strip_prefix("status:")?;
        let spaces = rest.len() - rest.trim_start().len();
        Some((offset + 1, format!("status:{}", " ".repeat(spaces.max(1)))))
    })
}

fn inline_status(lines: &[String]) -> Option<(usize, String)> {
    lines.iter().enumerate().find_map(|(idx, line)| {
        let trimmed = line.trim_start();
        let indent = &line[..line.len() - trimmed.len()];
        for label in ["**Status:**", "**Status**:", "Status:"] {
            if let Some(rest) = trimmed.strip_prefix(label) {
                let spaces = rest.len() - rest.trim_start().len();
                return Some((idx, format!("{indent}{label}{}", " ".repeat(spaces.max(1)))));
            }
        }
        None
    })
}

fn heading_status(lines: &[String]) -> Option<(usize, String)> {
    let heading = lines.iter().position(|line| {
        let trimmed = line.trim();
        trimmed.starts_with('#') && trimmed.trim_start_matches('#').trim() == "Status"
    })?;

    lines
        .iter()
        .enumerate()
        .skip(heading + 1)
        .find(|(_, line)| !line.trim().is_empty())
        .filter(|(_, line)| !line.trim_start().starts_with('#'))
        .map(|(idx, _)| (idx, String::new()))
}

/// Locate the markdown file of `story_id` under `stories_dir`.
///
/// An exact `<story_id>.md` wins; otherwise the first file (in path order)
/// whose name starts with the story id.
pub fn find_story_file(stories_dir: &Path, story_id: &str) -> Option<PathBuf> {
    let exact = format!("{story_id}.md");
    let mut candidates: Vec<PathBuf> = WalkDir::new(stories_dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy();
            name.ends_with(".md") && name.starts_with(story_id)
        })
        .map(walkdir::DirEntry::into_path)
        .collect();

    candidates.sort();
    candidates
        .iter()
        .find(|path| path.file_name().is_some_and(|name| name == exact.as_str()))
        .or_else(|| candidates.first())
        .cloned()
}
