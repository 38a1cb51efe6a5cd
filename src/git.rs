//! Staged changes of a git repository.

use std::path::Path;

use anyhow::{Context, Result};
use git2::{Diff, DiffFormat, DiffOptions, Repository};
use tracing::debug;

/// Git repository wrapper
pub struct GitRepository {
    repo: Repository,
}

impl GitRepository {
    /// Open the repository containing the current directory
    pub fn open() -> Result<Self> {
        Self::open_at(".")
    }

    /// Open the repository containing the given path
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        let repo = Repository::discover(path).context("Not in a git repository")?;

        Ok(Self { repo })
    }

    /// Get workdir path
    pub fn workdir(&self) -> Option<&Path> {
        self.repo.workdir()
    }

    /// Diff of the index against `HEAD`, or against the empty tree on an
    /// unborn branch.
    fn staged(&self) -> Result<Diff<'_>> {
        let head_tree = match self.repo.head() {
            Ok(head) => Some(head.peel_to_tree().context("Failed to resolve HEAD tree")?),
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => None,
            Err(e) => return Err(e).context("Failed to get HEAD reference"),
        };
        let mut index = self.repo.index().context("Failed to read index")?;
        index.read(true).context("Failed to reload index")?;

        let mut options = DiffOptions::new();
        options.include_typechange(true);
        self.repo
            .diff_tree_to_index(head_tree.as_ref(), Some(&index), Some(&mut options))
            .context("Failed to diff index against HEAD")
    }

    /// Unified patch of the staged changes, `None` when nothing is staged.
    pub fn staged_diff(&self) -> Result<Option<String>> {
        let diff = self.staged()?;
        if diff.deltas().len() == 0 {
            return Ok(None);
        }

        let mut patch = String::new();
        diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
            if let origin @ ('+' | '-' | ' ') = line.origin() {
                patch.push(origin);
            }
            patch.push_str(&String::from_utf8_lossy(line.content()));
            true
        })
        .context("Failed to render staged diff")?;

        debug!(diff_len = patch.len(), "Rendered staged diff");
        Ok(Some(patch))
    }

    /// Paths of the staged files.
    pub fn staged_files(&self) -> Result<Vec<String>> {
        let diff = self.staged()?;
        let files = diff
            .deltas()
            .filter_map(|delta| {
                delta
                    .new_file()
                    .path()
                    .or_else(|| delta.old_file().path())
                    .map(|p| p.to_string_lossy().into_owned())
            })
            .collect();
        Ok(files)
    }
}
