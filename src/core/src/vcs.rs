//! Version-control runner: branch checkout and per-branch keep lists.

use std::path::PathBuf;

use crate::error::{PurgeError, Result};
use crate::exec::{run_checked, CommandRunner, CommandSpec};
use crate::selection::KeepSet;

/// A git working copy driven through the `git` command line.
pub struct GitRepo<'a> {
    path: PathBuf,
    git_bin: String,
    runner: &'a dyn CommandRunner,
}

impl<'a> GitRepo<'a> {
    pub fn new(path: impl Into<PathBuf>, git_bin: impl Into<String>, runner: &'a dyn CommandRunner) -> Self {
        Self {
            path: path.into(),
            git_bin: git_bin.into(),
            runner,
        }
    }

    fn git(&self) -> CommandSpec {
        CommandSpec::new(&self.git_bin).current_dir(&self.path)
    }

    /// True when `git diff HEAD` reports anything.
    pub async fn is_dirty(&self) -> Result<bool> {
        let output = run_checked(self.runner, &self.git().args(["diff", "HEAD"])).await?;
        Ok(!output.stdout.trim().is_empty() || !output.stderr.trim().is_empty())
    }

    /// Fail with [`PurgeError::DirtyRepository`] if the working copy has changes.
    pub async fn ensure_clean(&self) -> Result<()> {
        if self.is_dirty().await? {
            return Err(PurgeError::DirtyRepository(self.path.clone()));
        }
        Ok(())
    }

    pub async fn checkout(&self, branch: &str) -> Result<()> {
        tracing::info!("Checking out branch {branch}");
        run_checked(self.runner, &self.git().args(["checkout", branch])).await?;
        Ok(())
    }

    /// Run `list_cmd` under `bash -c` in the working copy and collect the
    /// non-empty lines it prints.
    pub async fn list_images(&self, list_cmd: &str) -> Result<Vec<String>> {
        let spec = CommandSpec::new("bash")
            .args(["-c", list_cmd])
            .current_dir(&self.path);
        let output = run_checked(self.runner, &spec).await?;
        Ok(output.stdout_lines().map(str::to_string).collect())
    }

    /// Check out each branch in turn and union the images it lists.
    ///
    /// Any checkout or listing failure aborts the whole collection. The
    /// working copy is left on the last branch.
    pub async fn collect_keep_set(&self, branches: &[String], list_cmd: &str) -> Result<KeepSet> {
        let mut keep_set = KeepSet::new();
        for branch in branches {
            self.checkout(branch).await?;
            let images = self.list_images(list_cmd).await?;
            tracing::debug!("Branch {branch} lists {} image(s)", images.len());
            keep_set.extend(images);
        }
        Ok(keep_set)
    }
}
