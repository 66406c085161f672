//! One purge run: collect keep lists, plan, delete.

use crate::config::PurgeOptions;
use crate::error::Result;
use crate::exec::CommandRunner;
use crate::runtime::ImageRuntime;
use crate::selection::{RemovalPlan, SelectionRules};
use crate::vcs::GitRepo;

/// Drives the version-control and image runtimes for one invocation.
pub struct Purger<'a> {
    options: &'a PurgeOptions,
    rules: SelectionRules,
    repo: GitRepo<'a>,
    runtime: ImageRuntime<'a>,
}

impl<'a> Purger<'a> {
    /// Compile the rules. Pattern errors surface here, before any command runs.
    pub fn new(options: &'a PurgeOptions, runner: &'a dyn CommandRunner) -> Result<Self> {
        Ok(Self {
            options,
            rules: SelectionRules::from_options(options)?,
            repo: GitRepo::new(&options.repo_location, &options.git_bin, runner),
            runtime: ImageRuntime::new(&options.runtime_bin, runner),
        })
    }

    /// Build the removal plan. Leaves the working copy on the last branch.
    pub async fn plan(&self) -> Result<RemovalPlan> {
        if !self.options.allow_dirty {
            self.repo.ensure_clean().await?;
        }

        let keep_set = self
            .repo
            .collect_keep_set(&self.options.keep_from_branches, &self.options.list_images_cmd)
            .await?;
        if keep_set.is_empty() {
            tracing::warn!("No branch listed any image to keep");
        } else {
            tracing::info!("Keep set has {} image(s)", keep_set.len());
        }
        for image in keep_set.sorted() {
            tracing::info!("Will keep image: {image}");
        }

        // Tag-less images are only removable by ID, like dangling ones.
        let inventory = self.runtime.list_images().await?;
        let mut dangling = inventory.untagged;
        if self.rules.remove_dangling {
            dangling.extend(self.runtime.list_dangling_images().await?);
        }

        let plan = self.rules.plan(&inventory.tagged, &dangling, &keep_set);
        for (reference, removal) in &plan.removals {
            tracing::info!("Will remove image: {reference} ({})", removal.reason);
        }
        Ok(plan)
    }

    /// Delete every image in `plan`, in order. The first failure aborts;
    /// images already removed stay removed. With dangling removal enabled,
    /// finishes with a runtime prune to reclaim parents left dangling by
    /// the removals.
    pub async fn execute(&self, plan: &RemovalPlan) -> Result<usize> {
        let count = self.runtime.remove_images(plan.references()).await?;
        if self.rules.remove_dangling {
            self.runtime.prune().await?;
        }
        Ok(count)
    }
}
