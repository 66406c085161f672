//! `image-purge` command: check out each branch, collect the images it
//! lists, and remove every other local image the pattern rules allow.

use std::path::PathBuf;

use clap::Args;

use image_purge_core::config::split_branches;
use image_purge_core::{PurgeConfig, Purger, RemovalPlan, SystemRunner};

use crate::output;

#[derive(Args, Debug, Default)]
pub struct PurgeArgs {
    /// YAML file with default options; flags override its values
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Repository working copy to check branches out in
    #[arg(long, value_name = "PATH")]
    pub repo_location: Option<PathBuf>,

    /// Bash command run on each branch, printing the images to keep one per line
    #[arg(long, value_name = "CMD")]
    pub list_images_cmd: Option<String>,

    /// Keep all images listed on these branches. Delimit using ','
    #[arg(long, value_name = "BRANCHES")]
    pub keep_from_branches: Option<String>,

    /// Keep any image matching this pattern
    #[arg(long, value_name = "REGEX")]
    pub keep_image_pattern: Option<String>,

    /// Only remove images matching this pattern
    #[arg(long, value_name = "REGEX")]
    pub only_image_pattern: Option<String>,

    /// Always remove images matching this pattern. Relative priority: keep > always > only
    #[arg(long, value_name = "REGEX")]
    pub always_remove_pattern: Option<String>,

    /// Remove dangling and tag-less images too, then prune the runtime
    #[arg(long, overrides_with = "no_remove_dangling")]
    pub remove_dangling: bool,

    /// Leave dangling images alone, even if the config file enables it
    #[arg(long, overrides_with = "remove_dangling")]
    pub no_remove_dangling: bool,

    /// Skip the uncommitted-changes check on the repository
    #[arg(long, overrides_with = "no_allow_dirty")]
    pub allow_dirty: bool,

    /// Refuse a repository with uncommitted changes, even if the config file allows it
    #[arg(long, overrides_with = "allow_dirty")]
    pub no_allow_dirty: bool,

    /// Print what would be removed without removing anything
    #[arg(long, overrides_with = "no_dry_run")]
    pub dry_run: bool,

    /// Remove images even if the config file asks for a dry run
    #[arg(long, overrides_with = "dry_run")]
    pub no_dry_run: bool,

    /// Container runtime executable (docker-compatible)
    #[arg(long, value_name = "BIN")]
    pub runtime_bin: Option<String>,

    /// Git executable
    #[arg(long, value_name = "BIN")]
    pub git_bin: Option<String>,
}

impl PurgeArgs {
    /// Options given on the command line, unvalidated.
    fn to_config(&self) -> PurgeConfig {
        PurgeConfig {
            repo_location: self.repo_location.clone(),
            list_images_cmd: self.list_images_cmd.clone(),
            keep_from_branches: self
                .keep_from_branches
                .as_deref()
                .map(split_branches)
                .unwrap_or_default(),
            keep_image_pattern: self.keep_image_pattern.clone(),
            only_image_pattern: self.only_image_pattern.clone(),
            always_remove_pattern: self.always_remove_pattern.clone(),
            remove_dangling: switch(self.remove_dangling, self.no_remove_dangling),
            allow_dirty: switch(self.allow_dirty, self.no_allow_dirty),
            dry_run: switch(self.dry_run, self.no_dry_run),
            runtime_bin: self.runtime_bin.clone(),
            git_bin: self.git_bin.clone(),
        }
    }
}

/// A `--flag`/`--no-flag` pair; `None` when neither was given.
fn switch(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (false, true) => Some(false),
        (false, false) => None,
    }
}

pub async fn execute(args: PurgeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let base = match args.config {
        Some(ref path) => PurgeConfig::load(path)?,
        None => PurgeConfig::default(),
    };
    let options = base.merge(args.to_config()).validate()?;

    let runner = SystemRunner;
    let purger = Purger::new(&options, &runner)?;
    let plan = purger.plan().await?;

    if plan.is_empty() {
        println!("No images to remove.");
        return Ok(());
    }

    print_plan(&plan);

    if options.dry_run {
        println!();
        println!("Dry run: nothing was removed.");
        return Ok(());
    }

    tracing::warn!("Removing {} image(s)", plan.len());
    let count = purger.execute(&plan).await?;
    println!("Removed {count} image(s)");

    Ok(())
}

fn print_plan(plan: &RemovalPlan) {
    let mut table = output::new_table(&["REFERENCE", "SIZE", "REASON"]);
    for (reference, removal) in &plan.removals {
        table.add_row(vec![
            reference.clone(),
            output::format_bytes(removal.size_bytes),
            removal.reason.to_string(),
        ]);
    }
    println!("{table}");
    println!();
    println!(
        "Total size is {} (including likely layer overlaps).",
        output::format_bytes(plan.estimated_size())
    );
}
