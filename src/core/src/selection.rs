//! Selection engine: decides which present images are removed.
//!
//! Precedence, first match wins:
//!
//! 1. listed by a branch (keep set) → keep
//! 2. matches the keep pattern → keep
//! 3. matches the always-remove pattern → remove
//! 4. only pattern set and not matching → keep
//! 5. anything else → remove
//!
//! Dangling images are considered only when dangling removal is enabled and
//! are removed unless kept by rule 1 or 2.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::config::PurgeOptions;
use crate::error::Result;
use crate::pattern::ImagePattern;
use crate::runtime::ImageEntry;

/// Image identifiers listed by the keep command across all branches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeepSet {
    images: HashSet<String>,
}

impl KeepSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, identifier: impl Into<String>) -> bool {
        self.images.insert(identifier.into())
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.images.contains(identifier)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Identifiers in lexical order.
    pub fn sorted(&self) -> Vec<&str> {
        let mut images: Vec<&str> = self.images.iter().map(String::as_str).collect();
        images.sort_unstable();
        images
    }
}

impl<S: Into<String>> Extend<S> for KeepSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        self.images.extend(iter.into_iter().map(Into::into));
    }
}

impl<S: Into<String>> FromIterator<S> for KeepSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = KeepSet::new();
        set.extend(iter);
        set
    }
}

/// Why an image survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepReason {
    /// Listed by the keep command on at least one branch.
    Listed,
    /// Matches the keep pattern.
    Pattern,
    /// The only pattern is set and does not match.
    OutsideScope,
}

/// Why an image is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveReason {
    /// Matches the always-remove pattern.
    AlwaysRemove,
    /// Not listed on any branch.
    Unlisted,
    /// Dangling image with dangling removal enabled.
    Dangling,
}

impl fmt::Display for KeepReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeepReason::Listed => write!(f, "listed on a branch"),
            KeepReason::Pattern => write!(f, "keep pattern"),
            KeepReason::OutsideScope => write!(f, "outside only pattern"),
        }
    }
}

impl fmt::Display for RemoveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoveReason::AlwaysRemove => write!(f, "always-remove pattern"),
            RemoveReason::Unlisted => write!(f, "not listed on any branch"),
            RemoveReason::Dangling => write!(f, "dangling"),
        }
    }
}

/// Keep/remove outcome for one identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Keep(KeepReason),
    Remove(RemoveReason),
}

/// An image scheduled for deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRemoval {
    pub size_bytes: u64,
    pub reason: RemoveReason,
}

/// Result of a selection pass. Both maps are keyed by identifier and
/// ordered, so iteration is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalPlan {
    pub kept: BTreeMap<String, KeepReason>,
    pub removals: BTreeMap<String, PlannedRemoval>,
}

impl RemovalPlan {
    pub fn is_empty(&self) -> bool {
        self.removals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.removals.len()
    }

    /// Identifiers to remove, in deletion order.
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.removals.keys().map(String::as_str)
    }

    /// Sum of reported sizes. Shared layers are counted once per image, so
    /// this overestimates the space actually freed.
    pub fn estimated_size(&self) -> u64 {
        self.removals.values().map(|r| r.size_bytes).sum()
    }
}

/// The pattern rules and dangling flag, compiled once per run.
#[derive(Debug, Clone, Default)]
pub struct SelectionRules {
    pub keep: Option<ImagePattern>,
    pub only: Option<ImagePattern>,
    pub always_remove: Option<ImagePattern>,
    pub remove_dangling: bool,
}

impl SelectionRules {
    /// Compile the patterns of validated options.
    pub fn from_options(config: &PurgeOptions) -> Result<Self> {
        let rules = Self {
            keep: ImagePattern::optional("keep", config.keep_image_pattern.as_deref())?,
            only: ImagePattern::optional("only", config.only_image_pattern.as_deref())?,
            always_remove: ImagePattern::optional(
                "always-remove",
                config.always_remove_pattern.as_deref(),
            )?,
            remove_dangling: config.remove_dangling,
        };
        for (name, pattern) in [
            ("keep", &rules.keep),
            ("only", &rules.only),
            ("always-remove", &rules.always_remove),
        ] {
            if let Some(pattern) = pattern {
                tracing::debug!("Using {name} pattern: {}", pattern.as_str());
            }
        }
        Ok(rules)
    }

    fn kept_explicitly(&self, identifier: &str, keep_set: &KeepSet) -> Option<KeepReason> {
        if keep_set.contains(identifier) {
            return Some(KeepReason::Listed);
        }
        if self.keep.as_ref().is_some_and(|p| p.is_match(identifier)) {
            return Some(KeepReason::Pattern);
        }
        None
    }

    /// Decide a single present image.
    pub fn decide(&self, identifier: &str, keep_set: &KeepSet) -> Decision {
        if let Some(reason) = self.kept_explicitly(identifier, keep_set) {
            return Decision::Keep(reason);
        }
        if self
            .always_remove
            .as_ref()
            .is_some_and(|p| p.is_match(identifier))
        {
            return Decision::Remove(RemoveReason::AlwaysRemove);
        }
        match self.only {
            Some(ref only) if !only.is_match(identifier) => Decision::Keep(KeepReason::OutsideScope),
            _ => Decision::Remove(RemoveReason::Unlisted),
        }
    }

    /// Decide every present image, then add dangling images when enabled.
    ///
    /// Dangling images have no name for the only pattern to scope, so only
    /// the keep set and keep pattern protect them from `--remove-dangling`.
    pub fn plan(&self, present: &[ImageEntry], dangling: &[ImageEntry], keep_set: &KeepSet) -> RemovalPlan {
        let mut plan = RemovalPlan::default();

        for image in present {
            match self.decide(&image.reference, keep_set) {
                Decision::Keep(reason) => {
                    plan.kept.insert(image.reference.clone(), reason);
                }
                Decision::Remove(reason) => {
                    plan.removals.insert(
                        image.reference.clone(),
                        PlannedRemoval {
                            size_bytes: image.size_bytes,
                            reason,
                        },
                    );
                }
            }
        }

        for image in dangling {
            tracing::warn!(
                "Dangling (remove={}): {}",
                self.remove_dangling,
                image.reference
            );
            if !self.remove_dangling || plan.kept.contains_key(&image.reference) {
                continue;
            }
            if let Some(reason) = self.kept_explicitly(&image.reference, keep_set) {
                plan.kept.insert(image.reference.clone(), reason);
                continue;
            }
            plan.removals
                .entry(image.reference.clone())
                .or_insert(PlannedRemoval {
                    size_bytes: image.size_bytes,
                    reason: RemoveReason::Dangling,
                });
        }

        plan
    }
}
