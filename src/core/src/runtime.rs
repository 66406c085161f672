//! Image-runtime runner: lists and removes images through a
//! docker-compatible command line.

use std::collections::HashSet;

use crate::error::Result;
use crate::exec::{run_checked, CommandRunner, CommandSpec};

const PRESENT_FORMAT: &str = "{{.ID}}\t{{.Repository}}\t{{.Tag}}\t{{.Size}}";
const DANGLING_FORMAT: &str = "{{.ID}}\t{{.Size}}";

/// Placeholder the runtime prints for a missing repository or tag.
const NONE: &str = "<none>";

/// An image known to the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEntry {
    /// `repository:tag` for tagged images, the image ID for untagged ones
    pub reference: String,
    /// Size as reported by the runtime, 0 when it could not be parsed
    pub size_bytes: u64,
}

/// Non-dangling images split by whether they carry a tag.
///
/// An image pulled by digest has a repository but no tag and is not
/// dangling, yet `repo:<none>` is not a reference `rmi` accepts. Such images
/// are listed by ID under `untagged` instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageInventory {
    pub tagged: Vec<ImageEntry>,
    pub untagged: Vec<ImageEntry>,
}

/// Container runtime driven through its CLI (`docker`, `podman`, ...).
pub struct ImageRuntime<'a> {
    bin: String,
    runner: &'a dyn CommandRunner,
}

impl<'a> ImageRuntime<'a> {
    pub fn new(bin: impl Into<String>, runner: &'a dyn CommandRunner) -> Self {
        Self {
            bin: bin.into(),
            runner,
        }
    }

    async fn query(&self, filter: &str, format: &str) -> Result<Vec<String>> {
        let spec = CommandSpec::new(&self.bin).args([
            "images",
            "--filter",
            filter,
            "--format",
            format,
        ]);
        let output = run_checked(self.runner, &spec).await?;
        Ok(output.stdout_lines().map(str::to_string).collect())
    }

    /// Images currently present that are not dangling.
    pub async fn list_images(&self) -> Result<ImageInventory> {
        let lines = self.query("dangling=false", PRESENT_FORMAT).await?;

        let mut inventory = ImageInventory::default();
        let mut seen = HashSet::new();
        let mut untagged = Vec::new();
        for line in &lines {
            let Some(row) = parse_present(line) else {
                continue;
            };
            match row.reference {
                Some(reference) => {
                    if seen.insert(reference.clone()) {
                        inventory.tagged.push(ImageEntry {
                            reference,
                            size_bytes: row.size_bytes,
                        });
                    }
                    seen.insert(row.id.clone());
                }
                None => untagged.push((row.id, row.size_bytes)),
            }
        }

        // An ID that also has a tagged row is removed through its tags.
        for (id, size_bytes) in untagged {
            if seen.insert(id.clone()) {
                inventory.untagged.push(ImageEntry {
                    reference: id,
                    size_bytes,
                });
            }
        }
        Ok(inventory)
    }

    /// Dangling images, identified by image ID.
    pub async fn list_dangling_images(&self) -> Result<Vec<ImageEntry>> {
        let lines = self.query("dangling=true", DANGLING_FORMAT).await?;
        let mut seen = HashSet::new();
        Ok(lines
            .iter()
            .filter_map(|line| parse_entry(line))
            .filter(|entry| seen.insert(entry.reference.clone()))
            .collect())
    }

    pub async fn remove_image(&self, reference: &str) -> Result<()> {
        let spec = CommandSpec::new(&self.bin).args(["rmi", reference]);
        run_checked(self.runner, &spec).await?;
        tracing::info!("Removed: {reference}");
        Ok(())
    }

    /// Remove images one at a time, stopping at the first failure.
    /// Returns the number removed.
    pub async fn remove_images<'r, I>(&self, references: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'r str>,
    {
        let mut count = 0;
        for reference in references {
            self.remove_image(reference).await?;
            count += 1;
        }
        Ok(count)
    }

    /// Remove dangling images left behind once their children are gone.
    pub async fn prune(&self) -> Result<()> {
        let spec = CommandSpec::new(&self.bin).args(["image", "prune", "-f"]);
        let output = run_checked(self.runner, &spec).await?;
        for line in output.stdout_lines() {
            tracing::debug!("prune: {line}");
        }
        Ok(())
    }
}

/// One row of the present-images listing.
struct PresentRow {
    id: String,
    /// `None` when the repository or tag is missing
    reference: Option<String>,
    size_bytes: u64,
}

/// Parse one `id<TAB>repository<TAB>tag<TAB>size` listing line.
fn parse_present(line: &str) -> Option<PresentRow> {
    let mut fields = line.split('\t').map(str::trim);
    let id = fields.next().filter(|id| !id.is_empty())?;
    let repository = fields.next().unwrap_or(NONE);
    let tag = fields.next().unwrap_or(NONE);
    let size = fields.next().unwrap_or("");

    let reference = if repository.is_empty() || tag.is_empty() || repository == NONE || tag == NONE {
        None
    } else {
        Some(format!("{repository}:{tag}"))
    };

    Some(PresentRow {
        id: id.to_string(),
        reference,
        size_bytes: parse_size(size).unwrap_or(0),
    })
}

/// Parse one `reference<TAB>size` listing line.
fn parse_entry(line: &str) -> Option<ImageEntry> {
    let (reference, size) = match line.split_once('\t') {
        Some((reference, size)) => (reference.trim(), size.trim()),
        None => (line.trim(), ""),
    };
    if reference.is_empty() {
        return None;
    }
    Some(ImageEntry {
        reference: reference.to_string(),
        size_bytes: parse_size(size).unwrap_or(0),
    })
}

/// Parse a runtime size such as `1.2GB`, `345MB`, `12.3kB` or `512B` into
/// bytes. Units are decimal (SI), matching docker's output.
pub fn parse_size(s: &str) -> Option<u64> {
    let s = s.trim().to_lowercase();
    if s.is_empty() {
        return None;
    }

    const KB: f64 = 1000.0;
    const MB: f64 = 1000.0 * KB;
    const GB: f64 = 1000.0 * MB;
    const TB: f64 = 1000.0 * GB;

    let (num_str, multiplier) = if let Some(n) = s.strip_suffix("tb") {
        (n, TB)
    } else if let Some(n) = s.strip_suffix("gb") {
        (n, GB)
    } else if let Some(n) = s.strip_suffix("mb") {
        (n, MB)
    } else if let Some(n) = s.strip_suffix("kb") {
        (n, KB)
    } else if let Some(n) = s.strip_suffix('b') {
        (n, 1.0)
    } else {
        (s.as_str(), 1.0)
    };

    let num: f64 = num_str.trim().parse().ok()?;
    if !num.is_finite() || num < 0.0 {
        return None;
    }
    Some((num * multiplier).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PurgeError;
    use crate::exec::testing::ScriptedRunner;

    const PRESENT: &str =
        "docker images --filter dangling=false --format {{.ID}}\t{{.Repository}}\t{{.Tag}}\t{{.Size}}";
    const DANGLING: &str = "docker images --filter dangling=true --format {{.ID}}\t{{.Size}}";

    #[test]
    fn test_parse_size_units() {
        assert_eq!(parse_size("512B"), Some(512));
        assert_eq!(parse_size("12.3kB"), Some(12_300));
        assert_eq!(parse_size("345MB"), Some(345_000_000));
        assert_eq!(parse_size("1.2GB"), Some(1_200_000_000));
        assert_eq!(parse_size("2TB"), Some(2_000_000_000_000));
        assert_eq!(parse_size("77"), Some(77));
    }

    #[test]
    fn test_parse_size_invalid() {
        assert_eq!(parse_size(""), None);
        assert_eq!(parse_size("N/A"), None);
        assert_eq!(parse_size("-1MB"), None);
    }

    #[test]
    fn test_parse_entry_without_size() {
        let entry = parse_entry("alpine:3.19").unwrap();
        assert_eq!(entry.reference, "alpine:3.19");
        assert_eq!(entry.size_bytes, 0);
        assert!(parse_entry("\t1MB").is_none());
    }

    #[test]
    fn test_parse_present_tagged() {
        let row = parse_present("0123abcd\talpine\t3.19\t7.4MB").unwrap();
        assert_eq!(row.id, "0123abcd");
        assert_eq!(row.reference.as_deref(), Some("alpine:3.19"));
        assert_eq!(row.size_bytes, 7_400_000);
    }

    #[test]
    fn test_parse_present_missing_tag() {
        let row = parse_present("0123abcd\talpine\t<none>\t5MB").unwrap();
        assert_eq!(row.reference, None);
        let row = parse_present("0123abcd\t<none>\t<none>\t5MB").unwrap();
        assert_eq!(row.reference, None);
        assert!(parse_present("").is_none());
    }

    #[tokio::test]
    async fn test_list_images() {
        let runner = ScriptedRunner::new().ok(PRESENT, "id1\ta\t1\t1.5MB\nid2\tb\t2\t2kB\n");
        let runtime = ImageRuntime::new("docker", &runner);
        let inventory = runtime.list_images().await.unwrap();
        assert_eq!(
            inventory.tagged,
            vec![
                ImageEntry {
                    reference: "a:1".to_string(),
                    size_bytes: 1_500_000,
                },
                ImageEntry {
                    reference: "b:2".to_string(),
                    size_bytes: 2_000,
                },
            ]
        );
        assert!(inventory.untagged.is_empty());
    }

    #[tokio::test]
    async fn test_digest_pulled_image_listed_by_id() {
        let runner = ScriptedRunner::new().ok(PRESENT, "id1\ta\t1\t1MB\nid9\talpine\t<none>\t5MB\n");
        let runtime = ImageRuntime::new("docker", &runner);
        let inventory = runtime.list_images().await.unwrap();
        let tagged: Vec<&str> = inventory.tagged.iter().map(|i| i.reference.as_str()).collect();
        assert_eq!(tagged, vec!["a:1"]);
        assert_eq!(
            inventory.untagged,
            vec![ImageEntry {
                reference: "id9".to_string(),
                size_bytes: 5_000_000,
            }]
        );
    }

    #[tokio::test]
    async fn test_untagged_row_of_tagged_image_skipped() {
        let runner = ScriptedRunner::new().ok(PRESENT, "id1\talpine\t<none>\t5MB\nid1\talpine\t3.19\t5MB\n");
        let runtime = ImageRuntime::new("docker", &runner);
        let inventory = runtime.list_images().await.unwrap();
        assert_eq!(inventory.tagged.len(), 1);
        assert!(inventory.untagged.is_empty());
    }

    #[tokio::test]
    async fn test_list_dangling_collapses_duplicate_ids() {
        let runner = ScriptedRunner::new().ok(DANGLING, "0123abcd\t10MB\n0123abcd\t10MB\nfeed\t1MB\n");
        let runtime = ImageRuntime::new("docker", &runner);
        let images = runtime.list_dangling_images().await.unwrap();
        let refs: Vec<&str> = images.iter().map(|i| i.reference.as_str()).collect();
        assert_eq!(refs, vec!["0123abcd", "feed"]);
    }

    #[tokio::test]
    async fn test_list_failure_is_fatal() {
        let runner = ScriptedRunner::new().fail(PRESENT, "Cannot connect to the Docker daemon");
        let runtime = ImageRuntime::new("docker", &runner);
        let err = runtime.list_images().await.unwrap_err();
        match err {
            PurgeError::CommandFailed { stderr, .. } => {
                assert!(stderr.contains("Docker daemon"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_remove_images_in_order() {
        let runner = ScriptedRunner::new();
        let runtime = ImageRuntime::new("podman", &runner);
        let removed = runtime.remove_images(["b:2", "dev:3"]).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(runner.call_lines(), vec!["podman rmi b:2", "podman rmi dev:3"]);
    }

    #[tokio::test]
    async fn test_prune() {
        let runner = ScriptedRunner::new().ok("docker image prune -f", "Total reclaimed space: 0B\n");
        let runtime = ImageRuntime::new("docker", &runner);
        runtime.prune().await.unwrap();
        assert_eq!(runner.call_lines(), vec!["docker image prune -f"]);
    }

    #[tokio::test]
    async fn test_remove_stops_at_first_failure() {
        let runner = ScriptedRunner::new().fail("docker rmi b:2", "image is being used");
        let runtime = ImageRuntime::new("docker", &runner);
        let err = runtime.remove_images(["a:1", "b:2", "c:3"]).await.unwrap_err();
        assert!(err.to_string().contains("docker rmi b:2"));
        assert_eq!(runner.calls().len(), 2);
    }
}
