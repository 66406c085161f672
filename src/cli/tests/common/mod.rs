//! Fake `git` and `docker` executables for driving the binary end to end.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::{Mutex, MutexGuard};

use tempfile::TempDir;

/// Serializes tests so no other test thread forks while a script is still
/// open for writing.
static LOCK: Mutex<()> = Mutex::new(());

const FAKE_GIT: &str = r#"#!/bin/sh
STATE="__STATE__"
echo "$*" >> "$STATE/git.log"
case "$1" in
  diff)
    cat "$STATE/dirty" 2>/dev/null
    exit 0
    ;;
  checkout)
    if [ -f "$STATE/branch-$2.txt" ]; then
      echo "$2" > .branch
    else
      echo "error: pathspec '$2' did not match any file(s) known to git" >&2
      exit 1
    fi
    ;;
esac
"#;

const FAKE_DOCKER: &str = r#"#!/bin/sh
STATE="__STATE__"
echo "$*" >> "$STATE/docker.log"
case "$1" in
  images)
    if [ "$3" = "dangling=true" ]; then
      cat "$STATE/dangling.txt" 2>/dev/null
    else
      cat "$STATE/images.txt" 2>/dev/null
    fi
    ;;
  rmi)
    if [ -f "$STATE/fail-rmi" ] && [ "$(cat "$STATE/fail-rmi")" = "$2" ]; then
      echo "Error response from daemon: conflict: unable to remove $2" >&2
      exit 1
    fi
    awk -F '\t' -v r="$2" '$1 != r && ($2 ":" $3) != r' "$STATE/images.txt" > "$STATE/images.tmp"
    mv "$STATE/images.tmp" "$STATE/images.txt"
    awk -F '\t' -v r="$2" '$1 != r' "$STATE/dangling.txt" > "$STATE/dangling.tmp" 2>/dev/null
    mv "$STATE/dangling.tmp" "$STATE/dangling.txt" 2>/dev/null
    echo "$2" >> "$STATE/removed.log"
    echo "Untagged: $2"
    ;;
  image)
    if [ "$2" = "prune" ]; then
      : > "$STATE/dangling.txt"
      echo "Total reclaimed space: 0B"
    fi
    ;;
esac
"#;

/// A temporary repository working copy plus fake runtimes.
pub struct Sandbox {
    _guard: MutexGuard<'static, ()>,
    dir: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        let guard = LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = tempfile::tempdir().expect("create temp dir");
        let sandbox = Sandbox { _guard: guard, dir };

        fs::create_dir(sandbox.repo()).unwrap();
        sandbox.write_script("git", FAKE_GIT);
        sandbox.write_script("docker", FAKE_DOCKER);
        sandbox
    }

    fn write_script(&self, name: &str, template: &str) {
        let path = self.state().join(name);
        let content = template.replace("__STATE__", &self.state().to_string_lossy());
        fs::write(&path, content).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    pub fn state(&self) -> &Path {
        self.dir.path()
    }

    pub fn repo(&self) -> PathBuf {
        self.dir.path().join("repo")
    }

    /// Define a branch and the images its listing command prints.
    pub fn branch(&self, name: &str, images: &[&str]) -> &Self {
        let body: String = images.iter().map(|i| format!("{i}\n")).collect();
        fs::write(self.state().join(format!("branch-{name}.txt")), body).unwrap();
        self
    }

    /// Images the fake runtime reports as present, as `(repo:tag, size)`.
    /// Each gets the ID `img<index>`.
    pub fn images(&self, images: &[(&str, &str)]) -> &Self {
        let body: String = images
            .iter()
            .enumerate()
            .map(|(i, (reference, size))| {
                let (repository, tag) = reference.rsplit_once(':').unwrap_or((*reference, "<none>"));
                format!("img{i}\t{repository}\t{tag}\t{size}\n")
            })
            .collect();
        fs::write(self.state().join("images.txt"), body).unwrap();
        self
    }

    pub fn dangling(&self, images: &[(&str, &str)]) -> &Self {
        fs::write(self.state().join("dangling.txt"), listing(images)).unwrap();
        self
    }

    pub fn make_dirty(&self) -> &Self {
        fs::write(self.state().join("dirty"), "diff --git a/x b/x\n").unwrap();
        self
    }

    pub fn fail_removal_of(&self, reference: &str) -> &Self {
        fs::write(self.state().join("fail-rmi"), reference).unwrap();
        self
    }

    pub fn list_cmd(&self) -> String {
        format!(
            "cat \"{}/branch-$(cat .branch).txt\"",
            self.state().to_string_lossy()
        )
    }

    pub fn removed(&self) -> Vec<String> {
        read_lines(&self.state().join("removed.log"))
    }

    pub fn git_log(&self) -> Vec<String> {
        read_lines(&self.state().join("git.log"))
    }

    pub fn docker_log(&self) -> Vec<String> {
        read_lines(&self.state().join("docker.log"))
    }

    /// Base invocation with the fake executables and required options.
    pub fn command(&self, branches: &str) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_image-purge"));
        cmd.env("RUST_LOG", "info")
            .arg("--git-bin")
            .arg(self.state().join("git"))
            .arg("--runtime-bin")
            .arg(self.state().join("docker"))
            .arg("--repo-location")
            .arg(self.repo())
            .arg("--list-images-cmd")
            .arg(self.list_cmd())
            .arg("--keep-from-branches")
            .arg(branches);
        cmd
    }
}

fn listing(images: &[(&str, &str)]) -> String {
    images
        .iter()
        .map(|(reference, size)| format!("{reference}\t{size}\n"))
        .collect()
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .map(|s| s.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Run `cmd` and return (stdout, stderr, output).
pub fn run(cmd: &mut Command) -> (String, String, Output) {
    let output = cmd.output().expect("failed to run image-purge");
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output)
}
