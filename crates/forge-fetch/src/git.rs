//! Git protocol fallback
//!
//! Used when a repository has to be cloned rather than downloaded as an
//! archive (e.g. to get submodules).

use crate::hash::GitHash;
use std::path::Path;
use std::process::Command;
use thiserror::Error;

/// Errors that can occur while running git
#[derive(Debug, Error)]
pub enum GitError {
    /// git could not be started
    #[error("failed to run git: {0}")]
    Spawn(#[from] std::io::Error),

    /// git exited unsuccessfully
    #[error("'git {command}' failed ({status}): {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
}

/// What to check out after cloning
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloneTarget {
    pub reference: Option<String>,
    pub rev: Option<GitHash>,
}

pub trait GitClient: Send + Sync {
    fn clone_repo(&self, url: &str, target: &CloneTarget, dest: &Path) -> Result<(), GitError>;
}

/// [`GitClient`] that shells out to the `git` binary
#[derive(Debug, Clone, Default)]
pub struct CommandGitClient;

impl CommandGitClient {
    fn run(&self, args: &[&str]) -> Result<(), GitError> {
        let output = Command::new("git").args(args).output()?;
        if !output.status.success() {
            return Err(GitError::Failed {
                command: args.join(" "),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Arguments for the initial `git clone`
pub(crate) fn clone_args<'a>(url: &'a str, target: &'a CloneTarget, dest: &'a str) -> Vec<&'a str> {
    let mut args = vec!["clone"];
    if let Some(reference) = target.reference.as_deref() {
        if reference != "HEAD" {
            args.extend(["--branch", reference]);
        }
    }
    args.extend(["--", url, dest]);
    args
}

impl GitClient for CommandGitClient {
    fn clone_repo(&self, url: &str, target: &CloneTarget, dest: &Path) -> Result<(), GitError> {
        let dest = dest.to_string_lossy();
        self.run(&clone_args(url, target, &dest))?;

        if let Some(rev) = target.rev {
            let rev = rev.to_hex();
            self.run(&["-C", &dest, "checkout", "--quiet", &rev])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_args_with_branch() {
        let target = CloneTarget {
            reference: Some("develop".into()),
            rev: None,
        };
        assert_eq!(
            clone_args("https://github.com/o/r.git", &target, "/tmp/r"),
            vec!["clone", "--branch", "develop", "--", "https://github.com/o/r.git", "/tmp/r"]
        );
    }

    #[test]
    fn test_clone_args_default_branch() {
        let head = CloneTarget {
            reference: Some("HEAD".into()),
            rev: None,
        };
        assert_eq!(
            clone_args("https://git.sr.ht/~sir/hut", &head, "out"),
            vec!["clone", "--", "https://git.sr.ht/~sir/hut", "out"]
        );
        assert_eq!(
            clone_args("u", &CloneTarget::default(), "out"),
            vec!["clone", "--", "u", "out"]
        );
    }

    #[test]
    fn test_failed_command_reports_stderr() {
        let err = CommandGitClient
            .run(&["definitely-not-a-git-subcommand"])
            .unwrap_err();
        // Either git is missing or it rejects the subcommand
        assert!(matches!(err, GitError::Spawn(_) | GitError::Failed { .. }));
    }
}
