// ABOUTME: Deployment source refresh - runs `git pull origin <branch>`
// ABOUTME: Called by the trigger before every sync run

use anyhow::{bail, Context, Result};
use std::path::Path;
use tokio::process::Command;
use which::which;

/// Reject branch names git would read as an option or that cannot be a ref.
pub fn validate_branch(branch: &str) -> Result<()> {
    if branch.trim().is_empty() {
        bail!("Branch name cannot be empty");
    }
    if branch.starts_with('-') {
        bail!("Invalid branch name '{}': must not start with '-'", branch);
    }
    if branch.chars().any(|c| c.is_whitespace() || c.is_control()) {
        bail!("Invalid branch name '{}': contains whitespace", branch);
    }
    Ok(())
}

/// Pull `branch` from `origin` into the working tree at `repo_dir`.
pub async fn pull(repo_dir: &Path, branch: &str) -> Result<()> {
    validate_branch(branch)?;
    let git = which("git").context("git executable not found in PATH")?;

    tracing::info!("Pulling origin/{} into {:?}", branch, repo_dir);
    let output = Command::new(git)
        .arg("pull")
        .arg("origin")
        .arg(branch)
        .current_dir(repo_dir)
        .output()
        .await
        .context("Failed to run git pull")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "git pull origin {} exited with {}: {}",
            branch,
            output.status,
            stderr.trim()
        );
    }

    tracing::debug!("{}", String::from_utf8_lossy(&output.stdout).trim());
    Ok(())
}
