// Remote service launch over SSH

use anyhow::{Context, Result};
use tokio::process::Command;

/// Run a command on a list of hosts.
///
/// With `wait` the call blocks until every host finishes and reports the
/// first failure; without it the processes are left running (gateways and
/// init scripts daemonize themselves).
pub async fn run_on_hosts(
    hosts: &[String],
    cmd: &[String],
    user: Option<&str>,
    wait: bool,
) -> Result<()> {
    let mut children = Vec::new();
    for host in hosts {
        let target = match user {
            Some(user) => format!("{user}@{host}"),
            None => host.clone(),
        };
        let child = Command::new("ssh")
            .arg(&target)
            .args(cmd)
            .spawn()
            .with_context(|| format!("failed to spawn ssh to {target}"))?;
        children.push((host.clone(), child));
    }

    if wait {
        for (host, mut child) in children {
            let status = child
                .wait()
                .await
                .with_context(|| format!("ssh to {host} did not finish"))?;
            if !status.success() {
                anyhow::bail!("command failed on {host}: {status}");
            }
        }
    }
    Ok(())
}

/// Convenience: every element as an owned String
pub fn cmdline(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| (*s).to_string()).collect()
}
