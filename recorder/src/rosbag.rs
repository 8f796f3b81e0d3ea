//! External ROS tools – spawns `rosbag record` and drives `rosnode`.
//!
//! The controller only sees the [`RosTools`] and [`RecordProcess`] traits so
//! the process boundary can be replaced in tests.

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use cc_recorder_common::config::Config;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` exited with {status}")]
    Failed { command: String, status: String },
    #[error("cannot wait for process {pid}: {source}")]
    Wait {
        pid: u32,
        #[source]
        source: std::io::Error,
    },
}

/// A running recording owned by the controller.
pub trait RecordProcess: Send {
    fn id(&self) -> u32;

    /// Reaps the process if it has exited.
    fn is_running(&mut self) -> bool;

    /// Ask the recorder to close its bag, escalating to a hard kill once
    /// `grace` has passed.
    fn terminate(&mut self, grace: Duration) -> Result<(), ToolError>;
}

/// The three external operations the controller needs.
pub trait RosTools: Send {
    fn spawn_record(
        &self,
        dir: &Path,
        bag_file: &str,
        topics: &[String],
    ) -> Result<Box<dyn RecordProcess>, ToolError>;

    /// Names of all running nodes, one per entry.
    fn list_nodes(&self) -> Result<Vec<String>, ToolError>;

    fn kill_node(&self, name: &str) -> Result<(), ToolError>;
}

/// Arguments for `rosbag`: `record -O <bag_file> <topic>...`
pub fn record_args(bag_file: &str, topics: &[String]) -> Vec<String> {
    let mut args = Vec::with_capacity(topics.len() + 3);
    args.push("record".to_string());
    args.push("-O".to_string());
    args.push(bag_file.to_string());
    args.extend(topics.iter().cloned());
    args
}

/// Entries of a node listing that start with `prefix`.
pub fn matching_nodes<'a>(nodes: &'a [String], prefix: &str) -> Vec<&'a str> {
    nodes
        .iter()
        .map(|n| n.as_str())
        .filter(|n| n.starts_with(prefix))
        .collect()
}

// ── command-line implementation ──────────────────────────────────────────

/// Calls the configured `rosbag` / `rosnode` binaries.
pub struct RosCli {
    rosbag_bin: String,
    rosnode_bin: String,
}

impl RosCli {
    pub fn from_config(config: &Config) -> Self {
        RosCli {
            rosbag_bin: config.rosbag_bin.clone(),
            rosnode_bin: config.rosnode_bin.clone(),
        }
    }

    fn rosnode(&self, args: &[&str]) -> Result<String, ToolError> {
        let command = format!("{} {}", self.rosnode_bin, args.join(" "));
        let output = Command::new(&self.rosnode_bin)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ToolError::Spawn {
                program: self.rosnode_bin.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.trim().is_empty() {
                warn!("[{command}] {}", stderr.trim());
            }
            return Err(ToolError::Failed {
                command,
                status: output.status.to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl RosTools for RosCli {
    fn spawn_record(
        &self,
        dir: &Path,
        bag_file: &str,
        topics: &[String],
    ) -> Result<Box<dyn RecordProcess>, ToolError> {
        let args = record_args(bag_file, topics);

        let mut cmd = Command::new(&self.rosbag_bin);
        cmd.args(&args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        // Own process group, so SIGINT also reaches the `record` node
        // that `rosbag` starts underneath itself.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        info!(
            "Spawning: {} {} (cwd={})",
            self.rosbag_bin,
            args.join(" "),
            dir.display()
        );

        let mut child = cmd.spawn().map_err(|source| ToolError::Spawn {
            program: self.rosbag_bin.clone(),
            source,
        })?;

        // Drain stderr so the pipe never fills up and blocks rosbag.
        if let Some(stderr) = child.stderr.take() {
            std::thread::Builder::new()
                .name("rosbag-stderr".into())
                .spawn(move || {
                    let reader = BufReader::new(stderr);
                    for line in reader.lines() {
                        match line {
                            Ok(l) if l.is_empty() => {}
                            Ok(l) => warn!("[rosbag] {l}"),
                            Err(_) => break,
                        }
                    }
                    debug!("rosbag stderr stream ended");
                })
                .ok();
        }

        info!("rosbag record started (pid={})", child.id());
        Ok(Box::new(ChildRecording { child }))
    }

    fn list_nodes(&self) -> Result<Vec<String>, ToolError> {
        let stdout = self.rosnode(&["list"])?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn kill_node(&self, name: &str) -> Result<(), ToolError> {
        self.rosnode(&["kill", name]).map(|_| ())
    }
}

/// `rosbag record` child process.
struct ChildRecording {
    child: Child,
}

impl ChildRecording {
    #[cfg(unix)]
    fn signal_group(&self, signal: libc::c_int) {
        let pgid = self.child.id() as libc::pid_t;
        // SAFETY: kill(2) with a negative pid only signals our own process group.
        let rc = unsafe { libc::kill(-pgid, signal) };
        if rc != 0 {
            debug!(
                "kill(-{pgid}, {signal}) failed: {}",
                std::io::Error::last_os_error()
            );
        }
    }
}

impl RecordProcess for ChildRecording {
    fn id(&self) -> u32 {
        self.child.id()
    }

    fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn terminate(&mut self, grace: Duration) -> Result<(), ToolError> {
        let pid = self.child.id();
        let wait_err = |source: std::io::Error| ToolError::Wait { pid, source };

        if let Some(status) = self.child.try_wait().map_err(wait_err)? {
            debug!("rosbag (pid={pid}) had already exited with {status}");
            return Ok(());
        }

        #[cfg(unix)]
        self.signal_group(libc::SIGINT);

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if let Some(status) = self.child.try_wait().map_err(wait_err)? {
                info!("rosbag (pid={pid}) exited with {status}");
                return Ok(());
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        warn!(
            "rosbag (pid={pid}) still running after {}ms, killing",
            grace.as_millis()
        );
        #[cfg(unix)]
        self.signal_group(libc::SIGKILL);
        if let Err(e) = self.child.kill() {
            debug!("kill of rosbag (pid={pid}) failed: {e}");
        }
        let status = self.child.wait().map_err(wait_err)?;
        info!("rosbag (pid={pid}) killed ({status})");
        Ok(())
    }
}
