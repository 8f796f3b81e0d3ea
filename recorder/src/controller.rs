//! The recording controller – owns at most one `rosbag record` child and
//! serves start/stop requests against it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use tracing::{error, info, warn};

use cc_recorder_common::config::Config;
use cc_recorder_common::naming;
use cc_recorder_common::protocol::{RecordingRequest, RecordingResponse, StatusResponse};

use crate::rosbag::{matching_nodes, RecordProcess, RosTools, ToolError};

pub struct RecordingController {
    tools: Box<dyn RosTools>,
    output_dir: PathBuf,
    default_topics: Vec<String>,
    /// Last started bag. Kept after stop so the stop response can name it.
    active_bag_file_name: String,
    recording: Option<Box<dyn RecordProcess>>,
    node_prefix: String,
    stop_grace: Duration,
}

impl RecordingController {
    pub fn new(config: &Config, tools: Box<dyn RosTools>) -> Self {
        Self::new_at(config, tools, naming::local_now())
    }

    /// Builds the controller and makes the one attempt at creating this
    /// run's output directory. A failure is logged and otherwise ignored.
    pub fn new_at(config: &Config, tools: Box<dyn RosTools>, now: NaiveDateTime) -> Self {
        info!(
            "Recording bags to path: {}",
            config.rosbag_base_path.display()
        );

        let output_dir = naming::run_directory(&config.rosbag_base_path, &now);
        match create_run_directory(&output_dir) {
            Ok(()) => info!(
                "Created recording run directory: {}",
                output_dir.display()
            ),
            Err(e) => error!(
                "FAILED TO CREATE recording run directory {}: {e:#}",
                output_dir.display()
            ),
        }

        RecordingController {
            tools,
            output_dir,
            default_topics: Vec::new(),
            active_bag_file_name: String::new(),
            recording: None,
            node_prefix: config.record_node_prefix.clone(),
            stop_grace: config.stop_grace(),
        }
    }

    /// Loads the default channel list. Must succeed before the endpoint is
    /// registered.
    pub fn activate(&mut self, config: &Config) -> Result<()> {
        self.default_topics = config
            .default_topics()
            .context("Cannot register recording endpoint")?
            .to_vec();
        if self.default_topics.is_empty() {
            warn!("DEFAULT_TOPIC_LIST is empty");
        }
        info!("Default topics: {:?}", self.default_topics);
        Ok(())
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn handle(&mut self, request: &RecordingRequest) -> RecordingResponse {
        self.handle_at(request, naming::local_now())
    }

    pub fn handle_at(&mut self, request: &RecordingRequest, now: NaiveDateTime) -> RecordingResponse {
        info!("Received rosbag recording request: {request:?}");
        if request.start_recording {
            self.start(request, now)
        } else {
            self.stop()
        }
    }

    fn start(&mut self, request: &RecordingRequest, now: NaiveDateTime) -> RecordingResponse {
        let topics = if request.use_default_topics {
            self.default_topics.clone()
        } else {
            request.topics_to_record.clone()
        };
        info!("Request start of rosbag recording. Topics: {topics:?}");

        self.active_bag_file_name = naming::bag_file_name(&now);

        if self.recording.is_some() {
            warn!("A recording is already running, stopping it first");
            self.terminate_owned();
        }

        match self
            .tools
            .spawn_record(&self.output_dir, &self.active_bag_file_name, &topics)
        {
            Ok(process) => {
                self.recording = Some(process);
                RecordingResponse {
                    recording_active: true,
                    recording_status: format!(
                        "Started recording to rosbag file: {}",
                        self.active_bag_file_name
                    ),
                    recording_error: None,
                }
            }
            Err(e) => {
                error!("Cannot start rosbag recording: {e}");
                RecordingResponse {
                    recording_active: false,
                    recording_status: format!(
                        "Failed to start recording to rosbag file: {}",
                        self.active_bag_file_name
                    ),
                    recording_error: Some(e.to_string()),
                }
            }
        }
    }

    fn stop(&mut self) -> RecordingResponse {
        info!(
            "Request stop of running rosbag recording: {}",
            self.active_bag_file_name
        );

        self.terminate_owned();

        let recording_error = match self.kill_record_nodes() {
            Ok(killed) => {
                info!("Node cleanup killed {killed} record node(s)");
                None
            }
            Err(e) => {
                error!("Node cleanup failed: {e}");
                Some(e.to_string())
            }
        };

        RecordingResponse {
            recording_active: false,
            recording_status: format!(
                "Finished recording to rosbag file: {}",
                self.active_bag_file_name
            ),
            recording_error,
        }
    }

    /// Stop the child we launched, if any.
    fn terminate_owned(&mut self) {
        if let Some(mut process) = self.recording.take() {
            let pid = process.id();
            if let Err(e) = process.terminate(self.stop_grace) {
                warn!("Cannot terminate rosbag (pid={pid}): {e}");
            }
        }
    }

    /// Kill every node whose name starts with the record prefix. Catches
    /// recorders we no longer hold a handle for. Returns the number killed.
    fn kill_record_nodes(&self) -> Result<usize, ToolError> {
        let nodes = self.tools.list_nodes()?;
        let mut killed = 0;
        for name in matching_nodes(&nodes, &self.node_prefix) {
            match self.tools.kill_node(name) {
                Ok(()) => {
                    info!("Killed node {name}");
                    killed += 1;
                }
                Err(e) => warn!("Cannot kill node {name}: {e}"),
            }
        }
        Ok(killed)
    }

    pub fn status(&mut self) -> StatusResponse {
        let recording_active = match self.recording.as_mut() {
            Some(process) => process.is_running(),
            None => false,
        };
        StatusResponse {
            recording_active,
            active_bag_file_name: self.active_bag_file_name.clone(),
            output_directory: self.output_dir.display().to_string(),
        }
    }

    /// Close any running bag before the process exits.
    pub fn shutdown(&mut self) {
        if self.recording.is_some() {
            info!(
                "Closing active recording {} on shutdown",
                self.active_bag_file_name
            );
            self.terminate_owned();
        }
    }
}

fn create_run_directory(dir: &Path) -> Result<()> {
    if dir.exists() {
        bail!("directory already exists");
    }

    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }
    builder.create(dir).context("directory permissions prevent creation")?;
    Ok(())
}
