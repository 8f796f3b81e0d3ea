//! Configuration parsing – reads a KEY=VALUE file.
//!
//! Lines starting with `#` are comments, values may be double-quoted and
//! unknown keys are ignored, so one file can be shared with other tools.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::info;

/// Recorder service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    // ── recording ────────────────────────────────────────────────────
    /// Base directory; each run gets a timestamped subdirectory.
    pub rosbag_base_path: PathBuf,
    /// Channels recorded when a request asks for the defaults.
    /// Required before the endpoint is registered.
    pub default_topic_list: Option<Vec<String>>,

    // ── idle loop ────────────────────────────────────────────────────
    /// Idle-loop frequency in Hz.
    pub rate: f64,

    // ── endpoint ─────────────────────────────────────────────────────
    pub listen_addr: String,

    // ── external tools ───────────────────────────────────────────────
    pub rosbag_bin: String,
    pub rosnode_bin: String,
    /// Node-name prefix killed during stop cleanup.
    pub record_node_prefix: String,
    /// How long a recording gets to close its bag after SIGINT.
    pub stop_grace_ms: u64,
}

impl Config {
    /// Default config path.
    pub fn default_path() -> &'static str {
        "/etc/cc-recorder/cc-recorder.conf"
    }

    /// `$HOME/cc_rosbags`
    pub fn default_base_path() -> PathBuf {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cc_rosbags")
    }

    /// The configured default channel list, or an error if it was never set.
    pub fn default_topics(&self) -> Result<&[String]> {
        match &self.default_topic_list {
            Some(topics) => Ok(topics),
            None => bail!("DEFAULT_TOPIC_LIST is not set"),
        }
    }

    /// Sleep between idle-loop ticks.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.rate)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            rosbag_base_path: Config::default_base_path(),
            default_topic_list: None,
            rate: 1.0,
            listen_addr: "0.0.0.0:8095".into(),
            rosbag_bin: "rosbag".into(),
            rosnode_bin: "rosnode".into(),
            record_node_prefix: "/record".into(),
            stop_grace_ms: 3000,
        }
    }
}

/// Load and validate a `KEY=VALUE` configuration file.
pub fn load(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read config: {}", path.display()))?;

    let config = parse(&text).with_context(|| format!("Invalid config: {}", path.display()))?;
    info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Build a [`Config`] from file contents. Missing keys take their defaults.
pub fn parse(text: &str) -> Result<Config> {
    let map = parse_conf(text);
    let defaults = Config::default();

    let get = |key: &str| -> Option<String> {
        map.get(key).cloned().filter(|s| !s.is_empty())
    };

    let rate = match get("RATE") {
        Some(v) => v
            .parse::<f64>()
            .with_context(|| format!("RATE is not a number: {v}"))?,
        None => defaults.rate,
    };
    if !rate.is_finite() || rate <= 0.0 {
        bail!("RATE must be a positive number of Hz, got {rate}");
    }
    let interval = Duration::try_from_secs_f64(1.0 / rate)
        .with_context(|| format!("RATE is too small: {rate}"))?;
    if interval.is_zero() {
        bail!("RATE is too large: {rate}");
    }

    let default_topic_list = map.get("DEFAULT_TOPIC_LIST").map(|s| {
        s.split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    });

    Ok(Config {
        rosbag_base_path: get("ROSBAG_BASE_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.rosbag_base_path),
        default_topic_list,
        rate,
        listen_addr: get("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
        rosbag_bin: get("ROSBAG_BIN").unwrap_or(defaults.rosbag_bin),
        rosnode_bin: get("ROSNODE_BIN").unwrap_or(defaults.rosnode_bin),
        record_node_prefix: get("RECORD_NODE_PREFIX").unwrap_or(defaults.record_node_prefix),
        stop_grace_ms: get("STOP_GRACE_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.stop_grace_ms),
    })
}

/// Parse `KEY=VALUE` lines into a map, stripping optional double-quotes.
fn parse_conf(text: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, val)) = line.split_once('=') {
            let key = key.trim();
            let val = val.trim().trim_matches('"');
            map.insert(key.to_string(), val.to_string());
        }
    }
    map
}

// ─── tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_conf() {
        let text = r#"
# comment
ROSBAG_BASE_PATH="/data/bags"
DEFAULT_TOPIC_LIST="/scan, /odom,/tf"
LISTEN_ADDR=127.0.0.1:9090
"#;
        let map = parse_conf(text);
        assert_eq!(map["ROSBAG_BASE_PATH"], "/data/bags");
        assert_eq!(map["DEFAULT_TOPIC_LIST"], "/scan, /odom,/tf");
        assert_eq!(map["LISTEN_ADDR"], "127.0.0.1:9090");
    }

    #[test]
    fn test_parse_topic_list_keeps_order() {
        let config = parse("DEFAULT_TOPIC_LIST=/scan, /odom,,/tf\n").unwrap();
        assert_eq!(
            config.default_topics().unwrap(),
            &["/scan".to_string(), "/odom".to_string(), "/tf".to_string()]
        );
    }

    #[test]
    fn test_defaults() {
        let config = parse("").unwrap();
        assert!(config.default_topics().is_err());
        assert_eq!(config.rate, 1.0);
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
        assert_eq!(config.rosbag_bin, "rosbag");
        assert_eq!(config.rosnode_bin, "rosnode");
        assert_eq!(config.record_node_prefix, "/record");
        assert!(config.rosbag_base_path.ends_with("cc_rosbags"));
    }

    #[test]
    fn test_rate() {
        let config = parse("RATE=4\n").unwrap();
        assert_eq!(config.tick_interval(), Duration::from_millis(250));

        assert!(parse("RATE=0\n").is_err());
        assert!(parse("RATE=-2\n").is_err());
        assert!(parse("RATE=fast\n").is_err());
        assert!(parse("RATE=1e-300\n").is_err());
        assert!(parse("RATE=1e10\n").is_err());
        assert!(parse("RATE=1e9\n").is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let tmp = tempfile("load.conf", "ROSBAG_BASE_PATH=/tmp/cc_test\nSTOP_GRACE_MS=500\n");
        let config = load(tmp.as_path()).unwrap();
        assert_eq!(config.rosbag_base_path, PathBuf::from("/tmp/cc_test"));
        assert_eq!(config.stop_grace(), Duration::from_millis(500));
    }

    #[test]
    fn test_load_missing_file() {
        let missing = std::env::temp_dir().join("cc_recorder_test").join("nope.conf");
        assert!(load(&missing).is_err());
    }

    fn tempfile(name: &str, content: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("cc_recorder_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }
}
