//! Run-directory and bag-file naming.
//!
//! Both names are derived from local wall-clock time at one-second
//! resolution, so two starts within the same second share a file name.

use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};

/// `DD.MM.YYYY_HH-MM-SS`
pub const TIMESTAMP_FORMAT: &str = "%d.%m.%Y_%H-%M-%S";

const BAG_PREFIX: &str = "cc_bag_";
const BAG_EXTENSION: &str = "bag";

/// Current local time without a zone, as used for every generated name.
pub fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

pub fn timestamp(at: &NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// `cc_bag_<timestamp>.bag`
pub fn bag_file_name(at: &NaiveDateTime) -> String {
    format!("{BAG_PREFIX}{}.{BAG_EXTENSION}", timestamp(at))
}

/// The per-run directory under `base`.
pub fn run_directory(base: &Path, at: &NaiveDateTime) -> PathBuf {
    base.join(timestamp(at))
}
