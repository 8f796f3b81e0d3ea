//! Types shared between the recorder service and anything that talks to it.

pub mod config;
pub mod naming;
pub mod protocol;
