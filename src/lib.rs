//! Change detection and severity scoring for snapshots of a monitored scene.

pub mod analytics;
pub mod camera;
pub mod config;
pub mod session;
pub mod storage;
pub mod trigger;
