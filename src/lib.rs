// src/lib.rs
//! NMEA Blocks Library
//!
//! Decodes NMEA 0183 streams line by line, groups sentences into per-cycle
//! blocks, derives fixes and movement, and watches circular geofences.

pub mod block;
pub mod config;
pub mod error;
pub mod geofence;
pub mod gps;
pub mod monitor;
pub mod pipeline;
pub mod position;

// Re-export main types for convenience
pub use block::{Block, BlockAggregator, Completion};
pub use config::PipelineConfig;
pub use error::{DecodeError, NmeaError, Result};
pub use geofence::{Geofence, GeofenceEvent, Transition};
pub use gps::data::Sentence;
pub use monitor::{NmeaMonitor, NmeaSource};
pub use pipeline::{Event, Pipeline, PipelineStats};
pub use position::{Fix, MovementDelta, PositionHistory};
