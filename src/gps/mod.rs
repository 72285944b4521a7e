// src/gps/mod.rs
//! NMEA framing, decoding and the decoded sentence types

pub mod data;
pub mod nmea;
pub mod token;

pub use data::{Constellation, Coordinate, DataKind, FixClass, FixQuality, Sentence};
pub use nmea::{decode, decode_with_diagnostics};
pub use token::{checksum, tokenize, tokenize_unchecked, Token};
