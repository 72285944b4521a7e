// src/position.rs
//! Fix derivation, position history and movement between fixes

use crate::block::Block;
use crate::gps::data::{FixClass, Gga, Gns, Gsa, Rmc, Sentence, Vtg};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use log::debug;
use serde::Serialize;
use std::collections::VecDeque;

/// Mean Earth radius used by the haversine distance.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;
pub const METERS_PER_NAUTICAL_MILE: f64 = 1852.0;
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Great-circle distance in meters between two decimal-degree positions.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let sin_dlat_half = (dlat / 2.0).sin();
    let sin_dlon_half = (dlon / 2.0).sin();
    let a = sin_dlat_half * sin_dlat_half
        + lat1_rad.cos() * lat2_rad.cos() * sin_dlon_half * sin_dlon_half;
    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_M * c
}

/// Initial great-circle bearing from the first position to the second,
/// in degrees within `[0, 360)`.
pub fn initial_bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let y = dlon.sin() * lat2_rad.cos();
    let x = lat1_rad.cos() * lat2_rad.sin() - lat1_rad.sin() * lat2_rad.cos() * dlon.cos();
    let bearing = y.atan2(x).to_degrees().rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative angles.
    if bearing >= 360.0 {
        0.0
    } else {
        bearing
    }
}

/// Sentence type a fix's coordinates were taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PositionSource {
    Rmc,
    Gga,
    Gns,
}

/// One derived position snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fix {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub time: Option<NaiveTime>,
    pub date: Option<NaiveDate>,
    pub quality: Option<FixClass>,
    pub satellites_used: Option<u8>,
    pub hdop: Option<f64>,
    pub source: PositionSource,
    /// Speed over ground as reported by RMC or VTG.
    pub ground_speed_knots: Option<f64>,
    /// Course over ground as reported by RMC or VTG.
    pub course: Option<f64>,
    pub block_sequence: u64,
}

impl Fix {
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        Some(NaiveDateTime::new(self.date?, self.time?))
    }

    /// Seconds elapsed from `earlier` to this fix.
    ///
    /// Uses full timestamps when both fixes carry a date. With time of day
    /// only, a negative difference is taken as a midnight rollover.
    pub fn seconds_since(&self, earlier: &Fix) -> Option<f64> {
        if let (Some(now), Some(then)) = (self.timestamp(), earlier.timestamp()) {
            let micros = (now - then).num_microseconds()?;
            return Some(micros as f64 / 1e6);
        }
        let micros = (self.time? - earlier.time?).num_microseconds()?;
        let seconds = micros as f64 / 1e6;
        Some(if seconds < 0.0 {
            seconds + SECONDS_PER_DAY
        } else {
            seconds
        })
    }

    pub fn distance_to(&self, latitude: f64, longitude: f64) -> f64 {
        haversine_distance(self.latitude, self.longitude, latitude, longitude)
    }
}

/// Movement from one fix to the next.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovementDelta {
    pub distance_m: f64,
    pub bearing_deg: f64,
    pub elapsed_s: Option<f64>,
    /// `None` when the elapsed time is unknown, zero or negative.
    pub speed_knots: Option<f64>,
}

impl MovementDelta {
    pub fn between(previous: &Fix, current: &Fix) -> Self {
        let distance_m = haversine_distance(
            previous.latitude,
            previous.longitude,
            current.latitude,
            current.longitude,
        );
        let bearing_deg = initial_bearing(
            previous.latitude,
            previous.longitude,
            current.latitude,
            current.longitude,
        );
        let elapsed_s = current.seconds_since(previous);
        let speed_knots = elapsed_s
            .filter(|&seconds| seconds > 0.0)
            .map(|seconds| distance_m / seconds * 3600.0 / METERS_PER_NAUTICAL_MILE);

        Self {
            distance_m,
            bearing_deg,
            elapsed_s,
            speed_knots,
        }
    }

    /// Whether the move is larger than the caller's stationary threshold.
    pub fn is_significant(&self, min_movement_meters: f64) -> bool {
        self.distance_m > min_movement_meters
    }
}

/// The most recent fixes, oldest first.
#[derive(Debug, Clone)]
pub struct PositionHistory {
    capacity: usize,
    fixes: VecDeque<Fix>,
}

impl PositionHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            fixes: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a fix, dropping the oldest when full.
    pub fn push(&mut self, fix: Fix) {
        if self.fixes.len() == self.capacity {
            self.fixes.pop_front();
        }
        self.fixes.push_back(fix);
    }

    pub fn latest(&self) -> Option<&Fix> {
        self.fixes.back()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.fixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fix> {
        self.fixes.iter()
    }

    pub fn clear(&mut self) {
        self.fixes.clear();
    }
}

/// Derive a fix from a completed block and record it in `history`.
///
/// Returns `None`, leaving the history untouched, when the block has no
/// position or its chosen position sentence reports no fix.
pub fn derive(block: &Block, history: &mut PositionHistory) -> Option<(Fix, Option<MovementDelta>)> {
    let fix = best_fix(block)?;
    let movement = history
        .latest()
        .map(|previous| MovementDelta::between(previous, &fix));
    history.push(fix.clone());
    Some((fix, movement))
}

fn best_fix(block: &Block) -> Option<Fix> {
    let sentences = &block.sentences;
    let rmc = sentences.iter().find_map(as_rmc);
    let gga = sentences.iter().find_map(as_gga);
    let gns = sentences.iter().find_map(as_gns);
    let gsa = sentences.iter().find_map(as_gsa);
    let vtg = sentences.iter().find_map(as_vtg);

    let positioned_rmc = sentences
        .iter()
        .filter_map(as_rmc)
        .find(|r| r.latitude.is_some() && r.longitude.is_some());
    let positioned_gga = sentences
        .iter()
        .filter_map(as_gga)
        .find(|g| g.latitude.is_some() && g.longitude.is_some());
    let positioned_gns = sentences
        .iter()
        .filter_map(as_gns)
        .find(|g| g.latitude.is_some() && g.longitude.is_some());

    let (latitude, longitude, source, valid, time, mode_class) = if let Some(r) = positioned_rmc {
        (
            r.latitude?,
            r.longitude?,
            PositionSource::Rmc,
            r.is_valid(),
            r.time,
            r.mode.and_then(FixClass::from_mode),
        )
    } else if let Some(g) = positioned_gga {
        (
            g.latitude?,
            g.longitude?,
            PositionSource::Gga,
            g.fix_quality.map_or(true, |q| q.class.is_valid()),
            g.time,
            None,
        )
    } else if let Some(g) = positioned_gns {
        (
            g.latitude?,
            g.longitude?,
            PositionSource::Gns,
            g.is_valid(),
            g.time,
            g.fix_class(),
        )
    } else {
        debug!("Block {} carries no position", block.sequence);
        return None;
    };

    if !valid {
        debug!("Block {} reports no fix from {:?}", block.sequence, source);
        return None;
    }

    let quality = gga
        .and_then(|g| g.fix_quality)
        .map(|q| q.class)
        .or(mode_class)
        .or_else(|| gns.and_then(Gns::fix_class));

    Some(Fix {
        latitude: latitude.decimal,
        longitude: longitude.decimal,
        altitude: gga
            .and_then(|g| g.altitude)
            .or_else(|| gns.and_then(|g| g.altitude)),
        time: time
            .or_else(|| gga.and_then(|g| g.time))
            .or_else(|| gns.and_then(|g| g.time)),
        date: rmc.and_then(|r| r.date),
        quality,
        satellites_used: gga
            .and_then(|g| g.satellites_used)
            .or_else(|| gns.and_then(|g| g.satellites_used)),
        hdop: gga
            .and_then(|g| g.hdop)
            .or_else(|| gns.and_then(|g| g.hdop))
            .or_else(|| gsa.and_then(|g| g.hdop)),
        source,
        ground_speed_knots: rmc
            .and_then(|r| r.speed_knots)
            .or_else(|| vtg.and_then(|v| v.speed_knots)),
        course: rmc
            .and_then(|r| r.course)
            .or_else(|| vtg.and_then(|v| v.course_true)),
        block_sequence: block.sequence,
    })
}

fn as_rmc(sentence: &Sentence) -> Option<&Rmc> {
    match sentence {
        Sentence::Rmc(rmc) => Some(rmc),
        _ => None,
    }
}

fn as_gga(sentence: &Sentence) -> Option<&Gga> {
    match sentence {
        Sentence::Gga(gga) => Some(gga),
        _ => None,
    }
}

fn as_gns(sentence: &Sentence) -> Option<&Gns> {
    match sentence {
        Sentence::Gns(gns) => Some(gns),
        _ => None,
    }
}

fn as_gsa(sentence: &Sentence) -> Option<&Gsa> {
    match sentence {
        Sentence::Gsa(gsa) => Some(gsa),
        _ => None,
    }
}

fn as_vtg(sentence: &Sentence) -> Option<&Vtg> {
    match sentence {
        Sentence::Vtg(vtg) => Some(vtg),
        _ => None,
    }
}
