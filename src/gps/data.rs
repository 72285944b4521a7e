// src/gps/data.rs
//! Decoded NMEA sentence structures

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use std::fmt;

/// GNSS system a sentence or satellite belongs to, taken from the talker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Constellation {
    Gps,
    Glonass,
    Galileo,
    BeiDou,
    MultiGnss,
    Unknown,
}

impl Constellation {
    pub fn from_talker(talker: &str) -> Self {
        match talker {
            "GP" => Constellation::Gps,
            "GL" => Constellation::Glonass,
            "GA" => Constellation::Galileo,
            "GB" | "BD" => Constellation::BeiDou,
            "GN" => Constellation::MultiGnss,
            _ => Constellation::Unknown,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Constellation::Gps => "GPS",
            Constellation::Glonass => "GLONASS",
            Constellation::Galileo => "Galileo",
            Constellation::BeiDou => "BeiDou",
            Constellation::MultiGnss => "Multi-GNSS",
            Constellation::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Constellation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Hemisphere {
    North,
    South,
    East,
    West,
}

impl Hemisphere {
    pub fn letter(&self) -> char {
        match self {
            Hemisphere::North => 'N',
            Hemisphere::South => 'S',
            Hemisphere::East => 'E',
            Hemisphere::West => 'W',
        }
    }

    fn is_negative(&self) -> bool {
        matches!(self, Hemisphere::South | Hemisphere::West)
    }
}

/// Degrees/minutes/seconds rendering of a coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Dms {
    pub degrees: u16,
    pub minutes: u8,
    pub seconds: f64,
    pub hemisphere: Hemisphere,
}

impl fmt::Display for Dms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}°{:02}'{:05.2}\" {}",
            self.degrees,
            self.minutes,
            self.seconds,
            self.hemisphere.letter()
        )
    }
}

/// A latitude or longitude read from an NMEA `DDMM.MMMM` field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    /// Signed decimal degrees, negative for south and west.
    pub decimal: f64,
    pub degrees: u16,
    pub minutes: f64,
    pub hemisphere: Hemisphere,
}

impl Coordinate {
    /// Build from the raw `DDMM.MMMM` value and its hemisphere.
    ///
    /// Returns `None` for negative input, minutes of 60 or more, or a
    /// magnitude beyond the hemisphere's range.
    pub fn from_nmea(value: f64, hemisphere: Hemisphere) -> Option<Self> {
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        let degrees = (value / 100.0).floor();
        let minutes = value - degrees * 100.0;
        if minutes >= 60.0 {
            return None;
        }
        let max = match hemisphere {
            Hemisphere::North | Hemisphere::South => 90.0,
            Hemisphere::East | Hemisphere::West => 180.0,
        };
        let magnitude = degrees + minutes / 60.0;
        if magnitude > max {
            return None;
        }
        let decimal = if hemisphere.is_negative() {
            -magnitude
        } else {
            magnitude
        };
        Some(Self {
            decimal,
            degrees: degrees as u16,
            minutes,
            hemisphere,
        })
    }

    pub fn dms(&self) -> Dms {
        let whole_minutes = self.minutes.floor();
        Dms {
            degrees: self.degrees,
            minutes: whole_minutes as u8,
            seconds: (self.minutes - whole_minutes) * 60.0,
            hemisphere: self.hemisphere,
        }
    }
}

/// Fix quality class shared by GGA codes and RMC/GNS mode letters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FixClass {
    Invalid,
    Gps,
    Dgps,
    Pps,
    Rtk,
    FloatRtk,
    Estimated,
    Manual,
    Simulation,
}

impl FixClass {
    /// Map an RMC/GNS/VTG mode indicator letter.
    pub fn from_mode(mode: char) -> Option<Self> {
        match mode {
            'A' => Some(FixClass::Gps),
            'D' => Some(FixClass::Dgps),
            'P' => Some(FixClass::Pps),
            'R' => Some(FixClass::Rtk),
            'F' => Some(FixClass::FloatRtk),
            'E' => Some(FixClass::Estimated),
            'M' => Some(FixClass::Manual),
            'S' => Some(FixClass::Simulation),
            'N' => Some(FixClass::Invalid),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        *self != FixClass::Invalid
    }
}

/// GGA fix quality: the class plus the code it was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FixQuality {
    pub class: FixClass,
    pub code: u8,
}

impl FixQuality {
    pub fn from_code(code: u8) -> Self {
        let class = match code {
            1 => FixClass::Gps,
            2 => FixClass::Dgps,
            3 => FixClass::Pps,
            4 => FixClass::Rtk,
            5 => FixClass::FloatRtk,
            6 => FixClass::Estimated,
            7 => FixClass::Manual,
            8 => FixClass::Simulation,
            _ => FixClass::Invalid,
        };
        Self { class, code }
    }

    pub fn description(&self) -> String {
        match self.code {
            0 => "Invalid".to_string(),
            1 => "GPS fix (SPS)".to_string(),
            2 => "DGPS fix".to_string(),
            3 => "PPS fix".to_string(),
            4 => "Real Time Kinematic".to_string(),
            5 => "Float RTK".to_string(),
            6 => "Estimated (dead reckoning)".to_string(),
            7 => "Manual input mode".to_string(),
            8 => "Simulation mode".to_string(),
            code => format!("Unknown ({})", code),
        }
    }
}

/// GSA fix dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FixType {
    NoFix,
    Fix2D,
    Fix3D,
}

/// The broad kinds of information a sentence contributes to a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    FixData,
    Position,
    Satellites,
    Velocity,
}

impl DataKind {
    pub fn name(&self) -> &'static str {
        match self {
            DataKind::FixData => "fix_data",
            DataKind::Position => "position",
            DataKind::Satellites => "satellites",
            DataKind::Velocity => "velocity",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SatelliteRecord {
    pub prn: u16,
    pub elevation: Option<u8>,
    pub azimuth: Option<u16>,
    pub snr: Option<u8>,
    pub constellation: Constellation,
}

impl SatelliteRecord {
    pub fn signal_strength_description(&self) -> &'static str {
        match self.snr {
            Some(snr) if snr >= 40 => "Excellent",
            Some(snr) if snr >= 35 => "Good",
            Some(snr) if snr >= 25 => "Fair",
            Some(snr) if snr >= 15 => "Poor",
            Some(_) => "Very Poor",
            None => "Unknown",
        }
    }
}

/// GGA: fix data.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Gga {
    pub time: Option<NaiveTime>,
    pub latitude: Option<Coordinate>,
    pub longitude: Option<Coordinate>,
    pub fix_quality: Option<FixQuality>,
    pub satellites_used: Option<u8>,
    pub hdop: Option<f64>,
    pub altitude: Option<f64>,
    pub altitude_units: Option<String>,
    pub geoid_separation: Option<f64>,
    pub geoid_units: Option<String>,
    pub dgps_age: Option<f64>,
    pub dgps_station: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RmcStatus {
    Active,
    Void,
}

/// RMC: recommended minimum navigation information.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Rmc {
    pub time: Option<NaiveTime>,
    pub status: Option<RmcStatus>,
    pub latitude: Option<Coordinate>,
    pub longitude: Option<Coordinate>,
    pub speed_knots: Option<f64>,
    pub course: Option<f64>,
    pub date: Option<NaiveDate>,
    /// Signed, west negative.
    pub magnetic_variation: Option<f64>,
    pub mode: Option<char>,
}

impl Rmc {
    pub fn is_valid(&self) -> bool {
        self.status == Some(RmcStatus::Active) && self.mode != Some('N')
    }
}

/// GSA: DOP and active satellites.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Gsa {
    pub selection_mode: Option<char>,
    pub fix_type: Option<FixType>,
    pub satellites_used: Vec<u16>,
    pub pdop: Option<f64>,
    pub hdop: Option<f64>,
    pub vdop: Option<f64>,
    pub system_id: Option<u8>,
}

/// GSV: one page of satellites in view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Gsv {
    pub constellation: Constellation,
    pub total_messages: Option<u8>,
    pub message_number: Option<u8>,
    pub satellites_in_view: Option<u16>,
    pub satellites: Vec<SatelliteRecord>,
    pub signal_id: Option<String>,
}

/// VTG: track made good and ground speed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Vtg {
    pub course_true: Option<f64>,
    pub course_magnetic: Option<f64>,
    pub speed_knots: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub mode: Option<char>,
}

/// GNS: multi-constellation fix data.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Gns {
    pub time: Option<NaiveTime>,
    pub latitude: Option<Coordinate>,
    pub longitude: Option<Coordinate>,
    /// One mode letter per constellation.
    pub mode: Option<String>,
    pub satellites_used: Option<u8>,
    pub hdop: Option<f64>,
    pub altitude: Option<f64>,
    pub geoid_separation: Option<f64>,
    pub dgps_age: Option<f64>,
    pub dgps_station: Option<String>,
    pub nav_status: Option<char>,
}

impl Gns {
    pub fn is_valid(&self) -> bool {
        match &self.mode {
            Some(mode) => mode.chars().any(|c| c != 'N'),
            None => true,
        }
    }

    /// Best mode letter across constellations, used as fix class.
    pub fn fix_class(&self) -> Option<FixClass> {
        let mode = self.mode.as_deref()?;
        mode.chars()
            .filter_map(FixClass::from_mode)
            .find(FixClass::is_valid)
            .or_else(|| mode.chars().find_map(FixClass::from_mode))
    }
}

/// A sentence kept without typed interpretation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawSentence {
    pub address: String,
    pub fields: Vec<String>,
}

/// One decoded sentence.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Sentence {
    #[serde(rename = "GGA")]
    Gga(Gga),
    #[serde(rename = "RMC")]
    Rmc(Rmc),
    #[serde(rename = "GSA")]
    Gsa(Gsa),
    #[serde(rename = "GSV")]
    Gsv(Gsv),
    #[serde(rename = "VTG")]
    Vtg(Vtg),
    #[serde(rename = "GNS")]
    Gns(Gns),
    Proprietary(RawSentence),
    Unsupported(RawSentence),
}

impl Sentence {
    pub fn type_name(&self) -> &str {
        match self {
            Sentence::Gga(_) => "GGA",
            Sentence::Rmc(_) => "RMC",
            Sentence::Gsa(_) => "GSA",
            Sentence::Gsv(_) => "GSV",
            Sentence::Vtg(_) => "VTG",
            Sentence::Gns(_) => "GNS",
            Sentence::Proprietary(raw) | Sentence::Unsupported(raw) => &raw.address,
        }
    }

    pub fn kinds(&self) -> &'static [DataKind] {
        match self {
            Sentence::Gga(_) | Sentence::Gns(_) => &[DataKind::FixData, DataKind::Position],
            Sentence::Rmc(_) => &[DataKind::Position, DataKind::Velocity],
            Sentence::Gsv(_) => &[DataKind::Satellites],
            Sentence::Vtg(_) => &[DataKind::Velocity],
            Sentence::Gsa(_) | Sentence::Proprietary(_) | Sentence::Unsupported(_) => &[],
        }
    }

    /// GGA and RMC each open a GPS update cycle.
    pub fn is_primary(&self) -> bool {
        matches!(self, Sentence::Gga(_) | Sentence::Rmc(_))
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Sentence::Unsupported(_))
    }
}
