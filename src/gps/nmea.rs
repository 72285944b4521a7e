// src/gps/nmea.rs
//! NMEA sentence decoding

use super::data::{
    Constellation, Coordinate, FixQuality, FixType, Gga, Gns, Gsa, Gsv, Hemisphere, RawSentence,
    Rmc, RmcStatus, SatelliteRecord, Sentence, Vtg,
};
use super::token::Token;
use crate::error::DecodeError;
use chrono::{NaiveDate, NaiveTime};
use log::warn;
use std::str::FromStr;

/// Proprietary address prefixes kept as `Sentence::Proprietary`.
pub const KNOWN_PROPRIETARY_PREFIXES: &[&str] = &["PQXFI", "PUBX", "PGRM", "PMTK", "PSRF", "PSTM"];

/// Decode a token into its typed sentence, dropping field diagnostics.
pub fn decode(token: &Token) -> Sentence {
    decode_with_diagnostics(token).0
}

/// Decode a token and report every field that could not be read.
pub fn decode_with_diagnostics(token: &Token) -> (Sentence, Vec<DecodeError>) {
    let mut fields = FieldReader::new(token);

    let sentence = match token.sentence_type.as_str() {
        "GGA" => Sentence::Gga(parse_gga(&mut fields)),
        "RMC" => Sentence::Rmc(parse_rmc(&mut fields)),
        "GSA" => Sentence::Gsa(parse_gsa(&mut fields)),
        "GSV" => Sentence::Gsv(parse_gsv(&mut fields, &token.talker)),
        "VTG" => Sentence::Vtg(parse_vtg(&mut fields)),
        "GNS" => Sentence::Gns(parse_gns(&mut fields)),
        _ => {
            let raw = RawSentence {
                address: token.address.clone(),
                fields: token.fields.clone(),
            };
            if is_known_proprietary(&token.address) {
                Sentence::Proprietary(raw)
            } else {
                Sentence::Unsupported(raw)
            }
        }
    };

    let issues = fields.into_issues();
    for issue in &issues {
        warn!("{}", issue);
    }
    (sentence, issues)
}

pub fn is_known_proprietary(address: &str) -> bool {
    address.starts_with('P')
        && KNOWN_PROPRIETARY_PREFIXES
            .iter()
            .any(|prefix| address.starts_with(prefix))
}

/// Parse GGA (Global Positioning System Fix Data)
fn parse_gga(f: &mut FieldReader) -> Gga {
    Gga {
        time: f.time(0),
        latitude: f.latitude(1, 2),
        longitude: f.longitude(3, 4),
        fix_quality: f.number::<u8>(5, "fix quality").map(FixQuality::from_code),
        satellites_used: f.number(6, "satellites used"),
        hdop: f.number(7, "hdop"),
        altitude: f.number(8, "altitude"),
        altitude_units: f.text(9),
        geoid_separation: f.number(10, "geoid separation"),
        geoid_units: f.text(11),
        dgps_age: f.number(12, "dgps age"),
        dgps_station: f.text(13),
    }
}

/// Parse RMC (Recommended Minimum Navigation Information)
fn parse_rmc(f: &mut FieldReader) -> Rmc {
    let status = f.letter(1, "status").and_then(|c| match c {
        'A' => Some(RmcStatus::Active),
        'V' => Some(RmcStatus::Void),
        _ => {
            f.malformed(1, "status");
            None
        }
    });

    let magnitude: Option<f64> = f.number(9, "magnetic variation");
    let magnetic_variation = match (magnitude, f.letter(10, "variation direction")) {
        (Some(value), Some('W')) => Some(-value),
        (Some(value), _) => Some(value),
        (None, _) => None,
    };

    Rmc {
        time: f.time(0),
        status,
        latitude: f.latitude(2, 3),
        longitude: f.longitude(4, 5),
        speed_knots: f.number(6, "speed"),
        course: f.number(7, "course"),
        date: f.date(8),
        magnetic_variation,
        mode: f.letter(11, "mode"),
    }
}

/// Parse GSA (DOP and active satellites)
fn parse_gsa(f: &mut FieldReader) -> Gsa {
    let fix_type = f.number::<u8>(1, "fix type").and_then(|code| match code {
        1 => Some(FixType::NoFix),
        2 => Some(FixType::Fix2D),
        3 => Some(FixType::Fix3D),
        _ => {
            f.malformed(1, "fix type");
            None
        }
    });

    Gsa {
        selection_mode: f.letter(0, "selection mode"),
        fix_type,
        satellites_used: (2..14).filter_map(|i| f.number(i, "satellite prn")).collect(),
        pdop: f.number(14, "pdop"),
        hdop: f.number(15, "hdop"),
        vdop: f.number(16, "vdop"),
        system_id: f.number(17, "system id"),
    }
}

/// Parse GSV (Satellites in View)
///
/// Each page carries up to four 4-field satellite slots; the last slot may
/// stop after its azimuth. A single leftover field after the slots is the
/// NMEA 4.1 signal id.
fn parse_gsv(f: &mut FieldReader, talker: &str) -> Gsv {
    let constellation = Constellation::from_talker(talker);
    let slots = f.len().saturating_sub(3);

    let mut satellites = Vec::new();
    let mut index = 3;
    while index + 2 < f.len() {
        if let Some(prn) = f.number::<u16>(index, "satellite prn") {
            satellites.push(SatelliteRecord {
                prn,
                elevation: f.bounded(index + 1, "elevation", 90u8),
                azimuth: f.bounded(index + 2, "azimuth", 359u16),
                snr: f.number(index + 3, "snr"),
                constellation,
            });
        }
        index += 4;
    }

    Gsv {
        constellation,
        total_messages: f.number(0, "total messages"),
        message_number: f.number(1, "message number"),
        satellites_in_view: f.number(2, "satellites in view"),
        satellites,
        signal_id: if slots % 4 == 1 { f.text(f.len() - 1) } else { None },
    }
}

/// Parse VTG (Track made good and Ground speed)
fn parse_vtg(f: &mut FieldReader) -> Vtg {
    Vtg {
        course_true: f.number(0, "course true"),
        course_magnetic: f.number(2, "course magnetic"),
        speed_knots: f.number(4, "speed knots"),
        speed_kmh: f.number(6, "speed km/h"),
        mode: f.letter(8, "mode"),
    }
}

/// Parse GNS (GNSS fix data)
fn parse_gns(f: &mut FieldReader) -> Gns {
    Gns {
        time: f.time(0),
        latitude: f.latitude(1, 2),
        longitude: f.longitude(3, 4),
        mode: f.text(5),
        satellites_used: f.number(6, "satellites used"),
        hdop: f.number(7, "hdop"),
        altitude: f.number(8, "altitude"),
        geoid_separation: f.number(9, "geoid separation"),
        dgps_age: f.number(10, "dgps age"),
        dgps_station: f.text(11),
        nav_status: f.letter(12, "navigation status"),
    }
}

/// Reads typed values out of token fields.
///
/// Empty or missing fields read as `None` silently. Non-empty fields that
/// fail to parse also read as `None` and are recorded as `MalformedField`.
struct FieldReader<'a> {
    token: &'a Token,
    issues: Vec<DecodeError>,
}

impl<'a> FieldReader<'a> {
    fn new(token: &'a Token) -> Self {
        Self {
            token,
            issues: Vec::new(),
        }
    }

    fn len(&self) -> usize {
        self.token.fields.len()
    }

    fn into_issues(self) -> Vec<DecodeError> {
        self.issues
    }

    fn raw(&self, index: usize) -> Option<&'a str> {
        self.token
            .fields
            .get(index)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    fn malformed(&mut self, index: usize, field: &'static str) {
        self.issues.push(DecodeError::MalformedField {
            sentence: self.token.address.clone(),
            field,
            value: self.token.field(index).unwrap_or_default().to_string(),
        });
    }

    fn text(&self, index: usize) -> Option<String> {
        self.raw(index).map(str::to_string)
    }

    fn number<T: FromStr>(&mut self, index: usize, field: &'static str) -> Option<T> {
        let raw = self.raw(index)?;
        match raw.parse::<T>() {
            Ok(value) => Some(value),
            Err(_) => {
                self.malformed(index, field);
                None
            }
        }
    }

    fn bounded<T: FromStr + PartialOrd>(
        &mut self,
        index: usize,
        field: &'static str,
        max: T,
    ) -> Option<T> {
        let value = self.number::<T>(index, field)?;
        if value > max {
            self.malformed(index, field);
            return None;
        }
        Some(value)
    }

    fn letter(&mut self, index: usize, field: &'static str) -> Option<char> {
        let raw = self.raw(index)?;
        let mut chars = raw.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Some(c),
            _ => {
                self.malformed(index, field);
                None
            }
        }
    }

    fn latitude(&mut self, value: usize, hemisphere: usize) -> Option<Coordinate> {
        self.coordinate(value, hemisphere, "latitude", |c| match c {
            'N' => Some(Hemisphere::North),
            'S' => Some(Hemisphere::South),
            _ => None,
        })
    }

    fn longitude(&mut self, value: usize, hemisphere: usize) -> Option<Coordinate> {
        self.coordinate(value, hemisphere, "longitude", |c| match c {
            'E' => Some(Hemisphere::East),
            'W' => Some(Hemisphere::West),
            _ => None,
        })
    }

    fn coordinate(
        &mut self,
        value: usize,
        hemisphere: usize,
        field: &'static str,
        side: fn(char) -> Option<Hemisphere>,
    ) -> Option<Coordinate> {
        let magnitude = self.number::<f64>(value, field);
        let letter = self.letter(hemisphere, "hemisphere");
        let hemisphere = match letter {
            Some(c) => match side(c) {
                Some(h) => h,
                None => {
                    self.malformed(hemisphere, "hemisphere");
                    return None;
                }
            },
            None => return None,
        };
        let coordinate = Coordinate::from_nmea(magnitude?, hemisphere);
        if coordinate.is_none() {
            self.malformed(value, field);
        }
        coordinate
    }

    /// `hhmmss` with optional fractional seconds.
    fn time(&mut self, index: usize) -> Option<NaiveTime> {
        let raw = self.raw(index)?;
        let parsed = parse_time(raw);
        if parsed.is_none() {
            self.malformed(index, "time");
        }
        parsed
    }

    /// `ddmmyy`; two-digit years below 80 are 20yy, the rest 19yy.
    fn date(&mut self, index: usize) -> Option<NaiveDate> {
        let raw = self.raw(index)?;
        let parsed = parse_date(raw);
        if parsed.is_none() {
            self.malformed(index, "date");
        }
        parsed
    }
}

fn parse_time(raw: &str) -> Option<NaiveTime> {
    if raw.len() < 6 || !raw.is_ascii() {
        return None;
    }
    let hours: u32 = raw[..2].parse().ok()?;
    let minutes: u32 = raw[2..4].parse().ok()?;
    let seconds: f64 = raw[4..].parse().ok()?;
    if !(0.0..60.0).contains(&seconds) {
        return None;
    }
    let whole = seconds.trunc();
    let nanos = ((seconds - whole) * 1e9).round().min(999_999_999.0) as u32;
    NaiveTime::from_hms_nano_opt(hours, minutes, whole as u32, nanos)
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    if raw.len() != 6 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let day: u32 = raw[..2].parse().ok()?;
    let month: u32 = raw[2..4].parse().ok()?;
    let year: i32 = raw[4..].parse().ok()?;
    let century = if year < 80 { 2000 } else { 1900 };
    NaiveDate::from_ymd_opt(century + year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gps::data::{DataKind, FixClass};
    use crate::gps::token::tokenize;
    use approx::assert_abs_diff_eq;
    use chrono::Timelike;

    fn decode_line(line: &str) -> Sentence {
        decode(&tokenize(line).unwrap())
    }

    #[test]
    fn test_gga_parsing() {
        let gga = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";

        let Sentence::Gga(gga) = decode_line(gga) else {
            panic!("expected GGA");
        };
        assert_eq!(gga.time, NaiveTime::from_hms_opt(12, 35, 19));
        assert_abs_diff_eq!(gga.latitude.unwrap().decimal, 48.1173, epsilon = 1e-6);
        assert_abs_diff_eq!(gga.longitude.unwrap().decimal, 11.516667, epsilon = 1e-6);
        assert_eq!(gga.fix_quality.unwrap().class, FixClass::Gps);
        assert_eq!(gga.satellites_used, Some(8));
        assert_eq!(gga.hdop, Some(0.9));
        assert_eq!(gga.altitude, Some(545.4));
        assert_eq!(gga.altitude_units.as_deref(), Some("M"));
        assert_eq!(gga.geoid_separation, Some(46.9));
        assert_eq!(gga.dgps_age, None);
        assert_eq!(gga.dgps_station, None);
    }

    #[test]
    fn test_rmc_parsing() {
        let rmc = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A";

        let Sentence::Rmc(rmc) = decode_line(rmc) else {
            panic!("expected RMC");
        };
        assert_eq!(rmc.status, Some(RmcStatus::Active));
        assert!(rmc.is_valid());
        assert_eq!(rmc.speed_knots, Some(22.4));
        assert_eq!(rmc.course, Some(84.4));
        assert_eq!(rmc.date, NaiveDate::from_ymd_opt(1994, 3, 23));
        assert_eq!(rmc.magnetic_variation, Some(-3.1));
        assert_eq!(rmc.mode, None);
    }

    #[test]
    fn test_void_rmc_is_not_valid() {
        let Sentence::Rmc(rmc) = decode_line("$GPRMC,123519,V,,,,,,,230394,,,N*51") else {
            panic!("expected RMC");
        };
        assert_eq!(rmc.status, Some(RmcStatus::Void));
        assert_eq!(rmc.latitude, None);
        assert!(!rmc.is_valid());
    }

    #[test]
    fn test_gsa_parsing() {
        let Sentence::Gsa(gsa) = decode_line("$GPGSA,A,3,01,02,12,14,18,19,24,25,,,,,1.5,0.9,1.2*39")
        else {
            panic!("expected GSA");
        };
        assert_eq!(gsa.selection_mode, Some('A'));
        assert_eq!(gsa.fix_type, Some(FixType::Fix3D));
        assert_eq!(gsa.satellites_used, vec![1, 2, 12, 14, 18, 19, 24, 25]);
        assert_eq!(gsa.pdop, Some(1.5));
        assert_eq!(gsa.hdop, Some(0.9));
        assert_eq!(gsa.vdop, Some(1.2));
        assert_eq!(gsa.system_id, None);
    }

    #[test]
    fn test_gsv_parsing() {
        let gsv = "$GPGSV,3,1,12,01,40,083,46,02,17,308,41,12,07,344,39,14,22,228,45*7F";

        let Sentence::Gsv(gsv) = decode_line(gsv) else {
            panic!("expected GSV");
        };
        assert_eq!(gsv.total_messages, Some(3));
        assert_eq!(gsv.message_number, Some(1));
        assert_eq!(gsv.satellites_in_view, Some(12));
        assert_eq!(gsv.satellites.len(), 4);
        assert_eq!(gsv.satellites[0].prn, 1);
        assert_eq!(gsv.satellites[0].constellation, Constellation::Gps);
        assert_eq!(gsv.satellites[0].elevation, Some(40));
        assert_eq!(gsv.satellites[0].azimuth, Some(83));
        assert_eq!(gsv.satellites[0].snr, Some(46));
        assert_eq!(gsv.signal_id, None);
    }

    #[test]
    fn test_gsv_empty_snr_and_glonass_talker() {
        let gsv = "$GLGSV,1,1,04,65,40,083,46,66,17,308,41,72,07,344,,80,22,228,45*67";

        let Sentence::Gsv(gsv) = decode_line(gsv) else {
            panic!("expected GSV");
        };
        assert_eq!(gsv.constellation, Constellation::Glonass);
        assert_eq!(gsv.satellites[2].prn, 72);
        assert_eq!(gsv.satellites[2].snr, None);
        assert!(gsv
            .satellites
            .iter()
            .all(|s| s.constellation == Constellation::Glonass));
    }

    #[test]
    fn test_gsv_signal_id_and_out_of_range_elevation() {
        let token = Token {
            sentinel: '$',
            address: "GAGSV".to_string(),
            talker: "GA".to_string(),
            sentence_type: "GSV".to_string(),
            fields: "1,1,01,05,95,400,33,7"
                .split(',')
                .map(str::to_string)
                .collect(),
            checksum: None,
        };
        let (sentence, issues) = decode_with_diagnostics(&token);
        let Sentence::Gsv(gsv) = sentence else {
            panic!("expected GSV");
        };
        assert_eq!(gsv.signal_id.as_deref(), Some("7"));
        assert_eq!(gsv.satellites.len(), 1);
        assert_eq!(gsv.satellites[0].elevation, None);
        assert_eq!(gsv.satellites[0].azimuth, None);
        assert_eq!(gsv.satellites[0].snr, Some(33));
        assert_eq!(issues.len(), 2);
    }

    #[test]
    fn test_gsv_last_slot_without_snr_field() {
        let token = Token {
            sentinel: '$',
            address: "GPGSV".to_string(),
            talker: "GP".to_string(),
            sentence_type: "GSV".to_string(),
            fields: "1,1,02,01,40,083,46,02,17,308"
                .split(',')
                .map(str::to_string)
                .collect(),
            checksum: None,
        };
        let (sentence, issues) = decode_with_diagnostics(&token);
        let Sentence::Gsv(gsv) = sentence else {
            panic!("expected GSV");
        };
        assert!(issues.is_empty());
        assert_eq!(gsv.signal_id, None);
        assert_eq!(gsv.satellites.len(), 2);
        assert_eq!(gsv.satellites[1].prn, 2);
        assert_eq!(gsv.satellites[1].elevation, Some(17));
        assert_eq!(gsv.satellites[1].azimuth, Some(308));
        assert_eq!(gsv.satellites[1].snr, None);
    }

    #[test]
    fn test_vtg_parsing() {
        let Sentence::Vtg(vtg) = decode_line("$GPVTG,054.7,T,034.4,M,005.5,N,010.2,K,A*25") else {
            panic!("expected VTG");
        };
        assert_eq!(vtg.course_true, Some(54.7));
        assert_eq!(vtg.course_magnetic, Some(34.4));
        assert_eq!(vtg.speed_knots, Some(5.5));
        assert_eq!(vtg.speed_kmh, Some(10.2));
        assert_eq!(vtg.mode, Some('A'));
    }

    #[test]
    fn test_gns_parsing() {
        let gns = "$GNGNS,014035.00,4332.69262,S,17235.48549,E,RR,13,0.9,25.63,11.24,,*70";

        let Sentence::Gns(gns) = decode_line(gns) else {
            panic!("expected GNS");
        };
        assert_eq!(gns.time, NaiveTime::from_hms_opt(1, 40, 35));
        assert!(gns.latitude.unwrap().decimal < 0.0);
        assert_abs_diff_eq!(gns.longitude.unwrap().decimal, 172.591425, epsilon = 1e-6);
        assert_eq!(gns.mode.as_deref(), Some("RR"));
        assert_eq!(gns.satellites_used, Some(13));
        assert_eq!(gns.altitude, Some(25.63));
        assert_eq!(gns.geoid_separation, Some(11.24));
        assert!(gns.is_valid());
    }

    #[test]
    fn test_fractional_time() {
        let time = parse_time("092750.250").unwrap();
        assert_eq!((time.hour(), time.minute(), time.second()), (9, 27, 50));
        assert_eq!(time.nanosecond(), 250_000_000);
        assert_eq!(parse_time("2561"), None);
        assert_eq!(parse_time("256100"), None);
    }

    #[test]
    fn test_malformed_fields_do_not_fail_sentence() {
        let token = tokenize("$GPGGA,123519,48x7.038,N,01131.000,E,1,08,abc,545.4,M,46.9,M,,*48")
            .unwrap();
        let (sentence, issues) = decode_with_diagnostics(&token);

        let Sentence::Gga(gga) = sentence else {
            panic!("expected GGA");
        };
        assert_eq!(gga.latitude, None);
        assert_eq!(gga.hdop, None);
        assert!(gga.longitude.is_some());
        assert_eq!(gga.altitude, Some(545.4));
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|e| matches!(
            e,
            DecodeError::MalformedField { sentence, .. } if sentence == "GPGGA"
        )));
    }

    #[test]
    fn test_bad_hemisphere_is_malformed() {
        let token = tokenize("$GPGGA,123519,4807.038,E,01131.000,E,1,08,0.9,545.4,M,46.9,M,,")
            .unwrap();
        let (sentence, issues) = decode_with_diagnostics(&token);
        let Sentence::Gga(gga) = sentence else {
            panic!("expected GGA");
        };
        assert_eq!(gga.latitude, None);
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn test_short_sentence_decodes_partially() {
        let Sentence::Gga(gga) = decode_line("$GPGGA,123519,4807.038,N") else {
            panic!("expected GGA");
        };
        assert!(gga.latitude.is_some());
        assert_eq!(gga.longitude, None);
        assert_eq!(gga.fix_quality, None);
    }

    #[test]
    fn test_proprietary_and_unsupported() {
        let sentence = decode_line("$PQXFI,123519,4807.038,N,01131.000,E,545.4,1.2,3.4,5.6*49");
        let Sentence::Proprietary(raw) = &sentence else {
            panic!("expected proprietary");
        };
        assert_eq!(raw.address, "PQXFI");
        assert_eq!(raw.fields.len(), 9);
        assert!(sentence.kinds().is_empty());

        let sentence = decode_line("$GPZDA,201530.00,04,07,2002,00,00*60");
        assert!(sentence.is_unsupported());
        assert_eq!(sentence.type_name(), "GPZDA");

        let ais = decode_line("!AIVDM,1,1,,A,13aEOK?P00PD2wVMdLDRhgvL289?,0*26");
        assert!(ais.is_unsupported());
    }

    #[test]
    fn test_gga_kinds() {
        let sentence =
            decode_line("$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47");
        assert!(sentence.kinds().contains(&DataKind::FixData));
        assert!(sentence.is_primary());
    }
}
