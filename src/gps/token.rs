// src/gps/token.rs
//! NMEA sentence framing and checksum validation

use crate::error::DecodeError;
use serde::Serialize;

/// A framed but not yet interpreted NMEA sentence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    /// `$` for regular sentences, `!` for encapsulated ones (AIS).
    pub sentinel: char,
    /// Talker and sentence type as they appear on the wire, e.g. `GPGGA`.
    pub address: String,
    pub talker: String,
    pub sentence_type: String,
    /// Data fields after the address; empty strings are kept as-is.
    pub fields: Vec<String>,
    /// Declared checksum, if the line carried a `*XX` suffix.
    pub checksum: Option<String>,
}

impl Token {
    /// XOR of every byte between the sentinel and the `*`.
    pub fn computed_checksum(&self) -> u8 {
        let mut sum = checksum(&self.address);
        for field in &self.fields {
            sum ^= b',';
            sum ^= checksum(field);
        }
        sum
    }

    /// Check the declared checksum, if any, against the framed characters.
    pub fn verify_checksum(&self) -> Result<(), DecodeError> {
        let declared = match &self.checksum {
            Some(declared) => declared,
            None => return Ok(()),
        };
        let computed = self.computed_checksum();
        match u8::from_str_radix(declared, 16) {
            Ok(value) if declared.len() == 2 && value == computed => Ok(()),
            _ => Err(DecodeError::ChecksumMismatch {
                computed,
                declared: declared.clone(),
            }),
        }
    }

    /// Render the sentence back to wire form with a freshly computed checksum.
    pub fn encode(&self) -> String {
        let mut line = String::with_capacity(82);
        line.push(self.sentinel);
        line.push_str(&self.address);
        for field in &self.fields {
            line.push(',');
            line.push_str(field);
        }
        line.push_str(&format!("*{:02X}", self.computed_checksum()));
        line
    }

    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }
}

/// XOR checksum over the bytes of `body`.
pub fn checksum(body: &str) -> u8 {
    body.bytes().fold(0, |acc, b| acc ^ b)
}

/// Split a line into a token and verify its checksum.
pub fn tokenize(line: &str) -> Result<Token, DecodeError> {
    let token = tokenize_unchecked(line)?;
    token.verify_checksum()?;
    Ok(token)
}

/// Split a line into a token without looking at the checksum.
///
/// Only framing problems fail here, so callers that treat checksum
/// mismatches as advisory can still decode the fields.
pub fn tokenize_unchecked(line: &str) -> Result<Token, DecodeError> {
    let line = line.trim();
    let not_a_sentence = || DecodeError::NotASentence {
        line: line.to_string(),
    };

    let mut chars = line.chars();
    let sentinel = match chars.next() {
        Some(c @ ('$' | '!')) => c,
        _ => return Err(not_a_sentence()),
    };
    let framed = chars.as_str();

    let (body, checksum) = match framed.find('*') {
        Some(star) => (&framed[..star], Some(framed[star + 1..].trim().to_string())),
        None => (framed, None),
    };

    let mut parts = body.split(',');
    let address = parts.next().unwrap_or_default();
    if address.len() < 3 || !address.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(not_a_sentence());
    }

    Ok(Token {
        sentinel,
        address: address.to_string(),
        talker: address[..2].to_string(),
        sentence_type: address[2..].to_string(),
        fields: parts.map(str::to_string).collect(),
        checksum,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const GGA: &str = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";

    #[test]
    fn test_tokenize_gga() {
        let token = tokenize(GGA).unwrap();
        assert_eq!(token.sentinel, '$');
        assert_eq!(token.address, "GPGGA");
        assert_eq!(token.talker, "GP");
        assert_eq!(token.sentence_type, "GGA");
        assert_eq!(token.fields.len(), 14);
        assert_eq!(token.field(0), Some("123519"));
        // The field before the checksum is data, not the checksum.
        assert_eq!(token.field(13), Some(""));
        assert_eq!(token.checksum.as_deref(), Some("47"));
    }

    #[test]
    fn test_encode_reproduces_line() {
        let token = tokenize(GGA).unwrap();
        assert_eq!(token.encode(), GGA);

        let rmc = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A";
        assert_eq!(tokenize(rmc).unwrap().encode(), rmc);
    }

    #[test]
    fn test_checksum_mismatch_is_reported() {
        let bad = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*48";
        let err = tokenize(bad).unwrap_err();
        assert_eq!(
            err,
            DecodeError::ChecksumMismatch {
                computed: 0x47,
                declared: "48".to_string()
            }
        );

        // Framing is still fine, so the fields remain available.
        let token = tokenize_unchecked(bad).unwrap();
        assert_eq!(token.field(1), Some("4807.038"));
    }

    #[test]
    fn test_non_hex_checksum_is_a_mismatch() {
        let err = tokenize("$GPVTG,054.7,T,034.4,M,005.5,N,010.2,K,A*ZZ").unwrap_err();
        assert!(err.is_checksum());
    }

    #[test]
    fn test_missing_checksum_is_accepted() {
        let token = tokenize("$GPVTG,054.7,T,034.4,M,005.5,N,010.2,K,A\r\n").unwrap();
        assert_eq!(token.checksum, None);
        assert_eq!(token.field(8), Some("A"));
    }

    #[test]
    fn test_not_a_sentence() {
        assert_eq!(
            tokenize("not-nmea").unwrap_err(),
            DecodeError::NotASentence {
                line: "not-nmea".to_string()
            }
        );
        assert!(matches!(tokenize(""), Err(DecodeError::NotASentence { .. })));
        assert!(matches!(tokenize("$G,1,2"), Err(DecodeError::NotASentence { .. })));
    }

    #[test]
    fn test_encapsulated_sentence_and_unknown_talker() {
        let token = tokenize("!AIVDM,1,1,,A,13aEOK?P00PD2wVMdLDRhgvL289?,0*26").unwrap();
        assert_eq!(token.sentinel, '!');
        assert_eq!(token.talker, "AI");
        assert_eq!(token.sentence_type, "VDM");
        assert_eq!(token.fields.len(), 6);
    }
}
