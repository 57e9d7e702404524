use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

pub const MIN_PLATE_LEN: usize = 5;
pub const MAX_PLATE_LEN: usize = 8;

/// Uppercases `input` and drops everything that is not an ASCII letter or digit.
pub fn normalize(input: &str) -> String {
    input
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// A normalized plate number of 5 to 8 uppercase alphanumerics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlateNumber(String);

impl PlateNumber {
    pub fn parse(input: &str) -> Result<Self> {
        let plate = normalize(input);
        if plate.is_empty() {
            return Err(Error::InvalidPlate {
                plate: input.to_string(),
                reason: "no letters or digits",
            });
        }
        if plate.len() < MIN_PLATE_LEN {
            return Err(Error::InvalidPlate {
                plate: input.to_string(),
                reason: "shorter than 5 characters",
            });
        }
        if plate.len() > MAX_PLATE_LEN {
            return Err(Error::InvalidPlate {
                plate: input.to_string(),
                reason: "longer than 8 characters",
            });
        }
        Ok(PlateNumber(plate))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for PlateNumber {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        PlateNumber::parse(s)
    }
}

impl AsRef<str> for PlateNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlateNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<PlateNumber> for String {
    fn from(plate: PlateNumber) -> String {
        plate.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separators_and_case_are_normalized_away() {
        for input in &["abc-1234", "ABC1234", "abc 1234", " a.b.c 12-34 "] {
            assert_eq!(PlateNumber::parse(input).unwrap().as_str(), "ABC1234");
        }
    }

    #[test]
    fn length_bounds_are_inclusive() {
        assert!(PlateNumber::parse("ab-123").is_ok());
        assert!(PlateNumber::parse("abcd1234").is_ok());
        assert!(PlateNumber::parse("ab12").is_err());
        assert!(PlateNumber::parse("abcd12345").is_err());
    }

    #[test]
    fn punctuation_only_input_is_rejected() {
        match PlateNumber::parse("--- ---") {
            Err(Error::InvalidPlate { plate, .. }) => assert_eq!(plate, "--- ---"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn non_ascii_characters_do_not_count_towards_length() {
        assert_eq!(normalize("äbc1234"), "BC1234");
        assert!(PlateNumber::parse("ÄÖÜ12").is_err());
    }
}
