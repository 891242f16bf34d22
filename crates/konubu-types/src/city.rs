use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A city code exactly as it was written to a document.
///
/// Clients have stored plate codes as integers, as strings and as zero-padded
/// strings over time, so the raw JSON type is preserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CityValue {
    Number(i64),
    Text(String),
}

impl CityValue {
    /// JSON type name as reported by SQLite's `json_each`.
    pub fn json_type(&self) -> &'static str {
        match self {
            Self::Number(_) => "integer",
            Self::Text(_) => "text",
        }
    }
}

impl fmt::Display for CityValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for CityValue {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for CityValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid city plate code: {raw}")]
pub struct InvalidCityCode {
    pub raw: String,
}

/// Normalized numeric city (plate) code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CityCode(u32);

impl CityCode {
    pub fn new(code: u32) -> Self {
        Self(code)
    }

    /// Parse a raw value the way clients have been writing it: integers as-is,
    /// strings by their leading decimal digits after leading whitespace.
    pub fn parse(raw: &CityValue) -> Result<Self, InvalidCityCode> {
        let invalid = || InvalidCityCode { raw: raw.to_string() };
        match raw {
            CityValue::Number(n) => u32::try_from(*n).map(Self).map_err(|_| invalid()),
            CityValue::Text(s) => {
                let digits: String = s
                    .trim_start()
                    .chars()
                    .take_while(|c| c.is_ascii_digit())
                    .collect();
                digits.parse::<u32>().map(Self).map_err(|_| invalid())
            }
        }
    }

    pub fn value(self) -> u32 {
        self.0
    }

    /// Every stored representation that denotes this city. The padded form
    /// only exists for single-digit codes.
    pub fn probes(self) -> Vec<CityValue> {
        let mut probes = vec![
            CityValue::Number(i64::from(self.0)),
            CityValue::Text(self.0.to_string()),
        ];
        if self.0 < 10 {
            probes.push(CityValue::Text(format!("0{}", self.0)));
        }
        probes
    }

    pub fn matches(self, value: &CityValue) -> bool {
        self.probes().iter().any(|p| p == value)
    }
}

impl fmt::Display for CityCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_digit_code_has_three_forms() {
        let code = CityCode::new(5);
        assert!(code.matches(&CityValue::Number(5)));
        assert!(code.matches(&CityValue::from("5")));
        assert!(code.matches(&CityValue::from("05")));
        assert!(!code.matches(&CityValue::Number(50)));
        assert_eq!(code.probes().len(), 3);
    }

    #[test]
    fn two_digit_code_is_not_padded() {
        let code = CityCode::new(34);
        assert!(code.matches(&CityValue::Number(34)));
        assert!(code.matches(&CityValue::from("34")));
        assert!(!code.matches(&CityValue::from("034")));
        assert_eq!(code.probes().len(), 2);
    }

    #[test]
    fn parse_accepts_all_stored_forms() {
        assert_eq!(CityCode::parse(&CityValue::Number(6)).unwrap().value(), 6);
        assert_eq!(CityCode::parse(&CityValue::from("06")).unwrap().value(), 6);
        assert_eq!(CityCode::parse(&CityValue::from(" 34")).unwrap().value(), 34);
        assert_eq!(CityCode::parse(&CityValue::from("7 istanbul")).unwrap().value(), 7);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(CityCode::parse(&CityValue::from("ankara")).is_err());
        assert!(CityCode::parse(&CityValue::from("")).is_err());
        assert!(CityCode::parse(&CityValue::Number(-3)).is_err());
    }

    #[test]
    fn raw_values_keep_their_json_type() {
        let values: Vec<CityValue> = serde_json::from_str(r#"[6, "6", "06"]"#).unwrap();
        assert_eq!(values[0].json_type(), "integer");
        assert_eq!(values[1], CityValue::from("6"));
        assert_eq!(values[2].to_string(), "06");
    }
}
