//! Hint records produced by rule engines that lint timeline records.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Hint severity. Lower values are more severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Severity {
    Validation = 0,
    Critical = 1,
    Warning = 2,
    Info = 3,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Validation => "Validation",
            Severity::Critical => "Critical",
            Severity::Warning => "Warning",
            Severity::Info => "Info",
        }
    }
}

impl TryFrom<u8> for Severity {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Severity::Validation),
            1 => Ok(Severity::Critical),
            2 => Ok(Severity::Warning),
            3 => Ok(Severity::Info),
            other => Err(format!("hint severity out of range: {}", other)),
        }
    }
}

impl From<Severity> for u8 {
    fn from(severity: Severity) -> u8 {
        severity as u8
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn unset_ref() -> i64 {
    -1
}

/// A single hint attached to a timeline record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HintRecord {
    pub hintlet_rule: String,
    #[serde(default)]
    pub description: String,
    pub severity: Severity,
    /// Sequence number of the record this hint refers to, `-1` if unset.
    #[serde(default = "unset_ref")]
    pub ref_record: i64,
    #[serde(default)]
    pub timestamp: f64,
}

impl HintRecord {
    /// The referenced record's sequence, if one was set.
    pub fn ref_sequence(&self) -> Option<u64> {
        u64::try_from(self.ref_record).ok()
    }

    /// Most severe level among `hints`, or `Info` when there are none.
    pub fn most_severe(hints: &[HintRecord]) -> Severity {
        hints
            .iter()
            .map(|h| h.severity)
            .min()
            .unwrap_or(Severity::Info)
    }
}

impl fmt::Display for HintRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rule: {} Description: {}",
            self.hintlet_rule, self.description
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hint(severity: Severity) -> HintRecord {
        HintRecord {
            hintlet_rule: "Long duration events".to_string(),
            description: "Event took 120ms".to_string(),
            severity,
            ref_record: 4,
            timestamp: 10.0,
        }
    }

    #[test]
    fn most_severe_picks_lowest_value() {
        let hints = vec![hint(Severity::Info), hint(Severity::Critical), hint(Severity::Warning)];
        assert_eq!(HintRecord::most_severe(&hints), Severity::Critical);
        assert_eq!(HintRecord::most_severe(&[]), Severity::Info);
    }

    #[test]
    fn display_form() {
        assert_eq!(
            hint(Severity::Warning).to_string(),
            "Rule: Long duration events Description: Event took 120ms"
        );
        assert_eq!(Severity::Validation.to_string(), "Validation");
    }

    #[test]
    fn deserialize_with_defaults() {
        let json = r#"{"hintletRule":"Total Bytes Downloaded","severity":2}"#;
        let h: HintRecord = serde_json::from_str(json).unwrap();
        assert_eq!(h.severity, Severity::Warning);
        assert_eq!(h.ref_record, -1);
        assert_eq!(h.ref_sequence(), None);
        assert!(serde_json::from_str::<HintRecord>(r#"{"hintletRule":"x","severity":9}"#).is_err());
    }
}
