//! Per-kind default options applied when an action leaves them unset.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

/// Defaults table, one section per action kind.
///
/// Built once at startup (in code or from TOML, see `io::config`) and passed
/// by reference into every compilation. Missing fields take the values below.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DefaultsTable {
    #[serde(rename = "Text")]
    pub text: TextDefaults,
    #[serde(rename = "Choose")]
    pub choose: ChooseDefaults,
    #[serde(rename = "Complete")]
    pub complete: CompleteDefaults,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TextDefaults {
    /// Score literal spans against the model.
    pub evaluate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChooseDefaults {
    /// Minimum relative probability for a branch to be kept.
    pub threshold: f64,
    /// Maximum number of branches kept.
    pub width: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompleteDefaults {
    pub threshold: f64,
    pub width: u32,
    /// Search beam count.
    pub beams: u32,
    /// Lookahead horizon in tokens.
    pub ahead: u32,
    /// Beam diversity weight.
    pub diversity: f64,
    /// Repetition penalty.
    pub repetition: f64,
}

impl Default for TextDefaults {
    fn default() -> Self {
        Self { evaluate: true }
    }
}

impl Default for ChooseDefaults {
    fn default() -> Self {
        Self {
            threshold: 0.4,
            width: 2,
        }
    }
}

impl Default for CompleteDefaults {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            width: 2,
            beams: 3,
            ahead: 1,
            diversity: 1.0,
            repetition: 0.5,
        }
    }
}

impl DefaultsTable {
    pub fn validate(&self) -> Result<()> {
        check_threshold("Choose.threshold", self.choose.threshold)?;
        check_threshold("Complete.threshold", self.complete.threshold)?;
        if self.choose.width == 0 {
            return Err(anyhow!("Choose.width must be >= 1"));
        }
        if self.complete.width == 0 {
            return Err(anyhow!("Complete.width must be >= 1"));
        }
        if self.complete.beams == 0 {
            return Err(anyhow!("Complete.beams must be >= 1"));
        }
        if !self.complete.diversity.is_finite() {
            return Err(anyhow!("Complete.diversity must be finite"));
        }
        if !self.complete.repetition.is_finite() {
            return Err(anyhow!("Complete.repetition must be finite"));
        }
        Ok(())
    }
}

fn check_threshold(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(anyhow!("{name} must be within [0, 1], got {value}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_table() {
        let table = DefaultsTable::default();
        assert!(table.text.evaluate);
        assert_eq!(table.choose.threshold, 0.4);
        assert_eq!(table.choose.width, 2);
        assert_eq!(table.complete.threshold, 0.3);
        assert_eq!(table.complete.width, 2);
        assert_eq!(table.complete.beams, 3);
        assert_eq!(table.complete.ahead, 1);
        assert_eq!(table.complete.diversity, 1.0);
        assert_eq!(table.complete.repetition, 0.5);
        table.validate().expect("defaults are valid");
    }

    #[test]
    fn partial_toml_keeps_remaining_defaults() {
        let table: DefaultsTable = toml::from_str(
            r#"
            [Complete]
            beams = 5
            "#,
        )
        .expect("parse");
        assert_eq!(table.complete.beams, 5);
        assert_eq!(table.complete.width, 2);
        assert_eq!(table.choose, ChooseDefaults::default());
    }

    #[test]
    fn validate_rejects_out_of_range_threshold() {
        let mut table = DefaultsTable::default();
        table.choose.threshold = 1.2;
        let err = table.validate().expect_err("threshold");
        assert!(err.to_string().contains("Choose.threshold"));
    }

    #[test]
    fn validate_rejects_zero_beams() {
        let mut table = DefaultsTable::default();
        table.complete.beams = 0;
        assert!(table.validate().is_err());
    }
}
