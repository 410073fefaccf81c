//! Dump settings
//!
//! Loaded from an optional JSON file. Missing fields take their defaults;
//! command-line flags override individual fields afterwards.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// How captured frames are encoded in the input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    /// One capture frame per line as hex digits
    #[default]
    Hex,
    /// Raw serial bytes from the sniffer, SLIP framed
    Slip,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub format: InputFormat,
    /// Board id prepended to serial packets read from a SLIP stream
    pub board_id: u8,
    /// Pretty-print JSON output
    pub pretty: bool,
    /// Emit a record for frames that fail to decode instead of skipping them
    pub report_errors: bool,
    /// Log filter used when RUST_LOG is not set
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            format: InputFormat::Hex,
            board_id: 0,
            pretty: false,
            report_errors: true,
            log_filter: "btle_dump=info,btle_protocol=warn".to_string(),
        }
    }
}

impl Settings {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Load settings from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("Invalid settings in {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.format, InputFormat::Hex);
        assert!(settings.report_errors);
        assert!(!settings.pretty);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let settings = Settings::from_json(r#"{ "format": "slip", "board_id": 3 }"#).unwrap();
        assert_eq!(settings.format, InputFormat::Slip);
        assert_eq!(settings.board_id, 3);
        assert!(settings.report_errors);
        assert_eq!(settings.log_filter, Settings::default().log_filter);
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(Settings::from_json(r#"{ "baud_rate": 1000000 }"#).is_err());
    }

    #[test]
    fn test_round_trip() {
        let settings = Settings {
            pretty: true,
            report_errors: false,
            ..Default::default()
        };
        let json = serde_json::to_string(&settings).unwrap();
        assert_eq!(Settings::from_json(&json).unwrap(), settings);
    }

    #[test]
    fn test_missing_file() {
        let err = Settings::load(Path::new("/nonexistent/btle-dump.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read settings"));
    }
}
