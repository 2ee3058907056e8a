use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use crate::engine::DEFAULT_TIMEZONE;
use crate::ingest::Table;
use crate::model::parse_timestamp;

#[derive(Debug, Clone)]
pub struct Config {
    // Directory holding the three input CSVs
    pub data_dir: PathBuf,

    // Where finished report CSVs are written
    pub report_dir: PathBuf,

    /// Zone for stores with no (or an unknown) timezone assignment
    pub default_tz: Tz,

    // Report HTTP server port
    pub http_port: u16,

    /// Reference time override; when unset the latest observation is used
    pub now: Option<DateTime<Utc>>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env if present, ignore if missing
        Self::from_getter(|key| env::var(key).ok())
    }

    /// Parse config from a custom getter function (for testing)
    pub fn from_getter<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let default_tz = get("STOREMON_DEFAULT_TZ").unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());

        Ok(Config {
            data_dir: get("STOREMON_DATA_DIR")
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "sample_data".to_string())
                .into(),
            report_dir: get("STOREMON_REPORT_DIR")
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "reports".to_string())
                .into(),
            default_tz: default_tz
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("unknown zone {:?}", default_tz))
                .context("STOREMON_DEFAULT_TZ must be an IANA timezone name")?,
            http_port: get("STOREMON_HTTP_PORT")
                .unwrap_or_else(|| "8000".to_string())
                .parse()
                .context("STOREMON_HTTP_PORT must be a valid port number")?,
            now: get("STOREMON_NOW")
                .filter(|s| !s.trim().is_empty())
                .map(|s| parse_timestamp(&s))
                .transpose()
                .context("STOREMON_NOW must be an RFC 3339 timestamp")?,
        })
    }

    /// Create config from a HashMap (convenience for testing)
    #[cfg(test)]
    pub fn from_map(map: &HashMap<&str, &str>) -> Result<Self> {
        Self::from_getter(|key| map.get(key).map(|v| v.to_string()))
    }

    /// Validate configuration values at startup.
    /// Returns Ok(()) if all validations pass, or Err with details of what failed.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if !self.data_dir.is_dir() {
            errors.push(format!(
                "STOREMON_DATA_DIR '{}' is not a directory.",
                self.data_dir.display()
            ));
        } else {
            let missing = Self::missing_tables(&self.data_dir);
            if missing.len() == Table::ALL.len() {
                errors.push(format!(
                    "STOREMON_DATA_DIR '{}' contains none of {}.",
                    self.data_dir.display(),
                    missing.join(", ")
                ));
            }
        }

        if self.report_dir.exists() && !self.report_dir.is_dir() {
            errors.push(format!(
                "STOREMON_REPORT_DIR '{}' exists but is not a directory.",
                self.report_dir.display()
            ));
        }

        if self.http_port == 0 {
            errors.push("STOREMON_HTTP_PORT must be greater than 0.".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )
        }
    }

    /// Input files absent from `dir`
    fn missing_tables(dir: &Path) -> Vec<&'static str> {
        Table::ALL
            .iter()
            .map(|t| t.file_name())
            .filter(|name| !dir.join(name).is_file())
            .collect()
    }
}



/// Kani formal verification proofs
#[cfg(kani)]
mod kani_proofs {
    #[kani::proof]
    fn port_parsing_never_panics() {
        let port_str: [u8; 8] = kani::any();
        if let Ok(s) = std::str::from_utf8(&port_str) {
            let _ = s.parse::<u16>();
        }
    }
}
