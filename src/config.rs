// ⚙️ Configuration - TOML file, every field defaulted
//
//   [paths]     database, ceo_csv, financials_csv, export_dir
//   [analysis]  metric, window_radius
//   [logging]   level, json
//   [[calendar]] name, ein (optional), years
//
// Without [[calendar]] entries the built-in calendar is used.

use crate::events::{CalendarEntry, EventCalendar};
use crate::pipeline::AnalysisSettings;
use crate::records::Metric;
use crate::windowing::DEFAULT_WINDOW_RADIUS;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "cu-comp.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub analysis: AnalysisConfig,
    pub logging: LoggingConfig,
    pub calendar: Vec<CalendarEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub database: PathBuf,
    pub ceo_csv: Option<PathBuf>,
    pub financials_csv: Option<PathBuf>,
    pub export_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        PathsConfig {
            database: PathBuf::from("workbook.db"),
            ceo_csv: None,
            financials_csv: None,
            export_dir: PathBuf::from("export"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub metric: Metric,
    pub window_radius: i32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            metric: Metric::TotalCompensation,
            window_radius: DEFAULT_WINDOW_RADIUS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&contents).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        if config.analysis.window_radius < 1 {
            anyhow::bail!("analysis.window_radius must be at least 1 (got {})", config.analysis.window_radius);
        }
        Ok(config)
    }

    /// Explicit path must exist; the default file is optional
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(DEFAULT_CONFIG_FILE),
            None => Ok(Config::default()),
        }
    }

    pub fn settings(&self) -> AnalysisSettings {
        AnalysisSettings {
            metric: self.analysis.metric,
            window_radius: self.analysis.window_radius,
        }
    }

    /// Export target for `report --export [DIR]`: an explicit directory wins,
    /// a bare flag falls back to `paths.export_dir`, no flag means no export.
    pub fn export_dir_for(&self, flag: Option<Option<PathBuf>>) -> Option<PathBuf> {
        flag.map(|dir| dir.unwrap_or_else(|| self.paths.export_dir.clone()))
    }

    pub fn event_calendar(&self) -> EventCalendar {
        if self.calendar.is_empty() {
            EventCalendar::builtin()
        } else {
            let entries = self
                .calendar
                .iter()
                .cloned()
                .map(|entry| match entry.ein.clone() {
                    Some(ein) => entry.with_ein(&ein),
                    None => entry,
                })
                .collect();
            EventCalendar::from_entries(entries)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_from_empty_file() {
        let config = Config::from_toml("").unwrap();

        assert_eq!(config.paths.database, PathBuf::from("workbook.db"));
        assert_eq!(config.analysis.metric, Metric::TotalCompensation);
        assert_eq!(config.analysis.window_radius, 3);
        assert_eq!(config.event_calendar().len(), 21);
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_toml(
            r#"
            [paths]
            database = "data/cu.db"
            ceo_csv = "data/CEO_Comp.csv"

            [analysis]
            metric = "net_income"
            window_radius = 2

            [logging]
            level = "debug"
            json = true

            [[calendar]]
            name = "Advia Credit Union"
            ein = "38-1686050"
            years = [2016, 2017]
            "#,
        )
        .unwrap();

        assert_eq!(config.paths.ceo_csv, Some(PathBuf::from("data/CEO_Comp.csv")));
        assert_eq!(config.settings().metric, Metric::NetIncome);
        assert_eq!(config.settings().window_radius, 2);
        assert!(config.logging.json);

        let calendar = config.event_calendar();
        assert_eq!(calendar.len(), 1);
        assert!(calendar.years_for("381686050", "anything").is_some());
    }

    #[test]
    fn test_export_dir_fallback() {
        let config = Config::from_toml("[paths]\nexport_dir = \"out/tables\"\n").unwrap();

        assert_eq!(config.export_dir_for(None), None);
        assert_eq!(config.export_dir_for(Some(None)), Some(PathBuf::from("out/tables")));
        assert_eq!(
            config.export_dir_for(Some(Some(PathBuf::from("elsewhere")))),
            Some(PathBuf::from("elsewhere"))
        );
        assert_eq!(Config::default().export_dir_for(Some(None)), Some(PathBuf::from("export")));
    }

    #[test]
    fn test_rejects_zero_radius() {
        assert!(Config::from_toml("[analysis]\nwindow_radius = 0").is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[logging]\nlevel = \"warn\"").unwrap();
        file.flush().unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.logging.level, "warn");
        assert!(Config::load(Some(Path::new("/nonexistent/cu-comp.toml"))).is_err());
    }
}
