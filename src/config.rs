use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    pub tabular: TabularSource,
    #[serde(default)]
    pub columns: ColumnConfig,
    #[serde(default)]
    pub filters: FilterConfig,
    #[serde(default)]
    pub style: StyleConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub render: RenderConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub boundaries: PathBuf,
    #[serde(default = "default_township_column")]
    pub join_column_shape: String,
}

/// Where the incident rows come from. Row 0 is always the header.
#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum TabularSource {
    Sheets(SheetsConfig),
    Csv { path: PathBuf },
}

#[derive(Debug, Deserialize, Clone)]
pub struct SheetsConfig {
    #[serde(default = "default_sheets_url")]
    pub base_url: String,
    pub spreadsheet_id: String,
    pub range: String,
    pub api_key: Option<String>,
    pub bearer_token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ColumnConfig {
    pub township: String,
    pub state: String,
    pub group: String,
    pub date: String,
    pub time: String,
    pub headline: String,
    pub kind: String,
    pub link: String,
    pub counts: Vec<CountColumn>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct CountColumn {
    pub column: String,
    pub id: String,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        let count = |column: &str, id: &str| CountColumn {
            column: column.to_string(),
            id: id.to_string(),
        };
        Self {
            township: default_township_column(),
            state: "ST_MMR".to_string(),
            group: "Group".to_string(),
            date: "Date".to_string(),
            time: "Time".to_string(),
            headline: "Headline".to_string(),
            kind: "Type".to_string(),
            link: "Link".to_string(),
            counts: vec![
                count("Killed", "killed"),
                count("Injured", "injured"),
                count("Arrested", "arrested"),
                count("Displaced", "displaced"),
            ],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FilterConfig {
    /// chrono patterns tried in order when reading the date column.
    pub date_formats: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            date_formats: vec!["%Y-%m-%d".to_string(), "%m/%d/%Y".to_string()],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StyleConfig {
    pub hue: f64,
    pub saturation: f64,
    pub neutral_fill: String, // Hex code
    pub background: String,
    pub border: String,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            hue: 0.0,
            saturation: 100.0,
            neutral_fill: "#cccccc".to_string(),
            background: "#ffffff".to_string(),
            border: "#555555".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct MapConfig {
    pub center: [f64; 2], // [lat, lon]
    pub zoom: u8,
    pub tile_url: String,
    pub attribution: String,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            center: [19.75, 96.1],
            zoom: 6,
            tile_url: "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            attribution: "&copy; OpenStreetMap contributors".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub web_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            web_dir: PathBuf::from("web"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RenderConfig {
    pub width: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self { width: 1024 }
    }
}

fn default_township_column() -> String {
    "TS_MMR_DASH".to_string()
}

fn default_sheets_url() -> String {
    "https://sheets.googleapis.com".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [input]
            boundaries = "data/townships.geojson"

            [tabular]
            source = "csv"
            path = "data/incidents.csv"
            "#,
        )
        .unwrap();

        assert_eq!(config.input.join_column_shape, "TS_MMR_DASH");
        assert_eq!(config.columns.counts.len(), 4);
        assert_eq!(config.server.port, 3000);
        assert!(matches!(config.tabular, TabularSource::Csv { .. }));
    }

    #[test]
    fn test_sheets_source() {
        let config = AppConfig::from_toml(
            r#"
            [input]
            boundaries = "townships.geojson"

            [tabular]
            source = "sheets"
            spreadsheet_id = "abc123"
            range = "Incidents!A1:Z"
            api_key = "secret"

            [columns]
            group = "Perpetrator"
            "#,
        )
        .unwrap();

        match config.tabular {
            TabularSource::Sheets(sheets) => {
                assert_eq!(sheets.base_url, "https://sheets.googleapis.com");
                assert_eq!(sheets.api_key.as_deref(), Some("secret"));
                assert_eq!(sheets.timeout_secs, 30);
            }
            other => panic!("unexpected source {:?}", other),
        }
        assert_eq!(config.columns.group, "Perpetrator");
        assert_eq!(config.columns.state, "ST_MMR");
    }

    #[test]
    fn test_shipped_config_parses() {
        let config = AppConfig::from_toml(include_str!("../config.toml")).unwrap();
        assert!(matches!(config.tabular, TabularSource::Sheets(_)));
        let ids: Vec<_> = config.columns.counts.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["killed", "injured", "arrested", "displaced"]);
        assert_eq!(config.style.hue, 0.0);
    }

    #[test]
    fn test_missing_tabular_section_fails() {
        let err = AppConfig::from_toml("[input]\nboundaries = \"a.geojson\"\n");
        assert!(err.is_err());
    }
}
