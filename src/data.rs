use crate::config::{AppConfig, SheetsConfig, TabularSource};
use crate::types::TabularRecord;
use anyhow::{anyhow, Context, Result};
use csv::ReaderBuilder;
use geojson::{Feature, GeoJson};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Fetch the tabular rows and the boundary features concurrently.
/// Either one failing fails the whole load.
pub async fn load_sources(config: &AppConfig) -> Result<(Vec<TabularRecord>, Vec<Feature>)> {
    let (records, features) = tokio::try_join!(
        load_tabular(&config.tabular),
        load_boundaries(&config.input.boundaries)
    )?;
    info!(
        records = records.len(),
        features = features.len(),
        "Loaded tabular rows and boundaries"
    );
    Ok((records, features))
}

pub async fn load_tabular(source: &TabularSource) -> Result<Vec<TabularRecord>> {
    match source {
        TabularSource::Sheets(sheets) => fetch_sheet(sheets).await,
        TabularSource::Csv { path } => {
            let path = path.clone();
            tokio::task::spawn_blocking(move || load_csv(&path))
                .await
                .context("CSV loader task panicked")?
        }
    }
}

// Sheets values API response. Cells are normally strings but UNFORMATTED
// renders can return numbers or booleans.
#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

const API_KEY_HEADER: &str = "x-goog-api-key";

async fn fetch_sheet(sheets: &SheetsConfig) -> Result<Vec<TabularRecord>> {
    let mut url = reqwest::Url::parse(&sheets.base_url)
        .with_context(|| format!("Invalid Sheets base URL: {}", sheets.base_url))?;
    url.path_segments_mut()
        .map_err(|_| anyhow!("Sheets base URL cannot carry a path: {}", sheets.base_url))?
        .pop_if_empty()
        .extend([
            "v4",
            "spreadsheets",
            sheets.spreadsheet_id.as_str(),
            "values",
            sheets.range.as_str(),
        ]);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(sheets.timeout_secs))
        .build()
        .context("Failed to build HTTP client")?;

    // Credentials stay out of the URL
    let mut request = client.get(url);
    if let Some(key) = &sheets.api_key {
        request = request.header(API_KEY_HEADER, key);
    }
    if let Some(token) = &sheets.bearer_token {
        request = request.bearer_auth(token);
    }

    info!(spreadsheet = %sheets.spreadsheet_id, range = %sheets.range, "Fetching sheet");
    let response = request
        .send()
        .await
        .map_err(reqwest::Error::without_url)
        .context("Sheets request failed")?
        .error_for_status()
        .map_err(reqwest::Error::without_url)
        .context("Sheets request returned an error status")?;
    let body: ValueRange = response
        .json()
        .await
        .context("Failed to decode Sheets response")?;

    let rows = body
        .values
        .into_iter()
        .map(|row| row.into_iter().map(cell_to_string).collect())
        .collect();
    rows_to_records(rows)
}

fn cell_to_string(cell: serde_json::Value) -> String {
    match cell {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Row 0 holds header names. Short rows lack their trailing columns.
pub fn rows_to_records(rows: Vec<Vec<String>>) -> Result<Vec<TabularRecord>> {
    let mut rows = rows.into_iter();
    let headers = rows
        .next()
        .ok_or_else(|| anyhow!("Tabular source has no header row"))?;

    Ok(rows
        .map(|row| {
            headers
                .iter()
                .zip(row)
                .map(|(header, cell)| (header.clone(), cell))
                .collect()
        })
        .collect())
}

pub fn load_csv(path: &Path) -> Result<Vec<TabularRecord>> {
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV file: {:?}", path))?;

    let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    let mut rows = vec![headers];
    for result in rdr.records() {
        let record = result.with_context(|| format!("Malformed CSV row in {:?}", path))?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    rows_to_records(rows)
}

pub async fn load_boundaries(path: &Path) -> Result<Vec<Feature>> {
    info!("Loading boundaries from {:?}...", path);
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to open GeoJSON file: {:?}", path))?;
    parse_boundaries(&content)
}

pub fn parse_boundaries(content: &str) -> Result<Vec<Feature>> {
    let geojson: GeoJson = content.parse().context("Failed to parse GeoJSON")?;
    match geojson {
        GeoJson::FeatureCollection(fc) => Ok(fc.features),
        _ => Err(anyhow!("GeoJSON must be a FeatureCollection")),
    }
}
