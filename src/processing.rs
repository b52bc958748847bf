use crate::config::{ColumnConfig, CountColumn};
use crate::types::{FilterState, MergedFeature, TabularRecord};
use chrono::NaiveDate;
use geo::MultiPolygon;
use geojson::Feature;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

/// Left join of boundary features with the tabular rows on the township key.
/// Output order and length follow the boundary file.
pub fn join_features(
    features: Vec<Feature>,
    records: &[TabularRecord],
    join_column_shape: &str,
    columns: &ColumnConfig,
) -> Vec<MergedFeature> {
    let merged: Vec<MergedFeature> = features
        .into_par_iter()
        .map(|feature| merge_feature(feature, records, join_column_shape, columns))
        .collect();

    let matched = merged.iter().filter(|f| f.record.is_some()).count();
    info!(
        features = merged.len(),
        matched,
        unmatched = merged.len() - matched,
        "Joined boundaries with tabular rows"
    );
    merged
}

fn merge_feature(
    feature: Feature,
    records: &[TabularRecord],
    join_column_shape: &str,
    columns: &ColumnConfig,
) -> MergedFeature {
    let mut properties = feature.properties.unwrap_or_default();

    let township = match properties.get(join_column_shape) {
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    // First match wins; later rows with the same key are ignored.
    let record = township.as_deref().and_then(|id| {
        records
            .iter()
            .find(|r| r.get(&columns.township).map(String::as_str) == Some(id))
            .cloned()
    });

    if let Some(record) = &record {
        for (key, value) in record {
            properties.insert(key.clone(), serde_json::Value::String(value.clone()));
        }
    } else {
        debug!(township = ?township, "No tabular row for boundary feature");
    }

    let total_time = record
        .as_ref()
        .and_then(|r| r.get(&columns.time))
        .map(|v| parse_count(v))
        .unwrap_or(0);

    let shape = feature.geometry.as_ref().and_then(to_multipolygon);

    MergedFeature {
        township,
        properties,
        record,
        geometry: feature.geometry,
        shape,
        total_time,
    }
}

fn to_multipolygon(geometry: &geojson::Geometry) -> Option<MultiPolygon<f64>> {
    let geometry: geo::Geometry<f64> = geometry.value.clone().try_into().ok()?;
    match geometry {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon::new(vec![p])),
        _ => None,
    }
}

/// Optional sign then leading digits; anything else is 0.
pub fn parse_count(value: &str) -> i64 {
    let value = value.trim();
    let (sign, digits) = match value.as_bytes().first() {
        Some(b'-') => (-1, &value[1..]),
        Some(b'+') => (1, &value[1..]),
        _ => (1, value),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end]
        .parse::<i64>()
        .map(|n| sign * n)
        .unwrap_or(0)
}

pub fn parse_date(value: &str, formats: &[String]) -> Option<NaiveDate> {
    let value = value.trim();
    formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

pub fn filter_features<'a>(
    filter: &FilterState,
    features: &'a [MergedFeature],
    columns: &ColumnConfig,
    date_formats: &[String],
) -> Vec<&'a MergedFeature> {
    features
        .iter()
        .filter(|f| matches_filter(filter, f, columns, date_formats))
        .collect()
}

pub fn matches_filter(
    filter: &FilterState,
    feature: &MergedFeature,
    columns: &ColumnConfig,
    date_formats: &[String],
) -> bool {
    within_dates(filter, feature.field(&columns.date), date_formats)
        && filter.state.matches(feature.field(&columns.state))
        && filter.township.matches(feature.field(&columns.township))
        && filter.group.matches(feature.field(&columns.group))
}

fn within_dates(filter: &FilterState, value: Option<&str>, formats: &[String]) -> bool {
    if filter.date_start.is_none() && filter.date_end.is_none() {
        return true;
    }
    let Some(date) = value.and_then(|v| parse_date(v, formats)) else {
        return false;
    };
    filter.date_start.map_or(true, |start| date >= start)
        && filter.date_end.map_or(true, |end| date <= end)
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CountTotal {
    pub column: String,
    pub id: String,
    pub total: i64,
}

pub fn summarize(features: &[&MergedFeature], counts: &[CountColumn]) -> Vec<CountTotal> {
    counts
        .iter()
        .map(|count| CountTotal {
            column: count.column.clone(),
            id: count.id.clone(),
            total: features
                .iter()
                .map(|f| f.field(&count.column).map(parse_count).unwrap_or(0))
                .fold(0i64, i64::saturating_add),
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Headline {
    pub township: Option<String>,
    pub kind: Option<String>,
    pub headline: Option<String>,
    pub link: Option<String>,
}

pub fn headlines(features: &[&MergedFeature], columns: &ColumnConfig) -> Vec<Headline> {
    let owned = |f: &MergedFeature, column: &str| {
        f.field(column)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    features
        .iter()
        .map(|&f| Headline {
            township: f.township.clone(),
            kind: owned(f, &columns.kind),
            headline: owned(f, &columns.headline),
            link: owned(f, &columns.link),
        })
        .collect()
}
