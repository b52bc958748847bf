use crate::config::{ColumnConfig, StyleConfig};
use crate::types::MergedFeature;
use serde::Serialize;

pub const MIN_LIGHTNESS: f64 = 50.0;
pub const MAX_LIGHTNESS: f64 = 100.0;

/// Intensity scale for the currently filtered set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Scale {
    // None for an empty filtered set
    pub max: Option<i64>,
}

impl Scale {
    pub fn from_features(features: &[&MergedFeature]) -> Self {
        Self {
            max: features.iter().map(|f| f.total_time).max(),
        }
    }

    pub fn lightness(&self, value: i64) -> Option<f64> {
        self.max.map(|max| lightness(value, max))
    }
}

/// 100% at zero intensity down to 50% at the maximum.
pub fn lightness(value: i64, max: i64) -> f64 {
    if max <= 0 {
        return MAX_LIGHTNESS;
    }
    let l = MAX_LIGHTNESS - (value as f64 / max as f64) * (MAX_LIGHTNESS - MIN_LIGHTNESS);
    l.clamp(MIN_LIGHTNESS, MAX_LIGHTNESS)
}

pub fn hsl_css(hue: f64, saturation: f64, lightness: f64) -> String {
    format!("hsl({}, {}%, {}%)", hue, saturation, lightness)
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FeatureStyle {
    pub fill_color: String,
    pub lightness: Option<f64>,
    pub color: String,
}

pub fn feature_style(feature: &MergedFeature, scale: &Scale, style: &StyleConfig) -> FeatureStyle {
    let lightness = scale.lightness(feature.total_time);
    let fill_color = match lightness {
        Some(l) => hsl_css(style.hue, style.saturation, l),
        None => style.neutral_fill.clone(),
    };
    FeatureStyle {
        fill_color,
        lightness,
        color: style.border.clone(),
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Popup {
    pub headline: Option<String>,
    pub label: String,
    pub total: i64,
    pub link: Option<String>,
}

pub fn popup(feature: &MergedFeature, columns: &ColumnConfig) -> Popup {
    let non_empty = |column: &str| {
        feature
            .field(column)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    let township = non_empty(&columns.township)
        .or_else(|| feature.township.clone())
        .unwrap_or_default();
    let label = match non_empty(&columns.state) {
        Some(state) => format!("{} / {}", state, township),
        None => township,
    };
    Popup {
        headline: non_empty(&columns.headline),
        label,
        total: feature.total_time,
        link: non_empty(&columns.link),
    }
}

/// Legend endpoints: zero intensity and the filtered maximum.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Legend {
    pub max: Option<i64>,
    pub low: String,
    pub high: String,
}

pub fn legend(scale: &Scale, style: &StyleConfig) -> Legend {
    match scale.max {
        Some(max) => Legend {
            max: Some(max),
            low: hsl_css(style.hue, style.saturation, MAX_LIGHTNESS),
            high: hsl_css(style.hue, style.saturation, lightness(max, max)),
        },
        None => Legend {
            max: None,
            low: style.neutral_fill.clone(),
            high: style.neutral_fill.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::join_features;
    use crate::processing::tests::{boundary, record};

    #[test]
    fn test_lightness_formula() {
        assert_eq!(lightness(50, 100), 75.0);
        assert_eq!(lightness(100, 100), 50.0);
        assert_eq!(lightness(0, 100), 100.0);
    }

    #[test]
    fn test_lightness_with_non_positive_max() {
        assert_eq!(lightness(0, 0), 100.0);
        assert_eq!(lightness(-4, -1), 100.0);
    }

    #[test]
    fn test_lightness_clamped() {
        assert_eq!(lightness(-10, 10), 100.0);
    }

    #[test]
    fn test_empty_scale_uses_neutral_fill() {
        let scale = Scale::from_features(&[]);
        assert_eq!(scale.max, None);
        assert_eq!(scale.lightness(3), None);

        let config = StyleConfig::default();
        let legend = legend(&scale, &config);
        assert_eq!(legend.low, config.neutral_fill);
        assert_eq!(legend.high, config.neutral_fill);
    }

    #[test]
    fn test_two_township_example() {
        let features = vec![boundary("town1", 0.0), boundary("town2", 1.0)];
        let records = vec![record(&[
            ("TS_MMR_DASH", "town1"),
            ("Time", "5"),
            ("ST_MMR", "S1"),
        ])];
        let columns = ColumnConfig::default();
        let merged = join_features(features, &records, "TS_MMR_DASH", &columns);
        let totals: Vec<i64> = merged.iter().map(|f| f.total_time).collect();
        assert_eq!(totals, [5, 0]);

        let all: Vec<&MergedFeature> = merged.iter().collect();
        let scale = Scale::from_features(&all);
        assert_eq!(scale.max, Some(5));

        let config = StyleConfig::default();
        let town1 = feature_style(&merged[0], &scale, &config);
        let town2 = feature_style(&merged[1], &scale, &config);
        assert_eq!(town1.lightness, Some(50.0));
        assert_eq!(town2.lightness, Some(100.0));
        assert_eq!(town2.fill_color, "hsl(0, 100%, 100%)");

        let p = popup(&merged[0], &columns);
        assert_eq!(p.label, "S1 / town1");
        assert_eq!(p.total, 5);
        assert_eq!(p.link, None);

        let p = popup(&merged[1], &columns);
        assert_eq!(p.label, "town2");
        assert_eq!(p.headline, None);
    }
}
