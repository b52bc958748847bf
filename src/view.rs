use crate::cascade::FilterOptions;
use crate::config::AppConfig;
use crate::processing::{self, CountTotal, Headline};
use crate::spatial::SpatialIndex;
use crate::style::{self, FeatureStyle, Legend, Popup, Scale};
use crate::types::{FilterEvent, FilterState, MergedFeature, TabularRecord};
use anyhow::Result;
use geojson::{Feature, FeatureCollection, JsonObject};
use serde::Serialize;
use tracing::{debug, info};

pub struct Dataset {
    pub config: AppConfig,
    pub records: Vec<TabularRecord>,
    pub features: Vec<MergedFeature>,
    pub index: SpatialIndex,
}

#[derive(Debug, Clone, Serialize)]
pub struct ViewSnapshot {
    pub filter: FilterState,
    pub options: FilterOptions,
    pub summary: Vec<CountTotal>,
    pub headlines: Vec<Headline>,
    pub legend: Legend,
    // Each feature carries `style` and `popup` in its properties
    pub layer: FeatureCollection,
}

impl Dataset {
    pub async fn load(config: AppConfig) -> Result<Self> {
        let (records, features) = crate::data::load_sources(&config).await?;
        Ok(Self::from_sources(config, records, features))
    }

    pub fn from_sources(config: AppConfig, records: Vec<TabularRecord>, features: Vec<Feature>) -> Self {
        let features = processing::join_features(
            features,
            &records,
            &config.input.join_column_shape,
            &config.columns,
        );
        let index = SpatialIndex::build(&features);
        Self {
            config,
            records,
            features,
            index,
        }
    }

    pub fn filtered(&self, filter: &FilterState) -> Vec<&MergedFeature> {
        processing::filter_features(
            filter,
            &self.features,
            &self.config.columns,
            &self.config.filters.date_formats,
        )
    }

    pub fn snapshot(&self, filter: &FilterState) -> ViewSnapshot {
        let columns = &self.config.columns;
        // 1. Filter and rescale
        let filtered = self.filtered(filter);
        let scale = Scale::from_features(&filtered);
        debug!(filtered = filtered.len(), max = ?scale.max, "Building view snapshot");

        // 2. Styled layer
        let layer = FeatureCollection {
            bbox: None,
            features: filtered
                .iter()
                .map(|f| self.layer_feature(f, &scale))
                .collect(),
            foreign_members: None,
        };

        // 3. Options, counters, headlines, legend
        ViewSnapshot {
            filter: filter.clone(),
            options: FilterOptions::for_filter(&self.records, filter, columns),
            summary: processing::summarize(&filtered, &columns.counts),
            headlines: processing::headlines(&filtered, columns),
            legend: style::legend(&scale, &self.config.style),
            layer,
        }
    }

    /// Apply one UI event and return the new filter with its view.
    pub fn dispatch(&self, filter: FilterState, event: FilterEvent) -> (FilterState, ViewSnapshot) {
        info!(?event, "Filter changed");
        let filter = filter.apply(event);
        let snapshot = self.snapshot(&filter);
        (filter, snapshot)
    }

    pub fn popup_at(&self, lon: f64, lat: f64) -> Option<Popup> {
        let index = self.index.locate(&self.features, lon, lat)?;
        Some(style::popup(&self.features[index], &self.config.columns))
    }

    fn layer_feature(&self, feature: &MergedFeature, scale: &Scale) -> Feature {
        let fill: FeatureStyle = style::feature_style(feature, scale, &self.config.style);
        let popup = style::popup(feature, &self.config.columns);

        let mut properties: JsonObject = feature.properties.clone();
        properties.insert("totalTime".to_string(), feature.total_time.into());
        properties.insert(
            "style".to_string(),
            serde_json::to_value(fill).unwrap_or_default(),
        );
        properties.insert(
            "popup".to_string(),
            serde_json::to_value(popup).unwrap_or_default(),
        );

        Feature {
            bbox: None,
            geometry: feature.geometry.clone(),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        }
    }
}
