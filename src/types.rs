use chrono::NaiveDate;
use geo::MultiPolygon;
use geojson::JsonObject;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type TabularRecord = BTreeMap<String, String>;

/// A boundary feature after the left join with the tabular rows.
#[derive(Debug, Clone)]
pub struct MergedFeature {
    pub township: Option<String>,
    // Boundary properties overlaid with the matched record's fields
    pub properties: JsonObject,
    pub record: Option<TabularRecord>,
    pub geometry: Option<geojson::Geometry>,
    pub shape: Option<MultiPolygon<f64>>,
    pub total_time: i64,
}

impl MergedFeature {
    /// Unmatched features have no tabular fields.
    pub fn field(&self, column: &str) -> Option<&str> {
        self.record
            .as_ref()
            .and_then(|r| r.get(column))
            .map(String::as_str)
    }
}

/// A dropdown value: either the "all" sentinel or an exact value to match.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Selection {
    #[default]
    All,
    Only(String),
}

impl Selection {
    pub const ALL: &'static str = "all";

    pub fn matches(&self, value: Option<&str>) -> bool {
        match self {
            Selection::All => true,
            Selection::Only(wanted) => value == Some(wanted.as_str()),
        }
    }
}

impl From<String> for Selection {
    fn from(s: String) -> Self {
        if s == Selection::ALL {
            Selection::All
        } else {
            Selection::Only(s)
        }
    }
}

impl From<&str> for Selection {
    fn from(s: &str) -> Self {
        Selection::from(s.to_string())
    }
}

impl From<Selection> for String {
    fn from(sel: Selection) -> Self {
        match sel {
            Selection::All => Selection::ALL.to_string(),
            Selection::Only(v) => v,
        }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::All => f.write_str(Selection::ALL),
            Selection::Only(v) => f.write_str(v),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilterState {
    pub date_start: Option<NaiveDate>,
    pub date_end: Option<NaiveDate>,
    pub state: Selection,
    pub township: Selection,
    pub group: Selection,
}

/// A single UI interaction. Higher-precedence changes reset the fields below them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FilterEvent {
    DateRange {
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    },
    State(Selection),
    Township(Selection),
    Group(Selection),
}

impl FilterState {
    // state -> township -> group
    pub fn apply(mut self, event: FilterEvent) -> Self {
        match event {
            FilterEvent::DateRange { start, end } => {
                self.date_start = start;
                self.date_end = end;
            }
            FilterEvent::State(sel) => {
                self.state = sel;
                self.township = Selection::All;
                self.group = Selection::All;
            }
            FilterEvent::Township(sel) => {
                self.township = sel;
                self.group = Selection::All;
            }
            FilterEvent::Group(sel) => {
                self.group = sel;
            }
        }
        self
    }
}
