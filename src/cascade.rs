use crate::config::ColumnConfig;
use crate::types::{FilterState, Selection, TabularRecord};
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FilterOptions {
    pub states: Vec<String>,
    pub townships: Vec<String>,
    pub groups: Vec<String>,
}

impl FilterOptions {
    // Built from raw rows, not the filtered features
    pub fn for_filter(records: &[TabularRecord], filter: &FilterState, columns: &ColumnConfig) -> Self {
        Self {
            states: state_options(records, columns),
            townships: township_options(records, &filter.state, columns),
            groups: group_options(records, &filter.state, &filter.township, columns),
        }
    }
}

pub fn state_options(records: &[TabularRecord], columns: &ColumnConfig) -> Vec<String> {
    distinct(records.iter(), &columns.state)
}

pub fn township_options(
    records: &[TabularRecord],
    state: &Selection,
    columns: &ColumnConfig,
) -> Vec<String> {
    let matching = records
        .iter()
        .filter(|r| state.matches(r.get(&columns.state).map(String::as_str)));
    distinct(matching, &columns.township)
}

pub fn group_options(
    records: &[TabularRecord],
    state: &Selection,
    township: &Selection,
    columns: &ColumnConfig,
) -> Vec<String> {
    let matching = records.iter().filter(|r| {
        state.matches(r.get(&columns.state).map(String::as_str))
            && township.matches(r.get(&columns.township).map(String::as_str))
    });
    distinct(matching, &columns.group)
}

// "all" first, then non-empty values in first-occurrence order.
fn distinct<'a>(records: impl Iterator<Item = &'a TabularRecord>, column: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut options = vec![Selection::ALL.to_string()];
    for value in records.filter_map(|r| r.get(column)) {
        if !value.is_empty() && seen.insert(value.as_str()) {
            options.push(value.clone());
        }
    }
    options
}
