//! Filter indexes over feature properties.
//!
//! An index tracks, per whitelisted property, every value observed in a
//! feature collection and the subset currently selected. A feature passes
//! when, for every tracked property it carries, its value is selected.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use tablemap_common::{Feature, FilterValue};

/// Observed and selected values of one property.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyFilter {
    all_values: HashSet<FilterValue>,
    selected_values: HashSet<FilterValue>,
}

impl PropertyFilter {
    fn observe(&mut self, value: FilterValue) {
        self.selected_values.insert(value.clone());
        self.all_values.insert(value);
    }

    pub fn all_values(&self) -> &HashSet<FilterValue> {
        &self.all_values
    }

    pub fn selected_values(&self) -> &HashSet<FilterValue> {
        &self.selected_values
    }

    pub fn is_selected(&self, value: &FilterValue) -> bool {
        self.selected_values.contains(value)
    }

    /// Whether some observed value is deselected.
    pub fn is_active(&self) -> bool {
        self.selected_values.len() < self.all_values.len()
    }

    /// Select an observed value. Returns false for values never observed.
    pub fn select(&mut self, value: &FilterValue) -> bool {
        if !self.all_values.contains(value) {
            return false;
        }
        self.selected_values.insert(value.clone());
        true
    }

    /// Deselect a value. Returns whether it was selected.
    pub fn deselect(&mut self, value: &FilterValue) -> bool {
        self.selected_values.remove(value)
    }

    /// Flip an observed value. Returns the new selection state.
    pub fn toggle(&mut self, value: &FilterValue) -> bool {
        if self.deselect(value) {
            false
        } else {
            self.select(value)
        }
    }

    pub fn select_all(&mut self) {
        self.selected_values = self.all_values.clone();
    }

    pub fn select_none(&mut self) {
        self.selected_values.clear();
    }

    /// Observed values in display order: the null-sentinel first, then
    /// booleans, numbers by value, text and structured values.
    pub fn values(&self) -> Vec<&FilterValue> {
        let mut values: Vec<&FilterValue> = self.all_values.iter().collect();
        values.sort_by(|a, b| display_order(a, b));
        values
    }
}

fn rank(value: &FilterValue) -> u8 {
    match value {
        FilterValue::Null => 0,
        FilterValue::Bool(_) => 1,
        FilterValue::Number(_) => 2,
        FilterValue::Text(_) => 3,
        FilterValue::Json(_) => 4,
    }
}

fn display_order(a: &FilterValue, b: &FilterValue) -> Ordering {
    match (a, b) {
        (FilterValue::Bool(x), FilterValue::Bool(y)) => x.cmp(y),
        (FilterValue::Number(x), FilterValue::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(f64::NAN), y.as_f64().unwrap_or(f64::NAN));
            x.total_cmp(&y)
        }
        (FilterValue::Text(x), FilterValue::Text(y)) | (FilterValue::Json(x), FilterValue::Json(y)) => {
            x.cmp(y)
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Property name -> [`PropertyFilter`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterIndex {
    properties: BTreeMap<String, PropertyFilter>,
}

impl FilterIndex {
    /// Build an index over `whitelist` with every observed value selected.
    ///
    /// A property enters the index only if at least one feature carries it.
    /// Empty values are recorded as the null-sentinel.
    pub fn build<'a, I, S>(features: I, whitelist: &[S]) -> Self
    where
        I: IntoIterator<Item = &'a Feature>,
        S: AsRef<str>,
    {
        let mut index = Self::default();
        for feature in features {
            let Some(properties) = feature.properties() else {
                continue;
            };
            for name in whitelist {
                let name = name.as_ref();
                if let Some(value) = properties.get(name) {
                    index
                        .properties
                        .entry(name.to_string())
                        .or_default()
                        .observe(FilterValue::from(value));
                }
            }
        }
        index
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn get(&self, property: &str) -> Option<&PropertyFilter> {
        self.properties.get(property)
    }

    pub fn get_mut(&mut self, property: &str) -> Option<&mut PropertyFilter> {
        self.properties.get_mut(property)
    }

    /// Tracked properties in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyFilter)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Whether `feature` passes every tracked property.
    pub fn matches(&self, feature: &Feature) -> bool {
        let Some(properties) = feature.properties() else {
            return true;
        };
        self.properties.iter().all(|(name, filter)| match properties.get(name) {
            None => true,
            Some(value) => filter.is_selected(&FilterValue::from(value)),
        })
    }

    /// Features passing the index, in input order.
    pub fn apply<'a>(&self, features: &'a [Feature]) -> Vec<&'a Feature> {
        features.iter().filter(|f| self.matches(f)).collect()
    }

    pub fn select(&mut self, property: &str, value: &FilterValue) -> bool {
        self.get_mut(property).is_some_and(|f| f.select(value))
    }

    pub fn deselect(&mut self, property: &str, value: &FilterValue) -> bool {
        self.get_mut(property).is_some_and(|f| f.deselect(value))
    }

    pub fn toggle(&mut self, property: &str, value: &FilterValue) -> bool {
        self.get_mut(property).is_some_and(|f| f.toggle(value))
    }

    pub fn select_all(&mut self, property: &str) {
        if let Some(filter) = self.get_mut(property) {
            filter.select_all();
        }
    }

    pub fn select_none(&mut self, property: &str) {
        if let Some(filter) = self.get_mut(property) {
            filter.select_none();
        }
    }

    /// Select exactly `values` for `property`. Values never observed are
    /// ignored. Returns false when the property is not tracked.
    pub fn select_only(&mut self, property: &str, values: &[FilterValue]) -> bool {
        let Some(filter) = self.get_mut(property) else {
            return false;
        };
        filter.select_none();
        for value in values {
            filter.select(value);
        }
        true
    }
}

/// Build a filter index. See [`FilterIndex::build`].
pub fn build_filter_index<'a, I, S>(features: I, whitelist: &[S]) -> FilterIndex
where
    I: IntoIterator<Item = &'a Feature>,
    S: AsRef<str>,
{
    FilterIndex::build(features, whitelist)
}

/// Features passing `index`, in input order.
pub fn apply_filters<'a>(features: &'a [Feature], index: &FilterIndex) -> Vec<&'a Feature> {
    index.apply(features)
}
