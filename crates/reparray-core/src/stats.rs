//! Online statistics over the numeric properties of stored payloads.
//!
//! One [`PropertyStatistics`] record exists per property name (matched
//! case-insensitively). Records are folded incrementally: adding an entry
//! folds each of its numeric properties in, removing it folds them out.
//!
//! Min/max recovery on removal is a single-level undo: each record remembers
//! only the previous extreme. Removing two successive extremes loses the
//! exact value.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::entry::Entry;
use crate::payload::{NumericProperty, PayloadDecoder};

/// Running statistics for one numeric property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyStatistics {
    property_name: String,
    property_type: String,
    count: u64,
    sum: f64,
    mean: f64,
    range: f64,
    min: f64,
    last_min: f64,
    max: f64,
    last_max: f64,
    first_value: f64,
    last_value: f64,
    last_update: Option<DateTime<Utc>>,
}

impl PropertyStatistics {
    pub fn new(property_name: impl Into<String>, property_type: impl Into<String>) -> Self {
        Self {
            property_name: property_name.into(),
            property_type: property_type.into(),
            count: 0,
            sum: 0.0,
            mean: 0.0,
            range: 0.0,
            min: 0.0,
            last_min: 0.0,
            max: 0.0,
            last_max: 0.0,
            first_value: 0.0,
            last_value: 0.0,
            last_update: None,
        }
    }

    pub fn property_name(&self) -> &str {
        &self.property_name
    }

    pub fn property_type(&self) -> &str {
        &self.property_type
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn range(&self) -> f64 {
        self.range
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn last_min(&self) -> f64 {
        self.last_min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn last_max(&self) -> f64 {
        self.last_max
    }

    pub fn first_value(&self) -> f64 {
        self.first_value
    }

    pub fn last_value(&self) -> f64 {
        self.last_value
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    /// Fold one value in.
    pub fn add_value(&mut self, value: f64) {
        self.count += 1;
        if self.count == 1 {
            self.first_value = value;
            self.min = value;
            self.last_min = value;
            self.max = value;
            self.last_max = value;
        } else {
            if value < self.min {
                self.last_min = self.min;
                self.min = value;
            }
            if value > self.max {
                self.last_max = self.max;
                self.max = value;
            }
        }
        self.last_value = value;
        self.last_update = Some(Utc::now());
        self.range = self.max - self.min;
        let n = self.count as f64;
        self.mean = (self.mean * (n - 1.0) + value) / n;
        self.sum += value;
    }

    /// Fold one value out. A record that reaches zero is reset.
    pub fn remove_value(&mut self, value: f64) {
        if self.count == 0 {
            return;
        }
        let before = self.count as f64;
        self.count -= 1;
        if self.count == 0 {
            self.reset_values();
            return;
        }
        self.last_update = Some(Utc::now());
        if value == self.min {
            self.min = self.last_min;
        }
        if value == self.max {
            self.max = self.last_max;
        }
        self.range = self.max - self.min;
        self.mean = (self.mean * before - value) / self.count as f64;
        self.sum -= value;
    }

    fn reset_values(&mut self) {
        let name = std::mem::take(&mut self.property_name);
        let kind = std::mem::take(&mut self.property_type);
        *self = Self::new(name, kind);
    }
}

impl fmt::Display for PropertyStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' [{}]: Count {}, Sum {:.2}, LastValue {:.2}, FirstValue {:.2}, Mean {:.2}, Range {:.2}, Min {:.2}, Max {:.2}",
            self.property_name,
            self.property_type,
            self.count,
            self.sum,
            self.last_value,
            self.first_value,
            self.mean,
            self.range,
            self.min,
            self.max,
        )?;
        match self.last_update {
            Some(ts) => write!(f, ", Updated {}", ts.to_rfc3339()),
            None => write!(f, ", Updated never"),
        }
    }
}

/// Per-property statistics for every entry currently in an array.
#[derive(Debug, Clone, Default)]
pub struct StatisticsAggregator {
    records: Vec<PropertyStatistics>,
    /// Lowercased property name -> slot in `records`.
    lookup: HashMap<String, usize>,
}

impl StatisticsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode an added entry and fold its numeric properties in.
    ///
    /// Returns how many properties were folded. Decode failures fold nothing.
    pub fn on_entry_added(&mut self, entry: &Entry, decoder: &dyn PayloadDecoder) -> usize {
        match decoder.decode(entry.payload(), entry.type_tag()) {
            Ok(value) => self.fold_in(&value.numeric_properties()),
            Err(e) => {
                debug!(guid = %entry.guid(), error = %e, "Statistics skipped entry on add");
                0
            }
        }
    }

    /// Decode a removed entry and fold its numeric properties out.
    pub fn on_entry_removed(&mut self, entry: &Entry, decoder: &dyn PayloadDecoder) -> usize {
        match decoder.decode(entry.payload(), entry.type_tag()) {
            Ok(value) => self.fold_out(&value.numeric_properties()),
            Err(e) => {
                debug!(guid = %entry.guid(), error = %e, "Statistics skipped entry on remove");
                0
            }
        }
    }

    pub fn fold_in(&mut self, properties: &[NumericProperty]) -> usize {
        let mut folded = 0;
        for prop in properties {
            if !prop.value.is_finite() {
                trace!(property = %prop.name, "Skipping non-finite value");
                continue;
            }
            let slot = self.find_or_create(&prop.name, &prop.type_name);
            self.records[slot].add_value(prop.value);
            folded += 1;
        }
        folded
    }

    pub fn fold_out(&mut self, properties: &[NumericProperty]) -> usize {
        let mut folded = 0;
        for prop in properties {
            if !prop.value.is_finite() {
                continue;
            }
            let Some(&slot) = self.lookup.get(&prop.name.to_lowercase()) else {
                trace!(property = %prop.name, "No statistics record to fold out of");
                continue;
            };
            if self.records[slot].count() == 0 {
                continue;
            }
            self.records[slot].remove_value(prop.value);
            folded += 1;
        }
        folded
    }

    /// Look up a record by property name, ignoring case.
    pub fn get(&self, property_name: &str) -> Option<&PropertyStatistics> {
        self.lookup
            .get(&property_name.to_lowercase())
            .map(|&slot| &self.records[slot])
    }

    /// All records, in first-seen order.
    pub fn records(&self) -> &[PropertyStatistics] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.lookup.clear();
    }

    /// One line per record.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for record in &self.records {
            out.push_str(&record.to_string());
            out.push('\n');
        }
        out
    }

    fn find_or_create(&mut self, name: &str, type_name: &str) -> usize {
        let key = name.to_lowercase();
        if let Some(&slot) = self.lookup.get(&key) {
            return slot;
        }
        let slot = self.records.len();
        self.records.push(PropertyStatistics::new(name, type_name));
        self.lookup.insert(key, slot);
        slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{EntryGuid, Payload, TypeTag};
    use crate::payload::JsonPayloads;

    fn prop(value: f64) -> Vec<NumericProperty> {
        vec![NumericProperty::new("damage", "i64", value)]
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn three_adds_then_remove_minimum() {
        let mut agg = StatisticsAggregator::new();
        for v in [10.0, 20.0, 5.0] {
            agg.fold_in(&prop(v));
        }
        let s = agg.get("damage").unwrap();
        assert_eq!(s.count(), 3);
        assert!(close(s.sum(), 35.0));
        assert!((s.mean() - 11.666_666).abs() < 1e-3);
        assert_eq!(s.min(), 5.0);
        assert_eq!(s.max(), 20.0);
        assert_eq!(s.first_value(), 10.0);
        assert_eq!(s.last_value(), 5.0);
        assert_eq!(s.range(), 15.0);

        agg.fold_out(&prop(5.0));
        let s = agg.get("damage").unwrap();
        assert_eq!(s.count(), 2);
        assert!(close(s.sum(), 30.0));
        assert!(close(s.mean(), 15.0));
        assert_eq!(s.min(), 10.0);
        assert_eq!(s.max(), 20.0);
    }

    #[test]
    fn add_then_remove_restores_previous_state() {
        let mut agg = StatisticsAggregator::new();
        agg.fold_in(&prop(10.0));
        agg.fold_in(&prop(20.0));
        let before = agg.get("damage").unwrap().clone();

        agg.fold_in(&prop(30.0));
        agg.fold_out(&prop(30.0));
        let after = agg.get("damage").unwrap();

        assert_eq!(after.count(), before.count());
        assert!(close(after.sum(), before.sum()));
        assert!(close(after.mean(), before.mean()));
        assert_eq!(after.min(), before.min());
        assert_eq!(after.max(), before.max());
    }

    #[test]
    fn removing_last_value_resets_record() {
        let mut agg = StatisticsAggregator::new();
        agg.fold_in(&prop(7.0));
        agg.fold_out(&prop(7.0));
        let s = agg.get("damage").unwrap();
        assert_eq!(s.count(), 0);
        assert_eq!(s.sum(), 0.0);
        assert_eq!(s.mean(), 0.0);
        assert_eq!(s.min(), 0.0);
        assert_eq!(s.max(), 0.0);
        assert!(s.last_update().is_none());
        assert_eq!(s.property_name(), "damage");
    }

    #[test]
    fn single_level_undo_loses_second_extreme() {
        let mut agg = StatisticsAggregator::new();
        for v in [10.0, 5.0, 1.0] {
            agg.fold_in(&prop(v));
        }
        agg.fold_out(&prop(1.0));
        assert_eq!(agg.get("damage").unwrap().min(), 5.0);
        agg.fold_out(&prop(5.0));
        // Only one previous minimum is remembered.
        assert_eq!(agg.get("damage").unwrap().min(), 5.0);
    }

    #[test]
    fn lookup_ignores_case() {
        let mut agg = StatisticsAggregator::new();
        agg.fold_in(&[NumericProperty::new("Damage", "i64", 1.0)]);
        agg.fold_in(&[NumericProperty::new("DAMAGE", "i64", 3.0)]);
        assert_eq!(agg.len(), 1);
        assert_eq!(agg.get("damage").unwrap().count(), 2);
        assert_eq!(agg.get("damage").unwrap().property_name(), "Damage");
    }

    #[test]
    fn fold_out_of_unknown_property_is_skipped() {
        let mut agg = StatisticsAggregator::new();
        assert_eq!(agg.fold_out(&prop(3.0)), 0);
        assert!(agg.is_empty());
    }

    #[test]
    fn non_finite_values_are_skipped() {
        let mut agg = StatisticsAggregator::new();
        assert_eq!(agg.fold_in(&prop(f64::NAN)), 0);
        assert!(agg.get("damage").is_none());
    }

    #[test]
    fn undecodable_entries_degrade_gracefully() {
        let mut agg = StatisticsAggregator::new();
        let entry = Entry::new(
            Payload::from("not json"),
            TypeTag::new("T"),
            EntryGuid::new(),
            "a",
        );
        assert_eq!(agg.on_entry_added(&entry, &JsonPayloads), 0);
        assert_eq!(agg.on_entry_removed(&entry, &JsonPayloads), 0);
        assert!(agg.is_empty());
    }

    #[test]
    fn entries_fold_through_decoder() {
        let mut agg = StatisticsAggregator::new();
        let entry = Entry::new(
            Payload::from(r#"{"damage": 4, "label": "x"}"#),
            TypeTag::new("T"),
            EntryGuid::new(),
            "a",
        );
        assert_eq!(agg.on_entry_added(&entry, &JsonPayloads), 1);
        assert_eq!(agg.get("damage").unwrap().property_type(), "i64");
        assert_eq!(agg.on_entry_removed(&entry, &JsonPayloads), 1);
        assert_eq!(agg.get("damage").unwrap().count(), 0);
    }

    #[test]
    fn dump_has_one_line_per_record() {
        let mut agg = StatisticsAggregator::new();
        agg.fold_in(&[
            NumericProperty::new("a", "i64", 1.0),
            NumericProperty::new("b", "f64", 2.5),
        ]);
        let dump = agg.dump();
        assert_eq!(dump.lines().count(), 2);
        assert!(dump.contains("'b' [f64]: Count 1, Sum 2.50"));
    }
}
