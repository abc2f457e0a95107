//! Cumulative per-epoch metric history.

use crate::model::FitHistory;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Metric sequences accumulated across fit calls.
///
/// Keys keep the order in which they first appeared; values are only ever appended.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpochHistory {
    metrics: Vec<(String, Vec<f64>)>,
}

impl EpochHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extend every metric with the per-epoch values of one fit call.
    ///
    /// A call that produced no epochs leaves the history untouched.
    pub fn merge(&mut self, call: &FitHistory) {
        if call.epochs() == 0 {
            return;
        }
        for (name, values) in call.iter() {
            if values.is_empty() {
                continue;
            }
            match self.metrics.iter_mut().find(|(n, _)| n == name) {
                Some((_, existing)) => existing.extend_from_slice(values),
                None => self.metrics.push((name.to_string(), values.to_vec())),
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.metrics
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    /// Most recent value of a metric.
    pub fn last(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(|v| v.last().copied())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.metrics.iter().map(|(n, _)| n.as_str())
    }

    /// Length of the longest metric sequence.
    pub fn len(&self) -> usize {
        self.metrics.iter().map(|(_, v)| v.len()).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Serialize for EpochHistory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.metrics.len()))?;
        for (name, values) in &self.metrics {
            map.serialize_entry(name, values)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for EpochHistory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HistoryVisitor;

        impl<'de> Visitor<'de> for HistoryVisitor {
            type Value = EpochHistory;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of metric name to per-epoch values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut metrics = Vec::new();
                while let Some((name, values)) = access.next_entry::<String, Vec<f64>>()? {
                    metrics.push((name, values));
                }
                Ok(EpochHistory { metrics })
            }
        }

        deserializer.deserialize_map(HistoryVisitor)
    }
}
