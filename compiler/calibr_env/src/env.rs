// Calibration store built from a calibration table
// Read-only once parsing is done; the annotator borrows it for the whole walk

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Suffix appended to a consumer op's name to key its weight's channel scales.
pub const WEIGHT_SUFFIX: &str = "_weight";

/// Statistics recorded for one tensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub threshold: f64,
    pub min: f64,
    pub max: f64,
}

impl CalibrationRecord {
    pub fn new(threshold: f64, min: f64, max: f64) -> Self {
        Self {
            threshold,
            min,
            max,
        }
    }
}

/// Per-output-channel scales of a weight tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelScaleVector {
    pub name: String,
    pub scales: Vec<f64>,
}

/// Which table a record was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordSource {
    Default,
    Int4,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationTables {
    default: BTreeMap<String, CalibrationRecord>,
    int4: BTreeMap<String, CalibrationRecord>,
    channel_scales: BTreeMap<String, ChannelScaleVector>,
}

impl CalibrationTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `name` in the default (int8/bf16) table, replacing an earlier entry.
    pub fn insert_default(&mut self, name: impl Into<String>, record: CalibrationRecord) {
        self.default.insert(name.into(), record);
    }

    /// Records `name` in the int4 table, replacing an earlier entry.
    pub fn insert_int4(&mut self, name: impl Into<String>, record: CalibrationRecord) {
        self.int4.insert(name.into(), record);
    }

    pub fn insert_channel_scales(&mut self, name: impl Into<String>, scales: Vec<f64>) {
        let name = name.into();
        self.channel_scales
            .insert(name.clone(), ChannelScaleVector { name, scales });
    }

    pub fn get_default(&self, name: &str) -> Option<&CalibrationRecord> {
        self.default.get(name)
    }

    pub fn get_int4(&self, name: &str) -> Option<&CalibrationRecord> {
        self.int4.get(name)
    }

    /// Looks `name` up in the default table and, when `int4_fallback` is set,
    /// in the int4 table after that. The default table always wins.
    ///
    /// # Examples
    ///
    /// ```
    /// use calibr_env::env::{CalibrationRecord, CalibrationTables, RecordSource};
    ///
    /// let mut tables = CalibrationTables::new();
    /// tables.insert_int4("conv1", CalibrationRecord::new(2.0, -2.0, 2.0));
    /// assert!(tables.lookup("conv1", false).is_none());
    /// let (source, _) = tables.lookup("conv1", true).unwrap();
    /// assert_eq!(source, RecordSource::Int4);
    /// ```
    pub fn lookup(
        &self,
        name: &str,
        int4_fallback: bool,
    ) -> Option<(RecordSource, &CalibrationRecord)> {
        if let Some(record) = self.default.get(name) {
            return Some((RecordSource::Default, record));
        }
        if int4_fallback {
            return self.int4.get(name).map(|r| (RecordSource::Int4, r));
        }
        None
    }

    /// Channel scales for the weight consumed by the op named `consumer`.
    pub fn weight_scales(&self, consumer: &str) -> Option<&ChannelScaleVector> {
        self.channel_scales.get(&weight_key(consumer))
    }

    pub fn channel_scales(&self, key: &str) -> Option<&ChannelScaleVector> {
        self.channel_scales.get(key)
    }

    pub fn default_len(&self) -> usize {
        self.default.len()
    }

    pub fn int4_len(&self) -> usize {
        self.int4.len()
    }

    pub fn channel_scales_len(&self) -> usize {
        self.channel_scales.len()
    }

    pub fn is_empty(&self) -> bool {
        self.default.is_empty() && self.int4.is_empty() && self.channel_scales.is_empty()
    }
}

/// `<consumer>_weight`, the key channel scales are filed under.
pub fn weight_key(consumer: &str) -> String {
    format!("{consumer}{WEIGHT_SUFFIX}")
}
