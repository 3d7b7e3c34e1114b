//! Violation types, events and the per-session ledger

use crate::error::Error;
use crate::types::Snapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

const OBJECT_PREFIX: &str = "object_detected:";

/// Kind of integrity violation
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ViolationType {
    /// Prohibited object, carrying its canonical label
    ObjectDetected(String),
    FaceNotVisible,
    MultipleFaces,
    LookingAway,
    HeadMovement,
}

impl ViolationType {
    pub fn object(label: impl Into<String>) -> Self {
        ViolationType::ObjectDetected(label.into())
    }
}

impl fmt::Display for ViolationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationType::ObjectDetected(label) => write!(f, "{}{}", OBJECT_PREFIX, label),
            ViolationType::FaceNotVisible => f.write_str("face_not_visible"),
            ViolationType::MultipleFaces => f.write_str("multiple_faces"),
            ViolationType::LookingAway => f.write_str("looking_away"),
            ViolationType::HeadMovement => f.write_str("head_movement"),
        }
    }
}

impl FromStr for ViolationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "face_not_visible" => Ok(ViolationType::FaceNotVisible),
            "multiple_faces" => Ok(ViolationType::MultipleFaces),
            "looking_away" => Ok(ViolationType::LookingAway),
            "head_movement" => Ok(ViolationType::HeadMovement),
            other => match other.strip_prefix(OBJECT_PREFIX) {
                Some(label) if !label.is_empty() => Ok(ViolationType::ObjectDetected(label.to_string())),
                _ => Err(Error::InvalidViolationType(other.to_string())),
            },
        }
    }
}

impl Serialize for ViolationType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ViolationType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A classified violation, immutable once created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationEvent {
    pub violation_type: ViolationType,
    pub confidence: f32,
    pub occurred_at: DateTime<Utc>,
    pub snapshot: Snapshot,
}

/// Aggregate for one violation type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub violation_type: ViolationType,
    pub count: u64,
    /// Insertion order, duplicates allowed
    pub timestamps: Vec<DateTime<Utc>>,
    pub last_snapshot: Option<Snapshot>,
}

impl ViolationRecord {
    fn first(event: &ViolationEvent) -> Self {
        Self {
            violation_type: event.violation_type.clone(),
            count: 1,
            timestamps: vec![event.occurred_at],
            last_snapshot: Some(event.snapshot.clone()),
        }
    }

    fn record(&mut self, event: &ViolationEvent) {
        self.count += 1;
        self.timestamps.push(event.occurred_at);
        self.last_snapshot = Some(event.snapshot.clone());
    }

    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.timestamps.last().copied()
    }
}

/// Per-type violation aggregates for one monitoring session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViolationLedger {
    records: BTreeMap<ViolationType, ViolationRecord>,
}

impl ViolationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a batch of events. Records are created on first sight and only
    /// ever grow afterwards. Returns the number of events merged.
    pub fn merge(&mut self, events: &[ViolationEvent]) -> usize {
        for event in events {
            match self.records.get_mut(&event.violation_type) {
                Some(record) => record.record(event),
                None => {
                    self.records
                        .insert(event.violation_type.clone(), ViolationRecord::first(event));
                }
            }
        }
        events.len()
    }

    pub fn get(&self, violation_type: &ViolationType) -> Option<&ViolationRecord> {
        self.records.get(violation_type)
    }

    pub fn count(&self, violation_type: &ViolationType) -> u64 {
        self.get(violation_type).map(|r| r.count).unwrap_or(0)
    }

    /// Number of distinct violation types seen
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sum of all record counts
    pub fn total_count(&self) -> u64 {
        self.records.values().map(|r| r.count).sum()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, ViolationType, ViolationRecord> {
        self.records.iter()
    }
}

impl<'a> IntoIterator for &'a ViolationLedger {
    type Item = (&'a ViolationType, &'a ViolationRecord);
    type IntoIter = btree_map::Iter<'a, ViolationType, ViolationRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
