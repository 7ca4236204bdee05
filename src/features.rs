//! Feature derivation for the degradation model.

use crate::analytics::aggregate_stints;
use crate::data::{Compound, LapRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

pub const NUMERICAL_FIELDS: [&str; 2] = ["tyre_age", "lap_number"];
pub const CATEGORICAL_FIELDS: [&str; 4] = ["compound", "track_id", "driver_id", "team_id"];

/// Model inputs for one lap. Lap number stands in for fuel load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub tyre_age: u32,
    pub lap_number: u32,
    pub compound: Compound,
    pub track_id: String,
    pub driver_id: String,
    pub team_id: String,
}

impl FeatureVector {
    pub fn from_lap(lap: &LapRecord) -> Self {
        FeatureVector {
            tyre_age: lap.tyre_age,
            lap_number: lap.lap_number,
            compound: lap.compound,
            track_id: lap.track_id.clone(),
            driver_id: lap.driver_id.clone(),
            team_id: lap.team_id.clone(),
        }
    }

    /// Values in [`NUMERICAL_FIELDS`] order.
    pub fn numerical(&self) -> [f64; 2] {
        [self.tyre_age as f64, self.lap_number as f64]
    }

    /// Values in [`CATEGORICAL_FIELDS`] order.
    pub fn categorical(&self) -> [&str; 4] {
        [
            self.compound.as_str(),
            self.track_id.as_str(),
            self.driver_id.as_str(),
            self.team_id.as_str(),
        ]
    }
}

/// A feature vector with its observed lap time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRow {
    pub features: FeatureVector,
    pub target: f64,
}

impl AsRef<FeatureVector> for FeatureVector {
    fn as_ref(&self) -> &FeatureVector {
        self
    }
}

impl AsRef<FeatureVector> for TrainingRow {
    fn as_ref(&self) -> &FeatureVector {
        &self.features
    }
}

/// Timed laps from stints of at least `min_stint_length` laps.
///
/// Short stints and untimed laps still count for tyre age; they are only
/// kept out of the targets.
pub fn build_training_rows(laps: &[LapRecord], min_stint_length: u32) -> Vec<TrainingRow> {
    let stints = aggregate_stints(laps, min_stint_length);
    let mut usable: HashMap<&str, Vec<(u32, u32)>> = HashMap::new();
    for s in stints.iter().filter(|s| s.usable_for_training) {
        usable.entry(s.driver_id.as_str()).or_default().push((s.start_lap, s.end_lap));
    }

    let rows: Vec<TrainingRow> = laps
        .iter()
        .filter(|l| {
            usable.get(l.driver_id.as_str()).map_or(false, |ranges| {
                ranges.iter().any(|&(a, b)| (a..=b).contains(&l.lap_number))
            })
        })
        .filter_map(|l| {
            l.lap_time_seconds.map(|t| TrainingRow {
                features: FeatureVector::from_lap(l),
                target: t,
            })
        })
        .collect();
    debug!(laps = laps.len(), rows = rows.len(), "built training rows");
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::lap;

    #[test]
    fn from_lap_is_deterministic() {
        let l = lap("LEC", 7, 3, 1, Some(82.0));
        let a = FeatureVector::from_lap(&l);
        let b = FeatureVector::from_lap(&l);
        assert_eq!(a, b);
        assert_eq!(a.numerical(), [3.0, 7.0]);
        assert_eq!(a.categorical(), ["MEDIUM", "Monza", "LEC", "Ferrari"]);
    }

    #[test]
    fn short_stint_excluded_from_training() {
        let laps = vec![
            lap("LEC", 1, 1, 1, Some(83.0)),
            lap("LEC", 2, 2, 1, Some(83.1)),
            lap("LEC", 3, 1, 2, Some(84.0)),
            lap("LEC", 4, 2, 2, Some(83.2)),
            lap("LEC", 5, 3, 2, None),
            lap("LEC", 6, 4, 2, Some(83.4)),
        ];
        let rows = build_training_rows(&laps, 3);
        let kept: Vec<u32> = rows.iter().map(|r| r.features.lap_number).collect();
        assert_eq!(kept, vec![3, 4, 6]);
        assert_eq!(rows[0].target, 84.0);
    }
}
