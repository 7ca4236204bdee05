//! Fixtures shared by the unit tests.

use crate::config::PipelineConfig;
use crate::data::{Compound, LapRecord};
use crate::features::{FeatureVector, TrainingRow};
use crate::model::DegradationModel;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub fn lap(driver: &str, n: u32, age: u32, stint: u32, time: Option<f64>) -> LapRecord {
    LapRecord {
        driver_id: driver.into(),
        driver_number: None,
        driver_name: None,
        team_id: "Ferrari".into(),
        track_id: "Monza".into(),
        lap_number: n,
        compound: Compound::Medium,
        lap_time_seconds: time,
        tyre_age: age,
        stint,
        position: None,
    }
}

const TRACKS: [(&str, f64); 3] = [("Bahrain", 95.0), ("Monza", 82.0), ("Suzuka", 92.0)];
const DRIVERS: [(&str, &str, f64); 4] = [
    ("VER", "Red Bull", -0.3),
    ("LEC", "Ferrari", 0.0),
    ("NOR", "McLaren", 0.1),
    ("HAM", "Mercedes", 0.2),
];

/// Offset to a medium and seconds lost per lap of tyre age.
fn compound_profile(c: Compound) -> (f64, f64) {
    match c {
        Compound::Soft => (-0.6, 0.08),
        Compound::Hard => (0.5, 0.03),
        _ => (0.0, 0.05),
    }
}

/// One 20-lap stint per (track, driver, dry compound) with a known
/// degradation law and a little noise. Uses the first `n_tracks` circuits.
pub fn synthetic_rows(n_tracks: usize) -> Vec<TrainingRow> {
    let mut rng = StdRng::seed_from_u64(7);
    let mut rows = Vec::new();
    for &(track, base) in TRACKS.iter().take(n_tracks) {
        for &(driver, team, pace) in DRIVERS.iter() {
            for (k, &compound) in Compound::DRY.iter().enumerate() {
                let (offset, deg) = compound_profile(compound);
                for age in 1..=20u32 {
                    let lap_number = k as u32 * 20 + age;
                    let target = base + offset + pace + deg * age as f64 - 0.03 * lap_number as f64
                        + rng.gen_range(-0.1..0.1);
                    rows.push(TrainingRow {
                        features: FeatureVector {
                            tyre_age: age,
                            lap_number,
                            compound,
                            track_id: track.into(),
                            driver_id: driver.into(),
                            team_id: team.into(),
                        },
                        target,
                    });
                }
            }
        }
    }
    rows
}

/// Small, quick boosting setup for tests.
pub fn fast_config() -> PipelineConfig {
    let mut cfg = PipelineConfig::default();
    cfg.boosting.n_estimators = 150;
    cfg.boosting.learning_rate = 0.1;
    cfg.boosting.min_samples_leaf = 5;
    cfg.boosting.max_depth = 4;
    cfg.boosting.early_stopping_rounds = 15;
    cfg
}

pub fn trained_model() -> DegradationModel {
    DegradationModel::train(&synthetic_rows(2), &fast_config()).unwrap()
}
