use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// One race session to include in training.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSpec {
    pub season: u16,
    pub event: String,
    /// CSV lap table for the session.
    pub path: PathBuf,
    /// Circuit identifier used when the table carries no track column.
    /// Defaults to the event name.
    #[serde(default)]
    pub track_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SplitRatios {
    pub train: f64,
    pub validation: f64,
    pub test: f64,
}

impl Default for SplitRatios {
    fn default() -> Self {
        SplitRatios {
            train: 0.8,
            validation: 0.2,
            test: 0.0,
        }
    }
}

/// Gradient boosting hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Fraction of training rows drawn (without replacement) per tree.
    pub subsample: f64,
    /// Fraction of feature columns offered to each tree.
    pub colsample: f64,
    pub early_stopping_rounds: usize,
    /// Histogram bins per feature column.
    pub max_bins: usize,
}

impl Default for BoostingParams {
    fn default() -> Self {
        BoostingParams {
            n_estimators: 1000,
            learning_rate: 0.05,
            max_depth: 6,
            min_samples_leaf: 20,
            subsample: 0.8,
            colsample: 0.8,
            early_stopping_rounds: 50,
            max_bins: 64,
        }
    }
}

/// Residual quantiles used for the prediction band.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BandQuantiles {
    pub lower: f64,
    pub upper: f64,
}

impl Default for BandQuantiles {
    fn default() -> Self {
        BandQuantiles {
            lower: 0.1,
            upper: 0.9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub sessions: Vec<SessionSpec>,
    /// Seasons to include. Empty means every configured session.
    pub seasons: Vec<u16>,
    pub min_stint_length: u32,
    pub min_fit_rows: usize,
    pub split: SplitRatios,
    pub boosting: BoostingParams,
    pub band: BandQuantiles,
    pub seed: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            sessions: Vec::new(),
            seasons: Vec::new(),
            min_stint_length: 3,
            min_fit_rows: 10,
            split: SplitRatios::default(),
            boosting: BoostingParams::default(),
            band: BandQuantiles::default(),
            seed: 42,
        }
    }
}

impl PipelineConfig {
    /// Reads a JSON configuration file. Missing keys take their defaults.
    pub fn from_path(filepath: &Path) -> Result<Self> {
        let fh = OpenOptions::new().read(true).open(filepath)?;
        let cfg: PipelineConfig = serde_json::from_reader(&fh)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Sessions selected by the `seasons` filter.
    pub fn selected_sessions(&self) -> impl Iterator<Item = &SessionSpec> {
        self.sessions
            .iter()
            .filter(move |s| self.seasons.is_empty() || self.seasons.contains(&s.season))
    }

    pub fn validate(&self) -> Result<()> {
        let s = &self.split;
        for (name, v) in [("train", s.train), ("validation", s.validation), ("test", s.test)] {
            if !(0.0..=1.0).contains(&v) {
                return Err(Error::InvalidConfig(format!("split.{} must be in [0, 1], got {}", name, v)));
            }
        }
        if s.validation <= 0.0 {
            return Err(Error::InvalidConfig("split.validation must be positive".into()));
        }
        if ((s.train + s.validation + s.test) - 1.0).abs() > 1e-6 {
            return Err(Error::InvalidConfig(format!(
                "split ratios must sum to 1, got {:.3}",
                s.train + s.validation + s.test
            )));
        }

        let b = &self.boosting;
        if b.n_estimators == 0 {
            return Err(Error::InvalidConfig("boosting.n_estimators must be positive".into()));
        }
        if !(b.learning_rate > 0.0 && b.learning_rate <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "boosting.learning_rate must be in (0, 1], got {}",
                b.learning_rate
            )));
        }
        if b.max_depth == 0 || b.min_samples_leaf == 0 {
            return Err(Error::InvalidConfig(
                "boosting.max_depth and boosting.min_samples_leaf must be positive".into(),
            ));
        }
        for (name, v) in [("subsample", b.subsample), ("colsample", b.colsample)] {
            if !(v > 0.0 && v <= 1.0) {
                return Err(Error::InvalidConfig(format!("boosting.{} must be in (0, 1], got {}", name, v)));
            }
        }
        if !(2..=256).contains(&b.max_bins) {
            return Err(Error::InvalidConfig(format!(
                "boosting.max_bins must be in [2, 256], got {}",
                b.max_bins
            )));
        }
        if !(0.0 <= self.band.lower && self.band.lower < self.band.upper && self.band.upper <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "band quantiles must satisfy 0 <= lower < upper <= 1, got {} / {}",
                self.band.lower, self.band.upper
            )));
        }
        if self.min_stint_length == 0 {
            return Err(Error::InvalidConfig("min_stint_length must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let cfg = PipelineConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.min_stint_length, 3);
        assert_eq!(cfg.boosting.early_stopping_rounds, 50);
    }

    #[test]
    fn partial_json_takes_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            r#"{{"seasons":[2023],"boosting":{{"max_depth":4}},"sessions":[
                {{"season":2022,"event":"Bahrain Grand Prix","path":"a.csv"}},
                {{"season":2023,"event":"Monaco Grand Prix","path":"b.csv"}}]}}"#
        )
        .unwrap();
        let cfg = PipelineConfig::from_path(f.path()).unwrap();
        assert_eq!(cfg.boosting.max_depth, 4);
        assert_eq!(cfg.boosting.n_estimators, 1000);
        let events: Vec<_> = cfg.selected_sessions().map(|s| s.event.as_str()).collect();
        assert_eq!(events, vec!["Monaco Grand Prix"]);
    }

    #[test]
    fn rejects_bad_split() {
        let mut cfg = PipelineConfig::default();
        cfg.split.train = 0.9;
        assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));
    }
}
