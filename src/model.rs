use crate::config::{BoostingParams, PipelineConfig, SplitRatios};
use crate::data::Compound;
use crate::error::{Error, Result};
use crate::features::{FeatureVector, TrainingRow, CATEGORICAL_FIELDS};
use crate::gbm::GradientBoostedTrees;
use crate::notice::UnknownCategoryNotice;
use crate::preprocess::PreprocessingTransform;
use crate::stats;
use linfa::prelude::*;
use linfa_linear::LinearRegression;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

type FittedLinearRegression = linfa_linear::FittedLinearRegression<f64>;

/// Bumped whenever the serialized layout changes.
pub const ARTIFACT_VERSION: u32 = 1;

/// Row indices of each split.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataSplit {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
    pub test: Vec<usize>,
}

/// Splits rows per (track, compound) group so no circuit/compound pair lands
/// in only one split when it has at least two rows. Single-row groups go to
/// training.
pub fn stratified_split(rows: &[TrainingRow], ratios: &SplitRatios, seed: u64) -> DataSplit {
    let mut groups: BTreeMap<(&str, Compound), Vec<usize>> = BTreeMap::new();
    for (i, r) in rows.iter().enumerate() {
        groups
            .entry((r.features.track_id.as_str(), r.features.compound))
            .or_default()
            .push(i);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut split = DataSplit::default();
    for (_, mut idx) in groups {
        let n = idx.len();
        if n == 1 {
            split.train.extend(idx);
            continue;
        }
        idx.shuffle(&mut rng);
        let mut n_valid = ((n as f64 * ratios.validation).round() as usize).max(1);
        let mut n_test = if ratios.test > 0.0 && n >= 3 {
            ((n as f64 * ratios.test).round() as usize).max(1)
        } else {
            0
        };
        // keep at least one training row per group
        while n_valid + n_test >= n {
            if n_test > 0 {
                n_test -= 1;
            } else {
                n_valid -= 1;
            }
        }
        split.validation.extend_from_slice(&idx[..n_valid]);
        split.test.extend_from_slice(&idx[n_valid..n_valid + n_test]);
        split.train.extend_from_slice(&idx[n_valid + n_test..]);
    }
    split.train.sort_unstable();
    split.validation.sort_unstable();
    split.test.sort_unstable();
    split
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Held-out metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub samples: usize,
    pub mae: f64,
    pub rmse: f64,
    pub r2: f64,
    /// Mean absolute percentage error, in percent.
    pub mean_pct_error: f64,
    /// MAE of the per-compound linear tyre-age baseline on the same rows.
    pub baseline_mae: Option<f64>,
    /// Sorted by descending importance.
    pub feature_importance: Vec<FeatureImportance>,
}

/// Prediction band offsets taken from validation residuals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResidualBand {
    pub lower_quantile: f64,
    pub upper_quantile: f64,
    /// Added to a point prediction to get the band's lower edge (usually < 0).
    pub lower: f64,
    pub upper: f64,
    pub std_dev: f64,
}

/// Self-description stored with every artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub format_version: u32,
    pub feature_names: Vec<String>,
    pub params: BoostingParams,
    pub split: SplitRatios,
    pub seed: u64,
    pub min_stint_length: u32,
    pub train_rows: usize,
    pub validation_rows: usize,
    pub test_rows: usize,
    pub best_iteration: usize,
    pub rounds_run: usize,
    pub validation: EvaluationReport,
    pub test: Option<EvaluationReport>,
}

/// Model output for a batch of feature vectors.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub values: Array1<f64>,
    pub notices: Vec<UnknownCategoryNotice>,
}

/// The trained lap-time model: the tree ensemble together with the
/// preprocessing transform it was fit against. Only [`train`](Self::train)
/// and [`load`](Self::load) construct one, so the pair can't be mismatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradationModel {
    transform: PreprocessingTransform,
    ensemble: GradientBoostedTrees,
    band: ResidualBand,
    metadata: ModelMetadata,
}

impl DegradationModel {
    pub fn train(rows: &[TrainingRow], cfg: &PipelineConfig) -> Result<Self> {
        cfg.validate()?;
        if rows.len() < cfg.min_fit_rows.max(2) {
            return Err(Error::InsufficientData {
                what: "training",
                needed: cfg.min_fit_rows.max(2),
                got: rows.len(),
            });
        }
        check_degenerate(rows)?;

        let split = stratified_split(rows, &cfg.split, cfg.seed);
        if split.train.is_empty() || split.validation.is_empty() {
            return Err(Error::Training(format!(
                "empty split (train {}, validation {})",
                split.train.len(),
                split.validation.len()
            )));
        }
        let pick = |idx: &[usize]| idx.iter().map(|&i| &rows[i]).collect::<Vec<_>>();
        let train = pick(&split.train);
        let valid = pick(&split.validation);
        let test = pick(&split.test);
        info!(
            train = train.len(),
            validation = valid.len(),
            test = test.len(),
            "split training rows"
        );

        let transform = PreprocessingTransform::fit(&train, 1)?;
        let (x_train, y_train) = design(&transform, &train);
        let (x_valid, y_valid) = design(&transform, &valid);
        let run = GradientBoostedTrees::fit(&cfg.boosting, &x_train, &y_train, &x_valid, &y_valid, cfg.seed)?;

        let feature_names = transform.feature_names();
        let mut model = DegradationModel {
            transform,
            ensemble: run.model,
            band: ResidualBand {
                lower_quantile: cfg.band.lower,
                upper_quantile: cfg.band.upper,
                lower: 0.0,
                upper: 0.0,
                std_dev: 0.0,
            },
            metadata: ModelMetadata {
                format_version: ARTIFACT_VERSION,
                feature_names,
                params: cfg.boosting.clone(),
                split: cfg.split,
                seed: cfg.seed,
                min_stint_length: cfg.min_stint_length,
                train_rows: train.len(),
                validation_rows: valid.len(),
                test_rows: test.len(),
                best_iteration: run.best_iteration,
                rounds_run: run.rounds_run,
                validation: EvaluationReport::empty(),
                test: None,
            },
        };

        let valid_pred = model.predict(&valid).values;
        let residuals = &y_valid - &valid_pred;
        model.band.std_dev = if residuals.len() > 1 { residuals.std(1.0) } else { 0.0 };
        let mut residuals = residuals.to_vec();
        model.band.lower = stats::quantile(&mut residuals, cfg.band.lower).unwrap_or(0.0);
        model.band.upper = stats::quantile(&mut residuals, cfg.band.upper).unwrap_or(0.0);

        model.metadata.validation = model.report(&train, &valid, &valid_pred)?;
        if !test.is_empty() {
            let test_pred = model.predict(&test).values;
            model.metadata.test = Some(model.report(&train, &test, &test_pred)?);
        }
        let v = &model.metadata.validation;
        info!(
            mae = v.mae,
            rmse = v.rmse,
            r2 = v.r2,
            trees = model.ensemble.n_trees(),
            "trained degradation model"
        );
        Ok(model)
    }

    /// Lap-time estimates in seconds. Unseen categories never fail; they are
    /// reported in `notices`.
    pub fn predict<T: AsRef<FeatureVector>>(&self, rows: &[T]) -> Prediction {
        let transformed = self.transform.apply(rows);
        let values: Array1<f64> = self.ensemble.predict(&transformed.matrix);
        Prediction {
            values,
            notices: transformed.notices,
        }
    }

    /// Scores the model on rows it was not trained on, e.g. a later season.
    pub fn evaluate(&self, rows: &[TrainingRow]) -> Result<EvaluationReport> {
        if rows.is_empty() {
            return Err(Error::InsufficientData {
                what: "evaluation",
                needed: 1,
                got: 0,
            });
        }
        let refs: Vec<&TrainingRow> = rows.iter().collect();
        let pred = self.predict(&refs).values;
        let mut report = self.score(&refs, &pred)?;
        report.baseline_mae = None;
        Ok(report)
    }

    fn report(&self, train: &[&TrainingRow], held_out: &[&TrainingRow], pred: &Array1<f64>) -> Result<EvaluationReport> {
        let mut report = self.score(held_out, pred)?;
        report.baseline_mae = baseline_mae(train, held_out);
        Ok(report)
    }

    fn score(&self, rows: &[&TrainingRow], pred: &Array1<f64>) -> Result<EvaluationReport> {
        let y: Array1<f64> = rows.iter().map(|r| r.target).collect();
        let metric_err = |e: linfa::Error| Error::Training(format!("metric computation failed: {}", e));
        let mae = pred.mean_absolute_error(&y).map_err(metric_err)?;
        let mse = pred.mean_squared_error(&y).map_err(metric_err)?;
        let r2 = pred.r2(&y).map_err(metric_err)?;
        let mean_pct_error = ((&y - pred).mapv(f64::abs) / &y).mean().unwrap_or(0.0) * 100.0;

        let mut feature_importance: Vec<FeatureImportance> = self
            .metadata
            .feature_names
            .iter()
            .zip(self.ensemble.feature_importance())
            .map(|(name, importance)| FeatureImportance {
                feature: name.clone(),
                importance,
            })
            .collect();
        feature_importance.sort_by(|a, b| b.importance.total_cmp(&a.importance));

        Ok(EvaluationReport {
            samples: rows.len(),
            mae,
            rmse: mse.sqrt(),
            r2,
            mean_pct_error,
            baseline_mae: None,
            feature_importance,
        })
    }

    pub fn band(&self) -> &ResidualBand {
        &self.band
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn transform(&self) -> &PreprocessingTransform {
        &self.transform
    }

    /// Writes the artifact to `path` and its metadata to `<stem>.meta.json`
    /// next to it. Returns the metadata path.
    pub fn save(&self, path: &Path) -> Result<PathBuf> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let fh = OpenOptions::new().write(true).create(true).truncate(true).open(path)?;
        serde_json::to_writer(&fh, self)?;

        let meta_path = path.with_extension("meta.json");
        let fh = OpenOptions::new().write(true).create(true).truncate(true).open(&meta_path)?;
        serde_json::to_writer_pretty(&fh, &self.metadata)?;
        info!(artifact = %path.display(), metadata = %meta_path.display(), "saved model");
        Ok(meta_path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let fh = OpenOptions::new().read(true).open(path)?;
        let model: DegradationModel = serde_json::from_reader(&fh)?;
        if model.metadata.format_version != ARTIFACT_VERSION {
            return Err(Error::IncompatibleArtifact {
                found: model.metadata.format_version,
                expected: ARTIFACT_VERSION,
            });
        }
        if model.ensemble.n_features() != model.transform.n_columns()
            || model.metadata.feature_names != model.transform.feature_names()
        {
            return Err(Error::DataFormat(
                "model artifact transform and ensemble disagree on feature layout".into(),
            ));
        }
        Ok(model)
    }
}

impl EvaluationReport {
    fn empty() -> Self {
        EvaluationReport {
            samples: 0,
            mae: 0.0,
            rmse: 0.0,
            r2: 0.0,
            mean_pct_error: 0.0,
            baseline_mae: None,
            feature_importance: Vec::new(),
        }
    }
}

fn design(transform: &PreprocessingTransform, rows: &[&TrainingRow]) -> (Array2<f64>, Array1<f64>) {
    let x = transform.apply(rows).matrix;
    let y = rows.iter().map(|r| r.target).collect();
    (x, y)
}

/// Rejects inputs no tree ensemble can learn anything meaningful from.
fn check_degenerate(rows: &[TrainingRow]) -> Result<()> {
    let targets: Array1<f64> = rows.iter().map(|r| r.target).collect();
    if targets.len() < 2 || targets.std(0.0) < 1e-9 {
        return Err(Error::Training("lap time target has zero variance".into()));
    }
    let single_class = (0..CATEGORICAL_FIELDS.len()).all(|i| {
        let first = rows[0].features.categorical()[i];
        rows.iter().all(|r| r.features.categorical()[i] == first)
    });
    if single_class {
        return Err(Error::Training(format!(
            "every categorical field ({}) holds a single class",
            CATEGORICAL_FIELDS.join(", ")
        )));
    }
    Ok(())
}

fn baseline_features(rows: &[&TrainingRow]) -> Array2<f64> {
    let mut x = Array2::zeros((rows.len(), 3));
    for (i, r) in rows.iter().enumerate() {
        let age = r.features.tyre_age as f64;
        x[[i, 0]] = age;
        x[[i, 1]] = age * age;
        x[[i, 2]] = r.features.lap_number as f64;
    }
    x
}

/// Per-compound linear fit on tyre age (plus its square) and lap number.
/// Compounds without a fit fall back to the median training lap time.
fn baseline_mae(train: &[&TrainingRow], held_out: &[&TrainingRow]) -> Option<f64> {
    let fallback = stats::median(&mut train.iter().map(|r| r.target).collect::<Vec<_>>())?;
    let compounds: HashSet<Compound> = held_out.iter().map(|r| r.features.compound).collect();

    let mut fits: HashMap<Compound, FittedLinearRegression> = HashMap::new();
    for comp in compounds {
        let comp_rows: Vec<&TrainingRow> = train.iter().copied().filter(|r| r.features.compound == comp).collect();
        if comp_rows.len() < 5 {
            continue;
        }
        let y: Array1<f64> = comp_rows.iter().map(|r| r.target).collect();
        let ds = Dataset::new(baseline_features(&comp_rows), y);
        match LinearRegression::new().fit(&ds) {
            Ok(m) => {
                fits.insert(comp, m);
            }
            Err(e) => warn!(compound = %comp, error = %e, "baseline fit failed"),
        }
    }

    let x = baseline_features(held_out);
    let errors: Vec<f64> = held_out
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let pred = fits.get(&r.features.compound).map_or(fallback, |m| {
                let row = x.row(i).to_owned().insert_axis(ndarray::Axis(0));
                m.predict(&row)[0]
            });
            (r.target - pred).abs()
        })
        .collect();
    Array1::from(errors).mean()
}
