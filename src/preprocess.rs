//! Encode + scale transform shared by training and inference.
//!
//! Column layout is fixed at fit time: the numerical fields first, in
//! [`NUMERICAL_FIELDS`] order, then for each categorical field its sorted
//! vocabulary followed by one unknown slot. Inputs never change the layout,
//! which the tree ensemble relies on because splits address columns by index.

use crate::error::{Error, Result};
use crate::features::{FeatureVector, CATEGORICAL_FIELDS, NUMERICAL_FIELDS};
use crate::notice::UnknownCategoryNotice;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::warn;

const UNKNOWN_SLOT: &str = "<unknown>";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericScaler {
    pub field: String,
    pub mean: f64,
    pub scale: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryVocabulary {
    pub field: String,
    /// Sorted, deduplicated.
    pub categories: Vec<String>,
}

impl CategoryVocabulary {
    fn index_of(&self, value: &str) -> Option<usize> {
        self.categories.binary_search_by(|c| c.as_str().cmp(value)).ok()
    }

    /// Indicator columns including the unknown slot.
    fn width(&self) -> usize {
        self.categories.len() + 1
    }
}

/// Fitted preprocessing parameters. Immutable once fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingTransform {
    numerical: Vec<NumericScaler>,
    categorical: Vec<CategoryVocabulary>,
}

/// Encoded matrix plus any unknown-category notices raised while encoding.
#[derive(Debug, Clone)]
pub struct Transformed {
    pub matrix: Array2<f64>,
    pub notices: Vec<UnknownCategoryNotice>,
}

impl PreprocessingTransform {
    pub fn fit<T: AsRef<FeatureVector>>(rows: &[T], min_rows: usize) -> Result<Self> {
        if rows.len() < min_rows.max(1) {
            return Err(Error::InsufficientData {
                what: "preprocessing fit",
                needed: min_rows.max(1),
                got: rows.len(),
            });
        }

        let n = rows.len() as f64;
        let numerical = NUMERICAL_FIELDS
            .iter()
            .enumerate()
            .map(|(i, field)| {
                let mean = rows.iter().map(|r| r.as_ref().numerical()[i]).sum::<f64>() / n;
                let var = rows
                    .iter()
                    .map(|r| (r.as_ref().numerical()[i] - mean).powi(2))
                    .sum::<f64>()
                    / n;
                let std = var.sqrt();
                NumericScaler {
                    field: field.to_string(),
                    mean,
                    scale: if std > 1e-12 { std } else { 1.0 },
                }
            })
            .collect();

        let categorical = CATEGORICAL_FIELDS
            .iter()
            .enumerate()
            .map(|(i, field)| {
                let set: BTreeSet<&str> = rows.iter().map(|r| r.as_ref().categorical()[i]).collect();
                CategoryVocabulary {
                    field: field.to_string(),
                    categories: set.into_iter().map(str::to_string).collect(),
                }
            })
            .collect();

        Ok(PreprocessingTransform { numerical, categorical })
    }

    pub fn n_columns(&self) -> usize {
        self.numerical.len() + self.categorical.iter().map(CategoryVocabulary::width).sum::<usize>()
    }

    /// Column names in matrix order, e.g. `tyre_age`, `compound=SOFT`,
    /// `compound=<unknown>`.
    pub fn feature_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.numerical.iter().map(|s| s.field.clone()).collect();
        for vocab in &self.categorical {
            names.extend(vocab.categories.iter().map(|c| format!("{}={}", vocab.field, c)));
            names.push(format!("{}={}", vocab.field, UNKNOWN_SLOT));
        }
        names
    }

    pub fn numeric_scalers(&self) -> &[NumericScaler] {
        &self.numerical
    }

    /// Fitted categories of a categorical field.
    pub fn categories(&self, field: &str) -> Option<&[String]> {
        self.categorical
            .iter()
            .find(|v| v.field == field)
            .map(|v| v.categories.as_slice())
    }

    pub fn apply<T: AsRef<FeatureVector>>(&self, rows: &[T]) -> Transformed {
        let mut matrix = Array2::<f64>::zeros((rows.len(), self.n_columns()));
        let mut unknown: Vec<UnknownCategoryNotice> = Vec::new();
        let mut unknown_idx: HashMap<(usize, String), usize> = HashMap::new();

        for (r, row) in rows.iter().enumerate() {
            let fv = row.as_ref();
            for (c, (scaler, value)) in self.numerical.iter().zip(fv.numerical()).enumerate() {
                matrix[[r, c]] = (value - scaler.mean) / scaler.scale;
            }

            let mut offset = self.numerical.len();
            for (i, (vocab, value)) in self.categorical.iter().zip(fv.categorical()).enumerate() {
                let slot = match vocab.index_of(value) {
                    Some(idx) => idx,
                    None => {
                        match unknown_idx.get(&(i, value.to_string())) {
                            Some(&n) => unknown[n].rows += 1,
                            None => {
                                unknown_idx.insert((i, value.to_string()), unknown.len());
                                unknown.push(UnknownCategoryNotice {
                                    field: CATEGORICAL_FIELDS[i],
                                    value: value.to_string(),
                                    rows: 1,
                                });
                            }
                        }
                        vocab.categories.len()
                    }
                };
                matrix[[r, offset + slot]] = 1.0;
                offset += vocab.width();
            }
        }

        for notice in &unknown {
            warn!("{}", notice);
        }
        Transformed {
            matrix,
            notices: unknown,
        }
    }

    /// Single-row form of [`apply`](Self::apply).
    pub fn apply_one(&self, row: &FeatureVector) -> Transformed {
        self.apply(std::slice::from_ref(row))
    }
}
