//! Tyre degradation modelling and race analytics from per-lap timing data.
//!
//! Raw lap tables are normalized in [`data`], turned into model inputs in
//! [`features`] and [`preprocess`], and fed to the boosted-tree
//! [`model::DegradationModel`]. [`strategy`] runs the trained model over
//! synthetic stints; [`analytics`] works on the laps directly.

pub mod analytics;
pub mod config;
pub mod data;
pub mod error;
pub mod features;
pub mod gbm;
pub mod model;
pub mod notice;
pub mod pipeline;
pub mod preprocess;
pub mod stats;
pub mod store;
pub mod strategy;

#[cfg(test)]
mod testutil;

pub use config::PipelineConfig;
pub use data::{Compound, LapRecord};
pub use error::{Error, Result};
pub use model::DegradationModel;
