//! Configured batch run: load sessions, build rows, train.

use crate::config::{PipelineConfig, SessionSpec};
use crate::data::{normalize, NormalizedSession, RawLapTable, SessionMeta};
use crate::error::Result;
use crate::features::{build_training_rows, TrainingRow};
use crate::model::DegradationModel;
use crate::store::{SessionKey, SessionStore};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedSession {
    pub season: u16,
    pub event: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct LoadedSessions {
    pub sessions: Vec<NormalizedSession>,
    pub skipped: Vec<SkippedSession>,
}

/// Reads one session's table, from the store when it has it, and normalizes it.
pub fn load_session(spec: &SessionSpec, store: Option<&mut (dyn SessionStore + '_)>) -> Result<NormalizedSession> {
    let key = SessionKey::new(spec.season, &spec.event);
    let table = match store {
        Some(store) => match store.get(&key)? {
            Some(t) => t,
            None => {
                let t = RawLapTable::from_path(&spec.path)?;
                store.put(&key, &t)?;
                t
            }
        },
        None => RawLapTable::from_path(&spec.path)?,
    };
    let mut meta = SessionMeta::new(spec.season, &spec.event);
    if let Some(track) = &spec.track_id {
        meta.track_id = track.clone();
    }
    normalize(&table, &meta)
}

/// Loads every selected session. Sessions whose tables can't be interpreted
/// are skipped and listed; other failures abort.
pub fn load_sessions(cfg: &PipelineConfig, mut store: Option<&mut (dyn SessionStore + '_)>) -> Result<LoadedSessions> {
    let mut loaded = LoadedSessions::default();
    for spec in cfg.selected_sessions() {
        match load_session(spec, store.as_deref_mut()) {
            Ok(s) => loaded.sessions.push(s),
            Err(e) if e.is_session_local() => {
                warn!(season = spec.season, event = %spec.event, error = %e, "skipping session");
                loaded.skipped.push(SkippedSession {
                    season: spec.season,
                    event: spec.event.clone(),
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }
    info!(
        sessions = loaded.sessions.len(),
        skipped = loaded.skipped.len(),
        "loaded sessions"
    );
    Ok(loaded)
}

/// Training rows from every session; stints never span sessions.
pub fn training_rows(sessions: &[NormalizedSession], min_stint_length: u32) -> Vec<TrainingRow> {
    sessions
        .iter()
        .flat_map(|s| build_training_rows(&s.laps, min_stint_length))
        .collect()
}

pub fn train_from_config(
    cfg: &PipelineConfig,
    store: Option<&mut (dyn SessionStore + '_)>,
) -> Result<(DegradationModel, LoadedSessions)> {
    cfg.validate()?;
    let loaded = load_sessions(cfg, store)?;
    let rows = training_rows(&loaded.sessions, cfg.min_stint_length);
    let model = DegradationModel::train(&rows, cfg)?;
    Ok((model, loaded))
}
