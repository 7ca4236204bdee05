//! Informational signals returned alongside best-effort results.

use serde::Serialize;
use std::fmt;

/// Inference met a category outside the fitted vocabulary; the value was
/// routed to the field's unknown slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnknownCategoryNotice {
    pub field: &'static str,
    pub value: String,
    pub rows: usize,
}

/// Requested drivers that are absent from the lap data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriverMismatchNotice {
    pub missing: Vec<String>,
    /// True when nothing requested matched and the default selection was used.
    pub fallback_applied: bool,
    /// The drivers actually analyzed.
    pub analyzed: Vec<String>,
    /// `(requested, driver_id)` pairs where the request matched another
    /// identifier of a present driver, e.g. a car number instead of a code.
    pub identifier_hints: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReferenceReason {
    MostLapsLed,
    FastestMeanLap,
    FirstAppearance,
}

/// The requested reference driver was absent and a substitute was chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceNotice {
    pub requested: Option<String>,
    pub substitute: String,
    pub reason: ReferenceReason,
}

impl fmt::Display for UnknownCategoryNotice {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "unknown {} '{}' in {} row(s), routed to unknown slot",
            self.field, self.value, self.rows
        )
    }
}

impl fmt::Display for DriverMismatchNotice {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "drivers not found in lap data: {}", self.missing.join(", "))?;
        if self.fallback_applied {
            write!(f, "; falling back to {}", self.analyzed.join(", "))?;
        }
        for (requested, id) in &self.identifier_hints {
            write!(f, "; '{}' looks like an identifier of {}", requested, id)?;
        }
        Ok(())
    }
}

impl fmt::Display for ReferenceNotice {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let reason = match self.reason {
            ReferenceReason::MostLapsLed => "most laps led",
            ReferenceReason::FastestMeanLap => "lowest mean lap time",
            ReferenceReason::FirstAppearance => "first to appear",
        };
        match &self.requested {
            Some(r) => write!(
                f,
                "reference driver {} not in lap data; using {} ({})",
                r, self.substitute, reason
            ),
            None => write!(f, "no reference driver given; using {} ({})", self.substitute, reason),
        }
    }
}
