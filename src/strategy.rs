use crate::data::Compound;
use crate::error::{Error, Result};
use crate::features::FeatureVector;
use crate::model::DegradationModel;
use crate::notice::UnknownCategoryNotice;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Seconds lost driving through the pit lane.
pub const DEFAULT_PIT_LOSS: f64 = 21.0;

/// A lap counts as past the cliff once it is this much slower than the first.
const CLIFF_THRESHOLD: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverProfile {
    #[default]
    Average,
    Contender,
    Rookie,
}

impl DriverProfile {
    /// Multiplier applied to predicted lap times.
    pub fn pace_factor(self) -> f64 {
        match self {
            DriverProfile::Average => 1.0,
            DriverProfile::Contender => 0.995,
            DriverProfile::Rookie => 1.005,
        }
    }
}

impl FromStr for DriverProfile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "average" => Ok(DriverProfile::Average),
            "contender" => Ok(DriverProfile::Contender),
            "rookie" => Ok(DriverProfile::Rookie),
            other => Err(Error::InvalidConfig(format!("unknown driver profile '{}'", other))),
        }
    }
}

/// The context a stint is simulated in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StintScenario {
    pub compound: Compound,
    pub min_laps: u32,
    pub max_laps: u32,
    /// Race laps completed before the stint starts; tyre age `n` is driven on
    /// race lap `start_lap + n`.
    pub start_lap: u32,
    pub track_id: String,
    pub driver_id: String,
    pub team_id: String,
    pub profile: DriverProfile,
}

impl StintScenario {
    fn check(&self) -> Result<()> {
        if self.min_laps == 0 || self.min_laps > self.max_laps {
            return Err(Error::InvalidConfig(format!(
                "stint length range {}..={} is empty",
                self.min_laps, self.max_laps
            )));
        }
        Ok(())
    }

    fn features(&self) -> Vec<FeatureVector> {
        (1..=self.max_laps)
            .map(|age| FeatureVector {
                tyre_age: age,
                lap_number: self.start_lap + age,
                compound: self.compound,
                track_id: self.track_id.clone(),
                driver_id: self.driver_id.clone(),
                team_id: self.team_id.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CurvePoint {
    pub tyre_age: u32,
    pub lap_number: u32,
    pub predicted: f64,
    pub lower: f64,
    pub upper: f64,
    /// Seconds slower than the first lap on this set.
    pub delta_to_fresh: f64,
    pub cumulative_loss: f64,
}

/// Totals for running the stint exactly `laps` long.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StintOutcome {
    pub laps: u32,
    pub total_time: f64,
    pub lower_total: f64,
    pub upper_total: f64,
    pub mean_lap: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DegradationCurve {
    pub compound: Compound,
    pub points: Vec<CurvePoint>,
    pub total_degradation: f64,
    pub degradation_per_lap: f64,
    /// First tyre age more than a second off the fresh-tyre pace.
    pub cliff_lap: Option<u32>,
    /// One entry per length in `min_laps..=max_laps`.
    pub outcomes: Vec<StintOutcome>,
    pub notices: Vec<UnknownCategoryNotice>,
}

impl DegradationCurve {
    /// Outcome at the longest simulated length.
    pub fn full_stint(&self) -> Option<&StintOutcome> {
        self.outcomes.last()
    }
}

pub fn simulate_stint(model: &DegradationModel, scenario: &StintScenario) -> Result<DegradationCurve> {
    scenario.check()?;
    let features = scenario.features();
    let prediction = model.predict(&features);
    let band = model.band();
    let k = scenario.profile.pace_factor();

    let mut points: Vec<CurvePoint> = Vec::with_capacity(features.len());
    let mut cumulative_loss = 0.0;
    for (fv, raw) in features.iter().zip(prediction.values.iter()) {
        let predicted = raw * k;
        let fresh = points.first().map_or(predicted, |p| p.predicted);
        let delta_to_fresh = predicted - fresh;
        cumulative_loss += delta_to_fresh;
        points.push(CurvePoint {
            tyre_age: fv.tyre_age,
            lap_number: fv.lap_number,
            predicted,
            lower: (raw + band.lower) * k,
            upper: (raw + band.upper) * k,
            delta_to_fresh,
            cumulative_loss,
        });
    }

    let total_degradation = points.last().map_or(0.0, |p| p.delta_to_fresh);
    let degradation_per_lap = if points.len() > 1 {
        total_degradation / (points.len() - 1) as f64
    } else {
        0.0
    };
    let cliff_lap = points
        .iter()
        .find(|p| p.delta_to_fresh > CLIFF_THRESHOLD)
        .map(|p| p.tyre_age);

    let outcomes = (scenario.min_laps..=scenario.max_laps)
        .map(|laps| {
            let run = &points[..laps as usize];
            let total_time: f64 = run.iter().map(|p| p.predicted).sum();
            StintOutcome {
                laps,
                total_time,
                lower_total: run.iter().map(|p| p.lower).sum(),
                upper_total: run.iter().map(|p| p.upper).sum(),
                mean_lap: total_time / laps as f64,
            }
        })
        .collect();

    debug!(
        compound = %scenario.compound,
        laps = scenario.max_laps,
        total_degradation,
        "simulated stint"
    );
    Ok(DegradationCurve {
        compound: scenario.compound,
        points,
        total_degradation,
        degradation_per_lap,
        cliff_lap,
        outcomes,
        notices: prediction.notices,
    })
}

/// Simulates each compound over the same context and ranks them by total
/// time at `max_laps`, fastest first. Ties keep compound order.
pub fn compare_compounds(
    model: &DegradationModel,
    scenario: &StintScenario,
    compounds: &[Compound],
) -> Result<Vec<DegradationCurve>> {
    let mut sorted = compounds.to_vec();
    sorted.sort();
    sorted.dedup();

    let mut curves = sorted
        .into_iter()
        .map(|compound| {
            let s = StintScenario {
                compound,
                ..scenario.clone()
            };
            simulate_stint(model, &s)
        })
        .collect::<Result<Vec<_>>>()?;

    let total = |c: &DegradationCurve| c.full_stint().map_or(f64::INFINITY, |o| o.total_time);
    curves.sort_by(|a, b| total(a).total_cmp(&total(b)));
    Ok(curves)
}

/// A full race strategy: the compound and length of every stint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RacePlan {
    pub name: String,
    pub stints: Vec<(Compound, u32)>,
}

impl RacePlan {
    pub fn new(stints: Vec<(Compound, u32)>) -> Self {
        let name = stints
            .iter()
            .map(|(c, _)| &c.as_str()[..1])
            .collect::<Vec<_>>()
            .join("-");
        RacePlan { name, stints }
    }

    pub fn race_laps(&self) -> u32 {
        self.stints.iter().map(|(_, n)| n).sum()
    }

    pub fn pit_stops(&self) -> u32 {
        self.stints.len().saturating_sub(1) as u32
    }
}

impl fmt::Display for RacePlan {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let parts: Vec<String> = self.stints.iter().map(|(c, n)| format!("{} x{}", c, n)).collect();
        write!(f, "{} ({})", self.name, parts.join(", "))
    }
}

/// One- and two-stop plans over the dry compounds with evenly split stints.
pub fn standard_plans(race_laps: u32) -> Vec<RacePlan> {
    use Compound::*;
    let half = race_laps / 2;
    let third = race_laps / 3;
    let one_stop = |a, b| RacePlan::new(vec![(a, half), (b, race_laps - half)]);
    let two_stop = |a, b, c| RacePlan::new(vec![(a, third), (b, third), (c, race_laps - 2 * third)]);
    vec![
        one_stop(Medium, Hard),
        one_stop(Hard, Medium),
        one_stop(Soft, Hard),
        two_stop(Soft, Medium, Medium),
        two_stop(Medium, Hard, Hard),
        two_stop(Hard, Medium, Medium),
    ]
    .into_iter()
    .filter(|p| p.stints.iter().all(|&(_, n)| n > 0))
    .collect()
}

/// Track, car and driver shared by every stint of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanContext {
    pub track_id: String,
    pub driver_id: String,
    pub team_id: String,
    pub profile: DriverProfile,
    pub pit_loss: f64,
    pub start_lap: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanOutcome {
    pub plan: RacePlan,
    pub total_time: f64,
    pub lower_total: f64,
    pub upper_total: f64,
    pub pit_stops: u32,
    pub notices: Vec<UnknownCategoryNotice>,
}

pub fn evaluate_plan(model: &DegradationModel, ctx: &PlanContext, plan: &RacePlan) -> Result<PlanOutcome> {
    if plan.stints.is_empty() {
        return Err(Error::InvalidConfig(format!("race plan '{}' has no stints", plan.name)));
    }
    let pit_time = ctx.pit_loss * plan.pit_stops() as f64;
    let mut outcome = PlanOutcome {
        plan: plan.clone(),
        total_time: pit_time,
        lower_total: pit_time,
        upper_total: pit_time,
        pit_stops: plan.pit_stops(),
        notices: Vec::new(),
    };

    let mut lap = ctx.start_lap;
    for &(compound, laps) in &plan.stints {
        let scenario = StintScenario {
            compound,
            min_laps: laps,
            max_laps: laps,
            start_lap: lap,
            track_id: ctx.track_id.clone(),
            driver_id: ctx.driver_id.clone(),
            team_id: ctx.team_id.clone(),
            profile: ctx.profile,
        };
        let curve = simulate_stint(model, &scenario)?;
        if let Some(o) = curve.full_stint() {
            outcome.total_time += o.total_time;
            outcome.lower_total += o.lower_total;
            outcome.upper_total += o.upper_total;
        }
        for n in curve.notices {
            if !outcome.notices.contains(&n) {
                outcome.notices.push(n);
            }
        }
        lap += laps;
    }
    Ok(outcome)
}

/// Evaluates every plan, fastest first.
pub fn rank_plans(model: &DegradationModel, ctx: &PlanContext, plans: &[RacePlan]) -> Result<Vec<PlanOutcome>> {
    let mut ranked = plans
        .iter()
        .map(|p| evaluate_plan(model, ctx, p))
        .collect::<Result<Vec<_>>>()?;
    ranked.sort_by(|a, b| a.total_time.total_cmp(&b.total_time));
    if let Some(best) = ranked.first() {
        info!(plan = %best.plan.name, total = best.total_time, "fastest race plan");
    }
    Ok(ranked)
}
