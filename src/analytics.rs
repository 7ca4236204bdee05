//! Race analytics over normalized laps: stints, cumulative gaps to a
//! reference driver, and summary figures. Nothing here depends on the model.

use crate::data::{Compound, LapRecord};
use crate::error::{Error, Result};
use crate::notice::{DriverMismatchNotice, ReferenceNotice, ReferenceReason};
use ndarray::Array1;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

/// Drivers analyzed when the requested selection matches nobody.
pub const DEFAULT_SELECTION_CAP: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stint {
    pub driver_id: String,
    /// 1-based stint index for the driver.
    pub stint: u32,
    pub compound: Compound,
    pub start_lap: u32,
    pub end_lap: u32,
    pub length: u32,
    pub usable_for_training: bool,
}

/// Driver ids in order of first appearance.
fn drivers_in_order(laps: &[LapRecord]) -> Vec<&str> {
    let mut seen = Vec::new();
    for l in laps {
        if !seen.contains(&l.driver_id.as_str()) {
            seen.push(l.driver_id.as_str());
        }
    }
    seen
}

/// Groups each driver's laps into stints. Short stints are kept, flagged as
/// unusable for training.
pub fn aggregate_stints(laps: &[LapRecord], min_stint_length: u32) -> Vec<Stint> {
    let mut index: HashMap<(&str, u32), usize> = HashMap::new();
    let mut stints: Vec<Stint> = Vec::new();

    for l in laps {
        match index.get(&(l.driver_id.as_str(), l.stint)) {
            Some(&i) => {
                let s = &mut stints[i];
                s.start_lap = s.start_lap.min(l.lap_number);
                s.end_lap = s.end_lap.max(l.lap_number);
                if s.compound == Compound::Unknown {
                    s.compound = l.compound;
                }
            }
            None => {
                index.insert((l.driver_id.as_str(), l.stint), stints.len());
                stints.push(Stint {
                    driver_id: l.driver_id.clone(),
                    stint: l.stint,
                    compound: l.compound,
                    start_lap: l.lap_number,
                    end_lap: l.lap_number,
                    length: 0,
                    usable_for_training: false,
                });
            }
        }
    }

    for s in stints.iter_mut() {
        s.length = s.end_lap - s.start_lap + 1;
        s.usable_for_training = s.length >= min_stint_length;
    }
    debug!(stints = stints.len(), "aggregated stints");
    stints
}

/// What to compare in [`compute_gaps`].
#[derive(Debug, Clone, Default)]
pub struct GapRequest {
    /// Driver ids to analyze. Empty selects the first drivers by appearance.
    pub drivers: Vec<String>,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GapPoint {
    pub lap_number: u32,
    pub cumulative_gap: f64,
}

/// Cumulative gap of one driver to the reference, strictly increasing in lap.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GapSeries {
    pub driver_id: String,
    pub points: Vec<GapPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GapReport {
    pub reference: String,
    pub series: Vec<GapSeries>,
    pub driver_mismatch: Option<DriverMismatchNotice>,
    pub reference_notice: Option<ReferenceNotice>,
}

/// Other identifiers of present drivers that a missing request matches,
/// e.g. "16" for LEC.
fn identifier_hints(laps: &[LapRecord], missing: &[String]) -> Vec<(String, String)> {
    let mut hints: Vec<(String, String)> = Vec::new();
    for m in missing {
        let found = laps.iter().find(|l| {
            l.driver_number.as_deref() == Some(m.as_str())
                || l.driver_name.as_deref().map_or(false, |n| n.eq_ignore_ascii_case(m))
                || l.driver_id.eq_ignore_ascii_case(m)
        });
        if let Some(l) = found {
            hints.push((m.clone(), l.driver_id.clone()));
        }
    }
    hints
}

fn select_drivers(laps: &[LapRecord], requested: &[String]) -> (Vec<String>, Option<DriverMismatchNotice>) {
    let present = drivers_in_order(laps);
    let mut selected: Vec<String> = Vec::new();
    let mut missing: Vec<String> = Vec::new();
    for r in requested {
        if present.contains(&r.as_str()) {
            if !selected.contains(r) {
                selected.push(r.clone());
            }
        } else if !missing.contains(r) {
            missing.push(r.clone());
        }
    }

    let fallback_applied = selected.is_empty();
    if fallback_applied {
        selected = present
            .iter()
            .take(DEFAULT_SELECTION_CAP)
            .map(|d| d.to_string())
            .collect();
    }
    if missing.is_empty() {
        return (selected, None);
    }

    let notice = DriverMismatchNotice {
        identifier_hints: identifier_hints(laps, &missing),
        missing,
        fallback_applied,
        analyzed: selected.clone(),
    };
    warn!("{}", notice);
    (selected, Some(notice))
}

/// Picks the reference driver: the requested one when present, otherwise
/// the driver who led most laps, otherwise the lowest mean lap time.
/// Ties go to the earlier appearance.
pub fn resolve_reference(laps: &[LapRecord], requested: Option<&str>) -> Option<(String, Option<ReferenceNotice>)> {
    let present = drivers_in_order(laps);
    if let Some(r) = requested {
        if present.contains(&r) {
            return Some((r.to_string(), None));
        }
    }
    let first = *present.first()?;

    let led = |d: &str| laps.iter().filter(|l| l.driver_id == d && l.position == Some(1)).count();
    let mean_time = |d: &str| {
        let times: Array1<f64> = laps
            .iter()
            .filter(|l| l.driver_id == d)
            .filter_map(|l| l.lap_time_seconds)
            .collect();
        times.mean()
    };

    let mut best_led: Option<(&str, usize)> = None;
    for &d in &present {
        let n = led(d);
        if n > 0 && best_led.map_or(true, |(_, b)| n > b) {
            best_led = Some((d, n));
        }
    }
    let (substitute, reason) = match best_led {
        Some((d, _)) => (d, ReferenceReason::MostLapsLed),
        None => {
            let mut fastest: Option<(&str, f64)> = None;
            for &d in &present {
                if let Some(m) = mean_time(d) {
                    if fastest.map_or(true, |(_, b)| m < b) {
                        fastest = Some((d, m));
                    }
                }
            }
            match fastest {
                Some((d, _)) => (d, ReferenceReason::FastestMeanLap),
                None => (first, ReferenceReason::FirstAppearance),
            }
        }
    };

    let notice = ReferenceNotice {
        requested: requested.map(str::to_string),
        substitute: substitute.to_string(),
        reason,
    };
    warn!("{}", notice);
    Some((substitute.to_string(), Some(notice)))
}

fn timed_laps_of(laps: &[LapRecord], driver: &str) -> BTreeMap<u32, f64> {
    laps.iter()
        .filter(|l| l.driver_id == driver)
        .filter_map(|l| l.lap_time_seconds.map(|t| (l.lap_number, t)))
        .collect()
}

/// Cumulative gap of each selected driver to the reference.
///
/// Only laps timed for both the driver and the reference add to the running
/// total; other laps are skipped and the total carries over. The reference
/// itself is reported with an all-zero series when selected.
pub fn compute_gaps(laps: &[LapRecord], request: &GapRequest) -> Result<GapReport> {
    if laps.is_empty() {
        return Err(Error::InsufficientData {
            what: "gap analysis",
            needed: 1,
            got: 0,
        });
    }
    let (selected, driver_mismatch) = select_drivers(laps, &request.drivers);
    let (reference, reference_notice) =
        resolve_reference(laps, request.reference.as_deref()).ok_or(Error::InsufficientData {
            what: "gap analysis",
            needed: 1,
            got: 0,
        })?;

    let ref_laps = timed_laps_of(laps, &reference);
    let series = selected
        .iter()
        .map(|driver| {
            let mut cumulative_gap = 0.0;
            let points = timed_laps_of(laps, driver)
                .into_iter()
                .filter_map(|(lap_number, t)| {
                    let r = ref_laps.get(&lap_number)?;
                    cumulative_gap += t - r;
                    Some(GapPoint {
                        lap_number,
                        cumulative_gap,
                    })
                })
                .collect();
            GapSeries {
                driver_id: driver.clone(),
                points,
            }
        })
        .collect::<Vec<_>>();

    info!(reference = %reference, drivers = series.len(), "computed gaps");
    Ok(GapReport {
        reference,
        series,
        driver_mismatch,
        reference_notice,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FastestLap {
    pub driver_id: String,
    pub lap_number: u32,
    pub seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverFigure {
    pub driver_id: String,
    pub seconds: f64,
}

/// One driver's lap-time figures over a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverLapStats {
    pub driver_id: String,
    pub timed_laps: usize,
    pub best_lap: f64,
    pub average_lap: f64,
    /// `None` below two timed laps.
    pub std_dev: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RaceSummary {
    pub timed_laps: usize,
    pub fastest_lap: FastestLap,
    /// Lowest mean lap time.
    pub best_average: DriverFigure,
    /// Lowest lap time standard deviation, among drivers with two or more
    /// timed laps.
    pub most_consistent: Option<DriverFigure>,
    /// Drivers with at least one timed lap, in order of appearance.
    pub drivers: Vec<DriverLapStats>,
}

/// `None` when no lap carries a time.
pub fn race_summary(laps: &[LapRecord]) -> Option<RaceSummary> {
    let timed: Vec<&LapRecord> = laps.iter().filter(|l| l.lap_time_seconds.is_some()).collect();
    let fastest = timed
        .iter()
        .filter_map(|l| l.lap_time_seconds.map(|t| (l, t)))
        .min_by(|a, b| a.1.total_cmp(&b.1))?;

    let mut best_average: Option<DriverFigure> = None;
    let mut most_consistent: Option<DriverFigure> = None;
    let mut drivers = Vec::new();
    for d in drivers_in_order(laps) {
        let times: Array1<f64> = timed
            .iter()
            .filter(|l| l.driver_id == d)
            .filter_map(|l| l.lap_time_seconds)
            .collect();
        let m = match times.mean() {
            Some(m) => m,
            None => continue,
        };
        if best_average.as_ref().map_or(true, |b| m < b.seconds) {
            best_average = Some(DriverFigure {
                driver_id: d.to_string(),
                seconds: m,
            });
        }
        let spread = (times.len() > 1).then(|| times.std(1.0));
        if let Some(s) = spread {
            if most_consistent.as_ref().map_or(true, |b| s < b.seconds) {
                most_consistent = Some(DriverFigure {
                    driver_id: d.to_string(),
                    seconds: s,
                });
            }
        }
        drivers.push(DriverLapStats {
            driver_id: d.to_string(),
            timed_laps: times.len(),
            best_lap: times.iter().cloned().fold(f64::INFINITY, f64::min),
            average_lap: m,
            std_dev: spread,
        });
    }

    Some(RaceSummary {
        timed_laps: timed.len(),
        fastest_lap: FastestLap {
            driver_id: fastest.0.driver_id.clone(),
            lap_number: fastest.0.lap_number,
            seconds: fastest.1,
        },
        best_average: best_average?,
        most_consistent,
        drivers,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyStats {
    pub driver_id: String,
    /// In order of first use.
    pub compounds_used: Vec<Compound>,
    pub pit_stops: u32,
    pub longest_stint: u32,
}

/// Per-driver tyre usage, in order of appearance.
pub fn strategy_stats(stints: &[Stint]) -> Vec<StrategyStats> {
    let mut out: Vec<StrategyStats> = Vec::new();
    for s in stints {
        let pos = match out.iter().position(|o| o.driver_id == s.driver_id) {
            Some(p) => p,
            None => {
                out.push(StrategyStats {
                    driver_id: s.driver_id.clone(),
                    compounds_used: Vec::new(),
                    pit_stops: 0,
                    longest_stint: 0,
                });
                out.len() - 1
            }
        };
        let entry = &mut out[pos];
        if !entry.compounds_used.contains(&s.compound) {
            entry.compounds_used.push(s.compound);
        }
        entry.longest_stint = entry.longest_stint.max(s.length);
    }
    for entry in out.iter_mut() {
        let n = stints.iter().filter(|s| s.driver_id == entry.driver_id).count() as u32;
        entry.pit_stops = n.saturating_sub(1);
    }
    out
}

/// `M:SS.mmm`, or `N/A` for non-positive or non-finite input.
pub fn format_lap_time(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return "N/A".to_string();
    }
    let ms = (seconds * 1000.0).round() as u64;
    format!("{}:{:02}.{:03}", ms / 60_000, ms / 1000 % 60, ms % 1000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::lap;
    use approx::assert_abs_diff_eq;

    fn ab_laps() -> Vec<LapRecord> {
        let mut a1 = lap("A", 1, 1, 1, Some(90.0));
        let mut a2 = lap("A", 2, 2, 1, Some(91.5));
        a1.compound = Compound::Soft;
        a2.compound = Compound::Soft;
        vec![a1, a2, lap("B", 1, 1, 1, Some(90.0)), lap("B", 2, 2, 1, Some(90.5))]
    }

    #[test]
    fn ab_example_accumulates_lap_deltas() {
        let req = GapRequest {
            drivers: vec!["A".into()],
            reference: Some("B".into()),
        };
        let report = compute_gaps(&ab_laps(), &req).unwrap();
        assert_eq!(report.reference, "B");
        assert!(report.reference_notice.is_none());
        assert!(report.driver_mismatch.is_none());
        let pts = &report.series[0].points;
        assert_eq!(pts.len(), 2);
        assert_eq!(pts[0].lap_number, 1);
        assert_abs_diff_eq!(pts[0].cumulative_gap, 0.0);
        assert_eq!(pts[1].lap_number, 2);
        assert_abs_diff_eq!(pts[1].cumulative_gap, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn identical_laps_give_zero_gap() {
        let laps: Vec<LapRecord> = (1..=5)
            .flat_map(|n| {
                let t = 80.0 + n as f64 * 0.1;
                vec![lap("R", n, n, 1, Some(t)), lap("C", n, n, 1, Some(t))]
            })
            .collect();
        let req = GapRequest {
            drivers: vec!["C".into()],
            reference: Some("R".into()),
        };
        let report = compute_gaps(&laps, &req).unwrap();
        assert!(report.series[0].points.iter().all(|p| p.cumulative_gap == 0.0));
        assert_eq!(report.series[0].points.len(), 5);
    }

    #[test]
    fn missing_laps_skip_without_resetting() {
        let laps = vec![
            lap("R", 1, 1, 1, Some(90.0)),
            lap("R", 2, 2, 1, None),
            lap("R", 3, 3, 1, Some(90.0)),
            lap("C", 1, 1, 1, Some(91.0)),
            lap("C", 2, 2, 1, Some(91.0)),
            lap("C", 3, 3, 1, Some(90.5)),
            lap("C", 4, 4, 1, Some(90.5)),
        ];
        let req = GapRequest {
            drivers: vec!["C".into()],
            reference: Some("R".into()),
        };
        let report = compute_gaps(&laps, &req).unwrap();
        let pts: Vec<(u32, f64)> = report.series[0]
            .points
            .iter()
            .map(|p| (p.lap_number, p.cumulative_gap))
            .collect();
        assert_eq!(pts, vec![(1, 1.0), (3, 1.5)]);
    }

    #[test]
    fn unmatched_selection_falls_back() {
        let mut laps = ab_laps();
        laps[0].driver_number = Some("44".into());
        let req = GapRequest {
            drivers: vec!["44".into(), "ZZZ".into()],
            reference: Some("B".into()),
        };
        let report = compute_gaps(&laps, &req).unwrap();
        assert!(!report.series.is_empty());
        let notice = report.driver_mismatch.unwrap();
        assert!(notice.fallback_applied);
        assert_eq!(notice.missing, vec!["44".to_string(), "ZZZ".to_string()]);
        assert_eq!(notice.analyzed, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(notice.identifier_hints, vec![("44".to_string(), "A".to_string())]);
    }

    #[test]
    fn fallback_is_capped() {
        let laps: Vec<LapRecord> = (0..15).map(|i| lap(&format!("D{:02}", i), 1, 1, 1, Some(90.0))).collect();
        let req = GapRequest {
            drivers: vec!["NOPE".into()],
            reference: None,
        };
        let report = compute_gaps(&laps, &req).unwrap();
        assert_eq!(report.series.len(), DEFAULT_SELECTION_CAP);
        assert_eq!(report.series[0].driver_id, "D00");
    }

    #[test]
    fn partial_mismatch_is_reported_without_fallback() {
        let req = GapRequest {
            drivers: vec!["A".into(), "X".into()],
            reference: Some("B".into()),
        };
        let report = compute_gaps(&ab_laps(), &req).unwrap();
        let notice = report.driver_mismatch.unwrap();
        assert!(!notice.fallback_applied);
        assert_eq!(report.series.len(), 1);
    }

    #[test]
    fn reference_prefers_most_laps_led() {
        let mut laps = ab_laps();
        laps[2].position = Some(1);
        laps[3].position = Some(1);
        laps[1].position = Some(1);
        let (r, notice) = resolve_reference(&laps, Some("MISSING")).unwrap();
        assert_eq!(r, "B");
        let notice = notice.unwrap();
        assert_eq!(notice.reason, ReferenceReason::MostLapsLed);
        assert_eq!(notice.requested.as_deref(), Some("MISSING"));
    }

    #[test]
    fn reference_falls_back_to_fastest_mean() {
        let (r, notice) = resolve_reference(&ab_laps(), None).unwrap();
        assert_eq!(r, "B");
        assert_eq!(notice.unwrap().reason, ReferenceReason::FastestMeanLap);

        let untimed = vec![lap("X", 1, 1, 1, None), lap("Y", 1, 1, 1, None)];
        let (r, notice) = resolve_reference(&untimed, None).unwrap();
        assert_eq!(r, "X");
        assert_eq!(notice.unwrap().reason, ReferenceReason::FirstAppearance);
    }

    #[test]
    fn empty_input_is_an_error() {
        let err = compute_gaps(&[], &GapRequest::default()).unwrap_err();
        assert!(matches!(err, Error::InsufficientData { .. }));
    }

    #[test]
    fn short_stint_kept_for_display() {
        let laps = vec![
            lap("LEC", 1, 1, 1, Some(83.0)),
            lap("LEC", 2, 2, 1, Some(83.1)),
            lap("LEC", 3, 1, 2, Some(84.0)),
            lap("LEC", 4, 2, 2, Some(83.2)),
            lap("LEC", 5, 3, 2, Some(83.3)),
        ];
        let stints = aggregate_stints(&laps, 3);
        assert_eq!(stints.len(), 2);
        assert_eq!((stints[0].start_lap, stints[0].end_lap, stints[0].length), (1, 2, 2));
        assert!(!stints[0].usable_for_training);
        assert_eq!(stints[1].length, 3);
        assert!(stints[1].usable_for_training);

        let stats = strategy_stats(&stints);
        assert_eq!(stats[0].pit_stops, 1);
        assert_eq!(stats[0].longest_stint, 3);
        assert_eq!(stats[0].compounds_used, vec![Compound::Medium]);
    }

    #[test]
    fn summary_figures() {
        let laps = vec![
            lap("A", 1, 1, 1, Some(90.0)),
            lap("A", 2, 2, 1, Some(92.0)),
            lap("B", 1, 1, 1, Some(90.5)),
            lap("B", 2, 2, 1, Some(90.7)),
            lap("B", 3, 3, 1, None),
        ];
        let s = race_summary(&laps).unwrap();
        assert_eq!(s.timed_laps, 4);
        assert_eq!(s.fastest_lap.driver_id, "A");
        assert_eq!(s.fastest_lap.lap_number, 1);
        assert_eq!(s.best_average.driver_id, "B");
        assert_eq!(s.most_consistent.unwrap().driver_id, "B");

        let ids: Vec<&str> = s.drivers.iter().map(|d| d.driver_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
        assert_eq!(s.drivers[0].best_lap, 90.0);
        assert_abs_diff_eq!(s.drivers[0].average_lap, 91.0, epsilon = 1e-12);
        assert_abs_diff_eq!(s.drivers[0].std_dev.unwrap(), 2.0f64.sqrt(), epsilon = 1e-12);
        assert_eq!(s.drivers[1].timed_laps, 2);
        assert_eq!(s.drivers[1].best_lap, 90.5);

        let single = race_summary(&[lap("C", 1, 1, 1, Some(88.0))]).unwrap();
        assert_eq!(single.drivers[0].std_dev, None);
        assert!(single.most_consistent.is_none());
        assert!(race_summary(&[lap("A", 1, 1, 1, None)]).is_none());
    }

    #[test]
    fn lap_time_format() {
        assert_eq!(format_lap_time(91.234), "1:31.234");
        assert_eq!(format_lap_time(59.5), "0:59.500");
        assert_eq!(format_lap_time(0.0), "N/A");
        assert_eq!(format_lap_time(59.9996), "1:00.000");
        assert_eq!(format_lap_time(119.9999), "2:00.000");
    }
}
