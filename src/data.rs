use crate::error::{Error, Result};
use csv::{ReaderBuilder, StringRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Compound {
    Soft,
    Medium,
    Hard,
    Intermediate,
    Wet,
    Unknown,
}

impl Compound {
    pub const DRY: [Compound; 3] = [Compound::Soft, Compound::Medium, Compound::Hard];

    /// Never fails: anything unrecognized becomes `Unknown`.
    pub fn parse(raw: &str) -> Compound {
        match raw.trim().to_uppercase().as_str() {
            "SOFT" | "S" => Compound::Soft,
            "MEDIUM" | "M" => Compound::Medium,
            "HARD" | "H" => Compound::Hard,
            "INTERMEDIATE" | "INTER" | "I" => Compound::Intermediate,
            "WET" | "W" => Compound::Wet,
            _ => Compound::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Compound::Soft => "SOFT",
            Compound::Medium => "MEDIUM",
            Compound::Hard => "HARD",
            Compound::Intermediate => "INTERMEDIATE",
            Compound::Wet => "WET",
            Compound::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Compound {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies the session a raw table came from.
#[derive(Debug, Clone)]
pub struct SessionMeta {
    pub season: u16,
    pub event: String,
    /// Used for every lap when the table has no track column.
    pub track_id: String,
}

impl SessionMeta {
    pub fn new(season: u16, event: &str) -> Self {
        SessionMeta {
            season,
            event: event.to_string(),
            track_id: event.to_string(),
        }
    }
}

/// Upstream driver identity. Providers disagree on which name fields they
/// fill, so every field but the code is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverIdentity {
    pub code: String,
    pub number: Option<String>,
    pub full_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl DriverIdentity {
    /// Resolution order: full name, first + last, code, number.
    pub fn display_name(&self) -> String {
        if let Some(full) = self.full_name.as_deref().filter(|s| !s.is_empty()) {
            return full.to_string();
        }
        match (self.first_name.as_deref(), self.last_name.as_deref()) {
            (Some(first), Some(last)) if !first.is_empty() && !last.is_empty() => {
                return format!("{} {}", first, last);
            }
            (None, Some(last)) | (Some(_), Some(last)) if !last.is_empty() => return last.to_string(),
            _ => {}
        }
        if !self.code.is_empty() {
            return self.code.clone();
        }
        self.number.clone().unwrap_or_default()
    }
}

/// One observed lap after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LapRecord {
    pub driver_id: String,
    pub driver_number: Option<String>,
    pub driver_name: Option<String>,
    pub team_id: String,
    pub track_id: String,
    pub lap_number: u32,
    pub compound: Compound,
    /// `None` when the timing feed had no usable time for this lap.
    pub lap_time_seconds: Option<f64>,
    /// Laps driven on the current tyre set, starting at 1.
    pub tyre_age: u32,
    /// 1-based stint index for this driver.
    pub stint: u32,
    pub position: Option<u32>,
}

/// A lap table exactly as delivered: headers plus string cells.
#[derive(Debug, Clone)]
pub struct RawLapTable {
    pub headers: Vec<String>,
    pub rows: Vec<StringRecord>,
}

impl RawLapTable {
    pub fn from_reader<R: Read>(rdr: R) -> Result<Self> {
        let mut reader = ReaderBuilder::new().has_headers(true).flexible(true).from_reader(rdr);
        let headers = reader
            .headers()
            .map_err(decode_error)?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        let rows = reader
            .records()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(decode_error)?;
        Ok(RawLapTable { headers, rows })
    }

    pub fn from_path<P: AsRef<Path>>(filename: P) -> Result<Self> {
        let fh = std::fs::File::open(filename)?;
        Self::from_reader(fh)
    }
}

/// A table that can't be decoded only spoils its own session; I/O failures stay fatal.
fn decode_error(e: csv::Error) -> Error {
    if e.is_io_error() {
        match e.into_kind() {
            csv::ErrorKind::Io(io) => Error::Io(io),
            other => Error::DataFormat(format!("{:?}", other)),
        }
    } else {
        Error::DataFormat(format!("undecodable lap table: {}", e))
    }
}

/// Where lap times come from. At least one column is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LapTimeColumns {
    pub seconds: Option<usize>,
    pub duration: Option<usize>,
}

/// Column positions for every role the normalizer understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSchema {
    pub driver: usize,
    pub lap_number: usize,
    pub lap_time: LapTimeColumns,
    pub compound: Option<usize>,
    pub team: Option<usize>,
    pub track: Option<usize>,
    pub position: Option<usize>,
    pub stint: Option<usize>,
    pub pit_in: Option<usize>,
    pub pit_out: Option<usize>,
    pub driver_number: Option<usize>,
    pub full_name: Option<usize>,
    pub first_name: Option<usize>,
    pub last_name: Option<usize>,
}

const DRIVER_COLS: &[&str] = &["Driver", "driver", "driver_id", "DriverID", "Abbreviation"];
const LAP_NUMBER_COLS: &[&str] = &["LapNumber", "lap_number", "Lap", "lap"];
const SECONDS_COLS: &[&str] = &["LapTimeSeconds", "lap_time_seconds", "LapTimeSeconds_lap"];
const DURATION_COLS: &[&str] = &["LapTime", "lap_time"];
const COMPOUND_COLS: &[&str] = &["Compound", "compound", "Compound_lap"];
const TEAM_COLS: &[&str] = &["Team", "TeamName", "team", "team_id", "TeamID"];
const TRACK_COLS: &[&str] = &["TrackID", "track_id", "Track", "Circuit", "EventName"];
const POSITION_COLS: &[&str] = &["Position", "position"];
const STINT_COLS: &[&str] = &["Stint", "stint"];
const PIT_IN_COLS: &[&str] = &["PitInTime", "pit_in_time", "PitIn"];
const PIT_OUT_COLS: &[&str] = &["PitOutTime", "pit_out_time", "PitOut"];
const NUMBER_COLS: &[&str] = &["DriverNumber", "driver_number", "Number"];
const FULL_NAME_COLS: &[&str] = &["DriverName", "FullName", "driver_name"];
const FIRST_NAME_COLS: &[&str] = &["FirstName", "first_name"];
const LAST_NAME_COLS: &[&str] = &["LastName", "last_name"];

fn find_col(headers: &[String], aliases: &[&str]) -> Option<usize> {
    aliases
        .iter()
        .find_map(|alias| headers.iter().position(|h| h == alias))
}

impl ResolvedSchema {
    pub fn resolve(headers: &[String]) -> Result<Self> {
        let driver = find_col(headers, DRIVER_COLS).ok_or(Error::MissingColumn { column: "driver" })?;
        let lap_number =
            find_col(headers, LAP_NUMBER_COLS).ok_or(Error::MissingColumn { column: "lap_number" })?;
        let lap_time = LapTimeColumns {
            seconds: find_col(headers, SECONDS_COLS),
            duration: find_col(headers, DURATION_COLS),
        };
        if lap_time.seconds.is_none() && lap_time.duration.is_none() {
            return Err(Error::DataFormat(format!(
                "no lap time column; expected one of {:?} or {:?}, found {:?}",
                SECONDS_COLS, DURATION_COLS, headers
            )));
        }
        Ok(ResolvedSchema {
            driver,
            lap_number,
            lap_time,
            compound: find_col(headers, COMPOUND_COLS),
            team: find_col(headers, TEAM_COLS),
            track: find_col(headers, TRACK_COLS),
            position: find_col(headers, POSITION_COLS),
            stint: find_col(headers, STINT_COLS),
            pit_in: find_col(headers, PIT_IN_COLS),
            pit_out: find_col(headers, PIT_OUT_COLS),
            driver_number: find_col(headers, NUMBER_COLS),
            full_name: find_col(headers, FULL_NAME_COLS),
            first_name: find_col(headers, FIRST_NAME_COLS),
            last_name: find_col(headers, LAST_NAME_COLS),
        })
    }
}

/// Output of [`normalize`].
#[derive(Debug, Clone)]
pub struct NormalizedSession {
    pub meta: SessionMeta,
    pub schema: ResolvedSchema,
    /// Ordered by driver appearance, then lap number.
    pub laps: Vec<LapRecord>,
    pub dropped_rows: usize,
}

impl NormalizedSession {
    /// Laps usable as regression targets.
    pub fn timed_laps(&self) -> impl Iterator<Item = &LapRecord> {
        self.laps.iter().filter(|l| l.lap_time_seconds.is_some())
    }
}

fn cell<'a>(row: &'a StringRecord, idx: Option<usize>) -> Option<&'a str> {
    let value = row.get(idx?)?.trim();
    match value {
        "" | "nan" | "NaN" | "NaT" | "None" | "null" | "NULL" => None,
        v => Some(v),
    }
}

fn positive(v: f64) -> Option<f64> {
    if v.is_finite() && v > 0.0 {
        Some(v)
    } else {
        None
    }
}

/// Parses `91.234`, `1:31.234`, `00:01:31.234` and `0 days 00:01:31.234000`.
pub fn parse_duration_seconds(raw: &str) -> Option<f64> {
    let mut s = raw.trim();
    let mut days = 0.0;
    if let Some(idx) = s.find("days") {
        days = s[..idx].trim().parse::<f64>().ok()?;
        s = s[idx + 4..].trim();
    } else if let Some(idx) = s.find("day") {
        days = s[..idx].trim().parse::<f64>().ok()?;
        s = s[idx + 3..].trim();
    }
    let parts: Vec<&str> = s.split(':').collect();
    let secs = match parts.as_slice() {
        [sec] => sec.parse::<f64>().ok()?,
        [min, sec] => min.parse::<f64>().ok()? * 60.0 + sec.parse::<f64>().ok()?,
        [hr, min, sec] => {
            hr.parse::<f64>().ok()? * 3600.0 + min.parse::<f64>().ok()? * 60.0 + sec.parse::<f64>().ok()?
        }
        _ => return None,
    };
    positive(days * 86_400.0 + secs)
}

fn lap_time(row: &StringRecord, cols: LapTimeColumns) -> Option<f64> {
    cell(row, cols.seconds)
        .and_then(|v| v.parse::<f64>().ok())
        .and_then(positive)
        .or_else(|| cell(row, cols.duration).and_then(parse_duration_seconds))
}

fn parse_count(raw: &str) -> Option<u32> {
    let v = raw.parse::<f64>().ok()?;
    if v.is_finite() && v >= 1.0 {
        Some(v.round() as u32)
    } else {
        None
    }
}

struct PendingLap {
    identity: DriverIdentity,
    team_id: String,
    track_id: String,
    lap_number: u32,
    compound: Compound,
    lap_time_seconds: Option<f64>,
    position: Option<u32>,
    stint_marker: Option<u32>,
    pit_in: bool,
    pit_out: bool,
}

/// Cleans one session's raw lap table and derives tyre age.
///
/// Rows without a driver or a valid lap number are dropped; rows without a
/// usable lap time are kept with `lap_time_seconds = None` so stint and tyre
/// age bookkeeping stays intact.
pub fn normalize(table: &RawLapTable, meta: &SessionMeta) -> Result<NormalizedSession> {
    let schema = ResolvedSchema::resolve(&table.headers)?;
    let mut dropped_rows = 0;

    // drivers in order of first appearance
    let mut order: Vec<String> = Vec::new();
    let mut by_driver: HashMap<String, Vec<PendingLap>> = HashMap::new();

    for row in &table.rows {
        let (driver, lap_number) = match (
            cell(row, Some(schema.driver)),
            cell(row, Some(schema.lap_number)).and_then(parse_count),
        ) {
            (Some(d), Some(n)) => (d.to_string(), n),
            _ => {
                dropped_rows += 1;
                continue;
            }
        };
        let identity = DriverIdentity {
            code: driver.clone(),
            number: cell(row, schema.driver_number).map(str::to_string),
            full_name: cell(row, schema.full_name).map(str::to_string),
            first_name: cell(row, schema.first_name).map(str::to_string),
            last_name: cell(row, schema.last_name).map(str::to_string),
        };
        let lap = PendingLap {
            identity,
            team_id: cell(row, schema.team).unwrap_or("UNKNOWN").to_string(),
            track_id: cell(row, schema.track).unwrap_or(&meta.track_id).to_string(),
            lap_number,
            compound: cell(row, schema.compound).map_or(Compound::Unknown, Compound::parse),
            lap_time_seconds: lap_time(row, schema.lap_time),
            position: cell(row, schema.position).and_then(parse_count),
            stint_marker: cell(row, schema.stint).and_then(parse_count),
            pit_in: cell(row, schema.pit_in).is_some(),
            pit_out: cell(row, schema.pit_out).is_some(),
        };
        if !by_driver.contains_key(&driver) {
            order.push(driver.clone());
        }
        by_driver.entry(driver).or_default().push(lap);
    }

    let mut laps = Vec::new();
    for driver in order {
        let mut pending = by_driver.remove(&driver).unwrap_or_default();
        pending.sort_by_key(|l| l.lap_number);
        let before = pending.len();
        pending.dedup_by_key(|l| l.lap_number);
        dropped_rows += before - pending.len();
        laps.extend(assign_tyre_age(pending));
    }

    info!(
        season = meta.season,
        event = %meta.event,
        laps = laps.len(),
        dropped = dropped_rows,
        "normalized session"
    );
    Ok(NormalizedSession {
        meta: meta.clone(),
        schema,
        laps,
        dropped_rows,
    })
}

/// Walks one driver's laps (sorted by lap number) and numbers stints and tyre age.
fn assign_tyre_age(pending: Vec<PendingLap>) -> Vec<LapRecord> {
    let mut out: Vec<LapRecord> = Vec::with_capacity(pending.len());
    let mut prev: Option<(Option<u32>, bool)> = None;
    // last known compound; blank pit-out laps must not hide a tyre change
    let mut known = Compound::Unknown;
    let mut stint = 0;
    let mut tyre_age = 0;

    for lap in pending {
        let new_stint = match prev {
            None => true,
            Some((prev_marker, prev_pit_in)) => {
                let marker_changed = matches!((prev_marker, lap.stint_marker), (Some(a), Some(b)) if a != b);
                let compound_changed =
                    known != Compound::Unknown && lap.compound != Compound::Unknown && known != lap.compound;
                marker_changed || compound_changed || lap.pit_out || prev_pit_in
            }
        };
        if new_stint {
            stint += 1;
            tyre_age = 1;
            if prev.is_some() {
                debug!(driver = %lap.identity.code, lap = lap.lap_number, stint, "stint boundary");
            }
        } else {
            tyre_age += 1;
        }
        prev = Some((lap.stint_marker, lap.pit_in));
        if lap.compound != Compound::Unknown {
            known = lap.compound;
        }

        let name = lap.identity.display_name();
        out.push(LapRecord {
            driver_name: if name != lap.identity.code { Some(name) } else { None },
            driver_id: lap.identity.code,
            driver_number: lap.identity.number,
            team_id: lap.team_id,
            track_id: lap.track_id,
            lap_number: lap.lap_number,
            compound: lap.compound,
            lap_time_seconds: lap.lap_time_seconds,
            tyre_age,
            stint,
            position: lap.position,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(csv: &str) -> RawLapTable {
        RawLapTable::from_reader(csv.as_bytes()).unwrap()
    }

    fn meta() -> SessionMeta {
        SessionMeta::new(2023, "Bahrain Grand Prix")
    }

    #[test]
    fn tyre_age_resets_at_pit_out() {
        let t = table(
            "Driver,LapNumber,LapTimeSeconds,Compound,PitInTime,PitOutTime\n\
             VER,1,95.1,MEDIUM,,\n\
             VER,2,94.0,MEDIUM,,\n\
             VER,3,99.0,MEDIUM,0 days 00:55:01,\n\
             VER,4,101.0,MEDIUM,,0 days 00:55:23\n\
             VER,5,94.2,MEDIUM,,\n",
        );
        let s = normalize(&t, &meta()).unwrap();
        let ages: Vec<u32> = s.laps.iter().map(|l| l.tyre_age).collect();
        assert_eq!(ages, vec![1, 2, 3, 1, 2]);
        let stints: Vec<u32> = s.laps.iter().map(|l| l.stint).collect();
        assert_eq!(stints, vec![1, 1, 1, 2, 2]);
    }

    #[test]
    fn tyre_age_resets_on_compound_and_stint_column() {
        let t = table(
            "Driver,LapNumber,LapTimeSeconds,Compound,Stint\n\
             HAM,1,95.0,SOFT,1\n\
             HAM,2,95.5,SOFT,1\n\
             HAM,3,96.0,HARD,2\n\
             HAM,4,96.1,HARD,2\n\
             HAM,5,96.2,HARD,3\n\
             HAM,6,96.3,HARD,3\n",
        );
        let s = normalize(&t, &meta()).unwrap();
        let ages: Vec<u32> = s.laps.iter().map(|l| l.tyre_age).collect();
        assert_eq!(ages, vec![1, 2, 1, 2, 1, 2]);
    }

    #[test]
    fn blank_compound_does_not_hide_tyre_change() {
        let t = table(
            "Driver,LapNumber,LapTimeSeconds,Compound\n\
             VER,1,95.0,SOFT\n\
             VER,2,95.2,SOFT\n\
             VER,3,99.0,\n\
             VER,4,96.0,HARD\n\
             VER,5,96.1,HARD\n",
        );
        let s = normalize(&t, &meta()).unwrap();
        let ages: Vec<u32> = s.laps.iter().map(|l| l.tyre_age).collect();
        assert_eq!(ages, vec![1, 2, 3, 1, 2]);
        assert_eq!(s.laps[2].compound, Compound::Unknown);
    }

    #[test]
    fn undecodable_table_is_format_error() {
        let mut bytes = b"Driver,LapNumber,LapTimeSeconds\nVER,1,".to_vec();
        bytes.extend_from_slice(&[0xFF, 0xFE]);
        bytes.push(b'\n');
        let err = RawLapTable::from_reader(bytes.as_slice()).unwrap_err();
        assert!(matches!(err, Error::DataFormat(_)));
        assert!(err.is_session_local());
    }

    #[test]
    fn tyre_age_resets_for_each_driver_and_sorts_laps() {
        let t = table(
            "Driver,LapNumber,LapTimeSeconds,Compound\n\
             LEC,2,95.0,SOFT\n\
             SAI,1,95.0,SOFT\n\
             LEC,1,95.0,SOFT\n\
             SAI,2,95.0,SOFT\n",
        );
        let s = normalize(&t, &meta()).unwrap();
        let got: Vec<(&str, u32, u32)> = s
            .laps
            .iter()
            .map(|l| (l.driver_id.as_str(), l.lap_number, l.tyre_age))
            .collect();
        assert_eq!(got, vec![("LEC", 1, 1), ("LEC", 2, 2), ("SAI", 1, 1), ("SAI", 2, 2)]);
    }

    #[test]
    fn tyre_age_never_decreases_within_a_stint() {
        let mut csv = String::from("Driver,LapNumber,LapTimeSeconds,Compound,PitOutTime\n");
        for lap in 1..=40u32 {
            let compound = if lap <= 15 { "SOFT" } else { "HARD" };
            let pit_out = if lap == 28 { "x" } else { "" };
            csv.push_str(&format!("NOR,{},{},{},{}\n", lap, 90.0 + lap as f64 * 0.05, compound, pit_out));
        }
        let s = normalize(&table(&csv), &meta()).unwrap();
        for pair in s.laps.windows(2) {
            if pair[1].stint == pair[0].stint {
                assert_eq!(pair[1].tyre_age, pair[0].tyre_age + 1);
            } else {
                assert_eq!(pair[1].tyre_age, 1);
            }
        }
        assert_eq!(s.laps.last().unwrap().stint, 3);
    }

    #[test]
    fn missing_time_kept_for_bookkeeping() {
        let t = table(
            "Driver,LapNumber,LapTime,Compound\n\
             ALO,1,0 days 00:01:35.500000,SOFT\n\
             ALO,2,NaT,SOFT\n\
             ALO,3,1:34.250,SOFT\n\
             ALO,4,-3,SOFT\n",
        );
        let s = normalize(&t, &meta()).unwrap();
        assert_eq!(s.laps.len(), 4);
        assert_eq!(s.laps[0].lap_time_seconds, Some(95.5));
        assert_eq!(s.laps[1].lap_time_seconds, None);
        assert_eq!(s.laps[2].lap_time_seconds, Some(94.25));
        assert_eq!(s.laps[3].lap_time_seconds, None);
        assert_eq!(s.laps[2].tyre_age, 3);
        assert_eq!(s.timed_laps().count(), 2);
    }

    #[test]
    fn seconds_column_preferred_then_duration() {
        let t = table(
            "driver,lap_number,lap_time_seconds,lap_time\n\
             PIA,1,90.0,1:40.0\n\
             PIA,2,,1:31.0\n",
        );
        let s = normalize(&t, &meta()).unwrap();
        assert_eq!(s.laps[0].lap_time_seconds, Some(90.0));
        assert_eq!(s.laps[1].lap_time_seconds, Some(91.0));
        assert_eq!(s.laps[0].track_id, "Bahrain Grand Prix");
        assert_eq!(s.laps[0].team_id, "UNKNOWN");
    }

    #[test]
    fn missing_identifying_columns() {
        let err = normalize(&table("LapNumber,LapTime\n1,90.0\n"), &meta()).unwrap_err();
        assert!(matches!(err, Error::MissingColumn { column: "driver" }));
        assert!(err.is_session_local());
        let err = normalize(&table("Driver,LapTime\nVER,90.0\n"), &meta()).unwrap_err();
        assert!(matches!(err, Error::MissingColumn { column: "lap_number" }));
    }

    #[test]
    fn missing_time_columns_is_format_error() {
        let err = normalize(&table("Driver,LapNumber,Sector1\nVER,1,30.0\n"), &meta()).unwrap_err();
        assert!(matches!(err, Error::DataFormat(_)));
    }

    #[test]
    fn unparseable_rows_are_dropped() {
        let t = table(
            "Driver,LapNumber,LapTimeSeconds\n\
             ,1,90.0\n\
             VER,abc,90.0\n\
             VER,1,90.0\n\
             VER,1,91.0\n",
        );
        let s = normalize(&t, &meta()).unwrap();
        assert_eq!(s.laps.len(), 1);
        assert_eq!(s.dropped_rows, 3);
    }

    #[test]
    fn duration_formats() {
        assert_eq!(parse_duration_seconds("91.5"), Some(91.5));
        assert_eq!(parse_duration_seconds("1:31.5"), Some(91.5));
        assert_eq!(parse_duration_seconds("00:01:31.500"), Some(91.5));
        assert_eq!(parse_duration_seconds("0 days 00:01:31.500000"), Some(91.5));
        assert_eq!(parse_duration_seconds("garbage"), None);
        assert_eq!(parse_duration_seconds("0:00.000"), None);
    }

    #[test]
    fn display_name_resolution_order() {
        let mut id = DriverIdentity {
            code: "VER".into(),
            number: Some("1".into()),
            ..Default::default()
        };
        assert_eq!(id.display_name(), "VER");
        id.first_name = Some("Max".into());
        id.last_name = Some("Verstappen".into());
        assert_eq!(id.display_name(), "Max Verstappen");
        id.full_name = Some("M. Verstappen".into());
        assert_eq!(id.display_name(), "M. Verstappen");
        let only_number = DriverIdentity {
            number: Some("33".into()),
            ..Default::default()
        };
        assert_eq!(only_number.display_name(), "33");
    }

    #[test]
    fn compound_parsing() {
        assert_eq!(Compound::parse(" soft "), Compound::Soft);
        assert_eq!(Compound::parse("INTERMEDIATE"), Compound::Intermediate);
        assert_eq!(Compound::parse("TEST_UNKNOWN"), Compound::Unknown);
    }
}
