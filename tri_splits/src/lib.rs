//! Core computation library for triathlon split-time charts.
//!
//! Holds everything the renderers share: the results dataset model, the
//! H:MM:SS time codec, division/gender aggregation, trend-line regression,
//! and the per-chart interaction state with its pure view computation.

mod divisions;
mod state;
mod stats;

pub use divisions::{division_averages, division_sort_key, DivisionAverage, DivisionKey};
pub use state::{
    brush_zoom, divisions_view, scatter_points, scatter_view, splits_view, zoom_to, AthleteSplits,
    Axis, DivisionsView, ScatterPoint, ScatterState, ScatterView, SplitsState, SplitsView,
    ZoomWindow, DEFAULT_ATHLETE,
};
pub use stats::{
    extent, nice_extent, ols, padded_domain, TrendFit, MIN_BRUSH_PX, MIN_FRACTION, PAD_FRAC,
};

use std::fmt;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TriError {
    #[error("failed to parse results CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("results CSV is missing column '{0}'")]
    MissingColumn(&'static str),
    #[error("results CSV contained no rows")]
    EmptyDataset,
    #[error("unknown athlete: {0}")]
    UnknownAthlete(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Normalized gender tag derived from the free-form `Gender` column.
///
/// Ordering puts `F` first so division ties sort by gender letter.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Gender {
    F,
    M,
}

impl Gender {
    /// Case-insensitive prefix match; anything not starting with F/M is unrecognized.
    pub fn from_text(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        let first = trimmed.chars().next()?;
        match first.to_ascii_uppercase() {
            'F' => Some(Gender::F),
            'M' => Some(Gender::M),
            _ => None,
        }
    }

    pub fn letter(&self) -> char {
        match self {
            Gender::F => 'F',
            Gender::M => 'M',
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Gender::F => "Female",
            Gender::M => "Male",
        }
    }
}

/// One race segment plus the Overall aggregate.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Metric {
    Swim,
    Bike,
    Run,
    Overall,
}

impl Metric {
    pub const ALL: [Metric; 4] = [Metric::Swim, Metric::Bike, Metric::Run, Metric::Overall];

    /// Candidates for the scatter chart axes. Overall is excluded on purpose.
    pub const SCATTER: [Metric; 3] = [Metric::Swim, Metric::Bike, Metric::Run];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Swim => "Swim",
            Metric::Bike => "Bike",
            Metric::Run => "Run",
            Metric::Overall => "Overall",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One athlete's race record. Duration columns stay in their original
/// "H:MM:SS" text form; the two derived fields are filled once at load.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResultRow {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Gender")]
    pub gender: String,
    #[serde(rename = "Division")]
    pub division: String,
    #[serde(rename = "Swim")]
    pub swim: String,
    #[serde(rename = "Bike")]
    pub bike: String,
    #[serde(rename = "Run")]
    pub run: String,
    #[serde(rename = "Overall")]
    pub overall: String,
    #[serde(skip)]
    pub overall_secs: Option<f64>,
    #[serde(skip)]
    pub gender_code: Option<Gender>,
}

impl ResultRow {
    pub fn metric_text(&self, metric: Metric) -> &str {
        match metric {
            Metric::Swim => &self.swim,
            Metric::Bike => &self.bike,
            Metric::Run => &self.run,
            Metric::Overall => &self.overall,
        }
    }

    pub fn metric_secs(&self, metric: Metric) -> Option<f64> {
        parse_hms(self.metric_text(metric))
    }
}

/// Transient view of one row's one segment, rebuilt on every render.
#[derive(Clone, Debug, PartialEq)]
pub struct Split {
    pub metric: Metric,
    pub secs: f64,
    pub label: String,
}

/// Splits for one row, skipping any segment whose time field does not parse.
pub fn row_splits(row: &ResultRow) -> Vec<Split> {
    Metric::ALL
        .iter()
        .filter_map(|&metric| {
            let text = row.metric_text(metric);
            parse_hms(text).map(|secs| Split {
                metric,
                secs,
                label: text.trim().to_string(),
            })
        })
        .collect()
}

const REQUIRED_COLUMNS: [&str; 7] =
    ["Name", "Gender", "Division", "Swim", "Bike", "Run", "Overall"];

/// The loaded results dataset. Immutable after construction.
#[derive(Clone, Debug, Default)]
pub struct Dataset {
    rows: Vec<ResultRow>,
}

impl Dataset {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, TriError> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let headers = csv_reader.headers()?.clone();
        for column in REQUIRED_COLUMNS {
            if !headers.iter().any(|h| h == column) {
                return Err(TriError::MissingColumn(column));
            }
        }

        let mut rows = Vec::new();
        for record in csv_reader.deserialize::<ResultRow>() {
            let mut row: ResultRow = record?;
            row.overall_secs = parse_hms(&row.overall);
            row.gender_code = Gender::from_text(&row.gender);
            rows.push(row);
        }
        if rows.is_empty() {
            return Err(TriError::EmptyDataset);
        }
        Ok(Self { rows })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TriError> {
        Self::from_reader(bytes)
    }

    pub fn from_path(path: &Path) -> Result<Self, TriError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    /// Unique athlete names, sorted ascending.
    pub fn athlete_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.rows.iter().map(|r| r.name.clone()).collect();
        names.sort();
        names.dedup();
        names
    }

    /// First row matching the given name, if any.
    pub fn athlete(&self, name: &str) -> Option<&ResultRow> {
        self.rows.iter().find(|r| r.name == name)
    }
}

/// Parse a colon-delimited duration ("H:MM:SS", components optional) into
/// seconds. Empty input is None. A non-numeric component contributes zero
/// rather than failing; the original data pipeline behaves the same way.
pub fn parse_hms(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let part = |value: Option<&str>| -> f64 {
        value
            .and_then(|v| v.trim().parse::<f64>().ok())
            .unwrap_or(0.0)
    };
    let mut fields = trimmed.split(':');
    let hours = part(fields.next());
    let minutes = part(fields.next());
    let seconds = part(fields.next());
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Format seconds as "H:MM:SS". Hours are never zero-padded.
pub fn format_hms(secs: f64) -> String {
    let total = clamp_round(secs);
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;
    format!("{}:{:02}:{:02}", h, m, s)
}

/// Like [`format_hms`] but drops the hour field entirely when it is zero.
pub fn format_hms_short(secs: f64) -> String {
    let total = clamp_round(secs);
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

fn clamp_round(secs: f64) -> i64 {
    if secs.is_finite() && secs >= 0.0 {
        secs.round() as i64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_csv() -> &'static str {
        "Name,Gender,Division,Swim,Bike,Run,Overall\n\
         \"Reed, Tim\",Male,MPRO,0:44:02,4:31:27,2:47:57,8:07:59\n\
         \"Doe, Jane\",Female,F35-39,1:02:10,5:40:00,3:30:00,10:20:45\n\
         \"Null, Norm\",Male,M40-44,,5:00:00,3:00:00,\n"
    }

    #[test]
    fn parse_hms_round_trips_canonical_form() {
        assert_eq!(parse_hms("1:02:03"), Some(3723.0));
        assert_eq!(format_hms(3723.0), "1:02:03");
        assert_eq!(format_hms(parse_hms("8:07:59").unwrap()), "8:07:59");
    }

    #[test]
    fn parse_hms_rejects_empty() {
        assert_eq!(parse_hms(""), None);
        assert_eq!(parse_hms("   "), None);
    }

    #[test]
    fn parse_hms_substitutes_zero_for_garbage_components() {
        // "1:xx:03" -> 1 h + 0 m + 3 s, matching the original pipeline.
        assert_eq!(parse_hms("1:xx:03"), Some(3603.0));
        assert_eq!(parse_hms("abc"), Some(0.0));
    }

    #[test]
    fn parse_hms_treats_missing_components_as_zero() {
        // A lone number lands in the hours slot.
        assert_eq!(parse_hms("2"), Some(7200.0));
        assert_eq!(parse_hms("0:45"), Some(2700.0));
    }

    #[test]
    fn format_hms_short_drops_zero_hours() {
        assert_eq!(format_hms_short(2700.0), "45:00");
        assert_eq!(format_hms_short(3723.0), "1:02:03");
        assert_eq!(format_hms(125.0), "0:02:05");
    }

    #[test]
    fn format_hms_rounds_to_nearest_second() {
        assert_eq!(format_hms(59.6), "0:01:00");
        assert_eq!(format_hms(-5.0), "0:00:00");
    }

    #[test]
    fn dataset_loads_and_derives_fields() {
        let dataset = Dataset::from_bytes(sample_csv().as_bytes()).unwrap();
        assert_eq!(dataset.rows().len(), 3);

        let reed = dataset.athlete("Reed, Tim").unwrap();
        assert_eq!(reed.overall_secs, Some(8.0 * 3600.0 + 7.0 * 60.0 + 59.0));
        assert_eq!(reed.gender_code, Some(Gender::M));

        let norm = dataset.athlete("Null, Norm").unwrap();
        assert_eq!(norm.overall_secs, None);
    }

    #[test]
    fn dataset_rejects_missing_columns() {
        let err = Dataset::from_bytes(b"Name,Gender,Division\nA,M,MPRO\n").unwrap_err();
        assert!(matches!(err, TriError::MissingColumn(_)));
    }

    #[test]
    fn dataset_rejects_empty() {
        let err =
            Dataset::from_bytes(b"Name,Gender,Division,Swim,Bike,Run,Overall\n").unwrap_err();
        assert!(matches!(err, TriError::EmptyDataset));
    }

    #[test]
    fn athlete_names_are_unique_and_sorted() {
        let dataset = Dataset::from_bytes(sample_csv().as_bytes()).unwrap();
        let names = dataset.athlete_names();
        assert_eq!(names, vec!["Doe, Jane", "Null, Norm", "Reed, Tim"]);
    }

    #[test]
    fn row_splits_skips_unparseable_segments() {
        let dataset = Dataset::from_bytes(sample_csv().as_bytes()).unwrap();
        let norm = dataset.athlete("Null, Norm").unwrap();
        let splits = row_splits(norm);
        let metrics: Vec<Metric> = splits.iter().map(|s| s.metric).collect();
        assert_eq!(metrics, vec![Metric::Bike, Metric::Run]);
        assert_eq!(splits[0].label, "5:00:00");
    }

    #[test]
    fn gender_prefix_matching_is_case_insensitive() {
        assert_eq!(Gender::from_text("female"), Some(Gender::F));
        assert_eq!(Gender::from_text(" M "), Some(Gender::M));
        assert_eq!(Gender::from_text("x"), None);
        assert_eq!(Gender::from_text(""), None);
    }
}
