use std::collections::HashSet;
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, DataType, Reader};
use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{AssessmentRecord, Facet, Gender, Metric};

pub const REQUIRED_COLUMNS: [&str; 9] = [
    "student_id",
    "course_name",
    "class_level",
    "student_gender",
    "assessment_score",
    "attendance_rate",
    "raised_hand_count",
    "moodle_views",
    "resources_downloads",
];

static DATASET: OnceCell<Dataset> = OnceCell::new();

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read dataset '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to open workbook: {0}")]
    Workbook(#[from] calamine::Error),
    #[error("workbook has no worksheet with a header row")]
    EmptySheet,
    #[error("unsupported dataset format '{0}' (expected csv, xlsx, xls or ods)")]
    UnsupportedFormat(String),
    #[error("required column '{0}' is missing")]
    MissingColumn(&'static str),
    #[error("row {row}: missing student_id")]
    MissingStudentId { row: usize },
    #[error("row {row}: invalid value '{value}' in column '{column}'")]
    InvalidValue {
        row: usize,
        column: &'static str,
        value: String,
    },
}

/// Raw text of the required columns, before validation.
#[derive(Debug, Default, serde::Deserialize)]
struct RawRow {
    student_id: Option<String>,
    course_name: String,
    class_level: String,
    student_gender: String,
    assessment_score: String,
    attendance_rate: String,
    raised_hand_count: String,
    moodle_views: String,
    resources_downloads: String,
}

impl RawRow {
    fn into_record(self, row: usize) -> Result<AssessmentRecord, LoadError> {
        let student_id = self
            .student_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or(LoadError::MissingStudentId { row })?;

        let gender = self
            .student_gender
            .parse::<Gender>()
            .map_err(|_| invalid(row, "student_gender", &self.student_gender))?;

        Ok(AssessmentRecord {
            student_id,
            course_name: required_text(row, "course_name", self.course_name)?,
            class_level: required_text(row, "class_level", self.class_level)?,
            gender,
            assessment_score: parse_number(row, "assessment_score", &self.assessment_score)?,
            attendance_rate: parse_number(row, "attendance_rate", &self.attendance_rate)?,
            raised_hand_count: parse_count(row, "raised_hand_count", &self.raised_hand_count)?,
            moodle_views: parse_count(row, "moodle_views", &self.moodle_views)?,
            resources_downloads: parse_count(
                row,
                "resources_downloads",
                &self.resources_downloads,
            )?,
        })
    }
}

fn invalid(row: usize, column: &'static str, value: &str) -> LoadError {
    LoadError::InvalidValue {
        row,
        column,
        value: value.to_string(),
    }
}

fn required_text(row: usize, column: &'static str, value: String) -> Result<String, LoadError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(invalid(row, column, &value));
    }
    Ok(trimmed.to_string())
}

fn parse_number(row: usize, column: &'static str, value: &str) -> Result<f64, LoadError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|number| number.is_finite())
        .ok_or_else(|| invalid(row, column, value))
}

fn parse_count(row: usize, column: &'static str, value: &str) -> Result<u32, LoadError> {
    let number = parse_number(row, column, value)?;
    if number < 0.0 || number.fract() != 0.0 || number > f64::from(u32::MAX) {
        return Err(invalid(row, column, value));
    }
    Ok(number as u32)
}

fn cell_text(cell: &DataType) -> String {
    match cell {
        DataType::Empty => String::new(),
        DataType::String(text) => text.clone(),
        DataType::Int(value) => value.to_string(),
        // Whole floats come back from Excel for integer-looking IDs and counts.
        DataType::Float(value) if value.fract() == 0.0 => format!("{}", *value as i64),
        other => other.to_string(),
    }
}

/// The immutable, loaded assessment table.
#[derive(Debug, Clone)]
pub struct Dataset {
    source: PathBuf,
    records: Vec<AssessmentRecord>,
}

impl Dataset {
    pub fn from_records(records: Vec<AssessmentRecord>) -> Self {
        Self {
            source: PathBuf::new(),
            records,
        }
    }

    /// Loads the dataset once per process and hands out the shared copy afterwards.
    pub fn load_cached(path: &Path) -> Result<&'static Dataset, LoadError> {
        DATASET.get_or_try_init(|| Dataset::load(path))
    }

    pub fn load(path: &Path) -> Result<Dataset, LoadError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();

        if !path.exists() {
            return Err(LoadError::Io {
                path: path.display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
            });
        }

        let records = match extension.as_str() {
            "csv" => read_csv(path)?,
            "xlsx" | "xlsm" | "xls" | "ods" => read_workbook(path)?,
            other => return Err(LoadError::UnsupportedFormat(other.to_string())),
        };

        info!(path = %path.display(), rows = records.len(), "dataset loaded");
        Ok(Self {
            source: path.to_path_buf(),
            records,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[AssessmentRecord] {
        &self.records
    }

    pub fn view(&self) -> View<'_> {
        View::new(self.records.iter().collect())
    }

    /// Distinct values of a categorical column in first-seen order.
    pub fn distinct(&self, facet: Facet) -> Vec<String> {
        self.view().distinct(facet)
    }
}

fn read_csv(path: &Path) -> Result<Vec<AssessmentRecord>, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_path(path)?;
    let headers = reader.headers()?.clone();
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|header| header == column) {
            return Err(LoadError::MissingColumn(column));
        }
    }

    let mut records = Vec::new();
    for (index, result) in reader.deserialize::<RawRow>().enumerate() {
        let raw = result?;
        // Header is row 1.
        records.push(raw.into_record(index + 2)?);
    }
    Ok(records)
}

fn read_workbook(path: &Path) -> Result<Vec<AssessmentRecord>, LoadError> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(LoadError::EmptySheet)??;

    let mut rows = range.rows();
    let header: Vec<String> = rows
        .next()
        .ok_or(LoadError::EmptySheet)?
        .iter()
        .map(|cell| cell_text(cell).trim().to_string())
        .collect();

    let mut positions = [0usize; 9];
    for (slot, column) in positions.iter_mut().zip(REQUIRED_COLUMNS) {
        *slot = header
            .iter()
            .position(|name| name == column)
            .ok_or(LoadError::MissingColumn(column))?;
    }
    debug!(?positions, "workbook header resolved");

    let mut records = Vec::new();
    for (index, cells) in rows.enumerate() {
        if cells.iter().all(|cell| matches!(cell, DataType::Empty)) {
            continue;
        }
        let text = |position: usize| cells.get(position).map(cell_text).unwrap_or_default();
        let raw = RawRow {
            student_id: Some(text(positions[0])),
            course_name: text(positions[1]),
            class_level: text(positions[2]),
            student_gender: text(positions[3]),
            assessment_score: text(positions[4]),
            attendance_rate: text(positions[5]),
            raised_hand_count: text(positions[6]),
            moodle_views: text(positions[7]),
            resources_downloads: text(positions[8]),
        };
        records.push(raw.into_record(index + 2)?);
    }
    Ok(records)
}

/// A read-only selection of rows borrowed from a [`Dataset`].
#[derive(Debug, Clone, PartialEq)]
pub struct View<'a> {
    rows: Vec<&'a AssessmentRecord>,
}

impl<'a> View<'a> {
    pub fn new(rows: Vec<&'a AssessmentRecord>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[&'a AssessmentRecord] {
        &self.rows
    }

    pub fn student_count(&self) -> usize {
        self.rows
            .iter()
            .map(|record| record.student_id.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn distinct(&self, facet: Facet) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut values = Vec::new();
        for record in &self.rows {
            let value = facet.value(record);
            if seen.insert(value) {
                values.push(value.to_string());
            }
        }
        values
    }

    pub fn column(&self, metric: Metric) -> Vec<f64> {
        self.rows.iter().map(|record| metric.value(record)).collect()
    }
}
