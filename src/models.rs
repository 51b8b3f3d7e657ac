use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::chart::ChartSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
}

impl Gender {
    pub fn code(self) -> &'static str {
        match self {
            Gender::Male => "M",
            Gender::Female => "F",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
        }
    }
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "M" => Ok(Gender::Male),
            "F" => Ok(Gender::Female),
            other => Err(format!("expected M or F, got '{other}'")),
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One row of the assessment dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentRecord {
    pub student_id: String,
    pub course_name: String,
    pub class_level: String,
    pub gender: Gender,
    pub assessment_score: f64,
    pub attendance_rate: f64,
    pub raised_hand_count: u32,
    pub moodle_views: u32,
    pub resources_downloads: u32,
}

/// Categorical columns usable as filters and group-by keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Facet {
    Course,
    ClassLevel,
    Gender,
}

impl Facet {
    pub fn value(self, record: &AssessmentRecord) -> &str {
        match self {
            Facet::Course => &record.course_name,
            Facet::ClassLevel => &record.class_level,
            Facet::Gender => record.gender.code(),
        }
    }
}

/// Numeric columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Score,
    Attendance,
    RaisedHands,
    MoodleViews,
    Downloads,
}

impl Metric {
    pub fn value(self, record: &AssessmentRecord) -> f64 {
        match self {
            Metric::Score => record.assessment_score,
            Metric::Attendance => record.attendance_rate,
            Metric::RaisedHands => f64::from(record.raised_hand_count),
            Metric::MoodleViews => f64::from(record.moodle_views),
            Metric::Downloads => f64::from(record.resources_downloads),
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            Metric::Score => "assessment_score",
            Metric::Attendance => "attendance_rate",
            Metric::RaisedHands => "raised_hand_count",
            Metric::MoodleViews => "moodle_views",
            Metric::Downloads => "resources_downloads",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub chart: Option<ChartSpec>,
    pub elapsed_secs: Option<f64>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            chart: None,
            elapsed_secs: None,
        }
    }

    pub fn assistant(content: impl Into<String>, chart: Option<ChartSpec>, elapsed_secs: f64) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            chart,
            elapsed_secs: Some(elapsed_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupMean {
    pub label: String,
    pub mean: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValueCount {
    pub label: String,
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gender_parses_case_insensitively() {
        assert_eq!(" m ".parse::<Gender>(), Ok(Gender::Male));
        assert_eq!("F".parse::<Gender>(), Ok(Gender::Female));
        assert!("X".parse::<Gender>().is_err());
    }

    #[test]
    fn facet_reads_gender_code() {
        let record = AssessmentRecord {
            student_id: "S1".to_string(),
            course_name: "Biology".to_string(),
            class_level: "C1".to_string(),
            gender: Gender::Female,
            assessment_score: 80.0,
            attendance_rate: 90.0,
            raised_hand_count: 3,
            moodle_views: 10,
            resources_downloads: 2,
        };
        assert_eq!(Facet::Gender.value(&record), "F");
        assert_eq!(Metric::RaisedHands.value(&record), 3.0);
    }
}
