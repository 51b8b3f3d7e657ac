use std::collections::BTreeSet;

use thiserror::Error;
use tracing::debug;

use crate::dataset::{Dataset, View};
use crate::models::{AssessmentRecord, Facet, Gender};

#[derive(Error, Debug, PartialEq)]
pub enum FilterError {
    #[error("unknown {facet} value(s): {values} (available: {available})")]
    UnknownValues {
        facet: &'static str,
        values: String,
        available: String,
    },
}

/// Selected facet values. An empty set leaves that facet unrestricted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSelection {
    pub courses: BTreeSet<String>,
    pub class_levels: BTreeSet<String>,
    pub genders: BTreeSet<Gender>,
}

impl FilterSelection {
    pub fn new(
        courses: impl IntoIterator<Item = String>,
        class_levels: impl IntoIterator<Item = String>,
        genders: impl IntoIterator<Item = Gender>,
    ) -> Self {
        Self {
            courses: courses.into_iter().collect(),
            class_levels: class_levels.into_iter().collect(),
            genders: genders.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.courses.is_empty() && self.class_levels.is_empty() && self.genders.is_empty()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn matches(&self, record: &AssessmentRecord) -> bool {
        (self.courses.is_empty() || self.courses.contains(Facet::Course.value(record)))
            && (self.class_levels.is_empty()
                || self.class_levels.contains(Facet::ClassLevel.value(record)))
            && (self.genders.is_empty() || self.genders.contains(&record.gender))
    }

    /// Replaces the selection for one facet from a comma-separated list such as
    /// `Biology, Computer`. Values are matched case-insensitively against what the
    /// dataset contains and stored in the dataset's spelling. An empty list lifts
    /// the restriction on that facet. On error the selection is left unchanged.
    pub fn set_facet(
        &mut self,
        dataset: &Dataset,
        facet: Facet,
        input: &str,
    ) -> Result<(), FilterError> {
        let available = dataset.distinct(facet);
        let mut chosen = BTreeSet::new();
        let mut unknown = Vec::new();
        for value in input.split(',').map(str::trim).filter(|v| !v.is_empty()) {
            match available.iter().find(|known| known.eq_ignore_ascii_case(value)) {
                Some(known) => {
                    chosen.insert(known.clone());
                }
                None => unknown.push(value),
            }
        }
        if !unknown.is_empty() {
            return Err(FilterError::UnknownValues {
                facet: facet_name(facet),
                values: unknown.join(", "),
                available: available.join(", "),
            });
        }

        match facet {
            Facet::Course => self.courses = chosen,
            Facet::ClassLevel => self.class_levels = chosen,
            // Dataset gender values are always valid codes.
            Facet::Gender => {
                self.genders = chosen.iter().filter_map(|code| code.parse().ok()).collect()
            }
        }
        debug!(facet = facet_name(facet), selection = %self.describe(), "filter updated");
        Ok(())
    }

    pub fn describe(&self) -> String {
        if self.is_empty() {
            return "none (all records)".to_string();
        }
        let mut parts = Vec::new();
        if !self.courses.is_empty() {
            parts.push(format!("courses: {}", join(self.courses.iter().map(String::as_str))));
        }
        if !self.class_levels.is_empty() {
            parts.push(format!(
                "class levels: {}",
                join(self.class_levels.iter().map(String::as_str))
            ));
        }
        if !self.genders.is_empty() {
            parts.push(format!("gender: {}", join(self.genders.iter().map(|g| g.code()))));
        }
        parts.join("; ")
    }
}

fn facet_name(facet: Facet) -> &'static str {
    match facet {
        Facet::Course => "course",
        Facet::ClassLevel => "class level",
        Facet::Gender => "gender",
    }
}

fn join<'a>(values: impl Iterator<Item = &'a str>) -> String {
    values.collect::<Vec<_>>().join(", ")
}

/// Returns the rows of `dataset` that satisfy `selection`; the dataset itself is untouched.
pub fn apply<'a>(dataset: &'a Dataset, selection: &FilterSelection) -> View<'a> {
    if selection.is_empty() {
        return dataset.view();
    }
    let rows: Vec<&AssessmentRecord> = dataset
        .records()
        .iter()
        .filter(|record| selection.matches(record))
        .collect();
    debug!(before = dataset.len(), after = rows.len(), "filters applied");
    View::new(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, course: &str, level: &str, gender: Gender, score: f64) -> AssessmentRecord {
        AssessmentRecord {
            student_id: id.to_string(),
            course_name: course.to_string(),
            class_level: level.to_string(),
            gender,
            assessment_score: score,
            attendance_rate: 80.0,
            raised_hand_count: 1,
            moodle_views: 5,
            resources_downloads: 1,
        }
    }

    fn sample() -> Dataset {
        Dataset::from_records(vec![
            record("S1", "Biology", "C1", Gender::Male, 60.0),
            record("S2", "Biology", "C2", Gender::Female, 80.0),
            record("S3", "Computer", "C1", Gender::Female, 90.0),
            record("S4", "Chemistry", "C3", Gender::Male, 70.0),
        ])
    }

    #[test]
    fn empty_selection_returns_full_table() {
        let dataset = sample();
        let view = apply(&dataset, &FilterSelection::default());
        assert_eq!(view, dataset.view());
    }

    #[test]
    fn single_facet_neither_over_nor_under_filters() {
        let dataset = sample();
        let selection = FilterSelection::new(
            vec!["Biology".to_string(), "Computer".to_string()],
            Vec::new(),
            Vec::new(),
        );
        let view = apply(&dataset, &selection);
        assert!(view
            .rows()
            .iter()
            .all(|r| selection.courses.contains(&r.course_name)));
        let expected = dataset
            .records()
            .iter()
            .filter(|r| r.course_name == "Biology" || r.course_name == "Computer")
            .count();
        assert_eq!(view.len(), expected);
    }

    #[test]
    fn facets_combine_conjunctively() {
        let dataset = sample();
        let selection = FilterSelection::new(
            vec!["Biology".to_string()],
            vec!["C1".to_string(), "C2".to_string()],
            vec![Gender::Female],
        );
        let view = apply(&dataset, &selection);
        assert_eq!(view.len(), 1);
        assert_eq!(view.rows()[0].student_id, "S2");
    }

    #[test]
    fn applying_twice_is_idempotent() {
        let dataset = sample();
        let selection = FilterSelection::new(Vec::new(), vec!["C1".to_string()], Vec::new());
        let once = apply(&dataset, &selection);
        let again = Dataset::from_records(once.rows().iter().map(|r| (*r).clone()).collect());
        let twice = apply(&again, &selection);
        assert_eq!(once.len(), twice.len());
        assert_eq!(dataset.len(), 4);
    }

    #[test]
    fn describe_lists_active_facets() {
        let selection = FilterSelection::new(Vec::new(), Vec::new(), vec![Gender::Male]);
        assert_eq!(selection.describe(), "gender: M");
        assert_eq!(FilterSelection::default().describe(), "none (all records)");
    }

    #[test]
    fn set_facet_narrows_using_dataset_spelling() {
        let dataset = sample();
        let mut selection = FilterSelection::default();
        selection
            .set_facet(&dataset, Facet::Course, "biology, Computer")
            .unwrap();
        selection.set_facet(&dataset, Facet::Gender, "f").unwrap();
        assert_eq!(
            selection.courses.iter().collect::<Vec<_>>(),
            vec!["Biology", "Computer"]
        );
        assert_eq!(selection.genders.iter().collect::<Vec<_>>(), vec![&Gender::Female]);

        let view = apply(&dataset, &selection);
        let ids: Vec<&str> = view.rows().iter().map(|r| r.student_id.as_str()).collect();
        assert_eq!(ids, vec!["S2", "S3"]);
    }

    #[test]
    fn set_facet_with_empty_list_clears_that_facet() {
        let dataset = sample();
        let mut selection = FilterSelection::new(
            vec!["Biology".to_string()],
            vec!["C1".to_string()],
            Vec::new(),
        );
        selection.set_facet(&dataset, Facet::ClassLevel, " ").unwrap();
        assert!(selection.class_levels.is_empty());
        assert_eq!(selection.courses.len(), 1);
    }

    #[test]
    fn set_facet_rejects_values_missing_from_dataset() {
        let dataset = sample();
        let mut selection = FilterSelection::new(vec!["Biology".to_string()], Vec::new(), Vec::new());
        let err = selection
            .set_facet(&dataset, Facet::Course, "Biology,Physics")
            .unwrap_err();
        assert_eq!(
            err,
            FilterError::UnknownValues {
                facet: "course",
                values: "Physics".to_string(),
                available: "Biology, Computer, Chemistry".to_string(),
            }
        );
        // Unchanged on error.
        assert_eq!(selection.courses.len(), 1);

        assert!(selection.set_facet(&dataset, Facet::Gender, "X").is_err());
        assert!(selection.set_facet(&dataset, Facet::ClassLevel, "C9").is_err());
    }
}
