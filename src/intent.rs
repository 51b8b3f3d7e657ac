//! Keyword-based question classification.
//!
//! A question is lower-cased and checked against a fixed table of keyword
//! sets. Tags are independent: every tag whose keywords appear is kept.
//! Routing to a single statistic happens afterwards in [`Classification::route`],
//! which applies the precedence order per intent.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tag {
    Comparison,
    Distribution,
    Correlation,
    Average,
    Overview,
    Course,
    Gender,
    ClassLevel,
    Attendance,
    Participation,
    Engagement,
}

impl Tag {
    pub fn as_str(self) -> &'static str {
        match self {
            Tag::Comparison => "comparison",
            Tag::Distribution => "distribution",
            Tag::Correlation => "correlation",
            Tag::Average => "average",
            Tag::Overview => "overview",
            Tag::Course => "course",
            Tag::Gender => "gender",
            Tag::ClassLevel => "class_level",
            Tag::Attendance => "attendance",
            Tag::Participation => "participation",
            Tag::Engagement => "engagement",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
enum Keyword {
    /// Matches anywhere in the question.
    Substring(&'static str),
    /// Matches only a whole alphanumeric token.
    Word(&'static str),
}

impl Keyword {
    fn found_in(self, question: &str) -> bool {
        match self {
            Keyword::Substring(needle) => question.contains(needle),
            Keyword::Word(word) => question
                .split(|c: char| !c.is_alphanumeric())
                .any(|token| token == word),
        }
    }
}

use Keyword::{Substring as S, Word as W};

const KEYWORDS: &[(Tag, &[Keyword])] = &[
    (
        Tag::Comparison,
        &[
            S("compare"),
            S("vs"),
            S("versus"),
            S("between"),
            S("difference"),
            S("better"),
            S("best"),
            S("worst"),
            S("top"),
            S("highest"),
            S("lowest"),
        ],
    ),
    (
        Tag::Distribution,
        &[
            S("distribution"),
            S("breakdown"),
            S("percentage"),
            S("how many"),
            S("split"),
            S("divide"),
        ],
    ),
    (
        Tag::Correlation,
        &[
            S("correlation"),
            S("relationship"),
            S("affect"),
            S("impact"),
            S("influence"),
            S("relate"),
            S("connection"),
            S("correlate"),
        ],
    ),
    (Tag::Average, &[S("average"), S("mean")]),
    (
        Tag::Overview,
        &[
            S("everything"),
            S("all"),
            S("overview"),
            S("summary"),
            S("interesting"),
            S("insights"),
            S("tell me about"),
            S("what should"),
            S("recommendations"),
        ],
    ),
    (
        Tag::Course,
        &[
            S("course"),
            S("subject"),
            S("biology"),
            S("computer"),
            S("math"),
            S("science"),
            S("chemistry"),
        ],
    ),
    (
        Tag::Gender,
        &[
            S("gender"),
            S("male"),
            S("female"),
            S("boy"),
            S("girl"),
            W("m"),
            W("f"),
        ],
    ),
    (
        Tag::ClassLevel,
        &[
            S("class"),
            S("level"),
            S("c1"),
            S("c2"),
            S("c3"),
            S("c4"),
            S("c5"),
        ],
    ),
    (Tag::Attendance, &[S("attendance"), S("attend")]),
    (
        Tag::Participation,
        &[S("hand"), S("participation"), S("participate"), S("raise")],
    ),
    (
        Tag::Engagement,
        &[S("moodle"), S("engagement"), S("portal"), S("views")],
    ),
];

/// Which statistic and chart family a question routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    CompareCourses,
    CompareGenders,
    CompareClassLevels,
    CourseDistribution,
    GenderDistribution,
    ClassLevelDistribution,
    AttendanceCorrelation,
    ParticipationCorrelation,
    EngagementCorrelation,
    AverageByCourse,
}

impl Route {
    pub fn describe(self) -> &'static str {
        match self {
            Route::CompareCourses => "mean score by course (bar)",
            Route::CompareGenders => "mean score by gender (bar)",
            Route::CompareClassLevels => "mean score by class level (bar)",
            Route::CourseDistribution => "record count by course (pie)",
            Route::GenderDistribution => "record count by gender (pie)",
            Route::ClassLevelDistribution => "record count by class level (pie)",
            Route::AttendanceCorrelation => "attendance vs score (scatter)",
            Route::ParticipationCorrelation => "raised hands vs score (scatter)",
            Route::EngagementCorrelation => "moodle views vs score (scatter)",
            Route::AverageByCourse => "average score by course (bar)",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub question: String,
    pub tags: BTreeSet<Tag>,
}

impl Classification {
    pub fn has(&self, tag: Tag) -> bool {
        self.tags.contains(&tag)
    }

    /// Selects the long-form response template.
    pub fn is_big_question(&self) -> bool {
        self.has(Tag::Overview)
    }

    /// First matching branch wins; later branches of the same intent are not considered.
    pub fn route(&self) -> Option<Route> {
        const ORDER: &[(Tag, &[(Tag, Route)])] = &[
            (
                Tag::Comparison,
                &[
                    (Tag::Course, Route::CompareCourses),
                    (Tag::Gender, Route::CompareGenders),
                    (Tag::ClassLevel, Route::CompareClassLevels),
                ],
            ),
            (
                Tag::Distribution,
                &[
                    (Tag::Gender, Route::GenderDistribution),
                    (Tag::Course, Route::CourseDistribution),
                    (Tag::ClassLevel, Route::ClassLevelDistribution),
                ],
            ),
            (
                Tag::Correlation,
                &[
                    (Tag::Attendance, Route::AttendanceCorrelation),
                    (Tag::Participation, Route::ParticipationCorrelation),
                    (Tag::Engagement, Route::EngagementCorrelation),
                ],
            ),
        ];

        for (intent, branches) in ORDER {
            if !self.has(*intent) {
                continue;
            }
            if let Some((_, route)) = branches.iter().find(|(dimension, _)| self.has(*dimension)) {
                return Some(*route);
            }
        }

        self.has(Tag::Average).then_some(Route::AverageByCourse)
    }

    pub fn tag_list(&self) -> String {
        if self.tags.is_empty() {
            return "(none)".to_string();
        }
        self.tags
            .iter()
            .map(|tag| tag.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

pub fn classify(question: &str) -> Classification {
    let lowered = question.to_lowercase();
    let tags = KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|keyword| keyword.found_in(&lowered)))
        .map(|(tag, _)| *tag)
        .collect();
    Classification {
        question: question.to_string(),
        tags,
    }
}
