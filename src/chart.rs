use serde::Serialize;

use crate::dataset::View;
use crate::intent::{Classification, Route};
use crate::models::{Facet, Gender, Metric};
use crate::stats;

pub const PRIMARY_RED: &str = "#DC2626";
pub const DEEP_RED: &str = "#991B1B";
pub const DONUT_HOLE: f64 = 0.4;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum BarColors {
    /// Colour scale keyed on each bar's value.
    Gradient { scale: &'static str },
    Fixed { colors: Vec<&'static str> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bar {
    pub label: String,
    pub value: f64,
    /// Data label drawn above the bar.
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Slice {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendLine {
    pub slope: f64,
    pub intercept: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ChartSpec {
    Bar {
        title: String,
        y_axis_title: String,
        bars: Vec<Bar>,
        colors: BarColors,
    },
    Pie {
        title: String,
        hole: f64,
        slices: Vec<Slice>,
    },
    Scatter {
        title: String,
        x_label: String,
        y_label: String,
        color: &'static str,
        points: Vec<(f64, f64)>,
        trend: Option<TrendLine>,
    },
}

impl ChartSpec {
    pub fn title(&self) -> &str {
        match self {
            ChartSpec::Bar { title, .. }
            | ChartSpec::Pie { title, .. }
            | ChartSpec::Scatter { title, .. } => title,
        }
    }

    /// Category labels for bar and pie charts, empty for scatter plots.
    pub fn categories(&self) -> Vec<&str> {
        match self {
            ChartSpec::Bar { bars, .. } => bars.iter().map(|bar| bar.label.as_str()).collect(),
            ChartSpec::Pie { slices, .. } => {
                slices.iter().map(|slice| slice.label.as_str()).collect()
            }
            ChartSpec::Scatter { .. } => Vec::new(),
        }
    }
}

/// Picks the chart for a classified question. `None` whenever no branch applies
/// or the filtered view cannot support the statistic.
pub fn select(classification: &Classification, view: &View<'_>) -> Option<ChartSpec> {
    match classification.route()? {
        Route::CompareCourses => mean_bars(view, Facet::Course, "Course Performance"),
        Route::CompareClassLevels => mean_bars(view, Facet::ClassLevel, "Class Performance"),
        Route::AverageByCourse => mean_bars(view, Facet::Course, "Average Scores"),
        Route::CompareGenders => gender_bars(view),
        Route::GenderDistribution => {
            // Pie labels spell out the gender codes.
            let mut chart = count_pie(view, Facet::Gender, "Gender Distribution")?;
            if let ChartSpec::Pie { slices, .. } = &mut chart {
                for slice in slices.iter_mut() {
                    if let Ok(gender) = slice.label.parse::<Gender>() {
                        slice.label = gender.label().to_string();
                    }
                }
            }
            Some(chart)
        }
        Route::CourseDistribution => count_pie(view, Facet::Course, "Course Distribution"),
        Route::ClassLevelDistribution => count_pie(view, Facet::ClassLevel, "Class Distribution"),
        Route::AttendanceCorrelation => scatter(
            view,
            Metric::Attendance,
            "Attendance vs Performance",
            PRIMARY_RED,
        ),
        Route::ParticipationCorrelation => scatter(
            view,
            Metric::RaisedHands,
            "Participation vs Performance",
            DEEP_RED,
        ),
        Route::EngagementCorrelation => scatter(
            view,
            Metric::MoodleViews,
            "Moodle Usage vs Performance",
            PRIMARY_RED,
        ),
    }
}

fn mean_bars(view: &View<'_>, facet: Facet, title: &str) -> Option<ChartSpec> {
    let means = stats::grouped_means(view, facet)?;
    Some(ChartSpec::Bar {
        title: title.to_string(),
        y_axis_title: "Average Score".to_string(),
        bars: means
            .into_iter()
            .map(|group| Bar {
                text: format!("{:.1}", group.mean),
                label: group.label,
                value: group.mean,
            })
            .collect(),
        colors: BarColors::Gradient { scale: "Reds" },
    })
}

fn gender_bars(view: &View<'_>) -> Option<ChartSpec> {
    let means = stats::gender_means(view)?;
    let palette = [PRIMARY_RED, DEEP_RED];
    Some(ChartSpec::Bar {
        title: "Gender Performance".to_string(),
        y_axis_title: "Average Score".to_string(),
        colors: BarColors::Fixed {
            colors: palette.iter().take(means.len()).copied().collect(),
        },
        bars: means
            .into_iter()
            .map(|(gender, value)| Bar {
                label: gender.label().to_string(),
                value,
                text: format!("{value:.1}"),
            })
            .collect(),
    })
}

fn count_pie(view: &View<'_>, facet: Facet, title: &str) -> Option<ChartSpec> {
    let counts = stats::value_counts(view, facet)?;
    Some(ChartSpec::Pie {
        title: title.to_string(),
        hole: DONUT_HOLE,
        slices: counts
            .into_iter()
            .map(|value| Slice {
                label: value.label,
                count: value.count,
            })
            .collect(),
    })
}

fn scatter(view: &View<'_>, metric: Metric, title: &str, color: &'static str) -> Option<ChartSpec> {
    if view.is_empty() {
        return None;
    }
    let xs = view.column(metric);
    let ys = view.column(Metric::Score);
    let trend = stats::linear_fit(&xs, &ys).map(|(slope, intercept)| TrendLine { slope, intercept });
    Some(ChartSpec::Scatter {
        title: title.to_string(),
        x_label: metric.column().to_string(),
        y_label: Metric::Score.column().to_string(),
        color,
        points: xs.into_iter().zip(ys).collect(),
        trend,
    })
}
