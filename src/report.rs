use std::fmt::Write;

use crate::chart::ChartSpec;
use crate::composer::with_thousands;
use crate::dataset::{Dataset, View};
use crate::filter::FilterSelection;
use crate::models::{Facet, Metric};
use crate::stats;

const BAR_WIDTH: usize = 40;

/// Dataset headline figures followed by the filtered view's metrics.
pub fn build_overview(dataset: &Dataset, view: &View<'_>, filters: &FilterSelection) -> String {
    let full = dataset.view();
    let mut output = String::new();

    let _ = writeln!(output, "# Educational Data Overview");
    let _ = writeln!(output, "Source: {}", dataset.source().display());
    let _ = writeln!(output);
    let _ = writeln!(output, "- Class Levels: {}", dataset.distinct(Facet::ClassLevel).len());
    let _ = writeln!(output, "- Students: {}", full.student_count());
    let _ = writeln!(output, "- Courses: {}", dataset.distinct(Facet::Course).len());
    let _ = writeln!(output, "- Assessments: {}", with_thousands(dataset.len()));
    let _ = writeln!(output);

    let _ = write!(output, "{}", filtered_view(view, filters));
    output
}

pub fn filtered_view(view: &View<'_>, filters: &FilterSelection) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "## Filtered View");
    let _ = writeln!(output, "Filters: {}", filters.describe());
    let _ = writeln!(output, "- Records: {}", view.len());
    let _ = writeln!(output, "- Students: {}", view.student_count());
    match stats::column_mean(view, Metric::Score) {
        Some(average) => {
            let _ = writeln!(output, "- Avg Score: {average:.1}");
        }
        None => {
            let _ = writeln!(output, "- Avg Score: n/a");
        }
    }
    output
}

fn bar(fraction: f64) -> String {
    let filled = (fraction.clamp(0.0, 1.0) * BAR_WIDTH as f64).round() as usize;
    "█".repeat(filled)
}

/// Text rendering of a chart for the terminal.
pub fn render_chart(chart: &ChartSpec) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "── {} ──", chart.title());
    let width = chart
        .categories()
        .iter()
        .map(|label| label.chars().count())
        .max()
        .unwrap_or(0);

    match chart {
        ChartSpec::Bar {
            y_axis_title, bars, ..
        } => {
            let top = bars.iter().map(|b| b.value).fold(0.0_f64, f64::max);
            for entry in bars {
                let fraction = if top > 0.0 { entry.value / top } else { 0.0 };
                let _ = writeln!(
                    output,
                    "{:<width$}  {} {}",
                    entry.label,
                    bar(fraction),
                    entry.text,
                );
            }
            let _ = writeln!(output, "({y_axis_title})");
        }
        ChartSpec::Pie { slices, .. } => {
            let total: usize = slices.iter().map(|s| s.count).sum();
            for slice in slices {
                let share = if total == 0 {
                    0.0
                } else {
                    slice.count as f64 / total as f64
                };
                let _ = writeln!(
                    output,
                    "{:<width$}  {} {:.1}% ({})",
                    slice.label,
                    bar(share),
                    share * 100.0,
                    slice.count,
                );
            }
        }
        ChartSpec::Scatter {
            x_label,
            y_label,
            points,
            trend,
            ..
        } => {
            let (xs, ys): (Vec<f64>, Vec<f64>) = points.iter().copied().unzip();
            let _ = writeln!(output, "{} points, {x_label} vs {y_label}", points.len());
            match stats::pearson(&xs, &ys) {
                Some(r) => {
                    let _ = writeln!(output, "correlation: {r:.3}");
                }
                None => {
                    let _ = writeln!(output, "correlation: n/a");
                }
            }
            if let Some(line) = trend {
                let _ = writeln!(
                    output,
                    "trend: {y_label} = {:.3} × {x_label} + {:.1}",
                    line.slope, line.intercept
                );
            }
        }
    }

    output
}
