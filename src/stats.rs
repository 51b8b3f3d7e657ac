use std::collections::HashMap;

use crate::dataset::View;
use crate::models::{Facet, Gender, GroupMean, Metric, ValueCount};

/// Engagement columns reported alongside overview answers.
pub const ENGAGEMENT_METRICS: [Metric; 4] = [
    Metric::Attendance,
    Metric::RaisedHands,
    Metric::MoodleViews,
    Metric::Downloads,
];

/// Columns correlated against the assessment score.
pub const CORRELATED_METRICS: [Metric; 3] =
    [Metric::Attendance, Metric::RaisedHands, Metric::MoodleViews];

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn column_mean(view: &View<'_>, metric: Metric) -> Option<f64> {
    mean(&view.column(metric))
}

/// Mean score per value of `facet`, highest mean first.
pub fn grouped_means(view: &View<'_>, facet: Facet) -> Option<Vec<GroupMean>> {
    if view.is_empty() {
        return None;
    }

    let mut groups: HashMap<&str, (f64, usize)> = HashMap::new();
    for record in view.rows() {
        let entry = groups.entry(facet.value(record)).or_insert((0.0, 0));
        entry.0 += record.assessment_score;
        entry.1 += 1;
    }

    let mut means: Vec<GroupMean> = groups
        .into_iter()
        .map(|(label, (total, count))| GroupMean {
            label: label.to_string(),
            mean: total / count as f64,
        })
        .collect();

    means.sort_by(|a, b| {
        b.mean
            .partial_cmp(&a.mean)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.label.cmp(&b.label))
    });
    Some(means)
}

/// Mean score for the `M` and `F` buckets that actually have rows.
pub fn gender_means(view: &View<'_>) -> Option<Vec<(Gender, f64)>> {
    let buckets: Vec<(Gender, f64)> = [Gender::Male, Gender::Female]
        .into_iter()
        .filter_map(|gender| {
            let scores: Vec<f64> = view
                .rows()
                .iter()
                .filter(|record| record.gender == gender)
                .map(|record| record.assessment_score)
                .collect();
            mean(&scores).map(|value| (gender, value))
        })
        .collect();

    if buckets.is_empty() {
        None
    } else {
        Some(buckets)
    }
}

/// Row count per value of `facet`, largest first.
pub fn value_counts(view: &View<'_>, facet: Facet) -> Option<Vec<ValueCount>> {
    if view.is_empty() {
        return None;
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for record in view.rows() {
        *counts.entry(facet.value(record)).or_insert(0) += 1;
    }

    let mut values: Vec<ValueCount> = counts
        .into_iter()
        .map(|(label, count)| ValueCount {
            label: label.to_string(),
            count,
        })
        .collect();
    values.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    Some(values)
}

/// Pearson correlation coefficient. `None` for fewer than two points or a constant column.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let mean_x = mean(xs)?;
    let mean_y = mean(ys)?;

    let mut covariance = 0.0;
    let mut variance_x = 0.0;
    let mut variance_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        covariance += dx * dy;
        variance_x += dx * dx;
        variance_y += dy * dy;
    }

    if variance_x == 0.0 || variance_y == 0.0 {
        return None;
    }
    let r = covariance / (variance_x.sqrt() * variance_y.sqrt());
    r.is_finite().then(|| r.clamp(-1.0, 1.0))
}

/// Correlation of `metric` with the assessment score over the view.
pub fn score_correlation(view: &View<'_>, metric: Metric) -> Option<f64> {
    pearson(&view.column(metric), &view.column(Metric::Score))
}

/// Ordinary least squares fit `y = slope * x + intercept`.
pub fn linear_fit(xs: &[f64], ys: &[f64]) -> Option<(f64, f64)> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let mean_x = mean(xs)?;
    let mean_y = mean(ys)?;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        sxy += (x - mean_x) * (y - mean_y);
        sxx += (x - mean_x) * (x - mean_x);
    }
    if sxx == 0.0 {
        return None;
    }
    let slope = sxy / sxx;
    Some((slope, mean_y - slope * mean_x))
}
