//! Builds the prompt for a question and turns the model's completion into an answer.

use std::fmt::Write;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::chart::{self, ChartSpec};
use crate::dataset::View;
use crate::intent::{Classification, Tag};
use crate::llm::{Generation, LanguageModel, UpstreamError};
use crate::models::{Facet, Metric};
use crate::stats;

pub const BIG_ANSWER_TOKENS: u32 = 400;
pub const SHORT_ANSWER_TOKENS: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComposerSettings {
    pub temperature: f32,
    pub timeout: Duration,
    /// When false every answer is text-only.
    pub charts: bool,
}

impl Default for ComposerSettings {
    fn default() -> Self {
        Self {
            temperature: 0.15,
            timeout: Duration::from_secs(60),
            charts: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub chart: Option<ChartSpec>,
    pub elapsed: Duration,
}

/// Formats an integer with thousands separators.
pub fn with_thousands(value: usize) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn metric_label(metric: Metric) -> &'static str {
    match metric {
        Metric::Score => "Score",
        Metric::Attendance => "Attendance",
        Metric::RaisedHands => "Hand Raises",
        Metric::MoodleViews => "Moodle Views",
        Metric::Downloads => "Downloads",
    }
}

/// Dataset facts plus whichever aggregates the question's tags ask for.
pub fn build_context(classification: &Classification, view: &View<'_>) -> String {
    let mut context = String::new();
    let _ = writeln!(context, "USER QUESTION: \"{}\"", classification.question);
    let _ = writeln!(context);
    let _ = writeln!(
        context,
        "DATASET: {} assessments, {} students",
        with_thousands(view.len()),
        view.student_count()
    );
    let _ = writeln!(context, "Courses: {}", view.distinct(Facet::Course).join(", "));
    if let Some(average) = stats::column_mean(view, Metric::Score) {
        let _ = writeln!(context, "Overall Average: {average:.1}/100");
    }

    if classification.has(Tag::Course) {
        if let Some(means) = stats::grouped_means(view, Facet::Course) {
            let _ = writeln!(context, "\nCOURSE SCORES:");
            for group in means {
                let _ = writeln!(context, "- {}: {:.1}", group.label, group.mean);
            }
        }
    }

    if classification.has(Tag::Gender) {
        if let Some(means) = stats::gender_means(view) {
            let parts: Vec<String> = means
                .iter()
                .map(|(gender, mean)| format!("{gender}={mean:.1}"))
                .collect();
            let _ = writeln!(context, "\nGENDER SCORES: {}", parts.join(", "));
        }
    }

    if classification.has(Tag::ClassLevel) {
        if let Some(means) = stats::grouped_means(view, Facet::ClassLevel) {
            let _ = writeln!(context, "\nCLASS SCORES:");
            for group in means {
                let _ = writeln!(context, "- {}: {:.1}", group.label, group.mean);
            }
        }
    }

    let engagement_asked = [Tag::Attendance, Tag::Participation, Tag::Engagement]
        .into_iter()
        .any(|tag| classification.has(tag));

    if classification.is_big_question() || engagement_asked {
        let averages: Vec<String> = stats::ENGAGEMENT_METRICS
            .into_iter()
            .filter_map(|metric| {
                let value = stats::column_mean(view, metric)?;
                let suffix = if metric == Metric::Attendance { "%" } else { "" };
                Some(format!("- Avg {}: {value:.1}{suffix}", metric_label(metric)))
            })
            .collect();
        if !averages.is_empty() {
            let _ = writeln!(context, "\nENGAGEMENT STATS:\n{}", averages.join("\n"));
        }
    }

    if classification.is_big_question() || classification.has(Tag::Correlation) {
        let correlations: Vec<String> = stats::CORRELATED_METRICS
            .into_iter()
            .filter_map(|metric| {
                let r = stats::score_correlation(view, metric)?;
                Some(format!("- {}: {r:.3}", metric_label(metric)))
            })
            .collect();
        if !correlations.is_empty() {
            let _ = writeln!(
                context,
                "\nCORRELATIONS WITH SCORES:\n{}",
                correlations.join("\n")
            );
        }
    }

    context
}

const BIG_STYLE: &str = r#"This is a BIG question - provide a DETAILED, INSIGHTFUL response like ChatGPT would.

STYLE:
- Start with ### and emoji
- Use **bold** for emphasis
- Break into SHORT sections with subheadings
- Use bullet points for lists
- 2-3 sentences per paragraph MAX
- Focus on INSIGHTS, not just numbers
- Be conversational and engaging

STRUCTURE:
### [Title]

Brief intro (1-2 sentences)

**Section 1:**
- Point with data
- Point with data

**Section 2:**
- Insight
- Insight

Final takeaway or recommendation."#;

const SHORT_STYLE: &str = r#"This is a SIMPLE question - provide a SHORT, DIRECT response like ChatGPT would.

STYLE:
- Start with ### and emoji
- 2-4 sentences total
- Use **bold** for key numbers
- Conversational tone
- Answer the EXACT question

EXAMPLE:

Q: "Compare Biology vs Computer"
A: ### 📊 Biology vs Computer

Computer students score **70.3** on average, while Biology students score **70.0**. Computer edges ahead by just 0.3 points - they're basically tied! Both perform right around the overall average."#;

pub fn build_prompt(classification: &Classification, view: &View<'_>) -> String {
    let style = if classification.is_big_question() {
        BIG_STYLE
    } else {
        SHORT_STYLE
    };
    format!(
        "{}\n{}\n\nNOW ANSWER: \"{}\"\n",
        build_context(classification, view),
        style,
        classification.question
    )
}

pub fn generation_params(classification: &Classification, settings: &ComposerSettings) -> Generation {
    Generation {
        max_tokens: if classification.is_big_question() {
            BIG_ANSWER_TOKENS
        } else {
            SHORT_ANSWER_TOKENS
        },
        temperature: settings.temperature,
    }
}

/// Generates the answer text and chart for a classified question.
pub async fn compose(
    classification: &Classification,
    view: &View<'_>,
    model: &dyn LanguageModel,
    settings: &ComposerSettings,
) -> Result<Answer, UpstreamError> {
    let prompt = build_prompt(classification, view);
    let params = generation_params(classification, settings);

    let started = Instant::now();
    let text = tokio::time::timeout(settings.timeout, model.complete(&prompt, params))
        .await
        .map_err(|_| UpstreamError::Timeout(settings.timeout))??;
    let elapsed = started.elapsed();

    info!(
        elapsed_ms = elapsed.as_millis() as u64,
        big = classification.is_big_question(),
        "answer generated"
    );

    let chart = if settings.charts {
        chart::select(classification, view)
    } else {
        None
    };
    Ok(Answer {
        text,
        chart,
        elapsed,
    })
}

/// Like [`compose`], but a failed generation becomes an inline error message.
pub async fn respond(
    classification: &Classification,
    view: &View<'_>,
    model: &dyn LanguageModel,
    settings: &ComposerSettings,
) -> Answer {
    match compose(classification, view, model, settings).await {
        Ok(answer) => answer,
        Err(err) => {
            warn!(error = %err, "answer generation failed");
            Answer {
                text: format!("❌ Error: {err}"),
                chart: None,
                elapsed: Duration::ZERO,
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::dataset::Dataset;
    use crate::intent::classify;
    use crate::models::{AssessmentRecord, Gender};

    /// Records the last prompt and answers with a fixed reply.
    pub(crate) struct ScriptedModel {
        pub reply: String,
        pub prompts: Mutex<Vec<(String, Generation)>>,
    }

    impl ScriptedModel {
        pub(crate) fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn last(&self) -> (String, Generation) {
            self.prompts.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn complete(&self, prompt: &str, params: Generation) -> Result<String, UpstreamError> {
            self.prompts.lock().unwrap().push((prompt.to_string(), params));
            Ok(self.reply.clone())
        }
    }

    pub(crate) struct FailingModel;

    #[async_trait]
    impl LanguageModel for FailingModel {
        async fn complete(&self, _prompt: &str, _params: Generation) -> Result<String, UpstreamError> {
            Err(UpstreamError::Status {
                status: 401,
                body: "invalid api key".to_string(),
            })
        }
    }

    struct SlowModel;

    #[async_trait]
    impl LanguageModel for SlowModel {
        async fn complete(&self, _prompt: &str, _params: Generation) -> Result<String, UpstreamError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("too late".to_string())
        }
    }

    fn record(id: &str, course: &str, gender: Gender, score: f64) -> AssessmentRecord {
        AssessmentRecord {
            student_id: id.to_string(),
            course_name: course.to_string(),
            class_level: "C3".to_string(),
            gender,
            assessment_score: score,
            attendance_rate: score + 5.0,
            raised_hand_count: (score / 10.0) as u32,
            moodle_views: 30,
            resources_downloads: 4,
        }
    }

    pub(crate) fn biology_computer() -> Dataset {
        Dataset::from_records(vec![
            record("S1", "Biology", Gender::Male, 60.0),
            record("S2", "Biology", Gender::Male, 80.0),
            record("S3", "Computer", Gender::Male, 70.3),
        ])
    }

    #[test]
    fn thousands_separator() {
        assert_eq!(with_thousands(7), "7");
        assert_eq!(with_thousands(1000), "1,000");
        assert_eq!(with_thousands(1234567), "1,234,567");
    }

    #[test]
    fn context_omits_absent_gender_bucket() {
        let dataset = biology_computer();
        let context = build_context(&classify("how do male and female students differ"), &dataset.view());
        assert!(context.contains("GENDER SCORES: M=70.1"));
        assert!(!context.contains("F="));
    }

    #[test]
    fn unclassified_question_gets_base_stats_only() {
        let dataset = biology_computer();
        let context = build_context(&classify("asdf"), &dataset.view());
        assert!(context.contains("DATASET: 3 assessments, 3 students"));
        assert!(context.contains("Courses: Biology, Computer"));
        assert!(context.contains("Overall Average: 70.1/100"));
        assert!(!context.contains("COURSE SCORES"));
        assert!(!context.contains("CORRELATIONS"));
        assert!(!context.contains("ENGAGEMENT"));
    }

    #[test]
    fn empty_view_drops_aggregates() {
        let dataset = Dataset::from_records(Vec::new());
        let context = build_context(&classify("give me an overview of every course"), &dataset.view());
        assert!(context.contains("DATASET: 0 assessments, 0 students"));
        assert!(!context.contains("Overall Average"));
        assert!(!context.contains("COURSE SCORES"));
        assert!(!context.contains("CORRELATIONS"));
    }

    #[test]
    fn big_question_adds_engagement_and_correlations() {
        let dataset = biology_computer();
        let prompt = build_prompt(&classify("Give me a summary of the data"), &dataset.view());
        assert!(prompt.contains("ENGAGEMENT STATS:"));
        assert!(prompt.contains("- Avg Attendance: 75.1%"));
        assert!(prompt.contains("CORRELATIONS WITH SCORES:"));
        assert!(prompt.contains("- Attendance: 1.000"));
        assert!(prompt.contains("This is a BIG question"));
        // Moodle views are constant, so that correlation is omitted.
        assert!(!prompt.contains("- Moodle Views: "));
    }

    #[tokio::test]
    async fn compare_courses_end_to_end() {
        let dataset = biology_computer();
        let model = ScriptedModel::new(
            "### 📊 Biology vs Computer\n\nComputer scores **70.3**, Biology **70.0**.",
        );
        let classification = classify("Compare Biology vs Computer");
        let answer = compose(&classification, &dataset.view(), &model, &ComposerSettings::default())
            .await
            .unwrap();

        let (prompt, params) = model.last();
        assert!(prompt.contains("COURSE SCORES:\n- Computer: 70.3\n- Biology: 70.0"));
        assert!(prompt.contains("This is a SIMPLE question"));
        assert!(prompt.ends_with("NOW ANSWER: \"Compare Biology vs Computer\"\n"));
        assert_eq!(params.max_tokens, SHORT_ANSWER_TOKENS);
        assert!((params.temperature - 0.15).abs() < f32::EPSILON);

        assert!(answer.text.contains("70.3") && answer.text.contains("70.0"));
        let chart = answer.chart.unwrap();
        assert_eq!(chart.categories(), vec!["Computer", "Biology"]);
    }

    #[tokio::test]
    async fn disabled_charts_give_text_only_answers() {
        let dataset = biology_computer();
        let model = ScriptedModel::new("### 📊 Computer leads");
        let settings = ComposerSettings {
            charts: false,
            ..ComposerSettings::default()
        };
        let answer = compose(&classify("Compare Biology vs Computer"), &dataset.view(), &model, &settings)
            .await
            .unwrap();
        assert!(answer.chart.is_none());
        assert_eq!(answer.text, "### 📊 Computer leads");
    }

    #[tokio::test]
    async fn overview_uses_long_budget() {
        let dataset = biology_computer();
        let model = ScriptedModel::new("### Overview");
        let classification = classify("Tell me something interesting about the data");
        compose(&classification, &dataset.view(), &model, &ComposerSettings::default())
            .await
            .unwrap();
        assert_eq!(model.last().1.max_tokens, BIG_ANSWER_TOKENS);
    }

    #[tokio::test]
    async fn upstream_failure_becomes_inline_message() {
        let dataset = biology_computer();
        let classification = classify("Compare Biology vs Computer");
        let answer = respond(
            &classification,
            &dataset.view(),
            &FailingModel,
            &ComposerSettings::default(),
        )
        .await;
        assert!(answer.text.starts_with("❌ Error:"));
        assert!(answer.text.contains("401"));
        assert!(answer.chart.is_none());
        assert_eq!(answer.elapsed, Duration::ZERO);
    }

    #[tokio::test]
    async fn slow_model_times_out() {
        let dataset = biology_computer();
        let settings = ComposerSettings {
            timeout: Duration::from_millis(20),
            ..ComposerSettings::default()
        };
        let err = compose(&classify("asdf"), &dataset.view(), &SlowModel, &settings)
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Timeout(_)));
    }
}
