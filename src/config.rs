use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Args;

use crate::composer::ComposerSettings;
use crate::filter::FilterSelection;
use crate::llm::OpenAIClient;
use crate::models::Gender;

/// Dataset location and facet filters shared by every dataset command.
#[derive(Args, Debug, Clone)]
pub struct DataArgs {
    /// Assessment dataset (.csv, .xlsx, .xls or .ods)
    #[arg(long, env = "EDU_DATASET", default_value = "Students_Dataset.xlsx")]
    pub dataset: PathBuf,
    /// Keep only these courses (repeatable)
    #[arg(long = "course")]
    pub courses: Vec<String>,
    /// Keep only these class levels (repeatable)
    #[arg(long = "class-level")]
    pub class_levels: Vec<String>,
    /// Keep only these genders, M or F (repeatable)
    #[arg(long = "gender")]
    pub genders: Vec<Gender>,
}

impl DataArgs {
    pub fn filters(&self) -> FilterSelection {
        FilterSelection::new(
            self.courses.iter().cloned(),
            self.class_levels.iter().cloned(),
            self.genders.iter().copied(),
        )
    }
}

/// Language model connection and sampling settings.
#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub api_base: String,
    #[arg(long, env = "EDU_MODEL", default_value = "gpt-4o-mini")]
    pub model: String,
    #[arg(long, env = "EDU_TEMPERATURE", default_value_t = 0.15)]
    pub temperature: f32,
    /// Seconds to wait for a completion before giving up
    #[arg(long, env = "EDU_TIMEOUT_SECS", default_value_t = 60)]
    pub timeout_secs: u64,
    /// Answer with text only
    #[arg(long)]
    pub no_charts: bool,
}

impl ModelArgs {
    /// Builds the client; a missing API key is fatal.
    pub fn client(&self) -> anyhow::Result<OpenAIClient> {
        let api_key = self
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .context("OPENAI_API_KEY must be set to ask questions")?;
        Ok(OpenAIClient::new(
            api_key,
            self.api_base.clone(),
            self.model.clone(),
        ))
    }

    pub fn composer_settings(&self) -> ComposerSettings {
        ComposerSettings {
            temperature: self.temperature,
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
            charts: !self.no_charts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        data: DataArgs,
        #[command(flatten)]
        model: ModelArgs,
    }

    #[test]
    fn repeated_facet_flags_build_a_selection() {
        let harness = Harness::parse_from([
            "test",
            "--dataset",
            "students.csv",
            "--course",
            "Biology",
            "--course",
            "Computer",
            "--gender",
            "f",
            "--api-key",
            "sk-test",
        ]);
        let filters = harness.data.filters();
        assert_eq!(filters.courses.len(), 2);
        assert!(filters.class_levels.is_empty());
        assert!(filters.genders.contains(&Gender::Female));
        assert!(harness.model.client().is_ok());
    }

    #[test]
    fn blank_api_key_is_rejected() {
        let harness = Harness::parse_from(["test", "--api-key", " ", "--timeout-secs", "0"]);
        assert!(harness.model.client().is_err());
        let settings = harness.model.composer_settings();
        assert_eq!(settings.timeout, Duration::from_secs(1));
        assert!(settings.charts);
    }
}
