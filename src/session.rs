use chrono::{DateTime, Local};
use tracing::{debug, info};
use uuid::Uuid;

use crate::composer::{self, ComposerSettings};
use crate::dataset::Dataset;
use crate::filter::{self, FilterSelection};
use crate::intent;
use crate::llm::LanguageModel;
use crate::models::Message;

pub const QUICK_START_QUESTIONS: [&str; 8] = [
    "📊 Compare all courses performance",
    "👥 Show me gender performance breakdown",
    "📈 What correlates with high scores?",
    "🎯 Which class performs best?",
    "🔍 How many students score above 80?",
    "💡 Tell me something interesting about the data",
    "⭐ Which course has the best students?",
    "📉 Are there any concerning trends?",
];

/// Per-user conversation state: active filters and the message history.
#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub started_at: DateTime<Local>,
    pub filters: FilterSelection,
    messages: Vec<Message>,
}

impl Session {
    pub fn new(filters: FilterSelection) -> Self {
        let session = Self {
            id: Uuid::new_v4(),
            started_at: Local::now(),
            filters,
            messages: Vec::new(),
        };
        info!(session = %session.id, "session started");
        session
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn reset_filters(&mut self) {
        self.filters.clear();
    }

    /// Runs one question through the pipeline and records both sides of the exchange.
    pub async fn ask(
        &mut self,
        dataset: &Dataset,
        model: &dyn LanguageModel,
        settings: &ComposerSettings,
        question: &str,
    ) -> &Message {
        self.messages.push(Message::user(question));

        let view = filter::apply(dataset, &self.filters);
        let classification = intent::classify(question);
        debug!(tags = %classification.tag_list(), rows = view.len(), "question classified");

        let answer = composer::respond(&classification, &view, model, settings).await;
        self.messages.push(Message::assistant(
            answer.text,
            answer.chart,
            answer.elapsed.as_secs_f64(),
        ));
        &self.messages[self.messages.len() - 1]
    }

    /// Plain-text transcript, one `ROLE: content` line per message.
    pub fn export_text(&self) -> String {
        self.messages
            .iter()
            .map(|message| {
                format!(
                    "{}: {}",
                    message.role.as_str().to_uppercase(),
                    escape_line_breaks(&message.content)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn export_file_name(at: DateTime<Local>) -> String {
        format!("chat_{}.txt", at.format("%Y%m%d_%H%M%S"))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let seconds = (Local::now() - self.started_at).num_seconds();
        info!(
            session = %self.id,
            messages = self.messages.len(),
            seconds,
            "session ended"
        );
    }
}

fn escape_line_breaks(content: &str) -> String {
    content.replace("\r\n", "\\n").replace(['\n', '\r'], "\\n")
}
