use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;

mod chart;
mod composer;
mod config;
mod dataset;
mod filter;
mod intent;
mod llm;
mod models;
mod report;
mod session;
mod stats;

use config::{DataArgs, ModelArgs};
use dataset::Dataset;
use models::{Facet, Message};
use session::{Session, QUICK_START_QUESTIONS};

#[derive(Parser)]
#[command(name = "edu-data-chat")]
#[command(about = "Ask questions about student assessment data", long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show dataset totals and the filtered view
    Stats {
        #[command(flatten)]
        data: DataArgs,
    },
    /// Answer a single question
    Ask {
        question: String,
        /// Also write the chart specification as JSON
        #[arg(long)]
        chart_json: Option<PathBuf>,
        #[command(flatten)]
        data: DataArgs,
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Start an interactive conversation
    Chat {
        #[command(flatten)]
        data: DataArgs,
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Show how a question is classified and routed
    Classify { question: String },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_dataset(data: &DataArgs) -> anyhow::Result<&'static Dataset> {
    let dataset = Dataset::load_cached(&data.dataset)
        .with_context(|| format!("could not load dataset from {}", data.dataset.display()))?;
    if dataset.is_empty() {
        tracing::warn!(path = %data.dataset.display(), "dataset has no rows");
    }
    Ok(dataset)
}

fn print_reply(message: &Message) {
    println!("{}", message.content);
    if let Some(chart) = &message.chart {
        println!();
        print!("{}", report::render_chart(chart));
    }
    if let Some(elapsed) = message.elapsed_secs {
        println!("⚡ Answered in {elapsed:.2}s");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Stats { data } => {
            let dataset = load_dataset(&data)?;
            let filters = data.filters();
            let view = filter::apply(dataset, &filters);
            print!("{}", report::build_overview(dataset, &view, &filters));
        }
        Commands::Ask {
            question,
            chart_json,
            data,
            model,
        } => {
            let dataset = load_dataset(&data)?;
            let client = model.client()?;
            let settings = model.composer_settings();
            let mut session = Session::new(data.filters());

            let reply = session.ask(dataset, &client, &settings, &question).await;
            print_reply(reply);

            if let (Some(path), Some(chart)) = (chart_json, &reply.chart) {
                let json = serde_json::to_string_pretty(chart)?;
                std::fs::write(&path, json)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("Chart written to {}.", path.display());
            }
        }
        Commands::Chat { data, model } => {
            let dataset = load_dataset(&data)?;
            let client = model.client()?;
            let settings = model.composer_settings();
            let mut session = Session::new(data.filters());
            run_chat(&mut session, dataset, &client, &settings).await?;
        }
        Commands::Classify { question } => {
            let classification = intent::classify(&question);
            println!("Tags: {}", classification.tag_list());
            match classification.route() {
                Some(route) => println!("Route: {}", route.describe()),
                None => println!("Route: none (no chart)"),
            }
            println!(
                "Response style: {}",
                if classification.is_big_question() {
                    "detailed"
                } else {
                    "short"
                }
            );
        }
    }

    Ok(())
}

/// One line typed at the chat prompt.
#[derive(Debug, PartialEq)]
enum ChatInput<'a> {
    Quit,
    ResetFilters,
    ShowFilters,
    SetFilter(Facet, &'a str),
    Export(&'a str),
    Unknown(&'a str),
    Question(String),
}

const CHAT_HELP: &str = "Commands: /course A,B  /class-level C1  /gender F  /filters  /reset  /export [path]  /quit";

/// Quick-start numbers only apply before the first question.
fn parse_chat_input(input: &str, quick_start: bool) -> ChatInput<'_> {
    let (head, rest) = input
        .split_once(char::is_whitespace)
        .map_or((input, ""), |(head, rest)| (head, rest.trim()));
    match head {
        "/quit" | "/exit" => ChatInput::Quit,
        "/reset" => ChatInput::ResetFilters,
        "/filters" => ChatInput::ShowFilters,
        "/course" => ChatInput::SetFilter(Facet::Course, rest),
        "/class-level" => ChatInput::SetFilter(Facet::ClassLevel, rest),
        "/gender" => ChatInput::SetFilter(Facet::Gender, rest),
        "/export" => ChatInput::Export(rest),
        command if command.starts_with('/') => ChatInput::Unknown(command),
        _ => match input.parse::<usize>() {
            Ok(n) if quick_start && (1..=QUICK_START_QUESTIONS.len()).contains(&n) => {
                ChatInput::Question(QUICK_START_QUESTIONS[n - 1].to_string())
            }
            _ => ChatInput::Question(input.to_string()),
        },
    }
}

fn export_path(target: &str, now: DateTime<Local>) -> PathBuf {
    if target.is_empty() {
        PathBuf::from(Session::export_file_name(now))
    } else {
        PathBuf::from(target)
    }
}

fn write_export(session: &Session, path: PathBuf) -> anyhow::Result<PathBuf> {
    std::fs::write(&path, session.export_text())
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

async fn run_chat(
    session: &mut Session,
    dataset: &Dataset,
    client: &llm::OpenAIClient,
    settings: &composer::ComposerSettings,
) -> anyhow::Result<()> {
    let mut editor = DefaultEditor::new().context("failed to initialise line editor")?;

    println!("Educational Data Chatbot ({} model)", client.model());
    let view = filter::apply(dataset, &session.filters);
    print!("{}", report::filtered_view(&view, &session.filters));
    println!("{CHAT_HELP}");
    println!();
    println!("💡 Quick start, type a number to ask:");
    for (index, question) in QUICK_START_QUESTIONS.iter().enumerate() {
        println!("  {}. {}", index + 1, question);
    }

    loop {
        let line = match editor.readline("💭 ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err).context("failed to read input"),
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(input);

        match parse_chat_input(input, session.messages().is_empty()) {
            ChatInput::Quit => break,
            ChatInput::ResetFilters => {
                session.reset_filters();
                println!("Filters cleared.");
            }
            ChatInput::ShowFilters => {
                let view = filter::apply(dataset, &session.filters);
                print!("{}", report::filtered_view(&view, &session.filters));
            }
            ChatInput::SetFilter(facet, values) => {
                match session.filters.set_facet(dataset, facet, values) {
                    Ok(()) => {
                        let view = filter::apply(dataset, &session.filters);
                        print!("{}", report::filtered_view(&view, &session.filters));
                    }
                    Err(err) => println!("⚠️ {err}"),
                }
            }
            ChatInput::Export(target) => {
                if session.messages().is_empty() {
                    println!("Nothing to export yet.");
                    continue;
                }
                match write_export(session, export_path(target, Local::now())) {
                    Ok(path) => println!("📥 Chat history written to {}.", path.display()),
                    Err(err) => {
                        tracing::warn!("chat export failed: {err:#}");
                        eprintln!("❌ Export failed: {err:#}");
                    }
                }
            }
            ChatInput::Unknown(command) => println!("Unknown command {command}. {CHAT_HELP}"),
            ChatInput::Question(question) => {
                println!("✨ Thinking...");
                let reply = session.ask(dataset, client, settings, &question).await;
                println!();
                print_reply(reply);
                println!();
            }
        }
    }

    Ok(())
}
