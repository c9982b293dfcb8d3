//! proctord - run one exam session from the terminal
//!
//! Wires together:
//! - Configuration loading
//! - Audit store
//! - File-backed session backend
//! - The session runtime, driven by line commands on stdin

use anyhow::{Context, Result};
use clap::Parser;
use proctor_api::{AnswerValue, EventPayload, SessionEvent};
use proctor_backend_api::NullSensor;
use proctor_config::{Policy, load_config};
use proctor_store::{AuditEvent, AuditEventType, SqliteStore, Store};
use proctor_util::{ExamId, QuestionId, SessionId, default_config_path, format_countdown};
use proctord::{ExamDriver, ExamHandle, FileBackend};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// proctord - timed, proctored exam session
#[derive(Parser, Debug)]
#[command(name = "proctord")]
#[command(about = "Run a timed, proctored exam session", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/proctor/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Data directory override (or set PROCTOR_DATA_DIR env var)
    #[arg(short, long, env = "PROCTOR_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Session to load
    #[arg(short, long)]
    session: String,

    /// Exam the session must belong to
    #[arg(short, long)]
    exam: String,
}

/// A parsed stdin command
#[derive(Debug, PartialEq)]
enum Input {
    Answer(QuestionId, String),
    Toggle(QuestionId, String),
    Goto(usize),
    Next,
    Prev,
    Submit,
    Retry,
    Status,
    Exit,
}

fn parse_input(line: &str) -> Result<Input, String> {
    let mut parts = line.split_whitespace();
    let command = parts.next().unwrap_or_default();
    let mut arg = |name: &str| {
        parts
            .next()
            .map(str::to_string)
            .ok_or_else(|| format!("{} requires <{}>", command, name))
    };

    match command {
        "answer" => Ok(Input::Answer(QuestionId::new(arg("question")?), arg("value")?)),
        "toggle" => Ok(Input::Toggle(QuestionId::new(arg("question")?), arg("option")?)),
        "goto" => {
            let number: usize = arg("number")?
                .parse()
                .map_err(|_| "goto takes a question number".to_string())?;
            // Question numbers are 1-based on the command line
            number
                .checked_sub(1)
                .map(Input::Goto)
                .ok_or_else(|| "question numbers start at 1".to_string())
        }
        "next" => Ok(Input::Next),
        "prev" => Ok(Input::Prev),
        "submit" => Ok(Input::Submit),
        "retry" => Ok(Input::Retry),
        "status" => Ok(Input::Status),
        "exit" | "quit" => Ok(Input::Exit),
        "" => Err("empty command".into()),
        other => Err(format!("unknown command: {}", other)),
    }
}

/// Run one command. Returns false when the session should end.
async fn run_input(handle: &mut ExamHandle, input: Input) -> bool {
    let result = match input {
        Input::Answer(question_id, value) => {
            handle.answer(question_id, AnswerValue::single(value)).await
        }
        Input::Toggle(question_id, option) => handle.toggle(question_id, option).await,
        Input::Goto(index) => handle.navigate(index).await.map(|_| ()),
        Input::Next => handle.next().await.map(|_| ()),
        Input::Prev => handle.previous().await.map(|_| ()),
        Input::Submit => handle.submit().await,
        Input::Retry => handle.retry().await,
        Input::Status => {
            print_status(handle).await;
            Ok(())
        }
        Input::Exit => {
            let _ = handle.exit().await;
            return false;
        }
    };

    if let Err(e) = result {
        println!("error: {}", e);
    }
    true
}

async fn print_status(handle: &ExamHandle) {
    let view = handle.view();
    println!(
        "{:?}  {}  question {}/{}  answered {}  violations {}/{}",
        view.status,
        format_countdown(view.remaining_seconds),
        view.current_index + 1,
        view.question_count,
        view.answered_count,
        view.violation_count,
        view.escalation_threshold,
    );

    if let Ok(Some(question)) = handle.current_question().await {
        println!("Q{} [{}] {}", question.ordinal, question.kind, question.prompt);
        for option in &question.options {
            println!("  {}", option);
        }
    }

    if let Ok(statuses) = handle.statuses().await {
        let palette: Vec<String> = statuses
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{}:{:?}", i + 1, s))
            .collect();
        println!("{}", palette.join(" "));
    }
}

fn print_event(event: &SessionEvent) {
    match serde_json::to_string(event) {
        Ok(json) => println!("{}", json),
        Err(e) => warn!(error = %e, "Failed to encode event"),
    }
}

fn load_policy(path: &PathBuf) -> Result<Policy> {
    if path.exists() {
        let policy = load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?;
        info!(config_path = %path.display(), "Configuration loaded");
        Ok(policy)
    } else {
        info!(config_path = %path.display(), "No config file, using defaults");
        Ok(Policy::default())
    }
}

async fn run(args: Args) -> Result<()> {
    let policy = load_policy(&args.config)?;

    let data_dir = args
        .data_dir
        .clone()
        .unwrap_or_else(|| policy.service.data_dir.clone());

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

    let db_path = data_dir.join("proctord.db");
    let store: Arc<dyn Store> = Arc::new(
        SqliteStore::open(&db_path)
            .with_context(|| format!("Failed to open database {:?}", db_path))?,
    );
    info!(db_path = %db_path.display(), "Store initialized");

    store.append_audit(AuditEvent::new(AuditEventType::ServiceStarted))?;

    let driver = ExamDriver::new(
        policy.session.clone(),
        Arc::new(FileBackend::new(&data_dir)),
        Arc::new(NullSensor),
        store.clone(),
    );

    let mut handle = driver.spawn(ExamId::new(args.exam), SessionId::new(args.session));
    let mut events = handle
        .take_events()
        .context("Session event stream unavailable")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;

    info!("Session running");

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, exiting session");
                let _ = handle.exit().await;
                break;
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, exiting session");
                let _ = handle.exit().await;
                break;
            }

            Some(event) = events.recv() => {
                print_event(&event);
                if matches!(event.payload, EventPayload::Exited) {
                    break;
                }
            }

            line = lines.next_line() => {
                match line.context("Failed to read stdin")? {
                    Some(line) => match parse_input(&line) {
                        Ok(input) => {
                            if !run_input(&mut handle, input).await {
                                break;
                            }
                        }
                        Err(message) => println!("error: {}", message),
                    },
                    None => {
                        info!("stdin closed, exiting session");
                        let _ = handle.exit().await;
                        break;
                    }
                }
            }
        }
    }

    // Flush whatever the runtime emitted before it stopped
    while let Ok(event) = events.try_recv() {
        print_event(&event);
    }

    if let Err(e) = store.append_audit(AuditEvent::new(AuditEventType::ServiceStopped)) {
        warn!(error = %e, "Failed to log service shutdown");
    }

    info!("Shutdown complete");
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries events
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "proctord starting");

    run(args).await
}
