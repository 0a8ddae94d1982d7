//! The `mcqeval run` command.
//!
//! Starts a full or quick run, streams progress events to stderr, and reads
//! control commands (`pause`, `resume`, `stop`, `reset`, `status`) from stdin
//! until the run loop exits.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;

use mcqeval_core::controller::{RunController, RunSummary, StartOutcome};
use mcqeval_core::events::{AnswerEvent, EventPublisher, LifecycleEvent, ProgressEvent};
use mcqeval_core::statistics::analyze;
use mcqeval_core::store::JsonFileStore;
use mcqeval_core::traits::AnswerService;
use mcqeval_providers::{create_provider, RetryingService};

use super::analyze::summary_table;

pub async fn execute(
    quick: bool,
    provider: Option<String>,
    model: Option<String>,
    config_path: Option<PathBuf>,
    store: Option<PathBuf>,
) -> Result<()> {
    let (config, store_dir) = super::load_with_store(config_path.as_deref(), store)?;

    let provider_name = provider.unwrap_or_else(|| config.default_provider.clone());
    let Some(provider_config) = config.providers.get(&provider_name) else {
        let mut available: Vec<_> = config.providers.keys().collect();
        available.sort();
        anyhow::bail!("provider '{provider_name}' not found in config. Available: {available:?}");
    };
    let settings = config.generation_settings(model.as_deref());
    let model_name = settings.model.clone();
    let service = RetryingService::new(
        create_provider(&provider_name, provider_config, settings)?,
        config.max_retries,
        Duration::from_millis(config.retry_delay_ms),
    );
    let service: Arc<dyn AnswerService> = Arc::new(service);

    let store = Arc::new(JsonFileStore::open(&store_dir).await?);
    if store.is_empty().await {
        anyhow::bail!(
            "store at {} has no questions. Load some with `mcqeval import`.",
            store_dir.display()
        );
    }

    let publisher = EventPublisher::default();
    let mut events = publisher.register();
    let controller = RunController::new(
        store.clone(),
        service,
        publisher,
        config.controller_config(),
    );

    let outcome = if quick {
        controller.quick_start()
    } else {
        controller.start()
    };
    let StartOutcome::Started(handle) = outcome else {
        anyhow::bail!("a run is already active");
    };

    eprintln!(
        "mcqeval v{} — {} run {} with {provider_name}/{model_name}",
        env!("CARGO_PKG_VERSION"),
        if quick { "quick" } else { "full" },
        handle.id,
    );
    eprintln!("Commands: pause | resume | stop | reset | status");
    eprintln!();

    let mut commands = spawn_stdin_reader();
    let mut join = tokio::spawn(handle.join());

    let summary = loop {
        tokio::select! {
            Some(event) = events.recv() => print_event(&event),
            Some(line) = commands.recv() => handle_command(&controller, line.trim()),
            joined = &mut join => break joined??,
        }
    };

    while let Some(event) = events.try_recv() {
        print_event(&event);
    }
    print_summary(&summary);

    let results = analyze(store.as_ref()).await?;
    if !results.is_empty() {
        println!("{}", summary_table(&results));
    }

    Ok(())
}

/// Forward stdin lines on a plain thread so a pending read never holds up
/// runtime shutdown. The channel closes at EOF.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn handle_command(controller: &RunController, command: &str) {
    let status = match command {
        "" => return,
        "pause" => serde_json::to_string(&controller.pause()),
        "resume" => serde_json::to_string(&controller.resume()),
        "stop" => serde_json::to_string(&controller.stop()),
        "reset" => serde_json::to_string(&controller.reset()),
        "status" => serde_json::to_string(&controller.snapshot()),
        other => {
            eprintln!("  unknown command '{other}' (pause | resume | stop | reset | status)");
            return;
        }
    };
    match status {
        Ok(json) => eprintln!("  > {json}"),
        Err(e) => tracing::warn!("failed to render status: {e}"),
    }
}

fn print_event(event: &ProgressEvent) {
    match event {
        ProgressEvent::Answer(AnswerEvent {
            domain,
            question,
            answer,
            response_time,
            error,
        }) => {
            let answer = if answer.is_empty() { "-" } else { answer.as_str() };
            match error {
                Some(err) => eprintln!("  [{domain}] {answer} ({response_time}ms) ERROR: {err}"),
                None => eprintln!("  [{domain}] {answer} ({response_time}ms) {}", preview(question)),
            }
        }
        ProgressEvent::Lifecycle(LifecycleEvent::DomainStart { domain, count }) => {
            eprintln!("\n{domain}: sampling {count} question(s)");
        }
        ProgressEvent::Lifecycle(LifecycleEvent::Done) => eprintln!("\nRun complete."),
        ProgressEvent::Lifecycle(LifecycleEvent::QuickDone) => eprintln!("\nQuick run complete."),
        ProgressEvent::Lifecycle(LifecycleEvent::Stopped) => eprintln!("\nRun stopped."),
        ProgressEvent::Lifecycle(LifecycleEvent::Reset) => eprintln!("Controller reset."),
    }
}

fn preview(question: &str) -> String {
    const MAX: usize = 60;
    if question.chars().count() <= MAX {
        question.to_string()
    } else {
        let cut: String = question.chars().take(MAX).collect();
        format!("{cut}…")
    }
}

fn print_summary(summary: &RunSummary) {
    eprintln!(
        "{} question(s) processed, {} failed, {} skipped ({:.1}s)\n",
        summary.processed,
        summary.failed,
        summary.skipped,
        summary.duration_ms as f64 / 1000.0
    );
}
