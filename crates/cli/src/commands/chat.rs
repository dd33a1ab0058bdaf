//! `lily chat`: Interactive or single-message chat mode.

use lily_agent::{
    MemoryAugmenter, SessionHandle, TurnError, TurnEvent, TurnOrchestrator, TurnOutcome, UserInput,
};
use lily_config::AppConfig;
use lily_core::message::ChatSession;
use lily_core::provider::ModelDescriptor;
use lily_core::session::SessionStore;
use lily_memory::{FileIndex, FileSessionStore};
use lily_providers::CloudClient;
use lily_telemetry::{FileUsageLog, UsageTracker};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

pub async fn run(
    message: Option<String>,
    model: Option<String>,
    session: Option<String>,
    rag_dir: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;

    // Check for API key early: give a clear error
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    LILY_API_KEY       = 'sk-...'");
        eprintln!("    OPENROUTER_API_KEY = 'sk-or-v1-...'");
        eprintln!();
        eprintln!("  Or add it to your config file under [cloud]:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let data_dir = config.data_dir();
    let sessions = Arc::new(FileSessionStore::open(FileSessionStore::default_path(
        &data_dir,
    )));
    let client = CloudClient::from_config(&config.cloud)?;

    let handle = match session {
        Some(id) => {
            let saved = sessions
                .get(&id)
                .await?
                .ok_or_else(|| format!("No chat with id '{id}'"))?;
            let model_id = model.unwrap_or_else(|| {
                if saved.model_id.is_empty() {
                    config.default_model.clone()
                } else {
                    saved.model_id.clone()
                }
            });
            SessionHandle::new(saved, ModelDescriptor::cloud(model_id))
        }
        None => {
            let model_id = model.unwrap_or_else(|| config.default_model.clone());
            let descriptor = ModelDescriptor::cloud(model_id.clone());
            // A one-off question does not create a saved chat.
            if message.is_some() {
                SessionHandle::ephemeral(descriptor)
            } else {
                SessionHandle::new(ChatSession::new(model_id), descriptor)
            }
        }
    };
    if let Some(dir) = rag_dir {
        handle.set_rag_dir(dir);
    }
    let documents = handle.snapshot().rag_dir;

    let mut orchestrator = TurnOrchestrator::new(
        sessions,
        Arc::new(lily_tools::default_gateway()),
    )
    .with_config(&config)
    .with_usage(UsageTracker::new(Arc::new(FileUsageLog::open(
        FileUsageLog::default_path(&data_dir),
    ))))
    .with_cloud(Arc::new(client.clone()));

    if config.memory.enabled {
        let index = Arc::new(FileIndex::open(FileIndex::default_path(&data_dir)));
        let embedder = Arc::new(client.embedder(config.memory.embedding_model.clone()));
        orchestrator =
            orchestrator.with_memory(MemoryAugmenter::from_config(index, embedder, &config.memory));
    }

    info!(
        session_id = %handle.id(),
        model = %handle.model().id(),
        ephemeral = handle.is_ephemeral(),
        rag_dir = documents.as_deref().unwrap_or("-"),
        memory = config.memory.enabled,
        "Chat ready"
    );

    if let Some(msg) = message {
        // Single message mode
        send_turn(&orchestrator, &handle, &msg).await?;
        return Ok(());
    }

    // Interactive mode
    let model_id = handle.model().id().to_string();
    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║          Lily Chat — Interactive Mode        ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Model:     {model_id}");
    println!("  Chat:      {}", handle.id());
    println!(
        "  Memory:    {}",
        if config.memory.enabled { "on" } else { "off" }
    );
    if let Some(dir) = &documents {
        println!("  Documents: {dir}");
    }
    println!(
        "  Tools:     {}",
        if config.tools.enabled { "on" } else { "off" }
    );
    println!();
    println!("  Type your message and press Enter.");
    println!("  /model <id> switches models. Ctrl+C stops a response.");
    println!("  Type 'exit' to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }
        if let Some(id) = line.strip_prefix("/model ") {
            match handle.set_model(ModelDescriptor::cloud(id.trim())) {
                Ok(()) => println!("  Switched to {}", id.trim()),
                Err(e) => eprintln!("  [Error] {e}"),
            }
            continue;
        }

        match send_turn(&orchestrator, &handle, line).await {
            // Already shown from the turn's error event.
            Ok(_) | Err(TurnError::Transport(_)) => {}
            Err(e) => eprintln!("  [Error] {e}"),
        }
        println!();
    }

    println!();
    println!("  Goodbye! 👋");
    println!();
    Ok(())
}

/// Run one turn, printing events as they arrive. Ctrl+C cancels the turn.
async fn send_turn(
    orchestrator: &TurnOrchestrator,
    handle: &SessionHandle,
    text: &str,
) -> Result<TurnOutcome, TurnError> {
    let mut events = handle.subscribe();
    let mut printer = EventPrinter::default();

    let send = orchestrator.send(handle, UserInput::text(text));
    tokio::pin!(send);

    let result = loop {
        tokio::select! {
            result = &mut send => break result,
            event = events.recv() => {
                if let Ok(event) = event {
                    printer.print(&event);
                }
            }
            _ = tokio::signal::ctrl_c() => handle.cancel(),
        }
    };
    while let Ok(event) = events.try_recv() {
        printer.print(&event);
    }

    if let Ok(outcome) = &result
        && !outcome.persisted()
        && !handle.is_ephemeral()
    {
        eprintln!("  [Warning] This chat could not be saved completely.");
    }
    result
}

/// Turns events into terminal output.
#[derive(Default)]
struct EventPrinter {
    /// Assistant text already written for the current model round.
    shown: String,
}

#[derive(Debug, Default, PartialEq)]
struct Rendered {
    out: String,
    err: String,
}

impl EventPrinter {
    fn print(&mut self, event: &TurnEvent) {
        let rendered = self.render(event);
        if !rendered.err.is_empty() {
            eprint!("{}", rendered.err);
        }
        if !rendered.out.is_empty() {
            print!("{}", rendered.out);
            let _ = std::io::stdout().flush();
        }
    }

    fn render(&mut self, event: &TurnEvent) -> Rendered {
        let mut r = Rendered::default();
        match event {
            TurnEvent::Delta { text } if text.is_empty() => {}
            TurnEvent::Delta { text } => {
                if self.shown.is_empty() {
                    r.out.push_str("  Assistant > ");
                }
                match text.strip_prefix(self.shown.as_str()) {
                    Some(fresh) => r.out.push_str(fresh),
                    None => {
                        r.out.push('\n');
                        r.out.push_str(text);
                    }
                }
                self.shown = text.clone();
            }
            TurnEvent::MemoryLog { line, .. } => {
                r.err = format!("  · {line}\n");
            }
            TurnEvent::ToolCall { call } => {
                self.end_line(&mut r);
                r.out.push_str(&format!("  🔧 {}\n", call.name));
            }
            TurnEvent::ToolResult { result, .. } => {
                let mark = if result.success { "↳" } else { "✗" };
                r.out
                    .push_str(&format!("     {mark} {}\n", super::truncate(&result.output, 100)));
            }
            TurnEvent::PersistFailed { reason } => {
                r.err = format!("  [Warning] Failed to save chat: {reason}\n");
            }
            TurnEvent::Error { message } => {
                self.end_line(&mut r);
                r.err = format!("  [Error] {message}\n");
            }
            TurnEvent::Finalized { .. } => self.end_line(&mut r),
            TurnEvent::Stopped => {
                self.end_line(&mut r);
                r.out.push_str("  (generation stopped)\n");
            }
            TurnEvent::MessageAppended { .. } => {}
        }
        r
    }

    fn end_line(&mut self, r: &mut Rendered) {
        if !self.shown.is_empty() {
            r.out.push('\n');
            self.shown.clear();
        }
    }
}
