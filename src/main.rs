use std::collections::HashMap;
use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use anyhow::{bail, Context};
use clap::Parser;
use crossterm::{cursor, execute, style::Print, terminal};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;
use upflow::utils::{format_bytes, format_duration};
use upflow::{
    Config, FileId, FileMeta, FileRegistry, MockTransport, SessionSummary, ThumbnailGenerator,
    UploadEvent, UploadFile, UploadManager, UploadSession, UploadStatus,
};

/// Upload files through the mock transport and report progress.
#[derive(Parser, Debug)]
#[command(name = "upflow", version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print a JSON report instead of the live progress line
    #[arg(long)]
    json: bool,

    /// Inject a transport failure at this percentage
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    fail_at: Option<u8>,

    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[derive(Serialize)]
struct Report<'a> {
    session: &'a UploadSession,
    files: Vec<UploadFile>,
    summary: SessionSummary,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_config(path)
            .with_context(|| format!("Can't load {}", path.display()))?,
        None => Config::default(),
    };
    if args.fail_at.is_some() {
        config.transport.fail_at = args.fail_at;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let transport = MockTransport::new(&config.transport)?;
    let registry = FileRegistry::new(ThumbnailGenerator::new(&config.thumbnail));
    let manager = Arc::new(UploadManager::new(registry, Arc::new(transport)));

    let mut session = manager.create_session();
    let mut names = HashMap::new();
    for path in &args.files {
        let content = tokio::fs::read(path)
            .await
            .with_context(|| format!("Can't read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let mime_type = infer::get(&content)
            .map(|kind| kind.mime_type())
            .unwrap_or("application/octet-stream");

        let file = manager
            .create_file(FileMeta::new(name.clone(), content.len() as u64, mime_type), content)
            .await?;
        session.attach(file.id);
        names.insert(file.id, name);
    }

    let started = Instant::now();
    let live = !args.json && std::io::stdout().is_terminal();
    let renderer = live.then(|| tokio::spawn(render(manager.subscribe(), names)));

    let uploads = session
        .file_ids
        .iter()
        .map(|id| manager.spawn_upload(*id, |_| {}));
    let results = join_all(uploads).await;

    if let Some(renderer) = renderer {
        renderer.abort();
        println!();
    }
    session.close();

    let summary = manager.summarize_session(&session);
    if args.json {
        let files = manager
            .get_all()
            .into_iter()
            .filter(|file| session.file_ids.contains(&file.id))
            .collect();
        let report = Report { session: &session, files, summary: summary.clone() };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for file in manager.get_all() {
            match file.status {
                UploadStatus::Completed => println!(
                    "  done    {} ({}) -> {}",
                    file.name,
                    format_bytes(file.size),
                    file.remote_url.as_deref().unwrap_or_default()
                ),
                status => println!(
                    "  {:<7} {} at {}%: {}",
                    status.as_str(),
                    file.name,
                    file.progress,
                    file.error.as_deref().unwrap_or("-")
                ),
            }
        }
        println!(
            "{} files, {}, {}% complete in {}",
            summary.count,
            summary.total_size(),
            summary.percent_complete(),
            format_duration(started.elapsed())
        );
    }

    let failed = results
        .into_iter()
        .filter(|result| !matches!(result, Ok(Ok(_))))
        .count();
    if failed > 0 {
        bail!("{} of {} uploads failed", failed, summary.count);
    }

    Ok(())
}

/// Redraw one status line with every file's progress.
async fn render(mut events: broadcast::Receiver<UploadEvent>, names: HashMap<FileId, String>) {
    let mut progress: HashMap<FileId, u8> = names.keys().map(|id| (*id, 0)).collect();
    let mut order: Vec<_> = names.keys().copied().collect();
    order.sort_by(|a, b| names[a].cmp(&names[b]));

    loop {
        match events.recv().await {
            Ok(UploadEvent::Progress { file_id, progress: value }) => {
                progress.insert(file_id, value);
            }
            Ok(_) => continue,
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        }

        let line = order
            .iter()
            .map(|id| format!("{} {:>3}%", names[id], progress.get(id).copied().unwrap_or(0)))
            .collect::<Vec<_>>()
            .join(" | ");

        let mut stdout = std::io::stdout();
        let _ = execute!(
            stdout,
            cursor::MoveToColumn(0),
            terminal::Clear(terminal::ClearType::CurrentLine),
            Print(line)
        );
        let _ = stdout.flush();
    }
}
