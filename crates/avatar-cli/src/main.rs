use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use avatar_contracts::console::{parse_command, ConsoleCommand, CONSOLE_HELP_COMMANDS};
use avatar_contracts::events::EventWriter;
use avatar_contracts::notifications::{
    FanoutSink, Notification, NotificationSink, NotificationVariant,
};
use avatar_contracts::summary::{now_utc_iso, write_summary, SessionSummary};
use avatar_engine::{
    default_service_registry, AvatarService, AvatarSession, DisplayImage, DryrunAvatarService,
    GenerationOutcome, PendingGeneration, SelectedFile, ServiceConfig,
};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Map, Value};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "cute-avatar", version, about = "Turn a photo into a cute avatar")]
struct Cli {
    /// Log engine internals to stderr.
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one select → create → download cycle.
    Generate(GenerateArgs),
    /// Interactive console around a single avatar session.
    Session(SessionArgs),
}

#[derive(Debug, Args)]
struct ServiceArgs {
    /// Directory for downloads, events.jsonl and summary.json.
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    /// Avatar service to use (`http` or `dryrun`).
    #[arg(long, default_value = "http")]
    service: String,
    /// Overrides AVATAR_API_BASE.
    #[arg(long)]
    api_base: Option<String>,
    /// Overrides AVATAR_HTTP_TIMEOUT_SECS.
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Make the dryrun service behave like the mock backend (2 s, 10% failures).
    #[arg(long)]
    simulate_backend: bool,
}

#[derive(Debug, Args)]
struct GenerateArgs {
    #[arg(long)]
    file: PathBuf,
    #[arg(long)]
    no_download: bool,
    #[command(flatten)]
    service: ServiceArgs,
}

#[derive(Debug, Args)]
struct SessionArgs {
    #[command(flatten)]
    service: ServiceArgs,
}

const URL_DISPLAY_MAX_CHARS: usize = 72;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("cute-avatar error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn default_log_filter(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    format!("cute_avatar={level},avatar_engine={level},avatar_contracts={level}")
}

fn init_tracing(verbose: bool) {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_log_filter(verbose))),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Generate(args) => run_generate(args),
        Command::Session(args) => {
            run_session(args)?;
            Ok(0)
        }
    }
}

/// Prints notifications the way a toast would show them.
struct ConsoleSink;

impl NotificationSink for ConsoleSink {
    fn notify(&self, notification: &Notification) {
        println!("{}", format_notification(notification));
    }
}

fn format_notification(notification: &Notification) -> String {
    let marker = match notification.variant {
        NotificationVariant::Default => "[ok]",
        NotificationVariant::Destructive => "[!!]",
    };
    format!(
        "{marker} {}\n     {}",
        notification.title, notification.description
    )
}

/// Everything one CLI invocation shares: the session, its event log and the
/// bookkeeping for `summary.json`.
struct SessionContext {
    session: AvatarSession,
    events: EventWriter,
    session_id: String,
    started_at: String,
    out_dir: PathBuf,
    service_name: String,
}

impl SessionContext {
    fn open(args: &ServiceArgs) -> Result<Self> {
        std::fs::create_dir_all(&args.out)
            .with_context(|| format!("failed to create {}", args.out.display()))?;
        let session_id = format!("session-{}", uuid::Uuid::new_v4().simple());
        let events_path = args
            .events
            .clone()
            .unwrap_or_else(|| args.out.join("events.jsonl"));
        let events = EventWriter::new(events_path, session_id.clone());
        let service = resolve_service(args)?;
        let service_name = service.name().to_string();
        let notifier = FanoutSink::new()
            .with(Arc::new(ConsoleSink))
            .with(Arc::new(events.clone()));
        let session = AvatarSession::new(service, Arc::new(notifier));

        events.emit_json(
            "session_started",
            json!({
                "out_dir": args.out.to_string_lossy().to_string(),
                "service": service_name,
            }),
        )?;

        Ok(Self {
            session,
            events,
            session_id,
            started_at: now_utc_iso(),
            out_dir: args.out.clone(),
            service_name,
        })
    }

    fn select(&mut self, path: &Path) -> Result<()> {
        let file = SelectedFile::from_path(path)
            .with_context(|| format!("cannot use {}", path.display()))?;
        self.events.emit_json(
            "file_selected",
            json!({
                "file": file.name(),
                "mime_type": file.mime_type(),
                "bytes": file.size(),
            }),
        )?;
        self.session.select_file(file);
        Ok(())
    }

    fn record_started(&self, pending: &PendingGeneration) -> Result<()> {
        self.events.emit_json(
            "generation_started",
            json!({
                "ticket": pending.ticket(),
                "file": pending.file().name(),
            }),
        )?;
        Ok(())
    }

    fn record_finished(&self, ticket: u64, outcome: &GenerationOutcome) -> Result<()> {
        let payload = match outcome {
            GenerationOutcome::Succeeded { url } => json!({
                "ticket": ticket,
                "status": "succeeded",
                "avatar_url": truncate_for_display(url, URL_DISPLAY_MAX_CHARS),
                "generation_count": self.session.generation_count(),
            }),
            GenerationOutcome::Failed { message } => json!({
                "ticket": ticket,
                "status": "failed",
                "error": message,
            }),
            GenerationOutcome::Ignored => json!({
                "ticket": ticket,
                "status": "ignored",
            }),
        };
        self.events
            .emit_json("generation_finished", payload)?;
        Ok(())
    }

    fn download(&mut self, dir: &Path) -> Result<Option<PathBuf>> {
        let Some(saved) = self.session.download(dir) else {
            return Ok(None);
        };
        match saved {
            Ok(path) => {
                self.events.emit_json(
                    "download_finished",
                    json!({
                        "status": "saved",
                        "path": path.to_string_lossy().to_string(),
                    }),
                )?;
                Ok(Some(path))
            }
            Err(err) => {
                self.events.emit_json(
                    "download_finished",
                    json!({
                        "status": "failed",
                        "error": err.to_string(),
                    }),
                )?;
                Ok(None)
            }
        }
    }

    fn finish(self) -> Result<SessionSummary> {
        let last_avatar_url = self
            .session
            .generated_url()
            .map(|url| truncate_for_display(url, URL_DISPLAY_MAX_CHARS));
        let (stats, handles) = self.session.teardown();
        let summary = SessionSummary {
            session_id: self.session_id,
            started_at: self.started_at,
            finished_at: now_utc_iso(),
            total_generations: stats.generations,
            total_failures: stats.failures,
            total_downloads: stats.downloads,
            last_avatar_url,
        };
        let mut extra = Map::new();
        extra.insert("service".to_string(), Value::String(self.service_name));
        extra.insert("object_urls_created".to_string(), json!(handles.created));
        extra.insert("object_urls_released".to_string(), json!(handles.released));
        write_summary(&self.out_dir.join("summary.json"), &summary, Some(&extra))?;
        self.events
            .emit_json("session_finished", json!({ "summary": summary }))?;
        Ok(summary)
    }
}

fn service_config(args: &ServiceArgs) -> ServiceConfig {
    let mut config = ServiceConfig::from_env();
    if let Some(api_base) = args.api_base.as_deref() {
        config = config.with_api_base(api_base);
    }
    if let Some(secs) = args.timeout_secs.filter(|secs| *secs > 0) {
        config = config.with_timeout(Duration::from_secs(secs));
    }
    config
}

fn resolve_service(args: &ServiceArgs) -> Result<Arc<dyn AvatarService>> {
    let config = service_config(args);
    let mut registry = default_service_registry(&config)?;
    if args.simulate_backend {
        registry.register(DryrunAvatarService::simulated_backend());
    }
    registry.get(args.service.trim()).ok_or_else(|| {
        anyhow!(
            "unknown service '{}' (available: {})",
            args.service,
            registry.names().join(", ")
        )
    })
}

fn run_generate(args: GenerateArgs) -> Result<i32> {
    let mut ctx = SessionContext::open(&args.service)?;
    ctx.select(&args.file)?;
    print_status(&ctx.session);

    let Some(pending) = ctx.session.begin_submit() else {
        return Err(anyhow!("nothing to submit"));
    };
    ctx.record_started(&pending)?;
    println!("{}", ctx.session.submit_label());
    let ticket = pending.ticket();
    let result = pending.execute(ctx.session.service().as_ref());
    let outcome = ctx.session.complete_submit(pending, result);
    ctx.record_finished(ticket, &outcome)?;

    let succeeded = matches!(outcome, GenerationOutcome::Succeeded { .. });
    if succeeded && !args.no_download {
        let out_dir = ctx.out_dir.clone();
        if let Some(path) = ctx.download(&out_dir)? {
            println!("Saved {}", path.display());
        }
    }
    print_status(&ctx.session);
    ctx.finish()?;
    Ok(if succeeded { 0 } else { 1 })
}

type Completion = (PendingGeneration, avatar_engine::Result<String>);

fn run_session(args: SessionArgs) -> Result<()> {
    let mut ctx = SessionContext::open(&args.service)?;
    let (tx, rx): (Sender<Completion>, Receiver<Completion>) = mpsc::channel();
    let stdin = io::stdin();
    let mut line = String::new();

    println!("Cute avatar session started. Type /help for commands.");
    print_status(&ctx.session);

    loop {
        drain_completions(&mut ctx, &rx)?;
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }
        drain_completions(&mut ctx, &rx)?;

        match parse_command(line.trim_end_matches(['\n', '\r'])) {
            ConsoleCommand::Noop => {}
            ConsoleCommand::Help => {
                println!("Commands: {}", CONSOLE_HELP_COMMANDS.join(" "));
                println!("Any other line is treated as a path to select.");
            }
            ConsoleCommand::Select { path } => {
                if path.is_empty() {
                    println!("/select requires a path");
                    continue;
                }
                match ctx.select(Path::new(&path)) {
                    Ok(()) => print_status(&ctx.session),
                    Err(err) => println!("{err:#}"),
                }
            }
            ConsoleCommand::Submit => match ctx.session.begin_submit() {
                Some(pending) => {
                    ctx.record_started(&pending)?;
                    spawn_generation(ctx.session.service(), pending, tx.clone());
                    println!("{}", ctx.session.submit_label());
                }
                None if ctx.session.is_processing() => {
                    println!("Still creating the last avatar. Use /wait.");
                }
                None => println!("Pick a photo first."),
            },
            ConsoleCommand::Wait => {
                if ctx.session.is_processing() {
                    wait_for_completion(&mut ctx, &rx)?;
                } else {
                    println!("Nothing in flight.");
                }
            }
            ConsoleCommand::Download { dir } => {
                let dir = dir.map(PathBuf::from).unwrap_or_else(|| ctx.out_dir.clone());
                if !ctx.session.download_available() {
                    println!("Nothing to download yet.");
                } else if let Some(path) = ctx.download(&dir)? {
                    println!("Saved {}", path.display());
                }
            }
            ConsoleCommand::Status => print_status(&ctx.session),
            ConsoleCommand::Quit => break,
            ConsoleCommand::Unknown { command, .. } => {
                println!("Unknown command: /{command}. Type /help.");
            }
        }
    }

    if ctx.session.is_processing() {
        println!("Waiting for the outstanding request to finish...");
        wait_for_completion(&mut ctx, &rx)?;
    }
    let summary = ctx.finish()?;
    println!(
        "Session finished: {} generated, {} failed, {} downloaded.",
        summary.total_generations, summary.total_failures, summary.total_downloads
    );
    Ok(())
}

fn spawn_generation(
    service: Arc<dyn AvatarService>,
    pending: PendingGeneration,
    tx: Sender<Completion>,
) {
    thread::spawn(move || {
        let result = pending.execute(service.as_ref());
        if tx.send((pending, result)).is_err() {
            tracing::warn!("session closed before the generation finished");
        }
    });
}

fn apply_completion(ctx: &mut SessionContext, completion: Completion) -> Result<()> {
    let (pending, result) = completion;
    let ticket = pending.ticket();
    let outcome = ctx.session.complete_submit(pending, result);
    ctx.record_finished(ticket, &outcome)?;
    print_status(&ctx.session);
    Ok(())
}

fn drain_completions(ctx: &mut SessionContext, rx: &Receiver<Completion>) -> Result<()> {
    while let Ok(completion) = rx.try_recv() {
        apply_completion(ctx, completion)?;
    }
    Ok(())
}

fn wait_for_completion(ctx: &mut SessionContext, rx: &Receiver<Completion>) -> Result<()> {
    let completion = rx
        .recv()
        .map_err(|_| anyhow!("generation worker disconnected"))?;
    apply_completion(ctx, completion)
}

fn print_status(session: &AvatarSession) {
    for line in describe_session(session) {
        println!("{line}");
    }
}

fn describe_session(session: &AvatarSession) -> Vec<String> {
    let display = session.display();
    let image = match &display.image {
        DisplayImage::Empty => "nothing to show".to_string(),
        DisplayImage::Preview { url } => format!("preview {url}"),
        DisplayImage::Generated { url } => {
            format!(
                "avatar {}",
                truncate_for_display(url, URL_DISPLAY_MAX_CHARS)
            )
        }
    };
    let mut lines = vec![
        format!("  photo:   {}", session.file_label()),
        format!(
            "  showing: {image}{}",
            if display.busy { " (working...)" } else { "" }
        ),
    ];
    let action = if session.can_submit() {
        format!("  next:    /create ({})", session.submit_label())
    } else {
        format!("  next:    {}", session.submit_label())
    };
    lines.push(action);
    if session.download_available() {
        lines.push(format!(
            "  save:    /download -> cute-avatar-{}.png",
            session.generation_count()
        ));
    }
    lines
}

fn truncate_for_display(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;

    use avatar_contracts::notifications::{Notification, RecordingSink};
    use avatar_engine::{AvatarSession, DryrunAvatarService, SelectedFile};
    use clap::Parser;
    use serde_json::Value;

    use std::time::Duration;

    use super::{
        default_log_filter, describe_session, format_notification, run_generate,
        service_config, truncate_for_display, Cli, Command,
    };

    #[test]
    fn parses_generate_arguments() {
        let cli = Cli::parse_from([
            "cute-avatar",
            "generate",
            "--file",
            "me.png",
            "--out",
            "/tmp/out",
            "--service",
            "dryrun",
            "--no-download",
        ]);
        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(args.file.to_string_lossy(), "me.png");
        assert!(args.no_download);
        assert_eq!(args.service.service, "dryrun");
        assert!(args.service.api_base.is_none());
    }

    #[test]
    fn service_flags_override_environment_config() {
        let cli = Cli::parse_from([
            "cute-avatar",
            "session",
            "--out",
            "/tmp/out",
            "--api-base",
            "https://avatars.example.com/",
            "--timeout-secs",
            "5",
        ]);
        let Command::Session(args) = cli.command else {
            panic!("expected session");
        };
        let config = service_config(&args.service);
        assert_eq!(config.endpoint(), "https://avatars.example.com/generate-avatar");
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn engine_info_lines_show_by_default() {
        assert!(default_log_filter(false).contains("avatar_engine=info"));
        assert!(default_log_filter(true).contains("avatar_engine=debug"));
    }

    #[test]
    fn session_requires_out_dir() {
        assert!(Cli::try_parse_from(["cute-avatar", "session"]).is_err());
        assert!(Cli::try_parse_from(["cute-avatar", "session", "--out", "x", "--verbose"]).is_ok());
    }

    #[test]
    fn notification_format_marks_errors() {
        let text = format_notification(&Notification::generation_failed("bad image"));
        assert!(text.starts_with("[!!] Uh-oh!"));
        assert!(text.ends_with("bad image"));
    }

    #[test]
    fn describe_session_tracks_cycle() -> anyhow::Result<()> {
        let mut session = AvatarSession::new(
            Arc::new(DryrunAvatarService::new().with_size(4)),
            Arc::new(RecordingSink::new()),
        );
        let lines = describe_session(&session);
        assert_eq!(lines[0], "  photo:   No file selected");
        assert_eq!(lines[1], "  showing: nothing to show");

        session.select_file(SelectedFile::from_bytes(
            "me.png",
            "image/png",
            b"me".to_vec(),
        )?);
        let lines = describe_session(&session);
        assert!(lines[1].starts_with("  showing: preview blob:cute-avatar/"));
        assert_eq!(lines[2], "  next:    /create (Create Cute Avatar)");

        session.submit();
        let lines = describe_session(&session);
        assert!(lines[1].starts_with("  showing: avatar data:image/png;base64,"));
        assert_eq!(lines[2], "  next:    /create (Create Another!)");
        assert_eq!(lines[3], "  save:    /download -> cute-avatar-1.png");
        Ok(())
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_for_display("ééééé", 3), "ééé…");
        assert_eq!(truncate_for_display("abc", 3), "abc");
    }

    #[test]
    fn generate_with_dryrun_writes_avatar_events_and_summary() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let photo = temp.path().join("me.png");
        fs::write(&photo, b"selfie")?;
        let out = temp.path().join("out");
        let photo_arg = photo.to_string_lossy().to_string();
        let out_arg = out.to_string_lossy().to_string();

        let cli = Cli::parse_from([
            "cute-avatar",
            "generate",
            "--file",
            photo_arg.as_str(),
            "--out",
            out_arg.as_str(),
            "--service",
            "dryrun",
        ]);
        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(run_generate(args)?, 0);

        let avatar = fs::read(out.join("cute-avatar-1.png"))?;
        assert!(avatar.starts_with(&[0x89, 0x50, 0x4E, 0x47]));

        let summary: Value = serde_json::from_str(&fs::read_to_string(out.join("summary.json"))?)?;
        assert_eq!(summary["total_generations"], 1);
        assert_eq!(summary["total_downloads"], 1);
        assert_eq!(summary["service"], "dryrun");
        assert_eq!(summary["object_urls_created"], summary["object_urls_released"]);

        let types: Vec<String> = fs::read_to_string(out.join("events.jsonl"))?
            .lines()
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .filter_map(|row| row.get("type").and_then(Value::as_str).map(str::to_string))
            .collect();
        assert_eq!(
            types,
            vec![
                "session_started",
                "file_selected",
                "generation_started",
                "notification",
                "generation_finished",
                "notification",
                "download_finished",
                "session_finished",
            ]
        );
        Ok(())
    }

    #[test]
    fn generate_rejects_unknown_service() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let out_arg = temp.path().to_string_lossy().to_string();
        let cli = Cli::parse_from([
            "cute-avatar",
            "generate",
            "--file",
            "me.png",
            "--out",
            out_arg.as_str(),
            "--service",
            "nope",
        ]);
        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        let err = run_generate(args).err().map(|err| err.to_string());
        assert!(err.unwrap_or_default().contains("unknown service 'nope'"));
        Ok(())
    }
}
