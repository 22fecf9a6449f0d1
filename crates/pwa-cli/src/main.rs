//! `pwa-shell` - drive the notification queue and offline change log from a terminal

mod console;

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use console::{ConsolePresenter, PrintingReplayHandler};
use pwa_core::{
    FileStore, NotificationKind, NotificationRequest, PwaShell, ShellConfig, SyncReport,
    TokioClock,
};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("pwa-shell")
        .version(pwa_core::VERSION)
        .about("Notification queue and offline change log, on the command line")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("data-dir")
                .long("data-dir")
                .global(true)
                .default_value(".pwa-shell")
                .value_parser(value_parser!(PathBuf))
                .help("Directory holding the durable store"),
        )
        .subcommand(
            Command::new("record")
                .about("Append a change to the offline log")
                .arg(
                    Arg::new("payload")
                        .required(true)
                        .help("Change payload as JSON"),
                ),
        )
        .subcommand(
            Command::new("pending")
                .about("List changes waiting to be replayed")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("sync")
                .about("Replay pending changes in order")
                .arg(
                    Arg::new("fail-at")
                        .long("fail-at")
                        .value_parser(value_parser!(usize))
                        .help("Reject the change at this position (0-based)"),
                ),
        )
        .subcommand(
            Command::new("demo")
                .about("Push a burst of notifications through the queue")
                .arg(
                    Arg::new("count")
                        .long("count")
                        .default_value("8")
                        .value_parser(value_parser!(usize))
                        .help("Number of notifications to enqueue"),
                )
                .arg(
                    Arg::new("duration-ms")
                        .long("duration-ms")
                        .default_value("1500")
                        .value_parser(value_parser!(u64))
                        .help("Display time of each notification"),
                ),
        )
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(matches: &ArgMatches) -> Result<ShellConfig> {
    match matches.get_one::<PathBuf>("config") {
        Some(path) => ShellConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(ShellConfig::new()),
    }
}

fn open_shell(
    config: ShellConfig,
    data_dir: PathBuf,
    handler: Arc<PrintingReplayHandler>,
) -> Result<PwaShell<Value>> {
    let store = FileStore::open(&data_dir)
        .with_context(|| format!("opening store at {}", data_dir.display()))?;
    debug!(root = %store.root().display(), "store opened");
    let shell = PwaShell::new(
        config,
        Arc::new(ConsolePresenter),
        Arc::new(TokioClock::current()),
        Arc::new(store),
        handler,
    )?;
    Ok(shell)
}

fn record(shell: &PwaShell<Value>, text: &str) -> Result<usize> {
    let payload: Value = serde_json::from_str(text).context("payload is not valid JSON")?;
    let outcome = shell.record_change(payload);
    match outcome.warning() {
        Some(error) => println!(
            "Recorded change #{} (kept in memory only: {error})",
            outcome.position()
        ),
        None => println!("Recorded change #{}", outcome.position()),
    }
    Ok(outcome.position())
}

fn pending(shell: &PwaShell<Value>, json: bool) -> Result<()> {
    let records = shell.changes().records();
    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("No pending changes.");
        return Ok(());
    }
    println!("Pending changes ({}):", records.len());
    for (index, record) in records.iter().enumerate() {
        println!("  {index:>3}  {}  {}", record.timestamp.to_rfc3339(), record.payload);
    }
    Ok(())
}

async fn sync(shell: &PwaShell<Value>) -> Result<()> {
    match shell.sync_now().await? {
        SyncReport::NothingPending => println!("Nothing to sync."),
        SyncReport::AlreadyRunning => println!("A sync pass is already running."),
        SyncReport::Completed { replayed, warning } => {
            println!("Synced {replayed} change(s).");
            if let Some(error) = warning {
                println!("Log not cleared on disk yet: {error}");
            }
        }
    }
    Ok(())
}

/// Longest a demo may take to drain: every notification shown back to back
fn drain_budget(duration: Duration, grace: Duration, count: usize) -> Duration {
    const MAX_BUDGET: Duration = Duration::from_secs(24 * 60 * 60);
    u32::try_from(count.saturating_add(1))
        .ok()
        .and_then(|rounds| duration.saturating_add(grace).checked_mul(rounds))
        .map_or(MAX_BUDGET, |budget| budget.min(MAX_BUDGET))
}

async fn demo(shell: &PwaShell<Value>, count: usize, duration: Duration) -> Result<()> {
    const KINDS: [NotificationKind; 4] = [
        NotificationKind::Info,
        NotificationKind::Success,
        NotificationKind::Warning,
        NotificationKind::Error,
    ];

    let queue = shell.notifications();
    info!(count, max = queue.max_concurrent(), "starting notification demo");
    for index in 0..count {
        let kind = KINDS[index % KINDS.len()];
        shell.notify(NotificationRequest::new(
            format!("Notification {} of {count}", index + 1),
            kind,
            duration,
        ));
    }

    let grace = shell.config().notifications.dismiss_grace();
    let budget = drain_budget(duration, grace, count);
    tokio::time::timeout(budget, async {
        while !queue.is_idle() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .context("queue did not drain in time")?;

    let stats = queue.stats();
    println!(
        "Shown {} of {} (timer: {}, user: {}, cleared: {})",
        stats.displayed,
        stats.enqueued,
        stats.dismissed_by_timer,
        stats.dismissed_by_user,
        stats.dismissed_by_clear
    );
    if stats.displayed != stats.enqueued {
        bail!("queue lost {} notification(s)", stats.enqueued - stats.displayed);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let matches = cli().get_matches();
    let config = load_config(&matches)?;
    let data_dir = matches
        .get_one::<PathBuf>("data-dir")
        .cloned()
        .unwrap_or_else(|| PathBuf::from(".pwa-shell"));

    match matches.subcommand() {
        Some(("record", args)) => {
            let shell = open_shell(config, data_dir, Arc::default())?;
            let text = args
                .get_one::<String>("payload")
                .context("missing payload")?;
            record(&shell, text)?;
        }
        Some(("pending", args)) => {
            let shell = open_shell(config, data_dir, Arc::default())?;
            pending(&shell, args.get_flag("json"))?;
        }
        Some(("sync", args)) => {
            let fail_at = args.get_one::<usize>("fail-at").copied();
            let handler = Arc::new(PrintingReplayHandler::new(fail_at));
            let shell = open_shell(config, data_dir, Arc::clone(&handler))?;
            let result = sync(&shell).await;
            debug!(calls = handler.calls(), "replay handler invoked");
            result?;
        }
        Some(("demo", args)) => {
            let count = args.get_one::<usize>("count").copied().unwrap_or(8);
            let duration = Duration::from_millis(
                args.get_one::<u64>("duration-ms").copied().unwrap_or(1500),
            );
            let shell = open_shell(config, data_dir, Arc::default())?;
            demo(&shell, count, duration).await?;
        }
        _ => unreachable!("subcommand_required"),
    }
    Ok(())
}
