//! CLI entry point for `mailmerge`.

use std::path::{Path, PathBuf};
use std::sync::mpsc;

use clap::{Args, CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use mailmerge::config::{self, Config, TransportKind};
use mailmerge::dispatch::{
    self, Controller, EventSink, Job, LogLevel, MergeEvent, RunOutcome, RunPlan,
};
use mailmerge::model::outcome::{ControlColumn, RowOutcome};
use mailmerge::model::row::{find_column_by_aliases, pad_row, VisibleHeaders, FIRST_DATA_ROW};
use mailmerge::policy::attachments::scan_empty_flags;
use mailmerge::policy::recipients::resolve_recipients;
use mailmerge::policy::{AttachmentMode, EmptyCellDefault, RecipientMode};
use mailmerge::store::{CheckpointStore, CsvRowStore, CsvSource, RowStore};
use mailmerge::template::html::html_to_text;
use mailmerge::template::{EmlDrafts, Placeholders, TemplateSource};
use mailmerge::transport::{OutboxTransport, SmtpSender, Transport};

/// Recipients listed by `check` before truncating.
const EMPTY_FLAG_LIMIT: usize = 50;

#[derive(Parser)]
#[command(
    name = "mailmerge",
    version,
    about = "Send a personalized copy of a draft to every row of a recipient list"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Send the draft to every row, starting from the first
    Send {
        #[command(flatten)]
        target: Target,
        #[command(flatten)]
        overrides: Overrides,
    },
    /// Continue a stopped run from its checkpoint, with the settings it was
    /// started with
    Resume {
        #[command(flatten)]
        target: Target,
        #[command(flatten)]
        overrides: Overrides,
    },
    /// Show what one row would receive
    Preview {
        #[command(flatten)]
        target: Target,
        /// Row number in the list (2 = first data row)
        #[arg(long, default_value_t = FIRST_DATA_ROW)]
        row: usize,
        #[command(flatten)]
        overrides: Overrides,
    },
    /// List recipients whose attachment cell is empty
    Check {
        #[command(flatten)]
        list: ListArg,
    },
    /// Show the checkpoint and outcome counts recorded in the list
    Status {
        #[command(flatten)]
        list: ListArg,
        #[arg(long)]
        json: bool,
    },
    /// List available drafts
    Drafts {
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration and where it is read from
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        save: bool,
        #[command(flatten)]
        overrides: Overrides,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

#[derive(Args)]
struct ListArg {
    /// Recipient list (CSV with a header row)
    #[arg(short, long, value_name = "FILE")]
    rows: PathBuf,
}

#[derive(Args)]
struct Target {
    #[command(flatten)]
    list: ListArg,

    /// Draft id (file stem in the drafts directory) or path to an .eml file
    #[arg(short, long, value_name = "ID")]
    draft: String,
}

/// Per-invocation overrides of configuration values.
#[derive(Args)]
struct Overrides {
    /// Sender address
    #[arg(long, value_name = "EMAIL", env = "MAILMERGE_FROM")]
    from: Option<String>,
    /// Sender display name
    #[arg(long, value_name = "NAME")]
    from_name: Option<String>,
    #[arg(long, value_enum)]
    cc_mode: Option<RecipientMode>,
    /// CC addresses for global mode, separated by commas or newlines
    #[arg(long, value_name = "LIST")]
    global_cc: Option<String>,
    #[arg(long, value_enum)]
    bcc_mode: Option<RecipientMode>,
    /// BCC addresses for global mode, separated by commas or newlines
    #[arg(long, value_name = "LIST")]
    global_bcc: Option<String>,
    #[arg(long, value_enum)]
    attachment_mode: Option<AttachmentMode>,
    /// In conditional mode, what an empty attachment cell means
    #[arg(long, value_enum)]
    empty_cell: Option<EmptyCellDefault>,
    #[arg(long, value_enum)]
    transport: Option<TransportKind>,
    /// Directory for the outbox transport
    #[arg(long, value_name = "DIR")]
    outbox: Option<PathBuf>,
    /// Directory holding .eml drafts
    #[arg(long, value_name = "DIR")]
    drafts_dir: Option<PathBuf>,
    /// CSV field separator
    #[arg(long)]
    delimiter: Option<char>,
}

impl Overrides {
    fn apply(&self, config: &mut Config) {
        if let Some(ref v) = self.from {
            config.sender.email = v.clone();
        }
        if let Some(ref v) = self.from_name {
            config.sender.display_name = v.clone();
        }
        if let Some(v) = self.cc_mode {
            config.recipients.cc_mode = v;
        }
        if let Some(ref v) = self.global_cc {
            config.recipients.global_cc = v.clone();
        }
        if let Some(v) = self.bcc_mode {
            config.recipients.bcc_mode = v;
        }
        if let Some(ref v) = self.global_bcc {
            config.recipients.global_bcc = v.clone();
        }
        if let Some(v) = self.attachment_mode {
            config.attachments.mode = v;
        }
        if let Some(v) = self.empty_cell {
            config.attachments.empty_cell_default = v;
        }
        if let Some(v) = self.transport {
            config.transport.kind = v;
        }
        if let Some(ref v) = self.outbox {
            config.transport.outbox_dir = Some(v.clone());
        }
        if let Some(ref v) = self.drafts_dir {
            config.drafts.dir = Some(v.clone());
        }
        if let Some(v) = self.delimiter {
            config.csv.delimiter = v;
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = config::load_config();

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.clone(),
        1 => "info".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    setup_logging(&log_level, &config);

    match cli.command {
        Commands::Send { target, overrides } => {
            overrides.apply(&mut config);
            cmd_run(&config, &target, false)
        }
        Commands::Resume { target, overrides } => {
            restore_stopped_settings(&mut config, &target.list.rows)?;
            overrides.apply(&mut config);
            cmd_run(&config, &target, true)
        }
        Commands::Preview {
            target,
            row,
            overrides,
        } => {
            overrides.apply(&mut config);
            cmd_preview(&config, &target, row)
        }
        Commands::Check { list } => cmd_check(&config, &list.rows),
        Commands::Status { list, json } => cmd_status(&config, &list.rows, json),
        Commands::Drafts { json } => cmd_drafts(&config, json),
        Commands::Config { save, overrides } => {
            overrides.apply(&mut config);
            cmd_config(&config, save)
        }
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mailmerge.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

fn ensure_exists(path: &Path) -> anyhow::Result<()> {
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    Ok(())
}

fn checkpoint_for(config: &Config, rows: &Path) -> CheckpointStore {
    CheckpointStore::for_rows(rows, &config::cache_dir(config))
}

/// Reuse the sender, CC/BCC and attachment settings saved when the run
/// stopped.
fn restore_stopped_settings(config: &mut Config, rows: &Path) -> anyhow::Result<()> {
    let saved = checkpoint_for(config, rows).load()?.and_then(|c| c.settings);
    if let Some(settings) = saved {
        tracing::info!(?settings, "Restoring settings of the stopped run");
        println!("  Reusing the sender, CC/BCC and attachment settings of the stopped run.");
        config.restore_run_settings(&settings);
    }
    Ok(())
}

fn open_list(config: &Config, rows: &Path) -> anyhow::Result<CsvRowStore> {
    ensure_exists(rows)?;
    Ok(CsvRowStore::open(rows, config.csv_delimiter()?)?)
}

fn build_transport(config: &Config) -> anyhow::Result<Box<dyn Transport>> {
    Ok(match config.transport.kind {
        TransportKind::Outbox => {
            let dir = config::outbox_dir(config);
            println!("  Writing messages to {}", dir.display());
            Box::new(OutboxTransport::new(dir)?)
        }
        TransportKind::Smtp => Box::new(SmtpSender::new(&config.smtp_config()?)?),
    })
}

/// Send or resume a run, rendering its events until it ends.
fn cmd_run(config: &Config, target: &Target, resume: bool) -> anyhow::Result<()> {
    let rows = &target.list.rows;
    ensure_exists(rows)?;

    let settings = config.run_settings();
    if settings.sender.email.trim().is_empty() {
        anyhow::bail!("No sender address: set [sender] email in the config or pass --from");
    }

    let checkpoint = checkpoint_for(config, rows);
    let plan = if resume {
        let existing = checkpoint.load()?;
        if existing.is_none() {
            println!("  No checkpoint found. Starting from the beginning.");
        }
        RunPlan::resume(target.draft.clone(), &checkpoint)?
    } else {
        if checkpoint.load()?.is_some() {
            tracing::warn!("A checkpoint exists for this list; `send` starts over from the first row");
        }
        RunPlan::fresh(target.draft.clone())
    };

    let job = Job {
        templates: Box::new(EmlDrafts::new(config::drafts_dir(config))),
        rows: Box::new(CsvSource::new(rows, config.csv_delimiter()?)),
        transport: build_transport(config)?,
        checkpoint,
        plan,
    };

    let (tx, rx) = mpsc::channel();
    let controller = Controller::new(settings).with_events(EventSink::new(tx));

    let token = controller.cancel_token();
    ctrlc::set_handler(move || token.cancel())
        .map_err(|e| anyhow::anyhow!("Could not install Ctrl-C handler: {e}"))?;

    let handle = dispatch::spawn(controller, job)?;

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Sending [{bar:40.cyan/blue}] {pos}% {msg}")
            .expect("valid template")
            .progress_chars("#>-"),
    );

    // The channel closes when the worker drops the controller.
    for event in rx {
        match event {
            MergeEvent::Log { level, message } => {
                let tag = match level {
                    LogLevel::Info => "  ",
                    LogLevel::Success => "✓ ",
                    LogLevel::Warning => "! ",
                    LogLevel::Error => "✗ ",
                };
                pb.println(format!("{tag}{message}"));
            }
            MergeEvent::Progress(percent) => pb.set_position(u64::from(percent)),
            MergeEvent::Row { index, status, .. } => {
                pb.set_message(format!("row {index}: {}", status.label()));
            }
            MergeEvent::Fatal(message) => pb.println(format!("✗ {message}")),
            MergeEvent::State(_) | MergeEvent::Stopped { .. } | MergeEvent::Finished { .. } => {}
        }
    }

    let outcome = handle.join();
    pb.finish_and_clear();

    println!();
    match outcome {
        RunOutcome::Completed { sent, failed } => {
            println!("  Run complete:");
            println!("  {:<12} {sent}", "Sent");
            println!("  {:<12} {failed}", "Failed");
        }
        RunOutcome::Stopped {
            sent,
            failed,
            pending,
            resume_row,
        } => {
            println!("  Run stopped at row {resume_row}:");
            println!("  {:<12} {sent}", "Sent");
            println!("  {:<12} {failed}", "Failed");
            println!("  {:<12} {pending}", "Pending");
            println!();
            println!("  Continue with: mailmerge resume --rows {} --draft {}", rows.display(), target.draft);
            println!("  The resumed run reuses this run's sender, CC/BCC and attachment settings.");
        }
        RunOutcome::Failed { message } => {
            anyhow::bail!("Run failed: {message}");
        }
    }
    println!();
    Ok(())
}

/// Print the envelope, subject and body one row would receive.
fn cmd_preview(config: &Config, target: &Target, row: usize) -> anyhow::Result<()> {
    use humansize::{format_size, BINARY};

    let store = open_list(config, &target.list.rows)?;
    let template = EmlDrafts::new(config::drafts_dir(config)).fetch(&target.draft)?;

    let Some(cells) = store.row(row) else {
        anyhow::bail!(
            "Row {row} is outside the list (rows {FIRST_DATA_ROW}..={})",
            store.last_row()
        );
    };
    let headers = store.headers();
    let mut values = cells.to_vec();
    pad_row(&mut values, headers.len());

    let visible = VisibleHeaders::from_headers(headers);
    let placeholders = Placeholders::compile(&visible.names)?;
    let projected = visible.project(&values);
    let subject = placeholders.resolve_tag_stripped(&template.subject, &projected);
    let body = placeholders.resolve_tag_stripped(&template.body, &projected);

    let settings = config.run_settings();
    let envelope = resolve_recipients(&values, headers, &settings.recipients);
    let decision = settings
        .attachments
        .evaluate(settings.attachments.locate(headers), &values)?;

    let none = "(none)";
    println!();
    println!("  {:<12} {row}", "Row");
    println!(
        "  {:<12} {}",
        "To",
        if envelope.has_recipient() { envelope.to.as_str() } else { "(no recipient, row is skipped)" }
    );
    println!("  {:<12} {}", "Cc", if envelope.cc.is_empty() { none } else { envelope.cc.as_str() });
    println!("  {:<12} {}", "Bcc", if envelope.bcc.is_empty() { none } else { envelope.bcc.as_str() });
    println!("  {:<12} {subject}", "Subject");

    if template.has_attachments() {
        let label = RowOutcome::sent(true, decision.include);
        println!(
            "  {:<12} {} ({}, {})",
            "Attachments",
            label,
            decision.reason,
            format_size(template.attachments_size(), BINARY)
        );
        for attachment in &template.attachments {
            let kind = if attachment.is_inline() { "inline" } else { "file" };
            println!(
                "    {:<6} {:<30} {:>10}",
                kind,
                attachment.filename,
                format_size(attachment.bytes.len() as u64, BINARY)
            );
        }
    }

    println!();
    for line in html_to_text(&body).lines() {
        println!("  {line}");
    }
    println!();
    Ok(())
}

/// List recipients whose attachment cell is empty.
fn cmd_check(config: &Config, rows: &Path) -> anyhow::Result<()> {
    let store = open_list(config, rows)?;
    let data = (FIRST_DATA_ROW..=store.last_row()).filter_map(|idx| store.row(idx).map(|r| (idx, r)));

    println!();
    match scan_empty_flags(store.headers(), data, EMPTY_FLAG_LIMIT) {
        None => {
            println!("  No attachment column found.");
            println!("  In conditional mode nobody will receive attachments.");
        }
        Some(empty) if empty.is_empty() => {
            println!("  Every recipient has an attachment value.");
        }
        Some(empty) => {
            println!("  {} recipient(s) with an empty attachment cell:", empty.len());
            println!();
            println!("  {:<6} {:<30} {}", "Row", "Name", "Email");
            println!("  {}", "-".repeat(70));
            for e in &empty {
                let name: String = e.name.chars().take(29).collect();
                println!("  {:<6} {:<30} {}", e.row, name, e.email);
            }
            if empty.len() >= EMPTY_FLAG_LIMIT {
                println!("  ... (showing the first {EMPTY_FLAG_LIMIT})");
            }
        }
    }
    println!();
    Ok(())
}

#[derive(Debug, Default, serde::Serialize)]
struct Tally {
    sent: usize,
    sent_with_attachment: usize,
    sent_without_attachment: usize,
    errors: usize,
    stopped: usize,
    resumed: usize,
}

/// Count outcomes recorded in the control columns, across every run so far.
fn tally(store: &dyn RowStore) -> Tally {
    let headers = store.headers();
    let column = |c: ControlColumn| find_column_by_aliases(headers, c.aliases());
    let cols: Vec<usize> = ControlColumn::ALL.iter().filter_map(|&c| column(c)).collect();

    let mut tally = Tally::default();
    for idx in FIRST_DATA_ROW..=store.last_row() {
        let Some(row) = store.row(idx) else { continue };
        for &col in &cols {
            let Some(value) = row.get(col).and_then(|c| c.as_deref()) else {
                continue;
            };
            match RowOutcome::parse(value) {
                Some(RowOutcome::Sent) => tally.sent += 1,
                Some(RowOutcome::SentWithAttachment) => tally.sent_with_attachment += 1,
                Some(RowOutcome::SentWithoutAttachment) => tally.sent_without_attachment += 1,
                Some(RowOutcome::Error(_)) => tally.errors += 1,
                Some(RowOutcome::Stopped) => tally.stopped += 1,
                Some(RowOutcome::Resumed) => tally.resumed += 1,
                None => {}
            }
        }
    }
    tally
}

fn cmd_status(config: &Config, rows: &Path, json: bool) -> anyhow::Result<()> {
    let store = open_list(config, rows)?;
    let checkpoint = checkpoint_for(config, rows).load()?;
    let tally = tally(&store);
    let recipients = mailmerge::store::count_recipients(&store);

    if json {
        let output = serde_json::json!({
            "file": rows.to_string_lossy(),
            "recipients": recipients,
            "checkpoint": checkpoint,
            "outcomes": tally,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!();
    println!("  {:<26} {}", "File", rows.display());
    println!("  {:<26} {}", "Recipients", recipients);
    match checkpoint {
        Some(cp) => {
            let saved = cp
                .saved_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "unknown time".to_string());
            println!("  {:<26} row {} (saved {saved})", "Checkpoint", cp.last_row_index);
        }
        None => println!("  {:<26} none", "Checkpoint"),
    }
    println!("  {:<26} {}", "Sent", tally.sent);
    println!("  {:<26} {}", "Sent with Attachment", tally.sent_with_attachment);
    println!("  {:<26} {}", "Sent without Attachment", tally.sent_without_attachment);
    println!("  {:<26} {}", "Errors", tally.errors);
    println!("  {:<26} {}", "Stopped", tally.stopped);
    println!("  {:<26} {}", "Resumed", tally.resumed);
    println!();
    Ok(())
}

fn cmd_drafts(config: &Config, json: bool) -> anyhow::Result<()> {
    let dir = config::drafts_dir(config);
    let drafts = EmlDrafts::new(&dir).list()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&drafts)?);
        return Ok(());
    }

    println!();
    if drafts.is_empty() {
        println!("  No drafts in {}", dir.display());
        println!();
        return Ok(());
    }
    println!("  {:<24} {:<50} {:>5}", "Id", "Subject", "Files");
    println!("  {}", "-".repeat(81));
    for d in &drafts {
        let id: String = d.id.chars().take(23).collect();
        let subject: String = d.subject.chars().take(49).collect();
        println!("  {:<24} {:<50} {:>5}", id, subject, d.attachments);
    }
    println!();
    Ok(())
}

fn cmd_config(config: &Config, save: bool) -> anyhow::Result<()> {
    if save {
        config::save_config(config)?;
    }
    match config::config_file_path() {
        Some(path) => println!("# {}", path.display()),
        None => println!("# no config directory on this platform"),
    }
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailmerge", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_config_command_applies_overrides() {
        let cli = Cli::try_parse_from([
            "mailmerge",
            "config",
            "--save",
            "--cc-mode",
            "global",
            "--global-cc",
            "boss@x.com",
            "--attachment-mode",
            "conditional",
        ])
        .unwrap();
        let Commands::Config { save, overrides } = cli.command else {
            panic!("expected the config command");
        };
        assert!(save);

        let mut config = Config::default();
        overrides.apply(&mut config);
        assert_eq!(config.recipients.cc_mode, RecipientMode::Global);
        assert_eq!(config.recipients.global_cc, "boss@x.com");
        assert_eq!(config.attachments.mode, AttachmentMode::Conditional);
    }

    #[test]
    fn test_resume_restores_stopped_settings_before_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let rows = dir.path().join("list.csv");
        let mut stopped = Config::default();
        stopped.recipients.cc_mode = RecipientMode::Global;
        stopped.recipients.global_cc = "boss@x.com".into();
        stopped.attachments.mode = AttachmentMode::Conditional;

        let mut config = Config::default();
        config.general.cache_dir = Some(dir.path().join("cache"));
        checkpoint_for(&config, &rows)
            .save_stopped(4, &stopped.run_settings())
            .unwrap();

        let cli = Cli::try_parse_from([
            "mailmerge",
            "resume",
            "--rows",
            rows.to_str().unwrap(),
            "--draft",
            "d",
            "--attachment-mode",
            "send-all",
        ])
        .unwrap();
        let Commands::Resume { overrides, .. } = cli.command else {
            panic!("expected the resume command");
        };

        restore_stopped_settings(&mut config, &rows).unwrap();
        overrides.apply(&mut config);
        assert_eq!(config.recipients.cc_mode, RecipientMode::Global);
        assert_eq!(config.recipients.global_cc, "boss@x.com");
        assert_eq!(config.attachments.mode, AttachmentMode::SendAll);
    }
}
