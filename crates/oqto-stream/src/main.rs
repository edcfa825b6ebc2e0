use std::collections::BTreeMap;
use std::env;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use log::{LevelFilter, debug, info};
use tokio::io::{AsyncRead, AsyncReadExt};

use oqto_stream::config::{AppConfig, default_config_path};
use oqto_stream::ingest::LineBuffer;
use oqto_stream::store::{LocalSession, OfflineStateSource, StateSource};
use oqto_stream::{Reconciler, StreamService};

const READ_CHUNK: usize = 64 * 1024;

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.common.config.as_deref())?;
    cli.init_logging(&config)?;
    debug!("effective config: {:?}", config);

    match cli.command {
        Command::Replay(cmd) => async_replay(config, cmd),
        Command::Config { command } => handle_config(&cli.common, &config, command),
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Oqto stream - reconcile agent session event streams.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Enable debug logging (equivalent to -vv)
    #[arg(long, global = true)]
    debug: bool,
    /// Enable trace logging (overrides other levels)
    #[arg(long, global = true)]
    trace: bool,
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,
    /// Disable ANSI colors in output
    #[arg(long = "no-color", global = true)]
    no_color: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Feed an NDJSON event capture through the reconciler and print the
    /// resulting transcripts
    Replay(ReplayCommand),
    /// Inspect and manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Debug, Clone, Args)]
struct ReplayCommand {
    /// Capture file (stdin when omitted)
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,
    /// Open this session up front and print only it (repeatable)
    #[arg(long = "session", value_name = "ID")]
    sessions: Vec<String>,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Output the effective configuration as TOML
    Print,
    /// Print the resolved config file path
    Path,
    /// Write the default configuration file
    Reset,
}

impl Cli {
    fn init_logging(&self, config: &AppConfig) -> Result<()> {
        use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

        if self.common.quiet {
            log::set_max_level(LevelFilter::Off);
            return Ok(());
        }

        let level = self.effective_log_level(config);
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "oqto_stream={}",
                level.to_string().to_lowercase()
            ))
        });

        if self.common.json || config.logging.json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
                .try_init()
                .ok();
        } else {
            let disable_color = self.common.no_color
                || env::var_os("NO_COLOR").is_some()
                || !io::stderr().is_terminal();

            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(!disable_color)
                        .with_writer(io::stderr),
                )
                .try_init()
                .ok();
        }

        // The library logs through the `log` facade.
        let mut builder =
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
        builder.filter_level(level);
        builder.try_init().ok();

        Ok(())
    }

    fn effective_log_level(&self, config: &AppConfig) -> LevelFilter {
        if self.common.trace {
            LevelFilter::Trace
        } else if self.common.debug {
            LevelFilter::Debug
        } else {
            match self.common.verbose {
                0 => config
                    .logging
                    .level
                    .parse()
                    .unwrap_or(LevelFilter::Info),
                1 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }
}

#[tokio::main]
async fn async_replay(config: AppConfig, cmd: ReplayCommand) -> Result<()> {
    handle_replay(config, cmd).await
}

async fn handle_replay(config: AppConfig, cmd: ReplayCommand) -> Result<()> {
    let source: Arc<dyn StateSource> = Arc::new(OfflineStateSource);
    let (handle, task) = StreamService::spawn(
        config.stream.clone(),
        Box::new(move |id: &str| LocalSession::new(id, Arc::clone(&source))),
    );

    for session_id in &cmd.sessions {
        handle.start_session(session_id.as_str()).await?;
    }

    let lines = match &cmd.file {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("opening capture {}", path.display()))?;
            pump_lines(file, &handle).await?
        }
        None => pump_lines(tokio::io::stdin(), &handle).await?,
    };
    info!("Replayed {} lines", lines);

    handle.shutdown().await?;
    let reconciler = task.await.context("stream service task failed")?;

    let output = transcripts(&reconciler, &cmd.sessions)?;
    println!("{output}");
    Ok(())
}

async fn pump_lines<T>(mut reader: T, handle: &oqto_stream::StreamHandle) -> Result<usize>
where
    T: AsyncRead + Unpin,
{
    let mut buffer = LineBuffer::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    let mut count = 0;

    loop {
        let read = reader
            .read(&mut chunk)
            .await
            .context("reading event capture")?;
        if read == 0 {
            break;
        }
        for line in buffer.push(&chunk[..read]) {
            handle.send_line(line).await?;
            count += 1;
        }
    }
    if let Some(line) = buffer.finish() {
        handle.send_line(line).await?;
        count += 1;
    }
    Ok(count)
}

fn transcripts(reconciler: &Reconciler<LocalSession>, only: &[String]) -> Result<String> {
    let mut out = BTreeMap::new();
    for session_id in reconciler.session_ids() {
        if !only.is_empty() && !only.contains(&session_id) {
            continue;
        }
        if let Some(session) = reconciler.session(&session_id) {
            out.insert(session_id.clone(), session.transcript());
        }
    }
    serde_json::to_string_pretty(&out).context("serializing transcripts")
}

fn handle_config(common: &CommonOpts, config: &AppConfig, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Print => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        ConfigCommand::Path => {
            println!("{}", config_path(common)?.display());
            Ok(())
        }
        ConfigCommand::Reset => {
            let path = config_path(common)?;
            AppConfig::default().write(&path)?;
            info!("Wrote default config to {}", path.display());
            Ok(())
        }
    }
}

fn config_path(common: &CommonOpts) -> Result<PathBuf> {
    let path = match common.config.as_deref() {
        Some(path) => path.to_path_buf(),
        None => default_config_path()?,
    };
    ensure_not_dir(&path)?;
    Ok(path)
}

fn ensure_not_dir(path: &Path) -> Result<()> {
    if path.is_dir() {
        return Err(anyhow!("{} is a directory", path.display()));
    }
    Ok(())
}
