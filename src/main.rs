//! Chatvault CLI
//!
//! Command-line interface for Chatvault operations:
//! - Migrate a legacy archive into the canonical layout
//! - Rebuild the speaker index of one file
//! - Generate a default config file

use anyhow::Context;
use chatvault::config::{generate_default_config, Config, IndexMode, LoggingConfig};
use chatvault::index::rebuild_index;
use chatvault::migrate::{ArchiveWalker, LineExtractor};
use chatvault::postprocess::{
    CompressTask, FileTask, IndexTask, NoopTrigger, PostProcessQueue,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "chatvault")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Chat history archive tooling")]
#[command(long_about = "Chatvault converts legacy chat log dumps into canonical per-day logs.\nBan and subscriber sidecar files are merged into each day in time order.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search the standard locations)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log format (pretty, json)
    #[arg(long, global = true, value_parser = ["pretty", "json"])]
    pub log_format: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Migrate a legacy archive
    Migrate {
        /// Root of the legacy archive (channel/month/day files)
        source: PathBuf,
        /// Root of the canonical archive
        dest: PathBuf,
    },

    /// Rebuild the speaker index of one canonical file
    #[command(hide = true)]
    Nicks {
        /// Canonical day file, plain or .lz4
        file: PathBuf,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn log_filter(level: &str) -> EnvFilter {
    EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| format!("chatvault={}", level)))
}

/// Plain subscriber used while the config, and with it the log settings, loads
fn bootstrap_subscriber<W>(filter: EnvFilter, writer: W) -> impl tracing::Subscriber + Send + Sync
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .finish()
}

fn init_logging(logging: &LoggingConfig) {
    let filter = log_filter(&logging.level);

    let (pretty, json) = if logging.format == "json" {
        (None, Some(tracing_subscriber::fmt::layer().json()))
    } else {
        (Some(tracing_subscriber::fmt::layer()), None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json)
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(format) = &cli.log_format {
        config.logging.format = format.clone();
    }
    config.validate()?;
    Ok(config)
}

fn post_process_tasks(config: &Config) -> anyhow::Result<Vec<Box<dyn FileTask>>> {
    let mut tasks: Vec<Box<dyn FileTask>> = Vec::new();

    match config.post_process.index_mode {
        IndexMode::InProcess => tasks.push(Box::new(IndexTask::in_process(LineExtractor::new(
            &config.migrate.sentinel_speaker,
        )))),
        IndexMode::Subprocess => {
            let program = std::env::current_exe().context("cannot locate the chatvault binary")?;
            tasks.push(Box::new(IndexTask::subprocess(program)));
        }
        IndexMode::Disabled => {}
    }

    if config.post_process.compress {
        tasks.push(Box::new(CompressTask::new(config.post_process.remove_source)));
    }

    Ok(tasks)
}

async fn migrate(source: PathBuf, dest: PathBuf, config: Config) -> anyhow::Result<()> {
    let walker = ArchiveWalker::new(&source, &dest, config.migrate.clone());
    tracing::info!("Chatvault v{} run {}", env!("CARGO_PKG_VERSION"), walker.run_id());

    if !config.post_process.enabled {
        let summary = tokio::task::spawn_blocking(move || walker.run(&NoopTrigger)).await??;
        println!("{}", summary);
        return Ok(());
    }

    let (queue, worker) = PostProcessQueue::start(
        post_process_tasks(&config)?,
        Duration::from_millis(config.post_process.settle_delay_ms),
    );

    let walker_queue = queue.clone();
    let summary = tokio::task::spawn_blocking(move || walker.run(&walker_queue))
        .await?
        .with_context(|| format!("migration of {:?} failed", source))?;
    println!("{}", summary);

    tracing::info!(pending = queue.pending(), "waiting for post-processing");
    drop(queue);
    let report = worker.await?;
    println!("{}", report);

    Ok(())
}

fn nicks(file: &Path, config: &Config) -> anyhow::Result<()> {
    let extractor = LineExtractor::new(&config.migrate.sentinel_speaker);
    let index = rebuild_index(file, &extractor)
        .with_context(|| format!("failed to index {:?}", file))?;
    tracing::info!(
        file = ?file,
        speakers = index.speaker_count(),
        lines = index.line_count(),
        "index rebuilt"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = tracing::subscriber::with_default(
        bootstrap_subscriber(log_filter("info"), std::io::stderr),
        || load_config(&cli),
    )?;
    init_logging(&config.logging);

    match cli.command {
        Commands::Migrate { source, dest } => migrate(source, dest, config).await,

        Commands::Nicks { file } => nicks(&file, &config),

        Commands::Config { output } => {
            let content = generate_default_config();

            match output {
                Some(path) => {
                    // Create parent directory if needed
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &content)?;
                    println!("Config written to {:?}", path);
                }
                None => print!("{}", content),
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Capture {
        type Writer = Capture;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_config_load_warnings_are_logged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, generate_default_config()).unwrap();
        std::env::set_var("CHATVAULT_INDEX_MODE", "sometimes");

        let cli = Cli::parse_from(["chatvault", "--config", path.to_str().unwrap(), "config"]);
        let capture = Capture::default();
        let config = tracing::subscriber::with_default(
            bootstrap_subscriber(EnvFilter::new("chatvault=info"), capture.clone()),
            || load_config(&cli),
        );
        std::env::remove_var("CHATVAULT_INDEX_MODE");

        assert_eq!(config.unwrap().post_process.index_mode, IndexMode::InProcess);
        let logged = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("Ignoring CHATVAULT_INDEX_MODE"), "logged: {logged}");
    }
}
