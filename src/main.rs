//! asynclog - Asynchronous rotating log sink
//!
//! Pipes stdin into a rotating log file through the batching writer.
//! SIGHUP rotates the file; Ctrl-C or end of input drains the queue and exits.

use asynclog_writer::{AsyncLogWriter, Config, Level, WriterError};
use clap::Parser;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "asynclog")]
#[command(about = "Write stdin to a rotating log file through an asynchronous batching writer")]
#[command(version)]
struct Cli {
    /// YAML config file
    #[arg(short, long, env = "ASYNCLOG_CONFIG")]
    config: Option<PathBuf>,

    /// Log file path (overrides the config file)
    #[arg(short, long)]
    path: Option<PathBuf>,

    /// Minimum level for encoded lines
    #[arg(short, long)]
    level: Option<Level>,

    /// Encode each line as an info record instead of writing it raw
    #[arg(long)]
    encode: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Diagnostics go to stderr; stdout is left alone.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match Config::load_from(cli.config.as_deref()) {
        Ok(c) => {
            if let Some(path) = &cli.config {
                tracing::info!("Loaded config from {}", path.display());
            }
            c
        }
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };
    if let Some(path) = cli.path {
        config.file.path = path;
    }
    if let Some(level) = cli.level {
        config.level = level;
    }

    tracing::info!("Starting asynclog");
    tracing::info!("  Log file: {}", config.file.path.display());
    tracing::info!(
        "  Rotation: {}MB, {} backup(s), {} day(s), compress={}",
        config.file.max_size_mb,
        config.file.max_backups,
        config.file.max_age_days,
        config.file.compress
    );
    tracing::info!(
        "  Writer: queue_size={}, buf_limit={}",
        config.writer.queue_size,
        config.writer.buf_limit
    );

    let writer = Arc::new(AsyncLogWriter::new(config)?);

    // Stdin reads block, so they get their own thread.
    let (done_tx, done_rx) = tokio::sync::oneshot::channel();
    let _pump = {
        let writer = writer.clone();
        let encode = cli.encode;
        std::thread::Builder::new()
            .name("asynclog-stdin".to_string())
            .spawn(move || {
                let _ = done_tx.send(pump_stdin(&writer, encode));
            })?
    };

    #[cfg(unix)]
    let hangup_handle = spawn_rotate_on_hangup(writer.clone())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, draining log queue...");
        }
        result = done_rx => match result {
            Ok(Ok(lines)) => tracing::info!("End of input after {} line(s)", lines),
            Ok(Err(e)) => tracing::error!("Input pump stopped: {}", e),
            Err(_) => tracing::error!("Input pump exited unexpectedly"),
        },
    }

    #[cfg(unix)]
    hangup_handle.abort();

    let closing = writer.clone();
    tokio::task::spawn_blocking(move || closing.close()).await??;

    let stats = writer.stats();
    tracing::info!(
        "Log writer stopped: {} record(s), {} byte(s), {} rotation(s), {} dropped",
        stats.records_written,
        stats.bytes_written,
        stats.rotations,
        stats.records_dropped
    );
    Ok(())
}

/// Copies stdin into the writer line by line. Returns the number of lines.
fn pump_stdin(writer: &AsyncLogWriter, encode: bool) -> Result<u64, WriterError> {
    let stdin = std::io::stdin();
    let mut lines = 0;
    for line in stdin.lock().lines() {
        let line = line?;
        if encode {
            writer.info(&line, &[])?;
        } else {
            let mut record = line.into_bytes();
            record.push(b'\n');
            writer.write(&record)?;
        }
        lines += 1;
    }
    Ok(lines)
}

#[cfg(unix)]
fn spawn_rotate_on_hangup(
    writer: Arc<AsyncLogWriter>,
) -> std::io::Result<tokio::task::JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    Ok(tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            let writer = writer.clone();
            match tokio::task::spawn_blocking(move || writer.rotate()).await {
                Ok(Ok(())) => tracing::info!("Rotated log file on SIGHUP"),
                Ok(Err(e)) => tracing::error!("Rotation failed: {}", e),
                Err(e) => tracing::error!("Rotation task failed: {}", e),
            }
        }
    }))
}
