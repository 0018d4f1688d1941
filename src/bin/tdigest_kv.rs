// src/bin/tdigest_kv.rs
use clap::{Parser, ValueEnum};
use serde_json::json;
use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use tdigest_kv::commands::Session;
use tdigest_kv::store::Keyspace;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Output {
    Text,
    Json,
}

#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    /// Snapshot file: loaded on start if present, written by SAVE
    #[arg(long, env = "TDIGEST_KV_SNAPSHOT")]
    snapshot: Option<PathBuf>,

    /// Write the snapshot once input is exhausted
    #[arg(long, requires = "snapshot")]
    save_on_exit: bool,

    /// Read commands from this file instead of stdin
    #[arg(long)]
    script: Option<PathBuf>,

    /// Log filter (e.g. "debug", "tdigest_kv=trace"); falls back to RUST_LOG, then "warn"
    #[arg(long)]
    log_level: Option<String>,

    /// Reply format (text|json)
    #[arg(short = 'o', long, value_enum, default_value_t = Output::Text)]
    output: Output,
}

fn init_tracing(level: Option<&str>) -> Result<(), Box<dyn Error>> {
    let filter = match level {
        Some(l) => EnvFilter::try_new(l)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
    Ok(())
}

fn open_keyspace(snapshot: Option<&PathBuf>) -> Result<Keyspace, Box<dyn Error>> {
    match snapshot {
        Some(path) if path.exists() => Ok(Keyspace::load(path)?),
        Some(path) => {
            info!(path = %path.display(), "no snapshot yet, starting empty");
            Ok(Keyspace::new())
        }
        None => Ok(Keyspace::new()),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(args.log_level.as_deref())?;

    let keyspace = open_keyspace(args.snapshot.as_ref())?;
    let mut session = Session::new(keyspace);
    if let Some(path) = &args.snapshot {
        session = session.with_snapshot(path);
    }

    let input: Box<dyn BufRead> = match &args.script {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(io::stdin().lock()),
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for line in input.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let res = session.execute_line(trimmed);
        match args.output {
            Output::Text => match res {
                Ok(reply) => writeln!(out, "{reply}")?,
                Err(err) => writeln!(out, "(error) {}", err.protocol_message())?,
            },
            Output::Json => {
                let v = match res {
                    Ok(reply) => json!({ "ok": reply.to_json() }),
                    Err(err) => json!({ "error": err.protocol_message() }),
                };
                writeln!(out, "{v}")?;
            }
        }
    }
    out.flush()?;

    if args.save_on_exit {
        if let Some(path) = &args.snapshot {
            session.keyspace_mut().save(path)?;
        }
    }
    Ok(())
}
