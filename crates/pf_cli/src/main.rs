//! PeakForge command line front end.
//!
//! Thin wrapper over `pf_core`: uploads a file, starts the session, polls
//! the progress journal, and prints the download keys when done.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};

use pf_core::config::ConfigManager;
use pf_core::logging::{init_tracing, init_tracing_with_file};
use pf_core::service::{ServiceError, SessionService};

#[derive(Parser)]
#[command(name = "peakforge", version, about = "Loudness mastering sessions")]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, default_value = "peakforge.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Master one audio file and wait for the results.
    Master {
        /// Input audio file (WAV/AIFF/FLAC).
        input: PathBuf,
    },
    /// Report availability of the external transform binaries.
    Health,
    /// Delete a session directory. Idempotent.
    Clear {
        /// Session id to remove.
        session: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ConfigManager::new(&cli.config);
    config.load_or_create()?;
    config.ensure_dirs_exist()?;

    // Keep the guard alive so the file writer flushes on exit.
    let logs_dir = PathBuf::from(&config.settings().paths.logs_dir);
    let _log_guard = match init_tracing_with_file("pf_core=info,pf_cli=info", &logs_dir) {
        Ok(guard) => Some(guard),
        Err(_) => {
            init_tracing("pf_core=info,pf_cli=info");
            None
        }
    };

    let service = SessionService::new(config.settings().clone())?;

    match cli.command {
        Command::Master { input } => master(&service, &input),
        Command::Health => {
            let health = service.health_check();
            println!("ffmpeg:  {}", if health.ffmpeg { "ok" } else { "missing" });
            println!("ffprobe: {}", if health.ffprobe { "ok" } else { "missing" });
            if !health.ok() {
                return Err("external transform binaries unavailable".into());
            }
            Ok(())
        }
        Command::Clear { session } => {
            service.clear(&session)?;
            println!("cleared {session}");
            Ok(())
        }
    }
}

fn master(
    service: &SessionService,
    input: &PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let filename = input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or("input path has no filename")?;

    let session = service.upload(input, &filename)?;
    println!("session {}", session.id);
    service.start(&session)?;

    let mut last_message = String::new();
    loop {
        let progress = match service.progress(&session.id) {
            Ok(progress) => progress,
            Err(ServiceError::NotFound(_)) => break,
            Err(e) => return Err(e.into()),
        };

        let percent = progress["percent"].as_f64().unwrap_or(0.0);
        let message = progress["message"].as_str().unwrap_or("").to_string();
        if message != last_message {
            println!("[{percent:>3.0}%] {message}");
            last_message = message;
        }

        if progress["done"].as_bool().unwrap_or(false) {
            if progress["phase"] == "error" {
                let error = progress["error"].as_str().unwrap_or("processing failed");
                return Err(error.to_string().into());
            }
            println!("downloads:");
            if let Some(downloads) = progress["downloads"].as_object() {
                for (key, value) in downloads {
                    if let Some(filename) = value.as_str() {
                        println!("  {key:<18} {filename}");
                    }
                }
            }
            break;
        }
        std::thread::sleep(Duration::from_millis(500));
    }
    Ok(())
}
