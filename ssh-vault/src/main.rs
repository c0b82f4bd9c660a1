//! SSH Vault - Main entry point
//!
//! Encrypted backup and atomic restore of `~/.ssh`.

use anyhow::Result;
use clap::{Parser, Subcommand};
use ssh_vault::executor::{self, BackupExecutor, BackupOutcome, RestoreExecutor};
use ssh_vault::{utils, Config, Passphrase};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encrypt ~/.ssh into the vault (no-op when nothing changed)
    Backup,
    /// Restore ~/.ssh from the vault and refresh the managed host block
    Restore,
    /// Show whether the vault is current, without writing anything
    Status,
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    // Load configuration
    let config = Config::load(args.config.as_deref())?;

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::info!(
        "Starting ssh-vault v{} ({:?})",
        env!("CARGO_PKG_VERSION"),
        args.command
    );

    match args.command {
        Command::Backup => backup(&config),
        Command::Restore => restore(&config),
        Command::Status => status(&config),
    }
}

fn backup(config: &Config) -> Result<()> {
    let passphrase = Passphrase::from_env();
    match BackupExecutor::new(config, &passphrase).execute()? {
        BackupOutcome::Unchanged { snapshot } => {
            println!(
                "unchanged: {} ({} files, fingerprint {})",
                config.paths.backup_file.display(),
                snapshot.file_count,
                &snapshot.fingerprint[..12]
            );
        }
        BackupOutcome::Created {
            snapshot,
            backup_file,
            metadata_file,
            ..
        } => {
            println!("created: {}", backup_file.display());
            println!("metadata: {}", metadata_file.display());
            println!(
                "source: {} files, {} bytes",
                snapshot.file_count, snapshot.total_bytes
            );
        }
    }
    Ok(())
}

fn restore(config: &Config) -> Result<()> {
    let passphrase = Passphrase::from_env();
    let outcome = RestoreExecutor::new(config, &passphrase).execute()?;

    println!("restored: {}", outcome.ssh_dir.display());
    if let Some(aside) = &outcome.aside {
        println!("previous: {}", aside.display());
    }
    for host in &outcome.hosts {
        println!("next: ssh -T {}@{}", host.user, host.alias);
    }
    Ok(())
}

fn status(config: &Config) -> Result<()> {
    let status = executor::status(config)?;

    match &status.snapshot {
        Some(snapshot) => {
            println!(
                "source: {} ({} files, {} bytes)",
                config.paths.ssh_dir.display(),
                snapshot.file_count,
                snapshot.total_bytes
            );
            println!("fingerprint: {}", snapshot.fingerprint);
        }
        None => println!("source: {} (missing)", config.paths.ssh_dir.display()),
    }

    let presence = if status.blob_present { "present" } else { "missing" };
    println!("backup: {} ({})", config.paths.backup_file.display(), presence);

    match &status.metadata {
        Some(metadata) => println!(
            "recorded: {} at {}",
            metadata.source_fingerprint, metadata.created_at
        ),
        None => println!("recorded: none"),
    }

    println!("up-to-date: {}", if status.up_to_date { "yes" } else { "no" });

    let integrity = match status.blob_sha256_matches {
        Some(true) => "ok",
        Some(false) => "mismatch",
        None => "unknown",
    };
    println!("blob-sha256: {}", integrity);

    if let Some(journal) = &status.interrupted_swap {
        println!(
            "interrupted-restore: previous tree at {} (recovered on next restore)",
            journal.aside.display()
        );
    }
    Ok(())
}
