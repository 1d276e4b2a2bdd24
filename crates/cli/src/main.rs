//! Command-line interface for SheetVault.

mod config;
mod output;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use sheetvault_core::FileId;
use sheetvault_engine::{Engine, JobStatus, Submission, Upload, UploadResult};
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "sheetvault")]
#[command(about = "Versioned storage and change tracking for spreadsheets")]
#[command(version)]
struct Cli {
    /// Configuration file (optional; SHEETVAULT_* variables override it)
    #[arg(long, global = true, env = "SHEETVAULT_CONFIG", default_value = "sheetvault.toml")]
    config: PathBuf,

    /// Print results as JSON
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct HolderArgs {
    /// Lock holder identity
    #[arg(long, env = "SHEETVAULT_HOLDER")]
    holder: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a workbook or CSV as a new version
    Upload {
        /// Document to upload
        path: PathBuf,
        /// Existing file to add a version to (a new file is created otherwise)
        #[arg(long)]
        file: Option<FileId>,
        /// Display name for a new file (defaults to the document's file name)
        #[arg(long)]
        name: Option<String>,
        /// Project reference for a new file
        #[arg(long)]
        project: Option<String>,
        /// Author recorded on the version
        #[arg(long, env = "SHEETVAULT_AUTHOR")]
        author: String,
        /// Change summary
        #[arg(long, short)]
        message: Option<String>,
        /// Lock holder acting for this upload; its lock is released if the diff times out
        #[arg(long)]
        holder: Option<String>,
    },
    /// Show the version history of a file
    History { file: FileId },
    /// Show the cell changes between two versions
    Diff {
        file: FileId,
        from: u32,
        to: u32,
        /// Maximum number of changes to print
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Write the exact bytes of a version to a file
    Download {
        file: FileId,
        version: u32,
        /// Output path
        #[arg(long, short)]
        output: PathBuf,
    },
    /// Acquire or refresh the write lock on a file
    Lock {
        file: FileId,
        #[command(flatten)]
        holder: HolderArgs,
    },
    /// Release the write lock on a file
    Unlock {
        file: FileId,
        #[command(flatten)]
        holder: HolderArgs,
    },
    /// Show a file's head version and lock, or list all files
    Status { file: Option<FileId> },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries command output.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = config::load(&cli.config)?;
    let engine = Engine::from_config(config)
        .await
        .context("failed to open storage")?;

    run(&engine, cli.command, cli.json).await
}

async fn run(engine: &Engine, command: Commands, json: bool) -> Result<()> {
    match command {
        Commands::Upload {
            path,
            file,
            name,
            project,
            author,
            message,
            holder,
        } => {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;

            let mut request = Upload::new(bytes, author);
            request.file_id = file;
            request.change_summary = message;
            request.project_ref = project;
            request.display_name = name.or_else(|| {
                file.is_none()
                    .then(|| path.file_name().map(|n| n.to_string_lossy().into_owned()))
                    .flatten()
            });
            if let Some(holder) = holder {
                request.holder = Some(sheetvault_core::HolderId::new(holder)?);
            }

            let result = upload(engine, request).await?;
            emit(json, &result, || output::upload(&result))
        }
        Commands::History { file } => {
            let versions = engine
                .get_version_history(file)
                .await
                .with_context(|| format!("failed to load history of {file}"))?;
            emit(json, &versions, || output::history(&versions))
        }
        Commands::Diff {
            file,
            from,
            to,
            limit,
        } => {
            let report = engine
                .get_version_diff(file, from, to)
                .await
                .with_context(|| format!("failed to diff versions {from} and {to}"))?;
            emit(json, &report, || output::diff(&report, limit))
        }
        Commands::Download {
            file,
            version,
            output,
        } => {
            let bytes = engine
                .download_version(file, version)
                .await
                .with_context(|| format!("failed to download version {version}"))?;
            tokio::fs::write(&output, &bytes)
                .await
                .with_context(|| format!("failed to write {}", output.display()))?;
            tracing::info!(path = %output.display(), size_bytes = bytes.len(), "version written");
            Ok(())
        }
        Commands::Lock { file, holder } => {
            let lease = engine
                .acquire_lock(file, &holder.holder)
                .await
                .context("failed to acquire lock")?;
            emit(json, &lease, || output::lease(&lease))
        }
        Commands::Unlock { file, holder } => {
            let released = engine
                .release_lock(file, &holder.holder)
                .await
                .context("failed to release lock")?;
            emit(json, &serde_json::json!({ "released": released }), || {
                if released {
                    format!("file {file} unlocked\n")
                } else {
                    format!("file {file} was not locked by {}\n", holder.holder)
                }
            })
        }
        Commands::Status { file: Some(file) } => {
            let info = engine.get_file(file).await?;
            let lease = engine.lock_status(file).await?;
            emit(
                json,
                &serde_json::json!({ "file": info, "lock": lease }),
                || output::file_status(&info, lease.as_ref()),
            )
        }
        Commands::Status { file: None } => {
            let files = engine.list_files().await?;
            emit(json, &files, || output::files(&files))
        }
    }
}

/// Submit an upload, waiting for it if it was moved to the background.
async fn upload(engine: &Engine, request: Upload) -> Result<UploadResult> {
    match engine.submit_upload(request).await? {
        Submission::Completed(result) => Ok(result),
        Submission::Background(job) => {
            tracing::info!(job_id = %job, "large document, diffing in the background");
            match engine.wait_for_job(job).await? {
                JobStatus::Completed { result } => Ok(result),
                JobStatus::Failed { message, .. } => bail!("upload failed: {message}"),
                JobStatus::Pending => bail!("job {job} did not finish"),
            }
        }
    }
}

fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce() -> String) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    if json {
        serde_json::to_writer_pretty(&mut stdout, value)?;
        writeln!(stdout)?;
    } else {
        stdout.write_all(text().as_bytes())?;
    }
    Ok(())
}
