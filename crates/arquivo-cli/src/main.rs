//! Command-line front end: stage PDFs, run ingestion jobs and query the
//! stored corpus.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use arquivo_core::{Config, IngestService, JobState, SearchQuery};

#[derive(Parser, Debug)]
#[command(name = "arquivo", author, version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stage a PDF and ingest it, waiting for the job to finish.
    Upload {
        /// Path to a .pdf file.
        path: PathBuf,
    },
    /// Ingest an already-staged file without copying.
    Ingest {
        /// File name inside the staging directory.
        filename: String,
    },
    /// Search stored documents by content substring and date.
    Search {
        /// Case-sensitive substring; empty matches everything.
        substring: String,
        /// Date in dd/mm/yyyy, matched against each document's date range.
        date: String,
    },
    /// List every stored document.
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("arquivo=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    let config = Config::load_or_default();
    let service = IngestService::new(config)?;

    match args.command {
        Command::Upload { path } => {
            let is_pdf = path
                .extension()
                .map(|e| e.eq_ignore_ascii_case("pdf"))
                .unwrap_or(false);
            if !is_pdf {
                bail!("only .pdf files are accepted: {}", path.display());
            }

            let filename = path
                .file_name()
                .context("upload path has no file name")?
                .to_string_lossy()
                .to_string();
            let staged = service.staging_dir().join(&filename);
            std::fs::copy(&path, &staged)
                .with_context(|| format!("failed to stage {}", path.display()))?;

            let job_id = service.submit(&filename).await?;
            println!("job {job_id}");
            run_to_completion(&service, &job_id).await?;
        }
        Command::Ingest { filename } => {
            let job_id = service.submit(&filename).await?;
            println!("job {job_id}");
            run_to_completion(&service, &job_id).await?;
        }
        Command::Search { substring, date } => {
            let hits = service.search(&SearchQuery { substring, date })?;
            if hits.is_empty() {
                println!("no matches");
            } else {
                for file_id in hits {
                    println!("{file_id}");
                }
            }
        }
        Command::List => {
            for doc in service.documents()? {
                println!(
                    "{}\t{}\t{}\t{} chars",
                    doc.file_id,
                    doc.start_date.as_deref().unwrap_or("-"),
                    doc.end_date.as_deref().unwrap_or("-"),
                    doc.content.len()
                );
            }
        }
    }

    service.shutdown();
    Ok(())
}

/// Poll the job until it reaches a terminal state and report the outcome.
async fn run_to_completion(service: &IngestService, job_id: &str) -> Result<()> {
    loop {
        let status = service.status(job_id).await?;
        match status.state {
            JobState::Succeeded { duplicate: false } => {
                println!("{}: ingested", status.filename);
                return Ok(());
            }
            JobState::Succeeded { duplicate: true } => {
                println!("{}: already stored, skipped", status.filename);
                return Ok(());
            }
            JobState::Failed { error } => {
                bail!("{}: ingestion failed: {}", status.filename, error);
            }
            JobState::Pending | JobState::Running => {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}
