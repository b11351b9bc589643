use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use studyrag::{
    config, logging,
    parsing::DocumentFormat,
    processing::{ProcessingService, UploadedFile},
};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(
    name = "studyrag-ingest",
    about = "Index every supported document under a directory for one student"
)]
struct Cli {
    /// Student id used as the index namespace.
    #[arg(long)]
    student_id: String,
    /// Directory scanned recursively for .pdf, .docx, .txt, and .md files.
    dir: PathBuf,
    /// Stop at the first file that fails to ingest.
    #[arg(long)]
    fail_fast: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load_config().context("Failed to load configuration")?;
    logging::init_tracing();
    let service = ProcessingService::from_config(&config)
        .await
        .context("Failed to initialize processing pipeline")?;

    let mut documents = 0usize;
    let mut chunks = 0usize;
    let mut failures = 0usize;

    for entry in WalkDir::new(&cli.dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", cli.dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let filename = entry.file_name().to_string_lossy().into_owned();
        if DocumentFormat::from_filename(&filename).is_none() {
            tracing::debug!(path = %entry.path().display(), "Skipping unsupported file");
            continue;
        }

        let bytes = tokio::fs::read(entry.path())
            .await
            .with_context(|| format!("Failed to read {}", entry.path().display()))?;
        match service
            .ingest(&cli.student_id, UploadedFile { filename, bytes })
            .await
        {
            Ok(outcome) => {
                println!(
                    "{}\t{}\t{} chunks",
                    entry.path().display(),
                    outcome.doc_id,
                    outcome.num_chunks
                );
                documents += 1;
                chunks += outcome.num_chunks;
            }
            Err(error) if cli.fail_fast => {
                return Err(error)
                    .with_context(|| format!("Failed to ingest {}", entry.path().display()));
            }
            Err(error) => {
                tracing::warn!(path = %entry.path().display(), error = %error, "Ingest failed");
                failures += 1;
            }
        }
    }

    tracing::info!(
        student_id = %cli.student_id,
        documents,
        chunks,
        failures,
        "Directory ingest finished"
    );
    if failures > 0 {
        bail!("{failures} file(s) failed to ingest");
    }
    Ok(())
}
