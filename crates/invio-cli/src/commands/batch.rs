//! Batch command - process many invoice images in one request.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use invio_core::{load_orchestrator, BatchOutcome, UploadedImage};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Input files or glob pattern
    #[arg(required = true)]
    input: String,

    /// Output file for the batch result (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Model directory
    #[arg(short, long)]
    model_dir: Option<PathBuf>,
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = super::load_config(config_path)?;
    if let Some(model_dir) = &args.model_dir {
        config.models.model_dir = model_dir.clone();
    }

    // Expand glob pattern
    let files: Vec<PathBuf> = glob(&args.input)?.filter_map(|r| r.ok()).collect();
    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    let mut uploads = Vec::with_capacity(files.len());
    for path in &files {
        uploads.push(super::read_upload(path)?);
    }

    let uploads: Vec<UploadedImage> = uploads.into_iter().filter(|u| u.is_image()).collect();
    if uploads.is_empty() {
        anyhow::bail!("No image files found for pattern: {}", args.input);
    }

    println!(
        "{} Found {} images to process",
        style("ℹ").blue(),
        uploads.len()
    );

    let orchestrator = Arc::new(
        tokio::task::spawn_blocking({
            let config = config.clone();
            move || load_orchestrator(&config)
        })
        .await??,
    );

    let pb = ProgressBar::new(uploads.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} images")
            .unwrap()
            .progress_chars("=>-"),
    );

    // Fan out one blocking task per image; join in request order so the
    // batch result preserves it. Any single failure fails the whole batch.
    let handles: Vec<_> = uploads
        .into_iter()
        .map(|upload| {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::task::spawn_blocking(move || orchestrator.process(&upload))
        })
        .collect();

    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        outcomes.push(handle.await??);
        pb.inc(1);
    }

    pb.finish_with_message("Complete");

    let batch = BatchOutcome::from_outcomes(outcomes);
    info!(
        "Batch finished: {} accepted, {} rejected",
        batch.image_ids.len(),
        batch.rejected.len()
    );

    let output = serde_json::to_string_pretty(&batch)?;
    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    println!();
    println!(
        "{} Processed {} images in {:?}",
        style("✓").green(),
        batch.image_ids.len() + batch.rejected.len(),
        start.elapsed()
    );
    println!(
        "   {} accepted, {} rejected",
        style(batch.image_ids.len()).green(),
        style(batch.rejected.len()).red()
    );

    if !batch.rejected.is_empty() {
        println!();
        println!("{}", style("Rejected files:").red());
        for rejection in &batch.rejected {
            println!("  - {}: {}", rejection.filename, rejection.message);
        }
    }

    Ok(())
}
