//! Predict command - classify and extract fields from a single image.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use invio_core::{load_orchestrator, PredictionOutcome};

/// Arguments for the predict command.
#[derive(Args)]
pub struct PredictArgs {
    /// Input image file
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Model directory
    #[arg(short, long)]
    model_dir: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Plain text summary
    Text,
}

pub async fn run(args: PredictArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = super::load_config(config_path)?;
    if let Some(model_dir) = &args.model_dir {
        config.models.model_dir = model_dir.clone();
    }

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    info!("Processing file: {}", args.input.display());

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {msg}")
            .unwrap()
            .progress_chars("##-"),
    );

    pb.set_message("Loading models...");
    pb.set_position(10);

    let upload = super::read_upload(&args.input)?;
    if !upload.is_image() {
        anyhow::bail!("Unsupported file format: {}", args.input.display());
    }

    let orchestrator = tokio::task::spawn_blocking({
        let config = config.clone();
        move || load_orchestrator(&config)
    })
    .await??;

    pb.set_message("Running prediction...");
    pb.set_position(40);

    let outcome =
        tokio::task::spawn_blocking(move || orchestrator.process(&upload)).await??;

    pb.finish_with_message("Done");

    let output = format_outcome(&outcome, args.format)?;
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

    debug!("Total processing time: {:?}", start.elapsed());

    Ok(())
}

fn format_outcome(outcome: &PredictionOutcome, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(outcome)?),
        OutputFormat::Text => Ok(format_text(outcome)),
    }
}

fn format_text(outcome: &PredictionOutcome) -> String {
    match outcome {
        PredictionOutcome::Invoice { image_id, fields } => {
            let mut output = String::new();
            output.push_str(&format!("Invoice: {}\n", image_id));
            for (label, field) in fields {
                output.push_str(&format!(
                    "  {:<8} {} ({:.0}%)\n",
                    format!("{label}:"),
                    field.value.as_deref().unwrap_or("-"),
                    field.confidence * 100.0
                ));
            }
            output
        }
        PredictionOutcome::Other { filename, message } => {
            format!("{}: {}\n", filename, message)
        }
    }
}
