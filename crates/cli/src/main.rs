use std::path::{Path, PathBuf};
use std::process;

use anyhow::Result;
use cfgdiff::{format_function_line, format_match_line, format_summary_line, sha256_file};
use cfgdiff_core::config::DiffConfig;
use cfgdiff_core::model::BinaryModel;
use cfgdiff_core::provider::{default_provider_registry, AnalysisProvider};
use clap::Parser;
use log::info;

/// CFG-based structural diffing for native binaries.
///
/// This CLI is a thin wrapper around `cfgdiff-core` (exposed in code as
/// `cfgdiff_core`). All substantive logic lives in the library so it can be
/// tested thoroughly and reused from other frontends.
#[derive(Parser, Debug)]
#[command(
    name = "cfgdiff",
    version,
    about = "CFG-based structural diffing for native binaries",
    long_about = None
)]
struct Cli {
    /// Input binaries: one file for a model summary, two for a full diff.
    #[arg(num_args = 0..)]
    files: Vec<PathBuf>,

    /// Emit JSON instead of line-oriented text.
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Optional JSON config file with scoring tunables.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Analysis provider to load binaries with.
    #[arg(long, default_value = "capstone")]
    provider: String,

    /// Acceptance threshold override for the match summary.
    #[arg(long)]
    threshold: Option<f64>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    if cli.files.is_empty() || cli.files.len() > 2 {
        eprintln!("Usage: cfgdiff [OPTIONS] <file> [<file2>]");
        process::exit(1);
    }

    let mut config = match &cli.config {
        Some(path) => match DiffConfig::from_json_file(path) {
            Ok(config) => config,
            Err(err) => fail(&err),
        },
        None => DiffConfig::default(),
    };
    if let Some(threshold) = cli.threshold {
        config.match_threshold = threshold;
    }

    let registry = default_provider_registry();
    let Some(provider) = registry.get(&cli.provider) else {
        eprintln!(
            "error: provider not found: {} (available: {})",
            cli.provider,
            registry.names().join(", ")
        );
        process::exit(1);
    };

    let model_a = load_or_exit(provider, &cli.files[0]);
    if cli.files.len() == 1 {
        return report_model(&cli.files[0], &model_a, cli.json);
    }
    let model_b = load_or_exit(provider, &cli.files[1]);

    info!("diffing {} against {}", model_a.name, model_b.name);
    let report = cfgdiff_core::diff::diff(&model_a, &model_b, &config);

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for m in &report.matches {
            println!("{}", format_match_line(m));
        }
        println!("{}", format_summary_line(&report));
    }
    Ok(())
}

fn fail(err: &dyn std::fmt::Display) -> ! {
    eprintln!("error: {err}");
    process::exit(1);
}

fn load_or_exit(provider: &dyn AnalysisProvider, path: &Path) -> BinaryModel {
    match BinaryModel::load(provider, path) {
        Ok(model) => model,
        Err(err) => fail(&err),
    }
}

/// Single-file diagnostic mode: summarize the binary model.
fn report_model(path: &Path, model: &BinaryModel, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(model)?);
        return Ok(());
    }
    let hash = sha256_file(path)?;
    println!("[model] {}: {} functions (sha256 {})", model.name, model.functions.len(), hash);
    for function in &model.functions {
        println!("{}", format_function_line(function));
    }
    Ok(())
}
