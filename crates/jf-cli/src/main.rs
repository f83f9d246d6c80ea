//! jetfit CLI
//!
//! Fits the residual jet-energy correction against a balance measurement and
//! writes the augmented fit artifact as pretty JSON.

use std::collections::HashSet;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;

use jf_core::{Measurement, NuisanceRegistry};
use jf_fit::{
    chi2_pvalue, create_correction, CombinedLoss, CorrectionConstraint, FitEngine, Method,
    PhotonJetMeasurement,
};

#[derive(Parser)]
#[command(name = "jetfit")]
#[command(about = "jetfit - Residual jet-energy-correction fit")]
#[command(version)]
struct Cli {
    /// File with inputs from the balance analysis
    #[arg(long)]
    input: PathBuf,

    /// Label for data-taking period
    #[arg(short, long, default_value = "")]
    period: String,

    /// Computation method (PtBal or MPF)
    #[arg(short, long, default_value = "PtBal")]
    method: String,

    /// Functional form for jet correction (2p or spline)
    #[arg(long, default_value = "2p")]
    corr: String,

    /// Constraint for the jet correction, in the form
    /// "[<reference pt>,]<correction value>,<rel. uncertainty>"
    #[arg(short, long)]
    constraint: Option<String>,

    /// Systematic uncertainties to ignore (repeatable)
    #[arg(long = "exclude-syst")]
    exclude_syst: Vec<String>,

    /// Name for output JSON file
    #[arg(short, long, default_value = "fit.json")]
    output: PathBuf,

    /// Minimizer verbosity level
    #[arg(short, long, default_value = "3")]
    verbosity: u8,

    /// Upper bound of the leading-jet pt range, in GeV
    #[arg(long, default_value = "1600.0")]
    max_pt: f64,

    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: tracing::Level,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).init();

    let method: Method = cli.method.parse()?;
    let exclude_syst: HashSet<String> = cli.exclude_syst.iter().cloned().collect();

    let mut registry = NuisanceRegistry::new();
    let mut measurement =
        PhotonJetMeasurement::from_file(&cli.input, method, &mut registry, &exclude_syst)
            .with_context(|| format!("failed to load measurement from {}", cli.input.display()))?;
    measurement.set_pt_range(0.0, cli.max_pt);

    let correction = create_correction(&cli.corr)?;
    let mut loss = CombinedLoss::new(correction, registry);
    loss.add_term(Arc::new(measurement));

    if let Some(spec) = &cli.constraint {
        loss.add_term(Arc::new(CorrectionConstraint::parse(spec)?));
    }

    let engine = FitEngine::new(loss);
    tracing::info!(n_params = engine.loss().n_params(), ndf = engine.ndf(), "running fit");

    let result = engine.fit(cli.verbosity)?;
    tracing::info!(
        min_value = result.min_value(),
        status = ?result.status(),
        "fit complete"
    );

    // Augment the serialized record with the analysis metadata the
    // downstream tooling keys on.
    let mut artifact = serde_json::to_value(result.serialize())?;
    let fields = artifact.as_object_mut().expect("fit record serializes to an object");
    fields.insert("ndf".into(), engine.ndf().into());
    fields.insert("p_value".into(), chi2_pvalue(result.min_value(), engine.ndf()).into());
    fields.insert("period".into(), cli.period.clone().into());
    fields.insert("variant".into(), method.label().into());
    fields.insert("corr_form".into(), cli.corr.clone().into());
    fields.insert(
        "constraint".into(),
        cli.constraint.clone().map(Value::from).unwrap_or(Value::Null),
    );

    let file = File::create(&cli.output)
        .with_context(|| format!("failed to create {}", cli.output.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &artifact)?;

    println!("Results saved to file \"{}\".", cli.output.display());
    Ok(())
}
