use ambientcc::{run_workers, PartitionedSourceBuilder, QuantityType, SourceBuilderConfig};
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;

/// Build time-reversed driving sources from first-stage seismograms
#[derive(Parser, Debug)]
#[command(name = "build_sources", version, about)]
struct Args {
    /// Example directory containing OUTPUT_FILES_step1/ and DATA/
    example_dir: PathBuf,

    /// Physical quantity of the recorded traces: 'velocity' or 'pressure'
    cc_type: String,

    /// Low-pass cutoff in Hz, or 'None' to skip filtering
    freq_lp: String,

    /// Worker pool size
    #[arg(long, default_value_t = 1)]
    workers: usize,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let quantity: QuantityType = args.cc_type.parse()?;
    let freq_lp = parse_cutoff(&args.freq_lp)?;

    let builder = PartitionedSourceBuilder::new(SourceBuilderConfig {
        example_dir: args.example_dir,
        quantity,
        freq_lp,
    })?;

    run_workers(args.workers, |ctx| builder.run(&ctx))?;
    Ok(())
}

fn parse_cutoff(arg: &str) -> anyhow::Result<Option<f64>> {
    if arg == "None" {
        return Ok(None);
    }
    let freq = arg
        .parse::<f64>()
        .with_context(|| format!("freq_lp must be a frequency in Hz or 'None', got '{}'", arg))?;
    Ok(Some(freq))
}
