use ambientcc::{run_workers, VolumeAssembler, VolumeConfig};
use clap::Parser;
use std::path::PathBuf;

/// Reassemble second-stage seismograms into a 3D volume file
#[derive(Parser, Debug)]
#[command(name = "assemble_volume", version, about)]
struct Args {
    /// Example directory containing OUTPUT_FILES_step2/ and DATA/
    example_dir: PathBuf,

    /// Seismogram data-type suffix letter (e.g. 'v' for .semv files)
    data_type: String,

    /// First component letter of the correlation pair
    icomp: String,

    /// Second component letter of the correlation pair
    jcomp: String,

    /// Optional output-name suffix
    #[arg(default_value = "")]
    fname: String,

    /// Worker pool size; must divide the grid's y dimension
    #[arg(long, default_value_t = 1)]
    workers: usize,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let assembler = VolumeAssembler::new(VolumeConfig {
        example_dir: args.example_dir,
        data_type: args.data_type,
        icomp: args.icomp,
        jcomp: args.jcomp,
        fname: args.fname,
    })?;

    run_workers(args.workers, |ctx| {
        if let Some(path) = assembler.run(&ctx)? {
            log::info!("Assembled volume written to {}", path.display());
        }
        Ok(())
    })?;
    Ok(())
}
