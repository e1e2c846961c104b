use anyhow::Context;
use clap::Parser;
use inodefs::dump::TreeDump;
use inodefs::{DiskConfig, SimFs};
use std::path::PathBuf;

/// Loads the master file table and the block allocation table of a
/// simulated disk and prints both.
#[derive(Parser, Debug, PartialEq)]
#[command(version, about, long_about = None)]
struct Cli {
    /// the name of the master file table
    mft: PathBuf,
    /// the name of the block allocation table
    bat: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::builder().format_timestamp_nanos().init();
    let args = Cli::parse();
    let config = DiskConfig::new(&args.mft, &args.bat)?;

    let mut fs = SimFs::open(&config);
    let root = fs
        .load(&mut config.mft())
        .with_context(|| format!("failed to load {}", config.mft_path().display()))?;
    let disk = fs
        .dump_bitmap()
        .with_context(|| format!("failed to read {}", config.bat_path().display()))?;

    print!("{}", TreeDump(&root));
    print!("{}", disk);
    root.teardown();
    Ok(())
}
