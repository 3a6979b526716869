//! Entry point for pltguard.
//!
//! 1. Parse command-line arguments using `clap`.
//! 2. Read the memory map of the analyzed process.
//! 3. Map the ELF file and parse its headers (exit code 1 if it is not ELF).
//! 4. Run the hook detector and print the report to standard output.
//!
//! Diagnostics go to standard error through `tracing`.

use anyhow::{Context, Result};
use clap::Parser;
use memmap2::Mmap;
use std::fs::File;
use std::io::{self, BufReader};
use tracing_subscriber::EnvFilter;

use pltguard::config::Config;
use pltguard::detect::HookDetector;
use pltguard::image::Image;
use pltguard::maps;

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let config = Config::parse();
    init_tracing(&config.log_level);

    let regions = match &config.maps {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            maps::parse_maps(BufReader::new(file))?
        }
        None => maps::parse_maps(io::stdin().lock())?,
    };
    tracing::debug!("{} memory regions", regions.len());

    let file = File::open(&config.elf)
        .with_context(|| format!("failed to open {}", config.elf.display()))?;
    let mmap = unsafe { Mmap::map(&file)? };

    let image = match Image::parse(&mmap, Some(config.load_base)) {
        Ok(image) => image,
        Err(err) => {
            tracing::error!("{}: {}", config.elf.display(), err);
            std::process::exit(1);
        }
    };

    let report = HookDetector::new(&image, &regions)
        .run()
        .with_context(|| format!("failed to analyze {}", config.elf.display()))?;

    report.write_to(io::stdout().lock(), config.exports)?;
    Ok(())
}
