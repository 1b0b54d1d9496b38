use scanpipe_core::config::ScanpipeConfig;
use scanpipe_core::exporter::Exporter;
use scanpipe_core::feeder::{Feeder, RandomFeeder};
use scanpipe_core::fetcher::FetcherRegistry;
use scanpipe_core::xml::XmlExporter;

use clap::Parser;
use std::fs::File;
use std::io::Write;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Generates random scan targets and writes them as an XML scanning report.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(short, long, value_parser)]
    config_file: Option<PathBuf>,
    /// Address whose octets are kept where the mask fixes them.
    #[clap(short, long)]
    prototype: Option<Ipv4Addr>,
    /// Per-octet mask, e.g. `255..0.0` or `/24`.
    #[clap(short, long)]
    mask: Option<String>,
    #[clap(short = 'n', long)]
    count: Option<u32>,
    #[clap(short, long)]
    seed: Option<u64>,
    /// Feeder setup in `prototype:::mask:::count` form; overrides the other feeder options.
    #[clap(long)]
    restore: Option<String>,
    #[clap(short, long)]
    output: Option<PathBuf>,
    #[clap(long)]
    append: bool,
    /// Print the serialized feeder setup and exit.
    #[clap(long)]
    print_config: bool,
}

fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config_file {
        Some(config_path) => {
            info!("Loading configuration from specified path: {config_path:?}");
            ScanpipeConfig::load_from_file(config_path)?
        }
        None => {
            let default_config_path = PathBuf::from("scanpipe.toml");
            if default_config_path.exists() {
                info!("No config file specified, loading default: {default_config_path:?}");
                ScanpipeConfig::load_from_file(&default_config_path)?
            } else {
                ScanpipeConfig::default()
            }
        }
    };

    if let Some(prototype) = cli.prototype {
        config.feeder.prototype = prototype;
    }
    if let Some(mask) = cli.mask {
        config.feeder.mask = mask;
    }
    if let Some(count) = cli.count {
        config.feeder.count = count;
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    if cli.output.is_some() {
        config.export.output = cli.output;
    }
    config.export.append |= cli.append;

    let mut feeder = match config.seed {
        Some(seed) => RandomFeeder::with_seed(config.feeder.clone(), seed)?,
        None => RandomFeeder::new(config.feeder.clone())?,
    };
    if let Some(serialized) = &cli.restore {
        feeder.restore(serialized)?;
    }

    if cli.print_config {
        println!("{}", feeder.serialize());
        return Ok(());
    }

    let mut exporter = match &config.export.website {
        Some(website) => XmlExporter::new().with_website(website),
        None => XmlExporter::new(),
    };
    exporter.set_append(config.export.append)?;
    let registry = FetcherRegistry::new(config.export.fetchers.iter().cloned())?;

    let sink: Box<dyn Write + Send> = match &config.export.output {
        Some(path) => {
            let path = match path.extension() {
                Some(_) => path.clone(),
                None => path.with_extension(exporter.file_extension()),
            };
            info!("Writing {} report to {path:?}", exporter.label());
            let file = File::create(&path)
                .map_err(|e| anyhow::anyhow!("Failed to create report file {:?}: {}", path, e))?;
            Box::new(file)
        }
        None => Box::new(std::io::stdout()),
    };

    if registry.len() > 1 {
        warn!(
            fetchers = registry.len() - 1,
            "No probes run in this driver, only addresses are exported"
        );
    }

    info!("Starting export of {}", feeder.session_info());
    let start_time = Instant::now();
    let mut session = exporter.start(sink, registry.clone(), &feeder.session_info())?;

    while feeder.has_next() {
        let addr = feeder.next_address()?;
        session.next_row(&registry.address_only_row(addr))?;
    }
    let rows = session.rows_written();
    session.end()?;

    info!(
        "Exported {} addresses in {:.2?}",
        rows,
        start_time.elapsed()
    );
    Ok(())
}
