use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use amisim::{LinkVariant, Scenario, ScenarioConfig, ScenarioReport};

#[derive(Parser, Debug)]
#[command(name = "amisim", version, about = "IPv6 / 6LoWPAN echo scenarios over CSMA and LR-WPAN")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// CSMA access point plus 6LoWPAN stations
    Csma(CommonArgs),
    /// One LR-WPAN PAN with 6LoWPAN on every device
    Lrwpan {
        #[command(flatten)]
        common: CommonArgs,
        /// Re-broadcast frames for other nodes (mesh-under)
        #[arg(long = "mesh-under")]
        mesh_under: bool,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Number of nodes (at least 2)
    #[arg(long, default_value_t = 3)]
    nodes: u32,
    /// Width of the placement rectangle in meters
    #[arg(long = "area-width", default_value_t = 50)]
    area_width: u32,
    /// Height of the placement rectangle in meters
    #[arg(long = "area-height", default_value_t = 50)]
    area_height: u32,
    /// Simulated seconds to run
    #[arg(long, default_value_t = 10.0)]
    duration: f64,
    /// Log echo send/receive events
    #[arg(long, action = ArgAction::Set, default_value_t = true)]
    verbose: bool,
    /// Write pcap files for the traced devices
    #[arg(long)]
    tracing: bool,
    /// Seed for node placement
    #[arg(long, default_value_t = 1)]
    seed: u64,
    /// Directory for capture files
    #[arg(long = "output-dir", default_value = ".")]
    output_dir: PathBuf,
    /// Write the run report as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

impl CommonArgs {
    fn apply(&self, config: &mut ScenarioConfig) {
        config.nodes = self.nodes;
        config.area.width = self.area_width;
        config.area.height = self.area_height;
        config.duration_secs = self.duration;
        config.verbose = self.verbose;
        config.tracing = self.tracing;
        config.seed = self.seed;
        config.output_dir = self.output_dir.clone();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, report_path) = match cli.command {
        Command::Csma(common) => {
            let mut config = ScenarioConfig::wired();
            common.apply(&mut config);
            (config, common.report)
        }
        Command::Lrwpan { common, mesh_under } => {
            let mut config = ScenarioConfig::wireless();
            common.apply(&mut config);
            config.mesh_under = mesh_under;
            (config, common.report)
        }
    };

    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    if config.verbose {
        filter = filter.add_directive("amisim::app=info".parse()?);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let variant = config.variant;
    let scenario = Scenario::build(config).context("building scenario")?;
    let report = scenario.run().context("running scenario")?;

    print_summary(variant, &report);

    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(&path, json).with_context(|| format!("writing report to {}", path.display()))?;
        println!("  Report written to {}", path.display());
    }
    Ok(())
}

fn print_summary(variant: LinkVariant, report: &ScenarioReport) {
    println!("═══════════════════════════════════════════════════════");
    println!("  amisim — {} echo scenario", variant);
    println!("═══════════════════════════════════════════════════════");
    println!();
    println!(
        "  {} nodes, {} events, stopped at {}",
        report.nodes.len(),
        report.events_processed,
        report.end_time
    );
    for line in report.summary() {
        println!("    {}", line);
    }
    for device in &report.devices {
        println!(
            "    D{} on N{} ({}): tx {} / rx {} / dropped {} / relayed {}",
            device.id,
            device.node,
            device.address,
            device.stats.tx_frames,
            device.stats.rx_frames,
            device.stats.rx_dropped,
            device.stats.relayed
        );
    }
    for path in &report.captures {
        println!("    capture: {}", path.display());
    }
    println!();
    if report.client.received.is_empty() {
        println!("  ✗ No echo reply reached the client.");
    } else {
        println!("  ✓ Echo round trip complete.");
    }
}
