use std::path::PathBuf;

use clap::Parser;

/// Exports per-container cgroup and memory-map metrics in Prometheus format.
#[derive(Debug, Parser)]
#[command(name = "container-resource-exporter", version, about)]
pub struct Args {
    /// Path to the YAML configuration file.
    #[arg(short, long, env = "CRE_CONFIG", default_value = "config.yaml")]
    pub config: PathBuf,
}
