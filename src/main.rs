use clap::Parser;

use container_resource_exporter::cli::Args;
use container_resource_exporter::config::Config;

/// Entry point of the container resource exporter.
///
/// Loads the YAML configuration, then collects per-container cgroup and memory-map
/// metrics on the configured interval and serves them for Prometheus until SIGINT or
/// SIGTERM.
///
/// # Examples
///
/// ```bash
/// container-resource-exporter --config /etc/container-resource-exporter/config.yaml
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(err) => {
            container_resource_exporter::init_logging(None);
            log::error!(
                "Failed to load configuration from {}: {}",
                args.config.display(),
                err
            );
            return Err(container_resource_exporter::Error::from(err).into());
        }
    };
    container_resource_exporter::init_logging(Some(&config));

    container_resource_exporter::run(config).await?;
    Ok(())
}
