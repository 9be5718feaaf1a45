//! Writes the default operator config, including the upgrade graph, as YAML.
//!
//! Usage: `generate-update-graph <file>`

use anyhow::Context;
use std::env;
use std::fs;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use update_graph::default_operator_config;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let [path] = args.as_slice() else {
        eprintln!("must provide filename");
        eprintln!("usage: generate-update-graph <file>");
        return ExitCode::FAILURE;
    };

    match generate(path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Failed to generate update graph: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn generate(path: &str) -> anyhow::Result<()> {
    let config = default_operator_config().context("building update graph")?;
    let yaml = config.to_yaml().context("rendering update graph")?;
    fs::write(path, yaml).with_context(|| format!("writing {path}"))?;

    info!(
        path,
        channels = config.update_graph.channels.len(),
        "Wrote update graph"
    );
    Ok(())
}
