use anyhow::{bail, Result};
use clap::Parser;

mod cli;
mod config;
mod env;
mod error;
mod package;
mod pipeline;
mod stage;

use stage::StageId;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    run(cli)
}

fn run(cli: cli::Cli) -> Result<()> {
    let root = std::env::current_dir()?;
    let registry = stage::Registry::builtin()?;

    let selected = cli.selection(registry.stages().iter().map(|stage| stage.id));
    if selected.is_empty() {
        bail!("nothing to do: every stage was skipped");
    }
    let order = registry.resolve(&selected)?;

    // Tools only some runs need are only required by those runs.
    let mut extra_tools = Vec::new();
    if order.contains(&StageId::Libdispatch) {
        extra_tools.push("ninja");
    }
    if cli.package.is_some() {
        extra_tools.push("tar");
    }
    let resolved = env::resolve(&root, &extra_tools)?;

    let config = config::BuildConfig::new(
        root,
        resolved.devkitpro,
        resolved.versions,
        cli.configuration,
        cli.install_destdir.clone(),
        !cli.no_reconfigure,
        cli.skip_built,
    );

    if cli.dry_run {
        pipeline::dry_run(&config, &registry, &order)?;
        if let Some(dest) = &cli.package {
            println!(
                "package  [{}]  would write {}.tar.gz",
                dest.display(),
                config.dist_name
            );
        }
        return Ok(());
    }

    println!(
        "=== Building {} into {} ===",
        names(&order),
        config.install_destdir.display()
    );
    let report = pipeline::run(&config, &registry, &order);
    for result in &report.results {
        println!(
            "  {:12} {} in {:.1?}",
            result.stage.as_str(),
            result.outcome.label(),
            result.duration
        );
    }
    if let Some(err) = report.error {
        return Err(err.into());
    }
    println!("=== Done building {} ===", names(&order));

    if let Some(dest) = &cli.package {
        let archive = package::package(&config, &registry, &report.completed(), dest)?;
        println!("=== Done writing {} ===", archive.display());
    }
    Ok(())
}

fn names(order: &[StageId]) -> String {
    order
        .iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
