//! Command-line interface.

use crate::config::Configuration;
use crate::stage::StageId;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "klepto-builder")]
#[command(about = "Builds and installs the klepto Swift toolchain for Switch homebrew")]
#[command(version)]
pub struct Cli {
    /// Build only the given stages (comma separated)
    #[arg(long, value_enum, value_delimiter = ',', value_name = "STAGE,...")]
    pub only: Vec<StageId>,

    /// Skip the given stages (comma separated)
    #[arg(long, value_enum, value_delimiter = ',', value_name = "STAGE,...")]
    pub skip: Vec<StageId>,

    /// Where to install (default: ./dist/<dist name>)
    #[arg(long, value_name = "PATH")]
    pub install_destdir: Option<PathBuf>,

    /// Configuration to build
    #[arg(long, value_enum, default_value_t = Configuration::Release)]
    pub configuration: Configuration,

    /// Create a .tar.gz package of the installed stages, optionally giving
    /// a destination directory
    #[arg(long, value_name = "DIR", num_args = 0..=1, default_missing_value = "dist")]
    pub package: Option<PathBuf>,

    /// Print the resolved build plan without building anything (all checks
    /// still run)
    #[arg(long)]
    pub dry_run: bool,

    /// Don't reconfigure before building
    #[arg(long)]
    pub no_reconfigure: bool,

    /// Skip stages whose artifacts already exist
    #[arg(long)]
    pub skip_built: bool,
}

impl Cli {
    /// Stages to run: `--only` narrows, `--skip` removes, default is all.
    pub fn selection(&self, all: impl Iterator<Item = StageId>) -> Vec<StageId> {
        all.filter(|id| self.only.is_empty() || self.only.contains(id))
            .filter(|id| !self.skip.contains(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [StageId; 5] = [
        StageId::Icu,
        StageId::Toolchain,
        StageId::Libdispatch,
        StageId::Swiftpm,
        StageId::Frontend,
    ];

    fn parse(args: &[&str]) -> Cli {
        match Cli::try_parse_from(std::iter::once("klepto-builder").chain(args.iter().copied())) {
            Ok(cli) => cli,
            Err(err) => unreachable!("arguments must parse: {err}"),
        }
    }

    #[test]
    fn test_default_selection_is_everything() {
        let cli = parse(&[]);
        assert_eq!(cli.selection(ALL.into_iter()), ALL.to_vec());
    }

    #[test]
    fn test_only_narrows_selection() {
        let cli = parse(&["--only", "toolchain,swiftpm"]);
        assert_eq!(
            cli.selection(ALL.into_iter()),
            vec![StageId::Toolchain, StageId::Swiftpm]
        );
    }

    #[test]
    fn test_skip_removes_from_selection() {
        let cli = parse(&["--skip", "frontend"]);
        let selection = cli.selection(ALL.into_iter());
        assert_eq!(selection.len(), 4);
        assert!(!selection.contains(&StageId::Frontend));
    }

    #[test]
    fn test_package_flag_without_value_defaults_to_dist() {
        let cli = parse(&["--package"]);
        assert_eq!(cli.package, Some(PathBuf::from("dist")));
        let cli = parse(&["--package", "out"]);
        assert_eq!(cli.package, Some(PathBuf::from("out")));
        let cli = parse(&[]);
        assert_eq!(cli.package, None);
    }

    #[test]
    fn test_unknown_stage_name_is_rejected_by_clap() {
        let result = Cli::try_parse_from(["klepto-builder", "--only", "kernel"]);
        assert!(result.is_err());
    }
}
