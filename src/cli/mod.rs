// ============================================================
// Layer 1: CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All detection logic is delegated to Layer 2 (application).
//
// Reports are printed as pretty JSON on stdout, or written to
// the file given with --out.
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use std::{fs, path::PathBuf};

use commands::{AnchorsArgs, AssignArgs, Commands, InitConfigArgs, ProbeArgs, ProposeArgs};
use crate::data::dump::TensorDumpLoader;
use crate::domain::{config::CtpnConfig, traits::ConfigSource};
use crate::infra::config_store::ConfigStore;

#[derive(Parser, Debug)]
#[command(
    name = "ctpn",
    version = "0.1.0",
    about = "Anchor-based text-line proposals (CTPN): anchors, targets, proposals and losses."
)]
pub struct Cli {
    /// JSON configuration file (defaults are used when omitted)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match &self.command {
            Commands::Anchors(args)    => self.run_anchors(args),
            Commands::Propose(args)    => self.run_propose(args),
            Commands::Assign(args)     => self.run_assign(args),
            Commands::CheckConfig      => self.run_check_config(),
            Commands::InitConfig(args) => self.run_init_config(args),
            Commands::Probe(args)      => self.run_probe(args),
        }
    }

    fn store(&self) -> ConfigStore {
        match &self.config {
            Some(path) => ConfigStore::new(path),
            None => ConfigStore::defaults(),
        }
    }

    fn load_config(&self) -> Result<CtpnConfig> {
        self.store().load_config()
    }

    fn run_anchors(&self, args: &AnchorsArgs) -> Result<()> {
        use crate::application::anchors_use_case::AnchorsUseCase;

        let report = AnchorsUseCase::new(&self.load_config()?)?.execute(args.grid());
        emit(&report, None)
    }

    fn run_propose(&self, args: &ProposeArgs) -> Result<()> {
        use crate::application::propose_use_case::ProposeUseCase;

        tracing::info!("Decoding proposals from '{}'", args.input.display());
        let use_case = ProposeUseCase::new(&self.load_config()?)?;
        let report = use_case.execute(&TensorDumpLoader::new(&args.input))?;
        emit(&report, args.out.as_ref())
    }

    fn run_assign(&self, args: &AssignArgs) -> Result<()> {
        use crate::application::assign_use_case::AssignUseCase;

        tracing::info!("Assigning anchor targets for '{}' (seed {})", args.input.display(), args.seed);
        let use_case = AssignUseCase::new(&self.load_config()?, args.seed)?;
        let report = use_case.execute(&TensorDumpLoader::new(&args.input))?;
        emit(&report, args.out.as_ref())
    }

    fn run_check_config(&self) -> Result<()> {
        let cfg = self.load_config()?;
        println!(
            "Configuration OK: {} backbone, {} anchors/cell, stride {}, {:?} regression",
            cfg.backbone,
            cfg.num_anchors(),
            cfg.feat_stride,
            cfg.regression
        );
        Ok(())
    }

    fn run_init_config(&self, args: &InitConfigArgs) -> Result<()> {
        if args.path.exists() && !args.force {
            bail!("'{}' already exists (use --force to overwrite)", args.path.display());
        }
        ConfigStore::new(&args.path).save(&CtpnConfig::default())?;
        println!("Default configuration written to '{}'", args.path.display());
        Ok(())
    }

    fn run_probe(&self, args: &ProbeArgs) -> Result<()> {
        use crate::application::probe_use_case::ProbeUseCase;

        let report = ProbeUseCase::new(self.load_config()?).execute(&args.into())?;
        emit(&report, None)
    }
}

/// Print `report` as pretty JSON, or write it to `out`.
fn emit<T: Serialize>(report: &T, out: Option<&PathBuf>) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    match out {
        Some(path) => {
            fs::write(path, json)
                .with_context(|| format!("Cannot write report to '{}'", path.display()))?;
            tracing::info!("Report written to '{}'", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use commands::parse_gt_box;

    #[test]
    fn test_parse_propose() {
        let cli = Cli::try_parse_from(["ctpn", "propose", "--input", "dump.json", "--config", "c.json"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("c.json")));
        match cli.command {
            Commands::Propose(args) => {
                assert_eq!(args.input, PathBuf::from("dump.json"));
                assert!(args.out.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_probe_with_repeated_gt() {
        let cli = Cli::try_parse_from([
            "ctpn", "probe", "--height", "32", "--gt", "0,0,15,15", "--gt", "16, 0, 31, 15",
        ])
        .unwrap();
        match cli.command {
            Commands::Probe(args) => {
                assert_eq!(args.height, 32);
                assert_eq!(args.width, 96);
                assert_eq!(args.gt_boxes.len(), 2);
                assert_eq!(args.gt_boxes[1].bbox.x1, 16.0);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_anchors_grid_needs_both_sides() {
        assert!(Cli::try_parse_from(["ctpn", "anchors", "--height", "4"]).is_err());
        let cli = Cli::try_parse_from(["ctpn", "anchors", "--height", "4", "--width", "6"]).unwrap();
        match cli.command {
            Commands::Anchors(args) => assert_eq!(args.grid(), Some([4, 6])),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_check_config_subcommand_name() {
        let cli = Cli::try_parse_from(["ctpn", "check-config"]).unwrap();
        assert!(matches!(cli.command, Commands::CheckConfig));
    }

    #[test]
    fn test_gt_box_parsing() {
        assert!(parse_gt_box("1,2,3").is_err());
        assert!(parse_gt_box("a,2,3,4").is_err());
        assert!(parse_gt_box("5,5,1,1").is_err());
        let gt = parse_gt_box("0,1,15,15").unwrap();
        assert_eq!(gt.class_id, 1);
    }
}
