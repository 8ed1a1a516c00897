use anyhow::Result;
use clap::Parser;
use ctpn::cli::Cli;
use tracing_subscriber::{filter::Directive, EnvFilter};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("ctpn=info".parse::<Directive>()?),
        )
        .init();

    let cli = Cli::parse();
    cli.run()
}
