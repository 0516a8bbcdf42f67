use clap::Parser;

use velo_route::cli::{init_tracing, Cli};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format());
    cli.run()
}
