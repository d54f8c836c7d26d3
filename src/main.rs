use clap::Parser;
use core_runtime::logging::init_logging;
use treesync_workspace::app::{self, Cli};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.logging_config())?;

    let config = cli.resolve_config()?;
    core_async::runtime::block_on_multi_thread(app::run(config))
}
