use clap::Parser;

use appsync_resolver_uploader::cli::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    appsync_resolver_uploader::cli::run(cli)
}
