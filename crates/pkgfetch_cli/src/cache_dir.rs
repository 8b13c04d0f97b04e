use clap::Parser;
use pkgfetch_config::{Config, ConfigCli, get_cache_dir};

/// Print the directory packages are cached in.
#[derive(Parser, Debug)]
pub struct Args {
    #[clap(flatten)]
    pub config: ConfigCli,
}

pub async fn execute(args: Args) -> miette::Result<()> {
    let config = Config::with_cli_config(&args.config);
    println!("{}", get_cache_dir(&config).display());
    Ok(())
}
