use clap::Parser;
use miette::{Context, IntoDiagnostic};
use pkgfetch_config::{Config, ConfigCli};
use pkgfetch_package::CacheStore;

use crate::cli_config::DirectoryConfig;

/// Remove every cached package.
#[derive(Parser, Debug)]
pub struct Args {
    #[clap(flatten)]
    pub directory: DirectoryConfig,

    #[clap(flatten)]
    pub config: ConfigCli,
}

pub async fn execute(args: Args) -> miette::Result<()> {
    let config = Config::with_cli_config(&args.config);
    let store = CacheStore::new(args.directory.directory(&config));
    store
        .clean()
        .await
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to remove {}", store.base_dir().display()))?;

    eprintln!(
        "{}Removed {}",
        console::style(console::Emoji("✔ ", "")).green(),
        store.base_dir().display()
    );
    Ok(())
}
