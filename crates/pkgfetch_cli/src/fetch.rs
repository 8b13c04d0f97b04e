use std::sync::Arc;

use clap::Parser;
use futures::future::try_join_all;
use pkgfetch_consts::consts;
use pkgfetch_package::{Package, PackageSpec};

use crate::{
    cli_config::{DirectoryConfig, RemoteConfig, coordinator},
    progress::MultiProgressHandler,
};

/// Download packages into the cache unless they are already there.
#[derive(Parser, Debug)]
pub struct Args {
    /// The packages to fetch, as `owner/name[@version]`.
    #[arg(required = true, num_args = 1..)]
    pub packages: Vec<PackageSpec>,

    #[clap(flatten)]
    pub directory: DirectoryConfig,

    #[clap(flatten)]
    pub remote: RemoteConfig,
}

pub async fn execute(args: Args) -> miette::Result<()> {
    let config = args.remote.config();
    let coordinator = coordinator(&config)?;
    let token = args.remote.token(&config.api_url());
    let directory = args.directory.directory(&config);
    let progress = Arc::new(MultiProgressHandler::default());

    let packages: Vec<Package> = args
        .packages
        .into_iter()
        .map(|spec| {
            let mut package = Package::new(spec)
                .with_coordinator(coordinator.clone())
                .with_directory(&directory)
                .with_progress_handler(progress.clone());
            package.set_token(token.clone());
            package
        })
        .collect();

    let fetches = try_join_all(packages.iter().map(Package::fetch)).await?;
    for fetch in fetches {
        println!(
            "{} -> {}",
            consts::PACKAGE_STYLE.apply_to(&fetch.spec),
            fetch.path.display()
        );
    }
    Ok(())
}
