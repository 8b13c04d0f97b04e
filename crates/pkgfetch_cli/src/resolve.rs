use clap::Parser;
use futures::future::try_join_all;
use pkgfetch_consts::consts;
use pkgfetch_package::PackageSpec;

use crate::cli_config::{RemoteConfig, coordinator};

/// Print the reference each package resolves to without downloading it.
#[derive(Parser, Debug)]
pub struct Args {
    /// The packages to resolve, as `owner/name[@version]`.
    #[arg(required = true, num_args = 1..)]
    pub packages: Vec<PackageSpec>,

    #[clap(flatten)]
    pub remote: RemoteConfig,
}

pub async fn execute(args: Args) -> miette::Result<()> {
    let config = args.remote.config();
    let coordinator = coordinator(&config)?;
    let token = args.remote.token(&config.api_url());

    let references = try_join_all(
        args.packages
            .iter()
            .map(|spec| coordinator.resolve(spec, token.as_deref())),
    )
    .await?;

    for (spec, reference) in args.packages.iter().zip(references) {
        println!(
            "{} {}",
            consts::PACKAGE_STYLE.apply_to(spec),
            consts::REF_STYLE.apply_to(reference)
        );
    }
    Ok(())
}
