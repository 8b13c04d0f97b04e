use std::time::Duration;

use pkgfetch_consts::consts;
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};

use crate::Config;

/// Builds the HTTP client used to talk to the repository API.
///
/// No retry middleware is installed: failed requests are reported to the
/// caller, which decides whether to try again.
pub fn build_reqwest_client(config: &Config) -> reqwest::Result<ClientWithMiddleware> {
    if config.tls_no_verify() {
        tracing::warn!(
            "TLS verification is disabled. This is insecure and should only be used for testing or internal networks."
        );
    }

    let timeout = 5 * 60;
    let client = Client::builder()
        .pool_max_idle_per_host(20)
        .user_agent(consts::USER_AGENT)
        .danger_accept_invalid_certs(config.tls_no_verify())
        .read_timeout(Duration::from_secs(timeout))
        .build()?;

    Ok(ClientBuilder::new(client).build())
}
