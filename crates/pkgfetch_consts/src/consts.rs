use std::sync::LazyLock;

use console::Style;

pub const PKGFETCH_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const USER_AGENT: &str = concat!("pkgfetch/", env!("CARGO_PKG_VERSION"));

/// Name of the directory below the system temp dir that holds the cache root.
pub const CACHE_DIR: &str = "pkgfetch";
pub const CONFIG_DIR: &str = "pkgfetch";
pub const CONFIG_FILE: &str = "config.toml";
pub const PKGFETCH_DIR: &str = ".pkgfetch";

pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Version specifier used when a package is requested without `@spec`.
pub const DEFAULT_VERSION_SPEC: &str = "*";

/// Separates the package identity from the reference in cache keys, e.g.
/// `component-type@1.0.0`.
pub const REF_SEPARATOR: char = '@';

/// Number of entries requested per page when listing tags and branches.
pub const LISTING_PAGE_SIZE: usize = 100;

pub const DEFAULT_CONCURRENT_DOWNLOADS: usize = 50;

pub const ENV_CACHE_DIR: &str = "PKGFETCH_CACHE_DIR";
pub const ENV_HOME: &str = "PKGFETCH_HOME";
pub const ENV_TOKEN: &str = "PKGFETCH_TOKEN";
pub const ENV_NETRC: &str = "NETRC";
/// Token variables consulted by the credential chain, in order.
pub const ENV_GITHUB_TOKENS: &[&str] = &["GH_TOKEN", "GITHUB_TOKEN"];

pub const CLAP_GLOBAL_OPTIONS: &str = "Global Options";
pub const CLAP_CONFIG_OPTIONS: &str = "Config Options";

pub static PACKAGE_STYLE: LazyLock<Style> = LazyLock::new(|| Style::new().cyan());
pub static REF_STYLE: LazyLock<Style> = LazyLock::new(|| Style::new().green());
