#![deny(clippy::dbg_macro, clippy::unwrap_used)]

use std::{env, io::IsTerminal};

use clap::{
    Parser,
    builder::styling::{AnsiColor, Color, Style},
};
use indicatif::ProgressDrawTarget;
use miette::IntoDiagnostic;
use pkgfetch_consts::consts;
use tracing::level_filters::LevelFilter;

pub mod cache_dir;
pub mod clean;
pub mod cli_config;
pub mod fetch;
pub mod progress;
pub mod resolve;

use progress::global_multi_progress;

#[derive(Parser, Debug)]
#[command(
    name = "pkgfetch",
    version(consts::PKGFETCH_VERSION),
    about = format!("
pkgfetch [version {}] - Resolve, download and cache hosted repository archives.

Basic Usage:
    Fetch the highest 1.x release of a package into the cache:
    $ pkgfetch fetch component/type@1.x

    Show what a version range resolves to:
    $ pkgfetch resolve component/type@^1.0.0
", consts::PKGFETCH_VERSION),
)]
#[clap(arg_required_else_help = true, styles=get_styles(), disable_help_flag = true)]
pub struct Args {
    #[command(subcommand)]
    command: Command,

    #[clap(flatten)]
    global_options: GlobalOptions,
}

#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Display help information
    #[clap(
        long,
        short,
        global = true,
        action = clap::ArgAction::Help,
        help_heading = consts::CLAP_GLOBAL_OPTIONS
    )]
    help: Option<bool>,

    /// Increase logging verbosity (-v for warnings, -vv for info, -vvv for debug, -vvvv for trace)
    #[clap(short, long, action = clap::ArgAction::Count, global = true, help_heading = consts::CLAP_GLOBAL_OPTIONS)]
    verbose: u8,

    /// Decrease logging verbosity (quiet mode)
    #[clap(short, long, action = clap::ArgAction::Count, global = true, help_heading = consts::CLAP_GLOBAL_OPTIONS)]
    quiet: u8,

    /// Whether the log needs to be colored.
    #[clap(long, default_value = "auto", global = true, env = "PKGFETCH_COLOR", help_heading = consts::CLAP_GLOBAL_OPTIONS)]
    color: ColorOutput,

    /// Hide all progress bars, always turned on if stderr is not a terminal.
    #[clap(long, default_value = "false", global = true, env = "PKGFETCH_NO_PROGRESS", help_heading = consts::CLAP_GLOBAL_OPTIONS)]
    no_progress: bool,
}

impl Args {
    /// Whether to show progress bars or not, based on the terminal and the user's preference.
    fn no_progress(&self) -> bool {
        if !std::io::stderr().is_terminal() {
            true
        } else {
            self.global_options.no_progress
        }
    }

    /// Determine the log level filter based on verbose and quiet counts.
    fn log_level_filter(&self) -> LevelFilter {
        match (self.global_options.quiet, self.global_options.verbose) {
            // Quiet mode overrides verbose
            (q, _) if q > 0 => LevelFilter::OFF,
            (_, 0) => LevelFilter::ERROR,
            (_, 1) => LevelFilter::WARN,
            (_, 2) => LevelFilter::INFO,
            (_, 3) => LevelFilter::DEBUG,
            (_, _) => LevelFilter::TRACE,
        }
    }
}

#[derive(Parser, Debug)]
pub enum Command {
    #[clap(visible_alias = "f")]
    Fetch(fetch::Args),
    #[clap(visible_alias = "r")]
    Resolve(resolve::Args),
    Clean(clean::Args),
    CacheDir(cache_dir::Args),
}

pub async fn execute() -> miette::Result<()> {
    let args = Args::parse();

    let no_progress = args.no_progress();

    set_console_colors(&args);

    let use_colors = console::colors_enabled_stderr();
    let in_ci = matches!(env::var("CI").as_deref(), Ok("1" | "true"));
    // Set up the default miette handler based on whether we want colors or not.
    miette::set_hook(Box::new(move |_| {
        Box::new(
            miette::MietteHandlerOpts::default()
                .color(use_colors)
                // Don't wrap lines in CI environments to avoid breaking logs.
                .wrap_lines(!in_ci)
                .build(),
        )
    }))?;

    if no_progress {
        global_multi_progress().set_draw_target(ProgressDrawTarget::hidden());
    }

    setup_logging(&args, use_colors)?;

    execute_command(args.command).await
}

pub async fn execute_command(command: Command) -> miette::Result<()> {
    match command {
        Command::Fetch(cmd) => fetch::execute(cmd).await,
        Command::Resolve(cmd) => resolve::execute(cmd).await,
        Command::Clean(cmd) => clean::execute(cmd).await,
        Command::CacheDir(cmd) => cache_dir::execute(cmd).await,
    }
}

/// The directives applied for a verbosity level, optionally followed by the
/// ones from `RUST_LOG`.
fn log_directives(level: LevelFilter, rust_log: Option<&str>) -> String {
    let (low_level_filter, pkgfetch_level) = match level {
        LevelFilter::OFF => (LevelFilter::OFF, LevelFilter::OFF),
        LevelFilter::ERROR => (LevelFilter::ERROR, LevelFilter::WARN),
        LevelFilter::WARN => (LevelFilter::WARN, LevelFilter::INFO),
        LevelFilter::INFO => (LevelFilter::WARN, LevelFilter::DEBUG),
        LevelFilter::DEBUG => (LevelFilter::INFO, LevelFilter::TRACE),
        LevelFilter::TRACE => (LevelFilter::TRACE, LevelFilter::TRACE),
    };
    let directives = format!(
        "pkgfetch={pkgfetch_level},pkgfetch_package={pkgfetch_level},pkgfetch_config={pkgfetch_level},pkgfetch_auth={pkgfetch_level},reqwest={low_level_filter},hyper={low_level_filter}"
    );
    match rust_log.filter(|directives| !directives.is_empty()) {
        Some(rust_log) => format!("{directives},{rust_log}"),
        None => directives,
    }
}

fn setup_logging(args: &Args, use_colors: bool) -> miette::Result<()> {
    use tracing_subscriber::{EnvFilter, prelude::*};

    use crate::progress::IndicatifWriter;

    let level_filter = args.log_level_filter();

    // Explicit verbosity flags win over RUST_LOG.
    let cli_verbosity_set = args.global_options.verbose > 0 || args.global_options.quiet > 0;
    let rust_log = if cli_verbosity_set {
        None
    } else {
        env::var("RUST_LOG").ok()
    };

    let env_filter = EnvFilter::builder()
        .with_default_directive(level_filter.into())
        .parse(log_directives(level_filter, rust_log.as_deref()))
        .into_diagnostic()?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_ansi(use_colors)
        .with_target(level_filter >= LevelFilter::DEBUG)
        .with_writer(IndicatifWriter::new(global_multi_progress()))
        .without_time();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
    Ok(())
}

/// Whether to use colored log format.
/// Option `Auto` enables color output only if the logging is done to a terminal
/// and  `NO_COLOR` environment variable is not set.
#[derive(clap::ValueEnum, Debug, Clone, Default)]
pub enum ColorOutput {
    Always,
    Never,

    #[default]
    Auto,
}

fn set_console_colors(args: &Args) {
    // Honor FORCE_COLOR and NO_COLOR environment variables.
    // Those take precedence over the CLI flag and PKGFETCH_COLOR
    let color = match env::var("FORCE_COLOR") {
        Ok(_) => &ColorOutput::Always,
        Err(_) => match env::var("NO_COLOR") {
            Ok(_) => &ColorOutput::Never,
            Err(_) => &args.global_options.color,
        },
    };

    match color {
        ColorOutput::Always => {
            console::set_colors_enabled(true);
            console::set_colors_enabled_stderr(true);
        }
        ColorOutput::Never => {
            console::set_colors_enabled(false);
            console::set_colors_enabled_stderr(false);
        }
        ColorOutput::Auto => {}
    };
}

pub fn get_styles() -> clap::builder::Styles {
    clap::builder::Styles::styled()
        .usage(
            Style::new()
                .bold()
                .underline()
                .fg_color(Some(Color::Ansi(AnsiColor::BrightGreen))),
        )
        .header(
            Style::new()
                .bold()
                .underline()
                .fg_color(Some(Color::Ansi(AnsiColor::BrightGreen))),
        )
        .literal(Style::new().fg_color(Some(Color::Ansi(AnsiColor::BrightCyan))))
        .invalid(
            Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Red))),
        )
        .error(
            Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Red))),
        )
        .valid(
            Style::new()
                .bold()
                .underline()
                .fg_color(Some(Color::Ansi(AnsiColor::Green))),
        )
        .placeholder(Style::new().fg_color(Some(Color::Ansi(AnsiColor::BrightCyan))))
}
