use std::fs;

use clap::Parser;
use log::LevelFilter;

use certgen::cli::{self, Cli};
use certgen::config::Config;
use certgen::layout::OutputLayout;

fn main() {
    let cli = Cli::parse();

    let level = if cli.debug {
        LevelFilter::Debug
    } else if cli.verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level).parse_default_env();
    if let Some(log_file) = open_log_file() {
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }
    builder.init();

    if let Err(err) = cli::run(cli) {
        eprintln!("========ERROR========");
        eprintln!("{err}");
        eprintln!("=====================");
        std::process::exit(1);
    }
}

/// Append to the configured log file when the managed tree is already
/// initialized; before `init` (or on any problem) logs stay on stderr.
fn open_log_file() -> Option<fs::File> {
    let config = Config::load().ok()?;
    let layout = OutputLayout::resolve(&config);
    if !layout.log.is_dir() {
        return None;
    }
    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(layout.log.join(&config.default.log_file))
        .ok()
}
