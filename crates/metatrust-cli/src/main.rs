use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

mod args;
mod cmd;
mod io;
mod output;

fn main() -> ExitCode {
    let cli = args::Cli::parse();
    output::init(cli.json);

    if let Err(e) = init_logging(&cli.log_filter) {
        output::error(&e);
        return ExitCode::FAILURE;
    }

    match cmd::dispatch(cli) {
        Ok(code) => code,
        Err(e) => {
            output::error(&e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(filter: &str) -> anyhow::Result<()> {
    // EnvFilter is not Clone, so it cannot be a clap value_parser.
    let filter = EnvFilter::builder().parse(filter).context(
        "METATRUST_LOG contains an invalid log directive; refer to \
            https://docs.rs/tracing-subscriber/0.3/tracing_subscriber/\
            filter/struct.EnvFilter.html#directives for format details.",
    )?;
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(stderr_layer).with(filter);
    tracing::subscriber::set_global_default(registry).context("logging already initialized")?;
    Ok(())
}
