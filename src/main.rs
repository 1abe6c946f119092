use clap::Parser;
use ocr_runner::{run, Args};
use std::process::ExitCode;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    // stdout carries the result, so logs only ever go to stderr and stay off unless RUST_LOG asks for them
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::OFF.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    // Panics are reported through the JSON error, so the default hook must not write to stderr
    std::panic::set_hook(Box::new(|info| tracing::error!("{info}")));

    let args = Args::parse();
    let outcome = run(&args.request(), &args.options());

    let code = outcome.emit(&mut std::io::stdout().lock(), &mut std::io::stderr().lock());
    ExitCode::from(code)
}
