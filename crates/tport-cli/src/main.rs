//! 🚀 tport: the front door. Parses flags, sets up logging, hands off to
//! `commands`, and translates whatever comes back into an exit code.
//!
//! 🎬 *[narrator voice]* "The JSON lines had been waiting in that file for years.
//! Today, they would finally leave home."

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod prompt;

use cli::Cli;

/// 📡 -v / -vv turn up our own crates; the dependencies stay at warn unless
/// RUST_LOG says otherwise.
fn init_tracing(verbose: u8) {
    let default_directives = match verbose {
        0 => "warn,tport=info,tport_cli=info",
        1 => "info,tport=debug,tport_cli=debug",
        _ => "debug,tport=trace,tport_cli=trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// 🕵️ Does any layer of this error smell like "nobody is listening"?
fn looks_like_connection_trouble(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        let cause = cause.to_string();
        cause.contains("error sending request")
            || cause.contains("connection refused")
            || cause.contains("Connection refused")
            || cause.contains("tcp connect error")
            || cause.contains("dns error")
            || cause.contains("Server selection timeout")
            || cause.contains("dispatch failure")
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = commands::run(cli).await {
        error!("💀 error: {}", err);
        // -- 🧅 peel the onion, one layer at a time
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
        }

        if looks_like_connection_trouble(&err) {
            error!(
                "🔧 hint: looks like a backend isn't reachable. \
                Check the host/endpoint/broker settings (flags, TPORT_* env vars, ~/.tport.toml) \
                and that the service is actually running. If it lives in Docker: \
                `docker ps` to see what's up, `docker compose up -d` to wake it. ☕"
            );
        }

        std::process::exit(1);
    }
}
