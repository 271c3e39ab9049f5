use clap::Parser;
use harvest_core::logging;

mod cli;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let cfg = match cli.load_config() {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("harvest error: {:#}", err);
            std::process::exit(1);
        }
    };

    if !cfg.logging.to_file {
        logging::init_logging_stderr(&cfg.logging);
    } else if let Err(e) = logging::init_logging(&cfg.logging) {
        logging::init_logging_stderr(&cfg.logging);
        tracing::warn!("log file unavailable, logging to stderr: {:#}", e);
    }

    if let Err(err) = cli.run(cfg).await {
        eprintln!("harvest error: {:#}", err);
        std::process::exit(1);
    }
}
