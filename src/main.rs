use clap::Parser;
use env_logger::Env;
use log::{debug, error};
use plate_console::cli::{self, Cli};
use plate_console::config::Config;
use std::process;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    debug!("Starting plate-console");

    let result = match Config::from_env() {
        Ok(config) => cli::run(cli, config).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        error!("{}", e);
        process::exit(1);
    }
}
