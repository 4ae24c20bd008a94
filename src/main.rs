#![allow(non_snake_case)]

use std::env;

use fieldBooking::cli;
use fieldBooking::config::{AppConfig, RunMode, Settings};
use fieldBooking::runtime;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match env::var("CONFIG_FILE") {
        Ok(path) => match AppConfig::from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                error!(error = %e, "could not load config file");
                std::process::exit(1);
            }
        },
        Err(_) => AppConfig::default(),
    };

    let settings = match Settings::load(&config) {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    let result = match settings.run_mode {
        RunMode::Api => runtime::run_api(settings).await,
        RunMode::Cli => match runtime::build_services(&settings) {
            Ok(services) => {
                cli::cli(services, &settings).await;
                Ok(())
            }
            Err(e) => Err(e),
        },
    };
    if let Err(e) = result {
        error!(error = %e, "startup failed");
        std::process::exit(1);
    }
}
