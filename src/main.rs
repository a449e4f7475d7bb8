use tracing::{error, info, warn};

use minutag::web::WebServer;
use minutag::Config;

#[tokio::main]
async fn main() {
    // Load configuration, environment variables take precedence
    let config = match Config::load_with_env("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = minutag::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        minutag::logging::init_console_only(&config.logging.level);
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {e}");
        std::process::exit(1);
    }

    info!("MinuTAG - document uploader");
    if !config.drive.is_complete() {
        warn!("Drive configuration is incomplete; uploads will return an error");
    }

    let server = match WebServer::new(&config) {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to create web server: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run().await {
        error!("Web server error: {e}");
        std::process::exit(1);
    }
}
