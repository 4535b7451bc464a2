use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use notebox::{App, Cli, Config, Notebook, Result};

fn initialize_logger(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_secs()
        .format_module_path(true)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = match &cli.data_dir {
        Some(data_dir) => {
            let loaded = Config::load(&path)?;
            Config {
                preview_length: loaded.preview_length,
                ..Config::with_data_dir(data_dir)
            }
        }
        None => Config::load(&path)?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    initialize_logger(cli.verbose);

    let outcome = async {
        let config = load_config(&cli)?;
        info!("Using data directory {}", config.data_dir.display());
        let notebook = Notebook::open(config).await?;
        App::new(notebook, cli.verbose).run(cli.command).await
    }
    .await;

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
