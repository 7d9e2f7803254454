use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use apply_mailer::config::{Settings, config_path, load_config, resolve_db_path, write_template};
use apply_mailer::server::{ApiServer, AppState};

#[derive(Parser)]
#[command(name = "apply_mailer")]
#[command(about = "Job application relay: stores applicants and mails them out", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API
    Serve {
        /// Config file (defaults to the user config dir)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Listen address, overrides the config and PORT
        #[arg(long)]
        bind: Option<String>,
    },

    /// Write a template config file and exit
    InitConfig {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.cmd {
        Command::InitConfig { config } => {
            let path = match config {
                Some(p) => p,
                None => config_path()?,
            };
            if path.exists() {
                return Err(anyhow!("{} already exists", path.display()));
            }
            write_template(&path)?;
            println!("Wrote {}", path.display());
            Ok(())
        }

        Command::Serve { config, bind } => {
            let cfg = load_config(config.as_deref())
                .map_err(|e| anyhow!("Configuration error: {e:#}"))?;
            let db_path = resolve_db_path(&cfg)?;
            let mut settings = Settings::from_config(&cfg, db_path);
            if let Some(bind) = bind {
                settings.bind = bind;
            }

            log::info!(
                "database {}, uploads in {}",
                settings.db_path.display(),
                settings.upload_dir.display()
            );
            let state = AppState::from_settings(&settings)?;
            let server = ApiServer::bind(&settings.bind, state, settings.workers)?;

            let handle = server.shutdown_handle();
            ctrlc::set_handler(move || {
                log::info!("shutting down");
                handle.shutdown();
            })?;

            server.run()
        }
    }
}
