use std::sync::Arc;

use bandicon_collab::{BoxedDatabase, Collab, DatabaseError, MemoryDatabase, PgDatabase};
use colored::Colorize;
use config::Config;
use log::{error, info, warn};
use thiserror::Error;
use tokio::runtime::{self, Runtime};

mod config;
mod logging;

pub struct Bandicon {
    config: Config,
    collab: Arc<Collab>,
    runtime: Runtime,
}

#[derive(Debug, Error)]
pub enum BandiconError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Could not initialize database: {0}")]
    Database(#[from] DatabaseError),

    #[error("Server stopped: {0}")]
    Server(#[from] std::io::Error),

    #[error("Fatal error: {0}")]
    Fatal(String),
}

impl Bandicon {
    fn new(config: Config) -> Result<Self, BandiconError> {
        info!("Building async runtime...");
        let runtime = runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("bandicon-async")
            .build()
            .map_err(|e| BandiconError::Fatal(e.to_string()))?;

        let database: BoxedDatabase = match &config.database_url {
            Some(url) => {
                info!("Connecting to database...");

                let database = runtime.block_on(PgDatabase::new(url, config.max_connections))?;
                runtime.block_on(database.migrate())?;

                Box::new(database)
            }
            None => {
                warn!("DATABASE_URL is not set, using an in-memory database. Nothing will be saved.");
                Box::new(MemoryDatabase::new())
            }
        };

        let collab = Arc::new(Collab::new(database));
        runtime.block_on(collab.rooms.restore())?;

        Ok(Self {
            config,
            collab,
            runtime,
        })
    }

    fn run(&self) -> Result<(), BandiconError> {
        self.runtime
            .block_on(bandicon_server::run_server(
                self.collab.clone(),
                self.config.port,
            ))
            .map_err(BandiconError::Server)
    }
}

impl BandiconError {
    fn hint(&self) -> String {
        match self {
            BandiconError::Config(_) => "Check the BANDICON_SERVER_PORT, DATABASE_URL and BANDICON_DATABASE_MAX_CONNECTIONS environment variables.".to_string(),
            BandiconError::Database(_) => "This is a database error. Make sure the Postgres instance in DATABASE_URL is running and reachable, then try again.".to_string(),
            BandiconError::Server(_) => "The server could not listen. Make sure the port is not already in use.".to_string(),
            BandiconError::Fatal(_) => "This error is fatal, and should not happen.".to_string(),
        }
    }
}

fn main() {
    if let Err(e) = logging::init_logger() {
        eprintln!("Could not initialize logging: {e}");
    }

    let result = Config::from_env()
        .and_then(Bandicon::new)
        .and_then(|bandicon| {
            info!("Initialized successfully.");
            bandicon.run()
        });

    if let Err(error) = result {
        error!("{} Read the error below to troubleshoot the issue. If you think this might be a bug, please report it by making a GitHub issue.", "Bandicon failed to start!".bold().red());
        error!("{}", error);
        error!("{}", format!("Hint: {}", error.hint()).dimmed().italic());
    }
}
