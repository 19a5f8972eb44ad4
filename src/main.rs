mod activity_log;
mod cli;
mod config;
mod database;
mod employees;
mod error;
mod migration;
mod schema;
mod utils;

use cli::Cli;
use config::Config;
use directories::ProjectDirs;
use error::WashDeskError;
use flexi_logger::{Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming};
use log::{debug, error};

const LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;
const LOG_FILES_KEPT: usize = 5;

fn start_logger(project_dirs: &ProjectDirs, config: &Config) -> Result<LoggerHandle, WashDeskError> {
    let log_dir = project_dirs.data_local_dir().join("logs");

    Logger::try_with_str(&config.logging.washdesk)
        .and_then(|logger| {
            logger
                .log_to_file(FileSpec::default().directory(log_dir).basename("washdesk"))
                .duplicate_to_stderr(Duplicate::Warn)
                .format_for_files(flexi_logger::detailed_format)
                .rotate(
                    Criterion::Size(LOG_FILE_SIZE),
                    Naming::Timestamps,
                    Cleanup::KeepLogFiles(LOG_FILES_KEPT),
                )
                .start()
        })
        .map_err(|e| WashDeskError::Error(format!("Failed to start logger: {}", e)))
}

fn main() {
    let Some(project_dirs) = ProjectDirs::from("", "", "washdesk") else {
        eprintln!("Could not determine a data directory for washdesk");
        std::process::exit(1);
    };

    let config = Config::load_config(&project_dirs);

    // Keep the handle alive for the life of the process or logging stops
    let _logger = match start_logger(&project_dirs, &config) {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!("{}", e);
            None
        }
    };

    debug!("Command-line args: {:?}", std::env::args_os().collect::<Vec<_>>());

    if let Err(err) = Cli::handle_command_line(&config) {
        error!("{:?}", err);
        eprintln!("{}", err);
        std::process::exit(1);
    }
}
