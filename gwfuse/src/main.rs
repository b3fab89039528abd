mod api;
mod cli;
mod error;
mod mountpoint;

use std::path::PathBuf;

use error::{Error, Result};

fn main() {
    let matches = cli::parse_flags();
    if let Err(err) = run(&matches) {
        eprintln!("ERROR: {}", err);
        std::process::exit(1);
    }
}

fn run(matches: &clap::ArgMatches) -> Result<()> {
    let level_name = matches.value_of("loglevel").unwrap_or("info");
    let level = cli::log_level(level_name)
        .ok_or_else(|| Error::CliInput(format!("Unrecognized log level: {}", level_name)))?;
    env_logger::Builder::new().filter_level(level).init();

    let timeout: u64 = matches
        .value_of("http-timeout")
        .unwrap_or("20")
        .parse()
        .map_err(|_| Error::CliInput("http-timeout must be a number of seconds".to_string()))?;

    let mount = match matches.value_of("mount") {
        Some(path) => {
            let path = PathBuf::from(path);
            mountpoint::check_mount_point(&path)?;
            path
        }
        None => mountpoint::default_mount_point()?,
    };

    let metadata_url = require_env("GATEWAY_METADATA_API")?;
    let data_url = require_env("GATEWAY_DATA_API")?;
    let password = match std::env::var("GATEWAY_PASSWORD") {
        Ok(password) => {
            log::info!("Using password from environment variable GATEWAY_PASSWORD");
            password
        }
        Err(_) => rpassword::prompt_password("Enter password: ")?,
    };

    let client = api::Client::new(&metadata_url, &data_url, &password, timeout)?;
    let fs = gateway::Gateway::new(client);
    gateway::mount(fs, &mount, matches.is_present("debug"))?;
    Ok(())
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| Error::Config(format!("Environment variable {} not set", name)))
}
