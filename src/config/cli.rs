//! Command-line argument parser

use thiserror::Error;

use super::Config;

/// Errors produced while parsing command-line arguments
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing argument for {0}")]
    MissingArgument(String),

    #[error("invalid value for {flag}: {value}")]
    InvalidValue { flag: String, value: String },

    #[error("unknown argument: {0}")]
    UnknownArgument(String),
}

/// Parse command-line arguments (without the program name)
pub fn parse_cli_args(args: &[String]) -> Result<Config, ConfigError> {
    let mut config = Config::default();
    let mut i = 0;

    while i < args.len() {
        match args[i].as_str() {
            "--port" | "-p" => {
                let value = take_value(args, i, "--port")?;
                config.port = value
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        flag: "--port".into(),
                        value: value.clone(),
                    })?;
                i += 2;
            }
            "--bind" => {
                config.bind = take_value(args, i, "--bind")?;
                i += 2;
            }
            "--dir" => {
                config.dir = take_value(args, i, "--dir")?;
                i += 2;
            }
            "--dbfilename" => {
                config.dbfilename = take_value(args, i, "--dbfilename")?;
                i += 2;
            }
            "--replicaof" => {
                // Accept both the quoted "host port" form and two
                // separate arguments
                let first = take_value(args, i, "--replicaof")?;
                if let Some((host, port)) = first.split_once(' ') {
                    config.replicaof = Some((host.to_string(), parse_port(&first, port)?));
                    i += 2;
                } else {
                    let port = args
                        .get(i + 2)
                        .ok_or_else(|| ConfigError::MissingArgument("--replicaof".into()))?;
                    config.replicaof = Some((first, parse_port(port, port)?));
                    i += 3;
                }
            }
            other => return Err(ConfigError::UnknownArgument(other.to_string())),
        }
    }

    Ok(config)
}

fn take_value(args: &[String], index: usize, flag: &str) -> Result<String, ConfigError> {
    args.get(index + 1)
        .cloned()
        .ok_or_else(|| ConfigError::MissingArgument(flag.to_string()))
}

fn parse_port(context: &str, port: &str) -> Result<u16, ConfigError> {
    port.parse().map_err(|_| ConfigError::InvalidValue {
        flag: "--replicaof".into(),
        value: context.to_string(),
    })
}

/// Print usage information
pub fn print_help() {
    println!("Usage: hematite [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --port, -p    <port>        TCP port to listen on (default: 6379)");
    println!("  --bind        <address>     Interface to bind to (default: 0.0.0.0)");
    println!("  --dir         <dir>         Working directory for the RDB snapshot");
    println!("  --dbfilename  <filename>    RDB snapshot filename");
    println!("  --replicaof   \"<host> <port>\"  Replicate from the given master");
}
