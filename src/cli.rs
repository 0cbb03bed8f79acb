use crate::config::{Config, get_config_path, load_config, save_config};
use crate::utils::AssessError;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "assessd")]
#[command(about = "assessd - session and rate limiting daemon for the maturity assessment")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Display version information
    Version,

    /// Run the HTTP daemon
    Serve {
        /// Address to listen on (overrides config and ASSESSD_BIND)
        #[arg(long)]
        bind: Option<String>,

        /// Path to config.json (default: ~/.assessd/config.json)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Write a default config.json
    Init {
        /// Destination (default: ~/.assessd/config.json)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective rate-limit route table
    Routes {
        /// Path to config.json (default: ~/.assessd/config.json)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

/// Dispatches a parsed command line and exits with the appropriate status
pub fn run(cli: Cli) {
    match cli.command {
        Some(Commands::Version) => {
            print_version();
            process::exit(0);
        }
        Some(Commands::Serve { bind, config }) => {
            let config = load_or_exit(bind, config);
            let runtime = match tokio::runtime::Runtime::new() {
                Ok(runtime) => runtime,
                Err(e) => {
                    eprintln!("error: failed to start async runtime: {}", e);
                    process::exit(1);
                }
            };
            if let Err(e) = runtime.block_on(crate::gateway::run_gateway(&config)) {
                report_error(&e);
                process::exit(1);
            }
        }
        Some(Commands::Init { config, force }) => {
            if let Err(e) = init_config(config, force) {
                report_error(&e);
                process::exit(1);
            }
        }
        Some(Commands::Routes { config }) => {
            let config = load_or_exit(None, config);
            print!("{}", format_routes(&config));
        }
        None => {
            print_help();
            process::exit(0);
        }
    }
}

fn load_or_exit(bind: Option<String>, path: Option<PathBuf>) -> Config {
    match load_config(bind, path) {
        Ok(config) => config,
        Err(e) => {
            report_error(&e);
            process::exit(1);
        }
    }
}

/// Writes the default configuration, refusing to clobber an existing file
/// unless `force` is set. Returns the path written.
pub fn init_config(path: Option<PathBuf>, force: bool) -> anyhow::Result<PathBuf> {
    let path = path
        .or_else(get_config_path)
        .ok_or_else(|| AssessError::config("cannot determine home directory; pass --config"))?;

    if path.exists() && !force {
        return Err(AssessError::config(format!(
            "{} already exists; pass --force to overwrite",
            path.display()
        ))
        .into());
    }

    save_config(&Config::default(), &path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(path)
}

/// Prints an error chain and, when the root cause carries one, its suggestion
fn report_error(err: &anyhow::Error) {
    eprintln!("error: {:#}", err);
    if let Some(suggestion) = err.downcast_ref::<AssessError>().and_then(|e| e.suggestion()) {
        eprintln!("Suggestion: {}", suggestion);
    }
}

/// Renders the route table, one route per line
pub fn format_routes(config: &Config) -> String {
    if config.rate_limit.routes.is_empty() {
        return "No rate-limited routes configured\n".to_string();
    }

    let width = config
        .rate_limit
        .routes
        .keys()
        .map(|route| route.len())
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    for (route, limit) in &config.rate_limit.routes {
        out.push_str(&format!(
            "{:<width$}  {} requests / {} ms\n",
            route,
            limit.max,
            limit.window_ms,
            width = width
        ));
    }
    out
}

pub fn extract_command_from_error(error_msg: &str) -> String {
    // Pull the quoted name out of "error: unrecognized subcommand 'foo'"
    if let Some(start) = error_msg.find('\'') {
        if let Some(end) = error_msg[start + 1..].find('\'') {
            return error_msg[start + 1..start + 1 + end].to_string();
        }
    }
    "unknown".to_string()
}

fn print_version() {
    println!("assessd {}", env!("CARGO_PKG_VERSION"));
}

pub fn print_help() {
    println!("assessd - session and rate limiting daemon for the maturity assessment");
    println!();
    println!("Usage: assessd [OPTIONS] <COMMAND>");
    println!();
    println!("Commands:");
    println!("  version  Display version information");
    println!("  serve    Run the HTTP daemon");
    println!("  init     Write a default config.json");
    println!("  routes   Print the effective rate-limit route table");
    println!("  help     Print this message or the help of the given subcommand(s)");
    println!();
    println!("Options:");
    println!("  -v, --verbose  Enable debug logging");
    println!("  -V, --version  Print version");
    println!("  -h, --help     Print help");
}
