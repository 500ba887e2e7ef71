use std::path::{Path, PathBuf};

use auth0_directory::{
    ConnectorConfig, ConnectorSettings, QueryFilter, Record, SerializeOptions,
    config::LogFormat, observability,
};
use clap::Parser;
use serde::{Serialize, de::DeserializeOwned};
use tracing::info;

#[derive(Parser, Debug)]
#[command(version, about = "Auth0 user directory connector", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to config file
    #[arg(short, long, global = true, default_value = "auth0-directory.toml")]
    config: PathBuf,

    /// Override the configured log format
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Validate the configuration file and exit
    Check,
    /// Print the search request a filter compiles to
    Query {
        #[arg(short, long, default_value = "User")]
        model: String,
        /// Filter as JSON, e.g. '{"where":{"email":"a@b.com"},"limit":10}'
        #[arg(short, long)]
        filter: Option<String>,
    },
    /// Print the outbound directory record for a caller record
    Serialize {
        #[arg(short, long, default_value = "User")]
        model: String,
        /// Caller record as JSON
        #[arg(short, long)]
        data: String,
        /// Serialization options as JSON, e.g. '{"serializeDefaults":false}'
        #[arg(short, long)]
        options: Option<String>,
    },
    /// Search the directory and print the normalized records
    #[cfg(feature = "jwt")]
    Users {
        #[arg(short, long, default_value = "User")]
        model: String,
        #[arg(short, long)]
        filter: Option<String>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    let mut config = load_config(&args.config);
    if let Some(format) = args.log_format {
        config.logging.format = format;
    }
    if let Err(e) = observability::init_tracing(&config.logging) {
        eprintln!("{e}");
        std::process::exit(1);
    }

    match args.command {
        Command::Check => run_check(&config),
        Command::Query { model, filter } => run_query(&config, &model, filter.as_deref()),
        Command::Serialize {
            model,
            data,
            options,
        } => run_serialize(&config, &model, &data, options.as_deref()),
        #[cfg(feature = "jwt")]
        Command::Users { model, filter } => run_users(&config, &model, filter.as_deref()).await,
    }
}

fn load_config(path: &Path) -> ConnectorConfig {
    match ConnectorConfig::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config {}: {e}", path.display());
            std::process::exit(1);
        }
    }
}

fn settings(config: &ConnectorConfig) -> ConnectorSettings {
    match ConnectorSettings::from_config(config) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    }
}

fn parse_json<T: DeserializeOwned + Default>(what: &str, input: Option<&str>) -> T {
    let Some(input) = input else {
        return T::default();
    };
    match serde_json::from_str(input) {
        Ok(value) => value,
        Err(e) => {
            eprintln!("Invalid {what}: {e}");
            std::process::exit(1);
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Failed to render output: {e}");
            std::process::exit(1);
        }
    }
}

fn run_check(config: &ConnectorConfig) {
    settings(config);
    info!(domain = %config.domain, models = config.models.len(), "Configuration is valid");
    println!(
        "Configuration OK: {} ({} model overrides)",
        config.domain,
        config.models.len()
    );
}

fn run_query(config: &ConnectorConfig, model: &str, filter: Option<&str>) {
    let settings = settings(config);
    let filter: QueryFilter = parse_json("filter", filter);
    match settings.build_query(model, &filter) {
        Ok(query) => print_json(&query),
        Err(e) => {
            eprintln!("Invalid filter: {e}");
            std::process::exit(1);
        }
    }
}

fn run_serialize(config: &ConnectorConfig, model: &str, data: &str, options: Option<&str>) {
    let settings = settings(config);
    let data: Record = parse_json("data", Some(data));
    let options: SerializeOptions = parse_json("options", options);
    print_json(&settings.serialize(model, &data, &options));
}

#[cfg(feature = "jwt")]
async fn run_users(config: &ConnectorConfig, model: &str, filter: Option<&str>) {
    let connector = match auth0_directory::Connector::from_config(config) {
        Ok(connector) => connector,
        Err(e) => {
            eprintln!("Failed to create connector: {e}");
            std::process::exit(1);
        }
    };
    let filter: QueryFilter = parse_json("filter", filter);
    match connector.all(model, &filter).await {
        Ok(users) => print_json(&users),
        Err(e) => {
            eprintln!("Search failed: {e}");
            std::process::exit(1);
        }
    }
}
