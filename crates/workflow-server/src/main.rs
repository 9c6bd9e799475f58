//! Approval workflow server executable
//!
//! Serves the HTTP API, or generates a chatbot graph document and exits.

mod http_service;

use anyhow::Context;
use clap::{Arg, ArgMatches, Command};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use workflow_core::{
    clients::{notifier_from_config, StaticDirectory},
    config::{EnvOverrides, StorageBackend, WorkflowConfig},
    generator::{self, CommonNodeTemplates, PlatformConfig, PRESETS},
    workflow::{ApprovalEngine, ApprovalStore, FileStore, InMemoryStore},
};

use http_service::ServerState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with INFO as default if RUST_LOG not set
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")
    ).init();

    let matches = Command::new("workflow-server")
        .version("1.0.0")
        .about("Bizflow approval workflow service")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("FILE")
                .help("Configuration file path (JSON)")
        )
        .arg(
            Arg::new("serve")
                .long("serve")
                .help("Start the HTTP API")
                .action(clap::ArgAction::SetTrue)
        )
        .arg(
            Arg::new("port")
                .long("port")
                .value_name("PORT")
                .help("HTTP port, overrides the config file")
                .value_parser(clap::value_parser!(u16))
        )
        .arg(
            Arg::new("data-dir")
                .long("data-dir")
                .value_name("DIR")
                .help("Data directory for the file store, overrides the config file")
        )
        .arg(
            Arg::new("generate-workflow")
                .long("generate-workflow")
                .value_name("PLATFORM|FILE")
                .help("Generate a chatbot graph for a preset platform or a platform config file")
                .conflicts_with("serve")
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_name("SEED")
                .help("Seed for generated identifiers")
                .requires("generate-workflow")
        )
        .arg(
            Arg::new("output")
                .long("output")
                .short('o')
                .value_name("FILE")
                .help("Write the generated graph to a file instead of stdout")
                .requires("generate-workflow")
        )
        .get_matches();

    if let Some(source) = matches.get_one::<String>("generate-workflow") {
        return generate_workflow(source, &matches);
    }

    if !matches.get_flag("serve") {
        log::error!("No action specified. Use --help for options.");
        std::process::exit(1);
    }

    let config = load_config(&matches)?;
    serve(config).await
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<WorkflowConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => {
            let config = WorkflowConfig::from_file(path)?;
            log::info!("Loaded configuration from {}", path);
            config
        }
        None => {
            log::info!("No config file given, using defaults");
            let mut config = WorkflowConfig::default();
            config.apply_overrides(EnvOverrides::from_env()?);
            config
        }
    };

    if let Some(port) = matches.get_one::<u16>("port") {
        config.server.port = *port;
    }
    if let Some(dir) = matches.get_one::<String>("data-dir") {
        config.storage.data_dir = PathBuf::from(dir);
    }

    config.validate()?;
    Ok(config)
}

async fn serve(config: WorkflowConfig) -> anyhow::Result<()> {
    let store: Arc<dyn ApprovalStore> = match config.storage.backend {
        StorageBackend::File => {
            log::info!("Using data directory: {}", config.storage.data_dir.display());
            Arc::new(FileStore::new(&config.storage.data_dir)?)
        }
        StorageBackend::Memory => {
            log::warn!("Using in-memory storage, approvals are lost on restart");
            Arc::new(InMemoryStore::new())
        }
    };

    let directory = Arc::new(StaticDirectory::from_config(&config.directory));
    let notifier = notifier_from_config(&config.notifications)?;
    let engine = ApprovalEngine::new(store, directory, notifier);

    if let Some(path) = &config.bootstrap.definitions_path {
        engine
            .bootstrap_definitions(path)
            .with_context(|| format!("Failed to load definitions from {}", path.display()))?;
    }

    let state = ServerState {
        engine: Arc::new(engine),
        templates: Arc::new(CommonNodeTemplates::default()),
    };

    log::info!("Initialized approval engine");
    http_service::run_server(state, &config.listen_address()).await
}

fn generate_workflow(source: &str, matches: &ArgMatches) -> anyhow::Result<()> {
    let seed = matches
        .get_one::<String>("seed")
        .context("--seed is required with --generate-workflow")?;

    let platform = if PRESETS.contains(&source) {
        PlatformConfig::preset(source)?
    } else {
        let content = std::fs::read_to_string(source)
            .with_context(|| format!("'{}' is neither a preset ({}) nor a readable file", source, PRESETS.join(", ")))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid platform config in {}", source))?
    };

    let document = generator::generate(&platform, &CommonNodeTemplates::default(), seed)?;
    let bytes = document.to_json_bytes()?;

    match matches.get_one::<String>("output") {
        Some(path) => {
            std::fs::write(Path::new(path), &bytes)?;
            log::info!("Wrote {} graph ({} nodes) to {}", platform.name, document.nodes.len(), path);
        }
        None => println!("{}", String::from_utf8_lossy(&bytes)),
    }

    Ok(())
}
