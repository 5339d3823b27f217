//! Schema Guard CLI
//!
//! Registers schemas, validates payload files and inspects schema drift.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use schema_guard::{records, GuardConfig, RuleSet, SchemaError};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schema-guard")]
#[command(about = "Versioned schema registry and record validator")]
struct Cli {
    /// Explicit config file (layered over the default locations)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new version of a schema
    Register {
        #[arg(short, long)]
        name: String,
        /// Only used when the schema is first created
        #[arg(short, long)]
        description: Option<String>,
        /// JSON file holding the schema document
        #[arg(short, long)]
        file: PathBuf,
    },

    /// List every schema with its latest version
    List,

    /// Show the latest version of a schema
    Latest { name: String },

    /// Show the full version history of a schema
    Versions { name: String },

    /// Validate a JSON payload file
    Validate {
        name: String,
        #[arg(short, long)]
        file: PathBuf,
        /// Rename fields with the latest saved mapping first
        #[arg(long)]
        apply_mapping: bool,
        /// Validate against this version instead of the latest
        #[arg(long = "schema-version")]
        schema_version: Option<u32>,
    },

    /// Compare the properties of two versions
    Diff {
        name: String,
        #[arg(long)]
        from: u32,
        #[arg(long)]
        to: u32,
    },

    /// Manage field mappings
    Mapping {
        #[command(subcommand)]
        action: MappingCommand,
    },

    /// Check a stored version against its checksum
    Verify {
        name: String,
        #[arg(long = "schema-version")]
        schema_version: u32,
    },

    /// Inspect or write configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum MappingCommand {
    /// Save a rule set ({"source": "target", ...}) for a schema
    Save {
        name: String,
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Show the latest rule set for a schema
    Latest { name: String },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Write the default configuration to a file
    Init {
        #[arg(default_value = "schema-guard.toml")]
        path: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match GuardConfig::load_from(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    match run(cli.command, config) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_json(path: &Path) -> anyhow::Result<serde_json::Value> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

/// Returns `Ok(false)` when the command ran but its check failed
fn run(command: Commands, config: GuardConfig) -> anyhow::Result<bool> {
    match command {
        Commands::Config { action } => {
            match action {
                ConfigCommand::Show => print_json(&config)?,
                ConfigCommand::Init { path } => {
                    GuardConfig::default()
                        .save(&path)
                        .with_context(|| format!("writing {}", path))?;
                    println!("✅ Default configuration written to {}", path);
                }
            }
            Ok(true)
        }
        command => run_registry(command, &config),
    }
}

fn run_registry(command: Commands, config: &GuardConfig) -> anyhow::Result<bool> {
    let registry = config.open_registry().context("opening registry")?;

    match command {
        Commands::Register {
            name,
            description,
            file,
        } => {
            let document = read_json(&file)?;
            let response = registry.register_schema(&name, description.as_deref(), document)?;
            print_json(&response)?;
        }

        Commands::List => print_json(&registry.list_schemas()?)?,

        Commands::Latest { name } => match registry.latest_schema(&name)? {
            Some(schema) => print_json(&schema)?,
            None => bail!("schema '{}' not found", name),
        },

        Commands::Versions { name } => print_json(&registry.versions(&name)?)?,

        Commands::Validate {
            name,
            file,
            apply_mapping,
            schema_version,
        } => {
            let apply = apply_mapping || config.validation.apply_mapping_by_default;
            let result = match schema_version {
                Some(version) => {
                    let data = records::load_records(&file)?;
                    registry.validate_version(&name, version, &data, apply)?
                }
                None => registry.validate_file(&name, &file, apply)?,
            };
            print_json(&result)?;
            return Ok(result.valid);
        }

        Commands::Diff { name, from, to } => {
            let result = registry.diff(&name, from, to)?;
            eprintln!("🔍 {} v{} -> v{}: {}", name, from, to, result.summary());
            print_json(&result)?;
        }

        Commands::Mapping { action } => match action {
            MappingCommand::Save { name, file } => {
                let rules = RuleSet::try_from(read_json(&file)?)?;
                let saved = registry.save_mapping(&name, rules)?;
                print_json(&serde_json::json!({"id": saved.id, "status": "created"}))?;
            }
            MappingCommand::Latest { name } => match registry.latest_mapping(&name)? {
                Some(mapping) => print_json(&mapping)?,
                None => return Err(SchemaError::MappingNotFound { schema: name }.into()),
            },
        },

        Commands::Verify {
            name,
            schema_version,
        } => {
            let ok = registry.verify(&name, schema_version)?;
            if ok {
                println!("✅ {} v{} - checksum valid", name, schema_version);
            } else {
                println!("❌ {} v{} - checksum validation FAILED", name, schema_version);
            }
            return Ok(ok);
        }

        Commands::Config { .. } => {}
    }

    Ok(true)
}
