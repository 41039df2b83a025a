// ABOUTME: Command-line interface for scanning, generating, and supervising Toolforge profiles
// ABOUTME: Thin wrapper over the library's scanner/generator/profile_registry/supervisor modules

#![forbid(unsafe_code)]

//! # toolforge-cli
//!
//! Operator-facing command line for the operations an editor UI otherwise
//! drives over `HTTP`:
//!
//! ```bash
//! toolforge-cli scan --profile outlook
//! toolforge-cli generate --profile outlook
//! toolforge-cli profile create --name outlook --source-dir ./handlers --template-definitions-path ./templates.json --port 9001
//! toolforge-cli server start --profile outlook --protocol rest
//! ```

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use toolforge::config::EditorConfig;
use toolforge::editor::EditorState;
use toolforge::generator::{self, Protocol};
use toolforge_core::Profile;

#[derive(Parser)]
#[command(name = "toolforge-cli", about = "Toolforge operator command line")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Emit structured logs instead of staying quiet.
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a profile's handler source tree and write its registry file (C1, C2).
    Scan {
        /// Profile to scan.
        #[arg(long)]
        profile: String,
    },
    /// Render a profile's generated server artifacts (C6).
    Generate {
        /// Profile to generate for.
        #[arg(long)]
        profile: String,
        /// Restrict generation to one transport; defaults to all three.
        #[arg(long)]
        protocol: Option<ProtocolArg>,
    },
    /// Profile lifecycle operations (C4).
    Profile {
        #[command(subcommand)]
        action: ProfileCommand,
    },
    /// Generated-server process supervision (C8).
    Server {
        #[command(subcommand)]
        action: ServerCommand,
    },
}

#[derive(Subcommand)]
enum ProfileCommand {
    /// List every known profile.
    List,
    /// Create a new profile.
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        source_dir: PathBuf,
        #[arg(long)]
        template_definitions_path: PathBuf,
        #[arg(long)]
        types_files: Vec<PathBuf>,
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long)]
        port: u16,
    },
    /// Derive a new profile from an existing base.
    Derive {
        #[arg(long)]
        base_name: String,
        #[arg(long)]
        new_name: String,
        #[arg(long)]
        port: u16,
    },
    /// Delete a profile. Requires the exact `DELETE <name>` confirmation token.
    Delete {
        #[arg(long)]
        name: String,
        #[arg(long)]
        confirm: String,
    },
}

#[derive(Subcommand)]
enum ServerCommand {
    /// Start a profile's generated server for one transport.
    Start {
        #[arg(long)]
        profile: String,
        #[arg(long)]
        protocol: ProtocolArg,
    },
    /// Stop a running server, waiting for a graceful exit before force-killing.
    Stop {
        #[arg(long)]
        profile: String,
        #[arg(long)]
        protocol: ProtocolArg,
        #[arg(long)]
        force: bool,
    },
    /// Stop then start a profile's server.
    Restart {
        #[arg(long)]
        profile: String,
        #[arg(long)]
        protocol: ProtocolArg,
    },
    /// Report one (profile, protocol) pair's process status.
    Status {
        #[arg(long)]
        profile: String,
        #[arg(long)]
        protocol: ProtocolArg,
    },
    /// Report every profile's status across every protocol.
    Dashboard,
}

/// Wire-level spelling of [`Protocol`] accepted on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
#[value(rename_all = "lower")]
enum ProtocolArg {
    Rest,
    Stream,
    Stdio,
}

impl From<ProtocolArg> for Protocol {
    fn from(value: ProtocolArg) -> Self {
        match value {
            ProtocolArg::Rest => Self::Rest,
            ProtocolArg::Stream => Self::Stream,
            ProtocolArg::Stdio => Self::Stdio,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.verbose {
        toolforge::logging::init_from_env("toolforge-cli")?;
    }

    let config = EditorConfig::from_env().context("failed to read editor configuration")?;
    let protected_profiles = BTreeSet::from(["default".to_owned()]);
    let state = Arc::new(EditorState::from_config(config, protected_profiles));

    match cli.command {
        Command::Scan { profile } => run_scan(&state, &profile),
        Command::Generate { profile, protocol } => run_generate(&state, &profile, protocol),
        Command::Profile { action } => run_profile(&state, action),
        Command::Server { action } => run_server(&state, action).await,
    }
}

fn resolve_profile(state: &EditorState, name: &str) -> Result<Profile> {
    let index = state.profiles.load()?;
    index
        .profiles
        .get(name)
        .cloned()
        .with_context(|| format!("profile '{name}' not found"))
}

fn run_scan(state: &EditorState, profile_name: &str) -> Result<()> {
    let profile = resolve_profile(state, profile_name)?;
    let report = toolforge::scanner::scan_source_tree(
        &profile.source_dir,
        &profile.types_files,
        profile_name,
    )
    .with_context(|| format!("scan of '{profile_name}' failed"))?;

    for diagnostic in &report.diagnostics {
        tracing::warn!(?diagnostic, "scan diagnostic");
    }

    state.registry.save(profile_name, &report.handlers)?;
    state.registry.save_types(profile_name, &report.types)?;
    info!(
        profile = profile_name,
        handlers = report.handlers.len(),
        types = report.types.len(),
        diagnostics = report.diagnostics.len(),
        "scan complete"
    );
    println!(
        "scanned '{profile_name}': {} handlers, {} types, {} diagnostics",
        report.handlers.len(),
        report.types.len(),
        report.diagnostics.len()
    );
    Ok(())
}

fn run_generate(state: &EditorState, profile_name: &str, protocol: Option<ProtocolArg>) -> Result<()> {
    let profile = resolve_profile(state, profile_name)?;
    let loaded = state.tool_store(&profile).load()?;
    generator::validate_service_bindings(&loaded.tools, &state.registry, profile_name)?;

    let protocols = protocol.map_or_else(
        || vec![Protocol::Rest, Protocol::Stream, Protocol::Stdio],
        |p| vec![p.into()],
    );
    let profile_dir = profile
        .tool_definitions_path
        .parent()
        .map_or_else(|| PathBuf::from("."), std::path::Path::to_path_buf);

    for proto in protocols {
        let content = match proto {
            Protocol::Rest => generator::rest::render(&profile, &loaded.tools)?,
            Protocol::Stream => generator::stream::render(&profile, &loaded.tools)?,
            Protocol::Stdio => generator::stdio::render(&profile, &loaded.tools)?,
        };
        let path = generator::write_artifact(&profile_dir, proto, &content)?;
        println!("generated {}", path.display());
    }
    Ok(())
}

fn run_profile(state: &EditorState, action: ProfileCommand) -> Result<()> {
    match action {
        ProfileCommand::List => {
            let index = state.profiles.load()?;
            for (name, profile) in &index.profiles {
                println!("{name}\t{}\tport={}", profile.source_dir.display(), profile.port);
            }
        }
        ProfileCommand::Create {
            name,
            source_dir,
            template_definitions_path,
            types_files,
            host,
            port,
        } => {
            let profile_dir = state.config.state_dir.join("profiles").join(&name);
            let profile = Profile {
                name: name.clone(),
                source_dir,
                template_definitions_path,
                tool_definitions_path: profile_dir.join("tool_definitions.json"),
                backup_dir: profile_dir.join("backups"),
                types_files,
                host,
                port,
                base_profile: None,
            };
            let index = state.profiles.load()?;
            state.profiles.create(index, profile)?;
            println!("created profile '{name}'");
        }
        ProfileCommand::Derive {
            base_name,
            new_name,
            port,
        } => {
            let profile_dir = state.config.state_dir.join("profiles").join(&new_name);
            let index = state.profiles.load()?;
            state.profiles.derive(
                index,
                &base_name,
                &new_name,
                port,
                profile_dir.join("tool_definitions.json"),
                profile_dir.join("backups"),
            )?;
            println!("derived '{new_name}' from '{base_name}'");
        }
        ProfileCommand::Delete { name, confirm } => {
            let index = state.profiles.load()?;
            state.profiles.delete(index, &name, &confirm)?;
            println!("deleted profile '{name}'");
        }
    }
    Ok(())
}

async fn run_server(state: &EditorState, action: ServerCommand) -> Result<()> {
    match action {
        ServerCommand::Start { profile, protocol } => {
            let resolved = resolve_profile(state, &profile)?;
            let info = state.supervisor.start(&resolved, protocol.into()).await?;
            println!("{info:?}");
        }
        ServerCommand::Stop {
            profile,
            protocol,
            force,
        } => {
            let info = state.supervisor.stop(&profile, protocol.into(), force).await?;
            println!("{info:?}");
        }
        ServerCommand::Restart { profile, protocol } => {
            let resolved = resolve_profile(state, &profile)?;
            let info = state.supervisor.restart(&resolved, protocol.into()).await?;
            println!("{info:?}");
        }
        ServerCommand::Status { profile, protocol } => {
            let info = state.supervisor.status(&profile, protocol.into()).await;
            println!("{info:?}");
        }
        ServerCommand::Dashboard => {
            let index = state.profiles.load()?;
            let profiles: Vec<Profile> = index.profiles.into_values().collect();
            let entries = state.supervisor.dashboard(&profiles).await;
            for entry in entries {
                println!("{entry:?}");
            }
        }
    }
    Ok(())
}
