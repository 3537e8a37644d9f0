//! CLI module for stackforge
//!
//! Subcommands:
//! - `stackforge synthesize` - Write the template and manifest of a stack
//! - `stackforge validate` - Report invariant violations and advisories
//! - `stackforge routes` - Show listener routing, optionally resolving paths
//! - `stackforge deploy` - Apply a stack through the current context
//! - `stackforge destroy` - Tear a stack down
//! - `stackforge context` - Manage provisioning contexts

use clap::{ArgAction, Args, Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;

mod commands;
mod display;

pub use commands::*;
pub use display::*;

use crate::compose::DEFAULT_STACK_ID;
use crate::config::Profile;

#[derive(Parser, Debug)]
#[command(name = "stackforge")]
#[command(about = "Compose, validate and synthesize container-service infrastructure stacks")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging output (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to the context file (default: ~/.stackforge/config)
    #[arg(long, global = true, value_name = "FILE")]
    pub context_file: Option<PathBuf>,

    /// Path to a .env file; loaded before the other arguments are parsed, so
    /// it can supply STACKFORGE_* defaults and RUST_LOG
    #[arg(long, global = true, value_name = "FILE")]
    pub env_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Synthesize the stack into a cloud assembly without deploying
    #[command(visible_alias = "synth")]
    Synthesize(SynthesizeArgs),

    /// Validate a stack configuration
    Validate(ValidateArgs),

    /// Show the routing table of each listener
    Routes(RoutesArgs),

    /// Deploy a stack to the current context
    Deploy(DeployArgs),

    /// Tear down a deployed stack
    Destroy(DestroyArgs),

    /// Manage provisioning contexts
    Context(ContextArgs),
}

/// Which stack to compose
#[derive(Args, Debug, Clone)]
pub struct StackArgs {
    /// Stack config file (JSON or YAML); defaults describe the reference stack
    #[arg(short, long, value_name = "FILE", env = "STACKFORGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the profile set in the config
    #[arg(short, long, value_enum)]
    pub profile: Option<Profile>,

    /// Stack identifier
    #[arg(short, long, default_value = DEFAULT_STACK_ID)]
    pub stack: String,
}

#[derive(Parser, Debug)]
pub struct SynthesizeArgs {
    #[command(flatten)]
    pub stack: StackArgs,

    /// Output directory for the cloud assembly
    #[arg(short, long, default_value = "stackforge.out")]
    pub out: PathBuf,

    /// Also print the template to stdout
    #[arg(long)]
    pub print: bool,
}

#[derive(Parser, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub stack: StackArgs,
}

#[derive(Parser, Debug)]
pub struct RoutesArgs {
    #[command(flatten)]
    pub stack: StackArgs,

    /// Request paths to resolve against each listener
    pub paths: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct DeployArgs {
    #[command(flatten)]
    pub stack: StackArgs,

    /// Context to deploy to (default: current context)
    #[arg(long)]
    pub context: Option<String>,

    /// Dry-run mode: validate and synthesize without deploying
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Parser, Debug)]
pub struct DestroyArgs {
    /// Stack identifier
    #[arg(short, long)]
    pub stack: String,

    /// Context the stack was deployed to (default: current context)
    #[arg(long)]
    pub context: Option<String>,
}

#[derive(Parser, Debug)]
pub struct ContextArgs {
    #[command(subcommand)]
    pub action: ContextAction,
}

#[derive(Subcommand, Debug)]
pub enum ContextAction {
    /// List all contexts
    List,

    /// Show current context
    Current,

    /// Switch to a context
    Use {
        /// Context name
        name: String,
    },

    /// Add a provisioning endpoint
    Add {
        /// Context name
        name: String,

        /// Endpoint URL
        #[arg(long)]
        url: String,

        /// API key for authentication
        #[arg(long, env = "STACKFORGE_API_KEY")]
        api_key: Option<String>,

        /// Free-form description
        #[arg(long)]
        description: Option<String>,
    },

    /// Delete a context
    Delete {
        /// Context name
        name: String,
    },
}

/// Value of `--env-file` in raw arguments. Read ahead of clap so the file's
/// variables are in place when `env = ...` fallbacks are resolved.
pub fn env_file_from_args<I>(args: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = OsString>,
{
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--" {
            return None;
        }
        if arg == "--env-file" {
            return args.next().map(PathBuf::from);
        }
        if let Some(value) = arg.to_str().and_then(|a| a.strip_prefix("--env-file=")) {
            return Some(PathBuf::from(value));
        }
    }
    None
}
