//! Command implementations for the CLI
//!
//! SBIO pattern: commands return Results, printing is left to the caller

use thiserror::Error;
use tracing::{debug, warn};

use super::StackArgs;
use crate::compose::{validate_stack_id, StackComposer};
use crate::config::{load_stack_config, ConfigError, StackConfig};
use crate::context::{self, Config, Context, ContextError, ProvisioningTarget};
use crate::error::{DestroyError, GraphValidationError, ProvisioningError};
use crate::graph::{
    validate_graph, RoutingTable, StackGraph, ValidationReport, ValidationSeverity,
};
use crate::provision::{DeploymentRecord, Provisioner, TeardownReport};
use crate::synth::{synthesize, SynthError, Template};

/// Errors that can occur during command execution
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid stack: {0}")]
    Validation(#[from] GraphValidationError),

    #[error("Synthesis failed: {0}")]
    Synth(#[from] SynthError),

    #[error("Deploy failed: {0}")]
    Provisioning(#[from] ProvisioningError),

    #[error("Destroy failed: {0}")]
    Destroy(#[from] DestroyError),
}

pub type CommandResult<T> = Result<T, CommandError>;

// ============================================================================
// Stack loading and synthesis
// ============================================================================

/// Load the stack config named by the arguments and apply overrides.
/// The deployment environment is resolved from the process environment.
pub fn load_stack(args: &StackArgs) -> CommandResult<StackComposer> {
    let mut config = match &args.config {
        Some(path) => load_stack_config(path)?,
        None => StackConfig::default(),
    };
    if let Some(profile) = args.profile {
        config.profile = profile;
    }
    config.environment = config.environment.resolve()?;
    debug!(stack = %args.stack, profile = %config.profile, "loaded stack");
    Ok(StackComposer::new(args.stack.clone(), config)?)
}

/// A composed and synthesized stack
#[derive(Debug, Clone)]
pub struct SynthesizedStack {
    pub graph: StackGraph,
    pub template: Template,
}

pub fn synthesize_stack(composer: &StackComposer) -> CommandResult<SynthesizedStack> {
    let graph = composer.compose()?;
    for message in validate_graph(&graph).messages {
        match message.severity {
            ValidationSeverity::Info => debug!(code = %message.code, "{}", message.message),
            _ => warn!(code = %message.code, "{}", message.message),
        }
    }
    let template = synthesize(&graph);
    Ok(SynthesizedStack { graph, template })
}

/// Full validation report. A composition that fails fast is reported as
/// that single violation.
pub fn validate_stack(composer: &StackComposer) -> ValidationReport {
    match composer.compose() {
        Ok(graph) => validate_graph(&graph),
        Err(err) => ValidationReport::new().violation(&err),
    }
}

/// Routing table of every listener, in declaration order
pub fn routing_tables(graph: &StackGraph) -> CommandResult<Vec<RoutingTable>> {
    graph
        .listeners()
        .map(|(id, _)| RoutingTable::for_listener(graph, id).map_err(CommandError::from))
        .collect()
}

// ============================================================================
// Deploy / destroy
// ============================================================================

pub async fn deploy_stack(
    provisioner: &dyn Provisioner,
    stack: &str,
    template: &Template,
) -> CommandResult<DeploymentRecord> {
    Ok(provisioner.deploy(stack, template).await?)
}

pub async fn destroy_stack(
    provisioner: &dyn Provisioner,
    stack: &str,
) -> CommandResult<TeardownReport> {
    validate_stack_id(stack)?;
    Ok(provisioner.destroy(stack).await?)
}

// ============================================================================
// Context commands (pure business logic)
// ============================================================================

/// Info about a context for display
#[derive(Debug, Clone)]
pub struct ContextInfo {
    pub name: String,
    pub target: String,
    pub is_current: bool,
}

fn describe_target(target: &ProvisioningTarget) -> String {
    match target {
        ProvisioningTarget::Local { state_dir } => format!("file://{}", state_dir.display()),
        ProvisioningTarget::Remote { url, .. } => url.clone(),
    }
}

/// All contexts, `local` included, sorted by name
pub fn context_list(config: &Config) -> Vec<ContextInfo> {
    let current = config.current_name();
    let mut contexts: Vec<ContextInfo> = config
        .contexts
        .iter()
        .map(|(name, ctx)| ContextInfo {
            name: name.clone(),
            target: ctx.url.clone(),
            is_current: name == current,
        })
        .collect();

    if let Ok(local) = config.resolve(Some(context::LOCAL_CONTEXT)) {
        contexts.push(ContextInfo {
            name: context::LOCAL_CONTEXT.to_string(),
            target: describe_target(&local),
            is_current: current == context::LOCAL_CONTEXT,
        });
    }

    contexts.sort_by(|a, b| a.name.cmp(&b.name));
    contexts
}

/// Current context name and where it points
pub fn context_current(config: &Config) -> CommandResult<(String, String)> {
    let target = config.resolve(None)?;
    Ok((config.current_name().to_string(), describe_target(&target)))
}

pub fn context_use(config: &mut Config, name: &str) -> CommandResult<()> {
    context::set_current_context(config, name)?;
    Ok(())
}

pub fn context_add(
    config: &mut Config,
    name: &str,
    url: &str,
    api_key: Option<&str>,
    description: Option<&str>,
) -> CommandResult<()> {
    let mut ctx = Context::new(name, url);
    if let Some(key) = api_key {
        ctx = ctx.with_api_key(key);
    }
    if let Some(desc) = description {
        ctx = ctx.with_description(desc);
    }
    context::add_context(config, ctx)?;
    Ok(())
}

pub fn context_delete(config: &mut Config, name: &str) -> CommandResult<bool> {
    Ok(context::remove_context(config, name).is_some())
}
