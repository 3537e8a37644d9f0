use std::path::Path;
use std::process;

use anyhow::Context as _;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use stackforge::cli::{
    context_add, context_current, context_delete, context_list, context_use, deploy_stack,
    destroy_stack, env_file_from_args, format_context_list, format_current_context,
    format_deployment, format_dry_run, format_resolutions, format_routing_table,
    format_synthesis_result, format_teardown, format_validation_report, load_stack,
    routing_tables, synthesize_stack, validate_stack, Cli, Commands, ContextAction, StackArgs,
};
use stackforge::context::{self, default_config_path};
use stackforge::provision::provisioner_for;
use stackforge::synth::write_assembly;

#[tokio::main]
async fn main() {
    let env_file = env_file_from_args(std::env::args_os()).map(|path| {
        let loaded = dotenvy::from_path(&path);
        (path, loaded)
    });
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    if let Some((path, Err(e))) = env_file {
        error!("Failed to load env file {}: {}", path.display(), e);
        process::exit(1);
    }

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("error: {:#}", e);
            process::exit(1);
        }
    }
}

fn source_name(args: &StackArgs) -> String {
    args.config
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| format!("{} (built-in defaults)", args.stack))
}

/// Run one command; `Ok(false)` means it completed but found errors
async fn run(cli: Cli) -> anyhow::Result<bool> {
    let context_path = cli.context_file.clone().unwrap_or_else(default_config_path);

    match cli.command {
        Commands::Synthesize(args) => {
            let composer = load_stack(&args.stack)?;
            let stack = synthesize_stack(&composer)?;
            let path = write_assembly(
                &args.out,
                composer.stack_id(),
                &stack.template,
                &composer.config().environment,
            )?;
            if args.print {
                println!("{}", stack.template.render()?);
            }
            print!("{}", format_synthesis_result(&stack, &path));
            Ok(true)
        }

        Commands::Validate(args) => {
            let composer = load_stack(&args.stack)?;
            let report = validate_stack(&composer);
            print!("{}", format_validation_report(&report, &source_name(&args.stack)));
            Ok(report.passed)
        }

        Commands::Routes(args) => {
            let composer = load_stack(&args.stack)?;
            let graph = composer.compose()?;
            let tables = routing_tables(&graph)?;
            if tables.is_empty() {
                println!("No listeners declared.");
            }
            for table in &tables {
                print!("{}", format_routing_table(table));
                if !args.paths.is_empty() {
                    println!();
                    print!("{}", format_resolutions(table, &args.paths));
                }
            }
            Ok(true)
        }

        Commands::Deploy(args) => {
            let config = context::load_config_from(&context_path)?;
            let target = config.resolve(args.context.as_deref())?;
            let provisioner = provisioner_for(&target);

            let composer = load_stack(&args.stack)?;
            let stack = synthesize_stack(&composer)?;

            if args.dry_run {
                print!("{}", format_dry_run(&stack, &provisioner.describe()));
                return Ok(true);
            }

            info!(stack = composer.stack_id(), target = %provisioner.describe(), "deploying");
            let record = deploy_stack(provisioner.as_ref(), composer.stack_id(), &stack.template)
                .await
                .with_context(|| format!("stack {}", composer.stack_id()))?;
            print!("{}", format_deployment(&record, &provisioner.describe()));
            Ok(true)
        }

        Commands::Destroy(args) => {
            let config = context::load_config_from(&context_path)?;
            let target = config.resolve(args.context.as_deref())?;
            let provisioner = provisioner_for(&target);

            info!(stack = %args.stack, target = %provisioner.describe(), "destroying");
            let report = destroy_stack(provisioner.as_ref(), &args.stack).await?;
            print!("{}", format_teardown(&report));
            Ok(true)
        }

        Commands::Context(args) => {
            run_context(args.action, &context_path)?;
            Ok(true)
        }
    }
}

fn run_context(action: ContextAction, path: &Path) -> anyhow::Result<()> {
    let mut config = context::load_config_from(path)?;

    match action {
        ContextAction::List => {
            print!("{}", format_context_list(&context_list(&config)));
        }
        ContextAction::Current => {
            let (name, target) = context_current(&config)?;
            print!("{}", format_current_context(&name, &target));
        }
        ContextAction::Use { name } => {
            context_use(&mut config, &name)?;
            context::save_config_to(&config, path)?;
            println!("Switched to context \"{}\".", name);
        }
        ContextAction::Add {
            name,
            url,
            api_key,
            description,
        } => {
            context_add(
                &mut config,
                &name,
                &url,
                api_key.as_deref(),
                description.as_deref(),
            )?;
            context::save_config_to(&config, path)?;
            println!("Context \"{}\" added.", name);
        }
        ContextAction::Delete { name } => {
            if context_delete(&mut config, &name)? {
                context::save_config_to(&config, path)?;
                println!("Context \"{}\" deleted.", name);
            } else {
                println!("Context \"{}\" not found.", name);
            }
        }
    }
    Ok(())
}
