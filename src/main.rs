//! Hostplane CLI entrypoint.
//!
//! This is the main entrypoint for the hostplane command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use hostplane_provider::api::{ControlPlaneClient, OrderRequest, StackApi};
use hostplane_provider::cli::{Cli, Commands, OutputFormat, OutputFormatter};
use hostplane_provider::config::{
    ConfigParser, ConfigValidator, ProviderConfig, StackConfig, find_config_file,
};
use hostplane_provider::error::{ConfigError, ProviderError, Result};
use hostplane_provider::reconciler::StackReconciler;
use hostplane_provider::resources::{AppInstallationResource, OrderResource};
use hostplane_provider::wait::CallContext;

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_json);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system. `RUST_LOG` wins over `--verbose`.
fn init_logging(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);
    let config_path = cli.config.as_ref();

    match cli.command {
        Commands::Validate { warnings } => cmd_validate(config_path, warnings, &formatter),
        Commands::Plan { stack, detailed } => {
            cmd_plan(config_path, stack.as_deref(), detailed, &formatter).await
        }
        Commands::Apply {
            stack,
            timeout,
            yes,
        } => cmd_apply(config_path, stack.as_deref(), timeout, yes, &formatter).await,
        Commands::Status { stack } => cmd_status(config_path, stack.as_deref(), &formatter).await,
        Commands::Destroy {
            stack,
            timeout,
            yes,
        } => cmd_destroy(config_path, stack.as_deref(), timeout, yes, &formatter).await,
        Commands::AppVersion {
            installation,
            version,
            timeout,
            yes,
        } => cmd_app_version(config_path, &installation, &version, timeout, yes, &formatter).await,
        Commands::Order {
            order_type,
            data,
            timeout,
            yes,
        } => cmd_order(config_path, order_type, &data, timeout, yes, &formatter).await,
    }
}

/// Validate configuration.
fn cmd_validate(
    config_path: Option<&PathBuf>,
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config_file = resolve_config_path(config_path)?;
    info!("Validating configuration: {}", config_file.display());

    let parser = parser_for(&config_file);
    parser.load_dotenv()?;
    let config = parser.load_with_env(&config_file)?;

    let result = ConfigValidator::new().check(&config);
    emit(formatter, &formatter.format_validation(&result, show_warnings));

    if !result.is_valid() {
        return Err(ProviderError::Config(ConfigError::ValidationError {
            message: format!("{} error(s) found", result.error_count()),
            field: None,
        }));
    }

    if formatter.format() == OutputFormat::Text {
        eprintln!("\nConfiguration summary:");
        eprintln!("  API: {}", config.api.base_url);
        eprintln!("  Stacks: {}", config.stacks.len());
        for stack in &config.stacks {
            eprintln!(
                "    - {} -> {} ({}, {} container(s))",
                stack.name,
                stack.stack_id,
                stack.ownership,
                stack.desired.containers.len()
            );
        }
    }

    Ok(())
}

/// Show stack plans.
async fn cmd_plan(
    config_path: Option<&PathBuf>,
    stack: Option<&str>,
    detailed: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = load_config(config_path)?;
    let reconciler = create_reconciler(&config)?;
    let ctx = bounded(&interruptible(), &config, None);

    for target in select_stacks(&config, stack)? {
        let plan = reconciler
            .plan(&ctx, &target.stack_id, &target.desired, target.ownership)
            .await?;
        emit(formatter, &formatter.format_plan(&plan, detailed));
    }

    Ok(())
}

/// Apply stacks.
async fn cmd_apply(
    config_path: Option<&PathBuf>,
    stack: Option<&str>,
    timeout: Option<u64>,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = load_config(config_path)?;
    let reconciler = create_reconciler(&config)?;
    let root = interruptible();
    let targets = select_stacks(&config, stack)?;

    let planning = bounded(&root, &config, timeout);
    let mut pending = Vec::new();
    for target in targets {
        let plan = reconciler
            .plan(&planning, &target.stack_id, &target.desired, target.ownership)
            .await?;
        if plan.is_empty() {
            debug!("Stack {} has no planned changes", target.name);
        } else {
            emit(formatter, &formatter.format_plan(&plan, false));
        }
        pending.push(target);
    }

    if !auto_approve && !confirm("Do you want to apply these changes? [y/N]: ", "y")? {
        eprintln!("Apply cancelled.");
        return Ok(());
    }

    // Stacks with no planned changes still run so their readiness is checked.
    let ctx = bounded(&root, &config, timeout);
    for target in pending {
        let outcome = reconciler
            .reconcile(&ctx, &target.stack_id, &target.desired, target.ownership)
            .await?;
        for name in &outcome.skipped_recreate {
            warn!(
                "Service {} in stack {} needs a recreate that is disabled",
                name, target.name
            );
        }
        emit(formatter, &formatter.format_outcome(&outcome));
    }

    Ok(())
}

/// Show stack status.
async fn cmd_status(
    config_path: Option<&PathBuf>,
    stack: Option<&str>,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = load_config(config_path)?;
    let reconciler = create_reconciler(&config)?;
    let ctx = bounded(&interruptible(), &config, None);

    for target in select_stacks(&config, stack)? {
        let snapshot = reconciler
            .read(&ctx, &target.stack_id, &target.desired, target.ownership)
            .await?;
        emit(formatter, &formatter.format_status(&target.name, &snapshot));
    }

    Ok(())
}

/// Remove managed entries from stacks.
async fn cmd_destroy(
    config_path: Option<&PathBuf>,
    stack: Option<&str>,
    timeout: Option<u64>,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = load_config(config_path)?;
    let reconciler = create_reconciler(&config)?;
    let root = interruptible();
    let targets = select_stacks(&config, stack)?;

    eprintln!("Managed services and volumes will be removed from:");
    for target in &targets {
        eprintln!("  - {} ({}, {})", target.name, target.stack_id, target.ownership);
    }

    if !auto_approve
        && !confirm(
            "\nThis action is IRREVERSIBLE. Type 'destroy' to confirm: ",
            "destroy",
        )?
    {
        eprintln!("Destruction cancelled.");
        return Ok(());
    }

    let ctx = bounded(&root, &config, timeout);
    for target in targets {
        let plan = reconciler
            .destroy(&ctx, &target.stack_id, &target.desired, target.ownership)
            .await?;
        emit(formatter, &formatter.format_plan(&plan, false));
    }

    Ok(())
}

/// Move an application installation to a version.
async fn cmd_app_version(
    config_path: Option<&PathBuf>,
    installation: &str,
    version: &str,
    timeout: Option<u64>,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = load_config(config_path)?;
    let resource = AppInstallationResource::from_config(
        Arc::new(create_client(&config)?),
        &config.polling,
    );
    let root = interruptible();

    let current = resource.read(&bounded(&root, &config, timeout), installation).await?;
    eprintln!(
        "App installation {} runs version {}, requested {}.",
        installation,
        current.current_version.as_deref().unwrap_or("unknown"),
        version
    );

    if !auto_approve && !confirm("Do you want to change the version? [y/N]: ", "y")? {
        eprintln!("Version change cancelled.");
        return Ok(());
    }

    let ctx = bounded(&root, &config, timeout);
    let installation = resource.set_version(&ctx, installation, version).await?;
    emit(formatter, &formatter.format_app_installation(&installation));

    Ok(())
}

/// Place an order.
async fn cmd_order(
    config_path: Option<&PathBuf>,
    order_type: String,
    data: &str,
    timeout: Option<u64>,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let order_data: serde_json::Value = serde_json::from_str(data)
        .map_err(|e| ConfigError::validation(format!("order data is not valid JSON: {e}"), "data"))?;
    let request = OrderRequest {
        order_type,
        order_data,
    };

    let config = load_config(config_path)?;
    let resource = OrderResource::from_config(Arc::new(create_client(&config)?), &config.polling);

    eprintln!("A {} order will be placed.", request.order_type);
    if !auto_approve && !confirm("Orders may be billed. Place it? [y/N]: ", "y")? {
        eprintln!("Order cancelled.");
        return Ok(());
    }

    let ctx = bounded(&interruptible(), &config, timeout);
    let order = resource.place(&ctx, &request).await?;
    emit(formatter, &formatter.format_order(&order));

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

/// Creates a parser rooted at the configuration file's directory.
fn parser_for(config_file: &Path) -> ConfigParser {
    ConfigParser::new().with_base_path(config_file.parent().unwrap_or_else(|| Path::new(".")))
}

/// Loads and validates the configuration.
fn load_config(config_path: Option<&PathBuf>) -> Result<ProviderConfig> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading configuration from: {}", config_file.display());

    let parser = parser_for(&config_file);
    parser.load_dotenv()?;
    let config = parser.load_with_env(&config_file)?;

    let result = ConfigValidator::new().validate(&config)?;
    for warning in &result.warnings {
        warn!("{}", warning);
    }

    Ok(config)
}

/// Picks the stacks a command operates on.
fn select_stacks<'a>(config: &'a ProviderConfig, name: Option<&str>) -> Result<Vec<&'a StackConfig>> {
    match name {
        Some(name) => config.stack(name).map(|stack| vec![stack]).ok_or_else(|| {
            ProviderError::Config(ConfigError::UnknownStack {
                name: name.to_string(),
            })
        }),
        None => Ok(config.stacks.iter().collect()),
    }
}

/// Creates the control plane client from the API settings.
fn create_client(config: &ProviderConfig) -> Result<ControlPlaneClient> {
    let token = ConfigParser::api_token(config)?;
    ControlPlaneClient::with_options(&config.api.base_url, &token, config.api.request_timeout_secs)
}

/// Creates the stack reconciler from the API and polling settings.
fn create_reconciler(config: &ProviderConfig) -> Result<StackReconciler> {
    let api: Arc<dyn StackApi> = Arc::new(create_client(config)?);

    Ok(StackReconciler::new(api)
        .with_readiness_options(config.polling.stack_options())
        .with_recreate_options(config.polling.recreate_options()))
}

/// Creates a root context that is cancelled on Ctrl-C.
fn interruptible() -> CallContext {
    let (ctx, handle) = CallContext::cancellable();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling in-flight operations");
            handle.cancel();
        }
    });

    ctx
}

/// Bounds `root` by `--timeout` or `polling.timeout_secs`.
fn bounded(root: &CallContext, config: &ProviderConfig, timeout_secs: Option<u64>) -> CallContext {
    match timeout_secs.map(Duration::from_secs).or_else(|| config.polling.timeout()) {
        Some(timeout) => {
            debug!("Operations time out after {}s", timeout.as_secs());
            root.with_timeout(timeout)
        }
        None => root.clone(),
    }
}

/// Asks for confirmation on stderr.
fn confirm(prompt: &str, expected: &str) -> Result<bool> {
    eprint!("{prompt}");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;

    Ok(input.trim().eq_ignore_ascii_case(expected))
}

/// Writes command output: JSON to stdout, text to stderr.
fn emit(formatter: &OutputFormatter, output: &str) {
    match formatter.format() {
        OutputFormat::Json => println!("{output}"),
        OutputFormat::Text => eprintln!("{output}"),
    }
}
