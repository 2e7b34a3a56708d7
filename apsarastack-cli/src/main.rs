mod manifest;
mod sync;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;

use apsarastack_core::differ::create_plan;
use apsarastack_core::effect::Effect;
use apsarastack_core::interpreter::{ApplyResult, Interpreter, InterpreterConfig};
use apsarastack_core::plan::Plan;
use apsarastack_core::provider::Provider;
use apsarastack_core::resource::{Resource, ResourceId, Value};
use apsarastack_core::schema::ResourceSchema;
use apsarastack_provider::{ApsaraStackProvider, Config, SWEEP_PREFIXES};
use apsarastack_state::{LocalBackend, ResourceState, StateBackend, StateFile};

use manifest::{Manifest, schemas};

#[derive(Parser)]
#[command(name = "apsarastack")]
#[command(about = "Manage ApsaraStack resources from a JSON manifest", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the manifest against the resource schemas
    Validate {
        /// Path to the manifest
        #[arg(default_value = "main.json")]
        file: PathBuf,
    },
    /// Show execution plan without applying changes
    Plan {
        #[arg(default_value = "main.json")]
        file: PathBuf,
    },
    /// Apply changes to reach the desired state
    Apply {
        #[arg(default_value = "main.json")]
        file: PathBuf,
    },
    /// Destroy every resource recorded in state
    Destroy {
        #[arg(default_value = "main.json")]
        file: PathBuf,

        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Adopt an existing resource into state
    Import {
        /// Resource type, e.g. apsarastack_ess_scaling_group
        resource_type: String,
        /// Name to record the resource under
        name: String,
        /// Cloud-side identifier
        identifier: String,
        #[arg(default_value = "main.json")]
        file: PathBuf,
    },
    /// Show the account and default role of the configured credentials
    Whoami {
        #[arg(default_value = "main.json")]
        file: PathBuf,
    },
    /// Delete scaling groups left behind by acceptance tests
    Sweep {
        #[arg(default_value = "main.json")]
        file: PathBuf,

        /// Name prefix to match, case-insensitively (repeatable)
        #[arg(long = "prefix")]
        prefixes: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { file } => run_validate(&file),
        Commands::Plan { file } => run_plan(&file).await,
        Commands::Apply { file } => run_apply(&file).await,
        Commands::Destroy { file, auto_approve } => run_destroy(&file, auto_approve).await,
        Commands::Import {
            resource_type,
            name,
            identifier,
            file,
        } => run_import(&file, ResourceId::new(resource_type, name), &identifier).await,
        Commands::Whoami { file } => run_whoami(&file).await,
        Commands::Sweep { file, prefixes } => run_sweep(&file, &prefixes).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn get_provider(manifest: &Manifest) -> Result<ApsaraStackProvider, String> {
    let config = Config::from_settings(manifest.provider.clone()).map_err(|e| e.to_string())?;
    ApsaraStackProvider::new(config).map_err(|e| e.to_string())
}

/// The state file lives next to the manifest
fn get_backend(file: &Path) -> LocalBackend {
    let dir = file.parent().unwrap_or(Path::new("."));
    LocalBackend::with_path(dir.join(LocalBackend::DEFAULT_STATE_FILE))
}

/// Run `op` with the state locked. The state `op` hands back is written
/// even when it reports an error, so partial progress is kept.
async fn with_locked_state<F, Fut>(file: &Path, operation: &str, op: F) -> Result<(), String>
where
    F: FnOnce(StateFile) -> Fut,
    Fut: Future<Output = (StateFile, Result<(), String>)>,
{
    let backend = get_backend(file);
    let lock = backend
        .acquire_lock(operation)
        .await
        .map_err(|e| e.to_string())?;

    let result = async {
        let state = backend
            .read_state()
            .await
            .map_err(|e| e.to_string())?
            .unwrap_or_default();
        let (mut state, outcome) = op(state).await;
        state.increment_serial();
        backend.write_state(&state).await.map_err(|e| e.to_string())?;
        outcome
    }
    .await;

    let released = backend.release_lock(&lock).await.map_err(|e| e.to_string());
    result.and(released)
}

fn run_validate(file: &Path) -> Result<(), String> {
    let manifest = Manifest::load(file)?;

    println!("{}", "Validating...".cyan());
    let desired = manifest.desired()?;

    println!(
        "{}",
        format!("✓ {} blocks validated successfully.", desired.len())
            .green()
            .bold()
    );
    for resource in &desired {
        println!("  • {}", resource.id);
    }
    Ok(())
}

async fn run_plan(file: &Path) -> Result<(), String> {
    let manifest = Manifest::load(file)?;
    let desired = manifest.desired()?;
    let provider = get_provider(&manifest)?;

    let mut state = get_backend(file)
        .read_state()
        .await
        .map_err(|e| e.to_string())?
        .unwrap_or_default();
    let current = sync::refresh(&provider, &mut state).await?;

    let plan = create_plan(&desired, &current, &schemas());
    print_plan(&plan);
    Ok(())
}

async fn run_apply(file: &Path) -> Result<(), String> {
    let manifest = Manifest::load(file)?;
    let desired = manifest.desired()?;
    let provider = get_provider(&manifest)?;

    with_locked_state(file, "apply", |mut state| async move {
        let outcome = apply(provider, &desired, &mut state).await;
        (state, outcome)
    })
    .await
}

async fn apply(
    provider: ApsaraStackProvider,
    desired: &[Resource],
    state: &mut StateFile,
) -> Result<(), String> {
    let current = sync::refresh(&provider, state).await?;
    let plan = create_plan(desired, &current, &schemas());

    if plan.mutation_count() == 0 {
        println!("{}", "No changes needed.".green());
        return Ok(());
    }

    print_plan(&plan);
    println!();
    println!("{}", "Applying changes...".cyan().bold());
    println!();

    let result = Interpreter::new(provider).apply(&plan).await;
    sync::record(state, &plan, &result);
    print_outcomes(&plan, &result);

    println!();
    if result.is_success() {
        println!(
            "{}",
            format!("Apply complete! {} changes applied.", result.success_count)
                .green()
                .bold()
        );
        Ok(())
    } else {
        println!(
            "{}",
            format!(
                "Apply failed. {} succeeded, {} failed.",
                result.success_count, result.failure_count
            )
            .red()
            .bold()
        );
        Err(format!("{} changes failed", result.failure_count))
    }
}

async fn run_destroy(file: &Path, auto_approve: bool) -> Result<(), String> {
    let manifest = Manifest::load(file)?;
    let provider = get_provider(&manifest)?;

    with_locked_state(file, "destroy", |mut state| async move {
        let outcome = destroy(provider, &mut state, auto_approve).await;
        (state, outcome)
    })
    .await
}

async fn destroy(
    provider: ApsaraStackProvider,
    state: &mut StateFile,
    auto_approve: bool,
) -> Result<(), String> {
    sync::refresh(&provider, state).await?;

    // Reverse creation order
    let mut plan = Plan::new();
    for resource in state.resources.iter().rev() {
        if let Some(identifier) = &resource.identifier {
            plan.add(Effect::Delete {
                id: resource.id(),
                identifier: identifier.clone(),
            });
        }
    }

    if plan.is_empty() {
        println!("{}", "No resources to destroy.".green());
        return Ok(());
    }

    println!("{}", "Destroy Plan:".red().bold());
    println!();
    for effect in plan.effects() {
        println!("  {} {}", "-".red().bold(), effect.resource_id());
    }
    println!();
    println!("Plan: {} to destroy.", plan.effects().len().to_string().red());
    println!();

    if !auto_approve && !confirm("Do you really want to destroy all resources?")? {
        println!();
        println!("{}", "Destroy cancelled.".yellow());
        return Ok(());
    }

    println!("{}", "Destroying resources...".red().bold());
    println!();

    let interpreter = Interpreter::new(provider).with_config(InterpreterConfig {
        continue_on_error: true,
        ..Default::default()
    });
    let result = interpreter.apply(&plan).await;
    sync::record(state, &plan, &result);
    print_outcomes(&plan, &result);

    println!();
    if result.is_success() {
        println!(
            "{}",
            format!("Destroy complete! {} resources destroyed.", result.success_count)
                .green()
                .bold()
        );
        Ok(())
    } else {
        println!(
            "{}",
            format!(
                "Destroy failed. {} succeeded, {} failed.",
                result.success_count, result.failure_count
            )
            .red()
            .bold()
        );
        Err(format!("{} resources could not be destroyed", result.failure_count))
    }
}

async fn run_import(file: &Path, id: ResourceId, identifier: &str) -> Result<(), String> {
    let manifest = Manifest::load(file)?;
    let provider = get_provider(&manifest)?;

    match provider.schema_for(&id.resource_type) {
        Some(schema) if !schema.data_source => {}
        _ => return Err(format!("{} cannot be imported", id.resource_type)),
    }

    with_locked_state(file, "import", |mut state| async move {
        let outcome = import(&provider, &id, identifier, &mut state).await;
        (state, outcome)
    })
    .await
}

async fn import(
    provider: &ApsaraStackProvider,
    id: &ResourceId,
    identifier: &str,
    state: &mut StateFile,
) -> Result<(), String> {
    if state.find_resource(&id.resource_type, &id.name).is_some() {
        return Err(format!("{} is already managed", id));
    }

    let imported = provider
        .read(id, Some(identifier))
        .await
        .map_err(|e| e.to_string())?;
    if !imported.exists {
        return Err(format!(
            "Cannot import non-existent remote object {} ({})",
            id, identifier
        ));
    }

    state.upsert_resource(ResourceState::from_state(&imported));
    println!("{} {} ({})", "Imported".green().bold(), id, identifier);
    Ok(())
}

async fn run_whoami(file: &Path) -> Result<(), String> {
    let manifest = Manifest::load(file)?;
    let provider = get_provider(&manifest)?;

    let identity = provider.whoami().await.map_err(|e| e.to_string())?;
    println!("{} {}", "Account ID:".bold(), identity.account_id);
    println!("{} {}", "Default role ID:".bold(), identity.role_id);
    Ok(())
}

async fn run_sweep(file: &Path, prefixes: &[String]) -> Result<(), String> {
    let manifest = Manifest::load(file)?;
    let provider = get_provider(&manifest)?;

    let prefixes: Vec<&str> = if prefixes.is_empty() {
        SWEEP_PREFIXES.to_vec()
    } else {
        prefixes.iter().map(String::as_str).collect()
    };

    let report = provider.sweep(&prefixes).await.map_err(|e| e.to_string())?;
    for label in &report.deleted {
        println!("  {} {}", "-".red().bold(), label);
    }
    for label in &report.failed {
        println!("  {} {}", "✗".red(), label);
    }
    println!(
        "Sweep: {} deleted, {} skipped, {} failed.",
        report.deleted.len(),
        report.skipped.len(),
        report.failed.len()
    );

    if report.failed.is_empty() {
        Ok(())
    } else {
        Err(format!("{} scaling groups could not be deleted", report.failed.len()))
    }
}

fn confirm(question: &str) -> Result<bool, String> {
    println!("{}", question.yellow().bold());
    println!(
        "  {}",
        "This action cannot be undone. Type 'yes' to confirm.".yellow()
    );
    print!("\n  Enter a value: ");
    std::io::Write::flush(&mut std::io::stdout()).map_err(|e| e.to_string())?;

    let mut input = String::new();
    std::io::stdin()
        .read_line(&mut input)
        .map_err(|e| e.to_string())?;
    Ok(input.trim() == "yes")
}

fn print_plan(plan: &Plan) {
    if plan.mutation_count() == 0 {
        println!("{}", "No changes. Infrastructure is up-to-date.".green());
        return;
    }

    let schemas = schemas();
    println!("{}", "Execution Plan:".cyan().bold());
    println!();

    for effect in plan.effects() {
        let schema = schemas.get(&effect.resource_id().resource_type);
        match effect {
            Effect::Read(r) => println!("  {} {}", "<=".cyan().bold(), r.id),
            Effect::Create(r) => {
                println!("  {} {}", "+".green().bold(), r.id);
                let mut keys: Vec<_> = r.attributes.keys().collect();
                keys.sort();
                for key in keys {
                    println!(
                        "      {}: {}",
                        key,
                        format_attribute(schema, key, &r.attributes[key])
                    );
                }
            }
            Effect::Update {
                id,
                from,
                to,
                changed_attributes,
            }
            | Effect::Replace {
                id,
                from,
                to,
                changed_attributes,
            } => {
                let symbol = if matches!(effect, Effect::Update { .. }) {
                    "~".yellow().bold()
                } else {
                    "-/+".magenta().bold()
                };
                println!("  {} {}", symbol, id);
                for key in changed_attributes {
                    let old = from
                        .attributes
                        .get(key)
                        .map(|v| format_attribute(schema, key, v))
                        .unwrap_or_else(|| "(none)".to_string());
                    let new = to
                        .attributes
                        .get(key)
                        .map(|v| format_attribute(schema, key, v))
                        .unwrap_or_else(|| "(none)".to_string());
                    println!("      {}: {} → {}", key, old.red(), new.green());
                }
            }
            Effect::Delete { id, .. } => println!("  {} {}", "-".red().bold(), id),
        }
    }

    println!();
    println!("{}", plan.summary().to_string().bold());
}

fn print_outcomes(plan: &Plan, result: &ApplyResult) {
    for (effect, outcome) in plan.effects().iter().zip(&result.outcomes) {
        match outcome {
            Ok(_) => println!("  {} {}", "✓".green(), format_effect(effect)),
            Err(e) => println!("  {} {} - {}", "✗".red(), format_effect(effect), e),
        }
    }
}

fn format_effect(effect: &Effect) -> String {
    match effect {
        Effect::Read(r) => format!("Read {}", r.id),
        Effect::Create(r) => format!("Create {}", r.id),
        Effect::Update { id, .. } => format!("Update {}", id),
        Effect::Replace { id, .. } => format!("Replace {}", id),
        Effect::Delete { id, .. } => format!("Delete {}", id),
    }
}

fn format_attribute(schema: Option<&ResourceSchema>, key: &str, value: &Value) -> String {
    let sensitive = schema
        .and_then(|s| s.attributes.get(key))
        .is_some_and(|a| a.sensitive);
    if sensitive {
        "(sensitive)".to_string()
    } else {
        format_value(value)
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        Value::Int(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::List(items) => {
            let strs: Vec<_> = items.iter().map(format_value).collect();
            format!("[{}]", strs.join(", "))
        }
        Value::Map(map) => {
            let mut strs: Vec<_> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", k, format_value(v)))
                .collect();
            strs.sort();
            format!("{{{}}}", strs.join(", "))
        }
    }
}
