//! The build driver: load configuration, compose the scope stack, run each
//! step in order, aggregate and report.

use crate::config::{self, BuildConfiguration, BuildType, GlobalConfiguration};
use crate::expand::escape::escape;
use crate::logger;
use crate::step::{self, BuildOptions, StepResult};
use crate::ui;
use crate::value::{Scope, ScopeStack, Value};
use anyhow::{Result, anyhow, bail};
use colored::*;
use std::path::PathBuf;
use std::time::Instant;

/// Everything the command line decides.
#[derive(Debug, Clone)]
pub struct BuildParams {
    pub workspace_root: PathBuf,
    pub build_file: PathBuf,
    /// None disables the properties file entirely.
    pub properties_file: Option<PathBuf>,
    pub config_name: String,
    pub build_type: Option<String>,
    pub cli_variables: Vec<(String, String)>,
    pub max_tasks: usize,
    pub force_rebuild: bool,
    pub debug: bool,
    pub trim_include_paths: bool,
    pub continue_on_error: bool,
}

pub fn run_build(params: &BuildParams) -> Result<()> {
    let start = Instant::now();

    let global = config::load_build_file(&params.build_file)?;
    let configuration = find_configuration(&global, &params.config_name)?;
    let build_type = find_build_type(configuration, params.build_type.as_deref())?;

    logger::emit(&format!(
        "{} configuration '{}'{}",
        "Building".bold().cyan(),
        configuration.name,
        build_type
            .map(|t| format!(", build type '{}'", t.name))
            .unwrap_or_default()
    ));

    let base = compose_scopes(params, &global, configuration, build_type);
    let cli_scope = cli_scope(&params.cli_variables);
    let options = BuildOptions {
        workspace_root: params.workspace_root.clone(),
        max_tasks: params.max_tasks,
        force_rebuild: params.force_rebuild,
        debug: params.debug,
        trim_include_paths: params.trim_include_paths,
        continue_on_error: params.continue_on_error,
    };

    let mut results: Vec<(String, StepResult)> = Vec::new();
    let mut total = StepResult::default();
    let mut failed_step = None;

    for build_step in &configuration.build_steps {
        logger::emit(&format!("{} {}", "Step:".bold(), build_step.name.cyan()));

        let mut scopes = base.clone();
        if let Some(step_params) = &build_step.params {
            scopes.push(step_params.clone());
        }

        let result = match step::run_step(build_step, &scopes, &cli_scope, &options) {
            Ok(result) => result,
            Err(e) => {
                // resolution and I/O failures at step level
                logger::error(&format!("step '{}': {:#}", build_step.name, e));
                StepResult {
                    errors_encountered: 1,
                    ..StepResult::default()
                }
            }
        };

        logger::emit(&format!(
            "   processed {}, skipped {}, errors {}",
            result.files_processed, result.files_skipped, result.errors_encountered
        ));
        total.files_processed += result.files_processed;
        total.files_skipped += result.files_skipped;
        total.errors_encountered += result.errors_encountered;
        results.push((build_step.name.clone(), result));

        if result.errors_encountered > 0 && !params.continue_on_error {
            failed_step = Some(build_step.name.clone());
            break;
        }
    }

    print_summary(&results);

    if let Some(name) = failed_step {
        bail!("build stopped at step '{}'", name);
    }
    if total.errors_encountered > 0 {
        bail!("build finished with {} error(s)", total.errors_encountered);
    }
    logger::info(&format!("Build finished in {:.2?}", start.elapsed()));
    Ok(())
}

fn find_configuration<'a>(
    global: &'a GlobalConfiguration,
    name: &str,
) -> Result<&'a BuildConfiguration> {
    global.configurations.iter().find(|c| c.name == name).ok_or_else(|| {
        let available: Vec<&str> =
            global.configurations.iter().map(|c| c.name.as_str()).collect();
        anyhow!(
            "configuration '{}' not found (available: {})",
            name,
            available.join(", ")
        )
    })
}

fn find_build_type<'a>(
    configuration: &'a BuildConfiguration,
    name: Option<&str>,
) -> Result<Option<&'a BuildType>> {
    let Some(name) = name else { return Ok(None) };
    let build_types = configuration.build_types.as_deref().unwrap_or(&[]);
    build_types
        .iter()
        .find(|t| t.name == name)
        .map(Some)
        .ok_or_else(|| {
            let available: Vec<&str> = build_types.iter().map(|t| t.name.as_str()).collect();
            anyhow!(
                "build type '{}' not found in configuration '{}' (available: {})",
                name,
                configuration.name,
                available.join(", ")
            )
        })
}

/// Outermost to innermost: built-in defaults, C/C++ properties, file-wide
/// params, configuration params, build-type params. Step params and the CLI
/// scope are layered later.
fn compose_scopes(
    params: &BuildParams,
    global: &GlobalConfiguration,
    configuration: &BuildConfiguration,
    build_type: Option<&BuildType>,
) -> ScopeStack {
    let mut stack = ScopeStack::new();

    let mut defaults = Scope::new();
    let root = params.workspace_root.to_string_lossy().replace('\\', "/");
    defaults.insert("workspaceRoot".into(), Value::Single(escape(&root)));
    defaults.insert(
        "workspaceRootFolderName".into(),
        Value::Single(escape(
            &params
                .workspace_root
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        )),
    );
    defaults.insert(
        "configName".into(),
        Value::Single(escape(&configuration.name)),
    );
    if let Some(t) = build_type {
        defaults.insert("buildTypeName".into(), Value::Single(escape(&t.name)));
    }
    stack.push(defaults);

    if let Some(path) = &params.properties_file {
        if path.exists() {
            match config::load_properties(path) {
                Ok(properties) => {
                    match config::properties_scope(
                        &properties,
                        &configuration.name,
                        &params.workspace_root,
                    ) {
                        Some(scope) => stack.push(scope),
                        None => logger::warn(&format!(
                            "properties file has no configuration named '{}'",
                            configuration.name
                        )),
                    }
                }
                Err(e) => logger::warn(&format!("{:#}", e)),
            }
        }
    }

    if let Some(scope) = &global.params {
        stack.push(scope.clone());
    }
    if let Some(scope) = &configuration.params {
        stack.push(scope.clone());
    }
    if let Some(t) = build_type {
        if let Some(scope) = &t.params {
            stack.push(scope.clone());
        }
    }
    stack
}

fn cli_scope(variables: &[(String, String)]) -> Scope {
    let mut scope = Scope::new();
    for (name, value) in variables {
        scope.insert(name.clone(), Value::Single(value.clone()));
    }
    scope
}

fn print_summary(results: &[(String, StepResult)]) {
    if results.len() < 2 {
        return;
    }
    let mut table = ui::Table::new(&["Step", "Processed", "Skipped", "Errors"]);
    for (name, result) in results {
        let errors = if result.errors_encountered > 0 {
            result.errors_encountered.to_string().red().to_string()
        } else {
            result.errors_encountered.to_string()
        };
        table.add_row(vec![
            name.clone(),
            result.files_processed.to_string(),
            result.files_skipped.to_string(),
            errors,
        ]);
    }
    table.print();
}
