//! Build-step execution: per-file fan-out, per-directory iteration, or a
//! single invocation, with incremental skipping and cancellation.

use crate::config::BuildStep;
use crate::exec::{CancelToken, RunOutcome, run_shell};
use crate::expand::escape::{escape, unescape};
use crate::expand::glob::{GlobMode, expand_glob};
use crate::expand::{Evaluator, ExpandOptions};
use crate::includes::IncludeAnalyzer;
use crate::logger;
use crate::value::{Scope, ScopeStack, Value};
use anyhow::{Context, Result, anyhow, bail};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Build-wide options assembled from the command line.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub workspace_root: PathBuf,
    pub max_tasks: usize,
    pub force_rebuild: bool,
    pub debug: bool,
    pub trim_include_paths: bool,
    pub continue_on_error: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StepResult {
    pub files_processed: usize,
    pub files_skipped: usize,
    pub errors_encountered: usize,
}

enum TaskOutcome {
    Ran,
    Skipped,
    Aborted,
}

// concurrent tasks must not race on mkdir -p
static MKDIR_LOCK: Mutex<()> = Mutex::new(());

fn create_dir_locked(path: &Path) -> Result<()> {
    let _guard = MKDIR_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    fs::create_dir_all(path)
        .with_context(|| format!("cannot create output directory '{}'", path.display()))
}

/// Run one build step. `scopes` already carries everything down to the step
/// params; `cli_scope` stays innermost, above even the per-file scope.
pub fn run_step(
    step: &BuildStep,
    scopes: &ScopeStack,
    cli_scope: &Scope,
    options: &BuildOptions,
) -> Result<StepResult> {
    let expand_options = ExpandOptions::new(&options.workspace_root);

    let mut step_scopes = scopes.clone();
    let mut with_cli = step_scopes.clone();
    with_cli.push(cli_scope.clone());

    if let Some(template) = &step.output_directory {
        let evaluator = Evaluator::new(&with_cli, &expand_options);
        let dir = evaluator.expand(template)?;
        let resolved = resolve_root_relative(&options.workspace_root, &dir);
        create_dir_locked(&resolved)?;
        let mut scope = Scope::new();
        scope.insert("outputDirectory".into(), Value::Single(escape(&dir)));
        step_scopes.push(scope);
        with_cli = step_scopes.clone();
        with_cli.push(cli_scope.clone());
    }

    if let Some(pattern) = &step.file_pattern {
        run_per_file(step, pattern, &step_scopes, cli_scope, &with_cli, options)
    } else if let Some(pattern) = &step.directory_pattern {
        run_per_directory(step, pattern, &step_scopes, cli_scope, &with_cli, options)
    } else {
        run_once(step, &step_scopes, cli_scope, &with_cli, options)
    }
}

fn run_per_file(
    step: &BuildStep,
    pattern: &str,
    base: &ScopeStack,
    cli_scope: &Scope,
    with_cli: &ScopeStack,
    options: &BuildOptions,
) -> Result<StepResult> {
    let expand_options = ExpandOptions::new(&options.workspace_root);
    let pattern = Evaluator::new(with_cli, &expand_options).expand(pattern)?;
    let files = expand_glob(&options.workspace_root, &pattern, GlobMode::FilesOnly)?;
    if files.is_empty() {
        logger::warn(&format!(
            "step '{}': no files match '{}'",
            step.name, pattern
        ));
        return Ok(StepResult::default());
    }

    let trim = options.trim_include_paths || step.trim_include_paths.unwrap_or(false);
    let analyzer = if trim {
        let analyzer = IncludeAnalyzer::new(&options.workspace_root);
        let evaluator = Evaluator::new(with_cli, &expand_options);
        if let Ok(value) = evaluator.resolve_var("includePath") {
            let dirs: Vec<String> = value.items().iter().map(|d| unescape(d)).collect();
            analyzer.enlist(&dirs)?;
        }
        Some(analyzer)
    } else {
        None
    };

    let cancel = CancelToken::new();
    let processed = AtomicUsize::new(0);
    let skipped = AtomicUsize::new(0);
    let errors = AtomicUsize::new(0);

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.set_message(step.name.clone());

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.max_tasks)
        .build()
        .context("failed to build the worker pool")?;

    pool.install(|| {
        files.par_iter().for_each(|file| {
            if cancel.is_signalled() {
                return;
            }
            let outcome = run_file_task(
                step,
                file,
                base,
                cli_scope,
                options,
                analyzer.as_ref(),
                &cancel,
                &pb,
            );
            match outcome {
                Ok(TaskOutcome::Ran) => {
                    processed.fetch_add(1, Ordering::SeqCst);
                }
                Ok(TaskOutcome::Skipped) => {
                    skipped.fetch_add(1, Ordering::SeqCst);
                }
                Ok(TaskOutcome::Aborted) => {}
                Err(e) => {
                    errors.fetch_add(1, Ordering::SeqCst);
                    pb.println(format!(
                        "{} step '{}', file '{}': {:#}",
                        "x".red(),
                        step.name,
                        unescape(file),
                        e
                    ));
                    if !options.continue_on_error {
                        cancel.signal();
                    }
                }
            }
            pb.inc(1);
        });
    });
    pb.finish_and_clear();

    Ok(StepResult {
        files_processed: processed.into_inner(),
        files_skipped: skipped.into_inner(),
        errors_encountered: errors.into_inner(),
    })
}

#[allow(clippy::too_many_arguments)]
fn run_file_task(
    step: &BuildStep,
    file: &str,
    base: &ScopeStack,
    cli_scope: &Scope,
    options: &BuildOptions,
    analyzer: Option<&IncludeAnalyzer>,
    cancel: &CancelToken,
    pb: &ProgressBar,
) -> Result<TaskOutcome> {
    if cancel.is_signalled() {
        return Ok(TaskOutcome::Aborted);
    }

    let raw = unescape(file);
    let path = Path::new(&raw);
    let input = resolve_root_relative(&options.workspace_root, &raw);
    let file_scope = file_task_scope(file, path);

    let mut probe = base.clone();
    probe.push(file_scope.clone());
    probe.push(cli_scope.clone());
    let expand_options = ExpandOptions::new(&options.workspace_root);
    let evaluator = Evaluator::new(&probe, &expand_options);

    // incremental skip: output strictly newer than input means nothing to do
    let mut overlay = Scope::new();
    let mut output_path = None;
    if let Some(template) = &step.output_file {
        let out = evaluator.expand(template)?;
        let out_abs = resolve_root_relative(&options.workspace_root, &out);
        let input_mtime = fs::metadata(&input)
            .and_then(|m| m.modified())
            .with_context(|| format!("missing input file '{}'", raw))?;
        if !options.force_rebuild {
            if let Ok(out_mtime) = fs::metadata(&out_abs).and_then(|m| m.modified()) {
                if out_mtime > input_mtime {
                    return Ok(TaskOutcome::Skipped);
                }
            }
        }
        overlay.insert("outputFile".into(), Value::Single(escape(&out)));
        output_path = Some(out_abs);
    }

    let forced: Vec<String> = match evaluator.resolve_var("forcedInclude") {
        Ok(value) => value.items().iter().map(|f| unescape(f)).collect(),
        Err(_) => Vec::new(),
    };
    for forced_file in &forced {
        let resolved = resolve_root_relative(&options.workspace_root, forced_file);
        if !resolved.is_file() {
            bail!("forced include '{}' not found", forced_file);
        }
    }

    if let Some(analyzer) = analyzer {
        let trimmed = trim_include_paths(analyzer, options, &raw, &forced)?;
        overlay.insert(
            "includePath".into(),
            Value::Multi(trimmed.iter().map(|p| escape(p)).collect()),
        );
    }

    let mut stack = base.clone();
    stack.push(file_scope);
    stack.push(overlay);
    stack.push(cli_scope.clone());
    let evaluator = Evaluator::new(&stack, &expand_options);
    let command = evaluator.expand(&step.command)?;

    if cancel.is_signalled() {
        return Ok(TaskOutcome::Aborted);
    }
    if let Some(parent) = output_path.as_deref().and_then(Path::parent) {
        create_dir_locked(parent)?;
    }
    if options.debug {
        pb.println(format!("   {}", command.dimmed()));
    }

    match run_shell(&command, &options.workspace_root, None, cancel)? {
        RunOutcome::Cancelled => Ok(TaskOutcome::Aborted),
        RunOutcome::Completed(output) => {
            let mut block = String::new();
            block.push_str(output.stdout.trim_end_matches('\n'));
            if !output.stderr.is_empty() {
                if !block.is_empty() {
                    block.push('\n');
                }
                block.push_str(output.stderr.trim_end_matches('\n'));
            }
            if !block.is_empty() {
                pb.println(block);
            }
            if !output.success() {
                return Err(anyhow!("command exited with {}", output.status));
            }
            Ok(TaskOutcome::Ran)
        }
    }
}

/// The minimal `-I` set for one translation unit: the union of the paths
/// needed by the file itself and by every forced include, in enlistment
/// order.
fn trim_include_paths(
    analyzer: &IncludeAnalyzer,
    options: &BuildOptions,
    file: &str,
    forced: &[String],
) -> Result<Vec<String>> {
    let mut needed: HashSet<String> = HashSet::new();
    let mut seeds = vec![(file.to_string(), true)];
    seeds.extend(forced.iter().map(|f| (f.clone(), false)));

    for (seed, is_input) in seeds {
        let abs = resolve_root_relative(&options.workspace_root, &seed);
        let location = abs.parent().unwrap_or(Path::new(".")).to_path_buf();
        let name = abs
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match analyzer.get_paths(&location, &name)? {
            Some(paths) => needed.extend(paths),
            None if is_input => bail!("input file '{}' not found", seed),
            None => bail!("forced include '{}' not found", seed),
        }
    }

    Ok(analyzer
        .enlisted()
        .into_iter()
        .filter(|p| needed.contains(p))
        .collect())
}

fn run_per_directory(
    step: &BuildStep,
    pattern: &str,
    base: &ScopeStack,
    cli_scope: &Scope,
    with_cli: &ScopeStack,
    options: &BuildOptions,
) -> Result<StepResult> {
    let expand_options = ExpandOptions::new(&options.workspace_root);
    let pattern = Evaluator::new(with_cli, &expand_options).expand(pattern)?;
    let directories = expand_glob(
        &options.workspace_root,
        &pattern,
        GlobMode::DirectoriesOnly,
    )?;

    let mut result = StepResult::default();
    for directory in directories {
        let raw = unescape(&directory);
        let full = resolve_root_relative(&options.workspace_root, &raw);
        let name = full
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut scope = Scope::new();
        scope.insert("directoryPath".into(), Value::Single(directory.clone()));
        scope.insert(
            "fullDirectoryPath".into(),
            Value::Single(escape(&full.to_string_lossy().replace('\\', "/"))),
        );
        scope.insert("directoryName".into(), Value::Single(escape(&name)));

        let mut stack = base.clone();
        stack.push(scope);
        stack.push(cli_scope.clone());
        let command = Evaluator::new(&stack, &expand_options).expand(&step.command)?;

        if options.debug {
            logger::command(&command);
        }
        match run_shell(&command, &options.workspace_root, None, &CancelToken::new())? {
            RunOutcome::Cancelled => {}
            RunOutcome::Completed(output) => {
                relay_output(&output.stdout, &output.stderr);
                if output.success() {
                    result.files_processed += 1;
                } else {
                    result.errors_encountered += 1;
                    logger::error(&format!(
                        "step '{}', directory '{}': command exited with {}",
                        step.name, raw, output.status
                    ));
                    if !options.continue_on_error {
                        return Ok(result);
                    }
                }
            }
        }
    }
    Ok(result)
}

fn run_once(
    step: &BuildStep,
    base: &ScopeStack,
    cli_scope: &Scope,
    with_cli: &ScopeStack,
    options: &BuildOptions,
) -> Result<StepResult> {
    let expand_options = ExpandOptions::new(&options.workspace_root);

    let mut scope = Scope::new();
    if let Some(template) = &step.file_list {
        let pattern = Evaluator::new(with_cli, &expand_options).expand(template)?;
        let files = expand_glob(&options.workspace_root, &pattern, GlobMode::FilesOnly)?;

        let mut paths = Vec::new();
        let mut directories = Vec::new();
        let mut names = Vec::new();
        let mut full_names = Vec::new();
        let mut extensions = Vec::new();
        for file in &files {
            let raw = unescape(file);
            let path = Path::new(&raw);
            paths.push(file.clone());
            directories.push(escape(&parent_of(path)));
            names.push(escape(&lossy(path.file_stem())));
            full_names.push(escape(&lossy(path.file_name())));
            extensions.push(escape(&extension_of(path)));
        }
        scope.insert("filePath".into(), Value::Multi(paths));
        scope.insert("fileDirectory".into(), Value::Multi(directories));
        scope.insert("fileName".into(), Value::Multi(names));
        scope.insert("fullFileName".into(), Value::Multi(full_names));
        scope.insert("fileExtension".into(), Value::Multi(extensions));
    }

    let mut stack = base.clone();
    stack.push(scope);
    stack.push(cli_scope.clone());
    let command = Evaluator::new(&stack, &expand_options).expand(&step.command)?;

    if options.debug {
        logger::command(&command);
    }
    let mut result = StepResult::default();
    match run_shell(&command, &options.workspace_root, None, &CancelToken::new())? {
        RunOutcome::Cancelled => {}
        RunOutcome::Completed(output) => {
            relay_output(&output.stdout, &output.stderr);
            if output.success() {
                result.files_processed += 1;
            } else {
                result.errors_encountered += 1;
                logger::error(&format!(
                    "step '{}': command exited with {}",
                    step.name, output.status
                ));
            }
        }
    }
    Ok(result)
}

fn file_task_scope(escaped: &str, path: &Path) -> Scope {
    let mut scope = Scope::new();
    scope.insert("filePath".into(), Value::Single(escaped.to_string()));
    scope.insert("fileDirectory".into(), Value::Single(escape(&parent_of(path))));
    scope.insert("fileName".into(), Value::Single(escape(&lossy(path.file_stem()))));
    scope.insert(
        "fullFileName".into(),
        Value::Single(escape(&lossy(path.file_name()))),
    );
    scope.insert(
        "fileExtension".into(),
        Value::Single(escape(&extension_of(path))),
    );
    scope
}

fn parent_of(path: &Path) -> String {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_string_lossy().replace('\\', "/"),
        _ => ".".to_string(),
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default()
}

fn lossy(part: Option<&std::ffi::OsStr>) -> String {
    part.map(|p| p.to_string_lossy().into_owned()).unwrap_or_default()
}

fn resolve_root_relative(root: &Path, path: &str) -> PathBuf {
    let trimmed = path.trim_matches('"');
    let p = Path::new(trimmed);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        root.join(p)
    }
}

fn relay_output(stdout: &str, stderr: &str) {
    if !stdout.trim().is_empty() {
        logger::emit(stdout);
    }
    if !stderr.trim().is_empty() {
        logger::emit(stderr);
    }
}
