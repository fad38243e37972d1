use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::PathBuf;

use cxbuild::{config, driver, sample};

#[derive(Parser)]
#[command(name = "cxb")]
#[command(about = "Declarative, multi-step, incremental build driver for C/C++", version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
struct Cli {
    /// Build configuration name
    config: Option<String>,

    /// Build type name (e.g. debug, release)
    build_type: Option<String>,

    /// Root used for relative resolution [default: current directory]
    #[arg(short = 'w', long, value_name = "PATH")]
    workspace_root: Option<PathBuf>,

    /// Path to the build-steps JSON [default: .vscode/c_cpp_build.json]
    #[arg(short = 'b', long, value_name = "FILE")]
    build_file: Option<PathBuf>,

    /// Path to the C/C++ properties JSON; pass the flag without a value to
    /// disable the properties file [default: .vscode/c_cpp_properties.json]
    #[arg(short = 'p', long, value_name = "FILE", num_args = 0..=1)]
    properties_file: Option<Option<PathBuf>>,

    /// Inject a variable atop all other scopes (repeatable)
    #[arg(short = 'v', long = "variable", value_name = "NAME=VALUE")]
    variable: Vec<String>,

    /// Maximum number of concurrent file tasks
    #[arg(short = 'j', long, value_name = "N", default_value_t = 4)]
    max_tasks: usize,

    /// Disable incremental skipping
    #[arg(short = 'f', long)]
    force_rebuild: bool,

    /// Emit each command line before execution
    #[arg(short = 'd', long)]
    debug: bool,

    /// Trim include paths to what each translation unit actually needs
    #[arg(short = 't', long)]
    trim_include_paths: bool,

    /// Do not cancel the build on the first failure
    #[arg(short = 'c', long)]
    continue_on_error: bool,

    /// Write a sample build configuration and exit
    #[arg(short = 'i', long, value_name = "PATH")]
    initialize: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.initialize {
        return sample::write_sample(path);
    }

    let config_name = cli
        .config
        .clone()
        .context("missing configuration name (run with --help for usage)")?;
    if cli.max_tasks < 1 {
        bail!("--max-tasks must be at least 1");
    }

    let cwd = std::env::current_dir().context("cannot determine the current directory")?;
    let workspace_root = match &cli.workspace_root {
        Some(path) if path.is_absolute() => path.clone(),
        Some(path) => cwd.join(path),
        None => cwd,
    };

    let build_file = cli
        .build_file
        .clone()
        .unwrap_or_else(|| workspace_root.join(config::BUILD_FILE_DEFAULT));
    let properties_file = match &cli.properties_file {
        None => Some(workspace_root.join(config::PROPERTIES_FILE_DEFAULT)),
        Some(None) => None,
        Some(Some(path)) => Some(path.clone()),
    };

    let mut cli_variables = Vec::new();
    for pair in &cli.variable {
        let Some((name, value)) = pair.split_once('=') else {
            bail!("--variable expects NAME=VALUE, got '{}'", pair);
        };
        cli_variables.push((name.to_string(), value.to_string()));
    }

    driver::run_build(&driver::BuildParams {
        workspace_root,
        build_file,
        properties_file,
        config_name,
        build_type: cli.build_type.clone(),
        cli_variables,
        max_tasks: cli.max_tasks,
        force_rebuild: cli.force_rebuild,
        debug: cli.debug,
        trim_include_paths: cli.trim_include_paths,
        continue_on_error: cli.continue_on_error,
    })
}
