//! Configuration parsing: the build-steps file and the C/C++ properties file.

use crate::expand::escape::escape;
use crate::value::{Scope, Value};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

pub const BUILD_FILE_DEFAULT: &str = ".vscode/c_cpp_build.json";
pub const PROPERTIES_FILE_DEFAULT: &str = ".vscode/c_cpp_properties.json";
pub const CONFIG_VERSION: u64 = 1;

#[derive(Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GlobalConfiguration {
    pub version: u64,
    pub params: Option<Scope>,
    pub configurations: Vec<BuildConfiguration>,
}

#[derive(Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfiguration {
    pub name: String,
    pub params: Option<Scope>,
    pub build_types: Option<Vec<BuildType>>,
    pub build_steps: Vec<BuildStep>,
    /// Carried for editor integration; the driver does not use them.
    pub problem_matchers: Option<Vec<String>>,
}

#[derive(Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BuildType {
    pub name: String,
    pub params: Option<Scope>,
}

#[derive(Deserialize, Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct BuildStep {
    pub name: String,
    pub command: String,
    pub params: Option<Scope>,
    pub file_pattern: Option<String>,
    pub directory_pattern: Option<String>,
    pub file_list: Option<String>,
    pub output_directory: Option<String>,
    pub output_file: Option<String>,
    pub trim_include_paths: Option<bool>,
}

pub fn load_build_file(path: &Path) -> Result<GlobalConfiguration> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("cannot read build file '{}'", path.display()))?;
    let config: GlobalConfiguration = serde_json::from_str(&text)
        .with_context(|| format!("cannot parse build file '{}'", path.display()))?;
    validate(&config)?;
    Ok(config)
}

/// Cross-field invariants the serde models cannot express.
pub fn validate(config: &GlobalConfiguration) -> Result<()> {
    if config.version != CONFIG_VERSION {
        bail!(
            "unsupported build file version {} (expected {})",
            config.version,
            CONFIG_VERSION
        );
    }

    let mut names = HashSet::new();
    for configuration in &config.configurations {
        if !names.insert(configuration.name.as_str()) {
            bail!("duplicate configuration name '{}'", configuration.name);
        }
        if let Some(build_types) = &configuration.build_types {
            let mut type_names = HashSet::new();
            for build_type in build_types {
                if !type_names.insert(build_type.name.as_str()) {
                    bail!(
                        "duplicate build type '{}' in configuration '{}'",
                        build_type.name,
                        configuration.name
                    );
                }
            }
        }
        for step in &configuration.build_steps {
            let selectors = [
                step.file_pattern.is_some(),
                step.directory_pattern.is_some(),
                step.file_list.is_some(),
            ]
            .iter()
            .filter(|&&p| p)
            .count();
            if selectors > 1 {
                bail!(
                    "step '{}' mixes filePattern, directoryPattern and fileList; they are mutually exclusive",
                    step.name
                );
            }
            if step.output_file.is_some() && step.file_pattern.is_none() {
                bail!(
                    "step '{}' declares outputFile without filePattern",
                    step.name
                );
            }
        }
    }
    Ok(())
}

// --- C/C++ properties file ---

#[derive(Deserialize, Debug)]
pub struct CppProperties {
    pub configurations: Vec<CppConfiguration>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CppConfiguration {
    pub name: String,
    #[serde(default)]
    pub include_path: Vec<String>,
    #[serde(default)]
    pub forced_include: Vec<String>,
    #[serde(default)]
    pub defines: Vec<String>,
}

pub fn load_properties(path: &Path) -> Result<CppProperties> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("cannot read properties file '{}'", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("cannot parse properties file '{}'", path.display()))
}

/// Build the properties scope for the configuration named `config_name`.
///
/// Values are pre-resolved with the host editor's variable syntax and then
/// escaped, so they enter the resolver as inert literals.
pub fn properties_scope(
    properties: &CppProperties,
    config_name: &str,
    workspace_root: &Path,
) -> Option<Scope> {
    let configuration = properties
        .configurations
        .iter()
        .find(|c| c.name == config_name)?;

    let literal = |values: &[String]| -> Value {
        Value::Multi(
            values
                .iter()
                .map(|v| escape(&resolve_host_vars(v, workspace_root)))
                .collect(),
        )
    };

    let mut scope = Scope::new();
    scope.insert("includePath".into(), literal(&configuration.include_path));
    scope.insert("forcedInclude".into(), literal(&configuration.forced_include));
    scope.insert("defines".into(), literal(&configuration.defines));
    Some(scope)
}

/// Resolve `${workspaceFolder}`, `${workspaceRootFolderName}` and
/// `${env:NAME}` the way the host editor would.
fn resolve_host_vars(text: &str, workspace_root: &Path) -> String {
    let root = workspace_root.to_string_lossy().replace('\\', "/");
    let folder_name = workspace_root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut out = text
        .replace("${workspaceFolder}", &root)
        .replace("${workspaceRoot}", &root)
        .replace("${workspaceRootFolderName}", &folder_name);

    while let Some(start) = out.find("${env:") {
        let Some(end) = out[start..].find('}') else { break };
        let name = &out[start + 6..start + end];
        let value = std::env::var(name).unwrap_or_default();
        out.replace_range(start..start + end + 1, &value);
    }
    out
}
