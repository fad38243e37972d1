//! Sample build-configuration writer for `--initialize`.

use crate::config;
use anyhow::{Context, Result};
use colored::*;
use std::fs;
use std::path::Path;

const SAMPLE: &str = r#"{
    "version": 1,
    "params": {
        "buildDir": "build/${buildTypeName}",
        "includePath": ["src"],
        "defines": []
    },
    "configurations": [
        {
            "name": "gcc",
            "params": { "compiler": "g++" },
            "buildTypes": [
                { "name": "debug", "params": { "buildFlags": "-O0 -g -Wall" } },
                { "name": "release", "params": { "buildFlags": "-O2" } }
            ],
            "buildSteps": [
                {
                    "name": "C++ Compile",
                    "filePattern": "src/**/*.cpp",
                    "outputDirectory": "${buildDir}/obj",
                    "outputFile": "${buildDir}/obj/${fileName}.o",
                    "command": "${compiler} -c ${buildFlags} (-I[$${includePath}]) (-D$${defines}) [${filePath}] -o [${outputFile}]"
                },
                {
                    "name": "C++ Link",
                    "fileList": "${buildDir}/obj/*.o",
                    "command": "${compiler} ${buildFlags} [$${filePath}] -o [${buildDir}/app]"
                }
            ]
        }
    ]
}
"#;

/// Write the sample configuration to `path` (a file, or a directory that
/// receives `c_cpp_build.json`). Asks before overwriting.
pub fn write_sample(path: &Path) -> Result<()> {
    let target = if path.is_dir() {
        path.join("c_cpp_build.json")
    } else {
        path.to_path_buf()
    };

    if target.exists() {
        let overwrite =
            inquire::Confirm::new(&format!("'{}' exists. Overwrite?", target.display()))
                .with_default(false)
                .prompt()?;
        if !overwrite {
            println!("{} Left '{}' untouched.", "!".yellow(), target.display());
            return Ok(());
        }
    }

    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("cannot create '{}'", parent.display()))?;
        }
    }
    fs::write(&target, SAMPLE)
        .with_context(|| format!("cannot write '{}'", target.display()))?;

    // the sample must stay loadable by our own parser
    config::load_build_file(&target)?;

    println!(
        "{} Wrote sample build configuration to '{}'",
        "✓".green(),
        target.display()
    );
    println!("  Try: {}", "cxb gcc debug".bold().white());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_round_trips_through_loader() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("sub").join("build.json");
        write_sample(&target).unwrap();
        let config = config::load_build_file(&target).unwrap();
        assert_eq!(config.configurations.len(), 1);
        assert_eq!(config.configurations[0].build_steps.len(), 2);
    }
}
