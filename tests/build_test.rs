//! Build-level behaviour over real scratch trees: incremental skipping,
//! include-path trimming, cancellation.

#![cfg(unix)]

use cxbuild::config::BuildStep;
use cxbuild::step::{self, BuildOptions, StepResult};
use cxbuild::value::{Scope, ScopeStack, Value};
use std::fs;
use std::path::Path;

fn options(root: &Path) -> BuildOptions {
    BuildOptions {
        workspace_root: root.to_path_buf(),
        max_tasks: 4,
        force_rebuild: false,
        debug: false,
        trim_include_paths: false,
        continue_on_error: false,
    }
}

fn run(step: &BuildStep, scopes: &ScopeStack, opts: &BuildOptions) -> StepResult {
    step::run_step(step, scopes, &Scope::new(), opts).unwrap()
}

#[test]
fn second_run_skips_every_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("src")).unwrap();
    fs::write(dir.path().join("src/a.cpp"), "int a;").unwrap();
    fs::write(dir.path().join("src/b.cpp"), "int b;").unwrap();
    fs::write(dir.path().join("src/c.cpp"), "int c;").unwrap();

    let step = BuildStep {
        name: "compile".into(),
        command: "touch [${outputFile}]".into(),
        file_pattern: Some("**/*.cpp".into()),
        output_file: Some("build/${fileName}.o".into()),
        ..Default::default()
    };
    let opts = options(dir.path());

    let first = run(&step, &ScopeStack::new(), &opts);
    assert_eq!(first.files_processed, 3);
    assert_eq!(first.files_skipped, 0);
    assert!(dir.path().join("build/a.o").is_file());

    let second = run(&step, &ScopeStack::new(), &opts);
    assert_eq!(second.files_processed, 0);
    assert_eq!(second.files_skipped, 3);
}

#[test]
fn touching_the_input_reruns_the_command() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.cpp"), "int a;").unwrap();

    let step = BuildStep {
        name: "compile".into(),
        command: "touch [${outputFile}]".into(),
        file_pattern: Some("*.cpp".into()),
        output_file: Some("build/${fileName}.o".into()),
        ..Default::default()
    };
    let opts = options(dir.path());

    run(&step, &ScopeStack::new(), &opts);
    assert_eq!(run(&step, &ScopeStack::new(), &opts).files_skipped, 1);

    // make the input strictly newer than the output again
    std::thread::sleep(std::time::Duration::from_millis(20));
    fs::write(dir.path().join("a.cpp"), "int a2;").unwrap();
    let rerun = run(&step, &ScopeStack::new(), &opts);
    assert_eq!(rerun.files_processed, 1);
    assert_eq!(rerun.files_skipped, 0);
}

#[test]
fn trimmed_include_paths_in_enlistment_order() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    // ten candidate dirs, only three transitively needed
    for i in 0..10 {
        fs::create_dir(root.join(format!("inc{}", i))).unwrap();
    }
    fs::write(root.join("inc1/one.h"), "#include \"two.h\"\n").unwrap();
    fs::write(root.join("inc2/two.h"), "int t;\n").unwrap();
    fs::write(root.join("inc5/five.h"), "int f;\n").unwrap();
    fs::write(
        root.join("main.cpp"),
        "#include \"one.h\"\n#include \"five.h\"\n#include <vector>\nint main() {}\n",
    )
    .unwrap();

    let mut params = Scope::new();
    params.insert(
        "includePath".into(),
        Value::Multi((0..10).map(|i| format!("inc{}", i)).collect()),
    );
    let mut scopes = ScopeStack::new();
    scopes.push(params);

    let step = BuildStep {
        name: "compile".into(),
        command: "echo (-I$${includePath}) > flags.txt".into(),
        file_pattern: Some("*.cpp".into()),
        trim_include_paths: Some(true),
        ..Default::default()
    };
    run(&step, &scopes, &options(root));

    let flags = fs::read_to_string(root.join("flags.txt")).unwrap();
    assert_eq!(flags.trim(), "-Iinc1 -Iinc2 -Iinc5");
}

#[test]
fn untrimmed_step_passes_every_include_path() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::write(root.join("main.cpp"), "int main() {}\n").unwrap();

    let mut params = Scope::new();
    params.insert("includePath".into(), Value::Multi(vec!["x".into(), "y".into()]));
    let mut scopes = ScopeStack::new();
    scopes.push(params);

    let step = BuildStep {
        name: "compile".into(),
        command: "echo (-I$${includePath}) > flags.txt".into(),
        file_pattern: Some("*.cpp".into()),
        ..Default::default()
    };
    run(&step, &scopes, &options(root));

    let flags = fs::read_to_string(root.join("flags.txt")).unwrap();
    assert_eq!(flags.trim(), "-Ix -Iy");
}

#[test]
fn missing_forced_include_fails_before_launch() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::write(root.join("main.cpp"), "int main() {}\n").unwrap();

    let mut params = Scope::new();
    params.insert(
        "forcedInclude".into(),
        Value::Multi(vec!["ghost/prefix.h".into()]),
    );
    let mut scopes = ScopeStack::new();
    scopes.push(params);

    let step = BuildStep {
        name: "compile".into(),
        command: "touch ran.txt".into(),
        file_pattern: Some("*.cpp".into()),
        ..Default::default()
    };
    let result = run(&step, &scopes, &options(root));
    assert_eq!(result.errors_encountered, 1);
    assert!(!root.join("ran.txt").exists());
}

#[test]
fn cancellation_keeps_later_tasks_from_spawning() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    for i in 0..20 {
        fs::write(root.join(format!("f{:02}.src", i)), "x").unwrap();
    }

    // every spawned command leaves a marker, then fails
    let step = BuildStep {
        name: "fail".into(),
        command: "touch ${fileName}.ran && false".into(),
        file_pattern: Some("*.src".into()),
        ..Default::default()
    };
    let mut opts = options(root);
    opts.max_tasks = 2;
    let result = run(&step, &ScopeStack::new(), &opts);

    let markers = fs::read_dir(root)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".ran"))
        .count();

    assert!(result.errors_encountered >= 1);
    assert_eq!(result.files_processed, 0);
    // after the first failure only in-flight tasks may still spawn
    assert!(markers < 20, "cancellation left {} markers", markers);
}
