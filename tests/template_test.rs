//! End-to-end template expansion scenarios, driven through the public
//! evaluator API exactly as the step executor drives it.

use cxbuild::expand::glob::GlobMode;
use cxbuild::expand::{Evaluator, ExpandOptions};
use cxbuild::value::{Scope, ScopeStack, Value};
use std::path::Path;

fn stack(pairs: &[(&str, Value)]) -> ScopeStack {
    let mut scope = Scope::new();
    for (name, value) in pairs {
        scope.insert(name.to_string(), value.clone());
    }
    let mut stack = ScopeStack::new();
    stack.push(scope);
    stack
}

fn multi(items: &[&str]) -> Value {
    Value::Multi(items.iter().map(|s| s.to_string()).collect())
}

fn expand(stack: &ScopeStack, template: &str) -> anyhow::Result<String> {
    let options = ExpandOptions::new("/tmp");
    Evaluator::new(stack, &options).expand(template)
}

#[test]
fn scenario_single_then_multi() {
    let stack = stack(&[("t1", Value::from("a")), ("t2", multi(&["bb", "ccc", "dddd"]))]);
    assert_eq!(expand(&stack, "${t1} $${t2}").unwrap(), "a bb ccc dddd");
}

#[test]
fn scenario_path_group_quotes_spaced_values() {
    let stack = stack(&[("t1", multi(&["b b", "c c c", "dddd"]))]);
    assert_eq!(expand(&stack, "[$${t1}]").unwrap(), "\"b b\" \"c c c\" dddd");
}

#[test]
fn scenario_group_fans_out_prefix() {
    let stack = stack(&[("t1", multi(&["b b", "c c c", "dddd"]))]);
    assert_eq!(
        expand(&stack, "(f:[$${t1}])").unwrap(),
        "f:\"b b\" f:\"c c c\" f:dddd"
    );
}

#[test]
fn scenario_nested_groups_and_lists() {
    let stack = stack(&[
        ("t0", multi(&["a", "(-$${t1})", "(+$${t2})", "${t3}", "$${g, h}"])),
        ("t1", multi(&["b", "c"])),
        ("t2", multi(&["d", "e"])),
        ("t3", Value::from("f")),
    ]);
    assert_eq!(expand(&stack, "($${t0})").unwrap(), "a -b -c +d +e f g h");
}

#[test]
fn top_level_multis_fan_out_independently() {
    let stack = stack(&[("xs", multi(&["1", "2"])), ("ys", multi(&["3", "4"]))]);
    // no sub-template, so two multi-valued variables are fine at top level
    assert_eq!(expand(&stack, "$${xs} and $${ys}").unwrap(), "1 2 and 3 4");
}

#[test]
fn two_multis_in_one_group_rejected() {
    let stack = stack(&[("xs", multi(&["1", "2"])), ("ys", multi(&["3", "4"]))]);
    let err = expand(&stack, "($${xs} $${ys})").unwrap_err();
    assert!(format!("{:#}", err).contains("more than one multi-valued"));
}

#[test]
fn path_quoting_through_single_variable() {
    let spaced = stack(&[("p", Value::from("a b/c"))]);
    assert_eq!(expand(&spaced, "[${p}]").unwrap(), "\"a b/c\"");

    let plain = stack(&[("p", Value::from("abc"))]);
    assert_eq!(expand(&plain, "[${p}]").unwrap(), "abc");

    #[cfg(not(windows))]
    {
        let quoted = stack(&[("p", Value::from("'a b'"))]);
        assert_eq!(expand(&quoted, "[${p}]").unwrap(), "'a b'");
    }
}

#[test]
fn glob_expansion_directories_in_lexical_order() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("B")).unwrap();
    std::fs::create_dir(dir.path().join("A")).unwrap();
    std::fs::write(dir.path().join("file.txt"), "").unwrap();

    let stack = ScopeStack::new();
    let options =
        ExpandOptions::new(dir.path()).with_glob_mode(GlobMode::DirectoriesOnly);
    let evaluator = Evaluator::new(&stack, &options);
    assert_eq!(evaluator.expand("[$${*}]").unwrap(), "A B");
}

#[test]
fn workspace_root_variable_is_builtin_shaped() {
    // the driver seeds workspaceRoot; mimic that layering here
    let mut defaults = Scope::new();
    defaults.insert("workspaceRoot".into(), Value::from("/ws"));
    let mut inner = Scope::new();
    inner.insert("out".into(), Value::from("${workspaceRoot}/build"));
    let mut scopes = ScopeStack::new();
    scopes.push(defaults);
    scopes.push(inner);

    let options = ExpandOptions::new(Path::new("/ws"));
    let evaluator = Evaluator::new(&scopes, &options);
    assert_eq!(evaluator.expand("${out}").unwrap(), "/ws/build");
}

#[test]
fn list_literal_round_trip_through_template() {
    let stack = ScopeStack::new();
    assert_eq!(
        expand(&stack, "($${'a b', 'c', d})").unwrap(),
        "a b c d"
    );
}

#[test]
fn escape_sequences_reach_output_decoded() {
    let stack = ScopeStack::new();
    assert_eq!(
        expand(&stack, "literal \\(parens\\) and \\$\\{dollar\\}").unwrap(),
        "literal (parens) and ${dollar}"
    );
}
