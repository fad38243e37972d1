//! Mutex-guarded log sink.
//!
//! Parallel file tasks buffer their output and emit it as one block so each
//! task's lines appear contiguous in the stream.

use colored::*;
use std::sync::Mutex;

static SINK: Mutex<()> = Mutex::new(());

/// Print a (possibly multi-line) block atomically.
pub fn emit(block: &str) {
    let _guard = SINK.lock().unwrap_or_else(|e| e.into_inner());
    if block.ends_with('\n') {
        print!("{}", block);
    } else {
        println!("{}", block);
    }
}

pub fn info(message: &str) {
    emit(&format!("{} {}", "✓".green(), message));
}

pub fn warn(message: &str) {
    emit(&format!("{} {}", "!".yellow(), message));
}

pub fn error(message: &str) {
    emit(&format!("{} {}", "x".red(), message));
}

/// `--debug` echo of a command line about to run.
pub fn command(line: &str) {
    emit(&format!("   {}", line.dimmed()));
}
