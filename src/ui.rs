//! Terminal UI helpers: a small auto-sizing table for the build summary.

use colored::*;
use std::cmp;

pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn add_row(&mut self, row: Vec<String>) {
        if row.len() == self.headers.len() {
            self.rows.push(row);
        }
    }

    pub fn print(&self) {
        if self.headers.is_empty() {
            return;
        }

        let mut widths: Vec<usize> =
            self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = cmp::max(widths[i], strip_ansi(cell).chars().count());
            }
        }

        let sep = |left: &str, mid: &str, right: &str| {
            let mut s = String::from("  ");
            s.push_str(left);
            for (i, w) in widths.iter().enumerate() {
                s.push_str(&"─".repeat(w + 2));
                s.push_str(if i < widths.len() - 1 { mid } else { right });
            }
            s
        };

        println!("{}", sep("┌", "┬", "┐"));
        print!("  │");
        for (i, header) in self.headers.iter().enumerate() {
            let pad = widths[i] - header.chars().count();
            print!(" {}{} │", header.bold(), " ".repeat(pad));
        }
        println!();
        println!("{}", sep("├", "┼", "┤"));
        for row in &self.rows {
            print!("  │");
            for (i, cell) in row.iter().enumerate() {
                let pad = widths[i] - strip_ansi(cell).chars().count();
                print!(" {}{} │", cell, " ".repeat(pad));
            }
            println!();
        }
        println!("{}", sep("└", "┴", "┘"));
    }
}

fn strip_ansi(s: &str) -> String {
    let mut result = String::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            if let Some(&'[') = chars.peek() {
                chars.next();
                for c in chars.by_ref() {
                    if c == 'm' {
                        break;
                    }
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}
