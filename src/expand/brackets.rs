//! Recursive bracket matcher.
//!
//! Finds balanced outer matches of delimiter pairs in left-to-right order.
//! Delimiters may be multi-character (`${`, `$${`). Nested matches of the
//! same kind raise the depth and are not reported separately; an escaped
//! bracket never opens or closes; unbalanced input is an error.

use anyhow::{Result, bail};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BracketPair {
    pub left: &'static str,
    pub right: &'static str,
}

pub const GROUP: BracketPair = BracketPair { left: "(", right: ")" };
pub const PATH_GROUP: BracketPair = BracketPair { left: "[", right: "]" };
pub const SINGLE_VAR: BracketPair = BracketPair { left: "${", right: "}" };
pub const MULTI_VAR: BracketPair = BracketPair { left: "$${", right: "}" };

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BracketMatch {
    /// Byte offset of the left lexeme in the scanned text.
    pub start: usize,
    /// The full matched region, delimiters included.
    pub outer: String,
    /// The region between the delimiters.
    pub inner: String,
    pub left: &'static str,
    pub right: &'static str,
}

/// Find all balanced outer matches of `pairs` in `text`.
///
/// When several pairs are given (the `${`/`$${` case), the longest left
/// lexeme wins at each position and matches of every kind are returned;
/// callers filter by `left`.
pub fn find_matches(
    text: &str,
    pairs: &[BracketPair],
    escape: char,
) -> Result<Vec<BracketMatch>> {
    // try longer left lexemes first so `$${` is never read as `$` + `${`
    let mut order: Vec<usize> = (0..pairs.len()).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(pairs[i].left.len()));

    let mut matches = Vec::new();
    // (pair index, outer start, inner start)
    let mut stack: Vec<(usize, usize, usize)> = Vec::new();
    let mut i = 0;

    while i < text.len() {
        let rest = &text[i..];

        if rest.starts_with(escape) {
            let mut it = rest.chars();
            it.next();
            i += escape.len_utf8() + it.next().map_or(0, |c| c.len_utf8());
            continue;
        }

        if let Some(&(pi, outer_start, inner_start)) = stack.last() {
            let right = pairs[pi].right;
            if rest.starts_with(right) {
                stack.pop();
                if stack.is_empty() {
                    matches.push(BracketMatch {
                        start: outer_start,
                        outer: text[outer_start..i + right.len()].to_string(),
                        inner: text[inner_start..i].to_string(),
                        left: pairs[pi].left,
                        right,
                    });
                }
                i += right.len();
                continue;
            }
        }

        if let Some(&pi) = order
            .iter()
            .find(|&&pi| rest.starts_with(pairs[pi].left))
        {
            stack.push((pi, i, i + pairs[pi].left.len()));
            i += pairs[pi].left.len();
            continue;
        }

        if stack.is_empty() {
            if let Some(p) = pairs.iter().find(|p| rest.starts_with(p.right)) {
                bail!(
                    "unbalanced '{}' at offset {} in template '{}'",
                    p.right,
                    i,
                    text
                );
            }
        }

        i += rest.chars().next().map_or(1, |c| c.len_utf8());
    }

    if let Some(&(pi, outer_start, _)) = stack.first() {
        bail!(
            "unbalanced '{}' at offset {} in template '{}'",
            pairs[pi].left,
            outer_start,
            text
        );
    }

    Ok(matches)
}
