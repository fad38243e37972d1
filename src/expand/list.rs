//! The literal list grammar used inside `$${...}`.
//!
//! A list is a comma-separated sequence of single-quoted tokens (`\'` and
//! `\\` are de-escaped inside) or bare tokens. Bare tokens may carry
//! internal whitespace but no commas, quotes, or backslashes; whitespace
//! around commas is ignored. Serialisation always quotes, so
//! `variable_list_parse` inverts `variable_list_join` exactly.

use anyhow::{Result, bail};

/// Serialise values for internal relay through a `$${...}` literal.
pub fn variable_list_join(values: &[String]) -> String {
    values
        .iter()
        .map(|v| format!("'{}'", v.replace('\\', "\\\\").replace('\'', "\\'")))
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse a literal list back into its values.
pub fn variable_list_parse(text: &str) -> Result<Vec<String>> {
    let mut values = Vec::new();
    let mut chars = text.char_indices().peekable();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(values);
    }

    loop {
        // leading whitespace
        while chars.peek().is_some_and(|&(_, c)| c.is_whitespace()) {
            chars.next();
        }

        match chars.peek() {
            Some(&(_, '\'')) => {
                chars.next();
                let mut token = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '\\' => match chars.next() {
                            // only the quote and the escape itself de-escape
                            Some((_, q @ ('\'' | '\\'))) => token.push(q),
                            Some((_, other)) => {
                                token.push('\\');
                                token.push(other);
                            }
                            None => token.push('\\'),
                        },
                        '\'' => {
                            closed = true;
                            break;
                        }
                        _ => token.push(c),
                    }
                }
                if !closed {
                    bail!("unterminated quoted value in list '{}'", text);
                }
                values.push(token);
            }
            _ => {
                let mut token = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c == ',' {
                        break;
                    }
                    if c == '\'' || c == '\\' {
                        bail!("unexpected '{}' in bare value in list '{}'", c, text);
                    }
                    token.push(c);
                    chars.next();
                }
                values.push(token.trim_end().to_string());
            }
        }

        // trailing whitespace, then a comma or the end
        while chars.peek().is_some_and(|&(_, c)| c.is_whitespace()) {
            chars.next();
        }
        match chars.next() {
            Some((_, ',')) => continue,
            Some((i, c)) => bail!("expected ',' at offset {} in list '{}', found '{}'", i, text, c),
            None => break,
        }
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let cases: Vec<Vec<String>> = vec![
            vec!["a".into()],
            vec!["a".into(), "b b".into(), "c,d".into()],
            vec!["it's".into(), "back\\slash".into()],
            vec!["\"quoted\"".into()],
        ];
        for xs in cases {
            assert_eq!(variable_list_parse(&variable_list_join(&xs)).unwrap(), xs);
        }
    }

    #[test]
    fn test_join_always_quotes() {
        assert_eq!(variable_list_join(&["a".into(), "b".into()]), "'a','b'");
    }

    #[test]
    fn test_parse_bare_tokens() {
        assert_eq!(
            variable_list_parse("g, h").unwrap(),
            vec!["g".to_string(), "h".to_string()]
        );
        assert_eq!(
            variable_list_parse("a b , c").unwrap(),
            vec!["a b".to_string(), "c".to_string()]
        );
    }

    #[test]
    fn test_parse_mixed_tokens() {
        assert_eq!(
            variable_list_parse("'a, b', c").unwrap(),
            vec!["a, b".to_string(), "c".to_string()]
        );
    }

    #[test]
    fn test_parse_empty_input() {
        assert!(variable_list_parse("").unwrap().is_empty());
        assert!(variable_list_parse("   ").unwrap().is_empty());
    }

    #[test]
    fn test_parse_preserves_other_escapes() {
        // \( inside quotes stays as written; only \' and \\ de-escape
        assert_eq!(
            variable_list_parse("'a\\(b\\)'").unwrap(),
            vec!["a\\(b\\)".to_string()]
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(variable_list_parse("'unterminated").is_err());
        assert!(variable_list_parse("a'b").is_err());
    }
}
