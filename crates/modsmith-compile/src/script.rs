//! Splitting of raw SQL scripts into statements.

/// One statement taken from a script, with the line it starts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptStatement {
    pub line: usize,
    pub sql: String,
}

/// Strip `--` comments and split `text` on `;`, ignoring both inside quoted
/// literals and bracketed identifiers. Empty fragments are dropped.
pub fn split_statements(text: &str) -> Vec<ScriptStatement> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut start_line: Option<usize> = None;
    let mut line = 1;
    let mut quote: Option<char> = None;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if let Some(open) = quote {
            current.push(ch);
            if ch == '\n' {
                line += 1;
            }
            if ch == open {
                // A doubled quote is an escaped quote.
                if chars.peek() == Some(&open) && open != ']' {
                    current.push(open);
                    chars.next();
                } else {
                    quote = None;
                }
            }
            continue;
        }

        match ch {
            '-' if chars.peek() == Some(&'-') => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        current.push('\n');
                        line += 1;
                        break;
                    }
                }
            }
            ';' => {
                flush(&mut statements, &mut current, &mut start_line);
            }
            '\n' => {
                current.push(ch);
                line += 1;
            }
            _ => {
                if !ch.is_whitespace() && start_line.is_none() {
                    start_line = Some(line);
                }
                match ch {
                    '\'' | '"' | '`' => quote = Some(ch),
                    '[' => quote = Some(']'),
                    _ => {}
                }
                current.push(ch);
            }
        }
    }
    flush(&mut statements, &mut current, &mut start_line);
    statements
}

fn flush(statements: &mut Vec<ScriptStatement>, current: &mut String, start_line: &mut Option<usize>) {
    let sql = current.trim();
    if let Some(line) = start_line.take() {
        if !sql.is_empty() {
            statements.push(ScriptStatement {
                line,
                sql: sql.to_string(),
            });
        }
    }
    current.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_and_tracks_start_lines() {
        let script = "-- header comment\nINSERT INTO Types (Type, Kind)\n  VALUES ('A', 'K');\n\nUPDATE Units SET Cost = 5; DELETE FROM Units WHERE UnitType = 'X';\n";
        let statements = split_statements(script);
        let lines: Vec<usize> = statements.iter().map(|statement| statement.line).collect();
        assert_eq!(lines, vec![2, 5, 5]);
        assert_eq!(
            statements[0].sql,
            "INSERT INTO Types (Type, Kind)\n  VALUES ('A', 'K')"
        );
        assert_eq!(statements[2].sql, "DELETE FROM Units WHERE UnitType = 'X'");
    }

    #[test]
    fn separators_and_dashes_inside_literals_are_kept() {
        let statements = split_statements(
            "INSERT INTO T (A) VALUES ('a;b -- not a comment');\nINSERT INTO T (A) VALUES (\"it\"\"s\"); -- trailing",
        );
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].sql, "INSERT INTO T (A) VALUES ('a;b -- not a comment')");
        assert_eq!(statements[1].sql, "INSERT INTO T (A) VALUES (\"it\"\"s\")");
        assert_eq!(statements[1].line, 2);
    }

    #[test]
    fn comment_only_and_empty_fragments_are_dropped() {
        assert!(split_statements("-- nothing here\n;;\n  ;").is_empty());
    }
}
