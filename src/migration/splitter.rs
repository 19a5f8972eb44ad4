use std::str::Lines;

use log::warn;

const DEFAULT_DELIMITER: &str = ";";
const DELIMITER_DIRECTIVE: &str = "DELIMITER";
const COMMENT_MARKER: &str = "--";

/// Splits a batch SQL script into individual statements, lazily.
///
/// Lines are trimmed. Blank lines and `--` comment lines are skipped. A line
/// starting with `DELIMITER` changes the statement terminator for the rest of
/// the script (so trigger bodies containing `;` can be written between
/// `DELIMITER $$` and `DELIMITER ;`). Every other line is added to the
/// current statement followed by a newline; a line ending with the active
/// terminator completes the statement, with the terminator removed.
///
/// Text after the last terminator is discarded.
pub struct StatementSplitter<'a> {
    lines: Lines<'a>,
    delimiter: String,
    buffer: String,
}

impl<'a> StatementSplitter<'a> {
    pub fn new(source: &'a str) -> Self {
        StatementSplitter {
            lines: source.lines(),
            delimiter: DEFAULT_DELIMITER.to_owned(),
            buffer: String::new(),
        }
    }

    #[cfg(test)]
    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }
}

impl Iterator for StatementSplitter<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        for raw in self.lines.by_ref() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with(COMMENT_MARKER) {
                continue;
            }

            if let Some(rest) = line.strip_prefix(DELIMITER_DIRECTIVE) {
                let token = rest.trim();
                if token.is_empty() {
                    warn!(
                        "Ignoring DELIMITER directive without a token, keeping '{}'",
                        self.delimiter
                    );
                } else {
                    self.delimiter = token.to_owned();
                }
                continue;
            }

            match line.strip_suffix(self.delimiter.as_str()) {
                Some(body) => {
                    self.buffer.push_str(body);
                    self.buffer.push('\n');
                    return Some(std::mem::take(&mut self.buffer));
                }
                None => {
                    self.buffer.push_str(line);
                    self.buffer.push('\n');
                }
            }
        }

        if !self.buffer.trim().is_empty() {
            warn!(
                "Discarding unterminated statement at end of script: {}",
                crate::utils::Utils::excerpt(&self.buffer, 100)
            );
        }
        self.buffer.clear();
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn split(source: &str) -> Vec<String> {
        StatementSplitter::new(source).collect()
    }

    #[test]
    fn test_splits_on_semicolon() {
        assert_eq!(split("SELECT 1;\nSELECT 2;\n"), vec!["SELECT 1\n", "SELECT 2\n"]);
    }

    #[test]
    fn test_multiline_statement_lines_are_trimmed() {
        let source = "CREATE TABLE t (\n    a INTEGER,\n    b TEXT\n);\n";
        assert_eq!(split(source), vec!["CREATE TABLE t (\na INTEGER,\nb TEXT\n)\n"]);
    }

    #[test]
    fn test_skips_blank_and_comment_lines() {
        let source = "-- header\n\n   -- indented comment\nSELECT 1;\n\n";
        assert_eq!(split(source), vec!["SELECT 1\n"]);
    }

    #[test]
    fn test_delimiter_directive() {
        let source = "\
SELECT 1;
DELIMITER $$
CREATE TRIGGER trg AFTER UPDATE ON t
BEGIN
    UPDATE t SET a = 1;
END$$
DELIMITER ;
SELECT 2;
";
        assert_eq!(
            split(source),
            vec![
                "SELECT 1\n",
                "CREATE TRIGGER trg AFTER UPDATE ON t\nBEGIN\nUPDATE t SET a = 1;\nEND\n",
                "SELECT 2\n",
            ]
        );
    }

    #[test]
    fn test_semicolon_does_not_terminate_under_custom_delimiter() {
        let mut splitter = StatementSplitter::new("DELIMITER //\nSELECT 1;\nSELECT 2;//\n");
        assert_eq!(splitter.next().as_deref(), Some("SELECT 1;\nSELECT 2;\n"));
        assert_eq!(splitter.delimiter(), "//");
        assert_eq!(splitter.next(), None);
    }

    #[test]
    fn test_delimiter_is_case_sensitive() {
        // Lowercase 'delimiter' is an ordinary line
        assert_eq!(split("delimiter $$;\n"), vec!["delimiter $$\n"]);
    }

    #[test]
    fn test_empty_delimiter_directive_is_ignored() {
        assert_eq!(split("DELIMITER\nSELECT 1;\n"), vec!["SELECT 1\n"]);
    }

    #[test]
    fn test_unterminated_trailing_statement_is_discarded() {
        assert_eq!(split("SELECT 1;\nSELECT 2\n"), vec!["SELECT 1\n"]);
    }

    #[test]
    fn test_lone_terminator_yields_blank_statement() {
        assert_eq!(split(";\n"), vec!["\n"]);
    }

    #[test]
    fn test_crlf_line_endings() {
        assert_eq!(split("SELECT 1;\r\nSELECT 2;\r\n"), vec!["SELECT 1\n", "SELECT 2\n"]);
    }

    proptest! {
        #[test]
        fn prop_single_line_statements_round_trip(
            stmts in prop::collection::vec("[A-Za-z0-9_ ]{0,20}[A-Za-z0-9_]", 0..12)
        ) {
            let source: String = stmts.iter().map(|s| format!("{};\n", s)).collect();
            let expected: Vec<String> = stmts
                .iter()
                .map(|s| format!("{}\n", s.trim()))
                .collect();
            prop_assert_eq!(split(&source), expected);
        }
    }
}
