use std::time::Duration;

pub struct Utils;

impl Utils {
    /// Double-quote an SQLite identifier, doubling any embedded quotes.
    ///
    /// Only used for names read from the database's own catalogue (or a
    /// snapshot captured from it), never for external input.
    pub fn quote_identifier(name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// First `max_chars` characters of a statement followed by `...`, with
    /// line breaks flattened so the excerpt fits on one line.
    pub fn excerpt(statement: &str, max_chars: usize) -> String {
        let flat: String = statement
            .trim()
            .chars()
            .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
            .take(max_chars)
            .collect();
        format!("{}...", flat)
    }

    /// Milliseconds with two decimals, e.g. `12.34ms`.
    pub fn format_millis(elapsed: Duration) -> String {
        format!("{:.2}ms", elapsed.as_secs_f64() * 1000.0)
    }
}
