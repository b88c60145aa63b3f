use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Fatal problems reading a calibration table.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("can't open calibration table `{}`: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("line {line}: `{content}` does not match `<name> <threshold> <min> <max>` or a `#` comment")]
    Format { line: usize, content: String },
}

impl TableError {
    /// A short hint for the user, if one applies.
    pub fn help(&self) -> Option<String> {
        match self {
            TableError::Io { .. } => None,
            TableError::Format { content, .. } => Some(help_for_line(content)),
        }
    }

    /// Renders the error the way the driver prints it: message, offending
    /// line and hint.
    pub fn render(&self) -> String {
        let mut out = format!("error: {self}");
        if let TableError::Format { line, content } = self {
            let gutter = line.to_string();
            out.push_str(&format!(
                "\n{pad} |\n{gutter} | {content}\n{pad} | {marks}",
                pad = " ".repeat(gutter.len()),
                marks = "^".repeat(content.chars().count().max(1)),
            ));
        }
        if let Some(help) = self.help() {
            out.push_str(&format!("\n= help: {help}"));
        }
        out
    }
}

fn help_for_line(content: &str) -> String {
    let fields: Vec<&str> = content.split_whitespace().collect();
    if fields.is_empty() {
        return "blank lines are not allowed here, and after `#int4_th` or `#weight_scale` a blank line ends the table; delete the line or turn it into a `#` comment".to_string();
    }
    if content.starts_with(char::is_whitespace) {
        return "data lines must start with the tensor name, without leading blanks".to_string();
    }
    match fields.len() {
        4 => "threshold, min and max may only use digits, '+', '-', '.', 'e' and 'E'".to_string(),
        n if n < 4 => format!("expected 4 fields, found {n}"),
        n => format!(
            "expected 4 fields, found {n}; per-channel scales belong after a `#weight_scale` marker"
        ),
    }
}
