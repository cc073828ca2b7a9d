use std::path::PathBuf;

use linkage::{Error, IdentifierSource};

/// Identifiers read from a text file, either one per line or from a single delimited column.
///
/// Blank lines are skipped, every identifier is trimmed. Errors name the offending line but never
/// its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSource {
    /// The file to read.
    pub path: PathBuf,
    /// The zero-based column holding the identifiers, or `None` for whole lines.
    pub column: Option<usize>,
    /// The column delimiter.
    pub delimiter: char,
    /// Whether the first non-blank line is a header row.
    pub header: bool,
}

impl FileSource {
    /// Reads whole lines of `path` as identifiers.
    pub fn lines(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            column: None,
            delimiter: ',',
            header: false,
        }
    }

    fn parse(&self, content: &[u8]) -> Result<Vec<String>, Error> {
        let mut identifiers = vec![];
        let mut header = self.header;
        for (index, line) in content.split(|b| *b == b'\n').enumerate() {
            let number = index + 1;
            let line = std::str::from_utf8(line).map_err(|_| {
                Error::InputUnavailable(format!("line {number} is not valid UTF-8"))
            })?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if header {
                header = false;
                continue;
            }
            let identifier = match self.column {
                None => line,
                Some(column) => line
                    .split(self.delimiter)
                    .nth(column)
                    .map(str::trim)
                    .ok_or_else(|| {
                        Error::InputUnavailable(format!("line {number} has no column {column}"))
                    })?,
            };
            if identifier.is_empty() {
                return Err(Error::InputUnavailable(format!(
                    "line {number} has an empty identifier"
                )));
            }
            identifiers.push(identifier.to_string());
        }
        Ok(identifiers)
    }
}

impl IdentifierSource for FileSource {
    fn identifiers(self) -> Result<Vec<String>, Error> {
        let content = std::fs::read(&self.path).map_err(|e| {
            Error::InputUnavailable(format!("could not read `{}`: {e}", self.path.display()))
        })?;
        let identifiers = self.parse(&content)?;
        tracing::info!(records = identifiers.len(), "loaded input file");
        Ok(identifiers)
    }
}
