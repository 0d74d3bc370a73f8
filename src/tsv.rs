use std::fs::File;
use std::io::{BufRead, BufReader, Lines};

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::BridgeError;
use crate::source::{Row, RowIter, RowSource};

const DELIMITER: char = '\t';

/// Name under which column `index` of a delimited file is exposed in a [`Row`].
pub fn column_name(index: usize) -> String {
    format!("col{index}")
}

/// A delimited text export with a single header line.
///
/// Fields are split on tabs and every double quote is stripped from
/// them. Columns are exposed as `col0`, `col1`, and so on.
#[derive(Debug, Clone)]
pub struct TsvSource {
    path: Utf8PathBuf,
}

impl TsvSource {
    pub fn new(path: Utf8PathBuf) -> Self {
        Self { path }
    }
}

impl RowSource for TsvSource {
    fn describe(&self) -> String {
        format!("TSV file {}", self.path)
    }

    fn rows(&mut self) -> Result<RowIter<'_>, BridgeError> {
        let file = File::open(self.path.as_std_path()).map_err(|err| BridgeError::SourceRead {
            path: self.path.clone().into_std_path_buf(),
            message: err.to_string(),
        })?;
        let mut lines = BufReader::new(file).lines();
        // header
        if let Some(Err(err)) = lines.next() {
            return Err(BridgeError::SourceRead {
                path: self.path.clone().into_std_path_buf(),
                message: err.to_string(),
            });
        }
        Ok(Box::new(TsvRows {
            lines,
            path: &self.path,
        }))
    }
}

struct TsvRows<'a> {
    lines: Lines<BufReader<File>>,
    path: &'a Utf8Path,
}

impl Iterator for TsvRows<'_> {
    type Item = Result<Row, BridgeError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(err) => {
                    return Some(Err(BridgeError::SourceRead {
                        path: self.path.to_path_buf().into_std_path_buf(),
                        message: err.to_string(),
                    }));
                }
            };
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            return Some(Ok(parse_line(line, DELIMITER)));
        }
    }
}

pub fn parse_line(line: &str, delimiter: char) -> Row {
    let mut row = Row::new();
    for (index, field) in line.split(delimiter).enumerate() {
        row.insert(column_name(index), field.replace('"', ""));
    }
    row
}
