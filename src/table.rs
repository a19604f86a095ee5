use crate::binder::DataRow;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("input has no header row")]
    MissingHeader,
    #[error("unterminated quoted field starting on line {0}")]
    UnterminatedQuote(usize),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Row `index` keyed by header. Cells beyond the header are dropped,
    /// missing ones read as empty.
    pub fn row(&self, index: usize) -> Option<DataRow> {
        let cells = self.rows.get(index)?;
        Some(
            self.headers
                .iter()
                .enumerate()
                .map(|(i, header)| (header.clone(), cells.get(i).cloned().unwrap_or_default()))
                .collect(),
        )
    }

    pub fn records(&self) -> impl Iterator<Item = DataRow> + '_ {
        (0..self.rows.len()).filter_map(|index| self.row(index))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub fn read_table(path: &Path) -> Result<Table, TableError> {
    let text = std::fs::read_to_string(path).map_err(|source| TableError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_table(&text)
}

pub fn parse_table(text: &str) -> Result<Table, TableError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut records = parse_records(text)?
        .into_iter()
        .filter(|record| !(record.len() == 1 && record[0].trim().is_empty()));
    let headers: Vec<String> = records
        .next()
        .ok_or(TableError::MissingHeader)?
        .into_iter()
        .map(|header| header.trim().to_string())
        .collect();
    Ok(Table {
        headers,
        rows: records.collect(),
    })
}

fn parse_records(text: &str) -> Result<Vec<Vec<String>>, TableError> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut quote_line = 0;
    let mut line = 1;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(ch);
                }
                _ => field.push(ch),
            }
            continue;
        }
        match ch {
            '"' if field.is_empty() => {
                in_quotes = true;
                quote_line = line;
            }
            ',' => record.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                line += 1;
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(ch),
        }
    }
    if in_quotes {
        return Err(TableError::UnterminatedQuote(quote_line));
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quoted_fields() {
        let table = parse_table(
            "\u{feff}Name,Tagline,Price\r\n\"Doe, Jane\",\"Say \"\"hi\"\"\",499\r\n\"Multi\nline\",,\r\n",
        )
        .unwrap();
        assert_eq!(table.headers, vec!["Name", "Tagline", "Price"]);
        assert_eq!(table.rows[0], vec!["Doe, Jane", "Say \"hi\"", "499"]);
        assert_eq!(table.rows[1], vec!["Multi\nline", "", ""]);
    }

    #[test]
    fn skips_blank_lines_and_pads_short_rows() {
        let table = parse_table("a,b\n\n1\n\n2,3").unwrap();
        assert_eq!(table.len(), 2);
        let first = table.row(0).unwrap();
        assert_eq!(first.get("a").map(String::as_str), Some("1"));
        assert_eq!(first.get("b").map(String::as_str), Some(""));
        assert_eq!(table.row(1).unwrap().get("b").map(String::as_str), Some("3"));
    }

    #[test]
    fn header_only_input_has_no_rows() {
        let table = parse_table("id,name\n").unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn errors() {
        assert!(matches!(parse_table("\n\n"), Err(TableError::MissingHeader)));
        assert!(matches!(
            parse_table("a\n\"open"),
            Err(TableError::UnterminatedQuote(2))
        ));
    }
}
