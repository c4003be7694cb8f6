//! Loading of delimited survey tables
//!
//! The text encoding of survey exports is usually unknown. Instead of sniffing it, a list of
//! candidate encodings is tried in order until one of them yields a table with a header row.
//! If every candidate fails, the file is decoded once more with invalid sequences replaced.

use crate::PipelineError;
use encoding_rs::{Encoding, UTF_8, UTF_16BE, UTF_16LE, WINDOWS_1252};
use itertools::Itertools;
use log::{debug, info, warn};
use std::borrow::Cow;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error as ThisError;

/// Text encodings that can be used to decode a survey table
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TextEncoding {
    Utf8,
    Latin1,
    Iso8859_1,
    Windows1252,
    Utf16,
    Ascii,
    /// UTF-8 with invalid sequences replaced, only used as last resort
    Lossy,
}

impl TextEncoding {
    /// The candidates tried by default, most common first
    pub const DEFAULT_ORDER: [TextEncoding; 6] = [
        TextEncoding::Utf8,
        TextEncoding::Latin1,
        TextEncoding::Iso8859_1,
        TextEncoding::Windows1252,
        TextEncoding::Utf16,
        TextEncoding::Ascii,
    ];

    /// Returns the label of the encoding as accepted by [`FromStr`]
    pub fn label(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Latin1 => "latin1",
            TextEncoding::Iso8859_1 => "iso-8859-1",
            TextEncoding::Windows1252 => "cp1252",
            TextEncoding::Utf16 => "utf-16",
            TextEncoding::Ascii => "ascii",
            TextEncoding::Lossy => "lossy",
        }
    }

    /// Decodes the bytes, returns `None` if they are not valid in this encoding
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Option<Cow<'a, str>> {
        match self {
            TextEncoding::Utf8 => {
                let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
                UTF_8.decode_without_bom_handling_and_without_replacement(bytes)
            }
            // Every byte is a valid code point in ISO-8859-1
            TextEncoding::Latin1 | TextEncoding::Iso8859_1 => {
                Some(Cow::Owned(bytes.iter().map(|&b| b as char).collect()))
            }
            TextEncoding::Windows1252 => {
                WINDOWS_1252.decode_without_bom_handling_and_without_replacement(bytes)
            }
            TextEncoding::Utf16 => {
                let (encoding, bom_length) = match Encoding::for_bom(bytes) {
                    Some((encoding, length)) if encoding == UTF_16BE => (UTF_16BE, length),
                    Some((encoding, length)) if encoding == UTF_16LE => (UTF_16LE, length),
                    _ => (UTF_16LE, 0),
                };
                encoding.decode_without_bom_handling_and_without_replacement(&bytes[bom_length..])
            }
            TextEncoding::Ascii => {
                if bytes.is_ascii() {
                    std::str::from_utf8(bytes).ok().map(Cow::Borrowed)
                } else {
                    None
                }
            }
            TextEncoding::Lossy => Some(UTF_8.decode_with_bom_removal(bytes).0),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TextEncoding {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(TextEncoding::Utf8),
            "latin1" | "latin-1" => Ok(TextEncoding::Latin1),
            "iso-8859-1" | "iso8859-1" => Ok(TextEncoding::Iso8859_1),
            "cp1252" | "windows-1252" => Ok(TextEncoding::Windows1252),
            "utf-16" | "utf16" => Ok(TextEncoding::Utf16),
            "ascii" => Ok(TextEncoding::Ascii),
            other => Err(anyhow::anyhow!("unsupported text encoding \"{}\"", other)),
        }
    }
}

/// Options for reading a survey table
#[derive(Clone, Debug, PartialEq)]
pub struct LoaderOptions {
    /// Encodings tried in order
    pub encodings: Vec<TextEncoding>,
    /// Field delimiter
    pub delimiter: u8,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            encodings: TextEncoding::DEFAULT_ORDER.to_vec(),
            delimiter: b',',
        }
    }
}

/// Reasons why decoded text does not form a table
#[derive(Debug, ThisError)]
pub enum TableParseError {
    #[error("the bytes are not valid {0}")]
    Undecodable(TextEncoding),
    #[error("the table has no header row")]
    MissingHeader,
    #[error("row {row} has {found} fields but the header has only {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("malformed delimited text")]
    Csv(#[from] csv::Error),
}

/// A rectangular table of raw string cells with a header row
#[derive(Clone, Debug, Default)]
pub struct DataTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    encoding: Option<TextEncoding>,
}

impl DataTable {
    /// Creates a table from in-memory rows, rows shorter than the header are padded with empty cells
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self, TableParseError> {
        if headers.is_empty() {
            return Err(TableParseError::MissingHeader);
        }

        let width = headers.len();
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(row, mut cells)| {
                if cells.len() > width {
                    return Err(TableParseError::RaggedRow {
                        row,
                        expected: width,
                        found: cells.len(),
                    });
                }
                cells.resize(width, String::new());
                Ok(cells)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            headers,
            rows,
            encoding: None,
        })
    }

    /// Parses decoded delimited text with a header row
    pub fn parse(text: &str, delimiter: u8) -> Result<Self, TableParseError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(text.as_bytes());

        let headers = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect::<Vec<_>>();
        if headers.iter().all(|h| h.is_empty()) {
            return Err(TableParseError::MissingHeader);
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(|c| c.to_string()).collect());
        }

        Self::new(headers, rows)
    }

    /// Tries the given encodings in order and parses the first successful decoding
    ///
    /// Returns the errors of all attempts if none of them succeeds.
    pub fn parse_bytes(
        bytes: &[u8],
        options: &LoaderOptions,
    ) -> Result<Self, Vec<(TextEncoding, TableParseError)>> {
        let mut failures = Vec::new();
        for &encoding in &options.encodings {
            match Self::parse_with_encoding(bytes, encoding, options.delimiter) {
                Ok(table) => return Ok(table),
                Err(err) => {
                    debug!("Reading table as {} failed: {}", encoding, err);
                    failures.push((encoding, err));
                }
            }
        }

        match Self::parse_with_encoding(bytes, TextEncoding::Lossy, options.delimiter) {
            Ok(table) => {
                warn!(
                    "None of the encodings ({}) could read the table, invalid characters were replaced",
                    encoding_list(&options.encodings)
                );
                Ok(table)
            }
            Err(err) => {
                failures.push((TextEncoding::Lossy, err));
                Err(failures)
            }
        }
    }

    fn parse_with_encoding(
        bytes: &[u8],
        encoding: TextEncoding,
        delimiter: u8,
    ) -> Result<Self, TableParseError> {
        let text = encoding
            .decode(bytes)
            .ok_or(TableParseError::Undecodable(encoding))?;
        let mut table = Self::parse(&text, delimiter)?;
        table.encoding = Some(encoding);
        Ok(table)
    }

    /// Returns the header names
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Returns all data rows, every row has exactly `column_count()` cells
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Returns the number of columns as defined by the header
    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    /// Returns the number of data rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Returns the encoding the table was decoded with, `None` for in-memory tables
    pub fn encoding(&self) -> Option<TextEncoding> {
        self.encoding
    }

    /// Returns the fraction of cells in the given column that parse as finite numbers
    pub fn numeric_share(&self, column: usize) -> f64 {
        if self.rows.is_empty() || column >= self.column_count() {
            return 0.0;
        }
        let numeric = self
            .rows
            .iter()
            .filter(|row| crate::normalize::parse_numeric(&row[column]).is_some())
            .count();
        numeric as f64 / self.rows.len() as f64
    }
}

fn encoding_list(encodings: &[TextEncoding]) -> String {
    encodings.iter().map(TextEncoding::label).join(", ")
}

/// Reads a delimited table from the given file
pub fn load_table<P: AsRef<Path>>(
    path: P,
    options: &LoaderOptions,
) -> Result<DataTable, PipelineError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|err| PipelineError::io(path, err))?;

    match DataTable::parse_bytes(&bytes, options) {
        Ok(table) => {
            info!(
                "Read {} rows with {} columns from \"{}\" ({} encoding)",
                table.row_count(),
                table.column_count(),
                path.display(),
                table.encoding().unwrap_or(TextEncoding::Lossy)
            );
            Ok(table)
        }
        Err(failures) => {
            let reason = failures
                .last()
                .map(|(_, err)| err.to_string())
                .unwrap_or_else(|| "no encodings were tried".to_string());
            let tried = failures
                .iter()
                .map(|(encoding, _)| *encoding)
                .collect::<Vec<_>>();
            Err(PipelineError::DataFormat {
                path: path.to_path_buf(),
                tried: encoding_list(&tried),
                reason,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_utf8_table() {
        let table = DataTable::parse("x,y,z\n1,2,3\n4,5,6\n", b',').unwrap();
        assert_eq!(table.headers(), &["x", "y", "z"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.rows()[1], vec!["4", "5", "6"]);
    }

    #[test]
    fn test_short_rows_are_padded() {
        let table = DataTable::parse("a,b,c\n1,2\n", b',').unwrap();
        assert_eq!(table.rows()[0], vec!["1", "2", ""]);
    }

    #[test]
    fn test_long_rows_are_rejected() {
        let err = DataTable::parse("a,b\n1,2,3\n", b',').unwrap_err();
        assert!(matches!(
            err,
            TableParseError::RaggedRow {
                expected: 2,
                found: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_empty_input_has_no_header() {
        assert!(matches!(
            DataTable::parse("", b','),
            Err(TableParseError::MissingHeader)
        ));
    }

    #[test]
    fn test_semicolon_delimiter() {
        let table = DataTable::parse("x;y\n1.5;2.5\n", b';').unwrap();
        assert_eq!(table.column_count(), 2);
        assert_eq!(table.rows()[0], vec!["1.5", "2.5"]);
    }

    #[test]
    fn test_latin1_fallback() {
        // "Tiefe" header with a latin1 encoded 'ä' that is invalid UTF-8
        let bytes = b"x,y,T\xe4\n1,2,3\n";
        let table = DataTable::parse_bytes(bytes, &LoaderOptions::default()).unwrap();
        assert_eq!(table.encoding(), Some(TextEncoding::Latin1));
        assert_eq!(table.headers()[2], "T\u{e4}");
    }

    #[test]
    fn test_utf8_bom_is_stripped() {
        let bytes = b"\xEF\xBB\xBFx,y\n1,2\n";
        let table = DataTable::parse_bytes(bytes, &LoaderOptions::default()).unwrap();
        assert_eq!(table.encoding(), Some(TextEncoding::Utf8));
        assert_eq!(table.headers()[0], "x");
    }

    #[test]
    fn test_utf16_with_bom() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "x,y\n1,2\n".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let options = LoaderOptions {
            encodings: vec![TextEncoding::Utf8, TextEncoding::Utf16],
            ..Default::default()
        };
        let table = DataTable::parse_bytes(&bytes, &options).unwrap();
        assert_eq!(table.encoding(), Some(TextEncoding::Utf16));
        assert_eq!(table.rows()[0], vec!["1", "2"]);
    }

    #[test]
    fn test_lossy_fallback_after_all_encodings_fail() {
        let bytes = b"x,y\n1,\xff\n";
        let options = LoaderOptions {
            encodings: vec![TextEncoding::Utf8, TextEncoding::Ascii],
            ..Default::default()
        };
        let table = DataTable::parse_bytes(bytes, &options).unwrap();
        assert_eq!(table.encoding(), Some(TextEncoding::Lossy));
        assert_eq!(table.rows()[0][1], "\u{fffd}");
    }

    #[test]
    fn test_encoding_labels_round_trip() {
        for encoding in TextEncoding::DEFAULT_ORDER {
            assert_eq!(encoding.label().parse::<TextEncoding>().unwrap(), encoding);
        }
        assert!("ebcdic".parse::<TextEncoding>().is_err());
    }

    #[test]
    fn test_numeric_share() {
        let table = DataTable::parse("a,b\n1,x\n2,3\nfoo,4\n", b',').unwrap();
        assert!((table.numeric_share(0) - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(table.numeric_share(1), 2.0 / 3.0);
        assert_eq!(table.numeric_share(5), 0.0);
    }
}
