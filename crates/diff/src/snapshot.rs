//! In-memory tabular snapshots and their materialization from raw bytes.
//!
//! A snapshot is an ordered list of sheets. The first row of every sheet is
//! its header and names the columns; the remaining rows are data rows, indexed
//! from 0. Cell values are normalized once at load time so the diff can
//! compare them with plain equality.

use crate::error::{DiffError, DiffResult};
use calamine::{Data, Reader, open_workbook_auto_from_rs};
use std::collections::HashSet;
use std::fmt;
use std::io::Cursor;

/// Name of the single sheet produced from CSV input.
pub const CSV_SHEET_NAME: &str = "Sheet1";

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0];
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// A normalized cell value.
///
/// Absent cells, blank strings and NaN (numeric or spelled out) all collapse to
/// [`CellValue::Empty`]. Numeric text becomes a number, so `"945"`, `945` and
/// `945.0` compare equal. Text with more significant digits than an `f64`
/// holds exactly stays [`CellValue::Text`] and compares as written.
#[derive(Clone, Debug)]
pub enum CellValue {
    Empty,
    Number(f64),
    /// A number read from text that does not render back to the same string
    /// (`007`, `945.0`, `1e3`). Compares as the number, renders as written.
    Numeral { value: f64, text: String },
    Text(String),
}

/// Decimal digits an `f64` round-trips without loss.
const EXACT_DIGITS: usize = 15;

impl CellValue {
    /// Normalize a textual cell.
    pub fn from_text(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
            return Self::Empty;
        }
        let Some(n) = parse_number(trimmed) else {
            return Self::Text(trimmed.to_string());
        };
        match Self::from_number(n) {
            Self::Number(value) if value.to_string() != trimmed => Self::Numeral {
                value,
                text: trimmed.to_string(),
            },
            other => other,
        }
    }

    /// Normalize a numeric cell.
    pub fn from_number(n: f64) -> Self {
        if n.is_nan() {
            Self::Empty
        } else if n == 0.0 {
            // Fold -0.0 into 0.0
            Self::Number(0.0)
        } else {
            Self::Number(n)
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Numeric value, if this cell holds one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) | Self::Numeral { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// Text rendering stored in cell change records. `None` for empty cells.
    pub fn render(&self) -> Option<String> {
        match self {
            Self::Empty => None,
            other => Some(other.to_string()),
        }
    }

    fn from_calamine(cell: &Data) -> Self {
        match cell {
            Data::Empty => Self::Empty,
            Data::String(s) => Self::from_text(s),
            Data::Float(f) => Self::from_number(*f),
            // Through text so integers beyond f64 precision stay exact.
            Data::Int(i) => Self::from_text(&i.to_string()),
            Data::Bool(true) => Self::Text("TRUE".to_string()),
            Data::Bool(false) => Self::Text("FALSE".to_string()),
            Data::DateTime(dt) => Self::from_number(dt.as_f64()),
            Data::DateTimeIso(s) | Data::DurationIso(s) => Self::from_text(s),
            Data::Error(e) => Self::Text(e.to_string()),
        }
    }
}

impl PartialEq for CellValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Empty, Self::Empty) => true,
            (Self::Text(a), Self::Text(b)) => a == b,
            _ => match (self.as_number(), other.as_number()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Number(n) => write!(f, "{n}"),
            Self::Numeral { text, .. } | Self::Text(text) => f.write_str(text),
        }
    }
}

/// Finite numbers whose decimal form an `f64` holds exactly; `inf` spellings
/// and long digit strings stay text.
fn parse_number(s: &str) -> Option<f64> {
    let first = s.as_bytes()[0];
    if !(first.is_ascii_digit() || matches!(first, b'-' | b'+' | b'.')) {
        return None;
    }
    if significant_digits(s) > EXACT_DIGITS {
        return None;
    }
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Significant digits in the mantissa: leading zeros never count, trailing
/// zeros count only before the decimal point.
fn significant_digits(s: &str) -> usize {
    let mantissa = s.split(['e', 'E']).next().unwrap_or(s);
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let frac_part = frac_part.trim_end_matches('0');
    let digits: String = int_part
        .chars()
        .chain(frac_part.chars())
        .filter(char::is_ascii_digit)
        .collect();
    digits.trim_start_matches('0').len()
}

/// One sheet: column names plus data rows of equal width.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl Sheet {
    /// Build a sheet from raw rows, the first of which is the header.
    ///
    /// Rows are padded to the widest row; headers missing for the extra
    /// positions are named like empty headers.
    pub fn from_grid(name: impl Into<String>, mut grid: Vec<Vec<CellValue>>) -> Self {
        let width = grid.iter().map(Vec::len).max().unwrap_or(0);
        for row in &mut grid {
            row.resize(width, CellValue::Empty);
        }

        let mut rows = grid.into_iter();
        let columns = match rows.next() {
            Some(header) => header_names(&header),
            None => Vec::new(),
        };

        Self {
            name: name.into(),
            columns,
            rows: rows.collect(),
        }
    }

    /// Position of `column` in this sheet's header.
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Number of data rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Cell at `(row, col)`, `Empty` outside the sheet.
    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY)
    }
}

/// Column names for a header row: empty cells become `Unnamed: <index>` and
/// repeated names get `.1`, `.2`, ... suffixes.
fn header_names(header: &[CellValue]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(header.len());
    let mut names = Vec::with_capacity(header.len());

    for (idx, cell) in header.iter().enumerate() {
        let base = match cell.render() {
            Some(name) => name,
            None => format!("Unnamed: {idx}"),
        };

        let mut name = base.clone();
        let mut suffix = 1;
        while !seen.insert(name.clone()) {
            name = format!("{base}.{suffix}");
            suffix += 1;
        }
        names.push(name);
    }

    names
}

/// Detected container format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotFormat {
    /// ZIP (xlsx, xlsm, xlsb, ods) or OLE (xls) workbook.
    Workbook,
    Csv,
}

impl SnapshotFormat {
    /// Sniff the format from leading bytes.
    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(OLE_MAGIC) {
            Self::Workbook
        } else {
            Self::Csv
        }
    }
}

/// A materialized document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    pub sheets: Vec<Sheet>,
}

impl Snapshot {
    pub fn new(sheets: Vec<Sheet>) -> Self {
        Self { sheets }
    }

    /// Parse raw document bytes.
    pub fn from_bytes(bytes: &[u8]) -> DiffResult<Self> {
        match SnapshotFormat::detect(bytes) {
            SnapshotFormat::Workbook => Self::from_workbook(bytes),
            SnapshotFormat::Csv => Self::from_csv(bytes),
        }
    }

    /// Parse a spreadsheet container with calamine.
    pub fn from_workbook(bytes: &[u8]) -> DiffResult<Self> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
        let sheet_names = workbook.sheet_names().to_owned();

        let mut sheets = Vec::with_capacity(sheet_names.len());
        for sheet_name in sheet_names {
            let range = workbook.worksheet_range(&sheet_name)?;

            // The range starts at the first used cell; keep absolute columns so
            // a blank column A still occupies position 0.
            let (_, col_offset) = range.start().unwrap_or((0, 0));
            let col_offset = col_offset as usize;

            let grid: Vec<Vec<CellValue>> = range
                .rows()
                .map(|row| {
                    let mut out = Vec::with_capacity(col_offset + row.len());
                    out.resize(col_offset, CellValue::Empty);
                    out.extend(row.iter().map(CellValue::from_calamine));
                    out
                })
                .collect();

            sheets.push(Sheet::from_grid(sheet_name, grid));
        }

        tracing::debug!(sheets = sheets.len(), "materialized workbook snapshot");
        Ok(Self { sheets })
    }

    /// Parse UTF-8 CSV into a single sheet named [`CSV_SHEET_NAME`].
    pub fn from_csv(bytes: &[u8]) -> DiffResult<Self> {
        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(bytes);

        let mut grid = Vec::new();
        for record in reader.records() {
            let record = record?;
            grid.push(record.iter().map(CellValue::from_text).collect());
        }

        tracing::debug!(rows = grid.len(), "materialized csv snapshot");
        Ok(Self {
            sheets: vec![Sheet::from_grid(CSV_SHEET_NAME, grid)],
        })
    }

    /// Sheet with the given name.
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    /// Total data rows across all sheets.
    pub fn row_count(&self) -> usize {
        self.sheets.iter().map(Sheet::row_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization_equivalences() {
        assert_eq!(CellValue::from_text("945"), CellValue::Number(945.0));
        assert_eq!(CellValue::from_text(" 945.0 "), CellValue::from_number(945.0));
        assert_eq!(CellValue::from_text("   "), CellValue::Empty);
        assert_eq!(CellValue::from_text(""), CellValue::Empty);
        assert_eq!(CellValue::from_number(f64::NAN), CellValue::Empty);
        assert_eq!(CellValue::from_text("NaN"), CellValue::Empty);
        assert_eq!(CellValue::from_text("inf"), CellValue::Text("inf".to_string()));
        assert_eq!(CellValue::from_text("  abc "), CellValue::Text("abc".to_string()));
        assert_eq!(CellValue::from_number(-0.0), CellValue::Number(0.0));
        assert_eq!(CellValue::from_text("007"), CellValue::Number(7.0));
        assert_eq!(CellValue::from_text("1e3"), CellValue::from_text("1000"));
        assert_ne!(CellValue::from_text("7"), CellValue::Text("7".into()));
    }

    #[test]
    fn test_long_digit_strings_compare_as_text() {
        let a = CellValue::from_text("12345678901234567890");
        let b = CellValue::from_text("12345678901234567891");
        assert_ne!(a, b);
        assert_eq!(a.render().as_deref(), Some("12345678901234567890"));
        assert_eq!(a, CellValue::from_text(" 12345678901234567890 "));

        // Fifteen significant digits still compare numerically.
        assert_eq!(
            CellValue::from_text("123456789012345"),
            CellValue::from_text("123456789012345.000")
        );
        assert_eq!(CellValue::from_text("0.000123456789012345").as_number(), Some(0.000123456789012345));
        assert_eq!(significant_digits("-0012.3400e5"), 4);
        assert_eq!(significant_digits("1200"), 4);
    }

    #[test]
    fn test_numeric_text_renders_as_written() {
        assert_eq!(CellValue::from_text("007").render().as_deref(), Some("007"));
        assert_eq!(CellValue::from_text(" 945.0 ").render().as_deref(), Some("945.0"));
        assert_eq!(CellValue::from_text("945").render().as_deref(), Some("945"));
        assert!(matches!(CellValue::from_text("945"), CellValue::Number(_)));
    }

    #[test]
    fn test_render() {
        assert_eq!(CellValue::Number(945.0).render().as_deref(), Some("945"));
        assert_eq!(CellValue::Number(850.5).render().as_deref(), Some("850.5"));
        assert_eq!(CellValue::Empty.render(), None);
    }

    #[test]
    fn test_header_names() {
        let header = vec![
            CellValue::Text("Tax".into()),
            CellValue::Empty,
            CellValue::Text("Tax".into()),
            CellValue::Text("Tax".into()),
            CellValue::Number(2024.0),
        ];
        assert_eq!(
            header_names(&header),
            vec!["Tax", "Unnamed: 1", "Tax.1", "Tax.2", "2024"]
        );
    }

    #[test]
    fn test_csv_parsing_pads_ragged_rows() {
        let snapshot = Snapshot::from_bytes(b"\xEF\xBB\xBFName,Tax\nalice,945\nbob\ncarol,1,extra\n")
            .unwrap();
        assert_eq!(snapshot.sheets.len(), 1);

        let sheet = &snapshot.sheets[0];
        assert_eq!(sheet.name, CSV_SHEET_NAME);
        assert_eq!(sheet.columns, vec!["Name", "Tax", "Unnamed: 2"]);
        assert_eq!(sheet.row_count(), 3);
        assert_eq!(sheet.cell(0, 1), &CellValue::Number(945.0));
        assert_eq!(sheet.cell(1, 1), &CellValue::Empty);
        assert_eq!(sheet.cell(2, 2), &CellValue::Text("extra".into()));
        assert_eq!(sheet.cell(99, 0), &CellValue::Empty);
    }

    #[test]
    fn test_empty_csv_has_no_columns() {
        let snapshot = Snapshot::from_bytes(b"").unwrap();
        assert!(snapshot.sheets[0].columns.is_empty());
        assert_eq!(snapshot.row_count(), 0);
    }

    #[test]
    fn test_invalid_utf8_csv_rejected() {
        assert!(matches!(
            Snapshot::from_bytes(b"a,b\n\xFF\xFE,1\n"),
            Err(DiffError::NotUtf8)
        ));
    }

    #[test]
    fn test_corrupt_zip_rejected() {
        assert!(matches!(
            Snapshot::from_bytes(b"PK\x03\x04not really a zip"),
            Err(DiffError::Workbook(_))
        ));
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(SnapshotFormat::detect(b"PK\x03\x04rest"), SnapshotFormat::Workbook);
        assert_eq!(
            SnapshotFormat::detect(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1]),
            SnapshotFormat::Workbook
        );
        assert_eq!(SnapshotFormat::detect(b"a,b\n1,2"), SnapshotFormat::Csv);
    }
}
