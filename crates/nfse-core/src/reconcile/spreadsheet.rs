//! Reference spreadsheet import (xlsx/xls via calamine, csv via csv).

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use rust_decimal::Decimal;
use std::io::Cursor;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use crate::error::SpreadsheetError;
use crate::models::invoice::{InvoiceRecord, ReferenceRow};

/// Supported spreadsheet formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpreadsheetKind {
    Xlsx,
    Xls,
    Csv,
}

impl SpreadsheetKind {
    /// Detect the format from a file name extension.
    pub fn from_filename(filename: &str) -> Result<Self, SpreadsheetError> {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match ext.as_str() {
            "xlsx" => Ok(Self::Xlsx),
            "xls" => Ok(Self::Xls),
            "csv" => Ok(Self::Csv),
            _ => Err(SpreadsheetError::UnsupportedFormat(filename.to_string())),
        }
    }

    /// True for names ending in a supported spreadsheet extension.
    pub fn is_spreadsheet(filename: &str) -> bool {
        Self::from_filename(filename).is_ok()
    }
}

/// Rows read from a reference spreadsheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceImport {
    pub rows: Vec<ReferenceRow>,
    /// One entry per rejected row, `Linha N: ...` with N the sheet line.
    pub warnings: Vec<String>,
}

impl ReferenceImport {
    /// Map every row to an invoice (gross = net = value).
    pub fn to_invoices(&self, source_filename: &str) -> Vec<InvoiceRecord> {
        self.rows
            .iter()
            .map(|row| InvoiceRecord::from_reference(row, source_filename))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Text(String),
    Number(f64),
    Empty,
}

impl Cell {
    fn text(&self) -> String {
        match self {
            Cell::Text(s) => s.trim().to_string(),
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{n:.0}"),
            Cell::Number(n) => n.to_string(),
            Cell::Empty => String::new(),
        }
    }

    fn is_blank(&self) -> bool {
        self.text().is_empty()
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => Cell::Empty,
            Data::Float(f) => Cell::Number(*f),
            Data::Int(i) => Cell::Number(*i as f64),
            Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
            other => Cell::Text(other.to_string()),
        }
    }
}

/// Read `[tax_id, invoice_number, value]` rows from the first sheet.
///
/// The first row is a header. Rows with fewer than three columns or with
/// the three columns blank are skipped silently.
pub fn read_reference_rows(bytes: &[u8], filename: &str) -> Result<ReferenceImport, SpreadsheetError> {
    let rows = match SpreadsheetKind::from_filename(filename)? {
        SpreadsheetKind::Xlsx | SpreadsheetKind::Xls => workbook_rows(bytes)?,
        SpreadsheetKind::Csv => csv_rows(bytes)?,
    };

    if rows.is_empty() {
        return Err(SpreadsheetError::Empty);
    }

    let import = parse_rows(&rows);
    debug!(
        "{}: {} reference rows, {} rejected",
        filename,
        import.rows.len(),
        import.warnings.len()
    );
    Ok(import)
}

fn workbook_rows(bytes: &[u8]) -> Result<Vec<Vec<Cell>>, SpreadsheetError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| SpreadsheetError::Read(e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or(SpreadsheetError::Empty)?
        .map_err(|e| SpreadsheetError::Read(e.to_string()))?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(Cell::from).collect())
        .collect())
}

fn csv_rows(bytes: &[u8]) -> Result<Vec<Vec<Cell>>, SpreadsheetError> {
    let delimiter = sniff_delimiter(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(bytes);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| SpreadsheetError::Read(e.to_string()))?;
        rows.push(
            record
                .iter()
                .map(|field| {
                    if field.trim().is_empty() {
                        Cell::Empty
                    } else {
                        Cell::Text(field.to_string())
                    }
                })
                .collect(),
        );
    }
    Ok(rows)
}

/// Brazilian exports often use `;` so that `,` can be the decimal mark.
fn sniff_delimiter(bytes: &[u8]) -> u8 {
    let first_line = bytes.split(|b| *b == b'\n').next().unwrap_or_default();
    let semicolons = first_line.iter().filter(|b| **b == b';').count();
    let commas = first_line.iter().filter(|b| **b == b',').count();
    if semicolons > 0 && semicolons >= commas {
        b';'
    } else {
        b','
    }
}

fn parse_rows(rows: &[Vec<Cell>]) -> ReferenceImport {
    let mut import = ReferenceImport::default();

    for (i, row) in rows.iter().enumerate().skip(1) {
        if row.len() < 3 || row[..3].iter().all(Cell::is_blank) {
            continue;
        }

        match parse_reference_value(&row[2]) {
            Some(value) => import.rows.push(ReferenceRow {
                tax_id: row[0].text(),
                invoice_number: row[1].text(),
                value,
            }),
            None => import
                .warnings
                .push(format!("Linha {}: valor inválido '{}'", i + 1, row[2].text())),
        }
    }

    import
}

/// Numbers are rounded to cents. Text with exactly one comma is read as
/// Brazilian (`.` dropped, `,` as decimal mark), anything else as a plain decimal.
fn parse_reference_value(cell: &Cell) -> Option<Decimal> {
    match cell {
        Cell::Number(n) => Decimal::from_f64_retain(*n).map(|d| d.round_dp(2).normalize()),
        Cell::Text(s) => {
            let s = s.trim();
            let normalized = if s.matches(',').count() == 1 {
                s.replace('.', "").replace(',', ".")
            } else {
                s.to_string()
            };
            Decimal::from_str(&normalized).ok()
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_kind_from_filename() {
        assert_eq!(SpreadsheetKind::from_filename("ref.XLSX").unwrap(), SpreadsheetKind::Xlsx);
        assert_eq!(SpreadsheetKind::from_filename("a.b.csv").unwrap(), SpreadsheetKind::Csv);
        assert!(matches!(
            SpreadsheetKind::from_filename("nota.pdf"),
            Err(SpreadsheetError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_csv_rows() {
        let csv = "CNPJ,Numero,Valor\n\
                   11.222.333/0001-81,42,\"1.234,56\"\n\
                   ,,\n\
                   A,1\n\
                   B,2,abc\n\
                   C,3,100.5\n";
        let import = read_reference_rows(csv.as_bytes(), "ref.csv").unwrap();

        assert_eq!(
            import.rows,
            vec![
                ReferenceRow {
                    tax_id: "11.222.333/0001-81".to_string(),
                    invoice_number: "42".to_string(),
                    value: dec("1234.56"),
                },
                ReferenceRow {
                    tax_id: "C".to_string(),
                    invoice_number: "3".to_string(),
                    value: dec("100.5"),
                },
            ]
        );
        assert_eq!(import.warnings, vec!["Linha 5: valor inválido 'abc'".to_string()]);
    }

    #[test]
    fn test_semicolon_csv() {
        let csv = "cnpj;nota;valor\n11222333000181;7;10,00\n";
        let import = read_reference_rows(csv.as_bytes(), "ref.csv").unwrap();
        assert_eq!(import.rows.len(), 1);
        assert_eq!(import.rows[0].value, dec("10"));
    }

    #[test]
    fn test_numeric_cells() {
        let rows = vec![
            vec![Cell::Text("h".into()), Cell::Text("h".into()), Cell::Text("h".into())],
            vec![Cell::Number(11222333000181.0), Cell::Number(42.0), Cell::Number(99.9)],
        ];
        let import = parse_rows(&rows);
        assert_eq!(import.rows[0].tax_id, "11222333000181");
        assert_eq!(import.rows[0].invoice_number, "42");
        assert_eq!(import.rows[0].value, dec("99.9"));
    }

    #[test]
    fn test_empty_file_and_garbage_workbook() {
        assert!(matches!(read_reference_rows(b"", "ref.csv"), Err(SpreadsheetError::Empty)));
        assert!(matches!(
            read_reference_rows(b"not a workbook", "ref.xlsx"),
            Err(SpreadsheetError::Read(_))
        ));
    }

    #[test]
    fn test_to_invoices() {
        let import = ReferenceImport {
            rows: vec![ReferenceRow {
                tax_id: "A".to_string(),
                invoice_number: "1".to_string(),
                value: dec("100"),
            }],
            warnings: Vec::new(),
        };
        let invoices = import.to_invoices("ref.xlsx");
        assert_eq!(invoices[0].gross_value, dec("100"));
        assert_eq!(invoices[0].net_value, dec("100"));
        assert_eq!(invoices[0].source_filename, "ref.xlsx");
    }
}
