use bytes::Bytes;
use polars::prelude::*;
use std::io::Cursor;

use crate::error::AppError;

const INFER_SCHEMA_ROWS: usize = 100;

/// Checks the declared upload filename before any bytes are parsed.
pub fn validate_filename(filename: Option<&str>) -> Result<String, AppError> {
    let filename = filename
        .filter(|name| !name.is_empty())
        .ok_or_else(|| AppError::InvalidInput("Please upload a CSV file (missing filename)".to_string()))?;

    if !filename.to_lowercase().ends_with(".csv") {
        return Err(AppError::InvalidInput(
            "Please upload a CSV file (.csv extension required)".to_string(),
        ));
    }

    Ok(filename.to_string())
}

/// Parses uploaded bytes into a DataFrame. The first row is the header;
/// column dtypes are inferred from the leading rows. A header-only file
/// yields a 0-row frame.
pub fn parse_csv_bytes(data: &Bytes) -> Result<DataFrame, AppError> {
    let cursor = Cursor::new(data.as_ref());

    CsvReader::new(cursor)
        .has_header(true)
        .infer_schema(Some(INFER_SCHEMA_ROWS))
        .finish()
        .map_err(|e| AppError::ParseError(format!("Failed to parse CSV: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(content: &str) -> Bytes {
        Bytes::from(content.to_string())
    }

    #[test]
    fn accepts_csv_filename() {
        assert_eq!(validate_filename(Some("data.csv")).unwrap(), "data.csv");
        assert_eq!(validate_filename(Some("DATA.CSV")).unwrap(), "DATA.CSV");
    }

    #[test]
    fn rejects_missing_filename() {
        let err = validate_filename(None).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn rejects_non_csv_extension() {
        let err = validate_filename(Some("data.txt")).unwrap_err();
        match err {
            AppError::InvalidInput(msg) => assert!(msg.contains(".csv")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_empty_filename() {
        assert!(validate_filename(Some("")).is_err());
    }

    #[test]
    fn parses_typed_columns() {
        let df = parse_csv_bytes(&bytes("age,city\n31,Paris\n28,Lyon\n45,Paris\n")).unwrap();
        assert_eq!(df.height(), 3);
        assert_eq!(df.width(), 2);
        assert!(df.column("age").unwrap().dtype().is_numeric());
        assert_eq!(df.column("city").unwrap().dtype(), &DataType::String);
    }

    #[test]
    fn header_only_csv_yields_zero_rows() {
        let df = parse_csv_bytes(&bytes("age,city\n")).unwrap();
        assert_eq!(df.height(), 0);
        assert_eq!(df.width(), 2);
    }

    #[test]
    fn ragged_rows_are_a_parse_error() {
        let err = parse_csv_bytes(&bytes("a,b\n1,2\n1,2,3,4\n")).unwrap_err();
        assert!(matches!(err, AppError::ParseError(_)));
    }

    #[test]
    fn empty_bytes_are_a_parse_error() {
        let err = parse_csv_bytes(&bytes("")).unwrap_err();
        assert!(matches!(err, AppError::ParseError(_)));
    }

    #[test]
    fn missing_values_become_nulls() {
        let df = parse_csv_bytes(&bytes("age,city\n31,Paris\n,Lyon\n")).unwrap();
        assert_eq!(df.column("age").unwrap().null_count(), 1);
    }
}
