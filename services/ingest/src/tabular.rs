//! Tabular parser: raw delimited text into a rectangular grid of cells.
//!
//! No interpretation happens here. The header row is row 0 and every cell is
//! returned exactly as it appears in the source.

use crate::error::{IngestError, Result};

pub type Table = Vec<Vec<String>>;

/// Parse comma-delimited text into rows of string cells.
///
/// Every row must have the same number of fields as the first one.
pub fn parse_table(content: &str) -> Result<Table> {
    // Remove UTF-8 BOM if present
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    if let Some(line) = unterminated_quote_line(content) {
        return Err(IngestError::MalformedInput {
            line,
            reason: "unterminated quoted field".to_string(),
        });
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(false)
        .from_reader(content.as_bytes());

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| IngestError::MalformedInput {
            line: e.position().map(|p| p.line()).unwrap_or(0),
            reason: e.to_string(),
        })?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(rows)
}

#[derive(Clone, Copy)]
enum Scan {
    FieldStart,
    Unquoted,
    Quoted,
    QuoteInQuoted,
}

/// Returns the 1-based line where a quoted field opens without closing.
///
/// A `"` only opens a quoted field as the first character of the field;
/// anywhere else in an unquoted field it is literal.
fn unterminated_quote_line(content: &str) -> Option<u64> {
    let mut line = 1u64;
    let mut open_at = 0u64;
    let mut state = Scan::FieldStart;
    for c in content.chars() {
        state = match (state, c) {
            (Scan::Quoted, '"') => Scan::QuoteInQuoted,
            (Scan::Quoted, _) => Scan::Quoted,
            (Scan::QuoteInQuoted, '"') => Scan::Quoted,
            (Scan::FieldStart, '"') => {
                open_at = line;
                Scan::Quoted
            }
            (_, ',' | '\n' | '\r') => Scan::FieldStart,
            _ => Scan::Unquoted,
        };
        if c == '\n' {
            line += 1;
        }
    }
    matches!(state, Scan::Quoted).then_some(open_at)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_preserves_order_and_header() {
        let table = parse_table("a,b,c\n1,2,3\n4,5,6\n").unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table[0], vec!["a", "b", "c"]);
        assert_eq!(table[2], vec!["4", "5", "6"]);
    }

    #[test]
    fn test_parse_keeps_cells_verbatim() {
        let table = parse_table("name,value\n\"  Αθήνα, Κέντρο \", 12%\n").unwrap();
        assert_eq!(table[1][0], "  Αθήνα, Κέντρο ");
        assert_eq!(table[1][1], " 12%");
    }

    #[test]
    fn test_parse_escaped_quotes() {
        let table = parse_table("a\n\"say \"\"hi\"\"\"\n").unwrap();
        assert_eq!(table[1][0], "say \"hi\"");
    }

    #[test]
    fn test_parse_strips_bom() {
        let table = parse_table("\u{feff}x,y\n1,2\n").unwrap();
        assert_eq!(table[0][0], "x");
    }

    #[test]
    fn test_parse_empty_input() {
        assert!(parse_table("").unwrap().is_empty());
    }

    #[test]
    fn test_unterminated_quote_fails() {
        let err = parse_table("a,b\n1,\"open\n2,3\n").unwrap_err();
        assert!(matches!(err, IngestError::MalformedInput { line: 2, .. }));
    }

    #[test]
    fn test_quote_inside_unquoted_field_is_literal() {
        let table = parse_table("name,value\nScreen 5\" wide,1\n").unwrap();
        assert_eq!(table[1], vec!["Screen 5\" wide", "1"]);
    }

    #[test]
    fn test_unterminated_quote_after_escaped_quote_fails() {
        let err = parse_table("a\nok\n\"say \"\"hi\n").unwrap_err();
        assert!(matches!(err, IngestError::MalformedInput { line: 3, .. }));
    }

    #[test]
    fn test_ragged_row_fails() {
        let err = parse_table("a,b,c\n1,2\n").unwrap_err();
        assert!(matches!(err, IngestError::MalformedInput { .. }));
    }
}
