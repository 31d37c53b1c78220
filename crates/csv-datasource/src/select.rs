//! Transposing selected columns back into rows

use crate::error::CsvError;
use crate::table::Table;

/// A point needs a timestamp field and a value field
pub const MIN_FIELDS: usize = 2;

pub fn validate_fields<S: AsRef<str>>(fields: &[S]) -> Result<(), CsvError> {
    if fields.len() < MIN_FIELDS {
        return Err(CsvError::Validation(fields.len()));
    }
    Ok(())
}

/// Build row tuples from the requested columns, in requested-field order.
///
/// The row count follows the first field's column. Unknown fields and short
/// columns contribute nothing to a row rather than padding it, so a row may
/// hold fewer entries than there are fields.
pub fn select_rows<'t, S: AsRef<str>>(
    table: &'t Table,
    fields: &[S],
) -> Result<Vec<Vec<&'t str>>, CsvError> {
    validate_fields(fields)?;

    let height = table.column(fields[0].as_ref()).map_or(0, <[String]>::len);
    let mut rows: Vec<Vec<&str>> = (0..height)
        .map(|_| Vec::with_capacity(fields.len()))
        .collect();

    for field in fields {
        let Some(values) = table.column(field.as_ref()) else {
            log::debug!("Unknown field {:?}", field.as_ref());
            continue;
        };
        for (row, value) in rows.iter_mut().zip(values) {
            row.push(value.as_str());
        }
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        Table::from_columns([
            ("time", vec!["t0", "t1", "t2"]),
            ("temp", vec!["1", "2", "3"]),
            ("humidity", vec!["40", "41"]),
        ])
    }

    #[test]
    fn rows_follow_requested_order() {
        let table = table();
        let rows = select_rows(&table, &["temp", "time"]).unwrap();
        assert_eq!(rows, vec![vec!["1", "t0"], vec!["2", "t1"], vec!["3", "t2"]]);
    }

    #[test]
    fn short_columns_are_omitted_not_padded() {
        let table = table();
        let rows = select_rows(&table, &["time", "humidity"]).unwrap();
        assert_eq!(rows, vec![vec!["t0", "40"], vec!["t1", "41"], vec!["t2"]]);
    }

    #[test]
    fn unknown_field_yields_no_values() {
        let table = table();
        let rows = select_rows(&table, &["time", "pressure"]).unwrap();
        assert_eq!(rows, vec![vec!["t0"], vec!["t1"], vec!["t2"]]);

        let rows = select_rows(&table, &["pressure", "time"]).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn fewer_than_two_fields_is_rejected() {
        let table = table();
        assert!(matches!(
            select_rows(&table, &["time"]),
            Err(CsvError::Validation(1))
        ));
        assert!(matches!(
            select_rows::<&str>(&table, &[]),
            Err(CsvError::Validation(0))
        ));
    }

    #[test]
    fn empty_table_selects_nothing() {
        let table = Table::default();
        let rows = select_rows(&table, &["time", "value"]).unwrap();
        assert!(rows.is_empty());
    }
}
