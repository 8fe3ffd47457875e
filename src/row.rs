//! [`Row`] and [`RowSet`] (`spec.md` §3, §5): the materialized result of a
//! single page, and name/index access onto one row of it.
use std::{fmt, sync::Arc};

use crate::{
    cql::{decode::ColumnSpec, value::CqlValue},
    error::{Error, Result},
    protocol::response::RowsResult,
};

/// Opaque cursor into the next page of a query, handed back by the server
/// (`spec.md` §4.6, GLOSSARY "paging state").
pub type PagingState = Vec<u8>;

/// Column name or 0-based position, for [`Row::get`]/[`Row::try_get`].
pub trait ColumnIndex: fmt::Debug {
    fn resolve(&self, columns: &[ColumnSpec]) -> Option<usize>;
}

impl ColumnIndex for usize {
    fn resolve(&self, columns: &[ColumnSpec]) -> Option<usize> {
        (*self < columns.len()).then_some(*self)
    }
}

impl ColumnIndex for str {
    fn resolve(&self, columns: &[ColumnSpec]) -> Option<usize> {
        columns.iter().position(|c| c.name == self)
    }
}

impl ColumnIndex for &str {
    fn resolve(&self, columns: &[ColumnSpec]) -> Option<usize> {
        columns.iter().position(|c| c.name == *self)
    }
}

impl ColumnIndex for String {
    fn resolve(&self, columns: &[ColumnSpec]) -> Option<usize> {
        columns.iter().position(|c| &c.name == self)
    }
}

/// One decoded row, sharing its column metadata with every other row in the
/// same [`RowSet`].
#[derive(Clone)]
pub struct Row {
    columns: Arc<Vec<ColumnSpec>>,
    values: Vec<Option<CqlValue>>,
}

impl Row {
    fn new(columns: Arc<Vec<ColumnSpec>>, values: Vec<Option<CqlValue>>) -> Self {
        Self { columns, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Borrow the raw decoded value at `idx`, `None` if the column itself is
    /// NULL.
    pub fn get<I: ColumnIndex>(&self, idx: I) -> Option<&CqlValue> {
        let pos = idx.resolve(&self.columns)?;
        self.values.get(pos)?.as_ref()
    }

    /// Take ownership of the value at `idx` and convert it with `FromColumn`,
    /// erroring if the column is missing, NULL, or the wrong shape.
    pub fn try_get<I: ColumnIndex, R: FromColumn>(&self, idx: I) -> Result<R> {
        let pos = idx
            .resolve(&self.columns)
            .ok_or_else(|| Error::argument(format!("no such column: {idx:?}")))?;
        R::from_column(self.values[pos].clone())
    }

    pub fn into_values(self) -> Vec<Option<CqlValue>> {
        self.values
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_map();
        for (col, value) in self.columns.iter().zip(&self.values) {
            dbg.entry(&col.name, value);
        }
        dbg.finish()
    }
}

/// Converts a single, possibly-NULL column value into a typed Rust value.
pub trait FromColumn: Sized {
    fn from_column(value: Option<CqlValue>) -> Result<Self>;
}

impl FromColumn for CqlValue {
    fn from_column(value: Option<CqlValue>) -> Result<Self> {
        value.ok_or_else(|| Error::argument("unexpected NULL"))
    }
}

impl<T: FromColumn> FromColumn for Option<T> {
    fn from_column(value: Option<CqlValue>) -> Result<Self> {
        match value {
            None => Ok(None),
            Some(v) => T::from_column(Some(v)).map(Some),
        }
    }
}

macro_rules! from_column_scalar {
    ($ty:ty, $variant:ident, $name:literal) => {
        impl FromColumn for $ty {
            fn from_column(value: Option<CqlValue>) -> Result<Self> {
                match value {
                    Some(CqlValue::$variant(v)) => Ok(v),
                    Some(_) => Err(Error::argument(format!("column is not a {}", $name))),
                    None => Err(Error::argument(format!("unexpected NULL for {}", $name))),
                }
            }
        }
    };
}

from_column_scalar!(bool, Boolean, "boolean");
from_column_scalar!(i8, TinyInt, "tinyint");
from_column_scalar!(i16, SmallInt, "smallint");
from_column_scalar!(i32, Int, "int");
from_column_scalar!(i64, BigInt, "bigint");
from_column_scalar!(f32, Float, "float");
from_column_scalar!(f64, Double, "double");
from_column_scalar!(String, Text, "text");
from_column_scalar!(Vec<u8>, Blob, "blob");
from_column_scalar!(uuid::Uuid, Uuid, "uuid");

impl FromColumn for chrono::NaiveDate {
    fn from_column(value: Option<CqlValue>) -> Result<Self> {
        match value {
            Some(CqlValue::Date(biased)) => {
                let days = biased as i64 - crate::cql::value::DATE_EPOCH_BIAS;
                crate::cql::value::unix_epoch_date()
                    .checked_add_signed(chrono::Duration::days(days))
                    .ok_or_else(|| Error::argument("date out of chrono's representable range"))
            }
            Some(_) => Err(Error::argument("column is not a date")),
            None => Err(Error::argument("unexpected NULL for date")),
        }
    }
}

impl FromColumn for chrono::NaiveTime {
    fn from_column(value: Option<CqlValue>) -> Result<Self> {
        match value {
            Some(CqlValue::Time(nanos)) => {
                let secs = (nanos / 1_000_000_000) as u32;
                let subsec_nanos = (nanos % 1_000_000_000) as u32;
                chrono::NaiveTime::from_num_seconds_from_midnight_opt(secs, subsec_nanos)
                    .ok_or_else(|| Error::argument("time out of range"))
            }
            Some(_) => Err(Error::argument("column is not a time")),
            None => Err(Error::argument("unexpected NULL for time")),
        }
    }
}

impl FromColumn for chrono::DateTime<chrono::Utc> {
    fn from_column(value: Option<CqlValue>) -> Result<Self> {
        match value {
            Some(CqlValue::Timestamp(millis)) => chrono::DateTime::from_timestamp_millis(millis)
                .ok_or_else(|| Error::argument("timestamp out of chrono's representable range")),
            Some(_) => Err(Error::argument("column is not a timestamp")),
            None => Err(Error::argument("unexpected NULL for timestamp")),
        }
    }
}

/// Constructs `Self` from an entire row, for typed `fetch`-style call sites.
pub trait FromRow: Sized {
    fn from_row(row: Row) -> Result<Self>;
}

impl FromRow for Row {
    fn from_row(row: Row) -> Result<Self> {
        Ok(row)
    }
}

/// One page of query results: shared column metadata plus the rows decoded
/// for this page, and the paging state to continue from if more remain.
#[derive(Debug, Clone)]
pub struct RowSet {
    columns: Arc<Vec<ColumnSpec>>,
    rows: Vec<Row>,
    paging_state: Option<PagingState>,
}

impl RowSet {
    /// A page with no columns and no rows, used for RESULT kinds that never
    /// carry rows (`VOID`, `SET_KEYSPACE`, `SCHEMA_CHANGE`) and for a retry
    /// policy's `Ignore` decision.
    pub fn empty() -> Self {
        Self { columns: Arc::new(Vec::new()), rows: Vec::new(), paging_state: None }
    }

    pub(crate) fn clear_paging_state(&mut self) {
        self.paging_state = None;
    }

    pub(crate) fn from_result(result: RowsResult) -> Self {
        let columns = Arc::new(result.metadata.columns);
        let rows = result
            .rows
            .into_iter()
            .map(|values| Row::new(columns.clone(), values))
            .collect();
        Self { columns, rows, paging_state: result.metadata.paging_state }
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// `Some` when the server indicated more pages remain (`spec.md` §4.6).
    pub fn paging_state(&self) -> Option<&PagingState> {
        self.paging_state.as_ref()
    }

    pub fn has_more_pages(&self) -> bool {
        self.paging_state.is_some()
    }

    /// Decode every row into `T`, short-circuiting on the first error.
    pub fn typed<T: FromRow>(self) -> Result<Vec<T>> {
        self.rows.into_iter().map(T::from_row).collect()
    }

    /// Consume exactly one row, erroring if the page held zero or more than one.
    pub fn into_single_row(mut self) -> Result<Row> {
        if self.rows.len() != 1 {
            return Err(Error::argument(format!(
                "expected exactly one row, got {}",
                self.rows.len()
            )));
        }
        Ok(self.rows.remove(0))
    }
}

impl IntoIterator for RowSet {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cql::types::CqlType;

    fn columns() -> Arc<Vec<ColumnSpec>> {
        Arc::new(vec![
            ColumnSpec { keyspace: "ks".into(), table: "t".into(), name: "id".into(), col_type: CqlType::Int },
            ColumnSpec { keyspace: "ks".into(), table: "t".into(), name: "name".into(), col_type: CqlType::Text },
        ])
    }

    #[test]
    fn gets_column_by_name_and_index() {
        let row = Row::new(columns(), vec![Some(CqlValue::Int(7)), Some(CqlValue::Text("a".into()))]);
        assert_eq!(row.get("id"), Some(&CqlValue::Int(7)));
        assert_eq!(row.get(1), Some(&CqlValue::Text("a".into())));
        assert_eq!(row.get("missing"), None);
    }

    #[test]
    fn try_get_converts_scalars() {
        let row = Row::new(columns(), vec![Some(CqlValue::Int(7)), Some(CqlValue::Text("a".into()))]);
        let id: i32 = row.try_get("id").unwrap();
        assert_eq!(id, 7);
        let name: String = row.try_get("name").unwrap();
        assert_eq!(name, "a");
    }

    #[test]
    fn try_get_wrong_type_errors() {
        let row = Row::new(columns(), vec![Some(CqlValue::Int(7)), None]);
        let result: Result<String> = row.try_get("id");
        assert!(result.is_err());
    }

    #[test]
    fn row_set_reports_single_row_or_errors() {
        let row = Row::new(columns(), vec![Some(CqlValue::Int(1)), None]);
        let set = RowSet { columns: columns(), rows: vec![row], paging_state: None };
        assert!(set.into_single_row().is_ok());

        let set = RowSet { columns: columns(), rows: vec![], paging_state: None };
        assert!(set.into_single_row().is_err());
    }
}
