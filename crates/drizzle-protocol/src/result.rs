//! Results handed back to callers of `Session::execute_query`.

use std::sync::Arc;

use drizzle_core::{ColumnInfo, Row};

use crate::protocol::OkPacket;
use crate::protocol::server_status;
use crate::types::ColumnDescriptor;

/// Outcome of a statement that returned no rows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OkResult {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub warnings: u16,
    pub status_flags: u16,
    /// Human-readable info string, often empty
    pub message: String,
}

impl OkResult {
    /// True if the server reports an open transaction.
    pub fn in_transaction(&self) -> bool {
        self.status_flags & server_status::SERVER_STATUS_IN_TRANS != 0
    }

    /// True if the server reports autocommit mode after this statement.
    pub fn auto_commit(&self) -> bool {
        self.status_flags & server_status::SERVER_STATUS_AUTOCOMMIT != 0
    }
}

impl From<OkPacket> for OkResult {
    fn from(ok: OkPacket) -> Self {
        Self {
            affected_rows: ok.affected_rows,
            last_insert_id: ok.last_insert_id,
            warnings: ok.warnings,
            status_flags: ok.status_flags,
            message: ok.info,
        }
    }
}

/// A fully materialized result set.
#[derive(Debug, Clone)]
pub struct TabularResult {
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<Row>,
    /// Warnings reported by the terminating EOF
    pub warnings: u16,
    pub status_flags: u16,
}

impl TabularResult {
    /// Build a result whose rows share one name index over `columns`.
    pub(crate) fn new(columns: Vec<ColumnDescriptor>, values: Vec<Vec<drizzle_core::Value>>) -> Self {
        let info = Arc::new(ColumnInfo::new(
            columns.iter().map(|c| c.name.clone()).collect(),
        ));
        let rows = values
            .into_iter()
            .map(|v| Row::with_columns(Arc::clone(&info), v))
            .collect();
        Self {
            columns,
            rows,
            warnings: 0,
            status_flags: 0,
        }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// The result of one executed statement.
#[derive(Debug, Clone)]
pub enum QueryResult {
    /// The server answered with OK.
    Update(OkResult),
    /// The server answered with a result set.
    Tabular(TabularResult),
}

impl QueryResult {
    pub fn as_update(&self) -> Option<&OkResult> {
        match self {
            Self::Update(ok) => Some(ok),
            Self::Tabular(_) => None,
        }
    }

    pub fn as_tabular(&self) -> Option<&TabularResult> {
        match self {
            Self::Tabular(t) => Some(t),
            Self::Update(_) => None,
        }
    }

    pub fn into_tabular(self) -> Option<TabularResult> {
        match self {
            Self::Tabular(t) => Some(t),
            Self::Update(_) => None,
        }
    }

    /// Rows affected, zero for result sets.
    pub fn affected_rows(&self) -> u64 {
        self.as_update().map_or(0, |ok| ok.affected_rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColumnFlags, FieldType};
    use drizzle_core::Value;

    fn column(name: &str) -> ColumnDescriptor {
        ColumnDescriptor {
            catalog: "def".to_string(),
            schema: String::new(),
            table: String::new(),
            org_table: String::new(),
            name: name.to_string(),
            org_name: String::new(),
            charset: 63,
            column_length: 1,
            column_type: FieldType::LongLong,
            flags: ColumnFlags::empty(),
            decimals: 0,
        }
    }

    #[test]
    fn test_tabular_rows_share_column_info() {
        let table = TabularResult::new(
            vec![column("a"), column("b")],
            vec![
                vec![Value::BigInt(1), Value::Null],
                vec![Value::BigInt(2), Value::Text("x".to_string())],
            ],
        );
        assert_eq!(table.column_count(), 2);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column_names().collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(table.rows[1].get_by_name("b"), Some(&Value::Text("x".to_string())));
        assert!(Arc::ptr_eq(
            &table.rows[0].column_info(),
            &table.rows[1].column_info()
        ));
    }

    #[test]
    fn test_ok_result_from_packet() {
        let ok = OkResult::from(OkPacket {
            affected_rows: 3,
            last_insert_id: 9,
            status_flags: server_status::SERVER_STATUS_IN_TRANS,
            warnings: 1,
            info: "Rows matched: 3".to_string(),
        });
        assert_eq!(ok.affected_rows, 3);
        assert_eq!(ok.message, "Rows matched: 3");
        assert!(ok.in_transaction());
        assert!(!ok.auto_commit());
        let idle = OkResult {
            status_flags: server_status::SERVER_STATUS_AUTOCOMMIT,
            ..OkResult::default()
        };
        assert!(idle.auto_commit() && !idle.in_transaction());

        let result = QueryResult::Update(ok);
        assert_eq!(result.affected_rows(), 3);
        assert!(result.as_tabular().is_none());
    }
}
