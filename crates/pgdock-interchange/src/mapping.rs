//! Source-to-target column mapping.
//!
//! A mapping is built once per stream, either from a header (or name-keyed
//! rows) or positionally from the first row's arity, and then drives field
//! order and per-column encoding for every subsequent row.

use pgdock_core::TableColumn;
use thiserror::Error;

/// Errors when a column mapping cannot be built.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("column \"{column}\" does not exist in the target table")]
    ColumnNotFound { column: String },

    #[error("row has {actual} fields but the target table expects {expected}")]
    ColumnCountMismatch { expected: usize, actual: usize },

    #[error("cannot build a column mapping without a header row or a first data row")]
    NoHeaderOrRow,
}

/// Encoding-relevant facts about one mapped target column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnBinding {
    pub target_name: String,
    pub is_binary: bool,
    pub is_structured: bool,
}

impl ColumnBinding {
    fn from_column(column: &TableColumn) -> Self {
        Self {
            target_name: column.name.clone(),
            is_binary: column.is_binary(),
            is_structured: column.is_structured(),
        }
    }
}

/// Ordered mapping from source fields to target columns.
#[derive(Debug, Clone)]
pub struct ColumnMapping {
    columns: Vec<ColumnBinding>,
    serial_omitted: bool,
}

impl ColumnMapping {
    /// Builds the mapping for one stream.
    ///
    /// With a `header` every name must resolve against the target table and
    /// binding order follows the header. Without one the mapping is
    /// positional over `arity` fields: either every target column is covered,
    /// or exactly the leading column is missing and that column is
    /// auto-generated (identity, serial, or a `nextval` default), in which
    /// case it is omitted so the sequence assigns values. `omit_serial`
    /// overrides the heuristic in either direction.
    pub fn build(
        target: &[TableColumn],
        header: Option<&[String]>,
        arity: Option<usize>,
        omit_serial: Option<bool>,
    ) -> Result<Self, MappingError> {
        if let Some(names) = header {
            return Self::from_header(target, names);
        }
        match arity {
            Some(arity) => Self::from_arity(target, arity, omit_serial),
            None => Err(MappingError::NoHeaderOrRow),
        }
    }

    fn from_header(target: &[TableColumn], names: &[String]) -> Result<Self, MappingError> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let column = target
                .iter()
                .find(|c| c.name == *name)
                .ok_or_else(|| MappingError::ColumnNotFound {
                    column: name.clone(),
                })?;
            columns.push(ColumnBinding::from_column(column));
        }
        Ok(Self {
            columns,
            serial_omitted: false,
        })
    }

    fn from_arity(
        target: &[TableColumn],
        arity: usize,
        omit_serial: Option<bool>,
    ) -> Result<Self, MappingError> {
        let mut ordered: Vec<&TableColumn> = target.iter().collect();
        ordered.sort_by_key(|c| c.ordinal);

        let omit_leading = match omit_serial {
            Some(forced) => forced,
            None => {
                ordered.len() == arity + 1
                    && ordered
                        .first()
                        .map(|c| c.has_sequence_default() && c.is_integer_kind())
                        .unwrap_or(false)
            }
        };

        let expected = if omit_leading {
            ordered.len().saturating_sub(1)
        } else {
            ordered.len()
        };
        if arity != expected {
            return Err(MappingError::ColumnCountMismatch {
                expected,
                actual: arity,
            });
        }

        let skip = if omit_leading { 1 } else { 0 };
        let columns = ordered
            .into_iter()
            .skip(skip)
            .map(ColumnBinding::from_column)
            .collect();
        Ok(Self {
            columns,
            serial_omitted: omit_leading,
        })
    }

    /// Ordered bindings, one per source field.
    pub fn columns(&self) -> &[ColumnBinding] {
        &self.columns
    }

    /// Target column names in binding order.
    pub fn target_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.target_name.as_str())
    }

    /// Whether a leading auto-generated column was left out of the mapping.
    pub fn serial_omitted(&self) -> bool {
        self.serial_omitted
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
