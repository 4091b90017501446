use std::collections::HashMap;
use std::fmt;

use super::error::TableError;
use super::value::{DataType, Value};

/// A typed column of cells. `None` cells are missing (`NA`).
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    dtype: DataType,
    values: Vec<Option<Value>>,
}

impl Column {
    /// An empty column of the given type.
    #[must_use]
    pub fn new(dtype: DataType) -> Self {
        Self {
            dtype,
            values: Vec::new(),
        }
    }

    /// Build a column from raw cells. Integers are widened in float columns;
    /// any other type mismatch is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::TypeMismatch`] naming the first offending row.
    pub fn from_values(dtype: DataType, values: Vec<Option<Value>>) -> Result<Self, TableError> {
        let mut column = Self::new(dtype);
        column.values.reserve(values.len());
        for (row, value) in values.into_iter().enumerate() {
            let value = column
                .coerce(value)
                .map_err(|found| TableError::TypeMismatch {
                    row,
                    expected: dtype,
                    found,
                })?;
            column.values.push(value);
        }
        Ok(column)
    }

    /// Integer column; accepts `i64` or `Option<i64>` items.
    pub fn int<T: Into<Option<i64>>>(values: impl IntoIterator<Item = T>) -> Self {
        Self::typed(DataType::Int, values, Value::Int)
    }

    /// Float column; accepts `f64` or `Option<f64>` items.
    pub fn float<T: Into<Option<f64>>>(values: impl IntoIterator<Item = T>) -> Self {
        Self::typed(DataType::Float, values, Value::Float)
    }

    /// Logical column; accepts `bool` or `Option<bool>` items.
    pub fn bool<T: Into<Option<bool>>>(values: impl IntoIterator<Item = T>) -> Self {
        Self::typed(DataType::Bool, values, Value::Bool)
    }

    /// String column without missing values.
    pub fn string<S: Into<String>>(values: impl IntoIterator<Item = S>) -> Self {
        Self {
            dtype: DataType::String,
            values: values
                .into_iter()
                .map(|s| Some(Value::String(s.into())))
                .collect(),
        }
    }

    /// String column where `None` marks a missing value.
    pub fn string_opt<S: Into<String>>(values: impl IntoIterator<Item = Option<S>>) -> Self {
        Self {
            dtype: DataType::String,
            values: values
                .into_iter()
                .map(|s| s.map(|s| Value::String(s.into())))
                .collect(),
        }
    }

    fn typed<T, P>(
        dtype: DataType,
        values: impl IntoIterator<Item = T>,
        wrap: impl Fn(P) -> Value,
    ) -> Self
    where
        T: Into<Option<P>>,
    {
        Self {
            dtype,
            values: values.into_iter().map(|v| v.into().map(&wrap)).collect(),
        }
    }

    #[must_use]
    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Cell value at `row`; `None` for a missing cell or an out-of-range row.
    #[must_use]
    pub fn get(&self, row: usize) -> Option<&Value> {
        self.values.get(row).and_then(Option::as_ref)
    }

    #[must_use]
    pub fn values(&self) -> &[Option<Value>] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<&Value>> {
        self.values.iter().map(Option::as_ref)
    }

    /// Count of missing cells.
    #[must_use]
    pub fn na_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }

    /// Check that `value` can be stored here, widening integers in float
    /// columns. On mismatch returns the offending value's type.
    pub(crate) fn coerce(&self, value: Option<Value>) -> Result<Option<Value>, DataType> {
        match value {
            None => Ok(None),
            Some(Value::Int(v)) if self.dtype == DataType::Float => {
                Ok(Some(Value::Float(widen(v))))
            }
            Some(v) if v.data_type() == self.dtype => Ok(Some(v)),
            Some(v) => Err(v.data_type()),
        }
    }

    /// Store an already coerced value.
    pub(crate) fn set(&mut self, row: usize, value: Option<Value>) {
        self.values[row] = value;
    }
}

#[allow(clippy::cast_precision_loss)]
fn widen(v: i64) -> f64 {
    v as f64
}

/// A rectangular dataset with named, typed columns of equal length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    names: Vec<String>,
    columns: Vec<Column>,
    index: HashMap<String, usize>,
    rows: usize,
}

impl Table {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column, builder style.
    ///
    /// # Errors
    ///
    /// Returns [`TableError`] on a duplicate name or a length mismatch.
    pub fn with_column(mut self, name: &str, column: Column) -> Result<Self, TableError> {
        self.add_column(name, column)?;
        Ok(self)
    }

    /// Append a column. The first column fixes the row count.
    ///
    /// # Errors
    ///
    /// Returns [`TableError`] on a duplicate name or a length mismatch.
    pub fn add_column(&mut self, name: &str, column: Column) -> Result<(), TableError> {
        if self.index.contains_key(name) {
            return Err(TableError::DuplicateColumn {
                name: name.to_owned(),
            });
        }
        if self.columns.is_empty() {
            self.rows = column.len();
        } else if column.len() != self.rows {
            return Err(TableError::LengthMismatch {
                column: name.to_owned(),
                expected: self.rows,
                found: column.len(),
            });
        }
        self.index.insert(name.to_owned(), self.columns.len());
        self.names.push(name.to_owned());
        self.columns.push(column);
        Ok(())
    }

    #[must_use]
    pub fn nrows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Column names in insertion order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.index.get(name).map(|&idx| &self.columns[idx])
    }

    /// Cell at (`row`, `column`); `None` when missing or out of range.
    #[must_use]
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        self.column(column).and_then(|c| c.get(row))
    }

    pub(crate) fn column_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub(crate) fn column_at(&self, idx: usize) -> &Column {
        &self.columns[idx]
    }

    pub(crate) fn column_at_mut(&mut self, idx: usize) -> &mut Column {
        &mut self.columns[idx]
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.names.join("\t"))?;
        for row in 0..self.rows {
            for (i, column) in self.columns.iter().enumerate() {
                if i > 0 {
                    write!(f, "\t")?;
                }
                match column.get(row) {
                    Some(value) => write!(f, "{}", value.to_text())?,
                    None => write!(f, "NA")?,
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
