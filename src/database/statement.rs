use crate::Error;
use crate::Result;

/// dynamic column value: the tagged sum the engine speaks
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Self::Integer(value) => Ok(*value),
            other => Err(Error::invalid_parameter(format!(
                "expected integer, found {}",
                other.kind()
            ))),
        }
    }

    /// integers widen; the engine stores untyped numerics
    pub fn as_f64(&self) -> Result<f64> {
        match self {
            Self::Real(value) => Ok(*value),
            Self::Integer(value) => Ok(*value as f64),
            other => Err(Error::invalid_parameter(format!(
                "expected real, found {}",
                other.kind()
            ))),
        }
    }

    pub fn as_text(&self) -> Result<&str> {
        match self {
            Self::Text(value) => Ok(value),
            other => Err(Error::invalid_parameter(format!(
                "expected text, found {}",
                other.kind()
            ))),
        }
    }

    pub fn as_blob(&self) -> Result<&[u8]> {
        match self {
            Self::Blob(value) => Ok(value),
            other => Err(Error::invalid_parameter(format!(
                "expected blob, found {}",
                other.kind()
            ))),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
        }
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}
impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        Self::Integer(value as i64)
    }
}
impl From<u32> for SqlValue {
    fn from(value: u32) -> Self {
        Self::Integer(value as i64)
    }
}
impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}
impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}
impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}
impl From<Vec<u8>> for SqlValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}
impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

impl From<rusqlite::types::ValueRef<'_>> for SqlValue {
    fn from(value: rusqlite::types::ValueRef<'_>) -> Self {
        use rusqlite::types::ValueRef;
        match value {
            ValueRef::Null => Self::Null,
            ValueRef::Integer(i) => Self::Integer(i),
            ValueRef::Real(r) => Self::Real(r),
            ValueRef::Text(t) => Self::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Self::Blob(b.to_vec()),
        }
    }
}

impl rusqlite::types::ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        use rusqlite::types::ToSqlOutput;
        use rusqlite::types::ValueRef;
        Ok(match self {
            Self::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Self::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Self::Real(r) => ToSqlOutput::Borrowed(ValueRef::Real(*r)),
            Self::Text(t) => ToSqlOutput::Borrowed(ValueRef::Text(t.as_bytes())),
            Self::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

/// compiled-statement handle: SQL text, owning connection, and ordered
/// positional bindings. binding to the engine is deferred until
/// execution, when the owning connection's compiled-statement pool
/// supplies the actual cursor.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    sql: String,
    connection_id: u64,
    parameter_count: usize,
    bindings: Vec<SqlValue>,
}

impl PreparedStatement {
    pub(crate) fn new(sql: String, connection_id: u64, parameter_count: usize) -> Self {
        Self {
            sql,
            connection_id,
            parameter_count,
            bindings: Vec::new(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// id of the connection that compiled this statement
    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    pub fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    /// bind a positional parameter, 1-based like the engine
    pub fn bind(&mut self, index: usize, value: impl Into<SqlValue>) -> Result<()> {
        if index == 0 || index > self.parameter_count {
            return Err(Error::invalid_parameter(format!(
                "parameter index {} outside 1..={}",
                index, self.parameter_count
            )));
        }
        if self.bindings.len() < index {
            self.bindings.resize(index, SqlValue::Null);
        }
        self.bindings[index - 1] = value.into();
        Ok(())
    }

    pub fn bind_all<I>(&mut self, values: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<SqlValue>,
    {
        for (index, value) in values.into_iter().enumerate() {
            self.bind(index + 1, value)?;
        }
        Ok(())
    }

    pub fn clear_bindings(&mut self) {
        self.bindings.clear();
    }

    pub(crate) fn bindings(&self) -> &[SqlValue] {
        &self.bindings
    }
}

/// callback verdict for row iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowFlow {
    Continue,
    Stop,
}

/// borrowed view of the cursor's current row, valid only inside the
/// row callback
pub struct Row<'a> {
    inner: &'a rusqlite::Row<'a>,
}

impl<'a> Row<'a> {
    pub(crate) fn new(inner: &'a rusqlite::Row<'a>) -> Self {
        Self { inner }
    }

    pub fn column_count(&self) -> usize {
        self.inner.as_ref().column_count()
    }

    pub fn value(&self, index: usize) -> Result<SqlValue> {
        Ok(SqlValue::from(self.inner.get_ref(index)?))
    }

    pub fn i64(&self, index: usize) -> Result<i64> {
        self.value(index)?.as_i64()
    }

    pub fn f64(&self, index: usize) -> Result<f64> {
        self.value(index)?.as_f64()
    }

    pub fn text(&self, index: usize) -> Result<String> {
        Ok(self.value(index)?.as_text()?.to_string())
    }

    pub fn blob(&self, index: usize) -> Result<Vec<u8>> {
        Ok(self.value(index)?.as_blob()?.to_vec())
    }

    pub fn is_null(&self, index: usize) -> Result<bool> {
        Ok(self.value(index)?.is_null())
    }
}
