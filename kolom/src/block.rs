//! Column-oriented block, the unit of data on the wire.
use bytes::{BufMut, BytesMut};
use std::fmt;

use crate::{
    Value,
    column::{Column, ValueError, new_column},
    ext::{BufMutExt, ReadExt},
    io::Read,
    protocol::{ProtocolError, revision},
};

/// Sanity ceiling of rows announced by a single block.
pub const MAX_ROWS: u64 = 1_000_000_000;

/// Sanity ceiling of columns announced by a single block.
const MAX_COLUMNS: u64 = 1_000_000;

/// Block metadata.
///
/// Field markers are kept as read so the record is written back verbatim.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BlockInfo {
    field1: u64,
    /// Rows beyond `max_rows_to_group_by` when `group_by_overflow_mode = 'any'`.
    pub is_overflows: bool,
    field2: u64,
    /// Bucket number for two level aggregation, `-1` otherwise.
    pub bucket_num: i32,
    end: u64,
}

impl Default for BlockInfo {
    fn default() -> Self {
        Self { field1: 1, is_overflows: false, field2: 2, bucket_num: -1, end: 0 }
    }
}

impl BlockInfo {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_uvarint(self.field1);
        buf.put_bool(self.is_overflows);
        buf.put_uvarint(self.field2);
        buf.put_i32_le(self.bucket_num);
        buf.put_uvarint(self.end);
    }

    fn decode<R: Read>(read: &mut R) -> Result<Self, ProtocolError> {
        Ok(Self {
            field1: read.get_uvarint()?,
            is_overflows: read.get_bool()?,
            field2: read.get_uvarint()?,
            bucket_num: read.get_i32_le()?,
            end: read.get_uvarint()?,
        })
    }
}

struct Entry {
    name: String,
    data: Box<dyn Column>,
}

/// A set of named columns with equal number of rows.
#[derive(Default)]
pub struct Block {
    info: BlockInfo,
    columns: Vec<Entry>,
}

impl Block {
    /// Create empty block without any column.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an empty column parsed from `ty`.
    pub fn add_column(&mut self, name: impl Into<String>, ty: &str) -> Result<&mut Self, ProtocolError> {
        let data = new_column(ty)?;
        self.columns.push(Entry { name: name.into(), data });
        Ok(self)
    }

    pub fn info(&self) -> &BlockInfo {
        &self.info
    }

    /// Number of rows, taken from the first column.
    pub fn rows(&self) -> usize {
        self.columns.first().map(|c| c.data.rows()).unwrap_or(0)
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if block contains no rows.
    ///
    /// Schema only blocks, like the header of an insert, are empty.
    pub fn is_empty(&self) -> bool {
        self.rows() == 0
    }

    /// Iterate over column names and data.
    pub fn columns(&self) -> impl ExactSizeIterator<Item = (&str, &dyn Column)> {
        self.columns.iter().map(|c| (c.name.as_str(), &*c.data))
    }

    pub fn column(&self, index: usize) -> Option<&dyn Column> {
        self.columns.get(index).map(|c| &*c.data)
    }

    pub fn column_name(&self, index: usize) -> Option<&str> {
        self.columns.get(index).map(|c| c.name.as_str())
    }

    /// Append a value into column at `index`, annotating error with the column.
    pub(crate) fn append_at(&mut self, index: usize, value: Value) -> Result<(), BlockError> {
        let Some(entry) = self.columns.get_mut(index) else {
            return Err(BlockError::ArgumentCount { expected: self.columns.len(), found: index + 1 });
        };
        entry.data.append(value).map_err(|source| BlockError::Column {
            column: entry.name.clone(),
            ty: entry.data.type_name().to_owned(),
            source,
        })
    }

    /// Append one row, one value per column.
    ///
    /// On error, the block is left as before.
    pub fn append_row<I>(&mut self, values: I) -> Result<(), BlockError>
    where
        I: IntoIterator<Item = Value>,
        I::IntoIter: ExactSizeIterator,
    {
        let values = values.into_iter();
        if values.len() != self.columns.len() {
            return Err(BlockError::ArgumentCount { expected: self.columns.len(), found: values.len() });
        }

        let rows: Vec<usize> = self.columns.iter().map(|c| c.data.rows()).collect();
        for (i, value) in values.enumerate() {
            if let Err(err) = self.append_at(i, value) {
                for (c, &rows) in self.columns[..i].iter_mut().zip(&rows) {
                    c.data.truncate(rows);
                }
                return Err(err);
            }
        }
        Ok(())
    }

    /// Materialize one row.
    pub fn row(&self, index: usize) -> Option<Vec<Value>> {
        if index >= self.rows() {
            return None;
        }
        Some(self.columns.iter().map(|c| c.data.value(index)).collect())
    }

    /// Remove all rows, keeping the columns.
    pub fn reset(&mut self) {
        for c in &mut self.columns {
            c.data.reset();
        }
    }

    /// Check that every column holds the same number of rows.
    pub fn validate(&self) -> Result<usize, BlockError> {
        let rows = self.rows();
        for c in &self.columns {
            if c.data.rows() != rows {
                return Err(BlockError::RowMismatch {
                    column: c.name.clone(),
                    expected: rows,
                    found: c.data.rows(),
                });
            }
        }
        Ok(rows)
    }

    /// Write the block in wire format.
    ///
    /// Nothing is written when the block fails validation.
    pub fn encode(&self, buf: &mut BytesMut, revision: u64) -> Result<(), BlockError> {
        let rows = self.validate()?;

        if revision > 0 {
            self.info.encode(buf);
        }

        buf.put_uvarint(self.columns.len() as u64);
        buf.put_uvarint(rows as u64);

        for c in &self.columns {
            buf.put_string(&c.name);
            buf.put_string(c.data.type_name());
            if revision >= revision::CUSTOM_SERIALIZATION {
                buf.put_bool(false);
            }
            if rows != 0 {
                c.data.encode(buf);
            }
        }

        Ok(())
    }

    /// Read a block in wire format.
    pub fn decode<R: Read>(read: &mut R, revision: u64) -> Result<Block, ProtocolError> {
        let info = match revision {
            0 => BlockInfo::default(),
            _ => BlockInfo::decode(read)?,
        };

        let len = read.get_uvarint()?;
        let rows = read.get_uvarint()?;

        if rows > MAX_ROWS {
            return Err(ProtocolError::TooManyRows(rows));
        }
        if len > MAX_COLUMNS {
            return Err(ProtocolError::InvalidValue("too many columns"));
        }

        let mut columns = Vec::with_capacity(len as usize);
        for _ in 0..len {
            let name = read.get_string()?;
            let ty = read.get_string()?;

            if revision >= revision::CUSTOM_SERIALIZATION && read.get_bool()? {
                return Err(ProtocolError::CustomSerialization(name));
            }

            let mut data = new_column(&ty)?;
            if rows != 0 {
                data.decode(&mut *read, rows as usize)?;
            }
            columns.push(Entry { name, data });
        }

        Ok(Block { info, columns })
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("Block");
        dbg.field("rows", &self.rows());
        for c in &self.columns {
            dbg.field(&c.name, &c.data.type_name());
        }
        dbg.finish()
    }
}

/// An error when filling block with values.
#[derive(Clone, PartialEq)]
pub enum BlockError {
    /// Columns hold different number of rows.
    RowMismatch {
        column: String,
        expected: usize,
        found: usize,
    },
    /// Number of values does not match number of columns.
    ArgumentCount {
        expected: usize,
        found: usize,
    },
    /// Value rejected by a column.
    Column {
        column: String,
        ty: String,
        source: ValueError,
    },
}

impl std::error::Error for BlockError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Column { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl fmt::Display for BlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RowMismatch { column, expected, found } => write!(
                f,
                "column {column:?} has {found} rows, expected {expected}"
            ),
            Self::ArgumentCount { expected, found } => {
                write!(f, "expected {expected} values, found {found}")
            },
            Self::Column { column, ty, source } => {
                write!(f, "column {column:?} ({ty}): {source}")
            },
        }
    }
}

impl fmt::Debug for BlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
