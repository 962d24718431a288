//! Batch insert.
use std::{borrow::Cow, fmt, ops::DerefMut};

use crate::{
    Block, Connection, Result,
    block::BlockError,
    common::{debug, unit_error, verbose},
    encode::{Encode, EncodeRow},
    executor::Executor,
    phase,
    protocol::{ProtocolError, server::tag},
    query::{QueryOptions, QueryResult},
    transport::{Transport, TransportExt},
};

/// Prepare an insert statement.
///
/// The statement is cut after its `VALUES` keyword, or suffixed with one.
/// The server replies with the table schema, which rows are appended into.
///
/// ```no_run
/// # async fn app(mut conn: kolom::Connection) -> kolom::Result<()> {
/// let mut batch = kolom::prepare_batch("INSERT INTO users (id, name)", &mut conn).await?;
/// batch.append((1u64, "alice"))?;
/// batch.append((2u64, "bob"))?;
/// batch.send().await?;
/// # Ok(())
/// # }
/// ```
pub async fn prepare_batch<SQL, Exe>(sql: SQL, exe: Exe) -> Result<Batch<Exe::Connection>>
where
    SQL: AsRef<str>,
    Exe: Executor,
{
    prepare_batch_with(sql, exe, QueryOptions::default()).await
}

/// Prepare an insert statement with [`QueryOptions`].
pub async fn prepare_batch_with<SQL, Exe>(
    sql: SQL,
    exe: Exe,
    options: QueryOptions,
) -> Result<Batch<Exe::Connection>>
where
    SQL: AsRef<str>,
    Exe: Executor,
{
    let sql = insert_statement(sql.as_ref());
    let mut conn = exe.connection().await?;
    conn.send_query(&sql, &options)?;

    let mut summary = QueryResult::default();
    let result = async {
        let stream = conn.stream_mut()?;
        stream.flush().await?;
        phase::first_block(stream, &options.handlers, &mut summary).await
    }
    .await;

    match result {
        Ok(Some(mut block)) => {
            block.reset();
            verbose!(columns = block.len(), "batch prepared");
            Ok(Batch { conn, block, options, summary, state: State::Open })
        },
        Ok(None) => Err(conn.fail(ProtocolError::unexpected(tag::END_OF_STREAM, "insert").into())),
        Err(err) => Err(conn.fail(err)),
    }
}

/// Cut the statement after `VALUES`, appending it when missing.
fn insert_statement(sql: &str) -> Cow<'_, str> {
    const VALUES: &str = "VALUES";

    let sql = sql.trim_end().trim_end_matches(';').trim_end();
    let upper = sql.to_ascii_uppercase();

    if let Some(idx) = upper.rfind(VALUES) {
        let end = idx + VALUES.len();
        let rest = sql[end..].trim_start();
        if rest.is_empty() || rest.starts_with('(') {
            return Cow::Borrowed(&sql[..end]);
        }
    }

    Cow::Owned(format!("{sql} {VALUES}"))
}

enum State {
    Open,
    /// The first append error, returned by every later operation.
    Failed(BlockError),
    Sent,
}

/// A pending insert.
///
/// Rows are accumulated into a block of the table schema, and sent with
/// [`flush`][Batch::flush] or [`send`][Batch::send]. Dropping the batch
/// before [`send`][Batch::send] closes the connection.
pub struct Batch<C: DerefMut<Target = Connection>> {
    conn: C,
    block: Block,
    options: QueryOptions,
    summary: QueryResult,
    state: State,
}

impl<C: DerefMut<Target = Connection>> Batch<C> {
    /// The pending block.
    pub fn block(&self) -> &Block {
        &self.block
    }

    /// Number of pending rows.
    pub fn rows(&self) -> usize {
        self.block.rows()
    }

    /// Returns `true` after [`send`][Batch::send].
    pub fn is_sent(&self) -> bool {
        matches!(self.state, State::Sent)
    }

    fn check(&self) -> Result<()> {
        match &self.state {
            State::Open => Ok(()),
            State::Failed(err) => Err(err.clone().into()),
            State::Sent => Err(AlreadySent.into()),
        }
    }

    fn latch(&mut self, err: BlockError) -> crate::Error {
        debug!("batch failed: {err}");
        self.state = State::Failed(err.clone());
        err.into()
    }

    /// Append one row, one value per column.
    ///
    /// The first error is kept, every later operation returns it.
    pub fn append(&mut self, row: impl EncodeRow) -> Result<()> {
        self.check()?;
        match self.block.append_row(row.encode_row()) {
            Ok(()) => Ok(()),
            Err(err) => Err(self.latch(err)),
        }
    }

    /// Column wise append.
    ///
    /// Every column should receive the same number of values before the
    /// batch is flushed.
    pub fn column(&mut self, index: usize) -> BatchColumn<'_, C> {
        BatchColumn { batch: self, index }
    }

    /// Check that every column holds the same number of rows.
    fn validate(&mut self) -> Result<()> {
        self.check()?;
        match self.block.validate() {
            Ok(_) => Ok(()),
            Err(err) => Err(self.latch(err)),
        }
    }

    /// Send pending rows without ending the insert.
    pub async fn flush(&mut self) -> Result<()> {
        self.validate()?;
        if self.block.is_empty() {
            return Ok(());
        }

        let Batch { conn, block, .. } = self;
        let result = async {
            let stream = conn.stream_mut()?;
            stream.send_data("", block)?;
            stream.flush().await
        }
        .await;

        match result {
            Ok(()) => {
                block.reset();
                Ok(())
            },
            Err(err) => Err(conn.fail(err)),
        }
    }

    /// Send pending rows and end the insert.
    ///
    /// A batch can only be sent once, the next call returns
    /// [`AlreadySent`] without any io.
    pub async fn send(&mut self) -> Result<QueryResult> {
        self.validate()?;
        self.state = State::Sent;

        let Batch { conn, block, options, summary, .. } = self;
        let result = async {
            let stream = conn.stream_mut()?;
            if !block.is_empty() {
                stream.send_data("", block)?;
            }
            stream.send_data("", &Block::new())?;
            stream.flush().await?;
            phase::process(stream, &options.handlers, summary, |_| Ok(())).await
        }
        .await;

        block.reset();
        conn.end(result)?;
        Ok(*summary)
    }

    /// Give up the insert, the connection is closed.
    pub async fn abort(mut self) -> Result<()> {
        self.state = State::Sent;
        self.conn.close().await
    }
}

impl<C: DerefMut<Target = Connection>> Drop for Batch<C> {
    fn drop(&mut self) {
        if !self.is_sent() {
            debug!("batch dropped before send");
            self.conn.mark_closed();
        }
    }
}

impl<C: DerefMut<Target = Connection>> fmt::Debug for Batch<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            State::Open => "Open",
            State::Failed(_) => "Failed",
            State::Sent => "Sent",
        };
        f.debug_struct("Batch")
            .field("block", &self.block)
            .field("state", &state)
            .finish()
    }
}

/// A column of [`Batch`], see [`Batch::column`].
pub struct BatchColumn<'a, C: DerefMut<Target = Connection>> {
    batch: &'a mut Batch<C>,
    index: usize,
}

impl<C: DerefMut<Target = Connection>> BatchColumn<'_, C> {
    /// Append a value into the column.
    pub fn append(&mut self, value: impl Encode) -> Result<()> {
        self.batch.check()?;
        match self.batch.block.append_at(self.index, value.encode()) {
            Ok(()) => Ok(()),
            Err(err) => Err(self.batch.latch(err)),
        }
    }

    /// Returns the column name.
    pub fn name(&self) -> Option<&str> {
        self.batch.block.column_name(self.index)
    }
}

impl<C: DerefMut<Target = Connection>> fmt::Debug for BatchColumn<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchColumn").field("index", &self.index).finish()
    }
}

unit_error! {
    /// Batch has already been sent.
    pub struct AlreadySent("batch already sent");
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn statement() {
        assert_eq!(insert_statement("INSERT INTO t"), "INSERT INTO t VALUES");
        assert_eq!(insert_statement("insert into t values (?, ?)"), "insert into t values");
        assert_eq!(insert_statement("INSERT INTO t VALUES(1)"), "INSERT INTO t VALUES");
        assert_eq!(insert_statement("INSERT INTO t (a, b) VALUES;"), "INSERT INTO t (a, b) VALUES");
        // a column named like the keyword
        assert_eq!(
            insert_statement("INSERT INTO t (values_count)"),
            "INSERT INTO t (values_count) VALUES",
        );
    }
}
