//! Query API types.
use std::{
    marker::PhantomData,
    mem,
    ops::DerefMut,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use crate::{
    Connection, Result,
    executor::Executor,
    fetch::Rows,
    phase::{self, Step},
    protocol::server::{ProfileInfo, Progress},
    row::{FromRow, Row, RowNotFound},
    stream::Stream,
    transport::{Deadline, Transport, TransportExt},
};

mod options;

pub use options::{ExternalTable, Handlers, QueryOptions};

/// Entrypoint of the query API.
pub fn query<SQL, Exe, R>(sql: SQL, exe: Exe) -> Query<SQL, Exe, R> {
    Query { sql, exe, options: QueryOptions::default(), _p: PhantomData }
}

/// Same as [`query`] with [`Row`] as the output.
pub fn query_row<SQL, Exe>(sql: SQL, exe: Exe) -> Query<SQL, Exe, Row> {
    query(sql, exe)
}

/// Same as [`query`] with [`Row`] as the output, mostly to be awaited directly.
pub fn execute<SQL, Exe>(sql: SQL, exe: Exe) -> Query<SQL, Exe, Row> {
    query(sql, exe)
}

/// The query API.
#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Query<SQL, Exe, R> {
    sql: SQL,
    exe: Exe,
    options: QueryOptions,
    _p: PhantomData<fn() -> R>,
}

impl<SQL, Exe, R> Query<SQL, Exe, R> {
    /// Replace all options.
    pub fn options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    /// Bind a server side parameter, referenced as `{key:Type}`.
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.options = self.options.param(key, value);
        self
    }

    /// Add a query setting.
    pub fn setting(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.options = self.options.setting(key, value);
        self
    }

    pub fn query_id(mut self, id: impl Into<String>) -> Self {
        self.options = self.options.query_id(id);
        self
    }

    /// Fail with timeout error if the query does not complete in time.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options = self.options.timeout(timeout);
        self
    }

    pub fn on_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(&Progress) + Send + Sync + 'static,
    {
        self.options = self.options.on_progress(f);
        self
    }
}

impl<SQL, Exe, R> Query<SQL, Exe, R>
where
    SQL: AsRef<str>,
    Exe: Executor,
    R: FromRow,
{
    /// Fetch rows using [`Stream`][futures_core::Stream] api.
    ///
    /// The first block is read before returning, the rest is read by a
    /// spawned task. Dropping [`Rows`] before it ends closes the connection.
    pub async fn fetch(self) -> Result<Rows<Exe::Connection, R>> {
        let Query { sql, exe, options, .. } = self;
        let mut conn = exe.connection().await?;
        conn.send_query(sql.as_ref(), &options)?;

        let mut summary = QueryResult::default();
        let result = async {
            let stream = conn.stream_mut()?;
            stream.flush().await?;
            phase::first_block(stream, &options.handlers, &mut summary).await
        }
        .await;

        match result {
            Ok(Some(block)) => Rows::spawn(conn, block, options.handlers, summary),
            Ok(None) => {
                conn.finish();
                Ok(Rows::empty(conn, summary))
            },
            Err(err) => Err(conn.fail(err)),
        }
    }

    /// Fetch all rows into [`Vec`].
    pub async fn fetch_all(self) -> Result<Vec<R>> {
        let mut rows = self.fetch().await?;
        let mut output = vec![];
        let mut error = None;

        while let Some(row) = rows.next().await {
            match row {
                Ok(row) => output.push(row),
                Err(err) if err.is_fatal() => return Err(err),
                // keep reading so the connection stays usable
                Err(err) => {
                    error.get_or_insert(err);
                },
            }
        }

        match error {
            Some(err) => Err(err),
            None => Ok(output),
        }
    }

    /// Fetch one row, the rest is discarded.
    pub async fn fetch_one(self) -> Result<R> {
        match self.fetch_optional().await? {
            Some(row) => Ok(row),
            None => Err(RowNotFound.into()),
        }
    }

    /// Optionally fetch one row, the rest is discarded.
    pub async fn fetch_optional(self) -> Result<Option<R>> {
        let mut rows = self.fetch().await?;
        let row = rows.next().await.transpose();
        let summary = rows.finish().await;
        let row = row?;
        summary?;
        Ok(row)
    }
}

impl<SQL, Exe, R> Query<SQL, Exe, R>
where
    SQL: AsRef<str>,
    Exe: Executor,
{
    /// Execute the query, discarding any returned data.
    pub fn execute(self) -> Execute<SQL, Exe> {
        Execute {
            sql: self.sql,
            options: self.options,
            phase: Phase::Connect(self.exe.connection()),
            summary: QueryResult::default(),
            deadline: Deadline::new(),
        }
    }
}

impl<SQL, Exe, R> IntoFuture for Query<SQL, Exe, R>
where
    SQL: AsRef<str>,
    Exe: Executor,
{
    type Output = Result<QueryResult>;

    type IntoFuture = Execute<SQL, Exe>;

    fn into_future(self) -> Self::IntoFuture {
        self.execute()
    }
}

/// Counters collected while a query runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct QueryResult {
    pub(crate) progress: Progress,
    pub(crate) profile_info: Option<ProfileInfo>,
    pub(crate) blocks: u64,
    pub(crate) rows: u64,
}

impl QueryResult {
    /// Sum of every progress packet.
    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    pub fn profile_info(&self) -> Option<&ProfileInfo> {
        self.profile_info.as_ref()
    }

    /// Number of data, totals and extremes blocks received.
    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    /// Number of rows received.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Number of rows written, as reported by the server.
    pub fn rows_written(&self) -> u64 {
        self.progress.wrote_rows
    }
}

pin_project_lite::pin_project! {
    /// Future returned from [`Query::execute`].
    #[must_use = "futures do nothing unless you `.await` or poll them"]
    pub struct Execute<SQL, Exe>
    where
        Exe: Executor,
    {
        sql: SQL,
        options: QueryOptions,
        phase: Phase<Exe::Future, Exe::Connection>,
        summary: QueryResult,
        #[pin]
        deadline: Deadline,
    }
}

enum Phase<F, C> {
    Connect(F),
    Flush(C),
    Recv(C),
    Complete,
}

/// Poll the stream of a querying connection under `deadline`.
fn poll_stream<C, T, F>(conn: &mut C, deadline: Pin<&mut Deadline>, cx: &mut Context, f: F) -> Poll<Result<T>>
where
    C: DerefMut<Target = Connection>,
    F: FnOnce(&mut Stream, &mut Context) -> Poll<Result<T>>,
{
    match conn.stream_mut() {
        Ok(stream) => deadline.poll_io(stream, cx, f),
        Err(err) => Poll::Ready(Err(err)),
    }
}

impl<SQL, Exe> Future for Execute<SQL, Exe>
where
    SQL: AsRef<str>,
    Exe: Executor,
{
    type Output = Result<QueryResult>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut me = self.project();

        loop {
            match mem::replace(me.phase, Phase::Complete) {
                Phase::Connect(mut f) => {
                    let mut conn = match Pin::new(&mut f).poll(cx) {
                        Poll::Ready(result) => result?,
                        Poll::Pending => {
                            *me.phase = Phase::Connect(f);
                            return Poll::Pending;
                        },
                    };
                    conn.send_query(me.sql.as_ref(), me.options)?;
                    *me.phase = Phase::Flush(conn);
                },
                Phase::Flush(mut conn) => {
                    let poll = poll_stream(&mut conn, me.deadline.as_mut(), cx, |io, cx| {
                        io.poll_flush(cx).map_err(Into::into)
                    });
                    match poll {
                        Poll::Ready(Ok(())) => *me.phase = Phase::Recv(conn),
                        Poll::Ready(Err(err)) => return Poll::Ready(Err(conn.fail(err))),
                        Poll::Pending => {
                            *me.phase = Phase::Flush(conn);
                            return Poll::Pending;
                        },
                    }
                },
                Phase::Recv(mut conn) => {
                    let poll = poll_stream(&mut conn, me.deadline.as_mut(), cx, |io, cx| io.poll_recv(cx));
                    let packet = match poll {
                        Poll::Ready(Ok(packet)) => packet,
                        Poll::Ready(Err(err)) => return Poll::Ready(Err(conn.fail(err))),
                        Poll::Pending => {
                            *me.phase = Phase::Recv(conn);
                            return Poll::Pending;
                        },
                    };
                    match phase::dispatch(packet, &me.options.handlers, me.summary) {
                        Ok(Step::End) => {
                            conn.finish();
                            return Poll::Ready(Ok(mem::take(me.summary)));
                        },
                        Ok(_) => *me.phase = Phase::Recv(conn),
                        Err(err) => return Poll::Ready(Err(conn.fail(err))),
                    }
                },
                Phase::Complete => panic!("`Execute` polled after completion"),
            }
        }
    }
}
