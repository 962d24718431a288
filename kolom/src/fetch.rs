//! Streaming result rows.
use std::{
    future::poll_fn,
    marker::PhantomData,
    ops::DerefMut,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, ready},
};
use tokio::sync::{mpsc, oneshot};

use crate::{
    Block, Connection, Result,
    common::{debug, verbose},
    connection::ConnectionClosed,
    phase::{self, Step},
    protocol::client::Cancel,
    query::{Handlers, QueryResult},
    row::{ColumnInfo, FromRow, Row},
    stream::Stream,
    transport::{Transport, TransportExt},
};

/// Terminal result of the forwarding task, with the stream to give back.
type Done = oneshot::Receiver<Result<(Stream, QueryResult)>>;

/// Rows of a running query.
///
/// Rows are pulled with [`Rows::next`] or through the
/// [`Stream`][futures_core::Stream] implementation. Blocks after the first
/// are read by a spawned task, and handed over with backpressure.
///
/// Dropping `Rows` before the end cancels the query, and the connection is
/// closed.
#[must_use = "streams do nothing unless polled"]
pub struct Rows<C, R>
where
    C: DerefMut<Target = Connection>,
{
    conn: C,
    columns: Arc<[ColumnInfo]>,
    block: Option<Block>,
    row: usize,
    forward: Option<Forward>,
    summary: QueryResult,
    _p: PhantomData<fn() -> R>,
}

struct Forward {
    blocks: mpsc::Receiver<Block>,
    done: Done,
}

impl<C, R> Rows<C, R>
where
    C: DerefMut<Target = Connection>,
{
    /// The stream ended with the first block.
    pub(crate) fn empty(conn: C, summary: QueryResult) -> Self {
        Self {
            conn,
            columns: Arc::from(Vec::new()),
            block: None,
            row: 0,
            forward: None,
            summary,
            _p: PhantomData,
        }
    }

    /// Move the stream into a forwarding task, reading blocks after `first`.
    pub(crate) fn spawn(mut conn: C, first: Block, handlers: Handlers, summary: QueryResult) -> Result<Self> {
        let Some(stream) = conn.take_stream() else {
            return Err(ConnectionClosed.into());
        };

        let (tx, blocks) = mpsc::channel(conn.block_buffer_size());
        let (done_tx, done) = oneshot::channel();

        tokio::spawn(forward(stream, handlers, summary, tx, done_tx));

        Ok(Self {
            conn,
            columns: ColumnInfo::from_block(&first),
            block: Some(first),
            row: 0,
            forward: Some(Forward { blocks, done }),
            summary,
            _p: PhantomData,
        })
    }

    /// Result columns, learned from the first block.
    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    /// Counters of the query, complete once the rows are exhausted.
    pub fn summary(&self) -> &QueryResult {
        &self.summary
    }

    /// Poll for the next block, `None` when the query is complete.
    fn poll_block(&mut self, cx: &mut Context) -> Poll<Option<Result<Block>>> {
        let Some(forward) = &mut self.forward else {
            return Poll::Ready(None);
        };

        if let Some(block) = ready!(forward.blocks.poll_recv(cx)) {
            return Poll::Ready(Some(Ok(block)));
        }

        // every block is consumed, the task reports its result last
        let result = ready!(Pin::new(&mut forward.done).poll(cx));
        self.forward = None;

        match result {
            Ok(Ok((stream, summary))) => {
                self.summary = summary;
                self.conn.restore_stream(stream);
                Poll::Ready(None)
            },
            Ok(Err(err)) => {
                self.conn.mark_closed();
                Poll::Ready(Some(Err(err)))
            },
            Err(_) => {
                self.conn.mark_closed();
                Poll::Ready(Some(Err(ConnectionClosed.into())))
            },
        }
    }

    /// Discard remaining rows, waiting for the query to complete.
    pub async fn finish(mut self) -> Result<QueryResult> {
        self.block = None;
        while let Some(block) = poll_fn(|cx| self.poll_block(cx)).await {
            block?;
        }
        Ok(self.summary)
    }
}

impl<C, R> Rows<C, R>
where
    C: DerefMut<Target = Connection>,
    R: FromRow,
{
    /// Fetch the next row.
    pub async fn next(&mut self) -> Option<Result<R>> {
        poll_fn(|cx| self.poll_row(cx)).await
    }

    fn poll_row(&mut self, cx: &mut Context) -> Poll<Option<Result<R>>> {
        loop {
            if let Some(block) = &self.block {
                if let Some(values) = block.row(self.row) {
                    self.row += 1;
                    let row = Row::new(self.columns.clone(), values);
                    return Poll::Ready(Some(R::from_row(row).map_err(Into::into)));
                }
            }

            self.block = None;
            self.row = 0;

            match ready!(self.poll_block(cx)) {
                Some(Ok(block)) => self.block = Some(block),
                Some(Err(err)) => return Poll::Ready(Some(Err(err))),
                None => return Poll::Ready(None),
            }
        }
    }
}

impl<C, R> futures_core::Stream for Rows<C, R>
where
    C: DerefMut<Target = Connection> + Unpin,
    R: FromRow,
{
    type Item = Result<R>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_row(cx)
    }
}

impl<C, R> Drop for Rows<C, R>
where
    C: DerefMut<Target = Connection>,
{
    fn drop(&mut self) {
        if self.forward.is_some() {
            debug!("rows dropped before the end of query");
            self.conn.mark_closed();
        }
    }
}

impl<C, R> std::fmt::Debug for Rows<C, R>
where
    C: DerefMut<Target = Connection>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rows")
            .field("columns", &self.columns)
            .field("streaming", &self.forward.is_some())
            .finish()
    }
}

/// Forward blocks until end of stream or until the receiver is dropped.
async fn forward(
    mut stream: Stream,
    handlers: Handlers,
    mut summary: QueryResult,
    tx: mpsc::Sender<Block>,
    done: oneshot::Sender<Result<(Stream, QueryResult)>>,
) {
    let result = tokio::select! {
        result = read_blocks(&mut stream, &handlers, &mut summary, &tx) => result,
        _ = tx.closed() => Ok(false),
    };

    match result {
        Ok(true) => {
            drop(tx);
            let _ = done.send(Ok((stream, summary)));
        },
        Ok(false) => {
            verbose!("query cancelled");
            stream.send(Cancel);
            let _ = stream.flush().await;
            let _ = poll_fn(|cx| stream.poll_shutdown(cx)).await;
        },
        Err(err) => {
            drop(tx);
            let _ = done.send(Err(err));
        },
    }
}

/// Returns `false` when the receiver is gone.
async fn read_blocks(
    stream: &mut Stream,
    handlers: &Handlers,
    summary: &mut QueryResult,
    tx: &mpsc::Sender<Block>,
) -> Result<bool> {
    loop {
        match phase::dispatch(stream.recv().await?, handlers, summary)? {
            Step::Data(block) => {
                if tx.send(block).await.is_err() {
                    return Ok(false);
                }
            },
            Step::Continue => { },
            Step::End => return Ok(true),
        }
    }
}
