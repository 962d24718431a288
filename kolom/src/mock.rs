//! Scripted in memory server.
//!
//! The whole script is written upfront, while everything the client sends is
//! collected until the client hangs up.
use bytes::{BufMut, BytesMut};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    task::JoinHandle,
};

use crate::{
    Block, Config, Connection, ErrorKind, Value,
    ext::BufMutExt,
    net::Socket,
    protocol::{revision, server::tag},
};

pub(crate) struct Script {
    buf: BytesMut,
    revision: u64,
}

impl Script {
    /// Start with the server hello.
    pub(crate) fn new(server_revision: u64) -> Self {
        let revision = server_revision.min(revision::CLIENT);
        let mut buf = BytesMut::new();
        buf.put_uvarint(tag::HELLO);
        buf.put_string("mock");
        buf.put_uvarint(24);
        buf.put_uvarint(3);
        buf.put_uvarint(server_revision);
        if revision >= revision::SERVER_TIMEZONE {
            buf.put_string("UTC");
        }
        if revision >= revision::SERVER_DISPLAY_NAME {
            buf.put_string("mock-1");
        }
        if revision >= revision::VERSION_PATCH {
            buf.put_uvarint(1);
        }
        Self { buf, revision }
    }

    pub(crate) fn data(mut self, block: &Block) -> Self {
        self.buf.put_uvarint(tag::DATA);
        self.buf.put_string("");
        block.encode(&mut self.buf, self.revision).unwrap();
        self
    }

    pub(crate) fn progress(mut self, rows: u64, wrote_rows: u64) -> Self {
        self.buf.put_uvarint(tag::PROGRESS);
        self.buf.put_uvarint(rows);
        self.buf.put_uvarint(rows * 8);
        self.buf.put_uvarint(0);
        if self.revision >= revision::CLIENT_WRITE_INFO {
            self.buf.put_uvarint(wrote_rows);
            self.buf.put_uvarint(wrote_rows * 8);
        }
        if self.revision >= revision::SERVER_QUERY_TIME_IN_PROGRESS {
            self.buf.put_uvarint(1_000);
        }
        self
    }

    pub(crate) fn exception(mut self, code: i32, message: &str) -> Self {
        self.buf.put_uvarint(tag::EXCEPTION);
        self.buf.put_i32_le(code);
        self.buf.put_string("DB::Exception");
        self.buf.put_string(message);
        self.buf.put_string("");
        self.buf.put_bool(false);
        self
    }

    pub(crate) fn pong(mut self) -> Self {
        self.buf.put_uvarint(tag::PONG);
        self
    }

    pub(crate) fn end(mut self) -> Self {
        self.buf.put_uvarint(tag::END_OF_STREAM);
        self
    }

    /// Spawn the server and connect to it.
    ///
    /// The handle resolves to every byte the client sent.
    pub(crate) async fn connect(self) -> (Connection, JoinHandle<Vec<u8>>) {
        let (client, mut server) = tokio::io::duplex(1 << 16);

        let handle = tokio::spawn(async move {
            server.write_all(&self.buf).await.unwrap();
            let mut received = vec![];
            let _ = server.read_to_end(&mut received).await;
            received
        });

        let conn = Connection::connect_with_socket(Socket::new(client), Config::default())
            .await
            .unwrap();
        (conn, handle)
    }
}

fn block(name: &str, ty: &str, values: impl IntoIterator<Item = Value>) -> Block {
    let mut block = Block::new();
    block.add_column(name, ty).unwrap();
    for value in values {
        block.append_row([value]).unwrap();
    }
    block
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::{
        QueryOptions, connection::State, prepare_batch, protocol::server::Progress,
        query::query,
    };

    /// Data packet as the client writes it, uncompressed.
    fn data_packet(buf: &mut BytesMut, table: &str, block: &Block, revision: u64) {
        buf.put_uvarint(crate::protocol::tag::DATA);
        buf.put_string(table);
        block.encode(buf, revision).unwrap();
    }

    #[tokio::test]
    async fn handshake_downgrade() {
        let (conn, _) = Script::new(54400).connect().await;
        assert_eq!(conn.revision(), 54400);
        assert_eq!(conn.server().name, "mock");
        assert_eq!(conn.server().display_name.as_deref(), Some("mock-1"));
        assert_eq!(conn.state(), State::Ready);

        let (conn, _) = Script::new(revision::CLIENT + 100).connect().await;
        assert_eq!(conn.revision(), revision::CLIENT);
    }

    #[tokio::test]
    async fn downgraded_revision_codecs() {
        const OLD: u64 = 54400;
        assert!(OLD < revision::CLIENT_WRITE_INFO && OLD < revision::CUSTOM_SERIALIZATION);

        // the script writes progress and blocks in the old layout
        let (mut conn, server) = Script::new(OLD)
            .data(&block("n", "UInt64", []))
            .data(&block("n", "UInt64", [Value::UInt64(4), Value::UInt64(2)]))
            .progress(2, 9)
            .end()
            .connect()
            .await;

        let seen = Arc::new(Mutex::new(Vec::<Progress>::new()));
        let progress = seen.clone();
        let options = QueryOptions::new()
            .external_table("ext", block("x", "UInt8", [Value::UInt8(7)]))
            .on_progress(move |p| progress.lock().unwrap().push(*p));

        let rows = query::<_, _, (u64,)>("SELECT n FROM t WHERE n IN ext", &mut conn)
            .options(options)
            .fetch_all()
            .await
            .unwrap();

        assert_eq!(rows, [(4,), (2,)]);
        assert_eq!(*seen.lock().unwrap(), [Progress {
            rows: 2,
            bytes: 16,
            total_rows: 0,
            wrote_rows: 0,
            wrote_bytes: 0,
            elapsed_ns: 0,
        }]);
        assert_eq!(conn.state(), State::Ready);

        // blocks sent by the client carry no custom serialization flag
        let mut ext = BytesMut::new();
        data_packet(&mut ext, "ext", &block("x", "UInt8", [Value::UInt8(7)]), OLD);
        let mut flagged = BytesMut::new();
        data_packet(&mut flagged, "ext", &block("x", "UInt8", [Value::UInt8(7)]), revision::CLIENT);
        assert_eq!(flagged.len(), ext.len() + 1);

        let mut tail = ext;
        data_packet(&mut tail, "", &Block::new(), OLD);

        drop(conn);
        let received = server.await.unwrap();
        assert!(received.ends_with(&tail));
    }

    #[tokio::test]
    async fn three_block_stream() {
        let header = block("n", "UInt64", []);
        let mut script = Script::new(revision::CLIENT).data(&header);
        for n in 0..3 {
            script = script.data(&block("n", "UInt64", [Value::UInt64(n)]));
        }
        let (mut conn, _) = script.progress(3, 0).end().connect().await;

        let rows = query::<_, _, (u64,)>("SELECT number AS n FROM numbers(3)", &mut conn)
            .fetch_all()
            .await
            .unwrap();

        assert_eq!(rows, [(0,), (1,), (2,)]);
        assert_eq!(conn.state(), State::Ready);
    }

    #[tokio::test]
    async fn mid_stream_exception() {
        let (mut conn, _) = Script::new(revision::CLIENT)
            .data(&block("n", "UInt64", []))
            .data(&block("n", "UInt64", [Value::UInt64(1)]))
            .exception(241, "Memory limit exceeded")
            .connect()
            .await;

        let err = query::<_, _, (u64,)>("SELECT n", &mut conn).fetch_all().await.unwrap_err();
        assert_eq!(err.as_exception().map(|e| e.code), Some(241));
        assert!(err.is_fatal());
        assert!(conn.is_closed());

        let err = conn.ping().await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ConnectionClosed(_)));
    }

    #[tokio::test]
    async fn ping() {
        let (mut conn, _) = Script::new(revision::CLIENT)
            .progress(0, 0)
            .pong()
            .pong()
            .connect()
            .await;

        conn.ping().await.unwrap();
        conn.ping().await.unwrap();
        assert_eq!(conn.state(), State::Ready);
    }

    #[tokio::test]
    async fn execute_collects_progress() {
        let (mut conn, _) = Script::new(revision::CLIENT)
            .progress(2, 0)
            .progress(3, 5)
            .end()
            .connect()
            .await;

        let result = crate::execute("INSERT INTO t SELECT * FROM s", &mut conn).await.unwrap();
        assert_eq!(result.progress().rows, 5);
        assert_eq!(result.rows_written(), 5);
        assert_eq!(result.blocks(), 0);
        assert_eq!(conn.state(), State::Ready);
    }

    #[tokio::test]
    async fn dropped_rows_cancel_query() {
        let (mut conn, server) = Script::new(revision::CLIENT)
            .data(&block("n", "UInt64", []))
            .data(&block("n", "UInt64", [Value::UInt64(1)]))
            .data(&block("n", "UInt64", [Value::UInt64(2)]))
            .connect()
            .await;

        let mut rows = query::<_, _, (u64,)>("SELECT n", &mut conn).fetch().await.unwrap();
        assert_eq!(rows.next().await.unwrap().unwrap(), (1,));
        drop(rows);

        assert!(conn.is_closed());

        // the forwarding task cancels, then hangs up
        let received = server.await.unwrap();
        assert_eq!(received.last().copied(), Some(crate::protocol::tag::CANCEL as u8));
    }

    #[tokio::test]
    async fn batch_send_once() {
        let mut schema = Block::new();
        schema.add_column("id", "UInt64").unwrap();
        schema.add_column("name", "String").unwrap();

        let (mut conn, server) = Script::new(revision::CLIENT).data(&schema).end().connect().await;

        let mut batch = prepare_batch("INSERT INTO users", &mut conn).await.unwrap();
        batch.append((1u64, "alice")).unwrap();
        batch.column(0).append(2u64).unwrap();
        batch.column(1).append("bob").unwrap();
        assert_eq!(batch.rows(), 2);

        batch.send().await.unwrap();
        let err = batch.send().await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::AlreadySent(_)));
        assert!(batch.is_sent());
        drop(batch);

        assert_eq!(conn.state(), State::Ready);

        let mut rows = Block::new();
        rows.add_column("id", "UInt64").unwrap();
        rows.add_column("name", "String").unwrap();
        rows.append_row([Value::UInt64(1), Value::String("alice".into())]).unwrap();
        rows.append_row([Value::UInt64(2), Value::String("bob".into())]).unwrap();

        // the rows, one terminator, then nothing from the second send
        let mut tail = BytesMut::new();
        data_packet(&mut tail, "", &rows, revision::CLIENT);
        data_packet(&mut tail, "", &Block::new(), revision::CLIENT);

        drop(conn);
        let received = server.await.unwrap();
        assert!(received.ends_with(&tail));
    }

    #[tokio::test]
    async fn batch_error_is_latched() {
        let mut schema = Block::new();
        schema.add_column("id", "UInt8").unwrap();

        let (mut conn, _) = Script::new(revision::CLIENT).data(&schema).connect().await;

        let mut batch = prepare_batch("INSERT INTO t VALUES (?)", &mut conn).await.unwrap();
        let first = batch.append((300u32,)).unwrap_err();
        assert!(matches!(first.kind(), ErrorKind::Block(_)));

        let later = batch.append((1u8,)).unwrap_err();
        assert_eq!(later.kind().to_string(), first.kind().to_string());
        let sent = batch.send().await.unwrap_err();
        assert_eq!(sent.kind().to_string(), first.kind().to_string());
        assert_eq!(batch.rows(), 0);

        // the insert is left open
        drop(batch);
        assert!(conn.is_closed());
    }
}
