//! Buffered native protocol stream.
use bytes::{Buf, BufMut, BytesMut};
use std::{
    io,
    pin::Pin,
    task::{Context, Poll, ready},
    time::Duration,
};
use tokio::{
    io::{AsyncRead, AsyncWrite, ReadBuf},
    time::Instant,
};

use crate::{
    Block, Result,
    common::verbose,
    compress::{self, Method},
    ext::BufMutExt,
    net::Socket,
    protocol::{self, ClientProtocol, ServerPacket, client::Addendum, revision, tag},
    transport::Transport,
};

const DEFAULT_BUF_CAPACITY: usize = 4 * 1024;

/// Buffered connection to the server.
#[derive(Debug)]
pub struct Stream {
    socket: Socket,
    read_buf: BytesMut,
    write_buf: BytesMut,
    /// Block scratch before compression.
    plain_buf: BytesMut,

    revision: u64,
    compression: Option<Method>,

    /// Buffered length required before decoding is retried.
    want: usize,
    /// Whether bytes arrived since the last incomplete decode.
    fresh: bool,

    read_timeout: Duration,
    deadline: Option<Instant>,
}

impl Stream {
    pub fn new(socket: Socket) -> Self {
        Self {
            socket,
            read_buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
            write_buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
            plain_buf: BytesMut::new(),
            revision: revision::CLIENT,
            compression: None,
            want: 1,
            fresh: false,
            read_timeout: Duration::from_secs(300),
            deadline: None,
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) fn set_revision(&mut self, revision: u64) {
        self.revision = revision;
    }

    pub fn compression(&self) -> Option<Method> {
        self.compression
    }

    pub(crate) fn set_compression(&mut self, compression: Option<Method>) {
        self.compression = compression;
    }

    pub(crate) fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }

    /// Fixed deadline for every read, until cleared with `None`.
    pub(crate) fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }

    /// Shutdown the write half of the socket.
    pub(crate) fn poll_shutdown(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        Pin::new(&mut self.socket).poll_shutdown(cx)
    }

    fn context(&self) -> protocol::Context {
        protocol::Context { revision: self.revision, compressed: self.compression.is_some() }
    }

    fn poll_read_socket(&mut self, cx: &mut Context) -> Poll<io::Result<usize>> {
        self.read_buf.reserve(DEFAULT_BUF_CAPACITY.max(self.want.saturating_sub(self.read_buf.len())));

        let n = {
            let dst = self.read_buf.chunk_mut();
            let dst = unsafe { dst.as_uninit_slice_mut() };
            let mut buf = ReadBuf::uninit(dst);
            let ptr = buf.filled().as_ptr();
            ready!(Pin::new(&mut self.socket).poll_read(cx, &mut buf)?);

            // Ensure the pointer does not change from under us
            assert_eq!(ptr, buf.filled().as_ptr());
            buf.filled().len()
        };

        // Safety: This is guaranteed to be the number of initialized (and read)
        // bytes due to the invariants provided by `ReadBuf::filled`.
        unsafe {
            self.read_buf.advance_mut(n);
        }

        Poll::Ready(Ok(n))
    }
}

impl Transport for Stream {
    fn poll_flush(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        while !self.write_buf.is_empty() {
            let n = ready!(Pin::new(&mut self.socket).poll_write(cx, &self.write_buf)?);
            if n == 0 {
                return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
            }
            self.write_buf.advance(n);
        }
        Pin::new(&mut self.socket).poll_flush(cx)
    }

    fn poll_recv(&mut self, cx: &mut Context) -> Poll<Result<ServerPacket>> {
        loop {
            if self.read_buf.len() >= self.want {
                let len = self.read_buf.len();
                let mut read = &self.read_buf[..];

                match ServerPacket::decode(&mut read, self.context()) {
                    Ok(packet) => {
                        let used = len - read.len();
                        self.read_buf.advance(used);
                        self.want = 1;

                        verbose!(packet = protocol::server::packet_name(packet.tag()), used, "recv");

                        return match packet {
                            ServerPacket::Exception(e) => Poll::Ready(Err(e.into())),
                            packet => Poll::Ready(Ok(packet)),
                        };
                    },
                    Err(err) if err.is_incomplete() => {
                        self.want = len.saturating_mul(2).max(len + 1);
                        self.fresh = false;
                    },
                    Err(err) => return Poll::Ready(Err(err.into())),
                }
            }

            match self.poll_read_socket(cx) {
                Poll::Ready(Ok(0)) => {
                    return Poll::Ready(Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()));
                },
                Poll::Ready(Ok(_)) => self.fresh = true,
                Poll::Ready(Err(err)) => return Poll::Ready(Err(err.into())),
                // nothing more for now, retry with what we have
                Poll::Pending if self.fresh => {
                    self.want = 1;
                    self.fresh = false;
                },
                Poll::Pending => return Poll::Pending,
            }
        }
    }

    fn send<P: ClientProtocol>(&mut self, packet: P) {
        self.write_buf.put_uvarint(P::TAG);
        packet.encode(self.revision, &mut self.write_buf);
    }

    fn send_addendum(&mut self, addendum: Addendum) {
        addendum.encode(&mut self.write_buf);
    }

    fn send_data(&mut self, table: &str, block: &Block) -> Result<()> {
        block.validate()?;

        match self.compression {
            None => {
                self.write_buf.put_uvarint(tag::DATA);
                self.write_buf.put_string(table);
                block.encode(&mut self.write_buf, self.revision)?;
            },
            Some(method) => {
                self.plain_buf.clear();
                block.encode(&mut self.plain_buf, self.revision)?;

                let start = self.write_buf.len();
                self.write_buf.put_uvarint(tag::DATA);
                self.write_buf.put_string(table);
                if let Err(err) = compress::compress_into(method, &self.plain_buf, &mut self.write_buf) {
                    self.write_buf.truncate(start);
                    return Err(err.into());
                }
            },
        }

        verbose!(rows = block.rows(), "send data");
        Ok(())
    }

    fn deadline(&self) -> Instant {
        self.deadline.unwrap_or_else(|| Instant::now() + self.read_timeout)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Value, transport::TransportExt};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn split_packet_across_reads() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut stream = Stream::new(Socket::new(client));

        let mut block = Block::new();
        block.add_column("s", "String").unwrap();
        for _ in 0..20 {
            block.append_row([Value::String("0123456789".into())]).unwrap();
        }

        let mut buf = BytesMut::new();
        buf.put_uvarint(1);
        buf.put_string("");
        block.encode(&mut buf, revision::CLIENT).unwrap();
        buf.put_uvarint(5);

        let writer = tokio::spawn(async move {
            for chunk in buf.chunks(7) {
                server.write_all(chunk).await.unwrap();
                tokio::task::yield_now().await;
            }
            server
        });

        let ServerPacket::Data(data) = stream.recv().await.unwrap() else {
            panic!("expected data")
        };
        assert_eq!(data.rows(), 20);
        assert!(matches!(stream.recv().await.unwrap(), ServerPacket::EndOfStream));
        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn eof_is_io_error() {
        let (client, server) = tokio::io::duplex(64);
        let mut stream = Stream::new(Socket::new(client));
        drop(server);

        let err = stream.recv().await.unwrap_err();
        assert!(matches!(err.kind(), crate::error::ErrorKind::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }

    #[tokio::test]
    async fn compressed_send() {
        let (client, mut server) = tokio::io::duplex(1024);
        let mut stream = Stream::new(Socket::new(client));
        stream.set_compression(Some(Method::Lz4));

        let mut block = Block::new();
        block.add_column("n", "UInt8").unwrap();
        block.append_row([Value::UInt8(1)]).unwrap();
        stream.send_data("", &block).unwrap();
        stream.flush().await.unwrap();
        drop(stream);

        let mut raw = vec![];
        server.read_to_end(&mut raw).await.unwrap();
        assert_eq!(raw[..2], [2, 0]);

        let mut frames = compress::Decompress::new(&raw[2..]);
        let decoded = Block::decode(&mut frames, revision::CLIENT).unwrap();
        assert!(frames.finish().unwrap().is_empty());
        assert_eq!(decoded.row(0), Some(vec![Value::UInt8(1)]));
    }

    #[tokio::test(start_paused = true)]
    async fn read_deadline() {
        let (client, _server) = tokio::io::duplex(64);
        let mut stream = Stream::new(Socket::new(client));
        stream.set_read_timeout(Duration::from_secs(5));

        let err = stream.recv().await.unwrap_err();
        assert!(err.is_timeout());
    }
}
