//! The [`Transport`] trait.
use std::{
    io,
    pin::Pin,
    task::{Context, Poll, ready},
};
use tokio::time::{Instant, Sleep};

use crate::{
    Block, Result,
    common::unit_error,
    protocol::{ClientProtocol, ServerPacket, client::Addendum},
};

/// A buffered stream which can send and receive native protocol packets.
pub trait Transport: Unpin + Send {
    /// Poll to flush the underlying io.
    fn poll_flush(&mut self, cx: &mut Context) -> Poll<io::Result<()>>;

    /// Poll to receive a packet.
    ///
    /// Implementor should return `Exception` packet as [`Err`], and should
    /// read more from the underlying io as long as the buffered bytes are
    /// not a complete packet.
    fn poll_recv(&mut self, cx: &mut Context) -> Poll<Result<ServerPacket>>;

    /// Send packet to the server.
    ///
    /// Note that this send is buffered, caller must also call
    /// [`poll_flush`][1] or [`flush`][2] afterwards.
    ///
    /// [1]: Transport::poll_flush
    /// [2]: TransportExt::flush
    fn send<P: ClientProtocol>(&mut self, packet: P);

    /// Send the hello [`Addendum`], which has no packet tag.
    fn send_addendum(&mut self, addendum: Addendum);

    /// Send a `Data` packet, compressed when compression is negotiated.
    ///
    /// Nothing is buffered when the block fails validation.
    fn send_data(&mut self, table: &str, block: &Block) -> Result<()>;

    /// Instant when the current read gives up.
    fn deadline(&self) -> Instant;
}

impl<T> Transport for &mut T where T: Transport {
    fn poll_flush(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        T::poll_flush(self, cx)
    }

    fn poll_recv(&mut self, cx: &mut Context) -> Poll<Result<ServerPacket>> {
        T::poll_recv(self, cx)
    }

    fn send<P: ClientProtocol>(&mut self, packet: P) {
        T::send(self, packet);
    }

    fn send_addendum(&mut self, addendum: Addendum) {
        T::send_addendum(self, addendum);
    }

    fn send_data(&mut self, table: &str, block: &Block) -> Result<()> {
        T::send_data(self, table, block)
    }

    fn deadline(&self) -> Instant {
        T::deadline(self)
    }
}

/// An extension trait to provide `Future` API for [`Transport`].
///
/// Both futures fail with [`Timeout`] once [`Transport::deadline`] elapsed.
pub trait TransportExt: Transport {
    /// Flush the underlying io.
    fn flush(&mut self) -> impl Future<Output = Result<()>> + Send {
        let deadline = self.deadline();
        async move {
            match tokio::time::timeout_at(deadline, std::future::poll_fn(|cx| self.poll_flush(cx))).await {
                Ok(result) => Ok(result?),
                Err(_) => Err(Timeout.into()),
            }
        }
    }

    /// Receive a server packet.
    fn recv(&mut self) -> impl Future<Output = Result<ServerPacket>> + Send {
        let deadline = self.deadline();
        async move {
            match tokio::time::timeout_at(deadline, std::future::poll_fn(|cx| self.poll_recv(cx))).await {
                Ok(result) => result,
                Err(_) => Err(Timeout.into()),
            }
        }
    }
}

impl<T> TransportExt for T where T: Transport { }

pin_project_lite::pin_project! {
    /// Read deadline for poll based operations.
    ///
    /// Armed from [`Transport::deadline`] when an operation starts polling,
    /// disarmed once it completes.
    #[derive(Debug)]
    pub(crate) struct Deadline {
        #[pin]
        sleep: Sleep,
        armed: bool,
    }
}

impl Deadline {
    pub(crate) fn new() -> Self {
        Self { sleep: tokio::time::sleep_until(Instant::now()), armed: false }
    }

    /// Poll `f` on `io`, failing with [`Timeout`] when the deadline elapsed first.
    pub(crate) fn poll_io<IO, T, F>(self: Pin<&mut Self>, io: &mut IO, cx: &mut Context, f: F) -> Poll<Result<T>>
    where
        IO: Transport,
        F: FnOnce(&mut IO, &mut Context) -> Poll<Result<T>>,
    {
        let mut me = self.project();

        if !*me.armed {
            me.sleep.as_mut().reset(io.deadline());
            *me.armed = true;
        }

        if let Poll::Ready(result) = f(io, cx) {
            *me.armed = false;
            return Poll::Ready(result);
        }

        ready!(me.sleep.poll(cx));
        *me.armed = false;
        Poll::Ready(Err(Timeout.into()))
    }
}

unit_error! {
    /// Deadline elapsed before the operation completes.
    pub struct Timeout("operation timed out");
}
