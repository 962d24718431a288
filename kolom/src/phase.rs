//! Protocol phases shared by connection, query and batch.
//!
//! Every function is generic over [`Transport`] so it can run on a
//! borrowed stream or on the one owned by the forwarding task.
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{
    Block, Result,
    common::verbose,
    protocol::{
        ProtocolError, ServerPacket, VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH,
        client::{self, Addendum, ClientInfo, STAGE_COMPLETE},
        revision,
        server::ServerInfo,
    },
    query::{Handlers, QueryOptions, QueryResult},
    transport::{Transport, TransportExt},
};

/// Handshake parameters.
#[derive(Debug)]
pub struct HandshakeConfig<'a> {
    pub client_name: &'a str,
    pub database: &'a str,
    pub user: &'a str,
    pub password: &'a str,
    pub quota_key: &'a str,
}

/// Perform a handshake.
///
/// Returns the server hello, caller should continue with the lower of both
/// revisions.
pub async fn handshake<IO: Transport>(mut io: IO, config: HandshakeConfig<'_>) -> Result<ServerInfo> {
    io.send(client::Hello {
        client_name: config.client_name,
        major: VERSION_MAJOR,
        minor: VERSION_MINOR,
        revision: revision::CLIENT,
        database: config.database,
        user: config.user,
        password: config.password,
    });
    io.flush().await?;

    let server = match io.recv().await? {
        ServerPacket::Hello(server) => server,
        packet => return Err(ProtocolError::unexpected(packet.tag(), "handshake").into()),
    };

    if revision::CLIENT.min(server.revision) >= revision::ADDENDUM {
        io.send_addendum(Addendum { quota_key: config.quota_key });
        io.flush().await?;
    }

    verbose!(server = %server.name, revision = server.revision, "handshake");

    Ok(server)
}

/// Identity of the connection, attached to every query.
#[derive(Clone, Debug, Default)]
pub struct Session {
    pub client_name: String,
    pub quota_key: String,
    pub os_user: String,
    pub hostname: String,
    pub compression: bool,
}

/// Write a query, its external tables and the terminating empty block to `io`.
///
/// Flushing is required after call.
pub fn send_query<IO: Transport>(
    mut io: IO,
    sql: &str,
    options: &QueryOptions,
    session: &Session,
) -> Result<()> {
    let start_time = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|e| e.as_micros() as i64)
        .unwrap_or_default();

    let quota_key = options.quota_key.as_deref().unwrap_or(&session.quota_key);

    io.send(client::Query {
        id: &options.query_id,
        info: ClientInfo {
            initial_user: "",
            initial_query_id: "",
            initial_address: "0.0.0.0:0",
            start_time,
            os_user: &session.os_user,
            hostname: &session.hostname,
            client_name: &session.client_name,
            major: VERSION_MAJOR,
            minor: VERSION_MINOR,
            patch: VERSION_PATCH,
            revision: revision::CLIENT,
            quota_key,
            distributed_depth: 0,
            trace: options.trace.as_ref(),
        },
        settings: &options.settings,
        stage: STAGE_COMPLETE,
        compression: session.compression,
        body: sql,
        parameters: &options.parameters,
    });

    for table in &options.external {
        io.send_data(&table.name, &table.block)?;
    }

    io.send_data("", &Block::new())
}

/// Outcome of a dispatched packet.
#[derive(Debug)]
pub enum Step {
    /// Data, totals or extremes block.
    Data(Block),
    Continue,
    End,
}

/// Route one packet of a running query.
///
/// Progress, profile and log packets only reach the callbacks.
pub fn dispatch(
    packet: ServerPacket,
    handlers: &Handlers,
    summary: &mut QueryResult,
) -> Result<Step> {
    let step = match packet {
        ServerPacket::Data(block)
        | ServerPacket::Totals(block)
        | ServerPacket::Extremes(block) => {
            summary.blocks += 1;
            summary.rows += block.rows() as u64;
            Step::Data(block)
        },
        ServerPacket::Progress(progress) => {
            summary.progress += progress;
            handlers.progress(&progress);
            Step::Continue
        },
        ServerPacket::ProfileInfo(info) => {
            summary.profile_info = Some(info);
            handlers.profile_info(&info);
            Step::Continue
        },
        ServerPacket::Log(block) => {
            handlers.log(&block);
            Step::Continue
        },
        ServerPacket::ProfileEvents(block) => {
            handlers.profile_events(&block);
            Step::Continue
        },
        ServerPacket::TableColumns(columns) => {
            handlers.table_columns(&columns);
            Step::Continue
        },
        ServerPacket::EndOfStream => Step::End,
        packet => return Err(ProtocolError::unexpected(packet.tag(), "query").into()),
    };
    Ok(step)
}

/// Read packets until end of stream, calling `on_data` for every block.
pub async fn process<IO, F>(
    mut io: IO,
    handlers: &Handlers,
    summary: &mut QueryResult,
    mut on_data: F,
) -> Result<()>
where
    IO: Transport,
    F: FnMut(Block) -> Result<()> + Send,
{
    loop {
        match dispatch(io.recv().await?, handlers, summary)? {
            Step::Data(block) => on_data(block)?,
            Step::Continue => { },
            Step::End => return Ok(()),
        }
    }
}

/// Read packets until the first block, which carries the result schema.
///
/// Returns `None` when the stream ends before any block.
pub async fn first_block<IO: Transport>(
    mut io: IO,
    handlers: &Handlers,
    summary: &mut QueryResult,
) -> Result<Option<Block>> {
    loop {
        match dispatch(io.recv().await?, handlers, summary)? {
            Step::Data(block) => return Ok(Some(block)),
            Step::Continue => { },
            Step::End => return Ok(None),
        }
    }
}

/// Send ping and wait for pong, skipping progress packets.
pub async fn ping<IO: Transport>(mut io: IO) -> Result<()> {
    io.send(client::Ping);
    io.flush().await?;

    loop {
        match io.recv().await? {
            ServerPacket::Pong => return Ok(()),
            ServerPacket::Progress(_) => { },
            packet => return Err(ProtocolError::unexpected(packet.tag(), "ping").into()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Value, protocol::server::Progress};

    fn block(n: u8) -> Block {
        let mut block = Block::new();
        block.add_column("n", "UInt8").unwrap();
        block.append_row([Value::UInt8(n)]).unwrap();
        block
    }

    #[test]
    fn dispatch_routes_packets() {
        let seen = std::sync::Arc::new(std::sync::atomic::AtomicU64::new(0));
        let counter = seen.clone();
        let options = QueryOptions::new().on_progress(move |p| {
            counter.fetch_add(p.rows, std::sync::atomic::Ordering::Relaxed);
        });

        let mut summary = QueryResult::default();
        let progress = Progress { rows: 3, ..Progress::default() };

        let step = dispatch(ServerPacket::Progress(progress), &options.handlers, &mut summary).unwrap();
        assert!(matches!(step, Step::Continue));
        let step = dispatch(ServerPacket::Progress(progress), &options.handlers, &mut summary).unwrap();
        assert!(matches!(step, Step::Continue));
        assert_eq!(seen.load(std::sync::atomic::Ordering::Relaxed), 6);
        assert_eq!(summary.progress().rows, 6);

        let step = dispatch(ServerPacket::Totals(block(1)), &options.handlers, &mut summary).unwrap();
        assert!(matches!(step, Step::Data(b) if b.rows() == 1));
        assert_eq!(summary.rows(), 1);

        let step = dispatch(ServerPacket::EndOfStream, &options.handlers, &mut summary).unwrap();
        assert!(matches!(step, Step::End));
    }

    #[test]
    fn dispatch_rejects_hello() {
        let mut summary = QueryResult::default();
        let err = dispatch(
            ServerPacket::Hello(ServerInfo::default()),
            &Handlers::default(),
            &mut summary,
        )
        .unwrap_err();
        assert!(err.is_fatal());
    }
}
