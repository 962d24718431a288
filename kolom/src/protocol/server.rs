//! Server packets.
use std::fmt;

use super::{Context, ProtocolError, revision};
use crate::{Block, Value, compress::Decompress, ext::ReadExt, io::Read};

/// Server packet tags.
pub mod tag {
    pub const HELLO: u64 = 0;
    pub const DATA: u64 = 1;
    pub const EXCEPTION: u64 = 2;
    pub const PROGRESS: u64 = 3;
    pub const PONG: u64 = 4;
    pub const END_OF_STREAM: u64 = 5;
    pub const PROFILE_INFO: u64 = 6;
    pub const TOTALS: u64 = 7;
    pub const EXTREMES: u64 = 8;
    pub const TABLES_STATUS: u64 = 9;
    pub const LOG: u64 = 10;
    pub const TABLE_COLUMNS: u64 = 11;
    pub const PART_UUIDS: u64 = 12;
    pub const READ_TASK_REQUEST: u64 = 13;
    pub const PROFILE_EVENTS: u64 = 14;
}

/// Human readable packet name, for error messages.
pub fn packet_name(tag: u64) -> &'static str {
    match tag {
        tag::HELLO => "Hello",
        tag::DATA => "Data",
        tag::EXCEPTION => "Exception",
        tag::PROGRESS => "Progress",
        tag::PONG => "Pong",
        tag::END_OF_STREAM => "EndOfStream",
        tag::PROFILE_INFO => "ProfileInfo",
        tag::TOTALS => "Totals",
        tag::EXTREMES => "Extremes",
        tag::TABLES_STATUS => "TablesStatus",
        tag::LOG => "Log",
        tag::TABLE_COLUMNS => "TableColumns",
        tag::PART_UUIDS => "PartUUIDs",
        tag::READ_TASK_REQUEST => "ReadTaskRequest",
        tag::PROFILE_EVENTS => "ProfileEvents",
        _ => "Unknown",
    }
}

/// A decoded server packet.
#[derive(Debug)]
pub enum ServerPacket {
    Hello(ServerInfo),
    Data(Block),
    Exception(Exception),
    Progress(Progress),
    Pong,
    EndOfStream,
    ProfileInfo(ProfileInfo),
    Totals(Block),
    Extremes(Block),
    Log(Block),
    TableColumns(TableColumns),
    ProfileEvents(Block),
}

impl ServerPacket {
    /// Decode one packet from buffered bytes.
    ///
    /// Returns [`ProtocolError::Incomplete`] when more bytes are needed, in
    /// which case `read` is left untouched.
    pub fn decode(read: &mut &[u8], cx: Context) -> Result<ServerPacket, ProtocolError> {
        let mut cursor = *read;
        let packet = Self::decode_inner(&mut cursor, cx)?;
        *read = cursor;
        Ok(packet)
    }

    fn decode_inner(read: &mut &[u8], cx: Context) -> Result<ServerPacket, ProtocolError> {
        let tag = read.get_uvarint()?;
        let packet = match tag {
            tag::HELLO => Self::Hello(ServerInfo::decode(read)?),
            tag::DATA => Self::Data(data(read, cx, cx.compressed)?),
            tag::EXCEPTION => Self::Exception(Exception::decode(read)?),
            tag::PROGRESS => Self::Progress(Progress::decode(read, cx.revision)?),
            tag::PONG => Self::Pong,
            tag::END_OF_STREAM => Self::EndOfStream,
            tag::PROFILE_INFO => Self::ProfileInfo(ProfileInfo::decode(read)?),
            tag::TOTALS => Self::Totals(data(read, cx, cx.compressed)?),
            tag::EXTREMES => Self::Extremes(data(read, cx, cx.compressed)?),
            tag::LOG => Self::Log(data(read, cx, false)?),
            tag::TABLE_COLUMNS => Self::TableColumns(TableColumns::decode(read)?),
            tag::PROFILE_EVENTS => Self::ProfileEvents(data(read, cx, false)?),
            tag => return Err(ProtocolError::unexpected(tag, "packet decode")),
        };
        Ok(packet)
    }

    /// Packet tag.
    pub fn tag(&self) -> u64 {
        match self {
            Self::Hello(_) => tag::HELLO,
            Self::Data(_) => tag::DATA,
            Self::Exception(_) => tag::EXCEPTION,
            Self::Progress(_) => tag::PROGRESS,
            Self::Pong => tag::PONG,
            Self::EndOfStream => tag::END_OF_STREAM,
            Self::ProfileInfo(_) => tag::PROFILE_INFO,
            Self::Totals(_) => tag::TOTALS,
            Self::Extremes(_) => tag::EXTREMES,
            Self::Log(_) => tag::LOG,
            Self::TableColumns(_) => tag::TABLE_COLUMNS,
            Self::ProfileEvents(_) => tag::PROFILE_EVENTS,
        }
    }
}

/// Table name then a block, optionally inside compression frames.
fn data(read: &mut &[u8], cx: Context, compressed: bool) -> Result<Block, ProtocolError> {
    let _table = read.get_binary()?;

    if !compressed {
        return Block::decode(read, cx.revision);
    }

    let mut frames = Decompress::new(*read);
    let block = Block::decode(&mut frames, cx.revision)?;
    *read = frames.finish()?;
    Ok(block)
}

/// Server identity, answer to client hello.
#[derive(Clone, Debug, Default)]
pub struct ServerInfo {
    pub name: String,
    pub major: u64,
    pub minor: u64,
    pub revision: u64,
    pub timezone: Option<String>,
    pub display_name: Option<String>,
    pub patch: u64,
}

impl ServerInfo {
    fn decode(read: &mut &[u8]) -> Result<Self, ProtocolError> {
        let name = read.get_string()?;
        let major = read.get_uvarint()?;
        let minor = read.get_uvarint()?;
        let server = read.get_uvarint()?;

        // server writes the rest gated by our revision
        let rev = server.min(revision::CLIENT);

        let timezone = match rev >= revision::SERVER_TIMEZONE {
            true => Some(read.get_string()?),
            false => None,
        };
        let display_name = match rev >= revision::SERVER_DISPLAY_NAME {
            true => Some(read.get_string()?),
            false => None,
        };
        let patch = match rev >= revision::VERSION_PATCH {
            true => read.get_uvarint()?,
            false => server,
        };

        Ok(Self { name, major, minor, revision: server, timezone, display_name, patch })
    }
}

/// Error sent by the server, with optional nested cause.
#[derive(Clone)]
pub struct Exception {
    pub code: i32,
    pub name: String,
    pub message: String,
    pub stack_trace: String,
    pub nested: Option<Box<Exception>>,
}

impl Exception {
    fn decode(read: &mut &[u8]) -> Result<Self, ProtocolError> {
        let code = read.get_i32_le()?;
        let name = read.get_string()?;
        let message = read.get_string()?;
        let stack_trace = read.get_string()?;
        let nested = match read.get_bool()? {
            true => Some(Box::new(Self::decode(read)?)),
            false => None,
        };
        Ok(Self { code, name, message, stack_trace, nested })
    }

    /// Iterate the exception chain, starting from self.
    pub fn chain(&self) -> impl Iterator<Item = &Exception> {
        std::iter::successors(Some(self), |e| e.nested.as_deref())
    }
}

impl std::error::Error for Exception {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.nested.as_deref().map(|e| e as _)
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code: {}, {}: {}", self.code, self.name, self.message)
    }
}

impl fmt::Debug for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

/// Query progress, counts are deltas since the previous packet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Progress {
    pub rows: u64,
    pub bytes: u64,
    pub total_rows: u64,
    pub wrote_rows: u64,
    pub wrote_bytes: u64,
    pub elapsed_ns: u64,
}

impl Progress {
    fn decode(read: &mut &[u8], rev: u64) -> Result<Self, ProtocolError> {
        let mut p = Self {
            rows: read.get_uvarint()?,
            bytes: read.get_uvarint()?,
            total_rows: read.get_uvarint()?,
            ..Self::default()
        };
        if rev >= revision::CLIENT_WRITE_INFO {
            p.wrote_rows = read.get_uvarint()?;
            p.wrote_bytes = read.get_uvarint()?;
        }
        if rev >= revision::SERVER_QUERY_TIME_IN_PROGRESS {
            p.elapsed_ns = read.get_uvarint()?;
        }
        Ok(p)
    }
}

impl std::ops::AddAssign for Progress {
    fn add_assign(&mut self, rhs: Self) {
        self.rows += rhs.rows;
        self.bytes += rhs.bytes;
        self.total_rows += rhs.total_rows;
        self.wrote_rows += rhs.wrote_rows;
        self.wrote_bytes += rhs.wrote_bytes;
        self.elapsed_ns = self.elapsed_ns.max(rhs.elapsed_ns);
    }
}

/// Query execution summary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProfileInfo {
    pub rows: u64,
    pub blocks: u64,
    pub bytes: u64,
    pub applied_limit: bool,
    pub rows_before_limit: u64,
    pub calculated_rows_before_limit: bool,
}

impl ProfileInfo {
    fn decode(read: &mut &[u8]) -> Result<Self, ProtocolError> {
        Ok(Self {
            rows: read.get_uvarint()?,
            blocks: read.get_uvarint()?,
            bytes: read.get_uvarint()?,
            applied_limit: read.get_bool()?,
            rows_before_limit: read.get_uvarint()?,
            calculated_rows_before_limit: read.get_bool()?,
        })
    }
}

/// Column description of a table, sent before inserts with defaults.
#[derive(Clone, Debug, Default)]
pub struct TableColumns {
    pub table: String,
    pub description: String,
}

impl TableColumns {
    fn decode(read: &mut &[u8]) -> Result<Self, ProtocolError> {
        Ok(Self { table: read.get_string()?, description: read.get_string()? })
    }
}

/// A server log entry, from `send_logs_level` setting.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Log {
    /// Seconds since unix epoch.
    pub time: u32,
    pub time_micros: u32,
    pub host: String,
    pub query_id: String,
    pub thread_id: u64,
    pub priority: i8,
    pub source: String,
    pub text: String,
}

impl Log {
    /// Read log entries out of a `Log` packet block.
    ///
    /// Unknown columns are ignored, missing ones are left default.
    pub fn from_block(block: &Block) -> Vec<Log> {
        let mut logs = vec![Log::default(); block.rows()];
        for (name, column) in block.columns() {
            for (row, log) in logs.iter_mut().enumerate() {
                let value = column.value(row);
                match name {
                    "event_time" => log.time = uint(&value) as u32,
                    "event_time_microseconds" => log.time_micros = uint(&value) as u32,
                    "host_name" => log.host = string(value),
                    "query_id" => log.query_id = string(value),
                    "thread_id" => log.thread_id = uint(&value) as u64,
                    "priority" => log.priority = value.as_i128().unwrap_or_default() as i8,
                    "source" => log.source = string(value),
                    "text" => log.text = string(value),
                    _ => { },
                }
            }
        }
        logs
    }
}

/// A profile counter, from `ProfileEvents` packet.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProfileEvent {
    pub host: String,
    /// Seconds since unix epoch.
    pub time: u32,
    pub thread_id: u64,
    /// `1` increment, `2` gauge.
    pub kind: i16,
    pub name: String,
    pub value: i64,
}

impl ProfileEvent {
    /// Read events out of a `ProfileEvents` packet block.
    pub fn from_block(block: &Block) -> Vec<ProfileEvent> {
        let mut events = vec![ProfileEvent::default(); block.rows()];
        for (name, column) in block.columns() {
            for (row, event) in events.iter_mut().enumerate() {
                let value = column.value(row);
                match name {
                    "host_name" => event.host = string(value),
                    "current_time" => event.time = uint(&value) as u32,
                    "thread_id" => event.thread_id = uint(&value) as u64,
                    "type" => event.kind = match &value {
                        Value::Enum { value, .. } => *value,
                        value => value.as_i128().unwrap_or_default() as i16,
                    },
                    "name" => event.name = string(value),
                    "value" => event.value = value.as_i128().unwrap_or_default() as i64,
                    _ => { },
                }
            }
        }
        events
    }
}

fn uint(value: &Value) -> u128 {
    match *value {
        Value::DateTime(v) => v.into(),
        _ => value.as_i128().unwrap_or_default() as u128,
    }
}

fn string(value: Value) -> String {
    match value {
        Value::String(b) => String::from_utf8_lossy(&b).into_owned(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod test {
    use bytes::{BufMut, BytesMut};

    use super::*;
    use crate::{compress::{Method, compress_into}, ext::BufMutExt};

    const CX: Context = Context { revision: revision::CLIENT, compressed: false };

    #[test]
    fn hello_gated_by_revision() {
        let mut buf = BytesMut::new();
        buf.put_uvarint(tag::HELLO);
        buf.put_string("ClickHouse");
        buf.put_uvarint(23);
        buf.put_uvarint(8);
        buf.put_uvarint(54400);
        buf.put_string("UTC");
        buf.put_string("box");
        buf.put_u8(0xee);

        let mut read = &buf[..];
        let ServerPacket::Hello(hello) = ServerPacket::decode(&mut read, CX).unwrap() else {
            panic!("expected hello")
        };
        assert_eq!(hello.revision, 54400);
        assert_eq!(hello.timezone.as_deref(), Some("UTC"));
        assert_eq!(hello.display_name.as_deref(), Some("box"));
        assert_eq!(hello.patch, 54400, "patch is not sent before 54401");
        assert_eq!(read, [0xee]);
    }

    #[test]
    fn nested_exception() {
        let mut buf = BytesMut::new();
        buf.put_uvarint(tag::EXCEPTION);
        for (code, nested) in [(60, true), (1000, false)] {
            buf.put_i32_le(code);
            buf.put_string("DB::Exception");
            buf.put_string("Table default.nope does not exist");
            buf.put_string("");
            buf.put_bool(nested);
        }

        let ServerPacket::Exception(e) = ServerPacket::decode(&mut &buf[..], CX).unwrap() else {
            panic!("expected exception")
        };
        assert_eq!(e.to_string(), "code: 60, DB::Exception: Table default.nope does not exist");
        assert_eq!(e.chain().map(|e| e.code).collect::<Vec<_>>(), [60, 1000]);
    }

    #[test]
    fn incomplete_leaves_cursor() {
        let mut buf = BytesMut::new();
        buf.put_uvarint(tag::PROGRESS);
        buf.put_uvarint(10);

        let mut read = &buf[..];
        assert!(ServerPacket::decode(&mut read, CX).unwrap_err().is_incomplete());
        assert_eq!(read.len(), buf.len());
    }

    #[test]
    fn progress_old_revision() {
        let mut buf = BytesMut::new();
        buf.put_uvarint(tag::PROGRESS);
        for v in [1, 2, 3] {
            buf.put_uvarint(v);
        }
        let cx = Context { revision: 54410, compressed: false };
        let ServerPacket::Progress(p) = ServerPacket::decode(&mut &buf[..], cx).unwrap() else {
            panic!("expected progress")
        };
        assert_eq!(p, Progress { rows: 1, bytes: 2, total_rows: 3, ..Default::default() });
    }

    #[test]
    fn compressed_data() {
        let mut block = Block::new();
        block.add_column("n", "UInt8").unwrap();
        block.append_row([Value::UInt8(9)]).unwrap();

        let mut plain = BytesMut::new();
        block.encode(&mut plain, revision::CLIENT).unwrap();

        let mut buf = BytesMut::new();
        buf.put_uvarint(tag::DATA);
        buf.put_string("");
        compress_into(Method::Lz4, &plain, &mut buf).unwrap();
        buf.put_uvarint(tag::END_OF_STREAM);

        let cx = Context { revision: revision::CLIENT, compressed: true };
        let mut read = &buf[..];
        let ServerPacket::Data(data) = ServerPacket::decode(&mut read, cx).unwrap() else {
            panic!("expected data")
        };
        assert_eq!(data.row(0), Some(vec![Value::UInt8(9)]));
        assert!(matches!(ServerPacket::decode(&mut read, cx).unwrap(), ServerPacket::EndOfStream));
    }

    #[test]
    fn log_records() {
        let mut block = Block::new();
        block
            .add_column("event_time", "DateTime").unwrap()
            .add_column("priority", "Int8").unwrap()
            .add_column("text", "String").unwrap()
            .add_column("extra", "UInt8").unwrap();
        block.append_row([
            Value::DateTime(1_700_000_000),
            Value::Int8(6),
            Value::String("Read 1 rows".into()),
            Value::UInt8(0),
        ]).unwrap();

        let logs = Log::from_block(&block);
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].time, 1_700_000_000);
        assert_eq!(logs[0].priority, 6);
        assert_eq!(logs[0].text, "Read 1 rows");
    }

    #[test]
    fn unsupported_packet() {
        let buf = [tag::READ_TASK_REQUEST as u8];
        assert!(matches!(
            ServerPacket::decode(&mut &buf[..], CX),
            Err(ProtocolError::Unexpected { found: tag::READ_TASK_REQUEST, .. })
        ));
    }
}
