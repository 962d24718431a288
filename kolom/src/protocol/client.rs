//! Client packets.
use bytes::{BufMut, BytesMut};

use super::{ClientProtocol, revision, tag};
use crate::ext::BufMutExt;

/// First packet of a connection.
#[derive(Debug)]
pub struct Hello<'a> {
    pub client_name: &'a str,
    pub major: u64,
    pub minor: u64,
    pub revision: u64,
    pub database: &'a str,
    pub user: &'a str,
    pub password: &'a str,
}

impl ClientProtocol for Hello<'_> {
    const TAG: u64 = tag::HELLO;

    fn encode(self, _: u64, buf: &mut BytesMut) {
        buf.put_string(self.client_name);
        buf.put_uvarint(self.major);
        buf.put_uvarint(self.minor);
        buf.put_uvarint(self.revision);
        buf.put_string(self.database);
        buf.put_string(self.user);
        buf.put_string(self.password);
    }
}

/// Sent right after server hello, when the negotiated revision has
/// [`revision::ADDENDUM`].
///
/// Addendum has no tag, thus it does not implement [`ClientProtocol`].
#[derive(Debug)]
pub struct Addendum<'a> {
    pub quota_key: &'a str,
}

impl Addendum<'_> {
    pub fn encode(self, buf: &mut BytesMut) {
        buf.put_string(self.quota_key);
    }
}

/// Query processing stage.
pub const STAGE_COMPLETE: u64 = 2;

/// Query interface, native tcp.
const INTERFACE_TCP: u8 = 1;

/// Query kind, initial query.
const INITIAL_QUERY: u8 = 1;

/// Setting flags.
const SETTING_IMPORTANT: u64 = 0x01;
const SETTING_CUSTOM: u64 = 0x02;

/// Query submission.
#[derive(Debug)]
pub struct Query<'a> {
    pub id: &'a str,
    pub info: ClientInfo<'a>,
    pub settings: &'a [Setting],
    pub stage: u64,
    pub compression: bool,
    pub body: &'a str,
    pub parameters: &'a [Parameter],
}

impl ClientProtocol for Query<'_> {
    const TAG: u64 = tag::QUERY;

    fn encode(self, rev: u64, buf: &mut BytesMut) {
        buf.put_string(self.id);

        if rev >= revision::CLIENT_INFO {
            self.info.encode(rev, buf);
        }

        if rev >= revision::SETTINGS_AS_STRINGS {
            for setting in self.settings {
                buf.put_string(&setting.key);
                buf.put_uvarint(match setting.important {
                    true => SETTING_IMPORTANT,
                    false => 0,
                });
                buf.put_string(&setting.value);
            }
        }
        buf.put_string("");

        if rev >= revision::INTERSERVER_SECRET {
            buf.put_string("");
        }

        buf.put_uvarint(self.stage);
        buf.put_bool(self.compression);
        buf.put_string(self.body);

        if rev >= revision::PARAMETERS {
            for param in self.parameters {
                buf.put_string(&param.key);
                buf.put_uvarint(SETTING_CUSTOM);
                buf.put_string(&quote(&param.value));
            }
            buf.put_string("");
        }
    }
}

/// Client description attached to every query.
#[derive(Debug)]
pub struct ClientInfo<'a> {
    pub initial_user: &'a str,
    pub initial_query_id: &'a str,
    pub initial_address: &'a str,
    /// Microseconds since unix epoch.
    pub start_time: i64,
    pub os_user: &'a str,
    pub hostname: &'a str,
    pub client_name: &'a str,
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub revision: u64,
    pub quota_key: &'a str,
    pub distributed_depth: u64,
    pub trace: Option<&'a TraceContext>,
}

impl ClientInfo<'_> {
    fn encode(&self, rev: u64, buf: &mut BytesMut) {
        buf.put_u8(INITIAL_QUERY);
        buf.put_string(self.initial_user);
        buf.put_string(self.initial_query_id);
        buf.put_string(self.initial_address);
        if rev >= revision::INITIAL_QUERY_START_TIME {
            buf.put_i64_le(self.start_time);
        }

        buf.put_u8(INTERFACE_TCP);
        buf.put_string(self.os_user);
        buf.put_string(self.hostname);
        buf.put_string(self.client_name);
        buf.put_uvarint(self.major);
        buf.put_uvarint(self.minor);
        buf.put_uvarint(self.revision);

        if rev >= revision::QUOTA_KEY_IN_CLIENT_INFO {
            buf.put_string(self.quota_key);
        }
        if rev >= revision::DISTRIBUTED_DEPTH {
            buf.put_uvarint(self.distributed_depth);
        }
        if rev >= revision::VERSION_PATCH {
            buf.put_uvarint(self.patch);
        }
        if rev >= revision::OPENTELEMETRY {
            match self.trace {
                Some(trace) => {
                    buf.put_u8(1);
                    buf.put_slice(&trace.trace_id);
                    buf.put_slice(&trace.span_id);
                    buf.put_string(&trace.trace_state);
                    buf.put_u8(trace.flags);
                },
                None => buf.put_u8(0),
            }
        }
        if rev >= revision::PARALLEL_REPLICAS {
            // collaborate with initiator, count participating replicas, replica number
            buf.put_uvarint(0);
            buf.put_uvarint(0);
            buf.put_uvarint(0);
        }
    }
}

/// A query setting, sent as strings.
#[derive(Clone, Debug)]
pub struct Setting {
    pub key: String,
    pub value: String,
    /// Server fails the query if it does not know an important setting.
    pub important: bool,
}

/// A server side query parameter, referenced as `{name:Type}` in the query.
#[derive(Clone, Debug)]
pub struct Parameter {
    pub key: String,
    pub value: String,
}

/// W3C trace context propagated to the server.
#[derive(Clone, Debug, Default)]
pub struct TraceContext {
    pub trace_id: [u8; 16],
    pub span_id: [u8; 8],
    pub trace_state: String,
    pub flags: u8,
}

/// Single quote a parameter value, escaping `\` and `'`.
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        if matches!(c, '\\' | '\'') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

/// Request the server to stop the running query.
#[derive(Debug)]
pub struct Cancel;

impl ClientProtocol for Cancel {
    const TAG: u64 = tag::CANCEL;

    fn encode(self, _: u64, _: &mut BytesMut) { }
}

#[derive(Debug)]
pub struct Ping;

impl ClientProtocol for Ping {
    const TAG: u64 = tag::PING;

    fn encode(self, _: u64, _: &mut BytesMut) { }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{ext::ReadExt, io::Read};

    fn info() -> ClientInfo<'static> {
        ClientInfo {
            initial_user: "",
            initial_query_id: "",
            initial_address: "0.0.0.0:0",
            start_time: 0,
            os_user: "me",
            hostname: "box",
            client_name: "kolom",
            major: 0,
            minor: 1,
            patch: 0,
            revision: revision::CLIENT,
            quota_key: "",
            distributed_depth: 0,
            trace: None,
        }
    }

    #[test]
    fn quote_escapes() {
        assert_eq!(quote(r"it's \o/"), r"'it\'s \\o/'");
    }

    #[test]
    fn hello_layout() {
        let mut buf = BytesMut::new();
        Hello {
            client_name: "kolom",
            major: 0,
            minor: 1,
            revision: revision::CLIENT,
            database: "default",
            user: "default",
            password: "",
        }.encode(revision::CLIENT, &mut buf);

        let mut read = &buf[..];
        assert_eq!(read.get_string().unwrap(), "kolom");
        assert_eq!(read.get_uvarint().unwrap(), 0);
        assert_eq!(read.get_uvarint().unwrap(), 1);
        assert_eq!(read.get_uvarint().unwrap(), revision::CLIENT);
        assert_eq!(read.get_string().unwrap(), "default");
        assert_eq!(read.get_string().unwrap(), "default");
        assert_eq!(read.get_string().unwrap(), "");
        assert!(read.is_empty());
    }

    #[test]
    fn query_tail() {
        let settings = [Setting { key: "max_threads".into(), value: "1".into(), important: true }];
        let parameters = [Parameter { key: "n".into(), value: "o'k".into() }];
        let mut buf = BytesMut::new();
        Query {
            id: "q1",
            info: info(),
            settings: &settings,
            stage: STAGE_COMPLETE,
            compression: true,
            body: "SELECT {n:String}",
            parameters: &parameters,
        }.encode(revision::CLIENT, &mut buf);

        let mut read = &buf[..];
        assert_eq!(read.get_string().unwrap(), "q1");
        assert_eq!(read.get_u8().unwrap(), INITIAL_QUERY);

        // skip the rest of client info
        for _ in 0..3 {
            read.get_string().unwrap();
        }
        read.read_slice(8).unwrap();
        assert_eq!(read.get_u8().unwrap(), INTERFACE_TCP);
        for _ in 0..3 {
            read.get_string().unwrap();
        }
        for _ in 0..3 {
            read.get_uvarint().unwrap();
        }
        assert_eq!(read.get_string().unwrap(), "");
        assert_eq!(read.get_uvarint().unwrap(), 0);
        assert_eq!(read.get_uvarint().unwrap(), 0);
        assert_eq!(read.get_u8().unwrap(), 0);
        read.read_slice(3).unwrap();

        assert_eq!(read.get_string().unwrap(), "max_threads");
        assert_eq!(read.get_uvarint().unwrap(), SETTING_IMPORTANT);
        assert_eq!(read.get_string().unwrap(), "1");
        assert_eq!(read.get_string().unwrap(), "");

        assert_eq!(read.get_string().unwrap(), "");
        assert_eq!(read.get_uvarint().unwrap(), STAGE_COMPLETE);
        assert!(read.get_bool().unwrap());
        assert_eq!(read.get_string().unwrap(), "SELECT {n:String}");

        assert_eq!(read.get_string().unwrap(), "n");
        assert_eq!(read.get_uvarint().unwrap(), SETTING_CUSTOM);
        assert_eq!(read.get_string().unwrap(), r"'o\'k'");
        assert_eq!(read.get_string().unwrap(), "");
        assert!(read.is_empty());
    }

    #[test]
    fn old_revision_omits_fields() {
        let parameters = [Parameter { key: "n".into(), value: "1".into() }];
        let mut old = BytesMut::new();
        Query {
            id: "",
            info: info(),
            settings: &[],
            stage: STAGE_COMPLETE,
            compression: false,
            body: "SELECT 1",
            parameters: &parameters,
        }.encode(54400, &mut old);

        let mut new = BytesMut::new();
        Query {
            id: "",
            info: info(),
            settings: &[],
            stage: STAGE_COMPLETE,
            compression: false,
            body: "SELECT 1",
            parameters: &parameters,
        }.encode(revision::CLIENT, &mut new);

        assert!(old.len() < new.len());
        assert!(old.ends_with(b"\x08SELECT 1"));
    }
}
