use std::{fmt, sync::Arc, time::Duration};
use tokio::time::Instant;

use crate::{
    Block,
    block::BlockError,
    protocol::{
        client::{Parameter, Setting, TraceContext},
        server::{Log, ProfileEvent, ProfileInfo, Progress, TableColumns},
    },
};

/// Options attached to a single query.
#[derive(Debug, Default)]
pub struct QueryOptions {
    pub(crate) query_id: String,
    pub(crate) quota_key: Option<String>,
    pub(crate) settings: Vec<Setting>,
    pub(crate) parameters: Vec<Parameter>,
    pub(crate) trace: Option<TraceContext>,
    pub(crate) external: Vec<ExternalTable>,
    pub(crate) deadline: Option<Instant>,
    pub(crate) handlers: Handlers,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the query id, server generates one when empty.
    pub fn query_id(mut self, id: impl Into<String>) -> Self {
        self.query_id = id.into();
        self
    }

    /// Override the connection quota key.
    pub fn quota_key(mut self, key: impl Into<String>) -> Self {
        self.quota_key = Some(key.into());
        self
    }

    /// Add a query setting.
    pub fn setting(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.settings.push(Setting { key: key.into(), value: value.to_string(), important: false });
        self
    }

    /// Add a setting the server must understand, otherwise the query fails.
    pub fn important_setting(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.settings.push(Setting { key: key.into(), value: value.to_string(), important: true });
        self
    }

    /// Bind a server side parameter, referenced as `{key:Type}`.
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.parameters.push(Parameter { key: key.into(), value: value.to_string() });
        self
    }

    /// Propagate a trace context to the server.
    pub fn trace(mut self, trace: TraceContext) -> Self {
        self.trace = Some(trace);
        self
    }

    /// Attach a temporary table, visible to the query as `name`.
    pub fn external_table(mut self, name: impl Into<String>, block: Block) -> Self {
        self.external.push(ExternalTable { name: name.into(), block });
        self
    }

    /// Fail with timeout error once `deadline` elapsed.
    ///
    /// This replaces the connection read timeout for every read of the query.
    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Same as [`deadline`][QueryOptions::deadline] with `now + timeout`.
    pub fn timeout(self, timeout: Duration) -> Self {
        self.deadline(Instant::now() + timeout)
    }

    pub fn on_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(&Progress) + Send + Sync + 'static,
    {
        self.handlers.progress = Some(Arc::new(f));
        self
    }

    pub fn on_profile_info<F>(mut self, f: F) -> Self
    where
        F: Fn(&ProfileInfo) + Send + Sync + 'static,
    {
        self.handlers.profile_info = Some(Arc::new(f));
        self
    }

    /// Called for every server log entry, requires `send_logs_level` setting.
    pub fn on_log<F>(mut self, f: F) -> Self
    where
        F: Fn(&Log) + Send + Sync + 'static,
    {
        self.handlers.log = Some(Arc::new(f));
        self
    }

    pub fn on_profile_events<F>(mut self, f: F) -> Self
    where
        F: Fn(&[ProfileEvent]) + Send + Sync + 'static,
    {
        self.handlers.profile_events = Some(Arc::new(f));
        self
    }

    pub fn on_table_columns<F>(mut self, f: F) -> Self
    where
        F: Fn(&TableColumns) + Send + Sync + 'static,
    {
        self.handlers.table_columns = Some(Arc::new(f));
        self
    }

    /// External tables are checked before anything is sent.
    pub(crate) fn validate(&self) -> Result<(), BlockError> {
        for table in &self.external {
            table.block.validate()?;
        }
        Ok(())
    }
}

/// Temporary table sent along with the query.
#[derive(Debug)]
pub struct ExternalTable {
    pub(crate) name: String,
    pub(crate) block: Block,
}

type Callback<T> = Option<Arc<dyn Fn(&T) + Send + Sync>>;

/// Callbacks for packets which does not carry query data.
#[derive(Clone, Default)]
pub struct Handlers {
    progress: Callback<Progress>,
    profile_info: Callback<ProfileInfo>,
    log: Callback<Log>,
    profile_events: Option<Arc<dyn Fn(&[ProfileEvent]) + Send + Sync>>,
    table_columns: Callback<TableColumns>,
}

impl Handlers {
    pub(crate) fn progress(&self, progress: &Progress) {
        if let Some(f) = &self.progress {
            f(progress);
        }
    }

    pub(crate) fn profile_info(&self, info: &ProfileInfo) {
        if let Some(f) = &self.profile_info {
            f(info);
        }
    }

    pub(crate) fn log(&self, block: &Block) {
        if let Some(f) = &self.log {
            for log in Log::from_block(block) {
                f(&log);
            }
        }
    }

    pub(crate) fn profile_events(&self, block: &Block) {
        if let Some(f) = &self.profile_events {
            f(&ProfileEvent::from_block(block));
        }
    }

    pub(crate) fn table_columns(&self, columns: &TableColumns) {
        if let Some(f) = &self.table_columns {
            f(columns);
        }
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers")
            .field("progress", &self.progress.is_some())
            .field("profile_info", &self.profile_info.is_some())
            .field("log", &self.log.is_some())
            .field("profile_events", &self.profile_events.is_some())
            .field("table_columns", &self.table_columns.is_some())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;
    use crate::Value;

    #[test]
    fn external_table_validated() {
        let mut block = Block::new();
        block.add_column("a", "UInt8").unwrap();
        block.add_column("b", "UInt8").unwrap();
        block.append_at(0, Value::UInt8(1)).unwrap();

        let options = QueryOptions::new().external_table("ext", block);
        assert!(options.validate().is_err());
        assert!(QueryOptions::new().validate().is_ok());
    }

    #[test]
    fn progress_handler() {
        let seen = Arc::new(AtomicU64::new(0));
        let counter = seen.clone();
        let options = QueryOptions::new().on_progress(move |p| {
            counter.fetch_add(p.rows, Ordering::Relaxed);
        });

        let progress = Progress { rows: 7, ..Progress::default() };
        options.handlers.progress(&progress);
        options.handlers.clone().progress(&progress);
        assert_eq!(seen.load(Ordering::Relaxed), 14);

        // no callback, no panic
        Handlers::default().progress(&progress);
    }
}
