use std::time::Duration;

use crate::{Config, Result};

use super::Pool;

/// Pool configuration builder.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    pub(crate) conn: Config,
    pub(crate) max_open: usize,
    pub(crate) max_idle: usize,
    pub(crate) max_lifetime: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl PoolConfig {
    pub fn new(conn: Config) -> PoolConfig {
        Self {
            conn,
            max_open: 10,
            max_idle: 5,
            max_lifetime: Duration::from_secs(3600),
        }
    }

    /// Pool config with connection config from environment.
    ///
    /// See [`Config::from_env`] for more details on env.
    pub fn from_env() -> PoolConfig {
        Self::new(Config::from_env())
    }

    /// Get connection config.
    pub fn connection(&self) -> &Config {
        &self.conn
    }

    /// Set connection config.
    pub fn with_connection(mut self, conn: Config) -> Self {
        self.conn = conn;
        self
    }

    /// Set max checked out connection, default to 10.
    pub fn max_open(mut self, value: usize) -> Self {
        self.max_open = value.max(1);
        self
    }

    /// Set max idle connection, default to 5.
    pub fn max_idle(mut self, value: usize) -> Self {
        self.max_idle = value;
        self
    }

    /// Set connection max lifetime, default to 1 hour.
    pub fn max_lifetime(mut self, value: Duration) -> Self {
        self.max_lifetime = value;
        self
    }
}

impl PoolConfig {
    pub async fn connect(mut self, url: &str) -> Result<Pool> {
        self.conn = Config::parse(url)?;
        Pool::connect_with(self).await
    }

    pub fn connect_lazy(mut self, url: &str) -> Result<Pool> {
        self.conn = Config::parse(url)?;
        Ok(Pool::connect_lazy_with(self))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.max_open, 10);
        assert_eq!(config.max_idle, 5);
        assert_eq!(config.max_lifetime, Duration::from_secs(3600));
        assert_eq!(PoolConfig::default().max_open(0).max_open, 1);
    }
}
