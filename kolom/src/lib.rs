//! ClickHouse Native Protocol Driver
//!
//! # Examples
//!
//! Single connection:
//!
//! ```no_run
//! use kolom::Connection;
//!
//! # async fn app() -> kolom::Result<()> {
//! let mut conn = Connection::connect_env().await?;
//!
//! let res = kolom::query::<_, _, (u32, String)>("SELECT {n:UInt32}, 'Foo'", &mut conn)
//!     .param("n", 420)
//!     .fetch_one()
//!     .await?;
//!
//! assert_eq!(res.0, 420);
//! assert_eq!(res.1.as_str(), "Foo");
//! # Ok(())
//! # }
//! ```
//!
//! Database Pooling:
//!
//! ```no_run
//! use kolom::Pool;
//!
//! # async fn app() -> kolom::Result<()> {
//! let pool = Pool::connect_env().await?;
//!
//! kolom::execute("CREATE TABLE IF NOT EXISTS foo (id UInt32) ENGINE = Memory", &pool).await?;
//!
//! let mut conn = pool.acquire().await?;
//! let mut batch = kolom::prepare_batch("INSERT INTO foo", &mut conn).await?;
//! for i in 0..14u32 {
//!     batch.append((i,))?;
//! }
//! batch.send().await?;
//! drop(batch);
//!
//! let foos = kolom::query::<_, _, (u32,)>("SELECT id FROM foo", &pool)
//!     .fetch_all()
//!     .await?;
//!
//! assert_eq!(foos.len(), 14);
//! # Ok(())
//! # }
//! ```
//!
//! Streaming:
//!
//! ```no_run
//! # async fn app(pool: kolom::Pool) -> kolom::Result<()> {
//! let mut rows = kolom::query::<_, _, (u64,)>("SELECT number FROM system.numbers LIMIT 1000000", &pool)
//!     .fetch()
//!     .await?;
//!
//! while let Some(row) = rows.next().await {
//!     let (number,) = row?;
//!     # let _ = number;
//! }
//! # Ok(())
//! # }
//! ```

pub mod common;
mod io;
pub mod net;
mod ext;

// Protocol
pub mod protocol;
pub mod compress;
mod stream;

// Encoding
mod value;
pub mod column;
pub mod block;
pub mod encode;
pub mod row;
pub mod types;

// Operation
pub mod transport;
mod phase;
pub mod executor;
pub mod query;
pub mod fetch;
pub mod batch;

// Connection
pub mod connection;
pub mod pool;

mod error;

#[cfg(test)]
mod mock;

pub use value::{Value, Decimal};
pub use block::Block;
pub use encode::{Encode, EncodeRow};
pub use row::{Row, FromRow, Decode, DecodeError};

pub use executor::Executor;
pub use connection::{Connection, Config};
pub use pool::{Pool, PoolConfig};
pub use query::QueryOptions;
#[doc(inline)]
pub use query::{query, query_row, execute};
#[doc(inline)]
pub use batch::{prepare_batch, prepare_batch_with};
pub use error::{Error, ErrorKind, Result};
