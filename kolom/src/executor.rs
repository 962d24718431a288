//! The [`Executor`] trait.
use std::{future::Ready, ops::DerefMut};

use crate::{Connection, Result, pool::PoolConnection};

/// A type that can returns a [`Connection`].
pub trait Executor {
    /// The returned connection.
    type Connection: DerefMut<Target = Connection> + Send + Unpin;

    /// Future that resolve to [`Executor::Connection`].
    type Future: Future<Output = Result<Self::Connection>> + Send + Unpin;

    /// Acquire the connection.
    fn connection(self) -> Self::Future;
}

impl<'a> Executor for &'a mut Connection {
    type Connection = &'a mut Connection;

    type Future = Ready<Result<Self::Connection>>;

    fn connection(self) -> Self::Future {
        std::future::ready(Ok(self))
    }
}

impl<'a> Executor for &'a mut PoolConnection {
    type Connection = &'a mut Connection;

    type Future = Ready<Result<Self::Connection>>;

    fn connection(self) -> Self::Future {
        std::future::ready(Ok(&mut **self))
    }
}

#[cfg(test)]
mod test {
    use super::Executor;
    use crate::{Pool, query::query};

    #[allow(unused, reason = "type assertion")]
    async fn assert_type<E: Executor>(e: E) {
        let _ = query::<_, _, ()>("", e).fetch_all().await;
    }

    #[allow(unused, reason = "type assertion")]
    async fn assert_type2<E: Executor>(e: E) {
        let mut e = e.connection().await.unwrap();
        let _ = query::<_, _, ()>("", &mut *e).fetch_all().await;
        let _ = query::<_, _, ()>("", &mut *e).await;
    }

    #[allow(unused, reason = "type assertion")]
    async fn assert_pool(pool: Pool) {
        let _ = query::<_, _, (u8,)>("", &pool).fetch_one().await;
        let mut conn = pool.acquire().await.unwrap();
        let _ = query::<_, _, (u8,)>("", &mut conn).fetch_optional().await;
        let _ = query::<_, _, ()>("", pool).await;
    }

    fn assert_send<T: Send>(_: T) { }

    #[allow(unused, reason = "type assertion")]
    fn futures_are_send(pool: Pool) {
        assert_send(query::<_, _, (u8,)>("", pool.clone()).fetch_all());
        assert_send(query::<_, _, ()>("", pool).execute());
    }
}
