use std::env::var;
use kolom::{query, Config, Connection, Pool, PoolConfig, Result};

pub async fn main() -> Result<()> {

    let mut conn = Connection::connect(&var("DATABASE_URL").unwrap()).await?;
    query::<_, _, ()>("SELECT 1", &mut conn).fetch_all().await?;
    conn.ping().await?;
    conn.close().await?;

    let mut conn = Connection::connect_env().await?;
    query::<_, _, ()>("SELECT 1", &mut conn).fetch_all().await?;
    conn.close().await?;

    let config = Config::from_env().compression(Some(kolom::compress::Method::Lz4));
    let mut conn = Connection::connect_with(config).await?;
    query::<_, _, (u64,)>("SELECT count() FROM numbers(100000)", &mut conn).fetch_one().await?;
    conn.close().await?;

    let pool = Pool::connect(&var("DATABASE_URL").unwrap()).await?;
    query::<_, _, ()>("SELECT 1", &pool).fetch_all().await?;
    drop(pool);

    let pool = Pool::connect_env().await?;
    query::<_, _, ()>("SELECT 1", &pool).fetch_all().await?;
    pool.close();

    let pool = PoolConfig::from_env().max_open(2).max_idle(1).connect_lazy(&var("DATABASE_URL").unwrap())?;
    query::<_, _, ()>("SELECT 1", pool).fetch_all().await?;

    Ok(())
}
