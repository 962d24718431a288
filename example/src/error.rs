use kolom::{DecodeError, FromRow, Pool, Result, Row, execute, query};
use tracing::{Instrument, trace_span};

pub async fn main() -> Result<()> {
    let pool = Pool::connect_env().await?;

    let handles = (0..48).map(|i| {
        let pool = pool.clone();
        tokio::spawn(async move {
            if i % 6 == 0 {
                execute("SELECT foo", pool).await?;
            } else {
                query::<_, _, FailRow>("SELECT 1", pool).fetch_all().await?;
            }
            Ok::<_, kolom::Error>(())
        }.instrument(trace_span!("error")))
    });

    for h in handles {
        let _ = h.await.unwrap();
    }

    // connections that failed are not returned to the pool
    assert!(pool.idle() <= 5);

    Ok(())
}

struct FailRow;

impl FromRow for FailRow {
    fn from_row(_: Row) -> Result<Self, DecodeError> {
        Err(DecodeError::IndexOutOfBounds(69))
    }
}
