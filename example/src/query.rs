use futures::TryStreamExt;
use kolom::{Connection, QueryOptions, Result, Row, query, query_row};
use time::OffsetDateTime;

pub async fn main() -> Result<()> {
    let mut conn = Connection::connect_env().await?;

    let (n, s): (u32, String) = query("SELECT {n:UInt32}, {s:String}", &mut conn)
        .param("n", 420)
        .param("s", "Foo")
        .fetch_one()
        .await?;

    assert_eq!(n, 420);
    assert_eq!(s, "Foo");

    let (null,): (Option<String>,) = query("SELECT NULL::Nullable(String)", &mut conn)
        .fetch_one()
        .await?;

    assert!(null.is_none());

    let row = query_row("SELECT 1 AS one, [1, 2, 3] AS list", &mut conn).fetch_one().await?;
    assert_eq!(row.try_get::<_, u8>("one").unwrap(), 1);
    assert_eq!(row.try_get::<_, Vec<u8>>("list").unwrap(), [1, 2, 3]);

    // `time`

    let (now,): (OffsetDateTime,) = query("SELECT now()", &mut conn).fetch_one().await?;
    assert!(now.year() >= 2025);

    // streaming

    let options = QueryOptions::new()
        .setting("max_block_size", 1000)
        .on_progress(|progress| tracing::info!(rows = progress.rows, "progress"));

    let mut rows = query::<_, _, (u64,)>("SELECT number FROM numbers(10000)", &mut conn)
        .options(options)
        .fetch()
        .await?;

    let mut sum = 0;
    while let Some(row) = rows.next().await {
        sum += row?.0;
    }
    let summary = rows.finish().await?;
    tracing::info!(blocks = summary.blocks(), rows = summary.rows(), "streamed");

    assert_eq!(sum, (0..10000).sum());

    let numbers: Vec<(u64,)> = query::<_, _, (u64,)>("SELECT number FROM numbers(5)", &mut conn)
        .fetch()
        .await?
        .try_collect()
        .await?;
    assert_eq!(numbers.len(), 5);

    let rows: Vec<Row> = query("SELECT * FROM system.one", &mut conn).fetch_all().await?;
    assert_eq!(rows.len(), 1);

    Ok(())
}
