use kolom::{Connection, Result, execute, prepare_batch, query};

pub async fn main() -> Result<()> {
    let mut conn = Connection::connect_env().await?;

    execute("DROP TABLE IF EXISTS kolom_post", &mut conn).await?;
    execute(
        "CREATE TABLE kolom_post (
            id UInt64,
            name String,
            tags Array(String),
            status Enum8('draft' = 1, 'published' = 2),
            score Nullable(Float64)
        ) ENGINE = Memory",
        &mut conn,
    )
    .await?;

    let mut batch = prepare_batch("INSERT INTO kolom_post VALUES (?, ?, ?, ?, ?)", &mut conn).await?;
    for id in 0..100u64 {
        let score = (id % 2 == 0).then_some(id as f64 / 10.0);
        batch.append((id, format!("post {id}"), vec!["a", "b"], "draft", score))?;
        if id % 50 == 49 {
            batch.flush().await?;
        }
    }
    batch.send().await?;
    drop(batch);

    let (count,): (u64,) = query("SELECT count() FROM kolom_post", &mut conn).fetch_one().await?;
    assert_eq!(count, 100);

    execute("DROP TABLE kolom_post", &mut conn).await?;

    Ok(())
}
