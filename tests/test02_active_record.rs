use sql_record::prelude::*;
use tempfile::tempdir;

fn unique_db_path(prefix: &str) -> String {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join(format!("{prefix}.db"));
    // Leak the tempdir so the file persists for the duration of the test binary.
    std::mem::forget(dir);
    path.to_string_lossy().into_owned()
}

async fn test_orm(prefix: &str) -> Result<Table, RecordError> {
    let pool = ConnectionPool::builder(unique_db_path(prefix)).build()?;
    pool.execute_batch(
        "CREATE TABLE test_orm (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             name TEXT,
             content TEXT,
             type INTEGER,
             created TEXT
         );
         CREATE TABLE update_log (n INTEGER);
         CREATE TRIGGER test_orm_updated AFTER UPDATE ON test_orm
         BEGIN
             INSERT INTO update_log (n) VALUES (1);
         END;",
    )
    .await?;
    Table::builder("test_orm")
        .columns(["id", "name", "content", "type", "created"])
        .per_page(3)
        .echo(true)
        .bind(&pool)
}

async fn update_writes(table: &Table) -> Result<i64, RecordError> {
    let row = table
        .pool()
        .get("SELECT COUNT(*) AS n FROM update_log", &[])
        .await?;
    Ok(row.and_then(|r| r.get("n").and_then(Value::as_int)).unwrap_or(0))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn new_returns_the_stored_record() -> Result<(), Box<dyn std::error::Error>> {
    let table = test_orm("new").await?;
    let record = table
        .new(attrs! { "name" => "test", "content" => "hello", "type" => 1 })
        .await?
        .expect("inserted");
    assert_eq!(record.get_int("id"), Some(1));
    assert_eq!(record.get_text("name"), Some("test"));
    assert_eq!(record.get_int("type"), Some(1));
    assert!(record.get("created").is_some_and(Value::is_null));
    assert!(!record.is_dirty());

    assert!(table.new(Attrs::new()).await?.is_none());

    let err = table.new(attrs! { "nope" => 1 }).await.unwrap_err();
    assert_eq!(err.code(), "schema_violation");
    assert_eq!(err.offending_keys(), vec!["nope".to_string()]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn caller_identity_and_duplicate_exhaustion() -> Result<(), Box<dyn std::error::Error>> {
    let table = test_orm("identity").await?;
    let record = table
        .new(attrs! { "id" => 42, "name" => "answer" })
        .await?
        .expect("inserted");
    assert_eq!(record.identity(), Some(&Value::Int(42)));

    let err = table
        .new(attrs! { "id" => 42, "name" => "again" })
        .await
        .unwrap_err();
    assert_eq!(err.code(), "insert_exhausted");
    assert!(err.to_string().contains("3 attempts"), "{err}");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn three_inserts_then_find() -> Result<(), Box<dyn std::error::Error>> {
    let table = test_orm("find").await?;
    for (name, kind) in [("a", 1), ("b", 2), ("c", 1)] {
        table.new(attrs! { "name" => name, "type" => kind }).await?;
    }

    let ones = table.find(filters! { "type" => 1 }).await?;
    let names: Vec<_> = ones.iter().filter_map(|r| r.get_text("name")).collect();
    assert_eq!(names, vec!["a", "c"]);

    let either = table
        .find(
            Query::new()
                .filter(Filters::new().any("name", ["a", "b"]))
                .order_by(Order::desc("id")),
        )
        .await?;
    let names: Vec<_> = either.iter().filter_map(|r| r.get_text("name")).collect();
    assert_eq!(names, vec!["b", "a"]);

    let limited = table.find(Query::new().limit(0)).await?;
    assert!(limited.is_empty());

    let projected = table
        .find_rows(Query::new().fields(["name"]).filter(filters! { "id__gt" => 1 }))
        .await?;
    assert_eq!(projected.len(), 2);
    assert_eq!(projected[0].column_names(), ["name".to_string()]);

    let like = table.find(filters! { "name__like" => "b" }).await?;
    assert_eq!(like.len(), 1);

    let grouped = table
        .find(Query::new().args(or(&filters! { "type" => 2, "name" => "c" })?))
        .await?;
    assert_eq!(grouped.len(), 2);

    let err = table.find(filters! { "bogus" => 1 }).await.unwrap_err();
    assert_eq!(err.code(), "schema_violation");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn update_then_get() -> Result<(), Box<dyn std::error::Error>> {
    let table = test_orm("update").await?;
    let mut record = table
        .new(attrs! { "name" => "before", "type" => 1 })
        .await?
        .expect("inserted");

    let changed = record.update(attrs! { "name" => "after", "type" => 5 }).await?;
    assert_eq!(changed, 1);
    assert_eq!(record.get_text("name"), Some("after"));

    let fetched = table
        .get(&filters! { "id" => record.get_int("id").unwrap_or_default() })
        .await?
        .expect("row");
    assert_eq!(fetched.get_text("name"), Some("after"));
    assert_eq!(fetched.get_int("type"), Some(5));

    assert_eq!(record.update(Attrs::new()).await?, 0);
    let err = record.update(attrs! { "missing" => 1 }).await.unwrap_err();
    assert_eq!(err.code(), "schema_violation");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn save_twice_writes_once() -> Result<(), Box<dyn std::error::Error>> {
    let table = test_orm("save").await?;
    let mut record = table
        .new(attrs! { "name" => "draft" })
        .await?
        .expect("inserted");
    assert_eq!(update_writes(&table).await?, 0);

    record.set("name", "final")?.set("content", "body")?;
    assert_eq!(record.dirty_columns().collect::<Vec<_>>(), vec!["content", "name"]);
    assert_eq!(record.save().await?, 1);
    assert!(!record.is_dirty());
    assert_eq!(update_writes(&table).await?, 1);

    assert_eq!(record.save().await?, 0);
    assert_eq!(update_writes(&table).await?, 1);

    let stored = table.get(&filters! { "name" => "final" }).await?.expect("row");
    assert_eq!(stored.get_text("content"), Some("body"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn changing_identity_rewrites_the_loaded_row() -> Result<(), Box<dyn std::error::Error>> {
    let table = test_orm("identity_change").await?;
    let mut a = table.new(attrs! { "name" => "a" }).await?.expect("inserted");
    table.new(attrs! { "name" => "b" }).await?.expect("inserted");

    // moving `a` onto an id that is taken fails and leaves both rows alone
    a.set("name", "a2")?.set("id", 2)?;
    let err = a.save().await.unwrap_err();
    assert_eq!(err.code(), "transaction_failure");
    assert_eq!(a.identity(), Some(&Value::Int(1)));
    let b = table.get(&filters! { "id" => 2 }).await?.expect("row");
    assert_eq!(b.get_text("name"), Some("b"));
    let stored_a = table.get(&filters! { "id" => 1 }).await?.expect("row");
    assert_eq!(stored_a.get_text("name"), Some("a"));

    a.set("name", "a2")?.set("id", 10)?;
    assert_eq!(a.save().await?, 1);
    assert_eq!(a.identity(), Some(&Value::Int(10)));
    assert!(table.get(&filters! { "id" => 1 }).await?.is_none());
    let moved = table.get(&filters! { "id" => 10 }).await?.expect("row");
    assert_eq!(moved.get_text("name"), Some("a2"));

    assert_eq!(a.update(attrs! { "content" => "moved" }).await?, 1);
    let moved = table.get(&filters! { "id" => 10 }).await?.expect("row");
    assert_eq!(moved.get_text("content"), Some("moved"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cls_update_reports_affected_rows()-> Result<(), Box<dyn std::error::Error>> {
    let table = test_orm("cls_update").await?;
    let items: Vec<Attrs> = (0..5)
        .map(|i| attrs! { "name" => format!("n{i}"), "type" => i % 2 })
        .collect();
    let outcome = table.new_mul(&items).await?.expect("inserted");
    assert_eq!(outcome.rows_affected, 5);

    let changed = table
        .cls_update(&filters! { "content" => "even" }, &filters! { "type" => 0 })
        .await?;
    assert_eq!(changed, 3);
    assert_eq!(table.number(&filters! { "content" => "even" }).await?, 3);

    assert_eq!(table.cls_update(&Filters::new(), &filters! { "type" => 0 }).await?, 0);
    let err = table
        .cls_update(&filters! { "type__gt" => 1 }, &Filters::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "malformed_value");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bulk_insert_validates_items() -> Result<(), Box<dyn std::error::Error>> {
    let table = test_orm("bulk").await?;
    assert!(table.new_mul(&[]).await?.is_none());

    let err = table
        .new_mul(&[
            attrs! { "name" => "a", "type" => 1 },
            attrs! { "name" => "b" },
        ])
        .await
        .unwrap_err();
    assert_eq!(err.code(), "malformed_batch");
    assert_eq!(err.offending_keys(), vec!["type".to_string()]);
    assert_eq!(table.number(&Filters::new()).await?, 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pagination_covers_every_row_once() -> Result<(), Box<dyn std::error::Error>> {
    let table = test_orm("page").await?;
    let total = 7_usize;
    let items: Vec<Attrs> = (0..total)
        .map(|i| attrs! { "name" => format!("row{i}"), "type" => 1 })
        .collect();
    table.new_mul(&items).await?;

    let per_page = table.def().per_page() as usize;
    let last = total.div_ceil(per_page);
    let ordered = || Query::new().order_by(Order::asc("id"));

    let mut seen = Vec::new();
    for page in 1..=last {
        let rows = table.page(page as i64, None, ordered()).await?;
        if page < last {
            assert_eq!(rows.len(), per_page);
        } else {
            assert_eq!(rows.len(), total - per_page * (last - 1));
        }
        seen.extend(rows.iter().filter_map(|r| r.get_int("id")));
    }
    assert_eq!(seen, (1..=total as i64).collect::<Vec<_>>());
    assert!(table.page(last as i64 + 1, None, ordered()).await?.is_empty());

    let first = table.page(1, None, ordered()).await?;
    let clamped = table.page(0, None, ordered()).await?;
    assert_eq!(
        first.iter().map(|r| r.get_int("id")).collect::<Vec<_>>(),
        clamped.iter().map(|r| r.get_int("id")).collect::<Vec<_>>()
    );

    let wide = table.page(1, Some(5), filters! { "type" => 1 }).await?;
    assert_eq!(wide.len(), 5);

    assert!(table.page(i64::MAX, Some(u32::MAX), ordered()).await?.is_empty());
    let unbounded = table.find(Query::new().limit(u64::MAX)).await?;
    assert_eq!(unbounded.len(), total);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn exists_number_delete() -> Result<(), Box<dyn std::error::Error>> {
    let table = test_orm("delete").await?;
    for i in 0..4 {
        table.new(attrs! { "name" => format!("d{i}"), "type" => i }).await?;
    }

    assert!(table.exists(&filters! { "name" => "d2" }).await?);
    assert!(!table.exists(&filters! { "name" => "zz" }).await?);
    assert_eq!(table.number(&Filters::new()).await?, 4);
    assert_eq!(table.number(&Filters::new().any("type", [0, 3])).await?, 2);

    assert_eq!(table.delete(&filters! { "type__ge" => 2 }).await?, 2);
    assert_eq!(table.number(&Filters::new()).await?, 2);

    let err = table.delete(&Filters::new()).await.unwrap_err();
    assert_eq!(err.code(), "malformed_value");
    assert_eq!(table.number(&Filters::new()).await?, 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn all_and_find_iter() -> Result<(), Box<dyn std::error::Error>> {
    let table = test_orm("scan").await?;
    for name in ["x", "y", "z"] {
        table.new(attrs! { "name" => name }).await?;
    }

    let all = table.all(&[Order::desc("id")], Some(2)).await?;
    let names: Vec<_> = all.iter().filter_map(|r| r.get_text("name")).collect();
    assert_eq!(names, vec!["z", "y"]);
    assert_eq!(table.all(&[], None).await?.len(), 3);

    let mut iter = table
        .find_iter(Query::new().filter(filters! { "name__no" => "y" }).order_by(Order::asc("id")))
        .await?;
    let mut names = Vec::new();
    while let Some(record) = iter.next().await {
        names.push(record?.get_text("name").unwrap_or_default().to_string());
    }
    assert_eq!(names, vec!["x", "z"]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn single_join_filters_both_tables() -> Result<(), Box<dyn std::error::Error>> {
    let table = test_orm("join").await?;
    table
        .pool()
        .execute_batch(
            "CREATE TABLE kinds (id INTEGER PRIMARY KEY, label TEXT, active INTEGER);
             INSERT INTO kinds (id, label, active) VALUES (1, 'one', 1), (2, 'two', 0);",
        )
        .await?;
    for (name, kind) in [("a", 1), ("b", 2), ("c", 1)] {
        table.new(attrs! { "name" => name, "type" => kind }).await?;
    }

    let j = join("kinds", "kinds.id = test_orm.type", &filters! { "active" => 1 })?;
    let rows = table
        .find(
            Query::new()
                .filter(filters! { "name__no" => "c" })
                .join(j)
                .order_by(Order::asc("id")),
        )
        .await?;
    let names: Vec<_> = rows.iter().filter_map(|r| r.get_text("name")).collect();
    assert_eq!(names, vec!["a"]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dictify_fetched_record() -> Result<(), Box<dyn std::error::Error>> {
    let table = test_orm("dictify").await?;
    let record = table
        .new(attrs! { "name" => "stamp", "created" => "2023-06-01 08:09:10" })
        .await?
        .expect("inserted");

    let map = record.dictify(&DictOptions::new().fields(["name", "created"]));
    assert_eq!(map.len(), 2);
    assert_eq!(map["created"], "2023-06-01 08:09:10");

    let map = record.dictify(&DictOptions::new().formatter(|dt| dt.format("%Y/%m/%d").to_string()));
    assert_eq!(map["created"], "2023/06/01");
    assert_eq!(map["name"], "stamp");
    assert!(map["content"].is_null());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn execute_sql_passes_through() -> Result<(), Box<dyn std::error::Error>> {
    let table = test_orm("raw").await?;
    table.new(attrs! { "name" => "raw", "type" => 3 }).await?;

    match table
        .execute_sql(
            "SELECT name FROM test_orm WHERE type = %s",
            &[Value::from(3)],
            ExecMode::Query,
        )
        .await?
    {
        Executed::Rows(rows) => assert_eq!(rows.len(), 1),
        other => panic!("unexpected result: {other:?}"),
    }
    match table
        .execute_sql("UPDATE test_orm SET type = %s", &[Value::from(4)], ExecMode::ExecuteRowCount)
        .await?
    {
        Executed::Outcome(outcome) => assert_eq!(outcome.rows_affected, 1),
        other => panic!("unexpected result: {other:?}"),
    }
    Ok(())
}
