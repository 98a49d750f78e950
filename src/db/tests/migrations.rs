use super::test_db;

#[tokio::test]
async fn test_database_creation() {
    let (db, _temp_file) = test_db().await;

    let tables: Vec<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .fetch_all(db.pool())
            .await
            .unwrap();

    assert!(tables.contains(&"podcasts".to_string()));
    assert!(tables.contains(&"episodes".to_string()));
    assert!(tables.contains(&"schema_version".to_string()));

    let version: i64 = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(version, 2);

    db.close().await;
}

#[tokio::test]
async fn test_reopening_does_not_reapply_migrations() {
    let temp_file = tempfile::NamedTempFile::new().unwrap();
    let db = crate::db::Database::new(temp_file.path()).await.unwrap();
    db.close().await;

    let db = crate::db::Database::new(temp_file.path()).await.unwrap();
    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_version")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(applied, 2, "each migration is recorded exactly once");
    db.close().await;
}
