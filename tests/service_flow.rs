use std::sync::Arc;

use futures::StreamExt;
use serde_json::{json, Map, Value};

use sqlitecloud_service::config::{
    Config, Credentials, FeatureFlags, LoggingConfig, PoolConfig, RemoteConfig, SessionConfig,
};
use sqlitecloud_service::error::ServiceError;
use sqlitecloud_service::models::{
    Binding, Column, Element, Entity, Expr, Insert, InsertData, LogicalType, Query, Select, SqlValue,
};
use sqlitecloud_service::services::remote::{InMemoryClient, InMemoryConnector};
use sqlitecloud_service::services::{RowStream, SqliteCloudService, PAGE_SIZE};

fn config(credentials: Credentials) -> Config {
    Config {
        credentials,
        pool: PoolConfig {
            max_size: 1,
            ..PoolConfig::default()
        },
        features: FeatureFlags::default(),
        session: SessionConfig::default(),
        remote: RemoteConfig::default(),
        logging: LoggingConfig {
            level: "debug".to_string(),
            style: "never".to_string(),
        },
    }
}

fn service_with(client: &Arc<InMemoryClient>) -> (SqliteCloudService, Arc<InMemoryConnector>) {
    let connector = Arc::new(InMemoryConnector::new(Arc::clone(client)));
    let credentials = Credentials {
        connection_string: Some("sqlitecloud://admin:pw@demo.sqlite.cloud:8860/bookshop.sqlite?apikey=k".to_string()),
        ..Credentials::default()
    };
    let service = SqliteCloudService::new(&config(credentials), connector.clone()).unwrap();
    (service, connector)
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {}", other),
    }
}

fn json_row(value: Value) -> Value {
    json!({ "_json_": value.to_string() })
}

fn books() -> Entity {
    Entity::new(
        "sap.capire.bookshop.Books",
        vec![
            Element::new("ID", LogicalType::Integer).key(),
            Element::new("title", LogicalType::String { length: Some(111) }),
            Element::new("createdAt", LogicalType::Timestamp),
            Element::new("createdBy", LogicalType::String { length: Some(255) }),
        ],
    )
}

#[tokio::test]
async fn test_insert_then_read_for_tenant() {
    let client = Arc::new(
        InMemoryClient::new()
            .with_rows(vec![])
            .with_rows(vec![json_row(json!({"ID": 201, "title": "Wuthering Heights"}))]),
    );
    let (service, connector) = service_with(&client);

    let mut session = service.begin(Some("t1")).await.unwrap();
    session.set(object(json!({"$user.id": "alice"}))).unwrap();

    let changes = session
        .on_simple(&Query::Insert(Insert {
            into: books(),
            data: InsertData::Entries(vec![object(json!({
                "ID": 201,
                "title": "Wuthering Heights",
                "createdAt": "2024-03-01T12:00:00+02:00"
            }))]),
        }))
        .await
        .unwrap();
    assert_eq!(changes, 1);

    let book = session
        .read(&Query::Select(
            Select::from_entity("sap.capire.bookshop.Books")
                .columns(["ID", "title"])
                .filter(Expr::col("createdBy").equals(Expr::session("$user.id")))
                .one(),
        ))
        .await
        .unwrap();
    assert_eq!(book, json!({"ID": 201, "title": "Wuthering Heights"}));

    assert_eq!(
        connector.connection_strings(),
        vec!["sqlitecloud://admin:pw@demo.sqlite.cloud:8860/t1?apikey=k".to_string()]
    );

    let queries = client.recorded_queries();
    assert_eq!(queries.len(), 2);
    assert!(queries[0].sql.starts_with("INSERT INTO sap_capire_bookshop_Books (ID,title,createdAt) SELECT"));
    assert!(queries[0].sql.ends_with("FROM json_each(?)"));
    assert_eq!(
        queries[1].sql,
        "SELECT json_object('ID',Q.ID,'title',Q.title) AS _json_ FROM \
         (SELECT ID as ID,title as title FROM sap_capire_bookshop_Books WHERE createdBy = ? LIMIT 1) AS Q"
    );
    assert_eq!(queries[1].values, vec![SqlValue::Text("alice".to_string())]);
}

#[tokio::test]
async fn test_session_merge_and_release() {
    let client = Arc::new(InMemoryClient::new());
    let (service, _) = service_with(&client);

    let mut session = service.begin(None).await.unwrap();
    session.set(object(json!({"foo": "bar", "keep": 1}))).unwrap();
    session.set(object(json!({"foo": "baz", "$user.locale": "de"}))).unwrap();

    let context = session.session_context().unwrap();
    assert_eq!(context["foo"], "baz");
    assert_eq!(context["keep"], 1);
    assert_eq!(context["LOCALE"], "de");
    session.release();

    // Pool size is one, so this is the same connection
    let mut reused = service.begin(None).await.unwrap();
    reused.set(object(json!({"other": true}))).unwrap();
    let context = reused.session_context().unwrap();
    assert_eq!(context.len(), 1);
    assert!(!context.contains_key("foo"));
}

#[tokio::test]
async fn test_stream_modes() {
    let rows: Vec<Value> = (0..1500)
        .map(|i| json_row(json!({"ID": i, "descr": "y".repeat(80)})))
        .collect();
    let client = Arc::new(
        InMemoryClient::new()
            .with_rows(rows.clone())
            .with_rows(rows.clone())
            .with_rows(rows)
            .with_rows(vec![]),
    );
    let (service, _) = service_with(&client);
    let session = service.begin(None).await.unwrap();

    let select = Query::Select(Select::from_entity("Books").columns(["ID", "descr"]));
    let one = Query::Select(Select::from_entity("Books").columns(["ID", "descr"]).one());

    // Array mode across several pages
    let chunks = match session.stream(&select, false).await.unwrap() {
        RowStream::Json(stream) => stream.collect::<Vec<_>>().await,
        other => panic!("unexpected {:?}", other),
    };
    assert!(chunks.len() > 1);
    assert!(chunks[0].len() > PAGE_SIZE);
    let parsed: Vec<Value> = serde_json::from_str(&chunks.concat()).unwrap();
    assert_eq!(parsed.len(), 1500);
    assert_eq!(parsed[1499]["ID"], 1499);

    // One mode yields the first row only
    let chunks = match session.stream(&one, false).await.unwrap() {
        RowStream::Json(stream) => stream.collect::<Vec<_>>().await,
        other => panic!("unexpected {:?}", other),
    };
    assert_eq!(chunks.len(), 1);
    let first: Value = serde_json::from_str(&chunks[0]).unwrap();
    assert_eq!(first["ID"], 0);

    // Object mode yields one value per row, in order
    let values = match session.stream(&select, true).await.unwrap() {
        RowStream::Objects(stream) => stream.collect::<Vec<_>>().await,
        other => panic!("unexpected {:?}", other),
    };
    assert_eq!(values.len(), 1500);
    assert_eq!(values[10].as_ref().unwrap()["ID"], 10);

    // Empty result
    let empty = session.stream(&select, false).await.unwrap().into_json().await.unwrap();
    assert_eq!(empty, "[]");
}

#[tokio::test]
async fn test_remote_failure_carries_generated_sql() {
    let client = Arc::new(InMemoryClient::new().with_error("UNIQUE constraint failed: Books.ID"));
    let (service, _) = service_with(&client);
    let session = service.begin(None).await.unwrap();

    let err = session
        .on_simple(&Query::Insert(Insert {
            into: books(),
            data: InsertData::Rows {
                columns: vec!["ID".to_string(), "title".to_string()],
                rows: vec![vec![1.into(), "Dup".into()]],
            },
        }))
        .await
        .unwrap_err();

    assert_eq!(
        err.query(),
        Some("INSERT INTO sap_capire_bookshop_Books (ID,title) VALUES (?,?)")
    );
    assert!(matches!(err.root(), ServiceError::Remote(msg) if msg.contains("UNIQUE")));
}

#[tokio::test]
async fn test_invalid_date_never_reaches_remote() {
    let client = Arc::new(InMemoryClient::new());
    let (service, _) = service_with(&client);
    let session = service.begin(None).await.unwrap();

    let err = session
        .read(&Query::Select(
            Select::from_entity("Books")
                .column(Column::new(Expr::col("createdAt")).typed(LogicalType::Timestamp))
                .filter(Expr::col("createdAt").equals(Expr::val("2024-13-01T00:00:00Z"))),
        ))
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Value does not contain a valid date \"2024-13-01T00:00:00Z\"");
    assert!(client.recorded_queries().is_empty());
}

#[tokio::test]
async fn test_pragma_exec_and_plain_sql() {
    let client = Arc::new(InMemoryClient::new().with_rows(vec![json!({"journal_mode": "wal"})]));
    let (service, _) = service_with(&client);

    let rows = service.pragma(None, "journal_mode", None).await.unwrap();
    assert_eq!(rows[0]["journal_mode"], "wal");

    let session = service.begin(None).await.unwrap();
    session.exec("DELETE FROM Books").await.unwrap();
    session
        .on_plain_sql(
            "INSERT INTO Covers (ID, image) VALUES (?, ?)",
            vec![Binding::Scalar(SqlValue::Integer(1)), Binding::Blob(b"png".to_vec())],
        )
        .await
        .unwrap();

    let queries = client.recorded_queries();
    assert_eq!(queries[0].sql, "PRAGMA journal_mode");
    assert_eq!(queries[1].sql, "DELETE FROM Books");
    assert_eq!(
        queries[2].values,
        vec![SqlValue::Integer(1), SqlValue::Text("cG5n".to_string())]
    );
}

#[tokio::test]
async fn test_missing_credentials() {
    let connector = Arc::new(InMemoryConnector::new(Arc::new(InMemoryClient::new())));
    let service = SqliteCloudService::new(&config(Credentials::default()), connector).unwrap();

    let err = service.begin(Some("t1")).await.unwrap_err();
    assert!(matches!(err, ServiceError::Configuration(_)));
}
