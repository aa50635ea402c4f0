//! Example consumer: a small library suite served over HTTP.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! With `DATABASE_URL` set, documents live in PostgreSQL; otherwise in memory.

use serde_json::{json, Value};
use std::sync::Arc;
use suite_sdk::{
    common_routes_with_ready, suite_routes, AppState, ApplicationDef, CollectionDef, DispatchError, Invocation,
    MemoryStore, MethodDescriptor, PgStore, SchemaDefinition, Store, Suite, SuiteConfig,
};
use tokio::net::TcpListener;

fn library() -> ApplicationDef {
    let book = SchemaDefinition::object()
        .property("id", SchemaDefinition::string().describe("Catalogue key"))
        .property("title", SchemaDefinition::string())
        .property("author", SchemaDefinition::string())
        .property("year", SchemaDefinition::integer().minimum(0.0))
        .property("available", SchemaDefinition::boolean().with_default(json!(true)))
        .require("title")
        .closed();

    let checkout = MethodDescriptor::document("checkout", |inv: Invocation| async move {
        let mut doc = inv.into_document()?;
        if doc.get("available") == Some(&Value::Bool(false)) {
            return Err(DispatchError::Conflict(format!("book '{}' is already checked out", doc.key_string())));
        }
        doc.set("available", Value::Bool(false))?;
        doc.save().await?;
        Ok::<_, DispatchError>(doc.to_value())
    })
    .describe("Mark the book as checked out");

    let by_author = MethodDescriptor::collection("by_author", |inv: Invocation| async move {
        let author: String = inv.arg("author")?.unwrap_or_default();
        let collection = inv.collection()?;
        let books = collection
            .list(suite_sdk::Filter {
                equals: vec![("author".into(), Value::String(author))],
                ..Default::default()
            })
            .await?;
        Ok::<_, DispatchError>(json!(books.iter().filter_map(|b| b.get("title").cloned()).collect::<Vec<_>>()))
    })
    .describe("Titles written by one author")
    .parameters(SchemaDefinition::object().property("author", SchemaDefinition::string()).require("author"))
    .returns(SchemaDefinition::array(SchemaDefinition::string()));

    let stats = MethodDescriptor::application("stats", |inv: Invocation| async move {
        let books = inv.suite.lookup("library")?.collection("books")?.clone();
        let count = books.list(Default::default()).await?.len();
        Ok::<_, DispatchError>(json!({ "books": count }))
    })
    .describe("Counts per collection")
    .returns(SchemaDefinition::object().property("books", SchemaDefinition::integer()));

    ApplicationDef::new("library")
        .describe("A small lending library")
        .register_collection(
            CollectionDef::new("books", book)
                .describe("Catalogued books")
                .index("author")
                .register_method(checkout)
                .register_method(by_author),
        )
        .register_method(stats)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("suite_sdk=info")),
        )
        .init();

    let config = SuiteConfig::from_env()?;
    let store: Arc<dyn Store> = match config.database_url.as_deref() {
        Some(url) => {
            PgStore::ensure_database_exists(url).await?;
            Arc::new(PgStore::connect(url).await?)
        }
        None => {
            tracing::info!("DATABASE_URL not set; using the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let suite = Suite::builder()
        .with_config(SuiteConfig {
            name: Some("demo".into()),
            ..Default::default()
        })
        .with_config(config)
        .store(store)
        .register(library())
        .build()?;
    suite.prepare_storage().await?;

    let state = AppState::new(suite);
    let app = suite_routes(state.clone()).merge(common_routes_with_ready(state));
    let listener = TcpListener::bind("127.0.0.1:3000").await?;
    let port = listener.local_addr()?.port();
    tracing::info!("Example consumer listening on http://127.0.0.1:{}", port);
    axum::serve(listener, app).await?;
    Ok(())
}
