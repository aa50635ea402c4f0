mod common;

use serde_json::json;
use std::sync::Arc;
use suite_sdk::{
    ApplicationDef, CollectionDef, ConfigError, MemoryStore, SchemaDefinition, Store, Suite, SuiteConfig,
};

fn store() -> Arc<dyn Store> {
    Arc::new(MemoryStore::new())
}

fn notes() -> CollectionDef {
    CollectionDef::new("notes", SchemaDefinition::object().property("text", SchemaDefinition::string()))
}

#[test]
fn duplicate_application_names_fail_the_build() {
    let err = Suite::builder()
        .store(store())
        .register(ApplicationDef::new("dup").register_collection(notes()))
        .register(ApplicationDef::new("dup"))
        .build()
        .unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateName { .. }));
}

#[test]
fn unknown_relation_target_fails_the_build() {
    let err = Suite::builder()
        .store(store())
        .register(ApplicationDef::new("a").register_collection(notes().relation("owner", "b.people")))
        .build()
        .unwrap_err();
    assert!(matches!(err, ConfigError::MissingReference { .. }));
}

#[test]
fn a_store_is_required() {
    let err = Suite::builder()
        .register(ApplicationDef::new("a").register_collection(notes()))
        .build()
        .unwrap_err();
    assert!(matches!(err, ConfigError::MissingReference { kind: "store", .. }));
}

#[test]
fn later_partials_override_earlier_ones() {
    let suite = Suite::builder()
        .with_config(SuiteConfig {
            name: Some("first".into()),
            base_path: Some("v1/".into()),
            max_results: Some(20),
            ..Default::default()
        })
        .with_config(SuiteConfig::from_json_str(r#"{"name": "second", "namespace_prefix": "x_"}"#).unwrap())
        .store(store())
        .register(ApplicationDef::new("a").register_collection(notes()))
        .build()
        .unwrap();
    assert_eq!(suite.name(), "second");
    assert_eq!(suite.base_path(), "/v1");
    assert_eq!(suite.settings().max_results, 20);
    let app = suite.lookup("a").unwrap();
    assert_eq!(app.url(), "/v1/a");
    assert_eq!(app.namespace(), "x_a");
    assert_eq!(app.collection("notes").unwrap().url(), "/v1/a/notes");
}

#[test]
fn shared_definitions_are_inlined() {
    let address = SchemaDefinition::object()
        .property("zip", SchemaDefinition::string())
        .require("zip");
    let mut definitions = std::collections::BTreeMap::new();
    definitions.insert("address".to_string(), address);
    let people = CollectionDef::new(
        "people",
        SchemaDefinition::from_value(json!({
            "type": "object",
            "properties": {"home": {"$ref": "#/definitions/address"}}
        }))
        .unwrap(),
    );
    let suite = Suite::builder()
        .with_config(SuiteConfig {
            definitions,
            ..Default::default()
        })
        .store(store())
        .register(ApplicationDef::new("a").register_collection(people))
        .build()
        .unwrap();
    let people = suite.lookup("a").unwrap().collection("people").unwrap().clone();
    let err = people.create(json!({"home": {}})).unwrap_err();
    assert_eq!(err.paths(), vec!["home.zip"]);
}

#[tokio::test]
async fn storage_prepares_and_pings() {
    let suite = common::suite();
    suite.prepare_storage().await.unwrap();
    suite.ping_stores().await.unwrap();
    let names: Vec<_> = suite.applications().map(|a| a.name().to_string()).collect();
    assert_eq!(names, vec!["app1"]);
}
