#![allow(dead_code)]

use serde_json::{json, Value};
use std::sync::Arc;
use suite_sdk::{
    ApplicationDef, CollectionDef, DispatchError, Document, Invocation, MemoryStore, MethodDescriptor, Receiver,
    SchemaDefinition, Store, Suite, SuiteConfig,
};

pub fn widget_schema() -> SchemaDefinition {
    SchemaDefinition::object()
        .property("id", SchemaDefinition::string())
        .property("name", SchemaDefinition::string())
        .property("count", SchemaDefinition::integer().minimum(0.0).with_default(json!(0)))
        .property("tags", SchemaDefinition::array(SchemaDefinition::string()))
        .property("gadget", SchemaDefinition::integer())
        .require("name")
        .closed()
}

fn gadget_schema() -> SchemaDefinition {
    SchemaDefinition::object()
        .property("num", SchemaDefinition::integer())
        .property("label", SchemaDefinition::string())
}

fn receiver_name(inv: &Invocation) -> &'static str {
    match inv.receiver {
        Receiver::None => "none",
        Receiver::Collection(_) => "collection",
        Receiver::Document(_) => "document",
    }
}

pub fn app1() -> ApplicationDef {
    let combine = MethodDescriptor::collection("combine", |inv: Invocation| async move {
        let other: Option<String> = inv.arg("other")?;
        Ok::<_, DispatchError>(json!({ "receiver": receiver_name(&inv), "other": other }))
    })
    .describe("Echo the receiver kind")
    .parameters(SchemaDefinition::object().property("other", SchemaDefinition::string()))
    .returns(
        SchemaDefinition::object()
            .property("receiver", SchemaDefinition::string())
            .property(
                "other",
                SchemaDefinition::from_value(json!({"type": ["string", "null"]})).unwrap(),
            ),
    );

    let secret = MethodDescriptor::collection("secret", |inv: Invocation| async move {
        Ok::<_, DispatchError>(json!({ "receiver": receiver_name(&inv) }))
    })
    .hidden();

    let broken = MethodDescriptor::collection("broken", |_inv: Invocation| async move {
        Ok::<_, DispatchError>(json!(17))
    })
    .returns(SchemaDefinition::string());

    let touch = MethodDescriptor::document("touch", |inv: Invocation| async move {
        let key = inv.document()?.key().clone();
        Ok::<_, DispatchError>(json!({ "receiver": receiver_name(&inv), "key": key }))
    });

    let ping = MethodDescriptor::application("ping", |inv: Invocation| async move {
        Ok::<_, DispatchError>(json!({ "receiver": receiver_name(&inv) }))
    });

    ApplicationDef::new("app1")
        .describe("Fixture application")
        .register_collection(
            CollectionDef::new("widgets", widget_schema())
                .index("name")
                .relation("gadget", "gadgets")
                .register_method(combine)
                .register_method(secret)
                .register_method(broken)
                .register_method(touch),
        )
        .register_collection(
            CollectionDef::new("gadgets", gadget_schema())
                .primary_key("num")
                .operations([suite_sdk::Operation::Read, suite_sdk::Operation::Create]),
        )
        .register_method(ping)
}

pub fn suite_with(store: Arc<dyn Store>) -> Arc<Suite> {
    Suite::builder()
        .with_config(SuiteConfig {
            name: Some("fixture".into()),
            ..Default::default()
        })
        .store(store)
        .register(app1())
        .build()
        .expect("fixture suite builds")
}

pub fn suite() -> Arc<Suite> {
    suite_with(Arc::new(MemoryStore::new()))
}

/// Create and persist a widget.
pub async fn put_widget(suite: &Suite, fields: Value) -> Document {
    let widgets = suite.lookup("app1").unwrap().collection("widgets").unwrap().clone();
    let mut doc = widgets.create(fields).expect("valid widget");
    doc.save().await.expect("saved");
    doc
}
