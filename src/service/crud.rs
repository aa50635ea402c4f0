//! Built-in CRUD operations, expressed as ordinary method descriptors so they are validated,
//! dispatched and documented like any declared method.

use crate::error::{DispatchError, ValidationError};
use crate::model::{Collection, Invocation, MethodDescriptor, Operation, OwnerKind};
use crate::schema::{SchemaDefinition, SchemaType, TypeSpec};
use crate::store::{Condition, Filter, OrderBy};
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;

pub const LIMIT_ARG: &str = "limit";
pub const OFFSET_ARG: &str = "offset";
pub const ITEMS_ARG: &str = "items";
pub const DELETE_ALL_ARG: &str = "delete_all";
pub const FLT_ARG: &str = "flt";
pub const ORDER_BY_ARG: &str = "order_by";
pub const START_ARG: &str = "start";
pub const END_ARG: &str = "end";
pub const AGG_ARG: &str = "agg";

/// Listing arguments that are never field equalities.
const LIST_ARGS: [&str; 7] = [LIMIT_ARG, OFFSET_ARG, FLT_ARG, ORDER_BY_ARG, START_ARG, END_ARG, AGG_ARG];

/// Built-ins for one collection, split by receiver level.
pub(crate) struct BuiltinOperations {
    pub collection: Vec<MethodDescriptor>,
    pub document: Vec<MethodDescriptor>,
}

/// Document schema without the key requirement: keys are assigned on create when absent.
fn creation_schema(document: &SchemaDefinition, primary_key: &str) -> SchemaDefinition {
    let mut schema = document.clone();
    schema.required.retain(|r| r != primary_key);
    schema
}

fn filter_schema(document: &SchemaDefinition) -> SchemaDefinition {
    let partial = document.partial();
    SchemaDefinition {
        properties: partial.properties,
        additional_properties: partial.additional_properties,
        ..SchemaDefinition::object()
    }
}

pub(crate) fn collection_operations(
    document: &SchemaDefinition,
    primary_key: &str,
    enabled: &BTreeSet<Operation>,
    max_results: usize,
) -> BuiltinOperations {
    let key_schema = document.properties.get(primary_key).cloned().unwrap_or_else(SchemaDefinition::string);
    let mut collection = Vec::new();
    let mut doc = Vec::new();

    if enabled.contains(&Operation::Read) {
        let params = filter_schema(document)
            .property(
                LIMIT_ARG,
                SchemaDefinition::integer()
                    .minimum(1.0)
                    .with_default(json!(max_results))
                    .describe("Maximum documents returned; clamped to 1000"),
            )
            .property(
                OFFSET_ARG,
                SchemaDefinition::integer().minimum(0.0).with_default(json!(0)).describe("Documents skipped"),
            )
            .property(
                FLT_ARG,
                SchemaDefinition {
                    type_: Some(TypeSpec::Union(vec![SchemaType::Object, SchemaType::Array])),
                    ..Default::default()
                }
                .describe("Filter terms: {op, lhs, rhs} with op one of == != < <= > >= match contains, or {op: has_fields, fields}"),
            )
            .property(
                ORDER_BY_ARG,
                SchemaDefinition::string().describe("Field to order by; a leading '-' sorts descending"),
            )
            .property(
                START_ARG,
                SchemaDefinition::integer().minimum(0.0).describe("First position of a slice; overrides offset"),
            )
            .property(
                END_ARG,
                SchemaDefinition::integer()
                    .minimum(0.0)
                    .describe("Position the slice stops before; overrides limit, 0 means no end"),
            )
            .property(
                AGG_ARG,
                SchemaDefinition {
                    enum_: Some(vec![json!("count")]),
                    ..SchemaDefinition::string()
                }
                .describe("'count' returns {count} instead of the documents"),
            );
        let listing = SchemaDefinition {
            type_: Some(TypeSpec::Union(vec![SchemaType::Array, SchemaType::Object])),
            items: Some(Box::new(document.clone())),
            ..Default::default()
        }
        .property("count", SchemaDefinition::integer().minimum(0.0));
        collection.push(
            MethodDescriptor::builtin(Operation::Read, OwnerKind::Collection, list_documents)
                .describe("List documents, filtered by field equality and flt terms, optionally ordered, sliced or counted")
                .parameters(params)
                .returns(listing),
        );
        doc.push(
            MethodDescriptor::builtin(Operation::Read, OwnerKind::Document, read_document)
                .describe("Read the document")
                .returns(document.clone()),
        );
    }
    if enabled.contains(&Operation::Create) {
        collection.push(
            MethodDescriptor::builtin(Operation::Create, OwnerKind::Collection, create_document)
                .describe("Create a document")
                .parameters(creation_schema(document, primary_key))
                .returns(document.clone()),
        );
        doc.push(
            MethodDescriptor::builtin(Operation::Create, OwnerKind::Document, replace_document)
                .describe("Replace the document")
                .parameters(creation_schema(document, primary_key))
                .returns(document.clone()),
        );
    }
    if enabled.contains(&Operation::Update) {
        let item = document.partial().require(primary_key);
        collection.push(
            MethodDescriptor::builtin(Operation::Update, OwnerKind::Collection, update_documents)
                .describe("Update several documents; each item carries its key")
                .parameters(
                    SchemaDefinition::object()
                        .property(ITEMS_ARG, SchemaDefinition::array(item))
                        .require(ITEMS_ARG),
                )
                .returns(SchemaDefinition::array(document.clone())),
        );
        doc.push(
            MethodDescriptor::builtin(Operation::Update, OwnerKind::Document, update_document)
                .describe("Update fields of the document")
                .parameters(document.partial())
                .returns(document.clone()),
        );
    }
    if enabled.contains(&Operation::Delete) {
        collection.push(
            MethodDescriptor::builtin(Operation::Delete, OwnerKind::Collection, delete_documents)
                .describe("Delete matching documents; an unfiltered delete needs delete_all=true")
                .parameters(filter_schema(document).property(
                    DELETE_ALL_ARG,
                    SchemaDefinition::boolean().with_default(json!(false)),
                ))
                .returns(SchemaDefinition::object().property("deleted", SchemaDefinition::integer()).require("deleted")),
        );
        doc.push(
            MethodDescriptor::builtin(Operation::Delete, OwnerKind::Document, delete_document)
                .describe("Delete the document")
                .returns(SchemaDefinition::object().property("deleted", key_schema).require("deleted")),
        );
    }
    BuiltinOperations { collection, document: doc }
}

/// `GET {base}/{app}`: the application listing.
pub(crate) fn application_read(application: String) -> MethodDescriptor {
    MethodDescriptor::builtin(Operation::Read, OwnerKind::Application, move |inv: Invocation| {
        let name = application.clone();
        async move { Ok::<_, DispatchError>(inv.suite.lookup(&name)?.describe()) }
    })
    .describe("Describe the application: its collections and methods")
    .returns(SchemaDefinition::object())
}

fn equality_filter(args: &Map<String, Value>, skip: &[&str]) -> Vec<(String, Value)> {
    args.iter()
        .filter(|(k, _)| !skip.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn listing_filter(inv: &Invocation, collection: &Collection) -> Result<Filter, DispatchError> {
    let conditions = match inv.args.get(FLT_ARG) {
        None | Some(Value::Null) => Vec::new(),
        Some(flt) => Condition::parse_all(flt).map_err(DispatchError::BadRequest)?,
    };
    let order_by = match inv.arg::<String>(ORDER_BY_ARG)? {
        Some(spec) => {
            let order = OrderBy::parse(&spec);
            if collection.registry().property(collection.schema(), &order.field).is_none() {
                return Err(DispatchError::BadRequest(format!(
                    "cannot order {} by undeclared field '{}'",
                    collection.name(),
                    order.field
                )));
            }
            Some(order)
        }
        None => None,
    };
    let offset = match inv.arg::<usize>(START_ARG)? {
        Some(start) => start,
        None => inv.arg::<usize>(OFFSET_ARG)?.unwrap_or(0),
    };
    let limit = match inv.arg::<usize>(END_ARG)? {
        None | Some(0) => inv.arg::<usize>(LIMIT_ARG)?,
        Some(end) if end < offset => {
            return Err(DispatchError::BadRequest(format!("end {} precedes start {}", end, offset)))
        }
        Some(end) => Some(end - offset),
    };
    Ok(Filter {
        equals: equality_filter(&inv.args, &LIST_ARGS),
        conditions,
        order_by,
        limit,
        offset,
    })
}

async fn list_documents(inv: Invocation) -> Result<Value, DispatchError> {
    let collection = inv.collection()?;
    let filter = listing_filter(&inv, collection)?;
    if inv.arg::<String>(AGG_ARG)?.is_some() {
        let count = collection.count(&filter).await?;
        return Ok(json!({ "count": count }));
    }
    let docs = collection.list(filter).await?;
    Ok(Value::Array(docs.iter().map(|d| d.to_value()).collect()))
}

async fn create_document(inv: Invocation) -> Result<Value, DispatchError> {
    let collection = inv.collection()?;
    let mut doc = collection.create(Value::Object(inv.args.clone()))?;
    doc.save().await?;
    tracing::info!(collection = %collection.name(), key = %doc.key_string(), "document created");
    Ok(doc.to_value())
}

/// Every item is loaded and updated before anything is written, so a missing key or an invalid
/// item leaves all documents untouched.
async fn update_documents(inv: Invocation) -> Result<Value, DispatchError> {
    let collection = inv.collection()?;
    let pk = collection.primary_key();
    let items: Vec<Map<String, Value>> = inv.arg(ITEMS_ARG)?.unwrap_or_default();
    let mut staged = Vec::with_capacity(items.len());
    let mut missing = Vec::new();
    let mut invalid = ValidationError::default();
    for (i, item) in items.iter().enumerate() {
        let key = item
            .get(pk)
            .cloned()
            .ok_or_else(|| DispatchError::BadRequest(format!("each item must carry '{}'", pk)))?;
        let mut doc = match collection.by_key(&key).await {
            Ok(doc) => doc,
            Err(DispatchError::NotFound(_)) => {
                missing.push(crate::store::key_text(&key));
                continue;
            }
            Err(e) => return Err(e),
        };
        if let Err(e) = doc.update(item) {
            for v in e.violations {
                let path = if v.path.is_empty() {
                    format!("{}[{}]", ITEMS_ARG, i)
                } else {
                    format!("{}[{}].{}", ITEMS_ARG, i, v.path)
                };
                invalid.push(path, v.expected, v.message);
            }
        }
        staged.push(doc);
    }
    if !missing.is_empty() {
        return Err(DispatchError::NotFound(format!("{} '{}'", collection.name(), missing.join("', '"))));
    }
    invalid.into_result()?;

    let mut out = Vec::with_capacity(staged.len());
    for mut doc in staged {
        doc.save().await?;
        out.push(doc.to_value());
    }
    tracing::info!(collection = %collection.name(), updated = out.len(), "documents updated");
    Ok(Value::Array(out))
}

async fn delete_documents(inv: Invocation) -> Result<Value, DispatchError> {
    let collection = inv.collection()?;
    let delete_all = inv.arg::<bool>(DELETE_ALL_ARG)?.unwrap_or(false);
    let equals = equality_filter(&inv.args, &[DELETE_ALL_ARG]);
    if equals.is_empty() && !delete_all {
        return Err(DispatchError::BadRequest(format!(
            "refusing to delete every document of {} without {}=true",
            collection.name(),
            DELETE_ALL_ARG
        )));
    }
    let deleted = collection
        .delete_where(&Filter {
            equals,
            ..Default::default()
        })
        .await?;
    tracing::info!(collection = %collection.name(), deleted, "documents deleted");
    Ok(json!({ "deleted": deleted }))
}

async fn read_document(inv: Invocation) -> Result<Value, DispatchError> {
    Ok(inv.document()?.to_value())
}

async fn replace_document(inv: Invocation) -> Result<Value, DispatchError> {
    let mut fields = inv.args.clone();
    let existing = inv.into_document()?;
    let collection = existing.collection().clone();
    fields.insert(collection.primary_key().to_string(), existing.key().clone());
    let mut doc = collection.create(Value::Object(fields))?;
    doc.set_revision(existing.revision());
    doc.save().await?;
    Ok(doc.to_value())
}

async fn update_document(inv: Invocation) -> Result<Value, DispatchError> {
    let changes = inv.args.clone();
    let mut doc = inv.into_document()?;
    doc.update(&changes)?;
    doc.save().await?;
    Ok(doc.to_value())
}

async fn delete_document(inv: Invocation) -> Result<Value, DispatchError> {
    let doc = inv.into_document()?;
    let key = doc.key().clone();
    doc.delete().await?;
    Ok(json!({ "deleted": key }))
}

/// Primary key types a collection may use.
pub(crate) fn key_type(schema: &SchemaDefinition) -> Option<SchemaType> {
    match schema.types().as_slice() {
        [SchemaType::String] => Some(SchemaType::String),
        [SchemaType::Integer] => Some(SchemaType::Integer),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget_schema() -> SchemaDefinition {
        SchemaDefinition::object()
            .property("id", SchemaDefinition::string())
            .property("name", SchemaDefinition::string())
            .property("count", SchemaDefinition::integer().with_default(json!(0)))
            .require("id")
            .require("name")
    }

    #[test]
    fn disabled_operations_are_not_generated() {
        let enabled: BTreeSet<Operation> = [Operation::Read].into_iter().collect();
        let ops = collection_operations(&widget_schema(), "id", &enabled, 100);
        assert_eq!(ops.collection.len(), 1);
        assert_eq!(ops.document.len(), 1);
        assert_eq!(ops.collection[0].operation(), Some(Operation::Read));
    }

    #[test]
    fn create_does_not_require_the_key() {
        let enabled: BTreeSet<Operation> = Operation::ALL.into_iter().collect();
        let ops = collection_operations(&widget_schema(), "id", &enabled, 100);
        let create = ops.collection.iter().find(|m| m.operation() == Some(Operation::Create)).unwrap();
        assert_eq!(create.parameters.required, vec!["name".to_string()]);
        let update = ops.document.iter().find(|m| m.operation() == Some(Operation::Update)).unwrap();
        assert!(update.parameters.required.is_empty());
        assert!(update.parameters.properties["count"].default.is_none());
    }

    #[test]
    fn list_parameters_default_limit() {
        let enabled: BTreeSet<Operation> = Operation::ALL.into_iter().collect();
        let ops = collection_operations(&widget_schema(), "id", &enabled, 25);
        let list = ops.collection.iter().find(|m| m.operation() == Some(Operation::Read)).unwrap();
        assert_eq!(list.parameters.properties[LIMIT_ARG].default, Some(json!(25)));
        assert!(list.parameters.properties.contains_key("name"));
    }
}
