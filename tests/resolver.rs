mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;
use suite_sdk::dispatch::Action;
use suite_sdk::{AppError, Operation, OwnerKind, Resolver};

#[tokio::test]
async fn key_segment_loads_the_document() {
    let suite = common::suite();
    common::put_widget(&suite, json!({"id": "42", "name": "answer"})).await;
    let resolver = Resolver::new(suite.clone());

    let target = resolver.resolve(&Method::GET, "/api/app1/widgets/42", None).await.unwrap();
    let doc = target.document.as_ref().expect("document resolved");
    assert_eq!(doc.key(), &json!("42"));
    assert_eq!(doc.get("name"), Some(&json!("answer")));
    match &target.action {
        Action::Invoke(m) => {
            assert_eq!(m.owner, OwnerKind::Document);
            assert_eq!(m.operation(), Some(Operation::Read));
        }
        other => panic!("expected invoke, got {:?}", other),
    }

    let err = resolver.resolve(&Method::GET, "/api/app1/widgets/43", None).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn exposed_method_wins_over_matching_key() {
    let suite = common::suite();
    common::put_widget(&suite, json!({"id": "combine", "name": "shadowed"})).await;
    let resolver = Resolver::new(suite);

    let target = resolver.resolve(&Method::GET, "/api/app1/widgets/combine", None).await.unwrap();
    assert!(target.document.is_none());
    assert_eq!(target.method().map(|m| m.name.as_str()), Some("combine"));
}

#[tokio::test]
async fn hidden_method_name_resolves_as_a_key() {
    let suite = common::suite();
    let resolver = Resolver::new(suite.clone());
    let err = resolver.resolve(&Method::GET, "/api/app1/widgets/secret", None).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::NOT_FOUND);

    common::put_widget(&suite, json!({"id": "secret", "name": "plain key"})).await;
    let target = resolver.resolve(&Method::GET, "/api/app1/widgets/secret", None).await.unwrap();
    assert_eq!(target.document.as_ref().map(|d| d.key().clone()), Some(json!("secret")));
}

#[tokio::test]
async fn document_and_application_methods() {
    let suite = common::suite();
    common::put_widget(&suite, json!({"id": "w1", "name": "first"})).await;
    let resolver = Resolver::new(suite);

    let target = resolver.resolve(&Method::POST, "/api/app1/widgets/w1/touch", None).await.unwrap();
    assert_eq!(target.method().map(|m| m.owner), Some(OwnerKind::Document));
    assert!(target.document.is_some());

    let target = resolver.resolve(&Method::GET, "/api/app1/ping", None).await.unwrap();
    assert_eq!(target.method().map(|m| m.owner), Some(OwnerKind::Application));

    let err = resolver.resolve(&Method::GET, "/api/app1/widgets/w1/nope", None).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
    let err = resolver.resolve(&Method::GET, "/api/app1/ping/extra", None).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn verbs_outside_the_allowed_set_are_rejected() {
    let resolver = Resolver::new(common::suite());

    let err = resolver.resolve(&Method::DELETE, "/api/app1/widgets/combine", None).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::METHOD_NOT_ALLOWED);

    let err = resolver.resolve(&Method::PUT, "/api/app1", None).await.unwrap_err();
    match err {
        AppError::Route(suite_sdk::RouteError::MethodNotAllowed { allowed, .. }) => {
            assert_eq!(allowed, vec!["GET", "OPTIONS"]);
        }
        other => panic!("expected method not allowed, got {:?}", other),
    }

    // gadgets only enable read and create
    let err = resolver.resolve(&Method::DELETE, "/api/app1/gadgets", None).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn documentation_requests_never_invoke() {
    let resolver = Resolver::new(common::suite());

    let target = resolver.resolve(&Method::OPTIONS, "/api/app1/widgets", None).await.unwrap();
    assert!(matches!(target.action, Action::Describe(None)));

    // disabled verb still documents
    let target = resolver.resolve(&Method::DELETE, "/api/app1/gadgets", Some("schema")).await.unwrap();
    assert!(matches!(target.action, Action::Describe(None)));

    let target = resolver.resolve(&Method::GET, "/api/app1/widgets/combine", Some("schema")).await.unwrap();
    assert!(matches!(&target.action, Action::Describe(Some(m)) if m.name == "combine"));
}

#[tokio::test]
async fn malformed_paths_are_not_found() {
    let resolver = Resolver::new(common::suite());
    for path in [
        "/elsewhere/app1",
        "/apiary/app1",
        "/api/nope",
        "/api/app1/nope",
        "/api/app1/widgets/a/b/c",
        "/api/app1/gadgets/not-a-number",
    ] {
        let err = resolver.resolve(&Method::GET, path, None).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND, "{}", path);
    }
}

#[tokio::test]
async fn query_values_follow_parameter_types() {
    let resolver = Resolver::new(common::suite());
    let target = resolver
        .resolve(&Method::GET, "/api/app1/widgets/combine", Some("other=123"))
        .await
        .unwrap();
    assert_eq!(target.query.args["other"], json!("123"));

    let target = resolver
        .resolve(&Method::GET, "/api/app1/widgets", Some("limit=5&name=%22x%22"))
        .await
        .unwrap();
    assert_eq!(target.query.args["limit"], json!(5));
    assert_eq!(target.query.args["name"], json!("x"));
}

#[tokio::test]
async fn root_describes_the_suite() {
    let suite = common::suite();
    let resolver = Resolver::new(suite.clone());
    let target = resolver.resolve(&Method::GET, "/api", None).await.unwrap();
    assert!(target.application.is_none());
    let docs = target.describe(&suite);
    assert_eq!(docs["route"], json!("/api"));

    let err = resolver.resolve(&Method::POST, "/api/", None).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::METHOD_NOT_ALLOWED);
}
