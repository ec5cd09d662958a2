use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::connect_info::ConnectInfo;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hickory_proto::op::{Message, Query, ResponseCode};
use hickory_proto::rr::{Name, RData, RecordType};
use http_body_util::BodyExt;
use spuddns_application::ports::NullMetrics;
use spuddns_application::use_cases::{shared_resolv_conf, ResolveQueryUseCase};
use spuddns_domain::{AclItem, AppConfig, ResolvConf};
use spuddns_infrastructure::dns::resolver::ChainFactory;
use spuddns_infrastructure::dns::server::http::doh_router;
use std::str::FromStr;
use tower::ServiceExt;

fn router_with(config: AppConfig) -> Router {
    let mut config = config;
    config
        .static_records
        .insert("example.com".to_string(), "127.0.0.1".to_string());
    config.prepare();
    let config = Arc::new(config);

    let metrics = Arc::new(NullMetrics);
    let factory = Arc::new(ChainFactory::new(config.clone(), metrics.clone()));
    let use_case = Arc::new(ResolveQueryUseCase::new(
        config,
        shared_resolv_conf(ResolvConf::default()),
        None,
        None,
        None,
        factory,
        None,
        metrics,
    ));

    doh_router(use_case)
}

fn wire_query(name: &str) -> Vec<u8> {
    let mut msg = Message::new();
    msg.set_id(4242);
    msg.set_recursion_desired(true);
    msg.add_query(Query::query(Name::from_str(name).unwrap(), RecordType::A));
    msg.to_vec().unwrap()
}

fn request(method: &str, uri: &str, accept: &str, body: Body) -> Request<Body> {
    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::ACCEPT, accept)
        .body(body)
        .unwrap();
    let addr: SocketAddr = "192.0.2.10:54321".parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

#[tokio::test]
async fn post_with_dns_message_accept_returns_wire_answer() {
    let router = router_with(AppConfig::default());

    let response = router
        .oneshot(request(
            "POST",
            "/dns-query",
            "application/dns-message",
            Body::from(wire_query("example.com.")),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/dns-message"
    );

    let message = Message::from_vec(&body_bytes(response).await).unwrap();
    assert_eq!(message.id(), 4242);
    assert_eq!(message.response_code(), ResponseCode::NoError);
    let answer = &message.answers()[0];
    assert_eq!(answer.record_type(), RecordType::A);
    match answer.data() {
        Some(RData::A(a)) => assert_eq!(a.0.to_string(), "127.0.0.1"),
        other => panic!("expected A answer, got {other:?}"),
    }
}

#[tokio::test]
async fn get_with_base64url_parameter_works() {
    let router = router_with(AppConfig::default());
    let encoded = URL_SAFE_NO_PAD.encode(wire_query("example.com."));

    let response = router
        .oneshot(request(
            "GET",
            &format!("/dns-query?dns={encoded}"),
            "application/dns-message",
            Body::empty(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let message = Message::from_vec(&body_bytes(response).await).unwrap();
    assert!(!message.answers().is_empty());
}

#[tokio::test]
async fn json_accept_returns_normalized_answers() {
    let router = router_with(AppConfig::default());

    let response = router
        .oneshot(request(
            "POST",
            "/dns-query",
            "application/json",
            Body::from(wire_query("example.com.")),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );

    let answers: Vec<serde_json::Value> =
        serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(answers[0]["data"], "127.0.0.1");
    assert_eq!(answers[0]["type"], 1);
    assert_eq!(answers[0]["name"], "example.com.");
}

#[tokio::test]
async fn unsupported_accept_is_not_acceptable() {
    let router = router_with(AppConfig::default());
    let response = router
        .oneshot(request(
            "POST",
            "/dns-query",
            "text/html",
            Body::from(wire_query("example.com.")),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
}

#[tokio::test]
async fn non_get_post_methods_are_rejected() {
    let router = router_with(AppConfig::default());
    let response = router
        .oneshot(request(
            "PUT",
            "/dns-query",
            "application/dns-message",
            Body::from(wire_query("example.com.")),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn garbage_payloads_are_bad_requests() {
    let router = router_with(AppConfig::default());

    let response = router
        .clone()
        .oneshot(request(
            "POST",
            "/dns-query",
            "application/dns-message",
            Body::from(vec![0xde, 0xad, 0xbe]),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = router
        .oneshot(request(
            "GET",
            "/dns-query?dns=!!!not-base64!!!",
            "application/dns-message",
            Body::empty(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn auth_path_segment_selects_the_acl_client() {
    let mut config = AppConfig {
        enable_acls: true,
        ..AppConfig::default()
    };
    config.acls.insert(
        "secret".to_string(),
        AclItem {
            use_shared_cache: true,
            ..AclItem::default()
        },
    );
    let router = router_with(config);

    let allowed = router
        .clone()
        .oneshot(request(
            "POST",
            "/secret/dns-query",
            "application/dns-message",
            Body::from(wire_query("example.com.")),
        ))
        .await
        .unwrap();
    assert_eq!(allowed.status(), StatusCode::OK);
    let message = Message::from_vec(&body_bytes(allowed).await).unwrap();
    assert_eq!(message.response_code(), ResponseCode::NoError);

    let refused = router
        .oneshot(request(
            "POST",
            "/wrong/dns-query",
            "application/dns-message",
            Body::from(wire_query("example.com.")),
        ))
        .await
        .unwrap();
    assert_eq!(refused.status(), StatusCode::OK);
    let message = Message::from_vec(&body_bytes(refused).await).unwrap();
    assert_eq!(message.response_code(), ResponseCode::Refused);
    assert!(message.answers().is_empty());
}
