use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Path, Query as UrlQuery, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use spuddns_application::use_cases::ResolveQueryUseCase;
use spuddns_domain::{
    DnsAnswer, DnsQuery, CONTENT_TYPE_DNS_MESSAGE, CONTENT_TYPE_JSON,
};
use tracing::{debug, warn};

/// State shared by the DoH handlers.
pub struct DohState {
    use_case: Arc<ResolveQueryUseCase>,
}

/// The DNS-over-HTTP router. The `auth` path segment carries a preshared
/// key, mirroring what EDNS0 carries on the plain-DNS path.
pub fn doh_router(use_case: Arc<ResolveQueryUseCase>) -> Router {
    let state = Arc::new(DohState { use_case });

    Router::new()
        .route("/", get(handle_root_get).post(handle_root_post))
        .route("/dns-query", get(handle_root_get).post(handle_root_post))
        .route("/:auth", get(handle_auth_get).post(handle_auth_post))
        .route("/:auth/dns-query", get(handle_auth_get).post(handle_auth_post))
        .with_state(state)
}

enum ReplyFormat {
    Wire,
    Json,
}

fn negotiated_format(headers: &HeaderMap) -> Option<ReplyFormat> {
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    match accept.as_str() {
        CONTENT_TYPE_DNS_MESSAGE => Some(ReplyFormat::Wire),
        CONTENT_TYPE_JSON => Some(ReplyFormat::Json),
        _ => None,
    }
}

async fn handle_root_get(
    State(state): State<Arc<DohState>>,
    UrlQuery(params): UrlQuery<HashMap<String, String>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    handle(state, None, params, headers, addr, None).await
}

async fn handle_root_post(
    State(state): State<Arc<DohState>>,
    UrlQuery(params): UrlQuery<HashMap<String, String>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handle(state, None, params, headers, addr, Some(body)).await
}

async fn handle_auth_get(
    State(state): State<Arc<DohState>>,
    Path(auth): Path<String>,
    UrlQuery(params): UrlQuery<HashMap<String, String>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    handle(state, Some(auth), params, headers, addr, None).await
}

async fn handle_auth_post(
    State(state): State<Arc<DohState>>,
    Path(auth): Path<String>,
    UrlQuery(params): UrlQuery<HashMap<String, String>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handle(state, Some(auth), params, headers, addr, Some(body)).await
}

async fn handle(
    state: Arc<DohState>,
    auth: Option<String>,
    params: HashMap<String, String>,
    headers: HeaderMap,
    addr: SocketAddr,
    body: Option<Bytes>,
) -> Response {
    let Some(format) = negotiated_format(&headers) else {
        debug!("unsupported content type requested");
        return (StatusCode::NOT_ACCEPTABLE, "Not acceptable").into_response();
    };

    let payload: Vec<u8> = match body {
        Some(body) => body.to_vec(),
        None => {
            let Some(encoded) = params.get("dns") else {
                return (StatusCode::BAD_REQUEST, "Bad request").into_response();
            };
            match URL_SAFE_NO_PAD.decode(encoded) {
                Ok(decoded) => decoded,
                Err(_) => return (StatusCode::BAD_REQUEST, "Bad request").into_response(),
            }
        }
    };

    let mut query = match DnsQuery::from_bytes(&payload) {
        Ok(query) => query,
        Err(e) => {
            debug!(error = %e, "invalid dns message in doh request");
            return (StatusCode::BAD_REQUEST, "Invalid DNS message").into_response();
        }
    };

    let cpe_param = params.get("cpe_id").cloned().filter(|v| !v.is_empty());
    let client_id = auth
        .filter(|v| !v.is_empty())
        .or_else(|| query.cpe_id())
        .or_else(|| cpe_param.clone())
        .unwrap_or_default();
    if let Some(cpe_id) = &cpe_param {
        query.set_cpe_id(cpe_id);
    }
    query.client_id = Some(client_id);
    query.client_ip = Some(addr.ip().to_string());

    debug!(client = %addr, "got dns over http request");

    let request_msg = query.message().clone();
    let response = state.use_case.resolve(query).await;
    let reply = response.as_reply_to(&request_msg);

    match format {
        ReplyFormat::Wire => match reply.to_vec() {
            Ok(packed) => {
                let mut http_response = packed.into_response();
                http_response.headers_mut().insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static(CONTENT_TYPE_DNS_MESSAGE),
                );
                http_response
            }
            Err(e) => {
                warn!(error = %e, "failed to serialize doh reply");
                (StatusCode::INTERNAL_SERVER_ERROR, "Server error").into_response()
            }
        },
        ReplyFormat::Json => {
            let answers: Vec<DnsAnswer> = reply
                .answers()
                .iter()
                .filter_map(|record| DnsAnswer::from_record(record).ok())
                .collect();
            match serde_json::to_vec(&answers) {
                Ok(json) => {
                    let mut http_response = json.into_response();
                    http_response.headers_mut().insert(
                        header::CONTENT_TYPE,
                        HeaderValue::from_static(CONTENT_TYPE_JSON),
                    );
                    http_response
                }
                Err(e) => {
                    warn!(error = %e, "failed to json marshal dns response");
                    (StatusCode::INTERNAL_SERVER_ERROR, "Server error").into_response()
                }
            }
        }
    }
}
