pub mod http;

use std::net::IpAddr;
use std::sync::Arc;

use hickory_proto::op::{Message, MessageType, ResponseCode};
use spuddns_application::use_cases::ResolveQueryUseCase;
use spuddns_domain::DnsQuery;
use tracing::{debug, warn};

/// Wire-level request handler shared by the plain-DNS and DoT listeners:
/// bytes in, bytes out, with every failure collapsed to a DNS error reply.
pub struct DnsServerHandler {
    use_case: Arc<ResolveQueryUseCase>,
}

impl DnsServerHandler {
    pub fn new(use_case: Arc<ResolveQueryUseCase>) -> Self {
        Self { use_case }
    }

    pub async fn handle_raw(&self, bytes: &[u8], client_ip: IpAddr) -> Option<Vec<u8>> {
        let mut query = match DnsQuery::from_bytes(bytes) {
            Ok(query) => query,
            Err(e) => {
                warn!(error = %e, "failed to parse dns request");
                return build_error_response(bytes, ResponseCode::ServFail);
            }
        };

        query.client_id = query.cpe_id();
        query.client_ip = Some(client_ip.to_string());

        if let Some(question) = query.first_question() {
            debug!(
                domain = %question.name(),
                record_type = %question.query_type(),
                client = %client_ip,
                "dns query received"
            );
        }

        let request_msg = query.message().clone();
        let response = self.use_case.resolve(query).await;
        let reply = response.as_reply_to(&request_msg);

        match reply.to_vec() {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(error = %e, "failed to serialize dns reply");
                build_error_response(bytes, ResponseCode::ServFail)
            }
        }
    }
}

/// A minimal error reply echoing the request id and question, for when the
/// normal path cannot produce one.
pub fn build_error_response(query: &[u8], code: ResponseCode) -> Option<Vec<u8>> {
    let request = Message::from_vec(query).ok()?;
    let mut response = Message::new();
    response.set_id(request.id());
    response.set_message_type(MessageType::Response);
    response.set_op_code(request.op_code());
    response.set_recursion_desired(request.recursion_desired());
    response.set_recursion_available(true);
    response.set_response_code(code);
    response.add_queries(request.queries().to_vec());
    response.to_vec().ok()
}
