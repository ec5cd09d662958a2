use hickory_proto::op::{OpCode, Query};
use hickory_proto::rr::RecordType;
use spuddns_domain::{DnsQuery, DnsResponse, DomainError};

use crate::ports::DnsQueryClient;

/// Resolves a query through a client, one sub-query per question. Only the
/// QUERY opcode is processed; anything else is an invalid query the caller
/// turns into SERVFAIL.
///
/// Returns `Ok(None)` when the client had no successful answer to offer.
pub async fn resolve_with(
    query: &DnsQuery,
    client: &dyn DnsQueryClient,
) -> Result<Option<DnsResponse>, DomainError> {
    if query.message().op_code() != OpCode::Query {
        return Err(DomainError::InvalidQuery(format!(
            "unsupported opcode '{:?}'",
            query.message().op_code()
        )));
    }

    let parts = query.decompose();
    if parts.len() == 1 {
        // Common case: keep the responder's expiry and resolver stamp intact.
        return match client.query_dns(&parts[0]).await? {
            Some(response) if response.is_success() => Ok(Some(response)),
            _ => Ok(None),
        };
    }

    let mut answers = Vec::new();
    let mut from_cache = false;
    let mut resolver = None;

    for part in &parts {
        let Some(response) = client.query_dns(part).await? else {
            return Ok(None);
        };
        if !response.is_success() {
            return Ok(None);
        }

        answers.extend(response.answers()?);
        from_cache = from_cache || response.from_cache;
        if resolver.is_none() {
            resolver = response.resolver.clone();
        }
    }

    let mut merged = DnsResponse::from_answers(&answers)?;
    merged.from_cache = from_cache;
    merged.resolver = resolver;
    Ok(Some(merged))
}

/// Probes whether a name exists in any address form by racing A and AAAA
/// lookups. The first success wins and the losing probe is dropped; if the
/// first finisher failed, the other probe decides.
pub async fn name_exists(query: &DnsQuery, client: &dyn DnsQueryClient) -> bool {
    let Some(question) = query.first_question_cloned() else {
        return false;
    };

    let probe = |rtype: RecordType| {
        let mut q = Query::query(question.name().clone(), rtype);
        q.set_query_class(question.query_class());
        query.with_question(q)
    };

    let (Ok(a_query), Ok(aaaa_query)) = (probe(RecordType::A), probe(RecordType::AAAA)) else {
        return false;
    };

    let a_fut = async { matches!(resolve_with(&a_query, client).await, Ok(Some(_))) };
    let aaaa_fut = async { matches!(resolve_with(&aaaa_query, client).await, Ok(Some(_))) };
    tokio::pin!(a_fut);
    tokio::pin!(aaaa_fut);

    tokio::select! {
        found = &mut a_fut => {
            if found { true } else { aaaa_fut.await }
        }
        found = &mut aaaa_fut => {
            if found { true } else { a_fut.await }
        }
    }
}
