use std::sync::Arc;
use std::time::Duration;

use hickory_proto::op::Query;
use hickory_proto::rr::{Name, RecordType};
use spuddns_application::ports::{DnsQueryClient, NullMetrics, ResponseCache};
use spuddns_domain::{DnsAnswer, DnsQuery, DnsResponse};
use spuddns_infrastructure::dns::cache::SpudCache;
use std::str::FromStr;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn question(name: &str) -> Query {
    Query::query(Name::from_str(name).unwrap(), RecordType::A)
}

fn short_lived_response(name: &str) -> DnsResponse {
    let mut response = DnsResponse::from_answers(&[DnsAnswer {
        name: name.into(),
        rtype: u16::from(RecordType::A),
        ttl: Duration::from_secs(2),
        data: "192.0.2.1".into(),
    }])
    .unwrap();
    // Under the 10s lead the timer fires immediately.
    response.set_ttl(Duration::from_secs(2));
    response
}

#[tokio::test]
async fn expire_callback_fires_with_the_stored_question() {
    let cache = SpudCache::new(Arc::new(NullMetrics), CancellationToken::new());
    let (tx, mut rx) = mpsc::unbounded_channel();

    cache.set_expire_callback(Arc::new(move |question, _response, retrieve_count, _cache| {
        let tx = tx.clone();
        Box::pin(async move {
            let _ = tx.send((question.name().to_utf8(), retrieve_count));
            true
        })
    }));

    cache
        .cache_response(&question("hot.example."), &short_lived_response("hot.example."))
        .unwrap();

    let (name, count) = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("callback fired")
        .expect("channel open");
    assert_eq!(name, "hot.example.");
    assert_eq!(count, 0);
}

#[tokio::test]
async fn declining_callback_evicts_the_entry() {
    let cache = SpudCache::new(Arc::new(NullMetrics), CancellationToken::new());
    let (tx, mut rx) = mpsc::unbounded_channel();

    cache.set_expire_callback(Arc::new(move |_question, _response, _count, _cache| {
        let tx = tx.clone();
        Box::pin(async move {
            let _ = tx.send(());
            false
        })
    }));

    cache
        .cache_response(&question("cold.example."), &short_lived_response("cold.example."))
        .unwrap();

    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("callback fired");
    // Give the eviction task a moment.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let query = DnsQuery::from_questions(vec![question("cold.example.")]).unwrap();
    assert!(cache.query_dns(&query).await.unwrap().is_none());
}

#[tokio::test]
async fn no_callback_means_no_timers_and_entries_stay() {
    let cache = SpudCache::new(Arc::new(NullMetrics), CancellationToken::new());

    cache
        .cache_response(&question("plain.example."), &short_lived_response("plain.example."))
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    let query = DnsQuery::from_questions(vec![question("plain.example.")]).unwrap();
    assert!(cache.query_dns(&query).await.unwrap().is_some());
}
