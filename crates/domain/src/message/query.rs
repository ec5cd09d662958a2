use hickory_proto::op::{Edns, Message, Query};
use hickory_proto::rr::rdata::opt::{EdnsCode, EdnsOption};

use crate::errors::DomainError;
use crate::message::EDNS0_CPE_ID_OPTION_CODE;

/// A client DNS question plus its out-of-band identity. The wrapped message
/// is validated on construction by packing it once; helpers are the only way
/// to mutate it afterwards.
#[derive(Debug, Clone)]
pub struct DnsQuery {
    msg: Message,
    pub client_id: Option<String>,
    pub client_ip: Option<String>,
}

impl DnsQuery {
    pub fn from_message(msg: Message) -> Result<Self, DomainError> {
        msg.to_vec()
            .map_err(|e| DomainError::InvalidQuery(e.to_string()))?;

        Ok(Self {
            msg,
            client_id: None,
            client_ip: None,
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DomainError> {
        let msg = Message::from_vec(bytes).map_err(|e| DomainError::InvalidQuery(e.to_string()))?;
        Self::from_message(msg)
    }

    pub fn from_questions(questions: Vec<Query>) -> Result<Self, DomainError> {
        let mut msg = Message::new();
        msg.add_queries(questions);
        Self::from_message(msg)
    }

    pub fn message(&self) -> &Message {
        &self.msg
    }

    pub fn first_question(&self) -> Option<&Query> {
        self.msg.queries().first()
    }

    pub fn first_question_cloned(&self) -> Option<Query> {
        self.msg.queries().first().cloned()
    }

    /// A new query identical to this one except for a single substituted
    /// question. Client identity is carried over.
    pub fn with_question(&self, question: Query) -> Result<Self, DomainError> {
        let mut msg = Message::new();
        msg.set_id(self.msg.id());
        msg.set_message_type(self.msg.message_type());
        msg.set_op_code(self.msg.op_code());
        msg.set_recursion_desired(self.msg.recursion_desired());
        msg.add_query(question);
        *msg.extensions_mut() = self.msg.extensions().clone();

        let mut query = Self::from_message(msg)?;
        query.client_id = self.client_id.clone();
        query.client_ip = self.client_ip.clone();
        Ok(query)
    }

    /// Splits a multi-question query into one-question queries.
    pub fn decompose(&self) -> Vec<DnsQuery> {
        self.msg
            .queries()
            .iter()
            .filter_map(|q| self.with_question(q.clone()).ok())
            .collect()
    }

    /// Reads the CPE-ID carried in EDNS0 option 65074, if any.
    pub fn cpe_id(&self) -> Option<String> {
        let edns = self.msg.extensions().as_ref()?;
        match edns.option(EdnsCode::Unknown(EDNS0_CPE_ID_OPTION_CODE)) {
            Some(EdnsOption::Unknown(_, data)) => {
                Some(String::from_utf8_lossy(data).into_owned())
            }
            _ => None,
        }
    }

    /// Stamps a CPE-ID into EDNS0 option 65074, creating the OPT RR when the
    /// query does not carry one. Setting twice stores the second value.
    pub fn set_cpe_id(&mut self, cpe_id: &str) -> &mut Self {
        if cpe_id.is_empty() {
            return self;
        }

        let edns = self.msg.extensions_mut().get_or_insert_with(Edns::new);
        edns.options_mut().insert(EdnsOption::Unknown(
            EDNS0_CPE_ID_OPTION_CODE,
            cpe_id.as_bytes().to_vec(),
        ));
        self
    }

    /// Drops the EDNS0 extras from the query message.
    pub fn clear_extras(&mut self) -> &mut Self {
        *self.msg.extensions_mut() = None;
        self
    }

    /// The message as sent upstream: recursion desired is always set.
    pub fn prepared_msg(&self) -> Message {
        let mut msg = self.msg.clone();
        msg.set_recursion_desired(true);
        msg
    }

    pub fn is_mdns(&self) -> bool {
        self.first_question()
            .map(|q| q.name().to_utf8().ends_with(".local."))
            .unwrap_or(false)
    }
}

impl PartialEq for DnsQuery {
    fn eq(&self, other: &Self) -> bool {
        if self.client_id != other.client_id || self.client_ip != other.client_ip {
            return false;
        }

        let packed = self.msg.to_vec().unwrap_or_default();
        let other_packed = other.msg.to_vec().unwrap_or_default();
        packed == other_packed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::rr::{Name, RecordType};
    use std::str::FromStr;

    fn question(name: &str, rtype: RecordType) -> Query {
        Query::query(Name::from_str(name).unwrap(), rtype)
    }

    #[test]
    fn cpe_id_round_trips() {
        let mut query =
            DnsQuery::from_questions(vec![question("example.com.", RecordType::A)]).unwrap();
        assert_eq!(query.cpe_id(), None);

        query.set_cpe_id("customer-17");
        assert_eq!(query.cpe_id().as_deref(), Some("customer-17"));
    }

    #[test]
    fn setting_cpe_id_twice_keeps_the_second_value() {
        let mut query =
            DnsQuery::from_questions(vec![question("example.com.", RecordType::A)]).unwrap();
        query.set_cpe_id("first");
        query.set_cpe_id("second");
        assert_eq!(query.cpe_id().as_deref(), Some("second"));
    }

    #[test]
    fn cpe_id_survives_a_wire_round_trip() {
        let mut query =
            DnsQuery::from_questions(vec![question("example.com.", RecordType::A)]).unwrap();
        query.set_cpe_id("test");

        let packed = query.message().to_vec().unwrap();
        let reparsed = DnsQuery::from_bytes(&packed).unwrap();
        assert_eq!(reparsed.cpe_id().as_deref(), Some("test"));
    }

    #[test]
    fn clear_extras_drops_the_cpe_id() {
        let mut query =
            DnsQuery::from_questions(vec![question("example.com.", RecordType::A)]).unwrap();
        query.set_cpe_id("test");
        query.clear_extras();
        assert_eq!(query.cpe_id(), None);
    }

    #[test]
    fn decompose_splits_questions() {
        let query = DnsQuery::from_questions(vec![
            question("a.example.com.", RecordType::A),
            question("b.example.com.", RecordType::AAAA),
        ])
        .unwrap();

        let parts = query.decompose();
        assert_eq!(parts.len(), 2);
        assert_eq!(
            parts[0].first_question().unwrap().name().to_utf8(),
            "a.example.com."
        );
        assert_eq!(
            parts[1].first_question().unwrap().query_type(),
            RecordType::AAAA
        );
    }

    #[test]
    fn with_question_preserves_identity_and_extras() {
        let mut query =
            DnsQuery::from_questions(vec![question("example.com.", RecordType::A)]).unwrap();
        query.set_cpe_id("abc");
        query.client_ip = Some("192.0.2.9".into());

        let substituted = query
            .with_question(question("example.org.", RecordType::A))
            .unwrap();

        assert_eq!(substituted.cpe_id().as_deref(), Some("abc"));
        assert_eq!(substituted.client_ip.as_deref(), Some("192.0.2.9"));
        assert_eq!(
            substituted.first_question().unwrap().name().to_utf8(),
            "example.org."
        );
    }

    #[test]
    fn wire_round_trip_is_stable() {
        let mut original =
            DnsQuery::from_questions(vec![question("example.com.", RecordType::A)]).unwrap();
        original.set_cpe_id("key");

        let packed = original.message().to_vec().unwrap();
        let once = DnsQuery::from_bytes(&packed).unwrap();
        let twice = DnsQuery::from_bytes(&once.message().to_vec().unwrap()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn mdns_detection_requires_local_suffix() {
        let local =
            DnsQuery::from_questions(vec![question("printer.local.", RecordType::A)]).unwrap();
        let global = DnsQuery::from_questions(vec![question("example.com.", RecordType::A)]).unwrap();
        assert!(local.is_mdns());
        assert!(!global.is_mdns());
    }
}
