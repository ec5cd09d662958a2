use std::time::Duration;

use chrono::{DateTime, Utc};
use hickory_proto::op::{Message, MessageType, ResponseCode};
use hickory_proto::rr::{Record, RecordType};

use crate::errors::DomainError;
use crate::message::answer::DnsAnswer;

/// A wire DNS answer plus caching metadata: an absolute expiry, whether it
/// was served from the cache, and the resolver that produced it.
#[derive(Debug, Clone)]
pub struct DnsResponse {
    msg: Message,
    pub expires: Option<DateTime<Utc>>,
    pub from_cache: bool,
    pub resolver: Option<String>,
}

impl DnsResponse {
    pub fn from_message(msg: Message) -> Result<Self, DomainError> {
        msg.to_vec()
            .map_err(|e| DomainError::InvalidDnsResponse(e.to_string()))?;

        let mut response = Self {
            msg,
            expires: None,
            from_cache: false,
            resolver: None,
        };

        if !response.is_empty() {
            response.expires = Some(Utc::now() + response.ttl());
        }

        Ok(response)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DomainError> {
        let msg = Message::from_vec(bytes)
            .map_err(|e| DomainError::InvalidDnsResponse(e.to_string()))?;
        Self::from_message(msg)
    }

    pub fn from_answers(answers: &[DnsAnswer]) -> Result<Self, DomainError> {
        let mut msg = Message::new();
        msg.set_response_code(ResponseCode::NoError);
        for answer in answers {
            msg.add_answer(answer.to_record()?);
        }
        Self::from_message(msg)
    }

    pub fn servfail() -> Self {
        Self::with_rcode(ResponseCode::ServFail)
    }

    pub fn nxdomain() -> Self {
        Self::with_rcode(ResponseCode::NXDomain)
    }

    pub fn refused() -> Self {
        Self::with_rcode(ResponseCode::Refused)
    }

    pub fn noerror() -> Self {
        Self::with_rcode(ResponseCode::NoError)
    }

    fn with_rcode(code: ResponseCode) -> Self {
        let mut msg = Message::new();
        msg.set_message_type(MessageType::Response);
        msg.set_response_code(code);
        Self {
            msg,
            expires: None,
            from_cache: false,
            resolver: None,
        }
    }

    pub fn message(&self) -> &Message {
        &self.msg
    }

    pub fn rcode(&self) -> ResponseCode {
        self.msg.response_code()
    }

    pub fn is_success(&self) -> bool {
        self.msg.response_code() == ResponseCode::NoError
    }

    pub fn is_empty(&self) -> bool {
        self.msg.answers().is_empty()
    }

    /// Remaining lifetime: `expires - now` once an expiry is pinned,
    /// otherwise the minimum answer TTL.
    pub fn ttl(&self) -> Duration {
        if let Some(expires) = self.expires {
            return (expires - Utc::now()).to_std().unwrap_or_default();
        }

        let min_ttl = self.msg.answers().iter().map(Record::ttl).min();
        Duration::from_secs(u64::from(min_ttl.unwrap_or(0)))
    }

    pub fn set_ttl(&mut self, ttl: Duration) {
        self.expires = Some(Utc::now() + ttl);
        self.bump_answer_ttls();
    }

    /// Rewrites every answer RR's TTL to the response's remaining lifetime.
    /// RRs outside the supported set are dropped here rather than failing the
    /// whole response.
    pub fn bump_answer_ttls(&mut self) {
        let ttl = self.ttl();
        let records: Vec<Record> = self
            .msg
            .answers()
            .iter()
            .filter_map(|r| DnsAnswer::from_record(r).ok())
            .filter_map(|mut answer| {
                answer.ttl = ttl;
                answer.to_record().ok()
            })
            .collect();
        self.replace_answers(records);
    }

    /// The normalized answers, all stamped with the remaining TTL.
    pub fn answers(&self) -> Result<Vec<DnsAnswer>, DomainError> {
        let ttl = self.ttl();
        self.msg
            .answers()
            .iter()
            .map(|r| {
                DnsAnswer::from_record(r).map(|mut answer| {
                    answer.ttl = ttl;
                    answer
                })
            })
            .collect()
    }

    /// Prepends an answer to the answer section.
    pub fn insert_answer(&mut self, answer: DnsAnswer) -> Result<(), DomainError> {
        let record = answer.to_record()?;
        let mut records = vec![record];
        records.extend(self.msg.answers().iter().cloned());
        self.replace_answers(records);
        Ok(())
    }

    /// Prepends a CNAME mapping `original` to `to`, unless an equivalent
    /// CNAME is already present.
    pub fn change_name_from(&mut self, original: &str, to: &str, ttl: Duration) {
        let cname = DnsAnswer {
            name: original.to_string(),
            rtype: u16::from(RecordType::CNAME),
            ttl,
            data: to.to_string(),
        };

        let already_present = self
            .msg
            .answers()
            .iter()
            .filter_map(|r| DnsAnswer::from_record(r).ok())
            .any(|a| a.rtype == cname.rtype && a.data == cname.data);
        if already_present {
            return;
        }

        let _ = self.insert_answer(cname);
    }

    /// Converts an answer for an expanded name back to the name the client
    /// asked for by prepending a CNAME.
    pub fn change_name(&mut self, name: &str) {
        let Some(first) = self
            .msg
            .answers()
            .first()
            .and_then(|r| DnsAnswer::from_record(r).ok())
        else {
            return;
        };

        if first.name != name && first.record_type() != RecordType::CNAME {
            self.change_name_from(name, &first.name, first.ttl);
        }
    }

    /// Shapes this response as a reply to the given request message: answer
    /// TTLs reflect the remaining lifetime, a CNAME bridges the client's
    /// question name when the answers are for an expanded name, and recursion
    /// is advertised.
    pub fn as_reply_to(&self, request: &Message) -> Message {
        let ttl = self.ttl();
        let mut answers: Vec<DnsAnswer> = self
            .msg
            .answers()
            .iter()
            .filter_map(|r| DnsAnswer::from_record(r).ok())
            .map(|mut answer| {
                answer.ttl = ttl;
                answer
            })
            .collect();

        if let (Some(question), Some(first)) = (request.queries().first(), answers.first().cloned())
        {
            let qname = question.name().to_utf8();
            if first.name != qname && first.record_type() != RecordType::CNAME {
                let already_present = answers
                    .iter()
                    .any(|a| a.record_type() == RecordType::CNAME && a.data == first.name);
                if !already_present {
                    answers.insert(
                        0,
                        DnsAnswer {
                            name: qname,
                            rtype: u16::from(RecordType::CNAME),
                            ttl: first.ttl,
                            data: first.name.clone(),
                        },
                    );
                }
            }
        }

        let mut reply = Message::new();
        reply.set_id(request.id());
        reply.set_message_type(MessageType::Response);
        reply.set_op_code(request.op_code());
        reply.set_recursion_desired(request.recursion_desired());
        reply.set_recursion_available(true);
        reply.set_response_code(self.msg.response_code());
        reply.add_queries(request.queries().to_vec());
        for answer in answers {
            if let Ok(record) = answer.to_record() {
                reply.add_answer(record);
            }
        }

        reply
    }

    fn replace_answers(&mut self, records: Vec<Record>) {
        let mut msg = Message::new();
        msg.set_id(self.msg.id());
        msg.set_message_type(self.msg.message_type());
        msg.set_op_code(self.msg.op_code());
        msg.set_recursion_desired(self.msg.recursion_desired());
        msg.set_recursion_available(self.msg.recursion_available());
        msg.set_response_code(self.msg.response_code());
        msg.add_queries(self.msg.queries().to_vec());
        *msg.extensions_mut() = self.msg.extensions().clone();
        for record in records {
            msg.add_answer(record);
        }
        self.msg = msg;
    }
}

impl PartialEq for DnsResponse {
    fn eq(&self, other: &Self) -> bool {
        self.msg.to_vec().unwrap_or_default() == other.msg.to_vec().unwrap_or_default()
    }
}
