//! Cache key derived from a DNS question
//!
//! A key is the `(type, class, name)` triple of the question. The name is
//! kept exactly as received, so `Example.com.` and `example.com.` are two
//! different keys. Its canonical string form is `"<type>.<class>.<name>"`
//! with numeric type and class and the name in presentation form.
//!
//! # Example
//!
//! ```
//! use dns_sinkhole::dns::cache::CacheKey;
//!
//! let key = CacheKey::new("example.com.", 1, 1);
//! assert_eq!(key.to_string(), "1.1.example.com.");
//! ```

use std::fmt;

use hickory_proto::op::{Message, Query};
use hickory_proto::rr::{DNSClass, RecordType};

/// Identity of a cached answer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    qtype: u16,
    qclass: u16,
    qname: String,
}

impl CacheKey {
    /// Create a key from raw parts; the name is not normalized
    #[must_use]
    pub fn new(qname: impl Into<String>, qtype: u16, qclass: u16) -> Self {
        Self {
            qtype,
            qclass,
            qname: qname.into(),
        }
    }

    /// Key for a question
    ///
    /// # Example
    ///
    /// ```
    /// use dns_sinkhole::dns::cache::CacheKey;
    /// use hickory_proto::op::Query;
    /// use hickory_proto::rr::{Name, RecordType};
    /// use std::str::FromStr;
    ///
    /// let query = Query::query(Name::from_str("example.com.").unwrap(), RecordType::AAAA);
    /// let key = CacheKey::from_query(&query);
    /// assert_eq!(key.qtype(), 28);
    /// assert_eq!(key.qname(), "example.com.");
    /// ```
    #[must_use]
    pub fn from_query(query: &Query) -> Self {
        Self::new(
            query.name().to_string(),
            query.query_type().into(),
            u16::from(query.query_class()),
        )
    }

    /// Key for the first question of a message, if it has one
    #[must_use]
    pub fn from_message(message: &Message) -> Option<Self> {
        message.queries().first().map(Self::from_query)
    }

    /// Query name as received
    #[must_use]
    pub fn qname(&self) -> &str {
        &self.qname
    }

    /// Numeric query type
    #[must_use]
    pub fn qtype(&self) -> u16 {
        self.qtype
    }

    /// Numeric query class
    #[must_use]
    pub fn qclass(&self) -> u16 {
        self.qclass
    }

    /// Query type as a `RecordType`
    #[must_use]
    pub fn record_type(&self) -> RecordType {
        RecordType::from(self.qtype)
    }

    /// Whether the key is for the IN class
    #[must_use]
    pub fn is_in_class(&self) -> bool {
        self.qclass == u16::from(DNSClass::IN)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.qtype, self.qclass, self.qname)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::rr::Name;
    use std::collections::HashSet;
    use std::str::FromStr;

    fn query(name: &str, record_type: RecordType) -> Query {
        Query::query(Name::from_str(name).unwrap(), record_type)
    }

    #[test]
    fn test_from_query() {
        let key = CacheKey::from_query(&query("allowed.example.com.", RecordType::A));
        assert_eq!(key.qname(), "allowed.example.com.");
        assert_eq!(key.qtype(), 1);
        assert_eq!(key.qclass(), 1);
        assert!(key.is_in_class());
        assert_eq!(key.record_type(), RecordType::A);
    }

    #[test]
    fn test_display_form() {
        let key = CacheKey::from_query(&query("example.com.", RecordType::MX));
        assert_eq!(key.to_string(), "15.1.example.com.");
    }

    #[test]
    fn test_same_question_same_key() {
        let a = CacheKey::from_query(&query("example.com.", RecordType::A));
        let b = CacheKey::from_query(&query("example.com.", RecordType::A));
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_type_distinguishes_keys() {
        let a = CacheKey::from_query(&query("example.com.", RecordType::A));
        let aaaa = CacheKey::from_query(&query("example.com.", RecordType::AAAA));
        assert_ne!(a, aaaa);
    }

    #[test]
    fn test_name_is_case_sensitive() {
        let lower = CacheKey::new("example.com.", 1, 1);
        let mixed = CacheKey::new("Example.COM.", 1, 1);
        assert_ne!(lower, mixed);
    }

    #[test]
    fn test_from_message_without_question() {
        assert!(CacheKey::from_message(&Message::new()).is_none());

        let mut message = Message::new();
        message.add_query(query("example.com.", RecordType::A));
        assert_eq!(
            CacheKey::from_message(&message),
            Some(CacheKey::new("example.com.", 1, 1))
        );
    }
}
