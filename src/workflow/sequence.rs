//! Short reference minting
//!
//! `DOC-000012` style references come from an atomically incremented counter.
//! When the counter cannot be reached a random reference of the same prefix is
//! used instead, so references are usually sequential and always unique.

use rand::{distributions::Alphanumeric, Rng};
use std::sync::Arc;
use tracing::warn;

use crate::db::schemas::DOCUMENT_REF_SERIES;
use crate::store::CounterStore;
use crate::types::Result;

/// Length of the random part of a fallback reference
const FALLBACK_LEN: usize = 10;

/// A minted short reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortRef {
    pub value: String,
    /// False when the counter was unavailable and a random reference was used
    pub sequential: bool,
}

#[derive(Clone)]
pub struct SequenceIdGenerator {
    counters: Arc<dyn CounterStore>,
    prefix: String,
}

impl SequenceIdGenerator {
    pub fn new(counters: Arc<dyn CounterStore>, prefix: impl Into<String>) -> Self {
        Self {
            counters,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Next value of a named series
    pub async fn next(&self, series: &str) -> Result<i64> {
        self.counters.increment(series).await
    }

    /// Mint the next short document reference, falling back to a random one
    pub async fn mint_short_ref(&self) -> ShortRef {
        match self.next(DOCUMENT_REF_SERIES).await {
            Ok(seq) => ShortRef {
                value: format_short_ref(&self.prefix, seq),
                sequential: true,
            },
            Err(e) => {
                let value = random_short_ref(&self.prefix);
                warn!(error = %e, reference = %value, "Counter unavailable, using random reference");
                ShortRef {
                    value,
                    sequential: false,
                }
            }
        }
    }
}

/// `PREFIX-` followed by the sequence number zero-padded to six digits
pub fn format_short_ref(prefix: &str, seq: i64) -> String {
    format!("{prefix}-{seq:06}")
}

/// `PREFIX-` followed by ten uppercase alphanumerics, the first always a
/// letter so it can never equal a formatted sequence number
pub fn random_short_ref(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let lead = char::from(rng.gen_range(b'A'..=b'Z'));
    let rest: String = (&mut rng)
        .sample_iter(&Alphanumeric)
        .take(FALLBACK_LEN - 1)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect();
    format!("{prefix}-{lead}{rest}")
}

/// Opaque document token
pub fn mint_doc_ref(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCounterStore;
    use crate::types::DoctrackError;
    use async_trait::async_trait;

    struct BrokenCounter;

    #[async_trait]
    impl CounterStore for BrokenCounter {
        async fn increment(&self, _series: &str) -> Result<i64> {
            Err(DoctrackError::Database("counter collection unavailable".into()))
        }
    }

    #[test]
    fn test_format() {
        assert_eq!(format_short_ref("DOC", 1), "DOC-000001");
        assert_eq!(format_short_ref("DOC", 1234567), "DOC-1234567");
    }

    #[test]
    fn test_random_ref_shape() {
        let r = random_short_ref("DOC");
        let tail = r.strip_prefix("DOC-").unwrap();
        assert_eq!(tail.len(), FALLBACK_LEN);
        assert!(tail.chars().next().unwrap().is_ascii_uppercase());
        assert!(tail.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn test_sequential_minting() {
        let gen = SequenceIdGenerator::new(Arc::new(MemoryCounterStore::new()), "DOC");
        assert_eq!(gen.mint_short_ref().await.value, "DOC-000001");
        assert_eq!(gen.mint_short_ref().await.value, "DOC-000002");
        assert_eq!(gen.next("other").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_fallback_when_counter_fails() {
        let gen = SequenceIdGenerator::new(Arc::new(BrokenCounter), "DOC");
        let a = gen.mint_short_ref().await;
        let b = gen.mint_short_ref().await;
        assert!(!a.sequential);
        assert!(a.value.starts_with("DOC-"));
        assert_ne!(a.value, b.value);
    }

    #[test]
    fn test_doc_ref_is_opaque() {
        let r = mint_doc_ref("DOC");
        assert_eq!(r.len(), "DOC-".len() + 32);
        assert_ne!(r, mint_doc_ref("DOC"));
    }
}
