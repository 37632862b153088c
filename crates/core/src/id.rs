// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier newtypes and ID generation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Blank (empty or whitespace-only) IDs are rejected at validation
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Identity of one physical runner; one coordinator exists per runner
    RunnerId
);
string_id!(
    /// Idempotency key of an acquire call
    RequestId
);
string_id!(
    /// Identity of a granted semaphore slot
    LeaseId
);
string_id!(
    /// Idempotency key of a run enqueue
    TicketId
);

/// Generates unique identifiers
pub trait IdGen: Clone + Send + Sync {
    fn next(&self) -> String;
}

/// UUID-based ID generator for production use
#[derive(Clone, Default)]
pub struct UuidIdGen;

impl IdGen for UuidIdGen {
    fn next(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Sequential ID generator for testing
#[derive(Clone)]
pub struct SequentialIdGen {
    prefix: String,
    counter: Arc<AtomicU64>,
}

impl SequentialIdGen {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl Default for SequentialIdGen {
    fn default() -> Self {
        Self::new("id")
    }
}

impl IdGen for SequentialIdGen {
    fn next(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}", self.prefix, n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_ids_are_detected() {
        assert!(RequestId::new("").is_blank());
        assert!(LeaseId::new("   ").is_blank());
        assert!(!TicketId::new("t-1").is_blank());
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let json = serde_json::to_string(&RunnerId::new("emulator-a")).unwrap();
        assert_eq!(json, "\"emulator-a\"");
        let back: RunnerId = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_str(), "emulator-a");
    }

    #[test]
    fn ticket_ids_order_lexicographically() {
        let mut ids = vec![TicketId::new("b"), TicketId::new("a"), TicketId::new("c")];
        ids.sort();
        assert_eq!(ids, vec![TicketId::new("a"), TicketId::new("b"), TicketId::new("c")]);
    }

    #[test]
    fn display_honors_width() {
        assert_eq!(format!("{:<6}|", RunnerId::new("emu")), "emu   |");
    }

    #[test]
    fn uuid_gen_creates_unique_ids() {
        let id_gen = UuidIdGen;
        let id1 = id_gen.next();
        let id2 = id_gen.next();
        assert_ne!(id1, id2);
        assert_eq!(id1.len(), 36);
    }

    #[test]
    fn sequential_gen_is_cloneable_and_shared() {
        let id_gen1 = SequentialIdGen::new("lease");
        let id_gen2 = id_gen1.clone();
        assert_eq!(id_gen1.next(), "lease-1");
        assert_eq!(id_gen2.next(), "lease-2");
    }
}
