//! # ensemble-types: shared identifiers and errors for `ensemble-sim`
//!
//! This crate contains the small set of types that cross the boundary
//! between the scheduler, the proxy layer, and a host application:
//! - Causal identifiers ([`TraceId`], [`SpanId`])
//! - The injected transport failure ([`RemoteCallError`])
//! - Construction-time errors ([`ConstructionError`])

use std::fmt::{self, Display};
use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};

// ============================================================================
// Causal identifiers
// ============================================================================

/// Identifier shared by every event belonging to a single operation
/// invocation. Minted once per `OpStart`; zero is reserved as invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TraceId(NonZeroU64);

/// Identifier unique to one operation start or one method call. Does not
/// propagate between caller and callee the way [`TraceId`] does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SpanId(NonZeroU64);

macro_rules! monotonic_id {
    ($ty:ident) => {
        impl $ty {
            /// Wraps a raw value. Panics if `value` is zero — zero is
            /// reserved to mean "no id" and is never minted by the scheduler.
            pub fn new(value: u64) -> Self {
                Self(NonZeroU64::new(value).expect("id value must be non-zero"))
            }

            pub fn get(self) -> u64 {
                self.0.get()
            }
        }

        impl Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$ty> for u64 {
            fn from(id: $ty) -> Self {
                id.0.get()
            }
        }
    };
}

monotonic_id!(TraceId);
monotonic_id!(SpanId);

// ============================================================================
// Remote call error
// ============================================================================

/// The distinguished error the scheduler substitutes into a call or reply
/// path to model a transport failure. Comparable for equality so tests and
/// op bodies can detect injection deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("RemoteCallError")]
pub struct RemoteCallError;

impl RemoteCallError {
    pub const MESSAGE: &'static str = "RemoteCallError";
}

// ============================================================================
// Construction errors
// ============================================================================

/// Errors returned from building a simulator, before any simulation runs.
#[derive(Debug, thiserror::Error)]
pub enum ConstructionError {
    #[error("num_replicas must be positive, got {0}")]
    InvalidNumReplicas(i64),

    #[error("num_ops must be positive, got {0}")]
    InvalidNumOps(i64),

    #[error("replica construction for component {component:?} failed: {source}")]
    ReplicaInit {
        component: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to parse config document {filename:?}: {source}")]
    ConfigParse {
        filename: String,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    #[should_panic(expected = "id value must be non-zero")]
    fn zero_is_rejected() {
        TraceId::new(0);
    }

    #[test]
    fn remote_call_error_is_comparable() {
        assert_eq!(RemoteCallError, RemoteCallError);
        assert_eq!(RemoteCallError.to_string(), RemoteCallError::MESSAGE);
    }

    #[test]
    fn trace_id_displays_as_its_number() {
        let id = TraceId::new(42);
        assert_eq!(id.to_string(), "42");
        assert_eq!(u64::from(id), 42);
    }

    proptest! {
        /// Any non-zero `u64` round-trips through `TraceId::new`/`get`
        /// unchanged (spec.md §8 invariant 4, "spanIDs are unique" relies on
        /// ids being a faithful, lossless wrapper over their raw value).
        #[test]
        fn trace_id_roundtrips_any_nonzero_value(raw in 1u64..=u64::MAX) {
            prop_assert_eq!(TraceId::new(raw).get(), raw);
            prop_assert_eq!(u64::from(TraceId::new(raw)), raw);
        }

        #[test]
        fn span_id_roundtrips_any_nonzero_value(raw in 1u64..=u64::MAX) {
            prop_assert_eq!(SpanId::new(raw).get(), raw);
            prop_assert_eq!(u64::from(SpanId::new(raw)), raw);
        }

        /// Ordering on the ids matches ordering on the wrapped value, since
        /// the scheduler relies on `TraceId`s it mints being comparable in
        /// minting order (spec.md §8 invariant 2).
        #[test]
        fn trace_id_ordering_matches_raw_value_ordering(a in 1u64..=u64::MAX, b in 1u64..=u64::MAX) {
            prop_assert_eq!(TraceId::new(a).cmp(&TraceId::new(b)), a.cmp(&b));
        }
    }
}
