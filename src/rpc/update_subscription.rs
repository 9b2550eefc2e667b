//! Subscription replacement RPC towards the elected master.
//!
//! Updates are serialized through the master's metadata pipeline; concurrent
//! callers race and the last writer wins, each observing its own
//! acknowledgement.

use serde::{Deserialize, Serialize};

use crate::metadata::Subscription;

/// Replace the named subscription with the given value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSubscriptionRequest {
    pub name: String,
    pub subscription: Subscription,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcknowledgedResponse {
    pub acknowledged: bool,
}

impl AcknowledgedResponse {
    pub fn acknowledged() -> Self {
        Self { acknowledged: true }
    }

    pub fn unacknowledged() -> Self {
        Self {
            acknowledged: false,
        }
    }
}
