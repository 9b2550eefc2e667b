//! Wire RPC shapes consumed from external collaborators.
//!
//! The transports behind these shapes live outside the control plane; only
//! the request/response layout is part of its contract.

pub mod publications_state;
pub mod update_subscription;

pub use publications_state::{
    ColumnSchema, PublicationsStateRequest, PublicationsStateResponse, RelationDescriptor,
    RelationSchema,
};
pub use update_subscription::{AcknowledgedResponse, UpdateSubscriptionRequest};
