//! Property-based test generators using proptest.
//!
//! Entity IDs are drawn from a small pool so that generated sequences hit
//! the same record repeatedly and exercise ordering and collapsing.

use hangar_sync_protocol::{EntityType, Operation, RemoteError};
use proptest::prelude::*;

/// A local mutation to feed into the sync queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    /// Entity type.
    pub entity_type: EntityType,
    /// Entity ID.
    pub entity_id: String,
    /// Mutation kind.
    pub operation: Operation,
    /// Payload (absent for deletes).
    pub payload: Option<Vec<u8>>,
}

/// One step of a randomized queue workload.
#[derive(Debug, Clone)]
pub enum QueueAction {
    /// Record a mutation.
    Enqueue(Mutation),
    /// Claim up to this many entries.
    Claim(usize),
    /// Acknowledge the oldest claimed entry.
    Ack,
    /// Fail the oldest claimed entry.
    Fail(RemoteError),
    /// Release every claimed entry.
    Release,
    /// Requeue failed entries.
    RetryFailed,
    /// Drop synced entries.
    Purge,
}

/// Strategy for the four built-in entity types.
pub fn entity_type_strategy() -> impl Strategy<Value = EntityType> {
    prop_oneof![
        Just(EntityType::Aircraft),
        Just(EntityType::Employee),
        Just(EntityType::Task),
        Just(EntityType::FlightSheet),
    ]
}

/// Strategy for operations.
pub fn operation_strategy() -> impl Strategy<Value = Operation> {
    prop_oneof![
        Just(Operation::Create),
        Just(Operation::Update),
        Just(Operation::Delete),
    ]
}

/// Strategy for payload bytes.
pub fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..64)
}

/// Strategy for a mutation on one of `id_pool` records of one of the
/// built-in types.
pub fn mutation_strategy(id_pool: usize) -> impl Strategy<Value = Mutation> {
    (
        entity_type_strategy(),
        0..id_pool.max(1),
        operation_strategy(),
        payload_strategy(),
    )
        .prop_map(|(entity_type, n, operation, payload)| Mutation {
            entity_type,
            entity_id: format!("r{n}"),
            payload: operation.carries_payload().then_some(payload),
            operation,
        })
}

/// Strategy for a mutation sequence of up to `max_len` entries.
pub fn mutation_sequence_strategy(max_len: usize) -> impl Strategy<Value = Vec<Mutation>> {
    prop::collection::vec(mutation_strategy(4), 1..max_len.max(2))
}

/// Strategy for raw remote failures.
pub fn remote_error_strategy() -> impl Strategy<Value = RemoteError> {
    prop_oneof![
        "[a-z ]{0,16}".prop_map(RemoteError::Network),
        Just(RemoteError::Timeout),
        "[a-z ]{0,16}".prop_map(RemoteError::Unauthorized),
        "[a-z ]{0,16}".prop_map(RemoteError::Forbidden),
        "[a-z ]{0,16}".prop_map(RemoteError::Rejected),
        "[a-z ]{0,16}".prop_map(|message| RemoteError::conflict(message)),
        "[a-z ]{0,16}".prop_map(RemoteError::NotFound),
        (400u16..600, "[a-z ]{0,16}")
            .prop_map(|(status, message)| RemoteError::Server { status, message }),
        "[a-z ]{0,16}".prop_map(RemoteError::Other),
    ]
}

/// Strategy for randomized queue workloads.
pub fn queue_action_strategy() -> impl Strategy<Value = QueueAction> {
    prop_oneof![
        4 => mutation_strategy(4).prop_map(QueueAction::Enqueue),
        2 => (1usize..6).prop_map(QueueAction::Claim),
        2 => Just(QueueAction::Ack),
        2 => remote_error_strategy().prop_map(QueueAction::Fail),
        1 => Just(QueueAction::Release),
        1 => Just(QueueAction::RetryFailed),
        1 => Just(QueueAction::Purge),
    ]
}
