use crate::{registry::IdAllocator, EventKind, RegistryError};
use std::sync::Arc;
use tracing::{debug, warn};

/// A mutation a caller is asking the registry to accept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation<'a> {
    Register {
        crop_type: &'a str,
        origin_farm: &'a str,
        harvest_date: i64,
    },
    TransferOwnership {
        batch_id: u64,
        new_owner: &'a str,
    },
    UpdateStatus {
        batch_id: u64,
        new_status: &'a str,
    },
}

impl<'a> Mutation<'a> {
    /// The mutation that would record `kind` against `batch_id`
    pub fn for_event(batch_id: u64, kind: &'a EventKind) -> Self {
        match kind {
            EventKind::Registered { crop_type, origin_farm, harvest_date } => Mutation::Register {
                crop_type,
                origin_farm,
                harvest_date: *harvest_date,
            },
            EventKind::OwnershipTransferred { new_owner } => {
                Mutation::TransferOwnership { batch_id, new_owner }
            }
            EventKind::StatusUpdated { new_status } => Mutation::UpdateStatus { batch_id, new_status },
        }
    }

    /// Identifier the mutation targets; `None` for registration
    pub fn target(&self) -> Option<u64> {
        match self {
            Mutation::Register { .. } => None,
            Mutation::TransferOwnership { batch_id, .. } | Mutation::UpdateStatus { batch_id, .. } => {
                Some(*batch_id)
            }
        }
    }
}

/// External authorization hook consulted before a mutation is accepted
///
/// Return `Err(reason)` to reject. The registry performs no write and
/// emits no event for a rejected mutation.
pub trait MutationGate: Send + Sync {
    fn authorize(&self, mutation: &Mutation<'_>) -> Result<(), String>;
}

/// Gate that accepts every mutation
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenGate;

impl MutationGate for OpenGate {
    fn authorize(&self, _mutation: &Mutation<'_>) -> Result<(), String> {
        Ok(())
    }
}

pub struct Validator {
    gate: Arc<dyn MutationGate>,
}

impl Validator {
    pub fn new(gate: Arc<dyn MutationGate>) -> Self {
        Self { gate }
    }

    /// Validate a mutation against the current allocator state
    /// Returns Ok(()) if it may be applied
    pub fn validate(&self, allocator: &IdAllocator, mutation: &Mutation<'_>) -> Result<(), RegistryError> {
        debug!(?mutation, "Validating mutation");

        // 1. Target must be an issued identifier
        if let Some(batch_id) = mutation.target() {
            check_batch_id(allocator, batch_id)?;
        }

        // 2. Ask the gate
        self.gate.authorize(mutation).map_err(|reason| {
            warn!(?mutation, %reason, "Mutation rejected by gate");
            RegistryError::Unauthorized(reason)
        })?;

        Ok(())
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(Arc::new(OpenGate))
    }
}

/// Fail with `InvalidBatchId` unless `batch_id` is in `1..=counter`
pub fn check_batch_id(allocator: &IdAllocator, batch_id: u64) -> Result<(), RegistryError> {
    if !allocator.is_issued(batch_id) {
        warn!(batch_id, counter = allocator.counter(), "Batch id out of range");
        return Err(RegistryError::InvalidBatchId {
            batch_id,
            counter: allocator.counter(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DenyCarrier;

    impl MutationGate for DenyCarrier {
        fn authorize(&self, mutation: &Mutation<'_>) -> Result<(), String> {
            match mutation {
                Mutation::TransferOwnership { new_owner, .. } if new_owner.starts_with("Carrier") => {
                    Err(format!("{new_owner} is not an approved custodian"))
                }
                _ => Ok(()),
            }
        }
    }

    #[test]
    fn test_open_gate_accepts_issued_ids() {
        let validator = Validator::default();
        let allocator = IdAllocator::resume(1);
        let mutation = Mutation::UpdateStatus { batch_id: 1, new_status: "Stored" };
        assert!(validator.validate(&allocator, &mutation).is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_ids() {
        let validator = Validator::default();
        let allocator = IdAllocator::resume(1);

        for batch_id in [0, 2] {
            let mutation = Mutation::TransferOwnership { batch_id, new_owner: "X" };
            match validator.validate(&allocator, &mutation) {
                Err(RegistryError::InvalidBatchId { batch_id: got, counter }) => {
                    assert_eq!(got, batch_id);
                    assert_eq!(counter, 1);
                }
                other => panic!("Expected InvalidBatchId, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_registration_skips_id_check() {
        let validator = Validator::default();
        let mutation = Mutation::Register { crop_type: "Wheat", origin_farm: "FarmA", harvest_date: 0 };
        assert!(validator.validate(&IdAllocator::new(), &mutation).is_ok());
    }

    #[test]
    fn test_gate_rejection() {
        let validator = Validator::new(Arc::new(DenyCarrier));
        let allocator = IdAllocator::resume(1);

        let denied = Mutation::TransferOwnership { batch_id: 1, new_owner: "CarrierX" };
        assert!(matches!(
            validator.validate(&allocator, &denied),
            Err(RegistryError::Unauthorized(_))
        ));

        let allowed = Mutation::TransferOwnership { batch_id: 1, new_owner: "RetailerY" };
        assert!(validator.validate(&allocator, &allowed).is_ok());
    }

    #[test]
    fn test_mutation_for_event() {
        let kind = EventKind::StatusUpdated { new_status: "Stored".to_string() };
        assert_eq!(
            Mutation::for_event(4, &kind),
            Mutation::UpdateStatus { batch_id: 4, new_status: "Stored" }
        );

        let kind = EventKind::Registered {
            crop_type: "Wheat".to_string(),
            origin_farm: "FarmA".to_string(),
            harvest_date: -86_400,
        };
        let mutation = Mutation::for_event(1, &kind);
        assert_eq!(mutation.target(), None);
        assert_eq!(
            mutation,
            Mutation::Register { crop_type: "Wheat", origin_farm: "FarmA", harvest_date: -86_400 }
        );
    }

    #[test]
    fn test_id_check_runs_before_gate() {
        let validator = Validator::new(Arc::new(DenyCarrier));
        let denied = Mutation::TransferOwnership { batch_id: 9, new_owner: "CarrierX" };
        assert!(matches!(
            validator.validate(&IdAllocator::new(), &denied),
            Err(RegistryError::InvalidBatchId { .. })
        ));
    }
}
