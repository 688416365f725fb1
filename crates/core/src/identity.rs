use uuid::Uuid;

use crate::ids::DeviceId;

/// Source of fresh device identities. Values must be unique for the lifetime
/// of the deployment.
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> DeviceId;
}

/// Random 128-bit identities (UUID v4).
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn generate(&self) -> DeviceId {
        DeviceId::from_uuid(Uuid::new_v4())
    }
}
