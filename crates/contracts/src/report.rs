//! DeliveryReport - what a submission callback receives

use crate::DeliveryError;

/// Terminal status of the batch a submission ended up in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Delivered,
    Failed(DeliveryError),
}

/// Terminal outcome for one batch, shared by all callbacks attached to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub status: DeliveryStatus,
    /// Delivery attempts made, including the first one
    pub attempts: u32,
    /// Entries in the batch
    pub entry_count: usize,
    /// Accounted bytes of the batch
    pub byte_size: u64,
}

impl DeliveryReport {
    pub fn is_success(&self) -> bool {
        matches!(self.status, DeliveryStatus::Delivered)
    }

    pub fn error(&self) -> Option<&DeliveryError> {
        match &self.status {
            DeliveryStatus::Delivered => None,
            DeliveryStatus::Failed(e) => Some(e),
        }
    }
}
