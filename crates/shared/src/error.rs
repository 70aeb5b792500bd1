//! Error types for DeskWire domain values

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Satisfaction rating out of range (1-5): {0}")]
    RatingOutOfRange(i16),
}
