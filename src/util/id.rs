//! Process-wide unique, time-ordered identifiers

use sonyflake::Sonyflake;
use std::error::Error;

/// Source of match identifiers
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> Result<String, IdError>;
}

#[derive(Debug, thiserror::Error)]
pub enum IdError {
    #[error("Id generator failed: {0}")]
    Sonyflake(#[from] sonyflake::Error),
}

/// Sonyflake-backed generator; ids are rendered in decimal
pub struct FlakeIdGenerator {
    flake: Sonyflake,
}

impl FlakeIdGenerator {
    /// `machine_id` must be unique among the processes sharing an id space
    pub fn new(machine_id: u16) -> Result<Self, IdError> {
        let flake = Sonyflake::builder()
            .machine_id(&move || Ok::<u16, Box<dyn Error + Send + Sync>>(machine_id))
            .finalize()?;

        Ok(Self { flake })
    }
}

impl IdGenerator for FlakeIdGenerator {
    fn next_id(&self) -> Result<String, IdError> {
        Ok(self.flake.next_id()?.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_are_unique_decimal_strings() {
        let ids = FlakeIdGenerator::new(7).unwrap();
        let generated: Vec<String> = (0..100).map(|_| ids.next_id().unwrap()).collect();

        assert!(generated
            .iter()
            .all(|id| id.chars().all(|c| c.is_ascii_digit())));
        assert_eq!(generated.iter().collect::<HashSet<_>>().len(), generated.len());
    }
}
