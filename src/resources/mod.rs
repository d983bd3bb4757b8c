//! Policy tables for the resource kinds the engine reconciles.

pub mod container;
pub mod network;
pub mod service;
pub mod volume;

use crate::error::Result;
use crate::model::ResourceKind;
use crate::policy::PolicyTable;

impl ResourceKind {
    /// Builds the policy table for this kind.
    ///
    /// # Errors
    ///
    /// Returns a policy violation if the table declares a field twice.
    pub fn policy_table(self) -> Result<PolicyTable> {
        match self {
            Self::Container => container::policy_table(),
            Self::Service => service::policy_table(),
            Self::Network => network::policy_table(),
            Self::Volume => volume::policy_table(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_has_a_table() {
        for kind in ResourceKind::ALL {
            let table = kind.policy_table().unwrap();
            assert_eq!(table.kind(), kind);
            assert!(!table.is_empty());
        }
    }
}
