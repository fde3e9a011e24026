//! Shared primitive types used across the entire pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a person in the source extracts.
pub type PersonKey = String;

/// Opaque identifier of an account in the source extracts.
pub type AccountKey = String;

/// Binary risk label. 1 = high delinquency risk.
pub type Label = i32;

/// The five tabular inputs of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Relation,
    Account,
    Deposit,
    Payment,
    Person,
}

impl SourceKind {
    pub const ALL: [SourceKind; 5] = [
        Self::Relation,
        Self::Account,
        Self::Deposit,
        Self::Payment,
        Self::Person,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Relation => "relation",
            Self::Account => "account",
            Self::Deposit => "deposit",
            Self::Payment => "payment",
            Self::Person => "person",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
