//! Kernel layout interventions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Split factors tried for [`Intervention::Upcast`].
pub const UPCAST_AMOUNTS: [usize; 3] = [2, 4, 8];

/// One candidate transformation of a kernel's axis layout.
///
/// Interventions are proposals. A winning sequence is always replayed from
/// scratch on a freshly built kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Intervention {
    /// Exchange two loop axes of the same kind (both output or both reduce).
    Swap(usize, usize),
    /// Split `axis` by `amount` and unroll the inner part.
    Upcast { axis: usize, amount: usize },
}

impl Intervention {
    pub fn swap(a: usize, b: usize) -> Self {
        Self::Swap(a, b)
    }

    pub fn upcast(axis: usize, amount: usize) -> Self {
        Self::Upcast { axis, amount }
    }
}

impl fmt::Display for Intervention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Swap(a, b) => write!(f, "SWAP({a}, {b})"),
            Self::Upcast { axis, amount } => write!(f, "UPCAST({axis}, {amount})"),
        }
    }
}
