//! Login requirements attached to a checkout item.

use serde::{Deserialize, Serialize};

/// Bit flags describing which identities a buyer must have linked before
/// they can purchase an item.
///
/// Stored as a plain integer in `checkout_items.required_logins`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequiredLogins(i32);

impl RequiredLogins {
    pub const DISCORD: i32 = 1 << 0;
    pub const GOOGLE: i32 = 1 << 1;
    pub const FACEBOOK: i32 = 1 << 2;
    /// "Everlasting" items remain claimable without a linked Discord account.
    pub const EVERLASTING: i32 = 1 << 3;

    #[must_use]
    pub const fn from_bits(bits: i32) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn bits(&self) -> i32 {
        self.0
    }

    #[must_use]
    pub const fn discord(&self) -> bool {
        self.0 & Self::DISCORD != 0
    }

    #[must_use]
    pub const fn google(&self) -> bool {
        self.0 & Self::GOOGLE != 0
    }

    #[must_use]
    pub const fn facebook(&self) -> bool {
        self.0 & Self::FACEBOOK != 0
    }

    #[must_use]
    pub const fn everlasting(&self) -> bool {
        self.0 & Self::EVERLASTING != 0
    }
}

impl From<i32> for RequiredLogins {
    fn from(bits: i32) -> Self {
        Self(bits)
    }
}
