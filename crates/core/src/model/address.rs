//! Account addresses of the form `ownerType:ownerId:accountType:accountCurrency`.
//!
//! Every segment except the owner id may be empty (or omitted from the end)
//! and is then filled from configuration at resolution time.

use tally_shared::types::Currency;

use crate::error::LedgerError;

/// A parsed, not yet resolved, account address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountAddress {
    /// Owner type, `None` for the configured default.
    pub owner_type: Option<String>,
    /// Owner id.
    pub owner_id: String,
    /// Account type, `None` for the configured default.
    pub account_type: Option<String>,
    /// Account currency, `None` for the configured default.
    pub currency: Option<Currency>,
}

impl AccountAddress {
    /// Parses an address string.
    pub fn parse(address: &str) -> Result<Self, LedgerError> {
        let segments: Vec<&str> = address.split(':').collect();
        if segments.len() < 2 || segments.len() > 4 {
            return Err(LedgerError::InvalidAddress(address.to_string()));
        }

        let segment = |i: usize| {
            segments
                .get(i)
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
        };

        let owner_id = segment(1)
            .ok_or_else(|| LedgerError::InvalidAddress(address.to_string()))?
            .to_string();

        let currency = segment(3)
            .map(Currency::new)
            .transpose()
            .map_err(|_| LedgerError::InvalidAddress(address.to_string()))?;

        Ok(Self {
            owner_type: segment(0).map(str::to_string),
            owner_id,
            account_type: segment(2).map(str::to_string),
            currency,
        })
    }
}

impl std::str::FromStr for AccountAddress {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.owner_type.as_deref().unwrap_or(""),
            self.owner_id,
            self.account_type.as_deref().unwrap_or(""),
            self.currency.map(|c| c.to_string()).unwrap_or_default()
        )
    }
}
