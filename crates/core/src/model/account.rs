//! Account record.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tally_shared::types::{AccountKey, Currency, Money};

use super::owner::OwnerRef;

/// A typed, currency-scoped balance bucket belonging to an owner.
///
/// `(owner, account_type, currency)` is unique across the ledger. The cached
/// `balance` only changes inside a commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Account key.
    pub key: AccountKey,
    /// Owning entity.
    pub owner: OwnerRef,
    /// Account type, e.g. `default`, `locked`, `credit`.
    pub account_type: String,
    /// Native currency of the account.
    pub currency: Currency,
    /// Cached balance in `currency`.
    pub balance: Decimal,
    /// Free-form policy data (credit limits and the like).
    pub context: Value,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last balance update.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Creates an empty account.
    pub fn new(owner: OwnerRef, account_type: impl Into<String>, currency: Currency) -> Self {
        let now = Utc::now();
        Self {
            key: AccountKey::new(),
            owner,
            account_type: account_type.into(),
            currency,
            balance: Decimal::ZERO,
            context: Value::Null,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attaches policy data.
    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    /// Cached balance as money.
    #[must_use]
    pub fn balance(&self) -> Money {
        Money::new(self.balance, self.currency)
    }

    /// Looks up a dot-separated path in the context, e.g. `credit.limit`.
    #[must_use]
    pub fn context_value(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(&self.context, |node, segment| node.get(segment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_new_account_is_empty() {
        let account = Account::new(OwnerRef::new("user", "1"), "default", Currency::USD);
        assert_eq!(account.balance(), Money::zero(Currency::USD));
        assert_eq!(account.context, Value::Null);
    }

    #[test]
    fn test_context_path_lookup() {
        let account = Account::new(OwnerRef::new("user", "1"), "credit", Currency::USD)
            .with_context(json!({ "credit": { "limit": "500.00", "source": "bank:1::USD" } }));

        assert_eq!(account.context_value("credit.limit"), Some(&json!("500.00")));
        assert_eq!(account.context_value("credit.missing"), None);
        assert_eq!(account.context_value("nope.deeper"), None);
    }

    #[test]
    fn test_balance_money() {
        let mut account = Account::new(OwnerRef::new("user", "1"), "default", Currency::EUR);
        account.balance = dec!(12.5);
        assert_eq!(account.balance(), Money::new(dec!(12.5), Currency::EUR));
    }
}
