//! Canonical form of a transaction fed into the digest.
//!
//! Every field except the digest itself. Amounts are normalized so a store
//! that pads decimals does not change the digest; timestamps are RFC 3339 in
//! UTC with microsecond precision.

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

use crate::error::{LedgerError, LedgerResult};
use crate::model::Transaction;

#[derive(Serialize)]
struct CanonicalTransaction<'a> {
    key: String,
    parent: Option<String>,
    origin: String,
    destination: String,
    currency: &'a str,
    amount: String,
    base_amount: Option<String>,
    origin_amount: Option<String>,
    destination_amount: Option<String>,
    payload: Option<&'a Value>,
    status: &'a str,
    started_at: String,
    finished_at: Option<String>,
}

fn amount(value: Decimal) -> String {
    value.normalize().to_string()
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Serializes `transaction` into the byte-stable JSON used for digests.
pub fn canonical_json(transaction: &Transaction) -> LedgerResult<String> {
    let canonical = CanonicalTransaction {
        key: transaction.key.to_string(),
        parent: transaction.parent.map(|p| p.to_string()),
        origin: transaction.origin.to_string(),
        destination: transaction.destination.to_string(),
        currency: transaction.currency.code(),
        amount: amount(transaction.amount),
        base_amount: transaction.base_amount.map(amount),
        origin_amount: transaction.origin_amount.map(amount),
        destination_amount: transaction.destination_amount.map(amount),
        payload: transaction.payload.as_ref(),
        status: transaction.status.as_str(),
        started_at: timestamp(transaction.started_at),
        finished_at: transaction.finished_at.map(timestamp),
    };
    serde_json::to_string(&canonical)
        .map_err(|e| LedgerError::Misconfiguration(format!("canonical serialization: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use tally_shared::types::{AccountKey, Currency, Money};

    use crate::model::TransactionStatus;

    fn committed() -> Transaction {
        let mut tx = Transaction::started(
            AccountKey::new(),
            AccountKey::new(),
            Money::new(dec!(40), Currency::USD),
            Some(json!({ "b": 2, "a": 1 })),
            None,
        );
        tx.base_amount = Some(dec!(40));
        tx.origin_amount = Some(dec!(40));
        tx.destination_amount = Some(dec!(40));
        tx.finish(TransactionStatus::Committed, Utc::now());
        tx
    }

    #[test]
    fn test_digest_field_excluded() {
        let mut tx = committed();
        let before = canonical_json(&tx).unwrap();
        tx.digest = Some("abc".into());
        assert_eq!(canonical_json(&tx).unwrap(), before);
        assert!(!before.contains("digest"));
    }

    #[test]
    fn test_decimal_scale_is_irrelevant() {
        let mut tx = committed();
        let before = canonical_json(&tx).unwrap();
        tx.amount = dec!(40.000);
        assert_eq!(canonical_json(&tx).unwrap(), before);
    }

    #[test]
    fn test_amount_change_is_visible() {
        let mut tx = committed();
        let before = canonical_json(&tx).unwrap();
        tx.amount = dec!(41);
        assert_ne!(canonical_json(&tx).unwrap(), before);
    }
}
