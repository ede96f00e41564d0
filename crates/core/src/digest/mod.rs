//! Tamper-evident hash chain over committed transactions.
//!
//! `digest = HMAC(key, previous_digest || base_currency || canonical(current))`
//!
//! Committed transactions are chained by `(finished_at, key)`. A digest is
//! written once, with assign-if-absent semantics, and only [`DigestChain::rehash`]
//! may clear it again.

mod canonical;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha384, Sha512};
use tally_shared::config::DigestAlgorithm;
use tally_shared::types::TransactionKey;

use crate::context::LedgerContext;
use crate::error::{LedgerError, LedgerResult};
use crate::model::{Transaction, TransactionStatus};
use crate::store::{StoreTransaction, TransactionFilter, TransactionOrder};

pub use canonical::canonical_json;

/// Where a rehash starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RehashFrom {
    /// The whole committed history.
    Beginning,
    /// This committed transaction and everything chained after it.
    Transaction(TransactionKey),
    /// Transactions finished at or after this instant.
    Time(DateTime<Utc>),
}

/// Digest chain maintenance.
#[derive(Clone)]
pub struct DigestChain {
    ctx: Arc<LedgerContext>,
}

macro_rules! hmac_hex {
    ($hash:ty, $key:expr, $($part:expr),+) => {{
        let mut mac = <Hmac<$hash> as Mac>::new_from_slice($key)
            .map_err(|e| LedgerError::Misconfiguration(format!("digest key: {e}")))?;
        $(mac.update($part);)+
        hex::encode(mac.finalize().into_bytes())
    }};
}

impl DigestChain {
    pub(crate) fn new(ctx: Arc<LedgerContext>) -> Self {
        Self { ctx }
    }

    /// Computes the digest of `current` chained onto `previous`.
    pub fn digest(&self, current: &Transaction, previous: Option<&str>) -> LedgerResult<String> {
        let key = self.ctx.config.digest.key.as_bytes();
        let previous = previous.unwrap_or_default().as_bytes();
        let base = self.ctx.base_currency();
        let body = canonical_json(current)?;

        Ok(match self.ctx.config.digest.algorithm {
            DigestAlgorithm::Sha256 => {
                hmac_hex!(Sha256, key, previous, base.code().as_bytes(), body.as_bytes())
            }
            DigestAlgorithm::Sha384 => {
                hmac_hex!(Sha384, key, previous, base.code().as_bytes(), body.as_bytes())
            }
            DigestAlgorithm::Sha512 => {
                hmac_hex!(Sha512, key, previous, base.code().as_bytes(), body.as_bytes())
            }
        })
    }

    /// Fills the digest of `key`, and of any undigested predecessors, if missing.
    ///
    /// Returns the transaction as stored afterwards.
    pub async fn ensure(&self, key: TransactionKey) -> LedgerResult<Transaction> {
        let mut uow = self.ctx.begin().await?;
        uow.lock_chain().await?;
        let transaction = uow
            .find_transaction(key)
            .await?
            .ok_or(LedgerError::TransactionNotFound(key))?;

        if transaction.status != TransactionStatus::Committed || transaction.digest.is_some() {
            uow.rollback().await;
            return Ok(transaction);
        }

        let mut pending = vec![transaction];
        let mut previous = None;
        while let Some(position) = pending.last().and_then(Transaction::chain_position) {
            match predecessor(uow.as_mut(), position).await? {
                Some(prior) if prior.digest.is_some() => {
                    previous = prior.digest;
                    break;
                }
                Some(prior) => pending.push(prior),
                None => break,
            }
        }

        let mut filled = None;
        for mut transaction in pending.into_iter().rev() {
            let digest = self.digest(&transaction, previous.as_deref())?;
            if uow.set_digest_if_absent(transaction.key, &digest).await? {
                tracing::debug!(transaction = %transaction.key, digest = %digest, "Digest assigned");
                transaction.digest = Some(digest);
            } else {
                transaction.digest = uow
                    .find_transaction(transaction.key)
                    .await?
                    .and_then(|stored| stored.digest);
            }
            previous.clone_from(&transaction.digest);
            filled = Some(transaction);
        }
        uow.commit().await?;

        filled.ok_or(LedgerError::TransactionNotFound(key))
    }

    /// Clears and recomputes the digests of a suffix of the committed history.
    ///
    /// Holds the chain lock throughout, so a concurrent commit's digest is
    /// assigned either before the suffix is read or after it is rewritten.
    ///
    /// Returns the number of transactions rehashed.
    pub async fn rehash(&self, from: RehashFrom) -> LedgerResult<usize> {
        let mut uow = self.ctx.begin().await?;
        uow.lock_chain().await?;
        let mut filter = TransactionFilter::committed();

        match from {
            RehashFrom::Beginning => {}
            RehashFrom::Transaction(key) => {
                let start = uow
                    .find_transaction(key)
                    .await?
                    .ok_or(LedgerError::TransactionNotFound(key))?;
                let position = start.chain_position().ok_or(LedgerError::StatusMismatch {
                    operation: "rehash",
                    key,
                    expected: TransactionStatus::Committed,
                    actual: start.status,
                })?;
                filter.chain_after = predecessor(uow.as_mut(), position)
                    .await?
                    .and_then(|prior| prior.chain_position());
            }
            RehashFrom::Time(at) => {
                let boundary = (at, TransactionKey::from_uuid(uuid::Uuid::nil()));
                filter.chain_after = predecessor(uow.as_mut(), boundary)
                    .await?
                    .and_then(|prior| prior.chain_position());
            }
        }

        let mut suffix = uow.query_transactions(&filter).await?;
        let mut previous = None;
        if let Some(position) = suffix.first().and_then(Transaction::chain_position) {
            match predecessor(uow.as_mut(), position).await? {
                Some(prior) if prior.digest.is_some() => previous = prior.digest,
                // An undigested predecessor cannot anchor the suffix.
                Some(_) => suffix = uow.query_transactions(&TransactionFilter::committed()).await?,
                None => {}
            }
        }

        for transaction in &suffix {
            uow.clear_digest(transaction.key).await?;
            let digest = self.digest(transaction, previous.as_deref())?;
            uow.set_digest_if_absent(transaction.key, &digest).await?;
            previous = Some(digest);
        }
        uow.commit().await?;

        tracing::info!(count = suffix.len(), "Digest chain rehashed");
        Ok(suffix.len())
    }

    /// Recomputes the chain from the first committed transaction.
    ///
    /// Returns the keys whose stored digest differs from the recomputation,
    /// in chain order. Transactions still waiting for a digest are skipped.
    pub async fn verify_chain(&self) -> LedgerResult<Vec<TransactionKey>> {
        let mut uow = self.ctx.begin().await?;
        let history = uow.query_transactions(&TransactionFilter::committed()).await?;
        uow.rollback().await;

        let mut previous: Option<String> = None;
        let mut mismatched = Vec::new();
        for transaction in &history {
            let expected = self.digest(transaction, previous.as_deref())?;
            if transaction
                .digest
                .as_ref()
                .is_some_and(|stored| *stored != expected)
            {
                tracing::warn!(transaction = %transaction.key, "Digest mismatch");
                mismatched.push(transaction.key);
            }
            previous = Some(expected);
        }
        Ok(mismatched)
    }
}

/// The committed transaction chained immediately before `position`.
async fn predecessor(
    uow: &mut dyn StoreTransaction,
    position: (DateTime<Utc>, TransactionKey),
) -> LedgerResult<Option<Transaction>> {
    let filter = TransactionFilter {
        chain_before: Some(position),
        ..TransactionFilter::committed()
    }
    .ordered(TransactionOrder::FinishedDesc)
    .limited(1);
    Ok(uow.query_transactions(&filter).await?.into_iter().next())
}
