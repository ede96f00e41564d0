//! Collaborators shared by every ledger component.

use std::sync::Arc;

use rust_decimal::Decimal;
use tally_shared::LedgerConfig;
use tally_shared::types::{Currency, Money, TransactionKey};

use crate::currency::CurrencyService;
use crate::error::{LedgerError, LedgerResult, StoreError};
use crate::hooks::HookChain;
use crate::ledger::OwnerDirectory;
use crate::model::{Transaction, TransactionStatus};
use crate::store::{RecordStore, StoreTransaction, TransactionFilter};

/// Wiring handed to each component by the builder.
pub(crate) struct LedgerContext {
    pub(crate) store: Arc<dyn RecordStore>,
    pub(crate) config: LedgerConfig,
    pub(crate) currency: CurrencyService,
    pub(crate) hooks: HookChain,
    pub(crate) owners: Arc<dyn OwnerDirectory>,
}

impl LedgerContext {
    pub(crate) fn base_currency(&self) -> Currency {
        self.config.base_currency
    }

    /// Opens a unit of work.
    pub(crate) async fn begin(&self) -> LedgerResult<Box<dyn StoreTransaction>> {
        Ok(self.store.begin().await?)
    }

    /// Converts `money` into `target`, returning the bare amount.
    pub(crate) fn amount_in(&self, money: &Money, target: Currency) -> LedgerResult<Decimal> {
        Ok(self.currency.convert(money, target)?.amount)
    }

    /// Sum of the committed children of `parent`, in its currency.
    pub(crate) async fn reverted_amount(
        &self,
        uow: &mut dyn StoreTransaction,
        parent: &Transaction,
    ) -> LedgerResult<Decimal> {
        let children = uow
            .query_transactions(
                &TransactionFilter::with_status(&[TransactionStatus::Committed]).children_of(parent.key),
            )
            .await?;
        children.iter().try_fold(Decimal::ZERO, |sum, child| {
            Ok::<_, LedgerError>(sum + self.amount_in(&child.amount(), parent.currency)?)
        })
    }
}

/// Maps a missing transaction row to `TransactionNotFound`.
pub(crate) fn transaction_lookup(key: TransactionKey) -> impl FnOnce(StoreError) -> LedgerError {
    move |error| match error {
        StoreError::NotFound(_) => LedgerError::TransactionNotFound(key),
        other => LedgerError::Store(other),
    }
}
