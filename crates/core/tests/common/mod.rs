//! Shared fixtures for ledger integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use rust_decimal::Decimal;
use tally_core::{Account, Ledger, LedgerBuilder, LedgerHooks, MemoryStore, OwnerRef, TransactionStatus};
use tally_shared::LedgerConfig;
use tally_shared::types::{Currency, Money};

/// A ledger over an in-memory store the test can inspect directly.
pub struct Fixture {
    pub ledger: Ledger,
    pub store: MemoryStore,
}

pub fn usd(amount: Decimal) -> Money {
    Money::new(amount, Currency::USD)
}

pub fn fixture(config: LedgerConfig) -> Fixture {
    builder(config).build().expect("ledger should build")
}

/// Builder variant for tests that register hooks or converters.
pub fn builder(config: LedgerConfig) -> FixtureBuilder {
    let store = MemoryStore::new();
    FixtureBuilder {
        inner: LedgerBuilder::new(config, Arc::new(store.clone())),
        store,
    }
}

pub struct FixtureBuilder {
    inner: LedgerBuilder,
    store: MemoryStore,
}

impl FixtureBuilder {
    pub fn hook(mut self, hook: impl LedgerHooks + 'static) -> Self {
        self.inner = self.inner.hook(hook);
        self
    }

    pub fn map(mut self, f: impl FnOnce(LedgerBuilder) -> LedgerBuilder) -> Self {
        self.inner = f(self.inner);
        self
    }

    pub fn build(self) -> Result<Fixture, tally_core::LedgerError> {
        Ok(Fixture {
            ledger: self.inner.build()?,
            store: self.store,
        })
    }
}

impl Fixture {
    /// Creates a USD wallet for `owner_id`.
    pub async fn wallet(&self, owner_id: &str) -> Account {
        self.ledger
            .accounts()
            .create(&OwnerRef::new("user", owner_id), Some("wallet"), Some(Currency::USD))
            .await
            .expect("account should be created")
    }

    /// The bank account funds are issued from; it runs negative.
    pub async fn bank(&self) -> Account {
        self.ledger
            .accounts()
            .create(&OwnerRef::new("bank", "central"), Some("equity"), Some(Currency::USD))
            .await
            .expect("bank account should be created")
    }

    /// Creates a USD wallet holding `amount`, issued from the bank.
    pub async fn funded(&self, owner_id: &str, amount: Decimal) -> Account {
        let account = self.wallet(owner_id).await;
        let bank = self.bank().await;
        let tx = self
            .ledger
            .transactions()
            .create(&bank, &account, usd(amount), None, None)
            .await
            .expect("funding should be created");
        if tx.status == TransactionStatus::Started {
            self.ledger
                .transactions()
                .commit(tx.key)
                .await
                .expect("funding should commit");
        }
        self.ledger
            .accounts()
            .get(account.key)
            .await
            .expect("funded account should exist")
    }

    pub async fn balance(&self, account: &Account) -> Decimal {
        self.ledger
            .balances()
            .balance(account.key, None, None)
            .await
            .expect("balance should be readable")
            .amount
    }

    /// Sum of every cached balance.
    pub fn ledger_sum(&self) -> Decimal {
        self.store.accounts().iter().map(|a| a.balance).sum()
    }
}
