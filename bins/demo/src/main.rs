//! Tally demo.
//!
//! Drives the transaction lifecycle against the in-memory store and prints
//! the status each step ends in.
//!
//! Usage: cargo run --bin tally

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tally_core::{
    CheckBalance, DecimalMoneyConverter, Ledger, MemoryStore, OwnerRef, RehashFrom,
    Transaction,
};
use tally_shared::LedgerConfig;
use tally_shared::types::{Currency, Money};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tally=debug,tally_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = LedgerConfig::load()?;
    info!(base_currency = %config.base_currency, "Configuration loaded");

    let store = MemoryStore::new();
    let ledger = Ledger::builder(config, Arc::new(store.clone()))
        .converter(DecimalMoneyConverter::new().with_rate(Currency::USD, Currency::EUR, Decimal::new(92, 2)))
        .hook(CheckBalance::new().allow_overdraft("equity"))
        .build()?;

    let accounts = ledger.accounts();
    let bank = accounts
        .create(&OwnerRef::new("bank", "central"), Some("equity"), None)
        .await?;
    let alice = accounts.create(&OwnerRef::new("user", "alice"), Some("wallet"), None).await?;
    let bob = accounts
        .create(&OwnerRef::new("user", "bob"), Some("wallet"), Some(Currency::EUR))
        .await?;

    let engine = ledger.transactions();
    let usd = |amount: i64| Money::new(Decimal::from(amount), Currency::USD);

    println!("Issuing 100 USD to alice...");
    let issue = engine.create(&bank, &alice, usd(100), None, None).await?;
    report("issue", engine.commit(issue.key).await);

    println!("Paying bob 40 USD...");
    let payment = engine
        .create(&alice, &bob, usd(40), Some(serde_json::json!({"memo": "rent"})), None)
        .await?;
    let payment = engine.commit(payment.key).await;
    report("payment", payment.as_ref().cloned());

    println!("Overdrawing alice...");
    let overdraft = engine.create(&alice, &bob, usd(500), None, None).await?;
    report("overdraft", engine.commit(overdraft.key).await);

    println!("Creating and canceling a transfer...");
    let pending = engine.create(&alice, &bob, usd(5), None, None).await?;
    report("cancel", engine.cancel(pending.key).await);

    println!("Committing twice...");
    report("double commit", engine.commit(issue.key).await);

    if let Ok(payment) = payment {
        println!("Reverting 15 USD of the payment...");
        let child = engine.revert(payment.key, Some(usd(15))).await?;
        report("partial revert", engine.commit(child.key).await);

        println!("Reverting more than what remains...");
        let child = engine.revert(payment.key, Some(usd(30))).await?;
        report("oversized revert", engine.commit(child.key).await);
        println!("  remaining: {}", engine.remaining_amount(payment.key).await?);
    }

    for account in [&bank, &alice, &bob] {
        let balance = ledger.balances().balance(account.key, None, None).await?;
        println!("{} ({}): {}", account.owner, account.account_type, ledger.currency().format(&balance));
    }
    println!("ledger valid: {}", accounts.is_valid(true).await?);

    let rehashed = ledger.digests().rehash(RehashFrom::Beginning).await?;
    let mismatched = ledger.digests().verify_chain().await?;
    println!("rehashed {rehashed} digest(s), {} mismatch(es)", mismatched.len());

    if let Some(last) = engine.committed(true).await?.into_iter().next() {
        let mut forged = last.clone();
        forged.amount += Decimal::ONE;
        store.overwrite_transaction(forged);
        let mismatched = ledger.digests().verify_chain().await?;
        println!("after tampering with {}: {} mismatch(es)", last.key, mismatched.len());
    }

    Ok(())
}

fn report<E: std::fmt::Display>(step: &str, outcome: Result<Transaction, E>) {
    match outcome {
        Ok(tx) => println!("  {step}: {} {} -> {}", tx.key, tx.amount(), tx.status),
        Err(error) => println!("  {step}: failed: {error}"),
    }
}
