//! Ledger configuration management.
//!
//! Every option has a default, so an empty configuration is a valid one.

use std::collections::HashMap;

use serde::Deserialize;

use crate::types::Currency;

/// Ledger configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Ledger-wide reference currency.
    pub base_currency: Currency,
    /// Rounding mode used for currency conversion.
    pub rounding_mode: RoundingMode,
    /// Owner resolution defaults.
    pub owner: OwnerConfig,
    /// Account defaults and creation constraints.
    pub account: AccountConfig,
    /// Transaction policies.
    pub transaction: TransactionConfig,
    /// Digest chain settings.
    pub digest: DigestConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            base_currency: Currency::USD,
            rounding_mode: RoundingMode::default(),
            owner: OwnerConfig::default(),
            account: AccountConfig::default(),
            transaction: TransactionConfig::default(),
            digest: DigestConfig::default(),
        }
    }
}

/// Owner resolution configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OwnerConfig {
    /// Owner type used when an address leaves it empty.
    pub default_type: String,
    /// Alias → canonical owner type.
    pub aliases: HashMap<String, String>,
}

impl Default for OwnerConfig {
    fn default() -> Self {
        Self {
            default_type: "user".to_string(),
            aliases: HashMap::new(),
        }
    }
}

/// Account configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Account type used when none is given.
    pub default_type: String,
    /// Account currency used when none is given.
    pub default_currency: Currency,
    /// Whether `find` creates missing accounts.
    pub auto_create: bool,
    /// Read-modify-write balance updates instead of store-side increments.
    pub use_money_calculator: bool,
    /// When non-empty, only these account types may be created.
    pub allowed_types: Vec<String>,
    /// When non-empty, only these currencies may be used for new accounts.
    pub allowed_currencies: Vec<Currency>,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            default_type: "default".to_string(),
            default_currency: Currency::USD,
            auto_create: false,
            use_money_calculator: false,
            allowed_types: Vec::new(),
            allowed_currencies: Vec::new(),
        }
    }
}

/// Transaction configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// Currency picked for amounts given without one.
    pub default_currency: CurrencyPolicy,
    /// Commit immediately after creation.
    pub auto_commit: bool,
    /// Attempts made by a commit before giving up on transient store failures.
    pub commit_attempts: u32,
    /// Allow transfers of zero amount.
    pub allow_zero_transfers: bool,
    /// Turn negative transfers into positive transfers with swapped endpoints.
    pub handle_negative_amounts: bool,
    /// Freeze the origin amount at creation time.
    pub origin_forward_conversion: bool,
    /// Upper bound used by the revert guard.
    pub revert_limit: RevertLimit,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            default_currency: CurrencyPolicy::Base,
            auto_commit: false,
            commit_attempts: default_commit_attempts(),
            allow_zero_transfers: false,
            handle_negative_amounts: false,
            origin_forward_conversion: false,
            revert_limit: RevertLimit::Remaining,
        }
    }
}

fn default_commit_attempts() -> u32 {
    1
}

/// Digest chain configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DigestConfig {
    /// HMAC hash function.
    pub algorithm: DigestAlgorithm,
    /// HMAC key.
    pub key: String,
}

/// How the currency of a transaction is chosen when the amount carries none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum CurrencyPolicy {
    /// Currency of the origin account.
    Origin,
    /// Currency of the destination account.
    Destination,
    /// Ledger base currency.
    Base,
    /// A fixed currency.
    Explicit(Currency),
}

impl TryFrom<String> for CurrencyPolicy {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_lowercase().as_str() {
            "origin" => Ok(Self::Origin),
            "destination" => Ok(Self::Destination),
            "base" => Ok(Self::Base),
            other => Currency::new(other)
                .map(Self::Explicit)
                .map_err(|e| format!("invalid default currency policy: {e}")),
        }
    }
}

/// Rounding mode for currency conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingMode {
    /// Round half away from zero.
    #[default]
    HalfUp,
    /// Round half toward zero.
    HalfDown,
    /// Banker's rounding.
    HalfEven,
    /// Away from zero.
    Up,
    /// Toward zero.
    Down,
    /// Toward positive infinity.
    Ceiling,
    /// Toward negative infinity.
    Floor,
}

/// Bound enforced on revert transactions at commit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevertLimit {
    /// A revert may not exceed what is left after committed reverts.
    #[default]
    Remaining,
    /// A revert may not exceed the parent amount on its own.
    FullAmount,
}

/// HMAC hash function for the digest chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    /// HMAC-SHA256.
    #[default]
    Sha256,
    /// HMAC-SHA384.
    Sha384,
    /// HMAC-SHA512.
    Sha512,
}

impl LedgerConfig {
    /// Loads configuration from config files and the environment.
    ///
    /// Sources, later ones overriding earlier ones: `config/default`,
    /// `config/{RUN_MODE}`, then `TALLY__SECTION__KEY` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(
                config::Environment::with_prefix("TALLY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("account.allowed_types")
                    .with_list_parse_key("account.allowed_currencies"),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        let config = LedgerConfig::default();
        assert_eq!(config.base_currency, Currency::USD);
        assert_eq!(config.account.default_type, "default");
        assert_eq!(config.transaction.commit_attempts, 1);
        assert_eq!(config.transaction.default_currency, CurrencyPolicy::Base);
        assert_eq!(config.transaction.revert_limit, RevertLimit::Remaining);
        assert_eq!(config.digest.algorithm, DigestAlgorithm::Sha256);
        assert!(!config.transaction.auto_commit);
    }

    #[rstest]
    #[case("origin", CurrencyPolicy::Origin)]
    #[case("Destination", CurrencyPolicy::Destination)]
    #[case("base", CurrencyPolicy::Base)]
    #[case("eur", CurrencyPolicy::Explicit(Currency::EUR))]
    fn test_currency_policy_parse(#[case] raw: &str, #[case] expected: CurrencyPolicy) {
        assert_eq!(CurrencyPolicy::try_from(raw.to_string()).unwrap(), expected);
    }

    #[test]
    fn test_currency_policy_rejects_garbage() {
        assert!(CurrencyPolicy::try_from("sideways".to_string()).is_err());
    }

    #[test]
    fn test_load_from_environment() {
        temp_env::with_vars(
            [
                ("TALLY__BASE_CURRENCY", Some("EUR")),
                ("TALLY__TRANSACTION__AUTO_COMMIT", Some("true")),
                ("TALLY__TRANSACTION__COMMIT_ATTEMPTS", Some("3")),
                ("TALLY__TRANSACTION__DEFAULT_CURRENCY", Some("origin")),
                ("TALLY__DIGEST__ALGORITHM", Some("sha512")),
                ("TALLY__DIGEST__KEY", Some("secret")),
            ],
            || {
                let config = LedgerConfig::load().unwrap();
                assert_eq!(config.base_currency, Currency::EUR);
                assert!(config.transaction.auto_commit);
                assert_eq!(config.transaction.commit_attempts, 3);
                assert_eq!(config.transaction.default_currency, CurrencyPolicy::Origin);
                assert_eq!(config.digest.algorithm, DigestAlgorithm::Sha512);
                assert_eq!(config.digest.key, "secret");
                // Untouched sections keep their defaults.
                assert_eq!(config.account.default_type, "default");
            },
        );
    }
}
