use anyhow::Context;
use dotenvy::dotenv;
use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

/// What happens to a deposit once its receipt has been verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepositPolicy {
    /// Credit the wallet immediately in the same database transaction.
    AutoCredit,
    /// Record the deposit as pending and wait for an operator approval.
    HoldForReview,
}

/// Per-provider identity expectations. Each check can be switched off
/// independently for providers that mask fields too aggressively.
#[derive(Debug, Clone)]
pub struct IdentityRules {
    pub check_name: bool,
    pub check_account: bool,
    pub expected_name: Option<String>,
    pub expected_account: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CbeConfig {
    pub verify_url: String,
    /// Last digits of the receiving account, appended to the reference when
    /// requesting the receipt PDF.
    pub account_suffix: String,
    pub identity: IdentityRules,
}

#[derive(Debug, Clone)]
pub struct TelebirrConfig {
    pub receipt_url: String,
    pub identity: IdentityRules,
}

#[derive(Debug, Clone)]
pub struct StroWalletConfig {
    pub api_url: String,
    pub public_key: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub app_env: AppEnv,
    pub server_port: u16,
    pub database_url: String,
    pub cbe: CbeConfig,
    pub telebirr: TelebirrConfig,
    pub strowallet: StroWalletConfig,
    /// Skip receipt verification and trust the caller-supplied amount.
    /// Refused in production.
    pub simulate_verification: bool,
    /// Skip the card provider funding call during top-ups. Refused in
    /// production.
    pub simulate_card_funding: bool,
    pub deposit_policy: DepositPolicy,
    /// Interval of the background reconciliation sweep. None disables it.
    pub reconcile_interval_secs: Option<u64>,
    /// Upper bound on cards checked per sweep.
    pub reconcile_limit: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        let config = Config {
            app_env: parse_app_env(&env_or("APP_ENV", "development")),
            server_port: env_or("SERVER_PORT", "3000").parse()?,
            database_url: env::var("DATABASE_URL").context("DATABASE_URL is required")?,
            cbe: CbeConfig {
                verify_url: env_or("CBE_VERIFY_URL", "https://apps.cbe.com.et:100"),
                account_suffix: env_or("CBE_ACCOUNT_SUFFIX", ""),
                identity: IdentityRules {
                    check_name: env_bool("CBE_CHECK_NAME", true),
                    check_account: env_bool("CBE_CHECK_ACCOUNT", true),
                    expected_name: env::var("CBE_EXPECTED_NAME").ok(),
                    expected_account: env::var("CBE_EXPECTED_ACCOUNT").ok(),
                },
            },
            telebirr: TelebirrConfig {
                receipt_url: env_or(
                    "TELEBIRR_RECEIPT_URL",
                    "https://transactioninfo.ethiotelecom.et/receipt",
                ),
                identity: IdentityRules {
                    check_name: env_bool("TELEBIRR_CHECK_NAME", true),
                    check_account: env_bool("TELEBIRR_CHECK_ACCOUNT", true),
                    expected_name: env::var("TELEBIRR_EXPECTED_NAME").ok(),
                    expected_account: env::var("TELEBIRR_EXPECTED_PHONE").ok(),
                },
            },
            strowallet: StroWalletConfig {
                api_url: env_or("STROWALLET_API_URL", "https://strowallet.com/api/bitvcard"),
                public_key: env_or("STROWALLET_PUBLIC_KEY", ""),
            },
            simulate_verification: env_bool("SIMULATE_VERIFICATION", false),
            simulate_card_funding: env_bool("SIMULATE_CARD_FUNDING", false),
            deposit_policy: parse_deposit_policy(&env_or("DEPOSIT_POLICY", "auto")),
            reconcile_interval_secs: env::var("RECONCILE_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0),
            reconcile_limit: env_or("RECONCILE_LIMIT", "50").parse()?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations that would silently misbehave at runtime.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.app_env == AppEnv::Production {
            if self.simulate_verification {
                anyhow::bail!("SIMULATE_VERIFICATION must not be enabled in production");
            }
            if self.simulate_card_funding {
                anyhow::bail!("SIMULATE_CARD_FUNDING must not be enabled in production");
            }
        }

        if !self.simulate_verification {
            if self.cbe.account_suffix.trim().is_empty() {
                anyhow::bail!("CBE_ACCOUNT_SUFFIX is required when verification is live");
            }
            require_expectation("CBE", &self.cbe.identity)?;
            require_expectation("TELEBIRR", &self.telebirr.identity)?;
        }

        if !self.simulate_card_funding && self.strowallet.public_key.trim().is_empty() {
            anyhow::bail!("STROWALLET_PUBLIC_KEY is required when card funding is live");
        }

        Ok(())
    }
}

fn require_expectation(prefix: &str, rules: &IdentityRules) -> anyhow::Result<()> {
    if rules.check_name && rules.expected_name.is_none() {
        anyhow::bail!(
            "{}_EXPECTED_NAME is required while {}_CHECK_NAME is enabled",
            prefix,
            prefix
        );
    }
    if rules.check_account && rules.expected_account.is_none() {
        anyhow::bail!(
            "{} expected account is required while {}_CHECK_ACCOUNT is enabled",
            prefix,
            prefix
        );
    }
    Ok(())
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => parse_bool(&raw, default),
        Err(_) => default,
    }
}

fn parse_bool(raw: &str, default: bool) -> bool {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn parse_app_env(raw: &str) -> AppEnv {
    match raw.trim().to_ascii_lowercase().as_str() {
        "production" | "prod" => AppEnv::Production,
        _ => AppEnv::Development,
    }
}

fn parse_deposit_policy(raw: &str) -> DepositPolicy {
    match raw.trim().to_ascii_lowercase().as_str() {
        "review" | "hold" | "hold_for_review" => DepositPolicy::HoldForReview,
        _ => DepositPolicy::AutoCredit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_rules() -> IdentityRules {
        IdentityRules {
            check_name: true,
            check_account: true,
            expected_name: Some("MUDAY WALLET PLC".to_string()),
            expected_account: Some("1000012345678".to_string()),
        }
    }

    fn test_config() -> Config {
        Config {
            app_env: AppEnv::Development,
            server_port: 3000,
            database_url: "postgres://localhost/test".to_string(),
            cbe: CbeConfig {
                verify_url: "https://apps.cbe.com.et:100".to_string(),
                account_suffix: "12345678".to_string(),
                identity: test_rules(),
            },
            telebirr: TelebirrConfig {
                receipt_url: "https://transactioninfo.ethiotelecom.et/receipt".to_string(),
                identity: test_rules(),
            },
            strowallet: StroWalletConfig {
                api_url: "https://strowallet.com/api/bitvcard".to_string(),
                public_key: "pk_test".to_string(),
            },
            simulate_verification: false,
            simulate_card_funding: false,
            deposit_policy: DepositPolicy::AutoCredit,
            reconcile_interval_secs: None,
            reconcile_limit: 50,
        }
    }

    #[test]
    fn test_parse_bool_variants() {
        assert!(parse_bool("1", false));
        assert!(parse_bool("TRUE", false));
        assert!(parse_bool("yes", false));
        assert!(!parse_bool("0", true));
        assert!(!parse_bool("off", true));
        assert!(parse_bool("garbage", true));
    }

    #[test]
    fn test_parse_app_env() {
        assert_eq!(parse_app_env("production"), AppEnv::Production);
        assert_eq!(parse_app_env("PROD"), AppEnv::Production);
        assert_eq!(parse_app_env("development"), AppEnv::Development);
        assert_eq!(parse_app_env(""), AppEnv::Development);
    }

    #[test]
    fn test_parse_deposit_policy() {
        assert_eq!(parse_deposit_policy("auto"), DepositPolicy::AutoCredit);
        assert_eq!(parse_deposit_policy("review"), DepositPolicy::HoldForReview);
        assert_eq!(parse_deposit_policy("hold"), DepositPolicy::HoldForReview);
    }

    #[test]
    fn test_validate_accepts_complete_config() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_simulation_in_production() {
        let mut config = test_config();
        config.app_env = AppEnv::Production;
        config.simulate_verification = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_requires_suffix_for_live_verification() {
        let mut config = test_config();
        config.cbe.account_suffix = String::new();
        assert!(config.validate().is_err());

        config.simulate_verification = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_expected_values_per_check() {
        let mut config = test_config();
        config.telebirr.identity.expected_account = None;
        assert!(config.validate().is_err());

        config.telebirr.identity.check_account = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_card_key_when_live() {
        let mut config = test_config();
        config.strowallet.public_key = String::new();
        assert!(config.validate().is_err());

        config.simulate_card_funding = true;
        assert!(config.validate().is_ok());
    }
}
