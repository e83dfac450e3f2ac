//! Connection and credential configuration for the ERP host.

use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use super::{optional_value, parse_optional, ConfigError};

/// Default content-store account for receivables imports.
pub const DEFAULT_UCM_ACCOUNT: &str = "fin$/recievables$/import$";

const INTEGRATIONS_PATH: &str = "/fscmRestApi/resources/11.13.18.05/erpintegrations";
const LEGACY_SERVICE_PATH: &str = "/xmlpserver/services/v2/ReportService";
const DEFAULT_REPORT_SERVICE_PATH: &str = "/ess/rest/scheduler/v1/requests";
const DEFAULT_LEGACY_REPORT_PATH: &str =
    "/Custom/Receivables/Reports/AUTOINVOICE_CHILD_ESS_JOB_REPORT.xdo";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Connection settings shared read-only by every component.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Host root, without trailing slash.
    pub base_url: String,
    /// Integration user.
    pub username: String,
    /// Integration user's password.
    pub password: SecretString,
    /// Content-store account documents are uploaded to.
    pub ucm_account: String,
    /// Per-call timeout. Distinct from the polling budget.
    pub request_timeout_secs: u64,
    /// Path of the alternate report-service output endpoint.
    pub report_service_path: String,
    /// Catalog path of the legacy child-lookup report.
    pub legacy_report_path: String,
}

impl ServiceConfig {
    /// Creates a configuration with defaults for everything but the
    /// host and credentials.
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            base_url: normalize_base_url(&base_url.into()),
            username: username.into(),
            password: SecretString::from(password.into()),
            ucm_account: DEFAULT_UCM_ACCOUNT.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            report_service_path: DEFAULT_REPORT_SERVICE_PATH.to_string(),
            legacy_report_path: DEFAULT_LEGACY_REPORT_PATH.to_string(),
        }
    }

    /// Loads from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env is normal in deployed environments
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads from an env file; process variables fill keys the file lacks.
    pub fn from_env_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let iter = dotenvy::from_path_iter(path.as_ref())
            .map_err(|e| ConfigError::EnvFile(e.to_string()))?;
        let mut values = HashMap::new();
        for item in iter {
            let (key, value) = item.map_err(|e| ConfigError::EnvFile(e.to_string()))?;
            values.insert(key, value);
        }
        Self::from_lookup(|key| values.get(key).cloned().or_else(|| std::env::var(key).ok()))
    }

    /// Loads through an explicit key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = require(
            &lookup,
            "ORACLE_BASE_URL",
            "Set ORACLE_BASE_URL to the ERP host root",
        )?;
        let username = require(
            &lookup,
            "ORACLE_USERNAME",
            "Set ORACLE_USERNAME to the integration user",
        )?;
        let password = require(
            &lookup,
            "ORACLE_PASSWORD",
            "Set ORACLE_PASSWORD for the integration user",
        )?;

        let mut config = Self::new(base_url, username, password);
        if let Some(account) = optional_value(&lookup, "ORACLE_UCM_ACCOUNT") {
            config.ucm_account = account;
        }
        config.request_timeout_secs = parse_optional(
            &lookup,
            "ORACLE_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?;
        if let Some(path) = optional_value(&lookup, "ORACLE_REPORT_SERVICE_PATH") {
            config.report_service_path = path;
        }
        if let Some(path) = optional_value(&lookup, "ORACLE_LEGACY_REPORT_PATH") {
            config.legacy_report_path = path;
        }
        Ok(config)
    }

    /// Sets the content-store account.
    #[must_use]
    pub fn with_ucm_account(mut self, account: impl Into<String>) -> Self {
        self.ucm_account = account.into();
        self
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// Per-call timeout as a `Duration`.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The password in clear, for building the auth header.
    #[must_use]
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }

    /// URL of the ERP integration resource.
    #[must_use]
    pub fn integrations_url(&self) -> String {
        format!("{}{}", self.base_url, INTEGRATIONS_PATH)
    }

    /// URL of the report-service output for a request.
    #[must_use]
    pub fn report_service_url(&self, request_id: &str) -> String {
        format!(
            "{}{}/{}/output",
            self.base_url,
            self.report_service_path.trim_end_matches('/'),
            request_id
        )
    }

    /// URL of the legacy report service.
    #[must_use]
    pub fn legacy_service_url(&self) -> String {
        format!("{}{}", self.base_url, LEGACY_SERVICE_PATH)
    }
}

fn require<F>(lookup: &F, key: &str, hint: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    optional_value(lookup, key).ok_or_else(|| ConfigError::MissingRequired {
        key: key.to_string(),
        hint: hint.to_string(),
    })
}

fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
