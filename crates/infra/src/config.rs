//! Player table configuration, loaded from the environment.

use crate::table::DEFAULT_EMAIL_INDEX;

pub const TABLE_ENV: &str = "DYNAMODB_TABLE";
pub const REGION_ENV: &str = "DYNAMODB_AWS_REGION";
pub const EMAIL_INDEX_ENV: &str = "DYNAMODB_EMAIL_INDEX";
pub const EMAIL_GUARD_TABLE_ENV: &str = "DYNAMODB_EMAIL_GUARD_TABLE";
pub const ENDPOINT_URL_ENV: &str = "DYNAMODB_ENDPOINT_URL";

pub const DEFAULT_TABLE_NAME: &str = "Players";

/// Where the player table lives and how it is indexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    pub table_name: String,
    /// `None` defers to the AWS default provider chain.
    pub region: Option<String>,
    pub email_index: String,
    /// Table holding one item per claimed email; enables atomic uniqueness.
    pub email_guard_table: Option<String>,
    /// Override endpoint (local DynamoDB, LocalStack).
    pub endpoint_url: Option<String>,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            table_name: DEFAULT_TABLE_NAME.to_string(),
            region: None,
            email_index: DEFAULT_EMAIL_INDEX.to_string(),
            email_guard_table: None,
            endpoint_url: None,
        }
    }
}

impl TableConfig {
    /// Read the configuration from process environment variables.
    ///
    /// Unset or empty variables fall back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Self {
            table_name: var(TABLE_ENV).unwrap_or(defaults.table_name),
            region: var(REGION_ENV),
            email_index: var(EMAIL_INDEX_ENV).unwrap_or(defaults.email_index),
            email_guard_table: var(EMAIL_GUARD_TABLE_ENV),
            endpoint_url: var(ENDPOINT_URL_ENV),
        }
    }

    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_email_index(mut self, email_index: impl Into<String>) -> Self {
        self.email_index = email_index.into();
        self
    }

    pub fn with_email_guard_table(mut self, table: impl Into<String>) -> Self {
        self.email_guard_table = Some(table.into());
        self
    }

    pub fn with_endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = TableConfig::from_lookup(lookup(&[]));
        assert_eq!(config, TableConfig::default());
        assert_eq!(config.table_name, "Players");
        assert_eq!(config.email_index, "email-index");
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = TableConfig::from_lookup(lookup(&[
            (TABLE_ENV, "Players-dev"),
            (REGION_ENV, "eu-west-1"),
            (EMAIL_INDEX_ENV, "by-email"),
            (EMAIL_GUARD_TABLE_ENV, "PlayerEmails"),
            (ENDPOINT_URL_ENV, "http://localhost:8000"),
        ]));

        assert_eq!(
            config,
            TableConfig::default()
                .with_table_name("Players-dev")
                .with_region("eu-west-1")
                .with_email_index("by-email")
                .with_email_guard_table("PlayerEmails")
                .with_endpoint_url("http://localhost:8000")
        );
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = TableConfig::from_lookup(lookup(&[(TABLE_ENV, "  "), (REGION_ENV, "")]));
        assert_eq!(config.table_name, DEFAULT_TABLE_NAME);
        assert_eq!(config.region, None);
    }
}
