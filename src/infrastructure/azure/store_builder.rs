//! Builds the Azure Blob client for the configured credential strategy.

use crate::config::StorageConfig;
use crate::domain::entities::CredentialStrategy;
use crate::domain::errors::{ExportError, Result};
use azure_storage::ConnectionString;
use log::{debug, info};
use object_store::azure::MicrosoftAzureBuilder;
use object_store::{ClientOptions, ObjectStore, RetryConfig};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";

/// `<account>` from `https://<account>.blob.<suffix>`.
fn account_from_endpoint(endpoint: &str) -> Result<String> {
    let url = Url::parse(endpoint)
        .map_err(|e| ExportError::ConfigError(format!("Invalid storage URL {}: {}", endpoint, e)))?;
    url.host_str()
        .and_then(|host| host.split('.').next())
        .filter(|account| !account.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            ExportError::ConfigError(format!("Cannot derive account name from {}", endpoint))
        })
}

/// Parses a storage connection string and checks it can authenticate.
///
/// The raw string holds the account key, so neither it nor the parser's own
/// error text (which quotes the input) goes into error messages.
fn parse_connection_string(raw: &str) -> Result<ConnectionString<'_>> {
    let conn = ConnectionString::new(raw).map_err(|_| {
        ExportError::ConfigError("Malformed storage connection string".to_string())
    })?;
    if conn.use_development_storage == Some(true) {
        return Ok(conn);
    }

    conn.storage_credentials().map_err(|_| {
        ExportError::ConfigError(
            "Storage connection string has neither AccountName with AccountKey nor SharedAccessSignature"
                .to_string(),
        )
    })?;
    if conn.account_name.is_none() && conn.blob_endpoint.is_none() {
        return Err(ExportError::ConfigError(
            "Storage connection string has neither AccountName nor BlobEndpoint".to_string(),
        ));
    }
    Ok(conn)
}

/// Explicit `BlobEndpoint`, or the one implied by account and suffix.
fn blob_endpoint(conn: &ConnectionString<'_>) -> Option<String> {
    if let Some(endpoint) = conn.blob_endpoint {
        return Some(endpoint.trim_end_matches('/').to_string());
    }
    conn.account_name.map(|account| {
        format!(
            "https://{}.blob.{}",
            account,
            conn.endpoint_suffix.unwrap_or(DEFAULT_ENDPOINT_SUFFIX)
        )
    })
}

/// SAS token as decoded query pairs.
fn sas_pairs(sas: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(sas.trim_start_matches('?').as_bytes())
        .into_owned()
        .collect()
}

fn client_options(request_timeout: Duration) -> ClientOptions {
    ClientOptions::new().with_timeout(request_timeout)
}

/// One attempt per request; a failed upload fails the export.
fn no_retries() -> RetryConfig {
    RetryConfig {
        max_retries: 0,
        ..Default::default()
    }
}

/// Creates the blob client for `config.container`.
///
/// With `ManagedIdentity`, a configured connection string is parsed so a
/// malformed one still fails at startup, but only the account URL and the
/// platform identity are used to talk to storage.
pub fn build_blob_store(
    config: &StorageConfig,
    request_timeout: Duration,
) -> Result<Arc<dyn ObjectStore>> {
    let builder = MicrosoftAzureBuilder::new()
        .with_container_name(&config.container)
        .with_client_options(client_options(request_timeout))
        .with_retry(no_retries());

    let builder = match config.credential {
        CredentialStrategy::ManagedIdentity => {
            if let Some(raw) = &config.connection_string {
                parse_connection_string(raw)?;
                debug!("Storage connection string present but unused under managed identity");
            }
            let account_url = config.account_url.as_deref().ok_or_else(|| {
                ExportError::ConfigError("Storage account URL is not set".to_string())
            })?;
            let account_url = account_url.trim_end_matches('/');

            let mut builder = builder
                .with_account(account_from_endpoint(account_url)?)
                .with_endpoint(account_url.to_string());
            if let Some(client_id) = &config.managed_identity_client_id {
                builder = builder.with_client_id(client_id);
            }
            builder
        }
        CredentialStrategy::ConnectionString => {
            let raw = config.connection_string.as_deref().ok_or_else(|| {
                ExportError::ConfigError("Storage connection string is not set".to_string())
            })?;
            let conn = parse_connection_string(raw)?;

            if conn.use_development_storage == Some(true) {
                builder.with_use_emulator(true)
            } else {
                let endpoint = blob_endpoint(&conn).ok_or_else(|| {
                    ExportError::ConfigError(
                        "Cannot determine blob endpoint from connection string".to_string(),
                    )
                })?;
                let account = match conn.account_name {
                    Some(a) => a.to_string(),
                    None => account_from_endpoint(&endpoint)?,
                };

                let mut builder = builder.with_account(account).with_endpoint(endpoint);
                if let Some(key) = conn.account_key {
                    builder = builder.with_access_key(key);
                }
                if let Some(sas) = conn.sas {
                    builder = builder.with_sas_authorization(sas_pairs(sas));
                }
                builder
            }
        }
    };

    let store = builder.build().map_err(|e| {
        ExportError::ConfigError(format!("Failed to create Azure Blob client: {}", e))
    })?;

    info!(
        "Blob client ready for container {} ({})",
        config.container, config.credential
    );
    Ok(Arc::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(credential: CredentialStrategy) -> StorageConfig {
        StorageConfig {
            container: "backfill".into(),
            account_url: Some("https://backfillsa.blob.core.windows.net/".into()),
            connection_string: Some(
                "DefaultEndpointsProtocol=https;AccountName=backfillsa;AccountKey=YWJjZA==".into(),
            ),
            credential,
            managed_identity_client_id: None,
        }
    }

    #[test]
    fn test_account_from_endpoint() {
        assert_eq!(
            account_from_endpoint("https://backfillsa.blob.core.windows.net").unwrap(),
            "backfillsa"
        );
        assert!(account_from_endpoint("not a url").is_err());
    }

    #[test]
    fn test_builds_managed_identity_client() {
        let store = build_blob_store(
            &storage(CredentialStrategy::ManagedIdentity),
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(store.to_string().contains("backfill"));
    }

    #[test]
    fn test_builds_connection_string_client() {
        assert!(build_blob_store(
            &storage(CredentialStrategy::ConnectionString),
            Duration::from_secs(5)
        )
        .is_ok());
    }

    #[test]
    fn test_malformed_connection_string_fails_even_under_managed_identity() {
        let mut config = storage(CredentialStrategy::ManagedIdentity);
        config.connection_string = Some("AccountName=only".into());
        let err = build_blob_store(&config, Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, ExportError::ConfigError(_)));
    }

    #[test]
    fn test_missing_account_url() {
        let mut config = storage(CredentialStrategy::ManagedIdentity);
        config.account_url = None;
        assert!(build_blob_store(&config, Duration::from_secs(5)).is_err());
    }

    #[test]
    fn test_connection_string_endpoint_from_account() {
        let conn = parse_connection_string(
            "DefaultEndpointsProtocol=https;AccountName=backfillsa;AccountKey=YWJjZA==;EndpointSuffix=core.usgovcloudapi.net",
        )
        .unwrap();
        assert_eq!(conn.account_key, Some("YWJjZA=="));
        assert_eq!(
            blob_endpoint(&conn).as_deref(),
            Some("https://backfillsa.blob.core.usgovcloudapi.net")
        );
    }

    #[test]
    fn test_connection_string_explicit_endpoint_and_sas() {
        let conn = parse_connection_string(
            "BlobEndpoint=https://acct.blob.core.windows.net/;SharedAccessSignature=sv=2022-11-02&sig=abc%3D",
        )
        .unwrap();
        assert_eq!(
            blob_endpoint(&conn).as_deref(),
            Some("https://acct.blob.core.windows.net")
        );
        assert_eq!(
            sas_pairs(conn.sas.unwrap()),
            vec![
                ("sv".to_string(), "2022-11-02".to_string()),
                ("sig".to_string(), "abc=".to_string())
            ]
        );
    }

    #[test]
    fn test_connection_string_rejects_incomplete() {
        assert!(parse_connection_string("AccountName=only").is_err());
        assert!(parse_connection_string("garbage").is_err());
        assert!(parse_connection_string("UseDevelopmentStorage=true").is_ok());
    }

    #[test]
    fn test_connection_string_errors_do_not_echo_secrets() {
        let err = parse_connection_string("AccountKey=supersecret;bogus").unwrap_err();
        assert!(!err.to_string().contains("supersecret"));
    }

    #[test]
    fn test_builds_emulator_client() {
        let mut config = storage(CredentialStrategy::ConnectionString);
        config.connection_string = Some("UseDevelopmentStorage=true".into());
        assert!(build_blob_store(&config, Duration::from_secs(5)).is_ok());
    }
}
