//! Browser sign-in configuration for a tenant.
//!
//! Before a user signs in, the single-page client asks which identity
//! provider serves the tenant it was loaded for. [`AuthConfig`] is that
//! answer, serialized in camelCase for the OIDC client library.

use serde::Serialize;
use tenantgate_directory::TenantRecord;

use crate::error::AuthError;

/// OAuth response type: authorization code flow.
pub const RESPONSE_TYPE: &str = "code";

/// Scopes requested at sign-in.
pub const SCOPE: &str = "phone email openid";

/// Fraction of the token lifetime after which a silent refresh starts.
pub const TIMEOUT_FACTOR: f64 = 0.25;

/// Separator between nonce and state in the OIDC client.
pub const NONCE_STATE_SEPARATOR: &str = "semicolon";

/// Path of the silent refresh page below the redirect URI.
pub const SILENT_REFRESH_PATH: &str = "/silentrefresh.html";

/// Sign-in settings for one tenant's browser client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    /// The tenant's issuer.
    pub issuer: String,
    /// Always `false`: provider discovery documents list endpoints on other
    /// hosts than the issuer.
    pub strict_discovery_document_validation: bool,
    /// OAuth client id.
    pub client_id: String,
    /// OAuth response type.
    pub response_type: String,
    /// Where the provider redirects after sign-in.
    pub redirect_uri: String,
    /// Page used for silent token refresh.
    pub silent_refresh_redirect_uri: String,
    /// Requested scopes.
    pub scope: String,
    /// Whether silent refresh is used.
    pub use_silent_refresh: bool,
    /// Silent refresh timeout in milliseconds.
    pub silent_refresh_timeout: u64,
    /// See [`TIMEOUT_FACTOR`].
    pub timeout_factor: f64,
    /// Whether session checks run.
    pub session_checks_enabled: bool,
    /// Whether the OIDC client logs debug output.
    pub show_debug_information: bool,
    /// Whether the URL hash is cleared after sign-in.
    pub clear_hash_after_login: bool,
    /// See [`NONCE_STATE_SEPARATOR`].
    pub nonce_state_separator: String,
    /// Hosted sign-in domain of the provider, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_domain: Option<String>,
}

impl AuthConfig {
    /// Builds the sign-in settings of `record`'s tenant.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::TenantMisconfigured`] if the record has no
    /// browser client or its fields are inconsistent.
    pub fn for_tenant(record: &TenantRecord) -> Result<Self, AuthError> {
        let issuer = record.expected_issuer().map_err(|e| {
            AuthError::tenant_misconfigured(record.tenant_id.clone(), e.to_string())
        })?;
        let Some(client) = &record.auth_client else {
            return Err(AuthError::tenant_misconfigured(
                record.tenant_id.clone(),
                "no browser client configured",
            ));
        };

        let redirect = client.redirect_uri.trim_end_matches('/');
        Ok(Self {
            issuer: issuer.to_owned(),
            strict_discovery_document_validation: false,
            client_id: client.client_id.clone(),
            response_type: RESPONSE_TYPE.to_owned(),
            redirect_uri: client.redirect_uri.clone(),
            silent_refresh_redirect_uri: format!("{redirect}{SILENT_REFRESH_PATH}"),
            scope: SCOPE.to_owned(),
            use_silent_refresh: client.use_silent_refresh,
            silent_refresh_timeout: client.silent_refresh_timeout_ms,
            timeout_factor: TIMEOUT_FACTOR,
            session_checks_enabled: client.session_checks_enabled,
            show_debug_information: client.show_debug_information,
            clear_hash_after_login: client.clear_hash_after_login,
            nonce_state_separator: NONCE_STATE_SEPARATOR.to_owned(),
            provider_domain: client.provider_domain.clone(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use serde_json::json;
    use tenantgate_directory::{AuthClientSettings, testutil::make_record};

    use super::*;

    fn record_with_client() -> TenantRecord {
        let mut record = make_record("acmecorp");
        record.auth_client = Some(
            AuthClientSettings::builder()
                .client_id("client-123")
                .redirect_uri("https://acmecorp.example.com/")
                .use_silent_refresh(true)
                .provider_domain("acmecorp.auth.example.com")
                .build(),
        );
        record
    }

    #[test]
    fn test_for_tenant_serializes_camel_case() {
        let config = AuthConfig::for_tenant(&record_with_client()).expect("configured");
        let value = serde_json::to_value(&config).expect("serializes");
        assert_eq!(
            value,
            json!({
                "issuer": "https://idp.test/pools/us-east-1_acmecorp",
                "strictDiscoveryDocumentValidation": false,
                "clientId": "client-123",
                "responseType": "code",
                "redirectUri": "https://acmecorp.example.com/",
                "silentRefreshRedirectUri": "https://acmecorp.example.com/silentrefresh.html",
                "scope": "phone email openid",
                "useSilentRefresh": true,
                "silentRefreshTimeout": 5000,
                "timeoutFactor": 0.25,
                "sessionChecksEnabled": false,
                "showDebugInformation": false,
                "clearHashAfterLogin": true,
                "nonceStateSeparator": "semicolon",
                "providerDomain": "acmecorp.auth.example.com",
            })
        );
    }

    #[test]
    fn test_for_tenant_without_client() {
        let result = AuthConfig::for_tenant(&make_record("acmecorp"));
        assert!(matches!(result, Err(AuthError::TenantMisconfigured { .. })));
    }

    #[test]
    fn test_for_tenant_inconsistent_record() {
        let mut record = record_with_client();
        record.region = "eu-west-1".into();
        let result = AuthConfig::for_tenant(&record);
        assert!(matches!(result, Err(AuthError::TenantMisconfigured { .. })));
    }
}
