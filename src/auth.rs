//! Authentication strategies and per-operation request configuration.
//!
//! Exactly one strategy applies to any remote operation, chosen by
//! [`AuthKind`] at construction time. The strategies are mutually exclusive
//! and each fully determines the transport credential/cookie state:
//!
//! - `DefaultCredentials` — the platform's ambient identity; nothing is
//!   attached to the request explicitly.
//! - `NetworkCredentials` — an explicit user/password/domain NTLM credential
//!   scoped to the target host (see [`crate::ntlm`]).
//! - `FederatedCookie` — the credentials are exchanged with the identity
//!   provider for an opaque token, wrapped in a secure, http-only `SPOIDCRL`
//!   cookie scoped to the target host and rebuilt for every request (the
//!   token is short-lived, so it is never cached).
//! - `Anonymous` — no transport mutation at all.
//!
//! Centralizing the strategy → transport mapping in [`apply_authentication`]
//! keeps every operation type authentication-agnostic: operations describe
//! what to fetch and how to read it, never how to authenticate.

use serde::Serialize;
use url::Url;

use crate::error::{OperationError, Result};
use crate::ntlm::NtlmCredential;

/// Identity provider endpoint used for the federated credential exchange.
const IDENTITY_ENDPOINT: &str = "https://login.microsoftonline.com/rst2.srf";

/// Cookie name carrying the federated session token.
const FEDERATED_COOKIE_NAME: &str = "SPOIDCRL";

/// How a remote operation authenticates against its target site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthKind {
    /// Ambient/integrated platform identity.
    DefaultCredentials,
    /// Explicit user/password/domain attached as an NTLM credential.
    NetworkCredentials,
    /// Cookie-based federated session obtained from the identity provider.
    FederatedCookie,
    /// No credential material; the operation proceeds unauthenticated.
    Anonymous,
}

/// Immutable configuration for one remote operation: target site plus the
/// authentication strategy and its credential material.
///
/// Owned exclusively by one executor for its lifetime. The password never
/// appears in `Debug` output.
#[derive(Clone)]
pub struct RemoteOperationRequest {
    target: Url,
    auth_kind: AuthKind,
    user: String,
    password: String,
    domain: String,
}

impl std::fmt::Debug for RemoteOperationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteOperationRequest")
            .field("target", &self.target.as_str())
            .field("auth_kind", &self.auth_kind)
            .field("user", &self.user)
            .field("domain", &self.domain)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl RemoteOperationRequest {
    fn build(
        target_url: &str,
        auth_kind: AuthKind,
        user: &str,
        password: &str,
        domain: &str,
    ) -> Result<Self> {
        Ok(RemoteOperationRequest {
            target: Url::parse(target_url)?,
            auth_kind,
            user: user.to_string(),
            password: password.to_string(),
            domain: domain.to_string(),
        })
    }

    /// Configuration using the platform's ambient identity.
    pub fn default_credentials(target_url: &str) -> Result<Self> {
        Self::build(target_url, AuthKind::DefaultCredentials, "", "", "")
    }

    /// Configuration with an explicit NTLM credential.
    pub fn network_credentials(
        target_url: &str,
        user: &str,
        password: &str,
        domain: &str,
    ) -> Result<Self> {
        Self::build(target_url, AuthKind::NetworkCredentials, user, password, domain)
    }

    /// Configuration using a federated cookie session.
    pub fn federated(target_url: &str, user: &str, password: &str) -> Result<Self> {
        Self::build(target_url, AuthKind::FederatedCookie, user, password, "")
    }

    /// Configuration with no credential material.
    pub fn anonymous(target_url: &str) -> Result<Self> {
        Self::build(target_url, AuthKind::Anonymous, "", "", "")
    }

    /// The target site URL.
    pub fn target(&self) -> &Url {
        &self.target
    }

    /// The configured authentication strategy.
    pub fn auth_kind(&self) -> AuthKind {
        self.auth_kind
    }

    /// The user name, empty for ambient/anonymous strategies.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Host component of the target URL; credentials and cookies are scoped
    /// to it.
    pub fn host(&self) -> &str {
        self.target.host_str().unwrap_or_default()
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }
}

/// A federated session cookie built from the identity provider's token.
///
/// Created per request and never persisted — the token is short-lived.
#[derive(Clone, PartialEq, Eq)]
pub struct FederatedCookie {
    /// Cookie name, always `SPOIDCRL`.
    pub name: &'static str,
    value: String,
    /// Cookie path, always `/`.
    pub path: &'static str,
    /// The cookie only travels over TLS.
    pub secure: bool,
    /// The cookie is not exposed to page script.
    pub http_only: bool,
    /// Host the cookie is scoped to.
    pub domain: String,
}

/// The token is an authentication secret; `Debug` never shows it.
impl std::fmt::Debug for FederatedCookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FederatedCookie")
            .field("name", &self.name)
            .field("domain", &self.domain)
            .field("value", &"<redacted>")
            .finish()
    }
}

impl FederatedCookie {
    /// Wraps a raw provider token in a cookie scoped to `host`. A leading
    /// `SPOIDCRL=` prefix on the token is stripped so the value is stored
    /// bare.
    pub fn for_host(token: &str, host: &str) -> Self {
        let value = token
            .strip_prefix("SPOIDCRL=")
            .unwrap_or(token)
            .to_string();
        FederatedCookie {
            name: FEDERATED_COOKIE_NAME,
            value,
            path: "/",
            secure: true,
            http_only: true,
            domain: host.to_string(),
        }
    }

    /// `Cookie` header value for an outgoing request.
    pub fn header_value(&self) -> String {
        format!("{}={}", self.name, self.value)
    }
}

/// The transport mutation produced by [`apply_authentication`]: what, if
/// anything, gets attached to the outgoing request.
#[derive(Debug, Clone)]
pub enum TransportAuth {
    /// Platform-negotiated ambient identity. Nothing is attached
    /// explicitly: integrated authentication (Kerberos/Negotiate) is
    /// delegated to the environment — a forward proxy or sidecar that
    /// holds the machine identity — rather than spoken by this client.
    Ambient,
    /// NTLM credential; the executor drives the negotiate/challenge legs.
    Ntlm(NtlmCredential),
    /// Federated session cookie attached to the request.
    Cookie(FederatedCookie),
    /// No transport mutation.
    None,
}

impl TransportAuth {
    /// Applies this shaping to an outgoing request.
    ///
    /// For `Ntlm` this attaches the negotiate (Type 1) header only; the
    /// challenge/authenticate leg is driven by the executor because it
    /// needs the server's response.
    pub fn apply(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            TransportAuth::Ambient | TransportAuth::None => req,
            TransportAuth::Ntlm(cred) => {
                req.header(reqwest::header::AUTHORIZATION, cred.negotiate_header())
            }
            TransportAuth::Cookie(cookie) => {
                req.header(reqwest::header::COOKIE, cookie.header_value())
            }
        }
    }
}

/// Pure strategy → transport mapping.
///
/// `federation_token` must be supplied when the strategy is
/// [`AuthKind::FederatedCookie`]; the executor obtains it from
/// [`IdentityClient::acquire_cookie_token`] immediately beforehand.
///
/// # Errors
///
/// `AuthenticationRejected` when the federated strategy is selected but no
/// token is available.
pub fn apply_authentication(
    request: &RemoteOperationRequest,
    federation_token: Option<&str>,
) -> Result<TransportAuth> {
    match request.auth_kind() {
        AuthKind::DefaultCredentials => Ok(TransportAuth::Ambient),
        AuthKind::NetworkCredentials => Ok(TransportAuth::Ntlm(NtlmCredential::new(
            request.user(),
            request.password(),
            &request.domain,
            request.host(),
        ))),
        AuthKind::FederatedCookie => {
            let token = federation_token.ok_or_else(|| {
                OperationError::AuthenticationRejected {
                    message: "federated strategy selected but no federation token acquired"
                        .to_string(),
                    source: None,
                }
            })?;
            Ok(TransportAuth::Cookie(FederatedCookie::for_host(
                token,
                request.host(),
            )))
        }
        AuthKind::Anonymous => Ok(TransportAuth::None),
    }
}

/// Form body sent to the identity provider for the federated exchange.
/// Serialized as `application/x-www-form-urlencoded` by reqwest's `.form()`.
#[derive(Serialize)]
struct FederationTokenRequest<'a> {
    username: &'a str,
    password: &'a str,
    resource: &'a str,
}

/// Client for the federated credential exchange.
///
/// Exchanges a user name and password for an opaque session token at the
/// identity provider. The endpoint is overridable so tests can point at a
/// local mock server.
pub struct IdentityClient {
    client: reqwest::Client,
    endpoint: String,
}

impl Default for IdentityClient {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityClient {
    /// Client against the production identity provider endpoint.
    pub fn new() -> Self {
        Self::with_endpoint(IDENTITY_ENDPOINT)
    }

    /// Client against a custom endpoint, used by tests to point at a local
    /// mock server instead of the real identity provider.
    pub fn with_endpoint(endpoint: &str) -> Self {
        IdentityClient {
            client: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
        }
    }

    /// Exchanges credentials for a federation token scoped to `resource`.
    ///
    /// The response body is read as text first so that on failure the
    /// provider's diagnostic message is preserved in the error rather than
    /// being discarded by a bare status check.
    ///
    /// # Errors
    ///
    /// - `AuthenticationRejected` — the provider returned a non-success
    ///   status; its status and body are preserved in the message.
    /// - `Network` — the provider was unreachable.
    pub async fn acquire_cookie_token(
        &self,
        user: &str,
        password: &str,
        resource: &Url,
    ) -> Result<String> {
        let body = FederationTokenRequest {
            username: user,
            password,
            resource: resource.as_str(),
        };

        let response = self.client.post(&self.endpoint).form(&body).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(OperationError::AuthenticationRejected {
                message: format!("identity provider returned {status}: {body}"),
                source: None,
            });
        }

        Ok(body.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(kind: AuthKind) -> RemoteOperationRequest {
        let url = "https://tenant.sharepoint.com/sites/ops";
        match kind {
            AuthKind::DefaultCredentials => RemoteOperationRequest::default_credentials(url),
            AuthKind::NetworkCredentials => {
                RemoteOperationRequest::network_credentials(url, "svc", "pw", "CONTOSO")
            }
            AuthKind::FederatedCookie => RemoteOperationRequest::federated(url, "svc", "pw"),
            AuthKind::Anonymous => RemoteOperationRequest::anonymous(url),
        }
        .unwrap()
    }

    /// Builds a request through the given shaping and returns its headers.
    fn shaped_headers(auth: &TransportAuth) -> reqwest::header::HeaderMap {
        let req = reqwest::Client::new().get("https://tenant.sharepoint.com/x");
        auth.apply(req).build().unwrap().headers().clone()
    }

    #[test]
    fn default_credentials_attach_nothing_explicit() {
        let auth = apply_authentication(&request(AuthKind::DefaultCredentials), None).unwrap();
        assert!(matches!(auth, TransportAuth::Ambient));
        let headers = shaped_headers(&auth);
        assert!(headers.get(reqwest::header::AUTHORIZATION).is_none());
        assert!(headers.get(reqwest::header::COOKIE).is_none());
    }

    #[test]
    fn network_credentials_produce_ntlm_scoped_to_host() {
        let auth = apply_authentication(&request(AuthKind::NetworkCredentials), None).unwrap();
        let TransportAuth::Ntlm(ref cred) = auth else {
            panic!("expected NTLM shaping, got {auth:?}");
        };
        assert_eq!(cred.scope(), "tenant.sharepoint.com");

        let headers = shaped_headers(&auth);
        let value = headers
            .get(reqwest::header::AUTHORIZATION)
            .expect("negotiate header attached")
            .to_str()
            .unwrap();
        assert!(value.starts_with("NTLM "), "got: {value}");
    }

    #[test]
    fn federated_produces_secure_scoped_cookie() {
        let auth =
            apply_authentication(&request(AuthKind::FederatedCookie), Some("SPOIDCRL=tok123"))
                .unwrap();
        let TransportAuth::Cookie(ref cookie) = auth else {
            panic!("expected cookie shaping, got {auth:?}");
        };
        assert_eq!(cookie.name, "SPOIDCRL");
        assert_eq!(cookie.path, "/");
        assert!(cookie.secure);
        assert!(cookie.http_only);
        assert_eq!(cookie.domain, "tenant.sharepoint.com");

        let headers = shaped_headers(&auth);
        assert_eq!(
            headers.get(reqwest::header::COOKIE).unwrap(),
            "SPOIDCRL=tok123"
        );
        assert!(headers.get(reqwest::header::AUTHORIZATION).is_none());
    }

    #[test]
    fn federated_without_token_is_rejected() {
        let err = apply_authentication(&request(AuthKind::FederatedCookie), None).unwrap_err();
        assert!(matches!(
            err,
            OperationError::AuthenticationRejected { .. }
        ));
    }

    #[test]
    fn anonymous_mutates_nothing() {
        let auth = apply_authentication(&request(AuthKind::Anonymous), None).unwrap();
        assert!(matches!(auth, TransportAuth::None));
        let headers = shaped_headers(&auth);
        assert!(headers.get(reqwest::header::AUTHORIZATION).is_none());
        assert!(headers.get(reqwest::header::COOKIE).is_none());
    }

    #[test]
    fn cookie_strips_the_name_prefix_once() {
        let cookie = FederatedCookie::for_host("SPOIDCRL=abc=def", "host");
        assert_eq!(cookie.header_value(), "SPOIDCRL=abc=def");

        // A bare token is stored as-is.
        let cookie = FederatedCookie::for_host("rawtoken", "host");
        assert_eq!(cookie.header_value(), "SPOIDCRL=rawtoken");
    }

    #[test]
    fn request_debug_redacts_password() {
        let req =
            RemoteOperationRequest::network_credentials("https://h/", "svc", "hunter2", "DOM")
                .unwrap();
        let rendered = format!("{req:?}");
        assert!(!rendered.contains("hunter2"), "got: {rendered}");
        assert!(rendered.contains("<redacted>"));
        assert!(rendered.contains("svc"));
    }

    #[test]
    fn cookie_debug_redacts_token() {
        let cookie = FederatedCookie::for_host("secret-token", "host");
        let rendered = format!("{cookie:?}");
        assert!(!rendered.contains("secret-token"), "got: {rendered}");
    }

    #[test]
    fn invalid_target_url_is_reported() {
        let err = RemoteOperationRequest::anonymous("not a url").unwrap_err();
        assert!(matches!(err, OperationError::InvalidUrl(_)));
    }
}
