//! Connection bootstrap helpers.
//!
//! Before running operations, callers typically want to know what kind of
//! deployment a site URL points at and, for app-only auth flows, which
//! authentication realm (tenant GUID) governs it. Neither question needs
//! credentials:
//!
//! - The deployment kind falls out of the host name.
//! - The realm is advertised by the site itself: an unauthenticated probe
//!   with an empty bearer header makes the service answer 401 with a
//!   `WWW-Authenticate` challenge naming the realm GUID.

use reqwest::{header, Client};
use tracing::debug;
use url::Url;

use crate::error::Result;

/// Probe path that triggers the bearer challenge.
const CLIENT_SVC_PATH: &str = "/_vti_bin/client.svc";

/// Marker preceding the realm GUID in the challenge header.
const BEARER_REALM_MARKER: &str = "Bearer realm=\"";

/// Canonical textual length of a GUID.
const GUID_LEN: usize = 36;

/// The kind of deployment a site URL points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    /// A self-hosted deployment.
    OnPremises,
    /// A hosted tenant site.
    Online,
    /// The tenant administration site of a hosted tenant.
    TenantAdmin,
}

impl ConnectionKind {
    /// Classifies a site URL by its host name.
    pub fn classify(url: &Url) -> Self {
        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        if host.ends_with("-admin.sharepoint.com") {
            ConnectionKind::TenantAdmin
        } else if host.ends_with("sharepoint.com") {
            ConnectionKind::Online
        } else {
            ConnectionKind::OnPremises
        }
    }
}

/// A resolved connection target: the site, its deployment kind, and the
/// authentication realm when the site advertises one.
#[derive(Debug, Clone)]
pub struct ConnectionProfile {
    /// The site URL the profile was resolved for.
    pub url: Url,
    /// Deployment kind classified from the host.
    pub kind: ConnectionKind,
    /// Authentication realm GUID, when advertised.
    pub realm: Option<String>,
}

impl ConnectionProfile {
    /// Classifies the site and probes it for an authentication realm.
    ///
    /// # Errors
    ///
    /// `InvalidUrl` for an unparseable site URL; `Network` when the probe
    /// request itself cannot be sent. A site that simply does not
    /// advertise a realm resolves with `realm: None`.
    pub async fn resolve(site_url: &str) -> Result<Self> {
        let url = Url::parse(site_url)?;
        let kind = ConnectionKind::classify(&url);
        let realm = discover_realm(&Client::new(), &url).await?;
        Ok(ConnectionProfile { url, kind, realm })
    }
}

/// Discovers the authentication realm of a site.
///
/// Sends an empty bearer header to the client-service endpoint and reads
/// the realm GUID out of the resulting `WWW-Authenticate` challenge.
/// Returns `Ok(None)` when the site does not challenge, the challenge
/// carries no realm marker, or the advertised value is not a well-formed
/// GUID — absence of a realm is a routine outcome, not an error.
///
/// # Errors
///
/// `Network` when the probe request cannot be sent at all.
pub async fn discover_realm(client: &Client, site: &Url) -> Result<Option<String>> {
    let url = format!(
        "{}{}",
        site.as_str().trim_end_matches('/'),
        CLIENT_SVC_PATH
    );
    debug!(url = %url, "probing for authentication realm");

    let response = client
        .get(&url)
        .header(header::AUTHORIZATION, "Bearer ")
        .send()
        .await?;

    let realm = response
        .headers()
        .get(header::WWW_AUTHENTICATE)
        .and_then(|v| v.to_str().ok())
        .and_then(realm_from_challenge);
    Ok(realm)
}

/// Extracts and validates the realm GUID from a bearer challenge value.
fn realm_from_challenge(challenge: &str) -> Option<String> {
    let at = challenge.find(BEARER_REALM_MARKER)?;
    let start = at + BEARER_REALM_MARKER.len();
    let candidate = challenge.get(start..start + GUID_LEN)?;
    uuid::Uuid::parse_str(candidate).ok()?;
    Some(candidate.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hosted_tenant_hosts_classify_as_online() {
        let url = Url::parse("https://contoso.sharepoint.com/sites/ops").unwrap();
        assert_eq!(ConnectionKind::classify(&url), ConnectionKind::Online);

        // Case-insensitive, matching the host normalization upstream.
        let url = Url::parse("https://CONTOSO.SHAREPOINT.COM/").unwrap();
        assert_eq!(ConnectionKind::classify(&url), ConnectionKind::Online);
    }

    #[test]
    fn admin_hosts_classify_as_tenant_admin() {
        let url = Url::parse("https://contoso-admin.sharepoint.com/").unwrap();
        assert_eq!(ConnectionKind::classify(&url), ConnectionKind::TenantAdmin);
    }

    #[test]
    fn other_hosts_classify_as_on_premises() {
        let url = Url::parse("https://intranet.contoso.local/sites/ops").unwrap();
        assert_eq!(ConnectionKind::classify(&url), ConnectionKind::OnPremises);
    }

    #[test]
    fn realm_guid_is_extracted_from_challenge() {
        let challenge = "Bearer realm=\"6c32b950-5a56-4b28-9c5d-0d0a2c40d112\",\
             client_id=\"00000003-0000-0ff1-ce00-000000000000\"";
        assert_eq!(
            realm_from_challenge(challenge).as_deref(),
            Some("6c32b950-5a56-4b28-9c5d-0d0a2c40d112")
        );
    }

    #[test]
    fn challenge_without_marker_yields_none() {
        assert_eq!(realm_from_challenge("NTLM"), None);
        assert_eq!(realm_from_challenge(""), None);
    }

    #[test]
    fn truncated_realm_yields_none() {
        assert_eq!(realm_from_challenge("Bearer realm=\"6c32b950\""), None);
    }

    #[test]
    fn non_guid_realm_yields_none() {
        let challenge = "Bearer realm=\"this-is-not-a-guid-at-all-padding!!\"";
        assert_eq!(realm_from_challenge(challenge), None);
    }
}
