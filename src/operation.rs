//! The remote HTTP operation framework.
//!
//! [`RemoteExecutor`] owns the full lifecycle of one authenticated HTTP
//! operation against a target site: build request → apply auth shaping →
//! execute → decompress/decode the response → hand the page to a pluggable
//! analysis hook → optionally issue a follow-up POST carrying anti-forgery
//! tokens scraped from the page plus a freshly fetched validation digest.
//!
//! Concrete operations implement [`RemoteOperation`], supplying the page
//! path to hit and how to interpret the returned markup; they never deal
//! with authentication. Each executor owns its request configuration
//! exclusively and shares no mutable state with other executors, so callers
//! may run operations concurrently with no coordination.
//!
//! There is no retry logic here: any transport failure propagates
//! immediately, and surrounding orchestration is expected to apply
//! retry/backoff if it wants it. The form digest is fetched fresh for every
//! POST and the federated cookie is rebuilt per request — both are
//! short-lived, request-scoped values that must not be cached.

use std::io::Read;
use std::time::Duration;

use reqwest::{header, redirect, Client, StatusCode};
use tracing::{debug, warn};
use url::Url;

use crate::auth::{
    apply_authentication, AuthKind, IdentityClient, RemoteOperationRequest, TransportAuth,
};
use crate::digest;
use crate::error::{OperationError, OperationPhase, Result};
use crate::ntlm;
use crate::scrape::extract_hidden_field;

/// User agent presented on every request.
const USER_AGENT: &str =
    "Mozilla/5.0 (compatible; MSIE 9.0; Windows NT 6.1; WOW64; Trident/5.0)";

/// Encodings we advertise and decode ourselves.
const ACCEPT_ENCODING: &str = "gzip, deflate";

/// The three reserved hidden fields every POST body leads with.
const RESERVED_FIELDS: [&str; 3] = ["__REQUESTDIGEST", "__EVENTVALIDATION", "__VIEWSTATE"];

/// Resource bounds for the executor's HTTP client.
///
/// The redirect and header caps bound resource usage against malicious or
/// misconfigured upstreams (redirect chains, header floods); they are
/// deliberate limits, not protocol requirements. The timeouts follow the
/// split used elsewhere in this crate's lineage: connect covers TCP + TLS
/// only, request covers the full round-trip including the body.
#[derive(Debug, Clone)]
pub struct TransportLimits {
    /// Maximum automatic redirects before the request fails.
    pub max_redirects: usize,
    /// Maximum total size of response headers, in bytes. Enforced after
    /// the headers have been received: an oversized response is rejected
    /// rather than truncated mid-stream.
    pub max_header_bytes: usize,
    /// TCP + TLS handshake timeout.
    pub connect_timeout: Duration,
    /// Full round-trip timeout, including response body download.
    pub request_timeout: Duration,
}

impl Default for TransportLimits {
    fn default() -> Self {
        TransportLimits {
            max_redirects: 6,
            max_header_bytes: 6 * 1024,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(300),
        }
    }
}

/// Ordered name → value mapping for operation-specific POST parameters.
///
/// Keys keep their insertion order; inserting an existing key replaces its
/// value in place. The executor appends these after the three reserved
/// hidden fields when assembling a POST body.
#[derive(Debug, Clone, Default)]
pub struct PostParameterSet {
    entries: Vec<(String, String)>,
}

impl PostParameterSet {
    /// An empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a parameter, replacing the value in place if the key exists.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Iterates parameters in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no parameters have been added.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A concrete remote operation: what page to hit and how to read it.
///
/// Implementations stay authentication-agnostic — the executor handles all
/// credential/cookie shaping. One level of this trait replaces the original
/// abstract-base-class hierarchy; no deeper nesting is needed.
pub trait RemoteOperation {
    /// Path of the page this operation targets, appended to the site URL.
    /// Expected to start with `/`.
    fn operation_path(&self) -> &str;

    /// Extracts operation-specific state from the fetched page. Called by
    /// [`RemoteExecutor::execute`] after a successful GET.
    fn analyze_response(&mut self, page: &str) -> Result<()>;

    /// Populates the operation-specific POST parameters. Called by
    /// [`RemoteExecutor::submit_post`] before assembling the body.
    fn build_post_parameters(&self) -> PostParameterSet;
}

/// Builds the executor's HTTP client with explicit resource bounds.
///
/// Decompression stays off at the client level: decoding the body per its
/// `Content-Encoding` is part of the operation contract and handled in
/// [`decode_body`].
fn build_http_client(limits: &TransportLimits) -> Client {
    Client::builder()
        .connect_timeout(limits.connect_timeout)
        .timeout(limits.request_timeout)
        .redirect(redirect::Policy::limited(limits.max_redirects))
        .user_agent(USER_AGENT)
        .build()
        .expect("failed to build HTTP client for remote operations")
}

/// Executes authenticated remote operations against one target site.
///
/// Single-threaded, sequential, blocking-per-await: each [`execute`] call
/// is one GET (plus an optional caller-driven POST) with no internal
/// parallelism. The executor owns its [`RemoteOperationRequest`] for its
/// lifetime.
///
/// [`execute`]: RemoteExecutor::execute
pub struct RemoteExecutor {
    client: Client,
    request: RemoteOperationRequest,
    identity: IdentityClient,
    limits: TransportLimits,
}

impl RemoteExecutor {
    /// Executor with default transport limits and the production identity
    /// provider.
    pub fn new(request: RemoteOperationRequest) -> Self {
        let limits = TransportLimits::default();
        RemoteExecutor {
            client: build_http_client(&limits),
            request,
            identity: IdentityClient::new(),
            limits,
        }
    }

    /// Replaces the transport limits, rebuilding the HTTP client so the
    /// redirect cap and timeouts take effect.
    pub fn with_limits(mut self, limits: TransportLimits) -> Self {
        self.client = build_http_client(&limits);
        self.limits = limits;
        self
    }

    /// Points the federated credential exchange at a custom identity
    /// endpoint, used by tests to substitute a local mock server.
    pub fn with_identity_endpoint(mut self, endpoint: &str) -> Self {
        self.identity = IdentityClient::with_endpoint(endpoint);
        self
    }

    /// The immutable request configuration this executor was built with.
    pub fn request(&self) -> &RemoteOperationRequest {
        &self.request
    }

    /// Runs the operation lifecycle: authenticated GET of the operation
    /// page, then the operation's analysis hook. No POST is issued unless
    /// the caller follows up with [`submit_post`].
    ///
    /// Returns the fetched page so the caller can pass it back as the POST
    /// referrer.
    ///
    /// # Errors
    ///
    /// `OperationError::Operation` identifying the failed phase (fetch or
    /// analyze), with the original cause chained.
    ///
    /// [`submit_post`]: RemoteExecutor::submit_post
    pub async fn execute<O: RemoteOperation>(&self, op: &mut O) -> Result<String> {
        let page = self
            .fetch_page(op.operation_path())
            .await
            .map_err(|e| OperationError::in_phase(OperationPhase::Fetch, e))?;
        op.analyze_response(&page)
            .map_err(|e| OperationError::in_phase(OperationPhase::Analyze, e))?;
        Ok(page)
    }

    /// Issues the operation's POST against its page.
    ///
    /// The body leads with the three reserved hidden fields scraped from
    /// `referrer_page`, followed by the operation's parameters in insertion
    /// order. Unless the auth strategy is the federated cookie, a fresh
    /// request-validation digest is fetched first and attached as
    /// `X-RequestDigest` — federated sessions carry equivalent validation
    /// through the cookie itself.
    ///
    /// # Errors
    ///
    /// `OperationError::PostFailed` wrapping the underlying cause, for any
    /// failure including a non-success status.
    pub async fn submit_post<O: RemoteOperation>(
        &self,
        op: &O,
        referrer_page: &str,
    ) -> Result<String> {
        self.post_inner(op, referrer_page)
            .await
            .map_err(|e| OperationError::PostFailed(Box::new(e)))
    }

    async fn post_inner<O: RemoteOperation>(
        &self,
        op: &O,
        referrer_page: &str,
    ) -> Result<String> {
        let params = op.build_post_parameters();
        let body = build_post_body(referrer_page, &params);
        let url = join_operation_url(self.request.target(), op.operation_path());
        debug!(url = %url, params = params.len(), "submitting operation POST");

        let auth = self.transport_auth().await?;

        let mut req = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(header::ACCEPT_ENCODING, ACCEPT_ENCODING);

        // Most operations require a fresh digest header; federated sessions
        // carry their validation in the cookie instead.
        if self.request.auth_kind() != AuthKind::FederatedCookie {
            let digest = self.fetch_form_digest().await?;
            req = req.header("X-RequestDigest", digest);
        }

        let response = self.send_shaped(req.body(body), &auth).await?;
        self.read_text_response(response, &url).await
    }

    /// Issues the authenticated GET of the operation page.
    async fn fetch_page(&self, operation_path: &str) -> Result<String> {
        let url = join_operation_url(self.request.target(), operation_path);
        debug!(url = %url, auth = ?self.request.auth_kind(), "fetching operation page");

        let auth = self.transport_auth().await?;
        let req = self
            .client
            .get(&url)
            .header(header::ACCEPT_ENCODING, ACCEPT_ENCODING);

        let response = self.send_shaped(req, &auth).await?;
        self.read_text_response(response, &url).await
    }

    /// Fetches a fresh request-validation digest from the site's SOAP
    /// endpoint.
    ///
    /// Uses the client's default (ambient) transport identity regardless of
    /// the executor's configured strategy — the digest endpoint requires
    /// ambient identity, not the operation's. Preserved as observed in the
    /// upstream protocol.
    async fn fetch_form_digest(&self) -> Result<String> {
        let url = format!(
            "{}{}",
            self.request.target().as_str().trim_end_matches('/'),
            digest::DIGEST_ENDPOINT_PATH
        );
        debug!(url = %url, "fetching request-validation digest");

        let response = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "text/xml")
            .body(digest::DIGEST_SOAP_ENVELOPE)
            .send()
            .await?;

        let body = self.read_text_response(response, &url).await?;
        digest::parse_form_digest(&body)
    }

    /// Resolves the transport shaping for this executor's strategy,
    /// performing the federated token exchange when required. The exchange
    /// runs per call: the token is short-lived and never cached.
    async fn transport_auth(&self) -> Result<TransportAuth> {
        if self.request.auth_kind() == AuthKind::FederatedCookie {
            let token = self
                .identity
                .acquire_cookie_token(
                    self.request.user(),
                    self.request.password(),
                    self.request.target(),
                )
                .await?;
            apply_authentication(&self.request, Some(&token))
        } else {
            apply_authentication(&self.request, None)
        }
    }

    /// Sends a shaped request, driving the NTLM challenge leg when the
    /// strategy calls for it.
    ///
    /// For NTLM: the negotiate header goes out with the first attempt; a
    /// 401 carrying an `NTLM` challenge is answered exactly once with the
    /// authenticate message. A second 401 propagates as a plain status
    /// failure — no retry loop.
    async fn send_shaped(
        &self,
        req: reqwest::RequestBuilder,
        auth: &TransportAuth,
    ) -> Result<reqwest::Response> {
        let TransportAuth::Ntlm(cred) = auth else {
            return Ok(auth.apply(req).send().await?);
        };

        let retry = req.try_clone().ok_or_else(|| {
            OperationError::network("request body is not replayable for the NTLM exchange")
        })?;

        let first = auth.apply(req).send().await?;
        if first.status() != StatusCode::UNAUTHORIZED {
            return Ok(first);
        }

        let challenge = first
            .headers()
            .get_all(header::WWW_AUTHENTICATE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(ntlm::challenge_from_header);

        let Some(challenge) = challenge else {
            warn!("server answered 401 without an NTLM challenge");
            return Ok(first);
        };

        let answer = cred.authenticate_header(&challenge)?;
        Ok(retry
            .header(header::AUTHORIZATION, answer)
            .send()
            .await?)
    }

    /// Enforces the header cap, checks the status, and decodes the body as
    /// UTF-8 text per its `Content-Encoding`.
    async fn read_text_response(
        &self,
        response: reqwest::Response,
        url: &str,
    ) -> Result<String> {
        let header_size = header_bytes(response.headers());
        if header_size > self.limits.max_header_bytes {
            return Err(OperationError::network(format!(
                "{url} response headers exceed cap ({header_size} > {} bytes)",
                self.limits.max_header_bytes
            )));
        }

        let status = response.status();
        let encoding = response
            .headers()
            .get(header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(str::to_lowercase);

        // Read the body before the status check so the remote diagnostic
        // text survives into the error.
        let raw = response.bytes().await?;
        if !status.is_success() {
            let body = String::from_utf8_lossy(&raw);
            return Err(OperationError::network(format!(
                "{url} returned {status}: {body}"
            )));
        }

        decode_body(encoding.as_deref(), &raw)
    }
}

/// Joins the site URL and an operation path, normalizing the boundary
/// slash.
pub(crate) fn join_operation_url(target: &Url, operation_path: &str) -> String {
    format!("{}{}", target.as_str().trim_end_matches('/'), operation_path)
}

/// Assembles a POST body: the three reserved hidden fields scraped from the
/// referrer page, then caller parameters in insertion order.
///
/// Hidden-field values arrive URL-encoded from the scraper; caller
/// parameters are appended verbatim. A reserved field absent from the page
/// contributes an empty value rather than failing — absence is a
/// data-quality concern for the remote service to reject, not a local
/// error.
pub(crate) fn build_post_body(referrer_page: &str, params: &PostParameterSet) -> String {
    let mut body = String::new();
    for (i, field) in RESERVED_FIELDS.iter().enumerate() {
        if i > 0 {
            body.push('&');
        }
        body.push_str(field);
        body.push('=');
        body.push_str(&extract_hidden_field(referrer_page, field));
    }
    for (key, value) in params.iter() {
        body.push('&');
        body.push_str(key);
        body.push('=');
        body.push_str(value);
    }
    body
}

/// Total size of a response's headers in bytes (names + values).
fn header_bytes(headers: &header::HeaderMap) -> usize {
    headers
        .iter()
        .map(|(name, value)| name.as_str().len() + value.as_bytes().len())
        .sum()
}

/// Decodes a response body to UTF-8 text, decompressing first when the
/// `Content-Encoding` names gzip or deflate. Invalid UTF-8 is replaced
/// rather than rejected, matching the permissive decoding of the upstream
/// pages.
pub(crate) fn decode_body(encoding: Option<&str>, raw: &[u8]) -> Result<String> {
    let decompressed: Vec<u8> = match encoding {
        Some(e) if e.contains("gzip") => {
            let mut buf = Vec::new();
            flate2::read::GzDecoder::new(raw)
                .read_to_end(&mut buf)
                .map_err(|err| OperationError::Network {
                    message: format!("failed to decompress gzip body: {err}"),
                    source: Some(Box::new(err)),
                })?;
            buf
        }
        Some(e) if e.contains("deflate") => {
            let mut buf = Vec::new();
            flate2::read::DeflateDecoder::new(raw)
                .read_to_end(&mut buf)
                .map_err(|err| OperationError::Network {
                    message: format!("failed to decompress deflate body: {err}"),
                    source: Some(Box::new(err)),
                })?;
            buf
        }
        _ => raw.to_vec(),
    };
    Ok(String::from_utf8_lossy(&decompressed).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    // ── POST body assembly ───────────────────────────────────────────

    #[test]
    fn post_body_orders_reserved_fields_then_params() {
        let page = concat!(
            "<input id=\"__REQUESTDIGEST\" value=\"d1\">",
            "<input id=\"__EVENTVALIDATION\" value=\"e1\">",
            "<input id=\"__VIEWSTATE\" value=\"v1\">",
        );
        let mut params = PostParameterSet::new();
        params.insert("a", "1");
        params.insert("b", "2");

        assert_eq!(
            build_post_body(page, &params),
            "__REQUESTDIGEST=d1&__EVENTVALIDATION=e1&__VIEWSTATE=v1&a=1&b=2"
        );
    }

    #[test]
    fn post_body_tolerates_missing_hidden_fields() {
        let params = PostParameterSet::new();
        assert_eq!(
            build_post_body("<html></html>", &params),
            "__REQUESTDIGEST=&__EVENTVALIDATION=&__VIEWSTATE="
        );
    }

    #[test]
    fn post_params_keep_insertion_order_and_replace_in_place() {
        let mut params = PostParameterSet::new();
        params.insert("first", "1");
        params.insert("second", "2");
        params.insert("first", "updated");

        let collected: Vec<_> = params.iter().collect();
        assert_eq!(collected, vec![("first", "updated"), ("second", "2")]);
        assert_eq!(params.len(), 2);
    }

    // ── Body decoding ────────────────────────────────────────────────

    #[test]
    fn gzip_body_round_trips() {
        let original = "<html>compressed page £ contents</html>";
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(original.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        assert_eq!(decode_body(Some("gzip"), &compressed).unwrap(), original);
    }

    #[test]
    fn deflate_body_round_trips() {
        let original = "plain deflate payload";
        let mut encoder =
            flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(original.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        assert_eq!(
            decode_body(Some("deflate"), &compressed).unwrap(),
            original
        );
    }

    #[test]
    fn unencoded_body_passes_through() {
        assert_eq!(decode_body(None, b"as-is").unwrap(), "as-is");
        // Unknown encodings are treated as identity rather than rejected.
        assert_eq!(decode_body(Some("br"), b"as-is").unwrap(), "as-is");
    }

    #[test]
    fn corrupt_gzip_is_a_network_error() {
        let err = decode_body(Some("gzip"), b"not gzip at all").unwrap_err();
        assert!(matches!(err, OperationError::Network { .. }));
    }

    #[test]
    fn invalid_utf8_is_replaced_not_rejected() {
        let text = decode_body(None, &[0x68, 0x69, 0xff, 0x21]).unwrap();
        assert!(text.starts_with("hi"));
        assert!(text.contains('\u{FFFD}'));
    }

    // ── URL joining and limits ───────────────────────────────────────

    #[test]
    fn operation_url_normalizes_the_boundary_slash() {
        let with_slash = Url::parse("https://tenant.sharepoint.com/sites/ops/").unwrap();
        let without = Url::parse("https://tenant.sharepoint.com/sites/ops").unwrap();
        assert_eq!(
            join_operation_url(&with_slash, "/_layouts/settings.aspx"),
            "https://tenant.sharepoint.com/sites/ops/_layouts/settings.aspx"
        );
        assert_eq!(
            join_operation_url(&without, "/_layouts/settings.aspx"),
            "https://tenant.sharepoint.com/sites/ops/_layouts/settings.aspx"
        );
    }

    #[test]
    fn default_limits_are_bounded() {
        let limits = TransportLimits::default();
        assert_eq!(limits.max_redirects, 6);
        assert_eq!(limits.max_header_bytes, 6 * 1024);
        assert_eq!(limits.connect_timeout, Duration::from_secs(10));
        assert_eq!(limits.request_timeout, Duration::from_secs(300));
    }

    #[test]
    fn header_bytes_counts_names_and_values() {
        let mut headers = header::HeaderMap::new();
        headers.insert("x-a", header::HeaderValue::from_static("12345"));
        headers.insert("x-bb", header::HeaderValue::from_static("6"));
        // "x-a" (3) + "12345" (5) + "x-bb" (4) + "6" (1)
        assert_eq!(header_bytes(&headers), 13);
    }
}
