//! Request-validation digest acquisition.
//!
//! State-changing POSTs against the target service must carry a short-lived
//! anti-forgery token in the `X-RequestDigest` header. The token comes from
//! a fixed SOAP endpoint under the site (`/_vti_bin/sites.asmx`) and is
//! single-use in practice, so it is fetched fresh for every POST and never
//! cached.
//!
//! The envelope is a constant and the response is read with a literal tag
//! search rather than an XML parser — the endpoint emits one fixed shape
//! and the only interesting content is the text between the result tags.
//! [`crate::operation::RemoteExecutor`] owns the HTTP side of the exchange;
//! this module owns the wire constants and the parse.

use crate::error::{OperationError, Result};
use crate::scrape;

/// Path of the digest SOAP endpoint, relative to the site root.
pub(crate) const DIGEST_ENDPOINT_PATH: &str = "/_vti_bin/sites.asmx";

/// The fixed SOAP envelope POSTed to the digest endpoint.
pub(crate) const DIGEST_SOAP_ENVELOPE: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"utf-8\"?>",
    "<soap:Envelope xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" ",
    "xmlns:xsd=\"http://www.w3.org/2001/XMLSchema\" ",
    "xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\">",
    "  <soap:Body>",
    "    <GetUpdatedFormDigest xmlns=\"http://schemas.microsoft.com/sharepoint/soap/\" />",
    "  </soap:Body>",
    "</soap:Envelope>",
);

/// Tag wrapping the digest value in the SOAP response.
const RESULT_TAG: &str = "GetUpdatedFormDigestResult";

/// Extracts the digest token from the SOAP response body.
///
/// # Errors
///
/// `OperationError::DigestMissing` when the result tags are absent, or the
/// start tag is present without a matching end tag after it.
pub fn parse_form_digest(soap_body: &str) -> Result<String> {
    scrape::element_text(soap_body, RESULT_TAG)
        .map(str::to_owned)
        .ok_or(OperationError::DigestMissing)
}
