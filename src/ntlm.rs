//! NTLM message construction for the explicit network-credential strategy.
//!
//! When an operation is configured with `AuthKind::NetworkCredentials`, the
//! executor authenticates with the classic three-leg NTLM exchange over the
//! `Authorization` header:
//!
//! 1. **Type 1 (Negotiate)** — sent with the initial request.
//! 2. **Type 2 (Challenge)** — the server answers 401 with a
//!    `WWW-Authenticate: NTLM <base64>` challenge carrying an 8-byte server
//!    nonce.
//! 3. **Type 3 (Authenticate)** — the request is replayed with NTLMv2
//!    responses computed from the credential and both nonces.
//!
//! This module builds the messages; [`crate::operation`] drives the
//! exchange. Key material:
//! - NT hash = MD4 of the UTF-16LE password.
//! - NTLMv2 hash = HMAC-MD5(NT hash, uppercase(user) + domain in UTF-16LE).
//! - NTProofStr = HMAC-MD5(NTLMv2 hash, server challenge + blob).
//!
//! The credential is scoped to a single target host: it is built per
//! operation and never shared or cached across executors.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use md4::{Digest, Md4};
use md5::Md5;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{OperationError, Result};

/// Negotiate flags for the Type 1 message:
/// UNICODE | OEM | REQUEST_TARGET | NEGOTIATE_NTLM | ALWAYS_SIGN |
/// EXTENDED_SESSIONSECURITY.
const NEGOTIATE_FLAGS: u32 = 0x0000_0001
    | 0x0000_0002
    | 0x0000_0004
    | 0x0000_0200
    | 0x0000_8000
    | 0x0008_0000;

/// Flags echoed in the Type 3 message.
const AUTHENTICATE_FLAGS: u32 = 0x0000_0001 | 0x0000_0200 | 0x0000_8000 | 0x0008_0000;

/// An explicit user/password/domain credential scoped to one target host.
///
/// Construct via [`NtlmCredential::new`]; the executor calls
/// [`negotiate_header`](Self::negotiate_header) for the first leg and
/// [`authenticate_header`](Self::authenticate_header) to answer the
/// server's challenge.
#[derive(Clone)]
pub struct NtlmCredential {
    user: String,
    password: String,
    domain: String,
    workstation: String,
    /// Host this credential is valid for. Shaping refuses to reuse the
    /// credential against any other host.
    scope: String,
}

/// The password must never leak through `Debug` (log lines, panic payloads).
impl std::fmt::Debug for NtlmCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NtlmCredential")
            .field("user", &self.user)
            .field("domain", &self.domain)
            .field("scope", &self.scope)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl NtlmCredential {
    /// Builds a credential scoped to `host`.
    pub fn new(user: &str, password: &str, domain: &str, host: &str) -> Self {
        let workstation = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "WORKSTATION".to_string());
        NtlmCredential {
            user: user.to_string(),
            password: password.to_string(),
            domain: domain.to_string(),
            workstation,
            scope: host.to_string(),
        }
    }

    /// The host this credential is scoped to.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// `Authorization` header value for the negotiate leg.
    pub fn negotiate_header(&self) -> String {
        format!("NTLM {}", BASE64.encode(self.negotiate_message()))
    }

    /// `Authorization` header value answering the server's Type 2 challenge.
    ///
    /// # Errors
    ///
    /// `AuthenticationRejected` when the challenge is too short to carry a
    /// server nonce.
    pub fn authenticate_header(&self, challenge: &[u8]) -> Result<String> {
        Ok(format!(
            "NTLM {}",
            BASE64.encode(self.authenticate_message(challenge)?)
        ))
    }

    /// Builds the Type 1 (Negotiate) message.
    fn negotiate_message(&self) -> Vec<u8> {
        let mut message = b"NTLMSSP\0".to_vec();
        message.extend_from_slice(&1u32.to_le_bytes());
        message.extend_from_slice(&NEGOTIATE_FLAGS.to_le_bytes());

        // Domain security buffer: length, max length, offset.
        let domain_bytes = self.domain.as_bytes();
        let domain_len = domain_bytes.len() as u16;
        message.extend_from_slice(&domain_len.to_le_bytes());
        message.extend_from_slice(&domain_len.to_le_bytes());
        let domain_offset = 32 + self.workstation.len() as u32;
        message.extend_from_slice(&domain_offset.to_le_bytes());

        // Workstation security buffer. Payload order is workstation first,
        // at the fixed 32-byte header boundary.
        let workstation_bytes = self.workstation.as_bytes();
        let workstation_len = workstation_bytes.len() as u16;
        message.extend_from_slice(&workstation_len.to_le_bytes());
        message.extend_from_slice(&workstation_len.to_le_bytes());
        message.extend_from_slice(&32u32.to_le_bytes());

        message.extend_from_slice(workstation_bytes);
        message.extend_from_slice(domain_bytes);
        message
    }

    /// Builds the Type 3 (Authenticate) message from the server challenge.
    fn authenticate_message(&self, challenge: &[u8]) -> Result<Vec<u8>> {
        if challenge.len() < 32 {
            return Err(OperationError::AuthenticationRejected {
                message: format!(
                    "NTLM challenge too short ({} bytes, need at least 32)",
                    challenge.len()
                ),
                source: None,
            });
        }

        // Server nonce lives at bytes 24..32 of the Type 2 message.
        let server_challenge = &challenge[24..32];
        let client_challenge: [u8; 8] = rand::random();

        let nt_response = self.ntlmv2_response(server_challenge, &client_challenge);
        let lm_response = self.lmv2_response(server_challenge, &client_challenge);

        let domain_unicode = utf16le(&self.domain);
        let user_unicode = utf16le(&self.user);
        let workstation_unicode = utf16le(&self.workstation);

        // Fixed header is 88 bytes; payloads follow in the order the
        // security buffers reference them.
        let base_offset: u32 = 88;
        let lm_offset = base_offset;
        let nt_offset = lm_offset + lm_response.len() as u32;
        let domain_offset = nt_offset + nt_response.len() as u32;
        let user_offset = domain_offset + domain_unicode.len() as u32;
        let workstation_offset = user_offset + user_unicode.len() as u32;
        let session_key_offset = workstation_offset + workstation_unicode.len() as u32;

        let mut message = b"NTLMSSP\0".to_vec();
        message.extend_from_slice(&3u32.to_le_bytes());

        push_security_buffer(&mut message, lm_response.len() as u16, lm_offset);
        push_security_buffer(&mut message, nt_response.len() as u16, nt_offset);
        push_security_buffer(&mut message, domain_unicode.len() as u16, domain_offset);
        push_security_buffer(&mut message, user_unicode.len() as u16, user_offset);
        push_security_buffer(
            &mut message,
            workstation_unicode.len() as u16,
            workstation_offset,
        );
        // Empty session key buffer.
        push_security_buffer(&mut message, 0, session_key_offset);

        message.extend_from_slice(&AUTHENTICATE_FLAGS.to_le_bytes());
        // Version (8 bytes) and MIC (16 bytes), both zeroed.
        message.extend_from_slice(&[0u8; 8]);
        message.extend_from_slice(&[0u8; 16]);

        message.extend_from_slice(&lm_response);
        message.extend_from_slice(&nt_response);
        message.extend_from_slice(&domain_unicode);
        message.extend_from_slice(&user_unicode);
        message.extend_from_slice(&workstation_unicode);
        Ok(message)
    }

    /// NTLMv2 response: NTProofStr followed by the blob it was computed over.
    fn ntlmv2_response(&self, server_challenge: &[u8], client_challenge: &[u8]) -> Vec<u8> {
        let ntlmv2_hash = self.ntlmv2_hash();

        let mut blob = Vec::with_capacity(32);
        blob.extend_from_slice(&1u32.to_le_bytes()); // blob signature
        blob.extend_from_slice(&1u32.to_le_bytes()); // reserved
        blob.extend_from_slice(&windows_timestamp().to_le_bytes());
        blob.extend_from_slice(client_challenge);
        blob.extend_from_slice(&0u32.to_le_bytes());

        let mut data = server_challenge.to_vec();
        data.extend_from_slice(&blob);
        let proof = hmac_md5(&ntlmv2_hash, &data);

        let mut response = proof.to_vec();
        response.extend_from_slice(&blob);
        response
    }

    /// LMv2 response: HMAC over both nonces followed by the client nonce.
    fn lmv2_response(&self, server_challenge: &[u8], client_challenge: &[u8]) -> Vec<u8> {
        let ntlmv2_hash = self.ntlmv2_hash();
        let mut data = server_challenge.to_vec();
        data.extend_from_slice(client_challenge);
        let mut response = hmac_md5(&ntlmv2_hash, &data).to_vec();
        response.extend_from_slice(client_challenge);
        response
    }

    /// NTLMv2 hash = HMAC-MD5(NT hash, uppercase(user) + domain, UTF-16LE).
    fn ntlmv2_hash(&self) -> [u8; 16] {
        let identity = format!("{}{}", self.user.to_uppercase(), self.domain.to_uppercase());
        hmac_md5(&self.nt_hash(), &utf16le(&identity))
    }

    /// NT hash = MD4 of the UTF-16LE password.
    fn nt_hash(&self) -> [u8; 16] {
        let mut hasher = Md4::new();
        hasher.update(utf16le(&self.password));
        hasher.finalize().into()
    }
}

/// Decodes the Type 2 challenge bytes out of a `WWW-Authenticate` header
/// value. Returns `None` unless the value is `NTLM <valid base64>`.
pub(crate) fn challenge_from_header(header_value: &str) -> Option<Vec<u8>> {
    let encoded = header_value.trim().strip_prefix("NTLM ")?;
    BASE64.decode(encoded.trim()).ok()
}

/// Appends an NTLM security buffer (length, max length, offset).
fn push_security_buffer(message: &mut Vec<u8>, len: u16, offset: u32) {
    message.extend_from_slice(&len.to_le_bytes());
    message.extend_from_slice(&len.to_le_bytes());
    message.extend_from_slice(&offset.to_le_bytes());
}

fn hmac_md5(key: &[u8], data: &[u8]) -> [u8; 16] {
    let mut mac =
        Hmac::<Md5>::new_from_slice(key).expect("HMAC-MD5 accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

fn utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|c| c.to_le_bytes()).collect()
}

/// 100-ns intervals since 1601-01-01, the NTLM blob timestamp format.
fn windows_timestamp() -> u64 {
    const EPOCH_DELTA_SECS: u64 = 11_644_473_600;
    let unix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    (unix.as_secs() + EPOCH_DELTA_SECS) * 10_000_000 + u64::from(unix.subsec_nanos()) / 100
}
