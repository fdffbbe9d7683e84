// ============================================
// File: crates/mowlink-core/src/signature.rs
// ============================================
//! # Signature Suite
//!
//! ## Creation Reason
//! The cloud gateway, the account handshake and the broker each verify a
//! keyed digest computed over a canonical rendering of the request. The
//! renderings are undocumented and checked byte-for-byte, so they live
//! here as pure functions pinned by fixed vectors.
//!
//! ## Main Functionality
//! - `CanonicalRequest`: header-canonical scheme (HMAC-SHA256 → base64)
//! - `canonical_headers()`: lowercased, filtered, sorted signing headers
//! - `field_concat_sign()`: field-concatenation scheme (HMAC-SHA1 → hex)
//! - `provisioning_sign()`: the fixed field order used by provisioning
//! - `content_md5()`: body digest slot used by gateway requests
//!
//! ## Header-Canonical String
//! ```text
//! METHOD \n
//! accept \n
//! content-md5 \n          (empty for connect / OAuth login)
//! content-type \n
//! date \n
//! name:value \n ...       (sorted, lowercased, unsigned headers removed)
//! path[?param=json]
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Header names are lowercased before filtering and sorting
//! - The last header line is NOT followed by an extra blank line
//! - Field order in `provisioning_sign()` is part of the contract
//!
//! ## Last Modified
//! v0.1.0 - Initial signing schemes

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use sha1::Sha1;
use sha2::Sha256;

use crate::error::{CoreError, Result};

type HmacSha256 = Hmac<Sha256>;
type HmacSha1 = Hmac<Sha1>;

// ============================================
// Constants
// ============================================

/// Value of the `x-ca-signaturemethod` header.
pub const SIGNATURE_METHOD: &str = "HmacSHA256";

/// Headers that never take part in the signed header block.
const UNSIGNED_HEADERS: &[&str] = &[
    "x-ca-signature",
    "x-ca-signature-headers",
    "accept",
    "content-md5",
    "content-type",
    "date",
    "host",
    "token",
    "user-agent",
    "vid",
];

// ============================================
// Header-Canonical Scheme
// ============================================

/// Signed header block produced by [`canonical_headers`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    /// Comma-joined header names, sent as `x-ca-signature-headers`.
    pub names: String,
    /// `name:value` lines joined by `\n`, part of the string to sign.
    pub block: String,
}

/// Lowercases, filters and sorts the headers that take part in signing.
#[must_use]
pub fn canonical_headers<'a, I>(headers: I) -> SignedHeaders
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let signed: BTreeMap<String, &str> = headers
        .into_iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value))
        .filter(|(name, _)| !UNSIGNED_HEADERS.contains(&name.as_str()))
        .collect();

    let names = signed.keys().cloned().collect::<Vec<_>>().join(",");
    let block = signed
        .iter()
        .map(|(name, value)| format!("{name}:{value}"))
        .collect::<Vec<_>>()
        .join("\n");

    SignedHeaders { names, block }
}

/// A request rendered for the header-canonical scheme.
///
/// # Example
/// ```
/// use mowlink_core::signature::CanonicalRequest;
///
/// let headers = [("x-ca-key", "K"), ("x-ca-nonce", "n-1"), ("x-ca-signaturemethod", "HmacSHA256")];
/// let request = CanonicalRequest {
///     method: "POST",
///     accept: "application/json",
///     content_md5: "",
///     content_type: "application/x-www-form-urlencoded",
///     date: "Thu, 01 Jan 2026 00:00:00 GMT",
///     headers: &headers,
///     path: r#"/api/prd/connect.json?request={"a":1}"#,
/// };
/// assert_eq!(request.sign("S").unwrap(), "gBAPP5zWqMZ2iXvz2iVP46NBUDDuaGBnMzktaQ8cBPI=");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct CanonicalRequest<'a> {
    /// HTTP method, upper case.
    pub method: &'a str,
    /// `accept` header value.
    pub accept: &'a str,
    /// `content-md5` header value, empty when the body is not signed.
    pub content_md5: &'a str,
    /// `content-type` header value.
    pub content_type: &'a str,
    /// `date` header value.
    pub date: &'a str,
    /// All request headers; unsigned ones are filtered out.
    pub headers: &'a [(&'a str, &'a str)],
    /// Path, including the query string when the body travels in it.
    pub path: &'a str,
}

impl CanonicalRequest<'_> {
    /// Returns the signed header block for this request.
    #[must_use]
    pub fn signed_headers(&self) -> SignedHeaders {
        canonical_headers(self.headers.iter().copied())
    }

    /// Renders the exact string covered by the signature.
    #[must_use]
    pub fn string_to_sign(&self) -> String {
        let signed = self.signed_headers();
        format!(
            "{}\n{}\n{}\n{}\n{}\n{}\n{}",
            self.method,
            self.accept,
            self.content_md5,
            self.content_type,
            self.date,
            signed.block,
            self.path
        )
    }

    /// Computes the base64 HMAC-SHA256 signature with `secret`.
    ///
    /// # Errors
    /// Returns `SignatureCreation` if the MAC cannot be keyed.
    pub fn sign(&self, secret: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(CoreError::signature)?;
        mac.update(self.string_to_sign().as_bytes());
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }
}

/// Joins a path and a single JSON-valued query parameter.
#[must_use]
pub fn path_with_query(path: &str, param: &str, json: &str) -> String {
    format!("{path}?{param}={json}")
}

/// Base64 of the MD5 digest of `body`, for the `content-md5` slot.
#[must_use]
pub fn content_md5(body: &[u8]) -> String {
    BASE64.encode(Md5::digest(body))
}

// ============================================
// Field-Concatenation Scheme
// ============================================

/// Concatenates `name` and `value` of each field, in order, with no
/// separators, and returns the lowercase hex HMAC-SHA1 under `secret`.
///
/// # Errors
/// Returns `SignatureCreation` if the MAC cannot be keyed.
pub fn field_concat_sign(secret: &str, fields: &[(&str, &str)]) -> Result<String> {
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes()).map_err(CoreError::signature)?;
    for (name, value) in fields {
        mac.update(name.as_bytes());
        mac.update(value.as_bytes());
    }
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Signature carried in the `authInfo` block of device provisioning.
///
/// Field order is app key, client id, device serial, timestamp.
///
/// # Errors
/// Returns `SignatureCreation` if the MAC cannot be keyed.
pub fn provisioning_sign(
    secret: &str,
    app_key: &str,
    client_id: &str,
    device_sn: &str,
    timestamp: &str,
) -> Result<String> {
    field_concat_sign(
        secret,
        &[
            ("appKey", app_key),
            ("clientId", client_id),
            ("deviceSn", device_sn),
            ("timestamp", timestamp),
        ],
    )
}

// ============================================
// Tests
// ============================================
