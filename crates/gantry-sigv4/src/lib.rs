//! AWS Signature Version 4 (SigV4) request signing.
//!
//! Pure signing logic shared by the gantry API Gateway, Lambda and IAM
//! clients. The crate performs no I/O and never reads the clock: callers pass
//! a [`Timestamp`] so signatures are reproducible in tests.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

// --- Public types ---

/// AWS credentials.
#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    /// For STS / AssumeRole temporary credentials.
    pub session_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Credential scope: which regional service the request is addressed to.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub region: &'a str,
    /// Signing name of the service (`apigateway`, `lambda`, `iam`, ...).
    pub service: &'a str,
}

impl Scope<'_> {
    /// Every service except S3 expects the canonical path encoded twice.
    fn double_encodes_path(&self) -> bool {
        self.service != "s3"
    }
}

/// Request time in the two formats SigV4 needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timestamp {
    /// `YYYYMMDDTHHMMSSZ`, sent as `x-amz-date`.
    pub amz_date: String,
    /// `YYYYMMDD`, used in the credential scope.
    pub date: String,
}

impl Timestamp {
    /// Build a timestamp from seconds since the Unix epoch (UTC).
    pub fn from_unix(unix_secs: u64) -> Self {
        let secs_of_day = unix_secs % 86_400;
        let (year, month, day) = civil_from_days(unix_secs / 86_400);

        let date = format!("{:04}{:02}{:02}", year, month, day);
        let amz_date = format!(
            "{}T{:02}{:02}{:02}Z",
            date,
            secs_of_day / 3_600,
            (secs_of_day % 3_600) / 60,
            secs_of_day % 60
        );
        Self { amz_date, date }
    }
}

/// The parts of an HTTP request covered by the signature.
#[derive(Debug, Clone, Copy)]
pub struct RequestParts<'a> {
    /// HTTP method (uppercased when signing).
    pub method: &'a str,
    /// Raw, unencoded path (`/restapis/abc/deployments`).
    pub path: &'a str,
    /// Raw, unencoded query parameters in any order.
    pub query: &'a [(&'a str, &'a str)],
    /// `Host` header value, including a non-default port.
    pub host: &'a str,
    /// Additional headers to sign (e.g. `content-type`). Names are lowercased.
    pub headers: &'a [(&'a str, &'a str)],
    /// Request body.
    pub payload: &'a [u8],
}

/// Result of [`sign`]: the encoded request target and the headers to attach.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    /// Path encoded once, to be used on the wire.
    pub path: String,
    /// Sorted, encoded query string (empty when there is none). Must be sent
    /// verbatim so that it matches what was signed.
    pub query: String,
    /// Headers to add to the request: `authorization`, `x-amz-date`,
    /// `x-amz-content-sha256` and, with temporary credentials,
    /// `x-amz-security-token`.
    pub headers: Vec<(String, String)>,
}

impl SignedRequest {
    /// Path plus query string, ready to append to an endpoint base URL.
    pub fn path_and_query(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query)
        }
    }
}

// --- Public functions ---

/// Sign a request and return the wire path, query and auth headers.
pub fn sign(
    parts: &RequestParts<'_>,
    creds: &Credentials,
    scope: &Scope<'_>,
    at: &Timestamp,
) -> SignedRequest {
    let wire_path = encode_path(parts.path);
    let canonical_path = if scope.double_encodes_path() {
        encode_path(&wire_path)
    } else {
        wire_path.clone()
    };
    let query = canonical_query(parts.query);
    let payload_hash = sha256_hex(parts.payload);

    let mut signed: BTreeMap<String, String> = parts
        .headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.trim().to_string()))
        .collect();
    signed.insert("host".into(), parts.host.to_string());
    signed.insert("x-amz-date".into(), at.amz_date.clone());
    signed.insert("x-amz-content-sha256".into(), payload_hash.clone());
    if let Some(token) = &creds.session_token {
        signed.insert("x-amz-security-token".into(), token.clone());
    }

    let canonical_headers: String = signed.iter().map(|(k, v)| format!("{k}:{v}\n")).collect();
    let signed_names = signed.keys().cloned().collect::<Vec<_>>().join(";");

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        parts.method.to_ascii_uppercase(),
        canonical_path,
        query,
        canonical_headers,
        signed_names,
        payload_hash,
    );

    let credential_scope = format!(
        "{}/{}/{}/aws4_request",
        at.date, scope.region, scope.service
    );
    let string_to_sign = format!(
        "{ALGORITHM}\n{}\n{}\n{}",
        at.amz_date,
        credential_scope,
        sha256_hex(canonical_request.as_bytes()),
    );

    let key = signing_key(&creds.secret_access_key, &at.date, scope);
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes()));

    let mut headers = vec![
        (
            "authorization".to_string(),
            format!(
                "{ALGORITHM} Credential={}/{},SignedHeaders={},Signature={}",
                creds.access_key_id, credential_scope, signed_names, signature
            ),
        ),
        ("x-amz-date".to_string(), at.amz_date.clone()),
        ("x-amz-content-sha256".to_string(), payload_hash),
    ];
    if let Some(token) = &creds.session_token {
        headers.push(("x-amz-security-token".to_string(), token.clone()));
    }

    SignedRequest {
        path: wire_path,
        query,
        headers,
    }
}

/// SHA-256 of `data` as lowercase hex.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Percent-encode a value with the SigV4 unreserved set (`A-Z a-z 0-9 - _ . ~`).
pub fn uri_encode(value: &str) -> String {
    encode(value, false)
}

// --- Private helpers ---

fn encode_path(path: &str) -> String {
    let encoded = encode(path, true);
    if encoded.starts_with('/') {
        encoded
    } else {
        format!("/{encoded}")
    }
}

fn canonical_query(query: &[(&str, &str)]) -> String {
    let mut pairs: Vec<(String, String)> = query
        .iter()
        .map(|(k, v)| (uri_encode(k), uri_encode(v)))
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

fn encode(value: &str, keep_slash: bool) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b'/' if keep_slash => out.push('/'),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

fn signing_key(secret: &str, date: &str, scope: &Scope<'_>) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, scope.region.as_bytes());
    let k_service = hmac_sha256(&k_region, scope.service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Days since the Unix epoch to a proleptic Gregorian (year, month, day).
fn civil_from_days(days: u64) -> (i64, u64, u64) {
    let z = days as i64 + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe as i64 + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

// --- Tests ---
