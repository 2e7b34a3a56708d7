//! RPC request signing (signature version 1.0, HMAC-SHA1)

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use sha1::Sha1;

pub const SIGNATURE_METHOD: &str = "HMAC-SHA1";
pub const SIGNATURE_VERSION: &str = "1.0";

/// Everything except RFC 3986 unreserved characters
const RFC3986: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

pub fn percent_encode(s: &str) -> String {
    utf8_percent_encode(s, RFC3986).to_string()
}

/// `key=value` pairs joined by `&`, keys in byte order
pub fn canonicalize(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn string_to_sign(method: &str, canonical: &str) -> String {
    format!(
        "{}&{}&{}",
        method.to_uppercase(),
        percent_encode("/"),
        percent_encode(canonical)
    )
}

/// Base64 HMAC-SHA1 of `string_to_sign` keyed by `secret&`
pub fn sign(string_to_sign: &str, secret: &str) -> String {
    let key = format!("{}&", secret);
    // HMAC accepts keys of any length
    let mut mac = Hmac::<Sha1>::new_from_slice(key.as_bytes())
        .unwrap_or_else(|_| unreachable!("hmac key length is unbounded"));
    mac.update(string_to_sign.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

/// Add the `Signature` parameter and return the signed canonical string
pub fn sign_params(method: &str, params: &mut BTreeMap<String, String>, secret: &str) -> String {
    params.remove("Signature");
    let canonical = canonicalize(params);
    let signature = sign(&string_to_sign(method, &canonical), secret);
    let signed = format!("{}&Signature={}", canonical, percent_encode(&signature));
    params.insert("Signature".to_string(), signature);
    signed
}

pub fn timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
