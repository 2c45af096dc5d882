//! AWS Signature Version 2 request authentication.
//!
//! Builds the canonical string-to-sign for an incoming request and a
//! configured service host, matching the reference canonicalization
//! bit-for-bit: canonicalized amz headers, canonicalized resource
//! (virtual-host vs path-style bucket detection plus the fixed subresource
//! whitelist), header-or-query parameter extraction.

use super::errors::S3Error;
use crate::types::Owner;
use axum::http::HeaderMap;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::collections::BTreeSet;

const B64: base64::engine::general_purpose::GeneralPurpose = base64::engine::general_purpose::STANDARD;

/// Subresource query parameters that participate in the canonical string,
/// per the AWS v2 `goamz`-derived whitelist.
const SUBRESOURCES: &[&str] = &[
    "acl",
    "location",
    "logging",
    "notification",
    "partNumber",
    "policy",
    "requestPayment",
    "torrent",
    "uploadId",
    "uploads",
    "versionId",
    "versioning",
    "versions",
    "response-content-type",
    "response-content-language",
    "response-expires",
    "response-cache-control",
    "response-content-disposition",
    "response-content-encoding",
];

/// A query parameter, preserving whether it was a bare key (`?acl`) or had
/// a value (`?acl=`, `?prefix=a`) — both `?acl` and `?acl=` parse to an
/// empty value, and the canonical string treats them identically.
fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

fn strip_port(host: &str) -> &str {
    match host.find(':') {
        Some(i) => &host[..i],
        None => host,
    }
}

/// The leading label(s) by which `host` strictly extends `service_host`,
/// e.g. `suffix_label("johnsmith.s3.amazonaws.com", "s3.amazonaws.com")`
/// is `Some("johnsmith")`. `None` if `host` isn't `service_host` extended
/// by exactly one more DNS label.
fn suffix_label(host: &str, service_host: &str) -> Option<String> {
    if host.len() > service_host.len()
        && host.ends_with(service_host)
        && host.as_bytes()[host.len() - service_host.len() - 1] == b'.'
    {
        Some(host[..host.len() - service_host.len() - 1].to_string())
    } else {
        None
    }
}

/// The bucket embedded in a virtual-hosted `Host` header, per the signer's
/// canonicalization rule: either the whole (bucket-less) host when no
/// service host is configured, or the leading label(s) that extend the
/// configured service host by one segment. This is a signature-canonical-
/// ization rule, not a routing rule — see `router_bucket_from_host` for
/// the narrower predicate the router's virtual-host rewrite needs.
pub(crate) fn virtual_host_bucket(host: &str, service_host: &str) -> Option<String> {
    let host = strip_port(host);
    let service_host = strip_port(service_host);

    if service_host.is_empty() {
        if host.is_empty() {
            None
        } else {
            Some(host.to_string())
        }
    } else {
        suffix_label(host, service_host)
    }
}

/// The bucket the router should rewrite a virtual-hosted request into,
/// per the dispatch rule: only when `host` strictly extends a *configured*
/// service host by one label. Unlike `virtual_host_bucket`, an empty
/// service host never triggers a rewrite here — routing falls through to
/// ordinary path-style matching instead, since a bare `Host` header is not
/// itself a bucket name for dispatch purposes even though the signer's
/// canonicalization rule treats it as one.
pub(crate) fn router_bucket_from_host(host: &str, service_host: &str) -> Option<String> {
    let host = strip_port(host);
    let service_host = strip_port(service_host);
    if service_host.is_empty() {
        None
    } else {
        suffix_label(host, service_host)
    }
}

/// The resource half of the canonical string: bucket (from virtual-host
/// detection or path-style addressing), undecoded path, and any whitelisted
/// subresources, sorted and joined.
fn canonical_resource(host: &str, service_host: &str, request_target: &str, query: &[(String, String)]) -> String {
    let mut resource = String::new();
    if let Some(bucket) = virtual_host_bucket(host, service_host) {
        resource.push('/');
        resource.push_str(&bucket);
    }

    let mut uri = request_target;
    if let Some(i) = uri.find("://") {
        uri = &uri[i + 3..];
    }
    let path = match uri.find('/') {
        Some(i) => uri[i..].to_string(),
        None => format!("/{uri}"),
    };
    let path = match path.find('?') {
        Some(i) => path[..i].to_string(),
        None => path,
    };
    resource.push_str(&path);

    let mut sub: Vec<String> = query
        .iter()
        .filter(|(k, _)| SUBRESOURCES.contains(&k.as_str()))
        .map(|(k, v)| if v.is_empty() { k.clone() } else { format!("{k}={v}") })
        .collect();
    if !sub.is_empty() {
        sub.sort();
        resource.push('?');
        resource.push_str(&sub.join("&"));
    }

    resource
}

/// Everything needed to build the canonical string-to-sign out of request
/// metadata that doesn't depend on an `axum::http::Request` type directly,
/// so the signing math stays testable against the bare fixtures.
pub struct CanonicalRequest<'a> {
    pub method: &'a str,
    pub headers: &'a HeaderMap,
    pub host: &'a str,
    pub service_host: &'a str,
    pub request_target: &'a str,
}

/// Build the canonical string-to-sign:
/// `METHOD \n Content-MD5 \n Content-Type \n Date-or-empty \n CanonicalizedAmzHeaders CanonicalizedResource`
pub fn bytes_to_sign(req: &CanonicalRequest<'_>) -> Vec<u8> {
    let query = req.request_target.find('?').map(|i| parse_query(&req.request_target[i + 1..])).unwrap_or_default();

    let md5 = req.headers.get("content-md5").and_then(|v| v.to_str().ok()).unwrap_or("");
    let ctype = req.headers.get("content-type").and_then(|v| v.to_str().ok()).unwrap_or("");

    let mut seen = BTreeSet::new();
    let mut amz_pairs: Vec<(String, String)> = Vec::new();
    for name in req.headers.keys() {
        let lname = name.as_str().to_ascii_lowercase();
        if lname.starts_with("x-amz-") && seen.insert(lname.clone()) {
            let joined = req
                .headers
                .get_all(name)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .collect::<Vec<_>>()
                .join(",");
            amz_pairs.push((lname, joined));
        }
    }
    amz_pairs.sort_by(|a, b| a.0.cmp(&b.0));
    let has_amz_date = amz_pairs.iter().any(|(k, _)| k == "x-amz-date");

    let mut date = if has_amz_date {
        String::new()
    } else {
        req.headers.get("date").and_then(|v| v.to_str().ok()).unwrap_or("").to_string()
    };
    if let Some((_, v)) = query.iter().find(|(k, _)| k == "Expires") {
        date = v.clone();
    }

    let amz_block = if amz_pairs.is_empty() {
        String::new()
    } else {
        let mut s = amz_pairs.iter().map(|(k, v)| format!("{k}:{v}")).collect::<Vec<_>>().join("\n");
        s.push('\n');
        s
    };

    let resource = canonical_resource(req.host, req.service_host, req.request_target, &query);

    let mut out = Vec::new();
    out.extend_from_slice(req.method.as_bytes());
    for part in [md5, ctype, date.as_str(), amz_block.as_str()] {
        out.push(b'\n');
        out.extend_from_slice(part.as_bytes());
    }
    out.extend_from_slice(resource.as_bytes());
    out
}

struct AuthParams {
    access_key: String,
    signature: Vec<u8>,
}

/// Extract `(access_key, signature)` from either the `Authorization` header
/// (`AWS <access>:<base64(sig)>`) or the presigned query params
/// (`AWSAccessKeyId`, `Signature`).
fn extract_auth_params(headers: &HeaderMap, request_target: &str) -> Result<AuthParams, S3Error> {
    let query = request_target.find('?').map(|i| parse_query(&request_target[i + 1..])).unwrap_or_default();

    let from_query = query
        .iter()
        .find(|(k, _)| k == "AWSAccessKeyId")
        .map(|(_, v)| v.clone())
        .zip(query.iter().find(|(k, _)| k == "Signature").map(|(_, v)| v.clone()));

    let (access_key, signature_b64) = if let Some((access, sig)) = from_query {
        (access, sig)
    } else {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or(S3Error::NoAuthorization)?;
        let auth = auth.strip_prefix("AWS ").unwrap_or(auth);
        let (access, sig) = auth.split_once(':').ok_or(S3Error::NoAuthorization)?;
        (access.to_string(), sig.to_string())
    };

    if access_key.is_empty() || signature_b64.is_empty() {
        return Err(S3Error::NoAuthorization);
    }

    let signature = B64.decode(signature_b64.as_bytes()).map_err(|_| S3Error::MalformedRequest)?;
    Ok(AuthParams { access_key, signature })
}

/// Authenticate a request against the given backend, returning the
/// resolved `Owner` on success.
pub async fn authenticate(
    backend: &dyn crate::storage::StorageBackend,
    req: &CanonicalRequest<'_>,
) -> Result<Owner, S3Error> {
    let params = extract_auth_params(req.headers, req.request_target)?;
    let owner = backend
        .get_owner(&params.access_key)
        .await
        .ok_or(S3Error::NoAuthorization)?;

    let sts = bytes_to_sign(req);
    let expected = owner.calc_hash(&sts);
    if !constant_time_eq(&expected, &params.signature) {
        return Err(S3Error::SignatureMismatch);
    }
    Ok(owner)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

type HmacSha1 = Hmac<Sha1>;

/// Standalone HMAC-SHA1 helper, used by tests and by callers that already
/// have a secret in hand rather than an `Owner`.
pub fn hmac_sha1(secret: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha1::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut h = HeaderMap::new();
        for (k, v) in pairs {
            h.append(
                axum::http::HeaderName::from_bytes(k.as_bytes()).unwrap(),
                axum::http::HeaderValue::from_str(v).unwrap(),
            );
        }
        h
    }

    fn sts(method: &str, host: &str, service_host: &str, target: &str, hdrs: &[(&str, &str)]) -> String {
        let h = headers(hdrs);
        let req = CanonicalRequest {
            method,
            headers: &h,
            host,
            service_host,
            request_target: target,
        };
        String::from_utf8(bytes_to_sign(&req)).unwrap()
    }

    #[test]
    fn fixture_get_virtual_hosted() {
        let s = sts(
            "GET",
            "johnsmith.s3.amazonaws.com",
            "s3.amazonaws.com",
            "/photos/puppy.jpg",
            &[("Date", "Tue, 27 Mar 2007 19:36:42 +0000")],
        );
        assert_eq!(s, "GET\n\n\nTue, 27 Mar 2007 19:36:42 +0000\n/johnsmith/photos/puppy.jpg");
    }

    #[test]
    fn fixture_put_with_content_type() {
        let s = sts(
            "PUT",
            "johnsmith.s3.amazonaws.com",
            "s3.amazonaws.com",
            "/photos/puppy.jpg",
            &[
                ("Content-Type", "image/jpeg"),
                ("Date", "Tue, 27 Mar 2007 21:15:45 +0000"),
            ],
        );
        assert_eq!(s, "PUT\n\nimage/jpeg\nTue, 27 Mar 2007 21:15:45 +0000\n/johnsmith/photos/puppy.jpg");
    }

    #[test]
    fn fixture_acl_subresource() {
        let s = sts("GET", "johnsmith.s3.amazonaws.com", "s3.amazonaws.com", "/?acl", &[]);
        assert_eq!(s, "GET\n\n\n\n/johnsmith/?acl");
    }

    #[test]
    fn fixture_path_style_with_amz_date() {
        let s = sts(
            "DELETE",
            "s3.amazonaws.com",
            "s3.amazonaws.com",
            "/johnsmith/photos/puppy.jpg",
            &[
                ("x-amz-date", "Tue, 27 Mar 2007 21:20:26 +0000"),
                ("Date", "should be ignored"),
            ],
        );
        assert_eq!(
            s,
            "DELETE\n\n\n\nx-amz-date:Tue, 27 Mar 2007 21:20:26 +0000\n/johnsmith/photos/puppy.jpg"
        );
    }

    #[test]
    fn fixture_presigned_expires() {
        let s = sts(
            "GET",
            "johnsmith.s3.amazonaws.com",
            "s3.amazonaws.com",
            "/photos/puppy.jpg?Expires=1175139620",
            &[],
        );
        assert_eq!(s, "GET\n\n\n1175139620\n/johnsmith/photos/puppy.jpg");
    }

    #[test]
    fn fixture_multivalued_amz_meta_sorted_and_joined() {
        let s = sts(
            "PUT",
            "johnsmith.s3.amazonaws.com",
            "s3.amazonaws.com",
            "/photos/puppy.jpg",
            &[
                ("X-Amz-Meta-ReviewedBy", "joe@johnsmith.net"),
                ("X-Amz-Meta-ReviewedBy", "jane@johnsmith.net"),
                ("X-Amz-Meta-FileChecksum", "0x02661779"),
            ],
        );
        assert_eq!(
            s,
            "PUT\n\n\n\nx-amz-meta-filechecksum:0x02661779\nx-amz-meta-reviewedby:joe@johnsmith.net,jane@johnsmith.net\n/johnsmith/photos/puppy.jpg"
        );
    }

    #[test]
    fn fixture_percent_encoded_path_preserved_undecoded() {
        let s = sts(
            "GET",
            "johnsmith.s3.amazonaws.com",
            "s3.amazonaws.com",
            "/%E6%97%A5%E6%9C%AC.txt",
            &[],
        );
        assert_eq!(s, "GET\n\n\n\n/johnsmith/%E6%97%A5%E6%9C%AC.txt");
    }

    #[test]
    fn fixture_bucketless_host_is_path_style() {
        let s = sts("GET", "localhost", "", "/bucket/key", &[]);
        assert_eq!(s, "GET\n\n\n\n/localhost/bucket/key");
    }

    #[test]
    fn hmac_sha1_is_deterministic_and_20_bytes() {
        let a = hmac_sha1(b"secret", b"data");
        let b = hmac_sha1(b"secret", b"data");
        assert_eq!(a, b);
        assert_eq!(a.len(), 20);
    }
}
