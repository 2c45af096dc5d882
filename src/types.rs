//! Core data model: owners, buckets, objects.

use chrono::{DateTime, Utc};

/// An authenticated caller. Resolved from the access key embedded in a
/// request's `Authorization` header or query-string signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    pub id: String,
    pub name: String,
    secret: Vec<u8>,
}

impl Owner {
    pub fn new(id: impl Into<String>, name: impl Into<String>, secret: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            secret,
        }
    }

    /// An owner with no provisioned secret. HMAC key is empty.
    /// Matches the reference backends, which have no real secret store.
    pub fn anonymous(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            secret: Vec::new(),
        }
    }

    /// Compute the HMAC-SHA1 of `bytes_to_sign` using this owner's secret.
    pub fn calc_hash(&self, bytes_to_sign: &[u8]) -> Vec<u8> {
        use hmac::{Hmac, Mac};
        use sha1::Sha1;
        let mut mac = Hmac::<Sha1>::new_from_slice(&self.secret)
            .expect("HMAC accepts keys of any length");
        mac.update(bytes_to_sign);
        mac.finalize().into_bytes().to_vec()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub name: String,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    pub key: String,
    pub last_modified: DateTime<Utc>,
    pub etag: String,
    pub size: u64,
    pub owner: Owner,
}

/// Bucket-name validation per the S3 subset this gateway implements:
/// 3-255 chars, lowercase alphanumeric plus `.`, `_`, `-`, first character
/// alphanumeric.
pub fn is_valid_bucket_name(name: &str) -> bool {
    if name.len() < 3 || name.len() > 255 {
        return false;
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    name.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_bucket_names() {
        assert!(is_valid_bucket_name("abc"));
        assert!(is_valid_bucket_name("my-bucket.01"));
        assert!(is_valid_bucket_name(&"a".repeat(255)));
    }

    #[test]
    fn invalid_bucket_names() {
        assert!(!is_valid_bucket_name("ab"));
        assert!(!is_valid_bucket_name(&"a".repeat(256)));
        assert!(!is_valid_bucket_name("-bucket"));
        assert!(!is_valid_bucket_name("Bucket"));
        assert!(!is_valid_bucket_name("bucket/name"));
    }

    #[test]
    fn calc_hash_is_deterministic() {
        let owner = Owner::anonymous("alice");
        let a = owner.calc_hash(b"hello");
        let b = owner.calc_hash(b"hello");
        assert_eq!(a, b);
    }

    proptest::proptest! {
        /// Any string made entirely of allowed characters with an
        /// alphanumeric first character is valid iff its length is in range.
        #[test]
        fn length_is_the_only_failure_mode_for_well_formed_charsets(
            name in "[a-z0-9][a-z0-9._-]{0,300}"
        ) {
            let valid = is_valid_bucket_name(&name);
            let length_ok = name.len() >= 3 && name.len() <= 255;
            proptest::prop_assert_eq!(valid, length_ok);
        }

        /// A name containing any uppercase letter is always rejected.
        #[test]
        fn uppercase_is_always_rejected(name in "[a-z0-9]{1,10}[A-Z][a-z0-9]{1,10}") {
            proptest::prop_assert!(!is_valid_bucket_name(&name));
        }
    }
}
