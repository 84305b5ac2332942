//! Per-user namespace derivation.
//!
//! Every durable record lives under a directory named by a `UserNamespace`.
//! The namespace can only be built from a user identifier, so a path for one
//! user can never be produced from another user's id.

use sha2::{Digest, Sha256};
use std::fmt;

/// Namespace used when no user is authenticated.
pub const ANONYMOUS_NAMESPACE: &str = "anonymous";

/// Prefix for hashed namespaces. Keeps them disjoint from `ANONYMOUS_NAMESPACE`.
const USER_PREFIX: &str = "u-";

/// Isolation key for one user's durable cache.
///
/// Authenticated users map to `u-<sha256(user_id) as hex>`; anonymous
/// sessions map to `anonymous`. The inner value is private.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserNamespace {
    inner: String,
}

impl UserNamespace {
    /// Derive the namespace for a user identifier.
    ///
    /// `None`, empty and whitespace-only identifiers are anonymous. Any other
    /// identifier is hashed verbatim, so ids differing only in whitespace
    /// still get distinct namespaces.
    pub fn for_user(user_id: Option<&str>) -> Self {
        match user_id {
            Some(id) if !id.trim().is_empty() => Self {
                inner: format!("{}{}", USER_PREFIX, sha256_hex(id.as_bytes())),
            },
            _ => Self::anonymous(),
        }
    }

    /// The shared namespace for unauthenticated sessions.
    pub fn anonymous() -> Self {
        Self {
            inner: ANONYMOUS_NAMESPACE.to_string(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.inner == ANONYMOUS_NAMESPACE
    }

    /// Directory-safe string form.
    pub fn as_str(&self) -> &str {
        &self.inner
    }
}

impl fmt::Display for UserNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner)
    }
}

/// Lowercase hex SHA-256 of `content`.
pub fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_anonymous_for_missing_or_blank() {
        assert!(UserNamespace::for_user(None).is_anonymous());
        assert!(UserNamespace::for_user(Some("")).is_anonymous());
        assert!(UserNamespace::for_user(Some("   ")).is_anonymous());
    }

    #[test]
    fn test_user_namespace_is_stable() {
        let a = UserNamespace::for_user(Some("user-42"));
        let b = UserNamespace::for_user(Some("user-42"));
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("u-"));
        assert_eq!(a.as_str().len(), 2 + 64);
    }

    #[test]
    fn test_namespace_is_directory_safe() {
        let ns = UserNamespace::for_user(Some("../../etc/passwd"));
        assert!(ns
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-'));
    }

    #[test]
    fn test_literal_anonymous_user_is_not_anonymous_namespace() {
        let ns = UserNamespace::for_user(Some("anonymous"));
        assert!(!ns.is_anonymous());
        assert_ne!(ns, UserNamespace::anonymous());
    }

    #[test]
    fn test_sha256_hex_known_value() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    proptest! {
        #[test]
        fn prop_distinct_users_never_share_namespace(a in "[a-zA-Z0-9@._-]{1,40}", b in "[a-zA-Z0-9@._-]{1,40}") {
            prop_assume!(a != b);
            let ns_a = UserNamespace::for_user(Some(&a));
            let ns_b = UserNamespace::for_user(Some(&b));
            prop_assert_ne!(ns_a, ns_b);
        }
    }
}
