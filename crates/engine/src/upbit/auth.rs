use std::collections::HashMap;

use hmac::{Hmac, Mac};
use sha2::Sha256;

use common::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// API key pair for one exchange account.
#[derive(Clone)]
pub struct KeyPair {
    pub access_key: String,
    pub secret_key: String,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("access_key", &self.access_key)
            .field("secret_key", &"***")
            .finish()
    }
}

/// Resolves the opaque key pair id carried by every gateway call.
///
/// Key registration and storage live outside this crate; implementations
/// only look keys up.
pub trait KeyResolver: Send + Sync {
    fn resolve(&self, key_pair_id: &str) -> Result<KeyPair>;
}

/// Keys held in memory, loaded once at startup.
#[derive(Debug, Default, Clone)]
pub struct StaticKeyResolver {
    keys: HashMap<String, KeyPair>,
}

impl StaticKeyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(
        mut self,
        key_pair_id: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        self.keys.insert(
            key_pair_id.into(),
            KeyPair {
                access_key: access_key.into(),
                secret_key: secret_key.into(),
            },
        );
        self
    }
}

impl KeyResolver for StaticKeyResolver {
    fn resolve(&self, key_pair_id: &str) -> Result<KeyPair> {
        self.keys
            .get(key_pair_id)
            .cloned()
            .ok_or_else(|| Error::Config(format!("unknown key pair '{key_pair_id}'")))
    }
}

/// `Authorization` header value for a request whose parameters serialize
/// to `query`. The signature covers the nonce followed by the query.
///
/// This is not the token format Upbit verifies; see [`super::UpbitClient`].
pub fn authorization(keys: &KeyPair, query: &str) -> String {
    let nonce = uuid::Uuid::new_v4().to_string();
    let signature = sign(&keys.secret_key, &format!("{nonce}{query}"));
    format!(
        "HMAC-SHA256 access_key={},nonce={nonce},signature={signature}",
        keys.access_key
    )
}

fn sign(secret: &str, payload: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_keys_only() {
        let keys = StaticKeyResolver::new().with_key("main", "ak", "sk");
        assert_eq!(keys.resolve("main").unwrap().access_key, "ak");
        assert!(matches!(keys.resolve("other"), Err(Error::Config(_))));
    }

    #[test]
    fn signature_matches_rfc4231_vector() {
        // RFC 4231 test case 2.
        assert_eq!(
            sign("Jefe", "what do ya want for nothing?"),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn header_carries_access_key_and_fresh_nonce() {
        let keys = KeyPair {
            access_key: "ak".into(),
            secret_key: "sk".into(),
        };
        let a = authorization(&keys, "market=KRW-BTC");
        let b = authorization(&keys, "market=KRW-BTC");
        assert!(a.starts_with("HMAC-SHA256 access_key=ak,nonce="));
        assert_ne!(a, b);
    }

    #[test]
    fn debug_hides_secret() {
        let keys = KeyPair {
            access_key: "ak".into(),
            secret_key: "topsecret".into(),
        };
        assert!(!format!("{keys:?}").contains("topsecret"));
    }
}
