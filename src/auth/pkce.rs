//! Random tokens for the authorization-code flow: the PKCE verifier and its
//! S256 challenge (RFC 7636), and the opaque `state` parameter.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Entropy behind both verifiers and state tokens. 32 bytes encode to 43
/// base64url characters, the shortest verifier RFC 7636 allows.
const TOKEN_BYTES: usize = 32;

fn random_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// BASE64URL(SHA256(verifier))
pub fn s256_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Opaque, URL-safe value for the `state` parameter
pub fn generate_state() -> String {
    random_token()
}

/// Verifier kept server-side with the pending state, challenge sent to the provider
#[derive(Debug, Clone)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    pub fn new() -> Self {
        let verifier = random_token();
        let challenge = s256_challenge(&verifier);
        Self { verifier, challenge }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_base64url(s: &str) -> bool {
        s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }

    #[test]
    fn test_pair_shape() {
        let pair = PkcePair::new();
        assert_eq!(pair.verifier.len(), 43);
        assert_eq!(pair.challenge.len(), 43);
        assert!(is_base64url(&pair.verifier) && is_base64url(&pair.challenge));
        assert_eq!(pair.challenge, s256_challenge(&pair.verifier));
    }

    #[test]
    fn test_rfc7636_vector() {
        assert_eq!(
            s256_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_tokens_are_fresh() {
        assert_ne!(generate_state(), generate_state());
        assert_ne!(PkcePair::new().verifier, PkcePair::new().verifier);
    }
}
