//! PKCE (Proof Key for Code Exchange) implementation per RFC 7636
//!
//! Generates the code verifier and challenge used during the OAuth 2.1
//! authorization-code flow. The verifier stays with the client and is sent
//! during token exchange; the challenge goes into the authorization URL so
//! the authorization server can verify the exchange request came from the
//! same party that initiated the flow.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Shortest verifier RFC 7636 allows
pub const MIN_VERIFIER_LENGTH: usize = 43;

/// Longest verifier RFC 7636 allows
pub const MAX_VERIFIER_LENGTH: usize = 128;

/// Verifier length used when the caller does not pick one
pub const DEFAULT_VERIFIER_LENGTH: usize = 64;

/// How the code challenge is derived from the verifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodeChallengeMethod {
    /// `BASE64URL(SHA256(verifier))`
    #[default]
    #[serde(rename = "S256")]
    S256,
    /// Challenge is the verifier itself
    #[serde(rename = "plain")]
    Plain,
}

impl CodeChallengeMethod {
    /// Wire value for the `code_challenge_method` parameter
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeChallengeMethod::S256 => "S256",
            CodeChallengeMethod::Plain => "plain",
        }
    }
}

impl fmt::Display for CodeChallengeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodeChallengeMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "S256" => Ok(CodeChallengeMethod::S256),
            "plain" => Ok(CodeChallengeMethod::Plain),
            other => Err(Error::configuration(format!(
                "unsupported code challenge method: {other} (expected S256 or plain)"
            ))),
        }
    }
}

/// Verifier, derived challenge and the method that links them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PkceCodePair {
    pub code_verifier: String,
    pub code_challenge: String,
    pub code_challenge_method: CodeChallengeMethod,
}

/// Generate a cryptographically random PKCE code verifier of `length` chars.
///
/// Random bytes are encoded as URL-safe base64 (no padding), which only
/// produces unreserved URI characters, then truncated to `length`.
pub fn generate_code_verifier(length: usize) -> Result<String> {
    if !(MIN_VERIFIER_LENGTH..=MAX_VERIFIER_LENGTH).contains(&length) {
        return Err(Error::configuration(format!(
            "code verifier length must be between {MIN_VERIFIER_LENGTH} and {MAX_VERIFIER_LENGTH}, got {length}"
        )));
    }

    // 96 bytes encode to 128 base64url chars, enough for any valid length
    let mut bytes = [0u8; 96];
    rand::rng().fill(&mut bytes);
    let mut verifier = URL_SAFE_NO_PAD.encode(bytes);
    verifier.truncate(length);
    Ok(verifier)
}

/// Compute the code challenge for `verifier`.
///
/// `plain` returns the verifier unchanged; `S256` is
/// `BASE64URL(SHA256(verifier))` without padding.
pub fn generate_code_challenge(verifier: &str, method: CodeChallengeMethod) -> String {
    match method {
        CodeChallengeMethod::Plain => verifier.to_owned(),
        CodeChallengeMethod::S256 => {
            let hash = Sha256::digest(verifier.as_bytes());
            URL_SAFE_NO_PAD.encode(hash)
        }
    }
}

/// Generate a fresh verifier and its matching challenge.
pub fn generate_pkce_code_pair(
    method: CodeChallengeMethod,
    verifier_length: usize,
) -> Result<PkceCodePair> {
    let code_verifier = generate_code_verifier(verifier_length)?;
    let code_challenge = generate_code_challenge(&code_verifier, method);
    Ok(PkceCodePair {
        code_verifier,
        code_challenge,
        code_challenge_method: method,
    })
}

/// Whether `verifier` satisfies RFC 7636: 43-128 chars of `[A-Za-z0-9-._~]`.
pub fn is_valid_code_verifier(verifier: &str) -> bool {
    (MIN_VERIFIER_LENGTH..=MAX_VERIFIER_LENGTH).contains(&verifier.len())
        && verifier
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifier_has_requested_length_and_charset() {
        for length in [43, 64, 100, 128] {
            let verifier = generate_code_verifier(length).unwrap();
            assert_eq!(verifier.len(), length);
            assert!(
                is_valid_code_verifier(&verifier),
                "generated verifier must validate: {verifier}"
            );
        }
    }

    #[test]
    fn verifier_length_out_of_range_is_rejected() {
        assert!(matches!(
            generate_code_verifier(42),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            generate_code_verifier(129),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn verifiers_are_unique() {
        let a = generate_code_verifier(DEFAULT_VERIFIER_LENGTH).unwrap();
        let b = generate_code_verifier(DEFAULT_VERIFIER_LENGTH).unwrap();
        assert_ne!(a, b, "two verifiers must not collide");
    }

    #[test]
    fn s256_challenge_matches_known_value() {
        // RFC 7636 Appendix B
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            generate_code_challenge(verifier, CodeChallengeMethod::S256),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn s256_challenge_is_deterministic_and_unpadded() {
        let verifier = generate_code_verifier(80).unwrap();
        let c1 = generate_code_challenge(&verifier, CodeChallengeMethod::S256);
        let c2 = generate_code_challenge(&verifier, CodeChallengeMethod::S256);
        assert_eq!(c1, c2);
        assert_eq!(c1.len(), 43);
        assert!(!c1.contains(['=', '+', '/']));

        let expected = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        assert_eq!(c1, expected);
    }

    #[test]
    fn plain_challenge_is_the_verifier() {
        let verifier = generate_code_verifier(50).unwrap();
        assert_eq!(
            generate_code_challenge(&verifier, CodeChallengeMethod::Plain),
            verifier
        );
    }

    #[test]
    fn code_pair_is_consistent() {
        let pair = generate_pkce_code_pair(CodeChallengeMethod::S256, 64).unwrap();
        assert_eq!(pair.code_verifier.len(), 64);
        assert_eq!(pair.code_challenge_method, CodeChallengeMethod::S256);
        assert_eq!(
            pair.code_challenge,
            generate_code_challenge(&pair.code_verifier, CodeChallengeMethod::S256)
        );

        let plain = generate_pkce_code_pair(CodeChallengeMethod::Plain, 43).unwrap();
        assert_eq!(plain.code_challenge, plain.code_verifier);
    }

    #[test]
    fn validation_boundaries() {
        assert!(is_valid_code_verifier(&"a".repeat(43)));
        assert!(is_valid_code_verifier(&"a".repeat(128)));
        assert!(!is_valid_code_verifier(&"a".repeat(42)));
        assert!(!is_valid_code_verifier(&"a".repeat(129)));
        assert!(!is_valid_code_verifier(""));
    }

    #[test]
    fn validation_rejects_reserved_characters() {
        let base = "a".repeat(50);
        for bad in [' ', '+', '/', '=', '!', '@', 'é'] {
            let verifier = format!("{base}{bad}");
            assert!(
                !is_valid_code_verifier(&verifier),
                "{bad:?} must not be accepted"
            );
        }
        assert!(is_valid_code_verifier(&format!("{base}-._~AZ09")));
    }

    #[test]
    fn method_parses_wire_values() {
        assert_eq!("S256".parse::<CodeChallengeMethod>().unwrap(), CodeChallengeMethod::S256);
        assert_eq!("plain".parse::<CodeChallengeMethod>().unwrap(), CodeChallengeMethod::Plain);
        assert!("s256".parse::<CodeChallengeMethod>().is_err());
        assert_eq!(CodeChallengeMethod::default().to_string(), "S256");
    }
}
