//! Sealing sessions into opaque tokens and back.
//!
//! Token layout: URL-safe unpadded base64 of `nonce (12 bytes) || ciphertext`, where the
//! ciphertext is the ChaCha20-Poly1305 seal of the session's JSON form. The key is the
//! SHA-256 digest of the configured secret. The absent session is the empty string.

use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use sha2::{Digest, Sha256};

use super::policy::is_well_formed;
use super::session::Session;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("invalid encoding")]
    InvalidEncoding,
    #[error("nonce generation failed: {0}")]
    Nonce(String),
    #[error("session serialization failed: {0}")]
    Serialize(String),
    #[error("malformed session payload")]
    MalformedSession,
}

#[derive(Clone)]
pub struct SessionCodec {
    cipher: ChaCha20Poly1305,
}

impl std::fmt::Debug for SessionCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionCodec { key: <redacted> }")
    }
}

impl SessionCodec {
    pub fn new(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        let cipher = ChaCha20Poly1305::new(Key::from_slice(digest.as_slice()));
        Self { cipher }
    }

    /// Seal a session. `None` yields the empty token.
    pub fn encode(&self, session: Option<&Session>) -> Result<String, CodecError> {
        let Some(session) = session else { return Ok(String::new()); };
        let plaintext = serde_json::to_vec(session).map_err(|e| CodecError::Serialize(e.to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        getrandom::getrandom(&mut nonce_bytes).map_err(|e| CodecError::Nonce(e.to_string()))?;
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_slice())
            .map_err(|_| CodecError::EncryptionFailed)?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);
        Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(combined))
    }

    /// Open a token. Anything that is not a sealed, well-formed session maps to `None`.
    pub fn decode(&self, token: &str) -> Option<Session> {
        if token.is_empty() { return None; }
        self.open(token).ok()
    }

    fn open(&self, token: &str) -> Result<Session, CodecError> {
        let combined = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| CodecError::InvalidEncoding)?;
        if combined.len() < NONCE_LEN + TAG_LEN {
            return Err(CodecError::InvalidEncoding);
        }
        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CodecError::DecryptionFailed)?;
        let session: Session = serde_json::from_slice(&plaintext).map_err(|_| CodecError::MalformedSession)?;
        if !is_well_formed(&session) {
            return Err(CodecError::MalformedSession);
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encode_decode_roundtrip() {
        let codec = SessionCodec::new("secret-a");
        let s = Session::new("507f1f77bcf86cd799439011", 1_700_000_000_123, true).with_claim("role", json!("editor"));
        let token = codec.encode(Some(&s)).unwrap();
        assert!(!token.is_empty());
        assert_eq!(codec.decode(&token), Some(s));
    }

    #[test]
    fn absent_session_is_empty_token() {
        let codec = SessionCodec::new("secret-a");
        let token = codec.encode(None).unwrap();
        assert_eq!(token, "");
        assert_eq!(codec.decode(&token), None);
    }

    #[test]
    fn fresh_nonce_per_encode() {
        let codec = SessionCodec::new("secret-a");
        let s = Session::new("u1", 1, false);
        let a = codec.encode(Some(&s)).unwrap();
        let b = codec.encode(Some(&s)).unwrap();
        assert_ne!(a, b);
        assert_eq!(codec.decode(&a), codec.decode(&b));
    }

    #[test]
    fn other_secret_cannot_open() {
        let a = SessionCodec::new("secret-a");
        let b = SessionCodec::new("secret-b");
        let token = a.encode(Some(&Session::new("u1", 1, false))).unwrap();
        assert_eq!(b.decode(&token), None);
        assert!(a.decode(&token).is_some());
    }

    #[test]
    fn tampering_is_detected() {
        let codec = SessionCodec::new("secret-a");
        let token = codec.encode(Some(&Session::new("u1", 1, false))).unwrap();
        let mut bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(&token).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let forged = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes);
        assert_eq!(codec.decode(&forged), None);
    }

    #[test]
    fn garbage_never_panics() {
        let codec = SessionCodec::new("secret-a");
        let long = "x".repeat(4096);
        for junk in ["", " ", "garbage", "!!!!", "AAAA", "a.b.c", "\u{1F600}", long.as_str()] {
            assert_eq!(codec.decode(junk), None, "input {junk:?}");
        }
    }

    #[test]
    fn sealed_but_ill_formed_session_is_rejected() {
        let codec = SessionCodec::new("secret-a");
        let token = codec.encode(Some(&Session::new("", 1, false))).unwrap();
        assert_eq!(codec.decode(&token), None);
    }

    #[test]
    fn varied_sessions_survive_a_roundtrip() {
        let codec = SessionCodec::new("secret-a");
        let sessions = [
            Session::new("u1", 0, false),
            Session::new("u2", i64::MAX, true),
            Session::new("u3", 42, false)
                .with_claim("subject", json!("intruder"))
                .with_claim("timestamp", json!(-1))
                .with_claim("remember", json!("yes")),
            Session::new("u4", 1_700_000_000_000, true)
                .with_claim("name", json!("Ada"))
                .with_claim("level", json!(3))
                .with_claim("ratio", json!(0.25))
                .with_claim("admin", json!(false))
                .with_claim("tags", json!(["a", "b"]))
                .with_claim("nested", json!({"k": null})),
        ];
        for s in sessions {
            let token = codec.encode(Some(&s)).unwrap();
            assert_eq!(codec.decode(&token).as_ref(), Some(&s), "{s:?}");
        }
    }

    #[test]
    fn padded_tokens_are_rejected() {
        let codec = SessionCodec::new("secret-a");
        let token = codec.encode(Some(&Session::new("u1", 1, false))).unwrap();
        assert!(codec.decode(&token).is_some());
        assert_eq!(codec.decode(&format!(" {token} ")), None);
        assert_eq!(codec.decode(&format!("{token}\n")), None);
    }
}
