//! Connection security: Curve25519 key exchange plus an XChaCha20-Poly1305
//! box sealing each frame.
//!
//! The server owns a long-term keypair whose public half is distributed to
//! clients out-of-band as 64-character lowercase hex. A client generates an
//! ephemeral keypair per connection, sends its public half in the clear, and
//! both sides precompute the same 32-byte shared secret. Only the server is
//! authenticated: a client talking to an impostor cannot decrypt replies.

use std::fmt;

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;
use x25519_dalek::{EphemeralSecret, StaticSecret};

use crate::errors::*;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 24;

fn key_from_hex(kind: &str, hex_str: &str) -> Result<[u8; KEY_LEN]> {
    let raw = hex::decode(hex_str).chain_err(|| format!("unable to parse {} key", kind))?;
    if raw.len() != KEY_LEN {
        bail!("invalid {} key length: {}", kind, raw.len());
    }
    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&raw);
    Ok(key)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKey([u8; KEY_LEN]);

impl PublicKey {
    pub fn from_bytes(raw: [u8; KEY_LEN]) -> PublicKey {
        PublicKey(raw)
    }

    pub fn from_hex(hex_str: &str) -> Result<PublicKey> {
        Ok(PublicKey(key_from_hex("public", hex_str)?))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

#[derive(Clone)]
pub struct PrivateKey([u8; KEY_LEN]);

impl PrivateKey {
    pub fn from_bytes(raw: [u8; KEY_LEN]) -> PrivateKey {
        PrivateKey(raw)
    }

    pub fn from_hex(hex_str: &str) -> Result<PrivateKey> {
        Ok(PrivateKey(key_from_hex("private", hex_str)?))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

#[derive(Clone)]
pub struct KeyPair {
    pub public: PublicKey,
    pub private: PrivateKey,
}

impl KeyPair {
    pub fn from_hex(private_hex: &str, public_hex: &str) -> Result<KeyPair> {
        Ok(KeyPair {
            public: PublicKey::from_hex(public_hex)?,
            private: PrivateKey::from_hex(private_hex)?,
        })
    }
}

pub fn generate_keypair() -> KeyPair {
    let secret = StaticSecret::random_from_rng(OsRng);
    let public = x25519_dalek::PublicKey::from(&secret);
    KeyPair {
        public: PublicKey(public.to_bytes()),
        private: PrivateKey(secret.to_bytes()),
    }
}

/// Precomputed symmetric key for one connection.
#[derive(Clone)]
pub struct SharedSecret([u8; KEY_LEN]);

impl SharedSecret {
    /// Server side: combine the long-term private key with the ephemeral
    /// public key read during the handshake.
    pub fn precompute(private: &PrivateKey, peer: &PublicKey) -> SharedSecret {
        let secret = StaticSecret::from(private.0);
        let shared = secret.diffie_hellman(&x25519_dalek::PublicKey::from(peer.0));
        SharedSecret(shared.to_bytes())
    }

    /// Client side: generate an ephemeral keypair and combine it with the
    /// server's configured public key. Returns the public half to send in
    /// the clear.
    pub fn client_handshake(server_key: &PublicKey) -> (PublicKey, SharedSecret) {
        let ephemeral = EphemeralSecret::random_from_rng(OsRng);
        let public = x25519_dalek::PublicKey::from(&ephemeral);
        let shared = ephemeral.diffie_hellman(&x25519_dalek::PublicKey::from(server_key.0));
        (PublicKey(public.to_bytes()), SharedSecret(shared.to_bytes()))
    }

    /// Seal `plaintext` with a fresh random nonce. The nonce travels in the
    /// clear ahead of the frame length.
    pub fn seal(&self, plaintext: &[u8]) -> Result<([u8; NONCE_LEN], Vec<u8>)> {
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&self.0));
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let sealed = cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext)
            .map_err(|_| Error::from("failed to seal frame"))?;
        Ok((nonce, sealed))
    }

    pub fn open(&self, nonce: &[u8; NONCE_LEN], sealed: &[u8]) -> Result<Vec<u8>> {
        let cipher = XChaCha20Poly1305::new(Key::from_slice(&self.0));
        cipher
            .decrypt(XNonce::from_slice(nonce), sealed)
            .map_err(|_| ErrorKind::DecryptFailed.into())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_hex_roundtrip() {
        let pair = generate_keypair();
        let hex_str = pair.public.to_string();
        assert_eq!(hex_str.len(), 64);
        assert_eq!(PublicKey::from_hex(&hex_str).unwrap(), pair.public);
        assert!(PublicKey::from_hex("deadbeef").is_err());
        assert!(PublicKey::from_hex("zz").is_err());
    }

    #[test]
    fn test_handshake_agreement() {
        let server = generate_keypair();
        let (client_public, client_secret) = SharedSecret::client_handshake(&server.public);
        let server_secret = SharedSecret::precompute(&server.private, &client_public);

        let (nonce, sealed) = client_secret.seal(b"translation unit").unwrap();
        assert_eq!(
            server_secret.open(&nonce, &sealed).unwrap(),
            b"translation unit"
        );
    }

    #[test]
    fn test_mismatched_keys_fail() {
        let server = generate_keypair();
        let other = generate_keypair();
        let (client_public, client_secret) = SharedSecret::client_handshake(&other.public);
        let server_secret = SharedSecret::precompute(&server.private, &client_public);

        let (nonce, sealed) = client_secret.seal(b"payload").unwrap();
        match server_secret.open(&nonce, &sealed) {
            Err(Error(ErrorKind::DecryptFailed, _)) => (),
            other => panic!("expected decrypt failure, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_nonce_uniqueness() {
        let pair = generate_keypair();
        let (public, secret) = SharedSecret::client_handshake(&pair.public);
        let _ = public;
        let (n1, _) = secret.seal(b"x").unwrap();
        let (n2, _) = secret.seal(b"x").unwrap();
        assert_ne!(n1, n2);
    }
}
