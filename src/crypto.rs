//! Chain-linkage cryptography: per-block ephemeral Ed25519 keypairs chained
//! into a `Signed` envelope, and the BLAKE3-keyed MAC used once a token is
//! `Sealed`.
//!
//! # Chain construction
//! Block `0`'s payload is signed by the root signing key. Every subsequent
//! block `i` is signed by the ephemeral signing key generated when block
//! `i-1` was appended (or built, for block 0's own next key); that
//! signature covers `payload(i) || next_pubkey_bytes` for every block but
//! the last, and just `payload(i)` for the last block (there is no "next"
//! key yet). Verifying the envelope against the root public key therefore
//! transitively verifies every block in the chain: each signature can only
//! be checked using the public key embedded in the previous one.
//!
//! # Sealing
//! [`Envelope::Sealed`] replaces the signature chain with a single BLAKE3
//! keyed hash over the concatenated block payloads. The key is carried in
//! the envelope in the clear: sealing is not meant to add secrecy, only a
//! tamper-evidence check independent of asymmetric verification once the
//! holder has decided no further attenuation will happen. `Token::append`
//! refuses on a sealed token at the API level (`spec.md` §4.6); the MAC
//! itself does not need to enforce that.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::{CryptoRng, RngCore};

use crate::error::CryptoError;

/// A freshly generated keypair used as the root of trust for a token, or
/// as one of the ephemeral per-block keys in the signature chain.
pub struct KeyPair {
    pub signing_key: SigningKey,
}

impl KeyPair {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self { signing_key: SigningKey::generate(rng) }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }
}

/// The signature chain produced while a token is still appendable.
#[derive(Clone, Debug, PartialEq)]
pub struct SignedEnvelope {
    /// Ephemeral public keys, one per block after the first: `next_keys[i]`
    /// is the key whose secret counterpart signed block `i + 1`.
    pub next_keys: Vec<VerifyingKey>,
    /// One signature per block, in block order.
    pub signatures: Vec<Signature>,
}

/// The terminal, symmetric envelope produced by `Token::seal`.
#[derive(Clone, Debug, PartialEq)]
pub struct SealedEnvelope {
    pub mac_key: [u8; 32],
    pub mac: [u8; 32],
}

#[derive(Clone, Debug, PartialEq)]
pub enum Envelope {
    Signed(SignedEnvelope),
    Sealed(SealedEnvelope),
}

/// Build the message signed for block `i`: its payload, plus the next
/// ephemeral public key's bytes unless this is the last block.
fn signed_message(payload: &[u8], next_key: Option<&VerifyingKey>) -> Vec<u8> {
    let mut msg = payload.to_vec();
    if let Some(k) = next_key {
        msg.extend_from_slice(k.as_bytes());
    }
    msg
}

impl SignedEnvelope {
    /// Produce the initial one-block envelope, signing `payload0` with the
    /// root key and generating the first ephemeral "next" keypair.
    pub fn build<R: RngCore + CryptoRng>(
        root: &SigningKey,
        payload0: &[u8],
        rng: &mut R,
    ) -> (Self, KeyPair) {
        let next = KeyPair::generate(rng);
        let msg = signed_message(payload0, Some(&next.verifying_key()));
        let sig = root.sign(&msg);
        (
            SignedEnvelope { next_keys: vec![next.verifying_key()], signatures: vec![sig] },
            next,
        )
    }

    /// Append a signature for `payload_n` (the new last block), signed by
    /// `prev_secret` (the secret half of `self.next_keys.last()`), and
    /// generate the ephemeral keypair for the block after it.
    pub fn append<R: RngCore + CryptoRng>(
        &self,
        prev_secret: &SigningKey,
        payload_n: &[u8],
        rng: &mut R,
    ) -> (Self, KeyPair) {
        let next = KeyPair::generate(rng);
        let msg = signed_message(payload_n, Some(&next.verifying_key()));
        let sig = prev_secret.sign(&msg);
        let mut next_keys = self.next_keys.clone();
        next_keys.push(next.verifying_key());
        let mut signatures = self.signatures.clone();
        signatures.push(sig);
        (SignedEnvelope { next_keys, signatures }, next)
    }

    /// Verify every link in the chain against `root_pub` and `payloads`
    /// (one entry per block, in order).
    pub fn verify(&self, root_pub: &VerifyingKey, payloads: &[Vec<u8>]) -> Result<(), CryptoError> {
        if self.signatures.len() != payloads.len() {
            return Err(CryptoError::InvalidSignature);
        }
        if self.next_keys.len() + 1 != payloads.len() && !payloads.is_empty() {
            return Err(CryptoError::InvalidSignature);
        }
        for (i, payload) in payloads.iter().enumerate() {
            let key = if i == 0 { *root_pub } else { self.next_keys[i - 1] };
            let next = self.next_keys.get(i);
            let msg = signed_message(payload, next);
            key.verify(&msg, &self.signatures[i]).map_err(|_| CryptoError::InvalidSignature)?;
        }
        Ok(())
    }
}

impl SealedEnvelope {
    /// Produce a fresh, randomly-keyed MAC over `payloads` concatenated in
    /// order.
    pub fn seal<R: RngCore + CryptoRng>(payloads: &[Vec<u8>], rng: &mut R) -> Self {
        let mut mac_key = [0u8; 32];
        rng.fill_bytes(&mut mac_key);
        let mac = mac_over(&mac_key, payloads);
        Self { mac_key, mac }
    }

    pub fn verify(&self, payloads: &[Vec<u8>]) -> Result<(), CryptoError> {
        let expected = mac_over(&self.mac_key, payloads);
        if constant_time_eq(&expected, &self.mac) {
            Ok(())
        } else {
            Err(CryptoError::InvalidSignature)
        }
    }
}

fn mac_over(key: &[u8; 32], payloads: &[Vec<u8>]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_keyed(key);
    for p in payloads {
        hasher.update(&(p.len() as u64).to_be_bytes());
        hasher.update(p);
    }
    *hasher.finalize().as_bytes()
}

fn constant_time_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn single_block_envelope_verifies() {
        let root = KeyPair::generate(&mut OsRng);
        let (env, _next) = SignedEnvelope::build(&root.signing_key, b"payload0", &mut OsRng);
        env.verify(&root.verifying_key(), &[b"payload0".to_vec()]).unwrap();
    }

    #[test]
    fn appended_chain_verifies() {
        let root = KeyPair::generate(&mut OsRng);
        let (env0, next0) = SignedEnvelope::build(&root.signing_key, b"payload0", &mut OsRng);
        let (env1, _next1) = env0.append(&next0.signing_key, b"payload1", &mut OsRng);
        env1.verify(&root.verifying_key(), &[b"payload0".to_vec(), b"payload1".to_vec()]).unwrap();
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let root = KeyPair::generate(&mut OsRng);
        let (env, _next) = SignedEnvelope::build(&root.signing_key, b"payload0", &mut OsRng);
        let err = env.verify(&root.verifying_key(), &[b"tampered".to_vec()]).unwrap_err();
        assert_eq!(err, CryptoError::InvalidSignature);
    }

    #[test]
    fn sealed_envelope_detects_tamper() {
        let payloads = vec![b"a".to_vec(), b"b".to_vec()];
        let sealed = SealedEnvelope::seal(&payloads, &mut OsRng);
        sealed.verify(&payloads).unwrap();
        let tampered = vec![b"a".to_vec(), b"c".to_vec()];
        assert!(sealed.verify(&tampered).is_err());
    }
}
