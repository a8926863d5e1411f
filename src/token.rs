//! `Token`: the append-only chain of blocks plus its signature envelope.
//!
//! State machine (`spec.md` §4.6): `Built -> Serialized -> Unmarshalled ->
//! {Appended, Sealed, Verified}`. We don't encode this as a typestate (the
//! teacher crate doesn't use typestates for its own multi-phase pipelines
//! either, e.g. `scheduler.rs`'s phases are plain enum-driven); instead each
//! operation is a method that fails with a `CryptoError` if the token isn't
//! in the right state (sealed, or missing the in-memory append secret).

use ed25519_dalek::{Signature, SigningKey, VerifyingKey};
use rand_core::{CryptoRng, RngCore};

use crate::block::{Block, CURRENT_VERSION};
use crate::builder::BlockBuilder;
use crate::crypto::{Envelope, SealedEnvelope, SignedEnvelope};
use crate::error::{CryptoError, FormatError, Result, WarrantError};
use crate::wire::{self, EnvelopeVariant, SealedMsg, SignedMsg, TokenMessage};

pub struct Token {
    blocks: Vec<Block>,
    envelope: Envelope,
    /// The secret half of the last `Signed` envelope entry's ephemeral
    /// public key, kept only in memory. `None` once sealed, or once the
    /// token has been through a serialize/unmarshal round trip (see module
    /// doc comment).
    next_signing_key: Option<SigningKey>,
}

impl Token {
    pub(crate) fn build<R: RngCore + CryptoRng>(
        root: SigningKey,
        authority_block: Block,
        rng: &mut R,
    ) -> Result<Token> {
        let payload0 = wire::encode_block(&authority_block);
        let (env, next) = SignedEnvelope::build(&root, &payload0, rng);
        Ok(Token {
            blocks: vec![authority_block],
            envelope: Envelope::Signed(env),
            next_signing_key: Some(next.signing_key),
        })
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// The `context` string carried by block `index`, if it exists.
    pub fn context(&self, index: usize) -> Option<&str> {
        self.blocks.get(index).map(|b| b.context.as_str())
    }

    fn payloads(&self) -> Vec<Vec<u8>> {
        self.blocks.iter().map(wire::encode_block).collect()
    }

    /// Encode the full token: per-block opaque payloads plus the envelope.
    pub fn serialize(&self) -> Vec<u8> {
        let envelope = match &self.envelope {
            Envelope::Signed(s) => EnvelopeVariant::Signed(SignedMsg {
                next_keys: s.next_keys.iter().map(|k| k.to_bytes().to_vec()).collect(),
                signatures: s.signatures.iter().map(|s| s.to_bytes().to_vec()).collect(),
            }),
            Envelope::Sealed(s) => {
                EnvelopeVariant::Sealed(SealedMsg { mac_key: s.mac_key.to_vec(), mac: s.mac.to_vec() })
            }
        };
        let msg = TokenMessage {
            root_key_id: None,
            blocks: self.payloads(),
            envelope: Some(envelope),
        };
        prost::Message::encode_to_vec(&msg)
    }

    /// Decode a token from bytes. The returned token can be verified and
    /// sealed, but cannot be appended to (see module doc comment) unless a
    /// further call gives it back its append secret.
    pub fn unmarshal(bytes: &[u8]) -> Result<Token> {
        let msg: TokenMessage =
            prost::Message::decode(bytes).map_err(|e| FormatError::Decode(e.to_string()))?;
        let mut blocks = Vec::with_capacity(msg.blocks.len());
        for payload in &msg.blocks {
            blocks.push(wire::decode_block(payload)?);
        }
        if blocks.is_empty() {
            return Err(WarrantError::Format(FormatError::Decode("token has no blocks".into())));
        }
        for b in &blocks {
            if b.version > CURRENT_VERSION {
                return Err(WarrantError::Format(FormatError::VersionTooHigh {
                    found: b.version,
                    max: CURRENT_VERSION,
                }));
            }
            b.validate_attenuation()?;
        }
        let envelope = match msg.envelope {
            Some(EnvelopeVariant::Signed(s)) => {
                let next_keys = s
                    .next_keys
                    .iter()
                    .map(|b| decode_verifying_key(b))
                    .collect::<Result<_>>()?;
                let signatures =
                    s.signatures.iter().map(|b| decode_signature(b)).collect::<Result<_>>()?;
                Envelope::Signed(SignedEnvelope { next_keys, signatures })
            }
            Some(EnvelopeVariant::Sealed(s)) => {
                let mac_key = decode_32(&s.mac_key)?;
                let mac = decode_32(&s.mac)?;
                Envelope::Sealed(SealedEnvelope { mac_key, mac })
            }
            None => return Err(WarrantError::Format(FormatError::Decode("token has no envelope".into()))),
        };
        Ok(Token { blocks, envelope, next_signing_key: None })
    }

    /// Begin a new attenuation block, scoped to a fresh symbol table
    /// disjoint from every prior block (`SymbolTable::new` always starts
    /// empty; see `symbol.rs`).
    pub fn create_block(&self) -> BlockBuilder {
        BlockBuilder::new(self.blocks.len() as u32)
    }

    /// Append `block` (from a `BlockBuilder`), producing a new `Token` with
    /// an extended signature chain.
    pub fn append<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        block: BlockBuilder,
    ) -> Result<Token> {
        let Envelope::Signed(signed) = &self.envelope else {
            return Err(WarrantError::Crypto(CryptoError::SealedTokenAppend));
        };
        let Some(secret) = &self.next_signing_key else {
            return Err(WarrantError::Crypto(CryptoError::AppendKeyUnavailable));
        };
        let new_block = block.into_block();
        new_block.validate_attenuation()?;
        let payload_n = wire::encode_block(&new_block);
        let (new_envelope, next) = signed.append(secret, &payload_n, rng);

        let mut blocks = self.blocks.clone();
        blocks.push(new_block);
        Ok(Token {
            blocks,
            envelope: Envelope::Signed(new_envelope),
            next_signing_key: Some(next.signing_key),
        })
    }

    /// Replace the signature chain with a MAC over the concatenated
    /// payloads. Terminal for attenuation: the returned token can no longer
    /// be appended to.
    pub fn seal<R: RngCore + CryptoRng>(&self, rng: &mut R) -> Result<Token> {
        if matches!(self.envelope, Envelope::Sealed(_)) {
            return Err(WarrantError::Crypto(CryptoError::SealedTokenAppend));
        }
        let sealed = SealedEnvelope::seal(&self.payloads(), rng);
        Ok(Token {
            blocks: self.blocks.clone(),
            envelope: Envelope::Sealed(sealed),
            next_signing_key: None,
        })
    }

    /// Verify the envelope — cryptographic chain validity for `Signed`,
    /// the MAC for `Sealed` — and symbol-table disjointness across blocks,
    /// then produce an `Authorizer` over this token.
    pub fn verify(&self, root_pub: &VerifyingKey) -> Result<crate::authorizer::Authorizer> {
        match &self.envelope {
            Envelope::Signed(s) => s.verify(root_pub, &self.payloads())?,
            Envelope::Sealed(s) => s.verify(&self.payloads())?,
        }
        self.check_symbol_disjointness()?;
        Ok(crate::authorizer::Authorizer::new(self.blocks.clone()))
    }

    fn check_symbol_disjointness(&self) -> Result<()> {
        for i in 0..self.blocks.len() {
            for j in (i + 1)..self.blocks.len() {
                if !self.blocks[i].symbols.is_disjoint(&self.blocks[j].symbols) {
                    return Err(WarrantError::Format(FormatError::Decode(format!(
                        "blocks {} and {} share a user-region symbol",
                        i, j
                    ))));
                }
            }
        }
        Ok(())
    }
}

fn decode_verifying_key(bytes: &[u8]) -> Result<VerifyingKey> {
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| WarrantError::Format(FormatError::Decode("bad public key length".into())))?;
    VerifyingKey::from_bytes(&arr)
        .map_err(|_| WarrantError::Crypto(CryptoError::InvalidSignature))
}

fn decode_signature(bytes: &[u8]) -> Result<Signature> {
    let arr: [u8; 64] = bytes
        .try_into()
        .map_err(|_| WarrantError::Format(FormatError::Decode("bad signature length".into())))?;
    Ok(Signature::from_bytes(&arr))
}

fn decode_32(bytes: &[u8]) -> Result<[u8; 32]> {
    bytes
        .try_into()
        .map_err(|_| WarrantError::Format(FormatError::Decode("bad 32-byte field length".into())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::{Fact, Predicate, Term};
    use rand::rngs::OsRng;

    fn fact(name: u64, terms: Vec<Term>) -> Fact {
        Fact::new(Predicate::new(name, terms)).unwrap()
    }

    #[test]
    fn build_serialize_unmarshal_verify_round_trip() {
        let root = SigningKey::generate(&mut OsRng);
        let root_pub = root.verifying_key();
        let mut builder = crate::builder::Builder::new(root);
        builder.add_authority_fact(fact(0, vec![Term::Integer(1)]));
        let token = builder.build(&mut OsRng).unwrap();

        let bytes = token.serialize();
        let restored = Token::unmarshal(&bytes).unwrap();
        restored.verify(&root_pub).unwrap();
    }

    #[test]
    fn append_without_secret_fails() {
        let root = SigningKey::generate(&mut OsRng);
        let mut builder = crate::builder::Builder::new(root);
        builder.add_authority_fact(fact(0, vec![Term::Integer(1)]));
        let token = builder.build(&mut OsRng).unwrap();
        let bytes = token.serialize();
        let restored = Token::unmarshal(&bytes).unwrap();

        let block = restored.create_block();
        let err = restored.append(&mut OsRng, block).unwrap_err();
        assert!(matches!(err, WarrantError::Crypto(CryptoError::AppendKeyUnavailable)));
    }

    #[test]
    fn append_in_process_extends_the_chain() {
        let root = SigningKey::generate(&mut OsRng);
        let root_pub = root.verifying_key();
        let mut builder = crate::builder::Builder::new(root);
        builder.add_authority_fact(fact(0, vec![Term::Integer(1)]));
        let token = builder.build(&mut OsRng).unwrap();

        let mut block = token.create_block();
        block.add_fact(fact(1, vec![Term::Integer(2)]));
        let token2 = token.append(&mut OsRng, block).unwrap();
        assert_eq!(token2.block_count(), 2);
        token2.verify(&root_pub).unwrap();
    }

    #[test]
    fn sealed_token_rejects_append() {
        let root = SigningKey::generate(&mut OsRng);
        let mut builder = crate::builder::Builder::new(root);
        builder.add_authority_fact(fact(0, vec![Term::Integer(1)]));
        let token = builder.build(&mut OsRng).unwrap();
        let sealed = token.seal(&mut OsRng).unwrap();

        let block = sealed.create_block();
        let err = sealed.append(&mut OsRng, block).unwrap_err();
        assert!(matches!(err, WarrantError::Crypto(CryptoError::SealedTokenAppend)));
    }

    #[test]
    fn sealed_token_verifies_via_mac() {
        let root = SigningKey::generate(&mut OsRng);
        let root_pub = root.verifying_key();
        let mut builder = crate::builder::Builder::new(root);
        builder.add_authority_fact(fact(0, vec![Term::Integer(1)]));
        let token = builder.build(&mut OsRng).unwrap();
        let sealed = token.seal(&mut OsRng).unwrap();
        sealed.verify(&root_pub).unwrap();
    }

    #[test]
    fn tampered_block_bytes_fail_verification() {
        let root = SigningKey::generate(&mut OsRng);
        let root_pub = root.verifying_key();
        let mut builder = crate::builder::Builder::new(root);
        builder.add_authority_fact(fact(0, vec![Term::Integer(1)]));
        let token = builder.build(&mut OsRng).unwrap();

        let mut tampered = token;
        tampered.blocks[0].context = "tampered".into();
        assert!(tampered.verify(&root_pub).is_err());
    }

    #[test]
    fn reserialized_token_is_byte_identical() {
        let root = SigningKey::generate(&mut OsRng);
        let mut builder = crate::builder::Builder::new(root);
        builder.add_authority_fact(fact(0, vec![Term::Integer(1)]));
        let token = builder.build(&mut OsRng).unwrap();

        let bytes = token.serialize();
        let restored = Token::unmarshal(&bytes).unwrap();
        assert_eq!(restored.serialize(), bytes);
    }

    #[test]
    fn verify_rejects_a_user_symbol_reused_across_blocks() {
        let root = SigningKey::generate(&mut OsRng);
        let root_pub = root.verifying_key();
        let mut builder = crate::builder::Builder::new(root);
        let tag = builder.intern("shared-tag");
        builder.add_authority_fact(fact(0, vec![tag]));
        let token = builder.build(&mut OsRng).unwrap();

        let mut block = token.create_block();
        block.intern("shared-tag");
        block.add_fact(fact(1, vec![Term::Integer(2)]));
        let token2 = token.append(&mut OsRng, block).unwrap();

        assert!(token2.verify(&root_pub).is_err());
    }
}
