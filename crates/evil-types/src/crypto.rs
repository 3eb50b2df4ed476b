// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::fmt;

use ed25519_consensus::{SigningKey, VerificationKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::base_types::{digest, fixed_bytes, Address};
use crate::error::{BuildError, CryptoError};

/// Seed of a deterministic address space.
pub type Seed = [u8; 32];

const KEY_DERIVATION_DOMAIN: &[u8] = b"evil-tools/ed25519/";

pub fn random_seed() -> Seed {
    let mut seed = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut seed);
    seed
}

fixed_bytes!(PublicKey, 32);
fixed_bytes!(Signature, 64);

impl PublicKey {
    /// The address unlocked by signatures of this key.
    pub fn to_address(&self) -> Address {
        Address::new(digest(self.as_bytes()))
    }

    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), CryptoError> {
        let key = VerificationKey::try_from(*self.as_bytes())
            .map_err(|_| CryptoError::InvalidPublicKey)?;
        let signature = ed25519_consensus::Signature::from(*signature.as_bytes());
        key.verify(&signature, message)
            .map_err(|_| CryptoError::InvalidSignature)
    }
}

/// Ed25519 key pair derived from a seed and an address index.
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    pub fn from_seed(seed: &Seed, index: u64) -> Self {
        let mut material = Vec::with_capacity(KEY_DERIVATION_DOMAIN.len() + 40);
        material.extend_from_slice(KEY_DERIVATION_DOMAIN);
        material.extend_from_slice(seed);
        material.extend_from_slice(&index.to_be_bytes());
        Self {
            signing_key: SigningKey::from(digest(&material)),
        }
    }

    pub fn generate() -> Self {
        Self::from_seed(&random_seed(), 0)
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::new(self.signing_key.verification_key().to_bytes())
    }

    pub fn address(&self) -> Address {
        self.public_key().to_address()
    }

    pub fn sign(&self, message: &[u8]) -> SignatureUnlock {
        SignatureUnlock {
            public_key: self.public_key(),
            signature: Signature::new(self.signing_key.sign(message).to_bytes()),
        }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPair({})", self.public_key())
    }
}

/// A signature together with the public key that produced it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureUnlock {
    pub public_key: PublicKey,
    pub signature: Signature,
}

impl SignatureUnlock {
    /// Check the signature over `message` and that the key unlocks `address`.
    pub fn verify(&self, address: &Address, message: &[u8]) -> Result<(), CryptoError> {
        if self.public_key.to_address() != *address {
            return Err(CryptoError::AddressMismatch(*address));
        }
        self.public_key.verify(message, &self.signature)
    }
}

/// Signs on behalf of the addresses it holds keys for.
pub trait AddressSigner {
    fn sign_for(&self, address: &Address, message: &[u8]) -> Result<SignatureUnlock, BuildError>;
}

#[derive(Clone, Debug)]
pub struct AddressKeys {
    pub address: Address,
    pub keys: KeyPair,
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryAddressSigner {
    keys: HashMap<Address, KeyPair>,
}

impl InMemoryAddressSigner {
    pub fn new(keys: impl IntoIterator<Item = AddressKeys>) -> Self {
        Self {
            keys: keys.into_iter().map(|k| (k.address, k.keys)).collect(),
        }
    }
}

impl AddressSigner for InMemoryAddressSigner {
    fn sign_for(&self, address: &Address, message: &[u8]) -> Result<SignatureUnlock, BuildError> {
        self.keys
            .get(address)
            .map(|keys| keys.sign(message))
            .ok_or(BuildError::MissingKey(*address))
    }
}
