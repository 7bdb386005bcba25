// src/multisig.rs
//! Ordered, all-or-nothing multi-signer authorization.
//!
//! A multisig signature is the concatenation of one 65-byte `r || s || v`
//! personal signature per signer, in the signer set's order. Verification
//! slices it at fixed offsets and recovers each slot against the same hash.

use ethers::types::{Address, Bytes, Signature, H256};
use futures::future::try_join_all;
use tracing::{debug, warn};

use crate::codec::personal_message_hash;
use crate::error::{Result, UserOpError};
use crate::keys::KeyProvider;

pub const SIGNATURE_LENGTH: usize = 65;

/// Expected signer identities in required order. Every listed signer must
/// sign, so the threshold always equals the number of signers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerSet {
    signers: Vec<Address>,
}

impl SignerSet {
    pub fn new(signers: Vec<Address>) -> Result<Self> {
        if signers.is_empty() {
            return Err(UserOpError::InvalidParameters("signer set is empty".into()));
        }
        Ok(Self { signers })
    }

    pub fn signers(&self) -> &[Address] {
        &self.signers
    }

    pub fn threshold(&self) -> usize {
        self.signers.len()
    }

    pub fn signature_length(&self) -> usize {
        self.threshold() * SIGNATURE_LENGTH
    }
}

/// Signs `domain_hash` with every key of `keys` and concatenates the results
/// in key order. Signers run concurrently; nothing is returned unless all
/// of them succeed.
pub async fn sign<K: KeyProvider + ?Sized>(domain_hash: H256, keys: &K) -> Result<Bytes> {
    let count = keys.identities().len();
    if count == 0 {
        return Err(UserOpError::InvalidParameters("no signer keys".into()));
    }

    let signatures =
        try_join_all((0..count).map(|index| keys.sign_personal(index, domain_hash))).await?;

    let mut payload = Vec::with_capacity(count * SIGNATURE_LENGTH);
    for signature in signatures {
        payload.extend_from_slice(&signature.to_vec());
    }
    debug!("Assembled {}-signer signature over {:?}", count, domain_hash);
    Ok(payload.into())
}

/// Recovers one identity per 65-byte slot of `signature`. Like `ecrecover`,
/// only `v` values of 27 and 28 are accepted.
pub fn recover_signers(domain_hash: H256, signature: &[u8]) -> Result<Vec<Address>> {
    if signature.is_empty() {
        return Err(UserOpError::EmptySignature);
    }
    if signature.len() % SIGNATURE_LENGTH != 0 {
        return Err(UserOpError::SignatureLengthMismatch {
            length: signature.len(),
            expected: SIGNATURE_LENGTH,
        });
    }

    let digest = personal_message_hash(domain_hash);
    signature
        .chunks_exact(SIGNATURE_LENGTH)
        .enumerate()
        .map(|(position, chunk)| {
            let v = chunk[SIGNATURE_LENGTH - 1];
            if v != 27 && v != 28 {
                return Err(UserOpError::UnrecoverableSignature {
                    position,
                    reason: format!("invalid v value {v}"),
                });
            }
            Signature::try_from(chunk)
                .and_then(|sig| sig.recover(digest))
                .map_err(|e| UserOpError::UnrecoverableSignature {
                    position,
                    reason: e.to_string(),
                })
        })
        .collect()
}

/// Accepts `signature` only if it carries exactly one slot per expected
/// signer and every slot recovers to the signer at the same position.
pub fn verify(domain_hash: H256, signature: &[u8], expected: &SignerSet) -> Result<()> {
    if signature.is_empty() {
        return Err(UserOpError::EmptySignature);
    }
    if signature.len() != expected.signature_length() {
        warn!(
            "Rejecting signature of {} bytes, {} signers required",
            signature.len(),
            expected.threshold()
        );
        return Err(UserOpError::SignatureLengthMismatch {
            length: signature.len(),
            expected: expected.signature_length(),
        });
    }

    let recovered = recover_signers(domain_hash, signature)?;
    for (position, (found, wanted)) in recovered.into_iter().zip(expected.signers()).enumerate() {
        if found != *wanted {
            warn!("Signer mismatch at position {}: {:?} != {:?}", position, found, wanted);
            return Err(UserOpError::SignerMismatch {
                position,
                expected: *wanted,
                recovered: found,
            });
        }
    }
    Ok(())
}
