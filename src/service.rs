// src/service.rs
use std::sync::Arc;

use ethers::types::{Address, H256, U256};
use tracing::{debug, info, warn};

use crate::builder::{self, OperationBuilder, SignedUserOperation};
use crate::chain::ChainClient;
use crate::error::Result;
use crate::keys::KeyProvider;
use crate::multisig::SignerSet;
use crate::types::{PartialUserOperation, UserOperation, ValidationResult};

/// Co-signing service: holds an ordered set of signer keys and authorizes
/// operations for one entry point on one chain.
pub struct MultisigService {
    builder: OperationBuilder<dyn ChainClient>,
    keys: Arc<dyn KeyProvider>,
    signers: SignerSet,
}

impl MultisigService {
    pub fn new(builder: OperationBuilder<dyn ChainClient>, keys: Arc<dyn KeyProvider>) -> Result<Self> {
        let signers = SignerSet::new(keys.identities())?;
        info!(
            "Initialized multisig service with {} signers on chain {}",
            signers.threshold(),
            builder.chain_id()
        );
        for (position, signer) in signers.signers().iter().enumerate() {
            debug!("Signer {}: {:?}", position, signer);
        }

        Ok(Self {
            builder,
            keys,
            signers,
        })
    }

    pub fn signers(&self) -> &SignerSet {
        &self.signers
    }

    pub fn user_op_hash(&self, user_op: &UserOperation) -> H256 {
        self.builder.user_op_hash(user_op)
    }

    pub fn account_address(&self, owners: &[Address], salt: U256) -> Result<Address> {
        self.builder.resolver().resolve(owners, salt)
    }

    /// Fills `partial` over the defaults and signs it with every configured key.
    pub async fn sign_user_operation(&self, partial: PartialUserOperation) -> Result<SignedUserOperation> {
        let user_op = self.builder.build(partial)?;
        self.builder.authorize(&user_op, self.keys.as_ref()).await
    }

    pub fn verify_user_operation(&self, user_op: &UserOperation) -> ValidationResult {
        match builder::verify_operation(
            user_op,
            self.builder.entry_point(),
            self.builder.chain_id(),
            &self.signers,
        ) {
            Ok(()) => ValidationResult {
                valid: true,
                reason: None,
            },
            Err(e) => {
                warn!("Rejected signature for {:?}: {}", user_op.sender, e);
                ValidationResult {
                    valid: false,
                    reason: Some(e.to_string()),
                }
            }
        }
    }
}
