// src/builder.rs
use std::ops::Deref;
use std::sync::Arc;

use ethers::types::{Address, Bytes, H256, U256};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::chain::ChainClient;
use crate::codec;
use crate::error::{Result, UserOpError};
use crate::keys::KeyProvider;
use crate::multisig::{self, SignerSet};
use crate::resolver::{self, AddressResolver};
use crate::types::{Field, OperationOutcome, PartialUserOperation, UserOperation};

const ADDRESS_LENGTH: usize = 20;

/// A user operation whose signature has been attached. It only hands out
/// shared references, so the signed fields cannot drift from the hash the
/// signature commits to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SignedUserOperation(UserOperation);

impl SignedUserOperation {
    pub fn into_inner(self) -> UserOperation {
        self.0
    }
}

impl Deref for SignedUserOperation {
    type Target = UserOperation;

    fn deref(&self) -> &UserOperation {
        &self.0
    }
}

impl AsRef<UserOperation> for SignedUserOperation {
    fn as_ref(&self) -> &UserOperation {
        &self.0
    }
}

/// Merges `partial` over `defaults` and checks the opaque byte fields.
pub fn build(partial: PartialUserOperation, defaults: &UserOperation) -> Result<UserOperation> {
    let op = partial.fill(defaults);
    check_prefixed("initCode", &op.init_code)?;
    check_prefixed("paymasterAndData", &op.paymaster_and_data)?;
    Ok(op)
}

// Non-empty initCode and paymasterAndData start with a 20-byte address.
fn check_prefixed(field: &'static str, value: &Bytes) -> Result<()> {
    if !value.is_empty() && value.len() < ADDRESS_LENGTH {
        return Err(UserOpError::MalformedField {
            field,
            reason: format!("{} bytes is shorter than an address prefix", value.len()),
        });
    }
    Ok(())
}

/// Signs `op` with every key of `keys` and returns a signed copy. `op`
/// itself is left untouched whether or not signing succeeds.
pub async fn authorize<K: KeyProvider + ?Sized>(
    op: &UserOperation,
    entry_point: Address,
    chain_id: u64,
    keys: &K,
) -> Result<SignedUserOperation> {
    let domain_hash = codec::domain_hash(op, entry_point, chain_id);
    let signature = multisig::sign(domain_hash, keys).await?;

    let mut signed = op.clone();
    signed.signature = signature;
    Ok(SignedUserOperation(signed))
}

/// Checks `op.signature` the way the verifying entry point would.
pub fn verify_operation(
    op: &UserOperation,
    entry_point: Address,
    chain_id: u64,
    signers: &SignerSet,
) -> Result<()> {
    let domain_hash = codec::domain_hash(op, entry_point, chain_id);
    multisig::verify(domain_hash, &op.signature, signers)
}

/// Builds, authorizes and submits operations for one entry point on one chain.
pub struct OperationBuilder<C: ?Sized> {
    chain: Arc<C>,
    entry_point: Address,
    chain_id: u64,
    resolver: AddressResolver,
    defaults: UserOperation,
}

impl<C: ChainClient + ?Sized> OperationBuilder<C> {
    pub fn new(chain: Arc<C>, entry_point: Address, chain_id: u64, resolver: AddressResolver) -> Self {
        Self {
            chain,
            entry_point,
            chain_id,
            resolver,
            defaults: UserOperation::default(),
        }
    }

    /// Like [`OperationBuilder::new`], with the chain id taken from the node.
    pub async fn connect(chain: Arc<C>, entry_point: Address, resolver: AddressResolver) -> Result<Self> {
        let chain_id = chain.chain_id().await?;
        info!("Connected to chain {} with entry point {:?}", chain_id, entry_point);
        Ok(Self::new(chain, entry_point, chain_id, resolver))
    }

    pub fn with_defaults(mut self, defaults: UserOperation) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn entry_point(&self) -> Address {
        self.entry_point
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn resolver(&self) -> &AddressResolver {
        &self.resolver
    }

    pub fn chain(&self) -> &C {
        &self.chain
    }

    pub fn user_op_hash(&self, op: &UserOperation) -> H256 {
        codec::domain_hash(op, self.entry_point, self.chain_id)
    }

    pub fn build(&self, partial: PartialUserOperation) -> Result<UserOperation> {
        build(partial, &self.defaults)
    }

    /// Current entry point nonce of `sender` under key 0.
    pub async fn nonce(&self, sender: Address) -> Result<U256> {
        let data = codec::encode_get_nonce(sender, U256::zero());
        let result = self.chain.call(self.entry_point, data).await?;
        codec::decode_nonce(&result)
    }

    /// Builds an operation for the account owned by `owners` under `salt`.
    ///
    /// The sender is resolved first. `initCode` is attached only when no code
    /// exists at the sender yet, and `nonce` is read from the entry point;
    /// either is left alone when the caller provided it.
    pub async fn build_for_account(
        &self,
        owners: &[Address],
        salt: U256,
        mut partial: PartialUserOperation,
    ) -> Result<UserOperation> {
        let sender = self.resolver.resolve(owners, salt)?;
        if let Some(provided) = partial.sender.as_provided() {
            if *provided != sender {
                return Err(UserOpError::InvalidParameters(format!(
                    "sender {provided:?} does not match resolved account {sender:?}"
                )));
            }
        }
        partial.sender = Field::Provided(sender);

        if partial.init_code.is_default() && !resolver::exists(&*self.chain, sender).await? {
            debug!("Account {:?} not deployed, attaching initCode", sender);
            partial.init_code = Field::Provided(self.resolver.init_code(owners, salt)?);
        }

        if partial.nonce.is_default() {
            partial.nonce = Field::Provided(self.nonce(sender).await?);
        }

        self.build(partial)
    }

    pub async fn authorize<K: KeyProvider + ?Sized>(
        &self,
        op: &UserOperation,
        keys: &K,
    ) -> Result<SignedUserOperation> {
        let signed = authorize(op, self.entry_point, self.chain_id, keys).await?;
        info!("Authorized operation {:?} for {:?}", self.user_op_hash(&signed), signed.sender);
        Ok(signed)
    }

    /// Hands `op` to the entry point and reports its outcome.
    pub async fn submit(&self, op: &SignedUserOperation, beneficiary: Address) -> Result<OperationOutcome> {
        let operation: &UserOperation = op;
        let receipt = self
            .chain
            .handle_ops(self.entry_point, std::slice::from_ref(operation), beneficiary)
            .await?;
        let op_hash = self.user_op_hash(op);

        if !op.init_code.is_empty() && !resolver::exists(&*self.chain, op.sender).await? {
            warn!("initCode of {:?} did not instantiate the account", op_hash);
            return Err(UserOpError::UnresolvedAccount(op.sender));
        }

        let outcome = receipt
            .outcomes
            .into_iter()
            .find(|outcome| outcome.user_op_hash == op_hash)
            .ok_or_else(|| {
                UserOpError::TransactionReverted(format!(
                    "no UserOperationEvent for {op_hash:?} in {:?}",
                    receipt.transaction_hash
                ))
            })?;

        if !outcome.success {
            return Err(UserOpError::TransactionReverted(format!(
                "operation {op_hash:?} failed in {:?}",
                receipt.transaction_hash
            )));
        }

        info!("Operation {:?} executed, gas cost {}", op_hash, outcome.actual_gas_cost);
        Ok(outcome)
    }
}
