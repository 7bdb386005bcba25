// src/rpc.rs
use std::sync::Arc;

use ethers::types::{Address, H256, U256};
use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::types::error::{ErrorObject, ErrorObjectOwned};
use tracing::{debug, error, info};

use crate::builder::SignedUserOperation;
use crate::error::UserOpError;
use crate::service::MultisigService;
use crate::types::{PartialUserOperation, UserOperation, ValidationResult};

#[rpc(server, namespace = "msig")]
pub trait MultisigRpc {
    /// Hash the configured signers sign for this operation
    #[method(name = "getUserOperationHash")]
    async fn user_operation_hash(&self, user_op: UserOperation) -> RpcResult<H256>;

    /// Counterfactual address of the account owned by `owners`
    #[method(name = "getAccountAddress")]
    async fn account_address(&self, owners: Vec<Address>, salt: U256) -> RpcResult<Address>;

    /// Fills and co-signs a user operation with every configured signer
    #[method(name = "signUserOperation")]
    async fn sign(&self, user_op: PartialUserOperation) -> RpcResult<SignedUserOperation>;

    #[method(name = "verifyUserOperation")]
    async fn verify(&self, user_op: UserOperation) -> RpcResult<ValidationResult>;
}

pub struct MultisigRpcImpl {
    service: Arc<MultisigService>,
}

impl MultisigRpcImpl {
    pub fn new(service: Arc<MultisigService>) -> Self {
        Self { service }
    }
}

fn rpc_error(e: UserOpError) -> ErrorObjectOwned {
    ErrorObject::owned(-32000, format!("Multisig error: {}", e), None::<()>)
}

#[async_trait]
impl MultisigRpcServer for MultisigRpcImpl {
    async fn user_operation_hash(&self, user_op: UserOperation) -> RpcResult<H256> {
        Ok(self.service.user_op_hash(&user_op))
    }

    async fn account_address(&self, owners: Vec<Address>, salt: U256) -> RpcResult<Address> {
        self.service
            .account_address(&owners, salt)
            .map_err(|e| rpc_error(e).into())
    }

    async fn sign(&self, user_op: PartialUserOperation) -> RpcResult<SignedUserOperation> {
        debug!("Received sign request for sender: {:?}", user_op.sender);

        match self.service.sign_user_operation(user_op).await {
            Ok(signed) => {
                info!("Signed operation for {:?}", signed.sender);
                Ok(signed)
            }
            Err(e) => {
                error!("Failed to sign operation: {}", e);
                Err(rpc_error(e).into())
            }
        }
    }

    async fn verify(&self, user_op: UserOperation) -> RpcResult<ValidationResult> {
        Ok(self.service.verify_user_operation(&user_op))
    }
}
