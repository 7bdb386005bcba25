// src/chain.rs
use async_trait::async_trait;
use ethers::prelude::*;
use ethers::types::transaction::eip2718::TypedTransaction;
use tracing::{debug, info};

use crate::codec;
use crate::error::{Result, UserOpError};
use crate::types::{SubmissionReceipt, UserOperation};

/// The blockchain runtime: code lookups, read-only calls, and execution of
/// authorized operations through an entry point.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn chain_id(&self) -> Result<u64>;

    async fn code_at(&self, address: Address) -> Result<Bytes>;

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes>;

    async fn handle_ops(
        &self,
        entry_point: Address,
        ops: &[UserOperation],
        beneficiary: Address,
    ) -> Result<SubmissionReceipt>;
}

/// JSON-RPC node client. Submitting operations needs a funded bundler key.
#[derive(Debug, Clone)]
pub struct RpcChain<P = Http> {
    provider: Provider<P>,
    bundler: Option<LocalWallet>,
}

impl RpcChain<Http> {
    pub fn new(eth_rpc_url: &str) -> Result<Self> {
        let provider = Provider::<Http>::try_from(eth_rpc_url)
            .map_err(|e| UserOpError::InvalidParameters(format!("rpc url: {e}")))?;
        Ok(Self::from_provider(provider))
    }
}

impl<P: JsonRpcClient> RpcChain<P> {
    pub fn from_provider(provider: Provider<P>) -> Self {
        Self {
            provider,
            bundler: None,
        }
    }

    pub fn with_bundler(mut self, wallet: LocalWallet) -> Self {
        info!("Submitting operations from bundler {:?}", wallet.address());
        self.bundler = Some(wallet);
        self
    }
}

#[async_trait]
impl<P: JsonRpcClient + Clone + 'static> ChainClient for RpcChain<P> {
    async fn chain_id(&self) -> Result<u64> {
        let chain_id = self
            .provider
            .get_chainid()
            .await
            .map_err(|e| UserOpError::EthereumProviderError(e.to_string()))?;
        u64::try_from(chain_id)
            .map_err(|_| UserOpError::EthereumProviderError(format!("chain id {chain_id} exceeds 64 bits")))
    }

    async fn code_at(&self, address: Address) -> Result<Bytes> {
        self.provider
            .get_code(address, None)
            .await
            .map_err(|e| UserOpError::EthereumProviderError(e.to_string()))
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
        self.provider
            .call(&tx, None)
            .await
            .map_err(|e| UserOpError::EthereumProviderError(e.to_string()))
    }

    async fn handle_ops(
        &self,
        entry_point: Address,
        ops: &[UserOperation],
        beneficiary: Address,
    ) -> Result<SubmissionReceipt> {
        let bundler = self
            .bundler
            .clone()
            .ok_or_else(|| UserOpError::InvalidParameters("no bundler key configured".into()))?;
        let chain_id = self.chain_id().await?;
        let client = SignerMiddleware::new(self.provider.clone(), bundler.with_chain_id(chain_id));

        let tx = TransactionRequest::new()
            .to(entry_point)
            .data(codec::encode_handle_ops(ops, beneficiary));
        let pending = client
            .send_transaction(tx, None)
            .await
            .map_err(|e| UserOpError::EthereumProviderError(e.to_string()))?;
        debug!("handleOps sent: {:?}", pending.tx_hash());

        let receipt = pending
            .await
            .map_err(|e| UserOpError::EthereumProviderError(e.to_string()))?
            .ok_or_else(|| UserOpError::TransactionReverted("handleOps dropped".into()))?;
        submission_receipt(entry_point, &receipt)
    }
}

/// Reads the per-operation outcomes out of a mined `handleOps` receipt.
/// Only events emitted by `entry_point` count.
pub fn submission_receipt(entry_point: Address, receipt: &TransactionReceipt) -> Result<SubmissionReceipt> {
    if receipt.status != Some(U64::from(1)) {
        return Err(UserOpError::TransactionReverted(format!(
            "handleOps {:?} failed",
            receipt.transaction_hash
        )));
    }

    let mut outcomes = Vec::new();
    for log in receipt.logs.iter().filter(|log| log.address == entry_point) {
        if let Some(outcome) = codec::decode_user_operation_event(log)? {
            outcomes.push(outcome);
        }
    }

    Ok(SubmissionReceipt {
        transaction_hash: receipt.transaction_hash,
        outcomes,
    })
}
