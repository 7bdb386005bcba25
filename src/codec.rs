// src/codec.rs
//! Canonical encoding and hashing of user operations.
//!
//! The operation hash is `keccak256(abi.encode(...))` over every field except
//! `signature`, with the three opaque byte fields replaced by their keccak256
//! digests. The value signers actually sign is the domain hash, which binds
//! that operation hash to an entry point address and a chain id.

use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, Bytes, Log, H256, U256};
use ethers::utils::{hash_message, id, keccak256};

use crate::error::{Result, UserOpError};
use crate::types::{OperationOutcome, UserOperation};

pub const EXECUTE_SIGNATURE: &str = "execute(address,uint256,bytes)";
pub const GET_NONCE_SIGNATURE: &str = "getNonce(address,uint192)";
pub const HANDLE_OPS_SIGNATURE: &str = "handleOps((address,uint256,bytes,bytes,uint256,uint256,uint256,uint256,uint256,bytes,bytes)[],address)";
pub const USER_OPERATION_EVENT_SIGNATURE: &str =
    "UserOperationEvent(bytes32,address,address,uint256,bool,uint256,uint256)";

/// The hashed form of a [`UserOperation`]: byte fields are already digests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedUserOperation {
    pub sender: Address,
    pub nonce: U256,
    pub init_code_hash: H256,
    pub call_data_hash: H256,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub paymaster_and_data_hash: H256,
}

impl From<&UserOperation> for PackedUserOperation {
    fn from(op: &UserOperation) -> Self {
        Self {
            sender: op.sender,
            nonce: op.nonce,
            init_code_hash: H256(keccak256(&op.init_code)),
            call_data_hash: H256(keccak256(&op.call_data)),
            call_gas_limit: op.call_gas_limit,
            verification_gas_limit: op.verification_gas_limit,
            pre_verification_gas: op.pre_verification_gas,
            max_fee_per_gas: op.max_fee_per_gas,
            max_priority_fee_per_gas: op.max_priority_fee_per_gas,
            paymaster_and_data_hash: H256(keccak256(&op.paymaster_and_data)),
        }
    }
}

impl PackedUserOperation {
    fn param_types() -> [ParamType; 10] {
        [
            ParamType::Address,
            ParamType::Uint(256),
            ParamType::FixedBytes(32),
            ParamType::FixedBytes(32),
            ParamType::Uint(256),
            ParamType::Uint(256),
            ParamType::Uint(256),
            ParamType::Uint(256),
            ParamType::Uint(256),
            ParamType::FixedBytes(32),
        ]
    }

    pub fn encode(&self) -> Bytes {
        abi::encode(&[
            Token::Address(self.sender),
            Token::Uint(self.nonce),
            Token::FixedBytes(self.init_code_hash.as_bytes().to_vec()),
            Token::FixedBytes(self.call_data_hash.as_bytes().to_vec()),
            Token::Uint(self.call_gas_limit),
            Token::Uint(self.verification_gas_limit),
            Token::Uint(self.pre_verification_gas),
            Token::Uint(self.max_fee_per_gas),
            Token::Uint(self.max_priority_fee_per_gas),
            Token::FixedBytes(self.paymaster_and_data_hash.as_bytes().to_vec()),
        ])
        .into()
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let tokens = abi::decode(&Self::param_types(), data)
            .map_err(|e| UserOpError::InvalidParameters(format!("packed operation: {e}")))?;
        let mut tokens = tokens.into_iter();
        let mut next = || {
            tokens
                .next()
                .ok_or_else(|| UserOpError::InvalidParameters("packed operation truncated".into()))
        };

        Ok(Self {
            sender: address_token(next()?)?,
            nonce: uint_token(next()?)?,
            init_code_hash: word_token(next()?)?,
            call_data_hash: word_token(next()?)?,
            call_gas_limit: uint_token(next()?)?,
            verification_gas_limit: uint_token(next()?)?,
            pre_verification_gas: uint_token(next()?)?,
            max_fee_per_gas: uint_token(next()?)?,
            max_priority_fee_per_gas: uint_token(next()?)?,
            paymaster_and_data_hash: word_token(next()?)?,
        })
    }
}

/// Canonical bytes of `op`, excluding its signature.
pub fn pack(op: &UserOperation) -> Bytes {
    PackedUserOperation::from(op).encode()
}

pub fn unpack(data: &[u8]) -> Result<PackedUserOperation> {
    PackedUserOperation::decode(data)
}

pub fn hash(op: &UserOperation) -> H256 {
    H256(keccak256(pack(op)))
}

/// The value every signer signs: the operation hash bound to a verifying
/// entry point and a chain.
pub fn domain_hash(op: &UserOperation, entry_point: Address, chain_id: u64) -> H256 {
    let encoded = abi::encode(&[
        Token::FixedBytes(hash(op).as_bytes().to_vec()),
        Token::Address(entry_point),
        Token::Uint(U256::from(chain_id)),
    ]);
    H256(keccak256(encoded))
}

/// `keccak256("\x19Ethereum Signed Message:\n32" ++ hash)`, the digest an
/// ECDSA personal signature over `hash` actually commits to.
pub fn personal_message_hash(hash: H256) -> H256 {
    hash_message(hash.as_bytes())
}

/// Call data for the account's `execute(address,uint256,bytes)`.
pub fn encode_execute(to: Address, value: U256, data: Bytes) -> Bytes {
    encode_call(
        EXECUTE_SIGNATURE,
        &[Token::Address(to), Token::Uint(value), Token::Bytes(data.to_vec())],
    )
}

pub fn encode_get_nonce(sender: Address, key: U256) -> Bytes {
    encode_call(GET_NONCE_SIGNATURE, &[Token::Address(sender), Token::Uint(key)])
}

pub fn decode_nonce(data: &[u8]) -> Result<U256> {
    let tokens = abi::decode(&[ParamType::Uint(256)], data)
        .map_err(|e| UserOpError::EthereumProviderError(format!("getNonce result: {e}")))?;
    tokens
        .into_iter()
        .next()
        .ok_or_else(|| UserOpError::EthereumProviderError("empty getNonce result".into()))
        .and_then(uint_token)
}

pub fn encode_handle_ops(ops: &[UserOperation], beneficiary: Address) -> Bytes {
    let ops = ops
        .iter()
        .map(|op| {
            Token::Tuple(vec![
                Token::Address(op.sender),
                Token::Uint(op.nonce),
                Token::Bytes(op.init_code.to_vec()),
                Token::Bytes(op.call_data.to_vec()),
                Token::Uint(op.call_gas_limit),
                Token::Uint(op.verification_gas_limit),
                Token::Uint(op.pre_verification_gas),
                Token::Uint(op.max_fee_per_gas),
                Token::Uint(op.max_priority_fee_per_gas),
                Token::Bytes(op.paymaster_and_data.to_vec()),
                Token::Bytes(op.signature.to_vec()),
            ])
        })
        .collect();
    encode_call(HANDLE_OPS_SIGNATURE, &[Token::Array(ops), Token::Address(beneficiary)])
}

pub fn user_operation_event_topic() -> H256 {
    H256(keccak256(USER_OPERATION_EVENT_SIGNATURE))
}

/// Decodes a `UserOperationEvent` log. Returns `None` for any other log.
pub fn decode_user_operation_event(log: &Log) -> Result<Option<OperationOutcome>> {
    if log.topics.len() != 4 || log.topics[0] != user_operation_event_topic() {
        return Ok(None);
    }

    let tokens = abi::decode(
        &[ParamType::Uint(256), ParamType::Bool, ParamType::Uint(256), ParamType::Uint(256)],
        &log.data,
    )
    .map_err(|e| UserOpError::EthereumProviderError(format!("UserOperationEvent: {e}")))?;
    let [nonce, success, actual_gas_cost, actual_gas_used]: [Token; 4] = tokens
        .try_into()
        .map_err(|_| UserOpError::EthereumProviderError("UserOperationEvent arity".into()))?;

    Ok(Some(OperationOutcome {
        user_op_hash: log.topics[1],
        sender: topic_address(log.topics[2]),
        paymaster: topic_address(log.topics[3]),
        nonce: uint_token(nonce)?,
        success: success.into_bool().unwrap_or(false),
        actual_gas_cost: uint_token(actual_gas_cost)?,
        actual_gas_used: uint_token(actual_gas_used)?,
    }))
}

pub(crate) fn encode_call(signature: &str, args: &[Token]) -> Bytes {
    let mut data = id(signature).to_vec();
    data.extend_from_slice(&abi::encode(args));
    data.into()
}

pub(crate) fn word(value: U256) -> [u8; 32] {
    let mut out = [0u8; 32];
    value.to_big_endian(&mut out);
    out
}

fn topic_address(topic: H256) -> Address {
    Address::from_slice(&topic.as_bytes()[12..])
}

fn address_token(token: Token) -> Result<Address> {
    token
        .into_address()
        .ok_or_else(|| UserOpError::InvalidParameters("expected address".into()))
}

fn uint_token(token: Token) -> Result<U256> {
    token
        .into_uint()
        .ok_or_else(|| UserOpError::InvalidParameters("expected uint256".into()))
}

fn word_token(token: Token) -> Result<H256> {
    token
        .into_fixed_bytes()
        .filter(|bytes| bytes.len() == 32)
        .map(|bytes| H256::from_slice(&bytes))
        .ok_or_else(|| UserOpError::InvalidParameters("expected bytes32".into()))
}
