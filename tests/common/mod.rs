// tests/common/mod.rs
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::id;

use multisig_userop::builder::verify_operation;
use multisig_userop::chain::ChainClient;
use multisig_userop::codec;
use multisig_userop::error::{Result, UserOpError};
use multisig_userop::types::{OperationOutcome, SubmissionReceipt, UserOperation};
use multisig_userop::{AddressResolver, KeyProvider, LocalKeys, OperationBuilder, SignerSet};

pub const CHAIN_ID: u64 = 31337;
pub const KEY_A: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const KEY_B: &str = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

pub fn entry_point() -> Address {
    "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789".parse().unwrap()
}

pub fn resolver() -> AddressResolver {
    AddressResolver::new(
        "0x9406Cc6185a346906296840746125a0E44976454".parse().unwrap(),
        Address::repeat_byte(0x1a),
        Bytes::from(vec![0x60, 0x80, 0x60, 0x40, 0x52, 0x34, 0x80, 0x15]),
    )
}

pub fn keys(order: &[&str]) -> LocalKeys {
    LocalKeys::from_private_keys(order).unwrap()
}

/// Accounts the factory deploys for owners `[KEY_A, KEY_B]`, by salt. The
/// addresses were computed independently with CREATE2 over `resolver()`.
pub const ACCOUNTS: [(u64, &str); 5] = [
    (1, "0x077A46106D92802c84D07A217Cfd8483326EBDa1"),
    (2, "0xBF678989739f422550a8bc15B4BcF2BD0313E599"),
    (3, "0xD1F705A56Ae6a16203b20Af5d8BaC7eF2e9829e5"),
    (4, "0xf9714bD085a8b48C61771385EB0425E2AeA9CFaB"),
    (5, "0x2B6A23761304291963E232eC5E77Cc751A3337CA"),
];

pub fn account(salt: u64) -> Address {
    let (_, address) = ACCOUNTS.iter().find(|(s, _)| *s == salt).unwrap();
    address.parse().unwrap()
}

/// What the entry point reports for each executed operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Execution {
    Succeeds,
    /// The account call reverts; the event carries `success: false`.
    Reverts,
    /// The transaction lands without any `UserOperationEvent`.
    Silent,
}

#[derive(Clone, Default)]
struct State {
    accounts: HashMap<(Vec<Address>, U256), Address>,
    code: HashMap<Address, Bytes>,
    nonces: HashMap<Address, U256>,
    owners: HashMap<Address, SignerSet>,
    submissions: u64,
}

/// In-memory entry point and factory. Accounts are instantiated from
/// `initCode`, and signatures are checked against the owners recorded at
/// instantiation.
pub struct MockChain {
    factory: Address,
    deploys_accounts: bool,
    execution: Execution,
    state: Mutex<State>,
}

impl MockChain {
    pub fn new() -> Self {
        let owners = keys(&[KEY_A, KEY_B]).identities();
        let mut state = State::default();
        for (salt, _) in ACCOUNTS {
            state.accounts.insert((owners.clone(), U256::from(salt)), account(salt));
        }

        Self {
            factory: resolver().factory,
            deploys_accounts: true,
            execution: Execution::Succeeds,
            state: Mutex::new(state),
        }
    }

    /// A factory whose `createAccount` silently does nothing.
    pub fn without_deployment() -> Self {
        Self {
            deploys_accounts: false,
            ..Self::new()
        }
    }

    pub fn with_execution(execution: Execution) -> Self {
        Self {
            execution,
            ..Self::new()
        }
    }

    pub fn builder(self: &Arc<Self>) -> OperationBuilder<MockChain> {
        OperationBuilder::new(self.clone(), entry_point(), CHAIN_ID, resolver())
    }

    fn deploy(&self, state: &mut State, op: &UserOperation) -> Result<()> {
        let init_code = &op.init_code;
        if init_code[..20] != self.factory.as_bytes()[..] {
            return Err(UserOpError::TransactionReverted("AA13 initCode failed".into()));
        }

        let owner_count = (init_code.len() - 24) / 32 - 1;
        let mut params = vec![ParamType::Address; owner_count];
        params.push(ParamType::Uint(256));
        let mut tokens = abi::decode(&params, &init_code[24..])
            .map_err(|e| UserOpError::TransactionReverted(format!("AA13 {e}")))?;
        let salt = tokens.pop().and_then(Token::into_uint).unwrap();
        let owners: Vec<Address> = tokens.into_iter().filter_map(Token::into_address).collect();

        if state.accounts.get(&(owners.clone(), salt)) != Some(&op.sender) {
            return Err(UserOpError::TransactionReverted("AA14 initCode must return sender".into()));
        }
        if self.deploys_accounts {
            state.code.insert(op.sender, Bytes::from(vec![0xfe]));
            state.owners.insert(op.sender, SignerSet::new(owners)?);
        }
        Ok(())
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn chain_id(&self) -> Result<u64> {
        Ok(CHAIN_ID)
    }

    async fn code_at(&self, address: Address) -> Result<Bytes> {
        let state = self.state.lock().unwrap();
        Ok(state.code.get(&address).cloned().unwrap_or_default())
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let state = self.state.lock().unwrap();
        let selector = &data[..4];

        if to == entry_point() && selector == id(codec::GET_NONCE_SIGNATURE) {
            let tokens = abi::decode(&[ParamType::Address, ParamType::Uint(192)], &data[4..]).unwrap();
            let sender = tokens[0].clone().into_address().unwrap();
            let nonce = state.nonces.get(&sender).copied().unwrap_or_default();
            return Ok(abi::encode(&[Token::Uint(nonce)]).into());
        }

        if to == self.factory && selector == id("getAddress(address,address,uint256)") {
            let tokens = abi::decode(
                &[ParamType::Address, ParamType::Address, ParamType::Uint(256)],
                &data[4..],
            )
            .unwrap();
            let owners = vec![
                tokens[0].clone().into_address().unwrap(),
                tokens[1].clone().into_address().unwrap(),
            ];
            let salt = tokens[2].clone().into_uint().unwrap();
            if let Some(address) = state.accounts.get(&(owners, salt)) {
                return Ok(abi::encode(&[Token::Address(*address)]).into());
            }
        }

        Err(UserOpError::EthereumProviderError("execution reverted".into()))
    }

    async fn handle_ops(
        &self,
        entry_point: Address,
        ops: &[UserOperation],
        _beneficiary: Address,
    ) -> Result<SubmissionReceipt> {
        let mut guard = self.state.lock().unwrap();
        // a failed operation reverts the whole batch
        let mut state = guard.clone();
        let mut outcomes = Vec::new();

        for op in ops {
            let deployed = state.code.contains_key(&op.sender);
            match (deployed, op.init_code.is_empty()) {
                (false, true) => {
                    return Err(UserOpError::TransactionReverted("AA20 account not deployed".into()))
                }
                (true, false) => {
                    return Err(UserOpError::TransactionReverted("AA10 sender already constructed".into()))
                }
                (false, false) => self.deploy(&mut state, op)?,
                (true, true) => {}
            }

            let expected_nonce = state.nonces.get(&op.sender).copied().unwrap_or_default();
            if op.nonce != expected_nonce {
                return Err(UserOpError::TransactionReverted("AA25 invalid account nonce".into()));
            }

            if let Some(signers) = state.owners.get(&op.sender) {
                verify_operation(op, entry_point, CHAIN_ID, signers)
                    .map_err(|e| UserOpError::TransactionReverted(format!("AA24 signature error: {e}")))?;
            }
            state.nonces.insert(op.sender, expected_nonce + 1);

            if self.execution == Execution::Silent {
                continue;
            }
            outcomes.push(OperationOutcome {
                user_op_hash: codec::domain_hash(op, entry_point, CHAIN_ID),
                sender: op.sender,
                paymaster: Address::zero(),
                nonce: op.nonce,
                success: self.execution == Execution::Succeeds,
                actual_gas_cost: U256::from(21_000),
                actual_gas_used: U256::from(21_000),
            });
        }

        state.submissions += 1;
        let transaction_hash = H256::from_low_u64_be(state.submissions);
        *guard = state;
        Ok(SubmissionReceipt {
            transaction_hash,
            outcomes,
        })
    }
}
