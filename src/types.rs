// src/types.rs
use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Default verification gas. Covers signature checks for a deployed account;
/// instantiation through `initCode` needs more.
pub const DEFAULT_VERIFICATION_GAS_LIMIT: u64 = 150_000;
/// Default pre-verification gas, sized to also cover calldata cost.
pub const DEFAULT_PRE_VERIFICATION_GAS: u64 = 21_000;
pub const DEFAULT_MAX_FEE_PER_GAS: u64 = 1;
pub const DEFAULT_MAX_PRIORITY_FEE_PER_GAS: u64 = 1_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    pub sender: Address,
    pub nonce: U256,
    pub init_code: Bytes,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub paymaster_and_data: Bytes,
    pub signature: Bytes,
}

impl Default for UserOperation {
    fn default() -> Self {
        Self {
            sender: Address::zero(),
            nonce: U256::zero(),
            init_code: Bytes::default(),
            call_data: Bytes::default(),
            call_gas_limit: U256::zero(),
            verification_gas_limit: U256::from(DEFAULT_VERIFICATION_GAS_LIMIT),
            pre_verification_gas: U256::from(DEFAULT_PRE_VERIFICATION_GAS),
            max_fee_per_gas: U256::from(DEFAULT_MAX_FEE_PER_GAS),
            max_priority_fee_per_gas: U256::from(DEFAULT_MAX_PRIORITY_FEE_PER_GAS),
            paymaster_and_data: Bytes::default(),
            signature: Bytes::default(),
        }
    }
}

/// A single overlay slot: either the caller supplied a value, or the
/// default applies. `Provided(0)` and `Default` are different things.
///
/// On the wire a missing field and an explicit `null` both mean `Default`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field<T> {
    Provided(T),
    Default,
}

impl<T> Field<T> {
    pub fn is_default(&self) -> bool {
        matches!(self, Field::Default)
    }

    pub fn as_provided(&self) -> Option<&T> {
        match self {
            Field::Provided(value) => Some(value),
            Field::Default => None,
        }
    }

    /// Resolve the slot against `default`.
    pub fn or(self, default: T) -> T {
        match self {
            Field::Provided(value) => value,
            Field::Default => default,
        }
    }
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::Default
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Field::Provided(value),
            None => Field::Default,
        }
    }
}

impl<T: Serialize> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Field::Provided(value) => value.serialize(serializer),
            Field::Default => serializer.serialize_none(),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Field<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Field::from)
    }
}

/// Caller-supplied subset of a [`UserOperation`], merged over defaults by
/// [`PartialUserOperation::fill`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PartialUserOperation {
    #[serde(skip_serializing_if = "Field::is_default")]
    pub sender: Field<Address>,
    #[serde(skip_serializing_if = "Field::is_default")]
    pub nonce: Field<U256>,
    #[serde(skip_serializing_if = "Field::is_default")]
    pub init_code: Field<Bytes>,
    #[serde(skip_serializing_if = "Field::is_default")]
    pub call_data: Field<Bytes>,
    #[serde(skip_serializing_if = "Field::is_default")]
    pub call_gas_limit: Field<U256>,
    #[serde(skip_serializing_if = "Field::is_default")]
    pub verification_gas_limit: Field<U256>,
    #[serde(skip_serializing_if = "Field::is_default")]
    pub pre_verification_gas: Field<U256>,
    #[serde(skip_serializing_if = "Field::is_default")]
    pub max_fee_per_gas: Field<U256>,
    #[serde(skip_serializing_if = "Field::is_default")]
    pub max_priority_fee_per_gas: Field<U256>,
    #[serde(skip_serializing_if = "Field::is_default")]
    pub paymaster_and_data: Field<Bytes>,
    #[serde(skip_serializing_if = "Field::is_default")]
    pub signature: Field<Bytes>,
}

impl PartialUserOperation {
    pub fn fill(self, defaults: &UserOperation) -> UserOperation {
        let defaults = defaults.clone();
        UserOperation {
            sender: self.sender.or(defaults.sender),
            nonce: self.nonce.or(defaults.nonce),
            init_code: self.init_code.or(defaults.init_code),
            call_data: self.call_data.or(defaults.call_data),
            call_gas_limit: self.call_gas_limit.or(defaults.call_gas_limit),
            verification_gas_limit: self
                .verification_gas_limit
                .or(defaults.verification_gas_limit),
            pre_verification_gas: self.pre_verification_gas.or(defaults.pre_verification_gas),
            max_fee_per_gas: self.max_fee_per_gas.or(defaults.max_fee_per_gas),
            max_priority_fee_per_gas: self
                .max_priority_fee_per_gas
                .or(defaults.max_priority_fee_per_gas),
            paymaster_and_data: self.paymaster_and_data.or(defaults.paymaster_and_data),
            signature: self.signature.or(defaults.signature),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub reason: Option<String>,
}

/// Per-operation result reported by the entry point's `UserOperationEvent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationOutcome {
    pub user_op_hash: H256,
    pub sender: Address,
    pub paymaster: Address,
    pub nonce: U256,
    pub success: bool,
    pub actual_gas_cost: U256,
    pub actual_gas_used: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub transaction_hash: H256,
    pub outcomes: Vec<OperationOutcome>,
}
