// src/resolver.rs
//! Counterfactual account addresses.
//!
//! The factory deploys each account as a proxy with CREATE2, so the address
//! is fixed by the factory address, the salt, and the proxy's init code
//! (creation code followed by `abi.encode(implementation, initializer)`).

use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, Bytes, U256};
use ethers::utils::{get_create2_address_from_hash, keccak256};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chain::ChainClient;
use crate::codec::{encode_call, word};
use crate::error::{Result, UserOpError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressResolver {
    pub factory: Address,
    pub account_implementation: Address,
    pub proxy_creation_code: Bytes,
}

impl AddressResolver {
    pub fn new(factory: Address, account_implementation: Address, proxy_creation_code: Bytes) -> Self {
        Self {
            factory,
            account_implementation,
            proxy_creation_code,
        }
    }

    /// The address the account owned by `owners` occupies, deployed or not.
    pub fn resolve(&self, owners: &[Address], salt: U256) -> Result<Address> {
        check_owners(owners)?;

        let initializer = encode_call(&owner_signature("initialize", owners.len(), false), &owner_tokens(owners));
        let mut init_code = self.proxy_creation_code.to_vec();
        init_code.extend_from_slice(&abi::encode(&[
            Token::Address(self.account_implementation),
            Token::Bytes(initializer.to_vec()),
        ]));

        let address = get_create2_address_from_hash(self.factory, word(salt), keccak256(init_code));
        debug!("Resolved account {:?} for {} owners, salt {}", address, owners.len(), salt);
        Ok(address)
    }

    /// `initCode` that instantiates the account: the factory address followed
    /// by its `createAccount(owners..., salt)` call.
    pub fn init_code(&self, owners: &[Address], salt: U256) -> Result<Bytes> {
        check_owners(owners)?;

        let mut args = owner_tokens(owners);
        args.push(Token::Uint(salt));
        let call = encode_call(&owner_signature("createAccount", owners.len(), true), &args);

        let mut init_code = self.factory.as_bytes().to_vec();
        init_code.extend_from_slice(&call);
        Ok(init_code.into())
    }

    /// Asks the factory's `getAddress` view for the same address.
    pub async fn resolve_onchain<C: ChainClient + ?Sized>(
        &self,
        chain: &C,
        owners: &[Address],
        salt: U256,
    ) -> Result<Address> {
        check_owners(owners)?;

        let mut args = owner_tokens(owners);
        args.push(Token::Uint(salt));
        let data = encode_call(&owner_signature("getAddress", owners.len(), true), &args);
        let result = chain.call(self.factory, data).await?;

        abi::decode(&[ParamType::Address], &result)
            .ok()
            .and_then(|tokens| tokens.into_iter().next())
            .and_then(Token::into_address)
            .ok_or_else(|| UserOpError::EthereumProviderError("malformed getAddress result".into()))
    }
}

/// Whether code is deployed at `address`. Always asks the chain.
pub async fn exists<C: ChainClient + ?Sized>(chain: &C, address: Address) -> Result<bool> {
    let code = chain.code_at(address).await?;
    debug!("Code at {:?}: {} bytes", address, code.len());
    Ok(!code.is_empty())
}

fn check_owners(owners: &[Address]) -> Result<()> {
    if owners.is_empty() {
        return Err(UserOpError::InvalidParameters("account needs at least one owner".into()));
    }
    Ok(())
}

fn owner_tokens(owners: &[Address]) -> Vec<Token> {
    owners.iter().copied().map(Token::Address).collect()
}

// e.g. "createAccount(address,address,uint256)"
fn owner_signature(name: &str, owners: usize, with_salt: bool) -> String {
    let mut params = vec!["address"; owners];
    if with_salt {
        params.push("uint256");
    }
    format!("{}({})", name, params.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::utils::id;

    fn resolver() -> AddressResolver {
        AddressResolver::new(
            Address::repeat_byte(0xfa),
            Address::repeat_byte(0x1a),
            Bytes::from(vec![0x60, 0x80, 0x60, 0x40, 0x52]),
        )
    }

    fn owners() -> Vec<Address> {
        vec![Address::repeat_byte(0x0a), Address::repeat_byte(0x0b)]
    }

    #[test]
    fn test_owner_signature() {
        assert_eq!(owner_signature("createAccount", 2, true), "createAccount(address,address,uint256)");
        assert_eq!(owner_signature("initialize", 3, false), "initialize(address,address,address)");
    }

    #[test]
    fn test_resolve_known_value() {
        // keccak256(0xff ++ factory ++ salt ++ keccak256(initCode))[12..], computed outside this crate
        let expected: Address = "0x22985048D6d8CCc790001BE6F363ad4571878619".parse().unwrap();
        assert_eq!(resolver().resolve(&owners(), U256::one()).unwrap(), expected);
    }

    #[test]
    fn test_resolve_is_stable() {
        let resolver = resolver();
        let first = resolver.resolve(&owners(), U256::one()).unwrap();
        let second = resolver.resolve(&owners(), U256::one()).unwrap();
        assert_eq!(first, second);
        assert_ne!(first, Address::zero());
    }

    #[test]
    fn test_resolve_depends_on_salt_and_owner_order() {
        let resolver = resolver();
        let base = resolver.resolve(&owners(), U256::one()).unwrap();

        let salts: Vec<Address> = (2..6u64)
            .map(|salt| resolver.resolve(&owners(), U256::from(salt)).unwrap())
            .collect();
        assert!(salts.iter().all(|address| *address != base));

        let mut reversed = owners();
        reversed.reverse();
        assert_ne!(resolver.resolve(&reversed, U256::one()).unwrap(), base);
    }

    #[test]
    fn test_resolve_depends_on_factory() {
        let mut other = resolver();
        other.factory = Address::repeat_byte(0xfb);
        assert_ne!(
            other.resolve(&owners(), U256::one()).unwrap(),
            resolver().resolve(&owners(), U256::one()).unwrap()
        );
    }

    #[test]
    fn test_init_code_layout() {
        let resolver = resolver();
        let init_code = resolver.init_code(&owners(), U256::from(7)).unwrap();

        assert_eq!(&init_code[..20], resolver.factory.as_bytes());
        assert_eq!(&init_code[20..24], &id("createAccount(address,address,uint256)")[..]);
        // selector + two owners + salt
        assert_eq!(init_code.len(), 20 + 4 + 3 * 32);
        assert_eq!(init_code[init_code.len() - 1], 7);
    }

    #[test]
    fn test_no_owners_rejected() {
        assert!(resolver().resolve(&[], U256::one()).is_err());
        assert!(resolver().init_code(&[], U256::one()).is_err());
    }
}
