//! Contract ABI adapter
//!
//! Thin wrapper over `ethers::abi` exposing the three operations the builders
//! and the client need: argument encoding, output decoding and method ids.

use crate::error::{TxError, TxResult};

use ethers::abi::{Abi, Function, Token};
use std::collections::BTreeMap;

/// Parsed contract ABI
#[derive(Debug, Clone)]
pub struct ContractAbi {
    abi: Abi,
}

impl ContractAbi {
    /// Parse a JSON ABI definition
    pub fn parse(abi_json: &str) -> TxResult<Self> {
        let abi: Abi =
            serde_json::from_str(abi_json).map_err(|e| TxError::InvalidAbi(e.to_string()))?;
        Ok(Self { abi })
    }

    /// Look up a method by name. Overloaded methods resolve to the first
    /// declaration.
    pub fn function(&self, method: &str) -> TxResult<&Function> {
        self.abi
            .function(method)
            .map_err(|_| TxError::MethodNotFound(method.to_string()))
    }

    /// 4-byte selector of `method`
    pub fn method_id(&self, method: &str) -> TxResult<[u8; 4]> {
        Ok(self.function(method)?.short_signature())
    }

    /// Deployment payload: `bytecode ‖ encoded constructor args`
    pub fn encode_constructor(&self, bytecode: Vec<u8>, args: &[Token]) -> TxResult<Vec<u8>> {
        match self.abi.constructor() {
            Some(constructor) => constructor
                .encode_input(bytecode, args)
                .map_err(|e| TxError::Abi(e.to_string())),
            None if args.is_empty() => Ok(bytecode),
            None => Err(TxError::InvalidAbi(format!(
                "no constructor declared but {} arguments given",
                args.len()
            ))),
        }
    }

    /// Invocation payload: `selector ‖ encoded args`
    pub fn encode_call(&self, method: &str, args: &[Token]) -> TxResult<Vec<u8>> {
        self.function(method)?
            .encode_input(args)
            .map_err(|e| TxError::Abi(e.to_string()))
    }

    /// Decode the return data of `method` into a mapping keyed by output
    /// name, or by position for unnamed outputs. Empty return data yields an
    /// empty mapping.
    pub fn decode_output(&self, method: &str, data: &[u8]) -> TxResult<BTreeMap<String, Token>> {
        let function = self.function(method)?;
        if data.is_empty() {
            return Ok(BTreeMap::new());
        }

        let tokens = function
            .decode_output(data)
            .map_err(|e| TxError::Abi(e.to_string()))?;

        Ok(function
            .outputs
            .iter()
            .zip(tokens)
            .enumerate()
            .map(|(i, (param, token))| {
                let key = if param.name.is_empty() {
                    i.to_string()
                } else {
                    param.name.clone()
                };
                (key, token)
            })
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ethers::types::{Address, U256};

    pub const TOKEN_ABI: &str = r#"[
        {"type":"constructor","stateMutability":"nonpayable",
         "inputs":[{"name":"supply","type":"uint256"}]},
        {"type":"function","name":"transfer","stateMutability":"nonpayable",
         "inputs":[{"name":"to","type":"address"},{"name":"amount","type":"uint256"}],
         "outputs":[{"name":"","type":"bool"}]},
        {"type":"function","name":"balanceOf","stateMutability":"view",
         "inputs":[{"name":"owner","type":"address"}],
         "outputs":[{"name":"balance","type":"uint256"}]}
    ]"#;

    #[test]
    fn test_method_ids() {
        let abi = ContractAbi::parse(TOKEN_ABI).unwrap();
        assert_eq!(abi.method_id("transfer").unwrap(), [0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(abi.method_id("balanceOf").unwrap(), [0x70, 0xa0, 0x82, 0x31]);
    }

    #[test]
    fn test_unknown_method() {
        let abi = ContractAbi::parse(TOKEN_ABI).unwrap();
        assert!(matches!(
            abi.encode_call("mint", &[]),
            Err(TxError::MethodNotFound(m)) if m == "mint"
        ));
    }

    #[test]
    fn test_invalid_abi_json() {
        assert!(matches!(
            ContractAbi::parse("{not json"),
            Err(TxError::InvalidAbi(_))
        ));
    }

    #[test]
    fn test_encode_call_prefixes_selector() {
        let abi = ContractAbi::parse(TOKEN_ABI).unwrap();
        let data = abi
            .encode_call(
                "transfer",
                &[
                    Token::Address(Address::from_low_u64_be(0xbb)),
                    Token::Uint(U256::from(1000u64)),
                ],
            )
            .unwrap();
        assert_eq!(data.len(), 4 + 64);
        assert_eq!(&data[..4], &[0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(data[4 + 31], 0xbb);
    }

    #[test]
    fn test_encode_constructor_appends_args() {
        let abi = ContractAbi::parse(TOKEN_ABI).unwrap();
        let data = abi
            .encode_constructor(vec![0x60, 0x80], &[Token::Uint(U256::from(5u64))])
            .unwrap();
        assert_eq!(&data[..2], &[0x60, 0x80]);
        assert_eq!(data.len(), 2 + 32);
        assert_eq!(data[33], 5);
    }

    #[test]
    fn test_no_constructor_rejects_args() {
        let abi = ContractAbi::parse("[]").unwrap();
        assert_eq!(abi.encode_constructor(vec![1, 2], &[]).unwrap(), vec![1, 2]);
        assert!(matches!(
            abi.encode_constructor(vec![1, 2], &[Token::Bool(true)]),
            Err(TxError::InvalidAbi(_))
        ));
    }

    #[test]
    fn test_decode_output_keys() {
        let abi = ContractAbi::parse(TOKEN_ABI).unwrap();

        let mut word = [0u8; 32];
        word[31] = 42;
        let named = abi.decode_output("balanceOf", &word).unwrap();
        assert_eq!(named.get("balance"), Some(&Token::Uint(U256::from(42u64))));

        word[31] = 1;
        let unnamed = abi.decode_output("transfer", &word).unwrap();
        assert_eq!(unnamed.get("0"), Some(&Token::Bool(true)));

        assert!(abi.decode_output("balanceOf", &[]).unwrap().is_empty());
    }
}
