//! ERC-20 balance reads over EVM JSON-RPC.

use async_trait::async_trait;
use num_bigint::BigUint;
use serde::Deserialize;
use serde_json::json;

use crate::error::FetchError;
use crate::types::EvmAddress;

/// `balanceOf(address)` function selector.
pub const BALANCE_OF_SELECTOR: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];

// ═══════════════════════════════════════════════════════════════════════════════
// BALANCE READER
// ═══════════════════════════════════════════════════════════════════════════════

/// Reads a token balance from one chain endpoint.
///
/// Implementations make exactly one request per call and never retry; the
/// caller owns timeouts.
#[async_trait]
pub trait BalanceReader: Send + Sync {
    async fn read_balance(
        &self,
        endpoint: &str,
        contract: &EvmAddress,
        owner: &EvmAddress,
    ) -> Result<BigUint, FetchError>;
}

/// Production reader issuing `eth_call` through a shared `reqwest` pool.
#[derive(Clone, Debug)]
pub struct JsonRpcBalanceReader {
    client: reqwest::Client,
}

impl JsonRpcBalanceReader {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("omniusdc/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    #[serde(default)]
    message: String,
}

#[async_trait]
impl BalanceReader for JsonRpcBalanceReader {
    async fn read_balance(
        &self,
        endpoint: &str,
        contract: &EvmAddress,
        owner: &EvmAddress,
    ) -> Result<BigUint, FetchError> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_call",
            "params": [
                {
                    "to": contract.to_checksum(),
                    "data": format!("0x{}", hex::encode(encode_balance_of(owner))),
                },
                "latest"
            ]
        });

        let response = self.client.post(endpoint).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| FetchError::MalformedResponse(e.to_string()))?;
        parse_rpc_response(body)
    }
}

fn parse_rpc_response(body: RpcResponse) -> Result<BigUint, FetchError> {
    if let Some(error) = body.error {
        return Err(FetchError::Rpc {
            code: error.code,
            message: error.message,
        });
    }

    match body.result {
        Some(serde_json::Value::String(result)) => decode_uint256(&result),
        Some(other) => Err(FetchError::MalformedResponse(format!(
            "expected hex string result, got {other}"
        ))),
        None => Err(FetchError::MalformedResponse("missing result".into())),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ABI HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Calldata for `balanceOf(owner)`: selector followed by one ABI word.
pub fn encode_balance_of(owner: &EvmAddress) -> Vec<u8> {
    let mut data = Vec::with_capacity(36);
    data.extend_from_slice(&BALANCE_OF_SELECTOR);
    data.extend_from_slice(&owner.to_abi_word());
    data
}

/// Decode a single `uint256` return value.
///
/// An empty `0x` result (no contract at the address) is malformed, not zero.
pub fn decode_uint256(result: &str) -> Result<BigUint, FetchError> {
    let digits = result
        .strip_prefix("0x")
        .ok_or_else(|| FetchError::MalformedResponse(format!("result missing 0x: {result:?}")))?;

    let bytes = hex::decode(digits)
        .map_err(|e| FetchError::MalformedResponse(format!("result is not hex: {e}")))?;
    if bytes.len() != 32 {
        return Err(FetchError::MalformedResponse(format!(
            "expected 32-byte uint256, got {} bytes",
            bytes.len()
        )));
    }

    Ok(BigUint::from_bytes_be(&bytes))
}
