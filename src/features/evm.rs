use crate::abi::decode::{read_dynamic_bytes, read_usize, read_word};
use crate::abi::encode::{encode_dynamic_bytes, encode_u256_word};
use crate::abi::function::selector;
use crate::config::ClientConfig;
use crate::domain::errors::TransportError;
use crate::domain::types::{ReceiptLog, TransactionReceipt};
use crate::features::transport::{CallOutcome, ContractCall, ContractWrite, ModuleTransport};
use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use canlog::{log, GetLogFilter, LogFilter, LogPriorityLevels};
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use std::io::Read;
use std::str::FromStr;
use std::time::Duration;

const AGGREGATE3_SIGNATURE: &str = "aggregate3((address,bool,bytes)[])";
const MIN_RESPONSE_BYTES: u64 = 256;
const MAX_RESPONSE_BYTES: u64 = 16 * 1024 * 1024;
/// JSON-RPC error code nodes use for execution reverts.
const EXECUTION_REVERTED_CODE: i64 = 3;

#[derive(Clone, Copy, Debug, LogPriorityLevels)]
enum RpcLogPriority {
    #[log_level(capacity = 1000, name = "RPC_INFO")]
    Info,
    #[log_level(capacity = 500, name = "RPC_WARN")]
    Warn,
}

impl GetLogFilter for RpcLogPriority {
    fn get_log_filter() -> LogFilter {
        LogFilter::ShowAll
    }
}

/// JSON-RPC transport: `eth_call` reads, Multicall3 batches, node-signed writes.
///
/// Blocking: requests go out through `ureq` on the polling thread, and
/// receipt polling sleeps that thread between attempts. Run it where blocking
/// is allowed (a dedicated thread or a runtime's blocking pool), not on an
/// async worker thread.
#[derive(Clone, Debug)]
pub struct HttpEvmRpcClient {
    rpc_url: String,
    fallback_rpc_url: Option<String>,
    multicall_address: Address,
    max_response_bytes: u64,
    receipt_poll_attempts: u32,
    receipt_poll_interval: Duration,
}

impl HttpEvmRpcClient {
    pub fn from_config(config: &ClientConfig) -> Result<Self, String> {
        let rpc_url = config.rpc_url.trim();
        if rpc_url.is_empty() {
            return Err("evm rpc url is not configured".to_string());
        }
        Ok(Self {
            rpc_url: rpc_url.to_string(),
            fallback_rpc_url: config
                .rpc_fallback_url
                .as_deref()
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string),
            multicall_address: config.multicall_address,
            max_response_bytes: clamp_response_bytes(config.max_response_bytes),
            receipt_poll_attempts: config.receipt_poll_attempts.max(1),
            receipt_poll_interval: Duration::from_millis(config.receipt_poll_interval_ms),
        })
    }

    pub async fn eth_call(&self, to: Address, calldata: &[u8]) -> Result<Bytes, TransportError> {
        let response = self
            .rpc_call(
                "eth_call",
                json!([{"to": to, "data": hex_blob(calldata)}, "latest"]),
            )
            .await?;
        let raw = result_str(&response, "eth_call")?;
        parse_hex_bytes(raw, "eth_call result").map_err(TransportError::Decode)
    }

    async fn eth_send_transaction(&self, write: &ContractWrite) -> Result<B256, TransportError> {
        let response = self
            .rpc_call(
                "eth_sendTransaction",
                json!([{
                    "from": write.from,
                    "to": write.to,
                    "data": hex_blob(&write.calldata)
                }]),
            )
            .await?;
        let raw = result_str(&response, "eth_sendTransaction")?;
        B256::from_str(raw.trim()).map_err(|error| {
            TransportError::Decode(format!("eth_sendTransaction result is not a hash: {error}"))
        })
    }

    async fn eth_get_transaction_receipt(
        &self,
        transaction_hash: B256,
    ) -> Result<Option<TransactionReceipt>, TransportError> {
        let response = self
            .rpc_call("eth_getTransactionReceipt", json!([transaction_hash]))
            .await?;
        match response.get("result") {
            None | Some(Value::Null) => Ok(None),
            Some(raw) => parse_receipt(raw).map(Some).map_err(TransportError::Decode),
        }
    }

    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        let body = serde_json::to_vec(&json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .map_err(|error| TransportError::Rpc(format!("failed to serialize {method} request: {error}")))?;

        let raw = self.http_post(&body).await.map_err(TransportError::Rpc)?;
        let value: Value = serde_json::from_slice(&raw).map_err(|error| {
            TransportError::Decode(format!("failed to parse {method} response JSON: {error}"))
        })?;
        if let Some(error) = value.get("error") {
            return Err(classify_rpc_error(method, error));
        }
        Ok(value)
    }

    async fn http_post(&self, body: &[u8]) -> Result<Vec<u8>, String> {
        match self.try_http_post(&self.rpc_url, body) {
            Ok(body) => Ok(body),
            Err(primary_error) => {
                if let Some(fallback_url) = self.fallback_rpc_url.as_deref() {
                    log!(
                        RpcLogPriority::Warn,
                        "rpc_fallback primary_error={}",
                        primary_error
                    );
                    self.try_http_post(fallback_url, body)
                        .map_err(|fallback_error| {
                            format!(
                                "primary rpc failed: {primary_error}; fallback rpc failed: {fallback_error}"
                            )
                        })
                } else {
                    Err(primary_error)
                }
            }
        }
    }

    fn try_http_post(&self, url: &str, body: &[u8]) -> Result<Vec<u8>, String> {
        let response = ureq::post(url)
            .set("content-type", "application/json")
            .send_bytes(body)
            .map_err(|error| match error {
                ureq::Error::Status(status, _) => {
                    format!("evm rpc returned status {status}")
                }
                ureq::Error::Transport(transport) => {
                    format!("evm rpc transport failed: {transport}")
                }
            })?;
        read_capped_body(response, self.max_response_bytes)
    }
}

#[async_trait(?Send)]
impl ModuleTransport for HttpEvmRpcClient {
    async fn read_contract(&self, call: &ContractCall) -> Result<Bytes, TransportError> {
        self.eth_call(call.address, &call.calldata).await
    }

    async fn multicall(&self, calls: &[ContractCall]) -> Result<Vec<CallOutcome>, TransportError> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }
        let data = self
            .eth_call(self.multicall_address, &encode_aggregate3(calls))
            .await?;
        let outcomes = decode_aggregate3(&data).map_err(TransportError::Decode)?;
        log!(
            RpcLogPriority::Info,
            "multicall calls={} failed={}",
            calls.len(),
            outcomes
                .iter()
                .filter(|outcome| matches!(outcome, CallOutcome::Failure(_)))
                .count()
        );
        Ok(outcomes)
    }

    async fn write_contract(&self, write: &ContractWrite) -> Result<B256, TransportError> {
        let hash = self.eth_send_transaction(write).await?;
        log!(
            RpcLogPriority::Info,
            "transaction_submitted hash={} to={}",
            hash,
            write.to
        );
        Ok(hash)
    }

    async fn wait_for_transaction_receipt(
        &self,
        transaction_hash: B256,
    ) -> Result<TransactionReceipt, TransportError> {
        poll_receipt(
            self.receipt_poll_attempts,
            self.receipt_poll_interval,
            || self.eth_get_transaction_receipt(transaction_hash),
            std::thread::sleep,
        )
        .await?
        .ok_or_else(|| {
            TransportError::Rpc(format!(
                "receipt for {transaction_hash} not available after {} attempts",
                self.receipt_poll_attempts
            ))
        })
    }
}

/// Fetch up to `attempts` times, calling `pause(interval)` between attempts
/// (never after the last). `Ok(None)` once attempts run out.
async fn poll_receipt<F, Fut, P>(
    attempts: u32,
    interval: Duration,
    mut fetch: F,
    mut pause: P,
) -> Result<Option<TransactionReceipt>, TransportError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<TransactionReceipt>, TransportError>>,
    P: FnMut(Duration),
{
    for attempt in 0..attempts {
        if let Some(receipt) = fetch().await? {
            return Ok(Some(receipt));
        }
        if attempt.saturating_add(1) < attempts {
            pause(interval);
        }
    }
    Ok(None)
}

fn read_capped_body(response: ureq::Response, max_response_bytes: u64) -> Result<Vec<u8>, String> {
    let mut raw = Vec::new();
    response
        .into_reader()
        .take(max_response_bytes.saturating_add(1))
        .read_to_end(&mut raw)
        .map_err(|error| format!("failed to read rpc response body: {error}"))?;
    if u64::try_from(raw.len()).unwrap_or(u64::MAX) > max_response_bytes {
        return Err(format!(
            "rpc response exceeded max_response_bytes={max_response_bytes}"
        ));
    }
    Ok(raw)
}

pub(crate) fn clamp_response_bytes(max_response_bytes: u64) -> u64 {
    max_response_bytes.clamp(MIN_RESPONSE_BYTES, MAX_RESPONSE_BYTES)
}

fn classify_rpc_error(method: &str, error: &Value) -> TransportError {
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let code = error.get("code").and_then(Value::as_i64);
    if code == Some(EXECUTION_REVERTED_CODE) || message.to_ascii_lowercase().contains("revert") {
        TransportError::Reverted(format!("{method}: {error}"))
    } else {
        TransportError::Rpc(format!("rpc returned error for {method}: {error}"))
    }
}

fn result_str<'a>(response: &'a Value, method: &str) -> Result<&'a str, TransportError> {
    response
        .get("result")
        .and_then(Value::as_str)
        .ok_or_else(|| TransportError::Decode(format!("{method} result was missing")))
}

fn hex_blob(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn parse_hex_bytes(raw: &str, field: &str) -> Result<Bytes, String> {
    let trimmed = raw.trim();
    let without_prefix = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| format!("{field} must be 0x-prefixed hex"))?;
    if without_prefix.len() % 2 != 0 {
        return Err(format!("{field} hex length must be even"));
    }
    hex::decode(without_prefix)
        .map(Bytes::from)
        .map_err(|error| format!("{field} must be valid hex: {error}"))
}

// ── Multicall3 aggregate3 ───────────────────────────────────────────────────

/// Calldata for `aggregate3` with `allowFailure = true` on every call.
pub(crate) fn encode_aggregate3(calls: &[ContractCall]) -> Vec<u8> {
    let elements = calls
        .iter()
        .map(|call| {
            let mut element = Vec::with_capacity(128 + call.calldata.len());
            let mut target = [0u8; 32];
            target[12..].copy_from_slice(call.address.as_slice());
            element.extend_from_slice(&target);
            element.extend_from_slice(&encode_u256_word(U256::from(1u8)));
            element.extend_from_slice(&encode_u256_word(U256::from(0x60u8)));
            element.extend_from_slice(&encode_dynamic_bytes(&call.calldata));
            element
        })
        .collect::<Vec<_>>();

    let mut out = selector(AGGREGATE3_SIGNATURE).to_vec();
    out.extend_from_slice(&encode_u256_word(U256::from(0x20u8)));
    out.extend_from_slice(&encode_u256_word(U256::from(elements.len())));
    let mut offset = elements.len().saturating_mul(32);
    for element in &elements {
        out.extend_from_slice(&encode_u256_word(U256::from(offset)));
        offset = offset.saturating_add(element.len());
    }
    for element in elements {
        out.extend_from_slice(&element);
    }
    out
}

/// Decode `(bool success, bytes returnData)[]`.
pub(crate) fn decode_aggregate3(data: &[u8]) -> Result<Vec<CallOutcome>, String> {
    let array_offset = read_usize(data, 0)?;
    let len = read_usize(data, array_offset)?;
    let base = array_offset
        .checked_add(32)
        .ok_or_else(|| "aggregate3 offset overflow".to_string())?;
    let region = data
        .get(base..)
        .ok_or_else(|| "aggregate3 result body is out of bounds".to_string())?;

    (0..len)
        .map(|index| {
            let element_offset = read_usize(region, index.saturating_mul(32))?;
            let element = region
                .get(element_offset..)
                .ok_or_else(|| format!("aggregate3 entry {index} is out of bounds"))?;
            let success = read_word(element, 0)?;
            let payload_offset = read_usize(element, 32)?;
            let payload = read_dynamic_bytes(element, payload_offset)?;
            if success[31] == 1 && success[..31].iter().all(|byte| *byte == 0) {
                Ok(CallOutcome::Success(Bytes::copy_from_slice(payload)))
            } else {
                Ok(CallOutcome::Failure(format!(
                    "call reverted: 0x{}",
                    hex::encode(payload)
                )))
            }
        })
        .collect()
}

// ── Receipts ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: B256,
    status: Option<String>,
    #[serde(default)]
    logs: Vec<RpcLog>,
}

#[derive(Deserialize)]
struct RpcLog {
    address: Address,
    #[serde(default)]
    topics: Vec<B256>,
    data: String,
}

pub(crate) fn parse_receipt(raw: &Value) -> Result<TransactionReceipt, String> {
    let receipt: RpcReceipt = serde_json::from_value(raw.clone())
        .map_err(|error| format!("failed to decode transaction receipt: {error}"))?;
    let success = match receipt.status.as_deref().map(str::trim) {
        Some("0x1") | Some("0x01") => true,
        Some("0x0") | Some("0x00") => false,
        Some(other) => return Err(format!("unexpected receipt status {other}")),
        None => return Err("receipt is missing status".to_string()),
    };
    let logs = receipt
        .logs
        .into_iter()
        .map(|log| {
            Ok(ReceiptLog {
                address: log.address,
                topics: log.topics,
                data: parse_hex_bytes(&log.data, "log data")?,
            })
        })
        .collect::<Result<Vec<_>, String>>()?;
    Ok(TransactionReceipt {
        transaction_hash: receipt.transaction_hash,
        success,
        logs,
    })
}
