use crate::abi::encode::encode_parameters;
use crate::abi::function::selector;
use crate::abi::{AbiType, ArgValue};
use crate::domain::errors::TransportError;
use crate::domain::types::{ModuleDeployment, ModuleDescriptor, TransactionReceipt};
use crate::features::transport::{CallOutcome, ContractCall, ContractWrite, ModuleTransport};
use crate::modules::resolver::IDENTITY_SIGNATURE;
use crate::modules::ruleset::{
    CHAIN_MEMBERS_SIGNATURE, CLAUSE_COUNT_SIGNATURE, CLAUSE_LENGTHS_SIGNATURE,
};
use alloy_primitives::{b256, Address, Bytes, B256, U256};
use async_trait::async_trait;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
#[cfg(not(target_arch = "wasm32"))]
use std::sync::{Mutex, OnceLock};
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

pub(crate) const TEST_TX_HASH: B256 =
    b256!("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");

/// Runs `f` with temporary host environment variable overrides under a global
/// process-wide lock to avoid cross-test races.
#[cfg(not(target_arch = "wasm32"))]
pub(crate) fn with_locked_host_env<T>(vars: &[(&str, Option<&str>)], f: impl FnOnce() -> T) -> T {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .expect("host env lock should not be poisoned");

    let previous = vars
        .iter()
        .map(|(name, _)| ((*name).to_string(), std::env::var(name).ok()))
        .collect::<Vec<_>>();

    for (name, value) in vars {
        set_or_remove(name, *value);
    }

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

    for (name, value) in &previous {
        set_or_remove(name, value.as_deref());
    }

    match result {
        Ok(output) => output,
        Err(payload) => std::panic::resume_unwind(payload),
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn set_or_remove(name: &str, value: Option<&str>) {
    match value {
        Some(v) => {
            #[allow(unused_unsafe)]
            unsafe {
                std::env::set_var(name, v);
            }
        }
        None => {
            #[allow(unused_unsafe)]
            unsafe {
                std::env::remove_var(name);
            }
        }
    }
}

/// Polls `future` on the current thread with a no-op waker. Every transport double
/// here resolves immediately, so a pending future means a bug.
pub(crate) fn block_on_with_spin<F: Future>(future: F) -> F::Output {
    unsafe fn clone(_ptr: *const ()) -> RawWaker {
        dummy_raw_waker()
    }
    unsafe fn wake(_ptr: *const ()) {}
    unsafe fn wake_by_ref(_ptr: *const ()) {}
    unsafe fn drop(_ptr: *const ()) {}

    fn dummy_raw_waker() -> RawWaker {
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, wake, wake_by_ref, drop);
        RawWaker::new(std::ptr::null(), &VTABLE)
    }

    let waker = unsafe { Waker::from_raw(dummy_raw_waker()) };
    let mut context = Context::from_waker(&waker);
    let mut future = Box::pin(future);

    for _ in 0..10_000 {
        match future.as_mut().poll(&mut context) {
            Poll::Ready(output) => return output,
            Poll::Pending => std::hint::spin_loop(),
        }
    }

    panic!("future did not complete in test polling loop");
}

/// Deterministic address with `n` in the low bytes.
pub(crate) fn numbered_address(n: u64) -> Address {
    Address::left_padding_from(&n.to_be_bytes())
}

/// Minimal registry entry deployed on chain 10 with no args, parameters, or ABI.
pub(crate) fn module_fixture(name: &str, implementation: Address) -> ModuleDescriptor {
    ModuleDescriptor {
        id: String::new(),
        name: name.to_string(),
        details: Vec::new(),
        links: Vec::new(),
        implementation_address: implementation,
        deployments: vec![ModuleDeployment {
            chain_id: "10".to_string(),
            block: String::new(),
        }],
        creation_args: Default::default(),
        custom_roles: Vec::new(),
        write_functions: Vec::new(),
        parameters: Vec::new(),
        module_type: Default::default(),
        tags: Vec::new(),
        abi: serde_json::json!([]),
    }
}

// ── Scripted transport ──────────────────────────────────────────────────────

/// In-memory transport. Reads are answered by `(address, selector)`; unknown
/// reads revert, and unknown batch entries fail without failing the batch.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    reads: HashMap<(Address, [u8; 4]), Bytes>,
    multicall_error: Option<TransportError>,
    write_error: Option<TransportError>,
    receipt: Option<TransactionReceipt>,
    multicalls: Cell<usize>,
    writes: RefCell<Vec<ContractWrite>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_read(mut self, address: Address, signature: &str, data: Vec<u8>) -> Self {
        self.reads
            .insert((address, selector(signature)), Bytes::from(data));
        self
    }

    pub(crate) fn with_identity(self, address: Address, identity: Address) -> Self {
        self.with_read(address, IDENTITY_SIGNATURE, encode_word(AbiType::Address, identity.into()))
    }

    /// Script a chain instance: its identity plus the three structural reads.
    /// The clause count always reports `lengths.len()`.
    pub(crate) fn with_chain(
        self,
        chain: Address,
        identity: Address,
        lengths: &[usize],
        members: &[Address],
    ) -> Self {
        let count = encode_word(AbiType::Uint(256), ArgValue::Uint(U256::from(lengths.len())));
        let lengths = encode_word(
            AbiType::Array(Box::new(AbiType::Uint(256))),
            ArgValue::Array(
                lengths
                    .iter()
                    .map(|len| ArgValue::Uint(U256::from(*len)))
                    .collect(),
            ),
        );
        let members = encode_word(
            AbiType::Array(Box::new(AbiType::Address)),
            ArgValue::Array(members.iter().map(|member| ArgValue::from(*member)).collect()),
        );
        self.with_identity(chain, identity)
            .with_read(chain, CLAUSE_COUNT_SIGNATURE, count)
            .with_read(chain, CLAUSE_LENGTHS_SIGNATURE, lengths)
            .with_read(chain, CHAIN_MEMBERS_SIGNATURE, members)
    }

    pub(crate) fn with_multicall_error(mut self, error: TransportError) -> Self {
        self.multicall_error = Some(error);
        self
    }

    pub(crate) fn with_write_error(mut self, error: TransportError) -> Self {
        self.write_error = Some(error);
        self
    }

    pub(crate) fn with_receipt(mut self, receipt: TransactionReceipt) -> Self {
        self.receipt = Some(receipt);
        self
    }

    pub(crate) fn multicall_count(&self) -> usize {
        self.multicalls.get()
    }

    pub(crate) fn writes(&self) -> Vec<ContractWrite> {
        self.writes.borrow().clone()
    }

    fn lookup(&self, call: &ContractCall) -> Option<&Bytes> {
        let selector: [u8; 4] = call.calldata.get(..4)?.try_into().ok()?;
        self.reads.get(&(call.address, selector))
    }
}

fn encode_word(kind: AbiType, value: ArgValue) -> Vec<u8> {
    encode_parameters(&[kind], &[value]).expect("scripted value should encode")
}

#[async_trait(?Send)]
impl ModuleTransport for ScriptedTransport {
    async fn read_contract(&self, call: &ContractCall) -> Result<Bytes, TransportError> {
        self.lookup(call)
            .cloned()
            .ok_or_else(|| TransportError::Reverted(format!("no scripted read for {}", call.address)))
    }

    async fn multicall(&self, calls: &[ContractCall]) -> Result<Vec<CallOutcome>, TransportError> {
        self.multicalls.set(self.multicalls.get() + 1);
        if let Some(error) = &self.multicall_error {
            return Err(error.clone());
        }
        Ok(calls
            .iter()
            .map(|call| match self.lookup(call) {
                Some(data) => CallOutcome::Success(data.clone()),
                None => CallOutcome::Failure("execution reverted".to_string()),
            })
            .collect())
    }

    async fn write_contract(&self, write: &ContractWrite) -> Result<B256, TransportError> {
        if let Some(error) = &self.write_error {
            return Err(error.clone());
        }
        self.writes.borrow_mut().push(write.clone());
        Ok(TEST_TX_HASH)
    }

    async fn wait_for_transaction_receipt(
        &self,
        transaction_hash: B256,
    ) -> Result<TransactionReceipt, TransportError> {
        let mut receipt = self
            .receipt
            .clone()
            .ok_or_else(|| TransportError::Rpc("no scripted receipt".to_string()))?;
        receipt.transaction_hash = transaction_hash;
        Ok(receipt)
    }
}
