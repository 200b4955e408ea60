pub mod catalog;
pub mod evm;
pub mod transport;

pub use catalog::fetch_catalog;
pub use evm::HttpEvmRpcClient;
pub use transport::{CallOutcome, ContractCall, ContractWrite, ModuleTransport};
