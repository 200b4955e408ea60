use crate::abi::decode::{decode_address, decode_single};
use crate::abi::function::{event_topic, find_function, AbiFunction};
use crate::abi::{AbiType, ArgValue};
use crate::config::{ChainIdentities, ClientConfig};
use crate::domain::errors::ModulesError;
use crate::domain::types::{
    BatchCreateInstancesResult, CallFunctionResult, Catalog, CreateInstanceResult,
    ModuleDescriptor, ModuleParameter, Ruleset, RulesetOptions, TransactionReceipt,
    TransactionStatus,
};
use crate::features::catalog::fetch_catalog;
use crate::features::transport::{ContractCall, ContractWrite, ModuleTransport};
use crate::modules::args::{check_and_encode, check_write_args, EncodedCreationArgs};
use crate::modules::params::live_parameters;
use crate::modules::registry::{RegistryCell, RegistryIndex};
use crate::modules::resolver::{resolve_many, resolve_one};
use crate::modules::ruleset::{build_ruleset, build_rulesets, is_chain, is_chains};
use alloy_primitives::{Address, Bytes, B256, U256};
use canlog::{log, GetLogFilter, LogFilter, LogPriorityLevels};
use std::sync::Arc;

pub const MODULE_DEPLOYED_EVENT: &str =
    "HatsModuleFactory_ModuleDeployed(address,address,uint256,bytes,bytes,uint256)";

#[derive(Clone, Copy, Debug, LogPriorityLevels)]
enum ClientLogPriority {
    #[log_level(capacity = 2000, name = "CLIENT_INFO")]
    Info,
    #[log_level(capacity = 500, name = "CLIENT_WARN")]
    Warn,
}

impl GetLogFilter for ClientLogPriority {
    fn get_log_filter() -> LogFilter {
        LogFilter::ShowAll
    }
}

/// One module instance to create, predict, or look up on the factory.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InstanceSpec {
    pub module_id: String,
    pub hat_id: U256,
    pub immutable_args: Vec<ArgValue>,
    pub mutable_args: Vec<ArgValue>,
    pub salt_nonce: U256,
}

/// Registry-backed entry point for creating and inspecting module instances.
pub struct ModulesClient<T> {
    config: ClientConfig,
    transport: T,
    registry: RegistryCell,
}

impl<T: ModuleTransport> ModulesClient<T> {
    pub fn new(config: ClientConfig, transport: T) -> Self {
        Self {
            config,
            transport,
            registry: RegistryCell::new(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    // ── Registry ────────────────────────────────────────────────────────────

    /// Build the registry index from `catalog`, or from the configured registry URL
    /// when none is given. Later calls are no-ops.
    pub async fn prepare(&self, catalog: Option<Catalog>) -> Result<(), ModulesError> {
        let chain_id = self.config.chain_id;
        let index = self
            .registry
            .prepare_with(move || async move {
                let catalog = match catalog {
                    Some(catalog) => catalog,
                    None => {
                        log!(
                            ClientLogPriority::Info,
                            "registry_fetch url={}",
                            self.config.registry_url
                        );
                        fetch_catalog(&self.config.registry_url, self.config.max_response_bytes)?
                    }
                };
                Ok::<_, ModulesError>(RegistryIndex::build(catalog, chain_id))
            })
            .await?;
        log!(
            ClientLogPriority::Info,
            "registry_ready chain_id={} modules={}",
            index.chain_id(),
            index.len()
        );
        Ok(())
    }

    fn index(&self) -> Result<&RegistryIndex, ModulesError> {
        self.registry.get()
    }

    pub fn get_module_by_id(&self, id: &str) -> Result<Option<Arc<ModuleDescriptor>>, ModulesError> {
        Ok(self.index()?.by_id(id))
    }

    pub fn get_module_by_implementation(
        &self,
        implementation: Address,
    ) -> Result<Option<Arc<ModuleDescriptor>>, ModulesError> {
        Ok(self.index()?.by_identity(&implementation))
    }

    pub async fn get_module_by_instance(
        &self,
        instance: Address,
    ) -> Result<Option<Arc<ModuleDescriptor>>, ModulesError> {
        let index = self.index()?;
        Ok(resolve_one(&self.transport, index, instance).await)
    }

    pub async fn get_modules_by_instances(
        &self,
        instances: &[Address],
    ) -> Result<Vec<Option<Arc<ModuleDescriptor>>>, ModulesError> {
        let index = self.index()?;
        resolve_many(&self.transport, index, instances).await
    }

    pub fn list_modules(
        &self,
        filter: Option<&dyn Fn(&ModuleDescriptor) -> bool>,
    ) -> Result<Vec<Arc<ModuleDescriptor>>, ModulesError> {
        Ok(self.index()?.list(filter))
    }

    // ── Factory ─────────────────────────────────────────────────────────────

    pub async fn create_new_instance(
        &self,
        account: Address,
        spec: &InstanceSpec,
    ) -> Result<CreateInstanceResult, ModulesError> {
        let (module, encoded) = self.checked_instance(spec)?;
        let calldata = encode_factory_call(
            &create_function(),
            &[
                ArgValue::from(module.implementation_address),
                ArgValue::Uint(spec.hat_id),
                ArgValue::hex_bytes(&encoded.immutable),
                ArgValue::hex_bytes(&encoded.mutable),
                ArgValue::Uint(spec.salt_nonce),
            ],
        )?;
        let receipt = self.submit(account, self.config.factory_address, calldata).await?;
        if !receipt.success {
            return Ok(CreateInstanceResult {
                status: TransactionStatus::Reverted,
                transaction_hash: receipt.transaction_hash,
                new_instance: None,
            });
        }
        let instance = self
            .deployed_instances(&receipt)
            .into_iter()
            .next()
            .ok_or_else(|| ModulesError::TransactionFailed {
                reason: format!(
                    "transaction {} succeeded without a module deployment event",
                    receipt.transaction_hash
                ),
            })?;
        log!(
            ClientLogPriority::Info,
            "instance_created module={} instance={} tx={}",
            module.id,
            instance,
            receipt.transaction_hash
        );
        Ok(CreateInstanceResult {
            status: TransactionStatus::Success,
            transaction_hash: receipt.transaction_hash,
            new_instance: Some(instance),
        })
    }

    /// Create several instances in one factory transaction.
    pub async fn batch_create_new_instances(
        &self,
        account: Address,
        specs: &[InstanceSpec],
    ) -> Result<BatchCreateInstancesResult, ModulesError> {
        let mut implementations = Vec::with_capacity(specs.len());
        let mut hat_ids = Vec::with_capacity(specs.len());
        let mut immutables = Vec::with_capacity(specs.len());
        let mut mutables = Vec::with_capacity(specs.len());
        let mut salts = Vec::with_capacity(specs.len());
        for spec in specs {
            let (module, encoded) = self.checked_instance(spec)?;
            implementations.push(ArgValue::from(module.implementation_address));
            hat_ids.push(ArgValue::Uint(spec.hat_id));
            immutables.push(ArgValue::hex_bytes(&encoded.immutable));
            mutables.push(ArgValue::hex_bytes(&encoded.mutable));
            salts.push(ArgValue::Uint(spec.salt_nonce));
        }
        let calldata = encode_factory_call(
            &batch_create_function(),
            &[
                ArgValue::Array(implementations),
                ArgValue::Array(hat_ids),
                ArgValue::Array(immutables),
                ArgValue::Array(mutables),
                ArgValue::Array(salts),
            ],
        )?;
        let receipt = self.submit(account, self.config.factory_address, calldata).await?;
        if !receipt.success {
            return Ok(BatchCreateInstancesResult {
                status: TransactionStatus::Reverted,
                transaction_hash: receipt.transaction_hash,
                new_instances: Vec::new(),
            });
        }
        let instances = self.deployed_instances(&receipt);
        if instances.len() < specs.len() {
            return Err(ModulesError::TransactionFailed {
                reason: format!(
                    "transaction {} reported {} deployments for {} requested instances",
                    receipt.transaction_hash,
                    instances.len(),
                    specs.len()
                ),
            });
        }
        log!(
            ClientLogPriority::Info,
            "instances_created count={} tx={}",
            instances.len(),
            receipt.transaction_hash
        );
        Ok(BatchCreateInstancesResult {
            status: TransactionStatus::Success,
            transaction_hash: receipt.transaction_hash,
            new_instances: instances,
        })
    }

    /// Deterministic address the factory would deploy `spec` to.
    pub async fn predict_instance_address(&self, spec: &InstanceSpec) -> Result<Address, ModulesError> {
        let function = predict_function();
        let data = self.factory_lookup(&function, spec).await?;
        decode_address(&data).map_err(|reason| self.factory_call_failed(&function, reason))
    }

    pub async fn is_module_deployed(&self, spec: &InstanceSpec) -> Result<bool, ModulesError> {
        let function = deployed_function();
        let data = self.factory_lookup(&function, spec).await?;
        match decode_single(&AbiType::Bool, &data) {
            Ok(ArgValue::Bool(deployed)) => Ok(deployed),
            Ok(other) => Err(self.factory_call_failed(
                &function,
                format!("expected a bool, got {}", other.kind_name()),
            )),
            Err(reason) => Err(self.factory_call_failed(&function, reason)),
        }
    }

    async fn factory_lookup(
        &self,
        function: &AbiFunction,
        spec: &InstanceSpec,
    ) -> Result<Bytes, ModulesError> {
        let (module, encoded) = self.checked_instance(spec)?;
        let calldata = encode_factory_call(
            function,
            &[
                ArgValue::from(module.implementation_address),
                ArgValue::Uint(spec.hat_id),
                ArgValue::hex_bytes(&encoded.immutable),
                ArgValue::Uint(spec.salt_nonce),
            ],
        )?;
        self.transport
            .read_contract(&ContractCall::new(self.config.factory_address, calldata))
            .await
            .map_err(|error| self.factory_call_failed(function, error.to_string()))
    }

    fn factory_call_failed(&self, function: &AbiFunction, reason: String) -> ModulesError {
        ModulesError::ModuleCallFailed {
            address: self.config.factory_address,
            function: function.name.clone(),
            reason,
        }
    }

    fn checked_instance(
        &self,
        spec: &InstanceSpec,
    ) -> Result<(Arc<ModuleDescriptor>, EncodedCreationArgs), ModulesError> {
        let module = self
            .index()?
            .by_id(&spec.module_id)
            .ok_or_else(|| ModulesError::UnknownModule {
                id: spec.module_id.clone(),
            })?;
        let encoded = check_and_encode(&module, &spec.immutable_args, &spec.mutable_args)?;
        Ok((module, encoded))
    }

    /// Instances announced by the factory's deployment events, in log order.
    fn deployed_instances(&self, receipt: &TransactionReceipt) -> Vec<Address> {
        receipt
            .logs_matching(self.config.factory_address, event_topic(MODULE_DEPLOYED_EVENT))
            .filter_map(|log| log.data.get(32..).and_then(|data| decode_address(data).ok()))
            .collect()
    }

    // ── Instances ───────────────────────────────────────────────────────────

    /// Live parameters of `instance`; `None` when it is not a registry module.
    pub async fn get_instance_parameters(
        &self,
        instance: Address,
    ) -> Result<Option<Vec<ModuleParameter>>, ModulesError> {
        let index = self.index()?;
        let Some(module) = resolve_one(&self.transport, index, instance).await else {
            return Ok(None);
        };
        live_parameters(&self.transport, &module, instance).await.map(Some)
    }

    pub async fn get_ruleset(
        &self,
        instance: Address,
        options: RulesetOptions,
    ) -> Result<Option<Ruleset>, ModulesError> {
        let index = self.index()?;
        build_ruleset(
            &self.transport,
            index,
            &self.config.chain_identities,
            instance,
            options,
        )
        .await
    }

    pub async fn get_rulesets(
        &self,
        instances: &[Address],
        options: RulesetOptions,
    ) -> Result<Vec<Option<Ruleset>>, ModulesError> {
        let index = self.index()?;
        build_rulesets(
            &self.transport,
            index,
            &self.config.chain_identities,
            instances,
            options,
        )
        .await
    }

    /// Chain implementations this client recognises: the configured lists plus,
    /// once prepared, the chain modules found in the registry.
    pub fn chain_identities(&self) -> ChainIdentities {
        match self.registry.get() {
            Ok(index) => self
                .config
                .chain_identities
                .merged_with(index.chain_identities()),
            Err(_) => self.config.chain_identities.clone(),
        }
    }

    /// Chain detection does not need the registry; before `prepare` only the
    /// configured identities are recognised.
    pub async fn is_chain(&self, instance: Address) -> bool {
        is_chain(&self.transport, &self.chain_identities(), instance).await
    }

    pub async fn is_chains(&self, instances: &[Address]) -> Result<Vec<bool>, ModulesError> {
        is_chains(&self.transport, &self.chain_identities(), instances).await
    }

    pub async fn call_instance_write_function(
        &self,
        account: Address,
        module_id: &str,
        instance: Address,
        function_name: &str,
        args: &[ArgValue],
    ) -> Result<CallFunctionResult, ModulesError> {
        let module = self
            .index()?
            .by_id(module_id)
            .ok_or_else(|| ModulesError::UnknownModule {
                id: module_id.to_string(),
            })?;
        let unknown_function = || ModulesError::UnknownFunction {
            module: module.id.clone(),
            function: function_name.to_string(),
        };
        let declared = module.write_function(function_name).ok_or_else(unknown_function)?;
        check_write_args(declared, args)?;

        let function = find_function(&module.abi, function_name, Some(args.len()))
            .map_err(|reason| ModulesError::InvalidParameter {
                name: function_name.to_string(),
                reason,
            })?
            .ok_or_else(unknown_function)?;
        let calldata = function
            .encode_call(args)
            .map_err(|reason| ModulesError::InvalidParameter {
                name: function_name.to_string(),
                reason,
            })?;
        let receipt = self.submit(account, instance, calldata).await?;
        Ok(CallFunctionResult {
            status: receipt.status(),
            transaction_hash: receipt.transaction_hash,
        })
    }

    async fn submit(
        &self,
        account: Address,
        to: Address,
        calldata: Bytes,
    ) -> Result<TransactionReceipt, ModulesError> {
        let write = ContractWrite {
            from: account,
            to,
            calldata,
        };
        let hash: B256 = self
            .transport
            .write_contract(&write)
            .await
            .map_err(|error| ModulesError::TransactionFailed {
                reason: format!("submission to {to} failed: {error}"),
            })?;
        let receipt = self
            .transport
            .wait_for_transaction_receipt(hash)
            .await
            .map_err(|error| ModulesError::TransactionFailed {
                reason: format!("receipt for {hash} unavailable: {error}"),
            })?;
        if receipt.success {
            log!(ClientLogPriority::Info, "transaction_mined tx={} to={}", hash, to);
        } else {
            log!(ClientLogPriority::Warn, "transaction_reverted tx={} to={}", hash, to);
        }
        Ok(receipt)
    }
}

fn create_function() -> AbiFunction {
    AbiFunction::new(
        "createHatsModule",
        &["address", "uint256", "bytes", "bytes", "uint256"],
        &["address"],
    )
}

fn batch_create_function() -> AbiFunction {
    AbiFunction::new(
        "batchCreateHatsModule",
        &["address[]", "uint256[]", "bytes[]", "bytes[]", "uint256[]"],
        &["bool"],
    )
}

fn predict_function() -> AbiFunction {
    AbiFunction::new(
        "getHatsModuleAddress",
        &["address", "uint256", "bytes", "uint256"],
        &["address"],
    )
}

fn deployed_function() -> AbiFunction {
    AbiFunction::new("deployed", &["address", "uint256", "bytes", "uint256"], &["bool"])
}

fn encode_factory_call(function: &AbiFunction, args: &[ArgValue]) -> Result<Bytes, ModulesError> {
    function
        .encode_call(args)
        .map_err(|reason| ModulesError::InvalidParameter {
            name: function.name.clone(),
            reason,
        })
}
