use crate::config::ChainIdentities;
use crate::domain::errors::ModulesError;
use crate::domain::types::{Catalog, ChainKind, ModuleDescriptor};
use crate::modules::ModulesLogPriority;
use alloy_primitives::Address;
use canlog::log;
use futures::lock::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

/// Registry names under which chain implementations are published.
pub const ELIGIBILITY_CHAIN_NAMES: &[&str] = &["Eligibilities Chain", "Eligibility Chain"];
pub const TOGGLE_CHAIN_NAMES: &[&str] = &["Toggles Chain", "Toggle Chain"];

/// Descriptors deployed on one network, keyed by implementation identity.
#[derive(Clone, Debug, Default)]
pub struct RegistryIndex {
    chain_id: u64,
    by_identity: HashMap<Address, Arc<ModuleDescriptor>>,
    ordered: Vec<Arc<ModuleDescriptor>>,
    chain_identities: ChainIdentities,
}

/// Chain category of a registry entry, judged by its published name (any case).
pub fn chain_kind_by_name(name: &str) -> Option<ChainKind> {
    let name = name.trim();
    let matches = |names: &[&str]| names.iter().any(|known| known.eq_ignore_ascii_case(name));
    if matches(ELIGIBILITY_CHAIN_NAMES) {
        Some(ChainKind::Eligibility)
    } else if matches(TOGGLE_CHAIN_NAMES) {
        Some(ChainKind::Toggle)
    } else {
        None
    }
}

impl RegistryIndex {
    /// Keep the catalog entries deployed on `chain_id`. The first descriptor for an
    /// identity wins; later duplicates are logged and dropped.
    pub fn build(catalog: Catalog, chain_id: u64) -> Self {
        let total = catalog.modules.len();
        let mut index = Self {
            chain_id,
            ..Self::default()
        };
        for mut module in catalog.modules {
            if !module.is_deployed_on(chain_id) {
                continue;
            }
            let identity = module.implementation_address;
            if let Some(existing) = index.by_identity.get(&identity) {
                log!(
                    ModulesLogPriority::Warn,
                    "registry_duplicate_identity identity={} kept={} dropped={}",
                    identity_id(&identity),
                    existing.name,
                    module.name
                );
                continue;
            }
            module.id = identity_id(&identity);
            if let Some(kind) = chain_kind_by_name(&module.name) {
                index.chain_identities.insert(kind, identity);
            }
            let module = Arc::new(module);
            index.by_identity.insert(identity, Arc::clone(&module));
            index.ordered.push(module);
        }
        log!(
            ModulesLogPriority::Info,
            "registry_index_built chain_id={} catalog_modules={} indexed_modules={} chain_modules={}",
            chain_id,
            total,
            index.ordered.len(),
            index.chain_identities.eligibility.len() + index.chain_identities.toggle.len()
        );
        index
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Chain implementations found among the indexed entries.
    pub fn chain_identities(&self) -> &ChainIdentities {
        &self.chain_identities
    }

    pub fn by_identity(&self, identity: &Address) -> Option<Arc<ModuleDescriptor>> {
        self.by_identity.get(identity).cloned()
    }

    /// Look up by module id (the implementation address, any hex case).
    pub fn by_id(&self, id: &str) -> Option<Arc<ModuleDescriptor>> {
        let identity = Address::from_str(id.trim()).ok()?;
        self.by_identity(&identity)
    }

    /// Indexed descriptors in catalog order, optionally filtered.
    pub fn list(&self, filter: Option<&dyn Fn(&ModuleDescriptor) -> bool>) -> Vec<Arc<ModuleDescriptor>> {
        self.ordered
            .iter()
            .filter(|module| filter.map_or(true, |keep| keep(module)))
            .cloned()
            .collect()
    }
}

/// Module id form of an implementation identity: lower-case `0x` hex.
pub fn identity_id(identity: &Address) -> String {
    format!("0x{}", hex::encode(identity.as_slice()))
}

/// Write-once holder for the registry index with a single-flight preparation barrier.
///
/// Concurrent `prepare_with` callers wait on the same load; once an index is
/// installed every later call returns it without loading again.
#[derive(Debug, Default)]
pub struct RegistryCell {
    index: OnceLock<RegistryIndex>,
    gate: Mutex<()>,
}

impl RegistryCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn prepare_with<F, Fut>(&self, load: F) -> Result<&RegistryIndex, ModulesError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<RegistryIndex, ModulesError>>,
    {
        if let Some(index) = self.index.get() {
            return Ok(index);
        }
        let _guard = self.gate.lock().await;
        if let Some(index) = self.index.get() {
            return Ok(index);
        }
        let loaded = load().await?;
        Ok(self.index.get_or_init(|| loaded))
    }

    pub fn get(&self) -> Result<&RegistryIndex, ModulesError> {
        self.index.get().ok_or(ModulesError::NotPrepared)
    }

    pub fn is_prepared(&self) -> bool {
        self.index.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::{chain_kind_by_name, RegistryCell, RegistryIndex};
    use crate::domain::errors::ModulesError;
    use crate::domain::types::{Catalog, ChainKind, ModuleDeployment, ModuleDescriptor};
    use crate::test_support::{block_on_with_spin, module_fixture};
    use alloy_primitives::address;
    use std::cell::Cell;

    fn catalog() -> Catalog {
        let mut other_chain = module_fixture(
            "Mainnet Only",
            address!("0x5555555555555555555555555555555555555555"),
        );
        other_chain.deployments = vec![ModuleDeployment {
            chain_id: "1".to_string(),
            block: "1".to_string(),
        }];
        Catalog {
            modules: vec![
                module_fixture(
                    "Allow List",
                    address!("0xac208e6668de569c6ea1db76decea70430335ed5"),
                ),
                other_chain,
                module_fixture(
                    "Allow List Copy",
                    address!("0xac208e6668de569c6ea1db76decea70430335ed5"),
                ),
                module_fixture(
                    "Season Toggle",
                    address!("0x6666666666666666666666666666666666666666"),
                ),
            ],
        }
    }

    #[test]
    fn index_filters_by_network_and_keeps_first_duplicate() {
        let index = RegistryIndex::build(catalog(), 10);
        assert_eq!(index.len(), 2);
        let module = index
            .by_identity(&address!("0xac208e6668de569c6ea1db76decea70430335ed5"))
            .expect("allow list should be indexed");
        assert_eq!(module.name, "Allow List");
        assert_eq!(module.id, "0xac208e6668de569c6ea1db76decea70430335ed5");
        assert!(index
            .by_identity(&address!("0x5555555555555555555555555555555555555555"))
            .is_none());
    }

    #[test]
    fn lookups_by_id_ignore_hex_case_and_list_filters() {
        let index = RegistryIndex::build(catalog(), 10);
        assert!(index
            .by_id("0xAC208E6668DE569C6EA1DB76DECEA70430335ED5")
            .is_some());
        assert!(index.by_id("not-an-address").is_none());

        let toggles = index.list(Some(&|module: &ModuleDescriptor| module.name.contains("Toggle")));
        assert_eq!(toggles.len(), 1);
        assert_eq!(index.list(None).len(), 2);
    }

    #[test]
    fn chain_implementations_are_recognised_from_registry_names() {
        let mut with_chains = catalog();
        with_chains.modules.push(module_fixture(
            "Eligibilities Chain",
            address!("0x7777777777777777777777777777777777777777"),
        ));
        with_chains.modules.push(module_fixture(
            "toggles chain",
            address!("0x8888888888888888888888888888888888888888"),
        ));
        let index = RegistryIndex::build(with_chains, 10);

        let chains = index.chain_identities();
        assert_eq!(
            chains.kind_of(&address!("0x7777777777777777777777777777777777777777")),
            Some(ChainKind::Eligibility)
        );
        assert_eq!(
            chains.kind_of(&address!("0x8888888888888888888888888888888888888888")),
            Some(ChainKind::Toggle)
        );
        assert!(!chains.contains(&address!("0xac208e6668de569c6ea1db76decea70430335ed5")));
        assert_eq!(chain_kind_by_name("Allow List"), None);
        assert!(RegistryIndex::build(catalog(), 10)
            .chain_identities()
            .is_empty());
    }

    #[test]
    fn cell_reports_not_prepared_until_loaded_and_loads_once() {
        let cell = RegistryCell::new();
        assert_eq!(cell.get().err(), Some(ModulesError::NotPrepared));

        let loads = Cell::new(0usize);
        for _ in 0..3 {
            block_on_with_spin(cell.prepare_with(|| async {
                loads.set(loads.get() + 1);
                Ok(RegistryIndex::build(catalog(), 10))
            }))
            .expect("prepare should succeed");
        }
        assert_eq!(loads.get(), 1);
        assert_eq!(cell.get().expect("prepared").len(), 2);
    }

    #[test]
    fn failed_load_leaves_cell_unprepared() {
        let cell = RegistryCell::new();
        let err = block_on_with_spin(cell.prepare_with(|| async {
            Err(ModulesError::RegistryUnavailable {
                reason: "offline".to_string(),
            })
        }))
        .expect_err("load failure must propagate");
        assert!(matches!(err, ModulesError::RegistryUnavailable { .. }));
        assert!(!cell.is_prepared());
    }
}
