use crate::abi::decode::{decode_address_list, decode_count, decode_count_list};
use crate::abi::function::selector;
use crate::config::ChainIdentities;
use crate::domain::errors::ModulesError;
use crate::domain::types::{ClauseMember, ModuleDescriptor, Ruleset, RulesetOptions};
use crate::features::transport::{CallOutcome, ContractCall, ModuleTransport};
use crate::modules::params::live_parameters;
use crate::modules::registry::RegistryIndex;
use crate::modules::resolver::{checked_multicall, read_identities, read_identity, resolve_many};
use crate::modules::ModulesLogPriority;
use alloy_primitives::Address;
use canlog::log;
use futures::future::join_all;
use std::sync::Arc;

pub const CLAUSE_COUNT_SIGNATURE: &str = "NUM_CONJUNCTION_CLAUSES()";
pub const CLAUSE_LENGTHS_SIGNATURE: &str = "CONJUNCTION_CLAUSE_LENGTHS()";
pub const CHAIN_MEMBERS_SIGNATURE: &str = "MODULES()";

const STRUCTURAL_READS: usize = 3;

/// Clause structure read from a chain instance, validated for consistency.
#[derive(Clone, Debug, PartialEq, Eq)]
struct ChainLayout {
    lengths: Vec<usize>,
    members: Vec<Address>,
}

// ── Chain detection ─────────────────────────────────────────────────────────

pub async fn is_chain<T: ModuleTransport + ?Sized>(
    transport: &T,
    identities: &ChainIdentities,
    address: Address,
) -> bool {
    read_identity(transport, address)
        .await
        .is_some_and(|identity| identities.contains(&identity))
}

/// One batch for all addresses; unreadable entries classify as "not a chain".
pub async fn is_chains<T: ModuleTransport + ?Sized>(
    transport: &T,
    identities: &ChainIdentities,
    addresses: &[Address],
) -> Result<Vec<bool>, ModulesError> {
    Ok(read_identities(transport, addresses)
        .await?
        .iter()
        .map(|identity| {
            identity
                .as_ref()
                .is_some_and(|identity| identities.contains(identity))
        })
        .collect())
}

// ── Ruleset construction ────────────────────────────────────────────────────

/// Ruleset for one instance. An instance is rebuilt as a chain when its identity
/// is in `identities` or is a chain implementation recognised by `index`.
pub async fn build_ruleset<T: ModuleTransport + ?Sized>(
    transport: &T,
    index: &RegistryIndex,
    identities: &ChainIdentities,
    address: Address,
    options: RulesetOptions,
) -> Result<Option<Ruleset>, ModulesError> {
    let identity = read_identity(transport, address).await;
    let mut rulesets =
        rulesets_from_identities(transport, index, identities, &[address], vec![identity], options)
            .await?;
    Ok(rulesets.pop().flatten())
}

/// Rulesets for many instances, positionally aligned with `addresses`.
///
/// Identities are read in one batch. Leaves are answered from that batch; chains
/// share one structural batch and one member-resolution batch.
pub async fn build_rulesets<T: ModuleTransport + ?Sized>(
    transport: &T,
    index: &RegistryIndex,
    identities: &ChainIdentities,
    addresses: &[Address],
    options: RulesetOptions,
) -> Result<Vec<Option<Ruleset>>, ModulesError> {
    let read = read_identities(transport, addresses).await?;
    rulesets_from_identities(transport, index, identities, addresses, read, options).await
}

async fn rulesets_from_identities<T: ModuleTransport + ?Sized>(
    transport: &T,
    index: &RegistryIndex,
    chain_identities: &ChainIdentities,
    addresses: &[Address],
    identities: Vec<Option<Address>>,
    options: RulesetOptions,
) -> Result<Vec<Option<Ruleset>>, ModulesError> {
    let mut results: Vec<Option<Ruleset>> = vec![None; addresses.len()];
    let mut chain_positions = Vec::new();
    for (position, (address, identity)) in addresses.iter().zip(identities).enumerate() {
        let Some(identity) = identity else {
            continue;
        };
        if chain_identities.contains(&identity) || index.chain_identities().contains(&identity) {
            chain_positions.push(position);
            continue;
        }
        if let Some(module) = index.by_identity(&identity) {
            results[position] = Some(Ruleset::single(ClauseMember {
                module,
                address: *address,
                live_params: None,
            }));
        }
    }

    let leaves = results.iter().filter(|ruleset| ruleset.is_some()).count();
    if !chain_positions.is_empty() {
        let chains = chain_positions
            .iter()
            .map(|position| addresses[*position])
            .collect::<Vec<_>>();
        let rebuilt = rebuild_chains(transport, index, &chains).await?;
        for (position, ruleset) in chain_positions.iter().zip(rebuilt) {
            results[*position] = ruleset;
        }
    }

    if options.include_live_params {
        attach_live_params(transport, &mut results).await?;
    }

    log!(
        ModulesLogPriority::Info,
        "rulesets_built addresses={} leaves={} chains={} absent={} live_params={}",
        addresses.len(),
        leaves,
        chain_positions.len(),
        results.iter().filter(|ruleset| ruleset.is_none()).count(),
        options.include_live_params
    );
    Ok(results)
}

async fn rebuild_chains<T: ModuleTransport + ?Sized>(
    transport: &T,
    index: &RegistryIndex,
    chains: &[Address],
) -> Result<Vec<Option<Ruleset>>, ModulesError> {
    let calls = chains
        .iter()
        .flat_map(|address| structural_calls(*address))
        .collect::<Vec<_>>();
    let outcomes = checked_multicall(transport, &calls).await?;
    let layouts = chains
        .iter()
        .zip(outcomes.chunks(STRUCTURAL_READS))
        .map(|(address, outcomes)| read_layout(*address, outcomes))
        .collect::<Vec<_>>();

    let members = layouts
        .iter()
        .flatten()
        .flat_map(|layout| layout.members.iter().copied())
        .collect::<Vec<_>>();
    let mut resolved = resolve_many(transport, index, &members).await?.into_iter();

    Ok(chains
        .iter()
        .zip(layouts)
        .map(|(address, layout)| {
            let layout = layout?;
            let modules = resolved
                .by_ref()
                .take(layout.members.len())
                .collect::<Vec<_>>();
            assemble_chain(*address, layout, modules)
        })
        .collect())
}

fn structural_calls(address: Address) -> [ContractCall; STRUCTURAL_READS] {
    [
        ContractCall::new(address, selector(CLAUSE_COUNT_SIGNATURE).to_vec()),
        ContractCall::new(address, selector(CLAUSE_LENGTHS_SIGNATURE).to_vec()),
        ContractCall::new(address, selector(CHAIN_MEMBERS_SIGNATURE).to_vec()),
    ]
}

fn read_layout(address: Address, outcomes: &[CallOutcome]) -> Option<ChainLayout> {
    let [count, lengths, members] = outcomes else {
        return None;
    };
    let count = decode_count(count.data()?).ok()?;
    let lengths = decode_count_list(lengths.data()?).ok()?;
    let members = decode_address_list(members.data()?).ok()?;
    let total = lengths
        .iter()
        .try_fold(0usize, |total, len| total.checked_add(*len));
    if count != lengths.len() || total != Some(members.len()) {
        log!(
            ModulesLogPriority::Warn,
            "chain_layout_inconsistent address={} clauses={} lengths={:?} members={}",
            address,
            count,
            lengths,
            members.len()
        );
        return None;
    }
    Some(ChainLayout { lengths, members })
}

/// All-or-nothing: one unresolved member drops the whole chain.
fn assemble_chain(
    address: Address,
    layout: ChainLayout,
    modules: Vec<Option<Arc<ModuleDescriptor>>>,
) -> Option<Ruleset> {
    if modules.len() != layout.members.len() || modules.iter().any(Option::is_none) {
        log!(
            ModulesLogPriority::Info,
            "chain_member_unresolved address={} members={} resolved={}",
            address,
            layout.members.len(),
            modules.iter().filter(|module| module.is_some()).count()
        );
        return None;
    }
    let members = layout
        .members
        .into_iter()
        .zip(modules.into_iter().flatten())
        .map(|(member, module)| ClauseMember {
            module,
            address: member,
            live_params: None,
        })
        .collect::<Vec<_>>();
    assemble_clauses(members, &layout.lengths).map(|clauses| Ruleset { clauses })
}

/// Partition a flattened member list into clauses: clause `i` takes the next
/// `lengths[i]` members. `None` unless the lengths cover the list exactly.
pub fn assemble_clauses<M>(members: Vec<M>, lengths: &[usize]) -> Option<Vec<Vec<M>>> {
    let total = lengths
        .iter()
        .try_fold(0usize, |total, len| total.checked_add(*len))?;
    if total != members.len() {
        return None;
    }
    let mut remaining = members.into_iter();
    Some(
        lengths
            .iter()
            .map(|len| remaining.by_ref().take(*len).collect())
            .collect(),
    )
}

/// Inverse of [`assemble_clauses`].
pub fn flatten_clauses<M: Clone>(clauses: &[Vec<M>]) -> (Vec<M>, Vec<usize>) {
    (
        clauses.iter().flatten().cloned().collect(),
        clauses.iter().map(Vec::len).collect(),
    )
}

async fn attach_live_params<T: ModuleTransport + ?Sized>(
    transport: &T,
    rulesets: &mut [Option<Ruleset>],
) -> Result<(), ModulesError> {
    let targets = rulesets
        .iter()
        .flatten()
        .flat_map(Ruleset::members)
        .map(|member| (Arc::clone(&member.module), member.address))
        .collect::<Vec<_>>();
    let fetched = join_all(
        targets
            .iter()
            .map(|(module, address)| live_parameters(transport, module, *address)),
    )
    .await;

    let mut fetched = fetched.into_iter();
    for member in rulesets
        .iter_mut()
        .flatten()
        .flat_map(|ruleset| ruleset.clauses.iter_mut().flatten())
    {
        if let Some(params) = fetched.next() {
            member.live_params = Some(params?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{
        assemble_clauses, build_ruleset, build_rulesets, flatten_clauses, is_chain, is_chains,
    };
    use crate::abi::encode::encode_parameters;
    use crate::abi::{AbiType, ArgValue};
    use crate::config::ChainIdentities;
    use crate::domain::errors::{ModulesError, TransportError};
    use crate::domain::types::{
        Catalog, ClauseMember, ModuleDescriptor, ParameterDescriptor, Ruleset, RulesetOptions,
    };
    use crate::modules::registry::RegistryIndex;
    use crate::test_support::{
        block_on_with_spin, module_fixture, numbered_address, ScriptedTransport,
    };
    use alloy_primitives::{address, Address, U256};
    use serde_json::json;

    const ALLOW_LIST: Address = address!("0xac208e6668de569c6ea1db76decea70430335ed5");
    const SEASON: Address = address!("0x6666666666666666666666666666666666666666");
    const ELIGIBILITY_CHAIN: Address = address!("0x8888888888888888888888888888888888888888");
    const ELIGIBILITY_CHAIN_V2: Address = address!("0x8888888888888888888888888888888888888889");

    fn index() -> RegistryIndex {
        RegistryIndex::build(
            Catalog {
                modules: vec![
                    module_fixture("Allow List", ALLOW_LIST),
                    module_fixture("Season Toggle", SEASON),
                    module_fixture("Eligibility Chain", ELIGIBILITY_CHAIN),
                ],
            },
            10,
        )
    }

    fn identities() -> ChainIdentities {
        ChainIdentities {
            eligibility: vec![ELIGIBILITY_CHAIN, ELIGIBILITY_CHAIN_V2],
            toggle: Vec::new(),
        }
    }

    const STAKING: Address = address!("0x9999999999999999999999999999999999999999");
    const ELIGIBILITIES_CHAIN: Address = address!("0x7777777777777777777777777777777777777777");

    fn staking_module() -> ModuleDescriptor {
        let mut module = module_fixture("Staking", STAKING);
        module.abi = json!([{
            "type": "function",
            "name": "minStake",
            "stateMutability": "view",
            "inputs": [],
            "outputs": [{ "name": "", "type": "uint256" }]
        }]);
        module.parameters = vec![ParameterDescriptor {
            label: "Minimum Stake".to_string(),
            function_name: "minStake".to_string(),
            display_type: "amount".to_string(),
        }];
        module
    }

    /// Registry with a staking module and a chain implementation known only by name.
    fn staking_index() -> RegistryIndex {
        RegistryIndex::build(
            Catalog {
                modules: vec![
                    staking_module(),
                    module_fixture("Allow List", ALLOW_LIST),
                    module_fixture("Eligibilities Chain", ELIGIBILITIES_CHAIN),
                ],
            },
            10,
        )
    }

    fn min_stake(value: u64) -> Vec<u8> {
        encode_parameters(&[AbiType::Uint(256)], &[ArgValue::Uint(U256::from(value))])
            .expect("stake should encode")
    }

    fn staked(transport: ScriptedTransport, member: Address, stake: u64) -> ScriptedTransport {
        transport
            .with_identity(member, STAKING)
            .with_read(member, "minStake()", min_stake(stake))
    }

    fn stake_of(member: &ClauseMember) -> (Address, ArgValue) {
        let params = member.live_params.as_ref().expect("live params attached");
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].label, "Minimum Stake");
        (member.address, params[0].value.clone())
    }

    fn stakes(ruleset: &Ruleset) -> Vec<(Address, ArgValue)> {
        ruleset.members().map(stake_of).collect()
    }

    fn shape(ruleset: &Ruleset) -> Vec<Vec<Address>> {
        ruleset
            .clauses
            .iter()
            .map(|clause| clause.iter().map(|member| member.address).collect())
            .collect()
    }

    #[test]
    fn clause_partition_round_trips() {
        for lengths in [vec![1], vec![2, 2, 2], vec![2, 3], vec![3, 1, 2]] {
            let total = lengths.iter().sum::<usize>();
            let members = (0..total).collect::<Vec<_>>();
            let clauses = assemble_clauses(members.clone(), &lengths).expect("lengths cover members");
            assert_eq!(clauses.iter().map(Vec::len).collect::<Vec<_>>(), lengths);
            let (flattened, flattened_lengths) = flatten_clauses(&clauses);
            assert_eq!(flattened, members);
            assert_eq!(flattened_lengths, lengths);
            assert_eq!(assemble_clauses(flattened, &flattened_lengths), Some(clauses));
        }
        assert!(assemble_clauses(vec![1, 2, 3], &[2]).is_none());
        assert!(assemble_clauses(vec![1], &[1, 1]).is_none());
        assert_eq!(assemble_clauses::<u8>(Vec::new(), &[]), Some(Vec::new()));
    }

    #[test]
    fn leaf_instance_is_one_clause_with_one_member() {
        let instance = numbered_address(1);
        let transport = ScriptedTransport::new().with_identity(instance, ALLOW_LIST);
        let ruleset = block_on_with_spin(build_ruleset(
            &transport,
            &index(),
            &identities(),
            instance,
            RulesetOptions::default(),
        ))
        .expect("ruleset should build")
        .expect("leaf should resolve");
        assert_eq!(shape(&ruleset), vec![vec![instance]]);
        assert_eq!(ruleset.clauses[0][0].module.name, "Allow List");
        assert!(ruleset.clauses[0][0].live_params.is_none());
    }

    #[test]
    fn chain_instance_rebuilds_clauses_in_flattened_order() {
        let chain = numbered_address(100);
        let members = (1..=5).map(numbered_address).collect::<Vec<_>>();
        let mut transport = ScriptedTransport::new().with_chain(chain, ELIGIBILITY_CHAIN_V2, &[2, 3], &members);
        for (position, member) in members.iter().enumerate() {
            let identity = if position % 2 == 0 { ALLOW_LIST } else { SEASON };
            transport = transport.with_identity(*member, identity);
        }

        let ruleset = block_on_with_spin(build_ruleset(
            &transport,
            &index(),
            &identities(),
            chain,
            RulesetOptions::default(),
        ))
        .expect("ruleset should build")
        .expect("chain should resolve");
        assert_eq!(
            shape(&ruleset),
            vec![members[..2].to_vec(), members[2..].to_vec()]
        );
        assert_eq!(ruleset.clauses[0][1].module.name, "Season Toggle");
        // structural batch + member batch
        assert_eq!(transport.multicall_count(), 2);
    }

    #[test]
    fn chain_with_unresolved_member_or_bad_layout_is_absent() {
        let chain = numbered_address(100);
        let members = vec![numbered_address(1), numbered_address(2)];
        let transport = ScriptedTransport::new()
            .with_chain(chain, ELIGIBILITY_CHAIN, &[1, 1], &members)
            .with_identity(members[0], ALLOW_LIST);
        let ruleset = block_on_with_spin(build_ruleset(
            &transport,
            &index(),
            &identities(),
            chain,
            RulesetOptions::default(),
        ))
        .expect("absence is not an error");
        assert!(ruleset.is_none());

        let inconsistent = numbered_address(101);
        let transport = ScriptedTransport::new()
            .with_chain(inconsistent, ELIGIBILITY_CHAIN, &[2, 3], &members)
            .with_identity(members[0], ALLOW_LIST)
            .with_identity(members[1], ALLOW_LIST);
        let ruleset = block_on_with_spin(build_ruleset(
            &transport,
            &index(),
            &identities(),
            inconsistent,
            RulesetOptions::default(),
        ))
        .expect("absence is not an error");
        assert!(ruleset.is_none());
    }

    #[test]
    fn batched_rulesets_keep_input_positions() {
        let leaf = numbered_address(1);
        let missing = numbered_address(2);
        let chain = numbered_address(100);
        let members = vec![numbered_address(10), numbered_address(11)];
        let transport = ScriptedTransport::new()
            .with_identity(leaf, SEASON)
            .with_chain(chain, ELIGIBILITY_CHAIN, &[1, 1], &members)
            .with_identity(members[0], ALLOW_LIST)
            .with_identity(members[1], SEASON);

        let rulesets = block_on_with_spin(build_rulesets(
            &transport,
            &index(),
            &identities(),
            &[chain, missing, leaf, chain],
            RulesetOptions::default(),
        ))
        .expect("rulesets should build");
        assert_eq!(rulesets.len(), 4);
        let chain_shape = vec![vec![members[0]], vec![members[1]]];
        assert_eq!(shape(rulesets[0].as_ref().expect("chain")), chain_shape);
        assert!(rulesets[1].is_none());
        assert_eq!(shape(rulesets[2].as_ref().expect("leaf")), vec![vec![leaf]]);
        assert_eq!(shape(rulesets[3].as_ref().expect("chain")), chain_shape);
        // identities, structure, members
        assert_eq!(transport.multicall_count(), 3);
    }

    #[test]
    fn live_params_are_attached_to_every_member() {
        let leaf = numbered_address(1);
        let transport = ScriptedTransport::new().with_identity(leaf, ALLOW_LIST);
        let ruleset = block_on_with_spin(build_ruleset(
            &transport,
            &index(),
            &identities(),
            leaf,
            RulesetOptions {
                include_live_params: true,
            },
        ))
        .expect("ruleset should build")
        .expect("leaf should resolve");
        assert_eq!(ruleset.clauses[0][0].live_params, Some(Vec::new()));
    }

    #[test]
    fn registry_chain_implementation_is_rebuilt_without_configured_identities() {
        let chain = numbered_address(100);
        let members = vec![numbered_address(1), numbered_address(2)];
        let transport = ScriptedTransport::new()
            .with_chain(chain, ELIGIBILITIES_CHAIN, &[1, 1], &members)
            .with_identity(members[0], ALLOW_LIST)
            .with_identity(members[1], STAKING);

        let ruleset = block_on_with_spin(build_ruleset(
            &transport,
            &staking_index(),
            &ChainIdentities::default(),
            chain,
            RulesetOptions::default(),
        ))
        .expect("ruleset should build")
        .expect("chain should resolve");
        assert_eq!(shape(&ruleset), vec![vec![members[0]], vec![members[1]]]);
        assert_eq!(ruleset.clauses[1][0].module.name, "Staking");
    }

    #[test]
    fn live_params_follow_each_member_across_clauses_and_rulesets() {
        let chain = numbered_address(100);
        let leaf = numbered_address(4);
        let members = (1..=3).map(numbered_address).collect::<Vec<_>>();
        let mut transport = ScriptedTransport::new().with_chain(chain, ELIGIBILITIES_CHAIN, &[2, 1], &members);
        for (member, stake) in members.iter().zip([7, 8, 9]) {
            transport = staked(transport, *member, stake);
        }
        transport = staked(transport, leaf, 10);
        let options = RulesetOptions {
            include_live_params: true,
        };

        let ruleset = block_on_with_spin(build_ruleset(
            &transport,
            &staking_index(),
            &ChainIdentities::default(),
            chain,
            options,
        ))
        .expect("ruleset should build")
        .expect("chain should resolve");
        assert_eq!(shape(&ruleset), vec![members[..2].to_vec(), members[2..].to_vec()]);
        let expected_chain = members
            .iter()
            .zip([7u64, 8, 9])
            .map(|(member, stake)| (*member, ArgValue::Uint(U256::from(stake))))
            .collect::<Vec<_>>();
        assert_eq!(stakes(&ruleset), expected_chain);

        let rulesets = block_on_with_spin(build_rulesets(
            &transport,
            &staking_index(),
            &ChainIdentities::default(),
            &[leaf, chain],
            options,
        ))
        .expect("rulesets should build");
        assert_eq!(
            stakes(rulesets[0].as_ref().expect("leaf")),
            vec![(leaf, ArgValue::Uint(U256::from(10u64)))]
        );
        assert_eq!(stakes(rulesets[1].as_ref().expect("chain")), expected_chain);
    }

    #[test]
    fn failing_member_read_fails_the_whole_ruleset() {
        let chain = numbered_address(100);
        let members = (1..=3).map(numbered_address).collect::<Vec<_>>();
        let transport = ScriptedTransport::new().with_chain(chain, ELIGIBILITIES_CHAIN, &[2, 1], &members);
        let transport = staked(transport, members[0], 7);
        let transport = staked(transport, members[2], 9).with_identity(members[1], STAKING);

        let err = block_on_with_spin(build_ruleset(
            &transport,
            &staking_index(),
            &ChainIdentities::default(),
            chain,
            RulesetOptions {
                include_live_params: true,
            },
        ))
        .expect_err("an unreadable parameter must fail the fetch");
        match err {
            ModulesError::ModuleCallFailed {
                address, function, ..
            } => {
                assert_eq!(address, members[1]);
                assert_eq!(function, "minStake");
            }
            other => panic!("unexpected error: {other}"),
        }

        let structure_only = block_on_with_spin(build_ruleset(
            &transport,
            &staking_index(),
            &ChainIdentities::default(),
            chain,
            RulesetOptions::default(),
        ))
        .expect("structure does not read parameters");
        assert!(structure_only.is_some());
    }

    #[test]
    fn chain_detection_treats_unreadable_addresses_as_not_chains() {
        let chain = numbered_address(100);
        let leaf = numbered_address(1);
        let transport = ScriptedTransport::new()
            .with_identity(chain, ELIGIBILITY_CHAIN_V2)
            .with_identity(leaf, ALLOW_LIST);
        let identities = identities();
        assert!(block_on_with_spin(is_chain(&transport, &identities, chain)));
        assert!(!block_on_with_spin(is_chain(&transport, &identities, leaf)));
        assert!(!block_on_with_spin(is_chain(&transport, &identities, numbered_address(3))));
        assert_eq!(
            block_on_with_spin(is_chains(
                &transport,
                &identities,
                &[leaf, numbered_address(3), chain]
            ))
            .expect("batch should succeed"),
            vec![false, false, true]
        );

        let broken = ScriptedTransport::new()
            .with_multicall_error(TransportError::Rpc("timeout".to_string()));
        assert!(matches!(
            block_on_with_spin(is_chains(&broken, &identities, &[chain])),
            Err(ModulesError::BatchReadFailed { .. })
        ));
    }
}
