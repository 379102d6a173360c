// Copyright 2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc,
};

use rand::{rngs::StdRng, Rng, SeedableRng};
use tangle_consensus::{
    crypto::{wots, Kerl},
    storage::{CachedBundle, KeyValueStore, MemoryStore},
    types::{ternary, Hash, MilestoneIndex, Tag, Transaction, Trit, SIGNATURE_FRAGMENT_TRIT_LENGTH},
    ConsensusEngine, EngineConfig, Snapshot,
};

pub const SECURITY_LEVEL: u8 = 2;
pub const MERKLE_TREE_DEPTH: u8 = 3;
pub const TOTAL_SUPPLY: u64 = 1_000;
const TIMESTAMP: u64 = 1_600_000_000;

static NEXT_HASH: AtomicI64 = AtomicI64::new(1);

/// A hash no other call returns.
#[allow(unused)]
pub fn unique_hash() -> Hash {
    let n = NEXT_HASH.fetch_add(1, Ordering::Relaxed);
    Hash::from_trits(&ternary::int_to_trits(n, Hash::TRIT_LENGTH).unwrap()).unwrap()
}

fn kerl_pair(left: &Hash, right: &Hash) -> Hash {
    let mut trits = left.trits().to_vec();
    trits.extend_from_slice(&right.trits());
    Hash::from_trits(&Kerl::digest(&trits).unwrap()).unwrap()
}

/// Computes the essence hash of `txs` and stamps it on every member.
fn seal(txs: &mut [Transaction]) {
    let mut kerl = Kerl::new();
    for tx in txs.iter() {
        kerl.absorb(&tx.essence_trits().unwrap()).unwrap();
    }
    let bundle = Hash::from_trits(&kerl.squeeze()).unwrap();
    for tx in txs.iter_mut() {
        tx.bundle = bundle;
    }
}

/// Builds a sealed bundle with one member per `(address, value)` entry, tail first.
///
/// Members chain through their trunks, every non-head member branches to `trunk` and the head approves `trunk` and
/// `branch`.
#[allow(unused)]
pub fn build_bundle(entries: &[(Hash, i64)], trunk: Hash, branch: Hash) -> Vec<Transaction> {
    let last_index = entries.len() as u64 - 1;
    let hashes = entries.iter().map(|_| unique_hash()).collect::<Vec<_>>();
    let mut txs = entries
        .iter()
        .enumerate()
        .map(|(i, (address, value))| Transaction {
            hash: hashes[i],
            address: *address,
            value: *value,
            timestamp: TIMESTAMP,
            current_index: i as u64,
            last_index,
            trunk: hashes.get(i + 1).copied().unwrap_or(trunk),
            branch: if i as u64 == last_index { branch } else { trunk },
            ..Default::default()
        })
        .collect::<Vec<_>>();
    seal(&mut txs);
    txs
}

/// A bundle moving `amount` tokens from `from` to `to`.
#[allow(unused)]
pub fn transfer(from: Hash, to: Hash, amount: i64, trunk: Hash, branch: Hash) -> Vec<Transaction> {
    build_bundle(&[(from, -amount), (to, amount)], trunk, branch)
}

/// A single transaction bundle without value.
#[allow(unused)]
pub fn zero_value(trunk: Hash, branch: Hash) -> Vec<Transaction> {
    build_bundle(&[(unique_hash(), 0)], trunk, branch)
}

/// A coordinator with one WOTS key per leaf of a Merkle tree of depth [`MERKLE_TREE_DEPTH`].
pub struct Coordinator {
    keys: Vec<Vec<Trit>>,
    tree: Vec<Vec<Hash>>,
}

impl Coordinator {
    pub fn new() -> Self {
        let mut rng = StdRng::seed_from_u64(0xC00D);
        let security = SECURITY_LEVEL as usize;
        let mut keys = Vec::new();
        let mut leaves = Vec::new();
        for _ in 0..1usize << MERKLE_TREE_DEPTH {
            let key = (0..security * SIGNATURE_FRAGMENT_TRIT_LENGTH)
                .map(|_| rng.gen_range(-1..=1))
                .collect::<Vec<Trit>>();
            let digests = key
                .chunks(SIGNATURE_FRAGMENT_TRIT_LENGTH)
                .flat_map(|fragment| wots::key_digest(fragment).unwrap())
                .collect::<Vec<_>>();
            leaves.push(wots::address(&digests).unwrap());
            keys.push(key);
        }
        let mut tree = vec![leaves];
        while tree[tree.len() - 1].len() > 1 {
            let next = tree[tree.len() - 1]
                .chunks(2)
                .map(|pair| kerl_pair(&pair[0], &pair[1]))
                .collect();
            tree.push(next);
        }
        Self { keys, tree }
    }

    /// The Merkle root.
    pub fn address(&self) -> Hash {
        self.tree[self.tree.len() - 1][0]
    }

    fn path(&self, leaf: usize) -> Vec<Trit> {
        let mut trits = Vec::with_capacity(SIGNATURE_FRAGMENT_TRIT_LENGTH);
        let mut index = leaf;
        for level in &self.tree[..self.tree.len() - 1] {
            trits.extend_from_slice(&level[index ^ 1].trits());
            index >>= 1;
        }
        trits.resize(SIGNATURE_FRAGMENT_TRIT_LENGTH, 0);
        trits
    }

    /// Builds a signed milestone bundle approving `trunk` and `branch`.
    #[allow(unused)]
    pub fn milestone(&self, index: MilestoneIndex, trunk: Hash, branch: Hash) -> Vec<Transaction> {
        self.milestone_with(index, trunk, branch, |_| {})
    }

    /// Like [`Coordinator::milestone`], applying `tweak` to the members before they are sealed and signed.
    #[allow(unused)]
    pub fn milestone_with(
        &self,
        index: MilestoneIndex,
        trunk: Hash,
        branch: Hash,
        tweak: impl FnOnce(&mut [Transaction]),
    ) -> Vec<Transaction> {
        let security = SECURITY_LEVEL as usize;
        let hashes = (0..=security).map(|_| unique_hash()).collect::<Vec<_>>();
        let mut txs = (0..=security)
            .map(|i| Transaction {
                hash: hashes[i],
                address: if i < security { self.address() } else { Hash::null() },
                obsolete_tag: Tag::from_milestone_index(index),
                timestamp: TIMESTAMP,
                current_index: i as u64,
                last_index: security as u64,
                trunk: hashes.get(i + 1).copied().unwrap_or(trunk),
                branch: if i < security { trunk } else { branch },
                ..Default::default()
            })
            .collect::<Vec<_>>();
        txs[security].signature_message_fragment = self.path(index.0 as usize);
        tweak(&mut txs);
        seal(&mut txs);

        let key = &self.keys[index.0 as usize];
        let normalized = wots::normalize(&txs[security].hash);
        for (i, tx) in txs[..security].iter_mut().enumerate() {
            let fragment = i % wots::MAX_SECURITY_LEVEL;
            tx.signature_message_fragment = wots::sign_fragment(
                &normalized[fragment * wots::NORMALIZED_FRAGMENT_LENGTH..(fragment + 1) * wots::NORMALIZED_FRAGMENT_LENGTH],
                &key[i * SIGNATURE_FRAGMENT_TRIT_LENGTH..(i + 1) * SIGNATURE_FRAGMENT_TRIT_LENGTH],
            )
            .unwrap();
        }
        txs
    }
}

/// An engine over an in-memory store, started from a snapshot that puts the whole supply on `genesis`.
pub struct TestNode {
    pub engine: ConsensusEngine,
    pub coordinator: Arc<Coordinator>,
    pub backend: Arc<dyn KeyValueStore>,
    pub genesis: Hash,
}

#[allow(unused)]
impl TestNode {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(tweak: impl FnOnce(&mut EngineConfig)) -> Self {
        let coordinator = Arc::new(Coordinator::new());
        let mut config = EngineConfig::default();
        config.coordinator.address = coordinator.address();
        config.coordinator.security_level = SECURITY_LEVEL;
        config.coordinator.merkle_tree_depth = MERKLE_TREE_DEPTH;
        config.ledger.total_supply = TOTAL_SUPPLY;
        tweak(&mut config);

        let backend: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let engine = ConsensusEngine::new(config, backend.clone()).unwrap();
        let genesis = unique_hash();
        engine
            .load_snapshot(Snapshot {
                index: MilestoneIndex(0),
                solid_entry_points: Vec::new(),
                balances: [(genesis, TOTAL_SUPPLY)].into_iter().collect(),
            })
            .unwrap();
        Self {
            engine,
            coordinator,
            backend,
            genesis,
        }
    }

    /// Reopens the engine over the same store.
    pub fn restart(&self) -> ConsensusEngine {
        ConsensusEngine::new(self.engine.context().config().clone(), self.backend.clone()).unwrap()
    }

    /// Stores every transaction, returning the bundles assembled on the way.
    pub fn attach(&self, txs: Vec<Transaction>) -> Vec<CachedBundle> {
        let mut bundles = Vec::new();
        for tx in txs {
            bundles.extend(self.engine.process_transaction(tx).unwrap());
        }
        bundles
    }

    /// Stores every transaction and reports the tail as solid, returning the tail hash.
    pub fn attach_solid(&self, txs: Vec<Transaction>) -> Hash {
        let tail = txs[0].hash;
        self.attach(txs);
        self.engine.on_tail_solid(&tail).unwrap();
        tail
    }

    /// Issues, attaches and solidifies a milestone, returning its tail hash.
    pub fn issue_milestone(&self, index: u32, trunk: Hash, branch: Hash) -> Hash {
        self.attach_solid(self.coordinator.milestone(MilestoneIndex(index), trunk, branch))
    }

    /// Issues and confirms the next milestone on top of the null hash, returning its tail hash.
    pub fn confirm_next_milestone(&self) -> Hash {
        let index = self.engine.context().solid_milestone_index().0 + 1;
        let tail = self.issue_milestone(index, Hash::null(), Hash::null());
        self.engine.confirm_milestone(MilestoneIndex(index)).unwrap();
        tail
    }

    /// The stored bundle of `tail`.
    pub fn bundle(&self, tail: &Hash) -> CachedBundle {
        self.engine.context().storage().bundle(tail).unwrap().unwrap()
    }

    pub fn balance(&self, address: &Hash) -> u64 {
        self.engine.get_balance(address).unwrap().0
    }
}
