//! Node runtime combining storage, the election ledger and call admission

use ballot_core::{
    Address, BallotError, BallotResult, ElectionId, Hash, NodeConfig, StateRoot, StateVersion,
    StorageBackend, Timestamp, VoterId,
};
use ballot_crypto::keys::KeyPair;
use ballot_election::{
    Candidate, ElectionGenesis, ElectionLedger, ElectionSummary, GenesisInitializer, Results,
    SignedCall, Transition, VerifiedCall, VoterRecord,
};
use ballot_state::{create_memory_store, create_sled_store, StateStore};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Ids of admitted calls that could still pass the expiry check.
///
/// Entries leave only by expiring. When every slot holds a live entry, new
/// calls are refused until one expires. Expired ids are collected so their
/// persisted records can be deleted with the next commit.
pub struct ReplayCache {
    order: VecDeque<(Hash, Timestamp)>,
    seen: HashSet<Hash>,
    expired: Vec<Hash>,
    capacity: usize,
    expiry_ms: u64,
}

impl ReplayCache {
    pub fn new(capacity: usize, expiry_seconds: u64) -> Self {
        Self {
            order: VecDeque::new(),
            seen: HashSet::new(),
            expired: Vec::new(),
            capacity,
            expiry_ms: expiry_seconds.saturating_mul(1000),
        }
    }

    /// Reserve `call_id` for a new call
    pub fn reserve(&mut self, call_id: Hash, timestamp: Timestamp, now: Timestamp) -> BallotResult<()> {
        self.prune(now);

        if self.seen.contains(&call_id) {
            return Err(BallotError::ReplayedCall(call_id.to_hex()));
        }
        if self.order.len() >= self.capacity {
            return Err(BallotError::InvalidCall("replay cache full".into()));
        }

        self.seen.insert(call_id);
        self.order.push_back((call_id, timestamp));
        Ok(())
    }

    /// Reload a call admitted before a restart. Capacity does not apply.
    pub fn restore(&mut self, call_id: Hash, timestamp: Timestamp, now: Timestamp) {
        if timestamp.elapsed_millis(now) > self.expiry_ms {
            self.expired.push(call_id);
        } else if self.seen.insert(call_id) {
            self.order.push_back((call_id, timestamp));
        }
    }

    /// Forget a reservation whose call did not commit
    pub fn release(&mut self, call_id: &Hash) {
        if self.seen.remove(call_id) {
            self.order.retain(|(id, _)| id != call_id);
        }
    }

    /// Drain the ids that expired since the last call
    pub fn take_expired(&mut self) -> Vec<Hash> {
        std::mem::take(&mut self.expired)
    }

    /// Put back expired ids whose deletion did not commit
    pub fn requeue_expired(&mut self, ids: Vec<Hash>) {
        self.expired.extend(ids);
    }

    pub fn contains(&self, call_id: &Hash) -> bool {
        self.seen.contains(call_id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn prune(&mut self, now: Timestamp) {
        let expiry_ms = self.expiry_ms;
        let seen = &mut self.seen;
        let expired = &mut self.expired;
        self.order.retain(|(id, timestamp)| {
            let live = timestamp.elapsed_millis(now) <= expiry_ms;
            if !live {
                seen.remove(id);
                expired.push(*id);
            }
            live
        });
    }
}

/// Outcome of an accepted call
#[derive(Debug, Clone, Serialize)]
pub struct CallReceipt {
    pub call_id: Hash,
    pub call: &'static str,
    pub transition: Transition,
    pub state_version: u64,
}

/// Node runtime managing all components
pub struct NodeRuntime {
    config: NodeConfig,
    keypair: KeyPair,
    election_id: ElectionId,
    ledger: Arc<ElectionLedger<dyn StateStore>>,
    replay_cache: Mutex<ReplayCache>,
    state: RwLock<(StateVersion, StateRoot)>,
}

impl NodeRuntime {
    /// Open the configured store and bring it up to `genesis`
    pub async fn initialize(
        config: NodeConfig,
        keypair: KeyPair,
        genesis: ElectionGenesis,
    ) -> BallotResult<Self> {
        let store = open_store(&config)?;
        Self::with_store(config, keypair, genesis, store).await
    }

    /// Bring `store` up to `genesis`
    pub async fn with_store(
        config: NodeConfig,
        keypair: KeyPair,
        genesis: ElectionGenesis,
        store: Arc<dyn StateStore>,
    ) -> BallotResult<Self> {
        let election_id = genesis.election_id()?;

        let ledger = Arc::new(GenesisInitializer::new(store, genesis).initialize().await?);

        let mut replay_cache = ReplayCache::new(
            config.calls.replay_cache_size,
            config.calls.expiry_seconds,
        );
        let now = Timestamp::now();
        for (call_id, timestamp) in ledger.store().call_records().await? {
            replay_cache.restore(call_id, timestamp, now);
        }
        if !replay_cache.is_empty() {
            info!("Restored {} live call ids", replay_cache.len());
        }

        let runtime = Self {
            config,
            keypair,
            election_id,
            ledger,
            replay_cache: Mutex::new(replay_cache),
            state: RwLock::new((StateVersion::new(0), Hash::ZERO)),
        };
        runtime.refresh_state().await?;

        let (version, root) = runtime.state();
        info!(
            "Election {} ready at {}, state root: {}",
            runtime.election_id, version, root
        );

        Ok(runtime)
    }

    /// Publish the ledger's version and root, never moving backwards
    async fn refresh_state(&self) -> BallotResult<()> {
        let (version, root) = self.ledger.state().await?;

        let mut state = self.state.write();
        if version >= state.0 {
            *state = (version, root);
        }
        Ok(())
    }

    /// Verify a signed call and commit it to the ledger
    pub async fn submit_call(&self, signed: SignedCall) -> BallotResult<CallReceipt> {
        if signed.election_id != self.election_id {
            return Err(BallotError::ElectionMismatch {
                expected: self.election_id.to_hex(),
                got: signed.election_id.to_hex(),
            });
        }

        let now = Timestamp::now();
        let expiry_seconds = self.config.calls.expiry_seconds;
        if signed.is_expired(expiry_seconds, now) {
            return Err(BallotError::CallExpired);
        }
        // A far-future timestamp would outlive its replay cache entry
        if now.elapsed_millis(signed.timestamp) > expiry_seconds.saturating_mul(1000) {
            return Err(BallotError::InvalidCall(
                "timestamp is too far in the future".into(),
            ));
        }

        let verified = VerifiedCall::new(signed)?;
        let call_id = verified.call_id;

        let forget = {
            let mut cache = self.replay_cache.lock();
            cache.reserve(call_id, verified.timestamp, now)?;
            cache.take_expired()
        };

        let commit = match self.ledger.execute_call(&verified, &forget).await {
            Ok(commit) => commit,
            Err(e) => {
                {
                    let mut cache = self.replay_cache.lock();
                    cache.release(&call_id);
                    cache.requeue_expired(forget);
                }
                if e.is_election_rejection() {
                    info!("Call {} rejected: {}", call_id, e);
                } else {
                    warn!("Call {} failed: {}", call_id, e);
                }
                return Err(e);
            }
        };

        // The call is durable at this point; a stale status is not worth failing it
        if let Err(e) = self.refresh_state().await {
            warn!("Call {} committed but state refresh failed: {}", call_id, e);
        }
        debug!("Call {} committed at {}", call_id, commit.version);

        Ok(CallReceipt {
            call_id,
            call: verified.call.name(),
            transition: commit.transition,
            state_version: commit.version.0,
        })
    }

    pub fn election_id(&self) -> ElectionId {
        self.election_id
    }

    /// Address of the node's own key
    pub fn node_address(&self) -> Address {
        self.keypair.address()
    }

    /// Last published version and root, always from the same commit
    pub fn state(&self) -> (StateVersion, StateRoot) {
        *self.state.read()
    }

    pub fn title(&self) -> String {
        self.ledger.title()
    }

    pub fn owner(&self) -> Address {
        self.ledger.owner()
    }

    pub fn summary(&self) -> ElectionSummary {
        self.ledger.summary()
    }

    pub fn results(&self) -> Results {
        self.ledger.results()
    }

    pub fn winner(&self) -> BallotResult<(usize, Candidate)> {
        self.ledger.winner()
    }

    pub fn registration(&self, voter_id: &VoterId) -> Option<VoterRecord> {
        self.ledger.registration(voter_id)
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<ElectionLedger<dyn StateStore>> {
        &self.ledger
    }
}

fn open_store(config: &NodeConfig) -> BallotResult<Arc<dyn StateStore>> {
    let store: Arc<dyn StateStore> = match config.storage.backend {
        StorageBackend::Memory => {
            info!("Using in-memory storage");
            create_memory_store()
        }
        StorageBackend::Sled => {
            std::fs::create_dir_all(&config.data_dir)?;
            let path = config.db_path();
            info!("Using sled storage at {}", path.display());
            create_sled_store(path)?
        }
    };
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ballot_core::{StateChange, StateMutator, StateProvider};
    use ballot_election::BallotCall;
    use ballot_state::{MemoryStateStore, StateEntry};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    struct Fixture {
        runtime: NodeRuntime,
        owner: KeyPair,
        voter: KeyPair,
    }

    fn genesis_for(owner: &KeyPair, voter: &KeyPair) -> ElectionGenesis {
        ElectionGenesis::devnet(owner.address()).add_voter("SCII/00721/2017", voter.address())
    }

    async fn fixture(config: NodeConfig) -> Fixture {
        let owner = KeyPair::generate();
        let voter = KeyPair::generate();

        let runtime =
            NodeRuntime::initialize(config, KeyPair::generate(), genesis_for(&owner, &voter))
                .await
                .unwrap();

        Fixture {
            runtime,
            owner,
            voter,
        }
    }

    fn vote(f: &Fixture, candidate_index: usize) -> SignedCall {
        SignedCall::new(
            BallotCall::Vote {
                voter_id: VoterId::from("SCII/00721/2017"),
                candidate_index,
            },
            f.runtime.election_id(),
            &f.voter,
        )
    }

    fn proposal(name: &str, election_id: ElectionId, owner: &KeyPair) -> SignedCall {
        SignedCall::new(
            BallotCall::RegisterProposal {
                name: name.into(),
                image: String::new(),
            },
            election_id,
            owner,
        )
    }

    fn candidate_names(runtime: &NodeRuntime) -> Vec<String> {
        runtime
            .results()
            .candidates
            .into_iter()
            .map(|c| c.name)
            .collect()
    }

    fn sled_config(tmp: &TempDir) -> NodeConfig {
        let mut config = NodeConfig::default();
        config.storage.backend = StorageBackend::Sled;
        config.data_dir = tmp.path().to_path_buf();
        config
    }

    #[test]
    fn test_replay_cache_full_refuses_instead_of_evicting() {
        let mut cache = ReplayCache::new(2, 300);
        let now = Timestamp::from_millis(1_000);

        cache.reserve(Hash([1; 32]), now, now).unwrap();
        assert!(matches!(
            cache.reserve(Hash([1; 32]), now, now),
            Err(BallotError::ReplayedCall(_))
        ));
        cache.reserve(Hash([2; 32]), now, now).unwrap();
        assert!(matches!(
            cache.reserve(Hash([3; 32]), now, now),
            Err(BallotError::InvalidCall(_))
        ));

        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&Hash([1; 32])));
        assert!(matches!(
            cache.reserve(Hash([1; 32]), now, now),
            Err(BallotError::ReplayedCall(_))
        ));

        // Room again once the first entries expire
        let later = Timestamp::from_millis(1_000 + 301_000);
        cache.reserve(Hash([3; 32]), later, later).unwrap();
        assert_eq!(cache.len(), 1);

        let mut expired = cache.take_expired();
        expired.sort_by_key(|id| id.0);
        assert_eq!(expired, vec![Hash([1; 32]), Hash([2; 32])]);
        assert!(cache.take_expired().is_empty());
    }

    #[test]
    fn test_replay_cache_forgets_expired() {
        let mut cache = ReplayCache::new(10, 1);
        let t0 = Timestamp::from_millis(1_000);

        cache.reserve(Hash([1; 32]), t0, t0).unwrap();
        cache
            .reserve(Hash([2; 32]), t0, Timestamp::from_millis(2_001))
            .unwrap();

        assert!(!cache.contains(&Hash([1; 32])));
        assert_eq!(cache.len(), 1);

        cache.release(&Hash([2; 32]));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_replay_cache_restore() {
        let mut cache = ReplayCache::new(1, 10);
        let now = Timestamp::from_millis(100_000);

        cache.restore(Hash([1; 32]), Timestamp::from_millis(95_000), now);
        cache.restore(Hash([2; 32]), Timestamp::from_millis(99_000), now);
        cache.restore(Hash([3; 32]), Timestamp::from_millis(1_000), now);

        // Restored entries are kept even past capacity
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&Hash([1; 32])));
        assert!(!cache.contains(&Hash([3; 32])));
        assert_eq!(cache.take_expired(), vec![Hash([3; 32])]);
    }

    #[tokio::test]
    async fn test_initialize_from_genesis() {
        let f = fixture(NodeConfig::default()).await;
        let summary = f.runtime.summary();
        let (version, root) = f.runtime.state();

        assert_eq!(f.runtime.owner(), f.owner.address());
        assert_eq!(summary.candidate_count, 3);
        assert_eq!(summary.voter_count, 1);
        assert!(version.0 > 0);
        assert_ne!(root, Hash::ZERO);
    }

    #[tokio::test]
    async fn test_submit_vote() {
        let f = fixture(NodeConfig::default()).await;
        let (_, root_before) = f.runtime.state();

        let receipt = f.runtime.submit_call(vote(&f, 1)).await.unwrap();

        assert_eq!(receipt.call, "vote");
        assert_eq!(f.runtime.results().candidates[1].vote_count, 1);
        assert_eq!(f.runtime.winner().unwrap().1.name, "Rust");

        let (version, root) = f.runtime.state();
        assert_ne!(root, root_before);
        assert_eq!(receipt.state_version, version.0);
    }

    #[tokio::test]
    async fn test_replayed_call_rejected() {
        let f = fixture(NodeConfig::default()).await;
        let call = vote(&f, 0);

        f.runtime.submit_call(call.clone()).await.unwrap();
        assert!(matches!(
            f.runtime.submit_call(call).await,
            Err(BallotError::ReplayedCall(_))
        ));
        assert_eq!(f.runtime.summary().total_votes, 1);
    }

    #[tokio::test]
    async fn test_full_replay_cache_keeps_protecting_admitted_calls() {
        let mut config = NodeConfig::default();
        config.calls.replay_cache_size = 2;
        let f = fixture(config).await;
        let election_id = f.runtime.election_id();

        let go = proposal("Go", election_id, &f.owner);
        f.runtime.submit_call(go.clone()).await.unwrap();
        f.runtime
            .submit_call(proposal("A", election_id, &f.owner))
            .await
            .unwrap();

        // No live entry is given up to make room
        assert!(matches!(
            f.runtime
                .submit_call(proposal("B", election_id, &f.owner))
                .await,
            Err(BallotError::InvalidCall(_))
        ));
        assert!(matches!(
            f.runtime.submit_call(go).await,
            Err(BallotError::ReplayedCall(_))
        ));

        assert_eq!(
            candidate_names(&f.runtime),
            vec!["Solidity", "Rust", "Web2", "Go", "A"]
        );
    }

    #[tokio::test]
    async fn test_replay_after_restart_rejected() {
        let tmp = TempDir::new().unwrap();
        let owner = KeyPair::generate();
        let voter = KeyPair::generate();
        let genesis = genesis_for(&owner, &voter);

        let go = {
            let runtime =
                NodeRuntime::initialize(sled_config(&tmp), KeyPair::generate(), genesis.clone())
                    .await
                    .unwrap();
            let go = proposal("Go", runtime.election_id(), &owner);
            runtime.submit_call(go.clone()).await.unwrap();
            go
        };

        let runtime = NodeRuntime::initialize(sled_config(&tmp), KeyPair::generate(), genesis)
            .await
            .unwrap();
        assert!(matches!(
            runtime.submit_call(go).await,
            Err(BallotError::ReplayedCall(_))
        ));
        assert_eq!(
            candidate_names(&runtime),
            vec!["Solidity", "Rust", "Web2", "Go"]
        );
    }

    #[tokio::test]
    async fn test_concurrent_calls_publish_matching_state() {
        let f = fixture(NodeConfig::default()).await;
        let runtime = Arc::new(f.runtime);
        let election_id = runtime.election_id();

        let mut handles = Vec::new();
        for i in 0..16 {
            let runtime = runtime.clone();
            let call = proposal(&format!("C{}", i), election_id, &f.owner);
            handles.push(tokio::spawn(async move { runtime.submit_call(call).await }));
        }

        let mut versions = Vec::new();
        for handle in handles {
            versions.push(handle.await.unwrap().unwrap().state_version);
        }
        versions.sort_unstable();
        versions.dedup();
        assert_eq!(versions.len(), 16);

        let store = runtime.ledger().store();
        let (version, root) = runtime.state();
        assert_eq!(version, store.version().await);
        assert_eq!(root, store.compute_root().await.unwrap());
    }

    #[tokio::test]
    async fn test_foreign_election_rejected() {
        let f = fixture(NodeConfig::default()).await;
        let call = SignedCall::new(
            BallotCall::Vote {
                voter_id: VoterId::from("SCII/00721/2017"),
                candidate_index: 0,
            },
            Hash([9u8; 32]),
            &f.voter,
        );

        assert!(matches!(
            f.runtime.submit_call(call).await,
            Err(BallotError::ElectionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_stale_and_future_calls_rejected() {
        let f = fixture(NodeConfig::default()).await;
        let call = BallotCall::Vote {
            voter_id: VoterId::from("SCII/00721/2017"),
            candidate_index: 0,
        };
        let now = Timestamp::now().as_millis();

        let stale = SignedCall::new_at(
            call.clone(),
            f.runtime.election_id(),
            &f.voter,
            Timestamp::from_millis(now - 3_600_000),
        );
        assert!(matches!(
            f.runtime.submit_call(stale).await,
            Err(BallotError::CallExpired)
        ));

        let future = SignedCall::new_at(
            call,
            f.runtime.election_id(),
            &f.voter,
            Timestamp::from_millis(now + 3_600_000),
        );
        assert!(matches!(
            f.runtime.submit_call(future).await,
            Err(BallotError::InvalidCall(_))
        ));
    }

    #[tokio::test]
    async fn test_owner_calls() {
        let f = fixture(NodeConfig::default()).await;
        let newcomer = KeyPair::generate();

        let register = SignedCall::new(
            BallotCall::RegisterVoter {
                address: newcomer.address(),
                voter_id: VoterId::from("SCII/00722/2017"),
            },
            f.runtime.election_id(),
            &f.owner,
        );
        f.runtime.submit_call(register).await.unwrap();
        assert!(f
            .runtime
            .registration(&VoterId::from("SCII/00722/2017"))
            .is_some());

        // Same call signed by a non-owner
        let rogue = proposal("Go", f.runtime.election_id(), &newcomer);
        assert!(matches!(
            f.runtime.submit_call(rogue).await,
            Err(BallotError::Unauthorized)
        ));
        assert_eq!(f.runtime.summary().candidate_count, 3);
    }

    #[tokio::test]
    async fn test_sled_backend_survives_restart() {
        let tmp = TempDir::new().unwrap();
        let owner = KeyPair::generate();
        let voter = KeyPair::generate();
        let genesis = genesis_for(&owner, &voter);

        {
            let runtime =
                NodeRuntime::initialize(sled_config(&tmp), KeyPair::generate(), genesis.clone())
                    .await
                    .unwrap();
            let call = SignedCall::new(
                BallotCall::Vote {
                    voter_id: VoterId::from("SCII/00721/2017"),
                    candidate_index: 2,
                },
                runtime.election_id(),
                &voter,
            );
            runtime.submit_call(call).await.unwrap();
        }

        let runtime = NodeRuntime::initialize(sled_config(&tmp), KeyPair::generate(), genesis)
            .await
            .unwrap();
        assert_eq!(runtime.summary().total_votes, 1);
        assert_eq!(
            runtime
                .registration(&VoterId::from("SCII/00721/2017"))
                .map(|r| r.voted),
            Some(true)
        );
    }

    /// Memory store whose full scans can be switched off
    struct ScanFailingStore {
        inner: MemoryStateStore,
        fail_scans: AtomicBool,
    }

    #[async_trait]
    impl StateProvider for ScanFailingStore {
        async fn version(&self) -> StateVersion {
            self.inner.version().await
        }

        async fn get(&self, key: &[u8]) -> BallotResult<Option<Vec<u8>>> {
            self.inner.get(key).await
        }
    }

    #[async_trait]
    impl StateMutator for ScanFailingStore {
        async fn apply_batch(&self, changes: Vec<StateChange>) -> BallotResult<StateVersion> {
            self.inner.apply_batch(changes).await
        }
    }

    #[async_trait]
    impl StateStore for ScanFailingStore {
        async fn all_entries(&self) -> BallotResult<Vec<StateEntry>> {
            if self.fail_scans.load(Ordering::SeqCst) {
                return Err(BallotError::StorageError("scan failed".into()));
            }
            self.inner.all_entries().await
        }
    }

    #[tokio::test]
    async fn test_committed_call_survives_failed_refresh() {
        let owner = KeyPair::generate();
        let voter = KeyPair::generate();
        let store = Arc::new(ScanFailingStore {
            inner: MemoryStateStore::new(),
            fail_scans: AtomicBool::new(false),
        });

        let runtime = NodeRuntime::with_store(
            NodeConfig::default(),
            KeyPair::generate(),
            genesis_for(&owner, &voter),
            store.clone(),
        )
        .await
        .unwrap();
        let (version_before, _) = runtime.state();

        store.fail_scans.store(true, Ordering::SeqCst);
        let call = SignedCall::new(
            BallotCall::Vote {
                voter_id: VoterId::from("SCII/00721/2017"),
                candidate_index: 0,
            },
            runtime.election_id(),
            &voter,
        );

        let receipt = runtime.submit_call(call).await.unwrap();
        assert_eq!(receipt.state_version, version_before.0 + 1);
        assert_eq!(runtime.summary().total_votes, 1);
        // Status keeps the last state it could compute
        assert_eq!(runtime.state().0, version_before);
    }
}
