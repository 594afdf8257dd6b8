//! # Governance Engine
//!
//! Satu-satunya pemilik state governance. Tidak ada global: setiap instance
//! `GovernanceEngine` berdiri sendiri (reorg bisa disimulasikan terpisah di test).
//!
//! ## Connect / Disconnect
//!
//! ```text
//! connect_block(b):   b.height == tip + 1
//!   1. block meta (time, staker, fund contribution)
//!   2. tx governance, berurutan, lewat admission
//!   3. vote staker -> VoteCache
//!   4. boundary? evaluasi cycle
//!   5. satu WriteBatch: object, vote, overlay parameter, meta, index
//!
//! disconnect_block(b): b.height == tip
//!   hapus semua entry yang ditulis di b.height (exact inverse), satu WriteBatch
//! ```
//!
//! Error di tengah connect: semua perubahan di height itu di-revert, tip tidak maju.
//!
//! ## Urutan Evaluasi Cycle (CONSENSUS-CRITICAL)
//!
//! Boundary di `h` kalau `h % VOTING_CYCLE_LENGTH == 0`. Window tally:
//! `h - len + 1 ..= h`, block 0 tidak pernah ikut. Hanya object dengan
//! `creation_height < h` yang dievaluasi.
//!
//! 1. consultation + answer (urut hash)
//! 2. proposal (urut hash), fund dikurangi berurutan
//! 3. payment request (urut creation height, lalu hash)
//! 4. deadline proposal
//!
//! ## Persistence Key
//!
//! | Column | Key |
//! |--------|-----|
//! | dao_objects | kind(1) + hash(32), kind = `p`/`r`/`c`/`a` |
//! | vote_list | sha3(staker)(32) + height_BE(4) |
//! | consensus_params | id(1) + height_BE(4) |
//! | meta | `tip`, `b` + height_BE(4) |

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use stock_common::config::{Config, QuorumConfig};

use crate::consensus_params::{
    ConsensusDefaults, ConsensusParams, ConsensusParamsPos as P, ParamEntry, ParamError, ParamReport, ParamType,
};
use crate::dao::admission::{self, AdmissionError};
use crate::dao::answer::{AnswerTx, ConsultationAnswer};
use crate::dao::consultation::{lower_median, Consultation, ConsultationKind, ConsultationTx};
use crate::dao::flags::{DaoState, FundFlags};
use crate::dao::payment_request::{Ed25519Oracle, PaymentRequest, PaymentRequestTx, SignatureOracle};
use crate::dao::proposal::{Proposal, ProposalTx};
use crate::dao::vote_cache::{
    meets_basis_points, BlockCountWeight, HeightVotes, StakeSnapshot, StakeWeightOracle, Tally, TallyRules,
    Thresholds, Verdict, VoteCache,
};
use crate::dao::vote_script::{parse_vote_entries, VoteScriptError, VoteTarget};
use crate::dao::{CycleRecord, DaoError};
use crate::db::{Column, KvStore, StoreError, WriteBatch};
use crate::destination::AddressOwnership;
use crate::index::address::{connect_tx, disconnect_tx, IndexedTx};
use crate::index::token::{connect_token_ops, disconnect_token_ops, TokenUtxoOp};
use crate::types::{Amount, Hash256, Network, StakerScript};

// ════════════════════════════════════════════════════════════════════════════
// BLOCK INPUT
// ════════════════════════════════════════════════════════════════════════════

/// Vote satu staker di satu block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StakerVotes {
    pub staker: StakerScript,
    /// Urut sesuai output; entry berikutnya menimpa entry sebelumnya untuk hash yang sama.
    pub entries: Vec<(Hash256, i64)>,
    /// `Some(fee)` untuk vote light wallet (fee masuk fund), `None` untuk vote coinstake.
    pub light_fee: Option<Amount>,
}

impl StakerVotes {
    /// Decode output OP_RETURN satu tx (coinstake atau light wallet). Remove
    /// yang diikuti vote baru untuk hash yang sama mengganti vote.
    pub fn from_scripts<'a>(
        staker: StakerScript,
        scripts: impl IntoIterator<Item = &'a [u8]>,
        light_fee: Option<Amount>,
    ) -> Result<Self, VoteScriptError> {
        Ok(StakerVotes { staker, entries: parse_vote_entries(scripts)?, light_fee })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GovernanceTx {
    Proposal { txid: Hash256, tx: ProposalTx },
    PaymentRequest { txid: Hash256, tx: PaymentRequestTx },
    Consultation { txid: Hash256, tx: ConsultationTx },
    Answer { txid: Hash256, tx: AnswerTx },
}

impl GovernanceTx {
    pub fn txid(&self) -> Hash256 {
        match self {
            GovernanceTx::Proposal { txid, .. }
            | GovernanceTx::PaymentRequest { txid, .. }
            | GovernanceTx::Consultation { txid, .. }
            | GovernanceTx::Answer { txid, .. } => *txid,
        }
    }
}

/// Efek satu block yang relevan untuk core, disiapkan oleh pipeline validasi.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectedBlock {
    pub height: u32,
    pub time: u32,
    pub staker: StakerScript,
    pub votes: Vec<StakerVotes>,
    pub transactions: Vec<GovernanceTx>,
    pub fund_contribution: Amount,
    pub index_txs: Vec<IndexedTx>,
    pub token_ops: Vec<TokenUtxoOp>,
}

impl ConnectedBlock {
    pub fn new(height: u32, time: u32, staker: StakerScript) -> Self {
        ConnectedBlock {
            height,
            time,
            staker,
            votes: Vec::new(),
            transactions: Vec::new(),
            fund_contribution: 0,
            index_txs: Vec::new(),
            token_ops: Vec::new(),
        }
    }

    /// Vote coinstake dari staker block ini.
    pub fn with_votes(mut self, entries: Vec<(Hash256, i64)>) -> Self {
        self.votes.push(StakerVotes { staker: self.staker.clone(), entries, light_fee: None });
        self
    }

    /// Vote coinstake staker block ini, dari script output coinstake.
    pub fn with_vote_scripts<'a>(
        mut self,
        scripts: impl IntoIterator<Item = &'a [u8]>,
    ) -> Result<Self, VoteScriptError> {
        let votes = StakerVotes::from_scripts(self.staker.clone(), scripts, None)?;
        self.votes.push(votes);
        Ok(self)
    }

    pub fn with_tx(mut self, tx: GovernanceTx) -> Self {
        self.transactions.push(tx);
        self
    }

    fn voters(&self) -> BTreeSet<StakerScript> {
        self.votes
            .iter()
            .filter(|v| !v.entries.is_empty())
            .map(|v| v.staker.clone())
            .collect()
    }

    /// Isi vote cache di height block ini setelah connect: entry diterapkan
    /// berurutan, entry terakhir menang.
    fn height_votes(&self) -> BTreeMap<StakerScript, HeightVotes> {
        let mut out: BTreeMap<StakerScript, HeightVotes> = BTreeMap::new();
        for votes in self.votes.iter().filter(|v| !v.entries.is_empty()) {
            let list = out.entry(votes.staker.clone()).or_default();
            for (hash, value) in &votes.entries {
                list.insert(*hash, *value);
            }
        }
        out
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMeta {
    pub time: u32,
    pub staker: StakerScript,
    pub fund_contribution: Amount,
    pub light_fees: Amount,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockSummary {
    pub height: u32,
    pub created: usize,
    pub votes: usize,
    pub transitions: usize,
    pub boundary: bool,
}

// ════════════════════════════════════════════════════════════════════════════
// SETTINGS
// ════════════════════════════════════════════════════════════════════════════

/// Sumber quorum untuk object dengan flag REDUCED_QUORUM.
///
/// Formula reduced quorum tidak diturunkan; yang dikonfigurasi adalah id
/// parameter mana yang memberi nilai quorum efektif.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuorumTable {
    pub proposal_reduced: P,
    pub payment_request_reduced: P,
}

impl Default for QuorumTable {
    fn default() -> Self {
        QuorumTable { proposal_reduced: P::ProposalMinQuorum, payment_request_reduced: P::PaymentRequestMinQuorum }
    }
}

impl QuorumTable {
    pub fn from_config(cfg: &QuorumConfig) -> Result<Self, ParamError> {
        let mut table = QuorumTable::default();
        if let Some(name) = &cfg.proposal_reduced {
            table.proposal_reduced = percent_param(name)?;
        }
        if let Some(name) = &cfg.payment_request_reduced {
            table.payment_request_reduced = percent_param(name)?;
        }
        Ok(table)
    }

    fn proposal(&self, flags: &FundFlags) -> P {
        if flags.reduced_quorum { self.proposal_reduced } else { P::ProposalMinQuorum }
    }

    fn payment_request(&self, flags: &FundFlags) -> P {
        if flags.reduced_quorum { self.payment_request_reduced } else { P::PaymentRequestMinQuorum }
    }
}

fn percent_param(name: &str) -> Result<P, ParamError> {
    let id = P::from_str(name)?;
    if id.param_type() != ParamType::Percent {
        return Err(ParamError::InvalidValue { param: id, value: 0, reason: "quorum source must be a percent parameter" });
    }
    Ok(id)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GovernanceSettings {
    pub network: Network,
    pub defaults: ConsensusDefaults,
    pub quorum: QuorumTable,
}

impl GovernanceSettings {
    pub fn for_network(network: Network) -> Self {
        GovernanceSettings {
            network,
            defaults: ConsensusDefaults::for_network(network),
            quorum: QuorumTable::default(),
        }
    }

    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let network = Network::from_str(cfg.network.as_deref().unwrap_or("main"))?;
        let defaults = ConsensusDefaults::for_network(network).with_overrides(&cfg.consensus_overrides)?;
        let quorum = QuorumTable::from_config(&cfg.quorum)?;
        Ok(GovernanceSettings { network, defaults, quorum })
    }

    pub fn with_overrides(mut self, overrides: &[(P, i64)]) -> Result<Self, ParamError> {
        for (id, value) in overrides {
            self.defaults.set(*id, *value)?;
        }
        Ok(self)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// STATE
// ════════════════════════════════════════════════════════════════════════════

/// Seluruh state governance yang direplikasi. Dua node dengan chain aktif yang
/// sama harus punya `GovernanceState` yang sama persis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GovernanceState {
    pub params: ConsensusParams,
    pub proposals: BTreeMap<Hash256, Proposal>,
    pub payment_requests: BTreeMap<Hash256, PaymentRequest>,
    pub consultations: BTreeMap<Hash256, Consultation>,
    pub answers: BTreeMap<Hash256, ConsultationAnswer>,
    pub votes: VoteCache,
    pub blocks: BTreeMap<u32, BlockMeta>,
    pub tip: Option<u32>,
}

impl GovernanceState {
    pub fn new(params: ConsensusParams) -> Self {
        GovernanceState {
            params,
            proposals: BTreeMap::new(),
            payment_requests: BTreeMap::new(),
            consultations: BTreeMap::new(),
            answers: BTreeMap::new(),
            votes: VoteCache::new(),
            blocks: BTreeMap::new(),
            tip: None,
        }
    }

    pub fn contains(&self, hash: &Hash256) -> bool {
        self.proposals.contains_key(hash)
            || self.payment_requests.contains_key(hash)
            || self.consultations.contains_key(hash)
            || self.answers.contains_key(hash)
    }

    pub fn answers_of<'a>(&'a self, parent: &Hash256) -> impl Iterator<Item = &'a ConsultationAnswer> + 'a {
        let parent = *parent;
        self.answers.values().filter(move |a| a.parent == parent)
    }

    pub fn payment_requests_of<'a>(&'a self, proposal: &Hash256) -> impl Iterator<Item = &'a PaymentRequest> + 'a {
        let proposal = *proposal;
        self.payment_requests.values().filter(move |pr| pr.proposal_hash == proposal)
    }

    pub fn param(&self, id: P, height: u32) -> i64 {
        self.params.get_consensus_parameter(id, height)
    }

    /// Community fund yang belum terkunci:
    /// kontribusi - payment request terbayar - sisa proposal ACCEPTED (non-super).
    pub fn fund_available(&self, tip: u32) -> Amount {
        let contributions: Amount = self
            .blocks
            .range(..=tip)
            .map(|(_, m)| m.fund_contribution + m.light_fees)
            .sum();
        let mut paid: Amount = 0;
        let mut locked: Amount = 0;
        for proposal in self.proposals.values().filter(|p| !p.is_super()) {
            paid += self
                .payment_requests_of(&proposal.hash)
                .filter(|pr| pr.state_at(tip) == DaoState::Accepted)
                .map(|pr| pr.amount)
                .sum::<Amount>();
            if matches!(proposal.state_at(tip), DaoState::Accepted | DaoState::PendingVotingPreq) {
                locked += proposal.available(self.payment_requests_of(&proposal.hash), tip, false);
            }
        }
        contributions - paid - locked
    }

    /// Target vote kalau object saat ini bisa di-vote.
    pub fn vote_target(&self, hash: &Hash256, tip: u32) -> Option<VoteTarget> {
        if let Some(p) = self.proposals.get(hash) {
            return p.is_votable(tip).then_some(VoteTarget::Proposal);
        }
        if let Some(pr) = self.payment_requests.get(hash) {
            return pr.is_votable(tip).then_some(VoteTarget::PaymentRequest);
        }
        if let Some(c) = self.consultations.get(hash) {
            return match c.state_at(tip) {
                DaoState::Nil if c.is_range() => Some(VoteTarget::Support),
                DaoState::Accepted => Some(VoteTarget::Consultation),
                _ => None,
            };
        }
        let answer = self.answers.get(hash)?;
        let parent = self.consultations.get(&answer.parent)?;
        match parent.state_at(tip) {
            DaoState::Nil => Some(VoteTarget::Support),
            DaoState::Accepted if answer.is_supported(tip) => Some(VoteTarget::Support),
            _ => None,
        }
    }

    pub fn state_of(&self, hash: &Hash256, tip: u32) -> Option<DaoState> {
        if let Some(p) = self.proposals.get(hash) {
            return Some(p.state_at(tip));
        }
        if let Some(pr) = self.payment_requests.get(hash) {
            return Some(pr.state_at(tip));
        }
        if let Some(c) = self.consultations.get(hash) {
            return Some(c.state_at(tip));
        }
        self.answers.get(hash).map(|a| a.state_at(tip))
    }
}

// ════════════════════════════════════════════════════════════════════════════
// DIRTY TRACKING
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum ObjectKind {
    Proposal,
    PaymentRequest,
    Consultation,
    Answer,
}

impl ObjectKind {
    fn prefix(self) -> u8 {
        match self {
            ObjectKind::Proposal => b'p',
            ObjectKind::PaymentRequest => b'r',
            ObjectKind::Consultation => b'c',
            ObjectKind::Answer => b'a',
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Proposal => "proposal",
            ObjectKind::PaymentRequest => "payment_request",
            ObjectKind::Consultation => "consultation",
            ObjectKind::Answer => "answer",
        }
    }
}

fn object_key(kind: ObjectKind, hash: &Hash256) -> Vec<u8> {
    let mut key = Vec::with_capacity(33);
    key.push(kind.prefix());
    key.extend_from_slice(hash.as_bytes());
    key
}

fn vote_key(staker: &StakerScript, height: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(36);
    key.extend_from_slice(staker.key_hash().as_bytes());
    key.extend_from_slice(&height.to_be_bytes());
    key
}

fn param_key(id: P, height: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(5);
    key.push(id.index() as u8);
    key.extend_from_slice(&height.to_be_bytes());
    key
}

const META_TIP: &[u8] = b"tip";
const META_BLOCK: u8 = b'b';

fn block_key(height: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(5);
    key.push(META_BLOCK);
    key.extend_from_slice(&height.to_be_bytes());
    key
}

/// Yang berubah di satu height; dipakai untuk menyusun WriteBatch.
#[derive(Debug, Default)]
struct Touched {
    objects: BTreeSet<(ObjectKind, Hash256)>,
    stakers: BTreeSet<StakerScript>,
    params: BTreeSet<P>,
    created: usize,
    transitions: usize,
}

impl Touched {
    fn object(&mut self, kind: ObjectKind, hash: Hash256) {
        self.objects.insert((kind, hash));
    }
}

fn transition<F>(
    kind: ObjectKind,
    hash: &Hash256,
    height: u32,
    state: DaoState,
    touched: &mut Touched,
    push: F,
) -> Result<(), DaoError>
where
    F: FnOnce(u32, DaoState) -> Result<(), DaoError>,
{
    push(height, state)?;
    debug!(kind = kind.as_str(), object = %hash, %state, height, "dao state transition");
    touched.object(kind, *hash);
    touched.transitions += 1;
    Ok(())
}

fn fund_rules(flags: &FundFlags) -> TallyRules {
    TallyRules { abstain_in_quorum: flags.abstain_vote, abstain_in_support: !flags.exclude }
}

// ════════════════════════════════════════════════════════════════════════════
// ENGINE
// ════════════════════════════════════════════════════════════════════════════

pub struct GovernanceEngine {
    state: GovernanceState,
    settings: GovernanceSettings,
    weights: Box<dyn StakeWeightOracle>,
    signatures: Box<dyn SignatureOracle>,
    store: Arc<dyn KvStore>,
}

impl std::fmt::Debug for GovernanceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GovernanceEngine")
            .field("network", &self.settings.network)
            .field("tip", &self.state.tip)
            .field("proposals", &self.state.proposals.len())
            .field("consultations", &self.state.consultations.len())
            .finish()
    }
}

impl GovernanceEngine {
    /// Engine kosong dengan oracle default (bobot = jumlah block di-stake,
    /// signature Ed25519).
    pub fn new(store: Arc<dyn KvStore>, settings: GovernanceSettings) -> Self {
        let params = ConsensusParams::new(settings.defaults.clone());
        GovernanceEngine {
            state: GovernanceState::new(params),
            settings,
            weights: Box::new(BlockCountWeight),
            signatures: Box::new(Ed25519Oracle),
            store,
        }
    }

    pub fn with_weights(mut self, weights: Box<dyn StakeWeightOracle>) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_signatures(mut self, signatures: Box<dyn SignatureOracle>) -> Self {
        self.signatures = signatures;
        self
    }

    pub fn state(&self) -> &GovernanceState {
        &self.state
    }

    pub fn settings(&self) -> &GovernanceSettings {
        &self.settings
    }

    pub fn tip(&self) -> Option<u32> {
        self.state.tip
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    fn query_tip(&self) -> u32 {
        self.state.tip.unwrap_or(0)
    }

    // ────────────────────────────────────────────────────────────────────────
    // CONNECT / DISCONNECT
    // ────────────────────────────────────────────────────────────────────────

    pub fn connect_block(&mut self, block: &ConnectedBlock) -> Result<BlockSummary, DaoError> {
        if let Some(tip) = self.state.tip {
            let expected = tip.saturating_add(1);
            if block.height != expected {
                return Err(DaoError::OutOfOrder { expected, got: block.height });
            }
        }
        let previous_tip = self.state.tip;
        let mut touched = Touched::default();

        let boundary = match self.apply_block(block, &mut touched) {
            Ok(boundary) => boundary,
            Err(e) => {
                warn!(height = block.height, error = %e, "governance block rejected");
                self.revert_height(block.height, None)?;
                self.state.tip = previous_tip;
                return Err(e);
            }
        };
        self.state.tip = Some(block.height);

        let mut batch = self.state_batch(block.height, &touched)?;
        for (txindex, tx) in block.index_txs.iter().enumerate() {
            connect_tx(&mut batch, block.height, txindex as u32, block.time, tx);
        }
        connect_token_ops(&mut batch, block.height, &block.token_ops);

        if let Err(e) = self.store.write_batch(batch) {
            warn!(height = block.height, error = %e, "governance batch write failed");
            self.revert_height(block.height, None)?;
            self.state.tip = previous_tip;
            return Err(e.into());
        }

        let summary = BlockSummary {
            height: block.height,
            created: touched.created,
            votes: block.votes.iter().map(|v| v.entries.len()).sum(),
            transitions: touched.transitions,
            boundary,
        };
        if boundary || summary.created > 0 {
            info!(
                height = summary.height,
                created = summary.created,
                transitions = summary.transitions,
                boundary,
                "governance block connected"
            );
        }
        Ok(summary)
    }

    pub fn disconnect_block(&mut self, block: &ConnectedBlock) -> Result<BlockSummary, DaoError> {
        match self.state.tip {
            Some(tip) if tip == block.height => {}
            Some(tip) => return Err(DaoError::OutOfOrder { expected: tip, got: block.height }),
            None => return Err(DaoError::ReorgInconsistency(format!("disconnect of {} with empty chain", block.height))),
        }
        // block yang di-disconnect harus sama persis dengan yang di-connect
        let expected = block.height_votes();
        let cached = self.state.votes.votes_at_height(block.height);
        if let Some(staker) = expected
            .keys()
            .chain(cached.keys())
            .find(|s| expected.get(*s) != cached.get(*s))
        {
            return Err(DaoError::ReorgInconsistency(format!(
                "votes of {} at height {} do not match the connected block",
                staker, block.height
            )));
        }
        let voters = block.voters();
        let touched = self.revert_height(block.height, Some(&voters))?;

        let mut batch = self.state_batch(block.height, &touched)?;
        for (txindex, tx) in block.index_txs.iter().enumerate().rev() {
            disconnect_tx(&mut batch, block.height, txindex as u32, block.time, tx);
        }
        disconnect_token_ops(&mut batch, block.height, &block.token_ops);
        self.store.write_batch(batch)?;

        info!(height = block.height, transitions = touched.transitions, "governance block disconnected");
        Ok(BlockSummary {
            height: block.height,
            created: touched.created,
            votes: block.votes.iter().map(|v| v.entries.len()).sum(),
            transitions: touched.transitions,
            boundary: false,
        })
    }

    /// Apply tanpa persist. Return true kalau height adalah boundary cycle.
    fn apply_block(&mut self, block: &ConnectedBlock, touched: &mut Touched) -> Result<bool, DaoError> {
        let height = block.height;

        // 1. Block meta
        let mut light_fees: Amount = 0;
        for votes in &block.votes {
            if let Some(fee) = votes.light_fee {
                admission::check_light_fee(&self.state, fee, height)?;
                light_fees = light_fees
                    .checked_add(fee)
                    .ok_or(AdmissionError::AmountOverflow { kind: "light vote fee" })?;
            }
        }
        self.state.blocks.insert(
            height,
            BlockMeta {
                time: block.time,
                staker: block.staker.clone(),
                fund_contribution: block.fund_contribution,
                light_fees,
            },
        );

        // 2. Tx governance
        for tx in &block.transactions {
            self.admit_tx(tx, height, touched)?;
        }

        // 3. Vote
        for votes in block.votes.iter().filter(|v| !v.entries.is_empty()) {
            for (hash, value) in &votes.entries {
                admission::check_vote(&self.state, hash, *value)?;
            }
            self.state.votes.record_votes(&votes.staker, height, &votes.entries);
            touched.stakers.insert(votes.staker.clone());
        }

        // 4. Boundary
        let len = self.cycle_length(height);
        let boundary = height > 0 && height % len == 0;
        if boundary {
            self.evaluate_cycle(height, len, touched)?;
        }
        Ok(boundary)
    }

    fn cycle_length(&self, height: u32) -> u32 {
        let len = self.state.param(P::VotingCycleLength, height).max(1);
        u32::try_from(len).unwrap_or(u32::MAX)
    }

    fn admit_tx(&mut self, tx: &GovernanceTx, height: u32, touched: &mut Touched) -> Result<(), DaoError> {
        let state = &mut self.state;
        match tx {
            GovernanceTx::Proposal { txid, tx } => {
                admission::check_proposal(state, txid, tx, height)?;
                state.proposals.insert(*txid, Proposal::from_tx(*txid, tx, height)?);
                touched.object(ObjectKind::Proposal, *txid);
            }
            GovernanceTx::PaymentRequest { txid, tx } => {
                admission::check_payment_request(state, txid, tx, height, self.signatures.as_ref())?;
                state.payment_requests.insert(*txid, PaymentRequest::from_tx(*txid, tx, height)?);
                touched.object(ObjectKind::PaymentRequest, *txid);
            }
            GovernanceTx::Consultation { txid, tx } => {
                admission::check_consultation(state, txid, tx, height)?;
                let consultation = Consultation::from_tx(*txid, tx, height)?;
                let answer_version = if consultation.flags.super_version {
                    crate::dao::flags::answer_version::BASE | crate::dao::flags::answer_version::SUPER
                } else {
                    crate::dao::flags::answer_version::BASE
                };
                for (index, value) in tx.initial_answers.iter().enumerate() {
                    let hash = ConsultationAnswer::initial_hash(txid, index as u32);
                    let answer_tx = AnswerTx { parent: *txid, value: value.clone(), version: answer_version, fee: 0 };
                    state.answers.insert(hash, ConsultationAnswer::from_tx(hash, &answer_tx, height)?);
                    touched.object(ObjectKind::Answer, hash);
                    touched.created += 1;
                }
                state.consultations.insert(*txid, consultation);
                touched.object(ObjectKind::Consultation, *txid);
            }
            GovernanceTx::Answer { txid, tx } => {
                admission::check_answer(state, txid, tx, height)?;
                state.answers.insert(*txid, ConsultationAnswer::from_tx(*txid, tx, height)?);
                touched.object(ObjectKind::Answer, *txid);
            }
        }
        touched.created += 1;
        debug!(txid = %tx.txid(), height, "governance object created");
        Ok(())
    }

    /// Hapus semua efek di `height`. `voters` diisi saat disconnect: rollback
    /// vote yang tidak ada = inkonsistensi reorg.
    fn revert_height(&mut self, height: u32, voters: Option<&BTreeSet<StakerScript>>) -> Result<Touched, DaoError> {
        let mut touched = Touched::default();
        let state = &mut self.state;

        macro_rules! revert_objects {
            ($map:expr, $kind:expr) => {{
                let mut created = Vec::new();
                for (hash, obj) in $map.iter_mut() {
                    if obj.creation_height == height {
                        created.push(*hash);
                    } else if obj.remove_at(height) {
                        touched.object($kind, *hash);
                        touched.transitions += 1;
                    }
                }
                for hash in created {
                    $map.remove(&hash);
                    touched.object($kind, hash);
                    touched.created += 1;
                }
            }};
        }
        revert_objects!(state.proposals, ObjectKind::Proposal);
        revert_objects!(state.payment_requests, ObjectKind::PaymentRequest);
        revert_objects!(state.consultations, ObjectKind::Consultation);
        revert_objects!(state.answers, ObjectKind::Answer);

        match voters {
            Some(voters) => {
                for staker in voters {
                    state.votes.rollback(staker, height)?;
                    touched.stakers.insert(staker.clone());
                }
            }
            None => {
                let stakers: Vec<StakerScript> = state
                    .votes
                    .stakers()
                    .filter(|s| state.votes.votes_at(s, height).is_some())
                    .cloned()
                    .collect();
                for staker in stakers {
                    state.votes.rollback(&staker, height)?;
                    touched.stakers.insert(staker);
                }
            }
        }

        touched.params.extend(state.params.remove_at(height));
        state.blocks.remove(&height);
        state.tip = state.blocks.keys().next_back().copied();
        Ok(touched)
    }

    /// WriteBatch berisi nilai terkini semua key yang disentuh di `height`.
    fn state_batch(&self, height: u32, touched: &Touched) -> Result<WriteBatch, DaoError> {
        let state = &self.state;
        let mut batch = WriteBatch::new();

        for (kind, hash) in &touched.objects {
            let key = object_key(*kind, hash);
            let value = match kind {
                ObjectKind::Proposal => state.proposals.get(hash).map(bincode::serialize),
                ObjectKind::PaymentRequest => state.payment_requests.get(hash).map(bincode::serialize),
                ObjectKind::Consultation => state.consultations.get(hash).map(bincode::serialize),
                ObjectKind::Answer => state.answers.get(hash).map(bincode::serialize),
            };
            match value {
                Some(bytes) => batch.put(Column::DaoObjects, key, bytes.map_err(StoreError::from)?),
                None => batch.delete(Column::DaoObjects, key),
            }
        }

        for staker in &touched.stakers {
            let key = vote_key(staker, height);
            match state.votes.votes_at(staker, height) {
                Some(votes) => {
                    let bytes = bincode::serialize(&(staker, votes)).map_err(StoreError::from)?;
                    batch.put(Column::VoteList, key, bytes);
                }
                None => batch.delete(Column::VoteList, key),
            }
        }

        for id in &touched.params {
            let key = param_key(*id, height);
            match state.params.entries().find(|(i, e)| i == id && e.height == height) {
                Some((_, entry)) => {
                    batch.put(Column::ConsensusParams, key, bincode::serialize(entry).map_err(StoreError::from)?)
                }
                None => batch.delete(Column::ConsensusParams, key),
            }
        }

        match state.blocks.get(&height) {
            Some(meta) => batch.put(Column::Meta, block_key(height), bincode::serialize(meta).map_err(StoreError::from)?),
            None => batch.delete(Column::Meta, block_key(height)),
        }
        match state.tip {
            Some(tip) => batch.put(Column::Meta, META_TIP.to_vec(), tip.to_be_bytes().to_vec()),
            None => batch.delete(Column::Meta, META_TIP.to_vec()),
        }
        Ok(batch)
    }

    // ────────────────────────────────────────────────────────────────────────
    // CYCLE EVALUATION
    // ────────────────────────────────────────────────────────────────────────

    fn evaluate_cycle(&mut self, height: u32, len: u32, touched: &mut Touched) -> Result<(), DaoError> {
        // boundary pertama = len, jadi window pertama 1..=len: block 0
        // (genesis) tidak pernah masuk window mana pun, vote maupun bobot stake
        let start = height.saturating_sub(len - 1).max(1);
        let stakers: BTreeMap<u32, StakerScript> = self
            .state
            .blocks
            .range(start..=height)
            .map(|(h, m)| (*h, m.staker.clone()))
            .collect();
        let snapshot = self.weights.snapshot(start, height, &stakers);
        let range: BTreeSet<Hash256> =
            self.state.consultations.values().filter(|c| c.is_range()).map(|c| c.hash).collect();
        let tallies = self.state.votes.tally_window(start, height, &snapshot, &range);
        let before = touched.transitions;

        let quorum = self.settings.quorum;
        let state = &mut self.state;
        evaluate_consultations(state, height, start, &snapshot, &tallies, touched)?;
        evaluate_proposals(state, &quorum, height, &snapshot, &tallies, touched)?;
        evaluate_payment_requests(state, &quorum, height, &snapshot, &tallies, touched)?;
        evaluate_deadlines(state, height, touched)?;

        info!(
            height,
            window_start = start,
            total_weight = snapshot.total(),
            transitions = touched.transitions - before,
            "voting cycle evaluated"
        );
        Ok(())
    }

    // ────────────────────────────────────────────────────────────────────────
    // LOAD
    // ────────────────────────────────────────────────────────────────────────

    /// Bangun ulang state dari store. Hasilnya identik dengan engine live.
    pub fn load(store: Arc<dyn KvStore>, settings: GovernanceSettings) -> Result<Self, DaoError> {
        let mut engine = GovernanceEngine::new(store, settings);
        let store = Arc::clone(&engine.store);
        let state = &mut engine.state;

        for (key, value) in store.scan_range(Column::DaoObjects, &[], None)? {
            let corrupt = || StoreError::Corruption(format!("bad dao object key {}", hex::encode(&key)));
            if key.len() != 33 {
                return Err(corrupt().into());
            }
            match key[0] {
                b'p' => {
                    let p: Proposal = bincode::deserialize(&value).map_err(StoreError::from)?;
                    state.proposals.insert(p.hash, p);
                }
                b'r' => {
                    let pr: PaymentRequest = bincode::deserialize(&value).map_err(StoreError::from)?;
                    state.payment_requests.insert(pr.hash, pr);
                }
                b'c' => {
                    let c: Consultation = bincode::deserialize(&value).map_err(StoreError::from)?;
                    state.consultations.insert(c.hash, c);
                }
                b'a' => {
                    let a: ConsultationAnswer = bincode::deserialize(&value).map_err(StoreError::from)?;
                    state.answers.insert(a.hash, a);
                }
                _ => return Err(corrupt().into()),
            }
        }

        for (key, value) in store.scan_range(Column::VoteList, &[], None)? {
            if key.len() != 36 {
                return Err(StoreError::Corruption(format!("bad vote key {}", hex::encode(&key))).into());
            }
            let height = u32::from_be_bytes([key[32], key[33], key[34], key[35]]);
            let (staker, votes): (StakerScript, HeightVotes) =
                bincode::deserialize(&value).map_err(StoreError::from)?;
            for (hash, vote) in votes {
                state.votes.record_vote(&staker, height, hash, vote);
            }
        }

        for (key, value) in store.scan_range(Column::ConsensusParams, &[], None)? {
            if key.len() != 5 {
                return Err(StoreError::Corruption(format!("bad param key {}", hex::encode(&key))).into());
            }
            let id = P::from_index(u32::from(key[0]))?;
            let entry: ParamEntry = bincode::deserialize(&value).map_err(StoreError::from)?;
            state.params.push_entry(id, entry);
        }

        for (key, value) in store.scan_prefix(Column::Meta, &[META_BLOCK])? {
            if key.len() != 5 {
                continue;
            }
            let height = u32::from_be_bytes([key[1], key[2], key[3], key[4]]);
            let meta: BlockMeta = bincode::deserialize(&value).map_err(StoreError::from)?;
            state.blocks.insert(height, meta);
        }
        if let Some(bytes) = store.get(Column::Meta, META_TIP)? {
            let arr: [u8; 4] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| StoreError::Corruption("bad tip value".to_string()))?;
            state.tip = Some(u32::from_be_bytes(arr));
        }
        if state.tip != state.blocks.keys().next_back().copied() {
            return Err(StoreError::Corruption("tip does not match stored block meta".to_string()).into());
        }

        info!(
            tip = ?state.tip,
            proposals = state.proposals.len(),
            payment_requests = state.payment_requests.len(),
            consultations = state.consultations.len(),
            "governance state loaded"
        );
        Ok(engine)
    }

    // ────────────────────────────────────────────────────────────────────────
    // QUERIES
    // ────────────────────────────────────────────────────────────────────────

    pub fn list_proposals(&self, filter: &ProposalFilter<'_>) -> Vec<&Proposal> {
        let tip = self.query_tip();
        self.state.proposals.values().filter(|p| filter.matches(p, tip)).collect()
    }

    pub fn list_consultations(&self) -> Vec<&Consultation> {
        self.state.consultations.values().collect()
    }

    pub fn consultation_answers(&self, hash: &Hash256) -> Vec<&ConsultationAnswer> {
        self.state.answers_of(hash).collect()
    }

    pub fn payment_requests(&self, proposal: &Hash256) -> Vec<&PaymentRequest> {
        self.state.payment_requests_of(proposal).collect()
    }

    /// `getstakervote`
    pub fn staker_votes(&self, staker: &StakerScript) -> Option<&BTreeMap<u32, HeightVotes>> {
        self.state.votes.staker_votes(staker)
    }

    pub fn proposal_available(&self, hash: &Hash256, tip: u32) -> Result<Amount, DaoError> {
        let proposal = self
            .state
            .proposals
            .get(hash)
            .ok_or_else(|| DaoError::NotFound(format!("proposal {}", hash)))?;
        Ok(proposal.available(self.state.payment_requests_of(hash), tip, false))
    }

    pub fn fund_available(&self, tip: u32) -> Amount {
        self.state.fund_available(tip)
    }

    /// `getconsensusparameters`
    pub fn consensus_parameters(&self, tip: u32) -> Vec<ParamReport> {
        self.state.params.report(tip)
    }

    pub fn get_consensus_parameter(&self, id: P) -> i64 {
        self.state.param(id, self.query_tip())
    }

    pub fn vote_target(&self, hash: &Hash256) -> Option<VoteTarget> {
        self.state.vote_target(hash, self.query_tip())
    }

    /// Pemenang consultation yang sudah PASSED (answer hash, atau nilai range).
    pub fn consultation_result(&self, hash: &Hash256) -> Option<ConsultationResult> {
        let tip = self.query_tip();
        let consultation = self.state.consultations.get(hash)?;
        if consultation.state_at(tip) != DaoState::Passed {
            return None;
        }
        if consultation.is_range() {
            return consultation.range_result(tip).map(ConsultationResult::Value);
        }
        self.state
            .answers_of(hash)
            .find(|a| a.state_at(tip) == DaoState::Passed)
            .map(|a| ConsultationResult::Answer(a.hash))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsultationResult {
    Answer(Hash256),
    Value(i64),
}

// ════════════════════════════════════════════════════════════════════════════
// EVALUATION STEPS
// ════════════════════════════════════════════════════════════════════════════

fn evaluate_consultations(
    state: &mut GovernanceState,
    height: u32,
    start: u32,
    snapshot: &StakeSnapshot,
    tallies: &BTreeMap<Hash256, Tally>,
    touched: &mut Touched,
) -> Result<(), DaoError> {
    let total = snapshot.total();
    let answer_support = state.param(P::ConsultationAnswerMinSupport, height);
    let range_support = state.param(P::ConsultationMinSupport, height);
    let max_support_cycles = state.param(P::ConsultationMaxSupportCycles, height).max(0) as usize;
    let reflection_len = state.param(P::ConsultationReflectionLength, height).max(0) as usize;
    let min_cycles = state.param(P::ConsultationMinCycles, height).max(0) as usize;
    let max_voting_cycles = state.param(P::ConsultationMaxVotingCycles, height).max(0) as usize;
    let quorum = Thresholds { quorum: state.param(P::ProposalMinQuorum, height), accept: 0, reject: 0 };

    let open: Vec<Hash256> = state
        .consultations
        .values()
        .filter(|c| c.creation_height < height && c.is_open(height))
        .map(|c| c.hash)
        .collect();

    for hash in open {
        let Some(consultation) = state.consultations.get(&hash) else { continue };
        let phase = consultation.state_at(height);
        let own_tally = tallies.get(&hash).cloned().unwrap_or_default();
        let answers: Vec<Hash256> = state
            .answers_of(&hash)
            .filter(|a| a.creation_height < height)
            .map(|a| a.hash)
            .collect();

        if let Some(c) = state.consultations.get_mut(&hash) {
            c.cycles.push(CycleRecord { height, tally: own_tally.clone() });
            touched.object(ObjectKind::Consultation, hash);
        }

        match phase {
            DaoState::Nil => {
                // Support phase: answer yang cukup support menjadi SUPPORTED
                let mut supported = 0usize;
                for answer_hash in &answers {
                    let Some(answer) = state.answers.get_mut(answer_hash) else { continue };
                    let tally = tallies.get(answer_hash).cloned().unwrap_or_default();
                    let reached = total > 0 && meets_basis_points(tally.yes, total, answer_support);
                    answer.cycles.push(CycleRecord { height, tally });
                    touched.object(ObjectKind::Answer, *answer_hash);
                    if answer.state_at(height) == DaoState::Nil && reached {
                        transition(ObjectKind::Answer, answer_hash, height, DaoState::Supported, touched, |h, s| {
                            answer.push_state(h, s)
                        })?;
                    }
                    if answer.is_supported(height) {
                        supported += 1;
                    }
                }

                let Some(c) = state.consultations.get_mut(&hash) else { continue };
                let ready = if c.is_range() {
                    total > 0 && meets_basis_points(own_tally.yes, total, range_support)
                } else {
                    supported >= c.min_supported_answers()
                };
                if ready {
                    transition(ObjectKind::Consultation, &hash, height, DaoState::Reflection, touched, |h, s| {
                        c.push_state(h, s)
                    })?;
                } else if c.completed_cycles(height) >= max_support_cycles {
                    transition(ObjectKind::Consultation, &hash, height, DaoState::Expired, touched, |h, s| {
                        c.push_state(h, s)
                    })?;
                }
            }
            DaoState::Reflection => {
                let Some(c) = state.consultations.get_mut(&hash) else { continue };
                if c.completed_cycles(height) >= reflection_len {
                    transition(ObjectKind::Consultation, &hash, height, DaoState::Accepted, touched, |h, s| {
                        c.push_state(h, s)
                    })?;
                }
            }
            DaoState::Accepted => {
                // Voting phase
                let supported: Vec<Hash256> = answers
                    .iter()
                    .filter(|h| state.answers.get(*h).map_or(false, |a| a.is_supported(height)))
                    .copied()
                    .collect();
                let mut winner: Option<(Hash256, u64)> = None;
                for answer_hash in &supported {
                    let tally = tallies.get(answer_hash).cloned().unwrap_or_default();
                    let yes = tally.yes;
                    if let Some(answer) = state.answers.get_mut(answer_hash) {
                        answer.cycles.push(CycleRecord { height, tally });
                        touched.object(ObjectKind::Answer, *answer_hash);
                    }
                    // urut hash: tie jatuh ke hash terkecil
                    if yes > 0 && winner.map_or(true, |(_, best)| yes > best) {
                        winner = Some((*answer_hash, yes));
                    }
                }

                let mut voted = supported.clone();
                voted.push(hash);
                let participation = state.votes.participation(&voted, start, height, snapshot);
                let quorum_met = quorum.quorum_met(participation, total);

                let Some(c) = state.consultations.get(&hash) else { continue };
                let has_result = match c.kind {
                    ConsultationKind::Range { min, max } => lower_median(&own_tally.values, min, max).is_some(),
                    _ => winner.is_some(),
                };
                let completed = c.completed_cycles(height);
                let ids = c.consensus_ids().to_vec();
                let is_range = c.is_range();

                if completed >= min_cycles && quorum_met && has_result {
                    if let Some(c) = state.consultations.get_mut(&hash) {
                        transition(ObjectKind::Consultation, &hash, height, DaoState::Passed, touched, |h, s| {
                            c.push_state(h, s)
                        })?;
                    }
                    if let Some((answer_hash, _)) = winner.filter(|_| !is_range) {
                        let Some(answer) = state.answers.get_mut(&answer_hash) else { continue };
                        transition(ObjectKind::Answer, &answer_hash, height, DaoState::Passed, touched, |h, s| {
                            answer.push_state(h, s)
                        })?;
                        // Consensus change: stored value langsung masuk overlay.
                        // Versi SUPER menerapkan semua id sekaligus.
                        for (id, value) in ids.iter().zip(answer.value.numbers()) {
                            state.params.push_entry(*id, ParamEntry { height, value, source: hash });
                            touched.params.insert(*id);
                            info!(param = %id, display = id.to_display_value(value), height, "consensus parameter changed");
                        }
                    }
                } else if completed >= max_voting_cycles {
                    if let Some(c) = state.consultations.get_mut(&hash) {
                        transition(ObjectKind::Consultation, &hash, height, DaoState::Expired, touched, |h, s| {
                            c.push_state(h, s)
                        })?;
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn evaluate_proposals(
    state: &mut GovernanceState,
    quorum: &QuorumTable,
    height: u32,
    snapshot: &StakeSnapshot,
    tallies: &BTreeMap<Hash256, Tally>,
    touched: &mut Touched,
) -> Result<(), DaoError> {
    let mut fund = state.fund_available(height);
    let accept = state.param(P::ProposalMinAccept, height);
    let reject = state.param(P::ProposalMinReject, height);
    let max_cycles = state.param(P::ProposalMaxVotingCycles, height).max(0) as usize;

    let candidates: Vec<Hash256> = state
        .proposals
        .values()
        .filter(|p| p.creation_height < height)
        .filter(|p| matches!(p.state_at(height), DaoState::Nil | DaoState::PendingFunds))
        .map(|p| p.hash)
        .collect();

    for hash in candidates {
        let Some(p) = state.proposals.get(&hash) else { continue };
        let thresholds = Thresholds { quorum: state.param(quorum.proposal(&p.flags), height), accept, reject };
        let Some(p) = state.proposals.get_mut(&hash) else { continue };

        let next = match p.state_at(height) {
            DaoState::Nil => {
                let tally = tallies.get(&hash).cloned().unwrap_or_default();
                let verdict = thresholds.verdict(&tally, snapshot.total(), fund_rules(&p.flags));
                p.cycles.push(CycleRecord { height, tally });
                touched.object(ObjectKind::Proposal, hash);
                match verdict {
                    Verdict::Accept if p.is_super() => Some(DaoState::Accepted),
                    Verdict::Accept if p.amount <= fund => {
                        fund -= p.amount;
                        Some(DaoState::Accepted)
                    }
                    Verdict::Accept => Some(DaoState::PendingFunds),
                    Verdict::Reject => Some(DaoState::Rejected),
                    Verdict::Undecided if p.completed_cycles(height) >= max_cycles => Some(DaoState::Expired),
                    Verdict::Undecided => None,
                }
            }
            DaoState::PendingFunds if p.amount <= fund => {
                fund -= p.amount;
                Some(DaoState::Accepted)
            }
            _ => None,
        };
        if let Some(next) = next {
            transition(ObjectKind::Proposal, &hash, height, next, touched, |h, s| p.push_state(h, s))?;
        }
    }
    Ok(())
}

fn evaluate_payment_requests(
    state: &mut GovernanceState,
    quorum: &QuorumTable,
    height: u32,
    snapshot: &StakeSnapshot,
    tallies: &BTreeMap<Hash256, Tally>,
    touched: &mut Touched,
) -> Result<(), DaoError> {
    let accept = state.param(P::PaymentRequestMinAccept, height);
    let reject = state.param(P::PaymentRequestMinReject, height);
    let max_cycles = state.param(P::PaymentRequestMaxVotingCycles, height).max(0) as usize;

    let mut order: Vec<(u32, Hash256)> = state
        .payment_requests
        .values()
        .filter(|pr| pr.creation_height < height && pr.state_at(height) == DaoState::Nil)
        .map(|pr| (pr.creation_height, pr.hash))
        .collect();
    order.sort();

    for (_, hash) in order {
        let Some(pr) = state.payment_requests.get(&hash) else { continue };
        let parent = state
            .proposals
            .get(&pr.proposal_hash)
            .ok_or_else(|| DaoError::NotFound(format!("parent proposal {} of {}", pr.proposal_hash, hash)))?;
        let parent_open = matches!(parent.state_at(height), DaoState::Accepted | DaoState::PendingVotingPreq);
        // Sequential: request yang diterima lebih dulu di boundary ini ikut mengurangi
        let available = parent.available(state.payment_requests_of(&pr.proposal_hash), height, false);
        let thresholds = Thresholds { quorum: state.param(quorum.payment_request(&pr.flags), height), accept, reject };

        let Some(pr) = state.payment_requests.get_mut(&hash) else { continue };
        if !parent_open {
            transition(ObjectKind::PaymentRequest, &hash, height, DaoState::Expired, touched, |h, s| {
                pr.push_state(h, s)
            })?;
            continue;
        }

        let tally = tallies.get(&hash).cloned().unwrap_or_default();
        let verdict = thresholds.verdict(&tally, snapshot.total(), fund_rules(&pr.flags));
        pr.cycles.push(CycleRecord { height, tally });
        touched.object(ObjectKind::PaymentRequest, hash);

        let next = match verdict {
            Verdict::Accept if pr.amount <= available => Some(DaoState::Accepted),
            Verdict::Reject => Some(DaoState::Rejected),
            Verdict::Accept => {
                debug!(request = %hash, amount = pr.amount, available, "payment request exceeds available amount");
                (pr.completed_cycles(height) >= max_cycles).then_some(DaoState::Expired)
            }
            Verdict::Undecided => (pr.completed_cycles(height) >= max_cycles).then_some(DaoState::Expired),
        };
        if let Some(next) = next {
            transition(ObjectKind::PaymentRequest, &hash, height, next, touched, |h, s| pr.push_state(h, s))?;
        }
    }
    Ok(())
}

fn evaluate_deadlines(state: &mut GovernanceState, height: u32, touched: &mut Touched) -> Result<(), DaoError> {
    let Some(now) = state.blocks.get(&height).map(|m| m.time) else { return Ok(()) };

    let candidates: Vec<Hash256> = state
        .proposals
        .values()
        .filter(|p| matches!(p.state_at(height), DaoState::Accepted | DaoState::PendingVotingPreq))
        .filter(|p| p.history.state_since(height) != Some(height))
        .map(|p| p.hash)
        .collect();

    for hash in candidates {
        let Some(p) = state.proposals.get(&hash) else { continue };
        let has_pending = state
            .payment_requests_of(&hash)
            .any(|pr| pr.state_at(height) == DaoState::Nil);
        let next = match p.state_at(height) {
            DaoState::Accepted => {
                let Some(accepted_at) = p.accepted_height() else { continue };
                let Some(accepted_time) = state.blocks.get(&accepted_at).map(|m| m.time) else { continue };
                if u64::from(now) <= u64::from(accepted_time) + p.deadline {
                    continue;
                }
                if has_pending { DaoState::PendingVotingPreq } else { DaoState::AcceptedExpired }
            }
            DaoState::PendingVotingPreq if !has_pending => DaoState::AcceptedExpired,
            _ => continue,
        };
        let Some(p) = state.proposals.get_mut(&hash) else { continue };
        transition(ObjectKind::Proposal, &hash, height, next, touched, |h, s| p.push_state(h, s))?;
    }
    Ok(())
}

// ════════════════════════════════════════════════════════════════════════════
// FILTER
// ════════════════════════════════════════════════════════════════════════════

pub enum ProposalFilter<'a> {
    All,
    Accepted,
    Rejected,
    Expired,
    /// NIL, PENDING_FUNDS, PENDING_VOTING_PREQ
    Pending,
    AcceptedExpired,
    Mine(&'a dyn AddressOwnership),
}

impl ProposalFilter<'_> {
    pub fn matches(&self, p: &Proposal, tip: u32) -> bool {
        let state = p.state_at(tip);
        match self {
            ProposalFilter::All => true,
            ProposalFilter::Accepted => state == DaoState::Accepted,
            ProposalFilter::Rejected => state == DaoState::Rejected,
            ProposalFilter::Expired => state == DaoState::Expired,
            ProposalFilter::Pending => {
                matches!(state, DaoState::Nil | DaoState::PendingFunds | DaoState::PendingVotingPreq)
            }
            ProposalFilter::AcceptedExpired => state == DaoState::AcceptedExpired,
            ProposalFilter::Mine(owned) => owned.is_mine(&p.owner) || owned.is_mine(&p.payment_address),
        }
    }
}
