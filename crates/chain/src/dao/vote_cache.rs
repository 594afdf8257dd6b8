//! # Vote Cache & Tally
//!
//! Cache vote per staker:
//!
//! ```text
//! staker script -> height -> object hash -> vote value
//! ```
//!
//! ## Aturan
//!
//! - Vote di `(staker, height, hash)` yang sama: **last write wins** (overwrite
//!   deterministik, urutan entry di dalam block).
//! - Tally satu cycle memakai vote **terakhir** tiap staker di dalam window
//!   `start..=end`; staker dihitung satu kali dengan bobotnya.
//! - Vote terakhir `VOTE_REMOVE` berarti staker menarik vote: tidak dihitung.
//! - `rollback(staker, height)` adalah inverse persis dari `record_votes` di
//!   height tersebut. Rollback tanpa entry = bug driver reorg (fatal).
//!
//! Tally adalah fungsi murni dari isi cache + snapshot bobot.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::dao::DaoError;
use crate::types::{Hash256, StakerScript};

pub const VOTE_YES: i64 = 1;
pub const VOTE_NO: i64 = 0;
pub const VOTE_ABSTAIN: i64 = -1;
pub const VOTE_REMOVE: i64 = -2;

/// Hasil tally satu object dalam satu cycle (dalam satuan bobot stake).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub yes: u64,
    pub no: u64,
    pub abstain: u64,
    /// Histogram nilai vote range consultation. Kosong untuk object lain.
    pub values: BTreeMap<i64, u64>,
}

impl Tally {
    fn add(&mut self, value: i64, weight: u64, range: bool) {
        match value {
            VOTE_YES => self.yes += weight,
            VOTE_NO => self.no += weight,
            VOTE_ABSTAIN => self.abstain += weight,
            _ => {}
        }
        if range && value >= 0 {
            *self.values.entry(value).or_insert(0) += weight;
        }
    }

    pub fn participation(&self) -> u64 {
        self.yes + self.no + self.abstain
    }

    pub fn is_empty(&self) -> bool {
        self.participation() == 0 && self.values.is_empty()
    }
}

// ════════════════════════════════════════════════════════════════════════════
// STAKE WEIGHT
// ════════════════════════════════════════════════════════════════════════════

/// Bobot tiap staker dan total bobot untuk satu window.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StakeSnapshot {
    weights: BTreeMap<StakerScript, u64>,
    total: u64,
}

impl StakeSnapshot {
    pub fn new(weights: BTreeMap<StakerScript, u64>, total: u64) -> Self {
        StakeSnapshot { weights, total }
    }

    pub fn weight(&self, staker: &StakerScript) -> u64 {
        self.weights.get(staker).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

/// "Current staking weight" oracle.
pub trait StakeWeightOracle: Send + Sync {
    /// `block_stakers` = staker per block height yang sudah di-connect.
    fn snapshot(&self, start: u32, end: u32, block_stakers: &BTreeMap<u32, StakerScript>) -> StakeSnapshot;
}

/// Bobot = jumlah block yang di-stake staker dalam window; total = panjang window.
#[derive(Clone, Copy, Debug, Default)]
pub struct BlockCountWeight;

impl StakeWeightOracle for BlockCountWeight {
    fn snapshot(&self, start: u32, end: u32, block_stakers: &BTreeMap<u32, StakerScript>) -> StakeSnapshot {
        let mut weights: BTreeMap<StakerScript, u64> = BTreeMap::new();
        for (_, staker) in block_stakers.range(start..=end) {
            *weights.entry(staker.clone()).or_insert(0) += 1;
        }
        let total = u64::from(end.saturating_sub(start)) + 1;
        StakeSnapshot::new(weights, total)
    }
}

/// Bobot tetap per staker; total = jumlah seluruh bobot.
#[derive(Clone, Debug, Default)]
pub struct FixedWeights {
    weights: BTreeMap<StakerScript, u64>,
}

impl FixedWeights {
    pub fn new(weights: BTreeMap<StakerScript, u64>) -> Self {
        FixedWeights { weights }
    }
}

impl StakeWeightOracle for FixedWeights {
    fn snapshot(&self, _start: u32, _end: u32, _block_stakers: &BTreeMap<u32, StakerScript>) -> StakeSnapshot {
        let total = self.weights.values().sum();
        StakeSnapshot::new(self.weights.clone(), total)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// VOTE CACHE
// ════════════════════════════════════════════════════════════════════════════

pub type HeightVotes = BTreeMap<Hash256, i64>;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VoteCache {
    stakers: BTreeMap<StakerScript, BTreeMap<u32, HeightVotes>>,
}

impl VoteCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one vote. Returns the overwritten value for the same
    /// `(staker, height, hash)`, if any.
    pub fn record_vote(&mut self, staker: &StakerScript, height: u32, hash: Hash256, value: i64) -> Option<i64> {
        self.stakers
            .entry(staker.clone())
            .or_default()
            .entry(height)
            .or_default()
            .insert(hash, value)
    }

    /// Record a block's votes for one staker in order.
    pub fn record_votes(&mut self, staker: &StakerScript, height: u32, entries: &[(Hash256, i64)]) {
        for (hash, value) in entries {
            self.record_vote(staker, height, *hash, *value);
        }
    }

    /// Remove every entry of `staker` at `height`.
    pub fn rollback(&mut self, staker: &StakerScript, height: u32) -> Result<HeightVotes, DaoError> {
        let inconsistency = || DaoError::ReorgInconsistency(format!("no votes of staker {} at height {}", staker, height));
        let list = self.stakers.get_mut(staker).ok_or_else(inconsistency)?;
        let removed = list.remove(&height).ok_or_else(inconsistency)?;
        if list.is_empty() {
            self.stakers.remove(staker);
        }
        Ok(removed)
    }

    pub fn votes_at(&self, staker: &StakerScript, height: u32) -> Option<&HeightVotes> {
        self.stakers.get(staker)?.get(&height)
    }

    /// Full vote list of one staker (`getstakervote`).
    pub fn staker_votes(&self, staker: &StakerScript) -> Option<&BTreeMap<u32, HeightVotes>> {
        self.stakers.get(staker)
    }

    /// Semua vote yang tercatat di `height`, per staker.
    pub fn votes_at_height(&self, height: u32) -> BTreeMap<StakerScript, HeightVotes> {
        self.stakers
            .iter()
            .filter_map(|(s, list)| list.get(&height).map(|v| (s.clone(), v.clone())))
            .collect()
    }

    pub fn stakers(&self) -> impl Iterator<Item = &StakerScript> {
        self.stakers.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StakerScript, u32, &HeightVotes)> {
        self.stakers
            .iter()
            .flat_map(|(s, list)| list.iter().map(move |(h, v)| (s, *h, v)))
    }

    /// Latest vote of `staker` for `hash` within `start..=end`.
    pub fn latest_vote(&self, staker: &StakerScript, hash: &Hash256, start: u32, end: u32) -> Option<i64> {
        let list = self.stakers.get(staker)?;
        list.range(start..=end).rev().find_map(|(_, votes)| votes.get(hash).copied())
    }

    /// Tally satu object untuk window `start..=end`. `range`: object adalah
    /// range consultation, nilai vote masuk histogram.
    pub fn tally_for_cycle(
        &self,
        hash: &Hash256,
        start: u32,
        end: u32,
        snapshot: &StakeSnapshot,
        range: bool,
    ) -> Tally {
        let mut tally = Tally::default();
        for staker in self.stakers.keys() {
            let Some(value) = self.latest_vote(staker, hash, start, end) else { continue };
            if value == VOTE_REMOVE {
                continue;
            }
            let weight = snapshot.weight(staker);
            if weight > 0 {
                tally.add(value, weight, range);
            }
        }
        tally
    }

    /// Tally semua object yang mendapat vote di window, satu kali scan.
    /// `range` berisi hash range consultation.
    pub fn tally_window(
        &self,
        start: u32,
        end: u32,
        snapshot: &StakeSnapshot,
        range: &BTreeSet<Hash256>,
    ) -> BTreeMap<Hash256, Tally> {
        let mut out: BTreeMap<Hash256, Tally> = BTreeMap::new();
        for (staker, list) in &self.stakers {
            let weight = snapshot.weight(staker);
            if weight == 0 {
                continue;
            }
            let mut seen: BTreeSet<Hash256> = BTreeSet::new();
            for (_, votes) in list.range(start..=end).rev() {
                for (hash, value) in votes {
                    if !seen.insert(*hash) || *value == VOTE_REMOVE {
                        continue;
                    }
                    out.entry(*hash).or_default().add(*value, weight, range.contains(hash));
                }
            }
        }
        out
    }

    /// Bobot staker yang punya vote aktif (bukan remove) ke salah satu `hashes`
    /// di window. Tiap staker dihitung sekali.
    pub fn participation(&self, hashes: &[Hash256], start: u32, end: u32, snapshot: &StakeSnapshot) -> u64 {
        self.stakers
            .keys()
            .filter(|staker| {
                hashes.iter().any(|h| {
                    matches!(self.latest_vote(staker, h, start, end), Some(v) if v != VOTE_REMOVE)
                })
            })
            .map(|staker| snapshot.weight(staker))
            .sum()
    }
}

// ════════════════════════════════════════════════════════════════════════════
// THRESHOLD
// ════════════════════════════════════════════════════════════════════════════

/// `part / whole >= bp / 10000`, tanpa floating point. Boundary inclusive.
pub fn meets_basis_points(part: u64, whole: u64, bp: i64) -> bool {
    let bp = bp.max(0) as u128;
    u128::from(part) * 10_000 >= bp * u128::from(whole)
}

/// Threshold dalam basis point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Thresholds {
    pub quorum: i64,
    pub accept: i64,
    pub reject: i64,
}

/// Bagaimana abstain diperlakukan (dari flag version object).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TallyRules {
    pub abstain_in_quorum: bool,
    pub abstain_in_support: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject,
    Undecided,
}

impl Thresholds {
    pub fn quorum_met(&self, participation: u64, total: u64) -> bool {
        total > 0 && meets_basis_points(participation, total, self.quorum)
    }

    pub fn verdict(&self, tally: &Tally, total: u64, rules: TallyRules) -> Verdict {
        let abstain_q = if rules.abstain_in_quorum { tally.abstain } else { 0 };
        if !self.quorum_met(tally.yes + tally.no + abstain_q, total) {
            return Verdict::Undecided;
        }
        let abstain_s = if rules.abstain_in_support { tally.abstain } else { 0 };
        let denominator = tally.yes + tally.no + abstain_s;
        if denominator == 0 {
            return Verdict::Undecided;
        }
        if meets_basis_points(tally.yes, denominator, self.accept) {
            Verdict::Accept
        } else if meets_basis_points(tally.no, denominator, self.reject) {
            Verdict::Reject
        } else {
            Verdict::Undecided
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staker(b: u8) -> StakerScript {
        StakerScript::new(vec![b; 4])
    }

    fn hash(b: u8) -> Hash256 {
        Hash256::from_bytes([b; 32])
    }

    fn equal_weights() -> StakeSnapshot {
        let weights = (1..=4).map(|b| (staker(b), 10)).collect();
        StakeSnapshot::new(weights, 40)
    }

    #[test]
    fn latest_vote_in_cycle_counts_once() {
        let mut cache = VoteCache::new();
        cache.record_vote(&staker(1), 10, hash(9), VOTE_NO);
        cache.record_vote(&staker(1), 12, hash(9), VOTE_YES);
        cache.record_vote(&staker(2), 11, hash(9), VOTE_ABSTAIN);
        // outside window
        cache.record_vote(&staker(3), 25, hash(9), VOTE_NO);

        let tally = cache.tally_for_cycle(&hash(9), 1, 20, &equal_weights(), false);
        assert_eq!(tally.yes, 10);
        assert_eq!(tally.no, 0);
        assert_eq!(tally.abstain, 10);
        assert_eq!(tally.participation(), 20);
    }

    #[test]
    fn same_height_duplicate_overwrites() {
        let mut cache = VoteCache::new();
        assert_eq!(cache.record_vote(&staker(1), 5, hash(1), VOTE_YES), None);
        assert_eq!(cache.record_vote(&staker(1), 5, hash(1), VOTE_NO), Some(VOTE_YES));
        let tally = cache.tally_for_cycle(&hash(1), 0, 10, &equal_weights(), false);
        assert_eq!((tally.yes, tally.no), (0, 10));
    }

    #[test]
    fn remove_vote_excludes_staker() {
        let mut cache = VoteCache::new();
        cache.record_vote(&staker(1), 3, hash(2), 500);
        cache.record_vote(&staker(1), 4, hash(2), VOTE_REMOVE);
        cache.record_vote(&staker(2), 4, hash(2), 400);
        let tally = cache.tally_for_cycle(&hash(2), 0, 10, &equal_weights(), true);
        assert_eq!(tally.values.get(&500), None);
        assert_eq!(tally.values.get(&400), Some(&10));
        assert_eq!(cache.participation(&[hash(2)], 0, 10, &equal_weights()), 10);
    }

    #[test]
    fn tally_is_pure_and_rollback_restores() {
        let mut cache = VoteCache::new();
        cache.record_votes(&staker(1), 1, &[(hash(1), VOTE_YES), (hash(2), VOTE_NO)]);
        cache.record_votes(&staker(2), 2, &[(hash(1), VOTE_NO)]);
        let snap = equal_weights();

        let first = cache.tally_for_cycle(&hash(1), 0, 10, &snap, false);
        let second = cache.tally_for_cycle(&hash(1), 0, 10, &snap, false);
        assert_eq!(first, second);

        let before = cache.clone();
        cache.record_votes(&staker(3), 3, &[(hash(1), VOTE_YES)]);
        cache.rollback(&staker(3), 3).expect("rollback");
        assert_eq!(cache, before);
        assert_eq!(cache.tally_for_cycle(&hash(1), 0, 10, &snap, false), first);
    }

    #[test]
    fn rollback_without_entry_is_reorg_inconsistency() {
        let mut cache = VoteCache::new();
        assert!(matches!(cache.rollback(&staker(1), 7), Err(DaoError::ReorgInconsistency(_))));
        cache.record_vote(&staker(1), 6, hash(1), VOTE_YES);
        assert!(matches!(cache.rollback(&staker(1), 7), Err(DaoError::ReorgInconsistency(_))));
    }

    #[test]
    fn tally_window_matches_per_object_tally() {
        let mut cache = VoteCache::new();
        cache.record_votes(&staker(1), 1, &[(hash(1), VOTE_YES), (hash(2), 7)]);
        cache.record_votes(&staker(1), 2, &[(hash(1), VOTE_REMOVE)]);
        cache.record_votes(&staker(2), 2, &[(hash(1), VOTE_NO), (hash(2), VOTE_ABSTAIN)]);
        cache.record_votes(&staker(3), 9, &[(hash(2), 3)]);
        let snap = equal_weights();

        let range: BTreeSet<Hash256> = [hash(2)].into_iter().collect();
        let window = cache.tally_window(0, 5, &snap, &range);
        for h in [hash(1), hash(2)] {
            let single = cache.tally_for_cycle(&h, 0, 5, &snap, range.contains(&h));
            assert_eq!(window.get(&h).cloned().unwrap_or_default(), single);
        }
    }

    #[test]
    fn histogram_only_for_range_objects() {
        let mut cache = VoteCache::new();
        cache.record_vote(&staker(1), 1, hash(1), VOTE_YES);
        cache.record_vote(&staker(2), 1, hash(1), VOTE_NO);
        cache.record_vote(&staker(1), 1, hash(2), 1);
        cache.record_vote(&staker(2), 1, hash(2), 250);
        let snap = equal_weights();
        let range: BTreeSet<Hash256> = [hash(2)].into_iter().collect();
        let window = cache.tally_window(0, 5, &snap, &range);

        let fund = &window[&hash(1)];
        assert_eq!((fund.yes, fund.no), (10, 10));
        assert!(fund.values.is_empty());

        let ranged = &window[&hash(2)];
        assert_eq!(ranged.values.get(&1), Some(&10));
        assert_eq!(ranged.values.get(&250), Some(&10));
    }

    #[test]
    fn thresholds_are_inclusive() {
        let t = Thresholds { quorum: 5_000, accept: 7_000, reject: 7_000 };
        let rules = TallyRules { abstain_in_quorum: true, abstain_in_support: false };

        let exact = Tally { yes: 35, no: 15, ..Tally::default() };
        assert_eq!(t.verdict(&exact, 100, rules), Verdict::Accept);

        let below_support = Tally { yes: 34, no: 16, ..Tally::default() };
        assert_eq!(t.verdict(&below_support, 100, rules), Verdict::Undecided);

        let below_quorum = Tally { yes: 49, no: 0, ..Tally::default() };
        assert_eq!(t.verdict(&below_quorum, 100, rules), Verdict::Undecided);

        let reject = Tally { yes: 15, no: 35, ..Tally::default() };
        assert_eq!(t.verdict(&reject, 100, rules), Verdict::Reject);
    }

    #[test]
    fn abstain_rules_follow_flags() {
        let t = Thresholds { quorum: 5_000, accept: 7_000, reject: 7_000 };
        let tally = Tally { yes: 30, no: 0, abstain: 20, ..Tally::default() };

        let with_abstain = TallyRules { abstain_in_quorum: true, abstain_in_support: false };
        assert_eq!(t.verdict(&tally, 100, with_abstain), Verdict::Accept);

        let without_abstain = TallyRules::default();
        assert_eq!(t.verdict(&tally, 100, without_abstain), Verdict::Undecided);

        let abstain_dilutes = TallyRules { abstain_in_quorum: true, abstain_in_support: true };
        assert_eq!(t.verdict(&tally, 100, abstain_dilutes), Verdict::Undecided);
        assert!(!t.quorum_met(0, 0));
    }

    #[test]
    fn block_count_weight_counts_staked_blocks() {
        let mut stakers = BTreeMap::new();
        stakers.insert(1, staker(1));
        stakers.insert(2, staker(1));
        stakers.insert(3, staker(2));
        stakers.insert(30, staker(2));
        let snap = BlockCountWeight.snapshot(1, 10, &stakers);
        assert_eq!(snap.weight(&staker(1)), 2);
        assert_eq!(snap.weight(&staker(2)), 1);
        assert_eq!(snap.total(), 10);
    }
}
