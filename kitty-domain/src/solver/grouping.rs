//! Stage B: fewest transfers among plans that fit a window of the chosen width.
//!
//! A plan with few transfers splits the group into sub-groups that settle among
//! themselves; a sub-group of `k` people needs at least `k − 1` transfers. The
//! search walks partitions of the group into such sub-groups, one window floor at
//! a time. People with the same initial spend, cap and exempt flag are
//! interchangeable, so states are counts per kind and results are memoized on
//! them.

use super::routing::{Edge, settle_group};
use crate::constraints::{ConstraintModel, Signature, Window};
use crate::control::{SearchControl, StopReason};
use crate::error::InputError;
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, warn};

/// Bits of the incumbent rank that hold the window index.
const WINDOW_BITS: u32 = 20;

/// Most window floors one search visits; the lowest floors are kept.
pub(crate) const WINDOW_LIMIT: u64 = 1 << WINDOW_BITS;

/// The best plan found for one window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Partition {
    pub window_index: u64,
    pub window: Window,
    pub edges: Vec<Edge>,
}

impl Partition {
    fn exchanges(&self) -> u64 {
        self.edges.len() as u64
    }
}

#[derive(Debug, Clone)]
pub(crate) struct GroupingOutcome {
    /// `None` only when the search was stopped before any window finished.
    pub best: Option<Partition>,
    pub windows: u64,
    pub stopped: Option<StopReason>,
    /// Every solved window was costed exactly and no floor was left out.
    pub exact: bool,
}

/// People grouped by [`Signature`], kinds in order of first declaration.
#[derive(Debug)]
pub(crate) struct Kinds {
    members: Vec<Vec<usize>>,
    counts: Vec<u16>,
}

impl Kinds {
    pub(crate) fn new(model: &ConstraintModel<'_>) -> Result<Self, InputError> {
        let mut index: HashMap<Signature, usize> = HashMap::new();
        let mut members: Vec<Vec<usize>> = Vec::new();
        for p in 0..model.len() {
            let kind = *index.entry(model.signature(p)).or_insert_with(|| {
                members.push(Vec::new());
                members.len() - 1
            });
            members[kind].push(p);
        }
        let counts = members
            .iter()
            .map(|m| u16::try_from(m.len()))
            .collect::<Result<Vec<u16>, _>>()
            .map_err(|_| InputError::TooManyPeople {
                count: model.len(),
                max: usize::from(u16::MAX),
            })?;
        Ok(Self { members, counts })
    }

    fn counts(&self) -> &[u16] {
        &self.counts
    }

    /// Concrete people for `take`, skipping the first `offset[j]` of each kind.
    fn people(&self, take: &[u16], offset: &[u16]) -> Vec<usize> {
        let mut out = Vec::new();
        for (j, (&t, &skip)) in take.iter().zip(offset).enumerate() {
            let start = usize::from(skip);
            out.extend_from_slice(&self.members[j][start..start + usize::from(t)]);
        }
        out
    }
}

/// Searches every window floor in `floors` (width `width`) on a pool of
/// `threads` workers (`0` lets rayon pick).
///
/// Workers share the model read-only and an incumbent rank, `(exchanges, window
/// index)`, that only moves on strict improvement. A window that cannot beat the
/// incumbent even at its lower bound is skipped; every other window is solved
/// exactly, and ties go to the lowest floor, so the result does not depend on
/// the thread count.
pub(crate) fn search(
    model: &ConstraintModel<'_>,
    floors: RangeInclusive<i64>,
    width: i64,
    threads: usize,
    control: &SearchControl,
) -> Result<GroupingOutcome, InputError> {
    let kinds = Kinds::new(model)?;
    let first = *floors.start();
    let span = (*floors.end() as i128 - first as i128 + 1).max(0) as u64;
    let total = span.min(WINDOW_LIMIT);
    if total < span {
        warn!(windows = span, searched = total, "too many window floors, searching the lowest");
    }

    let explored = AtomicU64::new(0);
    let incumbent = AtomicU64::new(u64::MAX);
    let approximate = AtomicBool::new(total < span);

    let scan = || {
        (0..total)
            .into_par_iter()
            .filter_map(|index| {
                if control.stop_reason().is_some() {
                    return None;
                }
                let window = Window::with_width(first + index as i64, width);
                let mut window_search = WindowSearch::new(model, &kinds, window, control);
                let floor = window_search.lower_bound(kinds.counts());
                if rank(floor, index) > incumbent.load(Ordering::Acquire) {
                    return None;
                }

                let solved = window_search.run(index).ok()?;
                explored.fetch_add(1, Ordering::Relaxed);
                if !window_search.exact {
                    approximate.store(true, Ordering::Relaxed);
                }
                let partition = solved?;
                commit(&incumbent, rank(partition.exchanges(), index));
                Some(partition)
            })
            .min_by_key(|p| (p.exchanges(), p.window_index))
    };

    let best = match ThreadPoolBuilder::new().num_threads(threads).build() {
        Ok(pool) => pool.install(scan),
        Err(err) => {
            warn!(%err, "could not build a search pool, using the global one");
            scan()
        }
    };

    Ok(GroupingOutcome {
        best,
        windows: explored.load(Ordering::Relaxed),
        stopped: control.stop_reason(),
        exact: !approximate.load(Ordering::Relaxed),
    })
}

/// Orders results by exchange count, then window index.
fn rank(exchanges: u64, index: u64) -> u64 {
    (exchanges.min(u64::MAX >> WINDOW_BITS) << WINDOW_BITS) | index
}

/// Installs `rank` as the incumbent if it strictly improves on it.
fn commit(incumbent: &AtomicU64, rank: u64) {
    let mut current = incumbent.load(Ordering::Acquire);
    while rank < current {
        match incumbent.compare_exchange_weak(current, rank, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => {
                debug!(exchanges = rank >> WINDOW_BITS, "incumbent improved");
                return;
            }
            Err(actual) => current = actual,
        }
    }
}

type Take = Vec<u16>;

/// Partition search for one window floor.
struct WindowSearch<'a, 'b> {
    model: &'a ConstraintModel<'b>,
    kinds: &'a Kinds,
    window: Window,
    control: &'a SearchControl,
    /// Net outflow bounds per kind.
    bounds: Vec<(i128, i128)>,
    /// Kinds that cannot settle alone (zero outflow is outside their bounds).
    must_move: Vec<bool>,
    group_costs: HashMap<Take, Option<u64>>,
    memo: HashMap<Take, Option<(u64, Take)>>,
    /// Cleared when a sub-group cost is only an upper bound.
    exact: bool,
}

impl<'a, 'b> WindowSearch<'a, 'b> {
    fn new(
        model: &'a ConstraintModel<'b>,
        kinds: &'a Kinds,
        window: Window,
        control: &'a SearchControl,
    ) -> Self {
        let bounds: Vec<(i128, i128)> = kinds
            .members
            .iter()
            .map(|m| model.flow_bounds(m[0], window))
            .collect();
        let must_move = bounds.iter().map(|&(a, b)| a > 0 || b < 0).collect();
        Self {
            model,
            kinds,
            window,
            control,
            bounds,
            must_move,
            group_costs: HashMap::new(),
            memo: HashMap::new(),
            exact: true,
        }
    }

    /// Each transfer touches at most two people who cannot stay put.
    fn lower_bound(&self, state: &[u16]) -> u64 {
        let unsettled: u64 = state
            .iter()
            .zip(&self.must_move)
            .filter(|(_, m)| **m)
            .map(|(c, _)| u64::from(*c))
            .sum();
        unsettled.div_ceil(2)
    }

    /// Necessary condition for `state` to settle on its own: its summed bounds
    /// straddle zero.
    fn balanced(&self, state: &[u16]) -> bool {
        let (mut low, mut high) = (0i128, 0i128);
        for (c, (a, b)) in state.iter().zip(&self.bounds) {
            low += i128::from(*c) * a;
            high += i128::from(*c) * b;
        }
        low <= 0 && 0 <= high
    }

    fn run(&mut self, window_index: u64) -> Result<Option<Partition>, StopReason> {
        let root = self.kinds.counts().to_vec();
        let Some(count) = self.solve(&root)? else {
            return Ok(None);
        };

        let mut edges = Vec::new();
        let mut state = root;
        let mut offset = vec![0u16; state.len()];
        while state.iter().any(|c| *c > 0) {
            let Some(Some((_, take))) = self.memo.get(&state).cloned() else {
                return Ok(None);
            };
            let people = self.kinds.people(&take, &offset);
            let Some(mut routed) = settle_group(self.model, &people, self.window) else {
                return Ok(None);
            };
            self.exact &= routed.exact;
            edges.append(&mut routed.edges);
            for j in 0..state.len() {
                state[j] -= take[j];
                offset[j] += take[j];
            }
        }

        debug!(
            lo = self.window.lo,
            hi = self.window.hi,
            exchanges = count,
            "window solved"
        );
        edges.sort_unstable();
        Ok(Some(Partition {
            window_index,
            window: self.window,
            edges,
        }))
    }

    /// Fewest transfers settling `state`; `None` when it cannot settle.
    fn solve(&mut self, state: &[u16]) -> Result<Option<u64>, StopReason> {
        if state.iter().all(|c| *c == 0) {
            return Ok(Some(0));
        }
        if let Some(hit) = self.memo.get(state) {
            return Ok(hit.as_ref().map(|(cost, _)| *cost));
        }
        self.control.tick()?;

        let floor = self.lower_bound(state);
        let first = state.iter().position(|c| *c > 0).unwrap_or(0);
        let size: u16 = state.iter().sum();
        let mut best: Option<(u64, Take)> = None;

        'sizes: for group_size in 1..=size {
            let takes = takes_of_size(state, first, group_size);
            for take in takes {
                let rest: Take = state.iter().zip(&take).map(|(s, t)| s - t).collect();
                if !self.balanced(&take) || !self.balanced(&rest) {
                    continue;
                }
                let rest_floor = self.lower_bound(&rest);
                if let Some((b, _)) = &best
                    && self.lower_bound(&take) + rest_floor >= *b
                {
                    continue;
                }
                let Some(cost) = self.group_cost(&take) else {
                    continue;
                };
                if let Some((b, _)) = &best
                    && cost + rest_floor >= *b
                {
                    continue;
                }
                let Some(rest_cost) = self.solve(&rest)? else {
                    continue;
                };

                let total = cost + rest_cost;
                if best.as_ref().is_none_or(|(b, _)| total < *b) {
                    best = Some((total, take));
                    if total == floor {
                        break 'sizes;
                    }
                }
            }
        }

        let result = best.as_ref().map(|(cost, _)| *cost);
        self.memo.insert(state.to_vec(), best);
        Ok(result)
    }

    /// Transfers needed by one sub-group, settled on its first members of each kind.
    fn group_cost(&mut self, take: &[u16]) -> Option<u64> {
        if let Some(cost) = self.group_costs.get(take) {
            return *cost;
        }
        let people = self.kinds.people(take, &vec![0; take.len()]);
        let cost = if self.model.fit(&people, self.window).is_feasible() {
            settle_group(self.model, &people, self.window).map(|route| {
                self.exact &= route.exact;
                route.edges.len() as u64
            })
        } else {
            None
        };
        self.group_costs.insert(take.to_vec(), cost);
        cost
    }
}

/// Every sub-multiset of `state` with `size` people that contains at least one
/// person of kind `first` and none of earlier kinds, in lexicographic order.
fn takes_of_size(state: &[u16], first: usize, size: u16) -> Vec<Take> {
    fn extend(state: &[u16], j: usize, left: u16, current: &mut Take, out: &mut Vec<Take>) {
        if j == state.len() {
            if left == 0 {
                out.push(current.clone());
            }
            return;
        }
        let capacity: u16 = state[j + 1..].iter().sum();
        let min = left.saturating_sub(capacity);
        for t in min..=state[j].min(left) {
            current[j] = t;
            extend(state, j + 1, left - t, current, out);
        }
        current[j] = 0;
    }

    let mut out = Vec::new();
    if state.get(first).is_none_or(|c| *c == 0) || size == 0 {
        return out;
    }
    let mut current = vec![0u16; state.len()];
    let capacity: u16 = state[first + 1..].iter().sum();
    let min = (size.saturating_sub(capacity)).max(1);
    for t in min..=state[first].min(size) {
        current[first] = t;
        extend(state, first + 1, size - t, &mut current, &mut out);
    }
    out
}
