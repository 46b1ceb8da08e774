//! Turning net flows into concrete transfers.

use crate::constraints::{ConstraintModel, Window};
use std::collections::VecDeque;

/// A routed transfer between two people (global indices).
pub(crate) type Edge = (usize, usize, i64);

/// Largest sub-group whose transfer count is searched exactly when the cap binds.
pub(crate) const EXACT_GROUP_LIMIT: usize = 5;

/// Transfers settling one sub-group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GroupRoute {
    pub edges: Vec<Edge>,
    /// No plan connecting the whole sub-group uses fewer transfers.
    pub exact: bool,
}

/// Settles `members` among themselves inside `window` with as few transfers as
/// can be proven.
///
/// A connected sub-group of `k` people needs at least `k − 1` transfers, so a
/// constructive routing that meets that is minimal. When the cap forces more, a
/// small sub-group searches arc sets exactly; a larger one keeps the
/// constructive routing and reports it as unproven.
pub(crate) fn settle_group(
    model: &ConstraintModel<'_>,
    members: &[usize],
    window: Window,
) -> Option<GroupRoute> {
    let edges = route_group(model, members, window)?;
    if edges.len() < members.len() {
        return Some(GroupRoute { edges, exact: true });
    }
    if members.len() > EXACT_GROUP_LIMIT {
        return Some(GroupRoute {
            edges,
            exact: false,
        });
    }
    let bound = edges.len();
    let edges = fewest_arcs(model, members, window, bound).unwrap_or(edges);
    Some(GroupRoute { edges, exact: true })
}

/// Settles `members` among themselves inside `window`.
///
/// Targets are the most even realizable flows; when water-filling lands on a
/// vector the transfer cap cannot carry, a lower-bounded circulation finds one
/// that it can.
pub(crate) fn route_group(
    model: &ConstraintModel<'_>,
    members: &[usize],
    window: Window,
) -> Option<Vec<Edge>> {
    let flows = model
        .even_flows(members, window)
        .or_else(|| circulate(model, members, window))?;
    route(model, members, &flows)
}

/// Smallest arc set spanning `members` that can carry a settlement inside
/// `window`, trying sizes from `k − 1` up to (not including) `bound`.
///
/// Opposite transfers between a pair always net out, so each pair is used in
/// one direction at most.
fn fewest_arcs(
    model: &ConstraintModel<'_>,
    members: &[usize],
    window: Window,
    bound: usize,
) -> Option<Vec<Edge>> {
    let k = members.len();
    let pairs: Vec<(usize, usize)> = (0..k)
        .flat_map(|i| (i + 1..k).map(move |j| (i, j)))
        .collect();
    let bounds = members
        .iter()
        .map(|&p| model.flow_bounds(p, window))
        .collect();
    let mut arcs = ArcSearch {
        model,
        members,
        window,
        bounds,
        pairs,
        chosen: Vec::with_capacity(bound),
    };
    (k.saturating_sub(1)..bound).find_map(|size| arcs.pick(0, size))
}

struct ArcSearch<'a, 'b> {
    model: &'a ConstraintModel<'b>,
    members: &'a [usize],
    window: Window,
    /// Net outflow bounds per member.
    bounds: Vec<(i128, i128)>,
    pairs: Vec<(usize, usize)>,
    chosen: Vec<(usize, usize)>,
}

impl ArcSearch<'_, '_> {
    /// Chooses `left` more pairs from `pairs[start..]`, in lexicographic order.
    fn pick(&mut self, start: usize, left: usize) -> Option<Vec<Edge>> {
        if left == 0 {
            return if spans(self.members.len(), &self.chosen) {
                self.orient()
            } else {
                None
            };
        }
        if self.pairs.len() < start + left {
            return None;
        }
        for next in start..=self.pairs.len() - left {
            self.chosen.push(self.pairs[next]);
            let found = self.pick(next + 1, left - 1);
            self.chosen.pop();
            if found.is_some() {
                return found;
            }
        }
        None
    }

    /// Tries every direction assignment of the chosen pairs.
    fn orient(&self) -> Option<Vec<Edge>> {
        let (model, members) = (self.model, self.members);
        let m = model.max_transaction_amount();
        let cap = i128::from(m);
        let size = self.chosen.len();
        'masks: for mask in 0u32..(1 << size) {
            let mut arcs = Vec::with_capacity(size);
            // (out, in) arc counts per member
            let mut degree = vec![(0i128, 0i128); members.len()];
            for (bit, &(i, j)) in self.chosen.iter().enumerate() {
                let (from, to) = if mask & (1 << bit) == 0 {
                    (i, j)
                } else {
                    (j, i)
                };
                if !model.admits_transfer(members[from], members[to], m) {
                    continue 'masks;
                }
                degree[from].0 += 1;
                degree[to].1 += 1;
                arcs.push((from, to));
            }
            let reachable = self
                .bounds
                .iter()
                .zip(&degree)
                .all(|(&(a, b), &(out, inn))| a <= cap * out && -cap * inn <= b);
            if !reachable {
                continue;
            }
            let Some(net) = circulation(model, members, self.window, &arcs) else {
                continue;
            };
            return net
                .transfers(members.len())
                .into_iter()
                .map(|(i, j, amount)| Some((members[i], members[j], i64::try_from(amount).ok()?)))
                .collect();
        }
        None
    }
}

/// Whether the undirected pairs connect all `k` people.
fn spans(k: usize, pairs: &[(usize, usize)]) -> bool {
    if k == 0 {
        return true;
    }
    let mut reached = vec![false; k];
    let mut stack = vec![0];
    while let Some(v) = stack.pop() {
        if std::mem::replace(&mut reached[v], true) {
            continue;
        }
        for &(i, j) in pairs {
            if i == v && !reached[j] {
                stack.push(j);
            } else if j == v && !reached[i] {
                stack.push(i);
            }
        }
    }
    reached.iter().all(|r| *r)
}

/// Routes fixed net outflows (`flows[i]` for `members[i]`), greedily first and by
/// max-flow when the cap leaves the greedy pass stuck.
pub(crate) fn route(
    model: &ConstraintModel<'_>,
    members: &[usize],
    flows: &[i128],
) -> Option<Vec<Edge>> {
    let local =
        greedy(model, members, flows).or_else(|| max_flow_routing(model, members, flows))?;
    local
        .into_iter()
        .map(|(i, j, amount)| Some((members[i], members[j], i64::try_from(amount).ok()?)))
        .collect()
}

/// Largest remaining payer pays the largest remaining receiver it has not paid
/// yet, capped at the transfer limit. Ties go to the earlier member.
///
/// Without a binding cap every step clears a payer or a receiver, so a group of
/// `k` people settles in at most `k − 1` transfers.
fn greedy(
    model: &ConstraintModel<'_>,
    members: &[usize],
    flows: &[i128],
) -> Option<Vec<(usize, usize, i128)>> {
    let k = members.len();
    let m = model.max_transaction_amount() as i128;
    let mut remaining = flows.to_vec();
    let mut used = vec![false; k * k];
    let mut edges = Vec::new();

    loop {
        let Some(payer) = argmax(remaining.iter().map(|r| (*r > 0).then_some(*r))) else {
            break;
        };
        let receiver = argmax(remaining.iter().enumerate().map(|(j, r)| {
            let open = *r < 0 && j != payer && !used[payer * k + j];
            open.then_some(-*r)
        }))?;

        let amount = remaining[payer].min(-remaining[receiver]).min(m);
        let fits = i64::try_from(amount)
            .is_ok_and(|a| a > 0 && model.admits_transfer(members[payer], members[receiver], a));
        if !fits {
            return None;
        }

        used[payer * k + receiver] = true;
        remaining[payer] -= amount;
        remaining[receiver] += amount;
        edges.push((payer, receiver, amount));
    }

    remaining.iter().all(|r| *r == 0).then_some(edges)
}

/// Index of the first maximum among the `Some` entries.
fn argmax(values: impl Iterator<Item = Option<i128>>) -> Option<usize> {
    let mut best: Option<(usize, i128)> = None;
    for (i, v) in values.enumerate() {
        if let Some(v) = v
            && best.is_none_or(|(_, b)| v > b)
        {
            best = Some((i, v));
        }
    }
    best.map(|(i, _)| i)
}

fn max_flow_routing(
    model: &ConstraintModel<'_>,
    members: &[usize],
    flows: &[i128],
) -> Option<Vec<(usize, usize, i128)>> {
    let k = members.len();
    let (source, sink) = (k, k + 1);
    let mut net = FlowNetwork::new(k + 2);
    let mut supply = 0i128;

    for (i, f) in flows.iter().enumerate() {
        if *f > 0 {
            net.add_capacity(source, i, *f);
            supply += *f;
        } else if *f < 0 {
            net.add_capacity(i, sink, -*f);
        }
    }
    for (i, j) in admitted_arcs(model, members) {
        net.add_capacity(i, j, model.max_transaction_amount() as i128);
    }

    if net.max_flow(source, sink) != supply {
        return None;
    }
    Some(net.transfers(k))
}

/// Finds net outflows inside the window bounds that the transfer cap can carry.
fn circulate(model: &ConstraintModel<'_>, members: &[usize], window: Window) -> Option<Vec<i128>> {
    let arcs = admitted_arcs(model, members);
    let net = circulation(model, members, window, &arcs)?;
    Some((0..members.len()).map(|i| net.outflow(i, members.len())).collect())
}

/// Circulation with lower bounds through a hub node: each member sends between
/// its window bounds, over `arcs` (local indices) only, at most the cap each.
fn circulation(
    model: &ConstraintModel<'_>,
    members: &[usize],
    window: Window,
    arcs: &[(usize, usize)],
) -> Option<FlowNetwork> {
    let k = members.len();
    let (hub, source, sink) = (k, k + 1, k + 2);
    let mut net = FlowNetwork::new(k + 3);
    let mut excess = vec![0i128; k + 1];

    for (i, &p) in members.iter().enumerate() {
        let (a, b) = model.flow_bounds(p, window);
        if a > b {
            return None;
        }
        net.add_capacity(hub, i, b - a);
        excess[i] += a;
        excess[hub] -= a;
    }
    for &(i, j) in arcs {
        net.add_capacity(i, j, model.max_transaction_amount() as i128);
    }

    let mut required = 0i128;
    for (v, e) in excess.iter().enumerate() {
        if *e > 0 {
            net.add_capacity(source, v, *e);
            required += *e;
        } else if *e < 0 {
            net.add_capacity(v, sink, -*e);
        }
    }

    (net.max_flow(source, sink) == required).then_some(net)
}

/// Every ordered pair of members a capped transfer may use (local indices).
fn admitted_arcs(model: &ConstraintModel<'_>, members: &[usize]) -> Vec<(usize, usize)> {
    let m = model.max_transaction_amount();
    let mut arcs = Vec::new();
    for (i, &from) in members.iter().enumerate() {
        for (j, &to) in members.iter().enumerate() {
            if model.admits_transfer(from, to, m) && from != to {
                arcs.push((i, j));
            }
        }
    }
    arcs
}

/// Dense residual network, augmented with shortest paths (Edmonds–Karp).
///
/// Flow is kept skew-symmetric, so opposite transfers between a pair net out.
struct FlowNetwork {
    size: usize,
    capacity: Vec<i128>,
    flow: Vec<i128>,
}

impl FlowNetwork {
    fn new(size: usize) -> Self {
        Self {
            size,
            capacity: vec![0; size * size],
            flow: vec![0; size * size],
        }
    }

    fn add_capacity(&mut self, u: usize, v: usize, c: i128) {
        self.capacity[u * self.size + v] += c;
    }

    fn residual(&self, u: usize, v: usize) -> i128 {
        self.capacity[u * self.size + v] - self.flow[u * self.size + v]
    }

    fn flow(&self, u: usize, v: usize) -> i128 {
        self.flow[u * self.size + v]
    }

    fn max_flow(&mut self, source: usize, sink: usize) -> i128 {
        let n = self.size;
        let mut total = 0i128;
        loop {
            let mut parent = vec![usize::MAX; n];
            parent[source] = source;
            let mut queue = VecDeque::from([source]);
            while let Some(u) = queue.pop_front() {
                if u == sink {
                    break;
                }
                for v in 0..n {
                    if parent[v] == usize::MAX && self.residual(u, v) > 0 {
                        parent[v] = u;
                        queue.push_back(v);
                    }
                }
            }
            if parent[sink] == usize::MAX {
                return total;
            }

            let mut bottleneck = i128::MAX;
            let mut v = sink;
            while v != source {
                let u = parent[v];
                bottleneck = bottleneck.min(self.residual(u, v));
                v = u;
            }
            let mut v = sink;
            while v != source {
                let u = parent[v];
                self.flow[u * n + v] += bottleneck;
                self.flow[v * n + u] -= bottleneck;
                v = u;
            }
            total += bottleneck;
        }
    }

    /// Net flow out of `u` into the first `k` nodes.
    fn outflow(&self, u: usize, k: usize) -> i128 {
        (0..k).map(|v| self.flow(u, v)).sum()
    }

    /// Positive net flow between the first `k` nodes.
    fn transfers(&self, k: usize) -> Vec<(usize, usize, i128)> {
        let mut out = Vec::new();
        for i in 0..k {
            for j in 0..k {
                let f = self.flow(i, j);
                if f > 0 {
                    out.push((i, j, f));
                }
            }
        }
        out
    }
}
