//! Hard constraints over transaction plans, plus the window oracle the search
//! prunes with.
//!
//! A *window* `[lo, hi]` is the band every final spend has to land in; its width
//! is the spread ε. For a window, person `p` has to send a net amount
//! `f_p ∈ [a_p, b_p]` with `a_p = L_p − init_p` and `b_p = min(hi, cap_p) − init_p`,
//! where `L_p = lo` (or `max(lo, init_p)` for the exempt person, who can only pay).
//!
//! Whether such flows can be carried by transfers of at most `M` each, with nobody
//! paying the exempt person, is Hoffman's circulation condition. It splits into an
//! outflow side (for every set `X`, `Σ_X a ≤ M·|edges leaving X|`) and an inflow
//! side (for every set `Y`, `Σ_Y −b ≤ M·|edges entering Y|`). Both only depend on
//! sorted prefix sums, and each side is monotone in `lo`, which is what lets the
//! search bisect over window floors.

use crate::balance::Balances;
use crate::plan::{TransactionPlan, spread};
use kitty_types::input::SettleParams;
use std::fmt;
use std::ops::RangeInclusive;
use thiserror::Error;

/// One hard rule a finished plan must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    AmountRange,
    ExemptReceives,
    SelfTransfer,
    ParticipationCap,
    Conservation,
    Fairness,
    /// Claimed figures (ε, exchange count, totals) disagree with the plan.
    Accounting,
}

impl Rule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rule::AmountRange => "amount_range",
            Rule::ExemptReceives => "exempt_receives",
            Rule::SelfTransfer => "self_transfer",
            Rule::ParticipationCap => "participation_cap",
            Rule::Conservation => "conservation",
            Rule::Fairness => "fairness",
            Rule::Accounting => "accounting",
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{rule}: {detail}")]
pub struct Violation {
    pub rule: Rule,
    pub detail: String,
}

impl Violation {
    pub fn new(rule: Rule, detail: impl Into<String>) -> Self {
        Self {
            rule,
            detail: detail.into(),
        }
    }
}

/// Closed band `[lo, hi]` for final spends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Window {
    pub lo: i64,
    pub hi: i64,
}

impl Window {
    pub fn with_width(lo: i64, width: i64) -> Self {
        Self {
            lo,
            hi: lo.saturating_add(width),
        }
    }

    pub fn width(&self) -> i64 {
        self.hi - self.lo
    }
}

/// Which way a window floor has to move to become feasible.
///
/// Both flags set means no floor works at this width.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowFit {
    pub floor_too_low: bool,
    pub floor_too_high: bool,
}

impl WindowFit {
    pub fn is_feasible(&self) -> bool {
        !self.floor_too_low && !self.floor_too_high
    }
}

/// Inputs that make two people interchangeable for the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature {
    pub initial_spend: i64,
    pub participation_cap: i64,
    pub exempt: bool,
}

pub struct ConstraintModel<'b> {
    balances: &'b Balances,
    max_transaction_amount: i64,
    fixed_epsilon: i64,
}

impl<'b> ConstraintModel<'b> {
    pub fn new(balances: &'b Balances, params: SettleParams) -> Self {
        Self {
            balances,
            max_transaction_amount: params.max_transaction_amount,
            fixed_epsilon: params.fixed_epsilon,
        }
    }

    pub fn balances(&self) -> &'b Balances {
        self.balances
    }

    pub fn len(&self) -> usize {
        self.balances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }

    pub fn max_transaction_amount(&self) -> i64 {
        self.max_transaction_amount
    }

    pub fn fixed_epsilon(&self) -> i64 {
        self.fixed_epsilon
    }

    pub fn signature(&self, p: usize) -> Signature {
        Signature {
            initial_spend: self.balances.initial_spend()[p],
            participation_cap: self.balances.participation_cap()[p],
            exempt: self.balances.is_exempt(p),
        }
    }

    /// Edge-local rules (amount range, exempt receiver, self transfer) for a single
    /// entry of a partially built plan.
    pub fn admits_transfer(&self, from: usize, to: usize, amount: i64) -> bool {
        if !(0..=self.max_transaction_amount).contains(&amount) {
            return false;
        }
        amount == 0 || (from != to && !self.balances.is_exempt(to))
    }

    pub fn is_feasible(&self, plan: &TransactionPlan) -> bool {
        self.violations(plan).is_empty()
    }

    pub fn violations(&self, plan: &TransactionPlan) -> Vec<Violation> {
        self.violations_within(plan, self.fixed_epsilon)
    }

    /// Every broken rule, with the fairness rule checked against `ceiling`.
    pub fn violations_within(&self, plan: &TransactionPlan, ceiling: i64) -> Vec<Violation> {
        let b = self.balances;
        if plan.size() != b.len() {
            return vec![Violation::new(
                Rule::Accounting,
                format!("plan covers {} people, group has {}", plan.size(), b.len()),
            )];
        }

        let mut out = Vec::new();
        for (from, to, amount) in plan.cells() {
            if !(0..=self.max_transaction_amount).contains(&amount) {
                out.push(Violation::new(
                    Rule::AmountRange,
                    format!(
                        "{} -> {} amount {} outside [0, {}]",
                        b.person(from),
                        b.person(to),
                        amount,
                        self.max_transaction_amount
                    ),
                ));
            }
            if amount > 0 && from == to {
                out.push(Violation::new(
                    Rule::SelfTransfer,
                    format!("{} pays themselves {}", b.person(from), amount),
                ));
            } else if amount > 0 && b.is_exempt(to) {
                out.push(Violation::new(
                    Rule::ExemptReceives,
                    format!("{} pays exempt {} {}", b.person(from), b.person(to), amount),
                ));
            }
        }

        let finals = plan.final_spends(b);
        for (p, final_spend) in finals.iter().enumerate() {
            let cap = b.participation_cap()[p] as i128;
            if *final_spend > cap {
                out.push(Violation::new(
                    Rule::ParticipationCap,
                    format!("{} ends at {} above cap {}", b.person(p), final_spend, cap),
                ));
            }
        }

        let total: i128 = finals.iter().sum();
        if total != b.total_spend() as i128 {
            out.push(Violation::new(
                Rule::Conservation,
                format!("final spends sum to {}, initial to {}", total, b.total_spend()),
            ));
        }

        let eps = spread(&finals);
        if eps > ceiling as i128 {
            out.push(Violation::new(
                Rule::Fairness,
                format!("spread {} exceeds {}", eps, ceiling),
            ));
        }

        out
    }

    /// Net outflow bounds `[a_p, b_p]` of person `p` inside `window`.
    pub fn flow_bounds(&self, p: usize, window: Window) -> (i128, i128) {
        let init = self.balances.initial_spend()[p] as i128;
        let cap = self.balances.participation_cap()[p] as i128;
        let floor = if self.balances.is_exempt(p) {
            (window.lo as i128).max(init)
        } else {
            window.lo as i128
        };
        let ceiling = (window.hi as i128).min(cap);
        (floor - init, ceiling - init)
    }

    /// Exact feasibility of settling `members` among themselves inside `window`.
    pub fn fit(&self, members: &[usize], window: Window) -> WindowFit {
        let mut fit = WindowFit::default();
        let mut lower = Vec::with_capacity(members.len());
        let mut demand = Vec::with_capacity(members.len());
        let mut exempt = None;

        for &p in members {
            let (a, b) = self.flow_bounds(p, window);
            if a > b {
                let init = self.balances.initial_spend()[p];
                let cap = self.balances.participation_cap()[p];
                if window.lo > cap {
                    fit.floor_too_high = true;
                }
                if self.balances.is_exempt(p) {
                    if init > cap {
                        fit.floor_too_low = true;
                        fit.floor_too_high = true;
                    }
                    if init > window.hi {
                        fit.floor_too_low = true;
                    }
                }
            }
            if self.balances.is_exempt(p) {
                exempt = Some((a, b));
            } else {
                lower.push(a);
                demand.push(-b);
            }
        }

        let m = self.max_transaction_amount as i128;
        if !outflow_cuts_hold(&mut lower, exempt.map(|(a, _)| a), m) {
            fit.floor_too_high = true;
        }
        if !inflow_cuts_hold(&mut demand, exempt.map(|(_, b)| -b), m) {
            fit.floor_too_low = true;
        }
        fit
    }

    /// Gale's condition for a fixed vector of net outflows (parallel to `members`).
    pub fn realizable(&self, members: &[usize], flows: &[i128]) -> bool {
        let mut out = Vec::with_capacity(members.len());
        let mut inn = Vec::with_capacity(members.len());
        let mut exempt = None;
        for (&p, &f) in members.iter().zip(flows) {
            if self.balances.is_exempt(p) {
                exempt = Some(f);
            } else {
                out.push(f);
                inn.push(-f);
            }
        }
        let m = self.max_transaction_amount as i128;
        outflow_cuts_hold(&mut out, exempt, m) && inflow_cuts_hold(&mut inn, exempt.map(|f| -f), m)
    }

    /// The most even realizable flows for `members` inside `window`, if the
    /// water-filled vector happens to be realizable.
    pub fn even_flows(&self, members: &[usize], window: Window) -> Option<Vec<i128>> {
        let bounds: Vec<(i128, i128)> = members
            .iter()
            .map(|&p| self.flow_bounds(p, window))
            .collect();
        let flows = water_fill(&bounds, 0)?;
        self.realizable(members, &flows).then_some(flows)
    }

    /// Candidate floors for width `eps`: the mean spend must fit in the window and
    /// nobody's cap may sit below its floor.
    fn floor_range(&self, eps: i64) -> Option<(i64, i64)> {
        let c = self.len() as i128;
        if c == 0 {
            return None;
        }
        let total = self.balances.total_spend() as i128;
        let min = ceil_div(total - c * eps as i128, c);
        let min_cap = self
            .balances
            .participation_cap()
            .iter()
            .copied()
            .min()
            .unwrap_or(i64::MAX) as i128;
        let max = total.div_euclid(c).min(min_cap);
        if min > max {
            return None;
        }
        Some((clamp_i64(min), clamp_i64(max)))
    }

    /// All floors `lo` for which the whole group fits in `[lo, lo + eps]`.
    ///
    /// Feasible floors form one contiguous range, found by two bisections.
    pub fn feasible_floors(&self, eps: i64) -> Option<RangeInclusive<i64>> {
        let members: Vec<usize> = (0..self.len()).collect();
        let (min, max) = self.floor_range(eps)?;
        let fit = |lo: i64| self.fit(&members, Window::with_width(lo, eps));

        if fit(max).floor_too_low {
            return None;
        }
        let (mut l, mut h) = (min, max);
        while l < h {
            let mid = midpoint(l, h, false);
            if fit(mid).floor_too_low {
                l = mid + 1;
            } else {
                h = mid;
            }
        }
        let first = l;
        if fit(first).floor_too_high {
            return None;
        }

        let (mut l, mut h) = (first, max);
        while l < h {
            let mid = midpoint(l, h, true);
            if fit(mid).floor_too_high {
                h = mid - 1;
            } else {
                l = mid;
            }
        }
        Some(first..=l)
    }

    /// Largest spread any plan can have: nobody can end below what they could
    /// give away, or above what they could receive and their cap.
    pub fn epsilon_ceiling(&self) -> i64 {
        let n = self.len();
        if n == 0 {
            return 0;
        }
        let reach = self.max_transaction_amount as i128 * (n as i128 - 1);
        let mut lowest = i128::MAX;
        let mut highest = i128::MIN;
        for p in 0..n {
            let init = self.balances.initial_spend()[p] as i128;
            let cap = self.balances.participation_cap()[p] as i128;
            let low = if self.balances.is_exempt(p) {
                init
            } else {
                init - reach
            };
            lowest = lowest.min(low);
            highest = highest.max(cap.min(init + reach));
        }
        clamp_i64((highest - lowest).max(0))
    }
}

/// Outflow side of the cut condition: a set `X` of `k` people can push out at
/// most `M` per pair into non-exempt people outside `X`.
fn outflow_cuts_hold(values: &mut [i128], exempt: Option<i128>, m: i128) -> bool {
    let c = values.len() as i128 + i128::from(exempt.is_some());
    cuts_hold(values, exempt, |k, exempt_inside| {
        let receivers = if exempt.is_some() && !exempt_inside {
            c - k - 1
        } else {
            c - k
        };
        m * k * receivers
    })
}

/// Inflow side: a set `Y` of `k` people can take in at most `M` per pair from
/// everyone outside `Y`, and the exempt person takes nothing.
fn inflow_cuts_hold(values: &mut [i128], exempt: Option<i128>, m: i128) -> bool {
    let c = values.len() as i128 + i128::from(exempt.is_some());
    cuts_hold(values, exempt, |k, exempt_inside| {
        let receivers = if exempt_inside { k - 1 } else { k };
        m * (c - k) * receivers
    })
}

/// Checks `Σ_S v ≤ capacity(|S|, exempt ∈ S)` for every subset `S`, using the
/// largest values for each size.
fn cuts_hold(
    values: &mut [i128],
    exempt: Option<i128>,
    capacity: impl Fn(i128, bool) -> i128,
) -> bool {
    values.sort_unstable_by(|x, y| y.cmp(x));

    let mut prefix = 0i128;
    for (k, v) in values.iter().enumerate() {
        prefix += v;
        if prefix > capacity(k as i128 + 1, false) {
            return false;
        }
    }

    if let Some(e) = exempt {
        let mut prefix = e;
        if prefix > capacity(1, true) {
            return false;
        }
        for (k, v) in values.iter().enumerate() {
            prefix += v;
            if prefix > capacity(k as i128 + 2, true) {
                return false;
            }
        }
    }
    true
}

/// Most even integer vector with `a_p ≤ x_p ≤ b_p` and `Σ x = total`.
///
/// Everyone is clamped to a common level λ; the units left over go one each to
/// the earliest people that can still rise. `None` when the bounds cannot reach
/// `total`.
pub fn water_fill(bounds: &[(i128, i128)], total: i128) -> Option<Vec<i128>> {
    if bounds.iter().any(|(a, b)| a > b) {
        return None;
    }
    let sum_low: i128 = bounds.iter().map(|(a, _)| a).sum();
    let sum_high: i128 = bounds.iter().map(|(_, b)| b).sum();
    if total < sum_low || total > sum_high {
        return None;
    }
    if bounds.is_empty() {
        return Some(Vec::new());
    }

    let level_sum = |level: i128| -> i128 {
        bounds
            .iter()
            .map(|&(a, b)| level.clamp(a, b))
            .sum()
    };

    let mut l = bounds.iter().map(|(a, _)| *a).min().unwrap_or(0);
    let mut h = bounds.iter().map(|(_, b)| *b).max().unwrap_or(0);
    while l < h {
        let mid = l + (h - l + 1) / 2;
        if level_sum(mid) <= total {
            l = mid;
        } else {
            h = mid - 1;
        }
    }

    let level = l;
    let mut remainder = total - level_sum(level);
    let mut out: Vec<i128> = bounds.iter().map(|&(a, b)| level.clamp(a, b)).collect();
    for (x, &(a, b)) in out.iter_mut().zip(bounds) {
        if remainder == 0 {
            break;
        }
        if a <= level && level < b {
            *x += 1;
            remainder -= 1;
        }
    }
    Some(out)
}

fn ceil_div(a: i128, b: i128) -> i128 {
    -(-a).div_euclid(b)
}

fn clamp_i64(v: i128) -> i64 {
    v.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

fn midpoint(l: i64, h: i64, upper: bool) -> i64 {
    let (l, h) = (l as i128, h as i128);
    let mid = if upper {
        l + (h - l + 1) / 2
    } else {
        l + (h - l) / 2
    };
    mid as i64
}
