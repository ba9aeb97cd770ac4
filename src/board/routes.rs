//! Routing and distance queries over the map.
//!
//! Routes honour per-edge movement cost and a caller-supplied passability
//! predicate for intermediate territories. Hop-count distance matrices for
//! land, water, and any-terrain movement are computed once per planning pass
//! and reused by every neighbourhood query.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, VecDeque};

use serde::{Deserialize, Serialize};

use super::state::GameState;
use super::territory::{Territory, TerritoryId};

/// A path from `start` through `steps`, the last step being the destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub start: TerritoryId,
    pub steps: Vec<TerritoryId>,
    pub cost: u32,
}

impl Route {
    pub fn end(&self) -> TerritoryId {
        self.steps.last().copied().unwrap_or(self.start)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Territories strictly between start and end.
    pub fn intermediate(&self) -> &[TerritoryId] {
        match self.steps.len() {
            0 => &[],
            n => &self.steps[..n - 1],
        }
    }
}

/// Cheapest route from `from` to `to`.
///
/// Every intermediate territory must satisfy `passable`; the destination only
/// has to be passable terrain. Ties resolve toward lower territory ids.
pub fn find_route(
    state: &GameState,
    from: TerritoryId,
    to: TerritoryId,
    passable: impl Fn(&Territory) -> bool,
) -> Option<Route> {
    if from == to {
        return Some(Route {
            start: from,
            steps: Vec::new(),
            cost: 0,
        });
    }
    if !state.territory(to).is_passable() {
        return None;
    }

    let n = state.territories.len();
    let mut best = vec![u32::MAX; n];
    let mut prev: Vec<Option<TerritoryId>> = vec![None; n];
    let mut heap = BinaryHeap::new();
    best[from.index()] = 0;
    heap.push(Reverse((0u32, from)));

    while let Some(Reverse((cost, cur))) = heap.pop() {
        if cost > best[cur.index()] {
            continue;
        }
        if cur == to {
            break;
        }
        let terr = state.territory(cur);
        if cur != from && !passable(terr) {
            continue;
        }
        for edge in &terr.edges {
            if !state.territory(edge.to).is_passable() {
                continue;
            }
            let next = cost + edge.cost;
            if next < best[edge.to.index()] {
                best[edge.to.index()] = next;
                prev[edge.to.index()] = Some(cur);
                heap.push(Reverse((next, edge.to)));
            }
        }
    }

    if best[to.index()] == u32::MAX {
        return None;
    }
    let mut steps = vec![to];
    let mut cur = to;
    while let Some(p) = prev[cur.index()] {
        if p == from {
            break;
        }
        steps.push(p);
        cur = p;
    }
    steps.reverse();
    Some(Route {
        start: from,
        steps,
        cost: best[to.index()],
    })
}

/// All territories reachable from `from` with total cost at most `max_cost`.
///
/// Territories failing `passable` are reported but never expanded.
pub fn reachable_within(
    state: &GameState,
    from: TerritoryId,
    max_cost: u32,
    passable: impl Fn(&Territory) -> bool,
) -> BTreeMap<TerritoryId, u32> {
    let mut best: BTreeMap<TerritoryId, u32> = BTreeMap::new();
    let mut heap = BinaryHeap::new();
    best.insert(from, 0);
    heap.push(Reverse((0u32, from)));

    while let Some(Reverse((cost, cur))) = heap.pop() {
        if best.get(&cur).is_some_and(|b| cost > *b) {
            continue;
        }
        let terr = state.territory(cur);
        if cur != from && !passable(terr) {
            continue;
        }
        for edge in &terr.edges {
            if !state.territory(edge.to).is_passable() {
                continue;
            }
            let next = cost + edge.cost;
            if next > max_cost {
                continue;
            }
            if best.get(&edge.to).map_or(true, |b| next < *b) {
                best.insert(edge.to, next);
                heap.push(Reverse((next, edge.to)));
            }
        }
    }
    best
}

/// Terrain allowed while measuring hop distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reach {
    Land,
    Water,
    Any,
}

/// Pre-computed BFS hop distances between all territory pairs.
#[derive(Debug, Clone)]
pub struct DistanceMatrix {
    n: usize,
    dist: Vec<i16>,
}

impl DistanceMatrix {
    /// Builds the matrix by running a BFS from every territory.
    pub fn build(state: &GameState, reach: Reach) -> Self {
        let n = state.territories.len();
        let mut dist = vec![-1i16; n * n];
        let allowed = |t: &Territory| match reach {
            Reach::Land => t.is_land(),
            Reach::Water => t.is_water(),
            Reach::Any => t.is_passable(),
        };

        let mut queue = VecDeque::with_capacity(n);
        for src in 0..n {
            dist[src * n + src] = 0;
            if !allowed(&state.territories[src]) {
                continue;
            }
            queue.clear();
            queue.push_back((src, 0i16));
            while let Some((cur, d)) = queue.pop_front() {
                for to in state.territories[cur].neighbors() {
                    let ti = to.index();
                    if !allowed(&state.territories[ti]) {
                        continue;
                    }
                    if dist[src * n + ti] == -1 {
                        dist[src * n + ti] = d + 1;
                        queue.push_back((ti, d + 1));
                    }
                }
            }
        }
        DistanceMatrix { n, dist }
    }

    /// Hop distance, or `None` if unreachable.
    pub fn get(&self, a: TerritoryId, b: TerritoryId) -> Option<u32> {
        let d = self.dist[a.index() * self.n + b.index()];
        (d >= 0).then_some(d as u32)
    }

    /// Territories within `radius` hops of `center`, including it.
    pub fn within(&self, center: TerritoryId, radius: u32) -> Vec<TerritoryId> {
        let row = &self.dist[center.index() * self.n..(center.index() + 1) * self.n];
        row.iter()
            .enumerate()
            .filter(|(_, d)| **d >= 0 && (**d as u32) <= radius)
            .map(|(i, _)| TerritoryId(i as u32))
            .collect()
    }
}

/// The three distance matrices a planning pass needs.
#[derive(Debug, Clone)]
pub struct Distances {
    pub land: DistanceMatrix,
    pub water: DistanceMatrix,
    pub any: DistanceMatrix,
}

impl Distances {
    pub fn compute(state: &GameState) -> Self {
        Distances {
            land: DistanceMatrix::build(state, Reach::Land),
            water: DistanceMatrix::build(state, Reach::Water),
            any: DistanceMatrix::build(state, Reach::Any),
        }
    }
}
