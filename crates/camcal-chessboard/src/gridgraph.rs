//! 4-connected grid graph over corner candidates.
//!
//! Every candidate looks at its `k_neighbors` nearest candidates and keeps
//! at most one neighbour along each of `±u` / `±v`, where `u` and `v` are the
//! two dominant edge directions of the whole image. Only mutual links
//! survive, so the graph is undirected.

use std::collections::{HashMap, VecDeque};

use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Point2;

use crate::axes::{cluster_axes, GridAxes};
use crate::params::{AxisClusteringParams, GridGraphParams};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NeighborDirection {
    /// `+u`
    Right,
    /// `-u`
    Left,
    /// `-v`
    Up,
    /// `+v`
    Down,
}

impl NeighborDirection {
    fn slot(self) -> usize {
        match self {
            NeighborDirection::Right => 0,
            NeighborDirection::Left => 1,
            NeighborDirection::Up => 2,
            NeighborDirection::Down => 3,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            NeighborDirection::Right => NeighborDirection::Left,
            NeighborDirection::Left => NeighborDirection::Right,
            NeighborDirection::Up => NeighborDirection::Down,
            NeighborDirection::Down => NeighborDirection::Up,
        }
    }

    /// Grid step `(di, dj)` along this direction.
    pub fn step(self) -> (i32, i32) {
        match self {
            NeighborDirection::Right => (1, 0),
            NeighborDirection::Left => (-1, 0),
            NeighborDirection::Up => (0, -1),
            NeighborDirection::Down => (0, 1),
        }
    }
}

#[derive(Clone, Debug)]
pub struct NodeNeighbor {
    pub direction: NeighborDirection,
    pub index: usize,
    pub distance: f64,
    /// Angular deviation from the axis (radians); smaller is better.
    pub score: f64,
}

/// k nearest neighbours (excluding self) from a k-d tree, sorted by distance.
pub fn nearest_neighbors(points: &[Point2<f64>], k: usize) -> Vec<Vec<(usize, f64)>> {
    let coords: Vec<[f64; 2]> = points.iter().map(|p| [p.x, p.y]).collect();
    let tree: KdTree<f64, 2> = (&coords).into();

    coords
        .iter()
        .enumerate()
        .map(|(i, query)| {
            // One extra slot for the query point itself.
            tree.nearest_n::<SquaredEuclidean>(query, k + 1)
                .into_iter()
                .map(|nn| (nn.item as usize, nn.distance.sqrt()))
                .filter(|&(j, _)| j != i)
                .take(k)
                .collect()
        })
        .collect()
}

/// Keep at most one neighbor per direction, choosing the closest candidate
/// and breaking ties by alignment.
fn select_neighbors(candidates: Vec<NodeNeighbor>) -> Vec<NodeNeighbor> {
    let mut best: [Option<NodeNeighbor>; 4] = [None, None, None, None];

    for candidate in candidates {
        let slot = &mut best[candidate.direction.slot()];
        let replace = match slot {
            None => true,
            Some(current) => {
                candidate.distance < current.distance
                    || (candidate.distance == current.distance && candidate.score < current.score)
            }
        };
        if replace {
            *slot = Some(candidate);
        }
    }

    best.into_iter().flatten().collect()
}

pub struct GridGraph {
    pub axes: GridAxes,
    pub neighbors: Vec<Vec<NodeNeighbor>>,
}

impl GridGraph {
    /// Build the graph, estimating the grid axes from the candidates
    /// themselves. Returns `None` when no two dominant axes exist.
    pub fn build(
        points: &[Point2<f64>],
        params: &GridGraphParams,
        axis_params: &AxisClusteringParams,
    ) -> Option<Self> {
        let knn = nearest_neighbors(points, params.k_neighbors.max(axis_params.votes_per_corner));

        let in_window =
            |d: f64| d >= params.min_spacing_pix && d <= params.max_spacing_pix;
        let votes: Vec<f64> = knn
            .iter()
            .enumerate()
            .flat_map(|(i, nn)| {
                nn.iter()
                    .take(axis_params.votes_per_corner)
                    .filter(|(_, d)| in_window(*d))
                    .map(move |&(j, _)| {
                        let e = points[j] - points[i];
                        e.y.atan2(e.x)
                    })
            })
            .collect();
        let axes = cluster_axes(&votes, axis_params)?;

        Some(Self::with_axes(points, &knn, axes, params))
    }

    /// Build the graph for known axes from precomputed neighbour lists.
    pub fn with_axes(
        points: &[Point2<f64>],
        knn: &[Vec<(usize, f64)>],
        axes: GridAxes,
        params: &GridGraphParams,
    ) -> Self {
        let tol = params.orientation_tolerance_deg.to_radians();
        let units = [axes.unit(0), axes.unit(1)];

        let mut directed: Vec<Vec<NodeNeighbor>> = Vec::with_capacity(points.len());
        for (i, nn) in knn.iter().enumerate() {
            let nearest = nn
                .iter()
                .map(|&(_, d)| d)
                .find(|&d| d >= params.min_spacing_pix)
                .unwrap_or(f64::INFINITY);
            let candidates = nn
                .iter()
                .take(params.k_neighbors)
                .filter_map(|&(j, distance)| {
                    if distance < params.min_spacing_pix
                        || distance > params.max_spacing_pix
                        || distance > params.max_length_ratio * nearest
                    {
                        return None;
                    }
                    let e = points[j] - points[i];
                    let (axis, score) = axes.classify(e.y.atan2(e.x));
                    if score > tol {
                        return None;
                    }
                    let forward = e.dot(&units[axis]) >= 0.0;
                    let direction = match (axis, forward) {
                        (0, true) => NeighborDirection::Right,
                        (0, false) => NeighborDirection::Left,
                        (_, true) => NeighborDirection::Down,
                        (_, false) => NeighborDirection::Up,
                    };
                    Some(NodeNeighbor {
                        direction,
                        index: j,
                        distance,
                        score,
                    })
                })
                .collect();
            directed.push(select_neighbors(candidates));
        }

        // Keep a link only if the neighbour points back through the opposite slot.
        let neighbors = directed
            .iter()
            .enumerate()
            .map(|(i, links)| {
                links
                    .iter()
                    .filter(|n| {
                        directed[n.index]
                            .iter()
                            .any(|back| back.index == i && back.direction == n.direction.opposite())
                    })
                    .cloned()
                    .collect()
            })
            .collect();

        Self { axes, neighbors }
    }
}

pub fn connected_components(graph: &GridGraph) -> Vec<Vec<usize>> {
    let mut visited = vec![false; graph.neighbors.len()];
    let mut components = Vec::new();

    for start in 0..graph.neighbors.len() {
        if visited[start] {
            continue;
        }

        let mut component = Vec::new();
        let mut stack = vec![start];

        while let Some(node) = stack.pop() {
            if visited[node] {
                continue;
            }
            visited[node] = true;
            component.push(node);

            for neighbor in &graph.neighbors[node] {
                if !visited[neighbor.index] {
                    stack.push(neighbor.index);
                }
            }
        }

        components.push(component);
    }

    components
}

/// BFS integer coordinates for a component, normalised so the minimum is
/// `(0, 0)`. Returns `None` if the graph is inconsistent: a node reached at
/// two different coordinates, or two nodes sharing one cell.
pub fn assign_grid_coordinates(
    graph: &GridGraph,
    component: &[usize],
) -> Option<Vec<(usize, i32, i32)>> {
    let start = *component.first()?;
    let mut coords: HashMap<usize, (i32, i32)> = HashMap::with_capacity(component.len());
    let mut cells: HashMap<(i32, i32), usize> = HashMap::with_capacity(component.len());
    let mut queue = VecDeque::new();

    coords.insert(start, (0, 0));
    cells.insert((0, 0), start);
    queue.push_back(start);

    while let Some(node) = queue.pop_front() {
        let (i, j) = coords[&node];
        for neighbor in &graph.neighbors[node] {
            let (di, dj) = neighbor.direction.step();
            let cell = (i + di, j + dj);
            match coords.get(&neighbor.index) {
                Some(&existing) if existing != cell => return None,
                Some(_) => {}
                None => {
                    if cells.insert(cell, neighbor.index).is_some() {
                        return None;
                    }
                    coords.insert(neighbor.index, cell);
                    queue.push_back(neighbor.index);
                }
            }
        }
    }

    let min_i = coords.values().map(|c| c.0).min()?;
    let min_j = coords.values().map(|c| c.1).min()?;
    let mut out: Vec<(usize, i32, i32)> = coords
        .into_iter()
        .map(|(n, (i, j))| (n, i - min_i, j - min_j))
        .collect();
    out.sort_unstable_by_key(|&(n, _, _)| n);
    Some(out)
}
