//! Chart segmentation.
//!
//! Partitions the triangles of a mesh into islands that can each be
//! flattened with low distortion. An edge becomes a **seam** when the
//! dihedral angle across it exceeds the angle threshold, or when it is a
//! boundary or non-manifold edge. Islands are the connected components of
//! the dual graph (triangles joined across non-seam edges). Islands smaller
//! than the minimum size are merged into the neighbour they share the most
//! seam edges with.
//!
//! A smooth closed surface (a sphere at any threshold above its facet angle)
//! would survive as one island without boundary, which cannot be flattened.
//! Each closed island is therefore cut in two along its dual spanning tree:
//! the tree is grown breadth-first from the island's lowest triangle and the
//! tree edge whose subtree is closest to half the island is removed. Both
//! halves are connected and each has a boundary.
//!
//! Everything here is deterministic: components are grown breadth-first from
//! the lowest unassigned triangle index, neighbours are visited in ascending
//! order, and merge ties go to the lowest island id.
//!
//! # Example
//!
//! ```
//! use unfold::algo::segment::segment;
//! use unfold::fixtures;
//! use unfold::mesh::Adjacency;
//!
//! let cube = fixtures::cube();
//! let adjacency = Adjacency::build(&cube);
//! let seg = segment(&cube, &adjacency, 30.0, 1).unwrap();
//! assert_eq!(seg.num_islands(), 6);
//! ```

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, VecDeque};

use nalgebra::Vector3;
use tracing::debug;

use crate::error::{MeshError, Result};
use crate::mesh::{Adjacency, FaceId, IslandId, Mesh};

/// Result of chart segmentation.
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    /// Island id of every triangle. Ids are contiguous, starting at 0.
    pub face_islands: Vec<IslandId>,
    /// Triangles of every island, ascending.
    pub island_faces: Vec<Vec<FaceId>>,
    /// Islands below the minimum size that had no neighbour to merge into.
    pub small_islands: Vec<IslandId>,
    /// Edge indices (into [`Adjacency::edges`]) marked as seams.
    pub seam_edges: Vec<usize>,
}

impl Segmentation {
    /// Number of islands.
    #[inline]
    pub fn num_islands(&self) -> usize {
        self.island_faces.len()
    }

    /// Whether an island was flagged as too small to stand alone.
    pub fn is_small(&self, island: IslandId) -> bool {
        self.small_islands.binary_search(&island).is_ok()
    }
}

/// Angle between two triangle normals, in degrees.
///
/// Returns 0 if either normal is zero, so triangles with unusable normals
/// join their neighbours instead of forming islands of their own.
pub fn dihedral_angle(n0: &Vector3<f64>, n1: &Vector3<f64>) -> f64 {
    let len = n0.norm() * n1.norm();
    if len < 1e-300 {
        return 0.0;
    }
    (n0.dot(n1) / len).clamp(-1.0, 1.0).acos().to_degrees()
}

/// Classify every edge as seam or smooth.
///
/// Returns one flag per edge of `adjacency`.
pub fn detect_seams(mesh: &Mesh, adjacency: &Adjacency, angle_threshold: f64) -> Vec<bool> {
    let normals: Vec<Vector3<f64>> = mesh.face_ids().map(|f| mesh.face_normal(f)).collect();

    (0..adjacency.num_edges())
        .map(|e| {
            let faces = adjacency.edge_faces(e);
            match faces {
                [f0, f1] => {
                    dihedral_angle(&normals[f0.index()], &normals[f1.index()]) > angle_threshold
                }
                // Boundary (one face) or non-manifold (three or more).
                _ => true,
            }
        })
        .collect()
}

/// Segment a mesh into islands.
///
/// # Arguments
///
/// * `mesh` - The input mesh
/// * `adjacency` - Adjacency tables built from `mesh`
/// * `angle_threshold` - Dihedral angle in degrees above which an edge is a seam
/// * `min_island_faces` - Islands with fewer triangles are merged or flagged
///
/// # Errors
///
/// Returns [`MeshError::InvalidParameter`] if `angle_threshold` is not in (0, 180).
pub fn segment(
    mesh: &Mesh,
    adjacency: &Adjacency,
    angle_threshold: f64,
    min_island_faces: usize,
) -> Result<Segmentation> {
    if !(angle_threshold > 0.0 && angle_threshold < 180.0) {
        return Err(MeshError::invalid_param(
            "angle_threshold",
            angle_threshold,
            "must be in (0, 180) degrees",
        ));
    }

    let mut seams = detect_seams(mesh, adjacency, angle_threshold);
    let mut labels = flood_fill(mesh.num_triangles(), adjacency, &seams);
    let mut small = merge_small_islands(&mut labels, adjacency, &seams, min_island_faces);
    let cut = cut_closed_islands(
        &mut labels,
        adjacency,
        &mut seams,
        min_island_faces,
        &mut small,
    );

    let (face_islands, island_faces, small_islands) = relabel(&labels, &small);
    let seam_edges: Vec<usize> = (0..seams.len()).filter(|&e| seams[e]).collect();

    debug!(
        seams = seam_edges.len(),
        islands = island_faces.len(),
        small = small_islands.len(),
        cut,
        "segmented mesh"
    );

    Ok(Segmentation {
        face_islands,
        island_faces,
        small_islands,
        seam_edges,
    })
}

/// Label connected components of the dual graph restricted to smooth edges.
fn flood_fill(num_faces: usize, adjacency: &Adjacency, seams: &[bool]) -> Vec<usize> {
    const UNVISITED: usize = usize::MAX;

    let mut labels = vec![UNVISITED; num_faces];
    let mut queue = VecDeque::new();
    let mut next_label = 0;

    for start in 0..num_faces {
        if labels[start] != UNVISITED {
            continue;
        }
        labels[start] = next_label;
        queue.push_back(FaceId::new(start));

        while let Some(face) = queue.pop_front() {
            for (neighbor, edge) in adjacency.face_neighbors(face) {
                if !seams[edge] && labels[neighbor.index()] == UNVISITED {
                    labels[neighbor.index()] = next_label;
                    queue.push_back(neighbor);
                }
            }
        }

        next_label += 1;
    }

    labels
}

/// Merge islands below `min_faces` into their best neighbour.
///
/// Works smallest-first (ties by label). Returns the labels of islands that
/// stayed small because nothing was adjacent to them.
fn merge_small_islands(
    labels: &mut [usize],
    adjacency: &Adjacency,
    seams: &[bool],
    min_faces: usize,
) -> Vec<usize> {
    let num_labels = labels.iter().map(|&l| l + 1).max().unwrap_or(0);
    let mut members: Vec<Vec<usize>> = vec![Vec::new(); num_labels];
    for (face, &label) in labels.iter().enumerate() {
        members[label].push(face);
    }

    let mut heap: BinaryHeap<Reverse<(usize, usize)>> = members
        .iter()
        .enumerate()
        .filter(|(_, m)| m.len() < min_faces)
        .map(|(label, m)| Reverse((m.len(), label)))
        .collect();

    let mut isolated = Vec::new();

    while let Some(Reverse((size, label))) = heap.pop() {
        // Stale entry: the island grew or was absorbed since it was pushed.
        if members[label].len() != size || size == 0 {
            continue;
        }

        // Count manifold seam edges shared with each neighbouring island.
        let mut shared: BTreeMap<usize, usize> = BTreeMap::new();
        for &face in &members[label] {
            for edge in adjacency.face_edges(FaceId::new(face)) {
                if !seams[edge] {
                    continue;
                }
                if let [f0, f1] = adjacency.edge_faces(edge) {
                    let other = if f0.index() == face { f1 } else { f0 };
                    let other_label = labels[other.index()];
                    if other_label != label {
                        *shared.entry(other_label).or_insert(0) += 1;
                    }
                }
            }
        }

        // Most shared edges wins; BTreeMap order makes the lowest label win ties.
        let target = shared
            .iter()
            .fold(None, |best: Option<(usize, usize)>, (&l, &count)| match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((l, count)),
            })
            .map(|(l, _)| l);

        let Some(target) = target else {
            isolated.push(label);
            continue;
        };

        let moved = std::mem::take(&mut members[label]);
        for &face in &moved {
            labels[face] = target;
        }
        members[target].extend(moved);

        let new_size = members[target].len();
        if new_size < min_faces {
            heap.push(Reverse((new_size, target)));
        }
    }

    isolated
}

/// Split every island without boundary into two halves.
///
/// The edges between the halves become seams. A half below `min_faces` is
/// flagged small: merging it back would close the surface again. Returns
/// the number of islands cut.
fn cut_closed_islands(
    labels: &mut [usize],
    adjacency: &Adjacency,
    seams: &mut [bool],
    min_faces: usize,
    small: &mut Vec<usize>,
) -> usize {
    let num_labels = labels.iter().map(|&l| l + 1).max().unwrap_or(0);
    let mut members: Vec<Vec<usize>> = vec![Vec::new(); num_labels];
    for (face, &label) in labels.iter().enumerate() {
        members[label].push(face);
    }

    let mut next_label = num_labels;
    for (label, faces) in members.iter().enumerate() {
        if faces.len() < 2 || !is_closed(faces, labels, label, adjacency) {
            continue;
        }
        let Some(half) = spanning_tree_half(faces, labels, label, adjacency) else {
            continue;
        };

        for &face in &half {
            labels[face] = next_label;
        }
        for &face in &half {
            for (neighbor, edge) in adjacency.face_neighbors(FaceId::new(face)) {
                if labels[neighbor.index()] == label {
                    seams[edge] = true;
                }
            }
        }

        if half.len() < min_faces {
            small.push(next_label);
        }
        if faces.len() - half.len() < min_faces && !small.contains(&label) {
            small.push(label);
        }
        next_label += 1;
    }

    next_label - num_labels
}

/// Whether no edge of the island is used by exactly one of its triangles.
fn is_closed(faces: &[usize], labels: &[usize], label: usize, adjacency: &Adjacency) -> bool {
    faces.iter().all(|&face| {
        adjacency.face_edges(FaceId::new(face)).iter().all(|&edge| {
            let inside = adjacency
                .edge_faces(edge)
                .iter()
                .filter(|f| labels[f.index()] == label)
                .count();
            inside != 1
        })
    })
}

/// The subtree cut off by the most balanced edge of the island's BFS tree.
///
/// `None` if the tree has no edge (nothing adjacent to the root).
fn spanning_tree_half(
    faces: &[usize],
    labels: &[usize],
    label: usize,
    adjacency: &Adjacency,
) -> Option<Vec<usize>> {
    const NONE: usize = usize::MAX;

    let root = *faces.first()?;
    let mut parent = vec![NONE; labels.len()];
    parent[root] = root;
    let mut order = vec![root];
    let mut head = 0;
    while head < order.len() {
        let face = order[head];
        head += 1;
        for (neighbor, _) in adjacency.face_neighbors(FaceId::new(face)) {
            let n = neighbor.index();
            if labels[n] == label && parent[n] == NONE {
                parent[n] = face;
                order.push(n);
            }
        }
    }

    let mut subtree = vec![1usize; labels.len()];
    for &face in order[1..].iter().rev() {
        subtree[parent[face]] += subtree[face];
    }

    // Ties go to the earliest face in BFS order.
    let total = order.len();
    let split = order[1..]
        .iter()
        .copied()
        .min_by_key(|&f| total.abs_diff(2 * subtree[f]))?;

    let mut inside = vec![false; labels.len()];
    inside[split] = true;
    for &face in &order[1..] {
        if inside[parent[face]] {
            inside[face] = true;
        }
    }
    Some(order.into_iter().filter(|&f| inside[f]).collect())
}

/// Renumber labels contiguously in order of each island's lowest triangle.
fn relabel(
    labels: &[usize],
    small: &[usize],
) -> (Vec<IslandId>, Vec<Vec<FaceId>>, Vec<IslandId>) {
    let num_labels = labels.iter().map(|&l| l + 1).max().unwrap_or(0);
    let mut remap = vec![usize::MAX; num_labels];
    let mut island_faces: Vec<Vec<FaceId>> = Vec::new();

    let face_islands = labels
        .iter()
        .enumerate()
        .map(|(face, &label)| {
            if remap[label] == usize::MAX {
                remap[label] = island_faces.len();
                island_faces.push(Vec::new());
            }
            let id = remap[label];
            island_faces[id].push(FaceId::new(face));
            IslandId::new(id)
        })
        .collect();

    let mut small_islands: Vec<IslandId> = small
        .iter()
        .filter(|&&l| remap[l] != usize::MAX)
        .map(|&l| IslandId::new(remap[l]))
        .collect();
    small_islands.sort_unstable();

    (face_islands, island_faces, small_islands)
}
