//! Impact-latency matrix used for lookahead-based safe dequeue.
//!
//! `get(i, j)` is a lower bound on how long an action at entity `i` takes to
//! possibly affect entity `j`. Pairs that cannot affect each other within the
//! horizon hold [`UNREACHABLE`].

use kairos_types::NodeId;
use serde::{Deserialize, Serialize};

use crate::SchedError;

/// Latency sentinel for entity pairs that never affect each other.
pub const UNREACHABLE: u64 = u64::MAX;

/// Square matrix of pairwise impact latencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ImpactMatrix {
    size: usize,
    cells: Vec<u64>,
}

impl ImpactMatrix {
    /// Creates a matrix where every pair has the same latency.
    pub fn uniform(size: usize, latency: u64) -> Self {
        let mut cells = vec![latency; size * size];
        for i in 0..size {
            cells[i * size + i] = 0;
        }
        Self { size, cells }
    }

    /// Builds a matrix from explicit rows.
    ///
    /// Returns an error unless every row has exactly `rows.len()` entries.
    pub fn from_rows(rows: Vec<Vec<u64>>) -> Result<Self, SchedError> {
        let size = rows.len();
        let mut cells = Vec::with_capacity(size * size);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != size {
                return Err(SchedError::InvalidConfig(format!(
                    "impact latency row {i} has {} entries, expected {size}",
                    row.len()
                )));
            }
            cells.extend(row);
        }
        Ok(Self { size, cells })
    }

    /// Derives the matrix from point-to-point links by taking shortest path
    /// delays. Unconnected pairs stay [`UNREACHABLE`].
    ///
    /// The result is triangle-consistent by construction.
    pub fn from_links(size: usize, links: &[(NodeId, NodeId, u64)]) -> Self {
        let mut matrix = Self {
            size,
            cells: vec![UNREACHABLE; size * size],
        };
        for i in 0..size {
            matrix.cells[i * size + i] = 0;
        }
        for &(a, b, delay) in links {
            let (a, b) = (a.index(), b.index());
            assert!(
                a < size && b < size,
                "link {a}-{b} references an entity outside 0..{size}"
            );
            let cell = &mut matrix.cells[a * size + b];
            *cell = (*cell).min(delay);
            let cell = &mut matrix.cells[b * size + a];
            *cell = (*cell).min(delay);
        }

        // Floyd-Warshall
        for k in 0..size {
            for i in 0..size {
                let ik = matrix.cells[i * size + k];
                if ik == UNREACHABLE {
                    continue;
                }
                for j in 0..size {
                    let via = ik.saturating_add(matrix.cells[k * size + j]);
                    if via < matrix.cells[i * size + j] {
                        matrix.cells[i * size + j] = via;
                    }
                }
            }
        }
        matrix
    }

    /// Number of entities covered by the matrix.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Latency from entity `from` to entity `to`.
    pub fn get(&self, from: usize, to: usize) -> u64 {
        self.cells[from * self.size + to]
    }

    /// Overrides one directed latency.
    pub fn set(&mut self, from: usize, to: usize, latency: u64) {
        self.cells[from * self.size + to] = latency;
    }

    /// Returns the matrix as nested rows.
    pub fn rows(&self) -> Vec<Vec<u64>> {
        self.cells.chunks(self.size.max(1)).map(<[u64]>::to_vec).collect()
    }

    /// Checks `L[i][k] <= L[i][j] + L[j][k]` for every triple.
    ///
    /// Lookahead selection assumes this holds; a violation means some
    /// indirect path propagates faster than the direct bound claims.
    pub fn is_triangle_consistent(&self) -> bool {
        let n = self.size;
        (0..n).all(|i| {
            (0..n).all(|j| {
                (0..n).all(|k| self.get(i, k) <= self.get(i, j).saturating_add(self.get(j, k)))
            })
        })
    }
}
