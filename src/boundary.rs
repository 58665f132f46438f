//! Boundary detection over a segmented image.
//!
//! A pixel is a boundary pixel iff one of its in-bounds 8-neighbors carries a
//! different segmented value. Neighbor lists depend only on the image shape, so
//! they are built once into a flat arena ([`NeighborTable`]) and reused for
//! every iteration (and every run, through [`NeighborCache`]).
use std::collections::HashMap;
use std::sync::Arc;

use ndarray::{Array2, ArrayView2};

use crate::error::{ensure_shape, invalid, Result};

/// CSR-style neighbor index lists for every pixel of a fixed shape.
///
/// Neighbors of the pixel with row-major index `i` are
/// `indices[offsets[i]..offsets[i + 1]]`.
#[derive(Debug, Clone)]
pub struct NeighborTable {
    shape: (usize, usize),
    offsets: Vec<usize>,
    indices: Vec<u32>,
}

impl NeighborTable {
    /// Fails when pixel indices of `shape` do not fit the `u32` arena.
    pub fn new(shape: (usize, usize)) -> Result<Self> {
        let (rows, cols) = shape;
        let n = rows
            .checked_mul(cols)
            .filter(|&n| n == 0 || u32::try_from(n - 1).is_ok())
            .ok_or_else(|| invalid(format!("image shape {shape:?} has too many pixels")))?;
        let mut offsets = Vec::with_capacity(n + 1);
        let mut indices = Vec::with_capacity(n * 8);
        offsets.push(0);
        for r in 0..rows {
            for c in 0..cols {
                for rr in r.saturating_sub(1)..=(r + 1).min(rows.saturating_sub(1)) {
                    for cc in c.saturating_sub(1)..=(c + 1).min(cols.saturating_sub(1)) {
                        if rr != r || cc != c {
                            // below n, which fits u32
                            indices.push((rr * cols + cc) as u32);
                        }
                    }
                }
                offsets.push(indices.len());
            }
        }
        Ok(Self {
            shape,
            offsets,
            indices,
        })
    }

    #[inline]
    pub fn neighbors(&self, pixel: usize) -> &[u32] {
        &self.indices[self.offsets[pixel]..self.offsets[pixel + 1]]
    }

    /// Boundary mask of `segmented`, which must match the table's shape.
    pub fn boundary_mask(&self, segmented: ArrayView2<'_, f32>) -> Result<Array2<bool>> {
        ensure_shape("segmented image", segmented.dim(), self.shape)?;
        let cols = self.shape.1;
        let flat: Vec<f32> = segmented.iter().copied().collect();
        Ok(Array2::from_shape_fn(self.shape, |(r, c)| {
            let i = r * cols + c;
            let v = flat[i];
            self.neighbors(i).iter().any(|&j| flat[j as usize] != v)
        }))
    }
}

/// Neighbor tables keyed by image shape. Pure memoization.
#[derive(Debug, Default)]
pub struct NeighborCache {
    tables: HashMap<(usize, usize), Arc<NeighborTable>>,
}

impl NeighborCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&mut self, shape: (usize, usize)) -> Result<Arc<NeighborTable>> {
        if let Some(table) = self.tables.get(&shape) {
            return Ok(Arc::clone(table));
        }
        log::debug!("building neighbor table for shape {:?}", shape);
        let table = Arc::new(NeighborTable::new(shape)?);
        self.tables.insert(shape, Arc::clone(&table));
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// One-shot convenience that builds a throwaway table.
pub fn boundary_mask(segmented: ArrayView2<'_, f32>) -> Result<Array2<bool>> {
    NeighborTable::new(segmented.dim())?.boundary_mask(segmented)
}
