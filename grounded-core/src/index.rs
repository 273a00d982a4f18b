//! Exact nearest-neighbour search over passage embeddings.
//!
//! The [`VectorIndex`] keeps every embedding in one row-major `f32` matrix and
//! answers queries with an exhaustive scan. There is no approximate structure:
//! a query against the same index always yields the same neighbours, in the
//! same order, with the same distances.
//!
//! # Ordering
//!
//! Results are sorted by ascending squared Euclidean distance. Equal distances
//! are broken by ascending row position, so the lowest chunk id wins.

use std::cmp::Ordering;
use thiserror::Error;

/// Errors raised by index construction, loading and search.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IndexError {
    /// The index holds no vectors.
    #[error("Index is empty")]
    EmptyIndex,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A vector does not match the dimension the index was built with.
    #[error("Dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The persisted artifacts are inconsistent with each other.
    #[error("Corrupt index: {0}")]
    CorruptIndex(String),
}

/// Result type for index operations.
pub type Result<T> = std::result::Result<T, IndexError>;

/// A stored row matched by a search, with its distance to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f32,
}

/// An immutable matrix of `len() × dimension()` embeddings.
///
/// Rows are positional: row `i` is the embedding of chunk `i` in the
/// corresponding chunk store. The index is never mutated after it is built;
/// replacing it means building a new one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl VectorIndex {
    /// Builds an index from embeddings in chunk order.
    ///
    /// All embeddings must share one non-zero dimension. An empty batch
    /// produces an empty index, which fails every search with
    /// [`IndexError::EmptyIndex`].
    pub fn build(embeddings: Vec<Vec<f32>>) -> Result<Self> {
        let Some(first) = embeddings.first() else {
            return Ok(Self::default());
        };

        let dimension = first.len();
        if dimension == 0 {
            return Err(IndexError::InvalidArgument(
                "embeddings must have at least one dimension".to_string(),
            ));
        }

        let mut data = Vec::with_capacity(dimension * embeddings.len());
        for embedding in &embeddings {
            if embedding.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: dimension,
                    actual: embedding.len(),
                });
            }
            data.extend_from_slice(embedding);
        }

        Ok(Self { dimension, data })
    }

    /// Restores an index from a little-endian, row-major `f32` blob.
    pub fn from_bytes(dimension: usize, bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Ok(Self {
                dimension,
                data: Vec::new(),
            });
        }
        if dimension == 0 {
            return Err(IndexError::CorruptIndex(
                "non-empty vector blob declares dimension 0".to_string(),
            ));
        }

        let row_bytes = dimension
            .checked_mul(std::mem::size_of::<f32>())
            .ok_or_else(|| {
                IndexError::CorruptIndex(format!("declared dimension {dimension} is too large"))
            })?;
        if bytes.len() % row_bytes != 0 {
            return Err(IndexError::CorruptIndex(format!(
                "vector blob of {} bytes is not a whole number of {}-dimensional rows",
                bytes.len(),
                dimension
            )));
        }

        let data = bytes
            .chunks_exact(std::mem::size_of::<f32>())
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        Ok(Self { dimension, data })
    }

    /// Serializes the matrix as a little-endian, row-major `f32` blob.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.data.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dimension shared by every stored vector (0 for an empty index).
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Returns the embedding stored at `position`.
    pub fn row(&self, position: usize) -> Option<&[f32]> {
        if position >= self.len() {
            return None;
        }
        let start = position * self.dimension;
        Some(&self.data[start..start + self.dimension])
    }

    /// Finds the `k` stored vectors closest to `query`.
    ///
    /// Performs a linear scan over every row, computing the squared Euclidean
    /// distance to the query, and returns `min(k, len())` neighbours sorted by
    /// ascending distance (ties by ascending position).
    ///
    /// # Errors
    ///
    /// - [`IndexError::InvalidArgument`] if `k` is zero
    /// - [`IndexError::EmptyIndex`] if the index holds no vectors
    /// - [`IndexError::DimensionMismatch`] if `query` has the wrong length
    ///
    /// # Performance
    ///
    /// O(n * d) distance computations plus an O(n) selection of the top `k`.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if k == 0 {
            return Err(IndexError::InvalidArgument(
                "k must be greater than zero".to_string(),
            ));
        }
        if self.is_empty() {
            return Err(IndexError::EmptyIndex);
        }
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut neighbors: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, row)| Neighbor {
                position,
                distance: squared_l2(query, row),
            })
            .collect();

        if k < neighbors.len() {
            neighbors.select_nth_unstable_by(k - 1, compare_neighbors);
            neighbors.truncate(k);
        }
        neighbors.sort_by(compare_neighbors);

        Ok(neighbors)
    }
}

fn compare_neighbors(a: &Neighbor, b: &Neighbor) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.position.cmp(&b.position))
}

/// Squared Euclidean distance. Callers guarantee equal lengths.
fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
