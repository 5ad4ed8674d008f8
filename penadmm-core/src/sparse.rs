extern crate nalgebra as na;

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A sparse coefficient vector with strictly increasing indices.
///
/// Only explicitly stored entries are nonzero. The auxiliary ADMM iterate
/// is kept in this form so that the restart and dual-residual tests cost
/// O(nnz) instead of O(p).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    dim: usize,
    indices: Vec<usize>,
    values: Vec<f64>,
}

impl SparseVector {
    /// An all-zero vector of length `dim`.
    pub fn zeros(dim: usize) -> Self {
        SparseVector {
            dim,
            indices: Vec::new(),
            values: Vec::new(),
        }
    }

    /// An empty vector of length `dim` with room for `nnz` entries.
    pub fn with_capacity(dim: usize, nnz: usize) -> Self {
        SparseVector {
            dim,
            indices: Vec::with_capacity(nnz),
            values: Vec::with_capacity(nnz),
        }
    }

    /// Keeps every entry of `v` that is not exactly zero.
    pub fn from_dense(v: &na::DVector<f64>) -> Self {
        let mut out = SparseVector::zeros(v.len());
        for (i, &val) in v.iter().enumerate() {
            if val != 0.0 {
                out.indices.push(i);
                out.values.push(val);
            }
        }
        out
    }

    /// Appends an entry. Indices must be pushed in increasing order.
    pub fn push(&mut self, index: usize, value: f64) {
        debug_assert!(index < self.dim);
        debug_assert!(self.indices.last().is_none_or(|&last| last < index));
        self.indices.push(index);
        self.values.push(value);
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    pub fn get(&self, index: usize) -> f64 {
        match self.indices.binary_search(&index) {
            Ok(pos) => self.values[pos],
            Err(_) => 0.0,
        }
    }

    pub fn clear(&mut self) {
        self.indices.clear();
        self.values.clear();
    }

    pub fn norm_squared(&self) -> f64 {
        self.values.iter().map(|v| v * v).sum()
    }

    pub fn norm(&self) -> f64 {
        self.norm_squared().sqrt()
    }

    pub fn to_dense(&self) -> na::DVector<f64> {
        let mut out = na::DVector::zeros(self.dim);
        for (i, v) in self.iter() {
            out[i] = v;
        }
        out
    }

    /// `dest += scale * self`, touching only the stored entries.
    pub fn add_scaled_to(&self, dest: &mut na::DVector<f64>, scale: f64) {
        for (i, v) in self.iter() {
            dest[i] += scale * v;
        }
    }

    pub fn dot_dense(&self, v: &na::DVector<f64>) -> f64 {
        self.iter().map(|(i, x)| x * v[i]).sum()
    }

    /// Computes `z + ratio * (z - z_old)` on the union of both supports in
    /// a single merge pass.
    pub fn extrapolate(z: &SparseVector, z_old: &SparseVector, ratio: f64) -> SparseVector {
        let mut out = SparseVector::with_capacity(z.dim, z.nnz().max(z_old.nnz()));
        merge(z, z_old, |i, a, b| {
            let v = a + ratio * (a - b);
            if v != 0.0 {
                out.push(i, v);
            }
        });
        out
    }
}

/// Visits the union of both supports in index order, calling
/// `f(index, v1[index], v2[index])`.
fn merge<F: FnMut(usize, f64, f64)>(v1: &SparseVector, v2: &SparseVector, mut f: F) {
    let (ind1, val1) = (&v1.indices, &v1.values);
    let (ind2, val2) = (&v2.indices, &v2.values);
    let (mut i1, mut i2) = (0, 0);

    while i1 < ind1.len() && i2 < ind2.len() {
        match ind1[i1].cmp(&ind2[i2]) {
            Ordering::Equal => {
                f(ind1[i1], val1[i1], val2[i2]);
                i1 += 1;
                i2 += 1;
            }
            Ordering::Less => {
                f(ind1[i1], val1[i1], 0.0);
                i1 += 1;
            }
            Ordering::Greater => {
                f(ind2[i2], 0.0, val2[i2]);
                i2 += 1;
            }
        }
    }
    for k in i1..ind1.len() {
        f(ind1[k], val1[k], 0.0);
    }
    for k in i2..ind2.len() {
        f(ind2[k], 0.0, val2[k]);
    }
}

/// Calculates `||v1 - v2||^2` in O(nnz1 + nnz2).
pub fn diff_squared_norm(v1: &SparseVector, v2: &SparseVector) -> f64 {
    debug_assert_eq!(v1.dim, v2.dim);
    let mut r = 0.0;
    merge(v1, v2, |_, a, b| {
        let d = a - b;
        r += d * d;
    });
    r
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn sparse_entries(len: usize) -> impl Strategy<Value = Vec<f64>> {
        prop::collection::vec(
            prop_oneof![3 => Just(0.0), 2 => -10.0f64..10.0],
            len,
        )
    }

    #[test]
    fn empty_supports() {
        let a = SparseVector::zeros(5);
        let b = SparseVector::zeros(5);
        assert_eq!(diff_squared_norm(&a, &b), 0.0);
    }

    #[test]
    fn disjoint_supports_add_squares() {
        let mut a = SparseVector::zeros(6);
        a.push(1, 3.0);
        let mut b = SparseVector::zeros(6);
        b.push(4, -4.0);
        assert_relative_eq!(diff_squared_norm(&a, &b), 25.0);
    }

    #[test]
    fn extrapolate_on_union_support() {
        let mut z = SparseVector::zeros(4);
        z.push(0, 1.0);
        z.push(2, 2.0);
        let mut z_old = SparseVector::zeros(4);
        z_old.push(2, 1.0);
        z_old.push(3, 1.0);

        let adj = SparseVector::extrapolate(&z, &z_old, 0.5);
        // z + 0.5 (z - z_old) = [1.5, 0, 2.5, -0.5]
        assert_eq!(adj.indices(), &[0, 2, 3]);
        assert_relative_eq!(adj.get(0), 1.5);
        assert_relative_eq!(adj.get(2), 2.5);
        assert_relative_eq!(adj.get(3), -0.5);
        assert_eq!(adj.get(1), 0.0);
    }

    #[test]
    fn extrapolate_with_zero_ratio_is_identity() {
        let z = SparseVector::from_dense(&na::DVector::from_vec(vec![0.0, 1.0, 0.0, -2.0]));
        let z_old = SparseVector::from_dense(&na::DVector::from_vec(vec![5.0, 0.0, 0.0, 0.0]));
        assert_eq!(SparseVector::extrapolate(&z, &z_old, 0.0), z);
    }

    proptest! {
        #[test]
        fn diff_squared_norm_matches_dense(a in sparse_entries(24), b in sparse_entries(24)) {
            let da = na::DVector::from_vec(a);
            let db = na::DVector::from_vec(b);
            let sa = SparseVector::from_dense(&da);
            let sb = SparseVector::from_dense(&db);

            let expected = (&da - &db).norm_squared();
            prop_assert!((diff_squared_norm(&sa, &sb) - expected).abs() <= 1e-9 * (1.0 + expected));
            prop_assert_eq!(sa.to_dense(), da);
        }

        #[test]
        fn extrapolate_matches_dense(a in sparse_entries(16), b in sparse_entries(16), ratio in 0.0f64..1.0) {
            let da = na::DVector::from_vec(a);
            let db = na::DVector::from_vec(b);
            let adj = SparseVector::extrapolate(
                &SparseVector::from_dense(&da),
                &SparseVector::from_dense(&db),
                ratio,
            );
            let expected = &da + (&da - &db) * ratio;
            prop_assert!((adj.to_dense() - expected).amax() <= 1e-12);
        }
    }
}
