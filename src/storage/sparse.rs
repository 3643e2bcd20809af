use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use super::GridStorage;

///
/// Only cells that have been written are stored; every other cell reads as zero.
/// Derivatives live in a second map so that value-only writes stay cheap.
///
#[serde_as]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseStorage
{
    #[serde_as(as = "Vec<(_, _)>")]
    pub(crate) values: FxHashMap<usize, f64>,
    #[serde_as(as = "Vec<(_, _)>")]
    pub(crate) derivatives: FxHashMap<usize, Vec<f64>>,
    pub(crate) dimension: usize,
    pub(crate) use_derivatives: bool,
}

impl GridStorage for SparseStorage
{
    fn with_capacity(_max_size: usize, dimension: usize, derivatives: bool) -> Self
    {
        Self { values: FxHashMap::default(), derivatives: FxHashMap::default(), dimension, use_derivatives: derivatives }
    }

    #[inline]
    fn len(&self) -> usize
    {
        self.values.len()
    }

    #[inline]
    fn value(&self, index: usize) -> f64
    {
        self.values.get(&index).copied().unwrap_or(0.0)
    }

    #[inline]
    fn derivatives_into(&self, index: usize, out: &mut [f64])
    {
        match self.derivatives.get(&index)
        {
            Some(derivatives) => out.copy_from_slice(derivatives),
            None => out.fill(0.0),
        }
    }

    #[inline]
    fn set_value(&mut self, index: usize, value: f64)
    {
        self.values.insert(index, value);
    }

    fn set_derivatives(&mut self, index: usize, derivatives: &[f64])
    {
        self.values.entry(index).or_insert(0.0);
        match self.derivatives.get_mut(&index)
        {
            Some(stored) => stored.copy_from_slice(derivatives),
            None =>
            {
                self.derivatives.insert(index, derivatives.to_vec());
            }
        }
    }

    #[inline]
    fn add_value(&mut self, index: usize, value: f64)
    {
        *self.values.entry(index).or_insert(0.0) += value;
    }

    fn add_derivatives(&mut self, index: usize, derivatives: &[f64])
    {
        self.values.entry(index).or_insert(0.0);
        let dimension = self.dimension;
        let stored = self.derivatives.entry(index).or_insert_with(|| vec![0.0; dimension]);
        for (d, &v) in stored.iter_mut().zip(derivatives)
        {
            *d += v;
        }
    }

    fn clear(&mut self)
    {
        self.values.clear();
        self.derivatives.clear();
    }

    fn fits(&self, max_size: usize, dimension: usize, derivatives: bool) -> bool
    {
        self.dimension == dimension
            && self.use_derivatives == derivatives
            && (derivatives || self.derivatives.is_empty())
            && self.values.keys().all(|&index| index < max_size)
            && self.derivatives.iter().all(|(&index, stored)| self.values.contains_key(&index) && stored.len() == dimension)
    }

    fn populated(&self) -> Vec<usize>
    {
        let mut indices: Vec<usize> = self.values.keys().copied().collect();
        indices.sort_unstable();
        indices
    }

    fn for_each_cell_mut(&mut self, f: &mut dyn FnMut(usize, &mut f64, &mut [f64]))
    {
        let dimension = self.dimension;
        for (&index, value) in self.values.iter_mut()
        {
            if self.use_derivatives
            {
                let derivatives = self.derivatives.entry(index).or_insert_with(|| vec![0.0; dimension]);
                f(index, value, derivatives);
            }
            else
            {
                f(index, value, &mut []);
            }
        }
    }
}

#[test]
fn check_sparse_reads_zero_when_absent()
{
    let mut storage = SparseStorage::with_capacity(1000, 3, true);
    assert_eq!(storage.value(17), 0.0);
    let mut der = [1.0; 3];
    storage.derivatives_into(17, &mut der);
    assert_eq!(der, [0.0; 3]);
    storage.add_value(17, 2.0);
    storage.add_value(17, 0.5);
    storage.add_derivatives(17, &[1.0, 2.0, 3.0]);
    storage.add_derivatives(4, &[1.0, 0.0, 0.0]);
    assert_eq!(storage.value(17), 2.5);
    assert_eq!(storage.len(), 2);
    assert_eq!(storage.populated(), vec![4, 17]);
    storage.derivatives_into(17, &mut der);
    assert_eq!(der, [1.0, 2.0, 3.0]);
    assert!(storage.fits(1000, 3, true));
    assert!(!storage.fits(17, 3, true));
    assert!(!storage.fits(1000, 2, true));
}
