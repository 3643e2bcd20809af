use serde::{Deserialize, Serialize};

use super::GridStorage;

///
/// Every cell stored contiguously: `values[index]` and
/// `derivatives[index*dimension..(index+1)*dimension]`.
///
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DenseStorage
{
    pub(crate) values: Vec<f64>,
    pub(crate) derivatives: Vec<f64>,
    pub(crate) dimension: usize,
}

impl DenseStorage
{
    #[inline]
    pub fn values(&self) -> &[f64]
    {
        &self.values
    }

    #[inline]
    pub fn derivatives(&self) -> &[f64]
    {
        &self.derivatives
    }

    #[inline]
    fn has_derivatives(&self) -> bool
    {
        !self.derivatives.is_empty()
    }

    #[inline]
    fn derivative_range(&self, index: usize) -> std::ops::Range<usize>
    {
        index * self.dimension..(index + 1) * self.dimension
    }
}

impl GridStorage for DenseStorage
{
    fn with_capacity(max_size: usize, dimension: usize, derivatives: bool) -> Self
    {
        let derivatives = if derivatives
        {
            vec![0.0; max_size * dimension]
        }
        else
        {
            Vec::new()
        };
        Self { values: vec![0.0; max_size], derivatives, dimension }
    }

    #[inline]
    fn len(&self) -> usize
    {
        self.values.len()
    }

    #[inline]
    fn value(&self, index: usize) -> f64
    {
        self.values[index]
    }

    #[inline]
    fn derivatives_into(&self, index: usize, out: &mut [f64])
    {
        if self.has_derivatives()
        {
            out.copy_from_slice(&self.derivatives[self.derivative_range(index)]);
        }
        else
        {
            out.fill(0.0);
        }
    }

    #[inline]
    fn set_value(&mut self, index: usize, value: f64)
    {
        self.values[index] = value;
    }

    #[inline]
    fn set_derivatives(&mut self, index: usize, derivatives: &[f64])
    {
        let range = self.derivative_range(index);
        self.derivatives[range].copy_from_slice(derivatives);
    }

    #[inline]
    fn add_value(&mut self, index: usize, value: f64)
    {
        self.values[index] += value;
    }

    #[inline]
    fn add_derivatives(&mut self, index: usize, derivatives: &[f64])
    {
        let range = self.derivative_range(index);
        for (d, &v) in self.derivatives[range].iter_mut().zip(derivatives)
        {
            *d += v;
        }
    }

    fn clear(&mut self)
    {
        self.values.fill(0.0);
        self.derivatives.fill(0.0);
    }

    fn fits(&self, max_size: usize, dimension: usize, derivatives: bool) -> bool
    {
        let expected = if derivatives { max_size.checked_mul(dimension) } else { Some(0) };
        self.dimension == dimension && self.values.len() == max_size && expected == Some(self.derivatives.len())
    }

    fn populated(&self) -> Vec<usize>
    {
        (0..self.values.len()).collect()
    }

    fn for_each_cell_mut(&mut self, f: &mut dyn FnMut(usize, &mut f64, &mut [f64]))
    {
        if self.has_derivatives()
        {
            for (i, (value, derivatives)) in self.values.iter_mut().zip(self.derivatives.chunks_exact_mut(self.dimension)).enumerate()
            {
                f(i, value, derivatives);
            }
        }
        else
        {
            for (i, value) in self.values.iter_mut().enumerate()
            {
                f(i, value, &mut []);
            }
        }
    }

    fn flat_buffers_mut(&mut self) -> Option<(&mut [f64], &mut [f64])>
    {
        Some((&mut self.values, &mut self.derivatives))
    }
}

#[test]
fn check_dense_accumulation()
{
    let mut storage = DenseStorage::with_capacity(10, 2, true);
    storage.add_value(3, 1.5);
    storage.add_value(3, 2.0);
    storage.add_derivatives(3, &[1.0, -1.0]);
    storage.add_derivatives(3, &[0.5, 0.5]);
    assert_eq!(storage.value(3), 3.5);
    let mut der = [0.0; 2];
    storage.derivatives_into(3, &mut der);
    assert_eq!(der, [1.5, -0.5]);
    assert_eq!(storage.len(), 10);
    storage.clear();
    assert_eq!(storage.value(3), 0.0);
    assert!(storage.fits(10, 2, true));
    assert!(!storage.fits(10, 2, false));
    assert!(!storage.fits(11, 2, true));
}
