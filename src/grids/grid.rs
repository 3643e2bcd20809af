use serde::{Deserialize, Serialize};

use crate::algorithms::contour::find_points_on_contour;
use crate::algorithms::integration::{integrate, integrate_resampled};
use crate::algorithms::interpolation::{cell_lookup, interpolate, MAX_SPLINE_DIMENSION};
use crate::algorithms::kernel::{deposit, Kernel};
use crate::algorithms::path_search::maximal_path_minimum;
use crate::algorithms::projection::{project, ProjectionWeight};
use crate::algorithms::reduction::{all_reduce, Communicator};
use crate::errors::GridError;
use crate::storage::dense::DenseStorage;
use crate::storage::geometry::{CellLocator, GridGeometry};
use crate::storage::sparse::SparseStorage;
use crate::storage::GridStorage;

use super::options::{GridOptions, OutputFormat};

///
/// A scalar field sampled on a regular, possibly periodic lattice, optionally with
/// one partial derivative per axis in every cell. The storage backend decides whether
/// every cell is held in memory ([`DenseGrid`]) or only those ever written ([`SparseGrid`]).
///
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Grid<S: GridStorage>
{
    pub(crate) function_name: String,
    pub(crate) geometry: GridGeometry,
    pub(crate) storage: S,
    pub(crate) spline: bool,
    pub(crate) derivatives: bool,
    pub(crate) format: OutputFormat,
}

pub type DenseGrid = Grid<DenseStorage>;
pub type SparseGrid = Grid<SparseStorage>;

impl<S: GridStorage> Grid<S>
{
    pub fn new(options: &GridOptions) -> Result<Self, GridError>
    {
        let geometry = options.geometry()?;
        Self::from_geometry(&options.function_name, geometry, options.spline, options.derivatives)
    }

    ///
    /// Build an empty grid over an existing geometry.
    ///
    pub fn from_geometry(function_name: &str, geometry: GridGeometry, spline: bool, derivatives: bool) -> Result<Self, GridError>
    {
        if spline && geometry.dimension() > MAX_SPLINE_DIMENSION
        {
            log::warn!("spline interpolation requested on {} axes (limit {MAX_SPLINE_DIMENSION})", geometry.dimension());
            return Err(GridError::InvalidGeometry);
        }
        let storage = S::with_capacity(geometry.size(), geometry.dimension(), derivatives);
        log::debug!("created grid {function_name} with {} lattice points in {} dimensions", geometry.size(), geometry.dimension());
        Ok(Self { function_name: function_name.to_owned(), geometry, storage, spline, derivatives, format: OutputFormat::default() })
    }

    /// Re-create the grid from `options`, discarding all content.
    pub fn init(&mut self, options: &GridOptions) -> Result<(), GridError>
    {
        let format = self.format;
        *self = Self::new(options)?;
        self.format = format;
        Ok(())
    }

    #[inline]
    pub fn geometry(&self) -> &GridGeometry
    {
        &self.geometry
    }

    #[inline]
    pub fn storage(&self) -> &S
    {
        &self.storage
    }

    #[inline]
    pub fn function_name(&self) -> &str
    {
        &self.function_name
    }

    pub fn arg_names(&self) -> Vec<&str>
    {
        self.geometry.axes().iter().map(|axis| axis.name()).collect()
    }

    /// Lower bounds as given at construction.
    pub fn min(&self) -> Vec<String>
    {
        self.geometry.axes().iter().map(|axis| axis.str_min().to_owned()).collect()
    }

    /// Upper bounds as given at construction.
    pub fn max(&self) -> Vec<String>
    {
        self.geometry.axes().iter().map(|axis| axis.str_max().to_owned()).collect()
    }

    pub fn dx(&self) -> Vec<f64>
    {
        self.geometry.dx()
    }

    pub fn bin_volume(&self) -> f64
    {
        self.geometry.bin_volume()
    }

    /// Configured number of bins per axis.
    pub fn nbin(&self) -> Vec<usize>
    {
        self.geometry.axes().iter().map(|axis| axis.nbin()).collect()
    }

    pub fn is_periodic(&self) -> Vec<bool>
    {
        self.geometry.axes().iter().map(|axis| axis.is_periodic()).collect()
    }

    #[inline]
    pub fn dimension(&self) -> usize
    {
        self.geometry.dimension()
    }

    #[inline]
    pub fn has_derivatives(&self) -> bool
    {
        self.derivatives
    }

    #[inline]
    pub fn uses_spline(&self) -> bool
    {
        self.spline
    }

    /// Number of stored cells. Equal to [`Self::max_size`] for dense grids.
    #[inline]
    pub fn len(&self) -> usize
    {
        self.storage.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool
    {
        self.storage.is_empty()
    }

    /// Number of lattice points.
    #[inline]
    pub fn max_size(&self) -> usize
    {
        self.geometry.size()
    }

    #[inline]
    pub fn output_format(&self) -> OutputFormat
    {
        self.format
    }

    pub fn set_output_format(&mut self, format: OutputFormat)
    {
        self.format = format;
    }

    pub fn reset_output_format(&mut self)
    {
        self.format = OutputFormat::default();
    }

    #[inline]
    fn check_derivatives(&self, derivatives: &[f64]) -> Result<(), GridError>
    {
        if !self.derivatives
        {
            return Err(GridError::NoDerivatives);
        }
        if derivatives.len() != self.dimension()
        {
            return Err(GridError::DerivativeSizeMismatch);
        }
        Ok(())
    }

    pub fn value<L: CellLocator>(&self, at: L) -> Result<f64, GridError>
    {
        let index = at.flat_index(&self.geometry)?;
        Ok(self.storage.value(index))
    }

    /// Stored value and a copy of the stored derivatives of one cell.
    pub fn value_and_derivatives<L: CellLocator>(&self, at: L) -> Result<(f64, Vec<f64>), GridError>
    {
        if !self.derivatives
        {
            return Err(GridError::NoDerivatives);
        }
        let index = at.flat_index(&self.geometry)?;
        let mut derivatives = vec![0.0; self.dimension()];
        self.storage.derivatives_into(index, &mut derivatives);
        Ok((self.storage.value(index), derivatives))
    }

    pub fn set_value<L: CellLocator>(&mut self, at: L, value: f64) -> Result<(), GridError>
    {
        let index = at.flat_index(&self.geometry)?;
        self.storage.set_value(index, value);
        Ok(())
    }

    pub fn set_value_and_derivatives<L: CellLocator>(&mut self, at: L, value: f64, derivatives: &[f64]) -> Result<(), GridError>
    {
        self.check_derivatives(derivatives)?;
        let index = at.flat_index(&self.geometry)?;
        self.storage.set_value(index, value);
        self.storage.set_derivatives(index, derivatives);
        Ok(())
    }

    pub fn add_value<L: CellLocator>(&mut self, at: L, value: f64) -> Result<(), GridError>
    {
        let index = at.flat_index(&self.geometry)?;
        self.storage.add_value(index, value);
        Ok(())
    }

    pub fn add_value_and_derivatives<L: CellLocator>(&mut self, at: L, value: f64, derivatives: &[f64]) -> Result<(), GridError>
    {
        self.check_derivatives(derivatives)?;
        let index = at.flat_index(&self.geometry)?;
        self.storage.add_value(index, value);
        self.storage.add_derivatives(index, derivatives);
        Ok(())
    }

    /// Reset every cell to zero (sparse grids drop all cells).
    pub fn clear(&mut self)
    {
        self.storage.clear();
    }

    ///
    /// Value of the field at an arbitrary point: multilinear interpolation when
    /// spline is enabled, the containing cell's value otherwise.
    ///
    pub fn evaluate(&self, x: &[f64]) -> Result<f64, GridError>
    {
        if self.spline
        {
            interpolate(&self.geometry, &self.storage, x, None)
        }
        else
        {
            cell_lookup(&self.geometry, &self.storage, x, None)
        }
    }

    ///
    /// Value and gradient at `x`. With spline enabled the gradient is that of the
    /// interpolant; otherwise the containing cell's stored derivatives are returned.
    ///
    pub fn evaluate_with_derivatives(&self, x: &[f64]) -> Result<(f64, Vec<f64>), GridError>
    {
        let mut derivatives = vec![0.0; self.dimension()];
        let value = if self.spline
        {
            interpolate(&self.geometry, &self.storage, x, Some(&mut derivatives[..]))?
        }
        else if self.derivatives
        {
            cell_lookup(&self.geometry, &self.storage, x, Some(&mut derivatives[..]))?
        }
        else
        {
            return Err(GridError::NoDerivatives);
        };
        Ok((value, derivatives))
    }

    /// Evaluate many points. Each point succeeds or fails on its own.
    #[cfg(not(feature = "rayon"))]
    pub fn evaluate_batch(&self, x: &[Vec<f64>]) -> Vec<Result<f64, GridError>>
    {
        x.iter().map(|point| self.evaluate(point)).collect()
    }

    /// Evaluate many points in parallel. Each point succeeds or fails on its own.
    #[cfg(feature = "rayon")]
    pub fn evaluate_batch(&self, x: &[Vec<f64>]) -> Vec<Result<f64, GridError>> where S: Sync
    {
        use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
        x.par_iter().map(|point| self.evaluate(point)).collect()
    }

    /// Signed distance `f(x) - target` and its gradient.
    pub fn difference_from_contour(&self, x: &[f64], target: f64) -> Result<(f64, Vec<f64>), GridError>
    {
        let (value, derivatives) = self.evaluate_with_derivatives(x)?;
        Ok((value - target, derivatives))
    }

    ///
    /// Points where the field crosses `target`, found along lattice edges. Axes flagged in
    /// `excluded_axes` are not searched along. At most `max_points` points are returned.
    ///
    pub fn find_points_on_contour(&self, target: f64, excluded_axes: &[bool], max_points: usize) -> Result<Vec<Vec<f64>>, GridError>
    {
        find_points_on_contour(self, target, excluded_axes, max_points)
    }

    ///
    /// Deposit a kernel into every cell of its support window.
    ///
    pub fn add_kernel<K: Kernel + ?Sized>(&mut self, kernel: &K) -> Result<(), GridError>
    {
        deposit(&self.geometry, &mut self.storage, kernel, self.derivatives)
    }

    /// Sum of all cell values times the volume of one cell.
    pub fn integrate(&self) -> f64
    {
        integrate(&self.geometry, &self.storage)
    }

    ///
    /// Integral of the evaluated field on a resampled lattice with `npoints[k]`
    /// intervals along axis `k`.
    ///
    pub fn integrate_resampled(&self, npoints: &[usize]) -> Result<f64, GridError>
    {
        integrate_resampled(self, npoints)
    }

    ///
    /// Largest value `m` such that a lattice path from `source` to `sink` exists whose
    /// cells all hold at least `m`.
    ///
    pub fn find_maximal_path_minimum<A: CellLocator, B: CellLocator>(&self, source: A, sink: B) -> Result<f64, GridError>
    {
        self.find_maximal_path_minimum_excluding(source, sink, |_| false)
    }

    /// As [`Self::find_maximal_path_minimum`], never visiting cells for which `excluded` holds.
    pub fn find_maximal_path_minimum_excluding<A: CellLocator, B: CellLocator, F: Fn(usize) -> bool>(&self, source: A, sink: B, excluded: F) -> Result<f64, GridError>
    {
        let source = source.flat_index(&self.geometry)?;
        let sink = sink.flat_index(&self.geometry)?;
        maximal_path_minimum(&self.geometry, &self.storage, source, sink, excluded)
    }

    ///
    /// Marginalize every axis not named in `keep`. Output axes follow the order of `keep`.
    ///
    pub fn project<W: ProjectionWeight + ?Sized>(&self, keep: &[&str], weight: &W) -> Result<DenseGrid, GridError>
    {
        project(self, keep, weight)
    }

    ///
    /// Element-wise sum of values and derivatives over every worker of `comm`.
    /// Only storage with contiguous buffers can take part.
    ///
    pub fn reduce_across_workers<C: Communicator + ?Sized>(&mut self, comm: &C) -> Result<(), GridError>
    {
        all_reduce(&mut self.storage, comm)
    }

    /// Smallest stored value (0 for an empty sparse grid).
    pub fn min_value(&self) -> f64
    {
        let populated = self.storage.populated();
        if populated.is_empty()
        {
            return 0.0;
        }
        populated.iter().map(|&i| self.storage.value(i)).fold(f64::INFINITY, f64::min)
    }

    /// Largest stored value (0 for an empty sparse grid).
    pub fn max_value(&self) -> f64
    {
        let populated = self.storage.populated();
        if populated.is_empty()
        {
            return 0.0;
        }
        populated.iter().map(|&i| self.storage.value(i)).fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn scale_all(&mut self, scalef: f64)
    {
        self.storage.for_each_cell_mut(&mut |_, value, derivatives|
        {
            *value *= scalef;
            derivatives.iter_mut().for_each(|d| *d *= scalef);
        });
    }

    /// `v -> scalef*ln(v)` with derivatives following the chain rule.
    pub fn log_all(&mut self, scalef: f64)
    {
        self.storage.for_each_cell_mut(&mut |_, value, derivatives|
        {
            let v = *value;
            derivatives.iter_mut().for_each(|d| *d = scalef * *d / v);
            *value = scalef * v.ln();
        });
    }

    /// Shift all values so that the smallest becomes zero.
    pub fn set_min_to_zero(&mut self)
    {
        let min = self.min_value();
        self.storage.for_each_cell_mut(&mut |_, value, _| *value -= min);
    }

    /// Map every value through `f` and every derivative component through `fder`.
    pub fn apply_function<F: Fn(f64) -> f64, G: Fn(f64) -> f64>(&mut self, f: F, fder: G)
    {
        self.storage.for_each_cell_mut(&mut |_, value, derivatives|
        {
            *value = f(*value);
            derivatives.iter_mut().for_each(|d| *d = fder(*d));
        });
    }
}

impl SparseGrid
{
    /// Dense copy of this grid; cells never written hold zero.
    pub fn to_dense(&self) -> DenseGrid
    {
        let dimension = self.dimension();
        let mut storage = DenseStorage::with_capacity(self.max_size(), dimension, self.derivatives);
        for (&index, &value) in self.storage.values.iter()
        {
            storage.set_value(index, value);
        }
        for (index, derivatives) in self.storage.derivatives.iter()
        {
            storage.set_derivatives(*index, derivatives);
        }
        Grid { function_name: self.function_name.clone(), geometry: self.geometry.clone(), storage, spline: self.spline, derivatives: self.derivatives, format: self.format }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::grids::options::AxisOptions;
    use crate::storage::geometry::Point;

    fn options(derivatives: bool) -> GridOptions
    {
        GridOptions::new("bias", vec![
            AxisOptions::new("d1", "0.0", "2.0", 8),
            AxisOptions::periodic("phi", "-pi", "pi", 10),
        ]).with_spline(true).with_derivatives(derivatives)
    }

    #[test]
    fn check_accumulation_dense_and_sparse()
    {
        let mut dense = DenseGrid::new(&options(true)).unwrap();
        let mut sparse = SparseGrid::new(&options(true)).unwrap();
        for grid_index in [3usize, 17, 44]
        {
            dense.add_value(grid_index, 1.25).unwrap();
            dense.add_value(grid_index, -0.5).unwrap();
            sparse.add_value(grid_index, 1.25).unwrap();
            sparse.add_value(grid_index, -0.5).unwrap();
            dense.add_value_and_derivatives(grid_index, 0.0, &[1.0, 2.0]).unwrap();
            sparse.add_value_and_derivatives(grid_index, 0.0, &[1.0, 2.0]).unwrap();
        }
        for grid_index in 0..dense.max_size()
        {
            assert_eq!(dense.value(grid_index).unwrap(), sparse.value(grid_index).unwrap());
            assert_eq!(dense.value_and_derivatives(grid_index).unwrap(), sparse.value_and_derivatives(grid_index).unwrap());
        }
        assert_eq!(dense.value(17usize).unwrap(), 0.75);
        assert_eq!(sparse.len(), 3);
        assert_eq!(dense.len(), 90);
        assert_eq!(sparse.max_size(), dense.len());
        assert!(sparse.len() <= dense.len());
    }

    #[test]
    fn check_accessor_errors()
    {
        let mut grid = DenseGrid::new(&options(false)).unwrap();
        assert_eq!(grid.add_value_and_derivatives(0usize, 1.0, &[0.0, 0.0]), Err(GridError::NoDerivatives));
        assert_eq!(grid.value(90usize), Err(GridError::IndexOutOfRange));
        assert_eq!(grid.value([9usize, 0]), Err(GridError::IndexOutOfRange));
        assert_eq!(grid.value(Point(&[2.5, 0.0])), Err(GridError::OutOfDomain));
        assert_eq!(grid.evaluate(&[0.5]), Err(GridError::DimensionMismatch));
        let mut grid = DenseGrid::new(&options(true)).unwrap();
        assert_eq!(grid.set_value_and_derivatives(0usize, 1.0, &[0.0]), Err(GridError::DerivativeSizeMismatch));
    }

    #[test]
    fn check_locators_address_same_cell()
    {
        let mut grid = DenseGrid::new(&options(false)).unwrap();
        grid.set_value([2usize, 7], 4.0).unwrap();
        let point = grid.geometry().point_of_indices(&[2, 7]);
        assert_eq!(grid.value(Point(&point)).unwrap(), 4.0);
        assert_eq!(grid.value(2 * 10 + 7usize).unwrap(), 4.0);
        // periodic wrap of the second axis
        let wrapped = [point[0], point[1] + 2.0 * std::f64::consts::PI];
        assert_eq!(grid.value(Point(&wrapped)).unwrap(), 4.0);
    }

    #[test]
    fn check_lattice_point_queries()
    {
        for spline in [false, true]
        {
            let mut grid = DenseGrid::new(&options(true).with_spline(spline)).unwrap();
            for i in 0..grid.max_size()
            {
                let x = grid.geometry().point_of(i);
                grid.set_value_and_derivatives(i, x[0] * x[1].sin(), &[x[1].sin(), x[0] * x[1].cos()]).unwrap();
            }
            for i in 0..grid.max_size()
            {
                let x = grid.geometry().point_of(i);
                let value = grid.evaluate(&x).unwrap();
                assert!((value - grid.value(i).unwrap()).abs() < 1e-12, "spline={spline} cell {i}");
            }
        }
    }

    #[test]
    fn check_transforms()
    {
        let mut grid = SparseGrid::new(&options(true)).unwrap();
        grid.set_value_and_derivatives(5usize, 2.0, &[1.0, -1.0]).unwrap();
        grid.set_value_and_derivatives(6usize, 4.0, &[2.0, 0.0]).unwrap();
        assert_eq!(grid.min_value(), 2.0);
        assert_eq!(grid.max_value(), 4.0);
        grid.scale_all(0.5);
        assert_eq!(grid.value_and_derivatives(6usize).unwrap(), (2.0, vec![1.0, 0.0]));
        grid.set_min_to_zero();
        assert_eq!(grid.value(5usize).unwrap(), 0.0);
        assert_eq!(grid.value(6usize).unwrap(), 1.0);
        grid.apply_function(|v| v + 1.0, |d| 2.0 * d);
        assert_eq!(grid.value_and_derivatives(6usize).unwrap(), (2.0, vec![2.0, 0.0]));
        grid.log_all(-1.0);
        let (value, derivatives) = grid.value_and_derivatives(6usize).unwrap();
        assert!((value + 2.0f64.ln()).abs() < 1e-15);
        assert_eq!(derivatives, vec![-1.0, 0.0]);
        // untouched cells stay absent
        assert_eq!(grid.len(), 2);
    }

    #[test]
    fn check_to_dense()
    {
        let mut sparse = SparseGrid::new(&options(true)).unwrap();
        sparse.add_value_and_derivatives([1usize, 1], 3.0, &[0.5, 0.25]).unwrap();
        let dense = sparse.to_dense();
        assert_eq!(dense.len(), sparse.max_size());
        assert_eq!(dense.value_and_derivatives([1usize, 1]).unwrap(), (3.0, vec![0.5, 0.25]));
        assert_eq!(dense.value(0usize).unwrap(), 0.0);
    }

    #[test]
    fn check_init_discards_content()
    {
        let mut grid = DenseGrid::new(&options(false)).unwrap();
        grid.add_value(3usize, 1.0).unwrap();
        grid.set_output_format(OutputFormat { width: 10, precision: 4 });
        let three_axes = GridOptions::new("f", vec![AxisOptions::new("a", "0", "1", 2); 3]);
        grid.init(&three_axes).unwrap();
        assert_eq!(grid.dimension(), 3);
        assert_eq!(grid.max_size(), 27);
        assert_eq!(grid.value(3usize).unwrap(), 0.0);
        assert_eq!(grid.output_format().width, 10);
        grid.reset_output_format();
        assert_eq!(grid.output_format(), OutputFormat::default());
    }
}
