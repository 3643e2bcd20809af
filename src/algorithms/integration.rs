use crate::errors::GridError;
use crate::grids::grid::Grid;
use crate::storage::geometry::GridGeometry;
use crate::storage::GridStorage;
use crate::utilities::multi_index_manipulation::next_multi_index;

///
/// Cell-volume quadrature: every stored value times `dx_1*...*dx_n`.
///
pub fn integrate<S: GridStorage>(geometry: &GridGeometry, storage: &S) -> f64
{
    let sum: f64 = storage.populated().into_iter().map(|i| storage.value(i)).sum();
    sum * geometry.bin_volume()
}

///
/// Integrate the evaluated field on a regular resampling of the domain with
/// `npoints[k]` intervals along axis `k`. Non-periodic axes are sampled at both ends.
///
pub fn integrate_resampled<S: GridStorage>(grid: &Grid<S>, npoints: &[usize]) -> Result<f64, GridError>
{
    let geometry = grid.geometry();
    let dimension = geometry.dimension();
    if npoints.len() != dimension
    {
        return Err(GridError::DimensionMismatch);
    }
    if npoints.contains(&0)
    {
        return Err(GridError::InvalidGeometry);
    }
    let mut spacing = Vec::with_capacity(dimension);
    let mut samples = Vec::with_capacity(dimension);
    for (axis, &n) in geometry.axes().iter().zip(npoints)
    {
        spacing.push(axis.period() / n as f64);
        samples.push(if axis.is_periodic() { n } else { n + 1 });
    }
    let volume: f64 = spacing.iter().product();
    let mut current = vec![0; dimension];
    let mut x = vec![0.0; dimension];
    let mut integral = 0.0;
    loop
    {
        for k in 0..dimension
        {
            // clamp so the last sample of a non-periodic axis never drifts past max
            x[k] = (geometry.axis(k).min() + current[k] as f64 * spacing[k]).min(geometry.axis(k).max());
        }
        integral += grid.evaluate(&x)?;
        if !next_multi_index(&mut current, &samples)
        {
            break;
        }
    }
    Ok(integral * volume)
}

#[cfg(test)]
mod tests
{
    use crate::grids::grid::{DenseGrid, SparseGrid};
    use crate::grids::options::{AxisOptions, GridOptions};

    fn options() -> GridOptions
    {
        GridOptions::new("c", vec![
            AxisOptions::new("a", "0", "1.5", 6),
            AxisOptions::periodic("b", "-pi", "pi", 8),
            AxisOptions::new("c", "-1", "1", 4),
        ])
    }

    #[test]
    fn check_constant_field_integral()
    {
        let c = 2.5;
        let mut grid = DenseGrid::new(&options()).unwrap();
        grid.apply_function(|_| c, |d| d);
        let expected = c * grid.max_size() as f64 * grid.dx().iter().product::<f64>();
        assert!((grid.integrate() - expected).abs() < 1e-10);
        assert_eq!(grid.max_size(), 7 * 8 * 5);
    }

    #[test]
    fn check_sparse_integral_counts_populated_cells()
    {
        let mut grid = SparseGrid::new(&options()).unwrap();
        grid.add_value(0usize, 1.0).unwrap();
        grid.add_value(10usize, 3.0).unwrap();
        assert!((grid.integrate() - 4.0 * grid.bin_volume()).abs() < 1e-14);
    }

    #[test]
    fn check_resampled_integral_of_linear_field()
    {
        let options = GridOptions::new("lin", vec![AxisOptions::new("a", "0", "2", 4), AxisOptions::periodic("b", "0", "1", 5)]).with_spline(true);
        let mut grid = DenseGrid::new(&options).unwrap();
        for i in 0..grid.max_size()
        {
            let x = grid.geometry().point_of(i);
            grid.set_value(i, 3.0 * x[0]).unwrap();
        }
        // sum over 11 samples of 3x at spacing 0.2 on [0,2], times 5 periodic samples of width 0.2
        let integral = grid.integrate_resampled(&[10, 5]).unwrap();
        let expected = (0..=10).map(|i| 3.0 * 0.2 * i as f64).sum::<f64>() * 0.2 * 5.0 * 0.2;
        assert!((integral - expected).abs() < 1e-10, "{integral} vs {expected}");
        assert!(grid.integrate_resampled(&[10]).is_err());
    }
}
