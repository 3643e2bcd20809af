use crate::errors::GridError;
use crate::grids::grid::{DenseGrid, Grid};
use crate::storage::geometry::{GridGeometry, MAX_DIMENSION};
use crate::storage::GridStorage;
use crate::utilities::multi_index_manipulation::next_multi_index;

///
/// How the values along marginalized axes are folded into one output value:
/// `finalize(combine(...combine(initial(), v_0)..., v_n))`.
///
pub trait ProjectionWeight
{
    fn initial(&self) -> f64
    {
        0.0
    }
    fn combine(&self, accumulator: f64, value: f64) -> f64;
    fn finalize(&self, accumulator: f64) -> f64;
}

///
/// Free energy of the kept coordinates from a bias: `-1/beta * ln(sum exp(beta*v))`.
///
#[derive(Clone, Copy, Debug)]
pub struct BiasWeight
{
    pub beta: f64,
}

impl ProjectionWeight for BiasWeight
{
    fn combine(&self, accumulator: f64, value: f64) -> f64
    {
        accumulator + (self.beta * value).exp()
    }
    fn finalize(&self, accumulator: f64) -> f64
    {
        -accumulator.ln() / self.beta
    }
}

///
/// Free energy of the kept coordinates from a probability: `-1/beta * ln(sum v)`.
///
#[derive(Clone, Copy, Debug)]
pub struct ProbWeight
{
    pub beta: f64,
}

impl ProjectionWeight for ProbWeight
{
    fn combine(&self, accumulator: f64, value: f64) -> f64
    {
        accumulator + value
    }
    fn finalize(&self, accumulator: f64) -> f64
    {
        -accumulator.ln() / self.beta
    }
}

/// Plain marginal sum.
#[derive(Clone, Copy, Debug, Default)]
pub struct SumWeight;

impl ProjectionWeight for SumWeight
{
    fn combine(&self, accumulator: f64, value: f64) -> f64
    {
        accumulator + value
    }
    fn finalize(&self, accumulator: f64) -> f64
    {
        accumulator
    }
}

/// Positions of the axes named in `keep` within `geometry`.
fn kept_axes(geometry: &GridGeometry, keep: &[&str]) -> Result<Vec<usize>, GridError>
{
    if keep.is_empty()
    {
        return Err(GridError::DimensionMismatch);
    }
    let mut kept = Vec::with_capacity(keep.len());
    for name in keep
    {
        let position = geometry.axes().iter().position(|axis| axis.name() == *name).ok_or(GridError::UnknownAxis)?;
        if kept.contains(&position)
        {
            return Err(GridError::DimensionMismatch);
        }
        kept.push(position);
    }
    Ok(kept)
}

///
/// Marginalize the axes of `grid` not named in `keep`, folding the values that share
/// kept coordinates with `weight`. The result has the kept axes, in the order given.
///
pub fn project<S: GridStorage, W: ProjectionWeight + ?Sized>(grid: &Grid<S>, keep: &[&str], weight: &W) -> Result<DenseGrid, GridError>
{
    let geometry = grid.geometry();
    let kept = kept_axes(geometry, keep)?;
    let marginalized: Vec<usize> = (0..geometry.dimension()).filter(|k| !kept.contains(k)).collect();
    let axes = kept.iter().map(|&k| geometry.axis(k).clone()).collect();
    let mut projected = DenseGrid::from_geometry(grid.function_name(), GridGeometry::new(axes)?, grid.uses_spline(), false)?;
    projected.set_output_format(grid.output_format());

    let bounds: Vec<usize> = marginalized.iter().map(|&k| geometry.axis(k).points()).collect();
    let mut inner = vec![0; marginalized.len()];
    let mut outer = [0usize; MAX_DIMENSION];
    let mut full = [0usize; MAX_DIMENSION];
    let dimension = geometry.dimension();
    for index in 0..projected.max_size()
    {
        projected.geometry().indices_into(index, &mut outer[..kept.len()]);
        for (j, &k) in kept.iter().enumerate()
        {
            full[k] = outer[j];
        }
        inner.fill(0);
        let mut accumulator = weight.initial();
        loop
        {
            for (j, &k) in marginalized.iter().enumerate()
            {
                full[k] = inner[j];
            }
            let source = geometry.index_of(&full[..dimension])?;
            accumulator = weight.combine(accumulator, grid.storage().value(source));
            if marginalized.is_empty() || !next_multi_index(&mut inner, &bounds)
            {
                break;
            }
        }
        projected.storage.set_value(index, weight.finalize(accumulator));
    }
    Ok(projected)
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::grids::options::{AxisOptions, GridOptions};

    fn grid() -> DenseGrid
    {
        let options = GridOptions::new("fes", vec![
            AxisOptions::new("x", "0", "1", 4),
            AxisOptions::periodic("phi", "-pi", "pi", 6),
            AxisOptions::new("z", "0", "2", 2),
        ]);
        DenseGrid::new(&options).unwrap()
    }

    #[test]
    fn check_sum_projection_of_constant_columns()
    {
        let mut grid = grid();
        // values depend on x only, so every phi/z column is constant
        for i in 0..grid.max_size()
        {
            let indices = grid.geometry().indices_of(i);
            grid.set_value(i, 1.0 + indices[0] as f64).unwrap();
        }
        let projected = grid.project(&["x"], &SumWeight).unwrap();
        assert_eq!(projected.dimension(), 1);
        assert_eq!(projected.max_size(), 5);
        // 6 periodic points times 3 points on z
        for i in 0..5usize
        {
            assert_eq!(projected.value(i).unwrap(), (1.0 + i as f64) * 18.0);
        }
    }

    #[test]
    fn check_kept_axis_order()
    {
        let mut grid = grid();
        for i in 0..grid.max_size()
        {
            let indices = grid.geometry().indices_of(i);
            grid.set_value(i, (indices[0] * 10 + indices[2]) as f64).unwrap();
        }
        let projected = grid.project(&["z", "x"], &SumWeight).unwrap();
        assert_eq!(projected.arg_names(), vec!["z", "x"]);
        assert_eq!(projected.value([2usize, 3]).unwrap(), 32.0 * 6.0);
        assert_eq!(grid.project(&["y"], &SumWeight).err(), Some(GridError::UnknownAxis));
        assert_eq!(grid.project(&["x", "x"], &SumWeight).err(), Some(GridError::DimensionMismatch));
    }

    #[test]
    fn check_free_energy_weights()
    {
        let mut grid = grid();
        grid.apply_function(|_| 0.5, |d| d);
        let beta = 2.0;
        let projected = grid.project(&["phi"], &ProbWeight { beta }).unwrap();
        let expected = -(0.5 * 15.0f64).ln() / beta;
        assert!((projected.value(0usize).unwrap() - expected).abs() < 1e-12);
        let projected = grid.project(&["phi", "z"], &BiasWeight { beta }).unwrap();
        let expected = -(5.0 * (beta * 0.5).exp()).ln() / beta;
        assert!((projected.value(0usize).unwrap() - expected).abs() < 1e-12);
    }
}
