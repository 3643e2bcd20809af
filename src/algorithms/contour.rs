use crate::errors::GridError;
use crate::grids::grid::Grid;
use crate::storage::geometry::{GridGeometry, MAX_DIMENSION};
use crate::storage::GridStorage;

use super::interpolation::interpolate;

/// Fraction of an edge searched for a crossing; stops short of the next lattice point.
const EDGE_FRACTION: f64 = 0.999999999;
const MAX_BISECTION_STEPS: usize = 64;

///
/// Root of `f` in `[a, b]`, where `fa = f(a)` and `fb = f(b)` differ in sign: bisection
/// until the bracket stops shrinking, then a linear interpolation inside it.
///
fn bracketed_root<F: Fn(f64) -> Result<f64, GridError>>(f: F, mut a: f64, mut b: f64, mut fa: f64, mut fb: f64) -> Result<f64, GridError>
{
    let tolerance = 1e-12 * (b - a).abs();
    for _ in 0..MAX_BISECTION_STEPS
    {
        if (b - a).abs() <= tolerance || fa == 0.0 || fb == 0.0
        {
            break;
        }
        let m = 0.5 * (a + b);
        let fm = f(m)?;
        if (fm < 0.0) == (fa < 0.0)
        {
            a = m;
            fa = fm;
        }
        else
        {
            b = m;
            fb = fm;
        }
    }
    if fa == fb
    {
        return Ok(a);
    }
    Ok(a + fa * (b - a) / (fa - fb))
}

/// The `+1` neighbour of `indices` along `axis`, if the lattice has one.
fn edge_end(geometry: &GridGeometry, indices: &[usize], index: usize, k: usize) -> Option<usize>
{
    let axis = geometry.axis(k);
    let n = axis.points();
    let stride = geometry.strides()[k];
    let i = indices[k];
    if axis.is_periodic()
    {
        (n > 1).then(|| index - i * stride + (i + 1) % n * stride)
    }
    else
    {
        (i + 1 < n).then(|| index + stride)
    }
}

///
/// Sample the isosurface `f = target` at lattice resolution: every lattice edge whose
/// end values straddle `target` is searched for the crossing of the multilinear
/// interpolant. Edges along axes flagged in `excluded_axes` are skipped.
///
pub fn find_points_on_contour<S: GridStorage>(grid: &Grid<S>, target: f64, excluded_axes: &[bool], max_points: usize) -> Result<Vec<Vec<f64>>, GridError>
{
    let geometry = grid.geometry();
    let storage = grid.storage();
    let dimension = geometry.dimension();
    if excluded_axes.len() != dimension
    {
        return Err(GridError::DimensionMismatch);
    }
    let mut points = Vec::new();
    if max_points == 0
    {
        return Ok(points);
    }
    let mut indices = [0usize; MAX_DIMENSION];
    let mut origin = [0.0; MAX_DIMENSION];
    for index in 0..geometry.size()
    {
        geometry.indices_into(index, &mut indices[..dimension]);
        let fa = storage.value(index) - target;
        for k in (0..dimension).filter(|&k| !excluded_axes[k])
        {
            let Some(end) = edge_end(geometry, &indices[..dimension], index, k) else { continue };
            let fb = storage.value(end) - target;
            if (fa < 0.0) == (fb < 0.0)
            {
                continue;
            }
            geometry.point_into(index, &mut origin[..dimension]);
            let axis = geometry.axis(k);
            let along = |s: f64|
            {
                let mut x = origin;
                x[k] = axis.wrap(origin[k] + s);
                interpolate(geometry, storage, &x[..dimension], None).map(|v| v - target)
            };
            let length = EDGE_FRACTION * axis.dx();
            let f_end = along(length)?;
            if (f_end < 0.0) == (fa < 0.0)
            {
                // crossing lies in the sliver left out of the search
                continue;
            }
            let s = bracketed_root(&along, 0.0, length, fa, f_end)?;
            let mut point = origin[..dimension].to_vec();
            point[k] = axis.wrap(origin[k] + s);
            log::trace!("contour point {point:?} on edge {index}->{end}");
            points.push(point);
            if points.len() >= max_points
            {
                return Ok(points);
            }
        }
    }
    log::debug!("found {} points on contour {target}", points.len());
    Ok(points)
}

#[cfg(test)]
mod tests
{
    use crate::grids::grid::DenseGrid;
    use crate::grids::options::{AxisOptions, GridOptions};

    fn radial_grid() -> DenseGrid
    {
        let options = GridOptions::new("r", vec![AxisOptions::new("x", "-2", "2", 20), AxisOptions::new("y", "-2", "2", 20)]).with_spline(true);
        let mut grid = DenseGrid::new(&options).unwrap();
        for i in 0..grid.max_size()
        {
            let x = grid.geometry().point_of(i);
            grid.set_value(i, x[0] * x[0] + x[1] * x[1]).unwrap();
        }
        grid
    }

    #[test]
    fn check_points_lie_on_contour()
    {
        let grid = radial_grid();
        let points = grid.find_points_on_contour(1.0, &[false, false], 1000).unwrap();
        assert!(!points.is_empty());
        for point in &points
        {
            let (difference, _) = grid.difference_from_contour(point, 1.0).unwrap();
            assert!(difference.abs() < 1e-9, "{point:?}: {difference}");
            // the lattice interpolant is close to the true circle
            let r = (point[0] * point[0] + point[1] * point[1]).sqrt();
            assert!((r - 1.0).abs() < 0.05);
        }
    }

    #[test]
    fn check_excluded_axes_and_limit()
    {
        let grid = radial_grid();
        let all = grid.find_points_on_contour(1.0, &[false, false], 1000).unwrap();
        let along_x = grid.find_points_on_contour(1.0, &[false, true], 1000).unwrap();
        let along_y = grid.find_points_on_contour(1.0, &[true, false], 1000).unwrap();
        assert_eq!(all.len(), along_x.len() + along_y.len());
        assert!(grid.find_points_on_contour(1.0, &[true, true], 1000).unwrap().is_empty());
        assert_eq!(grid.find_points_on_contour(1.0, &[false, false], 3).unwrap().len(), 3);
        assert!(grid.find_points_on_contour(1.0, &[false], 3).is_err());
    }

    #[test]
    fn check_periodic_edge_crossing()
    {
        let options = GridOptions::new("f", vec![AxisOptions::periodic("phi", "0", "4", 4)]).with_spline(true);
        let mut grid = DenseGrid::new(&options).unwrap();
        for (i, v) in [1.0, 1.0, 1.0, -3.0].into_iter().enumerate()
        {
            grid.set_value(i, v).unwrap();
        }
        let points = grid.find_points_on_contour(0.0, &[false], 10).unwrap();
        assert_eq!(points.len(), 2);
        // crossing between 2 and 3 at 2.25, and on the wrapping edge 3 -> 0 at 3.75
        assert!((points[0][0] - 2.25).abs() < 1e-9);
        assert!((points[1][0] - 3.75).abs() < 1e-9);
    }
}
