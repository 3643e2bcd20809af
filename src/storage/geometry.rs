use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::errors::GridError;
use crate::utilities::multi_index_manipulation::{compose, decompose, next_multi_index, row_major_strides};

/// Maximum number of axes. Per-call scratch arrays are sized with this so they can live on the stack.
pub const MAX_DIMENSION: usize = 64;

/// Fraction of a bin below which a coordinate is considered to sit on a lattice point.
const LATTICE_TOLERANCE: f64 = 1e-10;

///
/// Parse a bound given as text. Accepts plain floats and multiples or fractions of `pi`
/// (`pi`, `-pi`, `2pi`, `2*pi`, `pi/2`, `-3*pi/4`).
///
pub fn parse_bound(text: &str) -> Result<f64, GridError>
{
    let s = text.trim();
    if let Ok(value) = s.parse::<f64>()
    {
        return Ok(value);
    }
    let lower = s.to_ascii_lowercase();
    let (sign, body) = match lower.strip_prefix('-')
    {
        Some(rest) => (-1.0, rest),
        None => (1.0, lower.strip_prefix('+').unwrap_or(&lower)),
    };
    let (numerator, denominator) = match body.split_once('/')
    {
        Some((n, d)) => (n.trim(), d.trim().parse::<f64>().map_err(|_| GridError::ParseFailed)?),
        None => (body, 1.0),
    };
    let coefficient = numerator.strip_suffix("pi").ok_or(GridError::ParseFailed)?.trim().trim_end_matches('*').trim();
    let coefficient = if coefficient.is_empty()
    {
        1.0
    }
    else
    {
        coefficient.parse::<f64>().map_err(|_| GridError::ParseFailed)?
    };
    if denominator == 0.0
    {
        return Err(GridError::ParseFailed);
    }
    Ok(sign * coefficient * PI / denominator)
}

///
/// One lattice axis. Bounds are kept both as parsed numbers and as the text they
/// were given in, so files written from a grid reproduce the bounds as written.
///
/// Periodic axes carry `nbin` lattice points at `min + i*dx`; the last bin is exactly
/// `dx` wide and wraps onto point 0. Non-periodic axes carry `nbin + 1` points so that
/// both `min` and `max` are lattice points, and the valid domain is `[min, max]`.
///
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Axis
{
    pub(crate) name: String,
    pub(crate) str_min: String,
    pub(crate) str_max: String,
    pub(crate) min: f64,
    pub(crate) max: f64,
    pub(crate) nbin: usize,
    pub(crate) periodic: bool,
    pub(crate) dx: f64,
}

impl Axis
{
    pub fn new(name: &str, str_min: &str, str_max: &str, nbin: usize, periodic: bool) -> Result<Self, GridError>
    {
        let min = parse_bound(str_min)?;
        let max = parse_bound(str_max)?;
        if nbin == 0 || !min.is_finite() || !max.is_finite() || max <= min
        {
            log::warn!("invalid bounds for axis {name}: min={str_min} max={str_max} nbin={nbin}");
            return Err(GridError::InvalidGeometry);
        }
        let dx = (max - min) / nbin as f64;
        if dx <= 0.0
        {
            return Err(GridError::InvalidGeometry);
        }
        Ok(Self { name: name.to_owned(), str_min: str_min.trim().to_owned(), str_max: str_max.trim().to_owned(), min, max, nbin, periodic, dx })
    }

    #[inline]
    pub fn name(&self) -> &str
    {
        &self.name
    }
    #[inline]
    pub fn min(&self) -> f64
    {
        self.min
    }
    #[inline]
    pub fn max(&self) -> f64
    {
        self.max
    }
    #[inline]
    pub fn str_min(&self) -> &str
    {
        &self.str_min
    }
    #[inline]
    pub fn str_max(&self) -> &str
    {
        &self.str_max
    }
    #[inline]
    pub fn nbin(&self) -> usize
    {
        self.nbin
    }
    #[inline]
    pub fn is_periodic(&self) -> bool
    {
        self.periodic
    }
    #[inline]
    pub fn dx(&self) -> f64
    {
        self.dx
    }
    #[inline]
    pub fn period(&self) -> f64
    {
        self.max - self.min
    }

    /// Number of lattice points along this axis.
    #[inline]
    pub fn points(&self) -> usize
    {
        if self.periodic
        {
            self.nbin
        }
        else
        {
            self.nbin + 1
        }
    }

    #[inline]
    pub fn coordinate(&self, i: usize) -> f64
    {
        self.min + i as f64 * self.dx
    }

    ///
    /// Lattice point whose cell contains `x`, and the fractional offset of `x` inside that cell.
    ///
    pub fn locate(&self, x: f64) -> Result<(usize, f64), GridError>
    {
        if !x.is_finite()
        {
            return Err(GridError::OutOfDomain);
        }
        if self.periodic
        {
            let y = (x - self.min).rem_euclid(self.period());
            let t = y / self.dx;
            let cell = Self::snapped_floor(t);
            if cell as usize >= self.nbin
            {
                // rounding put us on the upper bound, which is point 0
                return Ok((0, 0.0));
            }
            Ok((cell as usize, (t - cell).clamp(0.0, 1.0)))
        }
        else
        {
            if x < self.min || x > self.max
            {
                return Err(GridError::OutOfDomain);
            }
            let t = (x - self.min) / self.dx;
            let cell = (Self::snapped_floor(t) as usize).min(self.nbin);
            Ok((cell, (t - cell as f64).clamp(0.0, 1.0)))
        }
    }

    /// `floor(t)`, except that values a rounding error below an integer count as that integer.
    #[inline]
    fn snapped_floor(t: f64) -> f64
    {
        let cell = t.floor();
        if t - cell > 1.0 - LATTICE_TOLERANCE
        {
            cell + 1.0
        }
        else
        {
            cell
        }
    }

    ///
    /// The bin `[lower, upper]` used for linear interpolation at `x`, with the fraction of
    /// the way from `lower` to `upper`. At the upper bound of a non-periodic axis the last
    /// bin is used with fraction 1.
    ///
    pub fn bin(&self, x: f64) -> Result<(usize, usize, f64), GridError>
    {
        let (cell, fraction) = self.locate(x)?;
        if self.periodic
        {
            Ok((cell, (cell + 1) % self.nbin, fraction))
        }
        else if cell >= self.nbin
        {
            Ok((self.nbin - 1, self.nbin, 1.0))
        }
        else
        {
            Ok((cell, cell + 1, fraction))
        }
    }

    /// Lattice point nearest to `x`.
    pub fn nearest(&self, x: f64) -> Result<usize, GridError>
    {
        if !x.is_finite()
        {
            return Err(GridError::OutOfDomain);
        }
        let t = ((x - self.min) / self.dx).round();
        if self.periodic
        {
            Ok((t as i64).rem_euclid(self.nbin as i64) as usize)
        }
        else if t < 0.0 || t > self.nbin as f64
        {
            Err(GridError::OutOfDomain)
        }
        else
        {
            Ok(t as usize)
        }
    }

    /// Map `x` back into `[min, max)` on periodic axes; identity otherwise.
    #[inline]
    pub fn wrap(&self, x: f64) -> f64
    {
        if self.periodic
        {
            self.min + (x - self.min).rem_euclid(self.period())
        }
        else
        {
            x
        }
    }

    /// Displacement `x - center`, using the minimum image on periodic axes.
    #[inline]
    pub fn difference(&self, center: f64, x: f64) -> f64
    {
        let d = x - center;
        if self.periodic
        {
            let period = self.period();
            d - period * (d / period).round()
        }
        else
        {
            d
        }
    }
}

///
/// Shared lattice geometry: the axes plus the row-major strides of the flat index
/// (last axis fastest).
///
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry
{
    pub(crate) axes: Vec<Axis>,
    pub(crate) strides: Vec<usize>,
    pub(crate) size: usize,
}

impl GridGeometry
{
    pub fn new(axes: Vec<Axis>) -> Result<Self, GridError>
    {
        if axes.is_empty() || axes.len() > MAX_DIMENSION
        {
            log::warn!("grid dimension {} outside 1..={MAX_DIMENSION}", axes.len());
            return Err(GridError::InvalidGeometry);
        }
        let points: Vec<usize> = axes.iter().map(Axis::points).collect();
        let (strides, size) = row_major_strides(&points)?;
        Ok(Self { axes, strides, size })
    }

    #[inline]
    pub fn dimension(&self) -> usize
    {
        self.axes.len()
    }

    #[inline]
    pub fn axes(&self) -> &[Axis]
    {
        &self.axes
    }

    #[inline]
    pub fn axis(&self, dim: usize) -> &Axis
    {
        &self.axes[dim]
    }

    /// Total number of lattice points.
    #[inline]
    pub fn size(&self) -> usize
    {
        self.size
    }

    #[inline]
    pub fn strides(&self) -> &[usize]
    {
        &self.strides
    }

    pub fn points_per_axis(&self) -> Vec<usize>
    {
        self.axes.iter().map(Axis::points).collect()
    }

    pub fn dx(&self) -> Vec<f64>
    {
        self.axes.iter().map(Axis::dx).collect()
    }

    ///
    /// Volume of one lattice cell (dx_1*...*dx_n)
    ///
    pub fn bin_volume(&self) -> f64
    {
        self.axes.iter().map(Axis::dx).product()
    }

    #[inline]
    pub fn check_index(&self, index: usize) -> Result<usize, GridError>
    {
        if index < self.size
        {
            Ok(index)
        }
        else
        {
            Err(GridError::IndexOutOfRange)
        }
    }

    /// Decompose a flat index into `out`. `out` must hold `dimension` entries.
    #[inline]
    pub fn indices_into(&self, index: usize, out: &mut [usize])
    {
        decompose(index, &self.strides, out);
    }

    pub fn indices_of(&self, index: usize) -> Vec<usize>
    {
        let mut out = vec![0; self.dimension()];
        self.indices_into(index, &mut out);
        out
    }

    pub fn index_of(&self, indices: &[usize]) -> Result<usize, GridError>
    {
        if indices.len() != self.dimension()
        {
            return Err(GridError::DimensionMismatch);
        }
        if indices.iter().zip(&self.axes).any(|(&i, axis)| i >= axis.points())
        {
            return Err(GridError::IndexOutOfRange);
        }
        Ok(compose(indices, &self.strides))
    }

    pub fn indices_of_point(&self, x: &[f64]) -> Result<Vec<usize>, GridError>
    {
        if x.len() != self.dimension()
        {
            return Err(GridError::DimensionMismatch);
        }
        self.axes.iter().zip(x).map(|(axis, &xi)| axis.locate(xi).map(|(cell, _)| cell)).collect()
    }

    pub fn index_of_point(&self, x: &[f64]) -> Result<usize, GridError>
    {
        if x.len() != self.dimension()
        {
            return Err(GridError::DimensionMismatch);
        }
        let mut index = 0;
        for ((axis, &xi), &stride) in self.axes.iter().zip(x).zip(&self.strides)
        {
            index += axis.locate(xi)?.0 * stride;
        }
        Ok(index)
    }

    /// Flat index of the lattice point nearest to `x`.
    pub fn nearest_index_of_point(&self, x: &[f64]) -> Result<usize, GridError>
    {
        if x.len() != self.dimension()
        {
            return Err(GridError::DimensionMismatch);
        }
        let mut index = 0;
        for ((axis, &xi), &stride) in self.axes.iter().zip(x).zip(&self.strides)
        {
            index += axis.nearest(xi)? * stride;
        }
        Ok(index)
    }

    pub fn point_of_indices(&self, indices: &[usize]) -> Vec<f64>
    {
        self.axes.iter().zip(indices).map(|(axis, &i)| axis.coordinate(i)).collect()
    }

    /// Lower-corner coordinate of the cell at `index`, written into `out`.
    pub fn point_into(&self, index: usize, out: &mut [f64])
    {
        let mut tuple = [0usize; MAX_DIMENSION];
        let tuple = &mut tuple[..self.dimension()];
        self.indices_into(index, tuple);
        for ((o, axis), &i) in out.iter_mut().zip(&self.axes).zip(tuple.iter())
        {
            *o = axis.coordinate(i);
        }
    }

    pub fn point_of(&self, index: usize) -> Vec<f64>
    {
        let mut out = vec![0.0; self.dimension()];
        self.point_into(index, &mut out);
        out
    }

    ///
    /// All cells within `±radius[k]` of `indices` along every axis, wrapping periodic
    /// axes and clipping non-periodic ones. A window at least as wide as a periodic
    /// axis covers that axis once. Cells come out in row-major order of the window.
    ///
    pub fn neighbors(&self, indices: &[usize], radius: &[usize]) -> Result<Vec<usize>, GridError>
    {
        let dimension = self.dimension();
        if indices.len() != dimension || radius.len() != dimension
        {
            return Err(GridError::DimensionMismatch);
        }
        let mut candidates: Vec<Vec<usize>> = Vec::with_capacity(dimension);
        for ((axis, &center), &r) in self.axes.iter().zip(indices).zip(radius)
        {
            let n = axis.points();
            if center >= n
            {
                return Err(GridError::IndexOutOfRange);
            }
            // a window wider than the axis covers it once
            let r = r.min(n);
            let along = if axis.periodic && 2 * r + 1 >= n
            {
                (0..n).collect()
            }
            else if axis.periodic
            {
                let (c, r, n) = (center as i64, r as i64, n as i64);
                (c - r..=c + r).map(|i| i.rem_euclid(n) as usize).collect()
            }
            else
            {
                (center.saturating_sub(r)..=(center + r).min(n - 1)).collect()
            };
            candidates.push(along);
        }
        let bounds: Vec<usize> = candidates.iter().map(Vec::len).collect();
        let mut neighbors = Vec::with_capacity(bounds.iter().product());
        let mut current = [0usize; MAX_DIMENSION];
        let current = &mut current[..dimension];
        loop
        {
            let mut index = 0;
            for ((along, &c), &stride) in candidates.iter().zip(current.iter()).zip(&self.strides)
            {
                index += along[c] * stride;
            }
            neighbors.push(index);
            if !next_multi_index(current, &bounds)
            {
                break;
            }
        }
        Ok(neighbors)
    }

    ///
    /// Cells one lattice unit away from `index` along a single axis (at most `2*dimension`).
    ///
    pub fn nearest_neighbors(&self, index: usize) -> Vec<usize>
    {
        let mut tuple = [0usize; MAX_DIMENSION];
        let tuple = &mut tuple[..self.dimension()];
        self.indices_into(index, tuple);
        let mut neighbors = Vec::with_capacity(2 * self.dimension());
        for (dim, axis) in self.axes.iter().enumerate()
        {
            let n = axis.points();
            let i = tuple[dim];
            let stride = self.strides[dim];
            let base = index - i * stride;
            if axis.periodic
            {
                if n < 2
                {
                    continue;
                }
                let down = (i + n - 1) % n;
                let up = (i + 1) % n;
                neighbors.push(base + down * stride);
                if up != down
                {
                    neighbors.push(base + up * stride);
                }
            }
            else
            {
                if i > 0
                {
                    neighbors.push(base + (i - 1) * stride);
                }
                if i + 1 < n
                {
                    neighbors.push(base + (i + 1) * stride);
                }
            }
        }
        neighbors
    }
}

///
/// Anything that names one lattice cell: a flat index, an index tuple, or a
/// continuous [`Point`] (resolved to the cell that contains it).
///
pub trait CellLocator
{
    fn flat_index(&self, geometry: &GridGeometry) -> Result<usize, GridError>;
}

/// A continuous coordinate in the ambient space of a grid.
#[derive(Clone, Copy, Debug)]
pub struct Point<'a>(pub &'a [f64]);

impl CellLocator for usize
{
    #[inline]
    fn flat_index(&self, geometry: &GridGeometry) -> Result<usize, GridError>
    {
        geometry.check_index(*self)
    }
}

impl CellLocator for &[usize]
{
    #[inline]
    fn flat_index(&self, geometry: &GridGeometry) -> Result<usize, GridError>
    {
        geometry.index_of(self)
    }
}

impl CellLocator for &Vec<usize>
{
    #[inline]
    fn flat_index(&self, geometry: &GridGeometry) -> Result<usize, GridError>
    {
        geometry.index_of(self)
    }
}

impl<const N: usize> CellLocator for [usize; N]
{
    #[inline]
    fn flat_index(&self, geometry: &GridGeometry) -> Result<usize, GridError>
    {
        geometry.index_of(self)
    }
}

impl<const N: usize> CellLocator for &[usize; N]
{
    #[inline]
    fn flat_index(&self, geometry: &GridGeometry) -> Result<usize, GridError>
    {
        geometry.index_of(&self[..])
    }
}

impl CellLocator for Point<'_>
{
    #[inline]
    fn flat_index(&self, geometry: &GridGeometry) -> Result<usize, GridError>
    {
        geometry.index_of_point(self.0)
    }
}
