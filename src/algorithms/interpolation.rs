use crate::errors::GridError;
use crate::storage::geometry::GridGeometry;
use crate::storage::GridStorage;

/// Largest dimension for which multilinear interpolation (2^d corners) is allowed.
pub const MAX_SPLINE_DIMENSION: usize = 16;

///
/// Bracketing lattice points and fractional offsets of `x` along every axis.
///
struct Stencil
{
    lower: [usize; MAX_SPLINE_DIMENSION],
    upper: [usize; MAX_SPLINE_DIMENSION],
    fraction: [f64; MAX_SPLINE_DIMENSION],
}

impl Stencil
{
    fn new(geometry: &GridGeometry, x: &[f64]) -> Result<Self, GridError>
    {
        let mut stencil = Self { lower: [0; MAX_SPLINE_DIMENSION], upper: [0; MAX_SPLINE_DIMENSION], fraction: [0.0; MAX_SPLINE_DIMENSION] };
        for (k, (axis, &xk)) in geometry.axes().iter().zip(x).enumerate()
        {
            let (lower, upper, fraction) = axis.bin(xk)?;
            stencil.lower[k] = lower;
            stencil.upper[k] = upper;
            stencil.fraction[k] = fraction;
        }
        Ok(stencil)
    }

    /// Flat index of corner `mask` (bit k set selects the upper point on axis k).
    #[inline]
    fn corner(&self, mask: usize, strides: &[usize]) -> usize
    {
        strides.iter().enumerate().map(|(k, &stride)|
        {
            let i = if mask >> k & 1 == 1 { self.upper[k] } else { self.lower[k] };
            i * stride
        }).sum()
    }

    /// Linear basis factor of corner `mask` along axis `k`.
    #[inline]
    fn factor(&self, mask: usize, k: usize) -> f64
    {
        if mask >> k & 1 == 1
        {
            self.fraction[k]
        }
        else
        {
            1.0 - self.fraction[k]
        }
    }
}

///
/// Multilinear interpolation of the stored values at `x`. When `gradient` is given it
/// receives the exact gradient of the interpolant, `sum_c v_c * dw_c/dx`, where each
/// corner weight `w_c` is a product of one-dimensional hat functions.
///
pub fn interpolate<S: GridStorage>(geometry: &GridGeometry, storage: &S, x: &[f64], gradient: Option<&mut [f64]>) -> Result<f64, GridError>
{
    let dimension = geometry.dimension();
    if x.len() != dimension
    {
        return Err(GridError::DimensionMismatch);
    }
    if dimension > MAX_SPLINE_DIMENSION
    {
        return Err(GridError::InvalidGeometry);
    }
    let stencil = Stencil::new(geometry, x)?;
    let strides = geometry.strides();
    let mut value = 0.0;
    match gradient
    {
        None =>
        {
            for mask in 0..1usize << dimension
            {
                let weight: f64 = (0..dimension).map(|k| stencil.factor(mask, k)).product();
                if weight != 0.0
                {
                    value += weight * storage.value(stencil.corner(mask, strides));
                }
            }
        }
        Some(gradient) =>
        {
            if gradient.len() != dimension
            {
                return Err(GridError::DerivativeSizeMismatch);
            }
            gradient.fill(0.0);
            let dx = geometry.dx();
            // prefix[k] = product of factors before k, suffix[k] = product after k
            let mut prefix = [1.0; MAX_SPLINE_DIMENSION + 1];
            let mut suffix = [1.0; MAX_SPLINE_DIMENSION + 1];
            for mask in 0..1usize << dimension
            {
                for k in 0..dimension
                {
                    prefix[k + 1] = prefix[k] * stencil.factor(mask, k);
                }
                for k in (0..dimension).rev()
                {
                    suffix[k] = suffix[k + 1] * stencil.factor(mask, k);
                }
                let v = storage.value(stencil.corner(mask, strides));
                value += prefix[dimension] * v;
                for k in 0..dimension
                {
                    let sign = if mask >> k & 1 == 1 { 1.0 } else { -1.0 };
                    gradient[k] += sign / dx[k] * prefix[k] * suffix[k + 1] * v;
                }
            }
        }
    }
    Ok(value)
}

///
/// Value (and stored derivatives) of the cell containing `x`, without interpolation.
///
pub fn cell_lookup<S: GridStorage>(geometry: &GridGeometry, storage: &S, x: &[f64], derivatives: Option<&mut [f64]>) -> Result<f64, GridError>
{
    let index = geometry.index_of_point(x)?;
    if let Some(derivatives) = derivatives
    {
        if derivatives.len() != geometry.dimension()
        {
            return Err(GridError::DerivativeSizeMismatch);
        }
        storage.derivatives_into(index, derivatives);
    }
    Ok(storage.value(index))
}
