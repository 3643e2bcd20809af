use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::errors::GridError;
use crate::storage::geometry::{GridGeometry, MAX_DIMENSION};
use crate::storage::GridStorage;

/// Gaussians are truncated where `0.5*r^2` reaches this value.
pub const DP2CUTOFF: f64 = 6.25;

///
/// A localized contribution to a grid. The grid only asks where the kernel sits, how
/// far it reaches, and what it is worth at a lattice point.
///
pub trait Kernel
{
    fn center(&self) -> &[f64];

    /// Half-width of the support window, in bins, along every axis given the bin widths `dx`.
    fn support(&self, dx: &[f64]) -> Vec<usize>;

    ///
    /// Kernel value at `x`. If `derivatives` is not empty it receives the gradient with
    /// respect to `x`.
    ///
    fn evaluate(&self, geometry: &GridGeometry, x: &[f64], derivatives: &mut [f64]) -> f64;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum KernelShape
{
    #[default]
    Gaussian,
    Triangular,
    Uniform,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KernelFunction
{
    pub(crate) center: Vec<f64>,
    pub(crate) width: Vec<f64>,
    pub(crate) height: f64,
    pub(crate) shape: KernelShape,
}

impl KernelFunction
{
    pub fn new(center: Vec<f64>, width: Vec<f64>, height: f64, shape: KernelShape) -> Result<Self, GridError>
    {
        if center.len() != width.len() || center.is_empty()
        {
            return Err(GridError::DimensionMismatch);
        }
        if width.iter().any(|&w| !(w > 0.0) || !w.is_finite())
        {
            return Err(GridError::InvalidGeometry);
        }
        Ok(Self { center, width, height, shape })
    }

    ///
    /// Kernel whose integral over the whole space equals `weight`.
    ///
    pub fn normalized(center: Vec<f64>, width: Vec<f64>, weight: f64, shape: KernelShape) -> Result<Self, GridError>
    {
        let mut kernel = Self::new(center, width, 1.0, shape)?;
        kernel.height = weight / kernel.unit_volume();
        Ok(kernel)
    }

    #[inline]
    pub fn height(&self) -> f64
    {
        self.height
    }

    #[inline]
    pub fn width(&self) -> &[f64]
    {
        &self.width
    }

    #[inline]
    pub fn shape(&self) -> KernelShape
    {
        self.shape
    }

    /// Integral of the kernel with unit height.
    fn unit_volume(&self) -> f64
    {
        let d = self.width.len() as f64;
        let widths: f64 = self.width.iter().product();
        let ball = PI.powf(0.5 * d) / libm::tgamma(0.5 * d + 1.0);
        match self.shape
        {
            KernelShape::Gaussian => (2.0 * PI).powf(0.5 * d) * widths,
            KernelShape::Uniform => ball * widths,
            KernelShape::Triangular => ball * widths / (d + 1.0),
        }
    }

    /// Reach of the kernel in units of its width.
    fn cutoff(&self) -> f64
    {
        match self.shape
        {
            KernelShape::Gaussian => (2.0 * DP2CUTOFF).sqrt(),
            KernelShape::Triangular | KernelShape::Uniform => 1.0,
        }
    }
}

impl Kernel for KernelFunction
{
    fn center(&self) -> &[f64]
    {
        &self.center
    }

    fn support(&self, dx: &[f64]) -> Vec<usize>
    {
        let cutoff = self.cutoff();
        self.width.iter().zip(dx).map(|(&w, &dx)| (cutoff * w / dx).ceil() as usize).collect()
    }

    fn evaluate(&self, geometry: &GridGeometry, x: &[f64], derivatives: &mut [f64]) -> f64
    {
        let dimension = self.center.len();
        let mut scaled = [0.0; MAX_DIMENSION];
        let mut r2 = 0.0;
        for (k, axis) in geometry.axes().iter().enumerate().take(dimension)
        {
            let d = axis.difference(self.center[k], x[k]);
            scaled[k] = d / self.width[k];
            r2 += scaled[k] * scaled[k];
        }
        derivatives.fill(0.0);
        match self.shape
        {
            KernelShape::Gaussian =>
            {
                if 0.5 * r2 >= DP2CUTOFF
                {
                    return 0.0;
                }
                let value = self.height * (-0.5 * r2).exp();
                for (k, der) in derivatives.iter_mut().enumerate()
                {
                    *der = -value * scaled[k] / self.width[k];
                }
                value
            }
            KernelShape::Triangular =>
            {
                let r = r2.sqrt();
                if r >= 1.0
                {
                    return 0.0;
                }
                if r > 0.0
                {
                    for (k, der) in derivatives.iter_mut().enumerate()
                    {
                        *der = -self.height * scaled[k] / (self.width[k] * r);
                    }
                }
                self.height * (1.0 - r)
            }
            KernelShape::Uniform =>
            {
                if r2 >= 1.0
                {
                    return 0.0;
                }
                self.height
            }
        }
    }
}

///
/// Add `kernel` to every lattice point of its support window around the cell that
/// contains its center. Only the window is visited.
///
pub fn deposit<S: GridStorage, K: Kernel + ?Sized>(geometry: &GridGeometry, storage: &mut S, kernel: &K, derivatives: bool) -> Result<(), GridError>
{
    let dimension = geometry.dimension();
    let center = kernel.center();
    if center.len() != dimension
    {
        return Err(GridError::DimensionMismatch);
    }
    let indices = geometry.indices_of_point(center)?;
    let radius = kernel.support(&geometry.dx());
    let window = geometry.neighbors(&indices, &radius)?;
    let mut x = [0.0; MAX_DIMENSION];
    let mut der = [0.0; MAX_DIMENSION];
    let der = if derivatives { &mut der[..dimension] } else { &mut der[..0] };
    let mut touched = 0;
    for &index in &window
    {
        geometry.point_into(index, &mut x[..dimension]);
        let value = kernel.evaluate(geometry, &x[..dimension], der);
        if value == 0.0 && der.iter().all(|&d| d == 0.0)
        {
            continue;
        }
        storage.add_value(index, value);
        if derivatives
        {
            storage.add_derivatives(index, der);
        }
        touched += 1;
    }
    log::debug!("deposited kernel at {center:?} over a window of {} cells ({touched} non-zero)", window.len());
    Ok(())
}
