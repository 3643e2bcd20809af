use serde::{Deserialize, Serialize};

use crate::errors::GridError;
use crate::storage::geometry::{Axis, GridGeometry};

///
/// One axis of a grid as it comes from a configuration layer. Bounds are kept as text
/// so that `pi` expressions survive a write/read cycle unchanged.
///
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisOptions
{
    pub name: String,
    pub min: String,
    pub max: String,
    pub nbin: usize,
    pub periodic: bool,
    /// Domain of a periodic argument. When set on a periodic axis it replaces `min`/`max`.
    pub period: Option<(String, String)>,
}

impl AxisOptions
{
    pub fn new(name: &str, min: &str, max: &str, nbin: usize) -> Self
    {
        Self { name: name.to_owned(), min: min.to_owned(), max: max.to_owned(), nbin, ..Default::default() }
    }

    pub fn periodic(name: &str, min: &str, max: &str, nbin: usize) -> Self
    {
        Self { periodic: true, ..Self::new(name, min, max, nbin) }
    }

    pub(crate) fn build(&self) -> Result<Axis, GridError>
    {
        match (&self.period, self.periodic)
        {
            (Some((lower, upper)), true) => Axis::new(&self.name, lower, upper, self.nbin, true),
            _ => Axis::new(&self.name, &self.min, &self.max, self.nbin, self.periodic),
        }
    }
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridOptions
{
    /// Label of the stored function, used in file headers.
    pub function_name: String,
    pub axes: Vec<AxisOptions>,
    /// Multilinear interpolation for off-lattice queries.
    pub spline: bool,
    /// Store `dimension` partial derivatives per cell.
    pub derivatives: bool,
}

impl GridOptions
{
    pub fn new(function_name: &str, axes: Vec<AxisOptions>) -> Self
    {
        Self { function_name: function_name.to_owned(), axes, ..Default::default() }
    }

    pub fn with_spline(mut self, spline: bool) -> Self
    {
        self.spline = spline;
        self
    }

    pub fn with_derivatives(mut self, derivatives: bool) -> Self
    {
        self.derivatives = derivatives;
        self
    }

    pub(crate) fn geometry(&self) -> Result<GridGeometry, GridError>
    {
        let axes = self.axes.iter().map(AxisOptions::build).collect::<Result<Vec<_>, _>>()?;
        GridGeometry::new(axes)
    }
}

///
/// Numeric format of the text grid file: every number is written right aligned
/// in `width` characters with `precision` decimals.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFormat
{
    pub width: usize,
    pub precision: usize,
}

impl Default for OutputFormat
{
    fn default() -> Self
    {
        Self { width: 14, precision: 9 }
    }
}

/// Geometry a text file must match to be accepted.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedGeometry
{
    pub min: Vec<String>,
    pub max: Vec<String>,
    pub nbin: Vec<usize>,
    pub periodic: Vec<bool>,
}

impl ExpectedGeometry
{
    pub(crate) fn matches(&self, geometry: &GridGeometry) -> bool
    {
        let axes = geometry.axes();
        if self.min.len() != axes.len() || self.max.len() != axes.len() || self.nbin.len() != axes.len() || self.periodic.len() != axes.len()
        {
            return false;
        }
        axes.iter().enumerate().all(|(k, axis)|
        {
            let same_bound = |text: &str, value: f64| crate::storage::geometry::parse_bound(text).map(|v| (v - value).abs() <= 1e-12 * value.abs().max(1.0)).unwrap_or(false);
            same_bound(&self.min[k], axis.min()) && same_bound(&self.max[k], axis.max()) && self.nbin[k] == axis.nbin() && self.periodic[k] == axis.is_periodic()
        })
    }
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadOptions
{
    /// Interpolation flag of the grid being read.
    pub spline: bool,
    /// Reject files whose declared geometry differs from this.
    pub expected: Option<ExpectedGeometry>,
}
