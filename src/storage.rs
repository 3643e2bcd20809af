pub mod dense;
pub mod geometry;
pub mod sparse;

///
/// Cell storage behind a grid. Indices handed to these methods have already been
/// validated against the geometry, and derivative slices have length `dimension`.
///
pub trait GridStorage
{
    /// Storage for a lattice of `max_size` cells with `dimension` derivatives per cell (if enabled).
    fn with_capacity(max_size: usize, dimension: usize, derivatives: bool) -> Self where Self: Sized;

    /// Number of populated cells.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool
    {
        self.len() == 0
    }

    fn value(&self, index: usize) -> f64;

    /// Copy the derivatives of cell `index` into `out` (zeros if none are stored).
    fn derivatives_into(&self, index: usize, out: &mut [f64]);

    fn set_value(&mut self, index: usize, value: f64);

    fn set_derivatives(&mut self, index: usize, derivatives: &[f64]);

    fn add_value(&mut self, index: usize, value: f64);

    fn add_derivatives(&mut self, index: usize, derivatives: &[f64]);

    /// Reset every cell to zero.
    fn clear(&mut self);

    /// Whether the stored buffers have the shape of a lattice of `max_size` cells.
    fn fits(&self, max_size: usize, dimension: usize, derivatives: bool) -> bool;

    /// Populated cell indices in increasing order.
    fn populated(&self) -> Vec<usize>;

    /// Visit every populated cell with its value and derivatives (empty if none stored).
    fn for_each_cell_mut(&mut self, f: &mut dyn FnMut(usize, &mut f64, &mut [f64]));

    ///
    /// Contiguous value and derivative buffers, if the storage has them. Only such
    /// storage takes part in collective reductions.
    ///
    fn flat_buffers_mut(&mut self) -> Option<(&mut [f64], &mut [f64])>
    {
        None
    }
}
