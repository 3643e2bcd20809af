use std::io::{BufWriter, Write};

use crate::errors::GridError;
use crate::grids::grid::Grid;
use crate::storage::GridStorage;

impl<S: GridStorage> Grid<S>
{
    ///
    /// Dump a three-dimensional grid as a Gaussian cube file for volumetric viewers.
    /// Lengths are multiplied by `length_unit`; the origin is placed so that the box
    /// is centred on zero, and a single dummy atom is written since viewers insist on one.
    ///
    pub fn write_cube<W: Write>(&self, writer: W, length_unit: f64) -> Result<(), GridError>
    {
        if self.dimension() != 3
        {
            return Err(GridError::DimensionMismatch);
        }
        let mut out = BufWriter::new(writer);
        let axes = self.geometry.axes();
        let mut header = String::from("LATGRID CUBE FILE\nOUTER LOOP: X, MIDDLE LOOP: Y, INNER LOOP: Z\n");
        header += &format!("{} {:.6} {:.6} {:.6}\n", 1, -0.5 * length_unit * axes[0].period(), -0.5 * length_unit * axes[1].period(), -0.5 * length_unit * axes[2].period());
        for (k, axis) in axes.iter().enumerate()
        {
            let mut voxel = [0.0; 3];
            voxel[k] = length_unit * axis.dx();
            header += &format!("{} {:.6} {:.6} {:.6}\n", axis.points(), voxel[0], voxel[1], voxel[2]);
        }
        header += &format!("{} {:.6} {:.6} {:.6} {:.6}\n", 1, 0.0, 0.0, 0.0, 0.0);
        out.write_all(header.as_bytes()).map_err(|_| GridError::WriteBufferFailed)?;

        let inner = axes[2].points();
        let mut line = String::new();
        for index in 0..self.max_size()
        {
            let k = index % inner;
            line += &format!("{:.6} ", self.storage.value(index));
            if k % 6 == 5 || k + 1 == inner
            {
                line.push('\n');
                out.write_all(line.as_bytes()).map_err(|_| GridError::WriteBufferFailed)?;
                line.clear();
            }
        }
        out.flush().map_err(|_| GridError::WriteBufferFailed)?;
        log::debug!("wrote cube file for grid {}", self.function_name);
        Ok(())
    }
}
