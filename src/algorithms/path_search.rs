use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::errors::GridError;
use crate::storage::geometry::GridGeometry;
use crate::storage::GridStorage;

/// Heap entry: a cell and the best bottleneck known for reaching it.
#[derive(Clone, Copy, Debug)]
struct Frontier
{
    bottleneck: f64,
    cell: usize,
}

impl PartialEq for Frontier
{
    fn eq(&self, other: &Self) -> bool
    {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl Ord for Frontier
{
    fn cmp(&self, other: &Self) -> Ordering
    {
        // BinaryHeap is a max-heap, which is the order we want
        self.bottleneck.total_cmp(&other.bottleneck).then_with(|| other.cell.cmp(&self.cell))
    }
}

impl PartialOrd for Frontier
{
    fn partial_cmp(&self, other: &Self) -> Option<Ordering>
    {
        Some(self.cmp(other))
    }
}

///
/// Widest-path search over the lattice graph (cells joined to their nearest neighbours).
/// Returns the largest `m` such that some path from `source` to `sink` only visits
/// cells with value `>= m`, source and sink included. Cells for which `excluded`
/// holds are never entered.
///
pub fn maximal_path_minimum<S: GridStorage, F: Fn(usize) -> bool>(geometry: &GridGeometry, storage: &S, source: usize, sink: usize, excluded: F) -> Result<f64, GridError>
{
    geometry.check_index(source)?;
    geometry.check_index(sink)?;
    if excluded(source) || excluded(sink)
    {
        return Err(GridError::Unreachable);
    }
    if source == sink
    {
        return Ok(storage.value(source));
    }
    let mut best = vec![f64::NEG_INFINITY; geometry.size()];
    let mut settled = vec![false; geometry.size()];
    let mut heap = BinaryHeap::new();
    best[source] = storage.value(source);
    heap.push(Frontier { bottleneck: best[source], cell: source });
    let mut visited = 0usize;
    while let Some(Frontier { bottleneck, cell }) = heap.pop()
    {
        if settled[cell]
        {
            continue;
        }
        settled[cell] = true;
        visited += 1;
        if cell == sink
        {
            log::debug!("maximal path minimum {bottleneck} found after settling {visited} cells");
            return Ok(bottleneck);
        }
        for neighbor in geometry.nearest_neighbors(cell)
        {
            if settled[neighbor] || excluded(neighbor)
            {
                continue;
            }
            let candidate = bottleneck.min(storage.value(neighbor));
            if candidate > best[neighbor]
            {
                best[neighbor] = candidate;
                heap.push(Frontier { bottleneck: candidate, cell: neighbor });
            }
        }
    }
    log::debug!("sink {sink} unreachable from {source} after settling {visited} cells");
    Err(GridError::Unreachable)
}

#[cfg(test)]
mod tests
{
    use crate::errors::GridError;
    use crate::grids::grid::{DenseGrid, SparseGrid};
    use crate::grids::options::{AxisOptions, GridOptions};
    use crate::storage::geometry::Point;

    #[test]
    fn check_one_dimensional_bottleneck()
    {
        let options = GridOptions::new("f", vec![AxisOptions::new("x", "0", "4", 4)]);
        let mut grid = DenseGrid::new(&options).unwrap();
        for (i, v) in [1.0, 5.0, 2.0, 9.0, 1.0].into_iter().enumerate()
        {
            grid.set_value(i, v).unwrap();
        }
        assert_eq!(grid.find_maximal_path_minimum(0usize, 4usize).unwrap(), 1.0);
        assert_eq!(grid.find_maximal_path_minimum(1usize, 3usize).unwrap(), 2.0);
        assert_eq!(grid.find_maximal_path_minimum(Point(&[3.2]), Point(&[3.0])).unwrap(), 9.0);
    }

    fn ridge() -> DenseGrid
    {
        // two plateaus at 8 separated by a wall at column 3 with one pass of height 5
        let options = GridOptions::new("f", vec![AxisOptions::new("row", "0", "5", 5), AxisOptions::new("col", "0", "6", 6)]);
        let mut grid = DenseGrid::new(&options).unwrap();
        for row in 0..6usize
        {
            for col in 0..7usize
            {
                let value = match (row, col)
                {
                    (4, 3) => 5.0,
                    (_, 3) => 0.5,
                    _ => 8.0,
                };
                grid.set_value([row, col], value).unwrap();
            }
        }
        grid
    }

    #[test]
    fn check_saddle_is_bottleneck()
    {
        let grid = ridge();
        assert_eq!(grid.find_maximal_path_minimum([0usize, 0], [5usize, 6]).unwrap(), 5.0);
        // same side of the wall
        assert_eq!(grid.find_maximal_path_minimum([0usize, 0], [5usize, 2]).unwrap(), 8.0);
        // source equals sink
        assert_eq!(grid.find_maximal_path_minimum([4usize, 3], [4usize, 3]).unwrap(), 5.0);
    }

    #[test]
    fn check_excluded_wall_is_unreachable()
    {
        let grid = ridge();
        let wall = |index: usize| index % 7 == 3;
        assert_eq!(grid.find_maximal_path_minimum_excluding([0usize, 0], [5usize, 6], wall), Err(GridError::Unreachable));
        let pass = grid.geometry().index_of(&[4, 3]).unwrap();
        let wall_but_pass = |index: usize| index % 7 == 3 && index != pass;
        assert_eq!(grid.find_maximal_path_minimum_excluding([0usize, 0], [5usize, 6], wall_but_pass).unwrap(), 5.0);
    }

    #[test]
    fn check_sparse_implicit_zeros()
    {
        let options = GridOptions::new("f", vec![AxisOptions::periodic("phi", "-pi", "pi", 6)]);
        let mut grid = SparseGrid::new(&options).unwrap();
        for i in [0usize, 1, 2, 4, 5]
        {
            grid.set_value(i, 3.0).unwrap();
        }
        // the way through cell 3 reads zero, the periodic way round does not
        assert_eq!(grid.find_maximal_path_minimum(2usize, 4usize).unwrap(), 3.0);
    }
}
