use latgrid::{algorithms::{kernel::{KernelFunction, KernelShape}, projection::BiasWeight}, errors::GridError, grids::{grid::{DenseGrid, SparseGrid}, options::{AxisOptions, GridOptions, ReadOptions}}, serialization::SerializationFormat, storage::geometry::Point};

///
/// Build a two-dimensional bias by depositing Gaussians along a path, then look at it
/// the ways an analysis script would.
///
fn deposit_bias() -> Result<DenseGrid, GridError>
{
    println!("\nRunning \"deposit_bias\" example\n");
    let options = GridOptions::new("metad.bias", vec![
        AxisOptions::periodic("phi", "-pi", "pi", 60),
        AxisOptions::periodic("psi", "-pi", "pi", 60),
    ]).with_spline(true).with_derivatives(true);
    let mut grid = DenseGrid::new(&options)?;
    // two basins visited by the walker, joined by a thin channel
    for i in 0..200
    {
        let t = i as f64 / 200.0;
        let center = if i % 2 == 0 { vec![-1.5 + 0.2 * t, 2.0 - 0.3 * t] } else { vec![1.0 - 0.2 * t, -0.8 + 0.1 * t] };
        grid.add_kernel(&KernelFunction::new(center, vec![0.35, 0.35], 1.2, KernelShape::Gaussian)?)?;
    }
    for i in 0..20
    {
        let t = i as f64 / 19.0;
        grid.add_kernel(&KernelFunction::new(vec![-1.5 + 2.5 * t, 2.0 - 2.8 * t], vec![0.2, 0.2], 0.3, KernelShape::Gaussian)?)?;
    }
    println!("Bias ranges from {} to {}", grid.min_value(), grid.max_value());
    let x = [0.1, 0.3];
    let (value, derivatives) = grid.evaluate_with_derivatives(&x)?;
    println!("Bias at {x:?} is {value} with gradient {derivatives:?}");
    Ok(grid)
}

fn analyse(grid: &DenseGrid) -> Result<(), GridError>
{
    println!("\nRunning \"analyse\" example\n");
    // the bias is the negative of the free energy it has filled
    let mut fes = grid.clone();
    fes.scale_all(-1.0);
    fes.set_min_to_zero();
    // on the bias, the widest path between basins crosses the lowest free-energy barrier
    let ridge = grid.find_maximal_path_minimum(Point(&[-1.5, 2.0]), Point(&[1.0, -0.8]))?;
    println!("Lowest barrier between the basins: {}", grid.max_value() - ridge);
    let contour = fes.find_points_on_contour(0.5 * fes.max_value(), &[false, false], 50)?;
    println!("Found {} points on the half-height contour", contour.len());
    let projected = grid.project(&["phi"], &BiasWeight { beta: 1.0 / 2.494 })?;
    println!("Projected onto phi: {} points, integral {}", projected.max_size(), projected.integrate());
    Ok(())
}

fn files(grid: &DenseGrid) -> Result<(), GridError>
{
    println!("\nRunning \"files\" example\n");
    let directory = std::env::temp_dir();
    let text = directory.join("latgrid_bias.dat");
    let text = text.to_str().ok_or(GridError::FileIOError)?;
    grid.write_file(text)?;
    let sparse = SparseGrid::read_file(text, &ReadOptions { spline: true, ..Default::default() })?;
    println!("Read back {} of {} cells from {text}", sparse.len(), sparse.max_size());
    let snapshot = directory.join("latgrid_bias.bin");
    let snapshot = snapshot.to_str().ok_or(GridError::FileIOError)?;
    grid.save(snapshot, SerializationFormat::BincodeLz4)?;
    let file = std::fs::File::open(snapshot).map_err(|_| GridError::FileIOError)?;
    let restored = DenseGrid::read(file, SerializationFormat::BincodeLz4)?;
    println!("Snapshot restored identically: {}", &restored == grid);
    Ok(())
}

fn main() -> Result<(), GridError>
{
    let grid = deposit_bias()?;
    analyse(&grid)?;
    files(&grid)?;
    Ok(())
}
