use std::io::{BufRead, BufReader, BufWriter, Write};

use indexmap::IndexMap;

use crate::errors::GridError;
use crate::grids::grid::Grid;
use crate::grids::options::ReadOptions;
use crate::storage::geometry::{Axis, GridGeometry};
use crate::storage::GridStorage;

///
/// Header of a text grid file: the `FIELDS` line and every `SET` key in file order.
///
#[derive(Debug, Default)]
struct Header
{
    fields: Vec<String>,
    set: IndexMap<String, String>,
}

impl Header
{
    fn parse_line(&mut self, line: &str) -> Result<(), GridError>
    {
        let mut tokens = line.trim_start_matches("#!").split_whitespace();
        match tokens.next()
        {
            Some("FIELDS") => self.fields = tokens.map(str::to_owned).collect(),
            Some("SET") =>
            {
                let key = tokens.next().ok_or(GridError::MissingHeader)?;
                let value = tokens.collect::<Vec<_>>().join(" ");
                self.set.insert(key.to_owned(), value);
            }
            _ => {}
        }
        Ok(())
    }

    fn get(&self, key: &str) -> Result<&str, GridError>
    {
        self.set.get(key).map(String::as_str).ok_or_else(||
        {
            log::warn!("grid file is missing header {key}");
            GridError::MissingHeader
        })
    }

    ///
    /// Axes are the leading fields that carry a `min_` entry; the next field names the
    /// function and any remaining ones must be one derivative per axis.
    ///
    fn geometry(&self) -> Result<(String, GridGeometry, bool), GridError>
    {
        if self.fields.is_empty()
        {
            log::warn!("grid file has no FIELDS line");
            return Err(GridError::MissingHeader);
        }
        let dimension = self.fields.iter().take_while(|name| self.set.contains_key(&format!("min_{name}"))).count();
        if dimension == 0 || dimension >= self.fields.len()
        {
            return Err(GridError::MissingHeader);
        }
        let derivatives = match self.fields.len() - dimension - 1
        {
            0 => false,
            n if n == dimension => true,
            _ => return Err(GridError::FieldCountMismatch),
        };
        let mut axes = Vec::with_capacity(dimension);
        for name in &self.fields[..dimension]
        {
            let nbin = self.get(&format!("nbins_{name}"))?.parse::<usize>().map_err(|_| GridError::ParseFailed)?;
            let periodic = match self.get(&format!("periodic_{name}"))?
            {
                "true" => true,
                "false" => false,
                _ => return Err(GridError::ParseFailed),
            };
            axes.push(Axis::new(name, self.get(&format!("min_{name}"))?, self.get(&format!("max_{name}"))?, nbin, periodic)?);
        }
        Ok((self.fields[dimension].clone(), GridGeometry::new(axes)?, derivatives))
    }
}

impl<S: GridStorage> Grid<S>
{
    ///
    /// Write the grid as text: a `#!` header followed by one line per cell holding the
    /// coordinates, the value and (if stored) the derivatives. A blank line precedes
    /// every line on which the fastest axis starts over.
    ///
    pub fn write_to<W: Write>(&self, writer: W) -> Result<(), GridError>
    {
        let mut out = BufWriter::new(writer);
        let dimension = self.dimension();
        let names = self.arg_names();
        let mut fields = names.join(" ") + " " + &self.function_name;
        if self.derivatives
        {
            for name in &names
            {
                fields += &format!(" der_{name}");
            }
        }
        let cells = self.storage.populated();
        let mut header = format!("#! FIELDS {fields}\n");
        for axis in self.geometry.axes()
        {
            let name = axis.name();
            header += &format!("#! SET min_{name} {}\n#! SET max_{name} {}\n", axis.str_min(), axis.str_max());
            header += &format!("#! SET nbins_{name} {}\n#! SET periodic_{name} {}\n", axis.nbin(), axis.is_periodic());
        }
        header += &format!("#! SET ncells {}\n", cells.len());
        out.write_all(header.as_bytes()).map_err(|_| GridError::WriteBufferFailed)?;

        let (width, precision) = (self.format.width, self.format.precision);
        let mut indices = vec![0; dimension];
        let mut x = vec![0.0; dimension];
        let mut derivatives = vec![0.0; if self.derivatives { dimension } else { 0 }];
        let mut line = String::new();
        for (n, &index) in cells.iter().enumerate()
        {
            self.geometry.indices_into(index, &mut indices);
            line.clear();
            if n > 0 && dimension > 1 && indices[dimension - 1] == 0
            {
                line.push('\n');
            }
            self.geometry.point_into(index, &mut x);
            self.storage.derivatives_into(index, &mut derivatives);
            let value = self.storage.value(index);
            for v in x.iter().chain(std::iter::once(&value)).chain(derivatives.iter())
            {
                line += &format!(" {v:>width$.precision$}");
            }
            line.push('\n');
            out.write_all(line.as_bytes()).map_err(|_| GridError::WriteBufferFailed)?;
        }
        out.flush().map_err(|_| GridError::WriteBufferFailed)?;
        log::debug!("wrote {} cells of grid {}", cells.len(), self.function_name);
        Ok(())
    }

    pub fn write_file(&self, path: &str) -> Result<(), GridError>
    {
        let file = std::fs::File::create(path).map_err(|_| GridError::FileIOError)?;
        self.write_to(file)
    }

    ///
    /// Read a grid written by [`Self::write_to`]. Each data line is assigned to the
    /// lattice point nearest to its coordinates.
    ///
    pub fn read_from<R: BufRead>(reader: R, options: &ReadOptions) -> Result<Self, GridError>
    {
        let mut header = Header::default();
        let mut grid: Option<Self> = None;
        let mut lines_read = 0usize;
        let mut values = Vec::new();
        for line in reader.lines()
        {
            let line = line.map_err(|_| GridError::ReadBufferFailed)?;
            let trimmed = line.trim();
            if trimmed.is_empty()
            {
                continue;
            }
            if trimmed.starts_with("#!")
            {
                if grid.is_some()
                {
                    // a header after data starts another block, which this reader does not handle
                    break;
                }
                header.parse_line(trimmed)?;
                continue;
            }
            if trimmed.starts_with('#')
            {
                continue;
            }
            if grid.is_none()
            {
                grid = Some(Self::from_header(&header, options)?);
            }
            let Some(grid) = grid.as_mut() else { continue };
            values.clear();
            for token in trimmed.split_whitespace()
            {
                values.push(token.parse::<f64>().map_err(|_| GridError::ParseFailed)?);
            }
            grid.set_from_line(&values)?;
            lines_read += 1;
        }
        let grid = match grid
        {
            Some(grid) => grid,
            // a file without data lines still describes a valid, empty grid
            None => Self::from_header(&header, options)?,
        };
        if let Some(ncells) = header.set.get("ncells")
        {
            let ncells = ncells.parse::<usize>().map_err(|_| GridError::ParseFailed)?;
            if ncells != lines_read
            {
                log::warn!("grid file declares {ncells} cells but holds {lines_read}");
                return Err(GridError::CellCountMismatch);
            }
        }
        log::debug!("read {lines_read} cells into grid {}", grid.function_name);
        Ok(grid)
    }

    pub fn read_file(path: &str, options: &ReadOptions) -> Result<Self, GridError>
    {
        let file = std::fs::File::open(path).map_err(|_| GridError::FileIOError)?;
        Self::read_from(BufReader::new(file), options)
    }

    fn from_header(header: &Header, options: &ReadOptions) -> Result<Self, GridError>
    {
        let (function_name, geometry, derivatives) = header.geometry()?;
        if let Some(expected) = &options.expected
        {
            if !expected.matches(&geometry)
            {
                log::warn!("grid file geometry does not match the expected geometry for {function_name}");
                return Err(GridError::GeometryMismatch);
            }
        }
        Self::from_geometry(&function_name, geometry, options.spline, derivatives)
    }

    fn set_from_line(&mut self, values: &[f64]) -> Result<(), GridError>
    {
        let dimension = self.dimension();
        let expected = dimension + 1 + if self.derivatives { dimension } else { 0 };
        if values.len() != expected
        {
            log::warn!("grid file line has {} fields, expected {expected}", values.len());
            return Err(GridError::FieldCountMismatch);
        }
        let index = self.geometry.nearest_index_of_point(&values[..dimension])?;
        self.storage.set_value(index, values[dimension]);
        if self.derivatives
        {
            self.storage.set_derivatives(index, &values[dimension + 1..]);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests
{
    use crate::errors::GridError;
    use crate::grids::grid::{DenseGrid, SparseGrid};
    use crate::grids::options::{AxisOptions, ExpectedGeometry, GridOptions, ReadOptions};

    fn filled_grid() -> DenseGrid
    {
        let options = GridOptions::new("file.bias", vec![
            AxisOptions::new("d1", "0.5", "2.0", 3),
            AxisOptions::periodic("phi", "-pi", "pi", 4),
        ]).with_derivatives(true);
        let mut grid = DenseGrid::new(&options).unwrap();
        for i in 0..grid.max_size()
        {
            let x = grid.geometry().point_of(i);
            grid.set_value_and_derivatives(i, x[0] * x[1].cos(), &[x[1].cos(), -x[0] * x[1].sin()]).unwrap();
        }
        grid
    }

    fn write(grid: &DenseGrid) -> String
    {
        let mut buffer = Vec::new();
        grid.write_to(&mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn check_header_and_layout()
    {
        let text = write(&filled_grid());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "#! FIELDS d1 phi file.bias der_d1 der_phi");
        assert_eq!(lines[1], "#! SET min_d1 0.5");
        assert_eq!(lines[2], "#! SET max_d1 2.0");
        assert_eq!(lines[3], "#! SET nbins_d1 3");
        assert_eq!(lines[4], "#! SET periodic_d1 false");
        assert_eq!(lines[5], "#! SET min_phi -pi");
        assert_eq!(lines[8], "#! SET periodic_phi true");
        assert_eq!(lines[9], "#! SET ncells 16");
        assert_eq!(&lines[10][..30], "    0.500000000   -3.141592654");
        // 4 blocks of 4 lines separated by 3 blank lines
        assert_eq!(lines.len(), 10 + 16 + 3);
        assert_eq!(lines[14], "");
    }

    #[test]
    fn check_text_round_trip()
    {
        let grid = filled_grid();
        let read = DenseGrid::read_from(write(&grid).as_bytes(), &ReadOptions::default()).unwrap();
        assert_eq!(read.geometry(), grid.geometry());
        assert_eq!(read.function_name(), "file.bias");
        assert!(read.has_derivatives());
        for i in 0..grid.max_size()
        {
            let (value, derivatives) = grid.value_and_derivatives(i).unwrap();
            let (read_value, read_derivatives) = read.value_and_derivatives(i).unwrap();
            assert!((value - read_value).abs() < 1e-8);
            for (a, b) in derivatives.iter().zip(&read_derivatives)
            {
                assert!((a - b).abs() < 1e-8);
            }
        }
    }

    #[test]
    fn check_sparse_writes_populated_cells()
    {
        let options = GridOptions::new("s", vec![AxisOptions::new("a", "0", "1", 10), AxisOptions::new("b", "0", "1", 10)]);
        let mut grid = SparseGrid::new(&options).unwrap();
        grid.set_value([3usize, 4], 1.5).unwrap();
        grid.set_value([7usize, 0], -2.0).unwrap();
        let mut buffer = Vec::new();
        grid.write_to(&mut buffer).unwrap();
        let read = SparseGrid::read_from(buffer.as_slice(), &ReadOptions::default()).unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read.value([3usize, 4]).unwrap(), 1.5);
        assert_eq!(read.value([7usize, 0]).unwrap(), -2.0);
    }

    #[test]
    fn check_read_errors()
    {
        let text = write(&filled_grid());
        let expected = ExpectedGeometry { min: vec!["0.5".into(), "-pi".into()], max: vec!["2.0".into(), "pi".into()], nbin: vec![3, 4], periodic: vec![false, true] };
        let options = ReadOptions { spline: true, expected: Some(expected.clone()) };
        assert!(DenseGrid::read_from(text.as_bytes(), &options).unwrap().uses_spline());
        let wrong = ReadOptions { expected: Some(ExpectedGeometry { nbin: vec![3, 5], ..expected }), ..Default::default() };
        assert_eq!(DenseGrid::read_from(text.as_bytes(), &wrong).err(), Some(GridError::GeometryMismatch));

        let no_nbins: String = text.lines().filter(|l| !l.contains("nbins_phi")).map(|l| format!("{l}\n")).collect();
        assert_eq!(DenseGrid::read_from(no_nbins.as_bytes(), &ReadOptions::default()).err(), Some(GridError::MissingHeader));

        let short_line = text.replacen("   -3.141592654", "", 1);
        assert_eq!(DenseGrid::read_from(short_line.as_bytes(), &ReadOptions::default()).err(), Some(GridError::FieldCountMismatch));

        let garbage = text.replacen("   -3.141592654", " abc", 1);
        assert_eq!(DenseGrid::read_from(garbage.as_bytes(), &ReadOptions::default()).err(), Some(GridError::ParseFailed));

        let miscounted = text.replace("ncells 16", "ncells 15");
        assert_eq!(DenseGrid::read_from(miscounted.as_bytes(), &ReadOptions::default()).err(), Some(GridError::CellCountMismatch));
    }
}
