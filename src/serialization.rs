/// Serialization format options for grid snapshots.
///
/// Each format has both compressed (Lz4) and uncompressed variants.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SerializationFormat {
    /// JSON format - human readable, larger size
    Json,
    /// JSON format with LZ4 compression
    JsonLz4,
    /// Bincode format - compact binary
    Bincode,
    /// Bincode format with LZ4 compression (default)
    #[default]
    BincodeLz4,
}

impl SerializationFormat {
    /// Returns true if this format uses LZ4 compression
    pub fn is_compressed(&self) -> bool {
        matches!(self, SerializationFormat::JsonLz4 | SerializationFormat::BincodeLz4)
    }
}

use std::io::Write;

use crate::algorithms::interpolation::MAX_SPLINE_DIMENSION;
use crate::errors::GridError;
use crate::grids::grid::Grid;
use crate::storage::geometry::{Axis, GridGeometry};
use crate::storage::GridStorage;
use serde::{de::DeserializeOwned, Serialize};

fn serialize_serde<T: Serialize>(data: &T, format: SerializationFormat) -> Result<Vec<u8>, GridError> {
    match format {
        SerializationFormat::Json | SerializationFormat::JsonLz4 => {
            serde_json::to_vec(data).map_err(|_| GridError::SerializationFailed)
        }
        SerializationFormat::Bincode | SerializationFormat::BincodeLz4 => {
            bincode::serde::encode_to_vec(data, bincode::config::standard()).map_err(|_| GridError::SerializationFailed)
        }
    }
}

fn deserialize_serde<T: DeserializeOwned>(data: &[u8], format: SerializationFormat) -> Result<T, GridError> {
    match format {
        SerializationFormat::Json | SerializationFormat::JsonLz4 => {
            serde_json::from_slice(data).map_err(|_| GridError::DeserializationFailed)
        }
        SerializationFormat::Bincode | SerializationFormat::BincodeLz4 => {
            bincode::serde::decode_from_slice(data, bincode::config::standard())
                .map(|(value, _)| value)
                .map_err(|_| GridError::DeserializationFailed)
        }
    }
}

/// Serialize data to bytes using the specified format.
/// Applies LZ4 compression if the format variant ends with Lz4.
pub fn serialize<T: Serialize>(data: &T, format: SerializationFormat) -> Result<Vec<u8>, GridError> {
    let bytes = serialize_serde(data, format)?;
    if format.is_compressed() {
        Ok(lz4_flex::compress_prepend_size(&bytes))
    } else {
        Ok(bytes)
    }
}

/// Deserialize data from bytes using the specified format.
/// Applies LZ4 decompression if the format variant ends with Lz4.
pub fn deserialize<T: DeserializeOwned>(data: &[u8], format: SerializationFormat) -> Result<T, GridError> {
    if format.is_compressed() {
        let decompressed = lz4_flex::decompress_size_prepended(data)
            .map_err(|_| GridError::LZ4DecompressionFailed)?;
        deserialize_serde(&decompressed, format)
    } else {
        deserialize_serde(data, format)
    }
}

impl<S: GridStorage + Serialize + DeserializeOwned> Grid<S> {
    ///
    /// Write a full snapshot of the grid (geometry, flags and every stored cell).
    ///
    pub fn save(&self, path: &str, format: SerializationFormat) -> Result<(), GridError> {
        let mut file = std::io::BufWriter::new(std::fs::File::create(path).map_err(|_| GridError::FileIOError)?);
        let buffer = serialize(self, format)?;
        file.write_all(&buffer).map_err(|_| GridError::WriteBufferFailed)?;
        file.flush().map_err(|_| GridError::WriteBufferFailed)?;
        log::debug!("saved grid {} to {path} ({} bytes)", self.function_name, buffer.len());
        Ok(())
    }

    /// Read a snapshot written by [`Grid::save`].
    pub fn read<Reader: std::io::Read>(mut reader: Reader, format: SerializationFormat) -> Result<Self, GridError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).map_err(|_| GridError::ReadBufferFailed)?;
        Self::read_buffer(&bytes, format)
    }

    ///
    /// Read a snapshot from memory. The geometry is rebuilt from its axes and the
    /// storage must have the shape of that geometry.
    ///
    pub fn read_buffer(buffer: &[u8], format: SerializationFormat) -> Result<Self, GridError> {
        let grid: Self = deserialize(buffer, format)?;
        grid.check_snapshot()?;
        Ok(grid)
    }

    fn check_snapshot(&self) -> Result<(), GridError> {
        let axes = self.geometry.axes().iter()
            .map(|axis| Axis::new(axis.name(), axis.str_min(), axis.str_max(), axis.nbin(), axis.is_periodic()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| GridError::DeserializationFailed)?;
        let geometry = GridGeometry::new(axes).map_err(|_| GridError::DeserializationFailed)?;
        if geometry != self.geometry
            || (self.spline && geometry.dimension() > MAX_SPLINE_DIMENSION)
            || !self.storage.fits(geometry.size(), geometry.dimension(), self.derivatives) {
            log::warn!("snapshot of grid {} is inconsistent with its geometry", self.function_name);
            return Err(GridError::DeserializationFailed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grids::grid::{DenseGrid, SparseGrid};
    use crate::grids::options::{AxisOptions, GridOptions};

    #[derive(serde::Serialize, serde::Deserialize, Debug, PartialEq)]
    struct TestData {
        values: Vec<f64>,
        name: String,
    }

    #[test]
    fn test_json_roundtrip() {
        let data = TestData {
            values: vec![1.0, 2.0, 3.0],
            name: "test".to_string(),
        };

        let bytes = serialize(&data, SerializationFormat::Json).unwrap();
        let result: TestData = deserialize(&bytes, SerializationFormat::Json).unwrap();
        assert_eq!(data, result);
    }

    #[test]
    fn test_bincode_lz4_roundtrip() {
        let data = TestData {
            values: vec![1.0, 2.0, 3.0, 4.0, 5.0],
            name: "compressed_test".to_string(),
        };

        let bytes = serialize(&data, SerializationFormat::BincodeLz4).unwrap();
        let result: TestData = deserialize(&bytes, SerializationFormat::BincodeLz4).unwrap();
        assert_eq!(data, result);
        assert_eq!(deserialize::<TestData>(&bytes[..4], SerializationFormat::BincodeLz4).err(), Some(GridError::LZ4DecompressionFailed));
    }

    fn options() -> GridOptions {
        GridOptions::new("bias", vec![AxisOptions::periodic("phi", "-pi", "pi", 16), AxisOptions::new("psi", "-1", "1", 5)])
            .with_spline(true)
            .with_derivatives(true)
    }

    #[test]
    fn test_dense_grid_snapshot() {
        let mut grid = DenseGrid::new(&options()).unwrap();
        for i in 0..grid.max_size() {
            grid.set_value_and_derivatives(i, i as f64 * 0.25, &[1.0, -(i as f64)]).unwrap();
        }
        for format in [SerializationFormat::Json, SerializationFormat::JsonLz4, SerializationFormat::Bincode, SerializationFormat::BincodeLz4] {
            let bytes = serialize(&grid, format).unwrap();
            let read = DenseGrid::read_buffer(&bytes, format).unwrap();
            assert_eq!(read, grid);
        }
    }

    #[test]
    fn test_sparse_grid_snapshot() {
        let mut grid = SparseGrid::new(&options()).unwrap();
        grid.add_value_and_derivatives([3usize, 2], 1.5, &[0.5, 0.25]).unwrap();
        grid.add_value([15usize, 5], -4.0).unwrap();
        let bytes = serialize(&grid, SerializationFormat::Bincode).unwrap();
        let read = SparseGrid::read(bytes.as_slice(), SerializationFormat::Bincode).unwrap();
        assert_eq!(read, grid);
        assert_eq!(read.len(), 2);
    }

    #[test]
    fn test_inconsistent_snapshots_rejected() {
        let grid = DenseGrid::new(&GridOptions::new("f", vec![AxisOptions::new("x", "0", "1", 9)])).unwrap();
        let text = String::from_utf8(serialize(&grid, SerializationFormat::Json).unwrap()).unwrap();
        let zeros = format!("\"values\":[{}]", vec!["0.0"; 10].join(","));
        assert!(text.contains(&zeros));
        let truncated = text.replace(&zeros, "\"values\":[0.0]");
        assert_eq!(DenseGrid::read_buffer(truncated.as_bytes(), SerializationFormat::Json).err(), Some(GridError::DeserializationFailed));
        let resized = text.replace("\"size\":10", "\"size\":1");
        assert_eq!(DenseGrid::read_buffer(resized.as_bytes(), SerializationFormat::Json).err(), Some(GridError::DeserializationFailed));

        let mut sparse = SparseGrid::new(&options()).unwrap();
        sparse.add_value_and_derivatives(7usize, 1.0, &[0.5, 0.5]).unwrap();
        let text = String::from_utf8(serialize(&sparse, SerializationFormat::Json).unwrap()).unwrap();
        let outside = text.replace("[[7,1.0]]", "[[96,1.0]]");
        assert_ne!(outside, text);
        assert_eq!(SparseGrid::read_buffer(outside.as_bytes(), SerializationFormat::Json).err(), Some(GridError::DeserializationFailed));
        let narrow = text.replace("[7,[0.5,0.5]]", "[7,[0.5]]");
        assert_ne!(narrow, text);
        assert_eq!(SparseGrid::read_buffer(narrow.as_bytes(), SerializationFormat::Json).err(), Some(GridError::DeserializationFailed));
    }
}
