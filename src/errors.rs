use std::fmt::Display;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum GridError
{
    /// Point lies outside the bounds of a non-periodic axis.
    OutOfDomain,
    /// Index tuple component or flat index beyond the lattice.
    IndexOutOfRange,
    DimensionMismatch,
    DerivativeSizeMismatch,
    /// Derivative access on a grid built without derivative support.
    NoDerivatives,
    InvalidGeometry,
    SizeOverflow,
    UnknownAxis,
    /// No lattice path joins source and sink.
    Unreachable,
    NotReducible,
    CommunicationFailed,
    MissingHeader,
    FieldCountMismatch,
    ParseFailed,
    GeometryMismatch,
    CellCountMismatch,
    LZ4DecompressionFailed,
    ReadBufferFailed,
    WriteBufferFailed,
    SerializationFailed,
    DeserializationFailed,
    FileIOError,
}
impl std::error::Error for GridError {}

impl Display for GridError
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", *self)
    }
}
