use std::{error, fmt, io};

/// Result alias used throughout the crate for fallible, fatal operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The domain a fatal [`Error`] belongs to, mirroring the format's own
/// error taxonomy (`SYSTEM` / `DATA`; `VALIDITY` and `WARNING` are reported
/// separately by [`crate::check::check_object`], see [`crate::check::CheckError`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    System,
    Data,
}

/// Top-level error type for every fallible core operation.
#[derive(Debug)]
pub enum Error {
    /// The underlying stream or filesystem failed (`SYSTEM` domain).
    Io(io::Error),
    /// The byte stream does not conform to the GWY wire format (`DATA` domain).
    Data(DataError),
}

impl Error {
    pub fn domain(&self) -> Domain {
        match self {
            Error::Io(_) => Domain::System,
            Error::Data(_) => Domain::Data,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => err.fmt(f),
            Error::Data(err) => err.fmt(f),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Io(err) => err.source(),
            Error::Data(err) => err.source(),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<DataError> for Error {
    fn from(err: DataError) -> Error {
        Error::Data(err)
    }
}

/// One variant per fatal decode/encode failure code (`DATA` domain).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataError {
    /// The 4-byte `"GWYP"` magic header was missing or wrong.
    Magic,
    /// An item's type tag byte was not one of the 13 recognized types.
    ItemType(u8),
    /// A child would overrun the byte budget inherited from its parent,
    /// or the stream ended inside a component.
    Confinement,
    /// An array item declared a length of zero.
    ArraySize,
    /// Two items in the same object share a name.
    DuplicateName(Vec<u8>),
    /// A string exceeded the `0x8000_0000` byte hard cap.
    LongString,
    /// An object's payload would exceed `0xFFFFFFFF` bytes, too large for
    /// the 32-bit length prefix.
    ObjectSize,
    /// Nesting depth exceeded the configured `max_depth`.
    TooDeepNesting,
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataError::Magic => write!(f, "bad magic header, expected \"GWYP\""),
            DataError::ItemType(tag) => {
                write!(f, "unrecognized item type tag: {:?}", *tag as char)
            }
            DataError::Confinement => write!(f, "component overruns its parent's declared size"),
            DataError::ArraySize => write!(f, "array item has a declared length of zero"),
            DataError::DuplicateName(name) => {
                write!(f, "duplicate item name: {}", String::from_utf8_lossy(name))
            }
            DataError::LongString => write!(f, "string exceeds the maximum permitted length"),
            DataError::ObjectSize => write!(f, "object payload exceeds 0xFFFFFFFF bytes"),
            DataError::TooDeepNesting => write!(f, "object/item nesting exceeds the depth limit"),
        }
    }
}

impl error::Error for DataError {}
