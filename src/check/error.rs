use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// Selects which classes of non-fatal finding [`crate::check::check_object`]
    /// reports. Unlike [`crate::error::Error`], these never abort a decode —
    /// a tree can fully round-trip through [`crate::wire`] and still fail
    /// every check here.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CheckFlags: u32 {
        /// Structural conventions a well-formed `GwyContainer` tree is
        /// expected to follow (identifier-shaped type names, non-empty
        /// item names) but that the wire format itself does not enforce.
        const VALIDITY = 0b01;
        /// Content that decodes fine and follows convention, but is
        /// likely to confuse a reader or a downstream consumer (non-finite
        /// doubles, non-UTF-8 text fields).
        const WARNING = 0b10;
    }
}

impl Default for CheckFlags {
    fn default() -> Self {
        CheckFlags::VALIDITY | CheckFlags::WARNING
    }
}

/// Which [`CheckFlags`] bit a given [`CheckError`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckDomain {
    Validity,
    Warning,
}

impl CheckDomain {
    fn flag(self) -> CheckFlags {
        match self {
            CheckDomain::Validity => CheckFlags::VALIDITY,
            CheckDomain::Warning => CheckFlags::WARNING,
        }
    }
}

/// One specific finding code, independent of severity wording so callers
/// can match on it without parsing `message`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckCode {
    /// An item name is not valid UTF-8.
    InvalidUtf8Name,
    /// An object's name is not valid UTF-8.
    InvalidUtf8Type,
    /// A `string` or `string array` element is not valid UTF-8.
    InvalidUtf8String,
    /// A `double` or `double array` element is NaN or infinite.
    InvalidDouble,
    /// An object's name is not a C-like identifier
    /// (`[A-Za-z][A-Za-z0-9_]*`), the convention `GwyContainer`-style type
    /// names follow. Discouraged, not strictly illegal.
    TypeIdentifier,
    /// An item name is the empty string. Discouraged, not strictly illegal.
    EmptyName,
}

impl CheckCode {
    pub fn domain(self) -> CheckDomain {
        match self {
            CheckCode::InvalidUtf8Name
            | CheckCode::InvalidUtf8Type
            | CheckCode::InvalidUtf8String
            | CheckCode::InvalidDouble => CheckDomain::Validity,
            CheckCode::TypeIdentifier | CheckCode::EmptyName => CheckDomain::Warning,
        }
    }
}

/// One non-fatal finding from [`crate::check::check_object`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckError {
    pub domain: CheckDomain,
    pub code: CheckCode,
    /// `/`-separated location of the offending node, with `/`, ` ` and `\`
    /// in names escaped as `\/`, `\ ` and `\\`.
    pub path: Vec<u8>,
    pub message: String,
}

impl CheckError {
    pub(crate) fn new(code: CheckCode, path: Vec<u8>, message: impl Into<String>) -> CheckError {
        CheckError {
            domain: code.domain(),
            code,
            path,
            message: message.into(),
        }
    }

    pub(crate) fn is_selected(&self, flags: CheckFlags) -> bool {
        flags.contains(self.domain.flag())
    }
}

impl fmt::Display for CheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            String::from_utf8_lossy(&self.path),
            self.message
        )
    }
}

impl std::error::Error for CheckError {}
