//! Type index tables of the legacy file format

use std::fmt;

/// Format generation, told apart by the comment at the top of the file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyVersion {
    /// ReClass 2011 and 2013
    V2013,
    /// ReClass 2015 and 2016
    V2016,
}

impl LegacyVersion {
    /// Picks the version named in a header comment
    pub fn detect(comment: &str) -> Option<Self> {
        let comment = comment.to_ascii_lowercase();
        if !comment.contains("reclass") {
            return None;
        }
        if comment.contains("2011") || comment.contains("2013") {
            Some(LegacyVersion::V2013)
        } else if comment.contains("2015") || comment.contains("2016") {
            Some(LegacyVersion::V2016)
        } else {
            None
        }
    }

    pub fn table(&self) -> &'static [Option<LegacyType>] {
        match self {
            LegacyVersion::V2013 => &TYPES_2013,
            LegacyVersion::V2016 => &TYPES_2016,
        }
    }

    pub fn lookup(&self, index: u64) -> Option<LegacyType> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.table().get(i).copied().flatten())
    }
}

impl fmt::Display for LegacyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LegacyVersion::V2013 => f.write_str("ReClass 2011/2013"),
            LegacyVersion::V2016 => f.write_str("ReClass 2015/2016"),
        }
    }
}

/// Node types the legacy format can name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyType {
    ClassInstance,
    ClassPtr,
    ClassInstanceArray,
    ClassPtrArray,
    Hex8,
    Hex16,
    Hex32,
    Hex64,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float,
    Double,
    Utf8Text,
    Utf16Text,
    Utf8TextPtr,
    Utf16TextPtr,
    FunctionPtr,
    /// Padding of arbitrary size, expanded into hex nodes
    Custom,
    Vector2,
    Vector3,
    Vector4,
    Matrix4x4,
    VTable,
    BitField,
}

use LegacyType as T;

/// Index to type for ReClass 2011 and 2013 files
pub const TYPES_2013: [Option<LegacyType>; 31] = [
    None,                         // 0 base
    Some(T::ClassInstance),       // 1 instance
    None,                         // 2 struct
    None,                         // 3 hidden
    Some(T::Hex32),               // 4
    Some(T::Hex64),               // 5
    Some(T::Hex16),               // 6
    Some(T::Hex8),                // 7
    Some(T::ClassPtr),            // 8
    Some(T::Int64),               // 9
    Some(T::Int32),               // 10
    Some(T::Int16),               // 11
    Some(T::Int8),                // 12
    Some(T::Float),               // 13
    Some(T::Double),              // 14
    Some(T::UInt32),              // 15
    Some(T::UInt16),              // 16
    Some(T::UInt8),               // 17
    Some(T::Utf8Text),            // 18
    Some(T::Utf16Text),           // 19
    Some(T::FunctionPtr),         // 20
    Some(T::Custom),              // 21
    Some(T::Vector2),             // 22
    Some(T::Vector3),             // 23
    Some(T::Vector4),             // 24 quaternion
    Some(T::Matrix4x4),           // 25
    Some(T::VTable),              // 26
    Some(T::ClassInstanceArray),  // 27
    None,                         // 28 class
    Some(T::Utf8TextPtr),         // 29
    Some(T::Utf16TextPtr),        // 30
];

/// Index to type for ReClass 2015 and 2016 files
pub const TYPES_2016: [Option<LegacyType>; 35] = [
    None,                         // 0 base
    Some(T::ClassInstance),       // 1 instance
    None,                         // 2 struct
    None,                         // 3 hidden
    Some(T::Hex32),               // 4
    Some(T::Hex64),               // 5
    Some(T::Hex16),               // 6
    Some(T::Hex8),                // 7
    Some(T::ClassPtr),            // 8
    Some(T::Int64),               // 9
    Some(T::Int32),               // 10
    Some(T::Int16),               // 11
    Some(T::Int8),                // 12
    Some(T::Float),               // 13
    Some(T::Double),              // 14
    Some(T::UInt32),              // 15
    Some(T::UInt16),              // 16
    Some(T::UInt8),               // 17
    Some(T::Utf8Text),            // 18
    Some(T::Utf16Text),           // 19
    Some(T::FunctionPtr),         // 20 function
    Some(T::Custom),              // 21
    Some(T::Vector2),             // 22
    Some(T::Vector3),             // 23
    Some(T::Vector4),             // 24 quaternion
    Some(T::Matrix4x4),           // 25
    Some(T::VTable),              // 26
    Some(T::ClassInstanceArray),  // 27
    None,                         // 28 class
    Some(T::Utf8TextPtr),         // 29
    Some(T::Utf16TextPtr),        // 30
    Some(T::BitField),            // 31
    Some(T::UInt64),              // 32
    Some(T::FunctionPtr),         // 33 function pointer
    Some(T::ClassPtrArray),       // 34
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_version() {
        assert_eq!(LegacyVersion::detect("Reclass 2011"), Some(LegacyVersion::V2013));
        assert_eq!(LegacyVersion::detect(" ReClass 2013 "), Some(LegacyVersion::V2013));
        assert_eq!(LegacyVersion::detect("reclass 2016"), Some(LegacyVersion::V2016));
        assert_eq!(LegacyVersion::detect("ReClass 2015"), Some(LegacyVersion::V2016));
        assert_eq!(LegacyVersion::detect("ReClass"), None);
        assert_eq!(LegacyVersion::detect("saved 2016"), None);
    }

    #[test]
    fn test_tables_differ() {
        assert_eq!(LegacyVersion::V2016.lookup(31), Some(LegacyType::BitField));
        assert_eq!(LegacyVersion::V2013.lookup(31), None);
        assert_eq!(LegacyVersion::V2016.lookup(34), Some(LegacyType::ClassPtrArray));
        assert_eq!(LegacyVersion::V2013.lookup(4), Some(LegacyType::Hex32));
        assert_eq!(LegacyVersion::V2016.lookup(28), None);
        assert_eq!(LegacyVersion::V2016.lookup(u64::MAX), None);
    }
}
