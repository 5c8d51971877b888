use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use super::error::{RecordError, RecordResult};

/// Max length used when a string column is declared without one
pub const DEFAULT_STRING_LEN: usize = 128;

/// Width of the length prefix stored in front of every string field
const STRING_LEN_PREFIX: usize = 4;

static TYPE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(int|integer|string|char|varchar)\s*(?:\(\s*(\d+)\s*\))?\s*$")
        .expect("type pattern is a valid regex")
});

/// Represents a column data type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int,         // 4 bytes
    Char(usize), // 4-byte length + n bytes (fixed length)
}

impl DataType {
    /// Get the size in bytes for this data type
    pub fn size(&self) -> usize {
        match self {
            DataType::Int => 4,
            DataType::Char(n) => STRING_LEN_PREFIX + *n,
        }
    }
}

impl FromStr for DataType {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = TYPE_PATTERN
            .captures(s)
            .ok_or_else(|| RecordError::InvalidType(s.to_string()))?;

        let len = match caps.get(2) {
            Some(m) => Some(
                m.as_str()
                    .parse::<usize>()
                    .map_err(|_| RecordError::InvalidType(s.to_string()))?,
            ),
            None => None,
        };

        match caps[1].to_ascii_lowercase().as_str() {
            "int" | "integer" if len.is_none() => Ok(DataType::Int),
            "string" | "char" | "varchar" => {
                let len = len.unwrap_or(DEFAULT_STRING_LEN);
                // The stored length prefix is a u32
                if u32::try_from(len).is_err() || len.checked_add(STRING_LEN_PREFIX).is_none() {
                    return Err(RecordError::InvalidType(s.to_string()));
                }
                Ok(DataType::Char(len))
            }
            _ => Err(RecordError::InvalidType(s.to_string())),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int => write!(f, "int"),
            DataType::Char(n) => write!(f, "string({})", n),
        }
    }
}

/// Represents a single field value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Value {
    Int(i32),
    String(String),
}

impl Value {
    /// Get the data type of this value
    ///
    /// Strings report their own length; a column accepts them as long as they fit.
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Int(_) => DataType::Int,
            Value::String(s) => DataType::Char(s.len()),
        }
    }

    /// Whether this value can be stored in a column of `data_type`
    pub fn fits(&self, data_type: &DataType) -> bool {
        match (self, data_type) {
            (Value::Int(_), DataType::Int) => true,
            (Value::String(s), DataType::Char(max_len)) => s.len() <= *max_len,
            _ => false,
        }
    }

    /// Append the fixed-width encoding of this value to `out`
    pub fn serialize_into(&self, data_type: &DataType, out: &mut Vec<u8>) -> RecordResult<()> {
        match (self, data_type) {
            (Value::Int(i), DataType::Int) => {
                out.extend_from_slice(&i.to_le_bytes());
                Ok(())
            }
            (Value::String(s), DataType::Char(max_len)) => {
                let bytes = s.as_bytes();
                if bytes.len() > *max_len {
                    return Err(RecordError::StringTooLong {
                        len: bytes.len(),
                        max: *max_len,
                    });
                }
                out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                out.extend_from_slice(bytes);
                out.resize(out.len() + (max_len - bytes.len()), 0);
                Ok(())
            }
            _ => Err(RecordError::TypeMismatch {
                expected: data_type.to_string(),
                actual: format!("{:?}", self),
            }),
        }
    }

    /// Serialize value to bytes
    pub fn serialize(&self, data_type: &DataType) -> RecordResult<Vec<u8>> {
        let mut result = Vec::with_capacity(data_type.size());
        self.serialize_into(data_type, &mut result)?;
        Ok(result)
    }

    /// Deserialize value from exactly `data_type.size()` bytes
    ///
    /// A stored string length larger than the column allows is clamped, and
    /// invalid UTF-8 is replaced, so any correctly-sized slice decodes.
    pub fn deserialize(bytes: &[u8], data_type: &DataType) -> RecordResult<Self> {
        if bytes.len() != data_type.size() {
            return Err(RecordError::CorruptPage {
                expected: data_type.size(),
                actual: bytes.len(),
            });
        }

        match data_type {
            DataType::Int => {
                let mut buf = [0u8; 4];
                buf.copy_from_slice(bytes);
                Ok(Value::Int(i32::from_le_bytes(buf)))
            }
            DataType::Char(max_len) => {
                let mut len_buf = [0u8; STRING_LEN_PREFIX];
                len_buf.copy_from_slice(&bytes[..STRING_LEN_PREFIX]);
                let len = (u32::from_le_bytes(len_buf) as usize).min(*max_len);
                let body = &bytes[STRING_LEN_PREFIX..STRING_LEN_PREFIX + len];
                Ok(Value::String(String::from_utf8_lossy(body).into_owned()))
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_size() {
        assert_eq!(DataType::Int.size(), 4);
        assert_eq!(DataType::Char(10).size(), 14);
        assert_eq!(DataType::Char(0).size(), 4);
    }

    #[test]
    fn test_parse_data_type() {
        assert_eq!("int".parse::<DataType>().unwrap(), DataType::Int);
        assert_eq!(" INTEGER ".parse::<DataType>().unwrap(), DataType::Int);
        assert_eq!("string(16)".parse::<DataType>().unwrap(), DataType::Char(16));
        assert_eq!("VARCHAR( 8 )".parse::<DataType>().unwrap(), DataType::Char(8));
        assert_eq!(
            "string".parse::<DataType>().unwrap(),
            DataType::Char(DEFAULT_STRING_LEN)
        );
        assert!("int(4)".parse::<DataType>().is_err());
        assert!("float".parse::<DataType>().is_err());
        assert!("string(x)".parse::<DataType>().is_err());
    }

    #[test]
    fn test_parse_rejects_oversized_string() {
        let huge = format!("string({})", usize::MAX);
        assert!(matches!(
            huge.parse::<DataType>(),
            Err(RecordError::InvalidType(s)) if s == huge
        ));
        let too_wide = format!("char({})", u64::from(u32::MAX) + 1);
        assert!(too_wide.parse::<DataType>().is_err());
        assert_eq!(
            format!("string({})", u32::MAX).parse::<DataType>().unwrap(),
            DataType::Char(u32::MAX as usize)
        );
    }

    #[test]
    fn test_display_parses_back() {
        for dt in [DataType::Int, DataType::Char(3)] {
            assert_eq!(dt.to_string().parse::<DataType>().unwrap(), dt);
        }
    }

    #[test]
    fn test_int_serialization() {
        let bytes = Value::Int(-42).serialize(&DataType::Int).unwrap();
        assert_eq!(bytes, (-42i32).to_le_bytes().to_vec());
        assert_eq!(
            Value::deserialize(&bytes, &DataType::Int).unwrap(),
            Value::Int(-42)
        );
    }

    #[test]
    fn test_string_layout() {
        let dt = DataType::Char(10);
        let bytes = Value::from("hello").serialize(&dt).unwrap();
        assert_eq!(bytes.len(), 14);
        assert_eq!(&bytes[..4], &5u32.to_le_bytes());
        assert_eq!(&bytes[4..9], b"hello");
        assert_eq!(&bytes[9..], &[0u8; 5]);
    }

    #[test]
    fn test_string_keeps_trailing_zero_bytes() {
        let dt = DataType::Char(6);
        let val = Value::String("ab\0".to_string());
        let bytes = val.serialize(&dt).unwrap();
        assert_eq!(Value::deserialize(&bytes, &dt).unwrap(), val);
    }

    #[test]
    fn test_string_too_long() {
        let result = Value::from("hello world").serialize(&DataType::Char(5));
        assert!(matches!(
            result,
            Err(RecordError::StringTooLong { len: 11, max: 5 })
        ));
    }

    #[test]
    fn test_corrupt_length_is_clamped() {
        let dt = DataType::Char(3);
        let mut bytes = 1000u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"xyz");
        assert_eq!(
            Value::deserialize(&bytes, &dt).unwrap(),
            Value::from("xyz")
        );
    }

    #[test]
    fn test_wrong_width() {
        let result = Value::deserialize(&[0u8; 3], &DataType::Int);
        assert!(matches!(result, Err(RecordError::CorruptPage { .. })));
    }

    #[test]
    fn test_type_mismatch() {
        let result = Value::Int(42).serialize(&DataType::Char(4));
        assert!(matches!(result, Err(RecordError::TypeMismatch { .. })));
        assert!(!Value::from("abc").fits(&DataType::Int));
        assert!(Value::from("abc").fits(&DataType::Char(3)));
        assert!(!Value::from("abcd").fits(&DataType::Char(3)));
    }
}
