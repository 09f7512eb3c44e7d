//! Canonical record encoding.
//!
//! Records are serialized with postcard. Struct fields are written in
//! declaration order with no padding or optional framing, so a value has
//! exactly one encoding and its [`ContentId`](crate::ContentId) is stable.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Encode a record canonically.
pub fn encode<T: Serialize>(value: &T) -> crate::Result<Vec<u8>> {
    postcard::to_allocvec(value).map_err(|e| crate::Error::Encoding(e.to_string()))
}

/// Decode a record, rejecting trailing bytes.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> crate::Result<T> {
    let (value, rest) =
        postcard::take_from_bytes(bytes).map_err(|e| crate::Error::Encoding(e.to_string()))?;
    if !rest.is_empty() {
        return Err(crate::Error::Encoding(format!(
            "{} trailing bytes after record",
            rest.len()
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        values: Vec<u32>,
        flag: bool,
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let sample = Sample {
            name: "x".to_string(),
            values: vec![1, 2, 300],
            flag: true,
        };
        assert_eq!(encode(&sample).unwrap(), encode(&sample).unwrap());
        let decoded: Sample = decode(&encode(&sample).unwrap()).unwrap();
        assert_eq!(decoded, sample);
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let mut bytes = encode(&7u32).unwrap();
        bytes.push(0);
        assert!(decode::<u32>(&bytes).is_err());
        assert!(decode::<Sample>(&[0xff]).is_err());
    }
}
