use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Errors that can occur while encoding or decoding replicated state
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Failed to encode {what}: {source}")]
    Encode {
        what: &'static str,
        source: bincode::error::EncodeError,
    },

    #[error("Failed to decode {what}: {source}")]
    Decode {
        what: &'static str,
        source: bincode::error::DecodeError,
    },

    #[error("Trailing bytes after decoding {what}: consumed {consumed} of {length}")]
    TrailingBytes {
        what: &'static str,
        consumed: usize,
        length: usize,
    },
}

/// Encodes `value` with the wire configuration shared by every replicast crate
pub fn encode<T: Serialize>(what: &'static str, value: &T) -> Result<Vec<u8>, CodecError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|source| CodecError::Encode { what, source })
}

/// Decodes a value previously produced by [`encode`]
pub fn decode<T: DeserializeOwned>(what: &'static str, bytes: &[u8]) -> Result<T, CodecError> {
    let (value, consumed) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|source| CodecError::Decode { what, source })?;
    if consumed != bytes.len() {
        return Err(CodecError::TrailingBytes {
            what,
            consumed,
            length: bytes.len(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::{decode, encode, CodecError};

    #[test]
    fn decodes_what_was_encoded() {
        let bytes = encode("pads", &vec![(3u8, true), (7u8, false)]).expect("encode");
        let pads: Vec<(u8, bool)> = decode("pads", &bytes).expect("decode");
        assert_eq!(pads, vec![(3, true), (7, false)]);
    }

    #[test]
    fn truncated_input_is_an_error() {
        let bytes = encode("volume", &0.75f32).expect("encode");
        let result: Result<f32, CodecError> = decode("volume", &bytes[..1]);
        assert!(matches!(result, Err(CodecError::Decode { what: "volume", .. })));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = encode("flag", &true).expect("encode");
        bytes.push(0);
        let result: Result<bool, CodecError> = decode("flag", &bytes);
        assert!(matches!(result, Err(CodecError::TrailingBytes { .. })));
    }
}
