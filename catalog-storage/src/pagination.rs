//! Page token codec.
//!
//! A token is the backing store's resume key, JSON-encoded then base64
//! (URL-safe, unpadded). Callers treat it as opaque.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use catalog_core::{PageToken, ValidationError};

use crate::backend::ItemKey;

pub(crate) fn encode_token(key: &ItemKey) -> Result<PageToken, ValidationError> {
    let json = serde_json::to_vec(key).map_err(|_| ValidationError::InvalidPageToken)?;
    Ok(PageToken::from_opaque(URL_SAFE_NO_PAD.encode(json)))
}

pub(crate) fn decode_token(token: &PageToken) -> Result<ItemKey, ValidationError> {
    let json = URL_SAFE_NO_PAD
        .decode(token.as_str())
        .map_err(|_| ValidationError::InvalidPageToken)?;
    serde_json::from_slice(&json).map_err(|_| ValidationError::InvalidPageToken)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_roundtrip() {
        let key = ItemKey::new("COMPONENT#aws-vpc", "00000000000000000001.x~");
        let token = encode_token(&key).unwrap();
        assert!(!token.as_str().contains('='));
        assert_eq!(decode_token(&token).unwrap(), key);
    }

    #[test]
    fn test_garbage_token_rejected() {
        for raw in ["", "!!!", "bm90LWpzb24", "eyJwayI6MX0"] {
            assert_eq!(
                decode_token(&PageToken::from_opaque(raw)),
                Err(ValidationError::InvalidPageToken),
                "token {raw:?} should be rejected"
            );
        }
    }
}
