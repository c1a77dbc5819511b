use serde::{Deserialize, Deserializer, Serialize};

pub fn to_hex<S>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    hex::encode(bytes).serialize(s)
}

pub fn from_hex<'de, D>(de: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let hex_str = String::deserialize(de)?;
    hex::decode(hex_str).map_err(|e| serde::de::Error::custom(format!("Invalid hex string: {e}")))
}

pub fn array_from_hex<'de, D, const N: usize>(de: D) -> Result<[u8; N], D::Error>
where
    D: Deserializer<'de>,
{
    let hex_str = String::deserialize(de)?;
    let hex_str = hex_str.strip_prefix("0x").unwrap_or(&hex_str);
    let mut result = [0u8; N];
    hex::decode_to_slice(hex_str, &mut result)
        .map_err(|e| serde::de::Error::custom(format!("Invalid hex string: {e}")))?;
    Ok(result)
}

/// Decodes a hex string (with or without a `0x` prefix) into a fixed-size array.
pub fn decode_hex_array<const N: usize>(hex_str: &str) -> Result<[u8; N], hex::FromHexError> {
    let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    let mut result = [0u8; N];
    hex::decode_to_slice(hex_str, &mut result)?;
    Ok(result)
}
