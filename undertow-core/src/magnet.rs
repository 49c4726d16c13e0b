//! Magnet link parsing utilities
//!
//! Swarm identifiers stay opaque to the registry; engines that need the
//! info hash or display name parse them here.

use std::fmt;

use crate::swarm::SwarmError;

/// SHA-1 hash identifying a unique torrent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    /// Parses a 40 character hex string.
    ///
    /// # Errors
    /// - `SwarmError::InvalidIdentifier` - Wrong length or non-hex characters
    pub fn from_hex(hex_str: &str) -> Result<Self, SwarmError> {
        let bytes = hex::decode(hex_str).map_err(|e| SwarmError::InvalidIdentifier {
            reason: format!("Invalid info hash {hex_str}: {e}"),
        })?;
        let hash: [u8; 20] = bytes
            .try_into()
            .map_err(|bytes: Vec<u8>| SwarmError::InvalidIdentifier {
                reason: format!("Invalid hash length: {} bytes (expected 20)", bytes.len()),
            })?;
        Ok(Self(hash))
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Parsed magnet link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagnetLink {
    pub info_hash: InfoHash,
    /// Percent-decoded `dn` parameter
    pub display_name: Option<String>,
}

/// Magnet link parsing utilities.
pub struct MagnetParser;

impl MagnetParser {
    /// Parses magnet link to extract torrent information.
    ///
    /// # Errors
    /// - `SwarmError::InvalidIdentifier` - Malformed magnet URI or missing btih hash
    pub fn parse(magnet_url: &str) -> Result<MagnetLink, SwarmError> {
        let magnet =
            magnet_url::Magnet::new(magnet_url).map_err(|e| SwarmError::InvalidIdentifier {
                reason: format!("Invalid magnet link: {e}"),
            })?;

        let info_hash = Self::extract_info_hash(magnet_url)?;
        let display_name = magnet.display_name().map(|s| decode_component(&s.to_string()));

        Ok(MagnetLink {
            info_hash,
            display_name,
        })
    }

    /// Finds the `xt=urn:btih:` parameter in the query string.
    fn extract_info_hash(magnet_url: &str) -> Result<InfoHash, SwarmError> {
        let query = magnet_url
            .split_once('?')
            .map(|(_, query)| query)
            .unwrap_or_default();

        query
            .split('&')
            .find_map(|param| param.strip_prefix("xt=urn:btih:"))
            .ok_or_else(|| SwarmError::InvalidIdentifier {
                reason: format!("Missing info hash in magnet link: {magnet_url}"),
            })
            .and_then(|hash| InfoHash::from_hex(&hash.to_ascii_lowercase()))
    }
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .unwrap_or(spaced)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "0123456789abcdef0123456789abcdef01234567";

    #[test]
    fn test_info_hash_display() {
        let info_hash = InfoHash::from_hex(HASH).unwrap();
        assert_eq!(info_hash.to_string(), HASH);
    }

    #[test]
    fn test_info_hash_rejects_short_hash() {
        assert!(InfoHash::from_hex("abc").is_err());
        assert!(InfoHash::from_hex("0123").is_err());
    }

    #[test]
    fn test_magnet_with_display_name() {
        let link = format!(
            "magnet:?xt=urn:btih:{}&dn=Big%20Buck+Bunny&tr=http://tracker.example.com/announce",
            HASH.to_uppercase()
        );
        let magnet = MagnetParser::parse(&link).unwrap();

        assert_eq!(magnet.info_hash.to_string(), HASH);
        assert_eq!(magnet.display_name.as_deref(), Some("Big Buck Bunny"));
    }

    #[test]
    fn test_magnet_without_btih() {
        assert!(MagnetParser::parse("magnet:?dn=nothing").is_err());
        assert!(MagnetParser::parse("invalid://not-a-magnet").is_err());
    }
}
