//! License key generation and format checks.
//!
//! Generated keys look like `MQL5-9F3A-0C7E-B512-44D0-E9A1-7C6B`: a
//! configurable prefix followed by groups of uppercase hexadecimal
//! characters. The groups are the hex encoding of bytes drawn from the
//! thread-local CSPRNG, so the default layout (6 groups of 4) carries 96 bits
//! of randomness.
//!
//! # Example
//!
//! ```rust
//! use licensegate::license_key::{generate_license_key, validate_license_key_format, KeyFormat};
//!
//! let format = KeyFormat::default();
//! let key = generate_license_key(&format);
//! assert!(validate_license_key_format(&key, &format));
//! ```

use rand::RngCore;

use crate::config::LicenseConfig;

/// Layout of generated license keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFormat {
    /// Prefix for the license key (e.g., "MQL5")
    pub prefix: String,
    /// Number of hex groups after the prefix
    pub segments: u8,
    /// Hex characters per group
    pub segment_length: u8,
}

impl Default for KeyFormat {
    fn default() -> Self {
        Self {
            prefix: "MQL5".to_string(),
            segments: 6,
            segment_length: 4,
        }
    }
}

impl From<&LicenseConfig> for KeyFormat {
    fn from(config: &LicenseConfig) -> Self {
        Self {
            prefix: config.key_prefix.clone(),
            segments: config.key_segments,
            segment_length: config.key_segment_length,
        }
    }
}

impl KeyFormat {
    fn hex_len(&self) -> usize {
        self.segments as usize * self.segment_length as usize
    }
}

/// Generate a license key with the given format.
pub fn generate_license_key(format: &KeyFormat) -> String {
    let hex_len = format.hex_len();
    let mut bytes = vec![0u8; hex_len.div_ceil(2)];
    rand::rng().fill_bytes(&mut bytes);

    let encoded = hex::encode_upper(bytes);
    let groups: Vec<&str> = encoded[..hex_len]
        .as_bytes()
        .chunks(format.segment_length.max(1) as usize)
        // hex output is ASCII, so every chunk is valid UTF-8
        .map(|chunk| std::str::from_utf8(chunk).unwrap_or_default())
        .collect();

    format!("{}-{}", format.prefix, groups.join("-"))
}

/// Check that a key matches the generated layout.
///
/// Custom keys supplied at creation time are not required to pass this check.
pub fn validate_license_key_format(key: &str, format: &KeyFormat) -> bool {
    let Some((prefix, segments)) = parse_license_key(key) else {
        return false;
    };

    if prefix != format.prefix || segments.len() != format.segments as usize {
        return false;
    }

    segments.iter().all(|segment| {
        segment.len() == format.segment_length as usize
            && segment
                .chars()
                .all(|ch| ch.is_ascii_digit() || ('A'..='F').contains(&ch))
    })
}

/// Split a key into its prefix and groups.
///
/// Returns `None` when the key has no `-` separated groups at all.
pub fn parse_license_key(key: &str) -> Option<(String, Vec<String>)> {
    let parts: Vec<&str> = key.split('-').collect();
    if parts.len() < 2 {
        return None;
    }

    let prefix = parts[0].to_string();
    let segments: Vec<String> = parts[1..].iter().map(|s| s.to_string()).collect();

    Some((prefix, segments))
}
