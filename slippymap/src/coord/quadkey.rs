//! Quadkey tile addressing.
//!
//! A quadkey interleaves the bits of a tile's column and row, most
//! significant first, into base-4 digits: the column bit contributes 1 and
//! the row bit contributes 2.
//!
//! Two renderings exist:
//!
//! - **padded**: exactly `scale` digits. This is the wire address used by
//!   Bing and the suffix of cache keys, and is unique per `(x, y, scale)`.
//! - **compact**: the padded key with leading `0` digits removed (keeping at
//!   least one digit). This is the short display form:
//!   `(x=2, y=1, scale=3)` is `"12"`, `(4, 6, 4)` is `"320"`.

use std::fmt;

use super::types::{CoordError, TileCoord, MAX_SCALE};

/// Quadkey for one tile.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuadKey {
    digits: String,
}

impl QuadKey {
    /// Builds the quadkey for `(x, y)` at `scale`.
    ///
    /// Scale 0 (a single world tile) yields an empty key, which is not a
    /// usable cache address; see [`QuadKey::is_addressable`].
    pub fn from_tile(x: u32, y: u32, scale: u8) -> Self {
        let scale = scale.min(MAX_SCALE);
        let mut digits = String::with_capacity(scale as usize);

        for i in (1..=scale).rev() {
            let mask = 1u32 << (i - 1);
            let mut digit = b'0';
            if x & mask != 0 {
                digit += 1;
            }
            if y & mask != 0 {
                digit += 2;
            }
            digits.push(digit as char);
        }

        Self { digits }
    }

    /// Parses a padded quadkey.
    pub fn parse(key: &str) -> Result<Self, CoordError> {
        if key.len() > MAX_SCALE as usize {
            return Err(CoordError::InvalidQuadkey(key.to_string(), "too long"));
        }
        if !key.bytes().all(|b| (b'0'..=b'3').contains(&b)) {
            return Err(CoordError::InvalidQuadkey(
                key.to_string(),
                "digits must be 0-3",
            ));
        }
        Ok(Self {
            digits: key.to_string(),
        })
    }

    /// False for the empty key produced at scale 0.
    pub fn is_addressable(&self) -> bool {
        !self.digits.is_empty()
    }

    /// Scale encoded by this key (its padded length).
    pub fn scale(&self) -> u8 {
        self.digits.len() as u8
    }

    /// Full-length key, one digit per scale level.
    pub fn padded(&self) -> &str {
        &self.digits
    }

    /// Key with leading zero digits removed, keeping at least one digit.
    pub fn compact(&self) -> &str {
        if self.digits.is_empty() {
            return "";
        }
        let trimmed = self.digits.trim_start_matches('0');
        if trimmed.is_empty() {
            &self.digits[self.digits.len() - 1..]
        } else {
            trimmed
        }
    }

    /// Decodes the padded key back into tile coordinates.
    pub fn to_tile(&self) -> TileCoord {
        let scale = self.scale();
        let (mut x, mut y) = (0u32, 0u32);

        for (pos, digit) in self.digits.bytes().enumerate() {
            let mask = 1u32 << (scale as usize - pos - 1);
            let value = digit - b'0';
            if value & 1 != 0 {
                x |= mask;
            }
            if value & 2 != 0 {
                y |= mask;
            }
        }

        TileCoord::new(x, y, scale)
    }
}

impl From<TileCoord> for QuadKey {
    fn from(tile: TileCoord) -> Self {
        Self::from_tile(tile.x, tile.y, tile.scale)
    }
}

impl fmt::Display for QuadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.digits)
    }
}

/// Compact quadkey string for `(x, y)` at `scale`.
///
/// Empty when `scale` is 0.
pub fn quad_key(x: u32, y: u32, scale: u8) -> String {
    QuadKey::from_tile(x, y, scale).compact().to_string()
}
