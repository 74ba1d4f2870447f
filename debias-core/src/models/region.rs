use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::RegionSetError;

///
/// Region struct, a half-open `[start, end)` interval on one chromosome
/// (0-based coordinates).
///
#[derive(Eq, PartialEq, Hash, Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    pub chr: String,
    pub start: u32,
    pub end: u32,
}

impl Region {
    ///
    /// Create a new region, rejecting empty or inverted intervals.
    ///
    pub fn new(chr: impl Into<String>, start: u32, end: u32) -> Result<Self, RegionSetError> {
        let chr = chr.into();
        if end <= start {
            return Err(RegionSetError::RegionParseError(format!(
                "{}:{}-{} (end must be greater than start)",
                chr, start, end
            )));
        }
        Ok(Region { chr, start, end })
    }

    ///
    /// Get length of the region
    ///
    pub fn width(&self) -> u32 {
        self.end - self.start
    }

    ///
    /// Get file string of Region
    ///
    pub fn as_string(&self) -> String {
        format!("{}\t{}\t{}", self.chr, self.start, self.end)
    }

    /// Whether two regions on the same chromosome overlap or touch.
    pub fn touches(&self, other: &Region) -> bool {
        self.chr == other.chr && self.start <= other.end && other.start <= self.end
    }
}

impl Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.chr, self.start, self.end)
    }
}

impl FromStr for Region {
    type Err = RegionSetError;

    /// Parse one BED-like line (`chr\tstart\tend[\t...]`).
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut fields = line.split_whitespace();
        let (Some(chr), Some(start), Some(end)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(RegionSetError::RegionParseError(line.to_string()));
        };

        let start = start
            .parse::<u32>()
            .map_err(|_| RegionSetError::RegionParseError(line.to_string()))?;
        let end = end
            .parse::<u32>()
            .map_err(|_| RegionSetError::RegionParseError(line.to_string()))?;

        Region::new(chr, start, end)
    }
}
