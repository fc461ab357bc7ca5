use crate::error::{Result, StashError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Metadata key selecting the distance function of a collection.
pub const SPACE_KEY: &str = "hnsw:space";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Space {
    /// Squared euclidean distance
    #[default]
    L2,
    /// Inner product, reported as `1 - a·b`
    Ip,
    /// Cosine distance, `1 - cos(a, b)`
    Cosine,
}

impl Space {
    pub fn as_str(&self) -> &'static str {
        match self {
            Space::L2 => "l2",
            Space::Ip => "ip",
            Space::Cosine => "cosine",
        }
    }

    /// Both slices must have the same length; callers validate dimensions first.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Space::L2 => a
                .iter()
                .zip(b)
                .map(|(x, y)| {
                    let d = x - y;
                    d * d
                })
                .sum(),
            Space::Ip => 1.0 - dot(a, b),
            Space::Cosine => {
                let norm = (dot(a, a) * dot(b, b)).sqrt();
                if norm == 0.0 {
                    1.0
                } else {
                    1.0 - dot(a, b) / norm
                }
            }
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Space {
    type Err = StashError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "l2" => Ok(Space::L2),
            "ip" => Ok(Space::Ip),
            "cosine" => Ok(Space::Cosine),
            other => Err(StashError::InvalidInput(format!(
                "unknown distance space '{}', expected one of l2, ip, cosine",
                other
            ))),
        }
    }
}
