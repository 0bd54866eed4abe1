use std::fmt;
use std::str::FromStr;

use rand::seq::SliceRandom;

use crate::entities::DriverLocation;

/// Picks exactly one driver out of a non-empty candidate set.
pub trait SelectionPolicy {
    fn select<'a>(&self, candidates: &'a [DriverLocation]) -> Option<&'a DriverLocation>;
}

/// Uniform random choice, ignoring distance.
#[derive(Clone, Copy, Debug, Default)]
pub struct UniformRandom;

impl SelectionPolicy for UniformRandom {
    fn select<'a>(&self, candidates: &'a [DriverLocation]) -> Option<&'a DriverLocation> {
        candidates.choose(&mut rand::thread_rng())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Nearest;

impl SelectionPolicy for Nearest {
    fn select<'a>(&self, candidates: &'a [DriverLocation]) -> Option<&'a DriverLocation> {
        candidates
            .iter()
            .min_by(|a, b| a.distance_km.total_cmp(&b.distance_km))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyKind {
    Uniform,
    Nearest,
}

impl PolicyKind {
    pub fn build(self) -> Box<dyn SelectionPolicy + Send + Sync> {
        match self {
            Self::Uniform => Box::new(UniformRandom),
            Self::Nearest => Box::new(Nearest),
        }
    }
}

impl FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "uniform" | "random" => Ok(Self::Uniform),
            "nearest" => Ok(Self::Nearest),
            other => Err(format!("unknown selection policy {:?}", other)),
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uniform => write!(f, "uniform"),
            Self::Nearest => write!(f, "nearest"),
        }
    }
}
