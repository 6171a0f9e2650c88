//! Compute-unit tiers and OS images.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WardenError;

/// Compute-unit counts the network accepts.
pub const VALID_COMPUTE_UNITS: [u32; 7] = [1, 2, 3, 4, 6, 8, 12];

/// Memory per compute unit, in MiB.
const MEMORY_MIB_PER_CU: u32 = 2048;

/// Root filesystem size per compute unit, in MiB.
const DISK_MIB_PER_CU: u32 = 20_480;

/// A validated compute-unit allocation.
///
/// One compute unit is one vCPU, 2 GiB of memory and 20 GiB of disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ComputeTier(u32);

impl ComputeTier {
    /// Validate a compute-unit count against the tier set.
    pub fn new(units: u32) -> Result<Self, WardenError> {
        if VALID_COMPUTE_UNITS.contains(&units) {
            Ok(Self(units))
        } else {
            Err(WardenError::Validation(format!(
                "Invalid compute_units={units}. Valid: {VALID_COMPUTE_UNITS:?}"
            )))
        }
    }

    pub fn units(self) -> u32 {
        self.0
    }

    pub fn vcpus(self) -> u32 {
        self.0
    }

    pub fn memory_mib(self) -> u32 {
        self.0 * MEMORY_MIB_PER_CU
    }

    pub fn disk_mib(self) -> u32 {
        self.0 * DISK_MIB_PER_CU
    }
}

/// Operating system images available for new VMs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsImage {
    Ubuntu22,
    Ubuntu24,
    Debian12,
}

impl OsImage {
    pub const ALL: [OsImage; 3] = [Self::Ubuntu22, Self::Ubuntu24, Self::Debian12];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ubuntu22 => "ubuntu22",
            Self::Ubuntu24 => "ubuntu24",
            Self::Debian12 => "debian12",
        }
    }
}

impl fmt::Display for OsImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OsImage {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|image| image.as_str() == s)
            .ok_or_else(|| {
                let valid: Vec<&str> = Self::ALL.iter().map(|i| i.as_str()).collect();
                WardenError::Validation(format!("Unknown os_image='{s}'. Valid: {valid:?}"))
            })
    }
}
