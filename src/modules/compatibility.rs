//! Descriptor Version Compatibility
//!
//! Descriptor versions use the `YYYYMMDD` format. The supported version is
//! read at build time from `package.metadata.modulebus.descriptor_version`;
//! a descriptor is compatible when its major version (the year) matches.

use crate::error::{BusError, BusResult};
use super::descriptor::ModuleDescriptor;

// Include the build-generated descriptor version constant
include!(concat!(env!("OUT_DIR"), "/descriptor_version.rs"));

/// Descriptor version this build of the bus targets
pub fn descriptor_version() -> u32 {
    BASE_DESCRIPTOR_VERSION
}

/// Convert a `YYYYMMDD` version to `YYYY-MM-DD`
pub fn version_to_date_string(version: u32) -> String {
    let year = version / 10000;
    let month = (version % 10000) / 100;
    let day = version % 100;
    format!("{year:04}-{month:02}-{day:02}")
}

/// Checks descriptor versions against the bus version
#[derive(Debug, Clone, Copy)]
pub struct CompatibilityChecker {
    supported: u32,
}

impl CompatibilityChecker {
    pub fn new(supported: u32) -> Self {
        Self { supported }
    }

    /// Same major version (year) is compatible
    pub fn is_compatible(&self, version: u32) -> bool {
        major_version(self.supported) == major_version(version)
    }

    pub fn check(&self, descriptor: &ModuleDescriptor) -> BusResult<()> {
        if !self.is_compatible(descriptor.descriptor_version) {
            return Err(BusError::IncompatibleDescriptor {
                module: descriptor.id.clone(),
                found: descriptor.descriptor_version,
                supported: self.supported,
            });
        }
        Ok(())
    }
}

impl Default for CompatibilityChecker {
    fn default() -> Self {
        Self::new(BASE_DESCRIPTOR_VERSION)
    }
}

fn major_version(version: u32) -> u32 {
    version / 10000
}
