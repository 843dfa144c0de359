//! Compiled resource table (`resources.arsc`) decoding and qualified
//! resource resolution.
//!
//! [`table::ResourceTable`] indexes every entry by its packed
//! [`ResourceId`]; [`resolver::resolve`] then selects the variant best
//! matching a requested [`config::Configuration`].

pub mod config;
pub mod resolver;
pub mod table;

pub use config::Configuration;
pub use resolver::resolve;
pub use table::{ResValue, ResourceTable, TableEntry};

use std::fmt;

/// A packed 32-bit resource identifier: package id, type id, entry index.
///
/// The decomposition is exact; every bit belongs to one of the three parts,
/// so re-composing the parts always reproduces the original value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u32);

impl ResourceId {
    pub fn new(raw: u32) -> Self {
        ResourceId(raw)
    }

    pub fn from_parts(package_id: u8, type_id: u8, entry_index: u16) -> Self {
        ResourceId(
            (u32::from(package_id) << 24) | (u32::from(type_id) << 16) | u32::from(entry_index),
        )
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn package_id(self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub fn type_id(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub fn entry_index(self) -> u16 {
        self.0 as u16
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}
