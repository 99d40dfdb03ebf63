//! Utility library for the netsweep project

pub mod fs;
pub mod other;
