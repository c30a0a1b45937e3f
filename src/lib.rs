//! Bindings for the cgroup v1 devices controller.
//! A [`devices::DeviceCgroup`] is bound to an existing devices cgroup directory and
//! reads the effective whitelist from `devices.list`, appends rules to `devices.allow`
//! and `devices.deny`, and reports whether nested cgroups exist below it.
#[cfg(test)]
#[macro_use]
extern crate quickcheck;

#[cfg(test)]
#[macro_use]
extern crate mockall;


pub mod backend;
pub mod common;
pub mod devices;
pub mod mount;

pub use devices::{DeviceCgroup, DeviceCgroupError};
