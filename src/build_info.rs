//! Static information that is determined at build time.

/// Name of the generator, stamped into the header of every rendered file.
pub const GENERATOR: &str = env!("CARGO_PKG_NAME");

/// Header line (without comment marker) of every rendered file.
pub fn managed_by() -> String {
    format!("This file is managed by {GENERATOR}. Local changes will be overwritten.")
}
