//! Services wrapping the castmark library for command line use

pub mod import;
pub mod lookup;

pub use import::import_all;
pub use lookup::GuardedLookup;
