//! Compiler location and invocation.

pub mod solc;
pub mod version;
pub mod vyper;

pub use solc::{SolcLocator, SolcRunner};
pub use version::CompilerDescriptor;
pub use vyper::VyperRunner;
