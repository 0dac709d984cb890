//! Owned serde model for compiler wire formats: the `--standard-json`
//! input/output documents and the legacy `--combined-json` output.

pub mod combined;
pub mod input;
pub mod output;

pub use combined::{CombinedContract, CombinedJson};
pub use input::{Optimizer, Settings, Source, StandardJsonInput};
pub use output::{Bytecode, ContractOutput, Evm, OutputError, SourceOutput, StandardJsonOutput};
