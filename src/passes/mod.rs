//! The ordered chain of AST-to-AST transformation passes.
//!
//! Each pass receives an exclusive handle on the tree plus the request's
//! entropy oracle, and rewrites in place.  New passes are added by extending
//! the pipeline array built here, not by touching the node types.

pub mod deadcode;
pub mod flow;
pub mod guard;
pub mod rename;
pub mod strings;
pub mod vm;

use crate::ast::AST;
use crate::entropy::EntropyOracle;
use crate::error::ObfuscateError;
use crate::options::Options;

pub use deadcode::DeadCodePass;
pub use flow::ControlFlowPass;
pub use guard::GuardPass;
pub use rename::RenamePass;
pub use strings::StringEncryptPass;
pub use vm::VmWrapPass;

/// An AST-to-AST rewriting stage.
pub trait Pass {
    /// Stage name, for logs and [`Internal`][ObfuscateError::Internal]
    /// error attribution.
    fn name(&self) -> &'static str;

    /// Rewrite the tree in place.
    fn run(
        &mut self,
        ast: &mut AST,
        oracle: &mut EntropyOracle,
        options: &Options,
    ) -> Result<(), ObfuscateError>;
}

/// Build the pass chain for one request, in fixed order.
///
/// Renaming runs first so every later pass works with collision-free names.
/// The VM pass precedes string encryption and flattening because it can only
/// compile plain literals and undisturbed statement lists.  The guard
/// prologue goes last so its snippets land at the very top of the output.
#[must_use]
pub fn build_pipeline(options: &Options) -> Vec<Box<dyn Pass>> {
    let mut passes: Vec<Box<dyn Pass>> = Vec::new();
    if options.variable_renaming {
        passes.push(Box::new(RenamePass));
    }
    if options.vm_obfuscation {
        passes.push(Box::new(VmWrapPass));
    }
    if options.control_flow_obfuscation {
        passes.push(Box::new(ControlFlowPass));
    }
    if options.string_encryption {
        passes.push(Box::new(StringEncryptPass));
    }
    if options.dead_code_injection {
        passes.push(Box::new(DeadCodePass));
    }
    if options.wants_guard_prologue() {
        passes.push(Box::new(GuardPass));
    }
    passes
}
