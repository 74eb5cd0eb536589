//! # Umbra - source-level obfuscation for Lua-family scripts
//!
//! Umbra parses a script of the target dialect, runs a seeded chain of
//! AST-to-AST obfuscation passes over it, and prints semantically equivalent
//! but deliberately opaque source back out, together with a metadata record
//! (sizes, expansion ratio, security level, integrity digest).
//!
//! The pipeline is strictly sequential per request, and the seeded entropy
//! oracle is its only source of randomness: the same input, options, and
//! seed always reproduce the same output, byte for byte.
//!
//! # A Quick Example
//!
//! ```
//! use umbra::{obfuscate, Options, Profile};
//!
//! fn main() -> Result<(), umbra::ObfuscateError> {
//!     let options = Options::from_profile(Profile::Basic);
//!     let result = obfuscate("local greeting = \"hi\"\nprint(greeting)", &options, 42)?;
//!
//!     assert!(!result.code.contains("greeting"));
//!     assert_eq!(result.security_level, "basic");
//!     Ok(())
//! }
//! ```

pub mod ast;
mod engine;
pub mod entropy;
mod error;
mod options;
mod parse;
pub mod passes;
pub mod print;
pub mod scramble;
pub mod token;

/// The dialect's integer type.
pub type INT = i64;

/// The dialect's floating-point type.
pub type FLOAT = f64;

/// An identifier.  [`SmartString`][smartstring::SmartString] keeps the
/// typical short name inline, off the heap.
pub type Identifier = smartstring::SmartString<smartstring::LazyCompact>;

/// Inline storage for the short child lists most AST nodes carry.
pub type StaticVec<T> = smallvec::SmallVec<[T; 4]>;

pub use engine::{obfuscate, Obfuscated, Obfuscator, MAX_NESTING_DEPTH, MAX_SOURCE_SIZE};
pub use entropy::{EntropyOracle, IdentPalette};
pub use error::{LexError, ObfuscateError, ParseError, ParseErrorType};
pub use options::{Options, Profile};
pub use token::Position;

/// Parse a script with the default nesting budget.
///
/// Convenience for tests and tooling; the driver goes through
/// [`Obfuscator::compile`], which also maps resource failures.
pub fn parse(script: &str) -> Result<ast::AST, ParseError> {
    parse::parse(script, MAX_NESTING_DEPTH)
}
