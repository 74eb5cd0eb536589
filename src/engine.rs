//! The obfuscation driver: resource limits, pass ordering, and result
//! assembly.

use crate::ast::{collect_identifiers, AST};
use crate::entropy::{EntropyOracle, IdentPalette};
use crate::error::{ObfuscateError, ParseErrorType};
use crate::options::Options;
use crate::{parse, passes, print};

/// Default maximum input size: 5 MiB.
pub const MAX_SOURCE_SIZE: usize = 5 * 1024 * 1024;
/// Default maximum statement/expression nesting depth.
pub const MAX_NESTING_DEPTH: usize = 1024;
/// Default output cap, as a multiple of the printed (pre-noise) size.
pub const MAX_EXPANSION: usize = 2;

/// The result of one obfuscation request.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Obfuscated {
    /// The obfuscated program text.
    pub code: String,
    /// Input size in bytes.
    pub original_size: usize,
    /// Output size in bytes.
    pub obfuscated_size: usize,
    /// Output-to-input ratio, rendered `"NNN.NN%"`.
    pub expansion_ratio: String,
    /// The resolved profile name, or `"custom"`.
    pub security_level: String,
    /// Rolling hash of the output, rendered as 16 hex digits.
    pub checksum: String,
}

/// The obfuscation engine: resource limits plus the identifier palette.
///
/// One engine may serve many requests; each request gets its own oracle and
/// tree, so engines are freely shareable across threads.
#[derive(Debug, Clone)]
pub struct Obfuscator {
    max_source_size: usize,
    max_nesting_depth: usize,
    max_expansion: usize,
    palette: IdentPalette,
}

impl Default for Obfuscator {
    #[inline(always)]
    fn default() -> Self {
        Self::new()
    }
}

impl Obfuscator {
    /// Create an [`Obfuscator`] with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_source_size: MAX_SOURCE_SIZE,
            max_nesting_depth: MAX_NESTING_DEPTH,
            max_expansion: MAX_EXPANSION,
            palette: IdentPalette::default(),
        }
    }

    /// Set the maximum input size, in bytes.
    #[inline(always)]
    pub fn set_max_source_size(&mut self, size: usize) -> &mut Self {
        self.max_source_size = size;
        self
    }

    /// Set the maximum nesting depth accepted by the parser.
    #[inline(always)]
    pub fn set_max_nesting_depth(&mut self, depth: usize) -> &mut Self {
        self.max_nesting_depth = depth;
        self
    }

    /// Set the identifier palette used for generated names.
    #[inline(always)]
    pub fn set_palette(&mut self, palette: IdentPalette) -> &mut Self {
        self.palette = palette;
        self
    }

    /// Parse a script, mapping the nesting-budget failure to
    /// [`ResourceExceeded`][ObfuscateError::ResourceExceeded].
    pub fn compile(&self, source: &str) -> Result<AST, ObfuscateError> {
        if source.len() > self.max_source_size {
            return Err(ObfuscateError::ResourceExceeded {
                limit: "source size",
                max: self.max_source_size,
                actual: source.len(),
            });
        }
        parse::parse(source, self.max_nesting_depth).map_err(|err| match &*err.0 {
            ParseErrorType::TooDeep(max) => ObfuscateError::ResourceExceeded {
                limit: "nesting depth",
                max: *max,
                actual: *max + 1,
            },
            _ => ObfuscateError::Parse(err),
        })
    }

    /// Run the full pipeline: parse, transform, print, final textual pass,
    /// result assembly.  All-or-nothing; partial output is never returned.
    ///
    /// Given the same `(source, options, seed)`, the output is
    /// byte-identical across runs and processes.
    pub fn obfuscate(
        &self,
        source: &str,
        options: &Options,
        seed: u64,
    ) -> Result<Obfuscated, ObfuscateError> {
        options.validate()?;
        let span = tracing::debug_span!("obfuscate", seed, len = source.len());
        let _guard = span.enter();

        let mut ast = self.compile(source)?;

        let mut oracle = EntropyOracle::new(seed).with_palette(self.palette.clone());
        // Fresh names must never collide with anything the program already
        // uses, even when renaming is off.
        oracle.reserve_all(collect_identifiers(&ast));

        for mut pass in passes::build_pipeline(options) {
            tracing::debug!(pass = pass.name(), "running pass");
            pass.run(&mut ast, &mut oracle, options)?;
        }

        let printed = print::to_source(&ast);
        let cap = printed.len().saturating_mul(self.max_expansion);
        let code = print::scatter_noise(printed, &mut oracle, cap);

        let original_size = source.len();
        let obfuscated_size = code.len();
        let expansion_ratio = if original_size == 0 {
            "100.00%".to_string()
        } else {
            format!(
                "{:.2}%",
                obfuscated_size as f64 * 100.0 / original_size as f64
            )
        };
        let checksum = checksum(code.as_bytes());

        Ok(Obfuscated {
            code,
            original_size,
            obfuscated_size,
            expansion_ratio,
            security_level: options.security_level(),
            checksum,
        })
    }
}

/// Obfuscate with default engine limits.
pub fn obfuscate(source: &str, options: &Options, seed: u64) -> Result<Obfuscated, ObfuscateError> {
    Obfuscator::new().obfuscate(source, options, seed)
}

/// Polynomial rolling hash of the output bytes, 32-bit wrapping, rendered
/// as 16 zero-padded hex digits.
fn checksum(bytes: &[u8]) -> String {
    let mut hash: u32 = 0;
    for &byte in bytes {
        hash = hash
            .wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(u32::from(byte));
    }
    format!("{:016x}", hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_matches_rolling_definition() {
        // h = (h << 5) - h + byte, over "ab":
        // h1 = 97, h2 = 97 * 31 + 98 = 3105
        assert_eq!(checksum(b"ab"), format!("{:016x}", 3105));
        assert_eq!(checksum(b""), format!("{:016x}", 0));
    }
}
