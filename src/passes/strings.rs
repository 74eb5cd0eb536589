//! The string-encryption pass: replace every string literal with a call to
//! a decoder closure emitted once at the program prologue.
//!
//! The encoding is [`scramble::encode_bytes`][crate::scramble::encode_bytes];
//! the emitted decoder is the target-language rendition of
//! [`scramble::decode_bytes`][crate::scramble::decode_bytes], with the
//! inverse substitution box baked into the prologue and the per-call key
//! traveling as the call's first argument.

use crate::ast::{walk_exprs_mut, Expr, Stmt, AST};
use crate::entropy::EntropyOracle;
use crate::error::ObfuscateError;
use crate::options::Options;
use crate::passes::Pass;
use crate::scramble::{encode_bytes, invert_sbox, shuffled_sbox};
use crate::token::Position;
use crate::Identifier;
use std::fmt::Write;

pub struct StringEncryptPass;

impl Pass for StringEncryptPass {
    fn name(&self) -> &'static str {
        "string-encrypt"
    }

    fn run(
        &mut self,
        ast: &mut AST,
        oracle: &mut EntropyOracle,
        _options: &Options,
    ) -> Result<(), ObfuscateError> {
        let decoder = oracle.identifier();
        let sbox = shuffled_sbox(oracle);
        let inv_sbox = invert_sbox(&sbox);

        let mut replaced = 0_usize;
        walk_exprs_mut(&mut ast.body, &mut |expr| {
            if let Expr::StringConstant(bytes, pos) = expr {
                let pos = *pos;
                let key = oracle.next_byte();
                let encoded = encode_bytes(bytes, key, &sbox);
                let mut call = String::with_capacity(encoded.len() * 5 + 16);
                let _ = write!(call, "{}({}", decoder, key);
                for b in encoded {
                    let _ = write!(call, ", {}", b);
                }
                call.push(')');
                *expr = Expr::Raw(call.into_boxed_str(), pos);
                replaced += 1;
            }
        });

        tracing::debug!(replaced, "encrypted string literals");
        if replaced > 0 {
            let prologue = decoder_source(&decoder, &inv_sbox, oracle);
            ast.body
                .stmts
                .insert(0, Stmt::RawEmit(prologue.into_boxed_str(), Position::NONE));
        }
        Ok(())
    }
}

/// Build the decoder prologue: the inverse substitution box plus a closure
/// that unwinds substitution, index XOR, and the three polynomial stages, in
/// that order.  Must stay the exact mirror of
/// [`decode_bytes`][crate::scramble::decode_bytes].
fn decoder_source(decoder: &Identifier, inv_sbox: &[u8; 256], oracle: &mut EntropyOracle) -> String {
    let table = oracle.identifier();
    let key = oracle.identifier();
    let input = oracle.identifier();
    let out = oracle.identifier();
    let i = oracle.identifier();
    let b = oracle.identifier();

    let mut text = String::with_capacity(2048);
    let _ = write!(text, "local {} = {{", table);
    for (n, &v) in inv_sbox.iter().enumerate() {
        if n > 0 {
            text.push_str(", ");
        }
        let _ = write!(text, "{}", v);
    }
    text.push_str("}\n");

    let _ = writeln!(text, "local {} = function({}, ...)", decoder, key);
    let _ = writeln!(text, "  local {} = {{...}}", input);
    let _ = writeln!(text, "  local {} = {{}}", out);
    let _ = writeln!(text, "  for {} = 1, #{} do", i, input);
    let _ = writeln!(text, "    local {} = {}[{}[{}] + 1]", b, table, input, i);
    let _ = writeln!(text, "    {b} = {b} ~ {k} ~ (({i} * 17) % 256)", b = b, k = key, i = i);
    let _ = writeln!(text, "    {b} = ({b} * 223) % 256", b = b);
    let _ = writeln!(text, "    {b} = {b} ~ ({b} >> 5)", b = b);
    let _ = writeln!(text, "    {b} = ({b} * 197) % 256", b = b);
    let _ = writeln!(
        text,
        "    {b} = {b} ~ (({b} << 3) % 256) ~ (({b} << 6) % 256)",
        b = b
    );
    let _ = writeln!(text, "    {b} = ({b} * 183) % 256", b = b);
    let _ = writeln!(text, "    {b} = {b} ~ ({b} >> 4)", b = b);
    let _ = writeln!(text, "    {}[{}] = string.char({})", out, i, b);
    text.push_str("  end\n");
    let _ = writeln!(text, "  return table.concat({})", out);
    text.push_str("end");
    text
}
