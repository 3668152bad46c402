//! Assembly language parser and code image builder.
//!
//! Converts assembly source into a [`Program`] in a single forward pass with
//! deferred label patching. Uses [`for_each_instruction!`](crate::for_each_instruction)
//! to generate `parse_instruction` and the assembler IR.
//!
//! # Syntax
//!
//! ```text
//! label:                 ; ordinary label
//! .sub:  inc r0          ; sublabel, recorded as `label.sub`
//!        mnemonic arg ...
//! ```
//!
//! - Mnemonics are lowercase (e.g., `const`, `jmp`)
//! - Registers use the `r` prefix (e.g., `r0`, `r15`); `f` is accepted as an alias
//! - Immediates are signed decimal integers (e.g., `42`, `-1`)
//! - Address operands are label names, `.sub` references or literal positions
//! - A token starting with `;` comments out the rest of the line
//! - `set REG IMM` is shorthand for `const IMM REG`
//!
//! # Layout
//!
//! The first [`HEADER_WIDTH`] words of every image are reserved. When a
//! `main` label exists they hold `jmp main`; otherwise they are two `noop`s
//! and execution falls through into the first assembled instruction. A
//! `halt` is appended after the last instruction.

use crate::for_each_instruction;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::Instruction;
use crate::virtual_machine::program::Program;
use crate::{debug, info};
use std::collections::HashMap;
use std::fmt::Write;
use std::io::Read;
use std::path::Path;

const COMMENT_CHAR: char = ';';
const LABEL_SUFFIX: char = ':';
const SUBLABEL_PREFIX: char = '.';
const REGISTER_SIGIL: char = 'r';
const ALT_REGISTER_SIGIL: char = 'f';
const ENTRY_LABEL: &str = "main";
const SET_ALIAS: &str = "set";

/// Number of words reserved at position 0 for the entry jump.
pub const HEADER_WIDTH: usize = 2;

/// Formats a compiler-style diagnostic for assembly failures.
fn render_assembly_diagnostic(
    file: &str,
    source: &str,
    line: usize,
    offset: usize,
    message: &str,
) -> String {
    let mut diag = String::new();
    let _ = writeln!(diag, "error: {message}");
    let _ = writeln!(diag, " --> {file}:{line}:{offset}");

    if let Some(raw_line) = source.lines().nth(line.saturating_sub(1)) {
        let line_text = raw_line.trim_end_matches('\r');
        let underline = " ".repeat(offset.saturating_sub(1));
        let _ = writeln!(diag, "  |");
        let _ = writeln!(diag, "{:>4} | {}", line, line_text);
        let _ = writeln!(diag, "  | {}^", underline);
    }

    diag
}

/// Emit a helpful diagnostic to stderr for assembly errors.
fn log_assembly_error(file: &str, source: &str, err: &VMError) {
    if let VMError::AssemblyError {
        line,
        offset,
        source: message,
    } = err
    {
        eprintln!(
            "{}",
            render_assembly_diagnostic(file, source, *line, *offset, message)
        );
    } else {
        eprintln!("error: {err}");
    }
}

/// A defined label.
#[derive(Debug, Clone, Copy)]
struct LabelDef {
    position: usize,
    line: usize,
}

/// A placeholder word waiting for a label position.
#[derive(Debug, Clone)]
struct Patch {
    position: usize,
    label: String,
    line: usize,
    offset: usize,
}

/// Address operand as written in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    /// Literal code position.
    Absolute(i64),
    /// Fully qualified label name and the column it was referenced at.
    Label { name: String, offset: usize },
}

/// Assembly state: the growing code image plus label bookkeeping.
pub struct AsmContext {
    /// Code image emitted so far, header included.
    pub code: Vec<i64>,
    labels: HashMap<String, LabelDef>,
    patches: Vec<Patch>,
    /// Most recent ordinary label, the scope for sublabels.
    last_label: Option<String>,
}

impl AsmContext {
    /// Creates a context with the entry header already reserved.
    pub fn new() -> Self {
        Self {
            code: vec![Instruction::Noop.opcode(); HEADER_WIDTH],
            labels: HashMap::new(),
            patches: Vec::new(),
            last_label: None,
        }
    }

    /// Expands a `.sub` name into `label.sub` using the current scope.
    fn qualify(&self, name: &str) -> Result<String, VMError> {
        if !name.starts_with(SUBLABEL_PREFIX) {
            return Ok(name.to_string());
        }
        match &self.last_label {
            Some(scope) => Ok(format!("{scope}{name}")),
            None => Err(VMError::OrphanSublabel {
                label: name.to_string(),
            }),
        }
    }

    /// Registers a label at the current position.
    pub(crate) fn define_label(&mut self, name: &str, line: usize) -> Result<(), VMError> {
        let qualified = self.qualify(name)?;
        let position = self.code.len();
        if let Some(first) = self.labels.get(&qualified) {
            return Err(VMError::DuplicateLabel {
                label: qualified,
                first_line: first.line,
                first_position: first.position,
                position,
            });
        }

        if !name.starts_with(SUBLABEL_PREFIX) {
            self.last_label = Some(qualified.clone());
        }
        debug!("label {qualified} at {position}");
        self.labels.insert(qualified, LabelDef { position, line });
        Ok(())
    }

    /// Resolves a label referenced from the placeholder at `position`.
    pub(crate) fn resolve_label(&self, name: &str, position: usize) -> Result<usize, VMError> {
        self.labels
            .get(name)
            .map(|def| def.position)
            .ok_or_else(|| VMError::UndefinedLabel {
                label: name.to_string(),
                position,
            })
    }

    /// Emits an address operand, deferring label references to [`finish`](Self::finish).
    fn emit_target(&mut self, target: &Target, line: usize) {
        match target {
            Target::Absolute(position) => self.code.push(*position),
            Target::Label { name, offset } => {
                self.patches.push(Patch {
                    position: self.code.len(),
                    label: name.clone(),
                    line,
                    offset: *offset,
                });
                self.code.push(0);
            }
        }
    }

    /// Appends the trailing `halt`, writes the entry jump and resolves all patches.
    fn finish(mut self) -> Result<Program, VMError> {
        self.code.push(Instruction::Halt.opcode());

        if let Some(entry) = self.labels.get(ENTRY_LABEL) {
            debug!("entry point {ENTRY_LABEL} at {}", entry.position);
            self.code[..HEADER_WIDTH]
                .copy_from_slice(&[Instruction::Jmp.opcode(), entry.position as i64]);
        }

        for patch in &self.patches {
            let target = self
                .resolve_label(&patch.label, patch.position)
                .map_err(|e| e.at(patch.line, patch.offset))?;
            debug!("patched {} -> {} ({target})", patch.position, patch.label);
            self.code[patch.position] = target as i64;
        }

        Ok(Program::new(self.code))
    }
}

impl Default for AsmContext {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
struct Token<'a> {
    text: &'a str,
    /// 1-based column offset in the line.
    offset: usize,
}

/// Tokenize a single line of assembly.
///
/// Tokens are separated by whitespace. A token that starts with `;` ends the
/// line.
fn tokenize(line: &str) -> Vec<Token<'_>> {
    let mut out = Vec::with_capacity(4);
    let mut start: Option<usize> = None;

    let end = std::iter::once((line.len(), ' '));
    for (i, c) in line.char_indices().chain(end) {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                let text = &line[s..i];
                if text.starts_with(COMMENT_CHAR) {
                    break;
                }
                out.push(Token { text, offset: s + 1 });
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }

    out
}

/// Parse a register token like `r0`, `r15` or `f3`.
pub(crate) fn parse_reg(tok: &str) -> Result<i64, VMError> {
    let digits = tok
        .strip_prefix(REGISTER_SIGIL)
        .or_else(|| tok.strip_prefix(ALT_REGISTER_SIGIL))
        .ok_or_else(|| VMError::ExpectedRegister {
            token: tok.to_string(),
        })?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(VMError::InvalidRegister {
            token: tok.to_string(),
        });
    }
    digits.parse::<i64>().map_err(|_| VMError::InvalidRegister {
        token: tok.to_string(),
    })
}

/// Parse an i64 immediate
pub(crate) fn parse_imm(tok: &str) -> Result<i64, VMError> {
    tok.parse::<i64>().map_err(|_| VMError::InvalidImmediate {
        token: tok.to_string(),
    })
}

/// Parses an address operand: a literal position or a label reference.
fn parse_target(tok: &Token, ctx: &AsmContext) -> Result<Target, VMError> {
    if let Ok(position) = tok.text.parse::<i64>() {
        return Ok(Target::Absolute(position));
    }
    Ok(Target::Label {
        name: ctx.qualify(tok.text)?,
        offset: tok.offset,
    })
}

/// Checks if a token is a label definition (ends with `:`)
fn is_label_def(tok: &str) -> bool {
    tok.ends_with(LABEL_SUFFIX) && tok.len() > 1
}

/// Extracts the label name from a label definition token.
fn label_name(tok: &str) -> &str {
    &tok[..tok.len() - 1]
}

/// Returns the next operand token, attributing a shortage to `instr`.
fn next_operand<'t, 'a>(
    it: &mut std::slice::Iter<'t, Token<'a>>,
    instr: Instruction,
    actual: usize,
) -> Result<&'t Token<'a>, VMError> {
    it.next().ok_or_else(|| VMError::ArityMismatch {
        instruction: instr.mnemonic().to_string(),
        expected: instr.arity(),
        actual,
    })
}

macro_rules! define_parse_instruction {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:expr, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ]
        ),* $(,)?
    ) => {

        // =========================
        // Assembler IR
        // =========================
        #[derive(Debug, Clone, PartialEq, Eq)]
        enum AsmInstr {
            $(
                $name {
                    $( $field: define_parse_instruction!(@ty $kind) ),*
                },
            )*
        }

        impl AsmInstr {
            /// Appends the instruction's words to the code image.
            fn emit(&self, ctx: &mut AsmContext, line: usize) {
                match self {
                    $(
                        AsmInstr::$name { $( $field ),* } => {
                            ctx.code.push(Instruction::$name.opcode());
                            $(
                                define_parse_instruction!(@emit ctx, line, $kind, $field);
                            )*
                        }
                    ),*
                }
            }
        }

        /// Parse one instruction from tokens into [`AsmInstr`].
        ///
        /// Operand errors are located at the offending token on `line`.
        fn parse_instruction(
            ctx: &AsmContext,
            tokens: &[Token],
            line: usize,
        ) -> Result<AsmInstr, VMError> {
            let Some(head) = tokens.first() else {
                return Err(VMError::ArityMismatch {
                    instruction: "<missing opcode>".to_string(),
                    expected: 1,
                    actual: 0,
                });
            };

            let instr = Instruction::from_mnemonic(head.text)?;
            let operands = &tokens[1..];
            if operands.len() != instr.arity() {
                return Err(VMError::ArityMismatch {
                    instruction: head.text.to_string(),
                    expected: instr.arity(),
                    actual: operands.len(),
                });
            }

            match instr {
                $(
                    Instruction::$name => {
                        define_parse_instruction!(
                            @construct ctx operands line instr; $name $( $field : $kind ),*
                        )
                    }
                ),*
            }
        }
    };

    // ---------- operand types ----------
    (@ty Reg)  => { i64 };
    (@ty Imm)  => { i64 };
    (@ty Addr) => { Target };

    // ---------- emission ----------
    (@emit $ctx:ident, $line:ident, Reg, $field:ident)  => { $ctx.code.push(*$field) };
    (@emit $ctx:ident, $line:ident, Imm, $field:ident)  => { $ctx.code.push(*$field) };
    (@emit $ctx:ident, $line:ident, Addr, $field:ident) => { $ctx.emit_target($field, $line) };

    // ---------- parsing ----------
    (@construct $ctx:ident $ops:ident $line:ident $instr:ident; $name:ident) => {
        Ok(AsmInstr::$name { })
    };

    (@construct $ctx:ident $ops:ident $line:ident $instr:ident; $name:ident $( $field:ident : $kind:ident ),+ ) => {{
        let mut it = $ops.iter();
        Ok(AsmInstr::$name {
            $(
                $field: {
                    let tok = next_operand(&mut it, $instr, $ops.len())?;
                    define_parse_instruction!(@parse_operand $kind, tok, $ctx)
                        .map_err(|e| e.at($line, tok.offset))?
                },
            )*
        })
    }};

    (@parse_operand Reg, $tok:expr, $ctx:expr) => {
        parse_reg($tok.text)
    };

    (@parse_operand Imm, $tok:expr, $ctx:expr) => {
        parse_imm($tok.text)
    };

    (@parse_operand Addr, $tok:expr, $ctx:expr) => {
        parse_target($tok, $ctx)
    };
}

for_each_instruction!(define_parse_instruction);

/// Parses `set REG IMM` into the equivalent `const IMM REG`.
fn parse_set(tokens: &[Token], line: usize) -> Result<AsmInstr, VMError> {
    let [_, reg, imm] = tokens else {
        return Err(VMError::ArityMismatch {
            instruction: SET_ALIAS.to_string(),
            expected: 2,
            actual: tokens.len().saturating_sub(1),
        });
    };
    Ok(AsmInstr::Const {
        rd: parse_reg(reg.text).map_err(|e| e.at(line, reg.offset))?,
        imm: parse_imm(imm.text).map_err(|e| e.at(line, imm.offset))?,
    })
}

/// Single forward pass over `source`, then patch resolution.
fn assemble_lines(source: &str) -> Result<Program, VMError> {
    let mut ctx = AsmContext::new();

    for (idx, raw) in source.lines().enumerate() {
        let line_no = idx + 1;
        let tokens = tokenize(raw);
        let mut rest = tokens.as_slice();

        if let Some(first) = rest.first()
            && is_label_def(first.text)
        {
            ctx.define_label(label_name(first.text), line_no)
                .map_err(|e| e.at(line_no, first.offset))?;
            rest = &rest[1..];
        }

        let Some(head) = rest.first() else {
            continue;
        };
        let instr = if head.text == SET_ALIAS {
            parse_set(rest, line_no)
        } else {
            parse_instruction(&ctx, rest, line_no)
        }
        .map_err(|e| e.at(line_no, head.offset))?;
        instr.emit(&mut ctx, line_no);
    }

    ctx.finish()
}

/// Assembles source with an associated filename for error diagnostics.
///
/// Logs a compiler-style diagnostic to stderr on failure.
fn assemble_source_with_name(source: &str, source_name: &str) -> Result<Program, VMError> {
    info!("assembling {source_name}");
    let result = assemble_lines(source);
    match &result {
        Ok(program) => info!("assembled {source_name}: {} words", program.code.len()),
        Err(err) => log_assembly_error(source_name, source, err),
    }
    result
}

/// Assemble a full source string into a code image.
pub fn assemble_source(source: &str) -> Result<Program, VMError> {
    assemble_source_with_name(source, "<source>")
}

/// Assembles everything readable from `reader`; `name` labels diagnostics.
pub fn assemble_reader<R: Read>(mut reader: R, name: &str) -> Result<Program, VMError> {
    let mut source = String::new();
    reader
        .read_to_string(&mut source)
        .map_err(|e| VMError::io(name, e))?;
    assemble_source_with_name(&source, name)
}

/// Convenience: assemble directly from file path
pub fn assemble_file<P: AsRef<Path>>(path: P) -> Result<Program, VMError> {
    let path_ref = path.as_ref();
    let name = path_ref.display().to_string();
    let source = std::fs::read_to_string(path_ref).map_err(|e| VMError::io(&name, e))?;
    assemble_source_with_name(&source, &name)
}
