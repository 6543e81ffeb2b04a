//! Core error taxonomy for txsc-core.
//!
//! Every variant carries the source line number it was raised against, per
//! spec §7 ("All errors carry a line number"). The symbol table raises the
//! small [`SymbolError`] enum internally; callers in the IR layer attach a
//! line number and fold it into [`CompileError::Ir`].

use thiserror::Error;

/// Errors produced by the symbol table. These never escape on their own --
/// the IR layer wraps them into [`CompileError::Ir`] with the triggering
/// node's line number, per spec §7.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SymbolError {
    /// Redeclaration of a name already declared in the current scope.
    #[error("'{name}' is already declared in this scope")]
    MultipleDeclarations { name: String },

    /// Assignment to a symbol declared immutable.
    #[error("'{name}' is immutable and cannot be reassigned")]
    Immutable { name: String },

    /// Assignment to a name with no declaration anywhere in the scope chain.
    #[error("'{name}' was never declared")]
    Undeclared { name: String },
}

/// The complete compiler error taxonomy, per spec §7.
///
/// Callers format a `CompileError` as `"Line N:\n\t<source line>\n<message>"`
/// via [`CompileError::render`] -- the enum itself stays presentation-agnostic
/// so it is reusable by front ends with no source text, such as the raw
/// byte-script round trip.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// Malformed source text or an unknown identifier in a front end.
    #[error("Line {line}:\n{message}")]
    Parsing { line: u32, message: String },

    /// A general structural problem: unbalanced conditional, call to an
    /// undeclared function, wrong arity, an assumption surviving an uneven
    /// conditional with alt-stack handling disabled, or a wrapped
    /// [`SymbolError`].
    #[error("Line {line}:\n{message}")]
    Ir { line: u32, message: String },

    /// A bare expression statement with `implicit_pushes` disabled.
    #[error("Line {line}:\nimplicit push of expression result is not allowed")]
    ImplicitPush { line: u32 },

    /// A `strict_num` violation: an operand or folded result wider than 4
    /// bytes reached an arithmetic opcode.
    #[error("Line {line}:\n{message}")]
    StrictNum { line: u32, message: String },

    /// An operand type incompatible with the opcode that consumes it.
    #[error("Line {line}:\n{message}")]
    Type { line: u32, message: String },

    /// An invalid compiler directive embedded in source.
    #[error("Line {line}:\n{message}")]
    Directive { line: u32, message: String },
}

impl CompileError {
    /// The source line this error was raised against.
    pub fn line(&self) -> u32 {
        match self {
            CompileError::Parsing { line, .. }
            | CompileError::Ir { line, .. }
            | CompileError::ImplicitPush { line }
            | CompileError::StrictNum { line, .. }
            | CompileError::Type { line, .. }
            | CompileError::Directive { line, .. } => *line,
        }
    }

    /// Wraps a [`SymbolError`] into a [`CompileError::Ir`] at `line`, per
    /// spec §7 ("wrapped into IRError by the IR layer").
    pub fn from_symbol(err: SymbolError, line: u32) -> Self {
        CompileError::Ir {
            line,
            message: err.to_string(),
        }
    }

    /// Renders the `"Line N:\n\t<source line>\n<message>"` format from spec
    /// §6, given the original source text. Front ends with no source text
    /// (e.g. a raw byte-script round trip) pass `None` and get a placeholder
    /// showing the instruction index instead.
    pub fn render(&self, source: Option<&str>) -> String {
        let line = self.line();
        let body = match self {
            CompileError::Parsing { message, .. }
            | CompileError::Ir { message, .. }
            | CompileError::StrictNum { message, .. }
            | CompileError::Type { message, .. }
            | CompileError::Directive { message, .. } => message.clone(),
            CompileError::ImplicitPush { .. } => {
                "implicit push of expression result is not allowed".to_string()
            }
        };
        let source_line = source
            .and_then(|s| s.lines().nth(line.saturating_sub(1) as usize))
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("<instruction {line}>"));
        format!("Line {line}:\n\t{source_line}\n{body}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_error_messages() {
        assert_eq!(
            SymbolError::MultipleDeclarations { name: "a".into() }.to_string(),
            "'a' is already declared in this scope"
        );
        assert_eq!(
            SymbolError::Immutable { name: "a".into() }.to_string(),
            "'a' is immutable and cannot be reassigned"
        );
        assert_eq!(
            SymbolError::Undeclared { name: "a".into() }.to_string(),
            "'a' was never declared"
        );
    }

    #[test]
    fn from_symbol_wraps_as_ir() {
        let err = CompileError::from_symbol(SymbolError::Immutable { name: "x".into() }, 3);
        assert!(matches!(err, CompileError::Ir { line: 3, .. }));
    }

    #[test]
    fn render_with_source() {
        let err = CompileError::Type {
            line: 2,
            message: "byte string given to arithmetic opcode".into(),
        };
        let rendered = err.render(Some("a = 1;\nb = a + 0x1122;\n"));
        assert_eq!(
            rendered,
            "Line 2:\n\tb = a + 0x1122;\nbyte string given to arithmetic opcode"
        );
    }

    #[test]
    fn render_without_source_uses_placeholder() {
        let err = CompileError::Ir {
            line: 7,
            message: "unbalanced conditional".into(),
        };
        assert_eq!(
            err.render(None),
            "Line 7:\n\t<instruction 7>\nunbalanced conditional"
        );
    }

    #[test]
    fn line_accessor_matches_every_variant() {
        assert_eq!(CompileError::ImplicitPush { line: 5 }.line(), 5);
        assert_eq!(
            CompileError::Directive {
                line: 9,
                message: "unknown option".into()
            }
            .line(),
            9
        );
    }
}
