//! In-source compiler directives (spec §6's "Options (directive/config
//! surface)", SPEC_FULL.md §1.3): a line of the form `#txsc: key = value`
//! overrides a field of [`CompileOptions`] for the compilation of that
//! source file.

use txsc_core::{CompileError, CompileOptions};

const PREFIX: &str = "#txsc:";

/// Parses one source line as a directive, if it is one.
///
/// Returns `None` for any line that is not a directive (including ordinary
/// comments and source statements) so callers can fold this into a normal
/// per-line scan without special-casing non-directive lines.
pub fn parse_line(line: &str) -> Option<(&str, &str)> {
    let rest = line.trim_start().strip_prefix(PREFIX)?;
    let (key, value) = rest.split_once('=')?;
    Some((key.trim(), value.trim()))
}

/// Scans every line of `source` for directives and applies them in order to
/// `options`, raising `CompileError::Directive` at the first unknown key or
/// malformed value.
pub fn apply_all(source: &str, options: &mut CompileOptions) -> Result<(), CompileError> {
    for (i, line) in source.lines().enumerate() {
        let lineno = (i + 1) as u32;
        if let Some((key, value)) = parse_line(line) {
            options.apply_directive(key, value).map_err(|key| CompileError::Directive {
                line: lineno,
                message: format!("unrecognized or malformed directive '{key} = {value}'"),
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use txsc_core::OptLevel;

    #[test]
    fn parses_key_value() {
        assert_eq!(parse_line("#txsc: strict_num = true"), Some(("strict_num", "true")));
    }

    #[test]
    fn ignores_non_directive_lines() {
        assert_eq!(parse_line("// a comment"), None);
        assert_eq!(parse_line("let a = 1;"), None);
    }

    #[test]
    fn applies_directives_in_order() {
        let mut opts = CompileOptions::default();
        let source = "#txsc: optimization = 0\n#txsc: strict_num = true\nassume a;\n";
        apply_all(source, &mut opts).unwrap();
        assert_eq!(opts.optimization, OptLevel::None);
        assert!(opts.strict_num);
    }

    #[test]
    fn unknown_key_is_a_directive_error() {
        let mut opts = CompileOptions::default();
        let err = apply_all("#txsc: bogus = 1\n", &mut opts).unwrap_err();
        assert!(matches!(err, CompileError::Directive { line: 1, .. }));
    }
}
