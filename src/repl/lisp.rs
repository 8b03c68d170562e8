//! Cheap structural check of operator input before it is sent to the device.

use thiserror::Error;

/// Why a piece of input was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    /// A `)` with nothing open.
    #[error("unexpected ')' at line {line}, column {column}")]
    UnexpectedClose { line: usize, column: usize },
    /// Input ended with `(` still open.
    #[error("missing {count} closing ')'")]
    Unclosed { count: usize },
    /// Input ended inside a string literal.
    #[error("string opened at line {line}, column {column} is never closed")]
    UnterminatedString { line: usize, column: usize },
}

/// Accepts input whose parentheses balance and whose strings are closed.
///
/// Understands `\"` inside strings, `;` line comments and `#\(` / `#\)` characters.
pub fn check_balance(text: &str) -> Result<(), InputError> {
    let mut depth = 0usize;
    let mut string_start: Option<(usize, usize)> = None;
    let mut in_comment = false;
    let mut line = 1;
    let mut column = 0;
    let mut chars = text.chars();

    while let Some(ch) = chars.next() {
        if ch == '\n' {
            line += 1;
            column = 0;
            in_comment = false;
            continue;
        }
        column += 1;
        if in_comment {
            continue;
        }
        if string_start.is_some() {
            match ch {
                '\\' => {
                    chars.next();
                    column += 1;
                }
                '"' => string_start = None,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => string_start = Some((line, column)),
            ';' => in_comment = true,
            '#' if chars.as_str().starts_with('\\') => {
                chars.next();
                chars.next();
                column += 2;
            }
            '(' => depth += 1,
            ')' => {
                if depth == 0 {
                    return Err(InputError::UnexpectedClose { line, column });
                }
                depth -= 1;
            }
            _ => {}
        }
    }

    if let Some((line, column)) = string_start {
        return Err(InputError::UnterminatedString { line, column });
    }
    if depth > 0 {
        return Err(InputError::Unclosed { count: depth });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_forms_pass() {
        assert_eq!(check_balance("(defun sq (x) (* x x))"), Ok(()));
        assert_eq!(check_balance("42"), Ok(()));
        assert_eq!(check_balance(""), Ok(()));
        assert_eq!(check_balance("(princ \"(\")"), Ok(()));
    }

    #[test]
    fn missing_close_is_rejected() {
        assert_eq!(
            check_balance("(let ((x 1))\n  (+ x 1)"),
            Err(InputError::Unclosed { count: 1 })
        );
    }

    #[test]
    fn extra_close_reports_position() {
        assert_eq!(
            check_balance("(+ 1 2))\n"),
            Err(InputError::UnexpectedClose { line: 1, column: 8 })
        );
    }

    #[test]
    fn unclosed_string_is_rejected() {
        assert_eq!(
            check_balance("(print\n \"oops)"),
            Err(InputError::UnterminatedString { line: 2, column: 2 })
        );
    }

    #[test]
    fn escapes_comments_and_char_literals_are_skipped() {
        assert_eq!(check_balance(r#"(princ "say \"hi\" (")"#), Ok(()));
        assert_eq!(check_balance("(+ 1 2) ; trailing ) paren\n"), Ok(()));
        assert_eq!(check_balance(r"(list #\( #\))"), Ok(()));
    }

    #[test]
    fn messages_are_readable() {
        assert_eq!(
            InputError::Unclosed { count: 2 }.to_string(),
            "missing 2 closing ')'"
        );
    }
}
