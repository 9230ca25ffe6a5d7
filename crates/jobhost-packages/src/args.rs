//! Argument string handling for package launches.
//!
//! Jobs are started without a shell, so the composed argument string has to
//! be split into argv here. Quoting follows the POSIX shell subset people
//! actually put in manifests: whitespace separates words, single quotes are
//! literal, double quotes group, and a backslash escapes the next character
//! outside single quotes.

/// Join the manifest's static arguments with the caller's.
///
/// Empty static arguments yield exactly the caller's string (no leading space).
pub fn compose_arguments(static_arguments: &str, caller_arguments: &str) -> String {
    if static_arguments.is_empty() {
        caller_arguments.to_string()
    } else {
        format!("{static_arguments} {caller_arguments}")
    }
}

/// Split an argument string into individual arguments.
///
/// An unterminated quote runs to the end of the input.
pub fn split_arguments(input: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                for q in chars.by_ref() {
                    if q == '\'' {
                        break;
                    }
                    current.push(q);
                }
            }
            '"' => {
                in_word = true;
                while let Some(q) = chars.next() {
                    match q {
                        '"' => break,
                        '\\' => match chars.next() {
                            Some(e @ ('"' | '\\')) => current.push(e),
                            Some(e) => {
                                current.push('\\');
                                current.push(e);
                            }
                            None => current.push('\\'),
                        },
                        _ => current.push(q),
                    }
                }
            }
            '\\' => {
                in_word = true;
                if let Some(e) = chars.next() {
                    current.push(e);
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    args.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            _ => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        args.push(current);
    }
    args
}
