//! Rewriting of legacy address strings into formula syntax

/// Converts a legacy address string into formula text.
///
/// Quoted names become `<module>` terms, a leading `*` wraps the rest of
/// the expression in a dereference, and operators are spaced out. Bare
/// words that are not hex literals are taken to be module names.
///
/// ```
/// use memclass::formula::normalize_legacy;
///
/// assert_eq!(normalize_legacy("\"game.exe\"+0x10"), "<game.exe> + 0x10");
/// assert_eq!(normalize_legacy("*game.exe+10"), "[<game.exe> + 10]");
/// ```
pub fn normalize_legacy(text: &str) -> String {
    let text = text.trim();
    if let Some(rest) = text.strip_prefix('*') {
        return format!("[{}]", normalize_legacy(rest));
    }

    let mut out = String::with_capacity(text.len() + 8);
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                let name: String = chars.by_ref().take_while(|&c| c != '"').collect();
                out.push('<');
                out.push_str(name.trim());
                out.push('>');
            }
            '<' => {
                out.push('<');
                for c in chars.by_ref() {
                    out.push(c);
                    if c == '>' {
                        break;
                    }
                }
            }
            '+' | '-' => {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push(c);
                out.push(' ');
            }
            '[' | ']' => out.push(c),
            c if c.is_whitespace() => {}
            c => {
                let mut word = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_alphanumeric() || matches!(next, '.' | '_') {
                        word.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if is_hex_literal(&word) {
                    out.push_str(&word);
                } else {
                    out.push('<');
                    out.push_str(&word);
                    out.push('>');
                }
            }
        }
    }

    out.trim_end().to_string()
}

fn is_hex_literal(word: &str) -> bool {
    let digits = word
        .strip_prefix("0x")
        .or_else(|| word.strip_prefix("0X"))
        .unwrap_or(word);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_hexdigit())
}
