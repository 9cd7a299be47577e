/// `fooBar-baz:qux` -> `fooBarBazQux`. Only lowercase letters after a separator are lifted.
pub fn to_camel_case(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(ch) = chars.next() {
        if matches!(ch, '-' | ':' | '_') {
            if let Some(next) = chars.peek().copied() {
                if next.is_ascii_lowercase() {
                    result.push(next.to_ascii_uppercase());
                    chars.next();
                    continue;
                }
            }
        }
        result.push(ch);
    }
    result
}

/// `clientId` -> `client-id`, whitespace and underscores become dashes.
pub fn to_dashed_case(value: &str) -> String {
    let mut result = String::with_capacity(value.len() + 4);
    let mut previous: Option<char> = None;
    for ch in value.chars() {
        if ch.is_ascii_uppercase()
            && previous.is_some_and(|p| p.is_ascii_lowercase() || p.is_ascii_digit())
        {
            result.push('-');
            result.push(ch.to_ascii_lowercase());
        } else if ch.is_whitespace() || ch == '_' {
            if !result.ends_with('-') || !previous.is_some_and(|p| p.is_whitespace() || p == '_') {
                result.push('-');
            }
        } else {
            result.push(ch);
        }
        previous = Some(ch);
    }
    result
}

/// `AbortSignalReceivedError` -> `abort_signal_received_error`.
pub fn to_snake_case(value: &str) -> String {
    let mut result = String::with_capacity(value.len() + 4);
    for ch in value.chars() {
        if ch.is_ascii_uppercase() {
            result.push('_');
            result.push(ch.to_ascii_lowercase());
        } else {
            result.push(ch);
        }
    }
    match result.strip_prefix('_') {
        Some(stripped) => stripped.to_owned(),
        None => result,
    }
}
