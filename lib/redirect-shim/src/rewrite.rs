//! Command-line and module-path substitution.

/// Rewrites the drive-absolute paths in a command line.
///
/// The command line is split on whitespace outside double quotes. Every token
/// (or the contents of a quoted token) that starts with `X:\` or `X:/` is
/// handed to `resolve`; a returned replacement is put in its place. Quotes and
/// whitespace are preserved, and an unquoted replacement containing
/// whitespace gets quoted.
pub fn rewrite_command_line<F>(cmd: &str, mut resolve: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    let mut out = String::with_capacity(cmd.len());
    let mut rest = cmd;

    loop {
        let start = rest.find(|c: char| !c.is_whitespace()).unwrap_or(rest.len());
        out.push_str(&rest[..start]);
        rest = &rest[start..];
        if rest.is_empty() {
            break;
        }

        let mut quoted = false;
        let mut end = rest.len();
        for (i, c) in rest.char_indices() {
            if c == '"' {
                quoted = !quoted;
            } else if c.is_whitespace() && !quoted {
                end = i;
                break;
            }
        }

        let (token, tail) = rest.split_at(end);
        rewrite_token(token, &mut resolve, &mut out);
        rest = tail;
    }

    out
}

fn rewrite_token<F>(token: &str, resolve: &mut F, out: &mut String)
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(body) = token.strip_prefix('"') {
        let (inner, after) = match body.find('"') {
            Some(close) => (&body[..close], Some(&body[close..])),
            None => (body, None),
        };
        if let Some(replacement) = looks_like_drive_path(inner).then(|| resolve(inner)).flatten() {
            tracing::debug!(original = inner, replacement = %replacement, "Rewrote quoted argument");
            out.push('"');
            out.push_str(&replacement);
            out.push_str(after.unwrap_or_default());
            return;
        }
    } else if let Some(replacement) = looks_like_drive_path(token).then(|| resolve(token)).flatten() {
        tracing::debug!(original = token, replacement = %replacement, "Rewrote argument");
        if replacement.contains(char::is_whitespace) {
            out.push('"');
            out.push_str(&replacement);
            out.push('"');
        } else {
            out.push_str(&replacement);
        }
        return;
    }
    out.push_str(token);
}

/// `X:\…` or `X:/…`.
pub(crate) fn looks_like_drive_path(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() >= 3 && b[0].is_ascii_alphabetic() && b[1] == b':' && (b[2] == b'\\' || b[2] == b'/')
}
