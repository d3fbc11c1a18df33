use secrecy::{ExposeSecret, SecretString};

const PASSWORD_FLAG: &str = "--password=";

/// Format a secret value, respecting the show_secrets flag.
pub fn format_secret(secret: &SecretString, show_secrets: bool) -> String {
    if show_secrets {
        secret.expose_secret().to_string()
    } else {
        "[REDACTED]".to_string()
    }
}

/// Format an optional secret value.
pub fn format_optional_secret(secret: Option<&SecretString>, show_secrets: bool) -> String {
    match secret {
        Some(s) => format_secret(s, show_secrets),
        None => "(not set)".to_string(),
    }
}

/// Render a command line for logging with password arguments masked.
pub fn redact_command_line(program: &str, args: &[String], show_secrets: bool) -> String {
    let mut parts = Vec::with_capacity(args.len() + 1);
    parts.push(program.to_string());
    for arg in args {
        if show_secrets {
            parts.push(arg.clone());
            continue;
        }
        match arg.strip_prefix(PASSWORD_FLAG) {
            Some(value) if !value.is_empty() => parts.push(format!("{PASSWORD_FLAG}[REDACTED]")),
            _ => parts.push(arg.clone()),
        }
    }
    parts.join(" ")
}
