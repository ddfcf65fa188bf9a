use std::env;
use std::time::Duration;

/// Parse a boolean value from a string, supporting multiple formats
///
/// Accepts: "true", "false", "1", "0", "yes", "no" (case insensitive)
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Parse a comma-separated origin list, trimming whitespace and dropping
/// empty entries.
pub fn parse_origin_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|origin| origin.trim())
        .filter(|origin| !origin.is_empty())
        .map(|origin| origin.to_string())
        .collect()
}

/// Read a whole-seconds duration from the named environment variable,
/// falling back to `default` when unset.
///
/// An unparseable value is an error rather than a silent fallback so a typo
/// in a timeout does not go unnoticed until a request hangs.
pub fn parse_duration_secs(
    var: &str,
    default: Duration,
) -> Result<Duration, Box<dyn std::error::Error>> {
    match env::var(var) {
        Ok(raw) => {
            let secs = raw
                .parse::<u64>()
                .map_err(|e| format!("Invalid {var}: {e}"))?;
            Ok(Duration::from_secs(secs))
        }
        Err(_) => Ok(default),
    }
}
