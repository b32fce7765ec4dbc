use crate::error::AppError;

/// Parse a size string with an optional unit (B, KB, MB, GB, TB).
/// Bare numbers are bytes; "500M" and "500MB" mean the same thing.
pub fn parse_size(size_str: &str) -> Result<u64, AppError> {
    let size_str = size_str.trim().to_lowercase();
    if size_str.is_empty() {
        return Err(AppError::ParseError("empty size".to_string()));
    }

    let split = size_str
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(size_str.len());
    let (number, unit) = size_str.split_at(split);

    let value = number
        .parse::<f64>()
        .map_err(|_| AppError::ParseError(format!("invalid size number: '{number}'")))?;

    let multiplier: u64 = match unit.trim() {
        "" | "b" => 1,
        "k" | "kb" => 1024,
        "m" | "mb" => 1024 * 1024,
        "g" | "gb" => 1024 * 1024 * 1024,
        "t" | "tb" => 1024u64.pow(4),
        other => {
            return Err(AppError::ParseError(format!("unknown size unit: '{other}'")));
        }
    };

    Ok((value * multiplier as f64) as u64)
}

/// Bytes as a human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [(u64, &str); 3] = [(1 << 30, "GB"), (1 << 20, "MB"), (1 << 10, "KB")];

    for (scale, unit) in UNITS {
        if bytes >= scale {
            return format!("{:.2} {unit}", bytes as f64 / scale as f64);
        }
    }
    format!("{bytes} B")
}

/// Parse a host rewrite given as FROM=TO
pub fn parse_rewrite(raw: &str) -> Result<(String, String), AppError> {
    match raw.split_once('=') {
        Some((from, to)) if !from.trim().is_empty() && !to.trim().is_empty() => {
            Ok((from.trim().to_string(), to.trim().to_string()))
        }
        _ => Err(AppError::InvalidInput(format!(
            "invalid host rewrite '{raw}', expected FROM=TO"
        ))),
    }
}
