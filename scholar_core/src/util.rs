//! Small formatting helpers shared by the crates.

const KIB: u64 = 1024;
const MIB: u64 = KIB * 1024;
const GIB: u64 = MIB * 1024;

/// Human-readable binary size, e.g. `1.5KiB`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    if bytes < KIB {
        format!("{bytes}B")
    } else if bytes < MIB {
        format!("{:.1}KiB", bytes as f64 / KIB as f64)
    } else if bytes < GIB {
        format!("{:.1}MiB", bytes as f64 / MIB as f64)
    } else {
        format!("{:.1}GiB", bytes as f64 / GIB as f64)
    }
}

/// Mask a secret for display, keeping four characters at each end.
#[must_use]
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "***".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_each_unit() {
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(1536), "1.5KiB");
        assert_eq!(format_bytes(5 * MIB), "5.0MiB");
        assert_eq!(format_bytes(3 * GIB + GIB / 2), "3.5GiB");
    }

    #[test]
    fn masks_long_secrets_only() {
        assert_eq!(mask_secret("sk-abcdefghijkl"), "sk-a...ijkl");
        assert_eq!(mask_secret("short"), "***");
    }
}
