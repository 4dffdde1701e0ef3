use std::env;
use std::time::{SystemTime, UNIX_EPOCH};

pub(crate) fn env_optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

pub(crate) fn env_usize(name: &str, default: usize) -> usize {
    env_optional(name)
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}

pub(crate) fn env_u64(name: &str, default: u64) -> u64 {
    env_optional(name)
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

pub(crate) fn env_f32(name: &str, default: f32) -> f32 {
    env_optional(name)
        .and_then(|value| value.parse::<f32>().ok())
        .unwrap_or(default)
}

/// Pseudo-random ratio in [0, 1) for retry backoff jitter. Wall-clock
/// nanoseconds are plenty here; this only desynchronizes retry storms.
pub(crate) fn jitter_ratio() -> f64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 1000) as f64 / 1000.0
}

pub(crate) fn parse_retry_after(resp: &ureq::Response) -> Option<f64> {
    resp.header("retry-after")
        .and_then(|v| v.trim().parse::<f64>().ok())
}

/// Truncate to at most `max_chars` characters without splitting a char.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("", 5), "");
    }

    #[test]
    fn env_defaults_apply() {
        assert_eq!(env_usize("MNEMO_TEST_UNSET_USIZE", 7), 7);
        assert_eq!(env_u64("MNEMO_TEST_UNSET_U64", 9), 9);
        assert!((env_f32("MNEMO_TEST_UNSET_F32", 0.5) - 0.5).abs() < 1e-6);
    }
}
