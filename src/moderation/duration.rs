//! Human duration tokens such as `10m` or `2d`

/// Parse a duration token into a number of seconds.
///
/// Accepts a positive integer followed by at most one unit letter
/// (`s`, `m`, `h`, `d`, case-insensitive). A bare integer is seconds.
/// Returns `None` for anything else, including zero.
#[must_use]
pub fn parse_duration(text: &str) -> Option<u64> {
    let text = text.trim();
    let last = text.chars().last()?;

    let (magnitude, multiplier) = if last.is_ascii_digit() {
        (text, 1)
    } else {
        let multiplier = match last.to_ascii_lowercase() {
            's' => 1,
            'm' => 60,
            'h' => 3_600,
            'd' => 86_400,
            _ => return None,
        };
        (&text[..text.len() - last.len_utf8()], multiplier)
    };

    // `u64::from_str` accepts a leading `+`, which is not a valid token here
    if magnitude.is_empty() || !magnitude.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let value: u64 = magnitude.parse().ok()?;
    if value == 0 {
        return None;
    }
    value.checked_mul(multiplier)
}
