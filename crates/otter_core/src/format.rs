//! Number formatting for player-facing descriptions.

/// Default number of decimal places used by [`display`].
pub const DISPLAY_PLACES: usize = 3;

/// Format a number with at most `places` decimals, trimming trailing zeros
/// and a dangling decimal point.
#[must_use]
pub fn display(value: f64, places: usize) -> String {
    let mut text = format!("{value:.places$}");
    if text.contains('.') {
        let trimmed = text.trim_end_matches('0').trim_end_matches('.').len();
        text.truncate(trimmed);
    }
    if text == "-0" {
        text = "0".to_string();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_trims_zeros() {
        assert_eq!(display(1.5, 3), "1.5");
        assert_eq!(display(2.0, 3), "2");
        assert_eq!(display(0.1234, 3), "0.123");
        assert_eq!(display(100.0, 0), "100");
        assert_eq!(display(-0.0001, 3), "0");
    }
}
