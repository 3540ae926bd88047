//! Sexagesimal coordinate strings as used on the LX200 wire.
//!
//! Formatting truncates every field toward zero instead of rounding.
//! Clients compare against their own ephemeris and expect the resulting
//! sub-second bias, so it must not be "fixed" by rounding.

/// Right ascension in degrees as `HH:MM:SS` hours.
pub fn format_ra(ra_deg: f64) -> String {
    let hours = ra_deg.rem_euclid(360.0) / 15.0;
    let (h, m, s) = split_truncated(hours);
    format!("{:02}:{:02}:{:02}", h.min(23), m, s)
}

/// Declination in degrees as `sDD*MM:SS`.
pub fn format_dec(dec_deg: f64) -> String {
    let sign = if dec_deg >= 0.0 { '+' } else { '-' };
    let (d, m, s) = split_truncated(dec_deg.abs().min(90.0));
    format!("{sign}{d:02}*{m:02}:{s:02}")
}

/// Whole units, minutes and seconds, each truncated.
fn split_truncated(value: f64) -> (u32, u32, u32) {
    let whole = value.trunc();
    let minutes = (value - whole) * 60.0;
    let whole_minutes = minutes.trunc();
    let seconds = (minutes - whole_minutes) * 60.0;
    (
        whole as u32,
        (whole_minutes as u32).min(59),
        (seconds.trunc() as u32).min(59),
    )
}

/// Parse `HH:MM:SS` or `HH:MM.T` hours back into degrees.
pub fn parse_ra(text: &str) -> Option<f64> {
    let text = text.trim().trim_end_matches('#');
    let mut parts = text.split(':');
    let hours: f64 = parts.next()?.trim().parse().ok()?;
    let minutes: f64 = parts.next()?.trim().parse().ok()?;
    let seconds: f64 = match parts.next() {
        Some(s) => s.trim().parse().ok()?,
        None => 0.0,
    };
    if parts.next().is_some() || !(0.0..24.0).contains(&hours) {
        return None;
    }
    Some((hours + minutes / 60.0 + seconds / 3600.0) * 15.0)
}

/// Parse `sDD*MM:SS`, `sDD*MM` or `sDD:MM:SS` back into degrees.
pub fn parse_dec(text: &str) -> Option<f64> {
    let text = text.trim().trim_end_matches('#');
    let (negative, body) = match text.chars().next()? {
        '-' => (true, &text[1..]),
        '+' => (false, &text[1..]),
        _ => (false, text),
    };

    let mut parts = body.split(['*', ':', '\'', '\u{b0}']);
    let degrees: f64 = parts.next()?.trim().parse().ok()?;
    let minutes: f64 = parts.next()?.trim().parse().ok()?;
    let seconds: f64 = match parts.next() {
        Some(s) => s.trim().parse().ok()?,
        None => 0.0,
    };

    let magnitude = degrees + minutes / 60.0 + seconds / 3600.0;
    if magnitude > 90.0 {
        return None;
    }
    Some(if negative { -magnitude } else { magnitude })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_pointing() {
        // 296.964 / 15 = 19.7976h
        assert_eq!(format_ra(296.964), "19:47:51");
        assert_eq!(format_dec(42.7365), "+42*44:11");
    }

    #[test]
    fn test_zero_and_negative() {
        assert_eq!(format_ra(0.0), "00:00:00");
        assert_eq!(format_dec(0.0), "+00*00:00");
        assert_eq!(format_dec(-0.5), "-00*30:00");
        assert_eq!(format_dec(-89.99999), "-89*59:59");
    }

    #[test]
    fn test_truncates_instead_of_rounding() {
        // 59.9 seconds of time stays 59
        let ra = (10.0 + 59.0 / 60.0 + 59.9 / 3600.0) * 15.0;
        assert_eq!(format_ra(ra), "10:59:59");
        let dec = 10.0 + 59.0 / 60.0 + 59.9 / 3600.0;
        assert_eq!(format_dec(dec), "+10*59:59");
    }

    #[test]
    fn test_ra_wraps_into_range() {
        assert_eq!(format_ra(360.0), "00:00:00");
        assert_eq!(format_ra(-15.0), "23:00:00");
    }

    #[test]
    fn test_parse() {
        assert_eq!(parse_ra("19:47:51#"), Some((19.0 + 47.0 / 60.0 + 51.0 / 3600.0) * 15.0));
        assert_eq!(parse_ra("02:30.0"), Some(37.5));
        assert_eq!(parse_ra("24:00:00"), None);
        assert_eq!(parse_ra("bad"), None);
        assert_eq!(parse_dec("-00*30:00"), Some(-0.5));
        assert_eq!(parse_dec("+42*44"), Some(42.0 + 44.0 / 60.0));
        assert_eq!(parse_dec("91*00:00"), None);
    }
}
