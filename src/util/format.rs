//! Number and text formatting shared by the renderers and the interpreter.

/// Separator pair used when grouping digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberLocale {
    pub thousands: char,
    pub decimal: char,
}

/// `1.234,56`
pub const PT_BR: NumberLocale = NumberLocale {
    thousands: '.',
    decimal: ',',
};

/// `1,234.56`
pub const EN_US: NumberLocale = NumberLocale {
    thousands: ',',
    decimal: '.',
};

/// Formats `value` with a fixed number of decimals and grouped thousands.
pub fn format_grouped(value: f64, decimals: usize, locale: NumberLocale) -> String {
    if !value.is_finite() {
        return value.to_string();
    }

    let fixed = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (fixed.as_str(), None),
    };

    let mut grouped = String::with_capacity(fixed.len() + fixed.len() / 3 + 1);
    let digits = int_part.len();
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (digits - i) % 3 == 0 {
            grouped.push(locale.thousands);
        }
        grouped.push(c);
    }

    if let Some(frac) = frac_part {
        grouped.push(locale.decimal);
        grouped.push_str(frac);
    }

    // "-0,00" reads as noise
    let is_zero = fixed.chars().all(|c| c == '0' || c == '.');
    if value.is_sign_negative() && !is_zero {
        grouped.insert(0, '-');
    }
    grouped
}

/// Abbreviates axis tick values so large magnitudes never fall back to
/// scientific notation: `1.5M`, `12K`, `950`.
pub fn abbreviate(value: f64) -> String {
    let magnitude = value.abs();
    if magnitude >= 1_000_000.0 {
        format!("{:.1}M", value / 1_000_000.0)
    } else if magnitude >= 1_000.0 {
        format!("{:.0}K", value / 1_000.0)
    } else {
        format!("{:.0}", value)
    }
}

/// Greedy word wrap. Words longer than `width` are split hard so no line
/// exceeds `width` characters. Existing newlines are kept.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let mut current = String::new();
        let mut current_len = 0usize;

        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();

            while word.len() > width {
                if current_len > 0 {
                    lines.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                let rest = word.split_off(width);
                lines.push(word.into_iter().collect());
                word = rest;
            }

            let needed = if current_len == 0 { word.len() } else { current_len + 1 + word.len() };
            if needed > width && current_len > 0 {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current_len += word.len();
            current.extend(word);
        }

        lines.push(current);
    }

    lines
}

/// Truncates to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
