/// Parses a scraped price such as `€1.234,56`, `$1,234.00` or `1,234` into
/// euros. Returns `None` when nothing numeric is left.
pub fn to_euro(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|ch| !matches!(ch, '\u{a0}' | '€' | '$'))
        .collect();
    let cleaned = cleaned.trim();

    let normalised = match (cleaned.rfind(','), cleaned.rfind('.')) {
        // Both separators present: whichever comes last is the decimal mark.
        (Some(comma), Some(dot)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) => cleaned.replace(',', ""),
        (None, Some(dot)) if cleaned.len() - dot - 1 == 3 => cleaned.replace('.', ""),
        _ => cleaned.to_string(),
    };

    normalised.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Parses a bathroom description such as `1.5 baths`, `1,5` or `Half-bath`.
pub fn simple_bath(raw: &str) -> Option<f64> {
    let lowered = raw.to_lowercase().replace(',', ".");
    if lowered.contains("half") && !lowered.chars().any(|ch| ch.is_ascii_digit()) {
        return Some(0.5);
    }

    let number: String = lowered
        .chars()
        .skip_while(|ch| !(ch.is_ascii_digit() || *ch == '.'))
        .take_while(|ch| ch.is_ascii_digit() || *ch == '.')
        .collect();

    if number.is_empty() {
        return None;
    }
    number.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn euro_amounts_in_local_formats() {
        assert_eq!(to_euro("€1.234,56"), Some(1234.56));
        assert_eq!(to_euro("1,234"), Some(1234.0));
        assert_eq!(to_euro("999"), Some(999.0));
        assert_eq!(to_euro("1.234"), Some(1234.0));
        assert_eq!(to_euro("$1,234.50"), Some(1234.5));
        assert_eq!(to_euro("\u{a0}€ 85.00"), Some(85.0));
    }

    #[test]
    fn unparsable_prices_are_none() {
        assert_eq!(to_euro("on request"), None);
        assert_eq!(to_euro(""), None);
        assert_eq!(to_euro("inf"), None);
    }

    #[test]
    fn bathroom_descriptions() {
        assert_eq!(simple_bath("1.5 baths"), Some(1.5));
        assert_eq!(simple_bath("1,5"), Some(1.5));
        assert_eq!(simple_bath("half bath"), Some(0.5));
        assert_eq!(simple_bath("Shared half-bath"), Some(0.5));
        assert_eq!(simple_bath("2 shared baths"), Some(2.0));
        assert_eq!(simple_bath("bath"), None);
    }
}
