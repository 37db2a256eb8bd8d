/// Locale-tolerant number parsing. Comma is read as a decimal point and every
/// character outside digits, sign and period is dropped.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| if c == ',' { '.' } else { c })
        .filter(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|value| value.is_finite())
}

pub fn parse_number_or_zero(raw: &str) -> f64 {
    parse_number(raw).unwrap_or(0.0)
}

pub fn parse_count(raw: &str) -> u32 {
    let value = parse_number_or_zero(raw);
    if value <= 0.0 {
        0
    } else {
        value.round().min(f64::from(u32::MAX)) as u32
    }
}

/// Finds a header column by name.
///
/// Order: exact match on any candidate, then case-insensitive match on any
/// candidate, then the first header containing the first candidate.
pub fn resolve_column(header: &[String], candidates: &[&str]) -> Option<usize> {
    for candidate in candidates {
        if let Some(index) = header.iter().position(|h| h.trim() == *candidate) {
            return Some(index);
        }
    }

    for candidate in candidates {
        if let Some(index) = header
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(candidate))
        {
            return Some(index);
        }
    }

    let first = candidates.first()?.to_lowercase();
    if first.is_empty() {
        return None;
    }
    header
        .iter()
        .position(|h| h.to_lowercase().contains(&first))
}

pub fn cell(row: &[String], column: Option<usize>) -> &str {
    column
        .and_then(|index| row.get(index))
        .map(|value| value.trim())
        .unwrap_or("")
}

pub fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn parses_comma_decimals_and_noise() {
        assert_eq!(parse_number("4,5"), Some(4.5));
        assert_eq!(parse_number(" 6.2% "), Some(6.2));
        assert_eq!(parse_number("-3"), Some(-3.0));
        assert_eq!(parse_number("approx 7"), Some(7.0));
    }

    #[test]
    fn garbage_degrades_instead_of_failing() {
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("n/a"), None);
        assert_eq!(parse_number("1.2.3"), None);
        assert_eq!(parse_number("--"), None);
        assert_eq!(parse_number_or_zero("oops"), 0.0);
        assert_eq!(parse_count("12,0"), 12);
        assert_eq!(parse_count("-4"), 0);
        assert_eq!(parse_count(""), 0);
    }

    #[test]
    fn exact_match_wins_over_case_insensitive() {
        let cols = header(&["abv", "ABV"]);
        assert_eq!(resolve_column(&cols, &["ABV"]), Some(1));
    }

    #[test]
    fn later_candidate_exact_beats_first_candidate_case_insensitive() {
        let cols = header(&["beer name", "Name"]);
        assert_eq!(resolve_column(&cols, &["Beer Name", "Name"]), Some(1));
    }

    #[test]
    fn falls_back_to_case_insensitive_then_substring() {
        let cols = header(&["Timestamp", "entryid", "Beer Label (upload)"]);
        assert_eq!(resolve_column(&cols, &["EntryID"]), Some(1));
        assert_eq!(resolve_column(&cols, &["Beer Label"]), Some(2));
    }

    #[test]
    fn not_found_is_distinct_from_first_column() {
        let cols = header(&["EntryID", "Beer"]);
        assert_eq!(resolve_column(&cols, &["EntryID"]), Some(0));
        assert_eq!(resolve_column(&cols, &["Votes"]), None);
        assert_eq!(resolve_column(&cols, &[]), None);
    }

    #[test]
    fn cell_handles_short_rows_and_missing_columns() {
        let row = header(&[" B-001 "]);
        assert_eq!(cell(&row, Some(0)), "B-001");
        assert_eq!(cell(&row, Some(4)), "");
        assert_eq!(cell(&row, None), "");
    }
}
