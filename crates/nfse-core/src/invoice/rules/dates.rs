//! Date and competence normalization.

use chrono::{Datelike, NaiveDate};

use super::patterns::{COMPETENCE_MY, COMPETENCE_YM, DATE_DMY, DATE_YMD};

/// Parse an issue date in `DD/MM/YYYY` or a common alternate form.
///
/// Accepted alternates: `DD.MM.YYYY`, `DD-MM-YYYY`, ISO `YYYY-MM-DD`
/// (optionally followed by a time part).
pub fn parse_issue_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();

    if let Some(caps) = DATE_DMY.captures(s) {
        let day: u32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let year: i32 = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if let Some(caps) = DATE_YMD.captures(s) {
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let day: u32 = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    None
}

/// Render a date as `DD/MM/YYYY`.
pub fn format_issue_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Normalize a competence to `MM/YYYY`.
///
/// Accepts `MM/YYYY`, `M-YYYY`, `YYYY-MM` and full dates (the day is dropped).
pub fn normalize_competence(s: &str) -> Option<String> {
    let s = s.trim();

    let (month, year): (u32, i32) = if let Some(caps) = COMPETENCE_MY.captures(s) {
        (caps[1].parse().ok()?, caps[2].parse().ok()?)
    } else if let Some(caps) = COMPETENCE_YM.captures(s) {
        (caps[2].parse().ok()?, caps[1].parse().ok()?)
    } else {
        let date = parse_issue_date(s)?;
        (date.month(), date.year())
    };

    (1..=12)
        .contains(&month)
        .then(|| format!("{month:02}/{year:04}"))
}

/// Competence derived from an issue date.
pub fn competence_of(date: NaiveDate) -> String {
    format!("{:02}/{:04}", date.month(), date.year())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn normalize_issue_date(s: &str) -> Option<String> {
        parse_issue_date(s).map(format_issue_date)
    }

    #[test]
    fn test_normalize_issue_date() {
        assert_eq!(normalize_issue_date("05/03/2024"), Some("05/03/2024".to_string()));
        assert_eq!(normalize_issue_date("5/3/2024"), Some("05/03/2024".to_string()));
        assert_eq!(normalize_issue_date("2024-03-05"), Some("05/03/2024".to_string()));
        assert_eq!(
            normalize_issue_date("2024-03-05T10:11:12"),
            Some("05/03/2024".to_string())
        );
        assert_eq!(normalize_issue_date("05.03.2024"), Some("05/03/2024".to_string()));
    }

    #[test]
    fn test_invalid_dates_are_rejected() {
        assert_eq!(normalize_issue_date("31/02/2024"), None);
        assert_eq!(normalize_issue_date("29/02/2023"), None);
        assert_eq!(normalize_issue_date("ontem"), None);
        assert_eq!(normalize_issue_date(""), None);
    }

    #[test]
    fn test_normalize_competence() {
        assert_eq!(normalize_competence("03/2024"), Some("03/2024".to_string()));
        assert_eq!(normalize_competence("3-2024"), Some("03/2024".to_string()));
        assert_eq!(normalize_competence("2024-03"), Some("03/2024".to_string()));
        assert_eq!(normalize_competence("05/03/2024"), Some("03/2024".to_string()));
        assert_eq!(normalize_competence("13/2024"), None);
        assert_eq!(normalize_competence("março"), None);
    }

    #[test]
    fn test_competence_of() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(competence_of(date), "01/2024");
    }
}
