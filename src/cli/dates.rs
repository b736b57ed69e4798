use anyhow::Result;
use chrono::{DateTime, Local, NaiveDate};
use chrono_english::{parse_date_string, Dialect};
use clap::CommandFactory;

use super::Args;

pub const DATE_HELP: &str =
    "Day to use. Examples are \"today\", \"yesterday\", \"15/03/2025\", \"last friday\"";

/// Parses a day typed by the user relative to `now`. Dates are day/month/year. Without input
/// `default` is used.
pub fn parse_day(input: Option<&str>, now: DateTime<Local>, default: NaiveDate) -> Result<NaiveDate> {
    let Some(input) = input else {
        return Ok(default);
    };
    match parse_date_string(input, now, Dialect::Uk) {
        Ok(v) => Ok(v.date_naive()),
        Err(e) => Err(Args::command()
            .error(
                clap::error::ErrorKind::ValueValidation,
                format!("Failed to validate date \"{input}\" {e}"),
            )
            .into()),
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{Local, TimeZone};

    use super::*;

    #[test]
    fn test_parse_day() -> Result<()> {
        let now = Local.with_ymd_and_hms(2025, 3, 16, 12, 0, 0).unwrap();
        let today = now.date_naive();

        assert_eq!(parse_day(None, now, today)?, today);
        assert_eq!(
            parse_day(Some("yesterday"), now, today)?,
            NaiveDate::from_ymd_opt(2025, 3, 15).unwrap()
        );
        assert_eq!(
            parse_day(Some("02/03/2025"), now, today)?,
            NaiveDate::from_ymd_opt(2025, 3, 2).unwrap()
        );
        assert!(parse_day(Some("not a date"), now, today).is_err());
        Ok(())
    }
}
