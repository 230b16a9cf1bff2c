//! Article feed records and the date rules applied to feed windows.

use time::{
    Date, Month, OffsetDateTime, format_description::well_known::Rfc3339, macros::format_description,
};

use crate::domain::error::DomainError;

/// Marker left in article descriptions by the ingest stylesheet.
pub const END_TITLE_MARKER: &str = "END_TITLE";

/// A category assignment as rendered into extended feeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedCategory {
    pub main: String,
    pub sub: Option<String>,
}

/// An active article with everything needed to render one feed entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedArticle {
    pub doi: String,
    pub title: String,
    pub description: Option<String>,
    pub rights: Option<String>,
    pub published_at: OffsetDateTime,
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub authors: Vec<String>,
    pub contributors: Vec<String>,
    pub representations: Vec<String>,
    pub categories: Vec<FeedCategory>,
}

impl FeedArticle {
    /// Description with the ingest marker removed.
    pub fn clean_description(&self) -> String {
        self.description
            .as_deref()
            .unwrap_or_default()
            .replace(END_TITLE_MARKER, "")
    }
}

/// Parses a feed window bound given as `YYYY-MM-DD` (midnight UTC) or RFC 3339.
pub fn parse_feed_date(field: &'static str, raw: &str) -> Result<OffsetDateTime, DomainError> {
    let raw = raw.trim();
    if let Ok(date) = Date::parse(raw, format_description!("[year]-[month]-[day]")) {
        return Ok(date.midnight().assume_utc());
    }

    OffsetDateTime::parse(raw, &Rfc3339).map_err(|err| {
        DomainError::validation(field, format!("`{raw}` is neither YYYY-MM-DD nor RFC 3339: {err}"))
    })
}

/// Midnight UTC `months` calendar months before `today`.
///
/// The day of month is clamped to the length of the target month, so 31 May minus three
/// months is 28 or 29 February.
pub fn months_before(today: Date, months: u32) -> Result<OffsetDateTime, DomainError> {
    let months = i32::try_from(months)
        .map_err(|_| DomainError::invariant(format!("month offset {months} out of range")))?;
    let index = today
        .year()
        .checked_mul(12)
        .and_then(|value| value.checked_add(i32::from(u8::from(today.month())) - 1))
        .and_then(|value| value.checked_sub(months))
        .ok_or_else(|| DomainError::invariant(format!("month offset {months} out of range")))?;
    let year = index.div_euclid(12);
    let month_number = u8::try_from(index.rem_euclid(12) + 1)
        .map_err(|_| DomainError::invariant("month index out of range"))?;
    let month = Month::try_from(month_number)
        .map_err(|err| DomainError::invariant(format!("invalid month: {err}")))?;

    let mut day = today.day();
    loop {
        match Date::from_calendar_date(year, month, day) {
            Ok(date) => return Ok(date.midnight().assume_utc()),
            Err(_) if day > 28 => day -= 1,
            Err(err) => {
                return Err(DomainError::invariant(format!(
                    "cannot build {year}-{month_number:02}-{day:02}: {err}"
                )));
            }
        }
    }
}
