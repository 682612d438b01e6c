use chrono::{Datelike, NaiveDate, SecondsFormat, Utc};
use thiserror::Error;

/// Jalali month names, Farvardin first.
pub const MONTH_NAMES: [&str; 12] = [
    "Farvardin",
    "Ordibehesht",
    "Khordad",
    "Tir",
    "Mordad",
    "Shahrivar",
    "Mehr",
    "Aban",
    "Azar",
    "Dey",
    "Bahman",
    "Esfand",
];

/// Saturday-first weekday headers for a Jalali month grid.
pub const WEEKDAY_NAMES: [&str; 7] = ["Sh", "Ye", "Do", "Se", "Ch", "Pa", "Jo"];

/// A date in the Jalali (Solar Hijri) calendar.
///
/// Months run 1-12; days run 1 to `jalali_month_length(year, month)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JalaliDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("Jalali year {0} is outside the supported range")]
    YearOutOfRange(i32),
    #[error("Date {0} cannot be represented in the Jalali calendar")]
    DateOutOfRange(NaiveDate),
}

// Years in which the length of the 33-year leap cycle changes, from the
// Borkowski reconstruction of the Jalali calendar. Valid input years are
// BREAKS[0] ..= BREAKS[last] - 1.
const BREAKS: [i32; 20] = [
    -61, 9, 38, 199, 426, 686, 756, 818, 1111, 1181, 1210, 1635, 2060, 2097, 2192, 2262, 2324,
    2394, 2456, 3178,
];

// All division below truncates toward zero, which is what the reference
// 33-year cycle arithmetic assumes. Rust's `/` and `%` on i32 already do
// this, so the expressions carry over unchanged.

struct CycleInfo {
    /// Years elapsed since the last leap year, 0 meaning this year is leap.
    leap: i32,
    /// Gregorian year of this Jalali year's first day.
    gy: i32,
    /// Gregorian March day on which this Jalali year begins.
    march: i32,
}

fn jal_cal(jy: i32) -> Result<CycleInfo, CalendarError> {
    if jy < BREAKS[0] || jy >= BREAKS[BREAKS.len() - 1] {
        return Err(CalendarError::YearOutOfRange(jy));
    }

    let gy = jy + 621;
    let mut leap_j = -14;
    let mut jp = BREAKS[0];
    let mut jump = 0;

    for &jm in &BREAKS[1..] {
        jump = jm - jp;
        if jy < jm {
            break;
        }
        leap_j += jump / 33 * 8 + jump % 33 / 4;
        jp = jm;
    }
    let mut n = jy - jp;

    leap_j += n / 33 * 8 + (n % 33 + 3) / 4;
    if jump % 33 == 4 && jump - n == 4 {
        leap_j += 1;
    }

    let leap_g = gy / 4 - (gy / 100 + 1) * 3 / 4 - 150;
    let march = 20 + leap_j - leap_g;

    if jump - n < 6 {
        n = n - jump + (jump + 4) / 33 * 33;
    }
    let mut leap = ((n + 1) % 33 - 1) % 4;
    if leap == -1 {
        leap = 4;
    }

    Ok(CycleInfo { leap, gy, march })
}

/// Julian day number of a Gregorian calendar date.
fn g2d(gy: i32, gm: i32, gd: i32) -> i32 {
    let d = (gy + (gm - 8) / 6 + 100100) * 1461 / 4 + (153 * ((gm + 9) % 12) + 2) / 5 + gd
        - 34840408;
    d - (gy + 100100 + (gm - 8) / 6) / 100 * 3 / 4 + 752
}

/// Gregorian calendar date of a Julian day number.
fn d2g(jdn: i32) -> (i32, i32, i32) {
    let mut j = 4 * jdn + 139361631;
    j += (4 * jdn + 183187720) / 146097 * 3 / 4 * 4 - 3908;
    let i = j % 1461 / 4 * 5 + 308;
    let gd = i % 153 / 5 + 1;
    let gm = i / 153 % 12 + 1;
    let gy = j / 1461 - 100100 + (8 - gm) / 6;
    (gy, gm, gd)
}

fn j2d(d: JalaliDate) -> Result<i32, CalendarError> {
    let r = jal_cal(d.year)?;
    let jm = d.month as i32;
    Ok(g2d(r.gy, 3, r.march) + (jm - 1) * 31 - jm / 7 * (jm - 7) + d.day as i32 - 1)
}

fn d2j(jdn: i32) -> Result<JalaliDate, CalendarError> {
    let (gy, _, _) = d2g(jdn);
    let mut jy = gy - 621;
    let r = jal_cal(jy)?;
    let jdn1f = g2d(gy, 3, r.march);

    // Days passed since 1 Farvardin of jy.
    let mut k = jdn - jdn1f;
    if k >= 0 {
        if k <= 185 {
            // The first six 31-day months.
            return Ok(JalaliDate {
                year: jy,
                month: (1 + k / 31) as u32,
                day: (k % 31 + 1) as u32,
            });
        }
        k -= 186;
    } else {
        // The last months of the previous Jalali year.
        jy -= 1;
        k += 179;
        if r.leap == 1 {
            k += 1;
        }
    }
    Ok(JalaliDate {
        year: jy,
        month: (7 + k / 30) as u32,
        day: (k % 30 + 1) as u32,
    })
}

/// Convert a Gregorian date to its Jalali representation.
pub fn gregorian_to_jalali(date: NaiveDate) -> Result<JalaliDate, CalendarError> {
    let jdn = g2d(date.year(), date.month() as i32, date.day() as i32);
    d2j(jdn).map_err(|_| CalendarError::DateOutOfRange(date))
}

/// Convert a Jalali date back to the Gregorian calendar.
pub fn jalali_to_gregorian(date: JalaliDate) -> Result<NaiveDate, CalendarError> {
    let (gy, gm, gd) = d2g(j2d(date)?);
    NaiveDate::from_ymd_opt(gy, gm as u32, gd as u32)
        .ok_or(CalendarError::YearOutOfRange(date.year))
}

/// True if `jy` gets an extra day in Esfand.
pub fn is_jalali_leap_year(jy: i32) -> bool {
    jal_cal(jy).map(|r| r.leap == 0).unwrap_or(false)
}

/// Number of days in a Jalali month: 31 for months 1-6, 30 for 7-11,
/// and 30 or 29 for Esfand depending on the leap year.
pub fn jalali_month_length(jy: i32, jm: u32) -> u32 {
    if jm <= 6 {
        31
    } else if jm <= 11 {
        30
    } else if is_jalali_leap_year(jy) {
        30
    } else {
        29
    }
}

/// Parse a canonical `YYYY-MM-DD` string into a date.
///
/// Rejects anything that is not zero-padded ISO form, and rejects
/// well-formed strings that name no real day (e.g. `2024-02-30`).
pub fn parse_iso_date(value: &str) -> Option<NaiveDate> {
    let bytes = value.as_bytes();
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return None;
    }
    if !bytes
        .iter()
        .enumerate()
        .all(|(i, b)| matches!(i, 4 | 7) || b.is_ascii_digit())
    {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

/// Convert an ISO date string to Jalali parts, or `None` when the string is
/// malformed or falls outside the supported calendar range.
pub fn iso_to_jalali(value: &str) -> Option<JalaliDate> {
    let date = parse_iso_date(value)?;
    match gregorian_to_jalali(date) {
        Ok(parts) => Some(parts),
        Err(err) => {
            tracing::warn!(%value, %err, "jalali conversion failed");
            None
        }
    }
}

/// Render Jalali parts as a zero-padded ISO `YYYY-MM-DD` string.
pub fn jalali_to_iso(parts: JalaliDate) -> Result<String, CalendarError> {
    let date = jalali_to_gregorian(parts)?;
    Ok(format_iso_date(date))
}

/// Render a date as a zero-padded ISO `YYYY-MM-DD` string.
pub fn format_iso_date(date: NaiveDate) -> String {
    format!("{:04}-{:02}-{:02}", date.year(), date.month(), date.day())
}

/// Render an ISO date as `jy/mm/dd` in the Jalali calendar.
/// Falls back to the input unchanged when conversion fails, so unknown
/// dates degrade to something displayable instead of an error.
pub fn format_jalali_date(value: &str) -> String {
    match iso_to_jalali(value) {
        Some(p) => format!("{}/{:02}/{:02}", p.year, p.month, p.day),
        None => value.to_string(),
    }
}

/// Today's date as an ISO string (UTC wall clock).
pub fn today_iso() -> String {
    format_iso_date(Utc::now().date_naive())
}

/// Tomorrow's date as an ISO string (UTC wall clock).
pub fn tomorrow_iso() -> Option<String> {
    Utc::now().date_naive().succ_opt().map(format_iso_date)
}

/// Current timestamp as RFC 3339, used for created/updated columns.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// A month position in the Jalali calendar with a selected day, as used by
/// month-at-a-time navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthCursor {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl MonthCursor {
    pub fn new(parts: JalaliDate) -> Self {
        Self {
            year: parts.year,
            month: parts.month,
            day: parts.day,
        }
    }

    /// Move the cursor by whole months, rolling the year over at the month
    /// boundaries and clamping the selected day when the target month is
    /// shorter than the current selection.
    pub fn step(self, months: i32) -> Self {
        let total = self.year * 12 + self.month as i32 - 1 + months;
        let year = total.div_euclid(12);
        let month = total.rem_euclid(12) as u32 + 1;
        let day = self.day.min(jalali_month_length(year, month));
        Self { year, month, day }
    }

    /// Column (0-6) of day 1 of this month in a Saturday-first week row.
    pub fn first_weekday_offset(self) -> Option<u32> {
        let first = jalali_to_gregorian(JalaliDate {
            year: self.year,
            month: self.month,
            day: 1,
        })
        .ok()?;
        Some((first.weekday().num_days_from_sunday() + 1) % 7)
    }

    /// Number of days in the month under the cursor.
    pub fn month_length(self) -> u32 {
        jalali_month_length(self.year, self.month)
    }
}
