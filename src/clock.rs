//! Calendar time from the telemetry service and the RTC boundary.

use std::fmt;
use std::time::Instant;

use serde::Serialize;
use tracing::debug;

use crate::errors::{Error, Result};

/// One parsed wall-clock sample, laid out the way the RTC register takes
/// it. `dst` is always `None`: the time service reply has no way to say.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRecord {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// ISO weekday, 1 = Monday.
    pub weekday: u8,
    /// Day of year, 1-based.
    pub yearday: u16,
    pub dst: Option<bool>,
}

impl fmt::Display for TimeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// Parse the strftime integration reply, requested as
/// `%Y-%m-%d %H:%M:%S.%L %j %u %z %Z`:
///
/// ```text
/// 2023-05-01 14:30:00.123 121 1 +0000 UTC
/// ```
///
/// Offset and zone abbreviation are carried in the reply but not in the
/// record; sub-second precision is dropped.
pub fn parse_strftime(body: &str) -> Result<TimeRecord> {
    let fields: Vec<&str> = body.split_whitespace().collect();
    if fields.len() < 4 {
        return Err(Error::TimeLookup(format!(
            "expected at least 4 fields in time reply, got {} in {:?}",
            fields.len(),
            body
        )));
    }

    let date: Vec<&str> = fields[0].split('-').collect();
    if date.len() != 3 {
        return Err(Error::TimeLookup(format!(
            "date field {:?} is not YYYY-MM-DD",
            fields[0]
        )));
    }
    let year = num(date[0], "year")?;
    let month = num(date[1], "month")?;
    let day = num(date[2], "day")?;

    let hms = fields[1].split('.').next().unwrap_or(fields[1]);
    let time: Vec<&str> = hms.split(':').collect();
    if time.len() != 3 {
        return Err(Error::TimeLookup(format!(
            "time field {:?} is not HH:MM:SS",
            fields[1]
        )));
    }
    let hour = num(time[0], "hour")?;
    let minute = num(time[1], "minute")?;
    let second = num(time[2], "second")?;

    Ok(TimeRecord {
        year,
        month,
        day,
        hour,
        minute,
        second,
        weekday: num(fields[3], "weekday")?,
        yearday: num(fields[2], "day-of-year")?,
        dst: None,
    })
}

fn num<T: std::str::FromStr>(field: &str, what: &str) -> Result<T> {
    field
        .parse()
        .map_err(|_| Error::TimeLookup(format!("{what} field {field:?} is not a number")))
}

/// Write-only sink for the parsed timestamp.
pub trait Rtc {
    fn set_datetime(&mut self, t: &TimeRecord);
}

/// Soft RTC for hosts without a hardware clock register: keeps the last
/// written record together with the monotonic instant it was written.
pub struct SoftRtc {
    base: Option<(TimeRecord, Instant)>,
}

impl SoftRtc {
    pub fn new() -> Self {
        Self { base: None }
    }

    pub fn last_sync(&self) -> Option<&TimeRecord> {
        self.base.as_ref().map(|(t, _)| t)
    }

    pub fn seconds_since_sync(&self) -> Option<u64> {
        self.base.as_ref().map(|(_, at)| at.elapsed().as_secs())
    }
}

impl Default for SoftRtc {
    fn default() -> Self {
        Self::new()
    }
}

impl Rtc for SoftRtc {
    fn set_datetime(&mut self, t: &TimeRecord) {
        debug!("RTC set to {}", t);
        self.base = Some((*t, Instant::now()));
    }
}
