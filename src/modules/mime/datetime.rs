// Copyright © 2025 mailforge.dev
// Licensed under MailForge License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::code::ErrorCode;
use crate::modules::error::MailForgeResult;
use crate::modules::mime::{
    Component, FoldingWriter, GenerationContext, ParsedBounds, ParsingContext,
};
use crate::modules::platform;
use crate::modules::stream::OutputStream;
use crate::raise_error;
use chrono::{Datelike, FixedOffset, TimeZone, Timelike};
use serde::{Deserialize, Serialize};

const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];
const DAY_NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// An RFC 5322 date-time with its UTC offset in minutes.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct DateTime {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    /// Minutes east of UTC; `-0230` is `-150`.
    pub zone_offset: i32,
    #[serde(skip)]
    bounds: ParsedBounds,
}

impl Default for DateTime {
    fn default() -> Self {
        Self::epoch()
    }
}

impl DateTime {
    /// 1970-01-01 00:00:00 +0000, the value substituted for unparseable
    /// dates in tolerant mode.
    pub fn epoch() -> Self {
        Self {
            year: 1970,
            month: 1,
            day: 1,
            hour: 0,
            minute: 0,
            second: 0,
            zone_offset: 0,
            bounds: ParsedBounds::default(),
        }
    }

    /// The current local time, from the platform handler.
    pub fn now() -> Self {
        platform::handler().local_now().into()
    }

    pub fn to_chrono(&self) -> MailForgeResult<chrono::DateTime<FixedOffset>> {
        let offset = FixedOffset::east_opt(self.zone_offset * 60).ok_or_else(|| {
            raise_error!(
                format!("invalid zone offset: {} minutes", self.zone_offset),
                ErrorCode::InvalidParameter
            )
        })?;
        offset
            .with_ymd_and_hms(
                self.year,
                self.month,
                self.day,
                self.hour,
                self.minute,
                self.second,
            )
            .single()
            .ok_or_else(|| {
                raise_error!(
                    format!(
                        "invalid calendar date {:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                        self.year, self.month, self.day, self.hour, self.minute, self.second
                    ),
                    ErrorCode::InvalidParameter
                )
            })
    }

    pub fn to_unix_seconds(&self) -> MailForgeResult<i64> {
        Ok(self.to_chrono()?.timestamp())
    }
}

impl From<chrono::DateTime<FixedOffset>> for DateTime {
    fn from(value: chrono::DateTime<FixedOffset>) -> Self {
        Self {
            year: value.year(),
            month: value.month(),
            day: value.day(),
            hour: value.hour(),
            minute: value.minute(),
            second: value.second(),
            zone_offset: value.offset().local_minus_utc() / 60,
            bounds: ParsedBounds::default(),
        }
    }
}

fn named_zone_offset(name: &str) -> Option<i32> {
    // RFC 5322 §4.3 obsolete zone names
    let minutes = match name.to_ascii_uppercase().as_str() {
        "UT" | "GMT" | "UTC" | "Z" => 0,
        "EST" => -5 * 60,
        "EDT" => -4 * 60,
        "CST" => -6 * 60,
        "CDT" => -5 * 60,
        "MST" => -7 * 60,
        "MDT" => -6 * 60,
        "PST" => -8 * 60,
        "PDT" => -7 * 60,
        _ => return None,
    };
    Some(minutes)
}

fn try_parse(raw: &str) -> Option<DateTime> {
    let cleaned = raw.trim();
    // optional leading day-of-week
    let cleaned = match cleaned.split_once(',') {
        Some((_, rest)) => rest.trim_start(),
        None => cleaned,
    };

    let mut tokens = cleaned.split_ascii_whitespace();
    let day: u32 = tokens.next()?.parse().ok()?;
    let month_token = tokens.next()?;
    let month = MONTH_NAMES
        .iter()
        .position(|name| name.eq_ignore_ascii_case(&month_token[..month_token.len().min(3)]))?
        as u32
        + 1;
    let year_token: i64 = tokens.next()?.parse().ok()?;
    // two-digit years per the RFC 5322 obsolete syntax
    let year = if year_token < 50 {
        year_token + 2000
    } else if year_token < 1000 {
        year_token + 1900
    } else {
        year_token
    } as i32;

    let time_token = tokens.next()?;
    let mut clock = time_token.split(':');
    let hour: u32 = clock.next()?.parse().ok()?;
    let minute: u32 = clock.next()?.parse().ok()?;
    let second: u32 = clock.next().map(|s| s.parse().ok()).flatten().unwrap_or(0);

    let zone_offset = match tokens.next() {
        None => 0,
        Some(zone) => {
            if let Some(stripped) = zone.strip_prefix('+').or_else(|| zone.strip_prefix('-')) {
                let value: i32 = stripped.parse().ok()?;
                let minutes = (value / 100) * 60 + value % 100;
                if zone.starts_with('-') {
                    -minutes
                } else {
                    minutes
                }
            } else {
                named_zone_offset(zone).unwrap_or(0)
            }
        }
    };

    if !(1..=31).contains(&day) || hour > 23 || minute > 59 || second > 60 {
        return None;
    }

    Some(DateTime {
        year,
        month,
        day,
        hour,
        minute,
        second,
        zone_offset,
        bounds: ParsedBounds::default(),
    })
}

impl Component for DateTime {
    fn parse(
        &mut self,
        ctx: &ParsingContext,
        buffer: &[u8],
        start: usize,
        end: usize,
    ) -> MailForgeResult<usize> {
        let raw = String::from_utf8_lossy(&buffer[start..end]);
        match try_parse(&raw) {
            Some(parsed) => {
                *self = parsed;
            }
            None if ctx.strict => {
                return Err(raise_error!(
                    format!("unparseable date: '{}'", raw.trim()),
                    ErrorCode::ParseError
                ));
            }
            None => {
                *self = Self::epoch();
            }
        }
        self.bounds = ParsedBounds { start, end };
        Ok(end)
    }

    fn generate(
        &self,
        ctx: &GenerationContext,
        out: &mut dyn OutputStream,
        cur_col: usize,
    ) -> MailForgeResult<usize> {
        let day_name = self
            .to_chrono()
            .map(|dt| DAY_NAMES[dt.weekday().num_days_from_monday() as usize])
            .unwrap_or("Thu");
        let sign = if self.zone_offset < 0 { '-' } else { '+' };
        let offset = self.zone_offset.abs();
        let formatted = format!(
            "{}, {} {} {:04} {:02}:{:02}:{:02} {}{:02}{:02}",
            day_name,
            self.day,
            MONTH_NAMES[(self.month.clamp(1, 12) - 1) as usize],
            self.year,
            self.hour,
            self.minute,
            self.second,
            sign,
            offset / 60,
            offset % 60
        );
        let mut writer = FoldingWriter::new(out, cur_col, ctx.wrap_column());
        writer.write_atom(formatted.as_bytes())?;
        Ok(writer.column())
    }

    fn parsed_bounds(&self) -> ParsedBounds {
        self.bounds
    }
}
