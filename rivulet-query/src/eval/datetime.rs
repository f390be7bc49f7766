//! Date-time built-ins over `xsd:dateTime` literals.

use crate::error::{QueryError, Result};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, Timelike, Utc};
use rivulet_core::vocab::xsd;
use rivulet_core::{Literal, Term};
use std::cmp::Ordering;

fn expr_err<T>(msg: impl Into<String>) -> Result<T> {
    Err(QueryError::expression(msg))
}

/// A parsed `xsd:dateTime` value; the timezone is optional.
struct Parsed {
    naive: NaiveDateTime,
    offset: Option<FixedOffset>,
}

fn parse(lit: &Literal) -> Result<Parsed> {
    if lit.datatype.as_ref() != xsd::DATE_TIME {
        return expr_err(format!("not an xsd:dateTime literal: {}", lit.value));
    }
    let text = lit.value.trim();
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(text) {
        return Ok(Parsed {
            naive: with_offset.naive_utc(),
            offset: Some(*with_offset.offset()),
        });
    }
    match NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        Ok(naive) => Ok(Parsed {
            naive,
            offset: None,
        }),
        Err(e) => expr_err(format!("bad xsd:dateTime lexical form `{text}`: {e}")),
    }
}

/// Value comparison of two dateTime literals.
pub fn compare(a: &Literal, b: &Literal) -> Result<Ordering> {
    let (pa, pb) = (parse(a)?, parse(b)?);
    Ok(pa.naive.cmp(&pb.naive))
}

fn local(parsed: &Parsed) -> NaiveDateTime {
    match parsed.offset {
        Some(offset) => parsed.naive + offset,
        None => parsed.naive,
    }
}

fn datetime_arg(args: &[Term]) -> Result<Parsed> {
    let [Term::Literal(lit)] = args else {
        return expr_err("expected one xsd:dateTime argument");
    };
    parse(lit)
}

/// Strict date-time built-ins.
pub fn call(name: &str, args: &[Term]) -> Result<Term> {
    if name == "now" {
        if !args.is_empty() {
            return expr_err("NOW takes no arguments");
        }
        let stamp = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        return Ok(Term::typed_literal(stamp, xsd::DATE_TIME));
    }
    let parsed = datetime_arg(args)?;
    let value = local(&parsed);
    match name {
        "year" => Ok(Term::integer(value.year() as i64)),
        "month" => Ok(Term::integer(value.month() as i64)),
        "day" => Ok(Term::integer(value.day() as i64)),
        "hours" => Ok(Term::integer(value.hour() as i64)),
        "minutes" => Ok(Term::integer(value.minute() as i64)),
        "seconds" => {
            let seconds =
                value.second() as f64 + f64::from(value.nanosecond()) / 1_000_000_000.0;
            Ok(Term::typed_literal(
                if seconds.fract() == 0.0 {
                    format!("{}", seconds as i64)
                } else {
                    seconds.to_string()
                },
                xsd::DECIMAL,
            ))
        }
        "tz" => Ok(Term::literal(match parsed.offset {
            None => String::new(),
            Some(offset) if offset.local_minus_utc() == 0 => "Z".to_string(),
            Some(offset) => offset.to_string(),
        })),
        "timezone" => match parsed.offset {
            None => expr_err("TIMEZONE: no timezone present"),
            Some(offset) => Ok(Term::typed_literal(
                offset_duration(offset.local_minus_utc()),
                "http://www.w3.org/2001/XMLSchema#dayTimeDuration",
            )),
        },
        other => expr_err(format!("unknown date-time function `{other}`")),
    }
}

/// Render seconds-from-UTC as an `xsd:dayTimeDuration` lexical form.
fn offset_duration(seconds: i32) -> String {
    if seconds == 0 {
        return "PT0S".to_string();
    }
    let sign = if seconds < 0 { "-" } else { "" };
    let seconds = seconds.abs();
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    match (hours, minutes) {
        (h, 0) => format!("{sign}PT{h}H"),
        (0, m) => format!("{sign}PT{m}M"),
        (h, m) => format!("{sign}PT{h}H{m}M"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(text: &str) -> Term {
        Term::typed_literal(text, xsd::DATE_TIME)
    }

    #[test]
    fn test_accessors() {
        let stamp = dt("2011-01-10T14:45:13.815-05:00");
        assert_eq!(call("year", &[stamp.clone()]).unwrap(), Term::integer(2011));
        assert_eq!(call("month", &[stamp.clone()]).unwrap(), Term::integer(1));
        assert_eq!(call("hours", &[stamp.clone()]).unwrap(), Term::integer(14));
        assert_eq!(call("tz", &[stamp]).unwrap(), Term::literal("-05:00"));
    }

    #[test]
    fn test_tz_without_offset_is_empty() {
        let stamp = dt("2011-01-10T14:45:13");
        assert_eq!(call("tz", &[stamp.clone()]).unwrap(), Term::literal(""));
        assert!(call("timezone", &[stamp]).is_err());
    }

    #[test]
    fn test_compare_across_offsets() {
        let a = Term::Literal(rivulet_core::Literal::typed(
            "2011-01-10T20:00:00Z",
            xsd::DATE_TIME,
        ));
        let b = Term::Literal(rivulet_core::Literal::typed(
            "2011-01-10T15:00:00-05:00",
            xsd::DATE_TIME,
        ));
        match (a, b) {
            (Term::Literal(la), Term::Literal(lb)) => {
                assert_eq!(compare(&la, &lb).unwrap(), Ordering::Equal);
            }
            _ => unreachable!(),
        }
    }
}
