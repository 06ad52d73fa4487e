//! The `math` and `time` modules exposed to scripts.
//!
//! `json` comes from the interpreter's own library extension; these two are
//! the extras scripts keep needing for glue work between tool calls.

use std::fmt::{self, Display};

use allocative::Allocative;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, Timelike};
use starlark::environment::GlobalsBuilder;
use starlark::starlark_module;
use starlark::starlark_simple_value;
use starlark::values::float::StarlarkFloat;
use starlark::values::{starlark_value, Heap, NoSerialize, ProvidesStaticType, StarlarkValue, Value};

#[starlark_module]
pub(crate) fn math_module(builder: &mut GlobalsBuilder) {
    fn sqrt(x: StarlarkFloat) -> anyhow::Result<f64> {
        Ok(x.0.sqrt())
    }

    fn pow(x: StarlarkFloat, y: StarlarkFloat) -> anyhow::Result<f64> {
        Ok(x.0.powf(y.0))
    }

    /// Natural logarithm, or logarithm in `base` when given.
    fn log(x: StarlarkFloat, base: Option<StarlarkFloat>) -> anyhow::Result<f64> {
        Ok(match base {
            Some(base) => x.0.log(base.0),
            None => x.0.ln(),
        })
    }

    fn exp(x: StarlarkFloat) -> anyhow::Result<f64> {
        Ok(x.0.exp())
    }

    fn floor(x: StarlarkFloat) -> anyhow::Result<f64> {
        Ok(x.0.floor())
    }

    fn ceil(x: StarlarkFloat) -> anyhow::Result<f64> {
        Ok(x.0.ceil())
    }

    fn round(x: StarlarkFloat) -> anyhow::Result<f64> {
        Ok(x.0.round())
    }

    fn fabs(x: StarlarkFloat) -> anyhow::Result<f64> {
        Ok(x.0.abs())
    }
}

/// A parsed timestamp, exposed to scripts as an attribute bag.
#[derive(Debug, Clone, ProvidesStaticType, NoSerialize, Allocative)]
pub(crate) struct StarlarkTime {
    #[allocative(skip)]
    instant: DateTime<FixedOffset>,
}

starlark_simple_value!(StarlarkTime);

impl Display for StarlarkTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.instant.to_rfc3339())
    }
}

#[starlark_value(type = "time")]
impl<'v> StarlarkValue<'v> for StarlarkTime {
    fn get_attr(&self, attribute: &str, heap: &'v Heap) -> Option<Value<'v>> {
        match attribute {
            "year" => Some(heap.alloc(i64::from(self.instant.year()))),
            "month" => Some(heap.alloc(i64::from(self.instant.month()))),
            "day" => Some(heap.alloc(i64::from(self.instant.day()))),
            "hour" => Some(heap.alloc(i64::from(self.instant.hour()))),
            "minute" => Some(heap.alloc(i64::from(self.instant.minute()))),
            "second" => Some(heap.alloc(i64::from(self.instant.second()))),
            "unix" => Some(heap.alloc(self.instant.timestamp())),
            _ => None,
        }
    }

    fn dir_attr(&self) -> Vec<String> {
        ["year", "month", "day", "hour", "minute", "second", "unix"]
            .into_iter()
            .map(str::to_owned)
            .collect()
    }
}

#[starlark_module]
pub(crate) fn time_module(builder: &mut GlobalsBuilder) {
    /// Parses a timestamp string, RFC 3339 by default or per a strftime
    /// `format`. Formats without a time of day parse as midnight UTC.
    fn parse_time(x: &str, format: Option<&str>) -> anyhow::Result<StarlarkTime> {
        let instant = match format {
            None => DateTime::parse_from_rfc3339(x)?,
            Some(format) => match NaiveDateTime::parse_from_str(x, format) {
                Ok(naive) => naive.and_utc().fixed_offset(),
                Err(datetime_err) => match NaiveDate::parse_from_str(x, format) {
                    Ok(date) => match date.and_hms_opt(0, 0, 0) {
                        Some(naive) => naive.and_utc().fixed_offset(),
                        None => return Err(datetime_err.into()),
                    },
                    Err(_) => return Err(datetime_err.into()),
                },
            },
        };
        Ok(StarlarkTime { instant })
    }
}
