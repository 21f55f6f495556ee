//! Parsers for the small duration/rate/backoff grammar used in queue
//! configuration strings.
//!
//! Each concept gets its own `FromStr` newtype, the way
//! `hook-worker::config::{EnvMsDuration, NonEmptyString}` does, so these
//! compose directly with `envconfig`'s derive when used as config fields.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// A parsed duration: an integer or decimal magnitude followed by a unit
/// (`s`, `m`, `h`, `d`, `w`); bare digits default to seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedDuration(pub Duration);

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("{0:?} is not a valid duration")]
pub struct ParseDurationError(String);

impl FromStr for ParsedDuration {
    type Err = ParseDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseDurationError(s.to_owned()));
        }

        let split_at = s
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(s.len());
        let (magnitude, unit) = s.split_at(split_at);

        let magnitude: f64 = magnitude
            .parse()
            .map_err(|_| ParseDurationError(s.to_owned()))?;
        if magnitude < 0.0 {
            return Err(ParseDurationError(s.to_owned()));
        }

        let seconds_per_unit = match unit {
            "" | "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            "d" => 86_400.0,
            "w" => 604_800.0,
            _ => return Err(ParseDurationError(s.to_owned())),
        };

        Ok(ParsedDuration(Duration::from_secs_f64(
            magnitude * seconds_per_unit,
        )))
    }
}

impl fmt::Display for ParsedDuration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}s", self.0.as_secs_f64())
    }
}

/// A parsed `"N/unit"` rate limit spec, e.g. `"10/s"` or `"1/m"`. A bare
/// unit with no leading digit on the right-hand side implies `1`, so
/// `"1/s"` and `"1/1s"` parse identically.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateSpec {
    pub max_events: u32,
    pub window: Duration,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("{0:?} is not a valid rate limit spec")]
pub struct ParseRateSpecError(String);

impl FromStr for RateSpec {
    type Err = ParseRateSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let original = s;
        let s = s.trim();
        let (count, window) = s
            .split_once('/')
            .ok_or_else(|| ParseRateSpecError(original.to_owned()))?;

        let max_events: u32 = count
            .trim()
            .parse()
            .map_err(|_| ParseRateSpecError(original.to_owned()))?;

        let window = window.trim();
        let window = if window.starts_with(|c: char| c.is_ascii_digit()) {
            window.to_owned()
        } else {
            format!("1{window}")
        };

        let ParsedDuration(window) =
            window.parse().map_err(|_| ParseRateSpecError(original.to_owned()))?;

        Ok(RateSpec { max_events, window })
    }
}

impl fmt::Display for RateSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.max_events, ParsedDuration(self.window))
    }
}

/// The shape of a parsed backoff curve: `initial`, `mode`, `step`, `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffSpec {
    pub initial: Duration,
    pub mode: BackoffMode,
    pub step: Duration,
    pub max: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffMode {
    Linear,
    Exponential,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("{0:?} is not a valid backoff spec")]
pub struct ParseBackoffError(String);

impl BackoffSpec {
    /// Parse the `"initial; [lin|exp] step; max"` grammar, given in full
    /// (three fields), as `"initial; mode step"` (max derived from
    /// `step * max_retries`), or as a bare `"mode step"` (initial = step,
    /// max derived the same way) — spec.md §4.1's abbreviated forms.
    pub fn parse(s: &str, max_retries: u32) -> Result<Self, ParseBackoffError> {
        let original = s;
        let fields: Vec<&str> = s.split(';').map(str::trim).collect();

        let (initial_str, mode_step_str, max_str): (Option<&str>, &str, Option<&str>) =
            match fields.as_slice() {
                [initial, mode_step, max] => (Some(*initial), *mode_step, Some(*max)),
                [initial, mode_step] => (Some(*initial), *mode_step, None),
                [mode_step] => (None, *mode_step, None),
                _ => return Err(ParseBackoffError(original.to_owned())),
            };

        let (mode, step) = parse_mode_step(mode_step_str)
            .ok_or_else(|| ParseBackoffError(original.to_owned()))?;

        let initial = match initial_str {
            Some(text) => text
                .parse::<ParsedDuration>()
                .map_err(|_| ParseBackoffError(original.to_owned()))?
                .0,
            None => step,
        };

        let max = match max_str {
            Some(text) => text
                .parse::<ParsedDuration>()
                .map_err(|_| ParseBackoffError(original.to_owned()))?
                .0,
            None => step.saturating_mul(max_retries.max(1)),
        };

        Ok(BackoffSpec {
            initial,
            mode,
            step,
            max,
        })
    }
}

impl fmt::Display for BackoffSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mode = match self.mode {
            BackoffMode::Linear => "lin",
            BackoffMode::Exponential => "exp",
        };
        write!(
            f,
            "{}; {} {}; {}",
            ParsedDuration(self.initial),
            mode,
            ParsedDuration(self.step),
            ParsedDuration(self.max)
        )
    }
}

fn parse_mode_step(text: &str) -> Option<(BackoffMode, Duration)> {
    let mut parts = text.split_whitespace();
    let first = parts.next()?;
    let (mode, step_text) = match first {
        "lin" | "exp" => (first, parts.next()?),
        other => ("lin", other),
    };
    if parts.next().is_some() {
        return None;
    }
    let mode = match mode {
        "lin" => BackoffMode::Linear,
        "exp" => BackoffMode::Exponential,
        _ => return None,
    };
    let ParsedDuration(step) = step_text.parse().ok()?;
    Some((mode, step))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_seconds() {
        assert_eq!(
            "5".parse::<ParsedDuration>().unwrap().0,
            Duration::from_secs(5)
        );
    }

    #[test]
    fn parses_units() {
        assert_eq!(
            "5s".parse::<ParsedDuration>().unwrap().0,
            Duration::from_secs(5)
        );
        assert_eq!(
            "2m".parse::<ParsedDuration>().unwrap().0,
            Duration::from_secs(120)
        );
        assert_eq!(
            "1h".parse::<ParsedDuration>().unwrap().0,
            Duration::from_secs(3600)
        );
        assert_eq!(
            "1d".parse::<ParsedDuration>().unwrap().0,
            Duration::from_secs(86_400)
        );
        assert_eq!(
            "1w".parse::<ParsedDuration>().unwrap().0,
            Duration::from_secs(604_800)
        );
    }

    #[test]
    fn parses_decimal_magnitude() {
        assert_eq!(
            "1.5s".parse::<ParsedDuration>().unwrap().0,
            Duration::from_millis(1500)
        );
    }

    #[test]
    fn rejects_unknown_unit() {
        assert!("5x".parse::<ParsedDuration>().is_err());
    }

    #[test]
    fn rate_spec_explicit_unit() {
        let spec: RateSpec = "10/s".parse().unwrap();
        assert_eq!(spec.max_events, 10);
        assert_eq!(spec.window, Duration::from_secs(1));
    }

    #[test]
    fn rate_spec_implied_one() {
        let a: RateSpec = "1/s".parse().unwrap();
        let b: RateSpec = "1/1s".parse().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn backoff_full_form() {
        let spec = BackoffSpec::parse("1s; lin 1s; 10s", 3).unwrap();
        assert_eq!(spec.initial, Duration::from_secs(1));
        assert_eq!(spec.mode, BackoffMode::Linear);
        assert_eq!(spec.step, Duration::from_secs(1));
        assert_eq!(spec.max, Duration::from_secs(10));
    }

    #[test]
    fn backoff_mode_step_only_derives_initial_and_max() {
        let spec = BackoffSpec::parse("exp 5s", 5).unwrap();
        assert_eq!(spec.initial, Duration::from_secs(5));
        assert_eq!(spec.mode, BackoffMode::Exponential);
        assert_eq!(spec.step, Duration::from_secs(5));
        assert_eq!(spec.max, Duration::from_secs(25));
    }

    #[test]
    fn backoff_initial_and_mode_step_derives_max() {
        let spec = BackoffSpec::parse("5m; lin 5s", 10).unwrap();
        assert_eq!(spec.initial, Duration::from_secs(300));
        assert_eq!(spec.mode, BackoffMode::Linear);
        assert_eq!(spec.step, Duration::from_secs(5));
        assert_eq!(spec.max, Duration::from_secs(50));
    }
}
