//! Symbolic actions emitted by the planner.
//!
//! Actions have a compact pipe-delimited text form (`tap|540|1200`,
//! `tap_index|3`, `type|InternVault`, `DONE`) used in step history and by the
//! free-form planner, which asks the model for exactly one such line.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One planner decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Tap { x: i32, y: i32 },
    /// Tap the center of an element of the current step's index; `-1` is the last element
    TapIndex { index: i64 },
    Type { text: String },
    Swipe { x1: i32, y1: i32, x2: i32, y2: i32, duration_ms: u32 },
    /// Press a named key from the executor's key table
    Press { key: String },
    Wait { seconds: u32 },
    /// The planner believes the goal is reached
    Done,
    /// The planner gave up on the goal
    Failed,
}

impl Action {
    pub fn tap(x: i32, y: i32) -> Self {
        Action::Tap { x, y }
    }

    pub fn tap_index(index: i64) -> Self {
        Action::TapIndex { index }
    }

    pub fn type_text(text: impl Into<String>) -> Self {
        Action::Type { text: text.into() }
    }

    pub fn press(key: impl Into<String>) -> Self {
        Action::Press { key: key.into() }
    }

    pub fn wait(seconds: u32) -> Self {
        Action::Wait { seconds }
    }

    /// Vertical swipe from the lower to the upper part of the screen
    pub fn scroll_up(width: u32, height: u32) -> Self {
        let x = (width / 2) as i32;
        Action::Swipe {
            x1: x,
            y1: (height as f32 * 0.75) as i32,
            x2: x,
            y2: (height as f32 * 0.30) as i32,
            duration_ms: 300,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Tap { x, y } => write!(f, "tap|{}|{}", x, y),
            Action::TapIndex { index } => write!(f, "tap_index|{}", index),
            Action::Type { text } => write!(f, "type|{}", text),
            Action::Swipe { x1, y1, x2, y2, duration_ms } => {
                write!(f, "swipe|{}|{}|{}|{}|{}", x1, y1, x2, y2, duration_ms)
            }
            Action::Press { key } => write!(f, "press|{}", key),
            Action::Wait { seconds } => write!(f, "wait|{}", seconds),
            Action::Done => write!(f, "DONE"),
            Action::Failed => write!(f, "FAILED"),
        }
    }
}

/// Why an action line could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid action: {0}")]
pub struct ActionParseError(pub String);

impl FromStr for Action {
    type Err = ActionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim().trim_matches('`').trim();
        let err = || ActionParseError(line.to_string());

        let (verb, rest) = match line.split_once('|') {
            Some((verb, rest)) => (verb.trim().to_ascii_lowercase(), Some(rest)),
            None => (line.to_ascii_lowercase(), None),
        };
        let ints = |expected: usize| -> Result<Vec<i64>, ActionParseError> {
            let parts: Vec<i64> = rest
                .ok_or_else(err)?
                .split('|')
                .map(|p| p.trim().parse::<i64>())
                .collect::<Result<_, _>>()
                .map_err(|_| err())?;
            if parts.len() == expected { Ok(parts) } else { Err(err()) }
        };
        let coord = |v: i64| i32::try_from(v).map_err(|_| err());

        match verb.as_str() {
            "done" => Ok(Action::Done),
            "failed" | "fail" => Ok(Action::Failed),
            "tap" => {
                let p = ints(2)?;
                Ok(Action::tap(coord(p[0])?, coord(p[1])?))
            }
            "tap_index" => Ok(Action::tap_index(ints(1)?[0])),
            "swipe" => {
                let p = ints(5)?;
                Ok(Action::Swipe {
                    x1: coord(p[0])?,
                    y1: coord(p[1])?,
                    x2: coord(p[2])?,
                    y2: coord(p[3])?,
                    duration_ms: u32::try_from(p[4]).map_err(|_| err())?,
                })
            }
            "wait" => Ok(Action::wait(u32::try_from(ints(1)?[0]).map_err(|_| err())?)),
            // Text may itself contain pipes
            "type" => Ok(Action::type_text(rest.ok_or_else(err)?)),
            "press" => {
                let key = rest.ok_or_else(err)?.trim();
                if key.is_empty() { Err(err()) } else { Ok(Action::press(key.to_ascii_lowercase())) }
            }
            _ => Err(err()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_each_verb() {
        assert_eq!("tap|540|1200".parse::<Action>().unwrap(), Action::tap(540, 1200));
        assert_eq!("TAP_INDEX|-1".parse::<Action>().unwrap(), Action::tap_index(-1));
        assert_eq!("type|a|b".parse::<Action>().unwrap(), Action::type_text("a|b"));
        assert_eq!("press|ENTER".parse::<Action>().unwrap(), Action::press("enter"));
        assert_eq!("wait|2".parse::<Action>().unwrap(), Action::wait(2));
        assert_eq!("`DONE`".parse::<Action>().unwrap(), Action::Done);
        assert_eq!(
            "swipe|1|2|3|4|300".parse::<Action>().unwrap(),
            Action::Swipe { x1: 1, y1: 2, x2: 3, y2: 4, duration_ms: 300 }
        );
    }

    #[test]
    fn test_rejects_malformed_lines() {
        for line in ["", "tap|1", "tap|x|y", "wait|-3", "swipe|1|2|3|4", "press|", "jump|1", "type"] {
            assert!(line.parse::<Action>().is_err(), "{line:?} should not parse");
        }
    }

    #[test]
    fn test_out_of_range_coordinates_are_rejected() {
        for line in ["tap|4294967396|5", "tap|5|-2147483649", "swipe|1|2|3|4294967296|300", "wait|4294967296"] {
            assert!(line.parse::<Action>().is_err(), "{line:?} should not parse");
        }
        assert_eq!("tap|-1|2147483647".parse::<Action>().unwrap(), Action::tap(-1, i32::MAX));
    }

    #[test]
    fn test_parse_error_message() {
        let err = "jump|1".parse::<Action>().unwrap_err();
        assert_eq!(err.to_string(), "invalid action: jump|1");
    }

    #[test]
    fn test_display_matches_parser() {
        let action = Action::Swipe { x1: 180, y1: 600, x2: 180, y2: 240, duration_ms: 300 };
        assert_eq!(action.to_string(), "swipe|180|600|180|240|300");
        assert_eq!(action.to_string().parse::<Action>().unwrap(), action);
    }

    #[test]
    fn test_scroll_up_stays_on_screen() {
        match Action::scroll_up(360, 800) {
            Action::Swipe { x1, y1, x2, y2, .. } => {
                assert_eq!((x1, x2), (180, 180));
                assert!(y1 > y2 && y1 < 800 && y2 > 0);
            }
            other => panic!("expected swipe, got {other:?}"),
        }
    }
}
