// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signal name validation against the closed POSIX set. Names are accepted
//! with or without the `SIG` prefix, matching `kill -l` / shell convention.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown signal: {0:?}")]
pub struct UnknownSignal(pub String);

macro_rules! signal_table {
    ($($name:ident = $num:expr),+ $(,)?) => {
        /// Parse a signal name into its POSIX number.
        pub fn parse_signal(name: &str) -> Result<i32, UnknownSignal> {
            let bare = name.strip_prefix("SIG").unwrap_or(name);
            match bare {
                $(stringify!($name) => Ok($num),)+
                _ => Err(UnknownSignal(name.to_string())),
            }
        }
    };
}

signal_table! {
    HUP = 1,
    INT = 2,
    QUIT = 3,
    ILL = 4,
    TRAP = 5,
    ABRT = 6,
    BUS = 7,
    FPE = 8,
    KILL = 9,
    USR1 = 10,
    SEGV = 11,
    USR2 = 12,
    PIPE = 13,
    ALRM = 14,
    TERM = 15,
    CHLD = 17,
    CONT = 18,
    STOP = 19,
    TSTP = 20,
    TTIN = 21,
    TTOU = 22,
    URG = 23,
    XCPU = 24,
    XFSZ = 25,
    VTALRM = 26,
    PROF = 27,
    WINCH = 28,
    IO = 29,
    SYS = 31,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_either_prefix_form() {
        assert_eq!(parse_signal("TERM").unwrap(), 15);
        assert_eq!(parse_signal("SIGTERM").unwrap(), 15);
    }

    #[test]
    fn rejects_unknown_names() {
        assert!(parse_signal("NOTASIGNAL").is_err());
        assert!(parse_signal("SIGNOTASIGNAL").is_err());
    }

    #[test]
    fn kill_and_term_are_distinct_numbers() {
        assert_ne!(parse_signal("KILL").unwrap(), parse_signal("TERM").unwrap());
    }
}
