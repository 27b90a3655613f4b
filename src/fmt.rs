//! Logging shim macros used throughout the crate instead of a hard dependency
//! on any particular logging frontend being initialised.
//!
//! This mirrors the pattern of gating every log call behind the optional
//! `log` feature so the crate builds (silently) without it.

#![macro_use]
#![allow(unused_macros)]

macro_rules! trace {
    ($s:literal $(, $x:expr)* $(,)?) => {
        { #[cfg(feature = "log")] ::log::trace!($s $(, $x)*); }
    };
}

macro_rules! debug {
    ($s:literal $(, $x:expr)* $(,)?) => {
        { #[cfg(feature = "log")] ::log::debug!($s $(, $x)*); }
    };
}

macro_rules! info {
    ($s:literal $(, $x:expr)* $(,)?) => {
        { #[cfg(feature = "log")] ::log::info!($s $(, $x)*); }
    };
}

macro_rules! warn {
    ($s:literal $(, $x:expr)* $(,)?) => {
        { #[cfg(feature = "log")] ::log::warn!($s $(, $x)*); }
    };
}

macro_rules! error {
    ($s:literal $(, $x:expr)* $(,)?) => {
        { #[cfg(feature = "log")] ::log::error!($s $(, $x)*); }
    };
}

/// Return early out of the enclosing function when an `Option` is `None`,
/// in place of an `unwrap()` that would panic. Kept alongside the logging
/// macros for call sites that need a defensive early-out without pulling in
/// a `Result`-returning refactor.
macro_rules! unwrap_opt_or_return {
    ($opt:expr, $ret:expr) => {
        match $opt {
            Some(value) => value,
            None => return $ret,
        }
    };
}
