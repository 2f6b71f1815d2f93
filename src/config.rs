//! Compile-time configuration.
//!
//! `trouble-radio` has some configuration settings that are set at compile time.
//!
//! They are set via environment variables at build time: set the variable named
//! `TROUBLE_RADIO_<value>`. For example `TROUBLE_RADIO_ADV_QUEUE_SIZE=8 cargo build`. You can also
//! set them in the `[env]` section of `.cargo/config.toml`.
//!
//! Unknown `TROUBLE_RADIO_` variables and values that don't parse as an unsigned integer fail
//! the build.

mod raw {
    #![allow(unused)]
    include!(concat!(env!("OUT_DIR"), "/config.rs"));
}

/// Advertisement queue depth
///
/// Number of formatted advertisements that can wait for the radio while another one is on air.
/// Sends beyond this return `ResourceExhausted`.
///
/// Default: 5.
pub const ADV_QUEUE_SIZE: usize = raw::ADV_QUEUE_SIZE;

/// Application event queue size
///
/// Events raised in interrupt context are parked here until the application drains them. When
/// the queue is full new events are dropped with a warning.
///
/// Default: 8.
pub const EVENT_QUEUE_SIZE: usize = raw::EVENT_QUEUE_SIZE;

// ======== Link parameters
//
/// Maximum number of connection parameter retries
///
/// After this many failed update attempts the next failure disconnects the central.
///
/// Default: 3.
pub const CONN_PARAMS_MAX_RETRY: usize = raw::CONN_PARAMS_MAX_RETRY;

/// Delay between connection parameter update attempts, in milliseconds.
///
/// Default: 30000.
pub const CONN_PARAMS_RETRY_BACKOFF_MS: u64 = raw::CONN_PARAMS_RETRY_BACKOFF_MS as u64;

// ======== Advertising parameters
//
/// Advertising interval used until the application sets one, in milliseconds.
///
/// Default: 1010.
pub const DEFAULT_ADV_INTERVAL_MS: u32 = raw::DEFAULT_ADV_INTERVAL_MS as u32;

/// How many times a plain `send` puts its advertisement on air. `0` repeats until stopped.
///
/// Default: 1.
pub const DEFAULT_REPEAT_COUNT: u16 = raw::DEFAULT_REPEAT_COUNT as u16;

/// Largest scan report payload forwarded to the application unless the scan configuration says
/// otherwise.
///
/// Default: 31.
pub const SCAN_REPORT_DEFAULT_MAX_LEN: usize = raw::SCAN_REPORT_DEFAULT_MAX_LEN;
