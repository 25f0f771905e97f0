//! Unique identifiers: time-ordered 63-bit integers and random UUIDs.
//!
//! Integer ids follow the Sonyflake layout:
//!
//! | bits | content |
//! |---|---|
//! | 39 | time since 2019-08-07T00:00:00Z in 10 ms units |
//! | 8 | sequence within one time unit |
//! | 16 | machine id |

use std::{
    net::{IpAddr, Ipv4Addr, UdpSocket},
    sync::{Mutex, OnceLock, PoisonError},
    thread,
    time::Duration,
};

use chrono::{TimeZone, Utc};

use crate::funcs::is_local_ip;

const BITS_TIME: u32 = 39;
const BITS_SEQUENCE: u32 = 8;
const BITS_MACHINE: u32 = 16;
const SEQUENCE_MASK: u16 = (1 << BITS_SEQUENCE) - 1;

/// Length of one time unit in milliseconds.
const TICK_MILLIS: i64 = 10;

static FLAKE: OnceLock<Sonyflake> = OnceLock::new();

/// Components of an id produced by [`Sonyflake`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdParts {
    /// Time units since the epoch.
    pub time: u64,
    pub sequence: u16,
    pub machine_id: u16,
}

#[derive(Debug)]
struct State {
    elapsed: i64,
    sequence: u16,
}

/// Time-ordered id generator.
#[derive(Debug)]
pub struct Sonyflake {
    start: i64,
    machine_id: u16,
    state: Mutex<State>,
}

impl Sonyflake {
    /// Creates a generator counting from 2019-08-07 with the machine id
    /// taken from the host's private IPv4 address, or a random one.
    pub fn new() -> Self {
        let start = Utc
            .with_ymd_and_hms(2019, 8, 7, 0, 0, 0)
            .single()
            .map(|epoch| epoch.timestamp_millis())
            .unwrap_or_default();

        Self::with_machine_id(start, default_machine_id())
    }

    /// Creates a generator with an explicit epoch (ms since Unix epoch) and machine id.
    pub fn with_machine_id(start_millis: i64, machine_id: u16) -> Self {
        Self {
            start: start_millis / TICK_MILLIS,
            machine_id,
            state: Mutex::new(State {
                elapsed: 0,
                sequence: SEQUENCE_MASK,
            }),
        }
    }

    pub fn machine_id(&self) -> u16 {
        self.machine_id
    }

    fn elapsed(&self) -> i64 {
        Utc::now().timestamp_millis() / TICK_MILLIS - self.start
    }

    /// Returns the next id, or `None` once the 39-bit time space is exhausted.
    ///
    /// When more than 256 ids are requested within one time unit the call
    /// sleeps until the next unit.
    pub fn next_id(&self) -> Option<u64> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let current = self.elapsed();
        if state.elapsed < current {
            state.elapsed = current;
            state.sequence = 0;
        } else {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                state.elapsed += 1;
                let overtime = state.elapsed - current;
                thread::sleep(Duration::from_millis((overtime * TICK_MILLIS) as u64));
            }
        }

        if state.elapsed < 0 || state.elapsed >= 1 << BITS_TIME {
            return None;
        }

        Some(
            (state.elapsed as u64) << (BITS_SEQUENCE + BITS_MACHINE)
                | u64::from(state.sequence) << BITS_MACHINE
                | u64::from(self.machine_id),
        )
    }
}

impl Default for Sonyflake {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits an id into its components.
pub fn decompose(id: u64) -> IdParts {
    IdParts {
        time: id >> (BITS_SEQUENCE + BITS_MACHINE),
        sequence: ((id >> BITS_MACHINE) as u16) & SEQUENCE_MASK,
        machine_id: id as u16,
    }
}

fn default_machine_id() -> u16 {
    match private_ipv4() {
        Some(ip) => {
            let [_, _, third, fourth] = ip.octets();
            u16::from_be_bytes([third, fourth])
        }
        None => {
            tracing::warn!("no private IPv4 address found, using a random machine id");
            rand::random()
        }
    }
}

fn private_ipv4() -> Option<Ipv4Addr> {
    // Connecting a UDP socket sends nothing; it only selects the outbound interface.
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80)).ok()?;

    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) if !ip.is_loopback() && is_local_ip(IpAddr::V4(ip)) => Some(ip),
        _ => None,
    }
}

/// Returns a time-ordered id from the process-wide generator, or `0` on failure.
pub fn id() -> u64 {
    FLAKE.get_or_init(Sonyflake::new).next_id().unwrap_or(0)
}

/// Returns a random version 4 UUID in hyphenated form.
pub fn uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}
