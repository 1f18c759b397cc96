//! Time-sorted identifiers
//!
//! Every durable record (users, identities, sessions, tokens, clients) is keyed by a
//! 13 character Crockford Base32 TSID so ids sort by creation time.

use std::sync::atomic::{AtomicU16, Ordering};

use chrono::Utc;
use rand::Rng;

/// Crockford Base32 alphabet (excludes I, L, O, U)
const ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

const TSID_LEN: usize = 13;

static COUNTER: AtomicU16 = AtomicU16::new(0);

pub struct TsidGenerator;

impl TsidGenerator {
    /// Generate a new id, e.g. `0HZXEQ5Y8JY5Z`.
    ///
    /// Layout (64 bits): 42 bits of milliseconds since the epoch, 10 random bits,
    /// 12 bits of a process-wide counter.
    pub fn generate() -> String {
        let millis = Utc::now().timestamp_millis().max(0) as u64;
        let counter = COUNTER.fetch_add(1, Ordering::SeqCst) as u64;
        let random = rand::thread_rng().gen::<u16>() as u64 & 0x3FF;

        let tsid = ((millis & 0x3FF_FFFF_FFFF) << 22) | (random << 12) | (counter & 0xFFF);
        encode_crockford(tsid)
    }

    /// True when `value` has the shape of a TSID.
    pub fn is_valid(value: &str) -> bool {
        decode_crockford(value).is_some()
    }
}

fn encode_crockford(mut value: u64) -> String {
    let mut result = [b'0'; TSID_LEN];
    for slot in result.iter_mut().rev() {
        *slot = ALPHABET[(value & 0x1F) as usize];
        value >>= 5;
    }
    result.iter().map(|&b| b as char).collect()
}

fn decode_crockford(s: &str) -> Option<u64> {
    if s.len() != TSID_LEN {
        return None;
    }

    s.chars().try_fold(0u64, |acc, c| {
        let c = c.to_ascii_uppercase();
        let val = match c {
            '0'..='9' => c as u64 - '0' as u64,
            'A'..='H' => c as u64 - 'A' as u64 + 10,
            'J'..='K' => c as u64 - 'J' as u64 + 18,
            'M'..='N' => c as u64 - 'M' as u64 + 20,
            'P'..='T' => c as u64 - 'P' as u64 + 22,
            'V'..='Z' => c as u64 - 'V' as u64 + 27,
            _ => return None,
        };
        Some((acc << 5) | val)
    })
}
