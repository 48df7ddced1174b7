//! Human-readable order numbers: `PREFIX-<8 digits>-<4 chars>`.
//!
//! The middle block is the last eight digits of a per-process millisecond
//! clock that never repeats a value (it runs ahead of the wall clock when more
//! than one number is requested per millisecond), the last block is four random
//! characters from `A-Z0-9`. Cross-process uniqueness is enforced by the order
//! store, not here.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use serde::{Deserialize, Serialize};

use dualmart_core::{DomainError, DomainResult};

const SUFFIX_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const SUFFIX_LEN: usize = 4;
const TICK_DIGITS: usize = 8;
const TICK_MODULUS: u64 = 100_000_000;
const MAX_PREFIX_LEN: usize = 8;

static LAST_TICK: AtomicU64 = AtomicU64::new(0);

/// Next value of the process-wide strictly increasing millisecond clock.
fn next_tick() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();

    let mut last = LAST_TICK.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_TICK.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Check a prefix: 1..=8 ASCII uppercase letters or digits.
    pub fn validate_prefix(prefix: &str) -> DomainResult<()> {
        let ok = !prefix.is_empty()
            && prefix.len() <= MAX_PREFIX_LEN
            && prefix
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit());
        if ok {
            Ok(())
        } else {
            Err(DomainError::validation(format!(
                "order number prefix must be 1..={MAX_PREFIX_LEN} characters of A-Z0-9 (got '{prefix}')"
            )))
        }
    }

    /// Produce a fresh candidate. The prefix is assumed valid.
    pub fn generate(prefix: &str) -> Self {
        let tick = next_tick() % TICK_MODULUS;
        let mut rng = rand::thread_rng();
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
            .collect();
        Self(format!("{prefix}-{tick:0width$}-{suffix}", width = TICK_DIGITS))
    }

    pub fn parse(value: &str) -> DomainResult<Self> {
        let invalid = || DomainError::invalid_id(format!("OrderNumber: '{value}'"));
        let mut parts = value.split('-');
        let (Some(prefix), Some(tick), Some(suffix), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        Self::validate_prefix(prefix).map_err(|_| invalid())?;
        if tick.len() != TICK_DIGITS || !tick.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if suffix.len() != SUFFIX_LEN || !suffix.bytes().all(|b| SUFFIX_ALPHABET.contains(&b)) {
            return Err(invalid());
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn prefix(&self) -> &str {
        self.0.split('-').next().unwrap_or_default()
    }
}

impl core::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl core::str::FromStr for OrderNumber {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for OrderNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<OrderNumber> for String {
    fn from(value: OrderNumber) -> Self {
        value.0
    }
}
