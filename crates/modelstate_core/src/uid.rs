//! UID generation.
//!
//! The controller never allocates identifiers itself; it asks the
//! [`UidGenerator`] it was constructed with.

use crate::error::{CoreError, CoreResult};
use crate::types::Uid;

/// Source of fresh entity and version identifiers.
pub trait UidGenerator: Send {
    /// Returns an identifier never handed out before.
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier space is exhausted.
    fn next_uid(&mut self) -> CoreResult<Uid>;
}

/// Generator for one service session.
///
/// Layout of a generated UID:
///
/// | bits   | content      |
/// |--------|--------------|
/// | 63..40 | session id   |
/// | 39..32 | service id   |
/// | 31..0  | counter      |
///
/// Distinct `(session, service)` pairs never collide. The counter starts at 1.
#[derive(Debug, Clone)]
pub struct SessionUidGenerator {
    session_id: u32,
    prefix: u64,
    counter: u32,
}

impl SessionUidGenerator {
    const SESSION_MASK: u32 = 0x00FF_FFFF;

    /// Creates a generator. Session ids are truncated to 24 bits.
    #[must_use]
    pub fn new(session_id: u32, service_id: u8) -> Self {
        let prefix = (u64::from(session_id & Self::SESSION_MASK) << 40) | (u64::from(service_id) << 32);
        Self {
            session_id,
            prefix,
            counter: 0,
        }
    }
}

impl UidGenerator for SessionUidGenerator {
    fn next_uid(&mut self) -> CoreResult<Uid> {
        self.counter = self.counter.checked_add(1).ok_or(CoreError::UidExhausted {
            session: self.session_id,
        })?;
        Ok(Uid::new(self.prefix | u64::from(self.counter)))
    }
}

/// Generator handing out 1, 2, 3, ... for deterministic tests.
#[derive(Debug, Clone, Default)]
pub struct SequentialUidGenerator {
    last: u64,
}

impl SequentialUidGenerator {
    /// Creates a generator whose first UID is 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a generator whose first UID is `first`.
    #[must_use]
    pub fn starting_at(first: u64) -> Self {
        Self {
            last: first.saturating_sub(1),
        }
    }
}

impl UidGenerator for SequentialUidGenerator {
    fn next_uid(&mut self) -> CoreResult<Uid> {
        self.last += 1;
        Ok(Uid::new(self.last))
    }
}
