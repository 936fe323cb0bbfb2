//! Process-wide inspector state.
//!
//! rpm keeps one transaction set per process and configures its
//! verification policy on it once. We mirror that: a lazily created
//! singleton behind a mutex, holding the verification flags every
//! inspector consults. Repodata generation treats packages as
//! containers, so digest, signature and header checks are off by
//! default.

use std::sync::Mutex;

use bitflags::bitflags;

bitflags! {
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct VerifyFlags: u32 {
        const NODIGESTS = 1;
        const NOSIGNATURES = 1 << 1;
        const NOHDRCHK = 1 << 2;
    }
}

pub(crate) struct TransactionSet {
    pub(crate) vs_flags: VerifyFlags,
}

impl TransactionSet {
    fn create() -> Self {
        TransactionSet {
            vs_flags: VerifyFlags::NODIGESTS | VerifyFlags::NOSIGNATURES | VerifyFlags::NOHDRCHK,
        }
    }
}

static TRANSACTION_SET: Mutex<Option<TransactionSet>> = Mutex::new(None);

/// Flags of the process-wide transaction set, creating it on first use.
pub(crate) fn verify_flags() -> VerifyFlags {
    let mut guard = TRANSACTION_SET
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.get_or_insert_with(TransactionSet::create).vs_flags
}

#[cfg(test)]
pub(crate) fn set_verify_flags(flags: VerifyFlags) {
    let mut guard = TRANSACTION_SET
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.get_or_insert_with(TransactionSet::create).vs_flags = flags;
}

/// Tear the singleton down so tests can exercise re-initialization.
#[cfg(test)]
pub(crate) fn reset() {
    let mut guard = TRANSACTION_SET
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = None;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_flags_disable_all_checks() {
        reset();
        let flags = verify_flags();
        assert!(flags.contains(VerifyFlags::NODIGESTS));
        assert!(flags.contains(VerifyFlags::NOSIGNATURES));
        assert!(flags.contains(VerifyFlags::NOHDRCHK));
    }

    #[test]
    fn reset_reinitializes() {
        set_verify_flags(VerifyFlags::empty());
        reset();
        assert_eq!(
            verify_flags(),
            VerifyFlags::NODIGESTS | VerifyFlags::NOSIGNATURES | VerifyFlags::NOHDRCHK
        );
    }
}
