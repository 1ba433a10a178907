//! Cleanup tokens.
//!
//! Every write or encode that allocates guest memory returns its release
//! actions through a `Cleanup`. Tokens compose by concatenation, release
//! in LIFO order, and releasing twice is a no-op. The enclosing call must
//! release its chain on every exit path; the chain is the guest
//! collector's safety boundary.

use crate::instance::GuestInstance;
use tracing::warn;

#[derive(Debug)]
enum Action {
    Unpin(u32),
}

/// A zero-or-more-element chain of deferred release actions.
#[derive(Debug, Default)]
pub struct Cleanup {
    actions: Vec<Action>,
}

impl Cleanup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Schedule a guest unpin for release.
    pub fn push_unpin(&mut self, ptr: u32) {
        self.actions.push(Action::Unpin(ptr));
    }

    /// Append another token's actions to this chain.
    pub fn extend(&mut self, other: Cleanup) {
        let mut other = other;
        self.actions.append(&mut other.actions);
    }

    /// Release all actions in LIFO order.
    ///
    /// Unpin failures are logged and swallowed: cleanup always runs to
    /// completion. The chain is drained, so a second release is a no-op.
    pub fn release(&mut self, guest: &mut dyn GuestInstance) {
        while let Some(action) = self.actions.pop() {
            match action {
                Action::Unpin(ptr) => {
                    if let Err(err) = guest.unpin(ptr) {
                        warn!(ptr, error = %err, "failed to unpin guest object during cleanup");
                    }
                }
            }
        }
    }
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        if !self.actions.is_empty() {
            warn!(
                pending = self.actions.len(),
                "cleanup token dropped with pending release actions"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{MarshalError, Result};

    #[derive(Default)]
    struct UnpinRecorder {
        unpins: Vec<u32>,
        fail_on: Option<u32>,
    }

    impl GuestInstance for UnpinRecorder {
        fn read_bytes(&self, offset: u32, len: u32) -> Result<Vec<u8>> {
            Err(MarshalError::MemoryFault {
                op: "read",
                offset,
                len,
            })
        }
        fn write_bytes(&mut self, offset: u32, bytes: &[u8]) -> Result<()> {
            Err(MarshalError::MemoryFault {
                op: "write",
                offset,
                len: bytes.len() as u32,
            })
        }
        fn allocate(&mut self, size: u32, class_id: u32) -> Result<u32> {
            Err(MarshalError::AllocFault { size, class_id })
        }
        fn pin(&mut self, _ptr: u32) -> Result<()> {
            Ok(())
        }
        fn unpin(&mut self, ptr: u32) -> Result<()> {
            if self.fail_on == Some(ptr) {
                return Err(MarshalError::GuestError {
                    message: format!("unpin({ptr}) refused"),
                });
            }
            self.unpins.push(ptr);
            Ok(())
        }
        fn invoke(&mut self, name: &str, _args: &[u64]) -> Result<Vec<u64>> {
            Err(MarshalError::GuestError {
                message: format!("no export {name}"),
            })
        }
    }

    #[test]
    fn release_is_lifo_and_idempotent() {
        let mut guest = UnpinRecorder::default();
        let mut cleanup = Cleanup::new();
        cleanup.push_unpin(10);
        cleanup.push_unpin(20);

        let mut tail = Cleanup::new();
        tail.push_unpin(30);
        cleanup.extend(tail);

        cleanup.release(&mut guest);
        assert_eq!(guest.unpins, vec![30, 20, 10]);

        cleanup.release(&mut guest);
        assert_eq!(guest.unpins.len(), 3);
    }

    #[test]
    fn release_swallows_unpin_failures() {
        let mut guest = UnpinRecorder {
            fail_on: Some(20),
            ..Default::default()
        };
        let mut cleanup = Cleanup::new();
        cleanup.push_unpin(10);
        cleanup.push_unpin(20);
        cleanup.push_unpin(30);

        cleanup.release(&mut guest);
        // The failing unpin is skipped, the rest still run.
        assert_eq!(guest.unpins, vec![30, 10]);
        assert!(cleanup.is_empty());
    }
}
