use crate::error::Result;

/// Host permission needed to send and receive multicast, e.g. a wifi
/// multicast lock on mobile platforms. Acquired on `start`, released on
/// `stop`.
pub trait MulticastPermit: Send + Sync {
    fn acquire(&self) -> Result<()>;
    fn release(&self);
}

/// For hosts where multicast needs no permission.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPermit;

impl MulticastPermit for NoPermit {
    fn acquire(&self) -> Result<()> {
        Ok(())
    }

    fn release(&self) {}
}
