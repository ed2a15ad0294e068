//! Applying one filter mask to a selection of devices.

use tracing::debug;

use crate::backend::Backend;
use crate::device::DeviceChannel;
use crate::error::Result;
use crate::flags::FilterMask;

/// Sets `mask` on every channel whose index satisfies `predicate`, in index
/// order, and returns how many channels were changed.
///
/// This is not transactional: if a channel refuses the mask the error is
/// returned at once and channels already visited keep the new mask.
pub fn apply_filter<B, P>(channels: &[DeviceChannel<B>], predicate: P, mask: FilterMask) -> Result<usize>
where
    B: Backend,
    P: Fn(usize) -> bool,
{
    let mut applied = 0;
    for channel in channels.iter().filter(|c| predicate(c.index())) {
        channel.set_filter(mask)?;
        applied += 1;
    }
    debug!(applied, filter = mask.bits(), "applied filter");
    Ok(applied)
}
