//! Remove command implementation.
//!
//! Removal by bare uuid goes straight through the control-plane seam: a
//! device left behind by `setup` belongs to an earlier process, so there is
//! no `VerityDevice` value to carry its state.

use veridev_dm::{DmControl, DmHandle};

pub fn run(uuid: String, deferred: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut ctl = DmHandle::open()?;
    ctl.remove(&uuid, deferred)?;
    Ok(())
}
