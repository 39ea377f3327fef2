//! The device-mapper control-plane seam.
//!
//! [`DmControl`] is the operation set the lifecycle pipeline drives;
//! [`DmHandle`] is the real implementation issuing blocking ioctls on
//! `/dev/mapper/control`. The probe read is part of the seam so that the
//! whole pipeline can be exercised against an injected control plane.

use std::fs::File;
use std::io::{self, Read};
use std::mem::size_of;
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use crate::abi::{
    copy_nul_terminated, str_from_field, DmIoctl, TableFrame, DM_DEFERRED_REMOVE,
    DM_DEV_CREATE, DM_DEV_REMOVE, DM_DEV_SUSPEND, DM_READONLY_FLAG, DM_TABLE_LOAD,
    DM_TABLE_STATUS,
};
use crate::errors::DmError;
use crate::table::VERITY_TARGET;

/// Path of the device-mapper control node.
pub const DM_CONTROL_NODE: &str = "/dev/mapper/control";

/// Control-plane operations the lifecycle pipeline is written against.
///
/// Every method correlates with the kernel by the device uuid. Implementors
/// must surface each failure as the matching [`DmError`] variant; the
/// pipeline performs no mapping of its own.
pub trait DmControl {
    /// Creates a read-only mapped device registered under `name` and `uuid`.
    fn create(&mut self, name: &str, uuid: &str) -> Result<(), DmError>;

    /// Loads a single verity target covering `sectors` 512-byte sectors,
    /// configured by the formatted parameter string.
    fn load_table(&mut self, uuid: &str, sectors: u64, params: &str) -> Result<(), DmError>;

    /// Activates the loaded table and returns the kernel-encoded device
    /// number of the live device.
    fn resume(&mut self, uuid: &str) -> Result<u64, DmError>;

    /// Opens the device node read-only and reads one byte, forcing at least
    /// the first block through verification.
    fn probe(&mut self, node: &Path) -> Result<(), DmError>;

    /// Queries the target status string of the live table.
    fn table_status(&mut self, uuid: &str) -> Result<String, DmError>;

    /// Removes the mapped device, immediately or deferred until its last
    /// opener closes it.
    fn remove(&mut self, uuid: &str, deferred: bool) -> Result<(), DmError>;
}

/// An open handle on `/dev/mapper/control`.
///
/// The handle is scoped to one lifecycle call: opened at entry, closed on
/// every exit path when dropped.
pub struct DmHandle {
    control: File,
}

impl DmHandle {
    /// Opens the device-mapper control node.
    ///
    /// # Errors
    ///
    /// Returns [`DmError::ControlPlaneUnavailable`] if the node cannot be
    /// opened; nothing has been touched at that point.
    pub fn open() -> Result<Self, DmError> {
        let control = File::options()
            .read(true)
            .write(true)
            .custom_flags(libc::O_CLOEXEC)
            .open(DM_CONTROL_NODE)
            .map_err(DmError::ControlPlaneUnavailable)?;
        Ok(Self { control })
    }

    fn ioctl(&self, request: libc::c_ulong, header: *mut DmIoctl) -> io::Result<()> {
        // Safety: header points at a live, fixed-layout frame whose
        // data_size covers everything the kernel will read or write.
        let rc = unsafe { libc::ioctl(self.control.as_raw_fd(), request, header) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Issues a request on a full single-target frame; the kernel may write
    /// back into the target spec and parameter area.
    fn ioctl_frame(&self, request: libc::c_ulong, frame: &mut TableFrame) -> io::Result<()> {
        self.ioctl(request, (frame as *mut TableFrame).cast())
    }
}

impl DmControl for DmHandle {
    fn create(&mut self, name: &str, uuid: &str) -> Result<(), DmError> {
        let mut frame = TableFrame::zeroed();
        frame.header = DmIoctl::request(size_of::<TableFrame>(), DM_READONLY_FLAG, uuid);
        frame.header.set_name(name);
        self.ioctl_frame(DM_DEV_CREATE, &mut frame)
            .map_err(DmError::CreateFailed)
    }

    fn load_table(&mut self, uuid: &str, sectors: u64, params: &str) -> Result<(), DmError> {
        let mut frame = TableFrame::zeroed();
        frame.header = DmIoctl::request(size_of::<TableFrame>(), DM_READONLY_FLAG, uuid);
        frame.header.target_count = 1;
        frame.target.sector_start = 0;
        frame.target.length = sectors;
        copy_nul_terminated(&mut frame.target.target_type, VERITY_TARGET);
        copy_nul_terminated(&mut frame.params, params);
        self.ioctl_frame(DM_TABLE_LOAD, &mut frame)
            .map_err(DmError::TableLoadFailed)
    }

    fn resume(&mut self, uuid: &str) -> Result<u64, DmError> {
        let mut frame = TableFrame::zeroed();
        frame.header = DmIoctl::request(size_of::<TableFrame>(), 0, uuid);
        self.ioctl_frame(DM_DEV_SUSPEND, &mut frame)
            .map_err(DmError::ActivationFailed)?;
        Ok(frame.header.dev)
    }

    fn probe(&mut self, node: &Path) -> Result<(), DmError> {
        let check = File::options()
            .read(true)
            .custom_flags(libc::O_CLOEXEC)
            .open(node)
            .map_err(|source| DmError::ProbeOpenFailed {
                node: node.to_path_buf(),
                source,
            })?;
        let mut byte = [0u8; 1];
        (&check)
            .read_exact(&mut byte)
            .map_err(|source| DmError::ProbeReadFailed {
                node: node.to_path_buf(),
                source,
            })
    }

    fn table_status(&mut self, uuid: &str) -> Result<String, DmError> {
        let mut frame = TableFrame::zeroed();
        frame.header = DmIoctl::request(size_of::<TableFrame>(), 0, uuid);
        self.ioctl_frame(DM_TABLE_STATUS, &mut frame)
            .map_err(DmError::StatusQueryFailed)?;
        // The single target's status string lands in the parameter area
        // right after the echoed target spec.
        Ok(str_from_field(&frame.params))
    }

    fn remove(&mut self, uuid: &str, deferred: bool) -> Result<(), DmError> {
        let flags = if deferred { DM_DEFERRED_REMOVE } else { 0 };
        let mut header = DmIoctl::request(size_of::<DmIoctl>(), flags, uuid);
        self.ioctl(DM_DEV_REMOVE, &mut header)
            .map_err(DmError::RemoveFailed)
    }
}
