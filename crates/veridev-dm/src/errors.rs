use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while driving a verity device through its lifecycle.
#[derive(Error, Debug)]
pub enum DmError {
    /// The device-mapper control node could not be opened.
    #[error("failed to open /dev/mapper/control: {0}")]
    ControlPlaneUnavailable(#[source] std::io::Error),
    /// The device-create ioctl failed.
    #[error("failed to create dm device: {0}")]
    CreateFailed(#[source] std::io::Error),
    /// The formatted verity table parameters exceed the fixed parameter area.
    #[error("verity table parameters are {len} bytes, limit is {max}")]
    ParamsOverflow {
        /// Length the formatted parameter string would have.
        len: usize,
        /// Maximum length the ioctl parameter area can carry.
        max: usize,
    },
    /// The table-load ioctl failed.
    #[error("failed to load dm table: {0}")]
    TableLoadFailed(#[source] std::io::Error),
    /// The resume ioctl failed; the table never went live.
    #[error("failed to resume dm device: {0}")]
    ActivationFailed(#[source] std::io::Error),
    /// The verified device node could not be opened for the probe read.
    #[error("failed to open {}: {source}", node.display())]
    ProbeOpenFailed {
        /// Device node that failed to open.
        node: PathBuf,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },
    /// The one-byte probe read failed; an integrity mismatch surfaces here
    /// as an I/O error.
    #[error("check read from {} failed: {source}", node.display())]
    ProbeReadFailed {
        /// Device node the read was issued against.
        node: PathBuf,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },
    /// The table-status ioctl failed.
    #[error("failed to query dm device status: {0}")]
    StatusQueryFailed(#[source] std::io::Error),
    /// The verity target reported a status other than the verified marker.
    #[error("unexpected dm-verity status {0:?} (instead of \"V\")")]
    UnexpectedStatus(String),
    /// The device-remove ioctl failed.
    #[error("failed to remove dm device: {0}")]
    RemoveFailed(#[source] std::io::Error),
    /// The operation is not valid for the device's current state.
    #[error("invalid device state: {0}")]
    InvalidState(&'static str),
    /// The data size is not a positive multiple of the 4096-byte block size.
    #[error("data size {0} is not a positive multiple of 4096")]
    InvalidGeometry(u64),
    /// A device field failed validation.
    #[error("invalid {field}: {reason}")]
    InvalidField {
        /// Name of the offending field.
        field: &'static str,
        /// Reason for rejection.
        reason: String,
    },
}
