//! dm-verity device lifecycle control over the device-mapper ioctl interface.
//!
//! This crate drives one block-integrity verification device through its full
//! lifecycle: create the device-mapper device, load a single `verity` target
//! whose hash tree is appended to the backing device, resume it, force a
//! probe read through the verification path, confirm the target reports
//! verified, and tear it down again. Hash-tree computation, bundle parsing,
//! and mount handling all live with collaborators; this crate turns a
//! backing device plus a root digest and salt into a verified `/dev/dm-N`
//! node, and removes it afterwards.
//!
//! ## Quick Start
//!
//! ```no_run
//! use veridev_dm::VerityDevice;
//!
//! let mut device = VerityDevice::new(
//!     "/dev/loop0",
//!     16 * 4096,
//!     "8e0e1c4e85acda5bf6ea1a4cbbcdf1eb0c2dd73d4546ab08bc5b1fcb0f1f0c2a",
//!     "f6ea1a4cbbcdf1eb0c2dd73d4546ab08",
//! )?;
//!
//! device.setup()?;
//! let node = device.upper_dev().expect("active after setup").to_path_buf();
//! // hand `node` to the mount/consumer side, then later:
//! device.remove(true)?;
//! # Ok::<(), veridev_dm::DmError>(())
//! ```
//!
//! ## Key Types
//!
//! - [`VerityDevice`] - One verification attempt and its lifecycle
//! - [`DmControl`] / [`DmHandle`] - The control-plane seam and its real
//!   `/dev/mapper/control` implementation
//! - [`DmError`] - One variant per lifecycle failure class

#![deny(missing_docs)]

/// Bit-exact device-mapper ioctl ABI structures and constants.
pub mod abi;
/// Control-plane trait and the real ioctl-backed handle.
pub mod control;
/// The verity device entity and lifecycle pipeline.
pub mod device;
/// Error types for lifecycle operations.
pub mod errors;
/// Verity table parameter formatting and the status contract.
pub mod table;

pub use control::{DmControl, DmHandle, DM_CONTROL_NODE};
pub use device::{VerityDevice, DM_DEVICE_NAME};
pub use errors::DmError;
pub use table::{status_is_verified, verity_params, BLOCK_SIZE, STATUS_VERIFIED};
