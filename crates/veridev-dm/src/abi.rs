//! Bit-exact device-mapper ioctl ABI.
//!
//! The kernel locates the payload of every device-mapper ioctl through the
//! `data_size`/`data_start` accounting fields of [`DmIoctl`], so the structs
//! here are fixed-layout `repr(C)` with compile-time size assertions rather
//! than growable containers.

use std::mem::size_of;

/// Device-mapper ioctl interface version (major).
pub const DM_VERSION_MAJOR: u32 = 4;

/// `DM_NAME_LEN` from the kernel ABI.
pub const DM_NAME_LEN: usize = 128;

/// `DM_UUID_LEN` from the kernel ABI.
pub const DM_UUID_LEN: usize = 129;

/// `DM_MAX_TYPE_NAME` from the kernel ABI.
pub const DM_MAX_TYPE_NAME: usize = 16;

/// Size of the parameter area carried after the target spec.
pub const DM_PARAMS_SIZE: usize = 1024;

/// Create the mapped device read-only.
pub const DM_READONLY_FLAG: u32 = 1 << 0;

/// Defer removal until the last opener of the node closes it.
pub const DM_DEFERRED_REMOVE: u32 = 1 << 17;

/// ioctl type byte for all device-mapper requests.
const DM_IOCTL_TYPE: u64 = 0xfd;

/// Builds `_IOWR(0xfd, nr, struct dm_ioctl)` for a device-mapper command.
const fn dm_iowr(nr: u64) -> libc::c_ulong {
    const IOC_WRITE: u64 = 1;
    const IOC_READ: u64 = 2;
    (((IOC_READ | IOC_WRITE) << 30)
        | ((size_of::<DmIoctl>() as u64) << 16)
        | (DM_IOCTL_TYPE << 8)
        | nr) as libc::c_ulong
}

/// `DM_DEV_CREATE` request number.
pub const DM_DEV_CREATE: libc::c_ulong = dm_iowr(3);

/// `DM_DEV_REMOVE` request number.
pub const DM_DEV_REMOVE: libc::c_ulong = dm_iowr(4);

/// `DM_DEV_SUSPEND` request number; without the suspend flag this resumes.
pub const DM_DEV_SUSPEND: libc::c_ulong = dm_iowr(6);

/// `DM_TABLE_LOAD` request number.
pub const DM_TABLE_LOAD: libc::c_ulong = dm_iowr(9);

/// `DM_TABLE_STATUS` request number.
pub const DM_TABLE_STATUS: libc::c_ulong = dm_iowr(12);

/// `struct dm_ioctl`: the fixed header of every device-mapper request and
/// response (312 bytes).
#[repr(C)]
#[derive(Clone, Copy)]
pub struct DmIoctl {
    /// Interface version negotiated with the kernel (major, minor, patch).
    pub version: [u32; 3],
    /// Total size of this header plus payload, in bytes.
    pub data_size: u32,
    /// Offset of the payload from the start of this struct.
    pub data_start: u32,
    /// Number of target specs in the payload.
    pub target_count: u32,
    /// Out: number of openers of the device.
    pub open_count: i32,
    /// Request/response flags.
    pub flags: u32,
    /// Out: event counter.
    pub event_nr: u32,
    /// Explicit padding, must be zero.
    pub padding: u32,
    /// Out: kernel-encoded device number of the mapped device.
    pub dev: u64,
    /// NUL-terminated device name.
    pub name: [u8; DM_NAME_LEN],
    /// NUL-terminated correlation uuid.
    pub uuid: [u8; DM_UUID_LEN],
    /// Trailing padding, must be zero.
    pub data: [u8; 7],
}

const _: () = assert!(size_of::<DmIoctl>() == 312);

impl DmIoctl {
    /// Returns an all-zero header.
    pub fn zeroed() -> Self {
        Self {
            version: [0; 3],
            data_size: 0,
            data_start: 0,
            target_count: 0,
            open_count: 0,
            flags: 0,
            event_nr: 0,
            padding: 0,
            dev: 0,
            name: [0; DM_NAME_LEN],
            uuid: [0; DM_UUID_LEN],
            data: [0; 7],
        }
    }

    /// Builds a request header carrying the interface version, payload
    /// accounting, flags, and the correlation uuid.
    pub fn request(data_size: usize, flags: u32, uuid: &str) -> Self {
        let mut header = Self::zeroed();
        header.version = [DM_VERSION_MAJOR, 0, 0];
        header.data_size = data_size as u32;
        header.data_start = size_of::<DmIoctl>() as u32;
        header.flags = flags;
        copy_nul_terminated(&mut header.uuid, uuid);
        header
    }

    /// Sets the device name field.
    pub fn set_name(&mut self, name: &str) {
        copy_nul_terminated(&mut self.name, name);
    }
}

/// `struct dm_target_spec`: one target line of a table load (40 bytes).
#[repr(C)]
#[derive(Clone, Copy)]
pub struct DmTargetSpec {
    /// First sector the target maps.
    pub sector_start: u64,
    /// Number of 512-byte sectors the target maps.
    pub length: u64,
    /// Out: target status.
    pub status: i32,
    /// Offset to the next target spec, for multi-target tables.
    pub next: u32,
    /// NUL-terminated target type name.
    pub target_type: [u8; DM_MAX_TYPE_NAME],
}

const _: () = assert!(size_of::<DmTargetSpec>() == 40);

impl DmTargetSpec {
    /// Returns an all-zero target spec.
    pub fn zeroed() -> Self {
        Self {
            sector_start: 0,
            length: 0,
            status: 0,
            next: 0,
            target_type: [0; DM_MAX_TYPE_NAME],
        }
    }
}

/// The full single-target request frame: header, one target spec, and the
/// fixed parameter area. Status responses reuse the same layout, with the
/// kernel writing the status string into the parameter area.
#[repr(C)]
pub struct TableFrame {
    /// Request/response header.
    pub header: DmIoctl,
    /// Single target spec.
    pub target: DmTargetSpec,
    /// Parameter area: NUL-terminated target parameters or status string.
    pub params: [u8; DM_PARAMS_SIZE],
}

const _: () = assert!(
    size_of::<TableFrame>()
        == size_of::<DmIoctl>() + size_of::<DmTargetSpec>() + DM_PARAMS_SIZE
);

impl TableFrame {
    /// Returns an all-zero frame.
    pub fn zeroed() -> Self {
        Self {
            header: DmIoctl::zeroed(),
            target: DmTargetSpec::zeroed(),
            params: [0; DM_PARAMS_SIZE],
        }
    }
}

/// Copies `src` into a fixed-width NUL-terminated field, truncating if
/// needed; at least one trailing NUL is always left in place.
pub fn copy_nul_terminated(dst: &mut [u8], src: &str) {
    let n = src.len().min(dst.len() - 1);
    dst[..n].copy_from_slice(&src.as_bytes()[..n]);
    dst[n..].fill(0);
}

/// Reads a NUL-terminated string out of a fixed-width field.
pub fn str_from_field(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Extracts the minor number from a kernel-encoded device number.
pub fn dev_minor(dev: u64) -> u32 {
    ((dev & 0xff) | ((dev >> 12) & 0xffff_ff00)) as u32
}
