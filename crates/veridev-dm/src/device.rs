//! The verity device entity and its Setup/Remove lifecycle.

use std::path::{Path, PathBuf};

use tracing::{info, warn};
use uuid::Uuid;

use crate::abi::dev_minor;
use crate::control::{DmControl, DmHandle};
use crate::errors::DmError;
use crate::table::{status_is_verified, verity_params, BLOCK_SIZE, SECTOR_SIZE};

/// Device-mapper name assigned to the verity device created here.
pub const DM_DEVICE_NAME: &str = "veridev-verity";

/// One verification attempt over a backing device.
///
/// The backing device carries the data region followed immediately by its
/// hash tree; the root digest and salt anchoring the tree are computed
/// elsewhere and supplied at construction. Each attempt gets a fresh random
/// uuid that correlates every control-plane operation; a device is not
/// reused across attempts.
///
/// [`setup`](Self::setup) takes the device from unconfigured to a live,
/// probe-checked verity mapping and publishes the node path via
/// [`upper_dev`](Self::upper_dev); [`remove`](Self::remove) tears the
/// mapping down again. The kernel mapping must be removed before the value
/// is discarded, or it lingers until removed out of band.
pub struct VerityDevice {
    uuid: String,
    lower_dev: String,
    data_size: u64,
    root_digest: String,
    salt: String,
    upper_dev: Option<PathBuf>,
}

impl VerityDevice {
    /// Builds a device description for one verification attempt.
    ///
    /// # Errors
    ///
    /// Returns [`DmError::InvalidGeometry`] unless `data_size` is a positive
    /// multiple of 4096, and [`DmError::InvalidField`] if the backing device
    /// path is empty or digest/salt are empty or not hex.
    pub fn new(
        lower_dev: impl Into<String>,
        data_size: u64,
        root_digest: impl Into<String>,
        salt: impl Into<String>,
    ) -> Result<Self, DmError> {
        let lower_dev = lower_dev.into();
        let root_digest = root_digest.into();
        let salt = salt.into();

        if data_size == 0 || data_size % BLOCK_SIZE != 0 {
            return Err(DmError::InvalidGeometry(data_size));
        }
        if lower_dev.is_empty() {
            return Err(DmError::InvalidField {
                field: "lower_dev",
                reason: "empty path".into(),
            });
        }
        check_hex("root_digest", &root_digest)?;
        check_hex("salt", &salt)?;

        Ok(Self {
            uuid: Uuid::new_v4().to_string(),
            lower_dev,
            data_size,
            root_digest,
            salt,
            upper_dev: None,
        })
    }

    /// Correlation uuid of this attempt.
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Backing device path.
    pub fn lower_dev(&self) -> &str {
        &self.lower_dev
    }

    /// Size of the verified data region in bytes.
    pub fn data_size(&self) -> u64 {
        self.data_size
    }

    /// Verified device node, present exactly while the mapping is active.
    pub fn upper_dev(&self) -> Option<&Path> {
        self.upper_dev.as_deref()
    }

    /// Brings the verity mapping online against the live control plane.
    ///
    /// Opens `/dev/mapper/control` for the duration of the call and runs the
    /// create / load-table / resume / probe-read / status-check pipeline.
    /// On success [`upper_dev`](Self::upper_dev) holds the verified node
    /// path; on any failure the partially built mapping has been removed and
    /// `upper_dev` stays unset.
    pub fn setup(&mut self) -> Result<(), DmError> {
        let mut ctl = DmHandle::open()?;
        self.setup_with(&mut ctl)
    }

    /// Runs the setup pipeline against a caller-supplied control plane.
    ///
    /// # Errors
    ///
    /// Each pipeline stage fails with its own [`DmError`] variant; from the
    /// table load onward a failure also removes the created device before
    /// returning. A rollback-remove failure is logged as a warning only, so
    /// the stage error is never masked.
    pub fn setup_with(&mut self, ctl: &mut dyn DmControl) -> Result<(), DmError> {
        if self.upper_dev.is_some() {
            return Err(DmError::InvalidState("device is already set up"));
        }

        ctl.create(DM_DEVICE_NAME, &self.uuid)?;

        match self.configure(ctl) {
            Ok(upper_dev) => {
                info!(node = %upper_dev.display(), uuid = %self.uuid, "configured dm-verity device");
                self.upper_dev = Some(upper_dev);
                Ok(())
            }
            Err(err) => {
                if let Err(remove_err) = ctl.remove(&self.uuid, false) {
                    warn!(uuid = %self.uuid, error = %remove_err, "failed to remove bad dm-verity device on error");
                }
                Err(err)
            }
        }
    }

    /// Stages after create; any error here obliges the caller to remove the
    /// created device.
    fn configure(&self, ctl: &mut dyn DmControl) -> Result<PathBuf, DmError> {
        let params = verity_params(&self.lower_dev, self.data_size, &self.root_digest, &self.salt)?;
        ctl.load_table(&self.uuid, self.data_size / SECTOR_SIZE, &params)?;

        let dev = ctl.resume(&self.uuid)?;
        let upper_dev = PathBuf::from(format!("/dev/dm-{}", dev_minor(dev)));

        ctl.probe(&upper_dev)?;

        let status = ctl.table_status(&self.uuid)?;
        if !status_is_verified(&status) {
            return Err(DmError::UnexpectedStatus(status));
        }

        Ok(upper_dev)
    }

    /// Tears the verity mapping down against the live control plane.
    ///
    /// With `deferred`, the kernel delays the actual teardown until the last
    /// opener of the node closes it and the call succeeds immediately.
    pub fn remove(&mut self, deferred: bool) -> Result<(), DmError> {
        let mut ctl = DmHandle::open()?;
        self.remove_with(&mut ctl, deferred)
    }

    /// Runs the removal against a caller-supplied control plane.
    ///
    /// # Errors
    ///
    /// Returns [`DmError::InvalidState`] if the device is not active, or
    /// [`DmError::RemoveFailed`] from the control plane; on failure
    /// `upper_dev` is left untouched.
    pub fn remove_with(&mut self, ctl: &mut dyn DmControl, deferred: bool) -> Result<(), DmError> {
        if self.upper_dev.is_none() {
            return Err(DmError::InvalidState("device is not set up"));
        }
        ctl.remove(&self.uuid, deferred)?;
        self.upper_dev = None;
        Ok(())
    }
}

fn check_hex(field: &'static str, value: &str) -> Result<(), DmError> {
    if value.is_empty() {
        return Err(DmError::InvalidField {
            field,
            reason: "empty".into(),
        });
    }
    if let Some(bad) = value.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(DmError::InvalidField {
            field,
            reason: format!("non-hex character {bad:?}"),
        });
    }
    Ok(())
}
