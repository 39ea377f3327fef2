//! Verity target table construction and the status contract.

use crate::abi::DM_PARAMS_SIZE;
use crate::errors::DmError;

/// Block size for both data and hash blocks, in bytes.
pub const BLOCK_SIZE: u64 = 4096;

/// Sector size the device-mapper table is expressed in, in bytes.
pub const SECTOR_SIZE: u64 = 512;

/// Target type name of the hash-tree verification target.
pub const VERITY_TARGET: &str = "verity";

/// Hash algorithm used by verity format version 1 tables built here.
pub const HASH_ALGORITHM: &str = "sha256";

/// The exact status string a healthy, fully verified target reports.
pub const STATUS_VERIFIED: &str = "V";

/// Maximum length of the formatted parameter string; the parameter area
/// must also hold the trailing NUL.
pub const MAX_PARAMS_LEN: usize = DM_PARAMS_SIZE - 1;

/// Formats the verity target parameter string.
///
/// Layout (verity format version 1): version, data device, hash device,
/// data block size, hash block size, data block count, hash start offset in
/// hash blocks, algorithm, root digest, salt. Data and hash share one device
/// with the hash tree appended directly after the data, so the device is
/// named twice and the hash offset equals the data block count.
///
/// # Errors
///
/// Returns [`DmError::ParamsOverflow`] if the formatted string would not fit
/// the fixed parameter area of the table-load ioctl.
pub fn verity_params(
    lower_dev: &str,
    data_size: u64,
    root_digest: &str,
    salt: &str,
) -> Result<String, DmError> {
    let data_blocks = data_size / BLOCK_SIZE;
    let params = format!(
        "1 {lower_dev} {lower_dev} {BLOCK_SIZE} {BLOCK_SIZE} \
         {data_blocks} {data_blocks} {HASH_ALGORITHM} {root_digest} {salt}"
    );
    if params.len() > MAX_PARAMS_LEN {
        return Err(DmError::ParamsOverflow {
            len: params.len(),
            max: MAX_PARAMS_LEN,
        });
    }
    Ok(params)
}

/// Returns whether a target status string reports full verification.
///
/// Only the exact literal `"V"` counts; corruption markers, error codes,
/// and empty responses are all failures, never partial success.
pub fn status_is_verified(status: &str) -> bool {
    status == STATUS_VERIFIED
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_match_verity_version_1_layout() {
        let params = verity_params(
            "/dev/loop0",
            4096,
            "a8d2f1e4c7b09365a8d2f1e4c7b09365a8d2f1e4c7b09365a8d2f1e4c7b09365",
            "0123456789abcdef0123456789abcdef",
        )
        .unwrap();
        assert_eq!(
            params,
            "1 /dev/loop0 /dev/loop0 4096 4096 1 1 sha256 \
             a8d2f1e4c7b09365a8d2f1e4c7b09365a8d2f1e4c7b09365a8d2f1e4c7b09365 \
             0123456789abcdef0123456789abcdef"
        );
    }

    #[test]
    fn block_count_appears_as_data_blocks_and_hash_offset() {
        let params = verity_params("/dev/loop0", 4096 * 137, "aa", "bb").unwrap();
        let fields: Vec<&str> = params.split(' ').collect();
        assert_eq!(fields[5], "137");
        assert_eq!(fields[6], "137");
        assert_eq!(fields.len(), 10);
    }

    #[test]
    fn oversized_inputs_are_rejected() {
        let long_salt = "ab".repeat(600);
        let err = verity_params("/dev/loop0", 4096, "aa", &long_salt).unwrap_err();
        assert!(matches!(err, DmError::ParamsOverflow { .. }));

        let long_dev = format!("/dev/{}", "x".repeat(600));
        let err = verity_params(&long_dev, 4096, "aa", "bb").unwrap_err();
        assert!(matches!(err, DmError::ParamsOverflow { .. }));
    }

    #[test]
    fn boundary_length_is_accepted() {
        let base = verity_params("/dev/loop0", 4096, "aa", "").unwrap().len();
        let salt = "c".repeat(MAX_PARAMS_LEN - base);
        assert!(verity_params("/dev/loop0", 4096, "aa", &salt).is_ok());
        let salt = "c".repeat(MAX_PARAMS_LEN - base + 1);
        assert!(verity_params("/dev/loop0", 4096, "aa", &salt).is_err());
    }

    #[test]
    fn only_the_exact_verified_marker_passes() {
        assert!(status_is_verified("V"));
        assert!(!status_is_verified("C"));
        assert!(!status_is_verified(""));
        assert!(!status_is_verified("V "));
        assert!(!status_is_verified("v"));
    }
}
