//! Check command implementation: full setup followed by removal.

use serde_json::json;
use veridev_dm::VerityDevice;

pub fn run(
    lower_dev: String,
    root_hash: String,
    salt: String,
    data_size: u64,
    deferred: bool,
    json_output: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut device = VerityDevice::new(lower_dev, data_size, root_hash, salt)?;

    device.setup()?;
    let node = device
        .upper_dev()
        .expect("setup succeeded, device is active")
        .display()
        .to_string();
    device.remove(deferred)?;

    if json_output {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "verified": true,
                "node": node,
            }))?
        );
    } else {
        println!("OK {}", node);
    }

    Ok(())
}
