//! Profile application: translating an acquisition profile into feature
//! writes, with capability gating and safe clamping.

use crate::config::{AcquisitionProfile, AutoMode};
use crate::error::{CamError, CamResult};
use crate::transport::{feature, RemoteDevice};
use tracing::{debug, error, warn};

/// Apply `profile` to an open device.
///
/// When a stored user set other than the device default is selected, the
/// device-stored profile takes over entirely: the selector is written, the
/// load command executed, and no other field of the profile is touched.
///
/// Otherwise width/height are clamped against the sensor maxima (a request
/// beyond the maximum applies the maximum instead of erroring), the readout
/// region is centered on the sensor, and the remaining fields are written
/// where given. The auto-adjustment modes are gated on the device's node
/// map: an unsupported mode degrades to a warning.
pub fn apply_profile(device: &mut dyn RemoteDevice, profile: &AcquisitionProfile) -> CamResult<()> {
    if profile.uses_stored_user_set() {
        device.write_enumeration(feature::USER_SET_SELECTOR, &profile.user_set_selector)?;
        device.execute(feature::USER_SET_LOAD)?;
        debug!(user_set = %profile.user_set_selector, "loaded stored user set");
        return Ok(());
    }

    if let Some(width) = profile.image_width {
        write_clamped(device, feature::WIDTH, feature::WIDTH_MAX, width)?;
    }
    if let Some(height) = profile.image_height {
        write_clamped(device, feature::HEIGHT, feature::HEIGHT_MAX, height)?;
    }

    center_readout_region(device)?;

    if let Some(format) = profile.pixel_format {
        device.write_enumeration(feature::PIXEL_FORMAT, format.as_tag())?;
    }

    debug!(
        exposure_auto = ?profile.exposure_auto,
        exposure_time = ?profile.exposure_time,
        "applying exposure settings"
    );
    if profile.exposure_auto.is_some() {
        if let Some(exposure) = profile.exposure_time {
            if let Err(e) = device.write_float(feature::EXPOSURE_TIME, exposure) {
                if matches!(e, CamError::FeatureOutOfRange { .. }) {
                    error!(
                        "specified exposure time outside the selected camera's \
                         range; choose a smaller value"
                    );
                }
                return Err(e);
            }
        }
    }

    apply_auto_mode(device, feature::EXPOSURE_AUTO, profile.exposure_auto, "exposure time")?;
    apply_auto_mode(device, feature::GAIN_AUTO, profile.gain_auto, "gain")?;
    apply_auto_mode(
        device,
        feature::BALANCE_WHITE_AUTO,
        profile.balance_white_auto,
        "white balance",
    )?;

    Ok(())
}

/// Write `requested` to `node`, clamped to the device-reported maximum.
fn write_clamped(
    device: &mut dyn RemoteDevice,
    node: &'static str,
    max_node: &'static str,
    requested: i64,
) -> CamResult<()> {
    let max = device.read_integer(max_node)?;
    let value = if requested > max {
        warn!(
            requested,
            max, "requested {node} exceeds the sensor maximum; applying the maximum"
        );
        max
    } else {
        requested
    };
    device.write_integer(node, value)
}

/// Center the configured readout region on the sensor.
fn center_readout_region(device: &mut dyn RemoteDevice) -> CamResult<()> {
    let width_max = device.read_integer(feature::WIDTH_MAX)?;
    let width = device.read_integer(feature::WIDTH)?;
    device.write_integer(feature::OFFSET_X, (width_max - width) / 2)?;

    let height_max = device.read_integer(feature::HEIGHT_MAX)?;
    let height = device.read_integer(feature::HEIGHT)?;
    device.write_integer(feature::OFFSET_Y, (height_max - height) / 2)?;
    Ok(())
}

/// Write an auto-adjustment mode if the device supports it; warn otherwise.
fn apply_auto_mode(
    device: &mut dyn RemoteDevice,
    node: &'static str,
    mode: Option<AutoMode>,
    label: &str,
) -> CamResult<()> {
    let Some(mode) = mode else {
        return Ok(());
    };
    if device.has_feature(node) {
        device.write_enumeration(node, mode.feature_value())?;
    } else {
        warn!("camera does not support automatic adjustment of {label}");
    }
    Ok(())
}
