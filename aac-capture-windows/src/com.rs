//! COM and Media Foundation lifetime guards shared by the backends.

use windows::core::PWSTR;
use windows::Win32::Media::MediaFoundation::{MFShutdown, MFStartup, MFSTARTUP_FULL, MF_VERSION};
use windows::Win32::System::Com::{CoDecrementMTAUsage, CoIncrementMTAUsage, CO_MTA_USAGE_COOKIE};

use aac_capture_core::models::error::RecorderError;

/// Keeps the process multithreaded apartment alive.
///
/// While held, any thread that never called `CoInitializeEx` is treated as
/// an implicit MTA member. Capture and encode run on threads owned by the
/// core crate, so this is what lets them call into COM objects created on
/// the thread that called `begin`.
pub(crate) struct MtaUsage {
    cookie: CO_MTA_USAGE_COOKIE,
}

impl MtaUsage {
    pub(crate) fn acquire() -> Result<Self, RecorderError> {
        let cookie = unsafe { CoIncrementMTAUsage() }
            .map_err(|e| RecorderError::Unknown(format!("CoIncrementMTAUsage failed: {}", e)))?;
        Ok(Self { cookie })
    }
}

impl Drop for MtaUsage {
    fn drop(&mut self) {
        if let Err(e) = unsafe { CoDecrementMTAUsage(self.cookie) } {
            log::warn!("CoDecrementMTAUsage failed: {}", e);
        }
    }
}

/// One `MFStartup`/`MFShutdown` pair. Calls are reference counted by
/// Media Foundation, so every encoder may hold its own.
pub(crate) struct MediaFoundation {
    _mta: MtaUsage,
}

impl MediaFoundation {
    pub(crate) fn startup() -> Result<Self, RecorderError> {
        let mta = MtaUsage::acquire()?;
        unsafe { MFStartup(MF_VERSION, MFSTARTUP_FULL) }
            .map_err(|e| RecorderError::Encoder(format!("MFStartup failed: {}", e)))?;
        Ok(Self { _mta: mta })
    }
}

impl Drop for MediaFoundation {
    fn drop(&mut self) {
        if let Err(e) = unsafe { MFShutdown() } {
            log::warn!("MFShutdown failed: {}", e);
        }
    }
}

/// Copy a NUL-terminated wide string owned by COM into a `String`.
///
/// # Safety
/// `value` must be null or point to a valid NUL-terminated UTF-16 string.
pub(crate) unsafe fn wide_to_string(value: PWSTR) -> Option<String> {
    if value.is_null() {
        return None;
    }
    value.to_string().ok()
}
