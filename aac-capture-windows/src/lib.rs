//! # aac-capture-windows
//!
//! Windows backends for aac-capture-core.
//!
//! Provides:
//! - `WasapiCaptureDevice`: microphone capture via a WASAPI shared-mode endpoint
//! - `MediaFoundationAacProvider`: AAC-LC encoding via the Media Foundation AAC MFT
//! - `DeviceEnumerator`: microphone enumeration via the MMDevice API
//!
//! ## Platform Requirements
//! - Windows 10 or later (Media Foundation AAC encoder)
//! - Visual Studio Build Tools 2022 + Windows SDK for linking
//!
//! ## Usage
//! ```ignore
//! use aac_capture_core::{RecorderConfiguration, SessionController};
//! use aac_capture_windows::{MediaFoundationAacProvider, WasapiCaptureDevice};
//!
//! let controller = SessionController::new(
//!     WasapiCaptureDevice::default_device(),
//!     MediaFoundationAacProvider,
//!     RecorderConfiguration::default(),
//! )?;
//! let session = controller.begin(None)?;
//! // ...
//! controller.end(&session);
//! let result = session.wait()?;
//! ```

#[cfg(target_os = "windows")]
mod com;
#[cfg(target_os = "windows")]
pub mod device_enumerator;
#[cfg(target_os = "windows")]
pub mod mf_aac_encoder;
#[cfg(target_os = "windows")]
pub mod wasapi_capture;

#[cfg(target_os = "windows")]
pub use device_enumerator::DeviceEnumerator;
#[cfg(target_os = "windows")]
pub use mf_aac_encoder::{MediaFoundationAacProvider, MfAacEncoder};
#[cfg(target_os = "windows")]
pub use wasapi_capture::{WasapiCaptureDevice, WasapiCaptureSource};
