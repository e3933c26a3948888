//! Microphone enumeration via the MMDevice API.
//!
//! Lists active capture endpoints with friendly names and transport types,
//! so a caller can pick one for `WasapiCaptureDevice::with_device`.

use windows::Win32::Devices::FunctionDiscovery::{PKEY_Device_EnumeratorName, PKEY_Device_FriendlyName};
use windows::Win32::Foundation::PROPERTYKEY;
use windows::Win32::Media::Audio::{
    eCapture, eConsole, IMMDevice, IMMDeviceEnumerator, MMDeviceEnumerator, DEVICE_STATE_ACTIVE,
};
use windows::Win32::System::Com::{CoCreateInstance, CoTaskMemFree, CLSCTX_ALL, STGM_READ};

use aac_capture_core::models::audio_models::{AudioSource, AudioTransportType};
use aac_capture_core::models::error::RecorderError;

use crate::com::{wide_to_string, MtaUsage};

/// Capture endpoint enumerator.
pub struct DeviceEnumerator {
    enumerator: IMMDeviceEnumerator,
    _mta: MtaUsage,
}

impl DeviceEnumerator {
    pub fn new() -> Result<Self, RecorderError> {
        let mta = MtaUsage::acquire()?;
        let enumerator: IMMDeviceEnumerator = unsafe { CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL) }
            .map_err(|e| RecorderError::Device(format!("failed to create device enumerator: {}", e)))?;
        Ok(Self {
            enumerator,
            _mta: mta,
        })
    }

    /// List active capture (microphone) devices.
    pub fn list_capture_devices(&self) -> Result<Vec<AudioSource>, RecorderError> {
        unsafe {
            let collection = self
                .enumerator
                .EnumAudioEndpoints(eCapture, DEVICE_STATE_ACTIVE)
                .map_err(|e| RecorderError::Device(format!("EnumAudioEndpoints failed: {}", e)))?;
            let count = collection
                .GetCount()
                .map_err(|e| RecorderError::Device(format!("GetCount failed: {}", e)))?;

            let default_id = self.default_capture_device_id().ok();
            let mut devices = Vec::with_capacity(count as usize);

            for i in 0..count {
                let Ok(device) = collection.Item(i) else {
                    continue;
                };
                let Some(id) = device_id(&device) else {
                    continue;
                };
                let name = string_property(&device, &PKEY_Device_FriendlyName)
                    .unwrap_or_else(|| format!("Microphone {}", i + 1));

                devices.push(AudioSource {
                    is_default: default_id.as_deref() == Some(id.as_str()),
                    transport_type: Some(detect_transport_type(&device)),
                    id,
                    name,
                });
            }

            log::debug!("Found {} capture devices", devices.len());
            Ok(devices)
        }
    }

    /// Endpoint ID of the default console microphone.
    pub fn default_capture_device_id(&self) -> Result<String, RecorderError> {
        let device = unsafe { self.enumerator.GetDefaultAudioEndpoint(eCapture, eConsole) }
            .map_err(|e| RecorderError::Device(format!("no default capture device: {}", e)))?;
        device_id(&device).ok_or_else(|| RecorderError::Device("default capture device has no ID".into()))
    }

    pub(crate) fn device(&self, id: Option<&str>) -> Result<IMMDevice, RecorderError> {
        unsafe {
            match id {
                Some(id) => {
                    let wide: Vec<u16> = id.encode_utf16().chain(std::iter::once(0)).collect();
                    self.enumerator
                        .GetDevice(windows::core::PCWSTR(wide.as_ptr()))
                        .map_err(|e| RecorderError::Device(format!("capture device {} not found: {}", id, e)))
                }
                None => self
                    .enumerator
                    .GetDefaultAudioEndpoint(eCapture, eConsole)
                    .map_err(|e| RecorderError::Device(format!("no default capture device: {}", e))),
            }
        }
    }
}

fn device_id(device: &IMMDevice) -> Option<String> {
    unsafe {
        let id = device.GetId().ok()?;
        let value = wide_to_string(id);
        CoTaskMemFree(Some(id.0 as *const _));
        value
    }
}

/// Read a string property from the device's property store.
fn string_property(device: &IMMDevice, key: &PROPERTYKEY) -> Option<String> {
    let value = unsafe {
        let store = device.OpenPropertyStore(STGM_READ).ok()?;
        store.GetValue(key).ok()?
    };
    let text = value.to_string();
    (!text.is_empty()).then_some(text)
}

fn detect_transport_type(device: &IMMDevice) -> AudioTransportType {
    match string_property(device, &PKEY_Device_EnumeratorName) {
        Some(name) => transport_from_enumerator(&name),
        None => AudioTransportType::Unknown,
    }
}

/// Map a PnP enumerator name (`PKEY_Device_EnumeratorName`) to a transport.
fn transport_from_enumerator(name: &str) -> AudioTransportType {
    let name = name.to_ascii_uppercase();
    if name.contains("BTHLEENUM") {
        AudioTransportType::BluetoothLE
    } else if name.contains("BTHENUM") {
        AudioTransportType::Bluetooth
    } else if name.contains("USB") {
        AudioTransportType::Usb
    } else if name.contains("SWD") || name.contains("ROOT") {
        AudioTransportType::Virtual
    } else {
        AudioTransportType::BuiltIn
    }
}
