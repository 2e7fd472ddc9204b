//! Audio device enumeration over the default cpal host.
//!
//! cpal 0.15 exposes no stable endpoint id, so the device name doubles as
//! the id reported in [`AudioSource`] and accepted by
//! `CaptureConfiguration::{mic,desktop}_device_id`.
//!
//! Desktop audio comes from a different place per platform:
//! - Windows: any render endpoint, opened as an input stream (WASAPI loopback)
//! - elsewhere: an input device that exposes the output mix, such as a
//!   PulseAudio/PipeWire `.monitor` source or a virtual loopback driver

use cpal::traits::{DeviceTrait, HostTrait};

use meetsync_core::{AudioSource, CaptureError, SourceKind};

/// Name fragments of input devices that carry the system output mix.
const LOOPBACK_KEYWORDS: &[&str] = &[
    "monitor",
    "loopback",
    "stereo mix",
    "blackhole",
    "soundflower",
    "vb-audio",
];

/// A device resolved for capture together with its native default format.
pub struct ResolvedDevice {
    pub device: cpal::Device,
    pub info: AudioSource,
    pub default_config: cpal::SupportedStreamConfig,
}

/// Audio device enumerator for the platform's default cpal host.
pub struct DeviceEnumerator {
    host: cpal::Host,
}

impl DeviceEnumerator {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    /// List input devices usable as a microphone.
    pub fn list_capture_devices(&self) -> Result<Vec<AudioSource>, CaptureError> {
        Ok(self
            .capture_candidates()?
            .into_iter()
            .map(|resolved| resolved.info)
            .collect())
    }

    /// List devices usable as a desktop audio source.
    pub fn list_loopback_devices(&self) -> Result<Vec<AudioSource>, CaptureError> {
        Ok(self
            .loopback_candidates()?
            .into_iter()
            .map(|resolved| resolved.info)
            .collect())
    }

    /// Resolve the device for `kind`, by name when `id` is given, otherwise
    /// the platform default.
    pub fn resolve(&self, kind: SourceKind, id: Option<&str>) -> Result<ResolvedDevice, CaptureError> {
        let candidates = match kind {
            SourceKind::Mic => self.capture_candidates()?,
            SourceKind::Desktop => self.loopback_candidates()?,
        };

        let index = match id {
            Some(query) => {
                let names: Vec<&str> = candidates.iter().map(|c| c.info.name.as_str()).collect();
                find_device(&names, query).ok_or_else(|| {
                    CaptureError::DeviceUnavailable(format!(
                        "no {} device matching '{}'",
                        kind.label(),
                        query
                    ))
                })?
            }
            None => candidates
                .iter()
                .position(|c| c.info.is_default)
                .or_else(|| (!candidates.is_empty()).then_some(0))
                .ok_or_else(|| {
                    CaptureError::DeviceUnavailable(match kind {
                        SourceKind::Mic => "no input device".to_string(),
                        SourceKind::Desktop => "no loopback-capable device".to_string(),
                    })
                })?,
        };

        candidates.into_iter().nth(index).ok_or_else(|| {
            CaptureError::DeviceUnavailable(format!("{} device disappeared", kind.label()))
        })
    }

    fn capture_candidates(&self) -> Result<Vec<ResolvedDevice>, CaptureError> {
        let default_name = self
            .host
            .default_input_device()
            .and_then(|d| d.name().ok());

        let devices = self
            .host
            .input_devices()
            .map_err(|e| CaptureError::DeviceUnavailable(format!("input devices: {}", e)))?;

        let mut resolved = Vec::new();
        for device in devices {
            let Ok(name) = device.name() else {
                continue;
            };
            // Monitor sources show up as inputs; they are never a microphone.
            if is_loopback_name(&name) {
                continue;
            }
            let Ok(config) = device.default_input_config() else {
                log::debug!("Skipping input '{}': no default config", name);
                continue;
            };
            let is_default = default_name.as_deref() == Some(name.as_str());
            resolved.push(describe(device, name, SourceKind::Mic, is_default, config));
        }
        Ok(resolved)
    }

    fn loopback_candidates(&self) -> Result<Vec<ResolvedDevice>, CaptureError> {
        if cfg!(target_os = "windows") {
            return self.render_endpoints();
        }

        let devices = self
            .host
            .input_devices()
            .map_err(|e| CaptureError::DeviceUnavailable(format!("input devices: {}", e)))?;

        let mut resolved = Vec::new();
        for device in devices {
            let Ok(name) = device.name() else {
                continue;
            };
            if !is_loopback_name(&name) {
                continue;
            }
            let Ok(config) = device.default_input_config() else {
                continue;
            };
            // The first monitor found stands in for "the default output".
            let is_default = resolved.is_empty();
            resolved.push(describe(device, name, SourceKind::Desktop, is_default, config));
        }
        Ok(resolved)
    }

    /// Render endpoints; WASAPI opens an input stream on them in loopback mode.
    fn render_endpoints(&self) -> Result<Vec<ResolvedDevice>, CaptureError> {
        let default_name = self
            .host
            .default_output_device()
            .and_then(|d| d.name().ok());

        let devices = self
            .host
            .output_devices()
            .map_err(|e| CaptureError::DeviceUnavailable(format!("output devices: {}", e)))?;

        let mut resolved = Vec::new();
        for device in devices {
            let Ok(name) = device.name() else {
                continue;
            };
            let Ok(config) = device.default_output_config() else {
                continue;
            };
            let is_default = default_name.as_deref() == Some(name.as_str());
            resolved.push(describe(device, name, SourceKind::Desktop, is_default, config));
        }
        Ok(resolved)
    }
}

impl Default for DeviceEnumerator {
    fn default() -> Self {
        Self::new()
    }
}

fn describe(
    device: cpal::Device,
    name: String,
    kind: SourceKind,
    is_default: bool,
    config: cpal::SupportedStreamConfig,
) -> ResolvedDevice {
    let info = AudioSource {
        id: name.clone(),
        name,
        kind,
        is_default,
        default_sample_rate: config.sample_rate().0,
        max_input_channels: config.channels(),
    };
    ResolvedDevice {
        device,
        info,
        default_config: config,
    }
}

/// Whether a device name looks like a source of the system output mix.
pub fn is_loopback_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    LOOPBACK_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Index of the device matching `query`: an exact name first, then a
/// case-insensitive exact match, then a case-insensitive substring.
pub fn find_device(names: &[&str], query: &str) -> Option<usize> {
    let query = query.trim();
    if query.is_empty() {
        return None;
    }
    if let Some(i) = names.iter().position(|n| *n == query) {
        return Some(i);
    }
    let lower = query.to_lowercase();
    names
        .iter()
        .position(|n| n.to_lowercase() == lower)
        .or_else(|| names.iter().position(|n| n.to_lowercase().contains(&lower)))
}
