// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Format negotiation across the capture chain.
//!
//! One configure pass pushes a single format decision through every stage:
//!
//! | Step | Device | Pad | Format |
//! |------|--------|-----|--------|
//! | 1 | sensor | 0 | native code, native size |
//! | 2 | CSI-2 receiver | 0, 1 | same as sensor |
//! | 3 | ISP core | 0 | same as sensor |
//! | 3 | ISP core | 1 | [`ISP_OUTPUT_CODE`], native size |
//! | 4 | scaler | 0 | ISP output |
//! | 4 | scaler | 1 | validated scaler format (requested size) |
//! | 5 | capture sink | - | requested pixel format, size and stride |
//!
//! The pass is staged first: every target format is computed into a
//! [`ChainPlan`] before any device is touched. The plan is then applied in
//! order, stopping at the first rejected stage. A device may adjust a
//! request; the adjusted value is recorded but not re-validated.
//!
//! A successful pass becomes the known-good snapshot. When a later pass
//! fails, the snapshot is re-applied so the stages are not left mismatched,
//! and the stage failure is returned.

use std::fmt;

use crate::config::{CameraConfiguration, ISP_OUTPUT_CODE};
use crate::formats::PixelFormatInfo;
use crate::media::{DeviceFormat, PlaneFormat, SubdeviceFormat};
use crate::topology::{PipelineBinding, Role};
use crate::Error;

/// One format to apply to one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatStep {
    /// Media-bus format on a sub-device pad. `pipe` selects the scaler
    /// instance and is zero for the shared stages.
    Pad {
        role: Role,
        pipe: usize,
        pad: u32,
        format: SubdeviceFormat,
    },
    /// Memory format on the capture sink of `pipe`.
    Capture { pipe: usize, format: DeviceFormat },
}

impl FormatStep {
    pub fn role(&self) -> Role {
        match self {
            FormatStep::Pad { role, .. } => *role,
            FormatStep::Capture { .. } => Role::CaptureSink,
        }
    }
}

impl fmt::Display for FormatStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatStep::Pad {
                role, pad, format, ..
            } => write!(f, "[{:<4}] pad {}: {}", role.tag(), pad, format),
            FormatStep::Capture { format, .. } => {
                write!(f, "[{:<4}] {}", Role::CaptureSink.tag(), format)
            }
        }
    }
}

/// Ordered list of formats covering the whole chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainPlan {
    steps: Vec<FormatStep>,
}

impl ChainPlan {
    /// Compute every stage format for `config` without touching a device.
    pub fn stage(binding: &PipelineBinding, config: &CameraConfiguration) -> Result<Self, Error> {
        let profile = binding.sensor.profile;
        let scaler_format = config.sensor_format();
        if scaler_format.size.is_null() {
            return Err(Error::InvalidConfiguration("configuration not validated"));
        }

        let csi_format = SubdeviceFormat::new(profile.code, profile.size);
        let isp_format = SubdeviceFormat::new(ISP_OUTPUT_CODE, profile.size);
        let scaler_format = SubdeviceFormat::new(ISP_OUTPUT_CODE, scaler_format.size);

        let pad = |role, pipe, pad, format| FormatStep::Pad {
            role,
            pipe,
            pad,
            format,
        };

        let mut steps = vec![
            pad(Role::Sensor, 0, 0, csi_format),
            pad(Role::CsiReceiver, 0, 0, csi_format),
            pad(Role::CsiReceiver, 0, 1, csi_format),
            pad(Role::IspCore, 0, 0, csi_format),
            pad(Role::IspCore, 0, 1, isp_format),
        ];

        for stream in config {
            let pipe = stream
                .stream()
                .ok_or(Error::InvalidConfiguration("stream not assigned"))?;
            let capture = &binding
                .pipes
                .get(pipe.0)
                .ok_or(Error::NoPipe(pipe))?
                .capture;
            let info = PixelFormatInfo::info(stream.pixel_format)
                .ok_or(Error::InvalidConfiguration("unsupported pixel format"))?;

            let planes = (0..info.num_planes as usize)
                .map(|i| {
                    let bytes_per_line = if i == 0 {
                        stream.stride
                    } else {
                        info.stride(stream.size.width, i, 0)
                    };
                    let sub = info.planes[i].vertical_sub_sampling.max(1);
                    PlaneFormat {
                        bytes_per_line,
                        size: bytes_per_line * stream.size.height.div_ceil(sub),
                    }
                })
                .collect();

            steps.push(pad(Role::Scaler, pipe.0, 0, isp_format));
            steps.push(pad(Role::Scaler, pipe.0, 1, scaler_format));
            steps.push(FormatStep::Capture {
                pipe: pipe.0,
                format: DeviceFormat {
                    fourcc: capture.to_v4l2_pixel_format(stream.pixel_format),
                    size: stream.size,
                    planes,
                },
            });
        }

        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[FormatStep] {
        &self.steps
    }

    /// Format applied to `pad` of the device playing `role`.
    pub fn pad_format(&self, role: Role, pad: u32) -> Option<SubdeviceFormat> {
        self.steps.iter().find_map(|step| match step {
            FormatStep::Pad {
                role: r,
                pad: p,
                format,
                ..
            } if *r == role && *p == pad => Some(*format),
            _ => None,
        })
    }

    pub fn capture_format(&self, pipe: usize) -> Option<&DeviceFormat> {
        self.steps.iter().find_map(|step| match step {
            FormatStep::Capture { pipe: p, format } if *p == pipe => Some(format),
            _ => None,
        })
    }

    /// Apply every step in order. Returns the plan as echoed by the devices.
    fn apply(&self, binding: &mut PipelineBinding) -> Result<ChainPlan, Error> {
        let mut applied = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            let mut step = step.clone();
            match &mut step {
                FormatStep::Pad {
                    role,
                    pipe,
                    pad,
                    format,
                } => {
                    let device = match role {
                        Role::Sensor => &mut binding.sensor.device,
                        Role::CsiReceiver => &mut binding.csi2rx,
                        Role::IspCore => &mut binding.isp,
                        Role::Scaler => {
                            &mut binding
                                .pipes
                                .get_mut(*pipe)
                                .ok_or(Error::NoPipe(crate::config::StreamId(*pipe)))?
                                .resizer
                        }
                        Role::LensActuator | Role::CaptureSink => {
                            return Err(Error::InvalidConfiguration("role has no format pad"))
                        }
                    };
                    device
                        .set_format(*pad, format)
                        .map_err(|source| Error::SetFormat {
                            role: *role,
                            pad: Some(*pad),
                            source,
                        })?;
                }
                FormatStep::Capture { pipe, format } => {
                    let pipe = binding
                        .pipes
                        .get_mut(*pipe)
                        .ok_or(Error::NoPipe(crate::config::StreamId(*pipe)))?;
                    pipe.capture
                        .set_format(format)
                        .map_err(|source| Error::SetFormat {
                            role: Role::CaptureSink,
                            pad: None,
                            source,
                        })?;
                }
            }

            log::debug!("  {}", step);
            applied.push(step);
        }

        Ok(ChainPlan { steps: applied })
    }
}

/// Applies chain plans and keeps the last known-good one.
#[derive(Debug, Default)]
pub struct FormatNegotiator {
    last_good: Option<ChainPlan>,
}

impl FormatNegotiator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Formats in effect after the last successful pass
    pub fn applied(&self) -> Option<&ChainPlan> {
        self.last_good.as_ref()
    }

    /// Stage and apply the formats for `config`.
    ///
    /// # Errors
    ///
    /// [`Error::Link`] if the sensor link cannot be enabled,
    /// [`Error::SetFormat`] naming the first stage that rejected its format,
    /// or [`Error::InvalidConfiguration`] if `config` cannot be staged.
    pub fn negotiate(
        &mut self,
        binding: &mut PipelineBinding,
        config: &CameraConfiguration,
    ) -> Result<&ChainPlan, Error> {
        let plan = ChainPlan::stage(binding, config)?;

        // All links are immutable except sensor -> CSI receiver.
        let sensor_name = binding.sensor.entity.name().to_owned();
        binding
            .media
            .setup_link(&sensor_name, 0, true)
            .map_err(|source| Error::Link {
                entity: sensor_name.clone(),
                source,
            })?;

        log::debug!("Applying chain formats");
        match plan.apply(binding) {
            Ok(applied) => Ok(self.last_good.insert(applied)),
            Err(err) => {
                log::error!("Format negotiation failed: {}", err);
                self.rollback(binding);
                Err(err)
            }
        }
    }

    fn rollback(&mut self, binding: &mut PipelineBinding) {
        let Some(good) = self.last_good.take() else {
            log::warn!("No known-good formats, chain left partially configured");
            return;
        };

        log::debug!("Restoring last known-good formats");
        match good.apply(binding) {
            Ok(restored) => self.last_good = Some(restored),
            Err(err) => log::error!("Failed to restore known-good formats: {}", err),
        }
    }
}
