//! SensorReading - Sensor Store output
//!
//! Immutable time-stamped readings and their interpolated derivatives.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::ChannelId;

/// Simulated time in microseconds since epoch.
pub type Timestamp = i64;

/// One raw reading from a channel.
///
/// Readings are never mutated after creation; the bridge and interpolator
/// build new values instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub channel_id: ChannelId,

    /// Microseconds, non-decreasing per channel
    pub timestamp_us: Timestamp,

    pub payload: SensorPayload,

    /// 0.0 - 1.0
    #[serde(default = "default_quality")]
    pub quality: f32,

    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

fn default_quality() -> f32 {
    1.0
}

impl SensorReading {
    pub fn new(channel_id: impl Into<ChannelId>, timestamp_us: Timestamp, payload: SensorPayload) -> Self {
        Self {
            channel_id: channel_id.into(),
            timestamp_us,
            payload,
            quality: 1.0,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_quality(mut self, quality: f32) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Sensor data payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorPayload {
    /// Camera frame (RGB/Depth/SemanticSeg)
    Camera(ImageData),

    /// LiDAR point cloud
    Lidar(PointCloudData),

    /// Radar detections
    Radar(RadarData),

    /// Single range measurement
    Ultrasonic { distance_m: f64, cone_angle_rad: f64 },

    Imu(ImuData),

    Gps(GpsData),

    /// CAN bus frame
    Can { message_id: u32, data: Bytes },

    /// Generic numeric signal
    Scalar(f64),

    /// Raw bytes (fallback)
    Raw(Bytes),
}

impl SensorPayload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Self::Camera(_) => PayloadKind::Camera,
            Self::Lidar(_) => PayloadKind::Lidar,
            Self::Radar(_) => PayloadKind::Radar,
            Self::Ultrasonic { .. } => PayloadKind::Ultrasonic,
            Self::Imu(_) => PayloadKind::Imu,
            Self::Gps(_) => PayloadKind::Gps,
            Self::Can { .. } => PayloadKind::Can,
            Self::Scalar(_) => PayloadKind::Scalar,
            Self::Raw(_) => PayloadKind::Raw,
        }
    }

    /// Whether the payload's fields are numeric and can be blended linearly.
    pub fn is_interpolable(&self) -> bool {
        self.kind().is_interpolable()
    }

    /// Primary scalar view used by simple components (range, speed, value).
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            Self::Ultrasonic { distance_m, .. } => Some(*distance_m),
            Self::Imu(imu) => Some(imu.accelerometer.x),
            Self::Gps(gps) => Some(gps.altitude),
            _ => None,
        }
    }
}

/// Payload discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Camera,
    Lidar,
    Radar,
    Ultrasonic,
    Imu,
    Gps,
    Can,
    Scalar,
    Raw,
}

impl PayloadKind {
    pub const ALL: [PayloadKind; 9] = [
        Self::Camera,
        Self::Lidar,
        Self::Radar,
        Self::Ultrasonic,
        Self::Imu,
        Self::Gps,
        Self::Can,
        Self::Scalar,
        Self::Raw,
    ];

    pub fn is_interpolable(self) -> bool {
        matches!(self, Self::Ultrasonic | Self::Imu | Self::Gps | Self::Scalar)
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Camera => "camera",
            Self::Lidar => "lidar",
            Self::Radar => "radar",
            Self::Ultrasonic => "ultrasonic",
            Self::Imu => "imu",
            Self::Gps => "gps",
            Self::Can => "can",
            Self::Scalar => "scalar",
            Self::Raw => "raw",
        };
        f.write_str(s)
    }
}

/// Image data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub data: Bytes,
}

/// Pixel format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    Rgb8,
    Rgba8,
    Bgra8,
    Depth,
    SemanticSeg,
}

/// LiDAR point cloud data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointCloudData {
    pub num_points: u32,

    /// Bytes per point (usually 16: x,y,z,intensity)
    pub point_stride: u32,

    pub data: Bytes,
}

/// Radar data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadarData {
    pub num_detections: u32,
    pub data: Bytes,
}

/// IMU data
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImuData {
    /// m/s²
    pub accelerometer: Vector3,

    /// rad/s
    pub gyroscope: Vector3,

    /// rad
    pub compass: f64,
}

/// GPS fix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsData {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    #[serde(default)]
    pub accuracy_m: f64,
}

/// 3D vector
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// How an interpolated reading was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpolationMethod {
    /// A stored reading at exactly the requested time
    Exact,
    Nearest,
    Linear,
    /// Only an earlier reading was usable
    LastKnownGood,
}

/// A reading served to a component, possibly synthesized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpolatedReading {
    /// Carries the requested timestamp when synthesized
    pub reading: SensorReading,

    pub synthesized: bool,

    pub method: InterpolationMethod,

    /// Only one side of the requested time had data
    pub stale: bool,
}

impl InterpolatedReading {
    pub fn exact(reading: SensorReading) -> Self {
        Self {
            reading,
            synthesized: false,
            method: InterpolationMethod::Exact,
            stale: false,
        }
    }
}
