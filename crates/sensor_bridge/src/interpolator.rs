//! Interpolation of sensor readings at arbitrary simulated times.
//!
//! Decision table for a target `t`, previous reading `p` (<= t) and next
//! reading `n` (>= t):
//!
//! | available            | result                                   |
//! |----------------------|------------------------------------------|
//! | `p.t == t`           | `Exact`                                  |
//! | `p`, `n`, gap ok     | `Linear` if blendable, else `Nearest`    |
//! | `p` only / gap large | `LastKnownGood`, stale                   |
//! | `n` only             | `Nearest`, stale                         |
//! | neither              | `DataUnavailable`                        |

use std::collections::HashMap;
use std::f64::consts::TAU;

use contracts::{
    Bracket, ChannelId, GpsData, ImuData, InterpolatedReading, InterpolationMethod,
    InterpolationSettings, SensorPayload, SensorReading, SensorStore, SimError, Timestamp, Vector3,
};

#[derive(Debug, Clone)]
pub struct Interpolator {
    max_gap_us: Timestamp,
    stale_horizon_us: Timestamp,
    lookahead_us: Timestamp,
    channel_gaps: HashMap<ChannelId, Timestamp>,
}

impl Interpolator {
    pub fn new(settings: &InterpolationSettings) -> Self {
        Self {
            max_gap_us: settings.max_gap_us,
            stale_horizon_us: settings.stale_horizon_us,
            lookahead_us: settings.lookahead_us,
            channel_gaps: HashMap::new(),
        }
    }

    /// Per-channel override of the largest blendable gap.
    pub fn with_channel_gap(mut self, channel: ChannelId, max_gap_us: Timestamp) -> Self {
        self.channel_gaps.insert(channel, max_gap_us);
        self
    }

    pub fn max_gap_for(&self, channel: &str) -> Timestamp {
        self.channel_gaps
            .get(channel)
            .copied()
            .unwrap_or(self.max_gap_us)
    }

    /// Search window `(lookback, lookahead)` around a target time.
    pub fn window(&self) -> (Timestamp, Timestamp) {
        (self.stale_horizon_us, self.lookahead_us)
    }

    /// Query the store for the bracket around `at` and resolve it.
    pub async fn lookup<S: SensorStore>(
        &self,
        store: &S,
        channel: &ChannelId,
        at: Timestamp,
    ) -> Result<InterpolatedReading, SimError> {
        let bracket = store
            .bracket(channel, at, self.stale_horizon_us, self.lookahead_us)
            .await?;
        self.resolve(channel, at, &bracket)
    }

    /// Pure resolution of a bracket into one reading.
    pub fn resolve(
        &self,
        channel: &ChannelId,
        at: Timestamp,
        bracket: &Bracket,
    ) -> Result<InterpolatedReading, SimError> {
        match (&bracket.prev, &bracket.next) {
            (Some(p), _) if p.timestamp_us == at => Ok(InterpolatedReading::exact(p.clone())),
            (_, Some(n)) if n.timestamp_us == at => Ok(InterpolatedReading::exact(n.clone())),
            (Some(p), Some(n)) if n.timestamp_us - p.timestamp_us <= self.max_gap_for(channel) => {
                Ok(self.between(p, n, at))
            }
            (Some(p), _) => Ok(InterpolatedReading {
                reading: p.clone(),
                synthesized: true,
                method: InterpolationMethod::LastKnownGood,
                stale: true,
            }),
            (None, Some(n)) => Ok(InterpolatedReading {
                reading: n.clone(),
                synthesized: true,
                method: InterpolationMethod::Nearest,
                stale: true,
            }),
            (None, None) => Err(SimError::data_unavailable(channel.as_str(), at)),
        }
    }

    fn between(&self, p: &SensorReading, n: &SensorReading, at: Timestamp) -> InterpolatedReading {
        let span = (n.timestamp_us - p.timestamp_us) as f64;
        let w = (at - p.timestamp_us) as f64 / span;
        let nearer = if at - p.timestamp_us <= n.timestamp_us - at { p } else { n };

        match blend_payload(&p.payload, &n.payload, w) {
            Some(payload) => InterpolatedReading {
                reading: SensorReading {
                    channel_id: p.channel_id.clone(),
                    timestamp_us: at,
                    payload,
                    quality: lerp(p.quality as f64, n.quality as f64, w) as f32,
                    metadata: nearer.metadata.clone(),
                },
                synthesized: true,
                method: InterpolationMethod::Linear,
                stale: false,
            },
            None => InterpolatedReading {
                reading: nearer.clone(),
                synthesized: true,
                method: InterpolationMethod::Nearest,
                stale: false,
            },
        }
    }
}

#[inline]
fn lerp(a: f64, b: f64, w: f64) -> f64 {
    a + (b - a) * w
}

fn lerp_vec(a: &Vector3, b: &Vector3, w: f64) -> Vector3 {
    Vector3 {
        x: lerp(a.x, b.x, w),
        y: lerp(a.y, b.y, w),
        z: lerp(a.z, b.z, w),
    }
}

/// Heading blend along the shorter arc, result in [0, 2π).
fn lerp_angle(a: f64, b: f64, w: f64) -> f64 {
    let mut delta = (b - a) % TAU;
    if delta > std::f64::consts::PI {
        delta -= TAU;
    } else if delta < -std::f64::consts::PI {
        delta += TAU;
    }
    (a + delta * w).rem_euclid(TAU)
}

/// Field-wise linear blend of two payloads of the same numeric kind.
///
/// Returns `None` for structured payloads (images, point clouds, raw bytes)
/// and for mismatched kinds; callers fall back to the nearest reading.
pub fn blend_payload(a: &SensorPayload, b: &SensorPayload, w: f64) -> Option<SensorPayload> {
    match (a, b) {
        (SensorPayload::Scalar(x), SensorPayload::Scalar(y)) => {
            Some(SensorPayload::Scalar(lerp(*x, *y, w)))
        }
        (
            SensorPayload::Ultrasonic {
                distance_m: d0,
                cone_angle_rad: c0,
            },
            SensorPayload::Ultrasonic {
                distance_m: d1,
                cone_angle_rad: c1,
            },
        ) => Some(SensorPayload::Ultrasonic {
            distance_m: lerp(*d0, *d1, w),
            cone_angle_rad: lerp(*c0, *c1, w),
        }),
        (SensorPayload::Imu(i0), SensorPayload::Imu(i1)) => Some(SensorPayload::Imu(ImuData {
            accelerometer: lerp_vec(&i0.accelerometer, &i1.accelerometer, w),
            gyroscope: lerp_vec(&i0.gyroscope, &i1.gyroscope, w),
            compass: lerp_angle(i0.compass, i1.compass, w),
        })),
        (SensorPayload::Gps(g0), SensorPayload::Gps(g1)) => Some(SensorPayload::Gps(GpsData {
            latitude: lerp(g0.latitude, g1.latitude, w),
            longitude: lerp(g0.longitude, g1.longitude, w),
            altitude: lerp(g0.altitude, g1.altitude, w),
            accuracy_m: lerp(g0.accuracy_m, g1.accuracy_m, w),
        })),
        _ => None,
    }
}
