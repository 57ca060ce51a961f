//! Resource pressure: when to stop analysing and when to wait.
//!
//! Long engine runs heat the machine. Two rules follow from a sampled
//! temperature:
//!
//! - a running analysis stream is cancelled once the temperature passes the
//!   analysis limit ([`ThresholdSignal`]);
//! - the batch driver sleeps before the next attempt while the temperature
//!   is above the cooldown limit ([`Cooldown`]).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::constants::{ANALYSIS_TEMP_LIMIT, COOLDOWN_PER_DEGREE, COOLDOWN_TEMP_LIMIT};

/// A predicate polled between analysis samples. `true` cancels the stream.
pub trait PressureSignal {
    fn asserted(&self) -> bool;
}

impl<F: Fn() -> bool> PressureSignal for F {
    fn asserted(&self) -> bool {
        self()
    }
}

/// Never asserted.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPressure;

impl PressureSignal for NoPressure {
    fn asserted(&self) -> bool {
        false
    }
}

/// Something that reports the hottest current temperature in °C.
pub trait TemperatureSource {
    /// `None` when no sensor could be read.
    fn hottest(&self) -> Option<f64>;
}

/// Linux thermal zones: `<root>/thermal_zone*/temp`, in millidegrees.
#[derive(Debug, Clone)]
pub struct ThermalZones {
    root: PathBuf,
}

impl Default for ThermalZones {
    fn default() -> Self {
        Self::new("/sys/class/thermal")
    }
}

impl ThermalZones {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl TemperatureSource for ThermalZones {
    fn hottest(&self) -> Option<f64> {
        let entries = fs::read_dir(&self.root).ok()?;
        entries
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with("thermal_zone"))
            .filter_map(|e| fs::read_to_string(e.path().join("temp")).ok())
            .filter_map(|s| s.trim().parse::<f64>().ok())
            .map(|milli| milli / 1000.0)
            .reduce(f64::max)
    }
}

/// Asserted while the source reads above `limit`. An unreadable sensor
/// never asserts.
pub struct ThresholdSignal<'a> {
    source: &'a dyn TemperatureSource,
    limit: f64,
}

impl<'a> ThresholdSignal<'a> {
    pub fn new(source: &'a dyn TemperatureSource, limit: f64) -> Self {
        Self { source, limit }
    }

    pub fn analysis(source: &'a dyn TemperatureSource) -> Self {
        Self::new(source, ANALYSIS_TEMP_LIMIT)
    }
}

impl PressureSignal for ThresholdSignal<'_> {
    fn asserted(&self) -> bool {
        match self.source.hottest() {
            Some(t) if t > self.limit => {
                debug!(temperature = t, limit = self.limit, "pressure asserted");
                true
            }
            _ => false,
        }
    }
}

/// Sleep proportional to the excess temperature, re-polling until the
/// source drops to the limit.
#[derive(Debug, Clone, Copy)]
pub struct Cooldown {
    pub limit: f64,
    pub per_degree: Duration,
}

impl Default for Cooldown {
    fn default() -> Self {
        Self {
            limit: COOLDOWN_TEMP_LIMIT,
            per_degree: COOLDOWN_PER_DEGREE,
        }
    }
}

impl Cooldown {
    /// Block until the source is at or below the limit. Returns the time
    /// spent sleeping.
    pub fn wait(&self, source: &dyn TemperatureSource) -> Duration {
        self.wait_with(source, std::thread::sleep)
    }

    /// [`wait`](Self::wait) with an injectable sleeper.
    pub fn wait_with(
        &self,
        source: &dyn TemperatureSource,
        mut sleep: impl FnMut(Duration),
    ) -> Duration {
        let mut slept = Duration::ZERO;
        while let Some(t) = source.hottest().filter(|&t| t > self.limit) {
            let pause = self.per_degree.mul_f64(t - self.limit);
            if slept.is_zero() {
                info!(temperature = t, "cooling down");
            }
            sleep(pause);
            slept += pause;
        }
        if !slept.is_zero() {
            info!(elapsed = ?slept, "cooldown finished");
        }
        slept
    }
}
