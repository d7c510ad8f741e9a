//! Builder configuration snapshot.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Numeric precision the engine operates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpPrecision {
    Float,
    Half,
    Int8,
}

impl fmt::Display for OpPrecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpPrecision::Float => write!(f, "FP32"),
            OpPrecision::Half => write!(f, "FP16"),
            OpPrecision::Int8 => write!(f, "INT8"),
        }
    }
}

/// Execution device for the built engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceType {
    /// Primary accelerator.
    Gpu,
    /// Auxiliary low-power accelerator.
    Dla,
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceType::Gpu => write!(f, "GPU"),
            DeviceType::Dla => write!(f, "DLA"),
        }
    }
}

/// Capability tier the engine must stay within.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineCapability {
    Default,
    SafeGpu,
    SafeDla,
}

impl fmt::Display for EngineCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineCapability::Default => write!(f, "Default"),
            EngineCapability::SafeGpu => write!(f, "Safe GPU"),
            EngineCapability::SafeDla => write!(f, "Safe DLA"),
        }
    }
}

/// Calibration hook required for reduced-precision int8 engines. Data
/// collection itself is out of scope; the builder only needs the handle.
pub trait Int8Calibrator: Send + Sync {
    fn name(&self) -> &str;
}

/// Immutable configuration for one compilation.
#[derive(Clone, Serialize, Deserialize)]
pub struct BuilderSettings {
    pub op_precision: OpPrecision,
    pub refit: bool,
    pub debug: bool,
    pub strict_types: bool,
    pub allow_gpu_fallback: bool,
    pub device: DeviceType,
    pub capability: EngineCapability,
    pub num_min_timing_iters: u32,
    pub num_avg_timing_iters: u32,
    pub workspace_size: u64,
    /// 0 means unset; the builder is then free to pick dynamic batching.
    pub max_batch_size: u64,
    #[serde(skip)]
    pub calibrator: Option<Arc<dyn Int8Calibrator>>,
}

impl Default for BuilderSettings {
    fn default() -> Self {
        Self {
            op_precision: OpPrecision::Float,
            refit: false,
            debug: false,
            strict_types: false,
            allow_gpu_fallback: true,
            device: DeviceType::Gpu,
            capability: EngineCapability::Default,
            num_min_timing_iters: 2,
            num_avg_timing_iters: 1,
            workspace_size: 1 << 30,
            max_batch_size: 0,
            calibrator: None,
        }
    }
}

impl fmt::Debug for BuilderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuilderSettings")
            .field("op_precision", &self.op_precision)
            .field("refit", &self.refit)
            .field("debug", &self.debug)
            .field("strict_types", &self.strict_types)
            .field("allow_gpu_fallback", &self.allow_gpu_fallback)
            .field("device", &self.device)
            .field("capability", &self.capability)
            .field("num_min_timing_iters", &self.num_min_timing_iters)
            .field("num_avg_timing_iters", &self.num_avg_timing_iters)
            .field("workspace_size", &self.workspace_size)
            .field("max_batch_size", &self.max_batch_size)
            .field("calibrator", &self.calibrator.as_ref().map(|c| c.name()))
            .finish()
    }
}

impl fmt::Display for BuilderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Settings requested for the engine:")?;
        write!(f, "\n    Operating Precision: {}", self.op_precision)?;
        write!(f, "\n    Make Refittable Engine: {}", self.refit)?;
        write!(f, "\n    Debuggable Engine: {}", self.debug)?;
        write!(f, "\n    Strict Types: {}", self.strict_types)?;
        write!(
            f,
            "\n    Allow GPU Fallback (if running on DLA): {}",
            self.allow_gpu_fallback
        )?;
        write!(f, "\n    Min Timing Iterations: {}", self.num_min_timing_iters)?;
        write!(f, "\n    Avg Timing Iterations: {}", self.num_avg_timing_iters)?;
        write!(f, "\n    Max Workspace Size: {}", self.workspace_size)?;
        if self.max_batch_size != 0 {
            write!(f, "\n    Max Batch Size: {}", self.max_batch_size)?;
        } else {
            write!(f, "\n    Max Batch Size: Not set")?;
        }
        write!(f, "\n    Device Type: {}", self.device)?;
        write!(f, "\n    Engine Capability: {}", self.capability)?;
        write!(
            f,
            "\n    Calibrator Created: {}",
            self.calibrator.is_some()
        )
    }
}
