//! Solver configuration (spec section 6, `configure`/`getConfig`).
//!
//! Grounded in `AnalysisOptions`'s plain struct-with-`Default` shape
//! (`src/analysis/mod.rs`), generalized to the solver's reorder method,
//! pivot threshold, zero-pivot budget, refinement, and fallback knobs,
//! plus a flat string-keyed view for callers that configure the solver
//! from an external properties map rather than Rust code directly.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{SolverError, SolverResult};
use crate::skyline::reorder::ReorderMethod;

/// Serializable form of `ReorderMethod`; kept separate so the skyline
/// module doesn't need to depend on serde.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReorderKind {
    Rcm,
    None,
}

impl From<ReorderKind> for ReorderMethod {
    fn from(k: ReorderKind) -> Self {
        match k {
            ReorderKind::Rcm => ReorderMethod::Rcm,
            ReorderKind::None => ReorderMethod::None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Fill-reducing reordering to apply before profiling.
    pub reorder: ReorderKind,
    /// Pivots with `|d| < zero_threshold * scale` are treated as zero.
    pub zero_threshold: f64,
    /// Zero pivots beyond this count fail factorisation outright.
    pub max_zero_pivots: usize,
    /// Target residual for refined solves: `solve` keeps refining while
    /// `‖A·x−b‖∞ > precision·(‖A‖∞·‖x‖∞ + ‖b‖∞)`.
    pub precision: f64,
    /// Upper bound on iterative-refinement steps; `solve` stops earlier
    /// once `precision` is met.
    pub refine_iterations: usize,
    /// Call the progress callback every this many factored block-columns
    /// (0 disables progress reporting).
    pub progress_stride: usize,
    /// If true, a `SingularMatrix` from `finish` is downgraded to an
    /// info-level signal (`getInfo().solver_failed == true`) instead of
    /// failing outright.
    pub lenient: bool,
    /// Estimated skyline profile (summed `k - top[k]`) above which the
    /// façade delegates to the dense LU fallback instead of the blocked
    /// skyline engine (spec section 4.4's `sparseLuProfileThreshold`).
    pub sparse_lu_profile_threshold: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            reorder: ReorderKind::Rcm,
            zero_threshold: 1e-15,
            max_zero_pivots: 0,
            precision: 1e-6,
            refine_iterations: 5,
            progress_stride: 1000,
            lenient: false,
            sparse_lu_profile_threshold: 50_000,
        }
    }
}

impl SolverConfig {
    pub fn direct() -> Self {
        Self::default()
    }

    /// Disables the profile-reducing reorder; useful for tests that want
    /// deterministic DOF ordering.
    pub fn unordered() -> Self {
        Self {
            reorder: ReorderKind::None,
            ..Self::default()
        }
    }

    /// Flattens the config into string properties (spec section 6's
    /// "flat configuration map", names authoritative), e.g. for logging
    /// or an external settings file.
    pub fn to_props(&self) -> HashMap<String, String> {
        let mut props = HashMap::new();
        props.insert(
            "reorderMethod".to_string(),
            match self.reorder {
                ReorderKind::Rcm => "rcm".to_string(),
                ReorderKind::None => "none".to_string(),
            },
        );
        props.insert("zeroThreshold".to_string(), self.zero_threshold.to_string());
        props.insert("maxZeroPivots".to_string(), self.max_zero_pivots.to_string());
        props.insert("precision".to_string(), self.precision.to_string());
        props.insert("printInterval".to_string(), self.progress_stride.to_string());
        props.insert("lenient".to_string(), self.lenient.to_string());
        props.insert(
            "sparseLuProfileThreshold".to_string(),
            self.sparse_lu_profile_threshold.to_string(),
        );
        props
    }

    pub fn from_props(props: &HashMap<String, String>) -> SolverResult<Self> {
        let mut cfg = Self::default();
        if let Some(v) = props.get("reorderMethod") {
            cfg.reorder = match v.as_str() {
                "rcm" => ReorderKind::Rcm,
                "none" => ReorderKind::None,
                other => return Err(invalid("reorderMethod", other)),
            };
        }
        if let Some(v) = props.get("zeroThreshold") {
            cfg.zero_threshold = v.parse().map_err(|_| invalid("zeroThreshold", v))?;
        }
        if let Some(v) = props.get("maxZeroPivots") {
            cfg.max_zero_pivots = v.parse().map_err(|_| invalid("maxZeroPivots", v))?;
        }
        if let Some(v) = props.get("precision") {
            cfg.precision = v.parse().map_err(|_| invalid("precision", v))?;
        }
        if let Some(v) = props.get("printInterval") {
            cfg.progress_stride = v.parse().map_err(|_| invalid("printInterval", v))?;
        }
        if let Some(v) = props.get("lenient") {
            cfg.lenient = v.parse().map_err(|_| invalid("lenient", v))?;
        }
        if let Some(v) = props.get("sparseLuProfileThreshold") {
            cfg.sparse_lu_profile_threshold = v.parse().map_err(|_| invalid("sparseLuProfileThreshold", v))?;
        }
        Ok(cfg)
    }
}

fn invalid(key: &str, value: &str) -> SolverError {
    SolverError::InvalidInput(format!("bad value for '{key}': {value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_props() {
        let cfg = SolverConfig::default();
        let props = cfg.to_props();
        let back = SolverConfig::from_props(&props).unwrap();
        assert_eq!(back.zero_threshold, cfg.zero_threshold);
        assert_eq!(back.max_zero_pivots, cfg.max_zero_pivots);
        assert_eq!(back.precision, cfg.precision);
        assert_eq!(back.lenient, cfg.lenient);
        assert_eq!(back.reorder, cfg.reorder);
    }

    #[test]
    fn unknown_reorder_value_is_rejected() {
        let mut props = HashMap::new();
        props.insert("reorderMethod".to_string(), "banana".to_string());
        assert!(SolverConfig::from_props(&props).is_err());
    }
}
