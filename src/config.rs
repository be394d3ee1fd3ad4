//! Configuration of the hybridization preconditioner.
//!
//! Options are read once, at setup, from an [`OptionsDatabase`] under the caller's prefix and
//! validated eagerly. The recognized keys are
//!
//! | key | default |
//! |---|---|
//! | `{prefix}hybridization_ksp_type` | `cg` |
//! | `{prefix}hybridization_pc_type` | `jacobi` |
//! | `{prefix}hybridization_ksp_rtol` | `1e-10` |
//! | `{prefix}hybridization_ksp_max_it` | `10000` |
//! | `{prefix}hybridization_projector_tolerance` | `1e-8` |
use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// String key/value store for solver options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionsDatabase {
    options: BTreeMap<String, String>,
}

impl OptionsDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a `-key value` argument list.
    ///
    /// A key that is directly followed by another key (or by nothing) is stored with an empty
    /// value. Arguments that are not keys and do not follow one are ignored.
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut database = Self::new();
        let mut pending_key: Option<String> = None;
        for arg in args {
            let arg = arg.as_ref();
            match arg.strip_prefix('-') {
                Some(key) if !key.is_empty() && key.parse::<f64>().is_err() => {
                    if let Some(previous) = pending_key.replace(key.to_string()) {
                        database.set(previous, "");
                    }
                }
                _ => {
                    if let Some(key) = pending_key.take() {
                        database.set(key, arg);
                    }
                }
            }
        }
        if let Some(key) = pending_key {
            database.set(key, "");
        }
        database
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.options.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.options.contains_key(key)
    }

    /// Parses the value stored under `key`, if any.
    pub fn get_parsed<V>(&self, key: &str) -> Result<Option<V>, ConfigurationError>
    where
        V: FromStr,
    {
        self.get(key)
            .map(|value| {
                value.trim().parse::<V>().map_err(|_| ConfigurationError::InvalidOption {
                    key: key.to_string(),
                    value: value.to_string(),
                    reason: "could not parse value",
                })
            })
            .transpose()
    }
}

/// Krylov method of the reduced solver.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KspType {
    /// Preconditioned conjugate gradient.
    Cg,
    /// Apply the preconditioner once, i.e. a direct solve when combined with a factorization.
    PreOnly,
}

/// Preconditioner of the reduced solver.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PcType {
    Jacobi,
    None,
    /// Sparse Cholesky factorization.
    Cholesky,
}

impl FromStr for KspType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cg" => Ok(Self::Cg),
            "preonly" => Ok(Self::PreOnly),
            _ => Err(()),
        }
    }
}

impl FromStr for PcType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jacobi" => Ok(Self::Jacobi),
            "none" => Ok(Self::None),
            "cholesky" => Ok(Self::Cholesky),
            _ => Err(()),
        }
    }
}

impl fmt::Display for KspType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cg => write!(f, "cg"),
            Self::PreOnly => write!(f, "preonly"),
        }
    }
}

impl fmt::Display for PcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jacobi => write!(f, "jacobi"),
            Self::None => write!(f, "none"),
            Self::Cholesky => write!(f, "cholesky"),
        }
    }
}

/// Configuration of the solver for the reduced (trace) system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InnerSolverOptions {
    pub ksp_type: KspType,
    pub pc_type: PcType,
    /// Relative residual tolerance of the Krylov method.
    pub rtol: f64,
    pub max_it: usize,
}

impl Default for InnerSolverOptions {
    fn default() -> Self {
        Self {
            ksp_type: KspType::Cg,
            pc_type: PcType::Jacobi,
            rtol: 1e-10,
            max_it: 10000,
        }
    }
}

impl InnerSolverOptions {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(self.rtol.is_finite() && self.rtol > 0.0) {
            return Err(ConfigurationError::InvalidOption {
                key: "ksp_rtol".to_string(),
                value: self.rtol.to_string(),
                reason: "tolerance must be positive and finite",
            });
        }
        if self.max_it == 0 {
            return Err(ConfigurationError::InvalidOption {
                key: "ksp_max_it".to_string(),
                value: self.max_it.to_string(),
                reason: "maximum number of iterations must be positive",
            });
        }
        match (self.ksp_type, self.pc_type) {
            (KspType::Cg, _) | (KspType::PreOnly, PcType::Cholesky) => Ok(()),
            (ksp_type, pc_type) => Err(ConfigurationError::UnsupportedSolver {
                ksp_type: ksp_type.to_string(),
                pc_type: pc_type.to_string(),
            }),
        }
    }
}

/// Options of the hybridization preconditioner, read once at setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridizationConfig {
    pub inner_solver: InnerSolverOptions,
    /// Relative tolerance of the L2 projection of the flux into the conforming space.
    pub projector_tolerance: f64,
}

impl Default for HybridizationConfig {
    fn default() -> Self {
        Self {
            inner_solver: InnerSolverOptions::default(),
            projector_tolerance: 1e-8,
        }
    }
}

impl HybridizationConfig {
    /// Reads the configuration from the options stored under the given prefix.
    ///
    /// Missing options take their default values. The result is validated.
    pub fn from_options(options: &OptionsDatabase, prefix: &str) -> Result<Self, ConfigurationError> {
        let key = |name: &str| format!("{}hybridization_{}", prefix, name);
        let unknown = |key: String, value: &str| ConfigurationError::InvalidOption {
            key,
            value: value.to_string(),
            reason: "unknown solver name",
        };

        let mut config = Self::default();
        let solver = &mut config.inner_solver;

        let ksp_key = key("ksp_type");
        if let Some(value) = options.get(&ksp_key) {
            solver.ksp_type = value.trim().parse().map_err(|_| unknown(ksp_key.clone(), value))?;
        }
        let pc_key = key("pc_type");
        if let Some(value) = options.get(&pc_key) {
            solver.pc_type = value.trim().parse().map_err(|_| unknown(pc_key.clone(), value))?;
        }
        if let Some(rtol) = options.get_parsed(&key("ksp_rtol"))? {
            solver.rtol = rtol;
        }
        if let Some(max_it) = options.get_parsed(&key("ksp_max_it"))? {
            solver.max_it = max_it;
        }
        if let Some(tolerance) = options.get_parsed(&key("projector_tolerance"))? {
            config.projector_tolerance = tolerance;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.inner_solver.validate()?;
        if !(self.projector_tolerance.is_finite() && self.projector_tolerance > 0.0) {
            return Err(ConfigurationError::InvalidOption {
                key: "projector_tolerance".to_string(),
                value: self.projector_tolerance.to_string(),
                reason: "tolerance must be positive and finite",
            });
        }
        Ok(())
    }
}

/// Parameters passed to the form compiler when generating local kernels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormCompilerParameters {
    /// Overrides the estimated quadrature degree of every form.
    pub quadrature_degree: Option<usize>,
}
