//! Stereo intrinsics from a ZED SDK `SN<serial>.conf` calibration file.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use nalgebra::{Matrix3, Vector5};
use serde_json::{Value, json};

use crate::error::{Result, Svo2Error};

/// Capture resolution, selecting the `*_<MODE>` calibration sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionMode {
    Fhd1200,
    Fhd,
    Svga,
}

impl ResolutionMode {
    pub fn from_height(height: u32) -> Result<Self> {
        match height {
            1200 => Ok(ResolutionMode::Fhd1200),
            1080 => Ok(ResolutionMode::Fhd),
            600 => Ok(ResolutionMode::Svga),
            other => Err(Svo2Error::Configuration(format!(
                "Unrecognized image height: {other}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionMode::Fhd1200 => "FHD1200",
            ResolutionMode::Fhd => "FHD",
            ResolutionMode::Svga => "SVGA",
        }
    }
}

impl FromStr for ResolutionMode {
    type Err = Svo2Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "FHD1200" => Ok(ResolutionMode::Fhd1200),
            "FHD" => Ok(ResolutionMode::Fhd),
            "SVGA" => Ok(ResolutionMode::Svga),
            other => Err(Svo2Error::Configuration(format!(
                "Unknown camera mode '{other}' (expected FHD1200, FHD or SVGA)"
            ))),
        }
    }
}

impl fmt::Display for ResolutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pinhole camera with Brown-Conrady distortion, OpenCV conventions.
#[derive(Debug, Clone, PartialEq)]
pub struct Intrinsics {
    /// `[[fx, 0, cx], [0, fy, cy], [0, 0, 1]]`
    pub camera_matrix: Matrix3<f64>,
    /// `(k1, k2, p1, p2, k3)`
    pub dist_coeffs: Vector5<f64>,
}

fn number(table: &toml::Table, section: &str, key: &str) -> Result<f64> {
    let value = table
        .get(key)
        .ok_or_else(|| Svo2Error::Configuration(format!("missing key {section}.{key}")))?;
    value
        .as_float()
        .or_else(|| value.as_integer().map(|i| i as f64))
        .ok_or_else(|| {
            Svo2Error::Configuration(format!("{section}.{key} is not a number: {value}"))
        })
}

fn section<'a>(cfg: &'a toml::Table, name: &str) -> Result<&'a toml::Table> {
    cfg.get(name)
        .and_then(toml::Value::as_table)
        .ok_or_else(|| Svo2Error::Configuration(format!("missing section [{name}]")))
}

impl Intrinsics {
    pub fn from_table(table: &toml::Table, section: &str) -> Result<Self> {
        let get = |key| number(table, section, key);
        let (fx, fy, cx, cy) = (get("fx")?, get("fy")?, get("cx")?, get("cy")?);
        Ok(Self {
            camera_matrix: Matrix3::new(fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0),
            dist_coeffs: Vector5::new(get("k1")?, get("k2")?, get("p1")?, get("p2")?, get("k3")?),
        })
    }

    fn to_json(&self) -> Value {
        let rows: Vec<Vec<f64>> = self
            .camera_matrix
            .row_iter()
            .map(|r| r.iter().copied().collect())
            .collect();
        json!({
            "camera_matrix": rows,
            "dist_coeffs": self.dist_coeffs.iter().copied().collect::<Vec<f64>>(),
        })
    }
}

/// Left/right intrinsics plus the stereo extrinsics. The right camera is the
/// reference frame.
#[derive(Debug, Clone, PartialEq)]
pub struct StereoIntrinsics {
    pub left: Intrinsics,
    pub right: Intrinsics,
    /// mm
    pub baseline: f64,
    pub ty: f64,
    pub tz: f64,
    /// Convergence, radians.
    pub cv: f64,
    pub rx: f64,
    pub rz: f64,
}

impl StereoIntrinsics {
    pub fn from_table(cfg: &toml::Table, mode: ResolutionMode) -> Result<Self> {
        let left_name = format!("LEFT_CAM_{mode}");
        let right_name = format!("RIGHT_CAM_{mode}");
        let left = Intrinsics::from_table(section(cfg, &left_name)?, &left_name)?;
        let right = Intrinsics::from_table(section(cfg, &right_name)?, &right_name)?;

        let stereo = section(cfg, "STEREO")?;
        let get = |key: &str| number(stereo, "STEREO", key);
        Ok(Self {
            left,
            right,
            baseline: get("Baseline")?,
            ty: get("TY")?,
            tz: get("TZ")?,
            cv: get(&format!("CV_{mode}"))?,
            rx: get(&format!("RX_{mode}"))?,
            rz: get(&format!("RZ_{mode}"))?,
        })
    }

    pub fn parse(text: &str, mode: ResolutionMode) -> Result<Self> {
        let cfg: toml::Table = text
            .parse()
            .map_err(|e| Svo2Error::Configuration(format!("invalid calibration file: {e}")))?;
        Self::from_table(&cfg, mode)
    }

    pub fn load(path: impl AsRef<Path>, mode: ResolutionMode) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        tracing::info!("Loading {mode} calibration from {}", path.as_ref().display());
        Self::parse(&text, mode)
    }

    pub fn to_json(&self) -> Value {
        json!({
            "left": self.left.to_json(),
            "right": self.right.to_json(),
            "baseline": self.baseline,
            "ty": self.ty,
            "tz": self.tz,
            "cv": self.cv,
            "rx": self.rx,
            "rz": self.rz,
        })
    }
}
