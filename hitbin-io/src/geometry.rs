//! Detector geometry loading.
//!
//! Geometry files are JSON documents of the form
//! `{"modules": [{"id": 1, "pos": [x, y, z]}, ...]}`.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use hitbin_core::DetectorGeometry;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Supplier of optical-module positions.
pub trait GeometrySource {
    /// Returns the module positions in meters.
    ///
    /// # Errors
    /// Returns an input error if the positions cannot be obtained.
    fn module_positions(&self) -> Result<Vec<[f64; 3]>>;

    /// Builds the validated geometry.
    ///
    /// # Errors
    /// Returns an error if loading fails or the positions are unusable.
    fn load(&self) -> Result<DetectorGeometry> {
        Ok(DetectorGeometry::new(self.module_positions()?)?)
    }
}

impl GeometrySource for Vec<[f64; 3]> {
    fn module_positions(&self) -> Result<Vec<[f64; 3]>> {
        Ok(self.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModuleEntry {
    id: i64,
    pos: [f64; 3],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeometryDocument {
    modules: Vec<ModuleEntry>,
}

/// JSON geometry file.
#[derive(Debug, Clone)]
pub struct JsonGeometry {
    path: PathBuf,
}

impl JsonGeometry {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `positions` as a geometry file, numbering modules from 1.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn write<P: AsRef<Path>>(path: P, positions: &[[f64; 3]]) -> Result<()> {
        let doc = GeometryDocument {
            modules: positions
                .iter()
                .zip(1i64..)
                .map(|(&pos, id)| ModuleEntry { id, pos })
                .collect(),
        };
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, &doc)?;
        Ok(())
    }
}

impl GeometrySource for JsonGeometry {
    fn module_positions(&self) -> Result<Vec<[f64; 3]>> {
        let file = File::open(&self.path).map_err(|e| {
            hitbin_core::Error::input(format!("{}: {e}", self.path.display()))
        })?;
        let doc: GeometryDocument = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| hitbin_core::Error::input(format!("{}: {e}", self.path.display())))?;
        Ok(doc.modules.into_iter().map(|m| m.pos).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use tempfile::tempdir;

    #[test]
    fn test_json_geometry_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("det.json");
        let positions = vec![[0.0, 0.0, 40.0], [20.0, 5.0, 80.0]];
        JsonGeometry::write(&path, &positions).unwrap();

        let geometry = JsonGeometry::new(&path).load().unwrap();
        assert_eq!(geometry.n_modules(), 2);
        assert_eq!(geometry.positions(), positions.as_slice());
    }

    #[test]
    fn test_missing_or_malformed_geometry() {
        let dir = tempdir().unwrap();
        let missing = JsonGeometry::new(dir.path().join("none.json"));
        assert!(matches!(
            missing.load(),
            Err(Error::CoreError(hitbin_core::Error::Input(_)))
        ));

        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{\"modules\": 3}").unwrap();
        assert!(JsonGeometry::new(&path).load().is_err());
    }

    #[test]
    fn test_empty_geometry_rejected() {
        let positions: Vec<[f64; 3]> = Vec::new();
        assert!(positions.load().is_err());
    }
}
