use crate::io::source::{normalize_path, HierarchicalSource};
use crate::types::{LidarError, LidarResult};
use hdf5_metno::types::{FixedAscii, VarLenAscii, VarLenUnicode};
use hdf5_metno::{Attribute, File};
use std::path::{Path, PathBuf};
use std::sync::Once;

/// Silence HDF5's automatic error printing to stderr.
///
/// Probing for optional groups (a granule may lack some beams) makes the C
/// library print a diagnostic stack for every miss even though we handle it.
pub fn silence_hdf5_errors() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        hdf5_metno::silence_errors(true);
    });
}

/// HDF5 granule reader (GEDI L2B, ICESat-2 ATL08)
pub struct Hdf5Source {
    path: PathBuf,
    file: File,
}

impl Hdf5Source {
    /// Open an HDF5 granule read-only
    pub fn open<P: AsRef<Path>>(path: P) -> LidarResult<Self> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            return Err(LidarError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("File not found: {}", path.display()),
            )));
        }

        silence_hdf5_errors();
        log::debug!("Opening HDF5 granule: {}", path.display());
        let file = File::open(&path).map_err(|e| {
            LidarError::InvalidFormat(format!("Failed to open {} as HDF5: {}", path.display(), e))
        })?;

        Ok(Self { path, file })
    }

    fn attribute(&self, path: &str, name: &str) -> Option<Attribute> {
        let path = normalize_path(path);
        if path.is_empty() {
            return self.file.attr(name).ok();
        }
        if let Ok(group) = self.file.group(path) {
            return group.attr(name).ok();
        }
        self.file.dataset(path).ok()?.attr(name).ok()
    }
}

/// Strings are stored either variable- or fixed-length depending on the
/// producing ground system, sometimes as one-element arrays.
fn attribute_to_string(attr: &Attribute) -> Option<String> {
    if let Ok(value) = attr.read_scalar::<VarLenUnicode>() {
        return Some(value.as_str().to_string());
    }
    if let Ok(value) = attr.read_scalar::<VarLenAscii>() {
        return Some(value.as_str().to_string());
    }
    if let Ok(value) = attr.read_scalar::<FixedAscii<256>>() {
        return Some(value.as_str().trim_end_matches('\0').to_string());
    }
    if let Ok(values) = attr.read_raw::<VarLenUnicode>() {
        return values.first().map(|v| v.as_str().to_string());
    }
    if let Ok(values) = attr.read_raw::<VarLenAscii>() {
        return values.first().map(|v| v.as_str().to_string());
    }
    if let Ok(values) = attr.read_raw::<FixedAscii<256>>() {
        return values
            .first()
            .map(|v| v.as_str().trim_end_matches('\0').to_string());
    }
    None
}

impl HierarchicalSource for Hdf5Source {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn list_groups(&self, prefix: &str) -> LidarResult<Vec<String>> {
        let prefix = normalize_path(prefix);
        let group = if prefix.is_empty() {
            self.file.group("/")?
        } else {
            self.file.group(prefix)?
        };
        let names = group
            .groups()?
            .iter()
            .map(|g| g.name().rsplit('/').next().unwrap_or_default().to_string())
            .collect();
        Ok(names)
    }

    fn contains(&self, path: &str) -> bool {
        let path = normalize_path(path);
        path.is_empty() || self.file.link_exists(path)
    }

    fn shape(&self, path: &str) -> LidarResult<Vec<usize>> {
        Ok(self.file.dataset(normalize_path(path))?.shape())
    }

    fn read_f64(&self, path: &str) -> LidarResult<Vec<f64>> {
        let dataset = self.file.dataset(normalize_path(path))?;
        Ok(dataset.read_raw::<f64>()?)
    }

    fn read_i64(&self, path: &str) -> LidarResult<Vec<i64>> {
        let dataset = self.file.dataset(normalize_path(path))?;
        Ok(dataset.read_raw::<i64>()?)
    }

    fn read_string_attr(&self, path: &str, name: &str) -> LidarResult<Option<String>> {
        Ok(self.attribute(path, name).and_then(|attr| attribute_to_string(&attr)))
    }

    fn read_numeric_attr(&self, path: &str, name: &str) -> LidarResult<Option<f64>> {
        match self.attribute(path, name) {
            Some(attr) => Ok(attr.read_raw::<f64>()?.first().copied()),
            None => Ok(None),
        }
    }
}
