//! Random-access view over a hierarchical granule (group/dataset key paths).
//!
//! The extraction pipeline only ever talks to [`HierarchicalSource`], so the
//! HDF5 backend can be swapped for [`MemorySource`] in tests or for another
//! hierarchical-format library.

use crate::types::{LidarError, LidarResult};
use std::collections::{BTreeSet, HashMap};

/// Read-only key-path store of named datasets and attributes
pub trait HierarchicalSource {
    /// Short human-readable identifier (usually the file path)
    fn describe(&self) -> String;

    /// Names of the direct child groups below `prefix` ("" is the root)
    fn list_groups(&self, prefix: &str) -> LidarResult<Vec<String>>;

    /// Whether a dataset or group exists at `path`
    fn contains(&self, path: &str) -> bool;

    /// Dimensions of the dataset at `path`
    fn shape(&self, path: &str) -> LidarResult<Vec<usize>>;

    /// Full dataset contents in row-major order, converted to f64
    fn read_f64(&self, path: &str) -> LidarResult<Vec<f64>>;

    /// Full dataset contents in row-major order, converted to i64
    fn read_i64(&self, path: &str) -> LidarResult<Vec<i64>>;

    /// String attribute `name` attached to the object at `path`
    fn read_string_attr(&self, path: &str, name: &str) -> LidarResult<Option<String>>;

    /// Numeric attribute `name` (first element when it is an array), as f64
    fn read_numeric_attr(&self, path: &str, name: &str) -> LidarResult<Option<f64>>;
}

/// Strip leading/trailing separators so "/gt1l/" and "gt1l" address the same node
pub fn normalize_path(path: &str) -> &str {
    path.trim_matches('/')
}

#[derive(Debug, Clone)]
enum MemoryData {
    Float(Vec<f64>),
    Int(Vec<i64>),
}

#[derive(Debug, Clone)]
struct MemoryDataset {
    shape: Vec<usize>,
    data: MemoryData,
}

/// In-memory hierarchical source, used to build synthetic granules
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    name: String,
    datasets: HashMap<String, MemoryDataset>,
    groups: BTreeSet<String>,
    attributes: HashMap<(String, String), String>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Register a (possibly empty) group and all of its ancestors
    pub fn add_group(&mut self, path: &str) -> &mut Self {
        let path = normalize_path(path);
        let mut prefix = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(part);
            self.groups.insert(prefix.clone());
        }
        self
    }

    pub fn insert_f64(&mut self, path: &str, values: Vec<f64>) -> &mut Self {
        let shape = vec![values.len()];
        self.insert(path, shape, MemoryData::Float(values))
    }

    pub fn insert_i64(&mut self, path: &str, values: Vec<i64>) -> &mut Self {
        let shape = vec![values.len()];
        self.insert(path, shape, MemoryData::Int(values))
    }

    /// Insert a 2-D float dataset given in row-major order
    pub fn insert_f64_2d(
        &mut self,
        path: &str,
        rows: usize,
        cols: usize,
        values: Vec<f64>,
    ) -> LidarResult<&mut Self> {
        if rows * cols != values.len() {
            return Err(LidarError::InvalidFormat(format!(
                "{}: {} values do not fill a {}x{} dataset",
                path,
                values.len(),
                rows,
                cols
            )));
        }
        Ok(self.insert(path, vec![rows, cols], MemoryData::Float(values)))
    }

    pub fn set_attr(&mut self, path: &str, name: &str, value: &str) -> &mut Self {
        self.attributes.insert(
            (normalize_path(path).to_string(), name.to_string()),
            value.to_string(),
        );
        self
    }

    fn insert(&mut self, path: &str, shape: Vec<usize>, data: MemoryData) -> &mut Self {
        let path = normalize_path(path).to_string();
        if let Some((parent, _)) = path.rsplit_once('/') {
            let parent = parent.to_string();
            self.add_group(&parent);
        }
        self.datasets.insert(path, MemoryDataset { shape, data });
        self
    }

    fn dataset(&self, path: &str) -> LidarResult<&MemoryDataset> {
        self.datasets
            .get(normalize_path(path))
            .ok_or_else(|| LidarError::InvalidFormat(format!("No dataset at '{}'", path)))
    }
}

impl HierarchicalSource for MemorySource {
    fn describe(&self) -> String {
        self.name.clone()
    }

    fn list_groups(&self, prefix: &str) -> LidarResult<Vec<String>> {
        let prefix = normalize_path(prefix);
        let children = self
            .groups
            .iter()
            .filter_map(|group| {
                let rest = if prefix.is_empty() {
                    group.as_str()
                } else {
                    group.strip_prefix(prefix)?.strip_prefix('/')?
                };
                (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_string())
            })
            .collect();
        Ok(children)
    }

    fn contains(&self, path: &str) -> bool {
        let path = normalize_path(path);
        self.datasets.contains_key(path) || self.groups.contains(path)
    }

    fn shape(&self, path: &str) -> LidarResult<Vec<usize>> {
        Ok(self.dataset(path)?.shape.clone())
    }

    fn read_f64(&self, path: &str) -> LidarResult<Vec<f64>> {
        match &self.dataset(path)?.data {
            MemoryData::Float(values) => Ok(values.clone()),
            MemoryData::Int(values) => Ok(values.iter().map(|&v| v as f64).collect()),
        }
    }

    fn read_i64(&self, path: &str) -> LidarResult<Vec<i64>> {
        match &self.dataset(path)?.data {
            MemoryData::Int(values) => Ok(values.clone()),
            MemoryData::Float(values) => values
                .iter()
                .map(|&v| {
                    num_traits::cast::<f64, i64>(v).ok_or_else(|| {
                        LidarError::InvalidFormat(format!(
                            "{}: value {} cannot be read as an integer",
                            path, v
                        ))
                    })
                })
                .collect(),
        }
    }

    fn read_string_attr(&self, path: &str, name: &str) -> LidarResult<Option<String>> {
        Ok(self
            .attributes
            .get(&(normalize_path(path).to_string(), name.to_string()))
            .cloned())
    }

    fn read_numeric_attr(&self, path: &str, name: &str) -> LidarResult<Option<f64>> {
        match self.read_string_attr(path, name)? {
            Some(text) => text.trim().parse::<f64>().map(Some).map_err(|e| {
                LidarError::InvalidFormat(format!("{}@{}: '{}' is not numeric: {}", path, name, text, e))
            }),
            None => Ok(None),
        }
    }
}
