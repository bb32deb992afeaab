//! Per-base vector index with cosine similarity search
//!
//! Small bases are scanned linearly; once the vector count crosses the
//! configured threshold an HNSW graph is built for approximate search.
//! Vectors are persisted as a JSON sidecar under the base's `index/`
//! directory and the graph is rebuilt from them on load.

use hnsw_rs::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config::IndexConfig;
use crate::error::{Error, Result};

// hnsw_rs NB_LAYER_MAX
const HNSW_MAX_LAYERS: usize = 16;
const VECTORS_FILE: &str = "vectors.json";

/// One stored vector with its chunk identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub vector: Vec<f32>,
}

/// A search hit from the index
#[derive(Debug, Clone)]
pub struct IndexMatch {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub score: f32,
}

/// Cosine similarity of two equal-length vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Vector index for a single knowledge base
pub struct VectorIndex {
    dimensions: usize,
    config: IndexConfig,
    dir: PathBuf,
    entries: Vec<IndexEntry>,
    hnsw: Option<Hnsw<'static, f32, DistCosine>>,
    /// Entries added or removed since the graph was last built
    hnsw_stale: bool,
}

impl VectorIndex {
    /// Create an empty index backed by the given directory
    pub fn new(dir: PathBuf, dimensions: usize, config: IndexConfig) -> Self {
        Self {
            dimensions,
            config,
            dir,
            entries: Vec::new(),
            hnsw: None,
            hnsw_stale: false,
        }
    }

    /// Open an index directory, loading persisted vectors if present
    pub fn open(dir: PathBuf, dimensions: usize, config: IndexConfig) -> Result<Self> {
        let mut index = Self::new(dir, dimensions, config);
        let path = index.vectors_path();
        if path.exists() {
            let data = std::fs::read(&path)?;
            index.entries = serde_json::from_slice(&data)?;
            tracing::debug!(
                vectors = index.entries.len(),
                path = %path.display(),
                "Loaded vector index"
            );
            index.hnsw_stale = true;
        }
        Ok(index)
    }

    fn vectors_path(&self) -> PathBuf {
        self.dir.join(VECTORS_FILE)
    }

    /// Number of stored vectors
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no vectors
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Embedding dimensions this index expects
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Insert a chunk vector
    pub fn insert(&mut self, chunk_id: Uuid, document_id: Uuid, vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(Error::index(format!(
                "Vector dimensions {} do not match expected {}",
                vector.len(),
                self.dimensions
            )));
        }
        self.entries.push(IndexEntry {
            chunk_id,
            document_id,
            vector,
        });
        self.hnsw_stale = true;
        Ok(())
    }

    /// Remove all vectors belonging to a document. Returns how many were
    /// removed.
    pub fn remove_document(&mut self, document_id: Uuid) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.document_id != document_id);
        let removed = before - self.entries.len();
        if removed > 0 {
            self.hnsw_stale = true;
        }
        removed
    }

    /// Search for the nearest vectors above a similarity threshold.
    /// Results are sorted by descending similarity.
    pub fn search(&mut self, query: &[f32], top_k: usize, threshold: f32) -> Result<Vec<IndexMatch>> {
        if query.len() != self.dimensions {
            return Err(Error::index(format!(
                "Query dimensions {} do not match expected {}",
                query.len(),
                self.dimensions
            )));
        }
        if self.entries.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        if self.entries.len() >= self.config.brute_force_threshold {
            self.ensure_hnsw();
        }

        match &self.hnsw {
            Some(_) if !self.hnsw_stale => self.search_hnsw(query, top_k, threshold),
            _ => Ok(self.search_brute_force(query, top_k, threshold)),
        }
    }

    fn search_brute_force(&self, query: &[f32], top_k: usize, threshold: f32) -> Vec<IndexMatch> {
        let mut matches: Vec<IndexMatch> = self
            .entries
            .iter()
            .filter_map(|entry| {
                let score = cosine_similarity(query, &entry.vector);
                (score >= threshold).then(|| IndexMatch {
                    chunk_id: entry.chunk_id,
                    document_id: entry.document_id,
                    score,
                })
            })
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(top_k);
        matches
    }

    fn search_hnsw(&self, query: &[f32], top_k: usize, threshold: f32) -> Result<Vec<IndexMatch>> {
        let hnsw = self
            .hnsw
            .as_ref()
            .ok_or_else(|| Error::index("HNSW graph not built"))?;

        let ef_search = self.config.hnsw_ef_search.max(top_k * 2);
        let neighbors = hnsw.search(query, top_k, ef_search);

        let mut matches = Vec::with_capacity(neighbors.len());
        for neighbor in neighbors {
            let Some(entry) = self.entries.get(neighbor.d_id) else {
                tracing::warn!(id = neighbor.d_id, "HNSW returned invalid id");
                continue;
            };
            // Recompute exact similarity; the graph distance is approximate
            let score = cosine_similarity(query, &entry.vector);
            if score >= threshold {
                matches.push(IndexMatch {
                    chunk_id: entry.chunk_id,
                    document_id: entry.document_id,
                    score,
                });
            }
        }
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(matches)
    }

    /// Rebuild the HNSW graph if it is missing or stale
    fn ensure_hnsw(&mut self) {
        if !self.hnsw_stale && self.hnsw.is_some() {
            return;
        }

        let nb_elem = self.entries.len();
        tracing::debug!(
            vectors = nb_elem,
            m = self.config.hnsw_m,
            ef_c = self.config.hnsw_ef_construction,
            "Building HNSW graph"
        );

        let mut hnsw = Hnsw::<'static, f32, DistCosine>::new(
            self.config.hnsw_m,
            nb_elem,
            HNSW_MAX_LAYERS,
            self.config.hnsw_ef_construction,
            DistCosine {},
        );

        let data: Vec<(&Vec<f32>, usize)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| (&entry.vector, idx))
            .collect();
        hnsw.parallel_insert(&data);
        hnsw.set_searching_mode(true);

        self.hnsw = Some(hnsw);
        self.hnsw_stale = false;
    }

    /// Persist vectors to the sidecar file
    pub fn save(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let data = serde_json::to_vec(&self.entries)?;
        let tmp = self.vectors_path().with_extension("json.tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, self.vectors_path())?;
        tracing::debug!(vectors = self.entries.len(), "Saved vector index");
        Ok(())
    }

    /// Drop all vectors and the persisted sidecar
    pub fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        self.hnsw = None;
        self.hnsw_stale = false;
        let path = self.vectors_path();
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }

    /// Delete an index directory from disk
    pub fn delete_dir(dir: &Path) -> Result<()> {
        if dir.exists() {
            std::fs::remove_dir_all(dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn unit(x: f32, y: f32, z: f32) -> Vec<f32> {
        let norm = (x * x + y * y + z * z).sqrt();
        vec![x / norm, y / norm, z / norm]
    }

    fn test_index(dir: &TempDir) -> VectorIndex {
        VectorIndex::new(dir.path().to_path_buf(), 3, IndexConfig::default())
    }

    #[test]
    fn cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn search_returns_nearest_first() {
        let dir = TempDir::new().unwrap();
        let mut index = test_index(&dir);
        let doc = Uuid::new_v4();

        let near = Uuid::new_v4();
        let far = Uuid::new_v4();
        index.insert(near, doc, unit(1.0, 0.1, 0.0)).unwrap();
        index.insert(far, doc, unit(0.0, 1.0, 0.0)).unwrap();

        let matches = index.search(&unit(1.0, 0.0, 0.0), 5, 0.0).unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].chunk_id, near);
        assert!(matches[0].score > matches[1].score);
    }

    #[test]
    fn threshold_filters_weak_matches() {
        let dir = TempDir::new().unwrap();
        let mut index = test_index(&dir);
        let doc = Uuid::new_v4();
        index.insert(Uuid::new_v4(), doc, unit(1.0, 0.0, 0.0)).unwrap();
        index.insert(Uuid::new_v4(), doc, unit(0.0, 0.0, 1.0)).unwrap();

        let matches = index.search(&unit(1.0, 0.0, 0.0), 5, 0.5).unwrap();
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut index = test_index(&dir);
        let err = index.insert(Uuid::new_v4(), Uuid::new_v4(), vec![1.0, 2.0]);
        assert!(err.is_err());
        assert!(index.search(&[1.0, 2.0], 5, 0.0).is_err());
    }

    #[test]
    fn remove_document_drops_its_vectors() {
        let dir = TempDir::new().unwrap();
        let mut index = test_index(&dir);
        let keep = Uuid::new_v4();
        let gone = Uuid::new_v4();
        index.insert(Uuid::new_v4(), keep, unit(1.0, 0.0, 0.0)).unwrap();
        index.insert(Uuid::new_v4(), gone, unit(0.0, 1.0, 0.0)).unwrap();
        index.insert(Uuid::new_v4(), gone, unit(0.0, 0.0, 1.0)).unwrap();

        assert_eq!(index.remove_document(gone), 2);
        assert_eq!(index.len(), 1);
        let matches = index.search(&unit(0.0, 1.0, 0.0), 5, 0.0).unwrap();
        assert!(matches.iter().all(|m| m.document_id == keep));
    }

    #[test]
    fn save_and_reopen_roundtrip() {
        let dir = TempDir::new().unwrap();
        let chunk = Uuid::new_v4();
        let doc = Uuid::new_v4();
        {
            let mut index = test_index(&dir);
            index.insert(chunk, doc, unit(1.0, 0.0, 0.0)).unwrap();
            index.save().unwrap();
        }

        let mut reopened =
            VectorIndex::open(dir.path().to_path_buf(), 3, IndexConfig::default()).unwrap();
        assert_eq!(reopened.len(), 1);
        let matches = reopened.search(&unit(1.0, 0.0, 0.0), 1, 0.5).unwrap();
        assert_eq!(matches[0].chunk_id, chunk);
    }

    #[test]
    fn hnsw_path_agrees_with_brute_force() {
        let dir = TempDir::new().unwrap();
        let mut config = IndexConfig::default();
        config.brute_force_threshold = 10;
        let mut index = VectorIndex::new(dir.path().to_path_buf(), 3, config);

        let doc = Uuid::new_v4();
        let mut target = Uuid::new_v4();
        for i in 0..50 {
            let angle = i as f32 * 0.1;
            let id = Uuid::new_v4();
            if i == 0 {
                target = id;
            }
            index.insert(id, doc, unit(angle.cos(), angle.sin(), 0.2)).unwrap();
        }

        let query = unit(1.0, 0.0, 0.2);
        let matches = index.search(&query, 3, 0.0).unwrap();
        assert_eq!(matches.len(), 3);
        assert_eq!(matches[0].chunk_id, target);
    }
}
