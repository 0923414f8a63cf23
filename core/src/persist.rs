use crate::error::{QuarryError, Result};
use crate::index::{DocId, DocMeta, IndexReader, InvertedIndex, Posting, TermId};
use crate::tokenizer::AnalyzerConfig;
use crate::CancelFlag;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, create_dir_all, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: u32,
    pub num_terms: u32,
    pub created_at: String,
    pub version: u32,
    pub analyzer: AnalyzerConfig,
}

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn dictionary(&self) -> PathBuf { self.root.join("dictionary.bin") }
    fn docs(&self) -> PathBuf { self.root.join("docs.bin") }
    fn meta(&self) -> PathBuf { self.root.join("meta.json") }
    fn postings_dir(&self) -> PathBuf { self.root.join("postings") }
    fn postings(&self, term_id: TermId) -> PathBuf {
        self.postings_dir().join(format!("{term_id:08}.postings.bin"))
    }

    /// Sibling directory a build writes into before it is renamed over `root`.
    fn sibling(&self, suffix: &str) -> Result<PathBuf> {
        let name = self
            .root
            .file_name()
            .ok_or_else(|| QuarryError::index_open(&self.root, "index path has no directory name"))?;
        let mut name = name.to_os_string();
        name.push(suffix);
        Ok(self.root.with_file_name(name))
    }
}

fn write_bin<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let f = File::create(path).map_err(|e| QuarryError::io(path, e))?;
    let mut w = BufWriter::new(f);
    bincode::serialize_into(&mut w, value)?;
    w.flush().map_err(|e| QuarryError::io(path, e))?;
    Ok(())
}

fn read_bin<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let f = File::open(path).map_err(|e| QuarryError::io(path, e))?;
    Ok(bincode::deserialize_from(BufReader::new(f))?)
}

fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    let json = serde_json::to_string_pretty(meta)?;
    fs::write(paths.meta(), json).map_err(|e| QuarryError::io(paths.meta(), e))
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let buf = fs::read_to_string(paths.meta()).map_err(|e| QuarryError::io(paths.meta(), e))?;
    Ok(serde_json::from_str(&buf)?)
}

/// Persist `index` at `root`, replacing whatever index was there.
///
/// Everything is written into a staging directory first; the previous index is
/// only replaced once every file is on disk. On error or cancellation the
/// staging directory is removed and `root` is left as it was.
pub fn write_index(root: impl AsRef<Path>, index: &InvertedIndex, created_at: &str, cancel: &CancelFlag) -> Result<MetaFile> {
    let target = IndexPaths::new(root);
    let staging = IndexPaths::new(target.sibling(".staging")?);
    if staging.root.exists() {
        fs::remove_dir_all(&staging.root).map_err(|e| QuarryError::io(&staging.root, e))?;
    }
    create_dir_all(staging.postings_dir())
        .map_err(|e| QuarryError::index_open(&staging.root, e.to_string()))?;

    let meta = match write_files(&staging, index, created_at, cancel) {
        Ok(meta) => meta,
        Err(e) => {
            let _ = fs::remove_dir_all(&staging.root);
            return Err(e);
        }
    };
    publish(&staging, &target)?;
    tracing::info!(path = %target.root.display(), num_docs = meta.num_docs, num_terms = meta.num_terms, "index published");
    Ok(meta)
}

fn write_files(paths: &IndexPaths, index: &InvertedIndex, created_at: &str, cancel: &CancelFlag) -> Result<MetaFile> {
    let mut dictionary: BTreeMap<String, TermId> = BTreeMap::new();
    let mut df: Vec<u32> = Vec::with_capacity(index.postings.len());
    // BTreeMap order makes term ids reproducible across builds of the same corpus.
    for (term_id, (term, postings)) in index.postings.iter().enumerate() {
        cancel.check()?;
        let term_id = term_id as TermId;
        write_bin(&paths.postings(term_id), postings.as_slice())?;
        dictionary.insert(term.clone(), term_id);
        df.push(postings.len() as u32);
    }
    cancel.check()?;
    write_bin(&paths.dictionary(), &(dictionary, df))?;
    write_bin(&paths.docs(), &index.docs)?;
    let meta = MetaFile {
        num_docs: index.docs.len() as u32,
        num_terms: index.postings.len() as u32,
        created_at: created_at.to_string(),
        version: FORMAT_VERSION,
        analyzer: index.analyzer,
    };
    // meta.json last: its presence marks a complete directory.
    save_meta(paths, &meta)?;
    Ok(meta)
}

fn publish(staging: &IndexPaths, target: &IndexPaths) -> Result<()> {
    let old = IndexPaths::new(target.sibling(".old")?);
    if old.root.exists() {
        fs::remove_dir_all(&old.root).map_err(|e| QuarryError::io(&old.root, e))?;
    }
    if target.root.exists() {
        fs::rename(&target.root, &old.root).map_err(|e| QuarryError::index_open(&target.root, e.to_string()))?;
    }
    if let Err(e) = fs::rename(&staging.root, &target.root) {
        if old.root.exists() {
            let _ = fs::rename(&old.root, &target.root);
        }
        return Err(QuarryError::index_open(&target.root, e.to_string()));
    }
    if old.root.exists() {
        if let Err(e) = fs::remove_dir_all(&old.root) {
            tracing::warn!(path = %old.root.display(), error = %e, "could not remove previous index");
        }
    }
    Ok(())
}

/// Read-only view of a persisted index. Postings are loaded on first use and cached.
pub struct DiskIndex {
    paths: IndexPaths,
    meta: MetaFile,
    dictionary: HashMap<String, TermId>,
    df: Vec<u32>,
    docs: Vec<DocMeta>,
    cache: RwLock<HashMap<TermId, Arc<Vec<Posting>>>>,
}

impl DiskIndex {
    /// Open the index at `root`. Any failure here is an `IndexOpen` error.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let paths = IndexPaths::new(root);
        let open_err = |e: QuarryError| QuarryError::index_open(&paths.root, e.to_string());
        let meta = load_meta(&paths).map_err(open_err)?;
        if meta.version != FORMAT_VERSION {
            return Err(QuarryError::index_open(
                &paths.root,
                format!("unsupported format version {} (expected {FORMAT_VERSION})", meta.version),
            ));
        }
        let (dictionary, df): (HashMap<String, TermId>, Vec<u32>) = read_bin(&paths.dictionary()).map_err(open_err)?;
        let docs: Vec<DocMeta> = read_bin(&paths.docs()).map_err(open_err)?;
        if docs.len() as u32 != meta.num_docs {
            return Err(QuarryError::index_open(&paths.root, "document table does not match meta.json"));
        }
        tracing::debug!(path = %paths.root.display(), num_docs = meta.num_docs, num_terms = dictionary.len(), "index opened");
        Ok(Self { paths, meta, dictionary, df, docs, cache: RwLock::new(HashMap::new()) })
    }

    pub fn meta(&self) -> &MetaFile { &self.meta }
}

impl IndexReader for DiskIndex {
    fn analyzer(&self) -> AnalyzerConfig { self.meta.analyzer }

    fn num_docs(&self) -> u32 { self.meta.num_docs }

    fn postings(&self, term: &str) -> Result<Arc<Vec<Posting>>> {
        let Some(&term_id) = self.dictionary.get(term) else {
            return Ok(Arc::default());
        };
        if let Some(hit) = self.cache.read().get(&term_id) {
            return Ok(hit.clone());
        }
        let postings: Arc<Vec<Posting>> = Arc::new(read_bin(&self.paths.postings(term_id))?);
        self.cache.write().insert(term_id, postings.clone());
        Ok(postings)
    }

    fn doc_freq(&self, term: &str) -> u32 {
        self.dictionary.get(term).and_then(|&tid| self.df.get(tid as usize).copied()).unwrap_or(0)
    }

    fn doc(&self, doc_id: DocId) -> Option<&DocMeta> { self.docs.get(doc_id as usize) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{DocTerms, IndexBuilder};
    use crate::tokenizer::Analyzer;
    use tempfile::tempdir;

    fn tiny_index() -> InvertedIndex {
        let analyzer = Analyzer::default();
        let mut builder = IndexBuilder::new(analyzer.config());
        builder.add_document("/docs/a.txt", DocTerms::from_stream(&analyzer.analyze("cat dog cat")));
        builder.add_document("/docs/b.txt", DocTerms::from_stream(&analyzer.analyze("dog bird")));
        builder.finish()
    }

    #[test]
    fn disk_index_reads_back_what_was_written() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("index");
        let mem = tiny_index();
        write_index(&root, &mem, "2024-01-01T00:00:00Z", &CancelFlag::new()).unwrap();

        let disk = DiskIndex::open(&root).unwrap();
        assert_eq!(disk.num_docs(), 2);
        for term in ["cat", "dog", "bird"] {
            assert_eq!(disk.postings(term).unwrap(), mem.postings(term).unwrap());
            assert_eq!(disk.doc_freq(term), mem.doc_freq(term));
        }
        assert_eq!(disk.doc(1).unwrap().path, "/docs/b.txt");
        assert!(disk.postings("fish").unwrap().is_empty());
        assert!(!dir.path().join("index.staging").exists());
    }

    #[test]
    fn rebuild_replaces_previous_index() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("index");
        write_index(&root, &tiny_index(), "t0", &CancelFlag::new()).unwrap();

        let analyzer = Analyzer::default();
        let mut builder = IndexBuilder::new(analyzer.config());
        builder.add_document("/docs/c.txt", DocTerms::from_stream(&analyzer.analyze("fish")));
        write_index(&root, &builder.finish(), "t1", &CancelFlag::new()).unwrap();

        let disk = DiskIndex::open(&root).unwrap();
        assert_eq!(disk.num_docs(), 1);
        assert!(disk.postings("cat").unwrap().is_empty());
        assert_eq!(disk.meta().created_at, "t1");
    }

    #[test]
    fn cancelled_write_leaves_old_index_in_place() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("index");
        write_index(&root, &tiny_index(), "t0", &CancelFlag::new()).unwrap();

        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = write_index(&root, &InvertedIndex::default(), "t1", &cancel).unwrap_err();
        assert!(matches!(err, QuarryError::Cancelled));
        assert!(!dir.path().join("index.staging").exists());
        assert_eq!(DiskIndex::open(&root).unwrap().meta().created_at, "t0");
    }

    #[test]
    fn missing_index_is_an_open_failure() {
        let dir = tempdir().unwrap();
        let err = DiskIndex::open(dir.path().join("nope")).err().unwrap();
        assert!(matches!(err, QuarryError::IndexOpen { .. }));
    }
}
