//! Where problems come from and verdicts go.
//!
//! [`ProblemStore`] is all the rest of the crate assumes: equality filters,
//! an idempotent verdict upsert keyed by `(publicid, ver)`, and an
//! "all keys present" lookup on the canonical index. [`JsonStore`] keeps
//! both collections in JSON array files.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::problem::Problem;
use crate::solver::Strategy;
use crate::symmetry::CanonicalIndex;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Field-equality filter. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProblemFilter {
    pub level: Option<String>,
    pub qtype: Option<String>,
    pub size: Option<usize>,
    /// Restrict to these ids when non-empty.
    pub ids: Vec<u64>,
}

impl ProblemFilter {
    pub fn matches(&self, p: &Problem) -> bool {
        self.level.as_ref().is_none_or(|l| *l == p.level)
            && self.qtype.as_ref().is_none_or(|q| *q == p.qtype)
            && self.size.is_none_or(|s| s == p.size)
            && (self.ids.is_empty() || self.ids.contains(&p.public_id))
    }
}

/// The stored result of solving one problem with one engine version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictRecord {
    #[serde(rename = "publicid")]
    pub public_id: u64,
    #[serde(rename = "ver")]
    pub version: String,
    /// The last strategy tried.
    #[serde(rename = "bw")]
    pub strategy: Strategy,
    #[serde(rename = "ret")]
    pub solved: bool,
    pub answer: String,
    #[serde(default)]
    pub level: String,
}

pub trait ProblemStore {
    /// Matching problems, ordered by public id.
    fn find_problems(&self, filter: &ProblemFilter) -> Result<Vec<Problem>, StoreError>;

    fn find_verdict(&self, public_id: u64, version: &str)
    -> Result<Option<VerdictRecord>, StoreError>;

    /// Insert or replace by `(publicid, ver)`.
    fn upsert_verdicts(&mut self, records: &[VerdictRecord]) -> Result<(), StoreError>;

    fn upsert_verdict(&mut self, record: VerdictRecord) -> Result<(), StoreError> {
        self.upsert_verdicts(std::slice::from_ref(&record))
    }

    /// Ids of problems whose canonical keys include every one of `keys`.
    fn find_canonical_index_entries(&self, keys: &[String]) -> Result<Vec<u64>, StoreError>;
}

/// Problems and verdicts in two JSON array files. Verdicts are rewritten
/// through a temporary file on every upsert.
#[derive(Debug, Default)]
pub struct JsonStore {
    problems: Vec<Problem>,
    verdicts: Vec<VerdictRecord>,
    verdicts_path: Option<PathBuf>,
    index: CanonicalIndex,
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, StoreError> {
    let text = fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

impl JsonStore {
    /// Load problems, and verdicts when that file exists.
    pub fn open(problems_path: &Path, verdicts_path: Option<&Path>) -> Result<Self, StoreError> {
        let problems: Vec<Problem> = read_json(problems_path)?;
        let verdicts = match verdicts_path {
            Some(p) if p.exists() => read_json(p)?,
            _ => Vec::new(),
        };
        debug!(
            problems = problems.len(),
            verdicts = verdicts.len(),
            "store loaded"
        );
        Ok(Self {
            index: CanonicalIndex::build(&problems),
            problems,
            verdicts,
            verdicts_path: verdicts_path.map(Path::to_path_buf),
        })
    }

    /// A store that never touches disk.
    pub fn in_memory(problems: Vec<Problem>) -> Self {
        Self {
            index: CanonicalIndex::build(&problems),
            problems,
            ..Self::default()
        }
    }

    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }

    pub fn verdicts(&self) -> &[VerdictRecord] {
        &self.verdicts
    }

    pub fn index(&self) -> &CanonicalIndex {
        &self.index
    }

    fn flush(&self) -> Result<(), StoreError> {
        let Some(path) = &self.verdicts_path else {
            return Ok(());
        };
        let io_err = |source| StoreError::Io {
            path: path.clone(),
            source,
        };
        let json = serde_json::to_string_pretty(&self.verdicts).map_err(|source| {
            StoreError::Json {
                path: path.clone(),
                source,
            }
        })?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, path).map_err(io_err)?;
        Ok(())
    }
}

impl ProblemStore for JsonStore {
    fn find_problems(&self, filter: &ProblemFilter) -> Result<Vec<Problem>, StoreError> {
        let mut found: Vec<Problem> = self
            .problems
            .iter()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        found.sort_by_key(|p| p.public_id);
        Ok(found)
    }

    fn find_verdict(
        &self,
        public_id: u64,
        version: &str,
    ) -> Result<Option<VerdictRecord>, StoreError> {
        Ok(self
            .verdicts
            .iter()
            .find(|v| v.public_id == public_id && v.version == version)
            .cloned())
    }

    fn upsert_verdicts(&mut self, records: &[VerdictRecord]) -> Result<(), StoreError> {
        for record in records {
            match self
                .verdicts
                .iter_mut()
                .find(|v| v.public_id == record.public_id && v.version == record.version)
            {
                Some(existing) => *existing = record.clone(),
                None => self.verdicts.push(record.clone()),
            }
        }
        self.flush()
    }

    fn find_canonical_index_entries(&self, keys: &[String]) -> Result<Vec<u64>, StoreError> {
        Ok(self.index.containing_all(keys))
    }
}
