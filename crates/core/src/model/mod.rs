//! CFG feature model for one binary image.
//!
//! All three entities here — [`BlockFeature`], [`FunctionCfg`], and
//! [`BinaryModel`] — are constructed exactly once while ingesting a single
//! input file and are read-only afterwards. Nothing in the comparison
//! pipeline mutates them, so they can be shared freely across worker
//! threads.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::path::Path;

use log::debug;
use serde::Serialize;

use crate::provider::{AnalysisProvider, BlockRecord, FunctionRecord, ProviderError, RefKind};

pub mod fingerprint;

/// Immutable per-basic-block descriptor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockFeature {
    /// Identity key within a function.
    pub address: u64,
    pub instruction_count: u32,
    pub call_count: u32,
    /// Number of distinct predecessor blocks in the function CFG.
    pub in_degree: u32,
    /// BFS hop count from the function's entry block; `None` means the
    /// block is unreachable. The sentinel must never be blended
    /// arithmetically with finite distances.
    pub distance: Option<u32>,
    /// Commutative prime-product hash of the instruction-category multiset.
    pub fingerprint: u64,
    pub code_ref_count: u32,
    pub data_ref_count: u32,
    pub string_ref_count: u32,
    /// Sorted raw instruction bytes. Retained as an extension point (e.g. a
    /// future edit-distance refinement); consumed by no scoring formula.
    pub sorted_bytes: Vec<u8>,
}

impl BlockFeature {
    fn from_record(record: BlockRecord) -> Self {
        let instruction_count = record.instructions.len() as u32;
        let mut call_count = 0u32;
        let mut code_ref_count = 0u32;
        let mut data_ref_count = 0u32;
        let mut string_ref_count = 0u32;
        for instruction in &record.instructions {
            if instruction.is_call {
                call_count += 1;
            }
            for reference in &instruction.references {
                match reference.kind {
                    RefKind::Code => code_ref_count += 1,
                    RefKind::Data => data_ref_count += 1,
                    RefKind::String => string_ref_count += 1,
                }
            }
        }
        let fingerprint =
            fingerprint::block_fingerprint(record.instructions.iter().map(|i| i.category));
        debug!("block {:#x} fingerprint {:#x}", record.address, fingerprint);

        let mut sorted_bytes = record.bytes;
        sorted_bytes.sort_unstable();

        Self {
            address: record.address,
            instruction_count,
            call_count,
            in_degree: 0,
            distance: None,
            fingerprint,
            code_ref_count,
            data_ref_count,
            string_ref_count,
            sorted_bytes,
        }
    }
}

/// Per-function CFG: blocks sorted by address plus forward/reverse
/// adjacency over block indices and BFS distance labels.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionCfg {
    pub entry_address: u64,
    pub blocks: Vec<BlockFeature>,
    pub edges: Vec<Vec<usize>>,
    pub reverse_edges: Vec<Vec<usize>>,
}

impl FunctionCfg {
    /// Build the CFG model from one provider record.
    ///
    /// Edges whose target does not resolve to a known block address in the
    /// same function are dropped silently.
    pub fn from_record(record: FunctionRecord) -> Self {
        let entry_address = record.address;
        let mut records = record.blocks;
        records.sort_by_key(|b| b.address);

        let mut index_of: HashMap<u64, usize> = HashMap::with_capacity(records.len());
        let mut edge_list: Vec<(u64, u64)> = Vec::new();
        for (idx, block) in records.iter().enumerate() {
            index_of.insert(block.address, idx);
            for &target in &block.successors {
                edge_list.push((block.address, target));
            }
        }

        let mut blocks: Vec<BlockFeature> =
            records.into_iter().map(BlockFeature::from_record).collect();

        let mut edges = vec![Vec::new(); blocks.len()];
        let mut reverse_edges = vec![Vec::new(); blocks.len()];
        for (from, to) in edge_list {
            if let (Some(&i), Some(&j)) = (index_of.get(&from), index_of.get(&to)) {
                edges[i].push(j);
                reverse_edges[j].push(i);
                debug!("edge {from:#x} -> {to:#x}");
            }
        }

        let distances = bfs_distances(&edges, index_of.get(&entry_address).copied());
        for (idx, block) in blocks.iter_mut().enumerate() {
            block.in_degree = reverse_edges[idx].len() as u32;
            block.distance = distances[idx];
        }

        Self { entry_address, blocks, edges, reverse_edges }
    }

    /// Directed edge list, one `(from, to)` index pair per adjacency entry.
    pub fn edge_list(&self) -> Vec<(usize, usize)> {
        let mut list = Vec::new();
        for (from, successors) in self.edges.iter().enumerate() {
            for &to in successors {
                list.push((from, to));
            }
        }
        list
    }

    pub fn edge_count(&self) -> usize {
        self.edges.iter().map(Vec::len).sum()
    }
}

fn bfs_distances(edges: &[Vec<usize>], start: Option<usize>) -> Vec<Option<u32>> {
    let mut distances = vec![None; edges.len()];
    let Some(start) = start else {
        return distances;
    };
    distances[start] = Some(0);
    let mut queue = VecDeque::from([start]);
    while let Some(current) = queue.pop_front() {
        let next_distance = match distances[current] {
            Some(d) => d + 1,
            None => continue,
        };
        for &next in &edges[current] {
            if distances[next].is_none() {
                distances[next] = Some(next_distance);
                queue.push_back(next);
            }
        }
    }
    distances
}

/// All function CFG models for one input image, in provider order.
#[derive(Debug, Clone, Serialize)]
pub struct BinaryModel {
    /// Display name for reports; typically the input file name.
    pub name: String,
    pub functions: Vec<FunctionCfg>,
}

impl BinaryModel {
    pub fn from_records(name: impl Into<String>, records: Vec<FunctionRecord>) -> Self {
        let functions = records.into_iter().map(FunctionCfg::from_record).collect();
        Self { name: name.into(), functions }
    }

    /// Ingest one binary through the given provider.
    pub fn load(provider: &dyn AnalysisProvider, path: &Path) -> Result<Self, ProviderError> {
        let records = provider.load(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        debug!("loaded {} functions from {}", records.len(), path.display());
        Ok(Self::from_records(name, records))
    }
}
