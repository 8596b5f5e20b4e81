use std::fs;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use cfgdiff_core::diff::{DiffReport, FunctionMatch};
use cfgdiff_core::model::FunctionCfg;

/// Compute the SHA-256 hash of a file and return it as a hex string.
pub fn sha256_file(path: &Path) -> Result<String> {
    let file = fs::File::open(path)
        .with_context(|| format!("Failed to open binary for hashing: {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];

    loop {
        let n = reader
            .read(&mut buf)
            .with_context(|| format!("Failed to read binary for hashing: {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    let digest = hasher.finalize();
    Ok(format!("{:x}", digest))
}

/// One `[match]` report line. Addresses are lowercase hex, no prefix.
pub fn format_match_line(m: &FunctionMatch) -> String {
    format!("[match] {:x} vs {:x} similarity {:.3}", m.address_a, m.address_b, m.similarity)
}

/// The trailing summary line: accepted matches over the larger binary's
/// function count.
pub fn format_summary_line(report: &DiffReport) -> String {
    format!("[match] total matches: {} / {}", report.accepted, report.total_functions)
}

/// Per-function line for single-file diagnostic mode.
pub fn format_function_line(function: &FunctionCfg) -> String {
    format!(
        "[func] {:x} blocks {} edges {}",
        function.entry_address,
        function.blocks.len(),
        function.edge_count()
    )
}
