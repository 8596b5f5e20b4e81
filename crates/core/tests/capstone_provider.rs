#![cfg(feature = "capstone-provider")]

use std::path::PathBuf;

use cfgdiff_core::config::DiffConfig;
use cfgdiff_core::model::BinaryModel;
use cfgdiff_core::provider::{AnalysisProvider, CapstoneProvider, ProviderError};
use object::write::{Object, Symbol, SymbolSection};
use object::{
    Architecture, BinaryFormat, Endianness, SectionKind, SymbolFlags, SymbolKind, SymbolScope,
};

/// x86_64 function with a conditional branch:
///
///   0: push rbp
///   1: mov rbp, rsp
///   4: je 0x7
///   6: ret
///   7: ret
///
/// Three basic blocks (0x0, 0x6, 0x7) and two edges out of the entry.
const BRANCHY_CODE: [u8; 8] = [0x55, 0x48, 0x89, 0xE5, 0x74, 0x01, 0xC3, 0xC3];

fn write_elf_fixture(dir: &std::path::Path) -> PathBuf {
    let mut obj = Object::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);
    let text_id = obj.add_section(Vec::new(), b".text".to_vec(), SectionKind::Text);
    obj.section_mut(text_id).set_data(BRANCHY_CODE.to_vec(), 1);
    obj.add_symbol(Symbol {
        name: b"branchy".to_vec(),
        value: 0,
        size: BRANCHY_CODE.len() as u64,
        kind: SymbolKind::Text,
        scope: SymbolScope::Linkage,
        weak: false,
        section: SymbolSection::Section(text_id),
        flags: SymbolFlags::Elf { st_info: 0x12, st_other: 0 },
    });

    let path = dir.join("fixture_elf");
    std::fs::write(&path, obj.write().unwrap()).unwrap();
    path
}

#[test]
fn provider_builds_blocks_and_edges_from_an_elf() {
    let temp = tempfile::tempdir().unwrap();
    let path = write_elf_fixture(temp.path());

    let provider = CapstoneProvider;
    let functions = provider.load(&path).expect("load fixture");
    assert_eq!(functions.len(), 1);
    assert_eq!(functions[0].blocks.len(), 3, "expected a split at the branch and its target");

    let model = BinaryModel::from_records("fixture", functions);
    let cfg = &model.functions[0];
    assert_eq!(cfg.edge_count(), 2);

    let distances: Vec<Option<u32>> = cfg.blocks.iter().map(|b| b.distance).collect();
    assert_eq!(distances, vec![Some(0), Some(1), Some(1)]);
    let in_degrees: Vec<u32> = cfg.blocks.iter().map(|b| b.in_degree).collect();
    assert_eq!(in_degrees, vec![0, 1, 1]);

    // push/mov/je in the entry block, one ret in each terminal block
    let counts: Vec<u32> = cfg.blocks.iter().map(|b| b.instruction_count).collect();
    assert_eq!(counts, vec![3, 1, 1]);
}

#[test]
fn provider_fed_binary_self_diffs_at_full_similarity() {
    let temp = tempfile::tempdir().unwrap();
    let path = write_elf_fixture(temp.path());

    let provider = CapstoneProvider;
    let a = BinaryModel::load(&provider, &path).expect("load a");
    let b = BinaryModel::load(&provider, &path).expect("load b");

    let report = cfgdiff_core::diff::diff(&a, &b, &DiffConfig::default());
    assert_eq!(report.accepted, 1);
    assert_eq!(report.total_functions, 1);
    assert!((report.matches[0].similarity - 1.0).abs() < 1e-12);
}

#[test]
fn junk_bytes_are_a_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("junk.bin");
    std::fs::write(&path, b"definitely not an object file").unwrap();

    let err = CapstoneProvider.load(&path).unwrap_err();
    assert!(matches!(err, ProviderError::Parse { .. }), "got {err:?}");
}

#[test]
fn missing_file_is_reported_as_missing() {
    let err = CapstoneProvider.load(std::path::Path::new("no/such/file")).unwrap_err();
    assert!(matches!(err, ProviderError::MissingBinary(_)));
}
