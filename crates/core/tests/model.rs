use std::collections::HashMap;

use cfgdiff_core::model::{fingerprint, BlockFeature, FunctionCfg};
use cfgdiff_core::provider::{
    BlockRecord, FunctionRecord, InstructionRecord, RefKind, ReferenceRecord,
};

fn insn(category: u8) -> InstructionRecord {
    InstructionRecord { category, length: 4, is_call: false, references: Vec::new() }
}

fn call_insn(target: u64) -> InstructionRecord {
    InstructionRecord {
        category: 7,
        length: 5,
        is_call: true,
        references: vec![ReferenceRecord { kind: RefKind::Code, target }],
    }
}

fn block(address: u64, instructions: Vec<InstructionRecord>, successors: Vec<u64>) -> BlockRecord {
    BlockRecord { address, bytes: vec![0x90, address as u8], instructions, successors }
}

/// Entry at 0x100 with two instructions (one call) branching to two
/// terminal one-instruction blocks.
fn diamond_head() -> FunctionRecord {
    FunctionRecord {
        address: 0x100,
        blocks: vec![
            block(0x100, vec![insn(1), call_insn(0x500)], vec![0x110, 0x120]),
            block(0x110, vec![insn(8)], vec![]),
            block(0x120, vec![insn(8)], vec![]),
        ],
    }
}

fn by_address(cfg: &FunctionCfg) -> HashMap<u64, &BlockFeature> {
    cfg.blocks.iter().map(|b| (b.address, b)).collect()
}

#[test]
fn bfs_distances_and_in_degrees() {
    let cfg = FunctionCfg::from_record(diamond_head());
    assert_eq!(cfg.blocks.len(), 3);
    assert_eq!(cfg.edge_count(), 2);

    let blocks = by_address(&cfg);
    assert_eq!(blocks[&0x100].distance, Some(0));
    assert_eq!(blocks[&0x110].distance, Some(1));
    assert_eq!(blocks[&0x120].distance, Some(1));
    assert_eq!(blocks[&0x100].in_degree, 0);
    assert_eq!(blocks[&0x110].in_degree, 1);
    assert_eq!(blocks[&0x120].in_degree, 1);

    assert_eq!(blocks[&0x100].instruction_count, 2);
    assert_eq!(blocks[&0x100].call_count, 1);
    assert_eq!(blocks[&0x100].code_ref_count, 1);
}

#[test]
fn blocks_are_sorted_by_address() {
    let record = FunctionRecord {
        address: 0x100,
        blocks: vec![
            block(0x120, vec![insn(8)], vec![]),
            block(0x100, vec![insn(1)], vec![0x110, 0x120]),
            block(0x110, vec![insn(8)], vec![]),
        ],
    };
    let cfg = FunctionCfg::from_record(record);
    let addresses: Vec<u64> = cfg.blocks.iter().map(|b| b.address).collect();
    assert_eq!(addresses, vec![0x100, 0x110, 0x120]);
}

#[test]
fn dangling_edge_targets_are_dropped() {
    let record = FunctionRecord {
        address: 0x100,
        blocks: vec![
            block(0x100, vec![insn(1)], vec![0x110, 0x9999]),
            block(0x110, vec![insn(8)], vec![0x100]),
        ],
    };
    let cfg = FunctionCfg::from_record(record);
    assert_eq!(cfg.edge_count(), 2, "the 0x9999 target resolves nowhere and is dropped");
    let blocks = by_address(&cfg);
    assert_eq!(blocks[&0x100].in_degree, 1);
    assert_eq!(blocks[&0x110].in_degree, 1);
}

#[test]
fn unreachable_block_keeps_the_sentinel() {
    let mut record = diamond_head();
    record.blocks.push(block(0x130, vec![insn(2)], vec![]));
    let cfg = FunctionCfg::from_record(record);

    let blocks = by_address(&cfg);
    assert_eq!(blocks[&0x130].distance, None);
    assert_eq!(blocks[&0x130].in_degree, 0);
    // reachable blocks are unaffected
    assert_eq!(blocks[&0x100].distance, Some(0));
    assert_eq!(blocks[&0x110].distance, Some(1));
}

#[test]
fn missing_entry_block_leaves_everything_unreachable() {
    let record = FunctionRecord {
        address: 0x50,
        blocks: vec![block(0x100, vec![insn(1)], vec![0x110]), block(0x110, vec![insn(8)], vec![])],
    };
    let cfg = FunctionCfg::from_record(record);
    assert!(cfg.blocks.iter().all(|b| b.distance.is_none()));
}

#[test]
fn fingerprint_ignores_instruction_order_within_a_block() {
    // Deliberate blind spot of the prime-product hash: only the category
    // multiset matters, not the sequence.
    let forward = FunctionCfg::from_record(FunctionRecord {
        address: 0x10,
        blocks: vec![block(0x10, vec![insn(1), insn(2), insn(3)], vec![])],
    });
    let shuffled = FunctionCfg::from_record(FunctionRecord {
        address: 0x10,
        blocks: vec![block(0x10, vec![insn(3), insn(1), insn(2)], vec![])],
    });
    assert_eq!(forward.blocks[0].fingerprint, shuffled.blocks[0].fingerprint);
}

#[test]
fn fingerprint_is_the_category_prime_product() {
    let cfg = FunctionCfg::from_record(FunctionRecord {
        address: 0x10,
        blocks: vec![block(0x10, vec![insn(1), insn(2), insn(1)], vec![])],
    });
    let expected = fingerprint::category_prime(1)
        .wrapping_mul(fingerprint::category_prime(2))
        .wrapping_mul(fingerprint::category_prime(1));
    assert_eq!(cfg.blocks[0].fingerprint, expected);
}

#[test]
fn fingerprint_wraps_silently_on_long_blocks() {
    let many = (0..4000).map(|_| insn(200)).collect();
    let cfg = FunctionCfg::from_record(FunctionRecord {
        address: 0x10,
        blocks: vec![block(0x10, many, vec![])],
    });
    // wrapped modulo 2^64; an odd-prime power is never zero or even
    assert_ne!(cfg.blocks[0].fingerprint, 0);
    assert_eq!(cfg.blocks[0].fingerprint % 2, 1);
}

#[test]
fn raw_block_bytes_are_retained_sorted() {
    let record = FunctionRecord {
        address: 0x10,
        blocks: vec![BlockRecord {
            address: 0x10,
            bytes: vec![0x89, 0x48, 0x55],
            instructions: vec![insn(1)],
            successors: vec![],
        }],
    };
    let cfg = FunctionCfg::from_record(record);
    assert_eq!(cfg.blocks[0].sorted_bytes, vec![0x48, 0x55, 0x89]);
}
