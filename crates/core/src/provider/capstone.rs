use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use capstone::{arch, prelude::*, Capstone, InsnGroupId};
use goblin::{elf, mach, pe, Object};
use log::debug;

use crate::provider::{
    AnalysisProvider, BlockRecord, FunctionRecord, InstructionRecord, ProviderError, RefKind,
    ReferenceRecord,
};

/// Analysis provider backed by goblin (object parsing) and Capstone
/// (instruction decoding). Functions come from symbol tables / export
/// tables; blocks come from a linear sweep split at branch leaders.
pub struct CapstoneProvider;

const MAX_INSNS_PER_FUNCTION: usize = 4096;

// Coarse opcode categories for fingerprinting. The exact partition matters
// less than it being stable across both inputs of a diff.
const CAT_OTHER: u8 = 0;
const CAT_DATA_TRANSFER: u8 = 1;
const CAT_ARITHMETIC: u8 = 2;
const CAT_LOGIC: u8 = 3;
const CAT_COMPARE: u8 = 4;
const CAT_JUMP: u8 = 5;
const CAT_CONDITIONAL_JUMP: u8 = 6;
const CAT_CALL: u8 = 7;
const CAT_RET: u8 = 8;
const CAT_STRING_OP: u8 = 9;
const CAT_NOP: u8 = 10;
const CAT_SYSTEM: u8 = 11;

#[derive(Debug, Clone)]
struct SymbolInfo {
    address: u64,
    size: Option<u64>,
    file_range: Option<(usize, usize)>,
}

#[derive(Debug, Clone)]
struct SectionRange {
    start: u64,
    end: u64,
    file_offset: Option<usize>,
    is_code: bool,
}

struct DecodedInsn {
    address: u64,
    bytes: Vec<u8>,
    category: u8,
    is_call: bool,
    is_ret: bool,
    is_jump: bool,
    is_conditional: bool,
    branch_target: Option<u64>,
    references: Vec<ReferenceRecord>,
}

fn make_cs(arch: &str) -> Result<Capstone, ProviderError> {
    let built = match arch {
        "x86" | "i386" => {
            Capstone::new().x86().mode(arch::x86::ArchMode::Mode32).detail(true).build()
        }
        "arm" | "armv7" => {
            Capstone::new().arm().mode(arch::arm::ArchMode::Arm).detail(true).build()
        }
        "arm64" | "aarch64" => {
            Capstone::new().arm64().mode(arch::arm64::ArchMode::Arm).detail(true).build()
        }
        "riscv" | "riscv64" => {
            Capstone::new().riscv().mode(arch::riscv::ArchMode::RiscV64).detail(true).build()
        }
        // x86_64 and anything unrecognized
        _ => Capstone::new().x86().mode(arch::x86::ArchMode::Mode64).detail(true).build(),
    };
    built.map_err(|e| ProviderError::Provider(format!("capstone init failed: {e}")))
}

fn arch_from_object(object: &Object) -> Option<&'static str> {
    match object {
        Object::Elf(elf) => match elf.header.e_machine {
            elf::header::EM_X86_64 => Some("x86_64"),
            elf::header::EM_386 => Some("x86"),
            elf::header::EM_AARCH64 => Some("arm64"),
            elf::header::EM_ARM => Some("arm"),
            _ => None,
        },
        Object::PE(pe) => match pe.header.coff_header.machine {
            pe::header::COFF_MACHINE_X86 => Some("x86"),
            pe::header::COFF_MACHINE_X86_64 => Some("x86_64"),
            pe::header::COFF_MACHINE_ARM => Some("arm"),
            pe::header::COFF_MACHINE_ARM64 => Some("arm64"),
            _ => None,
        },
        Object::Mach(mach::Mach::Binary(bin)) => match bin.header.cputype() {
            mach::cputype::CPU_TYPE_X86 => Some("x86"),
            mach::cputype::CPU_TYPE_X86_64 => Some("x86_64"),
            mach::cputype::CPU_TYPE_ARM => Some("arm"),
            mach::cputype::CPU_TYPE_ARM64 => Some("arm64"),
            _ => None,
        },
        _ => None,
    }
}

fn section_range_to_file(
    addr: u64,
    size: Option<u64>,
    sec_addr: u64,
    sec_size: u64,
    sec_offset: u64,
    bytes_len: usize,
) -> Option<(usize, usize)> {
    if addr < sec_addr || addr >= sec_addr + sec_size {
        return None;
    }
    let offset_in_section = addr.saturating_sub(sec_addr);
    let start = sec_offset.saturating_add(offset_in_section);
    if start as usize >= bytes_len {
        return None;
    }
    let available = sec_size.saturating_sub(offset_in_section);
    let length = size.unwrap_or(available).min(available);
    let end = start.saturating_add(length).min(bytes_len as u64);
    if end <= start {
        None
    } else {
        Some((start as usize, end as usize))
    }
}

fn elf_symbols(elf: &elf::Elf, bytes_len: usize) -> Vec<SymbolInfo> {
    let mut symbols = Vec::new();
    for sym in &elf.syms {
        if !sym.is_function() || sym.st_shndx == elf::section_header::SHN_UNDEF as usize {
            continue;
        }
        let name = elf.strtab.get_at(sym.st_name).unwrap_or("");
        if name.is_empty() {
            continue;
        }
        let size = if sym.st_size > 0 { Some(sym.st_size) } else { None };
        let file_range = elf.section_headers.get(sym.st_shndx).and_then(|shdr| {
            section_range_to_file(sym.st_value, size, shdr.sh_addr, shdr.sh_size, shdr.sh_offset, bytes_len)
        });
        symbols.push(SymbolInfo { address: sym.st_value, size, file_range });
    }
    symbols
}

fn mach_symbols(bin: &mach::MachO, bytes_len: usize) -> Vec<SymbolInfo> {
    let mut symbols = Vec::new();
    for sym in bin.symbols() {
        let Ok((name, nlist)) = sym else { continue };
        if name.trim_start_matches('_').is_empty() {
            continue;
        }
        symbols.push(SymbolInfo { address: nlist.n_value, size: None, file_range: None });
    }

    let mut sections = Vec::new();
    for (sec, _) in bin.segments.sections().flatten().filter_map(Result::ok) {
        sections.push(sec);
    }
    for sym in symbols.iter_mut() {
        for sec in &sections {
            if let Some(range) = section_range_to_file(
                sym.address,
                sym.size,
                sec.addr,
                sec.size,
                sec.offset.into(),
                bytes_len,
            ) {
                sym.file_range = Some(range);
                break;
            }
        }
    }
    symbols
}

fn pe_symbols(pe: &pe::PE) -> Vec<SymbolInfo> {
    let mut symbols = Vec::new();
    for exp in &pe.exports {
        if exp.rva == 0 {
            continue;
        }
        let mut file_range = None;
        for sec in &pe.sections {
            let start = sec.virtual_address as u64;
            let size = if sec.virtual_size == 0 {
                sec.size_of_raw_data as u64
            } else {
                sec.virtual_size as u64
            };
            if (exp.rva as u64) >= start && (exp.rva as u64) < start + size {
                let offset = sec.pointer_to_raw_data as u64 + (exp.rva as u64 - start);
                let available = size.saturating_sub(exp.rva as u64 - start);
                file_range = Some((offset as usize, offset.saturating_add(available) as usize));
                break;
            }
        }
        symbols.push(SymbolInfo { address: exp.rva as u64, size: None, file_range });
    }
    symbols
}

fn collect_sections(object: &Object) -> Vec<SectionRange> {
    match object {
        Object::Elf(elf) => elf
            .section_headers
            .iter()
            .map(|sh| SectionRange {
                start: sh.sh_addr,
                end: sh.sh_addr.saturating_add(sh.sh_size),
                file_offset: Some(sh.sh_offset as usize),
                is_code: sh.sh_flags & u64::from(elf::section_header::SHF_EXECINSTR) != 0,
            })
            .collect(),
        Object::PE(pe) => pe
            .sections
            .iter()
            .map(|sec| SectionRange {
                start: sec.virtual_address as u64,
                end: sec.virtual_address as u64 + sec.virtual_size as u64,
                file_offset: Some(sec.pointer_to_raw_data as usize),
                is_code: sec.name().unwrap_or_default().contains("text"),
            })
            .collect(),
        Object::Mach(mach::Mach::Binary(bin)) => bin
            .segments
            .sections()
            .flatten()
            .filter_map(|res| res.ok())
            .map(|(sec, _)| SectionRange {
                start: sec.addr,
                end: sec.addr.saturating_add(sec.size),
                file_offset: Some(sec.offset as usize),
                is_code: sec.name().unwrap_or("").contains("text"),
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn categorize(mnemonic: &str, is_call: bool, is_jump: bool, is_conditional: bool, is_ret: bool) -> u8 {
    if is_call {
        return CAT_CALL;
    }
    if is_ret {
        return CAT_RET;
    }
    if is_jump {
        return if is_conditional { CAT_CONDITIONAL_JUMP } else { CAT_JUMP };
    }
    let m = mnemonic;
    if m == "nop" {
        return CAT_NOP;
    }
    // Exact matches first: "movsb" must not fall into the "mov" bucket,
    // nor "cmpsb" into the "cmp" bucket.
    if matches!(
        m,
        "movsb" | "movsw" | "movsq" | "cmpsb" | "cmpsw" | "cmpsq" | "lodsb" | "lodsw" | "lodsd"
            | "lodsq" | "stosb" | "stosw" | "stosd" | "stosq" | "scasb" | "scasw" | "scasd"
            | "scasq"
    ) {
        return CAT_STRING_OP;
    }
    if m.starts_with("mov") || m.starts_with("lea") || m.starts_with("push") || m.starts_with("pop")
        || m.starts_with("xchg") || m.starts_with("cmov") || m.starts_with("ldr")
        || m.starts_with("str")
    {
        return CAT_DATA_TRANSFER;
    }
    if m.starts_with("add") || m.starts_with("sub") || m.starts_with("inc") || m.starts_with("dec")
        || m.starts_with("mul") || m.starts_with("imul") || m.starts_with("div")
        || m.starts_with("idiv") || m.starts_with("neg") || m.starts_with("adc")
        || m.starts_with("sbb")
    {
        return CAT_ARITHMETIC;
    }
    if m.starts_with("and") || m.starts_with("or") || m.starts_with("xor") || m.starts_with("not")
        || m.starts_with("shl") || m.starts_with("shr") || m.starts_with("sar")
        || m.starts_with("rol") || m.starts_with("ror") || m.starts_with("eor")
    {
        return CAT_LOGIC;
    }
    if m.starts_with("cmp") || m.starts_with("test") || m.starts_with("tst") {
        return CAT_COMPARE;
    }
    if m.starts_with("int") || m.starts_with("syscall") || m.starts_with("sysenter")
        || m.starts_with("svc")
    {
        return CAT_SYSTEM;
    }
    CAT_OTHER
}

fn immediate_operands(detail: &capstone::InsnDetail) -> Vec<u64> {
    detail
        .arch_detail()
        .operands()
        .iter()
        .filter_map(|op| match op {
            capstone::arch::ArchOperand::X86Operand(op) => {
                if let capstone::arch::x86::X86OperandType::Imm(imm) = op.op_type {
                    Some(imm as u64)
                } else {
                    None
                }
            }
            capstone::arch::ArchOperand::ArmOperand(op) => {
                if let capstone::arch::arm::ArmOperandType::Imm(imm) = op.op_type {
                    Some(imm as u64)
                } else {
                    None
                }
            }
            capstone::arch::ArchOperand::Arm64Operand(op) => {
                if let capstone::arch::arm64::Arm64OperandType::Imm(imm) = op.op_type {
                    Some(imm as u64)
                } else {
                    None
                }
            }
            _ => None,
        })
        .collect()
}

/// Reference classification for an immediate landing in a non-code section:
/// a string reference when the pointed-at bytes read as printable text,
/// otherwise a plain data reference.
fn classify_data_ref(
    target: u64,
    sections: &[SectionRange],
    bytes: &[u8],
) -> Option<ReferenceRecord> {
    let section = sections.iter().find(|s| target >= s.start && target < s.end && !s.is_code)?;
    let file_offset = section.file_offset?;
    let start = file_offset + (target - section.start) as usize;
    if start >= bytes.len() {
        return Some(ReferenceRecord { kind: RefKind::Data, target });
    }
    let end = (start + 16).min(bytes.len());
    let preview = &bytes[start..end];
    let text_len = preview.iter().take_while(|b| **b != 0).count();
    let printable = preview[..text_len]
        .iter()
        .all(|b| b.is_ascii_graphic() || *b == b' ');
    let kind = if text_len >= 2 && printable { RefKind::String } else { RefKind::Data };
    Some(ReferenceRecord { kind, target })
}

fn decode_function(
    cs: &Capstone,
    sym: &SymbolInfo,
    code: &[u8],
    sections: &[SectionRange],
    bytes: &[u8],
) -> FunctionRecord {
    // A failed decode mid-stream simply ends the sweep; whatever was decoded
    // so far is what gets modeled.
    let insns = match cs.disasm_count(code, sym.address, MAX_INSNS_PER_FUNCTION) {
        Ok(insns) => insns,
        Err(_) => return FunctionRecord { address: sym.address, blocks: Vec::new() },
    };

    let mut decoded: Vec<DecodedInsn> = Vec::new();
    for i in insns.iter() {
        let mnemonic = i.mnemonic().unwrap_or("").to_lowercase();
        let Ok(detail) = cs.insn_detail(i) else {
            break;
        };
        let has_group = |g: u8| detail.groups().iter().any(|id| *id == InsnGroupId(g));
        let is_call = has_group(capstone::InsnGroupType::CS_GRP_CALL as u8);
        let is_jump = has_group(capstone::InsnGroupType::CS_GRP_JUMP as u8);
        let is_ret = has_group(capstone::InsnGroupType::CS_GRP_RET as u8);
        let is_conditional =
            is_jump && mnemonic.starts_with('j') && mnemonic != "jmp" && mnemonic != "jr";

        let immediates = immediate_operands(&detail);
        let branch_target =
            if is_jump || is_call { immediates.first().copied() } else { None };

        let mut references = Vec::new();
        if is_call {
            if let Some(target) = branch_target {
                references.push(ReferenceRecord { kind: RefKind::Code, target });
            }
        } else if !is_jump {
            for imm in immediates {
                if let Some(reference) = classify_data_ref(imm, sections, bytes) {
                    debug!("{:#x} references {:#x}", i.address(), reference.target);
                    references.push(reference);
                }
            }
        }

        decoded.push(DecodedInsn {
            address: i.address(),
            bytes: i.bytes().to_vec(),
            category: categorize(&mnemonic, is_call, is_jump, is_conditional, is_ret),
            is_call,
            is_ret,
            is_jump,
            is_conditional,
            branch_target,
            references,
        });
    }

    FunctionRecord { address: sym.address, blocks: split_blocks(&decoded) }
}

/// Group a linear instruction sweep into basic blocks: a leader is the first
/// instruction, any in-range branch target, and the instruction after a
/// jump or return.
fn split_blocks(decoded: &[DecodedInsn]) -> Vec<BlockRecord> {
    if decoded.is_empty() {
        return Vec::new();
    }
    let known: BTreeSet<u64> = decoded.iter().map(|i| i.address).collect();
    let mut leaders: BTreeSet<u64> = BTreeSet::new();
    leaders.insert(decoded[0].address);
    for (idx, insn) in decoded.iter().enumerate() {
        if insn.is_jump {
            if let Some(target) = insn.branch_target {
                if known.contains(&target) {
                    leaders.insert(target);
                }
            }
        }
        if (insn.is_jump || insn.is_ret) && idx + 1 < decoded.len() {
            leaders.insert(decoded[idx + 1].address);
        }
    }

    // Every jump/return inserts the following instruction as a leader, so
    // blocks are exactly the leader-to-leader index ranges.
    let starts: Vec<usize> = decoded
        .iter()
        .enumerate()
        .filter(|(_, insn)| leaders.contains(&insn.address))
        .map(|(idx, _)| idx)
        .collect();

    let mut blocks = Vec::with_capacity(starts.len());
    for (which, &start) in starts.iter().enumerate() {
        let end = starts.get(which + 1).copied().unwrap_or(decoded.len());
        let body = &decoded[start..end];

        let mut bytes = Vec::new();
        let mut instructions = Vec::with_capacity(body.len());
        for insn in body {
            bytes.extend_from_slice(&insn.bytes);
            instructions.push(InstructionRecord {
                category: insn.category,
                length: insn.bytes.len() as u32,
                is_call: insn.is_call,
                references: insn.references.clone(),
            });
        }

        let terminator = &body[body.len() - 1];
        let fallthrough = decoded.get(end).map(|n| n.address);
        let mut successors = Vec::new();
        if terminator.is_jump {
            if let Some(target) = terminator.branch_target {
                successors.push(target);
            }
            if terminator.is_conditional {
                if let Some(next) = fallthrough {
                    successors.push(next);
                }
            }
        } else if !terminator.is_ret {
            if let Some(next) = fallthrough {
                successors.push(next);
            }
        }

        blocks.push(BlockRecord { address: body[0].address, bytes, instructions, successors });
    }
    blocks
}

impl AnalysisProvider for CapstoneProvider {
    fn load(&self, path: &Path) -> Result<Vec<FunctionRecord>, ProviderError> {
        let bytes =
            fs::read(path).map_err(|_| ProviderError::MissingBinary(path.to_path_buf()))?;
        let object = Object::parse(&bytes).map_err(|e| ProviderError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let arch = arch_from_object(&object).unwrap_or("x86_64");
        let cs = make_cs(arch)?;
        let sections = collect_sections(&object);

        let mut symbols = match &object {
            Object::Elf(elf) => elf_symbols(elf, bytes.len()),
            Object::PE(pe) => pe_symbols(pe),
            Object::Mach(mach::Mach::Binary(bin)) => mach_symbols(bin, bytes.len()),
            _ => {
                return Err(ProviderError::Parse {
                    path: path.to_path_buf(),
                    reason: "unsupported object format".to_string(),
                })
            }
        };
        symbols.sort_by_key(|s| s.address);

        // Unsized symbols sweep at most to the next symbol in the image.
        let next_addresses: Vec<Option<u64>> =
            (0..symbols.len()).map(|i| symbols.get(i + 1).map(|s| s.address)).collect();

        let mut functions = Vec::new();
        for (sym, next_address) in symbols.iter().zip(next_addresses) {
            let Some((start, mut end)) = sym.file_range else {
                functions.push(FunctionRecord { address: sym.address, blocks: Vec::new() });
                continue;
            };
            if sym.size.is_none() {
                if let Some(next) = next_address {
                    let span = next.saturating_sub(sym.address) as usize;
                    if span > 0 {
                        end = end.min(start.saturating_add(span));
                    }
                }
            }
            let record = decode_function(&cs, sym, &bytes[start..end], &sections, &bytes);
            debug!(
                "function {:#x}: {} blocks",
                record.address,
                record.blocks.len()
            );
            functions.push(record);
        }
        Ok(functions)
    }

    fn name(&self) -> &'static str {
        "capstone"
    }
}
