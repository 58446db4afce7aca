use crate::class_file::BootstrapMethod;
use crate::error::{Error, Result};
use crate::pool::ConstantPool;
use crate::reader::Reader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeKind {
    Virtual,
    Static,
    Special,
    Interface,
}

impl InvokeKind {
    pub fn mnemonic(self) -> &'static str {
        match self {
            InvokeKind::Virtual => "invokevirtual",
            InvokeKind::Static => "invokestatic",
            InvokeKind::Special => "invokespecial",
            InvokeKind::Interface => "invokeinterface",
        }
    }
}

/// A direct call instruction resolved against the constant pool.
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeSite {
    pub kind: InvokeKind,
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

/// An `invokedynamic` call site with its bootstrap method resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicSite {
    pub name: String,
    pub descriptor: String,
    pub bootstrap: BootstrapMethod,
}

/// The parts of a `Code` attribute the graph consumes: invoke sites in
/// instruction order, plus the first line number when present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodeBody {
    pub invokes: Vec<InvokeSite>,
    pub dynamic_invokes: Vec<DynamicSite>,
    pub first_line: Option<u32>,
}

/// Walk a method's bytecode and collect every control-transfer-to-named-method
/// instruction. Bootstrap slots referenced by `invokedynamic` are resolved
/// against `bootstrap_methods` (parsed from the class-level attribute before
/// method bodies).
pub(crate) fn scan_code(
    code: &[u8],
    cp: &ConstantPool,
    bootstrap_methods: &[BootstrapMethod],
    out: &mut CodeBody,
) -> Result<()> {
    let mut pc = 0usize;
    while pc < code.len() {
        let opcode = code[pc];
        match opcode {
            // invokevirtual .. invokeinterface
            182..=185 => {
                let index = read_u16(code, pc + 1)?;
                let (owner, name, descriptor) = cp.get_member_ref(index)?;
                let kind = match opcode {
                    182 => InvokeKind::Virtual,
                    183 => InvokeKind::Special,
                    184 => InvokeKind::Static,
                    _ => InvokeKind::Interface,
                };
                out.invokes.push(InvokeSite {
                    kind,
                    owner,
                    name,
                    descriptor,
                });
                pc += if opcode == 185 { 5 } else { 3 };
            }
            // invokedynamic
            186 => {
                let index = read_u16(code, pc + 1)?;
                let (slot, name, descriptor) = cp.get_invoke_dynamic(index)?;
                let bootstrap = bootstrap_methods
                    .get(slot as usize)
                    .cloned()
                    .ok_or(Error::InvalidBootstrapMethodIndex(slot))?;
                out.dynamic_invokes.push(DynamicSite {
                    name,
                    descriptor,
                    bootstrap,
                });
                pc += 5;
            }
            // tableswitch: 4-byte-aligned default/low/high then jump table
            170 => {
                let base = align4(pc + 1);
                let low = read_i32(code, base + 4)?;
                let high = read_i32(code, base + 8)?;
                if high < low {
                    return Err(Error::MalformedAttribute("Code"));
                }
                let entries = (high as i64 - low as i64 + 1) as usize;
                pc = base + 12 + entries * 4;
            }
            // lookupswitch: 4-byte-aligned default/npairs then match table
            171 => {
                let base = align4(pc + 1);
                let npairs = read_i32(code, base + 4)?;
                if npairs < 0 {
                    return Err(Error::MalformedAttribute("Code"));
                }
                pc = base + 8 + npairs as usize * 8;
            }
            // wide: widened iinc takes four operand bytes more than the rest
            196 => {
                let widened = *code.get(pc + 1).ok_or(Error::UnexpectedEof)?;
                pc += if widened == 132 { 6 } else { 4 };
            }
            _ => {
                let width = operand_width(opcode).ok_or(Error::InvalidOpcode(opcode))?;
                pc += 1 + width;
            }
        }
        if pc > code.len() {
            return Err(Error::UnexpectedEof);
        }
    }
    Ok(())
}

pub(crate) fn parse_line_number_table(reader: &mut Reader<'_>) -> Result<Option<u32>> {
    let count = reader.read_u2()? as usize;
    let mut first: Option<u32> = None;
    for _ in 0..count {
        let _start_pc = reader.read_u2()?;
        let line = reader.read_u2()? as u32;
        first = Some(match first {
            Some(existing) => existing.min(line),
            None => line,
        });
    }
    Ok(first)
}

fn align4(offset: usize) -> usize {
    (offset + 3) & !3
}

fn read_u16(code: &[u8], at: usize) -> Result<u16> {
    let hi = *code.get(at).ok_or(Error::UnexpectedEof)?;
    let lo = *code.get(at + 1).ok_or(Error::UnexpectedEof)?;
    Ok(u16::from_be_bytes([hi, lo]))
}

fn read_i32(code: &[u8], at: usize) -> Result<i32> {
    let bytes: [u8; 4] = code
        .get(at..at + 4)
        .ok_or(Error::UnexpectedEof)?
        .try_into()
        .map_err(|_| Error::UnexpectedEof)?;
    Ok(i32::from_be_bytes(bytes))
}

/// Operand byte count for every fixed-width opcode. `None` marks opcodes that
/// are invalid in a classfile (reserved/debugger range).
fn operand_width(opcode: u8) -> Option<usize> {
    Some(match opcode {
        // nop, constants, stack-free loads/stores, arithmetic, conversions,
        // comparisons, returns, array ops, monitors
        0..=15 | 26..=53 | 59..=131 | 133..=152 | 172..=177 | 190..=191 | 194..=195 => 0,
        // bipush, ldc, the single-byte-index load/store family, ret, newarray
        16 | 18 | 21..=25 | 54..=58 | 169 | 188 => 1,
        // sipush, ldc_w, ldc2_w, iinc, branches, field access, new,
        // anewarray, checkcast, instanceof, ifnull/ifnonnull
        17 | 19..=20 | 132 | 153..=168 | 178..=181 | 187 | 189 | 192..=193 | 198..=199 => 2,
        // multianewarray
        197 => 3,
        // goto_w, jsr_w
        200..=201 => 4,
        // 170/171/182..186/196 are handled by the caller; everything else is
        // not a valid classfile opcode.
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operand_widths_cover_invoke_neighbours() {
        // getstatic/putfield take a two-byte index; arraylength takes none.
        assert_eq!(operand_width(178), Some(2));
        assert_eq!(operand_width(181), Some(2));
        assert_eq!(operand_width(190), Some(0));
        // Reserved opcodes are rejected.
        assert_eq!(operand_width(203), None);
    }

    #[test]
    fn align4_rounds_up() {
        assert_eq!(align4(1), 4);
        assert_eq!(align4(4), 4);
        assert_eq!(align4(5), 8);
    }
}
