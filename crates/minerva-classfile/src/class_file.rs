use crate::annotation::Annotation;
use crate::code::{parse_line_number_table, scan_code, CodeBody};
use crate::descriptor::binary_name;
use crate::error::{Error, Result};
use crate::pool::{BootstrapArg, ConstantPool, MethodHandleRef};
use crate::reader::Reader;

/// A parsed classfile, names already converted to dotted binary form.
#[derive(Debug, Clone)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub access_flags: u16,
    pub this_class: String,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub signature: Option<String>,
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
    pub annotations: Vec<Annotation>,
    pub code: Option<CodeBody>,
}

/// One `BootstrapMethods` table entry with its static arguments resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapMethod {
    pub method: MethodHandleRef,
    pub args: Vec<BootstrapArg>,
}

impl BootstrapMethod {
    /// Dotted owner of the bootstrap handle, e.g.
    /// `java.lang.invoke.LambdaMetafactory`.
    pub fn owner_binary_name(&self) -> String {
        binary_name(&self.method.owner)
    }
}

impl ClassFile {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let magic = reader.read_u4()?;
        if magic != 0xCAFEBABE {
            return Err(Error::InvalidMagic(magic));
        }

        let minor_version = reader.read_u2()?;
        let major_version = reader.read_u2()?;
        let cp = ConstantPool::parse(&mut reader)?;

        let access_flags = reader.read_u2()?;
        let this_class = binary_name(&cp.get_class_name(reader.read_u2()?)?);
        let super_class_idx = reader.read_u2()?;
        let super_class = if super_class_idx == 0 {
            None
        } else {
            Some(binary_name(&cp.get_class_name(super_class_idx)?))
        };

        let interfaces_count = reader.read_u2()? as usize;
        let mut interfaces = Vec::with_capacity(interfaces_count);
        for _ in 0..interfaces_count {
            interfaces.push(binary_name(&cp.get_class_name(reader.read_u2()?)?));
        }

        let fields_count = reader.read_u2()? as usize;
        let mut fields = Vec::with_capacity(fields_count);
        for _ in 0..fields_count {
            let (member, _code) = parse_member(&mut reader, &cp)?;
            fields.push(FieldInfo {
                access_flags: member.access_flags,
                name: member.name,
                descriptor: member.descriptor,
                signature: member.signature,
                annotations: member.annotations,
            });
        }

        let methods_count = reader.read_u2()? as usize;
        let mut members = Vec::with_capacity(methods_count);
        for _ in 0..methods_count {
            members.push(parse_member(&mut reader, &cp)?);
        }

        let class_attrs = parse_class_attributes(&mut reader, &cp)?;
        reader.ensure_empty()?;

        // Method bodies can only be resolved once the class-level
        // BootstrapMethods table has been read, which sits after them in the
        // file. Scan the retained code slices now.
        let mut methods = Vec::with_capacity(members.len());
        for (member, raw_code) in members {
            let code = match raw_code {
                Some(raw) => {
                    let mut body = CodeBody {
                        first_line: raw.first_line,
                        ..CodeBody::default()
                    };
                    scan_code(raw.code, &cp, &class_attrs.bootstrap_methods, &mut body)?;
                    Some(body)
                }
                None => None,
            };
            methods.push(MethodInfo {
                access_flags: member.access_flags,
                name: member.name,
                descriptor: member.descriptor,
                signature: member.signature,
                annotations: member.annotations,
                code,
            });
        }

        Ok(Self {
            minor_version,
            major_version,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            signature: class_attrs.signature,
            annotations: class_attrs.annotations,
        })
    }
}

struct RawMember {
    access_flags: u16,
    name: String,
    descriptor: String,
    signature: Option<String>,
    annotations: Vec<Annotation>,
}

struct RawCode<'a> {
    code: &'a [u8],
    first_line: Option<u32>,
}

fn parse_member<'a>(
    reader: &mut Reader<'a>,
    cp: &ConstantPool,
) -> Result<(RawMember, Option<RawCode<'a>>)> {
    let access_flags = reader.read_u2()?;
    let name = cp.get_utf8(reader.read_u2()?)?.to_string();
    let descriptor = cp.get_utf8(reader.read_u2()?)?.to_string();

    let mut signature = None;
    let mut annotations = Vec::new();
    let mut raw_code = None;

    let attributes_count = reader.read_u2()? as usize;
    for _ in 0..attributes_count {
        let name_index = reader.read_u2()?;
        let length = reader.read_u4()? as usize;
        let info = reader.read_bytes(length)?;
        let attr_name = cp.get_utf8(name_index)?;

        let mut sub = Reader::new(info);
        match attr_name {
            "Signature" => {
                signature = Some(cp.get_utf8(sub.read_u2()?)?.to_string());
                sub.ensure_empty()?;
            }
            "RuntimeVisibleAnnotations" | "RuntimeInvisibleAnnotations" => {
                let num = sub.read_u2()? as usize;
                for _ in 0..num {
                    annotations.push(Annotation::parse(&mut sub, cp)?);
                }
                sub.ensure_empty()?;
            }
            "Code" => {
                let _max_stack = sub.read_u2()?;
                let _max_locals = sub.read_u2()?;
                let code_length = sub.read_u4()? as usize;
                let code = sub.read_bytes(code_length)?;

                let exception_table_length = sub.read_u2()? as usize;
                sub.skip(exception_table_length * 8)?;

                let mut first_line = None;
                let code_attr_count = sub.read_u2()? as usize;
                for _ in 0..code_attr_count {
                    let inner_name_index = sub.read_u2()?;
                    let inner_length = sub.read_u4()? as usize;
                    let inner_info = sub.read_bytes(inner_length)?;
                    if cp.get_utf8(inner_name_index)? == "LineNumberTable" {
                        let mut lnt = Reader::new(inner_info);
                        let line = parse_line_number_table(&mut lnt)?;
                        first_line = match (first_line, line) {
                            (Some(a), Some(b)) => Some(u32::min(a, b)),
                            (a, b) => a.or(b),
                        };
                    }
                }
                sub.ensure_empty()?;
                raw_code = Some(RawCode { code, first_line });
            }
            _ => {
                // Unknown attribute: intentionally skipped.
            }
        }
    }

    Ok((
        RawMember {
            access_flags,
            name,
            descriptor,
            signature,
            annotations,
        },
        raw_code,
    ))
}

#[derive(Default)]
struct ClassAttributes {
    signature: Option<String>,
    annotations: Vec<Annotation>,
    bootstrap_methods: Vec<BootstrapMethod>,
}

fn parse_class_attributes(reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<ClassAttributes> {
    let attributes_count = reader.read_u2()? as usize;
    let mut parsed = ClassAttributes::default();
    for _ in 0..attributes_count {
        let name_index = reader.read_u2()?;
        let length = reader.read_u4()? as usize;
        let info = reader.read_bytes(length)?;
        let attr_name = cp.get_utf8(name_index)?;

        let mut sub = Reader::new(info);
        match attr_name {
            "Signature" => {
                parsed.signature = Some(cp.get_utf8(sub.read_u2()?)?.to_string());
                sub.ensure_empty()?;
            }
            "RuntimeVisibleAnnotations" | "RuntimeInvisibleAnnotations" => {
                let num = sub.read_u2()? as usize;
                for _ in 0..num {
                    parsed.annotations.push(Annotation::parse(&mut sub, cp)?);
                }
                sub.ensure_empty()?;
            }
            "BootstrapMethods" => {
                let num = sub.read_u2()? as usize;
                let mut table = Vec::with_capacity(num);
                for _ in 0..num {
                    let method_ref = sub.read_u2()?;
                    let method = cp.get_method_handle(method_ref)?;
                    let arg_count = sub.read_u2()? as usize;
                    let mut args = Vec::with_capacity(arg_count);
                    for _ in 0..arg_count {
                        args.push(cp.get_bootstrap_arg(sub.read_u2()?)?);
                    }
                    table.push(BootstrapMethod { method, args });
                }
                sub.ensure_empty()?;
                parsed.bootstrap_methods = table;
            }
            _ => {
                // Unknown attribute: intentionally skipped.
            }
        }
    }
    Ok(parsed)
}
