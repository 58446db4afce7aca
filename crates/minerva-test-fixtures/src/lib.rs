//! Synthetic classfile construction for tests.
//!
//! Emits real, parseable `.class` bytes (constant pool, members, annotations,
//! `Code` bodies, `BootstrapMethods`) so analyzer and engine tests need no
//! Java toolchain. The writer only guarantees structural validity: the
//! bytecode it emits is not verifiable and must never be executed.

#![forbid(unsafe_code)]

mod pool;

use crate::pool::PoolWriter;

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_PRIVATE: u16 = 0x0002;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;
pub const ACC_ENUM: u16 = 0x4000;

/// Builder for one synthetic class. Names may be given dotted or internal;
/// they are normalised to internal form on write.
#[derive(Debug, Clone)]
pub struct ClassBytes {
    name: String,
    super_name: Option<String>,
    interfaces: Vec<String>,
    access_flags: u16,
    annotations: Vec<AnnotationSpec>,
    fields: Vec<FieldSpec>,
    methods: Vec<MethodSpec>,
}

#[derive(Debug, Clone)]
pub struct AnnotationSpec {
    type_name: String,
    elements: Vec<(String, ElementSpec)>,
}

#[derive(Debug, Clone)]
pub enum ElementSpec {
    Str(String),
    Int(i32),
    Long(i64),
    Bool(bool),
    Enum { type_name: String, const_name: String },
    Array(Vec<ElementSpec>),
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    name: String,
    descriptor: String,
    access_flags: u16,
    annotations: Vec<AnnotationSpec>,
}

#[derive(Debug, Clone)]
pub struct MethodSpec {
    name: String,
    descriptor: String,
    access_flags: u16,
    annotations: Vec<AnnotationSpec>,
    code: Option<CodeSpec>,
}

#[derive(Debug, Clone, Default)]
pub struct CodeSpec {
    instructions: Vec<Instruction>,
    line: Option<u16>,
}

#[derive(Debug, Clone)]
enum Instruction {
    Invoke {
        opcode: u8,
        owner: String,
        name: String,
        descriptor: String,
        interface: bool,
    },
    InvokeDynamic {
        name: String,
        descriptor: String,
        bootstrap: BootstrapSpec,
    },
    Return,
}

#[derive(Debug, Clone)]
pub struct BootstrapSpec {
    owner: String,
    name: String,
    descriptor: String,
    args: Vec<BootstrapArgSpec>,
}

#[derive(Debug, Clone)]
pub enum BootstrapArgSpec {
    MethodType(String),
    MethodHandle {
        kind: u8,
        owner: String,
        name: String,
        descriptor: String,
    },
    Str(String),
}

pub fn annotation(type_name: &str) -> AnnotationSpec {
    AnnotationSpec {
        type_name: type_name.to_string(),
        elements: Vec::new(),
    }
}

impl AnnotationSpec {
    pub fn with_str(mut self, name: &str, value: &str) -> Self {
        self.elements
            .push((name.to_string(), ElementSpec::Str(value.to_string())));
        self
    }

    pub fn with_int(mut self, name: &str, value: i32) -> Self {
        self.elements.push((name.to_string(), ElementSpec::Int(value)));
        self
    }

    pub fn with_long(mut self, name: &str, value: i64) -> Self {
        self.elements.push((name.to_string(), ElementSpec::Long(value)));
        self
    }

    pub fn with_bool(mut self, name: &str, value: bool) -> Self {
        self.elements.push((name.to_string(), ElementSpec::Bool(value)));
        self
    }

    pub fn with_enum(mut self, name: &str, type_name: &str, const_name: &str) -> Self {
        self.elements.push((
            name.to_string(),
            ElementSpec::Enum {
                type_name: type_name.to_string(),
                const_name: const_name.to_string(),
            },
        ));
        self
    }

    pub fn with_str_array(mut self, name: &str, values: &[&str]) -> Self {
        self.elements.push((
            name.to_string(),
            ElementSpec::Array(
                values
                    .iter()
                    .map(|v| ElementSpec::Str(v.to_string()))
                    .collect(),
            ),
        ));
        self
    }
}

pub fn field(name: &str, descriptor: &str) -> FieldSpec {
    FieldSpec {
        name: name.to_string(),
        descriptor: descriptor.to_string(),
        access_flags: ACC_PRIVATE,
        annotations: Vec::new(),
    }
}

impl FieldSpec {
    pub fn access(mut self, flags: u16) -> Self {
        self.access_flags = flags;
        self
    }

    pub fn annotate(mut self, ann: AnnotationSpec) -> Self {
        self.annotations.push(ann);
        self
    }
}

pub fn method(name: &str, descriptor: &str) -> MethodSpec {
    MethodSpec {
        name: name.to_string(),
        descriptor: descriptor.to_string(),
        access_flags: ACC_PUBLIC,
        annotations: Vec::new(),
        code: None,
    }
}

impl MethodSpec {
    pub fn access(mut self, flags: u16) -> Self {
        self.access_flags = flags;
        self
    }

    pub fn annotate(mut self, ann: AnnotationSpec) -> Self {
        self.annotations.push(ann);
        self
    }

    pub fn code(mut self, code: CodeSpec) -> Self {
        self.code = Some(code);
        self
    }
}

pub fn code() -> CodeSpec {
    CodeSpec::default()
}

impl CodeSpec {
    pub fn line(mut self, line: u16) -> Self {
        self.line = Some(line);
        self
    }

    pub fn invoke_virtual(self, owner: &str, name: &str, descriptor: &str) -> Self {
        self.invoke(182, owner, name, descriptor, false)
    }

    pub fn invoke_special(self, owner: &str, name: &str, descriptor: &str) -> Self {
        self.invoke(183, owner, name, descriptor, false)
    }

    pub fn invoke_static(self, owner: &str, name: &str, descriptor: &str) -> Self {
        self.invoke(184, owner, name, descriptor, false)
    }

    pub fn invoke_interface(self, owner: &str, name: &str, descriptor: &str) -> Self {
        self.invoke(185, owner, name, descriptor, true)
    }

    fn invoke(mut self, opcode: u8, owner: &str, name: &str, descriptor: &str, interface: bool) -> Self {
        self.instructions.push(Instruction::Invoke {
            opcode,
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            interface,
        });
        self
    }

    pub fn invoke_dynamic(mut self, name: &str, descriptor: &str, bootstrap: BootstrapSpec) -> Self {
        self.instructions.push(Instruction::InvokeDynamic {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            bootstrap,
        });
        self
    }

    pub fn ret(mut self) -> Self {
        self.instructions.push(Instruction::Return);
        self
    }
}

/// A `LambdaMetafactory::metafactory` bootstrap whose implementation method is
/// `impl_owner.impl_name`.
pub fn lambda_bootstrap(impl_owner: &str, impl_name: &str, impl_descriptor: &str) -> BootstrapSpec {
    BootstrapSpec {
        owner: "java/lang/invoke/LambdaMetafactory".to_string(),
        name: "metafactory".to_string(),
        descriptor: "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodHandle;Ljava/lang/invoke/MethodType;)Ljava/lang/invoke/CallSite;".to_string(),
        args: vec![
            BootstrapArgSpec::MethodType("()V".to_string()),
            BootstrapArgSpec::MethodHandle {
                kind: 6, // REF_invokeStatic
                owner: impl_owner.to_string(),
                name: impl_name.to_string(),
                descriptor: impl_descriptor.to_string(),
            },
            BootstrapArgSpec::MethodType("()V".to_string()),
        ],
    }
}

/// A `StringConcatFactory::makeConcatWithConstants` bootstrap.
pub fn string_concat_bootstrap(recipe: &str) -> BootstrapSpec {
    BootstrapSpec {
        owner: "java/lang/invoke/StringConcatFactory".to_string(),
        name: "makeConcatWithConstants".to_string(),
        descriptor: "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/String;[Ljava/lang/Object;)Ljava/lang/invoke/CallSite;".to_string(),
        args: vec![BootstrapArgSpec::Str(recipe.to_string())],
    }
}

/// An arbitrary (non-lambda, non-concat) bootstrap handle.
pub fn custom_bootstrap(owner: &str, name: &str, descriptor: &str) -> BootstrapSpec {
    BootstrapSpec {
        owner: owner.to_string(),
        name: name.to_string(),
        descriptor: descriptor.to_string(),
        args: Vec::new(),
    }
}

pub fn class(name: &str) -> ClassBytes {
    ClassBytes {
        name: name.to_string(),
        super_name: Some("java.lang.Object".to_string()),
        interfaces: Vec::new(),
        access_flags: ACC_PUBLIC,
        annotations: Vec::new(),
        fields: Vec::new(),
        methods: Vec::new(),
    }
}

impl ClassBytes {
    pub fn access(mut self, flags: u16) -> Self {
        self.access_flags = flags;
        self
    }

    pub fn extends(mut self, super_name: &str) -> Self {
        self.super_name = Some(super_name.to_string());
        self
    }

    pub fn implements(mut self, interface: &str) -> Self {
        self.interfaces.push(interface.to_string());
        self
    }

    pub fn annotate(mut self, ann: AnnotationSpec) -> Self {
        self.annotations.push(ann);
        self
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn method(mut self, method: MethodSpec) -> Self {
        self.methods.push(method);
        self
    }

    /// Serialise to classfile bytes.
    pub fn build(self) -> Vec<u8> {
        let mut pool = PoolWriter::new();
        let mut bootstrap_methods: Vec<Vec<u8>> = Vec::new();

        let this_index = pool.class(&self.name);
        let super_index = self.super_name.as_deref().map(|s| pool.class(s)).unwrap_or(0);
        let interface_indices: Vec<u16> =
            self.interfaces.iter().map(|i| pool.class(i)).collect();

        let field_bytes: Vec<Vec<u8>> = self
            .fields
            .iter()
            .map(|f| write_field(&mut pool, f))
            .collect();
        let method_bytes: Vec<Vec<u8>> = self
            .methods
            .iter()
            .map(|m| write_method(&mut pool, m, &mut bootstrap_methods))
            .collect();

        // Class-level attributes: annotations, plus BootstrapMethods when any
        // invokedynamic was emitted.
        let mut class_attrs: Vec<Vec<u8>> = Vec::new();
        if !self.annotations.is_empty() {
            class_attrs.push(write_annotations_attr(&mut pool, &self.annotations));
        }
        if !bootstrap_methods.is_empty() {
            let name_index = pool.utf8("BootstrapMethods");
            let mut body = Vec::new();
            push_u16(&mut body, bootstrap_methods.len() as u16);
            for bm in &bootstrap_methods {
                body.extend_from_slice(bm);
            }
            class_attrs.push(attribute(name_index, body));
        }

        let mut out = Vec::new();
        push_u32(&mut out, 0xCAFEBABE);
        push_u16(&mut out, 0); // minor
        push_u16(&mut out, 52); // major: Java 8
        pool.write_to(&mut out);
        push_u16(&mut out, self.access_flags);
        push_u16(&mut out, this_index);
        push_u16(&mut out, super_index);
        push_u16(&mut out, interface_indices.len() as u16);
        for idx in interface_indices {
            push_u16(&mut out, idx);
        }
        push_u16(&mut out, field_bytes.len() as u16);
        for f in field_bytes {
            out.extend_from_slice(&f);
        }
        push_u16(&mut out, method_bytes.len() as u16);
        for m in method_bytes {
            out.extend_from_slice(&m);
        }
        push_u16(&mut out, class_attrs.len() as u16);
        for a in class_attrs {
            out.extend_from_slice(&a);
        }
        out
    }
}

fn write_field(pool: &mut PoolWriter, spec: &FieldSpec) -> Vec<u8> {
    let mut out = Vec::new();
    push_u16(&mut out, spec.access_flags);
    push_u16(&mut out, pool.utf8(&spec.name));
    push_u16(&mut out, pool.utf8(&spec.descriptor));
    let mut attrs: Vec<Vec<u8>> = Vec::new();
    if !spec.annotations.is_empty() {
        attrs.push(write_annotations_attr(pool, &spec.annotations));
    }
    push_u16(&mut out, attrs.len() as u16);
    for a in attrs {
        out.extend_from_slice(&a);
    }
    out
}

fn write_method(
    pool: &mut PoolWriter,
    spec: &MethodSpec,
    bootstrap_methods: &mut Vec<Vec<u8>>,
) -> Vec<u8> {
    let mut out = Vec::new();
    push_u16(&mut out, spec.access_flags);
    push_u16(&mut out, pool.utf8(&spec.name));
    push_u16(&mut out, pool.utf8(&spec.descriptor));

    let mut attrs: Vec<Vec<u8>> = Vec::new();
    if !spec.annotations.is_empty() {
        attrs.push(write_annotations_attr(pool, &spec.annotations));
    }
    if let Some(code) = &spec.code {
        attrs.push(write_code_attr(pool, code, bootstrap_methods));
    }
    push_u16(&mut out, attrs.len() as u16);
    for a in attrs {
        out.extend_from_slice(&a);
    }
    out
}

fn write_code_attr(
    pool: &mut PoolWriter,
    spec: &CodeSpec,
    bootstrap_methods: &mut Vec<Vec<u8>>,
) -> Vec<u8> {
    let mut code = Vec::new();
    for instruction in &spec.instructions {
        match instruction {
            Instruction::Invoke {
                opcode,
                owner,
                name,
                descriptor,
                interface,
            } => {
                let ref_index = pool.member_ref(owner, name, descriptor, *interface);
                code.push(*opcode);
                push_u16(&mut code, ref_index);
                if *opcode == 185 {
                    code.push(1); // count
                    code.push(0);
                }
            }
            Instruction::InvokeDynamic {
                name,
                descriptor,
                bootstrap,
            } => {
                let slot = bootstrap_methods.len() as u16;
                let mut bm = Vec::new();
                let handle_index =
                    pool.method_handle(6, &bootstrap.owner, &bootstrap.name, &bootstrap.descriptor, false);
                push_u16(&mut bm, handle_index);
                push_u16(&mut bm, bootstrap.args.len() as u16);
                for arg in &bootstrap.args {
                    let arg_index = match arg {
                        BootstrapArgSpec::MethodType(desc) => pool.method_type(desc),
                        BootstrapArgSpec::MethodHandle {
                            kind,
                            owner,
                            name,
                            descriptor,
                        } => pool.method_handle(*kind, owner, name, descriptor, false),
                        BootstrapArgSpec::Str(value) => pool.string(value),
                    };
                    push_u16(&mut bm, arg_index);
                }
                bootstrap_methods.push(bm);

                let indy_index = pool.invoke_dynamic(slot, name, descriptor);
                code.push(186);
                push_u16(&mut code, indy_index);
                code.push(0);
                code.push(0);
            }
            Instruction::Return => code.push(177),
        }
    }
    // Every body ends with return so the scanner sees a complete stream.
    if !matches!(spec.instructions.last(), Some(Instruction::Return)) {
        code.push(177);
    }

    let mut body = Vec::new();
    push_u16(&mut body, 4); // max_stack
    push_u16(&mut body, 4); // max_locals
    push_u32(&mut body, code.len() as u32);
    body.extend_from_slice(&code);
    push_u16(&mut body, 0); // exception_table_length

    let mut code_attrs: Vec<Vec<u8>> = Vec::new();
    if let Some(line) = spec.line {
        let name_index = pool.utf8("LineNumberTable");
        let mut lnt = Vec::new();
        push_u16(&mut lnt, 1);
        push_u16(&mut lnt, 0); // start_pc
        push_u16(&mut lnt, line);
        code_attrs.push(attribute(name_index, lnt));
    }
    push_u16(&mut body, code_attrs.len() as u16);
    for a in code_attrs {
        body.extend_from_slice(&a);
    }

    let name_index = pool.utf8("Code");
    attribute(name_index, body)
}

fn write_annotations_attr(pool: &mut PoolWriter, annotations: &[AnnotationSpec]) -> Vec<u8> {
    let name_index = pool.utf8("RuntimeVisibleAnnotations");
    let mut body = Vec::new();
    push_u16(&mut body, annotations.len() as u16);
    for ann in annotations {
        write_annotation(pool, ann, &mut body);
    }
    attribute(name_index, body)
}

fn write_annotation(pool: &mut PoolWriter, ann: &AnnotationSpec, out: &mut Vec<u8>) {
    push_u16(out, pool.utf8(&descriptor_of(&ann.type_name)));
    push_u16(out, ann.elements.len() as u16);
    for (name, value) in &ann.elements {
        push_u16(out, pool.utf8(name));
        write_element(pool, value, out);
    }
}

fn write_element(pool: &mut PoolWriter, value: &ElementSpec, out: &mut Vec<u8>) {
    match value {
        ElementSpec::Str(s) => {
            out.push(b's');
            push_u16(out, pool.utf8(s));
        }
        ElementSpec::Int(v) => {
            out.push(b'I');
            push_u16(out, pool.integer(*v));
        }
        ElementSpec::Long(v) => {
            out.push(b'J');
            push_u16(out, pool.long(*v));
        }
        ElementSpec::Bool(v) => {
            out.push(b'Z');
            push_u16(out, pool.integer(*v as i32));
        }
        ElementSpec::Enum {
            type_name,
            const_name,
        } => {
            out.push(b'e');
            push_u16(out, pool.utf8(&descriptor_of(type_name)));
            push_u16(out, pool.utf8(const_name));
        }
        ElementSpec::Array(values) => {
            out.push(b'[');
            push_u16(out, values.len() as u16);
            for v in values {
                write_element(pool, v, out);
            }
        }
    }
}

/// Accepts `com.example.Foo`, `com/example/Foo`, or an
/// `Lcom/example/Foo;` descriptor and returns the descriptor form.
fn descriptor_of(type_name: &str) -> String {
    if type_name.starts_with('L') && type_name.ends_with(';') {
        return type_name.to_string();
    }
    format!("L{};", type_name.replace('.', "/"))
}

fn attribute(name_index: u16, body: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::new();
    push_u16(&mut out, name_index);
    push_u32(&mut out, body.len() as u32);
    out.extend_from_slice(&body);
    out
}

pub(crate) fn push_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub(crate) fn push_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}
