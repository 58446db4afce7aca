use crate::descriptor::binary_name;
use crate::error::{Error, Result};
use crate::pool::{ConstantPool, CpInfo};
use crate::reader::Reader;

/// One `RuntimeVisibleAnnotations` / `RuntimeInvisibleAnnotations` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub type_descriptor: String,
    pub elements: Vec<(String, ElementValue)>,
}

impl Annotation {
    pub(crate) fn parse(reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<Self> {
        let type_index = reader.read_u2()?;
        let type_descriptor = cp.get_utf8(type_index)?.to_string();

        let num_element_value_pairs = reader.read_u2()? as usize;
        let mut elements = Vec::with_capacity(num_element_value_pairs);
        for _ in 0..num_element_value_pairs {
            let element_name_index = reader.read_u2()?;
            let name = cp.get_utf8(element_name_index)?.to_string();
            let value = ElementValue::parse(reader, cp)?;
            elements.push((name, value));
        }

        Ok(Self {
            type_descriptor,
            elements,
        })
    }

    /// Dotted annotation type name: `org.springframework.stereotype.Service`.
    pub fn type_binary_name(&self) -> Option<String> {
        self.type_descriptor
            .strip_prefix('L')
            .and_then(|rest| rest.strip_suffix(';'))
            .map(binary_name)
    }

    pub fn element(&self, name: &str) -> Option<&ElementValue> {
        self.elements
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// `value` as a string, unwrapping one-element arrays (annotation members
    /// like `@RequestMapping(value = "/x")` compile to arrays).
    pub fn string_element(&self, name: &str) -> Option<&str> {
        match self.element(name)? {
            ElementValue::Const(ConstValue::String(s)) => Some(s.as_str()),
            ElementValue::Array(values) => match values.first()? {
                ElementValue::Const(ConstValue::String(s)) if values.len() == 1 => Some(s.as_str()),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn int_element(&self, name: &str) -> Option<i64> {
        match self.element(name)? {
            ElementValue::Const(ConstValue::Int(v)) => Some(*v as i64),
            ElementValue::Const(ConstValue::Long(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn bool_element(&self, name: &str) -> Option<bool> {
        match self.element(name)? {
            ElementValue::Const(ConstValue::Boolean(v)) => Some(*v),
            _ => None,
        }
    }

    /// The constant name of an enum-valued member (`REQUIRES_NEW`).
    pub fn enum_element(&self, name: &str) -> Option<&str> {
        match self.element(name)? {
            ElementValue::Enum { const_name, .. } => Some(const_name.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
    Const(ConstValue),
    Enum {
        type_descriptor: String,
        const_name: String,
    },
    Class(String),
    Annotation(Box<Annotation>),
    Array(Vec<ElementValue>),
}

impl ElementValue {
    fn parse(reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<Self> {
        let tag = reader.read_u1()? as char;
        match tag {
            'B' | 'C' | 'I' | 'S' | 'Z' => {
                let idx = reader.read_u2()?;
                let value = match cp.get(idx)? {
                    CpInfo::Integer(v) => *v,
                    other => {
                        return Err(Error::ConstantPoolTypeMismatch {
                            index: idx,
                            expected: "Integer",
                            found: other.kind(),
                        })
                    }
                };
                let cv = match tag {
                    'B' => ConstValue::Byte(value as i8),
                    'C' => ConstValue::Char(
                        char::from_u32(value as u32)
                            .ok_or(Error::MalformedAttribute("RuntimeVisibleAnnotations"))?,
                    ),
                    'S' => ConstValue::Short(value as i16),
                    'Z' => ConstValue::Boolean(value != 0),
                    _ => ConstValue::Int(value),
                };
                Ok(ElementValue::Const(cv))
            }
            'D' => match cp.get(reader.read_u2()?)? {
                CpInfo::Double(v) => Ok(ElementValue::Const(ConstValue::Double(*v))),
                _ => Err(Error::MalformedAttribute("RuntimeVisibleAnnotations")),
            },
            'F' => match cp.get(reader.read_u2()?)? {
                CpInfo::Float(v) => Ok(ElementValue::Const(ConstValue::Float(*v))),
                _ => Err(Error::MalformedAttribute("RuntimeVisibleAnnotations")),
            },
            'J' => match cp.get(reader.read_u2()?)? {
                CpInfo::Long(v) => Ok(ElementValue::Const(ConstValue::Long(*v))),
                _ => Err(Error::MalformedAttribute("RuntimeVisibleAnnotations")),
            },
            's' => {
                let idx = reader.read_u2()?;
                let value = cp.get_utf8(idx)?.to_string();
                Ok(ElementValue::Const(ConstValue::String(value)))
            }
            'e' => {
                let type_name_index = reader.read_u2()?;
                let const_name_index = reader.read_u2()?;
                Ok(ElementValue::Enum {
                    type_descriptor: cp.get_utf8(type_name_index)?.to_string(),
                    const_name: cp.get_utf8(const_name_index)?.to_string(),
                })
            }
            'c' => {
                let class_info_index = reader.read_u2()?;
                Ok(ElementValue::Class(
                    cp.get_utf8(class_info_index)?.to_string(),
                ))
            }
            '@' => Ok(ElementValue::Annotation(Box::new(Annotation::parse(
                reader, cp,
            )?))),
            '[' => {
                let num_values = reader.read_u2()? as usize;
                let mut values = Vec::with_capacity(num_values);
                for _ in 0..num_values {
                    values.push(ElementValue::parse(reader, cp)?);
                }
                Ok(ElementValue::Array(values))
            }
            _ => Err(Error::MalformedAttribute("RuntimeVisibleAnnotations")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Byte(i8),
    Char(char),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Boolean(bool),
    String(String),
}
