use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

impl PrimitiveType {
    pub fn java_name(self) -> &'static str {
        match self {
            PrimitiveType::Byte => "byte",
            PrimitiveType::Char => "char",
            PrimitiveType::Double => "double",
            PrimitiveType::Float => "float",
            PrimitiveType::Int => "int",
            PrimitiveType::Long => "long",
            PrimitiveType::Short => "short",
            PrimitiveType::Boolean => "boolean",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Primitive(PrimitiveType),
    Object(String),
    Array(Box<FieldType>),
}

impl FieldType {
    /// Dotted Java rendering: `java.lang.String`, `int`, `byte[][]`.
    pub fn display_name(&self) -> String {
        match self {
            FieldType::Primitive(p) => p.java_name().to_string(),
            FieldType::Object(internal) => binary_name(internal),
            FieldType::Array(component) => format!("{}[]", component.display_name()),
        }
    }

    /// The element type after stripping array dimensions.
    pub fn element_type(&self) -> &FieldType {
        match self {
            FieldType::Array(component) => component.element_type(),
            other => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnType {
    Void,
    Type(FieldType),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub params: Vec<FieldType>,
    pub return_type: ReturnType,
}

/// Convert a JVM internal name (`com/example/Foo$Bar`) to a dotted binary
/// name (`com.example.Foo$Bar`).
pub fn binary_name(internal: &str) -> String {
    internal.replace('/', ".")
}

pub fn parse_field_descriptor(desc: &str) -> Result<FieldType> {
    let (ty, rest) = parse_field_type(desc)?;
    if !rest.is_empty() {
        return Err(Error::InvalidDescriptor(desc.to_string()));
    }
    Ok(ty)
}

pub fn parse_method_descriptor(desc: &str) -> Result<MethodDescriptor> {
    let rest = desc
        .strip_prefix('(')
        .ok_or_else(|| Error::InvalidDescriptor(desc.to_string()))?;

    let mut idx = 1usize;
    let mut params = Vec::new();
    loop {
        if idx >= desc.len() {
            return Err(Error::InvalidDescriptor(desc.to_string()));
        }
        if desc.as_bytes()[idx] == b')' {
            idx += 1;
            break;
        }
        let (param, tail) = parse_field_type(&desc[idx..])?;
        idx = desc.len() - tail.len();
        params.push(param);
    }
    let _ = rest;

    let return_part = &desc[idx..];
    if return_part.is_empty() {
        return Err(Error::InvalidDescriptor(desc.to_string()));
    }

    let (return_type, tail) = if let Some(tail) = return_part.strip_prefix('V') {
        (ReturnType::Void, tail)
    } else {
        let (ty, tail) = parse_field_type(return_part)?;
        (ReturnType::Type(ty), tail)
    };

    if !tail.is_empty() {
        return Err(Error::InvalidDescriptor(desc.to_string()));
    }

    Ok(MethodDescriptor {
        params,
        return_type,
    })
}

fn parse_field_type(input: &str) -> Result<(FieldType, &str)> {
    let bytes = input.as_bytes();
    if bytes.is_empty() {
        return Err(Error::InvalidDescriptor(input.to_string()));
    }
    match bytes[0] as char {
        'B' => Ok((FieldType::Primitive(PrimitiveType::Byte), &input[1..])),
        'C' => Ok((FieldType::Primitive(PrimitiveType::Char), &input[1..])),
        'D' => Ok((FieldType::Primitive(PrimitiveType::Double), &input[1..])),
        'F' => Ok((FieldType::Primitive(PrimitiveType::Float), &input[1..])),
        'I' => Ok((FieldType::Primitive(PrimitiveType::Int), &input[1..])),
        'J' => Ok((FieldType::Primitive(PrimitiveType::Long), &input[1..])),
        'S' => Ok((FieldType::Primitive(PrimitiveType::Short), &input[1..])),
        'Z' => Ok((FieldType::Primitive(PrimitiveType::Boolean), &input[1..])),
        'L' => {
            if let Some(end) = input.find(';') {
                let name = &input[1..end];
                Ok((FieldType::Object(name.to_string()), &input[end + 1..]))
            } else {
                Err(Error::InvalidDescriptor(input.to_string()))
            }
        }
        '[' => {
            let (component, rest) = parse_field_type(&input[1..])?;
            Ok((FieldType::Array(Box::new(component)), rest))
        }
        _ => Err(Error::InvalidDescriptor(input.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_field_descriptor_primitives_and_arrays() {
        assert_eq!(
            parse_field_descriptor("I").unwrap(),
            FieldType::Primitive(PrimitiveType::Int)
        );
        assert_eq!(
            parse_field_descriptor("[[Ljava/lang/String;").unwrap(),
            FieldType::Array(Box::new(FieldType::Array(Box::new(FieldType::Object(
                "java/lang/String".to_string()
            )))))
        );
    }

    #[test]
    fn parse_method_descriptor_basic() {
        let desc = parse_method_descriptor("(ILjava/lang/String;)[I").unwrap();
        assert_eq!(
            desc.params,
            vec![
                FieldType::Primitive(PrimitiveType::Int),
                FieldType::Object("java/lang/String".to_string())
            ]
        );
        assert_eq!(
            desc.return_type,
            ReturnType::Type(FieldType::Array(Box::new(FieldType::Primitive(
                PrimitiveType::Int
            ))))
        );
    }

    #[test]
    fn display_names_are_dotted() {
        let ty = parse_field_descriptor("[Lcom/example/Order;").unwrap();
        assert_eq!(ty.display_name(), "com.example.Order[]");
        assert_eq!(
            ty.element_type(),
            &FieldType::Object("com/example/Order".to_string())
        );
    }
}
