//! Fully qualified name helpers.
//!
//! An FQN is the dotted binary name of a JVM symbol, with methods written as
//! `com.example.Service.method(java.lang.String)` and fields as
//! `com.example.Service.field`.

/// The segment after the last `.` that is not part of a parameter list.
pub fn simple_name(fqn: &str) -> &str {
    let head = match fqn.find('(') {
        Some(idx) => &fqn[..idx],
        None => fqn,
    };
    match head.rfind('.') {
        Some(idx) => &fqn[idx + 1..],
        None => fqn,
    }
}

/// The package prefix of a class FQN, or `""` for the default package.
pub fn package_of(fqn: &str) -> &str {
    match fqn.rfind('.') {
        Some(idx) => &fqn[..idx],
        None => "",
    }
}

/// Lower-case the leading character of a simple class name, the way Spring
/// derives default bean names (`UserServiceImpl` → `userServiceImpl`).
///
/// Matches `java.beans.Introspector::decapitalize`: when the first two
/// characters are both upper case (`URLService`), the name is left untouched.
pub fn decapitalize(name: &str) -> String {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };
    if let Some(second) = chars.next() {
        if first.is_uppercase() && second.is_uppercase() {
            return name.to_string();
        }
    }
    let mut out = String::with_capacity(name.len());
    out.extend(first.to_lowercase());
    out.push_str(&name[first.len_utf8()..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_name_of_method_fqn() {
        assert_eq!(
            simple_name("com.example.Service.method(java.lang.String)"),
            "method(java.lang.String)"
        );
        assert_eq!(simple_name("com.example.Service"), "Service");
        assert_eq!(simple_name("TopLevel"), "TopLevel");
    }

    #[test]
    fn package_of_class() {
        assert_eq!(package_of("com.example.Service"), "com.example");
        assert_eq!(package_of("TopLevel"), "");
    }

    #[test]
    fn decapitalize_follows_introspector_rules() {
        assert_eq!(decapitalize("UserServiceImpl"), "userServiceImpl");
        assert_eq!(decapitalize("URLService"), "URLService");
        assert_eq!(decapitalize("A"), "a");
        assert_eq!(decapitalize(""), "");
    }
}
