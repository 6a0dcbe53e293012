//! JVM-style descriptor helpers.
//!
//! All identifiers in the pipeline use standard descriptors (`Lcom/example/Foo;`,
//! `I`, `[Ljava/lang/String;`). This module provides the few string-level
//! operations the engine needs: classification, simple/package name extraction,
//! and rendering into Java source form for the proguard-style mapping output.

/// Returns `true` if `descriptor` names a primitive type (including `V`).
#[must_use]
pub fn is_primitive(descriptor: &str) -> bool {
    matches!(descriptor, "V" | "Z" | "B" | "S" | "C" | "I" | "J" | "F" | "D")
}

/// Returns `true` if `descriptor` names an array type.
#[must_use]
pub fn is_array(descriptor: &str) -> bool {
    descriptor.starts_with('[')
}

/// Returns `true` if `descriptor` names a class or interface type.
#[must_use]
pub fn is_class(descriptor: &str) -> bool {
    descriptor.starts_with('L') && descriptor.ends_with(';')
}

/// Extracts the package prefix of a class descriptor, including the leading `L`
/// and the trailing `/`.
///
/// Returns `"L"` for descriptors in the unnamed package.
#[must_use]
pub fn package_prefix(descriptor: &str) -> &str {
    match descriptor.rfind('/') {
        Some(idx) => &descriptor[..=idx],
        None => "L",
    }
}

/// Extracts the simple (unqualified) name of a class descriptor.
#[must_use]
pub fn simple_name(descriptor: &str) -> &str {
    let trimmed = descriptor
        .strip_prefix('L')
        .and_then(|d| d.strip_suffix(';'))
        .unwrap_or(descriptor);
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Converts a class descriptor into its binary name (`Lcom/a/Foo;` to `com.a.Foo`).
///
/// Non-class descriptors are rendered in Java source form instead.
#[must_use]
pub fn binary_name(descriptor: &str) -> String {
    match descriptor.strip_prefix('L').and_then(|d| d.strip_suffix(';')) {
        Some(inner) => inner.replace('/', "."),
        None => java_name(descriptor),
    }
}

/// Converts a binary name (`com.a.Foo`) into a class descriptor (`Lcom/a/Foo;`).
#[must_use]
pub fn descriptor_from_binary_name(name: &str) -> String {
    format!("L{};", name.replace('.', "/"))
}

/// Renders a descriptor in Java source form for mapping output.
///
/// `I` becomes `int`, `[I` becomes `int[]`, `Lcom/a/Foo;` becomes `com.a.Foo`.
#[must_use]
pub fn java_name(descriptor: &str) -> String {
    if let Some(element) = descriptor.strip_prefix('[') {
        return format!("{}[]", java_name(element));
    }
    match descriptor {
        "V" => "void".to_string(),
        "Z" => "boolean".to_string(),
        "B" => "byte".to_string(),
        "S" => "short".to_string(),
        "C" => "char".to_string(),
        "I" => "int".to_string(),
        "J" => "long".to_string(),
        "F" => "float".to_string(),
        "D" => "double".to_string(),
        other => binary_name(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(is_primitive("I"));
        assert!(is_primitive("V"));
        assert!(!is_primitive("Ljava/lang/Object;"));
        assert!(is_class("Lcom/example/Foo;"));
        assert!(!is_class("I"));
        assert!(is_array("[I"));
        assert!(is_array("[[Ljava/lang/String;"));
    }

    #[test]
    fn test_names() {
        assert_eq!(simple_name("Lcom/example/Foo;"), "Foo");
        assert_eq!(simple_name("LFoo;"), "Foo");
        assert_eq!(package_prefix("Lcom/example/Foo;"), "Lcom/example/");
        assert_eq!(package_prefix("LFoo;"), "L");
        assert_eq!(binary_name("Lcom/example/Foo;"), "com.example.Foo");
        assert_eq!(descriptor_from_binary_name("com.example.Foo"), "Lcom/example/Foo;");
    }

    #[test]
    fn test_java_names() {
        assert_eq!(java_name("I"), "int");
        assert_eq!(java_name("[I"), "int[]");
        assert_eq!(java_name("[[Z"), "boolean[][]");
        assert_eq!(java_name("Ljava/lang/String;"), "java.lang.String");
    }
}
