//! Identifier casing and keyword escaping for generated code.
//!
//! Everything here is total: any input string produces a usable identifier.

const GO_KEYWORDS: &[&str] = &[
    "break", "case", "chan", "const", "continue", "default", "defer", "else", "fallthrough",
    "for", "func", "go", "goto", "if", "import", "interface", "map", "package", "range",
    "return", "select", "struct", "switch", "type", "var",
];

const C_KEYWORDS: &[&str] = &[
    "auto", "break", "case", "char", "const", "continue", "default", "do", "double", "else",
    "enum", "extern", "float", "for", "goto", "if", "inline", "int", "long", "register",
    "restrict", "return", "short", "signed", "sizeof", "static", "struct", "switch",
    "typedef", "union", "unsigned", "void", "volatile", "while",
];

/// Split on separators and lower→upper transitions; acronym runs stay
/// together (`VipsArrayDouble` → vips/array/double, `XYZ` → xyz).
pub fn words(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let chars: Vec<char> = s.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !cur.is_empty() {
                out.push(std::mem::take(&mut cur));
            }
            continue;
        }
        if c.is_uppercase() && !cur.is_empty() {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_lower) {
                out.push(std::mem::take(&mut cur));
            }
        }
        cur.extend(c.to_lowercase());
    }
    if !cur.is_empty() {
        out.push(cur);
    }
    out
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn pascal_case(s: &str) -> String {
    words(s).iter().map(|w| capitalize(w)).collect()
}

pub fn camel_case(s: &str) -> String {
    let ws = words(s);
    let mut out = String::new();
    for (i, w) in ws.iter().enumerate() {
        if i == 0 {
            out.push_str(w);
        } else {
            out.push_str(&capitalize(w));
        }
    }
    out
}

pub fn snake_case(s: &str) -> String {
    words(s).join("_")
}

pub fn screaming_snake_case(s: &str) -> String {
    snake_case(s).to_uppercase()
}

/// Registry names → snake identifiers that are also valid in C and Go.
pub fn identifier(native: &str) -> String {
    let mut out: String = native
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

pub fn go_ident(name: &str) -> String {
    escape(name, GO_KEYWORDS)
}

pub fn c_ident(name: &str) -> String {
    escape(name, C_KEYWORDS)
}

fn escape(name: &str, keywords: &[&str]) -> String {
    if keywords.contains(&name) {
        format!("{name}_")
    } else {
        name.to_string()
    }
}

/// GType name → binding type name (`VipsKernel` → `Kernel`).
pub fn type_name(gtype: &str) -> String {
    let stripped = gtype.strip_prefix("Vips").filter(|rest| !rest.is_empty());
    pascal_case(stripped.unwrap_or(gtype))
}

/// Constant name of an enum member in the binding (`KernelLanczos3`).
pub fn enum_member(gtype: &str, member: &str) -> String {
    format!("{}{}", type_name(gtype), pascal_case(member))
}
