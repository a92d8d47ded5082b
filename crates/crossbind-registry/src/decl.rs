//! Member declaration strings.
//!
//! Shapes are described with managed-style declarations so metadata reads
//! like the source it mirrors:
//!
//! ```text
//! static int Add(int a, int b)
//! virtual void Update(float dt)
//! T Echo<T>(T value)
//! void Move(ref MyGame.Vec position, float speed = 1.5)
//! public float X
//! int Total { get; set; }
//! System.Action Changed
//! ```

use crossbind_core::{DefaultValue, ParamFlags, QualifiedName, TypeRef};
use ordered_float::OrderedFloat;

use crate::{
    EventShape, FieldShape, MethodFlags, MethodShape, ParamShape, PropertyShape,
    RegistrationError,
};

#[derive(Debug, Default, Clone, Copy)]
struct Modifiers {
    flags: MethodFlags,
    private: bool,
    readonly: bool,
}

/// Strip leading modifier keywords.
fn split_modifiers(mut text: &str) -> (Modifiers, &str) {
    let mut mods = Modifiers::default();
    loop {
        text = text.trim_start();
        let (word, rest) = match text.split_once(char::is_whitespace) {
            Some(pair) => pair,
            None => return (mods, text),
        };
        match word {
            "public" => {}
            "private" | "protected" | "internal" => mods.private = true,
            "static" => mods.flags |= MethodFlags::STATIC,
            "virtual" => mods.flags |= MethodFlags::VIRTUAL,
            "abstract" => mods.flags |= MethodFlags::ABSTRACT,
            "override" => mods.flags |= MethodFlags::OVERRIDE,
            "sealed" => mods.flags |= MethodFlags::SEALED,
            "readonly" | "const" => mods.readonly = true,
            _ => return (mods, text),
        }
        text = rest;
    }
}

/// Split on `sep` outside of `<>`, `()` and `[]`.
pub(crate) fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '<' | '(' | '[' => depth += 1,
            '>' | ')' | ']' => depth -= 1,
            c if c == sep && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Split `Type name` at the last top-level whitespace.
fn split_type_and_name<'a>(decl: &str, text: &'a str) -> Result<(&'a str, &'a str), RegistrationError> {
    let text = text.trim();
    let mut depth = 0i32;
    let mut split = None;
    for (i, c) in text.char_indices() {
        match c {
            '<' | '(' | '[' => depth += 1,
            '>' | ')' | ']' => depth -= 1,
            c if c.is_whitespace() && depth == 0 => split = Some(i),
            _ => {}
        }
    }
    match split {
        Some(i) => {
            let (ty, name) = (text[..i].trim(), text[i..].trim());
            if name.is_empty() || !is_identifier(name) {
                return Err(RegistrationError::invalid(decl, format!("invalid name '{name}'")));
            }
            Ok((ty, name))
        }
        None => Err(RegistrationError::invalid(decl, "expected a type and a name")),
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

fn parse_type(decl: &str, text: &str, generics: &[String]) -> Result<TypeRef, RegistrationError> {
    TypeRef::parse(text)
        .map(|ty| ty.with_generic_params(generics))
        .map_err(|e| RegistrationError::from((decl, e)))
}

/// Parse `Name<T, U>` into the name and its generic parameters.
fn split_generic_name<'a>(decl: &str, text: &'a str) -> Result<(&'a str, Vec<String>), RegistrationError> {
    let text = text.trim();
    match text.split_once('<') {
        None => Ok((text, Vec::new())),
        Some((name, rest)) => {
            let inner = rest
                .strip_suffix('>')
                .ok_or_else(|| RegistrationError::invalid(decl, "unterminated generic parameter list"))?;
            let params = inner
                .split(',')
                .map(|p| p.trim().to_string())
                .collect::<Vec<_>>();
            if params.iter().any(|p| !is_identifier(p)) {
                return Err(RegistrationError::invalid(decl, "invalid generic parameter"));
            }
            Ok((name.trim(), params))
        }
    }
}

pub(crate) fn parse_default(decl: &str, text: &str) -> Result<DefaultValue, RegistrationError> {
    let text = text.trim();
    let value = match text {
        "null" => DefaultValue::Null,
        "true" => DefaultValue::Bool(true),
        "false" => DefaultValue::Bool(false),
        _ if text.starts_with('"') && text.ends_with('"') && text.len() >= 2 => {
            DefaultValue::String(text[1..text.len() - 1].to_string())
        }
        _ if text.starts_with('\'') && text.ends_with('\'') && text.len() >= 3 => {
            let c = text[1..text.len() - 1]
                .chars()
                .next()
                .ok_or_else(|| RegistrationError::invalid(decl, "empty char literal"))?;
            let mut buf = [0u16; 2];
            DefaultValue::Char(c.encode_utf16(&mut buf)[0])
        }
        _ if text.starts_with("default(") && text.ends_with(')') => {
            DefaultValue::ValueTypeDefault(QualifiedName::from(&text[8..text.len() - 1]))
        }
        _ if text.starts_with(|c: char| c.is_ascii_digit() || c == '-') => {
            let trimmed = text.trim_end_matches(['f', 'F', 'd', 'D', 'u', 'U', 'l', 'L']);
            if trimmed.contains('.') || trimmed.contains('e') {
                let v: f64 = trimmed
                    .parse()
                    .map_err(|_| RegistrationError::invalid(decl, format!("bad number '{text}'")))?;
                DefaultValue::Float(OrderedFloat(v))
            } else if let Ok(v) = trimmed.parse::<i64>() {
                DefaultValue::Int(v)
            } else {
                let v: u64 = trimmed
                    .parse()
                    .map_err(|_| RegistrationError::invalid(decl, format!("bad number '{text}'")))?;
                DefaultValue::UInt(v)
            }
        }
        _ => {
            let name = QualifiedName::from(text);
            if name.is_global() {
                return Err(RegistrationError::invalid(
                    decl,
                    format!("unsupported default '{text}'"),
                ));
            }
            let enum_type = QualifiedName::from(name.namespace_string());
            DefaultValue::EnumMember {
                enum_type,
                member: name.name,
            }
        }
    };
    Ok(value)
}

fn parse_param(decl: &str, text: &str, generics: &[String]) -> Result<ParamShape, RegistrationError> {
    let (body, default) = match split_top_level(text, '=').as_slice() {
        [body] => (*body, None),
        [body, value] => (*body, Some(parse_default(decl, value)?)),
        _ => return Err(RegistrationError::invalid(decl, "too many '='")),
    };
    let mut body = body.trim();
    let mut flags = ParamFlags::empty();
    loop {
        let (word, rest) = match body.split_once(char::is_whitespace) {
            Some(pair) => pair,
            None => break,
        };
        let flag = match word {
            "in" => ParamFlags::IN,
            "out" => ParamFlags::OUT,
            "ref" => ParamFlags::REF,
            "params" => ParamFlags::PARAMS,
            _ => break,
        };
        flags |= flag;
        body = rest.trim_start();
    }
    let (ty, name) = split_type_and_name(decl, body)?;
    Ok(ParamShape {
        name: name.to_string(),
        ty: parse_type(decl, ty, generics)?,
        flags,
        default,
    })
}

fn parse_param_list(decl: &str, inner: &str, generics: &[String]) -> Result<Vec<ParamShape>, RegistrationError> {
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    let params = split_top_level(inner, ',')
        .into_iter()
        .map(|p| parse_param(decl, p, generics))
        .collect::<Result<Vec<_>, _>>()?;
    if let Some(pos) = params.iter().position(|p| p.flags.contains(ParamFlags::PARAMS)) {
        if pos + 1 != params.len() {
            return Err(RegistrationError::invalid(decl, "'params' must be the last parameter"));
        }
    }
    Ok(params)
}

/// Split `head(args)` into `head` and `args`.
fn split_call<'a>(decl: &str, text: &'a str) -> Result<(&'a str, &'a str), RegistrationError> {
    let text = text.trim();
    let open = text
        .find('(')
        .ok_or_else(|| RegistrationError::invalid(decl, "expected '('"))?;
    let inner = text[open + 1..]
        .strip_suffix(')')
        .ok_or_else(|| RegistrationError::invalid(decl, "expected ')' at end"))?;
    Ok((&text[..open], inner))
}

/// `[modifiers] Ret Name[<T>](params)`
pub(crate) fn parse_method(decl: &str, type_generics: &[String]) -> Result<MethodShape, RegistrationError> {
    let (mods, rest) = split_modifiers(decl);
    let (head, inner) = split_call(decl, rest)?;
    let (ret, name) = split_type_and_name(decl, head).or_else(|_| {
        // Generic method names contain '<', which split_type_and_name treats
        // as nesting; retry by splitting before the name's generic list.
        let head = head.trim();
        let lt = head.rfind('<').unwrap_or(head.len());
        let space = head[..lt]
            .rfind(char::is_whitespace)
            .ok_or_else(|| RegistrationError::invalid(decl, "expected a return type and a name"))?;
        Ok::<_, RegistrationError>((head[..space].trim(), head[space..].trim()))
    })?;
    let (name, generic_params) = split_generic_name(decl, name)?;
    let generics: Vec<String> = type_generics.iter().chain(&generic_params).cloned().collect();

    Ok(MethodShape {
        name: name.to_string(),
        generic_params,
        params: parse_param_list(decl, inner, &generics)?,
        return_type: parse_type(decl, ret, &generics)?,
        flags: mods.flags,
        is_public: !mods.private,
    })
}

/// `[modifiers] (params)`
pub(crate) fn parse_constructor(decl: &str, type_generics: &[String]) -> Result<MethodShape, RegistrationError> {
    let (mods, rest) = split_modifiers(decl);
    let (head, inner) = split_call(decl, rest)?;
    if !head.trim().is_empty() && !is_identifier(head.trim()) {
        return Err(RegistrationError::invalid(decl, "unexpected text before '('"));
    }
    Ok(MethodShape {
        name: ".ctor".to_string(),
        generic_params: Vec::new(),
        params: parse_param_list(decl, inner, type_generics)?,
        return_type: TypeRef::Void,
        flags: MethodFlags::empty(),
        is_public: !mods.private,
    })
}

/// `[modifiers] Type Name`
pub(crate) fn parse_field(decl: &str, type_generics: &[String]) -> Result<FieldShape, RegistrationError> {
    let (mods, rest) = split_modifiers(decl);
    let (ty, name) = split_type_and_name(decl, rest)?;
    Ok(FieldShape {
        name: name.to_string(),
        ty: parse_type(decl, ty, type_generics)?,
        is_public: !mods.private,
        is_static: mods.flags.contains(MethodFlags::STATIC),
        is_readonly: mods.readonly,
    })
}

/// `[modifiers] Type Name { get; set; }`
pub(crate) fn parse_property(decl: &str, type_generics: &[String]) -> Result<PropertyShape, RegistrationError> {
    let (mods, rest) = split_modifiers(decl);
    let (head, accessors) = rest
        .split_once('{')
        .ok_or_else(|| RegistrationError::invalid(decl, "expected '{ get; set; }'"))?;
    let accessors = accessors
        .trim()
        .strip_suffix('}')
        .ok_or_else(|| RegistrationError::invalid(decl, "expected '}'"))?;
    let mut has_getter = false;
    let mut has_setter = false;
    for accessor in accessors.split(';').map(str::trim).filter(|a| !a.is_empty()) {
        match accessor {
            "get" => has_getter = true,
            "set" => has_setter = true,
            other => {
                return Err(RegistrationError::invalid(decl, format!("unknown accessor '{other}'")));
            }
        }
    }
    if !has_getter && !has_setter {
        return Err(RegistrationError::invalid(decl, "property has no accessors"));
    }
    let (ty, name) = split_type_and_name(decl, head)?;
    Ok(PropertyShape {
        name: name.to_string(),
        ty: parse_type(decl, ty, type_generics)?,
        has_getter,
        has_setter,
        flags: mods.flags,
    })
}

/// `[modifiers] HandlerType Name`
pub(crate) fn parse_event(decl: &str, type_generics: &[String]) -> Result<EventShape, RegistrationError> {
    let (mods, rest) = split_modifiers(decl);
    let (ty, name) = split_type_and_name(decl, rest)?;
    Ok(EventShape {
        name: name.to_string(),
        handler: parse_type(decl, ty, type_generics)?,
        flags: mods.flags,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbind_core::PrimitiveKind;

    #[test]
    fn method_with_modifiers() {
        let m = parse_method("static int Add(int a, int b)", &[]).unwrap();
        assert_eq!(m.name, "Add");
        assert!(m.flags.contains(MethodFlags::STATIC));
        assert_eq!(m.params.len(), 2);
        assert_eq!(m.return_type, TypeRef::primitive(PrimitiveKind::Int32));
    }

    #[test]
    fn generic_method() {
        let m = parse_method("T Echo<T>(T value)", &[]).unwrap();
        assert_eq!(m.name, "Echo");
        assert_eq!(m.generic_params, vec!["T"]);
        assert_eq!(m.return_type, TypeRef::generic("T"));
        assert_eq!(m.params[0].ty, TypeRef::generic("T"));
    }

    #[test]
    fn generic_type_in_params() {
        let m = parse_method(
            "void Fill(System.Collections.Generic.Dictionary<string, int> map, out int count)",
            &[],
        )
        .unwrap();
        assert_eq!(m.params.len(), 2);
        assert_eq!(
            m.params[0].ty.to_string(),
            "System.Collections.Generic.Dictionary<System.String, System.Int32>"
        );
        assert_eq!(m.params[1].flags, ParamFlags::OUT);
    }

    #[test]
    fn defaults() {
        let m = parse_method(
            "void Move(float speed = 1.5, bool run = false, MyGame.Mode mode = MyGame.Mode.Walk)",
            &[],
        )
        .unwrap();
        assert_eq!(m.params[0].default, Some(DefaultValue::Float(OrderedFloat(1.5))));
        assert_eq!(m.params[1].default, Some(DefaultValue::Bool(false)));
        assert_eq!(
            m.params[2].default,
            Some(DefaultValue::EnumMember {
                enum_type: "MyGame.Mode".into(),
                member: "Walk".into()
            })
        );
    }

    #[test]
    fn params_must_be_last() {
        assert!(parse_method("void Log(params object[] args, int level)", &[]).is_err());
        assert!(parse_method("void Log(int level, params object[] args)", &[]).is_ok());
    }

    #[test]
    fn type_generics_apply() {
        let m = parse_method("void Add(T item)", &["T".to_string()]).unwrap();
        assert_eq!(m.params[0].ty, TypeRef::generic("T"));
    }

    #[test]
    fn constructors() {
        let c = parse_constructor("(int seed)", &[]).unwrap();
        assert_eq!(c.params.len(), 1);
        assert!(parse_constructor("()", &[]).unwrap().params.is_empty());
        assert!(!parse_constructor("private ()", &[]).unwrap().is_public);
    }

    #[test]
    fn fields_and_properties() {
        let f = parse_field("private object tag", &[]).unwrap();
        assert!(!f.is_public);
        let p = parse_property("int Total { get; }", &[]).unwrap();
        assert!(p.has_getter && !p.has_setter);
        assert!(parse_property("int Total { }", &[]).is_err());
    }

    #[test]
    fn events() {
        let e = parse_event("virtual System.Action Changed", &[]).unwrap();
        assert_eq!(e.name, "Changed");
        assert!(e.flags.contains(MethodFlags::VIRTUAL));
    }

    #[test]
    fn malformed() {
        assert!(parse_method("int Add(int a", &[]).is_err());
        assert!(parse_method("Add()", &[]).is_err());
        assert!(parse_field("int", &[]).is_err());
    }
}
