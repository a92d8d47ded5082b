//! Deterministic symbol names shared by both emission targets.
//!
//! The managed and native outputs are rendered independently and only ever
//! agree on these strings, so every function here is pure: same descriptor,
//! same symbol.
//!
//! A member symbol is laid out as
//!
//! ```text
//! <Namespace segments><Type base name><Generic args><Kind tag><Member name><Method generic args><Param types>
//! ```
//!
//! e.g. `MyGame.Calc.Add(int, int)` -> `MyGameCalcMethodAddSystemInt32SystemInt32`.
//! A by-ref parameter's type is prefixed with `Out` or `Ref`, so
//! `Foo(int)` and `Foo(ref int)` stay distinct.

use crate::{MemberDescriptor, MemberKind, ParamFlags, TypeDescriptor};

/// Symbol of a member binding.
pub fn member_symbol(member: &MemberDescriptor) -> String {
    let mut out = member.owner.symbol_prefix();
    out.push_str(member.kind.tag());
    out.push_str(&member_name_fragment(member));
    push_signature(&mut out, member);
    out
}

/// Symbol of the native export a base-type stub calls to reach a native
/// override: `<Namespace><StubType><Member><ParamTypes>`.
pub fn native_invoke_symbol(stub: &TypeDescriptor, member: &MemberDescriptor) -> String {
    let mut out = stub.symbol_prefix();
    if member.kind != MemberKind::Method {
        out.push_str(member.kind.tag());
    }
    out.push_str(&member_name_fragment(member));
    push_signature(&mut out, member);
    out
}

/// Symbol of the native export that releases a base-type instance.
pub fn release_symbol(stub: &TypeDescriptor) -> String {
    format!("Release{}", stub.symbol_prefix())
}

/// Symbol of the native export that invokes a native callback wrapped by a
/// managed delegate.
pub fn delegate_native_invoke_symbol(delegate: &TypeDescriptor) -> String {
    format!("{}NativeInvoke", delegate.symbol_prefix())
}

/// Symbol of the native initialization export.
pub const INIT_SYMBOL: &str = "Init";

/// Native export a managed trampoline calls to park a caught exception's handle.
pub const SET_MANAGED_EXCEPTION_SYMBOL: &str = "SetManagedException";

/// Native export the managed side calls after a native invoke; returns the
/// handle of the pending exception's message string, or 0.
pub const TAKE_NATIVE_EXCEPTION_SYMBOL: &str = "TakeNativeException";

fn member_name_fragment(member: &MemberDescriptor) -> String {
    match member.kind {
        MemberKind::Operator(op) => op.method_name().trim_start_matches("op_").to_string(),
        _ => member.name.clone(),
    }
}

fn push_signature(out: &mut String, member: &MemberDescriptor) {
    for arg in &member.generic_args {
        out.push_str(&arg.symbol_fragment());
    }
    for param in &member.params {
        if param.flags.contains(ParamFlags::OUT) {
            out.push_str("Out");
        } else if param.flags.contains(ParamFlags::REF) {
            out.push_str("Ref");
        }
        out.push_str(&param.ty.type_ref.symbol_fragment());
    }
    // Conversions differ only by return type.
    if let MemberKind::Operator(op) = member.kind {
        if op.arity() == crate::OperatorArity::Conversion {
            out.push_str(&member.return_type.type_ref.symbol_fragment());
        }
    }
}

/// `PascalCase` / `camelCase` -> `snake_case`, for native Rust identifiers.
///
/// Runs of capitals are kept together (`HTTPServer` -> `http_server`).
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev_lower = i > 0 && (chars[i - 1].is_lowercase() || chars[i - 1].is_numeric());
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let prev_upper = i > 0 && chars[i - 1].is_uppercase();
            if i > 0 && !out.ends_with('_') && (prev_lower || (prev_upper && next_lower)) {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Operator, ParamDescriptor, PrimitiveKind, TypeKind, TypeRef};

    fn int() -> TypeDescriptor {
        TypeDescriptor::new(TypeRef::primitive(PrimitiveKind::Int32), TypeKind::Primitive)
    }

    fn calc() -> TypeDescriptor {
        TypeDescriptor::new(TypeRef::named("MyGame.Calc"), TypeKind::Reference)
    }

    #[test]
    fn method_symbol() {
        let add = MemberDescriptor::new(MemberKind::Method, calc(), "Add")
            .with_param(ParamDescriptor::new("a", int()))
            .with_param(ParamDescriptor::new("b", int()))
            .with_return(int());
        assert_eq!(member_symbol(&add), "MyGameCalcMethodAddSystemInt32SystemInt32");
    }

    #[test]
    fn overloads_have_distinct_symbols() {
        let a = MemberDescriptor::new(MemberKind::Method, calc(), "Add")
            .with_param(ParamDescriptor::new("a", int()));
        let single = TypeDescriptor::new(TypeRef::primitive(PrimitiveKind::Single), TypeKind::Primitive);
        let b = MemberDescriptor::new(MemberKind::Method, calc(), "Add")
            .with_param(ParamDescriptor::new("a", single));
        assert_ne!(member_symbol(&a), member_symbol(&b));
    }

    #[test]
    fn generic_owner_symbol() {
        let list = TypeDescriptor::new(
            TypeRef::parse("System.Collections.Generic.List<int>").unwrap(),
            TypeKind::Reference,
        );
        let ctor = MemberDescriptor::new(MemberKind::Constructor, list, "");
        assert_eq!(
            member_symbol(&ctor),
            "SystemCollectionsGenericListSystemInt32Constructor"
        );
    }

    #[test]
    fn operator_and_conversion_symbols() {
        let vec = TypeDescriptor::new(TypeRef::named("MyGame.Vec"), TypeKind::FullValueType);
        let add = MemberDescriptor::new(MemberKind::Operator(Operator::Addition), vec.clone(), "op_Addition")
            .with_param(ParamDescriptor::new("a", vec.clone()))
            .with_param(ParamDescriptor::new("b", vec.clone()))
            .with_return(vec.clone());
        assert_eq!(member_symbol(&add), "MyGameVecOperatorAdditionMyGameVecMyGameVec");

        let to_int = MemberDescriptor::new(MemberKind::Operator(Operator::Explicit), vec.clone(), "op_Explicit")
            .with_param(ParamDescriptor::new("v", vec.clone()))
            .with_return(int());
        let single = TypeDescriptor::new(TypeRef::primitive(PrimitiveKind::Single), TypeKind::Primitive);
        let to_float = to_int.clone().with_return(single);
        assert_ne!(member_symbol(&to_int), member_symbol(&to_float));
    }

    #[test]
    fn base_type_symbols() {
        let stub = TypeDescriptor::new(TypeRef::named("MyGame.BaseCalc"), TypeKind::Reference);
        let update = MemberDescriptor::new(MemberKind::Method, calc(), "Update")
            .with_param(ParamDescriptor::new("dt", int()));
        assert_eq!(native_invoke_symbol(&stub, &update), "MyGameBaseCalcUpdateSystemInt32");
        assert_eq!(release_symbol(&stub), "ReleaseMyGameBaseCalc");
    }

    #[test]
    fn snake_case() {
        assert_eq!(to_snake_case("Add"), "add");
        assert_eq!(to_snake_case("GetItemCount"), "get_item_count");
        assert_eq!(to_snake_case("HTTPServer"), "http_server");
        assert_eq!(to_snake_case("MyGame"), "my_game");
        assert_eq!(to_snake_case("already_snake"), "already_snake");
    }

    #[test]
    fn by_ref_params_are_tagged() {
        let by_value = MemberDescriptor::new(MemberKind::Method, calc(), "Halve")
            .with_param(ParamDescriptor::new("v", int()));
        let by_ref = MemberDescriptor::new(MemberKind::Method, calc(), "Halve")
            .with_param(ParamDescriptor::new("v", int()).with_flags(ParamFlags::REF));
        let out = MemberDescriptor::new(MemberKind::Method, calc(), "Halve")
            .with_param(ParamDescriptor::new("v", int()).with_flags(ParamFlags::OUT));
        assert_eq!(member_symbol(&by_value), "MyGameCalcMethodHalveSystemInt32");
        assert_eq!(member_symbol(&by_ref), "MyGameCalcMethodHalveRefSystemInt32");
        assert_eq!(member_symbol(&out), "MyGameCalcMethodHalveOutSystemInt32");
    }
}
