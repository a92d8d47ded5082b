//! Lowering pass - scan output to [`BindingPlan`].
//!
//! ## Responsibilities
//!
//! - Assign each managed trampoline its symbol and function-table index
//! - Compute the wire shape of every receiver, parameter and return value
//! - Name the native-invoke exports of delegates and base-type overrides
//! - Drop members whose symbol was already emitted, with a warning
//!
//! Index assignment walks types in scan order and then base-type stub
//! constructors, which is also the order of the init handshake.

use rustc_hash::FxHashSet;

use crossbind_core::naming::{
    delegate_native_invoke_symbol, member_symbol, native_invoke_symbol, release_symbol,
};
use crossbind_core::{Diagnostic, MemberDescriptor};

use crate::ir::{
    BaseTypeBinding, BindingPlan, FieldBinding, MemberBinding, NativeInvokeBinding, TypeBinding,
    WireParam, WireType,
};
use crate::scan::{ScanResult, ScannedBaseType, ScannedType, TypeRole};

/// Lowers a [`ScanResult`].
pub struct LoweringPass {
    next_index: usize,
    symbols: FxHashSet<String>,
    plan: BindingPlan,
}

impl LoweringPass {
    pub fn new() -> Self {
        Self {
            next_index: 0,
            symbols: FxHashSet::default(),
            plan: BindingPlan::default(),
        }
    }

    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn run(mut self, scan: ScanResult) -> BindingPlan {
        self.plan.diagnostics = scan.diagnostics;
        for ty in scan.types {
            let binding = self.lower_type(ty);
            self.plan.types.push(binding);
        }
        for base in scan.base_types {
            let binding = self.lower_base_type(base);
            self.plan.base_types.push(binding);
        }
        self.plan
    }

    fn claim_symbol(&mut self, symbol: &str, member: &MemberDescriptor) -> bool {
        if self.symbols.insert(symbol.to_string()) {
            return true;
        }
        self.plan.diagnostics.add_diagnostic(
            Diagnostic::warning(format!("symbol {symbol} emitted twice; second binding dropped"))
                .with_context(member.signature()),
        );
        false
    }

    fn lower_member(&mut self, member: MemberDescriptor) -> Option<MemberBinding> {
        let symbol = member_symbol(&member);
        if !self.claim_symbol(&symbol, &member) {
            return None;
        }
        let index = self.next_index;
        self.next_index += 1;
        Some(MemberBinding {
            index,
            symbol,
            this: member.has_this().then(|| WireType::of(&member.owner)),
            params: member.params.iter().cloned().map(WireParam::new).collect(),
            ret: WireType::of(&member.return_type),
            descriptor: member,
        })
    }

    fn native_invoke(symbol: String, member: MemberDescriptor) -> NativeInvokeBinding {
        NativeInvokeBinding {
            symbol,
            params: member.params.iter().cloned().map(WireParam::new).collect(),
            ret: WireType::of(&member.return_type),
            descriptor: member,
        }
    }

    fn lower_type(&mut self, ty: ScannedType) -> TypeBinding {
        let native_invoke = match ty.role {
            TypeRole::Delegate => ty
                .members
                .first()
                .map(|invoke| {
                    Self::native_invoke(delegate_native_invoke_symbol(&ty.descriptor), invoke.clone())
                }),
            _ => None,
        };
        let members = ty
            .members
            .into_iter()
            .filter_map(|m| self.lower_member(m))
            .collect();
        TypeBinding {
            descriptor: ty.descriptor,
            role: ty.role,
            capacity: ty.capacity,
            fields: ty.fields.into_iter().map(FieldBinding::from).collect(),
            enum_values: ty.enum_values,
            members,
            native_invoke,
        }
    }

    fn lower_base_type(&mut self, base: ScannedBaseType) -> BaseTypeBinding {
        let constructors = base
            .constructors
            .into_iter()
            .filter_map(|m| self.lower_member(m))
            .collect();
        let mut overrides = Vec::with_capacity(base.overrides.len());
        for member in base.overrides {
            let symbol = native_invoke_symbol(&base.stub, &member);
            if self.claim_symbol(&symbol, &member) {
                overrides.push(Self::native_invoke(symbol, member));
            }
        }
        BaseTypeBinding {
            release_symbol: release_symbol(&base.stub),
            base: base.base,
            stub: base.stub,
            is_interface: base.is_interface,
            capacity: base.capacity,
            constructors,
            overrides,
        }
    }
}

impl Default for LoweringPass {
    fn default() -> Self {
        Self::new()
    }
}

/// Lower `scan` into a plan.
pub fn lower(scan: ScanResult) -> BindingPlan {
    LoweringPass::new().run(scan)
}
