//! The one-time scan.
//!
//! Resolves every entry of a [`BindingSpec`] against the [`TypeCatalog`] and
//! produces immutable [`MemberDescriptor`] records, classified and with all
//! generic parameters substituted. Nothing downstream looks at the catalog
//! again.
//!
//! Every lookup failure is fatal and names the member signature the binding spec
//! asked for. Repeated requests (a generic tuple listed twice, a field setter
//! on a read-only field) are not errors; they are skipped with a warning.

use rustc_hash::FxHashSet;

use crossbind_core::{
    DefaultValue, Diagnostic, Diagnostics, GenerationError, GenericSubstitution, MAX_ARRAY_RANK,
    MemberDescriptor, MemberKind, Operator, ParamDescriptor, PrimitiveKind, QualifiedName,
    TypeDescriptor, TypeHash, TypeKind, TypeRef, substitution_map,
};
use crossbind_registry::{Classifier, MethodFlags, MethodShape, TypeCatalog, TypeShape};

use crate::generics::InstantiationCache;
use crate::spec::{
    ArraySpec, BaseTypeSpec, BindingSpec, ConstructorSpec, DelegateSpec, EventSpec, FieldSpec,
    GenericInstantiationSpec, MethodSpec, OverrideSpec, PropertySpec, TypeSpec,
};

/// Why a type appears in the scan output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRole {
    /// Listed in the binding spec's types.
    Exposed,
    /// An array element type and rank.
    Array { element: TypeDescriptor, rank: u8 },
    /// A delegate type; gets a native-invoke export as well.
    Delegate,
    /// Only `Box`/`Unbox` trampolines.
    Boxing,
}

/// A field of a full value type's native mirror struct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorField {
    pub name: String,
    pub ty: TypeDescriptor,
}

/// One closed type with its resolved members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedType {
    pub descriptor: TypeDescriptor,
    pub role: TypeRole,
    pub capacity: u32,
    pub members: Vec<MemberDescriptor>,
    /// Mirror layout, for full value types only.
    pub fields: Vec<MirrorField>,
    pub enum_values: Vec<(String, i64)>,
}

/// A base type with the managed stub generated for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedBaseType {
    pub base: TypeDescriptor,
    pub stub: TypeDescriptor,
    pub is_interface: bool,
    pub capacity: u32,
    /// Stub constructors, owned by the stub.
    pub constructors: Vec<MemberDescriptor>,
    /// Overridable members, owned by the base type.
    pub overrides: Vec<MemberDescriptor>,
}

/// Output of the scan.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub types: Vec<ScannedType>,
    pub base_types: Vec<ScannedBaseType>,
    pub diagnostics: Diagnostics,
}

impl ScanResult {
    pub fn member_count(&self) -> usize {
        self.types.iter().map(|t| t.members.len()).sum::<usize>()
            + self
                .base_types
                .iter()
                .map(|b| b.constructors.len())
                .sum::<usize>()
    }
}

/// Scans a spec against a catalog.
pub struct Scanner<'a> {
    catalog: &'a TypeCatalog,
    classifier: Classifier<'a>,
    instantiations: InstantiationCache,
    diagnostics: Diagnostics,
    default_capacity: u32,
    seen: FxHashSet<TypeRef>,
}

impl<'a> Scanner<'a> {
    pub fn new(catalog: &'a TypeCatalog, default_capacity: u32) -> Self {
        Self {
            catalog,
            classifier: Classifier::new(catalog),
            instantiations: InstantiationCache::new(),
            diagnostics: Diagnostics::new(),
            default_capacity,
            seen: FxHashSet::default(),
        }
    }

    /// Run the scan.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn scan(mut self, spec: &BindingSpec) -> Result<ScanResult, GenerationError> {
        let mut result = ScanResult::default();

        for ty in &spec.types {
            result.types.extend(self.scan_type(ty)?);
        }
        for boxed in &spec.boxed {
            if let Some(scanned) = self.scan_boxing(boxed)? {
                result.types.push(scanned);
            }
        }
        for array in &spec.arrays {
            if let Some(scanned) = self.scan_array(array)? {
                result.types.push(scanned);
            }
        }
        for delegate in &spec.delegates {
            result.types.extend(self.scan_delegate(delegate)?);
        }
        for base in &spec.base_types {
            result.base_types.push(self.scan_base_type(base)?);
        }

        result.diagnostics = self.diagnostics;
        Ok(result)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn parse(text: &str) -> Result<TypeRef, GenerationError> {
        TypeRef::parse(text)
    }

    /// Spec parameter names in the catalog's textual form (`int` -> `System.Int32`).
    fn normalize(params: &[String]) -> Result<Vec<String>, GenerationError> {
        params
            .iter()
            .map(|p| Self::parse(p).map(|ty| ty.to_string()))
            .collect()
    }

    fn describe(&self, ty: &TypeRef) -> Result<TypeDescriptor, GenerationError> {
        self.classifier.describe(ty)
    }

    fn warn(&mut self, message: String, context: impl Into<String>) {
        self.diagnostics
            .add_diagnostic(Diagnostic::warning(message).with_context(context));
    }

    /// The definition shape for `name` with `arity` type arguments.
    fn definition(&self, name: &str, arity: usize) -> Result<&'a TypeShape, GenerationError> {
        let qualified = QualifiedName::from(name);
        if let Some(shape) = self.catalog.get(&qualified.with_arity(arity)) {
            return Ok(shape);
        }
        let base = qualified.with_arity(0);
        match self
            .catalog
            .iter()
            .find(|shape| shape.name.with_arity(0) == base)
        {
            Some(shape) => Err(GenerationError::InvalidGenericArity {
                name: shape.name.to_string(),
                expected: shape.arity(),
                found: arity,
            }),
            None => Err(GenerationError::type_not_found(name)),
        }
    }

    /// Closed references for a type spec plus their capacity overrides.
    /// Duplicate tuples are dropped with a warning.
    fn closed_types(
        &mut self,
        name: &str,
        instantiations: &[GenericInstantiationSpec],
    ) -> Result<(&'a TypeShape, Vec<(TypeRef, Option<u32>)>), GenerationError> {
        let arity = instantiations.first().map_or(0, |i| i.args.len());
        let shape = self.definition(name, arity)?;
        if instantiations.is_empty() {
            return Ok((shape, vec![(TypeRef::named(shape.name.clone()), None)]));
        }

        let definition = shape.name.to_type_hash();
        let mut closed = Vec::new();
        for instantiation in instantiations {
            if instantiation.args.len() != shape.arity() {
                return Err(GenerationError::InvalidGenericArity {
                    name: shape.name.to_string(),
                    expected: shape.arity(),
                    found: instantiation.args.len(),
                });
            }
            let args = instantiation
                .args
                .iter()
                .map(|a| Self::parse(a))
                .collect::<Result<Vec<_>, _>>()?;
            let ty = TypeRef::generic_instance(shape.name.clone(), args.clone());
            if self
                .instantiations
                .instantiate_type(definition, &args)
                .is_duplicate()
            {
                self.warn(
                    "generic instantiation requested twice; bound once".to_string(),
                    ty.to_string(),
                );
                continue;
            }
            closed.push((ty, instantiation.capacity));
        }
        Ok((shape, closed))
    }

    fn claim(&mut self, ty: &TypeRef) -> Result<(), GenerationError> {
        if self.seen.insert(ty.clone()) {
            Ok(())
        } else {
            Err(GenerationError::DuplicateType {
                name: ty.to_string(),
            })
        }
    }

    fn exceptions(&self, names: &[String]) -> Result<Vec<QualifiedName>, GenerationError> {
        let exception = QualifiedName::from("System.Exception");
        names
            .iter()
            .map(|name| {
                let ty = Self::parse(name)?;
                self.catalog.resolve(&ty)?;
                if !self.catalog.is_subclass_of(&ty, &exception) {
                    return Err(GenerationError::UnsupportedType {
                        type_name: ty.to_string(),
                        signature: name.clone(),
                        reason: "declared exception does not derive from System.Exception"
                            .to_string(),
                    });
                }
                ty.definition_name()
                    .ok_or_else(|| GenerationError::type_not_found(name.clone()))
            })
            .collect()
    }

    /// Build a descriptor for a resolved method, constructor or delegate `Invoke`.
    fn build_member(
        &self,
        kind: MemberKind,
        owner: &TypeDescriptor,
        method: &MethodShape,
        subst: &GenericSubstitution,
        generic_args: Vec<TypeRef>,
    ) -> Result<MemberDescriptor, GenerationError> {
        let name = if kind.is_constructor() { "" } else { method.name.as_str() };
        let provisional = format!(
            "{}.{}({})",
            owner.full_name(),
            method.name,
            method.param_type_names().join(", ")
        );

        let mut member = MemberDescriptor::new(kind, owner.clone(), name);
        for param in &method.params {
            let ty = self.describe(&param.ty.substitute(subst))?;
            let mut descriptor = ParamDescriptor::new(param.name.clone(), ty).with_flags(param.flags);
            if let Some(default) = &param.default {
                if !default.is_supported_for(descriptor.ty.kind) {
                    return Err(unsupported_default(&provisional, &param.name, default));
                }
                descriptor = descriptor.with_default(default.clone());
            }
            member = member.with_param(descriptor);
        }

        let return_type = if kind.is_constructor() {
            owner.clone()
        } else {
            self.describe(&method.return_type.substitute(subst))?
        };
        member = member.with_return(return_type).with_generic_args(generic_args);
        if method.is_static() || matches!(kind, MemberKind::Operator(_)) {
            member = member.as_static();
        }
        if method.flags.is_overridable() {
            member = member.as_virtual();
        }
        Ok(member)
    }

    fn implicit_constructor(owner: &TypeDescriptor) -> MemberDescriptor {
        MemberDescriptor::new(MemberKind::Constructor, owner.clone(), "").with_return(owner.clone())
    }

    // =========================================================================
    // Types
    // =========================================================================

    fn scan_type(&mut self, spec: &TypeSpec) -> Result<Vec<ScannedType>, GenerationError> {
        let (shape, closed) = self.closed_types(&spec.name, &spec.instantiations)?;
        let mut out = Vec::with_capacity(closed.len());
        for (ty, capacity) in closed {
            self.claim(&ty)?;
            let descriptor = self.describe(&ty)?;
            let subst = TypeCatalog::substitution_for(shape, &ty);

            let mut members = Vec::new();
            for ctor in &spec.constructors {
                members.push(self.scan_constructor(shape, &ty, &descriptor, ctor)?);
            }
            for method in &spec.methods {
                members.extend(self.scan_method(&ty, &descriptor, method)?);
            }
            for property in &spec.properties {
                members.extend(self.scan_property(&ty, &descriptor, property)?);
            }
            for field in &spec.fields {
                members.extend(self.scan_field(&ty, &descriptor, field)?);
            }
            for event in &spec.events {
                members.extend(self.scan_event(&ty, &descriptor, event)?);
            }
            if matches!(descriptor.kind, TypeKind::Enum | TypeKind::FullValueType) {
                members.extend(self.boxing_members(&descriptor)?);
            }

            let fields = if descriptor.kind == TypeKind::FullValueType {
                shape
                    .instance_fields()
                    .map(|f| {
                        Ok(MirrorField {
                            name: f.name.clone(),
                            ty: self.describe(&f.ty.substitute(&subst))?,
                        })
                    })
                    .collect::<Result<Vec<_>, GenerationError>>()?
            } else {
                Vec::new()
            };

            out.push(ScannedType {
                capacity: capacity.or(spec.capacity).unwrap_or(self.default_capacity),
                descriptor,
                role: TypeRole::Exposed,
                members,
                fields,
                enum_values: shape.enum_values.clone(),
            });
        }
        Ok(out)
    }

    fn scan_constructor(
        &self,
        shape: &TypeShape,
        ty: &TypeRef,
        owner: &TypeDescriptor,
        spec: &ConstructorSpec,
    ) -> Result<MemberDescriptor, GenerationError> {
        let names = Self::normalize(&spec.params)?;
        let member = match self.catalog.find_constructor(ty, &names) {
            Some(resolved) => self.build_member(
                MemberKind::Constructor,
                owner,
                resolved.member,
                &resolved.substitution,
                Vec::new(),
            )?,
            None if names.is_empty() && shape.has_default_constructor() => {
                Self::implicit_constructor(owner)
            }
            None => {
                return Err(GenerationError::member_not_found(
                    ty.to_string(),
                    format!(".ctor({})", names.join(", ")),
                ));
            }
        };
        Ok(member.with_exceptions(self.exceptions(&spec.exceptions)?))
    }

    fn scan_method(
        &mut self,
        ty: &TypeRef,
        owner: &TypeDescriptor,
        spec: &MethodSpec,
    ) -> Result<Vec<MemberDescriptor>, GenerationError> {
        let names = Self::normalize(&spec.params)?;
        let signature = format!("{}({})", spec.name, names.join(", "));
        let resolved = self
            .catalog
            .find_method(ty, &spec.name, &names)
            .ok_or_else(|| GenerationError::member_not_found(ty.to_string(), signature.clone()))?;
        let method = resolved.member;
        let full_signature = format!("{ty}.{signature}");

        let kind = if Operator::is_operator_name(&method.name) {
            let op = Operator::from_method_name(&method.name).ok_or_else(|| {
                GenerationError::UnknownOperator {
                    signature: full_signature.clone(),
                }
            })?;
            let expected = op.arity().param_count();
            if method.params.len() != expected {
                return Err(GenerationError::UnsupportedOperatorArity {
                    signature: full_signature,
                    expected,
                    found: method.params.len(),
                });
            }
            MemberKind::Operator(op)
        } else {
            MemberKind::Method
        };
        let exceptions = self.exceptions(&spec.exceptions)?;

        let expected = method.generic_params.len();
        if expected == 0 {
            if let Some(first) = spec.instantiations.first() {
                return Err(GenerationError::InvalidGenericArity {
                    name: full_signature,
                    expected: 0,
                    found: first.len(),
                });
            }
            let member =
                self.build_member(kind, owner, method, &resolved.substitution, Vec::new())?;
            return Ok(vec![member.with_exceptions(exceptions)]);
        }

        if spec.instantiations.is_empty() {
            return Err(GenerationError::InvalidGenericArity {
                name: full_signature,
                expected,
                found: 0,
            });
        }
        let definition = TypeHash::from_name(&full_signature);
        let mut members = Vec::new();
        for args in &spec.instantiations {
            if args.len() != expected {
                return Err(GenerationError::InvalidGenericArity {
                    name: full_signature,
                    expected,
                    found: args.len(),
                });
            }
            let args = args
                .iter()
                .map(|a| Self::parse(a))
                .collect::<Result<Vec<_>, _>>()?;
            if self
                .instantiations
                .instantiate_method(definition, &args)
                .is_duplicate()
            {
                self.warn(
                    "generic method instantiation requested twice; bound once".to_string(),
                    full_signature.clone(),
                );
                continue;
            }
            let mut subst = resolved.substitution.clone();
            subst.extend(substitution_map(&method.generic_params, &args));
            let member = self.build_member(kind, owner, method, &subst, args)?;
            members.push(member.with_exceptions(exceptions.clone()));
        }
        Ok(members)
    }

    fn scan_property(
        &self,
        ty: &TypeRef,
        owner: &TypeDescriptor,
        spec: &PropertySpec,
    ) -> Result<Vec<MemberDescriptor>, GenerationError> {
        let resolved = self
            .catalog
            .find_property(ty, &spec.name)
            .ok_or_else(|| GenerationError::member_not_found(ty.to_string(), spec.name.clone()))?;
        let property = resolved.member;
        let value = self.describe(&property.ty.substitute(&resolved.substitution))?;
        let is_static = property.flags.contains(MethodFlags::STATIC);

        let mut members = Vec::new();
        if spec.get {
            if !property.has_getter {
                return Err(GenerationError::member_not_found(
                    ty.to_string(),
                    format!("get_{}()", spec.name),
                ));
            }
            members.push(
                MemberDescriptor::new(MemberKind::PropertyGet, owner.clone(), spec.name.clone())
                    .with_return(value.clone()),
            );
        }
        if spec.set {
            if !property.has_setter {
                return Err(GenerationError::member_not_found(
                    ty.to_string(),
                    format!("set_{}({})", spec.name, value.full_name()),
                ));
            }
            members.push(
                MemberDescriptor::new(MemberKind::PropertySet, owner.clone(), spec.name.clone())
                    .with_param(ParamDescriptor::new("value", value)),
            );
        }
        Ok(members
            .into_iter()
            .map(|m| {
                let m = if is_static { m.as_static() } else { m };
                if property.flags.is_overridable() { m.as_virtual() } else { m }
            })
            .collect())
    }

    fn scan_field(
        &mut self,
        ty: &TypeRef,
        owner: &TypeDescriptor,
        spec: &FieldSpec,
    ) -> Result<Vec<MemberDescriptor>, GenerationError> {
        let resolved = self
            .catalog
            .find_field(ty, &spec.name)
            .filter(|r| r.member.is_public)
            .ok_or_else(|| GenerationError::member_not_found(ty.to_string(), spec.name.clone()))?;
        let field = resolved.member;
        let value = self.describe(&field.ty.substitute(&resolved.substitution))?;

        let mut members = vec![
            MemberDescriptor::new(MemberKind::FieldGet, owner.clone(), spec.name.clone())
                .with_return(value.clone()),
        ];
        if field.is_readonly && !spec.read_only {
            self.warn(
                "field is read-only; setter not bound".to_string(),
                format!("{ty}.{}", spec.name),
            );
        } else if !spec.read_only {
            members.push(
                MemberDescriptor::new(MemberKind::FieldSet, owner.clone(), spec.name.clone())
                    .with_param(ParamDescriptor::new("value", value)),
            );
        }
        if field.is_static {
            members = members.into_iter().map(MemberDescriptor::as_static).collect();
        }
        Ok(members)
    }

    fn scan_event(
        &self,
        ty: &TypeRef,
        owner: &TypeDescriptor,
        spec: &EventSpec,
    ) -> Result<Vec<MemberDescriptor>, GenerationError> {
        let resolved = self
            .catalog
            .find_event(ty, &spec.name)
            .ok_or_else(|| GenerationError::member_not_found(ty.to_string(), spec.name.clone()))?;
        let event = resolved.member;
        let handler = self.describe(&event.handler.substitute(&resolved.substitution))?;
        let is_static = event.flags.contains(MethodFlags::STATIC);
        Ok([MemberKind::EventAdd, MemberKind::EventRemove]
            .into_iter()
            .map(|kind| {
                let member = MemberDescriptor::new(kind, owner.clone(), spec.name.clone())
                    .with_param(ParamDescriptor::new("handler", handler.clone()));
                if is_static { member.as_static() } else { member }
            })
            .collect())
    }

    // =========================================================================
    // Boxing, arrays, delegates
    // =========================================================================

    fn boxing_members(
        &self,
        value: &TypeDescriptor,
    ) -> Result<Vec<MemberDescriptor>, GenerationError> {
        let object = self.describe(&TypeRef::named("System.Object"))?;
        Ok(vec![
            MemberDescriptor::new(MemberKind::Box, value.clone(), "")
                .with_param(ParamDescriptor::new("value", value.clone()))
                .with_return(object.clone())
                .as_static(),
            MemberDescriptor::new(MemberKind::Unbox, value.clone(), "")
                .with_param(ParamDescriptor::new("obj", object))
                .with_return(value.clone())
                .as_static(),
        ])
    }

    fn scan_boxing(&mut self, name: &str) -> Result<Option<ScannedType>, GenerationError> {
        let ty = Self::parse(name)?;
        let descriptor = self.describe(&ty)?;
        if !matches!(
            descriptor.kind,
            TypeKind::Enum | TypeKind::Primitive | TypeKind::FullValueType
        ) {
            return Err(GenerationError::UnsupportedType {
                type_name: ty.to_string(),
                signature: format!("{ty}.Box"),
                reason: format!("only by-value types can be boxed, found {}", descriptor.kind),
            });
        }
        if self.seen.contains(&ty) {
            self.warn("boxing already bound; skipped".to_string(), ty.to_string());
            return Ok(None);
        }
        self.seen.insert(ty);
        Ok(Some(ScannedType {
            members: self.boxing_members(&descriptor)?,
            descriptor,
            role: TypeRole::Boxing,
            capacity: 0,
            fields: Vec::new(),
            enum_values: Vec::new(),
        }))
    }

    fn scan_array(&mut self, spec: &ArraySpec) -> Result<Option<ScannedType>, GenerationError> {
        if spec.rank == 0 || spec.rank > MAX_ARRAY_RANK {
            return Err(GenerationError::InvalidArrayRank {
                element: spec.element.clone(),
                rank: u32::from(spec.rank),
            });
        }
        let element = self.describe(&Self::parse(&spec.element)?)?;
        let array_ref = element.type_ref.clone().array_of(spec.rank);
        if self.seen.contains(&array_ref) {
            self.warn("array requested twice; bound once".to_string(), array_ref.to_string());
            return Ok(None);
        }
        self.seen.insert(array_ref.clone());
        let array = self.describe(&array_ref)?;
        let int = self.describe(&TypeRef::primitive(PrimitiveKind::Int32))?;

        let indices = |prefix: &str| -> Vec<ParamDescriptor> {
            (0..spec.rank)
                .map(|i| ParamDescriptor::new(format!("{prefix}{i}"), int.clone()))
                .collect()
        };

        let mut members = Vec::new();
        let mut ctor = MemberDescriptor::new(MemberKind::ArrayConstructor, array.clone(), "")
            .with_return(array.clone());
        ctor.params = indices("length");
        members.push(ctor);
        members.push(
            MemberDescriptor::new(MemberKind::ArrayLength, array.clone(), "").with_return(int.clone()),
        );
        if spec.rank > 1 {
            members.push(
                MemberDescriptor::new(MemberKind::ArrayGetLength, array.clone(), "")
                    .with_param(ParamDescriptor::new("dimension", int.clone()))
                    .with_return(int.clone()),
            );
        }
        let mut get = MemberDescriptor::new(MemberKind::ArrayGetItem, array.clone(), "")
            .with_return(element.clone());
        get.params = indices("index");
        members.push(get);
        let mut set = MemberDescriptor::new(MemberKind::ArraySetItem, array.clone(), "");
        set.params = indices("index");
        set.params.push(ParamDescriptor::new("value", element.clone()));
        members.push(set.with_return(TypeDescriptor::void()));

        Ok(Some(ScannedType {
            descriptor: array,
            role: TypeRole::Array {
                element,
                rank: spec.rank,
            },
            capacity: spec.capacity.unwrap_or(self.default_capacity),
            members,
            fields: Vec::new(),
            enum_values: Vec::new(),
        }))
    }

    fn scan_delegate(&mut self, spec: &DelegateSpec) -> Result<Vec<ScannedType>, GenerationError> {
        let (shape, closed) = self.closed_types(&spec.name, &spec.instantiations)?;
        if !shape.is_delegate() {
            return Err(GenerationError::UnsupportedType {
                type_name: shape.name.to_string(),
                signature: spec.name.clone(),
                reason: format!("expected a delegate, found {}", shape.flags.describe()),
            });
        }
        let invoke = shape.invoke.as_ref().ok_or_else(|| {
            GenerationError::member_not_found(shape.name.to_string(), "Invoke()")
        })?;

        let mut out = Vec::new();
        for (ty, capacity) in closed {
            self.claim(&ty)?;
            let descriptor = self.describe(&ty)?;
            let subst = TypeCatalog::substitution_for(shape, &ty);
            let mut invoke_member =
                self.build_member(MemberKind::DelegateInvoke, &descriptor, invoke, &subst, Vec::new())?;
            invoke_member.name = String::new();
            invoke_member.is_virtual = false;

            let combine = |kind| {
                MemberDescriptor::new(kind, descriptor.clone(), "")
                    .with_param(ParamDescriptor::new("other", descriptor.clone()))
                    .with_return(descriptor.clone())
            };
            let members = vec![
                invoke_member,
                combine(MemberKind::DelegateAdd),
                combine(MemberKind::DelegateRemove),
            ];
            out.push(ScannedType {
                capacity: capacity.or(spec.capacity).unwrap_or(self.default_capacity),
                descriptor,
                role: TypeRole::Delegate,
                members,
                fields: Vec::new(),
                enum_values: Vec::new(),
            });
        }
        Ok(out)
    }

    // =========================================================================
    // Base types
    // =========================================================================

    fn scan_base_type(&mut self, spec: &BaseTypeSpec) -> Result<ScannedBaseType, GenerationError> {
        let ty = Self::parse(&spec.name)?;
        let shape = self.catalog.resolve(&ty)?;
        if !shape.is_inheritable() {
            return Err(GenerationError::NotABaseType {
                name: ty.to_string(),
                reason: format!("{} cannot be subclassed", shape.flags.describe()),
            });
        }
        let base = self.describe(&ty)?;

        let stub_name = match &spec.stub {
            Some(stub) => QualifiedName::from(stub.as_str()),
            None => QualifiedName::new(
                format!("Base{}", shape.name.base_name()),
                shape.name.namespace.clone(),
            ),
        };
        let stub_ref = TypeRef::named(stub_name);
        self.claim(&stub_ref)?;
        let stub = TypeDescriptor::new(stub_ref, TypeKind::Reference);

        let mut constructors = Vec::new();
        if spec.constructors.is_empty() {
            if !shape.is_interface() && !shape.has_default_constructor() {
                return Err(GenerationError::MissingDefaultConstructor {
                    owner: ty.to_string(),
                });
            }
            constructors.push(Self::implicit_constructor(&stub));
        } else {
            for ctor in &spec.constructors {
                let names = Self::normalize(&ctor.params)?;
                let member = match self.catalog.find_constructor(&ty, &names) {
                    Some(resolved) => self.build_member(
                        MemberKind::Constructor,
                        &stub,
                        resolved.member,
                        &resolved.substitution,
                        Vec::new(),
                    )?,
                    None if names.is_empty() && (shape.is_interface() || shape.constructors.is_empty()) => {
                        Self::implicit_constructor(&stub)
                    }
                    None => {
                        return Err(GenerationError::member_not_found(
                            ty.to_string(),
                            format!(".ctor({})", names.join(", ")),
                        ));
                    }
                };
                constructors.push(member.with_exceptions(self.exceptions(&ctor.exceptions)?));
            }
        }

        let mut overrides = Vec::new();
        for entry in &spec.overrides {
            overrides.extend(self.scan_override(&ty, &base, entry)?);
        }

        Ok(ScannedBaseType {
            capacity: spec.capacity.unwrap_or(self.default_capacity),
            is_interface: shape.is_interface(),
            base,
            stub,
            constructors,
            overrides,
        })
    }

    fn scan_override(
        &self,
        ty: &TypeRef,
        base: &TypeDescriptor,
        spec: &OverrideSpec,
    ) -> Result<Vec<MemberDescriptor>, GenerationError> {
        match spec {
            OverrideSpec::Method { name, params } => {
                let names = Self::normalize(params)?;
                let signature = format!("{name}({})", names.join(", "));
                let resolved = self
                    .catalog
                    .find_method(ty, name, &names)
                    .ok_or_else(|| GenerationError::member_not_found(ty.to_string(), signature.clone()))?;
                if !resolved.member.flags.is_overridable() {
                    return Err(GenerationError::OverrideNotVirtual {
                        signature: format!("{ty}.{signature}"),
                    });
                }
                if !resolved.member.generic_params.is_empty() {
                    return Err(GenerationError::UnsupportedType {
                        type_name: resolved.member.generic_params.join(", "),
                        signature: format!("{ty}.{signature}"),
                        reason: "generic methods cannot be overridden across the boundary"
                            .to_string(),
                    });
                }
                let member = self.build_member(
                    MemberKind::Method,
                    base,
                    resolved.member,
                    &resolved.substitution,
                    Vec::new(),
                )?;
                Ok(vec![member])
            }
            OverrideSpec::Property { name } => {
                let property = PropertySpec::new(name);
                let resolved = self
                    .catalog
                    .find_property(ty, name)
                    .ok_or_else(|| GenerationError::member_not_found(ty.to_string(), name.clone()))?;
                if !resolved.member.flags.is_overridable() {
                    return Err(GenerationError::OverrideNotVirtual {
                        signature: format!("{ty}.{name}"),
                    });
                }
                let property = PropertySpec {
                    set: resolved.member.has_setter,
                    get: resolved.member.has_getter,
                    ..property
                };
                self.scan_property(ty, base, &property)
            }
        }
    }
}

fn unsupported_default(signature: &str, param: &str, value: &DefaultValue) -> GenerationError {
    GenerationError::UnsupportedDefaultValue {
        signature: signature.to_string(),
        param: param.to_string(),
        value: value.to_string(),
    }
}

/// Scan `spec` against `catalog`.
pub fn scan(
    catalog: &TypeCatalog,
    spec: &BindingSpec,
    default_capacity: u32,
) -> Result<ScanResult, GenerationError> {
    Scanner::new(catalog, default_capacity).scan(spec)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> TypeCatalog {
        let mut catalog = TypeCatalog::with_system_types();
        catalog
            .register(
                TypeShape::class("MyGame.Calc")
                    .constructor("()")
                    .unwrap()
                    .constructor("(int seed)")
                    .unwrap()
                    .method("int Add(int a, int b)")
                    .unwrap()
                    .method("float Add(float a, float b)")
                    .unwrap()
                    .method("static int Twice(int x = 2)")
                    .unwrap()
                    .method("T Echo<T>(T value)")
                    .unwrap()
                    .method("void Fail()")
                    .unwrap()
                    .property("int Total { get; set; }")
                    .unwrap()
                    .property("string Name { get; }")
                    .unwrap()
                    .field("public int Count")
                    .unwrap()
                    .field("public readonly int Id")
                    .unwrap()
                    .field("private object tag")
                    .unwrap()
                    .event("System.Action Changed")
                    .unwrap(),
            )
            .unwrap();
        catalog
            .register(
                TypeShape::value_type("MyGame.Vec2")
                    .field("public float X")
                    .unwrap()
                    .field("public float Y")
                    .unwrap()
                    .method("static MyGame.Vec2 op_Addition(MyGame.Vec2 a, MyGame.Vec2 b)")
                    .unwrap()
                    .method("static MyGame.Vec2 op_Nonsense(MyGame.Vec2 a)")
                    .unwrap()
                    .method("static MyGame.Vec2 op_UnaryNegation(MyGame.Vec2 a, MyGame.Vec2 b)")
                    .unwrap()
                    .method("static void Bad(MyGame.Vec2 v = default(MyGame.Vec2))")
                    .unwrap(),
            )
            .unwrap();
        catalog
            .register(
                TypeShape::class("MyGame.Behaviour")
                    .abstract_type()
                    .method("abstract void Update(float dt)")
                    .unwrap()
                    .method("void Plain()")
                    .unwrap()
                    .property("virtual string Label { get; set; }")
                    .unwrap(),
            )
            .unwrap();
        catalog
            .register(
                TypeShape::class("MyGame.NeedsArgs")
                    .constructor("(int x)")
                    .unwrap()
                    .method("virtual void Tick()")
                    .unwrap(),
            )
            .unwrap();
        catalog
            .register(
                TypeShape::generic_class("MyGame.Box", &["T"])
                    .constructor("()")
                    .unwrap()
                    .method("T Get()")
                    .unwrap()
                    .method("void Set(T value)")
                    .unwrap(),
            )
            .unwrap();
        catalog
            .register(
                TypeShape::generic_delegate("MyGame.Callback", &["T"])
                    .invoke("void Invoke(T value)")
                    .unwrap(),
            )
            .unwrap();
        catalog
            .register(TypeShape::class("MyGame.CalcException").base("System.Exception").unwrap())
            .unwrap();
        catalog
    }

    fn scan_spec(spec: BindingSpec) -> Result<ScanResult, GenerationError> {
        scan(&catalog(), &spec, 128)
    }

    #[test]
    fn resolves_overload_by_exact_param_names() {
        let result = scan_spec(
            BindingSpec::new().with_type(TypeSpec::new("MyGame.Calc").method("Add", &["float", "float"])),
        )
        .unwrap();
        let add = &result.types[0].members[0];
        assert_eq!(add.signature(), "MyGame.Calc.Add(System.Single, System.Single)");
        assert_eq!(add.return_type.type_ref, TypeRef::primitive(PrimitiveKind::Single));
    }

    #[test]
    fn missing_member_names_signature() {
        let err = scan_spec(
            BindingSpec::new().with_type(TypeSpec::new("MyGame.Calc").method("Add", &["int", "float"])),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "member not found: MyGame.Calc.Add(System.Int32, System.Single)"
        );
    }

    #[test]
    fn missing_type() {
        let err = scan_spec(BindingSpec::new().with_type(TypeSpec::new("MyGame.Nope"))).unwrap_err();
        assert!(matches!(err, GenerationError::TypeNotFound { .. }));
    }

    #[test]
    fn capacity_fallbacks() {
        let result = scan_spec(
            BindingSpec::new()
                .with_type(TypeSpec::new("MyGame.Calc").capacity(16))
                .with_type(
                    TypeSpec::new("MyGame.Box")
                        .capacity(32)
                        .instantiate(&["int"])
                        .instantiate_with(GenericInstantiationSpec::new(&["string"]).capacity(4)),
                ),
        )
        .unwrap();
        let capacities: Vec<u32> = result.types.iter().map(|t| t.capacity).collect();
        assert_eq!(capacities, vec![16, 32, 4]);

        let default = scan_spec(BindingSpec::new().with_type(TypeSpec::new("MyGame.Calc"))).unwrap();
        assert_eq!(default.types[0].capacity, 128);
    }

    #[test]
    fn generic_type_members_are_substituted() {
        let result = scan_spec(
            BindingSpec::new().with_type(
                TypeSpec::new("MyGame.Box")
                    .instantiate(&["int"])
                    .method("Get", &[])
                    .method("Set", &["T"]),
            ),
        )
        .unwrap();
        let ty = &result.types[0];
        assert_eq!(ty.descriptor.full_name(), "MyGame.Box<System.Int32>");
        assert_eq!(ty.members[0].return_type.kind, TypeKind::Primitive);
        assert_eq!(ty.members[1].params[0].ty.type_ref, TypeRef::primitive(PrimitiveKind::Int32));
    }

    #[test]
    fn duplicate_instantiation_warns_once() {
        let result = scan_spec(
            BindingSpec::new().with_type(
                TypeSpec::new("MyGame.Box")
                    .instantiate(&["int"])
                    .instantiate(&["System.Int32"]),
            ),
        )
        .unwrap();
        assert_eq!(result.types.len(), 1);
        assert_eq!(result.diagnostics.warning_count(), 1);
    }

    #[test]
    fn generic_without_instantiation_is_arity_error() {
        let err = scan_spec(BindingSpec::new().with_type(TypeSpec::new("MyGame.Box"))).unwrap_err();
        assert!(matches!(
            err,
            GenerationError::InvalidGenericArity { expected: 1, found: 0, .. }
        ));
    }

    #[test]
    fn generic_method_instantiations() {
        let result = scan_spec(
            BindingSpec::new().with_type(
                TypeSpec::new("MyGame.Calc").method_with(
                    MethodSpec::new("Echo", &["T"])
                        .instantiate(&["int"])
                        .instantiate(&["string"])
                        .instantiate(&["int"]),
                ),
            ),
        )
        .unwrap();
        let members = &result.types[0].members;
        assert_eq!(members.len(), 2);
        assert_eq!(members[1].generic_args, vec![TypeRef::named("System.String")]);
        assert_eq!(members[1].return_type.kind, TypeKind::Reference);
        assert!(result.diagnostics.has_warnings());

        let err = scan_spec(
            BindingSpec::new().with_type(TypeSpec::new("MyGame.Calc").method("Echo", &["T"])),
        )
        .unwrap_err();
        assert!(matches!(err, GenerationError::InvalidGenericArity { .. }));
    }

    #[test]
    fn operators() {
        let result = scan_spec(
            BindingSpec::new().with_type(
                TypeSpec::new("MyGame.Vec2").method("op_Addition", &["MyGame.Vec2", "MyGame.Vec2"]),
            ),
        )
        .unwrap();
        let ty = &result.types[0];
        assert_eq!(ty.descriptor.kind, TypeKind::FullValueType);
        assert_eq!(ty.members[0].kind, MemberKind::Operator(Operator::Addition));
        assert!(ty.members[0].is_static);
        // full value types also get boxing and a mirror layout
        assert!(ty.members.iter().any(|m| m.kind == MemberKind::Box));
        assert_eq!(ty.fields.len(), 2);

        let unknown = scan_spec(
            BindingSpec::new()
                .with_type(TypeSpec::new("MyGame.Vec2").method("op_Nonsense", &["MyGame.Vec2"])),
        )
        .unwrap_err();
        assert!(matches!(unknown, GenerationError::UnknownOperator { .. }));

        let arity = scan_spec(BindingSpec::new().with_type(
            TypeSpec::new("MyGame.Vec2").method("op_UnaryNegation", &["MyGame.Vec2", "MyGame.Vec2"]),
        ))
        .unwrap_err();
        assert!(matches!(
            arity,
            GenerationError::UnsupportedOperatorArity { expected: 1, found: 2, .. }
        ));
    }

    #[test]
    fn defaults() {
        let result = scan_spec(
            BindingSpec::new().with_type(TypeSpec::new("MyGame.Calc").method("Twice", &["int"])),
        )
        .unwrap();
        let twice = &result.types[0].members[0];
        assert!(twice.is_static);
        assert_eq!(twice.params[0].default, Some(DefaultValue::Int(2)));

        let err = scan_spec(
            BindingSpec::new().with_type(TypeSpec::new("MyGame.Vec2").method("Bad", &["MyGame.Vec2"])),
        )
        .unwrap_err();
        assert!(matches!(err, GenerationError::UnsupportedDefaultValue { .. }));
    }

    #[test]
    fn accessors() {
        let result = scan_spec(
            BindingSpec::new().with_type(
                TypeSpec::new("MyGame.Calc")
                    .property("Total")
                    .read_only_property("Name")
                    .field("Count")
                    .field("Id")
                    .event("Changed"),
            ),
        )
        .unwrap();
        let kinds: Vec<MemberKind> = result.types[0].members.iter().map(|m| m.kind).collect();
        assert_eq!(
            kinds,
            vec![
                MemberKind::PropertyGet,
                MemberKind::PropertySet,
                MemberKind::PropertyGet,
                MemberKind::FieldGet,
                MemberKind::FieldSet,
                MemberKind::FieldGet,
                MemberKind::EventAdd,
                MemberKind::EventRemove,
            ]
        );
        assert_eq!(result.diagnostics.warning_count(), 1);

        let setter = scan_spec(
            BindingSpec::new().with_type(TypeSpec::new("MyGame.Calc").property("Name")),
        )
        .unwrap_err();
        assert!(setter.to_string().contains("set_Name"));

        let private = scan_spec(
            BindingSpec::new().with_type(TypeSpec::new("MyGame.Calc").field("tag")),
        )
        .unwrap_err();
        assert!(matches!(private, GenerationError::MemberNotFound { .. }));
    }

    #[test]
    fn declared_exceptions() {
        let result = scan_spec(BindingSpec::new().with_type(
            TypeSpec::new("MyGame.Calc").method_with(MethodSpec::new("Fail", &[]).throws("MyGame.CalcException")),
        ))
        .unwrap();
        assert_eq!(
            result.types[0].members[0].exceptions,
            vec![QualifiedName::from("MyGame.CalcException")]
        );

        let err = scan_spec(BindingSpec::new().with_type(
            TypeSpec::new("MyGame.Calc").method_with(MethodSpec::new("Fail", &[]).throws("MyGame.Calc")),
        ))
        .unwrap_err();
        assert!(matches!(err, GenerationError::UnsupportedType { .. }));
    }

    #[test]
    fn arrays() {
        let result = scan_spec(BindingSpec::new().with_array("int", 1).with_array("float", 2)).unwrap();
        let one = &result.types[0];
        assert_eq!(one.members.len(), 4);
        assert_eq!(one.descriptor.kind, TypeKind::Reference);
        let two = &result.types[1];
        assert_eq!(two.members.len(), 5);
        assert_eq!(two.members[0].params.len(), 2);

        let err = scan_spec(BindingSpec::new().with_array("int", 33)).unwrap_err();
        assert!(matches!(err, GenerationError::InvalidArrayRank { rank: 33, .. }));
        assert!(scan_spec(BindingSpec::new().with_array("int", 0)).is_err());
    }

    #[test]
    fn delegates() {
        let result = scan_spec(
            BindingSpec::new().with_delegate(DelegateSpec::new("MyGame.Callback").instantiate(&["int"])),
        )
        .unwrap();
        let delegate = &result.types[0];
        assert_eq!(delegate.role, TypeRole::Delegate);
        let kinds: Vec<MemberKind> = delegate.members.iter().map(|m| m.kind).collect();
        assert_eq!(
            kinds,
            vec![MemberKind::DelegateInvoke, MemberKind::DelegateAdd, MemberKind::DelegateRemove]
        );
        assert_eq!(delegate.members[0].params[0].ty.kind, TypeKind::Primitive);

        let err = scan_spec(BindingSpec::new().with_delegate(DelegateSpec::new("MyGame.Calc"))).unwrap_err();
        assert!(matches!(err, GenerationError::UnsupportedType { .. }));
    }

    #[test]
    fn boxing_primitives() {
        let result = scan_spec(BindingSpec::new().with_boxing("int")).unwrap();
        assert_eq!(result.types[0].role, TypeRole::Boxing);
        assert_eq!(result.types[0].members.len(), 2);
        assert!(scan_spec(BindingSpec::new().with_boxing("MyGame.Calc")).is_err());
    }

    #[test]
    fn base_types() {
        let result = scan_spec(
            BindingSpec::new().with_base_type(
                BaseTypeSpec::new("MyGame.Behaviour")
                    .override_method("Update", &["float"])
                    .override_property("Label"),
            ),
        )
        .unwrap();
        let base = &result.base_types[0];
        assert_eq!(base.stub.full_name(), "MyGame.BaseBehaviour");
        assert_eq!(base.constructors.len(), 1);
        assert_eq!(base.overrides.len(), 3);
        assert!(base.overrides.iter().all(|o| o.is_virtual));
    }

    #[test]
    fn base_type_errors() {
        let plain = scan_spec(
            BindingSpec::new().with_base_type(BaseTypeSpec::new("MyGame.Behaviour").override_method("Plain", &[])),
        )
        .unwrap_err();
        assert!(matches!(plain, GenerationError::OverrideNotVirtual { .. }));

        let no_default = scan_spec(
            BindingSpec::new().with_base_type(BaseTypeSpec::new("MyGame.NeedsArgs").override_method("Tick", &[])),
        )
        .unwrap_err();
        assert!(matches!(no_default, GenerationError::MissingDefaultConstructor { .. }));

        let declared = scan_spec(
            BindingSpec::new().with_base_type(BaseTypeSpec::new("MyGame.NeedsArgs").constructor(&["int"])),
        )
        .unwrap();
        assert_eq!(declared.base_types[0].constructors[0].params.len(), 1);

        let sealed = scan_spec(BindingSpec::new().with_base_type(BaseTypeSpec::new("System.String"))).unwrap_err();
        assert!(matches!(sealed, GenerationError::NotABaseType { .. }));
    }

    #[test]
    fn duplicate_type_is_fatal() {
        let err = scan_spec(
            BindingSpec::new()
                .with_type(TypeSpec::new("MyGame.Calc"))
                .with_type(TypeSpec::new("MyGame.Calc")),
        )
        .unwrap_err();
        assert!(matches!(err, GenerationError::DuplicateType { .. }));
    }

    #[test]
    fn implicit_default_constructor() {
        let result = scan_spec(
            BindingSpec::new().with_type(TypeSpec::new("MyGame.Behaviour").constructor(&[])),
        )
        .unwrap();
        assert_eq!(result.types[0].members[0].kind, MemberKind::Constructor);
        let err = scan_spec(
            BindingSpec::new().with_type(TypeSpec::new("MyGame.NeedsArgs").constructor(&[])),
        )
        .unwrap_err();
        assert!(err.to_string().contains(".ctor()"));
    }
}
