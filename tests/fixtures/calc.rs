//! Bindings shared by `build.rs`, which renders their native module, and
//! `generated_tests.rs`, which compiles and runs it.

use crossbind_codegen::{BaseTypeSpec, BindingPlan, BindingSpec, DelegateSpec, MethodSpec, TypeSpec};
use crossbind_registry::{TypeCatalog, TypeShape};

pub const MODULE: &str = "calc_bindings";
pub const CAPACITY: u32 = 128;

pub fn catalog() -> TypeCatalog {
    let mut catalog = TypeCatalog::with_system_types();
    catalog
        .register_all(vec![
            TypeShape::class("MyGame.Calc")
                .constructor("()")
                .unwrap()
                .method("int Add(int a, int b)")
                .unwrap()
                .method("bool TryHalve(int value, out int half)")
                .unwrap()
                .method("MyGame.Point Scale(MyGame.Point p, float k)")
                .unwrap()
                .method("void Fail()")
                .unwrap(),
            TypeShape::class("MyGame.CalcException")
                .base("System.Exception")
                .unwrap(),
            TypeShape::value_type("MyGame.Point")
                .field("public float X")
                .unwrap()
                .field("public float Y")
                .unwrap(),
            TypeShape::class("MyGame.Behaviour")
                .abstract_type()
                .method("abstract void Update(float dt)")
                .unwrap()
                .method("virtual int Score(int bonus)")
                .unwrap(),
            TypeShape::delegate("MyGame.Handler")
                .invoke("int Invoke(int x)")
                .unwrap(),
        ])
        .unwrap();
    catalog
}

pub fn spec() -> BindingSpec {
    BindingSpec::new()
        .with_type(
            TypeSpec::new("MyGame.Calc")
                .constructor(&[])
                .method("Add", &["int", "int"])
                .method("TryHalve", &["int", "int"])
                .method("Scale", &["MyGame.Point", "float"])
                .method_with(MethodSpec::new("Fail", &[]).throws("MyGame.CalcException")),
        )
        .with_type(TypeSpec::new("MyGame.Point").field("X").field("Y"))
        .with_base_type(
            BaseTypeSpec::new("MyGame.Behaviour")
                .override_method("Update", &["float"])
                .override_method("Score", &["int"]),
        )
        .with_delegate(DelegateSpec::new("MyGame.Handler"))
}

pub fn plan() -> BindingPlan {
    crossbind_codegen::plan(&catalog(), &spec(), CAPACITY).unwrap()
}
