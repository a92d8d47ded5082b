//! Generation pipeline.
//!
//! A [`Generator`] runs scan, lowering and both renderers over one
//! [`BindingSpec`]:
//!
//! ```
//! use crossbind::{BindingSpec, Generator, TypeCatalog, TypeShape, TypeSpec};
//!
//! let mut catalog = TypeCatalog::with_system_types();
//! catalog.register(TypeShape::class("MyGame.Calc").method("int Add(int a, int b)")?)?;
//!
//! let spec = BindingSpec::new().with_type(TypeSpec::new("MyGame.Calc").method("Add", &["int", "int"]));
//! let bindings = Generator::new(&catalog).generate(&spec)?;
//!
//! assert!(bindings.managed.source.contains("MyGameCalcMethodAddSystemInt32SystemInt32"));
//! assert!(bindings.native.source.contains("pub fn add("));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Output is a pure function of the catalog, the binding spec and the options: the
//! same inputs always produce byte-identical text.

use crossbind_codegen::{
    BindingPlan, BindingSpec, ManagedRenderer, NativeRenderer, RenderOptions, Renderer, plan,
};
use crossbind_core::{Diagnostics, GenerationError};
use crossbind_registry::TypeCatalog;

/// Generation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorOptions {
    /// Namespace of the generated C# code.
    pub managed_namespace: String,
    /// Module name of the generated Rust code.
    pub native_module: String,
    /// Library name the C# side imports native exports from.
    pub library_name: String,
    /// Capacity of types the binding spec gives none.
    pub default_capacity: u32,
    pub emit_comments: bool,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        let render = RenderOptions::default();
        Self {
            managed_namespace: render.managed_namespace,
            native_module: render.native_module,
            library_name: render.library_name,
            default_capacity: 128,
            emit_comments: render.emit_comments,
        }
    }
}

impl GeneratorOptions {
    pub fn with_managed_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.managed_namespace = namespace.into();
        self
    }

    pub fn with_native_module(mut self, module: impl Into<String>) -> Self {
        self.native_module = module.into();
        self
    }

    pub fn with_library_name(mut self, library: impl Into<String>) -> Self {
        self.library_name = library.into();
        self
    }

    pub fn with_default_capacity(mut self, capacity: u32) -> Self {
        self.default_capacity = capacity;
        self
    }

    pub fn with_comments(mut self, emit: bool) -> Self {
        self.emit_comments = emit;
        self
    }

    fn render_options(&self) -> RenderOptions {
        RenderOptions {
            managed_namespace: self.managed_namespace.clone(),
            native_module: self.native_module.clone(),
            library_name: self.library_name.clone(),
            emit_comments: self.emit_comments,
        }
    }
}

/// One emitted source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub file_name: String,
    pub source: String,
}

/// Everything one generation run produces.
#[derive(Debug, Clone)]
pub struct GeneratedBindings {
    pub managed: GeneratedFile,
    pub native: GeneratedFile,
    /// The plan both files were rendered from; the hosted bridge runs it directly.
    pub plan: BindingPlan,
    /// Warnings from scan and lowering.
    pub diagnostics: Diagnostics,
}

/// Runs the generation pipeline against one catalog.
pub struct Generator<'a> {
    catalog: &'a TypeCatalog,
    options: GeneratorOptions,
}

impl<'a> Generator<'a> {
    pub fn new(catalog: &'a TypeCatalog) -> Self {
        Self {
            catalog,
            options: GeneratorOptions::default(),
        }
    }

    pub fn with_options(mut self, options: GeneratorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &GeneratorOptions {
        &self.options
    }

    /// Scan and lower only.
    ///
    /// # Errors
    ///
    /// The first spec entry that does not resolve, naming its full signature.
    pub fn plan(&self, spec: &BindingSpec) -> Result<BindingPlan, GenerationError> {
        plan(self.catalog, spec, self.options.default_capacity)
    }

    /// Scan, lower and render both targets.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn generate(&self, spec: &BindingSpec) -> Result<GeneratedBindings, GenerationError> {
        let plan = self.plan(spec)?;
        let render = self.options.render_options();
        let managed = render_file(&ManagedRenderer::new(render.clone()), &plan);
        let native = render_file(&NativeRenderer::new(render), &plan);
        Ok(GeneratedBindings {
            managed,
            native,
            diagnostics: plan.diagnostics.clone(),
            plan,
        })
    }
}

fn render_file(renderer: &dyn Renderer, plan: &BindingPlan) -> GeneratedFile {
    GeneratedFile {
        file_name: renderer.file_name(),
        source: renderer.render(plan),
    }
}
