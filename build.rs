use std::env;
use std::fs;
use std::path::PathBuf;

use crossbind_codegen::{NativeRenderer, RenderOptions, Renderer};

#[path = "tests/fixtures/calc.rs"]
mod fixture;

fn main() {
    println!("cargo:rerun-if-changed=tests/fixtures/calc.rs");

    // Render the fixture's native module so `generated_tests.rs` compiles it
    let renderer = NativeRenderer::new(RenderOptions {
        native_module: fixture::MODULE.to_string(),
        ..RenderOptions::default()
    });
    let source = renderer.render(&fixture::plan());

    // The module opens with inner attributes, so it is wrapped before inclusion
    let out_path = PathBuf::from(env::var("OUT_DIR").unwrap());
    fs::write(
        out_path.join(renderer.file_name()),
        format!("pub mod {} {{\n{source}}}\n", fixture::MODULE),
    )
    .expect("Couldn't write generated bindings!");
}
