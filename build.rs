// Build script: compile the quad shaders to SPIR-V with glslc

use std::path::Path;
use std::process::Command;

const SHADERS: [&str; 2] = ["shaders/quad.vert", "shaders/quad.frag"];

fn main() {
    for source in SHADERS {
        // Outputs land next to the sources, so watch files, not the directory
        println!("cargo:rerun-if-changed={}", source);
        compile_shader(Path::new(source));
    }
}

fn compile_shader(source: &Path) {
    let output = source.with_extension(format!(
        "{}.spv",
        source.extension().and_then(|e| e.to_str()).unwrap_or_default()
    ));

    match Command::new("glslc").arg(source).arg("-o").arg(&output).status() {
        Ok(status) if status.success() => {}
        Ok(status) => {
            panic!("glslc failed on {}: exit code {:?}", source.display(), status.code());
        }
        // Without glslc the binary reports the missing .spv at startup and
        // the GPU tests skip
        Err(e) => {
            println!("cargo:warning=glslc not available ({}), {} not compiled", e, source.display());
            println!(
                "cargo:warning=compile manually: glslc {} -o {}",
                source.display(),
                output.display()
            );
        }
    }
}
