//! OpenGL shader backend over `glow`.
//!
//! The host owns the windowing and context setup; it hands the finished
//! `glow::Context` to [`GlowCompiler`], which only compiles and links.
//! User code is the fragment stage; a fixed full-screen-triangle vertex
//! stage is linked in front of it.
//!
//! GL objects are only valid on the thread that owns the context, so build
//! the compiler inside the worker's context factory.

use std::collections::HashMap;

use glow::HasContext;

use crate::context::shader::ShaderBackend;
use crate::context::ProgramHandle;

const FULLSCREEN_VERT: &str = "#version 330 core\n\
const vec2 verts[3] = vec2[](vec2(-1.0, -1.0), vec2(3.0, -1.0), vec2(-1.0, 3.0));\n\
void main() { gl_Position = vec4(verts[gl_VertexID], 0.0, 1.0); }\n";

/// Compiles user fragment shaders against a live OpenGL context.
pub struct GlowCompiler {
    gl: glow::Context,
    programs: HashMap<u32, glow::NativeProgram>,
    next_id: u32,
}

impl GlowCompiler {
    pub fn new(gl: glow::Context) -> Self {
        Self {
            gl,
            programs: HashMap::new(),
            next_id: 1,
        }
    }

    /// Native program for a handle, for the host's draw pass.
    pub fn native(&self, handle: ProgramHandle) -> Option<glow::NativeProgram> {
        self.programs.get(&handle.0).copied()
    }

    /// Compile one stage, returning the raw info log on failure.
    unsafe fn compile_stage(&self, kind: u32, src: &str) -> Result<glow::NativeShader, String> {
        let shader = self
            .gl
            .create_shader(kind)
            .map_err(|e| format!("create_shader failed: {e}"))?;
        self.gl.shader_source(shader, src);
        self.gl.compile_shader(shader);
        if !self.gl.get_shader_compile_status(shader) {
            let log = self.gl.get_shader_info_log(shader);
            self.gl.delete_shader(shader);
            return Err(log);
        }
        Ok(shader)
    }
}

impl ShaderBackend for GlowCompiler {
    fn compile(&mut self, source: &str) -> Result<ProgramHandle, String> {
        unsafe {
            let vs = self.compile_stage(glow::VERTEX_SHADER, FULLSCREEN_VERT)?;
            let fs = match self.compile_stage(glow::FRAGMENT_SHADER, source) {
                Ok(fs) => fs,
                Err(log) => {
                    self.gl.delete_shader(vs);
                    return Err(log);
                }
            };

            let program = self
                .gl
                .create_program()
                .map_err(|e| format!("create_program failed: {e}"))?;
            self.gl.attach_shader(program, vs);
            self.gl.attach_shader(program, fs);
            self.gl.link_program(program);

            self.gl.detach_shader(program, vs);
            self.gl.detach_shader(program, fs);
            self.gl.delete_shader(vs);
            self.gl.delete_shader(fs);

            if !self.gl.get_program_link_status(program) {
                let log = self.gl.get_program_info_log(program);
                self.gl.delete_program(program);
                return Err(log);
            }

            let id = self.next_id;
            self.next_id += 1;
            self.programs.insert(id, program);
            Ok(ProgramHandle(id))
        }
    }

    fn release(&mut self, handle: ProgramHandle) {
        if let Some(program) = self.programs.remove(&handle.0) {
            unsafe { self.gl.delete_program(program) };
        }
    }
}

impl Drop for GlowCompiler {
    fn drop(&mut self) {
        for (_, program) in self.programs.drain() {
            unsafe { self.gl.delete_program(program) };
        }
    }
}
