//! GLSL interface scanning.
//!
//! Extracts the externally visible interface of a shader stage -- version
//! directive, `in`/`out` variables, uniforms -- and reports structural errors
//! in the driver log format (`ERROR: 0:<line>: <message>`). This is pure
//! string processing: it does not type-check function bodies.
//!
//! The interface is used to link stages in the software backend and to check
//! a vertex layout against the vertex shader's declared inputs on every
//! backend.

use std::fmt;

use crate::error::RenderError;
use crate::vertex::VertexLayout;

/// The GLSL types that may appear in a stage interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlslType {
    Float,
    Int,
    Vec2,
    Vec3,
    Vec4,
    Mat3,
    Mat4,
    Sampler2D,
}

impl GlslType {
    fn parse(word: &str) -> Option<Self> {
        Some(match word {
            "float" => GlslType::Float,
            "int" => GlslType::Int,
            "vec2" => GlslType::Vec2,
            "vec3" => GlslType::Vec3,
            "vec4" => GlslType::Vec4,
            "mat3" => GlslType::Mat3,
            "mat4" => GlslType::Mat4,
            "sampler2D" => GlslType::Sampler2D,
            _ => return None,
        })
    }

    /// Scalar components fed by one vertex attribute of this type.
    pub fn components(self) -> u32 {
        match self {
            GlslType::Float | GlslType::Int | GlslType::Sampler2D => 1,
            GlslType::Vec2 => 2,
            GlslType::Vec3 => 3,
            GlslType::Vec4 => 4,
            GlslType::Mat3 => 9,
            GlslType::Mat4 => 16,
        }
    }
}

impl fmt::Display for GlslType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GlslType::Float => "float",
            GlslType::Int => "int",
            GlslType::Vec2 => "vec2",
            GlslType::Vec3 => "vec3",
            GlslType::Vec4 => "vec4",
            GlslType::Mat3 => "mat3",
            GlslType::Mat4 => "mat4",
            GlslType::Sampler2D => "sampler2D",
        };
        f.write_str(name)
    }
}

/// One global `in`, `out`, or `uniform` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    /// Explicit `layout(location = N)`, if present.
    pub location: Option<u32>,
    pub ty: GlslType,
    pub name: String,
    /// 1-based source line.
    pub line: usize,
}

/// A compiler diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub line: usize,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ERROR: 0:{}: {}", self.line, self.message)
    }
}

/// Joins diagnostics into a driver-style info log.
pub fn diagnostics_log(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// The interface of one successfully scanned shader stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderInterface {
    pub version: String,
    pub inputs: Vec<Declaration>,
    pub outputs: Vec<Declaration>,
    pub uniforms: Vec<Declaration>,
}

impl ShaderInterface {
    pub fn uniform(&self, name: &str) -> Option<&Declaration> {
        self.uniforms.iter().find(|d| d.name == name)
    }

    pub fn input(&self, name: &str) -> Option<&Declaration> {
        self.inputs.iter().find(|d| d.name == name)
    }

    pub fn input_at(&self, location: u32) -> Option<&Declaration> {
        self.inputs.iter().find(|d| d.location == Some(location))
    }

    /// Checks that `layout` feeds exactly the inputs this vertex stage declares.
    ///
    /// Every input needs an explicit location backed by an attribute with the
    /// same component count, and every attribute must land on a declared input.
    pub fn check_vertex_layout(&self, layout: &VertexLayout) -> Result<(), RenderError> {
        for input in &self.inputs {
            let Some(location) = input.location else {
                return Err(RenderError::LayoutMismatch(format!(
                    "vertex input '{}' has no explicit location",
                    input.name
                )));
            };
            let attr = layout.attribute(location).ok_or_else(|| {
                RenderError::LayoutMismatch(format!(
                    "vertex input '{}' at location {location} has no attribute",
                    input.name
                ))
            })?;
            if attr.components != input.ty.components() {
                return Err(RenderError::LayoutMismatch(format!(
                    "vertex input '{}' is {} but location {location} supplies {} components",
                    input.name, input.ty, attr.components
                )));
            }
        }
        for attr in layout.attributes() {
            if self.input_at(attr.index).is_none() {
                return Err(RenderError::LayoutMismatch(format!(
                    "attribute at location {} feeds no vertex input",
                    attr.index
                )));
            }
        }
        Ok(())
    }
}

/// Checks that a vertex and fragment interface can be linked.
///
/// Returns the link log on failure.
pub fn check_link(vertex: &ShaderInterface, fragment: &ShaderInterface) -> Result<(), String> {
    let mut errors = Vec::new();

    for input in &fragment.inputs {
        match vertex.outputs.iter().find(|o| o.name == input.name) {
            None => errors.push(format!(
                "error: fragment input '{}' is not written by the vertex shader",
                input.name
            )),
            Some(out) if out.ty != input.ty => errors.push(format!(
                "error: '{}' is {} in the vertex shader but {} in the fragment shader",
                input.name, out.ty, input.ty
            )),
            Some(_) => {}
        }
    }

    for uniform in &fragment.uniforms {
        let clash = vertex
            .uniform(&uniform.name)
            .filter(|other| other.ty != uniform.ty);
        if let Some(other) = clash {
            errors.push(format!(
                "error: uniform '{}' declared as {} and {}",
                uniform.name, other.ty, uniform.ty
            ));
        }
    }

    let color_outputs = fragment
        .outputs
        .iter()
        .filter(|o| o.ty == GlslType::Vec4)
        .count();
    if color_outputs != 1 {
        errors.push(format!(
            "error: fragment shader must write exactly one vec4 output, found {color_outputs}"
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("\n"))
    }
}

/// Scans one shader stage.
///
/// Returns every diagnostic found, not just the first.
pub fn scan(source: &str) -> Result<ShaderInterface, Vec<Diagnostic>> {
    let mut diagnostics = Vec::new();
    let stripped = strip_comments(source);

    let mut interface = ShaderInterface::default();
    let mut body = String::with_capacity(stripped.len());
    let mut seen_code = false;

    for (i, line) in stripped.lines().enumerate() {
        let trimmed = line.trim();
        if let Some(directive) = trimmed.strip_prefix('#') {
            let directive = directive.trim();
            if let Some(version) = directive.strip_prefix("version") {
                if seen_code || !interface.version.is_empty() {
                    diagnostics.push(Diagnostic {
                        line: i + 1,
                        message: "#version must occur before any other statement".into(),
                    });
                } else {
                    interface.version = version.trim().to_string();
                }
            }
            body.push('\n');
            continue;
        }
        if !trimmed.is_empty() {
            if interface.version.is_empty() && !seen_code {
                diagnostics.push(Diagnostic {
                    line: i + 1,
                    message: "missing #version directive".into(),
                });
            }
            seen_code = true;
        }
        body.push_str(line);
        body.push('\n');
    }

    if !seen_code {
        diagnostics.push(Diagnostic {
            line: 1,
            message: "empty shader source".into(),
        });
        return Err(diagnostics);
    }

    let mut has_main = false;
    for statement in top_level_statements(&body, &mut diagnostics) {
        match statement {
            Statement::FunctionHeader { text, line } => {
                let tokens = tokenize(&text);
                let is_main = matches!(
                    tokens.as_slice(),
                    [ret, name, open, close] if ret == "void" && name == "main" && open == "(" && close == ")"
                ) || matches!(
                    tokens.as_slice(),
                    [ret, name, open, arg, close]
                        if ret == "void" && name == "main" && open == "(" && arg == "void" && close == ")"
                );
                if is_main {
                    if has_main {
                        diagnostics.push(Diagnostic {
                            line,
                            message: "function 'main' redefined".into(),
                        });
                    }
                    has_main = true;
                }
            }
            Statement::Declaration { text, line } => {
                classify_declaration(&text, line, &mut interface, &mut diagnostics);
            }
        }
    }

    if !has_main {
        diagnostics.push(Diagnostic {
            line: body.lines().count().max(1),
            message: "missing entry point 'void main()'".into(),
        });
    }

    if diagnostics.is_empty() {
        Ok(interface)
    } else {
        Err(diagnostics)
    }
}

/// Replaces comments with spaces, keeping newlines so line numbers survive.
fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('/', Some('/')) => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                    }
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

enum Statement {
    FunctionHeader { text: String, line: usize },
    Declaration { text: String, line: usize },
}

/// Splits source into global declarations and function headers, skipping
/// function bodies and checking bracket balance.
fn top_level_statements(body: &str, diagnostics: &mut Vec<Diagnostic>) -> Vec<Statement> {
    let mut statements = Vec::new();
    let mut braces: Vec<usize> = Vec::new();
    let mut parens: Vec<usize> = Vec::new();
    let mut current = String::new();
    let mut start_line = 1;
    let mut line = 1;

    for c in body.chars() {
        if c == '\n' {
            line += 1;
        }
        match c {
            '{' => {
                if braces.is_empty() {
                    let text = current.trim().to_string();
                    if text.is_empty() {
                        diagnostics.push(Diagnostic {
                            line,
                            message: "unexpected '{'".into(),
                        });
                    } else {
                        statements.push(Statement::FunctionHeader {
                            text,
                            line: start_line,
                        });
                    }
                    current.clear();
                }
                braces.push(line);
            }
            '}' => {
                if braces.pop().is_none() {
                    diagnostics.push(Diagnostic {
                        line,
                        message: "unexpected '}'".into(),
                    });
                }
            }
            '(' => {
                parens.push(line);
                if braces.is_empty() {
                    current.push(c);
                }
            }
            ')' => {
                if parens.pop().is_none() {
                    diagnostics.push(Diagnostic {
                        line,
                        message: "unexpected ')'".into(),
                    });
                }
                if braces.is_empty() {
                    current.push(c);
                }
            }
            ';' if braces.is_empty() => {
                let text = current.trim().to_string();
                if !text.is_empty() {
                    statements.push(Statement::Declaration {
                        text,
                        line: start_line,
                    });
                }
                current.clear();
            }
            _ if braces.is_empty() => {
                if current.trim().is_empty() && !c.is_whitespace() {
                    start_line = line;
                }
                current.push(c);
            }
            _ => {}
        }
    }

    if let Some(open) = braces.last() {
        diagnostics.push(Diagnostic {
            line,
            message: format!("unexpected end of file: '{{' opened on line {open} is never closed"),
        });
    }
    if let Some(open) = parens.last() {
        diagnostics.push(Diagnostic {
            line,
            message: format!("unexpected end of file: '(' opened on line {open} is never closed"),
        });
    }
    if braces.is_empty() && !current.trim().is_empty() {
        diagnostics.push(Diagnostic {
            line,
            message: format!("syntax error: missing ';' after '{}'", current.trim()),
        });
    }

    statements
}

fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    for c in text.chars() {
        if c.is_alphanumeric() || c == '_' || c == '.' {
            word.push(c);
            continue;
        }
        if !word.is_empty() {
            tokens.push(std::mem::take(&mut word));
        }
        if !c.is_whitespace() {
            tokens.push(c.to_string());
        }
    }
    if !word.is_empty() {
        tokens.push(word);
    }
    tokens
}

const SKIPPED_QUALIFIERS: [&str; 6] = ["highp", "mediump", "lowp", "flat", "smooth", "noperspective"];

fn classify_declaration(
    text: &str,
    line: usize,
    interface: &mut ShaderInterface,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let tokens = tokenize(text);
    let mut rest: &[String] = &tokens;

    match rest.first().map(String::as_str) {
        Some("precision") | Some("const") => return,
        _ => {}
    }

    let mut location = None;
    if rest.first().map(String::as_str) == Some("layout") {
        match rest {
            [_, open, key, eq, value, close, tail @ ..]
                if open == "(" && key == "location" && eq == "=" && close == ")" =>
            {
                match value.parse::<u32>() {
                    Ok(v) => location = Some(v),
                    Err(_) => {
                        diagnostics.push(Diagnostic {
                            line,
                            message: format!("invalid location '{value}'"),
                        });
                        return;
                    }
                }
                rest = tail;
            }
            _ => {
                diagnostics.push(Diagnostic {
                    line,
                    message: format!("unsupported layout qualifier in '{text}'"),
                });
                return;
            }
        }
    }

    let words: Vec<&str> = rest
        .iter()
        .map(String::as_str)
        .filter(|w| !SKIPPED_QUALIFIERS.contains(w))
        .collect();

    let [storage, ty, name] = words.as_slice() else {
        diagnostics.push(Diagnostic {
            line,
            message: format!("syntax error: unexpected global declaration '{text}'"),
        });
        return;
    };

    let Some(ty) = GlslType::parse(ty) else {
        diagnostics.push(Diagnostic {
            line,
            message: format!("'{ty}' : unknown type"),
        });
        return;
    };

    if !is_identifier(name) {
        diagnostics.push(Diagnostic {
            line,
            message: format!("'{name}' : invalid identifier"),
        });
        return;
    }

    let decl = Declaration {
        location,
        ty,
        name: name.to_string(),
        line,
    };
    let target = match *storage {
        "in" => &mut interface.inputs,
        "out" => &mut interface.outputs,
        "uniform" => &mut interface.uniforms,
        other => {
            diagnostics.push(Diagnostic {
                line,
                message: format!("'{other}' : unsupported storage qualifier"),
            });
            return;
        }
    };
    if target.iter().any(|d| d.name == decl.name) {
        diagnostics.push(Diagnostic {
            line,
            message: format!("'{}' : redefinition", decl.name),
        });
        return;
    }
    target.push(decl);
}

fn is_identifier(word: &str) -> bool {
    let mut chars = word.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
