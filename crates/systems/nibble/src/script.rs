//! Guest runtime contract and the runtime registry.
//!
//! A guest runtime hosts one scripting language. The machine picks a runtime
//! for a cart from its `script:` metadata tag, calls [`ScriptRuntime::init`]
//! once, then drives `tick` every frame and the raster hooks during the blit.
//! Every call receives the [`Core`] explicitly; runtimes keep no handle to it.

use thiserror::Error;

use crate::machine::Core;

/// Raster and menu hooks a runtime exported from the loaded program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HookSet {
    pub scanline: bool,
    pub border: bool,
    pub overline: bool,
    pub menu: bool,
}

/// A named item in a program outline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineItem {
    /// Byte offset of the name in the code.
    pub pos: usize,
    pub name: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("{0}")]
    Compile(String),
    #[error("'{0}' isn't found :(")]
    MissingEntry(String),
    #[error("{0}")]
    Runtime(String),
}

/// A scripting language able to run cart code.
pub trait ScriptRuntime {
    /// Names accepted in the `script:` tag; the first is the display name.
    fn names(&self) -> &[&str];

    /// Single-line comment prefix, used to find metadata tags.
    fn single_comment(&self) -> &str;

    /// Compile and start `code`. On failure nothing is bound.
    fn init(&mut self, core: &mut Core, code: &str) -> Result<HookSet, ScriptError>;

    /// Release interpreter state. Calling it twice is harmless.
    fn close(&mut self, core: &mut Core);

    /// Run one frame of the program.
    fn tick(&mut self, core: &mut Core);

    fn scanline(&mut self, _core: &mut Core, _row: i32) {}

    fn border(&mut self, _core: &mut Core, _row: i32) {}

    fn overline(&mut self, _core: &mut Core) {}

    fn menu(&mut self, _core: &mut Core, _index: i32) {}

    /// Evaluate a snippet in the running program's context.
    fn eval(&mut self, _core: &mut Core, _code: &str) {}

    /// Named definitions in `code`, for editor navigation.
    fn outline(&self, _code: &str) -> Vec<OutlineItem> {
        Vec::new()
    }
}

/// Ordered set of available runtimes.
#[derive(Default)]
pub struct ScriptRegistry {
    runtimes: Vec<Box<dyn ScriptRuntime>>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a runtime and return its index. The first runtime is the fallback.
    pub fn register(&mut self, runtime: Box<dyn ScriptRuntime>) -> usize {
        self.runtimes.push(runtime);
        self.runtimes.len() - 1
    }

    pub fn len(&self) -> usize {
        self.runtimes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runtimes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&dyn ScriptRuntime> {
        self.runtimes.get(index).map(|r| r.as_ref())
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut (dyn ScriptRuntime + 'static)> {
        self.runtimes.get_mut(index).map(|r| r.as_mut())
    }

    /// Runtime for `code`: the first whose names contain the value of its own
    /// `script:` tag, else runtime 0. `None` when nothing is registered.
    pub fn select(&self, code: &str) -> Option<usize> {
        if self.runtimes.is_empty() {
            return None;
        }
        let found = self.runtimes.iter().position(|r| {
            metatag(code, "script", r.single_comment())
                .is_some_and(|name| r.names().contains(&name.as_str()))
        });
        Some(found.unwrap_or(0))
    }
}

/// Value of a `<comment> <tag>: value` line, trimmed. The line must end with
/// a newline.
pub fn metatag(code: &str, tag: &str, comment: &str) -> Option<String> {
    let key = format!("{comment} {tag}:");
    let start = code.find(&key)? + key.len();
    let rest = &code[start..];
    let end = rest.find('\n')?;
    Some(rest[..end].trim().to_string())
}

/// Longest save id kept from the `saveid:` tag, in bytes.
pub const SAVE_ID_LEN: usize = 63;

/// Save id from the `saveid:` tag, cut to [`SAVE_ID_LEN`] bytes on a char boundary.
pub fn save_id(code: &str, comment: &str) -> String {
    let mut id = metatag(code, "saveid", comment).unwrap_or_default();
    let mut len = id.len().min(SAVE_ID_LEN);
    while !id.is_char_boundary(len) {
        len -= 1;
    }
    id.truncate(len);
    id
}
