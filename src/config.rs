use std::path::PathBuf;

use crate::types::Version;

/// The registry document end-to-end generation runs parse.
pub const GL_REGISTRY_FILE: &str = "xml/gl.xml";

/// (source url, destination path) pairs the fetch step downloads. The gl,
/// glx and wgl registries live in Khronos' OpenGL-Registry repository; egl
/// has its own.
pub const REGISTRY_SOURCES: &[(&str, &str)] = &[
    (
        "https://raw.githubusercontent.com/KhronosGroup/OpenGL-Registry/main/xml/gl.xml",
        "xml/gl.xml",
    ),
    (
        "https://raw.githubusercontent.com/KhronosGroup/OpenGL-Registry/main/xml/glx.xml",
        "xml/glx.xml",
    ),
    (
        "https://raw.githubusercontent.com/KhronosGroup/OpenGL-Registry/main/xml/wgl.xml",
        "xml/wgl.xml",
    ),
    (
        "https://raw.githubusercontent.com/KhronosGroup/EGL-Registry/main/api/egl.xml",
        "xml/egl.xml",
    ),
];

/// Generation settings. One value is built per run and passed through the
/// emitter and aggregator; [Config::default] carries the values end-to-end
/// runs use.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the generated header tree.
    pub include_root: PathBuf,
    /// Root of the generated source tree.
    pub source_root: PathBuf,
    /// Name of the generated loader library; becomes the subdirectory under
    /// both roots and the `#include` path prefix in generated sources.
    pub project: String,
    /// Namespace nest wrapped around generated declarations, outermost
    /// first.
    pub namespaces: Vec<String>,
    /// Prefix for generated include guards.
    pub guard_prefix: String,
    /// File extension of generated headers.
    pub include_ext: String,
    /// File extension of generated sources.
    pub source_ext: String,
    /// Stem of the global types file.
    pub types_stem: String,
    /// Stem of the combined extensions pair.
    pub extensions_stem: String,
    /// The api family per-feature files are generated for.
    pub primary_api: String,
    /// Type definitions tagged with one of these apis are skipped.
    pub excluded_type_apis: Vec<String>,
    /// First version of the primary api that splits functionality into core
    /// and compatibility profiles. Features below it get a single
    /// compatibility-inclusive user header; features at or above it get a
    /// core header plus a `_comp` variant.
    pub profile_split: Version,
    /// The combined extensions pair is a capability, not a default output.
    pub emit_extensions: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            include_root: PathBuf::from("include"),
            source_root: PathBuf::from("src"),
            project: String::from("glgen"),
            namespaces: vec![String::from("glgen")],
            guard_prefix: String::from("GLGEN_"),
            include_ext: String::from("hpp"),
            source_ext: String::from("cpp"),
            types_stem: String::from("gl_types"),
            extensions_stem: String::from("gl_ext"),
            primary_api: String::from("gl"),
            excluded_type_apis: vec![String::from("gles1"), String::from("gles2")],
            profile_split: Version::new(3, 1),
            emit_extensions: false,
        }
    }
}

impl Config {
    /// Directory generated headers are written to.
    pub fn include_dir(&self) -> PathBuf {
        self.include_root.join(&self.project)
    }

    /// Directory generated sources are written to.
    pub fn source_dir(&self) -> PathBuf {
        self.source_root.join(&self.project)
    }

    pub(crate) fn include_name(&self, stem: &str) -> String {
        format!("{}.{}", stem, self.include_ext)
    }

    pub(crate) fn source_name(&self, stem: &str) -> String {
        format!("{}.{}", stem, self.source_ext)
    }
}
