use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use log::debug;

use crate::config::Config;
use crate::types::{CommandId, EnumId, FatalError, Registry, Type, Version};
use crate::widths::{module_widths, ColumnWidths};

/// Renders every configured output for a parsed registry: the global types
/// header, per-feature include/source pairs for the primary api, the
/// combined extensions pair when enabled, and the consumer-facing headers.
pub fn generate(registry: &Registry, config: &Config) -> Result<(), FatalError> {
    fs::create_dir_all(config.include_dir())?;
    fs::create_dir_all(config.source_dir())?;

    generate_types(registry, config)?;
    generate_features(registry, config)?;
    if config.emit_extensions {
        generate_extensions(registry, config)?;
    }
    generate_user_headers(registry, config)?;
    Ok(())
}

//--------------------------------------------------------------------------------------------------
/// One generated file. Headers carry an include guard derived from their
/// relative name; sources do not. The handle is buffered and closed on every
/// exit path by drop; [GeneratedFile::finish] flushes explicitly so write
/// errors surface instead of disappearing in drop.
struct GeneratedFile<'a> {
    out: BufWriter<File>,
    guard: Option<String>,
    config: &'a Config,
}

impl<'a> GeneratedFile<'a> {
    fn include(config: &'a Config, name: &str) -> Result<GeneratedFile<'a>, FatalError> {
        let guard = guard_name(&config.guard_prefix, name);
        GeneratedFile::open(config, config.include_dir().join(name), name, Some(guard))
    }

    fn source(config: &'a Config, name: &str) -> Result<GeneratedFile<'a>, FatalError> {
        GeneratedFile::open(config, config.source_dir().join(name), name, None)
    }

    fn open(
        config: &'a Config,
        path: PathBuf,
        name: &str,
        guard: Option<String>,
    ) -> Result<GeneratedFile<'a>, FatalError> {
        debug!("writing {}", path.display());
        let out = BufWriter::new(File::create(&path)?);
        let mut file = GeneratedFile { out, guard, config };
        write!(
            file,
            "/*\n{}\n-----------------------\nAutomatically generated. Do not edit.\n*/\n",
            name
        )?;
        Ok(file)
    }

    fn begin_guard(&mut self) -> io::Result<()> {
        match &self.guard {
            Some(guard) => write!(self.out, "#ifndef {}\n#define {}\n\n\n\n\n", guard, guard),
            None => Ok(()),
        }
    }

    fn begin_namespaces(&mut self) -> io::Result<()> {
        if !self.config.namespaces.is_empty() {
            for namespace in &self.config.namespaces {
                writeln!(self.out, "namespace {} {{", namespace)?;
            }
            writeln!(self.out)?;
        }
        Ok(())
    }

    fn end_namespaces(&mut self) -> io::Result<()> {
        if !self.config.namespaces.is_empty() {
            writeln!(self.out)?;
            for _ in &self.config.namespaces {
                writeln!(self.out, "}}")?;
            }
        }
        Ok(())
    }

    fn finish(mut self) -> io::Result<()> {
        if let Some(guard) = self.guard.take() {
            write!(self.out, "\n#endif //{}\n", guard)?;
        }
        self.out.flush()
    }
}

impl Write for GeneratedFile<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.out.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

fn guard_name(prefix: &str, relative: &str) -> String {
    format!("{}{}", prefix, relative.replace('.', "_").replace('/', "_")).to_uppercase()
}

//--------------------------------------------------------------------------------------------------
/// The global types header. Skipped when the registry defines no types at
/// all. Include-types go outside the namespace wrapper since their content
/// pulls platform headers in; everything else goes inside.
fn generate_types(registry: &Registry, config: &Config) -> Result<(), FatalError> {
    if registry.include_types.is_empty() && registry.types.is_empty() {
        return Ok(());
    }

    let name = config.include_name(&config.types_stem);
    let mut out = GeneratedFile::include(config, &name)?;
    out.begin_guard()?;

    write!(
        out,
        "//Defines\n\
         //GLAPI becomes APIENTRY on Windows, and disappears on other platforms\n\
         #ifdef _WIN32\n\
         #define GLAPI APIENTRY\n\
         #else\n\
         #define GLAPI\n\
         #endif\n\n\n\n\n"
    )?;

    if !registry.include_types.is_empty() {
        write!(out, "//Includes\n")?;
        for ty in &registry.include_types {
            write_type(&mut out, ty, config)?;
        }
        writeln!(out)?;
    }

    if !registry.types.is_empty() {
        out.begin_namespaces()?;
        write!(out, "//Types\n")?;
        for ty in &registry.types {
            write_type(&mut out, ty, config)?;
        }
        out.end_namespaces()?;
    }

    out.finish()?;
    Ok(())
}

fn write_type(out: &mut GeneratedFile, ty: &Type, config: &Config) -> io::Result<()> {
    if let Some(api) = &ty.api {
        if config.excluded_type_apis.iter().any(|excluded| excluded == api) {
            return Ok(());
        }
    }
    if let Some(comment) = &ty.comment {
        writeln!(out, "//{}", comment)?;
    }
    writeln!(out, "{}", ty.content)
}

//--------------------------------------------------------------------------------------------------
/// One include/source pair per primary-api feature, plus a removed pair for
/// features that have removed entries.
fn generate_features(registry: &Registry, config: &Config) -> Result<(), FatalError> {
    for &id in &registry.features {
        let feature = &registry[id];
        match feature.api_version() {
            Some((api, _)) if api == config.primary_api => {}
            _ => continue,
        }

        let widths = module_widths(registry, feature);

        let stem = format!("mod_{}", feature.name);
        write_module_include(
            registry,
            config,
            &config.include_name(&stem),
            &feature.core_enums,
            &feature.core_commands,
            widths.core,
        )?;
        write_module_source(
            registry,
            config,
            &config.source_name(&stem),
            &config.include_name(&stem),
            &feature.core_commands,
            &feature.core_load_function(),
            widths.core,
        )?;

        if feature.has_removed() {
            let stem = format!("mod_{}_rem", feature.name);
            write_module_include(
                registry,
                config,
                &config.include_name(&stem),
                &feature.removed_enums,
                &feature.removed_commands,
                widths.removed,
            )?;
            write_module_source(
                registry,
                config,
                &config.source_name(&stem),
                &config.include_name(&stem),
                &feature.removed_commands,
                &feature.removed_load_function(),
                widths.removed,
            )?;
        }
    }
    Ok(())
}

/// Enum defines, function-pointer typedefs and extern declarations for one
/// module list pair.
fn write_module_include(
    registry: &Registry,
    config: &Config,
    name: &str,
    enums: &[EnumId],
    commands: &[CommandId],
    widths: ColumnWidths,
) -> Result<(), FatalError> {
    let mut out = GeneratedFile::include(config, name)?;
    out.begin_guard()?;
    out.begin_namespaces()?;

    if !enums.is_empty() {
        write!(out, "//Enums\n")?;
        for &id in enums {
            let e = &registry[id];
            writeln!(out, "#define {:<width$} {}", e.name, e.value, width = widths.enum_name)?;
        }
        writeln!(out)?;
    }

    if !commands.is_empty() {
        write!(out, "//Prototypes\n")?;
        for &id in commands {
            write_prototype(&mut out, registry, id, widths)?;
        }
        write!(out, "\n//Declarations\n")?;
        for &id in commands {
            write_declaration(&mut out, registry, id, widths)?;
        }
    }

    out.end_namespaces()?;
    out.finish()?;
    Ok(())
}

fn write_prototype(
    out: &mut GeneratedFile,
    registry: &Registry,
    id: CommandId,
    widths: ColumnWidths,
) -> io::Result<()> {
    let command = &registry[id];
    writeln!(
        out,
        "typedef {:<rw$} (GLAPI *{:<pw$})({});",
        command.return_type,
        command.pointer_type_name,
        command.params.join(", "),
        rw = widths.return_type,
        pw = widths.pointer_type,
    )
}

fn write_declaration(
    out: &mut GeneratedFile,
    registry: &Registry,
    id: CommandId,
    widths: ColumnWidths,
) -> io::Result<()> {
    let command = &registry[id];
    writeln!(
        out,
        "extern {:<pw$} {};",
        command.pointer_type_name,
        command.name,
        pw = widths.pointer_type,
    )
}

/// Null-initialized pointer definitions plus the loading function for one
/// module list. A list with no commands needs no source file at all.
fn write_module_source(
    registry: &Registry,
    config: &Config,
    name: &str,
    include_name: &str,
    commands: &[CommandId],
    load_function: &str,
    widths: ColumnWidths,
) -> Result<(), FatalError> {
    if commands.is_empty() {
        return Ok(());
    }

    let mut out = GeneratedFile::source(config, name)?;
    write!(
        out,
        "\n\n\n\n\
         //Includes\n\
         #include <{project}/{types}>\n\
         #include <{project}/{include}>\n\n\n\n\n",
        project = config.project,
        types = config.include_name(&config.types_stem),
        include = include_name,
    )?;

    out.begin_namespaces()?;
    write!(
        out,
        "typedef void(*ProcAddress)();\n\
         extern ProcAddress getProcAddress( const char* name );\n\n"
    )?;

    write!(out, "//Definitions\n")?;
    for &id in commands {
        write_definition(&mut out, registry, id, widths)?;
    }

    write_loader(&mut out, registry, commands, load_function, widths)?;

    out.end_namespaces()?;
    out.finish()?;
    Ok(())
}

fn write_definition(
    out: &mut GeneratedFile,
    registry: &Registry,
    id: CommandId,
    widths: ColumnWidths,
) -> io::Result<()> {
    let command = &registry[id];
    writeln!(
        out,
        "{:<pw$} {:<nw$} = nullptr;",
        command.pointer_type_name,
        command.name,
        pw = widths.pointer_type,
        nw = widths.command_name,
    )
}

/// The loading function: resolves every command through the resolver
/// callback and returns how many lookups failed. Zero means full success;
/// it never raises.
fn write_loader(
    out: &mut GeneratedFile,
    registry: &Registry,
    commands: &[CommandId],
    load_function: &str,
    widths: ColumnWidths,
) -> io::Result<()> {
    write!(
        out,
        "\nint {}() {{\n    int fail = 0;\n\n    //Load Statements\n",
        load_function
    )?;
    for &id in commands {
        let command = &registry[id];
        let quoted = format!("\"{}\"", command.name);
        writeln!(
            out,
            "    if( !( {:<nw$} = ( {:<pw$} )getProcAddress( {:<qw$} ) ) ) ++fail;",
            command.name,
            command.pointer_type_name,
            quoted,
            nw = widths.command_name,
            pw = widths.pointer_type,
            qw = widths.command_name + 2,
        )?;
    }
    write!(out, "\n    return fail;\n}}\n")
}

//--------------------------------------------------------------------------------------------------
/// The combined extensions pair: every extension's declarations in one
/// include file, every extension loader in one source file. Not part of the
/// default generation pass; see [Config::emit_extensions].
fn generate_extensions(registry: &Registry, config: &Config) -> Result<(), FatalError> {
    let include_name = config.include_name(&config.extensions_stem);

    let mut out = GeneratedFile::include(config, &include_name)?;
    out.begin_guard()?;
    out.begin_namespaces()?;
    for &id in &registry.extensions {
        let extension = &registry[id];
        if extension.core_enums.is_empty() && extension.core_commands.is_empty() {
            continue;
        }
        let widths = module_widths(registry, extension).core;

        writeln!(out, "//{}", extension.name)?;
        if !extension.core_enums.is_empty() {
            write!(out, "//Enums\n")?;
            for &eid in &extension.core_enums {
                let e = &registry[eid];
                writeln!(out, "#define {:<width$} {}", e.name, e.value, width = widths.enum_name)?;
            }
            writeln!(out)?;
        }
        if !extension.core_commands.is_empty() {
            write!(out, "//Prototypes\n")?;
            for &cid in &extension.core_commands {
                write_prototype(&mut out, registry, cid, widths)?;
            }
            write!(out, "\n//Declarations\n")?;
            for &cid in &extension.core_commands {
                write_declaration(&mut out, registry, cid, widths)?;
            }
            writeln!(out)?;
        }
    }
    out.end_namespaces()?;
    out.finish()?;

    let mut out = GeneratedFile::source(config, &config.source_name(&config.extensions_stem))?;
    write!(
        out,
        "\n\n\n\n\
         //Includes\n\
         #include <{project}/{types}>\n\
         #include <{project}/{include}>\n\n\n\n\n",
        project = config.project,
        types = config.include_name(&config.types_stem),
        include = include_name,
    )?;
    out.begin_namespaces()?;
    write!(
        out,
        "typedef void(*ProcAddress)();\n\
         extern ProcAddress getProcAddress( const char* name );\n\n"
    )?;
    for &id in &registry.extensions {
        let extension = &registry[id];
        // No commands means nothing to load.
        if extension.core_commands.is_empty() {
            continue;
        }
        let widths = module_widths(registry, extension).core;

        write!(out, "//Extension: {}\n//Definitions\n", extension.name)?;
        for &cid in &extension.core_commands {
            write_definition(&mut out, registry, cid, widths)?;
        }
        write_loader(
            &mut out,
            registry,
            &extension.core_commands,
            &extension.core_load_function(),
            widths,
        )?;
        writeln!(out)?;
    }
    out.end_namespaces()?;
    out.finish()?;
    Ok(())
}

//--------------------------------------------------------------------------------------------------
/// Consumer-facing headers. A feature's header pulls in the core include of
/// every same-api feature up to and including its own version; the
/// compatibility variant also pulls in those features' removed includes.
fn generate_user_headers(registry: &Registry, config: &Config) -> Result<(), FatalError> {
    for &id in &registry.features {
        let feature = &registry[id];
        let (api, version) = match feature.api_version() {
            Some(pair) => pair,
            None => continue,
        };

        let core_name = config.include_name(&feature.name);
        if api == config.primary_api {
            if version < config.profile_split {
                // Contexts this old have not removed anything yet, so the
                // one header they get spans core and removed declarations.
                write_user_header(registry, config, &core_name, api, version, true)?;
            } else {
                write_user_header(registry, config, &core_name, api, version, false)?;
                let compat_name = config.include_name(&format!("{}_comp", feature.name));
                write_user_header(registry, config, &compat_name, api, version, true)?;
            }
        } else {
            write_user_header(registry, config, &core_name, api, version, true)?;
        }
    }
    Ok(())
}

fn write_user_header(
    registry: &Registry,
    config: &Config,
    name: &str,
    api: &str,
    version: Version,
    compatibility: bool,
) -> Result<(), FatalError> {
    let mut out = GeneratedFile::include(config, name)?;
    out.begin_guard()?;

    write!(
        out,
        "//Includes\n#include \"{}\"\n\n",
        config.include_name(&config.types_stem)
    )?;

    for &other_id in &registry.features {
        let other = &registry[other_id];
        let (other_api, other_version) = match other.api_version() {
            Some(pair) => pair,
            None => continue,
        };
        if other_api == api && other_version <= version {
            writeln!(
                out,
                "#include \"{}\"",
                config.include_name(&format!("mod_{}", other.name))
            )?;
            if compatibility && other.has_removed() {
                writeln!(
                    out,
                    "#include \"{}\"",
                    config.include_name(&format!("mod_{}_rem", other.name))
                )?;
            }
        }
    }

    out.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_names_mangle_dots_and_slashes() {
        assert_eq!(guard_name("GLGEN_", "gl_types.hpp"), "GLGEN_GL_TYPES_HPP");
        assert_eq!(guard_name("GLGEN_", "mod_gl_1_0.hpp"), "GLGEN_MOD_GL_1_0_HPP");
    }
}
