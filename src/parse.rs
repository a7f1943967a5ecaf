use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use xml::reader::XmlEvent;

use crate::types::{Command, Diagnostic, FatalError, Module, ModuleId, Registry, Type, Version};
use crate::util::{consume_current_element, parse_inner_text, ParseCtx, XmlAttribute};

pub const BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Parses one registry document from disk.
pub fn parse_file(path: &Path) -> Result<(Registry, Vec<Diagnostic>), FatalError> {
    let file = BufReader::new(File::open(path)?);
    parse_stream(file)
}

/// Parses one registry document from an arbitrary reader. Returns the
/// registry together with the ownership diagnostics collected while
/// replaying require/remove blocks.
pub fn parse_stream<T: Read>(mut stream: T) -> Result<(Registry, Vec<Diagnostic>), FatalError> {
    let mut buffer = Vec::new();
    stream.read_to_end(&mut buffer)?;
    let body = buffer.strip_prefix(BOM).unwrap_or(&buffer);

    let events = xml::reader::ParserConfig::new()
        .create_reader(body)
        .into_iter();
    let mut ctx = ParseCtx {
        events,
        xpath: String::new(),
        diagnostics: Vec::new(),
    };
    let registry = parse_document(&mut ctx)?;
    Ok((registry, ctx.diagnostics))
}

fn parse_document<R: Read>(ctx: &mut ParseCtx<R>) -> Result<Registry, FatalError> {
    loop {
        let event = match ctx.events.next() {
            Some(event) => event?,
            None => return Err(FatalError::MissingRegistryElement),
        };
        match event {
            XmlEvent::StartElement { name, .. } => {
                let name = name.local_name;
                ctx.push_element(&name);
                return if name == "registry" {
                    parse_registry(ctx)
                } else {
                    Err(FatalError::UnexpectedRoot { name })
                };
            }
            XmlEvent::EndDocument => return Err(FatalError::MissingRegistryElement),
            _ => {}
        }
    }
}

fn parse_registry<R: Read>(ctx: &mut ParseCtx<R>) -> Result<Registry, FatalError> {
    let mut registry = Registry::new();

    match_elements! {ctx, attributes,
        "comment" => registry.comments.push(parse_inner_text(ctx)?),
        "types" => parse_types(ctx, &mut registry, attributes)?,
        "enums" => parse_enums(ctx, &mut registry, attributes)?,
        "commands" => parse_commands(ctx, &mut registry, attributes)?,
        "feature" => parse_feature(ctx, &mut registry, attributes)?,
        "extensions" => parse_extensions(ctx, &mut registry, attributes)?,
        "groups" => consume_current_element(ctx)?,
        "kinds" => consume_current_element(ctx)?,
    }

    Ok(registry)
}

fn parse_types<R: Read>(
    ctx: &mut ParseCtx<R>,
    registry: &mut Registry,
    attributes: Vec<XmlAttribute>,
) -> Result<(), FatalError> {
    match_attributes! {ctx, a in attributes,
        "comment" => {},
    }

    match_elements! {ctx, attributes,
        "type" => {
            let mut name = None;
            let mut comment = None;
            let mut api = None;
            match_attributes! {ctx, a in attributes,
                "name"     => name    = Some(a.value),
                "comment"  => comment = Some(a.value),
                "api"      => api     = Some(a.value),
                "requires" => {},
            }
            let content = parse_inner_text(ctx)?;
            registry.add_type(Type { content, name, comment, api });
        },
    }

    Ok(())
}

fn parse_enums<R: Read>(
    ctx: &mut ParseCtx<R>,
    registry: &mut Registry,
    attributes: Vec<XmlAttribute>,
) -> Result<(), FatalError> {
    match_attributes! {ctx, a in attributes,
        "namespace" => {},
        "group"     => {},
        "type"      => {},
        "start"     => {},
        "end"       => {},
        "vendor"    => {},
        "comment"   => {},
    }

    match_elements! {ctx, attributes,
        "enum" => {
            let mut name = None;
            let mut value = None;
            match_attributes! {ctx, a in attributes,
                "name"    => name  = Some(a.value),
                "value"   => value = Some(a.value),
                "group"   => {},
                "alias"   => {},
                "type"    => {},
                "api"     => {},
                "comment" => {},
            }
            let name = require_attribute!(ctx, name);
            let value = require_attribute!(ctx, value);
            consume_current_element(ctx)?;
            registry.add_enum(name, value);
        },
        "unused" => consume_current_element(ctx)?,
    }

    Ok(())
}

fn parse_commands<R: Read>(
    ctx: &mut ParseCtx<R>,
    registry: &mut Registry,
    attributes: Vec<XmlAttribute>,
) -> Result<(), FatalError> {
    match_attributes! {ctx, a in attributes,
        "namespace" => {},
    }

    match_elements! {ctx, attributes,
        "command" => parse_command(ctx, registry, attributes)?,
    }

    Ok(())
}

fn parse_command<R: Read>(
    ctx: &mut ParseCtx<R>,
    registry: &mut Registry,
    attributes: Vec<XmlAttribute>,
) -> Result<(), FatalError> {
    match_attributes! {ctx, a in attributes,
        "comment" => {},
    }

    let mut proto = None;
    let mut params = Vec::new();

    match_elements! {ctx, attributes,
        "proto" => {
            match_attributes! {ctx, a in attributes,
                "group" => {},
            }
            proto = Some(parse_proto(ctx)?);
        },
        "param" => {
            match_attributes! {ctx, a in attributes,
                "group" => {},
                "class" => {},
                "len"   => {},
            }
            params.push(parse_inner_text(ctx)?.trim().to_string());
        },
        "alias" => {
            match_attributes! {ctx, a in attributes,
                "name" => {},
            }
            consume_current_element(ctx)?;
        },
        "glx" => {
            match_attributes! {ctx, a in attributes,
                "type"    => {},
                "opcode"  => {},
                "name"    => {},
                "comment" => {},
            }
            consume_current_element(ctx)?;
        },
        "vecequiv" => {
            match_attributes! {ctx, a in attributes,
                "name" => {},
            }
            consume_current_element(ctx)?;
        },
    }

    let (return_type, name) = match proto {
        Some(parts) => parts,
        None => {
            return Err(FatalError::MissingElement {
                xpath: ctx.xpath.clone(),
                name: String::from("proto"),
            });
        }
    };
    registry.add_command(Command::new(return_type, name, params));
    Ok(())
}

/// Splits a `proto` element into a return type and a command name. All text
/// before the `name` subelement, nested markup included, forms the return
/// type; `name` must be the last subelement and its inner text must be
/// non-empty.
fn parse_proto<R: Read>(ctx: &mut ParseCtx<R>) -> Result<(String, String), FatalError> {
    let xpath = ctx.xpath.clone();
    let mut return_type = String::new();
    let mut name: Option<String> = None;

    loop {
        let event = match ctx.events.next() {
            Some(event) => event?,
            None => break,
        };
        match event {
            XmlEvent::StartElement { name: tag, .. } => {
                let tag = tag.local_name;
                ctx.push_element(&tag);
                if name.is_some() {
                    return Err(FatalError::ElementAfterName {
                        xpath: ctx.xpath.clone(),
                        name: tag,
                    });
                }
                if tag == "name" {
                    name = Some(parse_inner_text(ctx)?);
                } else {
                    // Nested return-type markup, e.g. <ptype>.
                    return_type.push_str(&parse_inner_text(ctx)?);
                }
            }
            XmlEvent::Characters(text) | XmlEvent::Whitespace(text) | XmlEvent::CData(text) => {
                if name.is_none() {
                    return_type.push_str(&text);
                }
            }
            XmlEvent::EndElement { .. } => {
                ctx.pop_element();
                break;
            }
            _ => {}
        }
    }

    let return_type = return_type.trim();
    if return_type.is_empty() {
        return Err(FatalError::MissingReturnType { xpath });
    }
    match name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()) {
        Some(name) => Ok((return_type.to_string(), name)),
        None => Err(FatalError::MissingElement {
            xpath,
            name: String::from("name"),
        }),
    }
}

fn parse_feature<R: Read>(
    ctx: &mut ParseCtx<R>,
    registry: &mut Registry,
    attributes: Vec<XmlAttribute>,
) -> Result<(), FatalError> {
    let mut api = None;
    let mut number = None;
    match_attributes! {ctx, a in attributes,
        "api"    => api    = Some(a.value),
        "number" => number = Some(a.value),
        "name"   => {},
    }
    let api = require_attribute!(ctx, api);
    let number = require_attribute!(ctx, number);

    let version: Version = number.parse()?;
    let module = registry.add_module(Module::feature(&api, version));
    parse_module_items(ctx, registry, module)?;
    registry.features.push(module);
    Ok(())
}

fn parse_extensions<R: Read>(
    ctx: &mut ParseCtx<R>,
    registry: &mut Registry,
    attributes: Vec<XmlAttribute>,
) -> Result<(), FatalError> {
    match_attributes! {ctx, a in attributes,
        "comment" => {},
    }

    match_elements! {ctx, attributes,
        "extension" => {
            let mut name = None;
            let mut supported = None;
            match_attributes! {ctx, a in attributes,
                "name"      => name      = Some(a.value),
                "supported" => supported = Some(a.value),
                "comment"   => {},
            }
            let name = require_attribute!(ctx, name);
            let supported = require_attribute!(ctx, supported);

            let apis = supported.split('|').map(String::from).collect();
            let module = registry.add_module(Module::extension(name, apis));
            parse_module_items(ctx, registry, module)?;
            registry.extensions.push(module);
        },
    }

    registry.sort_extensions();
    Ok(())
}

#[derive(Clone, Copy)]
enum ItemAction {
    Require,
    Remove,
}

/// Replays the require/remove blocks of a feature or extension against the
/// entity tables.
fn parse_module_items<R: Read>(
    ctx: &mut ParseCtx<R>,
    registry: &mut Registry,
    module: ModuleId,
) -> Result<(), FatalError> {
    match_elements! {ctx, attributes,
        "require" => parse_interface_items(ctx, registry, module, ItemAction::Require, attributes)?,
        "remove"  => parse_interface_items(ctx, registry, module, ItemAction::Remove, attributes)?,
    }
    Ok(())
}

fn parse_interface_items<R: Read>(
    ctx: &mut ParseCtx<R>,
    registry: &mut Registry,
    module: ModuleId,
    action: ItemAction,
    attributes: Vec<XmlAttribute>,
) -> Result<(), FatalError> {
    match_attributes! {ctx, a in attributes,
        "comment" => {},
        "profile" => {},
        "api"     => {},
    }

    match_elements! {ctx, attributes,
        "enum" => {
            let name = parse_name_reference(ctx, attributes)?;
            let id = match registry.lookup_enum(&name) {
                Some(id) => id,
                None => {
                    return Err(FatalError::UnknownEnum {
                        xpath: ctx.xpath.clone(),
                        name,
                    });
                }
            };
            let diagnostic = match action {
                ItemAction::Require => registry.require_enum(id, module),
                ItemAction::Remove => registry.remove_enum(id, module),
            };
            ctx.diagnostics.extend(diagnostic);
        },
        "command" => {
            let name = parse_name_reference(ctx, attributes)?;
            let id = match registry.lookup_command(&name) {
                Some(id) => id,
                None => {
                    return Err(FatalError::UnknownCommand {
                        xpath: ctx.xpath.clone(),
                        name,
                    });
                }
            };
            let diagnostic = match action {
                ItemAction::Require => registry.require_command(id, module),
                ItemAction::Remove => registry.remove_command(id, module),
            };
            ctx.diagnostics.extend(diagnostic);
        },
        // Types are never owned by modules.
        "type" => {
            parse_name_reference(ctx, attributes)?;
        },
    }

    Ok(())
}

/// Reads the `name` attribute off a reference element (`<enum name=.../>`
/// and friends) and skips the rest of it.
fn parse_name_reference<R: Read>(
    ctx: &mut ParseCtx<R>,
    attributes: Vec<XmlAttribute>,
) -> Result<String, FatalError> {
    let mut name = None;
    match_attributes! {ctx, a in attributes,
        "name"    => name = Some(a.value),
        "comment" => {},
    }
    let name = require_attribute!(ctx, name);
    consume_current_element(ctx)?;
    Ok(name)
}
