use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::ops::Index;
use std::str::FromStr;

use thiserror::Error;

#[cfg(feature = "serialize")]
use serde_derive::{Deserialize, Serialize};

/// Errors from which a run cannot recover. Parsing aborts on the first one;
/// nothing is generated from a partially parsed registry.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FatalError {
    #[error("no registry element in document")]
    MissingRegistryElement,
    #[error("expected root element \"registry\", found \"{name}\"")]
    UnexpectedRoot { name: String },
    #[error("unrecognized element \"{name}\" at {xpath}")]
    UnexpectedElement { xpath: String, name: String },
    #[error("unrecognized attribute \"{name}\" at {xpath}")]
    UnexpectedAttribute { xpath: String, name: String },
    #[error("missing attribute \"{name}\" at {xpath}")]
    MissingAttribute { xpath: String, name: String },
    #[error("missing element \"{name}\" at {xpath}")]
    MissingElement { xpath: String, name: String },
    #[error("element \"{name}\" after <name> at {xpath}")]
    ElementAfterName { xpath: String, name: String },
    #[error("empty return type at {xpath}")]
    MissingReturnType { xpath: String },
    #[error("malformed version \"{text}\", expected \"major.minor\"")]
    MalformedVersion { text: String },
    #[error("unknown enum \"{name}\" referenced at {xpath}")]
    UnknownEnum { xpath: String, name: String },
    #[error("unknown command \"{name}\" referenced at {xpath}")]
    UnknownCommand { xpath: String, name: String },
    #[error("fetching {url} failed with status {status}")]
    FetchStatus { url: String, status: i32 },
    #[error("fetching {url} failed: {source}")]
    Fetch {
        url: String,
        #[source]
        source: minreq::Error,
    },
    #[error(transparent)]
    Xml(#[from] xml::reader::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Ownership conflicts noticed while replaying require/remove blocks. These
/// never abort a run; the conflicting operation is skipped and the entity
/// keeps its existing ownership state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum Diagnostic {
    #[error("{module} requires {name}, which {owner} already owns")]
    AlreadyRequired {
        module: String,
        name: String,
        owner: String,
    },
    #[error("{module} removes {name}, which no module owns")]
    RemovedUnowned { module: String, name: String },
    #[error("{module} removes {name}, which {owner} already removed")]
    AlreadyRemoved {
        module: String,
        name: String,
        owner: String,
    },
}

/// A released version of an api family, ordered by major then minor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct Version {
    pub major: u32,
    pub minor: u32,
}

impl Version {
    pub fn new(major: u32, minor: u32) -> Version {
        Version { major, minor }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for Version {
    type Err = FatalError;

    /// Accepts exactly `major.minor`.
    fn from_str(text: &str) -> Result<Version, FatalError> {
        let malformed = || FatalError::MalformedVersion {
            text: String::from(text),
        };
        let (major, minor) = text.split_once('.').ok_or_else(malformed)?;
        Ok(Version {
            major: major.parse().map_err(|_| malformed())?,
            minor: minor.parse().map_err(|_| malformed())?,
        })
    }
}

/// A verbatim type definition fragment from the `types` section.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct Type {
    /// The reconstructed code inside the `type` element.
    pub content: String,
    pub name: Option<String>,
    pub comment: Option<String>,
    /// Restricts the definition to one api variant when present.
    pub api: Option<String>,
}

impl Type {
    /// Definitions that pull in a platform header must be emitted outside
    /// the namespace wrapper, since the pulled-in header declares symbols at
    /// global scope.
    pub fn is_include(&self) -> bool {
        self.content.contains("#include")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct EnumId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct CommandId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct ModuleId(usize);

/// Ownership state of an enum or command. The only transitions are
/// `Unowned -> Owned` (first require wins) and `Owned -> Removed` (the
/// removed entity stays attached to its original owner); everything else is
/// skipped with a [Diagnostic].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum Ownership {
    Unowned,
    Owned(ModuleId),
    Removed(ModuleId),
}

impl Ownership {
    pub fn owner(&self) -> Option<ModuleId> {
        match *self {
            Ownership::Unowned => None,
            Ownership::Owned(module) | Ownership::Removed(module) => Some(module),
        }
    }
}

/// A named enumerant, e.g. `GL_TEXTURE_2D`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct Enum {
    pub name: String,
    /// Literal value text, emitted verbatim.
    pub value: String,
    pub owner: Ownership,
}

/// An api entry point, e.g. `glBindTexture`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct Command {
    pub return_type: String,
    pub name: String,
    /// Raw parameter declarations in call order.
    pub params: Vec<String>,
    /// Generated function-pointer type alias, `PFN` + uppercased name + `PROC`.
    pub pointer_type_name: String,
    pub owner: Ownership,
}

impl Command {
    pub fn new(return_type: String, name: String, params: Vec<String>) -> Command {
        let pointer_type_name = format!("PFN{}PROC", name.to_uppercase());
        Command {
            return_type,
            name,
            params,
            pointer_type_name,
            owner: Ownership::Unowned,
        }
    }
}

/// What distinguishes a feature from an extension.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum ModuleKind {
    /// One released version of an api family.
    Feature { api: String, version: Version },
    /// Named optional functionality usable by one or more api families.
    Extension { apis: BTreeSet<String> },
}

/// An ownership container: a feature or an extension that can claim
/// ("require") or relinquish ("remove") enums and commands.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct Module {
    pub name: String,
    pub kind: ModuleKind,
    pub core_enums: Vec<EnumId>,
    pub core_commands: Vec<CommandId>,
    pub removed_enums: Vec<EnumId>,
    pub removed_commands: Vec<CommandId>,
}

impl Module {
    pub fn feature(api: &str, version: Version) -> Module {
        Module {
            name: format!("{}_{}_{}", api, version.major, version.minor),
            kind: ModuleKind::Feature {
                api: String::from(api),
                version,
            },
            core_enums: Vec::new(),
            core_commands: Vec::new(),
            removed_enums: Vec::new(),
            removed_commands: Vec::new(),
        }
    }

    pub fn extension(name: String, apis: BTreeSet<String>) -> Module {
        Module {
            name,
            kind: ModuleKind::Extension { apis },
            core_enums: Vec::new(),
            core_commands: Vec::new(),
            removed_enums: Vec::new(),
            removed_commands: Vec::new(),
        }
    }

    /// Api family and version, for features only.
    pub fn api_version(&self) -> Option<(&str, Version)> {
        match &self.kind {
            ModuleKind::Feature { api, version } => Some((api, *version)),
            ModuleKind::Extension { .. } => None,
        }
    }

    pub fn has_removed(&self) -> bool {
        !self.removed_enums.is_empty() || !self.removed_commands.is_empty()
    }

    pub fn core_load_function(&self) -> String {
        format!("load_mod_{}", self.name)
    }

    pub fn removed_load_function(&self) -> String {
        format!("load_mod_{}_rem", self.name)
    }
}

/// Everything parsed out of one registry document.
///
/// Entities live in arenas and are referenced by id everywhere else, so the
/// entity -> owner and module -> entity links cannot dangle and a name-table
/// overwrite never disturbs entities that were already required under the
/// old definition.
#[derive(Debug, Default, Clone)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct Registry {
    /// Type definitions that perform a platform `#include`.
    pub include_types: Vec<Type>,
    /// All other type definitions.
    pub types: Vec<Type>,
    /// Informational `comment` elements, in document order.
    pub comments: Vec<String>,
    /// Features in document order, assumed ascending by version per api.
    pub features: Vec<ModuleId>,
    /// Extensions, sorted alphabetically by name.
    pub extensions: Vec<ModuleId>,
    enums: Vec<Enum>,
    commands: Vec<Command>,
    enum_names: HashMap<String, EnumId>,
    command_names: HashMap<String, CommandId>,
    modules: Vec<Module>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    pub fn add_type(&mut self, ty: Type) {
        if ty.is_include() {
            self.include_types.push(ty);
        } else {
            self.types.push(ty);
        }
    }

    /// A later definition with the same name takes over the table slot; the
    /// earlier object keeps its identity and any ownership it acquired.
    pub fn add_enum(&mut self, name: String, value: String) -> EnumId {
        let id = EnumId(self.enums.len());
        self.enums.push(Enum {
            name: name.clone(),
            value,
            owner: Ownership::Unowned,
        });
        self.enum_names.insert(name, id);
        id
    }

    /// Same last-wins rule as [Registry::add_enum].
    pub fn add_command(&mut self, command: Command) -> CommandId {
        let id = CommandId(self.commands.len());
        self.command_names.insert(command.name.clone(), id);
        self.commands.push(command);
        id
    }

    pub fn add_module(&mut self, module: Module) -> ModuleId {
        let id = ModuleId(self.modules.len());
        self.modules.push(module);
        id
    }

    pub fn lookup_enum(&self, name: &str) -> Option<EnumId> {
        self.enum_names.get(name).copied()
    }

    pub fn lookup_command(&self, name: &str) -> Option<CommandId> {
        self.command_names.get(name).copied()
    }

    /// Distinct enum names in the table.
    pub fn enum_count(&self) -> usize {
        self.enum_names.len()
    }

    /// Distinct command names in the table.
    pub fn command_count(&self) -> usize {
        self.command_names.len()
    }

    /// First requirer becomes the owner; any later require is skipped.
    pub fn require_enum(&mut self, id: EnumId, module: ModuleId) -> Option<Diagnostic> {
        match self.enums[id.0].owner {
            Ownership::Unowned => {
                self.enums[id.0].owner = Ownership::Owned(module);
                self.modules[module.0].core_enums.push(id);
                None
            }
            Ownership::Owned(owner) | Ownership::Removed(owner) => {
                Some(Diagnostic::AlreadyRequired {
                    module: self.modules[module.0].name.clone(),
                    name: self.enums[id.0].name.clone(),
                    owner: self.modules[owner.0].name.clone(),
                })
            }
        }
    }

    pub fn require_command(&mut self, id: CommandId, module: ModuleId) -> Option<Diagnostic> {
        match self.commands[id.0].owner {
            Ownership::Unowned => {
                self.commands[id.0].owner = Ownership::Owned(module);
                self.modules[module.0].core_commands.push(id);
                None
            }
            Ownership::Owned(owner) | Ownership::Removed(owner) => {
                Some(Diagnostic::AlreadyRequired {
                    module: self.modules[module.0].name.clone(),
                    name: self.commands[id.0].name.clone(),
                    owner: self.modules[owner.0].name.clone(),
                })
            }
        }
    }

    /// Moves an owned entity from its owner's core list to the same owner's
    /// removed list. The remover and the owner need not be the same module.
    pub fn remove_enum(&mut self, id: EnumId, module: ModuleId) -> Option<Diagnostic> {
        match self.enums[id.0].owner {
            Ownership::Owned(owner) => {
                let lists = &mut self.modules[owner.0];
                lists.core_enums.retain(|&other| other != id);
                lists.removed_enums.push(id);
                self.enums[id.0].owner = Ownership::Removed(owner);
                None
            }
            Ownership::Unowned => Some(Diagnostic::RemovedUnowned {
                module: self.modules[module.0].name.clone(),
                name: self.enums[id.0].name.clone(),
            }),
            Ownership::Removed(owner) => Some(Diagnostic::AlreadyRemoved {
                module: self.modules[module.0].name.clone(),
                name: self.enums[id.0].name.clone(),
                owner: self.modules[owner.0].name.clone(),
            }),
        }
    }

    pub fn remove_command(&mut self, id: CommandId, module: ModuleId) -> Option<Diagnostic> {
        match self.commands[id.0].owner {
            Ownership::Owned(owner) => {
                let lists = &mut self.modules[owner.0];
                lists.core_commands.retain(|&other| other != id);
                lists.removed_commands.push(id);
                self.commands[id.0].owner = Ownership::Removed(owner);
                None
            }
            Ownership::Unowned => Some(Diagnostic::RemovedUnowned {
                module: self.modules[module.0].name.clone(),
                name: self.commands[id.0].name.clone(),
            }),
            Ownership::Removed(owner) => Some(Diagnostic::AlreadyRemoved {
                module: self.modules[module.0].name.clone(),
                name: self.commands[id.0].name.clone(),
                owner: self.modules[owner.0].name.clone(),
            }),
        }
    }

    pub fn sort_extensions(&mut self) {
        let modules = &self.modules;
        self.extensions
            .sort_by(|a, b| modules[a.0].name.cmp(&modules[b.0].name));
    }
}

impl Index<EnumId> for Registry {
    type Output = Enum;

    fn index(&self, id: EnumId) -> &Enum {
        &self.enums[id.0]
    }
}

impl Index<CommandId> for Registry {
    type Output = Command;

    fn index(&self, id: CommandId) -> &Command {
        &self.commands[id.0]
    }
}

impl Index<ModuleId> for Registry {
    type Output = Module;

    fn index(&self, id: ModuleId) -> &Module {
        &self.modules[id.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_ordering_matches_tuple_ordering() {
        assert!(Version::new(3, 1) > Version::new(3, 0));
        assert!(Version::new(3, 0) < Version::new(3, 1));
        assert!(Version::new(4, 0) >= Version::new(4, 0));
        assert!(Version::new(4, 0) <= Version::new(4, 0));
        assert!(Version::new(2, 9) < Version::new(3, 0));
        assert_eq!(Version::new(1, 5), Version::new(1, 5));
        assert_ne!(Version::new(1, 5), Version::new(5, 1));
    }

    #[test]
    fn version_parses_major_dot_minor() {
        let version: Version = "4.6".parse().unwrap();
        assert_eq!(version, Version::new(4, 6));
        assert_eq!(version.to_string(), "4.6");
    }

    #[test]
    fn version_rejects_other_shapes() {
        for text in ["4", "4.", ".6", "4.6.1", "a.b", "-1.0", ""] {
            match text.parse::<Version>() {
                Err(FatalError::MalformedVersion { text: reported }) => {
                    assert_eq!(reported, text);
                }
                other => panic!("expected malformed version for {:?}, got {:?}", text, other),
            }
        }
    }

    #[test]
    fn pointer_type_name_derivation() {
        let command = Command::new(String::from("void"), String::from("glFoo"), Vec::new());
        assert_eq!(command.pointer_type_name, "PFNGLFOOPROC");
    }

    #[test]
    fn feature_name_synthesis() {
        let feature = Module::feature("gl", Version::new(4, 5));
        assert_eq!(feature.name, "gl_4_5");
        assert_eq!(feature.core_load_function(), "load_mod_gl_4_5");
        assert_eq!(feature.removed_load_function(), "load_mod_gl_4_5_rem");
    }

    #[test]
    fn first_requirer_wins() {
        let mut registry = Registry::new();
        let id = registry.add_enum(String::from("FOO"), String::from("0x1"));
        let first = registry.add_module(Module::feature("gl", Version::new(1, 0)));
        let second = registry.add_module(Module::feature("gl", Version::new(1, 1)));

        assert_eq!(registry.require_enum(id, first), None);
        let diagnostic = registry.require_enum(id, second).unwrap();
        assert_eq!(
            diagnostic,
            Diagnostic::AlreadyRequired {
                module: String::from("gl_1_1"),
                name: String::from("FOO"),
                owner: String::from("gl_1_0"),
            }
        );

        assert_eq!(registry[id].owner, Ownership::Owned(first));
        assert_eq!(registry[first].core_enums, vec![id]);
        assert!(registry[second].core_enums.is_empty());
    }

    #[test]
    fn remove_moves_entity_to_owners_removed_list() {
        let mut registry = Registry::new();
        let id = registry.add_enum(String::from("FOO"), String::from("0x1"));
        let owner = registry.add_module(Module::feature("gl", Version::new(1, 0)));
        let remover = registry.add_module(Module::feature("gl", Version::new(3, 1)));

        registry.require_enum(id, owner);
        assert_eq!(registry.remove_enum(id, remover), None);

        assert!(registry[owner].core_enums.is_empty());
        assert_eq!(registry[owner].removed_enums, vec![id]);
        assert!(registry[remover].removed_enums.is_empty());
        assert_eq!(registry[id].owner, Ownership::Removed(owner));
    }

    #[test]
    fn remove_of_unowned_entity_is_a_diagnostic_no_op() {
        let mut registry = Registry::new();
        let id = registry.add_enum(String::from("FOO"), String::from("0x1"));
        let module = registry.add_module(Module::feature("gl", Version::new(1, 0)));

        let diagnostic = registry.remove_enum(id, module).unwrap();
        assert_eq!(
            diagnostic,
            Diagnostic::RemovedUnowned {
                module: String::from("gl_1_0"),
                name: String::from("FOO"),
            }
        );
        assert_eq!(registry[id].owner, Ownership::Unowned);
        assert!(registry[module].removed_enums.is_empty());
    }

    #[test]
    fn remove_of_removed_entity_is_a_diagnostic_no_op() {
        let mut registry = Registry::new();
        let id = registry.add_command(Command::new(
            String::from("void"),
            String::from("glFoo"),
            Vec::new(),
        ));
        let owner = registry.add_module(Module::feature("gl", Version::new(1, 0)));
        let remover = registry.add_module(Module::feature("gl", Version::new(3, 1)));

        registry.require_command(id, owner);
        registry.remove_command(id, remover);
        let diagnostic = registry.remove_command(id, remover).unwrap();
        assert!(matches!(diagnostic, Diagnostic::AlreadyRemoved { .. }));
        assert_eq!(registry[owner].removed_commands, vec![id]);
    }

    #[test]
    fn enum_table_is_last_wins_with_stable_identity() {
        let mut registry = Registry::new();
        let old = registry.add_enum(String::from("FOO"), String::from("0x1"));
        let module = registry.add_module(Module::feature("gl", Version::new(1, 0)));
        registry.require_enum(old, module);

        let new = registry.add_enum(String::from("FOO"), String::from("0x2"));
        assert_ne!(old, new);
        assert_eq!(registry.lookup_enum("FOO"), Some(new));
        assert_eq!(registry.enum_count(), 1);

        // The replaced object is untouched and still owned.
        assert_eq!(registry[old].value, "0x1");
        assert_eq!(registry[old].owner, Ownership::Owned(module));
        assert_eq!(registry[new].owner, Ownership::Unowned);
    }
}
