use crate::types::{CommandId, EnumId, Module, Registry};

/// Column widths for one emitted section: the length of the longest entry in
/// each column, or zero when the section is empty. Alignment is cosmetic and
/// never changes the meaning of an emitted declaration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ColumnWidths {
    pub enum_name: usize,
    pub return_type: usize,
    pub pointer_type: usize,
    pub command_name: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ModuleWidths {
    pub core: ColumnWidths,
    pub removed: ColumnWidths,
}

/// Computed at emission time, after all require/remove replay has finished,
/// so the result cannot go stale against the module's lists.
pub fn module_widths(registry: &Registry, module: &Module) -> ModuleWidths {
    ModuleWidths {
        core: column_widths(registry, &module.core_enums, &module.core_commands),
        removed: column_widths(registry, &module.removed_enums, &module.removed_commands),
    }
}

fn column_widths(registry: &Registry, enums: &[EnumId], commands: &[CommandId]) -> ColumnWidths {
    ColumnWidths {
        enum_name: enums
            .iter()
            .map(|&id| registry[id].name.len())
            .max()
            .unwrap_or(0),
        return_type: commands
            .iter()
            .map(|&id| registry[id].return_type.len())
            .max()
            .unwrap_or(0),
        pointer_type: commands
            .iter()
            .map(|&id| registry[id].pointer_type_name.len())
            .max()
            .unwrap_or(0),
        command_name: commands
            .iter()
            .map(|&id| registry[id].name.len())
            .max()
            .unwrap_or(0),
    }
}
