// Symbol interning for the Cella runtime
//
// Words, frame keys and error ids all refer to symbols by id. The canon
// symbols the runtime itself depends on are interned at fixed ids during
// boot so core code can compare against constants.

use std::collections::HashMap;

use crate::cell::SymbolId;

/// Canon symbols, interned in this order by `SymbolTable::new`.
/// Keep the constants below in sync with the table.
const CANON_SYMBOLS: &[&str] = &[
    "self",
    "return",
    "exit",
    "break",
    "continue",
    "throw",
    "halt",
    // error frame template fields
    "code",
    "type",
    "id",
    "message",
    "where",
    "near",
    // datatype names
    "unset!",
    "none!",
    "logic!",
    "integer!",
    "decimal!",
    "word!",
    "set-word!",
    "get-word!",
    "lit-word!",
    "refinement!",
    "block!",
    "group!",
    "path!",
    "text!",
    "object!",
    "error!",
    "function!",
    "escape!",
    "datatype!",
];

pub const SYM_SELF: SymbolId = SymbolId(0);
pub const SYM_RETURN: SymbolId = SymbolId(1);
pub const SYM_EXIT: SymbolId = SymbolId(2);
pub const SYM_BREAK: SymbolId = SymbolId(3);
pub const SYM_CONTINUE: SymbolId = SymbolId(4);
pub const SYM_THROW: SymbolId = SymbolId(5);
pub const SYM_HALT: SymbolId = SymbolId(6);
pub const SYM_CODE: SymbolId = SymbolId(7);
pub const SYM_TYPE: SymbolId = SymbolId(8);
pub const SYM_ID: SymbolId = SymbolId(9);
pub const SYM_MESSAGE: SymbolId = SymbolId(10);
pub const SYM_WHERE: SymbolId = SymbolId(11);
pub const SYM_NEAR: SymbolId = SymbolId(12);
pub const SYM_UNSET_TYPE: SymbolId = SymbolId(13);

/// Interned symbol table. Symbol ids are stable for the lifetime of the
/// interpreter instance that owns the table.
pub struct SymbolTable {
    names: Vec<String>,
    ids: HashMap<String, SymbolId>,
}

impl SymbolTable {
    pub fn new() -> Self {
        let mut table = SymbolTable {
            names: Vec::new(),
            ids: HashMap::new(),
        };
        for name in CANON_SYMBOLS {
            table.intern(name);
        }
        debug_assert_eq!(table.name(SYM_RETURN), "return");
        debug_assert_eq!(table.name(SYM_NEAR), "near");
        debug_assert_eq!(table.name(SYM_UNSET_TYPE), "unset!");
        table
    }

    /// Intern a name, returning its id. Interning the same spelling twice
    /// yields the same id.
    pub fn intern(&mut self, name: &str) -> SymbolId {
        if let Some(id) = self.ids.get(name) {
            return *id;
        }
        let id = SymbolId(self.names.len() as u32);
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        id
    }

    /// Look up a name without interning it.
    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.ids.get(name).copied()
    }

    pub fn name(&self, id: SymbolId) -> &str {
        &self.names[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}
