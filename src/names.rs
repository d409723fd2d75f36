//! Static name tables shared by every compilation.
//!
//! These tables are built once and never mutated. Allocators and analyzers take a
//! `&NameTables` at construction instead of reaching for process-wide state, so custom
//! tables can be injected and concurrent compilations stay independent.

use std::collections::HashSet;

/// Helper that is always imported, whether or not generated code referenced it.
pub const BOOTSTRAP_HELPER: &str = "init";

/// Suffix appended to a helper name to find its development variant.
pub const DEV_VARIANT_SUFFIX: &str = "Dev";

lazy_static::lazy_static! {
    /// Words that can never be used as an emitted identifier.
    pub static ref RESERVED_NAMES: HashSet<&'static str> = {
        [
            "arguments", "await", "break", "case", "catch", "class", "const", "continue",
            "debugger", "default", "delete", "do", "else", "enum", "eval", "export",
            "extends", "false", "finally", "for", "function", "if", "implements", "import",
            "in", "instanceof", "interface", "let", "new", "null", "package", "private",
            "protected", "public", "return", "static", "super", "switch", "this", "throw",
            "true", "try", "typeof", "var", "void", "while", "with", "yield",
        ]
        .into_iter()
        .collect()
    };

    /// Globals a template expression may read without a script declaration.
    pub static ref GLOBAL_WHITELIST: HashSet<&'static str> = {
        let mut s = HashSet::new();
        s.insert("Array");
        s.insert("Boolean");
        s.insert("console");
        s.insert("Date");
        s.insert("decodeURI");
        s.insert("decodeURIComponent");
        s.insert("encodeURI");
        s.insert("encodeURIComponent");
        s.insert("Infinity");
        s.insert("Intl");
        s.insert("isFinite");
        s.insert("isNaN");
        s.insert("JSON");
        s.insert("Map");
        s.insert("Math");
        s.insert("NaN");
        s.insert("Number");
        s.insert("Object");
        s.insert("parseFloat");
        s.insert("parseInt");
        s.insert("Promise");
        s.insert("RegExp");
        s.insert("Set");
        s.insert("String");
        s.insert("undefined");
        s.insert("window"); // Browser environment
        s.insert("document");
        s
    };

    /// Runtime helper catalogue exported by the shared runtime module.
    pub static ref RUNTIME_HELPERS: HashSet<&'static str> = {
        [
            "addListener", "append", "assign", "blankObject", "callAll", "createComment",
            "createElement", "createFragment", "createText", "destroy", "destroyDev",
            "destroyEach", "detachNode", "differs", "dispatchObservers", "fire", "get",
            "init", "insert", "noop", "observe", "observeDev", "on", "onDev", "proto",
            "protoDev", "removeListener", "set", "setAttribute", "setDev", "setStyle",
            "tick", "tickDev",
        ]
        .into_iter()
        .collect()
    };

    static ref STANDARD_TABLES: NameTables = NameTables {
        reserved: RESERVED_NAMES.iter().map(|s| s.to_string()).collect(),
        globals: GLOBAL_WHITELIST.iter().map(|s| s.to_string()).collect(),
        helpers: RUNTIME_HELPERS.iter().map(|s| s.to_string()).collect(),
    };
}

/// Read-only name configuration injected into allocators and analyzers.
#[derive(Debug, Clone, Default)]
pub struct NameTables {
    reserved: HashSet<String>,
    globals: HashSet<String>,
    helpers: HashSet<String>,
}

impl NameTables {
    /// The process-wide default tables.
    pub fn standard() -> &'static NameTables {
        &STANDARD_TABLES
    }

    pub fn new(
        reserved: impl IntoIterator<Item = impl Into<String>>,
        globals: impl IntoIterator<Item = impl Into<String>>,
        helpers: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            reserved: reserved.into_iter().map(Into::into).collect(),
            globals: globals.into_iter().map(Into::into).collect(),
            helpers: helpers.into_iter().map(Into::into).collect(),
        }
    }

    /// Standard tables with extra reserved words.
    pub fn with_reserved(extra: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut tables = Self::standard().clone();
        tables.reserved.extend(extra.into_iter().map(Into::into));
        tables
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved.contains(name)
    }

    pub fn is_global(&self, name: &str) -> bool {
        self.globals.contains(name)
    }

    pub fn is_helper(&self, name: &str) -> bool {
        self.helpers.contains(name)
    }

    pub fn helpers(&self) -> impl Iterator<Item = &str> {
        self.helpers.iter().map(String::as_str)
    }

    /// Name of the development variant of `helper`, if the catalogue has one.
    pub fn dev_variant(&self, helper: &str) -> Option<String> {
        let variant = format!("{}{}", helper, DEV_VARIANT_SUFFIX);
        self.helpers.contains(&variant).then_some(variant)
    }
}
