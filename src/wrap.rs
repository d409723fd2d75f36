//! Module wrapping: the text placed before and after the emitted component body.
//!
//! Wrappers return an intro and an outro instead of rewriting the body, so the body's
//! segments reach the bundle untouched and the source map stays exact.

use crate::emit::ImportedHelper;
use crate::scope::{HoistedImport, SpecifierKind};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SHARED_PATH: &str = "component-runtime/shared.js";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleFormat {
    #[default]
    Es,
    Cjs,
}

pub struct WrapContext<'a> {
    pub format: ModuleFormat,
    /// Emitted (already deconflicted) component name.
    pub name: &'a str,
    pub shared_path: &'a str,
    pub imported_helpers: &'a [ImportedHelper],
    pub hoisted_imports: &'a [HoistedImport],
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Wrapped {
    pub intro: String,
    pub outro: String,
}

pub trait ModuleWrapper: Send + Sync {
    fn wrap(&self, cx: &WrapContext<'_>) -> Wrapped;
}

/// ES module and CommonJS wrapping.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardWrapper;

impl ModuleWrapper for StandardWrapper {
    fn wrap(&self, cx: &WrapContext<'_>) -> Wrapped {
        let wrapped = match cx.format {
            ModuleFormat::Es => wrap_es(cx),
            ModuleFormat::Cjs => wrap_cjs(cx),
        };
        tracing::debug!(
            format = ?cx.format,
            helpers = cx.imported_helpers.len(),
            imports = cx.hoisted_imports.len(),
            "module wrapped"
        );
        wrapped
    }
}

fn quote(path: &str) -> String {
    serde_json::to_string(path).unwrap_or_else(|_| format!("\"{}\"", path))
}

fn helper_bindings(helpers: &[ImportedHelper], separator: &str) -> String {
    helpers
        .iter()
        .map(|helper| {
            if helper.name == helper.alias {
                helper.name.clone()
            } else {
                format!("{}{}{}", helper.name, separator, helper.alias)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn wrap_es(cx: &WrapContext<'_>) -> Wrapped {
    let mut intro = String::new();
    if !cx.imported_helpers.is_empty() {
        intro.push_str(&format!(
            "import {{ {} }} from {};\n",
            helper_bindings(cx.imported_helpers, " as "),
            quote(cx.shared_path)
        ));
    }
    for import in cx.hoisted_imports {
        intro.push_str(&es_import(import));
        intro.push('\n');
    }
    intro.push('\n');

    Wrapped {
        intro,
        outro: format!("\n\nexport default {};\n", cx.name),
    }
}

fn es_import(import: &HoistedImport) -> String {
    let source = quote(&import.source);
    if import.specifiers.is_empty() {
        return format!("import {};", source);
    }

    let mut clauses = Vec::new();
    let mut named = Vec::new();
    for specifier in &import.specifiers {
        match &specifier.kind {
            SpecifierKind::Default => clauses.push(specifier.local.clone()),
            SpecifierKind::Namespace => clauses.push(format!("* as {}", specifier.local)),
            SpecifierKind::Named(imported) if *imported == specifier.local => {
                named.push(imported.clone())
            }
            SpecifierKind::Named(imported) => {
                named.push(format!("{} as {}", imported, specifier.local))
            }
        }
    }
    if !named.is_empty() {
        clauses.push(format!("{{ {} }}", named.join(", ")));
    }
    format!("import {} from {};", clauses.join(", "), source)
}

fn wrap_cjs(cx: &WrapContext<'_>) -> Wrapped {
    let mut intro = String::from("\"use strict\";\n\n");
    if !cx.imported_helpers.is_empty() {
        intro.push_str(&format!(
            "var {{ {} }} = require({});\n",
            helper_bindings(cx.imported_helpers, ": "),
            quote(cx.shared_path)
        ));
    }
    for import in cx.hoisted_imports {
        intro.push_str(&cjs_import(import));
        intro.push('\n');
    }
    intro.push('\n');

    Wrapped {
        intro,
        outro: format!("\n\nmodule.exports = {};\n", cx.name),
    }
}

fn cjs_import(import: &HoistedImport) -> String {
    let require = format!("require({})", quote(&import.source));
    if import.specifiers.is_empty() {
        return format!("{};", require);
    }

    let mut lines = Vec::new();
    let mut named = Vec::new();
    for specifier in &import.specifiers {
        match &specifier.kind {
            SpecifierKind::Default | SpecifierKind::Namespace => {
                lines.push(format!("var {} = {};", specifier.local, require))
            }
            SpecifierKind::Named(imported) if *imported == specifier.local => {
                named.push(imported.clone())
            }
            SpecifierKind::Named(imported) => {
                named.push(format!("{}: {}", imported, specifier.local))
            }
        }
    }
    if !named.is_empty() {
        lines.push(format!("var {{ {} }} = {};", named.join(", "), require));
    }
    lines.join("\n")
}
