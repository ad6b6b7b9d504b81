//! Module registry and the idempotent `IMPORT` intrinsic.
//!
//! A module is a named set of SQL files keyed by import key
//! (`module.path.to.file`); importing a key executes that file's body
//! through the statement pipeline at most once per process.

use std::collections::HashMap;

use tracing::debug;
use tracesql_core::{Error, Result, SqlSource, SqlValue};

use crate::pipeline::TraceSqlEngine;

pub struct ModuleFile {
    pub sql: String,
    /// Monotonic: false -> true, never reset.
    pub imported: bool,
}

#[derive(Default)]
pub struct Module {
    files: HashMap<String, ModuleFile>,
}

/// Maps module names to their files. The module name is the import key's
/// first dot-separated segment.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: HashMap<String, Module>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install (or wholesale replace) a module's file set. Keys are full
    /// import keys; values are the file bodies.
    pub fn register(&mut self, name: &str, files: Vec<(String, String)>) {
        let module = Module {
            files: files
                .into_iter()
                .map(|(key, sql)| {
                    (
                        key,
                        ModuleFile {
                            sql,
                            imported: false,
                        },
                    )
                })
                .collect(),
        };
        self.modules.insert(name.to_string(), module);
    }

    fn file(&self, module: &str, key: &str) -> Option<&ModuleFile> {
        self.modules.get(module)?.files.get(key)
    }

    fn file_mut(&mut self, module: &str, key: &str) -> Option<&mut ModuleFile> {
        self.modules.get_mut(module)?.files.get_mut(key)
    }

    pub fn contains_module(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }
}

fn module_name(key: &str) -> &str {
    key.split('.').next().unwrap_or(key)
}

impl TraceSqlEngine {
    /// Install a module's files for later import.
    pub fn register_module(&self, name: &str, files: Vec<(String, String)>) {
        self.modules().borrow_mut().register(name, files);
    }

    /// Resolve and execute an import key. A second import of the same key is
    /// a no-op success.
    pub fn run_import(&self, key: &str) -> Result<()> {
        let module = module_name(key);
        let sql = {
            let registry = self.modules().borrow();
            if !registry.contains_module(module) {
                return Err(Error::NotFound(format!(
                    "IMPORT: unknown module name provided - {key}"
                )));
            }
            let file = registry.file(module, key).ok_or_else(|| {
                Error::NotFound(format!("IMPORT: unknown filename provided - {key}"))
            })?;
            if file.imported {
                debug!(key, "import skipped; already imported");
                return Ok(());
            }
            file.sql.clone()
        };

        let stats = self.execute(SqlSource::from_module_import(sql, key))?;
        if stats.statement_count_with_output > 0 {
            return Err(Error::Structural(format!(
                "IMPORT: file '{key}' must not return values"
            )));
        }
        if let Some(file) = self.modules().borrow_mut().file_mut(module, key) {
            file.imported = true;
        }
        debug!(key, "imported module file");
        Ok(())
    }
}

/// Implementation of the `IMPORT(key)` SQL intrinsic: exactly one string
/// argument, success reported with the "no value" pointer sentinel so a
/// `SELECT IMPORT(...)` statement counts as output-free.
pub(crate) fn import_callback(
    engine: &TraceSqlEngine,
    args: &[SqlValue],
) -> Result<Option<SqlValue>> {
    let key = match args {
        [SqlValue::Text(key)] => key,
        [other] => {
            return Err(Error::Type(format!(
                "IMPORT({other}): argument must be a string"
            )))
        }
        _ => {
            return Err(Error::Type(format!(
                "IMPORT: invalid number of args; expected 1, received {}",
                args.len()
            )))
        }
    };
    engine.run_import(key)?;
    Ok(None)
}
