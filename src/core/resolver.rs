//! Package index resolution
//!
//! Exports resolve in place. Imports name an object inside another package:
//! the outer chain of the import ends in a package import, that package is
//! loaded through the provider's registry, and the export with the same name
//! and outer chain is picked. Results are memoized per package.

use crate::package::{LoadedPackage, ObjectImport, ObjectRef, PackageIndex, ResolvedTarget};
use std::sync::Arc;
use tracing::debug;

/// Resolve `index` relative to `package`; `None` when null or unresolvable
pub fn resolve(package: &Arc<LoadedPackage>, index: PackageIndex) -> Option<ObjectRef> {
    if index.is_null() {
        return None;
    }

    if let Some(export) = index.to_export() {
        if export < package.exports().len() {
            return Some(ObjectRef::new(Arc::clone(package), export));
        }
        debug!(package = package.name(), index = index.0, "Export index out of range");
        return None;
    }

    match package.memo_get(index) {
        Some(Some(target)) => {
            if let Some(found) = target.package.upgrade() {
                return Some(ObjectRef::new(found, target.export));
            }
            // The target package was evicted since; look it up again
            package.memo_forget(index);
        }
        Some(None) => return None,
        None => {}
    }

    let resolved = resolve_import(package, index);
    let target = resolved.as_ref().map(|object| ResolvedTarget {
        package: Arc::downgrade(object.package()),
        export: object.export_index(),
    });

    // Another thread may have won the race; its answer is the canonical one
    match package.memo_insert(index, target) {
        Some(target) => target
            .package
            .upgrade()
            .map(|found| ObjectRef::new(found, target.export))
            .or(resolved),
        None => None,
    }
}

fn resolve_import(package: &Arc<LoadedPackage>, index: PackageIndex) -> Option<ObjectRef> {
    let imports = package.imports();
    let import = index.to_import().and_then(|i| imports.get(i))?;

    // Object names from the package import down to the requested object
    let mut chain: Vec<&ObjectImport> = vec![import];
    let mut outer = import.outer_index;
    while !outer.is_null() {
        let Some(next) = outer.to_import().and_then(|i| imports.get(i)) else {
            debug!(package = package.name(), index = index.0, "Import outer is not an import");
            return None;
        };
        if chain.len() > imports.len() {
            debug!(package = package.name(), index = index.0, "Import outer chain loops");
            return None;
        }
        chain.push(next);
        outer = next.outer_index;
    }

    let package_import = chain.pop()?;
    if chain.is_empty() {
        // The import names a package, not an object in it
        return None;
    }
    chain.reverse();

    let namespace = package.namespace()?;
    let target = match namespace.load_package_by_name(&package_import.object_name) {
        Ok(target) => target,
        Err(err) => {
            debug!(
                package = package.name(),
                import = %package_import.object_name,
                error = %err,
                "Unresolved import"
            );
            return None;
        }
    };

    let names: Vec<&str> = chain.iter().map(|i| i.object_name.as_str()).collect();
    let found = find_export(&target, &names);
    if found.is_none() {
        debug!(
            package = package.name(),
            target = target.name(),
            object = names.join("."),
            "Import not exported by target package"
        );
    }
    found
}

/// Export whose outer chain spells `names` (outermost first)
fn find_export(target: &Arc<LoadedPackage>, names: &[&str]) -> Option<ObjectRef> {
    let (last, outers) = names.split_last()?;
    let exports = target.exports();

    exports
        .iter()
        .enumerate()
        .filter(|(_, export)| export.object_name.eq_ignore_ascii_case(last))
        .find(|(_, export)| {
            let mut outer = export.outer_index;
            for name in outers.iter().rev() {
                match outer.to_export().and_then(|i| exports.get(i)) {
                    Some(parent) if parent.object_name.eq_ignore_ascii_case(name) => {
                        outer = parent.outer_index;
                    }
                    _ => return false,
                }
            }
            outer.is_null()
        })
        .map(|(i, _)| ObjectRef::new(Arc::clone(target), i))
}
