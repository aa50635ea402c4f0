//! Startup validation: names, duplicates, method owners and relation targets.

use crate::config::ApplicationDef;
use crate::error::ConfigError;
use crate::model::{split_target, OwnerKind};
use std::collections::HashSet;

/// A name must be usable as one URL path segment.
pub fn validate_name(name: &str) -> Result<(), ConfigError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.chars().any(|c| c == '/' || c == '?' || c == '#' || c == '%' || c.is_whitespace() || c.is_control());
    if bad {
        Err(ConfigError::InvalidName(name.to_string()))
    } else {
        Ok(())
    }
}

fn insert_unique<'a>(seen: &mut HashSet<&'a str>, kind: &'static str, name: &'a str) -> Result<(), ConfigError> {
    if seen.insert(name) {
        Ok(())
    } else {
        Err(ConfigError::DuplicateName {
            kind,
            name: name.to_string(),
        })
    }
}

pub fn validate(applications: &[ApplicationDef]) -> Result<(), ConfigError> {
    let mut app_names = HashSet::new();
    for app in applications {
        validate_name(&app.name)?;
        insert_unique(&mut app_names, "application", &app.name)?;

        // Collections and application methods share the second path segment.
        let mut members = HashSet::new();
        for c in &app.collections {
            validate_name(&c.name)?;
            insert_unique(&mut members, "collection", &c.name)?;
        }
        for m in &app.methods {
            validate_name(&m.name)?;
            if m.owner != OwnerKind::Application {
                return Err(ConfigError::WrongOwner {
                    method: format!("{}.{}", app.name, m.name),
                    declared: m.owner,
                    registered: OwnerKind::Application,
                });
            }
            insert_unique(&mut members, "application method or collection", &m.name)?;
        }

        for c in &app.collections {
            validate_name(&c.primary_key)?;
            let mut collection_methods = HashSet::new();
            let mut document_methods = HashSet::new();
            for m in &c.methods {
                validate_name(&m.name)?;
                match m.owner {
                    OwnerKind::Collection => insert_unique(&mut collection_methods, "collection method", &m.name)?,
                    OwnerKind::Document => insert_unique(&mut document_methods, "document method", &m.name)?,
                    OwnerKind::Application => {
                        return Err(ConfigError::WrongOwner {
                            method: format!("{}.{}.{}", app.name, c.name, m.name),
                            declared: m.owner,
                            registered: OwnerKind::Collection,
                        })
                    }
                }
            }
        }
    }

    for app in applications {
        for c in &app.collections {
            for target in c.relations.values() {
                let (target_app, target_name) = split_target(&app.name, target);
                let exists = applications
                    .iter()
                    .filter(|a| a.name == target_app)
                    .any(|a| a.collections.iter().any(|tc| tc.name == target_name));
                if !exists {
                    return Err(ConfigError::MissingReference {
                        kind: "relation target",
                        id: format!("{}.{} -> {}", app.name, c.name, target),
                    });
                }
            }
        }
    }
    Ok(())
}
