use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};

use crate::Slug;

//////////////////////////////////////////// constants ////////////////////////////////////////////

/// Canonical name of the implicit root entity present in every schema.
pub const ENCLOSURE: &str = "enclosure";

/// Canonical name of the implicit leaf entity present in every schema.
pub const TRAY: &str = "tray";

pub(crate) fn enclosure_slug() -> Slug {
    Slug::new(ENCLOSURE).expect("literal canonicalizes")
}

pub(crate) fn tray_slug() -> Slug {
    Slug::new(TRAY).expect("literal canonicalizes")
}

///////////////////////////////////////////// SchemaError /////////////////////////////////////////

/// Errors raised while parsing or validating a layout schema document.
///
/// Any of these is fatal for the schema that produced it: a schema that
/// fails validation is never registered, and at startup a single bad
/// document aborts the whole load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// The document is not valid YAML or is missing a structurally
    /// required field.
    Malformed(String),
    /// Neither the document nor the caller supplied a schema name.
    MissingName,
    /// The document declares an entity named `tray` or `enclosure`, which
    /// are implicit in every schema.
    ReservedEntityName(String),
    /// Two declared entities canonicalize to the same name.
    DuplicateEntity(String),
    /// An entity names a parent that is not an entity in this schema.
    DanglingParent {
        /// The entity whose parent is missing.
        entity: String,
        /// The parent name that matched nothing.
        parent: String,
    },
    /// An entity claims `tray` as its parent.
    TrayWithChild(String),
    /// Two entities claim the same parent.
    MultipleChildren {
        /// The contested parent.
        parent: String,
        /// The child that claimed the parent first.
        first: String,
        /// The child that claimed the parent second.
        second: String,
    },
    /// Entities other than `tray` ended the walk without a child.
    ChildlessEntities(Vec<String>),
    /// An entity cannot be reached by walking down from `enclosure`.
    UnreachableEntity(String),
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            SchemaError::Malformed(msg) => write!(f, "malformed schema document: {}", msg),
            SchemaError::MissingName => write!(f, "schema document does not declare a name"),
            SchemaError::ReservedEntityName(name) => {
                write!(
                    f,
                    "entity name {:?} is reserved; tray and enclosure are implicit in every schema",
                    name
                )
            }
            SchemaError::DuplicateEntity(name) => {
                write!(f, "more than one entity canonicalizes to {:?}", name)
            }
            SchemaError::DanglingParent { entity, parent } => {
                write!(
                    f,
                    "entity {:?} names parent {:?}, which is not an entity in this schema",
                    entity, parent
                )
            }
            SchemaError::TrayWithChild(entity) => {
                write!(f, "trays are not allowed to have children ({:?})", entity)
            }
            SchemaError::MultipleChildren {
                parent,
                first,
                second,
            } => {
                write!(
                    f,
                    "entities {:?} and {:?} both claim {:?} as their parent",
                    first, second, parent
                )
            }
            SchemaError::ChildlessEntities(names) => {
                write!(f, "entities {} do not have children", names.join(", "))
            }
            SchemaError::UnreachableEntity(name) => {
                write!(f, "entity {:?} is not reachable from the enclosure", name)
            }
        }
    }
}

impl std::error::Error for SchemaError {}

//////////////////////////////////////////// SchemaEntity ////////////////////////////////////////////

/// One node type in a schema's layout tree.
///
/// The root (`enclosure`) is the only entity without a parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaEntity {
    /// Canonical entity name.
    pub name: Slug,
    /// Canonical parent name, `None` only for the root.
    pub parent: Option<Slug>,
}

//////////////////////////////////////////// LayoutSchema ////////////////////////////////////////////

/// Raw document shape accepted by the parser. Field names match the YAML
/// files operators write, so `tray-parent` keeps its hyphen.
#[derive(Debug, Deserialize)]
struct SchemaDoc {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "tray-parent")]
    tray_parent: Option<String>,
    #[serde(default)]
    entities: Option<Vec<EntityDoc>>,
}

#[derive(Debug, Deserialize)]
struct EntityDoc {
    name: String,
    parent: String,
}

/// A validated layout schema: one permissible shape for a farm's tree of
/// physical entities.
///
/// Every schema contains the implicit root `enclosure` and the implicit
/// leaf `tray` in addition to its declared entities, and validation
/// guarantees the whole set forms a single rooted chain:
///
/// - `enclosure` is the only entity without a parent,
/// - `tray` has no children,
/// - every other entity has exactly one parent and exactly one child,
/// - every entity is reachable by walking down from `enclosure`.
///
/// # Examples
///
/// ```
/// let schema = trellis::LayoutSchema::parse_with_name(
///     "aisle",
///     "entities:\n  - name: aisle\n    parent: enclosure\ntray-parent: aisle\n",
/// )
/// .unwrap();
/// assert_eq!(schema.parent_of("tray").map(|s| s.as_str()), Some("aisle"));
/// assert_eq!(schema.parent_of("enclosure"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayoutSchema {
    /// Canonical schema name.
    pub name: Slug,
    /// The entity `tray` hangs beneath.
    #[serde(rename = "tray-parent")]
    pub tray_parent: Slug,
    /// All entities in the schema, implicit ones included, keyed by name.
    pub entities: BTreeMap<Slug, SchemaEntity>,
    #[serde(skip)]
    children: BTreeMap<Slug, Slug>,
}

impl LayoutSchema {
    /// Parses and validates a YAML schema document.
    ///
    /// The document must carry its own `name`. Use
    /// [`parse_with_name`](LayoutSchema::parse_with_name) when the name
    /// comes from elsewhere, such as a file stem.
    pub fn parse(yaml: &str) -> Result<LayoutSchema, SchemaError> {
        Self::parse_doc(yaml, None)
    }

    /// Parses and validates a YAML schema document, falling back to
    /// `default_name` when the document does not declare a name.
    ///
    /// Schema files are named after their schema, so the registry loads
    /// them with the file stem as the default.
    pub fn parse_with_name(default_name: &str, yaml: &str) -> Result<LayoutSchema, SchemaError> {
        Self::parse_doc(yaml, Some(default_name))
    }

    fn parse_doc(yaml: &str, default_name: Option<&str>) -> Result<LayoutSchema, SchemaError> {
        let doc: SchemaDoc =
            serde_yml::from_str(yaml).map_err(|e| SchemaError::Malformed(e.to_string()))?;

        let raw_name = match doc.name.as_deref().or(default_name) {
            Some(n) => n,
            None => return Err(SchemaError::MissingName),
        };
        let name = Slug::new(raw_name).ok_or(SchemaError::MissingName)?;

        let tray_parent = match doc.tray_parent.as_deref() {
            Some(raw) => Slug::new(raw)
                .ok_or_else(|| SchemaError::Malformed(format!("unusable tray-parent {:?}", raw)))?,
            None => enclosure_slug(),
        };

        let mut entities = BTreeMap::new();
        for entity in doc.entities.unwrap_or_default() {
            let entity_name = Slug::new(&entity.name).ok_or_else(|| {
                SchemaError::Malformed(format!("unusable entity name {:?}", entity.name))
            })?;
            if entity_name.as_str() == TRAY || entity_name.as_str() == ENCLOSURE {
                return Err(SchemaError::ReservedEntityName(entity.name));
            }
            let parent = Slug::new(&entity.parent).ok_or_else(|| {
                SchemaError::Malformed(format!("unusable parent name {:?}", entity.parent))
            })?;
            let duplicate = entities
                .insert(
                    entity_name.clone(),
                    SchemaEntity {
                        name: entity_name.clone(),
                        parent: Some(parent),
                    },
                )
                .is_some();
            if duplicate {
                return Err(SchemaError::DuplicateEntity(entity_name.into_string()));
            }
        }

        let enclosure = enclosure_slug();
        let tray = tray_slug();
        entities.insert(
            enclosure.clone(),
            SchemaEntity {
                name: enclosure,
                parent: None,
            },
        );
        entities.insert(
            tray.clone(),
            SchemaEntity {
                name: tray,
                parent: Some(tray_parent.clone()),
            },
        );

        let children = validate_chain(&entities)?;

        Ok(LayoutSchema {
            name,
            tray_parent,
            entities,
            children,
        })
    }

    /// Returns the parent type of `entity` under this schema.
    ///
    /// Returns `None` for the root and for entities the schema does not
    /// contain; an unknown entity is a tolerated condition, not an error.
    pub fn parent_of(&self, entity: &str) -> Option<&Slug> {
        let key = Slug::new(entity)?;
        self.entities.get(&key)?.parent.as_ref()
    }

    /// Returns the child type of `entity` under this schema.
    ///
    /// Returns `None` for `tray` and for entities the schema does not
    /// contain.
    pub fn child_of(&self, entity: &str) -> Option<&Slug> {
        let key = Slug::new(entity)?;
        self.children.get(&key)
    }

    /// Returns true when `entity` is part of this schema.
    pub fn contains(&self, entity: &str) -> bool {
        match Slug::new(entity) {
            Some(key) => self.entities.contains_key(&key),
            None => false,
        }
    }

    /// Returns the entity names in chain order, from `enclosure` down to
    /// `tray`.
    pub fn chain(&self) -> Vec<Slug> {
        let mut out = Vec::with_capacity(self.entities.len());
        let mut cursor = Some(enclosure_slug());
        while let Some(current) = cursor {
            cursor = self.children.get(&current).cloned();
            out.push(current);
        }
        out
    }
}

/// Walks the entity set and confirms it forms a single rooted chain.
///
/// Every entity but `enclosure` consumes its parent from the set of
/// entities still lacking a child; a parent that is already consumed has
/// two children, and a parent that was never a candidate does not exist.
/// `tray` starts outside the candidate set because it never needs a child.
/// A final pass walks down from `enclosure` so that parent cycles detached
/// from the chain are rejected as unreachable.
///
/// Returns the parent-to-child map on success.
fn validate_chain(
    entities: &BTreeMap<Slug, SchemaEntity>,
) -> Result<BTreeMap<Slug, Slug>, SchemaError> {
    let mut candidates: BTreeSet<&Slug> = entities.keys().filter(|k| k.as_str() != TRAY).collect();
    let mut children: BTreeMap<Slug, Slug> = BTreeMap::new();

    for entity in entities.values() {
        let parent = match &entity.parent {
            Some(parent) => parent,
            None => continue,
        };
        if parent.as_str() == TRAY {
            return Err(SchemaError::TrayWithChild(entity.name.to_string()));
        }
        if candidates.remove(parent) {
            children.insert(parent.clone(), entity.name.clone());
        } else if let Some(first) = children.get(parent) {
            return Err(SchemaError::MultipleChildren {
                parent: parent.to_string(),
                first: first.to_string(),
                second: entity.name.to_string(),
            });
        } else {
            return Err(SchemaError::DanglingParent {
                entity: entity.name.to_string(),
                parent: parent.to_string(),
            });
        }
    }

    if !candidates.is_empty() {
        let leftover: Vec<String> = candidates.iter().map(|s| s.to_string()).collect();
        return Err(SchemaError::ChildlessEntities(leftover));
    }

    let mut reached = BTreeSet::new();
    let mut cursor = entities.keys().find(|k| k.as_str() == ENCLOSURE).cloned();
    while let Some(current) = cursor {
        cursor = children.get(&current).cloned();
        reached.insert(current);
    }
    if reached.len() != entities.len() {
        let unreached = entities
            .keys()
            .find(|k| !reached.contains(*k))
            .map(|k| k.to_string())
            .unwrap_or_default();
        return Err(SchemaError::UnreachableEntity(unreached));
    }

    Ok(children)
}
