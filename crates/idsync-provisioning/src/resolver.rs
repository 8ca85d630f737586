//! Internal attribute reference resolution.
//!
//! Mapping items name internal attributes with a small expression language:
//!
//! | Expression                        | Meaning                                 |
//! |-----------------------------------|-----------------------------------------|
//! | `email`                           | field or schema of the entity itself    |
//! | `groups[admins].cn`               | attribute of a group the entity is in   |
//! | `users[rossini].email`            | attribute of a related user             |
//! | `anyObjects[hp-1].location`       | attribute of a related any object       |
//! | `relationships[neighbor][PRINTER].model` | attributes of related objects    |
//! | `memberships[admins].level`       | membership-scoped attribute             |
//! | `privileges[console]`             | privileges granted for an application   |
//!
//! Qualifier patterns are tried in the order of the table; the first match
//! wins.

use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use idsync_core::{AnyTypeKind, SchemaStore, SchemaType, USER_TYPE};

use crate::accessor;
use crate::error::{ProvisioningError, Result};

static GROUPS: LazyLock<Regex> = LazyLock::new(|| qualified(r"groups\[([^\]]+)\]"));
static USERS: LazyLock<Regex> = LazyLock::new(|| qualified(r"users\[([^\]]+)\]"));
static ANY_OBJECTS: LazyLock<Regex> = LazyLock::new(|| qualified(r"anyObjects\[([^\]]+)\]"));
static RELATIONSHIPS: LazyLock<Regex> =
    LazyLock::new(|| qualified(r"relationships\[([^\]]+)\]\[([^\]]+)\]"));
static MEMBERSHIPS: LazyLock<Regex> = LazyLock::new(|| qualified(r"memberships\[([^\]]+)\]"));
static PRIVILEGES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^privileges\[([^\]]+)\]$").expect("PRIVILEGES is a valid regex pattern")
});

fn qualified(prefix: &str) -> Regex {
    Regex::new(&format!(r"^{prefix}\.(.+)$")).expect("qualifier prefix is a valid regex pattern")
}

/// Whose attribute an expression reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Qualifier {
    /// A group the entity is a member of, by name.
    Group(String),
    /// A related user, by username.
    User(String),
    /// A related any object, by name.
    AnyObject(String),
    /// Every related entity of a relationship type and any type.
    Relationship { rel_type: String, any_type: String },
    /// The entity's membership in a group, by group name.
    Membership(String),
    /// Privileges granted for an application.
    Privileges(String),
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Qualifier::Group(name) => write!(f, "groups[{name}]"),
            Qualifier::User(name) => write!(f, "users[{name}]"),
            Qualifier::AnyObject(name) => write!(f, "anyObjects[{name}]"),
            Qualifier::Relationship { rel_type, any_type } => {
                write!(f, "relationships[{rel_type}][{any_type}]")
            }
            Qualifier::Membership(name) => write!(f, "memberships[{name}]"),
            Qualifier::Privileges(app) => write!(f, "privileges[{app}]"),
        }
    }
}

/// What is read from the referenced entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrTarget {
    /// A built-in field.
    Field(String),
    /// A schema; `schema_type` is `None` when no schema has that name.
    Schema {
        schema_type: Option<SchemaType>,
        name: String,
    },
    /// The privilege list of the qualifier.
    Privileges,
}

/// A parsed internal attribute expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalAttrReference {
    /// Kind of the entity the target is read from.
    pub kind: AnyTypeKind,
    pub qualifier: Option<Qualifier>,
    pub target: AttrTarget,
}

impl InternalAttrReference {
    #[must_use]
    pub fn schema_type(&self) -> Option<SchemaType> {
        match &self.target {
            AttrTarget::Schema { schema_type, .. } => *schema_type,
            _ => None,
        }
    }

    #[must_use]
    pub fn is_field(&self, name: &str) -> bool {
        matches!(&self.target, AttrTarget::Field(f) if f == name)
    }
}

/// Resolves expressions against the schema catalog.
#[derive(Clone)]
pub struct IntAttrNameResolver {
    schemas: Arc<dyn SchemaStore>,
}

impl fmt::Debug for IntAttrNameResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntAttrNameResolver").finish_non_exhaustive()
    }
}

impl IntAttrNameResolver {
    pub fn new(schemas: Arc<dyn SchemaStore>) -> Self {
        Self { schemas }
    }

    /// Resolve `expression` for an entity of kind `kind`.
    ///
    /// Pure: the same expression and catalog always produce the same
    /// reference.
    pub fn resolve(&self, expression: &str, kind: AnyTypeKind) -> Result<InternalAttrReference> {
        let expression = expression.trim();
        if expression.is_empty() {
            return Err(ProvisioningError::invalid_expression(expression, "empty expression"));
        }

        if let Some(caps) = GROUPS.captures(expression) {
            let qualifier = Qualifier::Group(caps[1].to_string());
            return self.qualified(expression, AnyTypeKind::Group, qualifier, &caps[2]);
        }
        if let Some(caps) = USERS.captures(expression) {
            let qualifier = Qualifier::User(caps[1].to_string());
            return self.qualified(expression, AnyTypeKind::User, qualifier, &caps[2]);
        }
        if let Some(caps) = ANY_OBJECTS.captures(expression) {
            let qualifier = Qualifier::AnyObject(caps[1].to_string());
            return self.qualified(expression, AnyTypeKind::AnyObject, qualifier, &caps[2]);
        }
        if let Some(caps) = RELATIONSHIPS.captures(expression) {
            let any_type = caps[2].to_string();
            let related_kind = if any_type == USER_TYPE {
                AnyTypeKind::User
            } else {
                AnyTypeKind::AnyObject
            };
            let qualifier = Qualifier::Relationship {
                rel_type: caps[1].to_string(),
                any_type,
            };
            return self.qualified(expression, related_kind, qualifier, &caps[3]);
        }
        if let Some(caps) = MEMBERSHIPS.captures(expression) {
            let rest = &caps[2];
            check_simple(expression, rest)?;
            return Ok(InternalAttrReference {
                kind: AnyTypeKind::User,
                qualifier: Some(Qualifier::Membership(caps[1].to_string())),
                target: self.schema_target(rest),
            });
        }
        if let Some(caps) = PRIVILEGES.captures(expression) {
            if kind != AnyTypeKind::User {
                return Err(ProvisioningError::invalid_expression(
                    expression,
                    "privileges are only defined for users",
                ));
            }
            return Ok(InternalAttrReference {
                kind: AnyTypeKind::User,
                qualifier: Some(Qualifier::Privileges(caps[1].to_string())),
                target: AttrTarget::Privileges,
            });
        }

        check_simple(expression, expression)?;
        Ok(InternalAttrReference {
            kind,
            qualifier: None,
            target: self.plain_target(kind, expression),
        })
    }

    fn qualified(
        &self,
        expression: &str,
        kind: AnyTypeKind,
        qualifier: Qualifier,
        rest: &str,
    ) -> Result<InternalAttrReference> {
        check_simple(expression, rest)?;
        Ok(InternalAttrReference {
            kind,
            qualifier: Some(qualifier),
            target: self.plain_target(kind, rest),
        })
    }

    fn plain_target(&self, kind: AnyTypeKind, name: &str) -> AttrTarget {
        if accessor::is_field(kind, name) {
            AttrTarget::Field(name.to_string())
        } else {
            self.schema_target(name)
        }
    }

    fn schema_target(&self, name: &str) -> AttrTarget {
        let schema_type = if self.schemas.find_plain(name).is_some() {
            Some(SchemaType::Plain)
        } else if self.schemas.find_derived(name).is_some() {
            Some(SchemaType::Derived)
        } else if self.schemas.find_virtual(name).is_some() {
            Some(SchemaType::Virtual)
        } else {
            None
        };
        AttrTarget::Schema {
            schema_type,
            name: name.to_string(),
        }
    }
}

/// Reject nested qualifiers and stray brackets in a trailing name.
fn check_simple(expression: &str, name: &str) -> Result<()> {
    if name.is_empty() || name.contains(['.', '[', ']']) {
        return Err(ProvisioningError::invalid_expression(
            expression,
            "expected a single field or schema name",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use idsync_core::{AttrSchemaType, DerSchema, PlainSchema, SchemaCatalog, VirSchema};

    fn resolver() -> IntAttrNameResolver {
        let catalog = SchemaCatalog::new()
            .with_plain(PlainSchema::new("email", AttrSchemaType::String))
            .with_plain(PlainSchema::new("level", AttrSchemaType::Long))
            .with_derived(DerSchema::new("cn", r#"firstname + " " + surname"#))
            .with_virtual(VirSchema::new("virtualdata", "resource-db", "USER", "vdata"));
        IntAttrNameResolver::new(Arc::new(catalog))
    }

    #[test]
    fn test_unqualified_field_and_schemas() {
        let r = resolver();

        let username = r.resolve("username", AnyTypeKind::User).unwrap();
        assert_eq!(username.kind, AnyTypeKind::User);
        assert_eq!(username.qualifier, None);
        assert!(username.is_field("username"));

        let email = r.resolve("email", AnyTypeKind::User).unwrap();
        assert_eq!(email.schema_type(), Some(SchemaType::Plain));

        let cn = r.resolve("cn", AnyTypeKind::User).unwrap();
        assert_eq!(cn.schema_type(), Some(SchemaType::Derived));

        let vdata = r.resolve("virtualdata", AnyTypeKind::User).unwrap();
        assert_eq!(vdata.schema_type(), Some(SchemaType::Virtual));
    }

    #[test]
    fn test_unknown_schema_is_undetermined() {
        let reference = resolver().resolve("nickname", AnyTypeKind::User).unwrap();
        assert_eq!(
            reference.target,
            AttrTarget::Schema {
                schema_type: None,
                name: "nickname".into()
            }
        );
    }

    #[test]
    fn test_group_qualifier_switches_kind() {
        let reference = resolver()
            .resolve("groups[admins].name", AnyTypeKind::User)
            .unwrap();
        assert_eq!(reference.kind, AnyTypeKind::Group);
        assert_eq!(reference.qualifier, Some(Qualifier::Group("admins".into())));
        assert!(reference.is_field("name"));
    }

    #[test]
    fn test_relationship_qualifier() {
        let r = resolver();
        let printers = r
            .resolve("relationships[neighborhood][PRINTER].email", AnyTypeKind::User)
            .unwrap();
        assert_eq!(printers.kind, AnyTypeKind::AnyObject);
        assert_eq!(
            printers.qualifier,
            Some(Qualifier::Relationship {
                rel_type: "neighborhood".into(),
                any_type: "PRINTER".into()
            })
        );

        let users = r
            .resolve("relationships[neighborhood][USER].username", AnyTypeKind::AnyObject)
            .unwrap();
        assert_eq!(users.kind, AnyTypeKind::User);
    }

    #[test]
    fn test_membership_and_privileges() {
        let r = resolver();
        let level = r
            .resolve("memberships[admins].level", AnyTypeKind::User)
            .unwrap();
        assert_eq!(level.kind, AnyTypeKind::User);
        assert_eq!(level.schema_type(), Some(SchemaType::Plain));

        let privileges = r.resolve("privileges[console]", AnyTypeKind::User).unwrap();
        assert_eq!(privileges.target, AttrTarget::Privileges);

        assert!(r.resolve("privileges[console]", AnyTypeKind::Group).is_err());
    }

    #[test]
    fn test_invalid_expressions() {
        let r = resolver();
        for expression in ["", "groups[admins]", "groups[a].users[b].email", "a.b", "x]"] {
            let err = r.resolve(expression, AnyTypeKind::User).unwrap_err();
            assert!(
                matches!(err, ProvisioningError::InvalidExpression { .. }),
                "{expression} should be invalid"
            );
        }
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let r = resolver();
        for expression in ["email", "groups[admins].name", "relationships[n][PRINTER].email"] {
            assert_eq!(
                r.resolve(expression, AnyTypeKind::User).unwrap(),
                r.resolve(expression, AnyTypeKind::User).unwrap()
            );
        }
    }
}
