//! Entity metadata: table names, persisted members, keys and foreign keys.
//!
//! A [`Schema`] is built once (from code, `.nav` text or JSON) and consulted
//! read-only by the parser and every visitor of a compilation.

pub mod parser;

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ast::Value;
use crate::error::{CompileError, CompileResult};

/// Stable identity of an entity type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeToken(String);

impl TypeToken {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TypeToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TypeToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&TypeToken> for TypeToken {
    fn from(t: &TypeToken) -> Self {
        t.clone()
    }
}

/// Database column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Bit,
    Decimal,
    Money,
    Float,
    Real,
    Char,
    NChar,
    VarChar,
    NVarChar,
    Text,
    NText,
    Date,
    Time,
    DateTime,
    DateTime2,
    /// Row-version stamp (SQL Server `timestamp`)
    Timestamp,
    UniqueIdentifier,
    Binary,
    VarBinary,
}

impl DbType {
    /// Resolve a type name as written in schema text.
    pub fn from_name(name: &str) -> Option<Self> {
        let ty = match name.to_ascii_lowercase().as_str() {
            "tinyint" | "byte" => DbType::TinyInt,
            "smallint" | "short" => DbType::SmallInt,
            "int" | "integer" => DbType::Int,
            "bigint" | "long" => DbType::BigInt,
            "bit" | "bool" | "boolean" => DbType::Bit,
            "decimal" | "numeric" => DbType::Decimal,
            "money" => DbType::Money,
            "float" | "double" => DbType::Float,
            "real" => DbType::Real,
            "char" => DbType::Char,
            "nchar" => DbType::NChar,
            "varchar" => DbType::VarChar,
            "nvarchar" | "string" => DbType::NVarChar,
            "text" => DbType::Text,
            "ntext" => DbType::NText,
            "date" => DbType::Date,
            "time" => DbType::Time,
            "datetime" => DbType::DateTime,
            "datetime2" => DbType::DateTime2,
            "timestamp" | "rowversion" => DbType::Timestamp,
            "uniqueidentifier" | "guid" | "uuid" => DbType::UniqueIdentifier,
            "binary" => DbType::Binary,
            "varbinary" => DbType::VarBinary,
            _ => return None,
        };
        Some(ty)
    }

    /// Parameter type inferred from a constant when no column type is known.
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::Bool(_) => DbType::Bit,
            Value::Int(n) if i32::try_from(*n).is_ok() => DbType::Int,
            Value::Int(_) => DbType::BigInt,
            Value::Float(_) => DbType::Float,
            Value::Decimal(_) => DbType::Decimal,
            Value::DateTime(_) => DbType::DateTime,
            Value::Guid(_) => DbType::UniqueIdentifier,
            Value::Null | Value::String(_) | Value::List(_) => DbType::NVarChar,
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(
            self,
            DbType::Char
                | DbType::NChar
                | DbType::VarChar
                | DbType::NVarChar
                | DbType::Text
                | DbType::NText
        )
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, DbType::Bit)
    }
}

/// A persisted member mapped to one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name in the table (defaults to the member name)
    pub column: String,
    pub db_type: DbType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    #[serde(default)]
    pub key: bool,
    #[serde(default)]
    pub identity: bool,
    #[serde(default)]
    pub nullable: bool,
    /// Mapped on the type but never read or written
    #[serde(default)]
    pub excluded: bool,
    #[serde(default)]
    pub row_version: bool,
}

impl ColumnDescriptor {
    pub fn new(column: impl Into<String>, db_type: DbType) -> Self {
        Self {
            column: column.into(),
            db_type,
            size: None,
            key: false,
            identity: false,
            nullable: false,
            excluded: false,
            row_version: db_type == DbType::Timestamp,
        }
    }

    pub fn size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    pub fn key(mut self) -> Self {
        self.key = true;
        self
    }

    pub fn identity(mut self) -> Self {
        self.identity = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn excluded(mut self) -> Self {
        self.excluded = true;
        self
    }

    pub fn row_version(mut self) -> Self {
        self.row_version = true;
        self
    }

    /// Written by INSERT/UPDATE payloads.
    pub fn is_writable(&self) -> bool {
        !self.identity && !self.excluded && !self.row_version
    }
}

/// Foreign-key pairing of a navigation: `owner_keys[i]` matches `target_keys[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub owner_keys: Vec<String>,
    pub target_keys: Vec<String>,
}

impl ForeignKey {
    pub fn new<S: Into<String>>(
        owner_keys: impl IntoIterator<Item = S>,
        target_keys: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            owner_keys: owner_keys.into_iter().map(Into::into).collect(),
            target_keys: target_keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.owner_keys
            .iter()
            .map(String::as_str)
            .zip(self.target_keys.iter().map(String::as_str))
    }
}

/// A reference (`many == false`) or collection navigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationDescriptor {
    pub target: TypeToken,
    #[serde(default)]
    pub many: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<ForeignKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberKind {
    Column(ColumnDescriptor),
    Navigation(NavigationDescriptor),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberDescriptor {
    pub name: String,
    pub kind: MemberKind,
}

impl MemberDescriptor {
    pub fn as_column(&self) -> Option<&ColumnDescriptor> {
        match &self.kind {
            MemberKind::Column(c) => Some(c),
            MemberKind::Navigation(_) => None,
        }
    }

    pub fn as_navigation(&self) -> Option<&NavigationDescriptor> {
        match &self.kind {
            MemberKind::Navigation(n) => Some(n),
            MemberKind::Column(_) => None,
        }
    }
}

/// Metadata of one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub ty: TypeToken,
    pub table: String,
    pub members: Vec<MemberDescriptor>,
}

impl EntityDescriptor {
    pub fn builder(ty: impl Into<TypeToken>, table: impl Into<String>) -> EntityBuilder {
        EntityBuilder {
            entity: EntityDescriptor {
                ty: ty.into(),
                table: table.into(),
                members: Vec::new(),
            },
        }
    }

    /// Find a member, exact name first, then case-insensitively.
    pub fn member(&self, name: &str) -> Option<&MemberDescriptor> {
        self.members
            .iter()
            .find(|m| m.name == name)
            .or_else(|| self.members.iter().find(|m| m.name.eq_ignore_ascii_case(name)))
    }

    pub fn column(&self, name: &str) -> CompileResult<&ColumnDescriptor> {
        self.member(name)
            .and_then(MemberDescriptor::as_column)
            .ok_or_else(|| CompileError::member(&self.ty, name))
    }

    pub fn navigation(&self, name: &str) -> Option<&NavigationDescriptor> {
        self.member(name).and_then(MemberDescriptor::as_navigation)
    }

    /// Persisted, non-excluded columns in declared order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &ColumnDescriptor)> {
        self.members.iter().filter_map(|m| match &m.kind {
            MemberKind::Column(c) if !c.excluded => Some((m.name.as_str(), c)),
            _ => None,
        })
    }

    pub fn keys(&self) -> impl Iterator<Item = (&str, &ColumnDescriptor)> {
        self.columns().filter(|(_, c)| c.key)
    }

    pub fn identity(&self) -> Option<(&str, &ColumnDescriptor)> {
        self.columns().find(|(_, c)| c.identity)
    }
}

/// Fluent builder for [`EntityDescriptor`].
pub struct EntityBuilder {
    entity: EntityDescriptor,
}

impl EntityBuilder {
    /// Column whose table column has the member's name.
    pub fn column(self, name: &str, db_type: DbType, f: impl FnOnce(ColumnDescriptor) -> ColumnDescriptor) -> Self {
        let column = f(ColumnDescriptor::new(name, db_type));
        self.member(name, MemberKind::Column(column))
    }

    pub fn reference(self, name: &str, target: impl Into<TypeToken>, fk: Option<ForeignKey>) -> Self {
        self.navigation(name, target, false, fk)
    }

    pub fn many(self, name: &str, target: impl Into<TypeToken>, fk: Option<ForeignKey>) -> Self {
        self.navigation(name, target, true, fk)
    }

    fn navigation(self, name: &str, target: impl Into<TypeToken>, many: bool, foreign_key: Option<ForeignKey>) -> Self {
        self.member(
            name,
            MemberKind::Navigation(NavigationDescriptor {
                target: target.into(),
                many,
                foreign_key,
            }),
        )
    }

    pub fn member(mut self, name: &str, kind: MemberKind) -> Self {
        self.entity.members.push(MemberDescriptor {
            name: name.to_string(),
            kind,
        });
        self
    }

    pub fn build(self) -> EntityDescriptor {
        self.entity
    }
}

/// Registry of entity descriptors keyed by type token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    entities: BTreeMap<TypeToken, EntityDescriptor>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor (builder style). A later registration of the
    /// same type replaces the earlier one.
    pub fn with(mut self, entity: EntityDescriptor) -> Self {
        self.register(entity);
        self
    }

    pub fn register(&mut self, entity: EntityDescriptor) {
        self.entities.insert(entity.ty.clone(), entity);
    }

    pub fn get(&self, ty: &TypeToken) -> Option<&EntityDescriptor> {
        self.entities.get(ty)
    }

    pub fn entity(&self, ty: &TypeToken) -> CompileResult<&EntityDescriptor> {
        self.get(ty)
            .ok_or_else(|| CompileError::UnknownEntity(ty.to_string()))
    }

    pub fn is_entity(&self, ty: &TypeToken) -> bool {
        self.entities.contains_key(ty)
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityDescriptor> {
        self.entities.values()
    }

    /// Parse a schema from `.nav` text.
    pub fn parse(input: &str) -> CompileResult<Self> {
        parser::parse(input)
    }

    /// Export schema to JSON string
    pub fn to_json(&self) -> CompileResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CompileError::Schema(format!("JSON serialization failed: {}", e)))
    }

    /// Import schema from JSON string
    pub fn from_json(json: &str) -> CompileResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| CompileError::Schema(format!("JSON deserialization failed: {}", e)))
    }

    /// Load a schema from a `.nav` or `.json` file.
    pub fn from_file(path: &Path) -> CompileResult<Self> {
        let content = std::fs::read_to_string(path)?;
        if content.trim_start().starts_with('{') {
            Self::from_json(&content)
        } else {
            Self::parse(&content)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo() -> EntityDescriptor {
        EntityDescriptor::builder("Demo", "Sys_Demo")
            .column("Id", DbType::Int, |c| c.key().identity())
            .column("Name", DbType::NVarChar, |c| c.size(32).nullable())
            .column("Scratch", DbType::NVarChar, |c| c.excluded())
            .column("Version", DbType::Timestamp, |c| c)
            .reference("Client", "Client", Some(ForeignKey::new(["ClientId"], ["Id"])))
            .build()
    }

    #[test]
    fn test_columns_skip_excluded_and_navigations() {
        let e = demo();
        let names: Vec<&str> = e.columns().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Id", "Name", "Version"]);
        assert_eq!(e.keys().count(), 1);
        assert_eq!(e.identity().map(|(n, _)| n), Some("Id"));
        assert!(e.column("Version").unwrap().row_version);
        assert!(!e.column("Version").unwrap().is_writable());
    }

    #[test]
    fn test_member_lookup() {
        let e = demo();
        assert!(e.member("name").is_some());
        assert!(e.navigation("Client").is_some());
        assert!(matches!(
            e.column("Client"),
            Err(CompileError::UnknownMember { .. })
        ));
    }

    #[test]
    fn test_json_round_trip() {
        let schema = Schema::new().with(demo());
        let json = schema.to_json().unwrap();
        assert_eq!(Schema::from_json(&json).unwrap(), schema);
    }

    #[test]
    fn test_unknown_entity() {
        let err = Schema::new().entity(&"Nope".into()).unwrap_err();
        assert!(matches!(err, CompileError::UnknownEntity(ref s) if s == "Nope"));
    }
}
