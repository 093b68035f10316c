//! Schema file parser for `.nav` format.
//!
//! Parses entity definitions like:
//! ```text
//! -- demo rows
//! entity Demo => Sys_Demo (
//!     Id int key identity,
//!     Name nvarchar(32) nullable,
//!     Code varchar(32) column(DemoCode),
//!     Version timestamp rowversion,
//!     Scratch nvarchar ignore,
//!     Client ref Client fk(ClientId => Id),
//!     Accounts many ClientAccount fk(Id => ClientId)
//! )
//! ```
//! The table name defaults to the entity name when `=> Table` is omitted.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while1},
    character::complete::{char, digit1, multispace0, multispace1, not_line_ending},
    combinator::{map, opt, value},
    multi::{many0, separated_list1},
    sequence::{delimited, preceded},
};

use super::{
    ColumnDescriptor, DbType, EntityDescriptor, ForeignKey, MemberDescriptor, MemberKind,
    NavigationDescriptor, Schema,
};
use crate::error::{CompileError, CompileResult};

/// Parse complete `.nav` text into a schema.
pub fn parse(input: &str) -> CompileResult<Schema> {
    match parse_schema(input) {
        Ok(("", entities)) => build(entities),
        Ok((remaining, _)) => Err(CompileError::Schema(format!(
            "Unexpected content: '{}'",
            remaining.trim().lines().next().unwrap_or_default()
        ))),
        Err(e) => Err(CompileError::Schema(format!("Parse error: {:?}", e))),
    }
}

fn build(entities: Vec<RawEntity<'_>>) -> CompileResult<Schema> {
    let mut schema = Schema::new();
    for raw in entities {
        let mut members = Vec::with_capacity(raw.members.len());
        for (name, member) in raw.members {
            let kind = match member {
                RawMember::Column {
                    type_name,
                    size,
                    flags,
                } => {
                    let db_type = DbType::from_name(type_name).ok_or_else(|| {
                        CompileError::Schema(format!(
                            "Unknown type '{}' for {}.{}",
                            type_name, raw.name, name
                        ))
                    })?;
                    let mut column = ColumnDescriptor::new(name, db_type);
                    column.size = size;
                    for flag in flags {
                        match flag {
                            Flag::Key => column.key = true,
                            Flag::Identity => column.identity = true,
                            Flag::Nullable => column.nullable = true,
                            Flag::RowVersion => column.row_version = true,
                            Flag::Ignore => column.excluded = true,
                            Flag::Column(c) => column.column = c.to_string(),
                        }
                    }
                    MemberKind::Column(column)
                }
                RawMember::Navigation { many, target, fk } => {
                    MemberKind::Navigation(NavigationDescriptor {
                        target: target.into(),
                        many,
                        foreign_key: fk.map(|(owner, target)| ForeignKey::new(owner, target)),
                    })
                }
            };
            if members.iter().any(|m: &MemberDescriptor| m.name == name) {
                return Err(CompileError::Schema(format!(
                    "Duplicate member {}.{}",
                    raw.name, name
                )));
            }
            members.push(MemberDescriptor {
                name: name.to_string(),
                kind,
            });
        }
        schema.register(EntityDescriptor {
            ty: raw.name.into(),
            table: raw.table.unwrap_or(raw.name).to_string(),
            members,
        });
    }
    Ok(schema)
}

// =============================================================================
// Parsing Combinators
// =============================================================================

struct RawEntity<'a> {
    name: &'a str,
    table: Option<&'a str>,
    members: Vec<(&'a str, RawMember<'a>)>,
}

enum RawMember<'a> {
    Column {
        type_name: &'a str,
        size: Option<u32>,
        flags: Vec<Flag<'a>>,
    },
    Navigation {
        many: bool,
        target: &'a str,
        fk: Option<(Vec<&'a str>, Vec<&'a str>)>,
    },
}

#[derive(Clone)]
enum Flag<'a> {
    Key,
    Identity,
    Nullable,
    RowVersion,
    Ignore,
    Column(&'a str),
}

/// Parse identifier (entity/member/table name)
fn identifier(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_').parse(input)
}

/// Skip whitespace and comments
fn ws_and_comments(input: &str) -> IResult<&str, ()> {
    let (input, _) = many0(alt((
        map(multispace1, |_| ()),
        map((tag("--"), not_line_ending), |_| ()),
    )))
    .parse(input)?;
    Ok((input, ()))
}

/// Type size: (32) or (max); `max` maps to no size.
fn type_size(input: &str) -> IResult<&str, Option<u32>> {
    delimited(
        char('('),
        alt((
            value(None, tag_no_case("max")),
            map(digit1, |d: &str| d.parse::<u32>().ok()),
        )),
        char(')'),
    )
    .parse(input)
}

fn flag(input: &str) -> IResult<&str, Flag<'_>> {
    alt((
        map(
            (
                tag_no_case("column"),
                char('('),
                multispace0,
                identifier,
                multispace0,
                char(')'),
            ),
            |(_, _, _, name, _, _)| Flag::Column(name),
        ),
        value(Flag::Identity, tag_no_case("identity")),
        value(Flag::Key, tag_no_case("key")),
        value(Flag::Nullable, tag_no_case("nullable")),
        value(Flag::RowVersion, tag_no_case("rowversion")),
        value(Flag::Ignore, tag_no_case("ignore")),
    ))
    .parse(input)
}

fn column_def(input: &str) -> IResult<&str, RawMember<'_>> {
    let (input, type_name) = identifier(input)?;
    let (input, size) = opt(type_size).parse(input)?;
    let (input, flags) = many0(preceded(multispace1, flag)).parse(input)?;
    Ok((
        input,
        RawMember::Column {
            type_name,
            size: size.flatten(),
            flags,
        },
    ))
}

/// Comma-separated member names inside `fk(...)`.
fn key_list(input: &str) -> IResult<&str, Vec<&str>> {
    separated_list1(
        (multispace0, char(','), multispace0),
        identifier,
    )
    .parse(input)
}

/// fk(A, B => C, D)
fn foreign_key(input: &str) -> IResult<&str, (Vec<&str>, Vec<&str>)> {
    let (input, _) = tag_no_case("fk").parse(input)?;
    let (input, _) = (multispace0, char('('), multispace0).parse(input)?;
    let (input, owner) = key_list(input)?;
    let (input, _) = (multispace0, tag("=>"), multispace0).parse(input)?;
    let (input, target) = key_list(input)?;
    let (input, _) = (multispace0, char(')')).parse(input)?;
    Ok((input, (owner, target)))
}

fn navigation_def(input: &str) -> IResult<&str, RawMember<'_>> {
    let (input, many) = alt((
        value(false, tag_no_case("ref")),
        value(true, tag_no_case("many")),
    ))
    .parse(input)?;
    let (input, _) = multispace1(input)?;
    let (input, target) = identifier(input)?;
    let (input, fk) = opt(preceded(multispace1, foreign_key)).parse(input)?;
    Ok((input, RawMember::Navigation { many, target, fk }))
}

/// Parse a single member definition
fn member(input: &str) -> IResult<&str, (&str, RawMember<'_>)> {
    let (input, _) = ws_and_comments(input)?;
    let (input, name) = identifier(input)?;
    let (input, _) = multispace1(input)?;
    let (input, member) = alt((navigation_def, column_def)).parse(input)?;
    Ok((input, (name, member)))
}

/// Parse an entity definition
fn entity(input: &str) -> IResult<&str, RawEntity<'_>> {
    let (input, _) = ws_and_comments(input)?;
    let (input, _) = tag_no_case("entity").parse(input)?;
    let (input, _) = multispace1(input)?;
    let (input, name) = identifier(input)?;
    let (input, table) = opt(preceded(
        (multispace0, tag("=>"), multispace0),
        identifier,
    ))
    .parse(input)?;
    let (input, _) = ws_and_comments(input)?;
    let (input, _) = char('(').parse(input)?;
    let (input, members) =
        separated_list1(preceded(ws_and_comments, char(',')), member).parse(input)?;
    let (input, _) = ws_and_comments(input)?;
    let (input, _) = char(')').parse(input)?;

    Ok((
        input,
        RawEntity {
            name,
            table,
            members,
        },
    ))
}

/// Parse complete schema file
fn parse_schema(input: &str) -> IResult<&str, Vec<RawEntity<'_>>> {
    let (input, _) = ws_and_comments(input)?;
    let (input, entities) = many0(entity).parse(input)?;
    let (input, _) = ws_and_comments(input)?;
    Ok((input, entities))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TypeToken;

    const DEMO: &str = r#"
        -- demo rows
        entity Demo => Sys_Demo (
            Id int key identity,
            Name nvarchar(32) nullable,
            Code varchar(32) column(DemoCode),
            Version timestamp rowversion,
            Scratch nvarchar(max) ignore,
            Client ref Client fk(ClientId => Id),
            Accounts many ClientAccount fk(Id => ClientId)
        )

        entity Client (
            Id int key identity,
            Name nvarchar(64)
        )
    "#;

    #[test]
    fn test_parse_entities() {
        let schema = Schema::parse(DEMO).expect("parse failed");
        let demo = schema.entity(&TypeToken::new("Demo")).unwrap();
        assert_eq!(demo.table, "Sys_Demo");
        assert_eq!(demo.members.len(), 7);

        let id = demo.column("Id").unwrap();
        assert!(id.key && id.identity && !id.nullable);
        assert_eq!(id.db_type, DbType::Int);

        let name = demo.column("Name").unwrap();
        assert_eq!(name.size, Some(32));
        assert!(name.nullable);

        assert_eq!(demo.column("Code").unwrap().column, "DemoCode");
        assert!(demo.column("Version").unwrap().row_version);
        let scratch = demo.column("Scratch").unwrap();
        assert!(scratch.excluded);
        assert_eq!(scratch.size, None);

        let client = schema.entity(&TypeToken::new("Client")).unwrap();
        assert_eq!(client.table, "Client");
    }

    #[test]
    fn test_parse_navigations() {
        let schema = Schema::parse(DEMO).expect("parse failed");
        let demo = schema.entity(&TypeToken::new("Demo")).unwrap();

        let client = demo.navigation("Client").unwrap();
        assert!(!client.many);
        assert_eq!(client.target, TypeToken::new("Client"));
        assert_eq!(
            client.foreign_key,
            Some(ForeignKey::new(["ClientId"], ["Id"]))
        );

        let accounts = demo.navigation("Accounts").unwrap();
        assert!(accounts.many);
    }

    #[test]
    fn test_composite_fk_and_missing_fk() {
        let input = r#"
            entity Order (
                Id int key,
                Lines many OrderLine fk(Id, Id => OrderId, Seq),
                Owner ref Person
            )
        "#;
        let schema = Schema::parse(input).expect("parse failed");
        let order = schema.entity(&TypeToken::new("Order")).unwrap();
        let lines = order.navigation("Lines").unwrap();
        let fk = lines.foreign_key.as_ref().unwrap();
        assert_eq!(fk.target_keys, vec!["OrderId", "Seq"]);
        assert_eq!(order.navigation("Owner").unwrap().foreign_key, None);
    }

    #[test]
    fn test_unknown_type_is_schema_error() {
        let err = Schema::parse("entity A ( Id widget )").unwrap_err();
        assert!(matches!(err, CompileError::Schema(ref m) if m.contains("widget")));
    }

    #[test]
    fn test_trailing_garbage() {
        let err = Schema::parse("entity A ( Id int ) nonsense").unwrap_err();
        assert!(matches!(err, CompileError::Schema(_)));
    }
}
