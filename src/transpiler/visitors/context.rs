//! Shared state of the clause visitors of one SELECT layer.

use crate::ast::Value;
use crate::config::CompilerConfig;
use crate::error::{CompileError, CompileResult};
use crate::plan::{JoinTarget, SelectPlan};
use crate::schema::{DbType, MemberKind, Schema, TypeToken};
use crate::transpiler::alias::{AliasResolver, NavigationJoin};
use crate::transpiler::params::{ParamContext, literal};
use crate::transpiler::traits::SqlGenerator;

/// Precedence of a fragment that never needs parentheses.
pub const ATOM: u8 = u8::MAX;
/// Precedence of a comparison or other boolean test.
pub const TEST: u8 = 3;

/// A rendered expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub sql: String,
    pub prec: u8,
    /// Column type when the fragment is a plain column
    pub db_type: Option<DbType>,
    /// True when the fragment is a boolean test (usable in WHERE as is)
    pub boolean: bool,
}

impl Fragment {
    pub fn atom(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            prec: ATOM,
            db_type: None,
            boolean: false,
        }
    }

    pub fn new(sql: impl Into<String>, prec: u8) -> Self {
        Self {
            prec,
            ..Self::atom(sql)
        }
    }

    pub fn test(sql: impl Into<String>) -> Self {
        Self {
            boolean: true,
            ..Self::new(sql, TEST)
        }
    }

    pub fn typed(mut self, db_type: Option<DbType>) -> Self {
        self.db_type = db_type;
        self
    }

    /// SQL text, parenthesized when it binds looser than `parent`.
    pub fn wrap(&self, parent: u8, strict: bool) -> String {
        if self.prec < parent || (strict && self.prec == parent) {
            format!("({})", self.sql)
        } else {
            self.sql.clone()
        }
    }
}

/// A row source reachable from the layer: the root, a join or a navigation.
#[derive(Debug, Clone, PartialEq)]
pub struct RowRef {
    /// Alias-resolver key (`s0`, `s1`, `s0.CloudServer`)
    pub key: String,
    pub alias: String,
    pub ty: Option<TypeToken>,
    /// Columns are read by member name from a derived table
    pub derived: bool,
    /// Key column that is NULL when an outer-joined row is absent
    pub existence: Option<String>,
}

/// Result of walking a member path.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Column(String, Option<DbType>),
    /// An entity row; `true` for a collection navigation
    Row(RowRef, bool),
}

pub struct VisitContext<'a> {
    pub schema: &'a Schema,
    pub generator: &'a dyn SqlGenerator,
    pub params: &'a mut ParamContext,
    pub plan: &'a SelectPlan,
    pub aliases: AliasResolver,
    parameterized: bool,
    unicode: bool,
}

impl<'a> VisitContext<'a> {
    pub fn new(
        schema: &'a Schema,
        config: &CompilerConfig,
        generator: &'a dyn SqlGenerator,
        params: &'a mut ParamContext,
        plan: &'a SelectPlan,
    ) -> Self {
        let mut aliases = AliasResolver::new();
        aliases.alias("s0");
        for join in &plan.joins {
            aliases.alias(&format!("s{}", join.source));
        }
        Self {
            schema,
            generator,
            params,
            plan,
            aliases,
            parameterized: config.parameterized,
            unicode: config.unicode_literals,
        }
    }

    pub fn quote(&self, name: &str) -> String {
        self.generator.quote_identifier(name)
    }

    /// Bound source `id` of this layer.
    pub fn source(&mut self, id: usize) -> CompileResult<RowRef> {
        let derived = if id == 0 {
            self.plan.is_derived()
        } else {
            let join = self
                .plan
                .joins
                .iter()
                .find(|j| j.source == id)
                .ok_or_else(|| {
                    CompileError::ambiguous(format!("row source ${} is not in scope", id))
                })?;
            matches!(join.target, JoinTarget::Subquery(_))
        };
        let key = format!("s{}", id);
        Ok(RowRef {
            alias: self.aliases.alias(&key),
            key,
            ty: self.plan.source_type(id).cloned(),
            derived,
            existence: None,
        })
    }

    /// `alias.[column]` for `member` of `row`.
    pub fn column(&self, row: &RowRef, member: &str) -> CompileResult<(String, Option<DbType>)> {
        let Some(ty) = &row.ty else {
            return Ok((format!("{}.{}", row.alias, self.quote(member)), None));
        };
        let entity = self.schema.entity(ty)?;
        match entity.member(member).map(|m| (&m.name, &m.kind)) {
            Some((name, MemberKind::Column(col))) => {
                let name = if row.derived { name } else { &col.column };
                Ok((format!("{}.{}", row.alias, self.quote(name)), Some(col.db_type)))
            }
            Some((name, MemberKind::Navigation(_))) => Err(CompileError::ambiguous(format!(
                "navigation {}.{} used as a value",
                ty, name
            ))),
            None if row.derived => Ok((format!("{}.{}", row.alias, self.quote(member)), None)),
            None => Err(CompileError::member(ty, member)),
        }
    }

    /// Outer-joined row behind navigation `member` of `row`, registering
    /// its LEFT JOIN on first use.
    pub fn navigation(&mut self, row: &RowRef, member: &str) -> CompileResult<(RowRef, bool)> {
        let schema = self.schema;
        let Some(ty) = &row.ty else {
            return Err(CompileError::ambiguous(format!(
                "'{}' is not a navigation of an anonymous row",
                member
            )));
        };
        let owner = schema.entity(ty)?;
        let (name, nav) = owner
            .member(member)
            .and_then(|m| m.as_navigation().map(|n| (m.name.as_str(), n)))
            .ok_or_else(|| CompileError::member(ty, member))?;
        let fk = nav
            .foreign_key
            .as_ref()
            .ok_or_else(|| CompileError::MissingForeignKey {
                entity: ty.to_string(),
                member: name.to_string(),
            })?;
        let target = schema.entity(&nav.target)?;
        let key = format!("{}.{}", row.key, name);
        let known = self.aliases.get(&key).is_some();
        let alias = self.aliases.alias(&key);

        let mut on = Vec::new();
        let mut existence = None;
        for (owner_key, target_key) in fk.pairs() {
            let (lhs, _) = self.column(row, owner_key)?;
            let col = target.column(target_key)?;
            let rhs = format!("{}.{}", alias, self.quote(&col.column));
            existence.get_or_insert_with(|| rhs.clone());
            on.push((lhs, rhs));
        }
        if !known {
            self.aliases.add_navigation(NavigationJoin {
                alias: alias.clone(),
                table: self.quote(&target.table),
                on,
            });
        }
        Ok((
            RowRef {
                key,
                alias,
                ty: Some(nav.target.clone()),
                derived: false,
                existence,
            },
            nav.many,
        ))
    }

    /// Walk `$id.hop.hop...`; intermediate hops must be reference navigations.
    pub fn resolve(&mut self, id: usize, hops: &[&str]) -> CompileResult<Resolved> {
        let mut row = self.source(id)?;
        let Some((last, init)) = hops.split_last() else {
            return Ok(Resolved::Row(row, false));
        };
        for hop in init {
            let (next, many) = self.navigation(&row, hop)?;
            if many {
                return Err(CompileError::ambiguous(format!(
                    "collection navigation '{}' must be flattened with SelectMany",
                    hop
                )));
            }
            row = next;
        }
        let is_navigation = match &row.ty {
            Some(ty) => self.schema.entity(ty)?.navigation(last).is_some(),
            None => false,
        };
        if is_navigation {
            let (next, many) = self.navigation(&row, last)?;
            return Ok(Resolved::Row(next, many));
        }
        let (sql, db_type) = self.column(&row, last)?;
        Ok(Resolved::Column(sql, db_type))
    }

    /// Render a constant, as a parameter when the configuration asks for one.
    pub fn constant(&mut self, value: &Value) -> String {
        let db_type = DbType::infer(value);
        self.constant_typed(value, db_type, None)
    }

    /// Render a constant bound for a column of `db_type`.
    pub fn constant_typed(&mut self, value: &Value, db_type: DbType, size: Option<u32>) -> String {
        if !self.parameterized || value.is_null() {
            return literal(value, self.generator, self.unicode);
        }
        match value {
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| self.constant(v)).collect();
                format!("({})", parts.join(", "))
            }
            v => self.params.add_param(v.clone(), db_type, size, self.generator),
        }
    }

    /// Inline string literal, ignoring parameterization.
    pub fn string_literal(&self, s: &str) -> String {
        self.generator.string_literal(s, self.unicode)
    }

    /// Navigation joins registered so far, rendered.
    pub fn navigation_joins(&self) -> String {
        let mut sql = String::new();
        for join in self.aliases.navigations() {
            let on: Vec<String> = join
                .on
                .iter()
                .map(|(l, r)| format!("{} = {}", l, r))
                .collect();
            sql.push_str(&format!(
                " LEFT JOIN {} {} ON {}",
                join.table,
                join.alias,
                on.join(" AND ")
            ));
        }
        sql
    }
}
