//! Recursive-descent parser for the SELECT dialect.
//!
//! Grammar (keywords case-insensitive):
//!
//! ```text
//! select     := SELECT [DISTINCT [ON ( colref {, colref} )]] items
//!               FROM table [[AS] alias] {ignored join tokens}
//!               [WHERE or_expr] [ORDER BY ...] [GROUP BY ...] [LIMIT n] [;]
//! items      := item {, item}
//! item       := * | prefix.* | colref [[AS] alias]
//! or_expr    := and_expr {OR and_expr}
//! and_expr   := primary {AND primary}
//! primary    := ( or_expr ) | leaf
//! leaf       := colref OP literal | colref LIKE literal | colref IS [NOT] NULL
//! colref     := [prefix .] name
//! ```
//!
//! Select items and leaves that do not fit these shapes are kept as
//! `Unsupported`/`Opaque` nodes instead of failing the whole query.

use tracing::debug;

use crate::error::QueryError;
use crate::lexer::{tokenize, Token};

const CLAUSE_KEYWORDS: &[&str] = &["WHERE", "ORDER", "GROUP", "HAVING", "LIMIT"];

const JOIN_KEYWORDS: &[&str] = &[
    "JOIN", "INNER", "LEFT", "RIGHT", "FULL", "CROSS", "NATURAL", "OUTER", "ON",
];

/// A possibly prefixed column reference such as `p.id`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    pub qualifier: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    Wildcard,
    Column {
        column: ColumnRef,
        alias: Option<String>,
    },
    /// Expressions the engine cannot project (functions, arithmetic).
    Unsupported(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Distinct {
    None,
    Rows,
    On(Vec<ColumnRef>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Like,
}

/// WHERE condition tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Or(Box<Condition>, Box<Condition>),
    And(Box<Condition>, Box<Condition>),
    Compare {
        column: ColumnRef,
        op: CompareOp,
        value: String,
    },
    IsNull {
        column: ColumnRef,
        negated: bool,
    },
    /// A leaf the engine does not understand; evaluates to false.
    Opaque(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub distinct: Distinct,
    pub projection: Vec<SelectItem>,
    pub from: TableRef,
    pub selection: Option<Condition>,
    pub limit: Option<usize>,
}

/// Parse a SELECT statement.
pub fn parse_select(sql: &str) -> Result<SelectStatement, QueryError> {
    let tokens = tokenize(sql)?;
    Parser { tokens, pos: 0 }.parse_statement()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.peek().is_some_and(|t| t.is_keyword(kw)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn at_end(&self) -> bool {
        matches!(self.peek(), None | Some(Token::Semicolon))
    }

    fn at_clause_keyword(&self) -> bool {
        self.peek().is_some_and(is_clause_keyword)
    }

    fn parse_statement(mut self) -> Result<SelectStatement, QueryError> {
        if !self.eat_keyword("SELECT") {
            return Err(QueryError::Parse("query must start with SELECT".to_string()));
        }
        let distinct = self.parse_distinct()?;
        let projection = self.parse_projection()?;
        if !self.eat_keyword("FROM") {
            return Err(QueryError::MissingFrom);
        }
        let from = self.parse_table_ref()?;
        self.skip_join_clauses();

        let mut selection = None;
        let mut limit = None;
        while !self.at_end() {
            if self.eat_keyword("WHERE") {
                if !self.at_end() && !self.at_clause_keyword() {
                    selection = Some(self.parse_or()?);
                }
            } else if self.eat_keyword("ORDER") || self.eat_keyword("GROUP") {
                self.eat_keyword("BY");
                let skipped = self.skip_until_clause();
                debug!("Ignoring ORDER BY/GROUP BY clause ({} tokens)", skipped);
            } else if self.eat_keyword("HAVING") {
                self.skip_until_clause();
            } else if self.eat_keyword("LIMIT") {
                limit = Some(self.parse_limit()?);
            } else {
                return Err(self.unexpected());
            }
        }
        self.eat(&Token::Semicolon);
        if self.peek().is_some() {
            return Err(self.unexpected());
        }

        Ok(SelectStatement {
            distinct,
            projection,
            from,
            selection,
            limit,
        })
    }

    fn unexpected(&self) -> QueryError {
        match self.peek() {
            Some(tok) => QueryError::Parse(format!("unexpected token '{}'", tok)),
            None => QueryError::Parse("unexpected end of query".to_string()),
        }
    }

    fn parse_distinct(&mut self) -> Result<Distinct, QueryError> {
        if !self.eat_keyword("DISTINCT") {
            return Ok(Distinct::None);
        }
        if !self.eat_keyword("ON") {
            return Ok(Distinct::Rows);
        }
        if !self.eat(&Token::LParen) {
            return Err(QueryError::Parse("expected '(' after DISTINCT ON".to_string()));
        }
        let mut columns = Vec::new();
        loop {
            let (column, used) = column_ref_prefix(&self.tokens[self.pos..]).ok_or_else(|| {
                QueryError::Parse("expected a column in DISTINCT ON list".to_string())
            })?;
            self.pos += used;
            columns.push(column);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        if !self.eat(&Token::RParen) {
            return Err(QueryError::Parse("expected ')' to close DISTINCT ON".to_string()));
        }
        Ok(Distinct::On(columns))
    }

    /// Split the select list on commas outside parentheses.
    fn parse_projection(&mut self) -> Result<Vec<SelectItem>, QueryError> {
        let mut items = Vec::new();
        let mut current: Vec<Token> = Vec::new();
        let mut depth = 0usize;
        loop {
            let Some(tok) = self.peek().cloned() else {
                return Err(QueryError::MissingFrom);
            };
            if depth == 0 && tok.is_keyword("FROM") {
                break;
            }
            match tok {
                Token::Comma if depth == 0 => {
                    items.push(interpret_item(std::mem::take(&mut current)));
                    self.pos += 1;
                    continue;
                }
                Token::LParen => depth += 1,
                Token::RParen => depth = depth.saturating_sub(1),
                _ => {}
            }
            current.push(tok);
            self.pos += 1;
        }
        if !current.is_empty() {
            items.push(interpret_item(current));
        }
        if items.is_empty() {
            return Err(QueryError::Parse("empty select list".to_string()));
        }
        Ok(items)
    }

    fn parse_table_ref(&mut self) -> Result<TableRef, QueryError> {
        let (table, used) =
            column_ref_prefix(&self.tokens[self.pos..]).ok_or(QueryError::MissingFrom)?;
        self.pos += used;

        let alias = if self.eat_keyword("AS") {
            match self.peek().and_then(name_of) {
                Some(name) => {
                    self.pos += 1;
                    Some(name)
                }
                None => return Err(QueryError::Parse("expected alias after AS".to_string())),
            }
        } else {
            match self.peek() {
                Some(tok @ Token::Ident(_))
                    if !is_clause_keyword(tok) && !JOIN_KEYWORDS.iter().any(|kw| tok.is_keyword(kw)) =>
                {
                    let name = name_of(tok);
                    self.pos += 1;
                    name
                }
                _ => None,
            }
        };

        Ok(TableRef {
            name: table.name,
            alias,
        })
    }

    fn skip_join_clauses(&mut self) {
        let skipped = self.skip_until_clause();
        if skipped > 0 {
            debug!("Ignoring {} tokens after FROM target; joins are not executed", skipped);
        }
    }

    /// Advance to the next top-level clause keyword or the end of the query.
    fn skip_until_clause(&mut self) -> usize {
        let start = self.pos;
        let mut depth = 0usize;
        while let Some(tok) = self.peek() {
            if depth == 0 && (is_clause_keyword(tok) || *tok == Token::Semicolon) {
                break;
            }
            match tok {
                Token::LParen => depth += 1,
                Token::RParen => depth = depth.saturating_sub(1),
                _ => {}
            }
            self.pos += 1;
        }
        self.pos - start
    }

    fn parse_limit(&mut self) -> Result<usize, QueryError> {
        match self.peek() {
            Some(Token::Number(n)) => {
                let limit = n
                    .parse::<usize>()
                    .map_err(|_| QueryError::Parse(format!("invalid LIMIT '{}'", n)))?;
                self.pos += 1;
                Ok(limit)
            }
            _ => Err(QueryError::Parse("expected a number after LIMIT".to_string())),
        }
    }

    fn parse_or(&mut self) -> Result<Condition, QueryError> {
        let mut left = self.parse_and()?;
        while self.eat_keyword("OR") {
            let right = self.parse_and()?;
            left = Condition::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Condition, QueryError> {
        let mut left = self.parse_primary()?;
        while self.eat_keyword("AND") {
            let right = self.parse_primary()?;
            left = Condition::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<Condition, QueryError> {
        if self.eat(&Token::LParen) {
            let inner = self.parse_or()?;
            if !self.eat(&Token::RParen) {
                return Err(QueryError::Parse(
                    "unbalanced parentheses in WHERE clause".to_string(),
                ));
            }
            return Ok(inner);
        }

        let mut leaf = Vec::new();
        let mut depth = 0usize;
        while let Some(tok) = self.peek() {
            if depth == 0
                && (tok.is_keyword("AND")
                    || tok.is_keyword("OR")
                    || *tok == Token::RParen
                    || *tok == Token::Semicolon
                    || is_clause_keyword(tok))
            {
                break;
            }
            match tok {
                Token::LParen => depth += 1,
                Token::RParen => depth -= 1,
                _ => {}
            }
            leaf.push(tok.clone());
            self.pos += 1;
        }
        if leaf.is_empty() {
            return Err(QueryError::Parse("expected a condition".to_string()));
        }
        Ok(interpret_leaf(leaf))
    }
}

fn is_clause_keyword(tok: &Token) -> bool {
    CLAUSE_KEYWORDS.iter().any(|kw| tok.is_keyword(kw))
}

fn name_of(tok: &Token) -> Option<String> {
    match tok {
        Token::Ident(s) | Token::QuotedIdent(s) => Some(s.clone()),
        _ => None,
    }
}

/// Read `name {. name}` from the front of `tokens`. The last segment is the
/// column; earlier segments form the (discarded) qualifier.
fn column_ref_prefix(tokens: &[Token]) -> Option<(ColumnRef, usize)> {
    let mut parts = vec![name_of(tokens.first()?)?];
    let mut used = 1;
    while tokens.get(used) == Some(&Token::Dot) {
        match tokens.get(used + 1).and_then(name_of) {
            Some(part) => {
                parts.push(part);
                used += 2;
            }
            None => break,
        }
    }
    let name = parts.pop()?;
    let qualifier = if parts.is_empty() {
        None
    } else {
        Some(parts.join("."))
    };
    Some((ColumnRef { qualifier, name }, used))
}

fn join_tokens(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn interpret_item(tokens: Vec<Token>) -> SelectItem {
    match tokens.as_slice() {
        [Token::Star] => return SelectItem::Wildcard,
        [prefix, Token::Dot, Token::Star] if name_of(prefix).is_some() => {
            return SelectItem::Wildcard
        }
        _ => {}
    }
    let Some((column, used)) = column_ref_prefix(&tokens) else {
        return SelectItem::Unsupported(join_tokens(&tokens));
    };
    match &tokens[used..] {
        [] => SelectItem::Column {
            column,
            alias: None,
        },
        [kw, alias] if kw.is_keyword("AS") && name_of(alias).is_some() => SelectItem::Column {
            column,
            alias: name_of(alias),
        },
        [alias] if !alias.is_keyword("AS") && name_of(alias).is_some() => SelectItem::Column {
            column,
            alias: name_of(alias),
        },
        _ => SelectItem::Unsupported(join_tokens(&tokens)),
    }
}

fn compare_op(tok: &Token) -> Option<CompareOp> {
    match tok {
        Token::Eq => Some(CompareOp::Eq),
        Token::NotEq => Some(CompareOp::NotEq),
        Token::Lt => Some(CompareOp::Lt),
        Token::LtEq => Some(CompareOp::LtEq),
        Token::Gt => Some(CompareOp::Gt),
        Token::GtEq => Some(CompareOp::GtEq),
        t if t.is_keyword("LIKE") => Some(CompareOp::Like),
        _ => None,
    }
}

fn literal_text(tok: &Token) -> Option<String> {
    match tok {
        Token::Str(s) | Token::Number(s) | Token::Ident(s) => Some(s.clone()),
        _ => None,
    }
}

fn interpret_leaf(tokens: Vec<Token>) -> Condition {
    let opaque = || Condition::Opaque(join_tokens(&tokens));
    let Some((column, used)) = column_ref_prefix(&tokens) else {
        return opaque();
    };
    match &tokens[used..] {
        [op, value] => match (compare_op(op), literal_text(value)) {
            (Some(op), Some(value)) => Condition::Compare { column, op, value },
            _ if op.is_keyword("IS") && value.is_keyword("NULL") => Condition::IsNull {
                column,
                negated: false,
            },
            _ => opaque(),
        },
        [op, Token::Other('-'), Token::Number(n)] => match compare_op(op) {
            Some(op) if op != CompareOp::Like => Condition::Compare {
                column,
                op,
                value: format!("-{}", n),
            },
            _ => opaque(),
        },
        [is, not, null] if is.is_keyword("IS") && not.is_keyword("NOT") && null.is_keyword("NULL") => {
            Condition::IsNull {
                column,
                negated: true,
            }
        }
        _ => opaque(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(qualifier: Option<&str>, name: &str) -> ColumnRef {
        ColumnRef {
            qualifier: qualifier.map(|q| q.to_string()),
            name: name.to_string(),
        }
    }

    fn compare(name: &str, op: CompareOp, value: &str) -> Condition {
        Condition::Compare {
            column: col(None, name),
            op,
            value: value.to_string(),
        }
    }

    #[test]
    fn test_parse_star() {
        let stmt = parse_select("SELECT * FROM pottery").unwrap();
        assert_eq!(stmt.projection, vec![SelectItem::Wildcard]);
        assert_eq!(stmt.from.name, "pottery");
        assert_eq!(stmt.distinct, Distinct::None);
        assert!(stmt.selection.is_none());
    }

    #[test]
    fn test_parse_columns_with_aliases() {
        let stmt = parse_select("select p.Id as x, name, p.site AS Site FROM t p").unwrap();
        assert_eq!(
            stmt.projection,
            vec![
                SelectItem::Column {
                    column: col(Some("p"), "Id"),
                    alias: Some("x".to_string()),
                },
                SelectItem::Column {
                    column: col(None, "name"),
                    alias: None,
                },
                SelectItem::Column {
                    column: col(Some("p"), "site"),
                    alias: Some("Site".to_string()),
                },
            ]
        );
        assert_eq!(stmt.from.alias, Some("p".to_string()));
    }

    #[test]
    fn test_parse_distinct_on() {
        let stmt = parse_select("SELECT DISTINCT ON (p.id) p.id AS id FROM t p ORDER BY p.id").unwrap();
        assert_eq!(stmt.distinct, Distinct::On(vec![col(Some("p"), "id")]));
    }

    #[test]
    fn test_parse_distinct_rows() {
        let stmt = parse_select("SELECT DISTINCT site FROM t").unwrap();
        assert_eq!(stmt.distinct, Distinct::Rows);
    }

    #[test]
    fn test_or_binds_looser_than_and() {
        let stmt = parse_select("SELECT * FROM t WHERE a = '1' AND b = '2' OR c = '3'").unwrap();
        assert_eq!(
            stmt.selection,
            Some(Condition::Or(
                Box::new(Condition::And(
                    Box::new(compare("a", CompareOp::Eq, "1")),
                    Box::new(compare("b", CompareOp::Eq, "2")),
                )),
                Box::new(compare("c", CompareOp::Eq, "3")),
            ))
        );
    }

    #[test]
    fn test_parenthesized_group() {
        let stmt =
            parse_select("SELECT * FROM t WHERE (p.exdeco = 'Yes' OR p.intdeco = 'Yes')").unwrap();
        assert!(matches!(stmt.selection, Some(Condition::Or(_, _))));
    }

    #[test]
    fn test_leaf_shapes() {
        let stmt = parse_select(
            "SELECT * FROM t WHERE a LIKE '%x%' AND b IS NULL AND c IS NOT NULL AND d >= 10 AND e < -2",
        )
        .unwrap();
        let mut leaves = Vec::new();
        fn collect(c: &Condition, out: &mut Vec<Condition>) {
            match c {
                Condition::And(l, r) | Condition::Or(l, r) => {
                    collect(l, out);
                    collect(r, out);
                }
                leaf => out.push(leaf.clone()),
            }
        }
        collect(stmt.selection.as_ref().unwrap(), &mut leaves);
        assert_eq!(
            leaves,
            vec![
                compare("a", CompareOp::Like, "%x%"),
                Condition::IsNull {
                    column: col(None, "b"),
                    negated: false,
                },
                Condition::IsNull {
                    column: col(None, "c"),
                    negated: true,
                },
                compare("d", CompareOp::GtEq, "10"),
                compare("e", CompareOp::Lt, "-2"),
            ]
        );
    }

    #[test]
    fn test_unknown_leaf_is_opaque() {
        let stmt = parse_select("SELECT * FROM t WHERE x IN ('a', 'b')").unwrap();
        assert!(matches!(stmt.selection, Some(Condition::Opaque(_))));
    }

    #[test]
    fn test_comma_inside_literal_and_function_does_not_split_items() {
        let stmt = parse_select("SELECT COALESCE(a, b) AS c, d FROM t WHERE e = 'x, y AS z'").unwrap();
        assert_eq!(stmt.projection.len(), 2);
        assert!(matches!(stmt.projection[0], SelectItem::Unsupported(_)));
        assert_eq!(stmt.selection, Some(compare("e", CompareOp::Eq, "x, y AS z")));
    }

    #[test]
    fn test_join_clauses_are_skipped() {
        let stmt = parse_select(
            "SELECT p.id FROM pottery p JOIN media m ON m.id = p.media_id WHERE p.id = '1' LIMIT 5",
        )
        .unwrap();
        assert_eq!(stmt.from.name, "pottery");
        assert_eq!(stmt.selection, Some(compare("id", CompareOp::Eq, "1")));
        assert_eq!(stmt.limit, Some(5));
    }

    #[test]
    fn test_empty_where_means_no_filter() {
        let stmt = parse_select("SELECT * FROM t WHERE ORDER BY x").unwrap();
        assert!(stmt.selection.is_none());
    }

    #[test]
    fn test_schema_qualified_table() {
        let stmt = parse_select("SELECT * FROM public.\"MyTable\";").unwrap();
        assert_eq!(stmt.from.name, "MyTable");
    }

    #[test]
    fn test_missing_from_is_error() {
        assert!(matches!(parse_select("SELECT a, b"), Err(QueryError::MissingFrom)));
    }

    #[test]
    fn test_not_a_select_is_error() {
        assert!(matches!(parse_select("DELETE FROM t"), Err(QueryError::Parse(_))));
    }

    #[test]
    fn test_unbalanced_parentheses_is_error() {
        assert!(parse_select("SELECT * FROM t WHERE (a = '1'").is_err());
        assert!(parse_select("SELECT * FROM t WHERE a = '1')").is_err());
    }

    #[test]
    fn test_invalid_limit_is_error() {
        assert!(parse_select("SELECT * FROM t LIMIT many").is_err());
    }
}
