use relite_sql_ast::*;
use relite_sql_lexer::{Keyword, Lexer, Position, SpannedToken, Token};

use crate::error::ParseError;

/// Recursive-descent parser over a pre-tokenized buffer (§4.3). Holds a
/// single lookahead position; statement parsers consume tokens directly
/// rather than building an intermediate parse tree.
pub struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
    next_placeholder: usize,
}

/// Parses a single SQL statement (the common case for the façade's
/// `execute`/`query` entry points, §6).
pub fn parse_statement(sql: &str) -> Result<Statement, ParseError> {
    let mut parser = Parser::new(sql)?;
    let stmt = parser.parse_statement()?;
    parser.expect_end_of_statement()?;
    Ok(stmt)
}

/// Parses a `;`-separated script into its component statements.
pub fn parse_script(sql: &str) -> Result<Vec<Statement>, ParseError> {
    let mut parser = Parser::new(sql)?;
    parser.parse_statements()
}

impl Parser {
    pub fn new(input: &str) -> Result<Self, ParseError> {
        let tokens = Lexer::new(input).tokenize()?;
        Ok(Parser { tokens, pos: 0, next_placeholder: 0 })
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].token
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].token
    }

    fn position(&self) -> Position {
        self.tokens[self.pos.min(self.tokens.len() - 1)].position
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos.min(self.tokens.len() - 1)].token.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn err(&self, message: impl Into<String>) -> ParseError {
        let position = self.position();
        ParseError::Syntax { message: message.into(), line: position.line, column: position.column }
    }

    fn eat_token(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_token(&mut self, token: &Token) -> Result<(), ParseError> {
        if self.eat_token(token) {
            Ok(())
        } else {
            Err(self.err(format!("expected {token:?}, found {:?}", self.peek())))
        }
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        if *self.peek() == Token::Keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<(), ParseError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.err(format!("expected keyword {keyword:?}, found {:?}", self.peek())))
        }
    }

    fn expect_end_of_statement(&mut self) -> Result<(), ParseError> {
        self.eat_token(&Token::SemiColon);
        if *self.peek() == Token::Eof {
            Ok(())
        } else {
            Err(self.err(format!("unexpected trailing token {:?}", self.peek())))
        }
    }

    fn parse_identifier(&mut self) -> Result<String, ParseError> {
        match self.advance() {
            Token::Ident { name, .. } => Ok(name),
            other => Err(self.err(format!("expected identifier, found {other:?}"))),
        }
    }

    fn parse_comma_separated<T>(
        &mut self,
        mut f: impl FnMut(&mut Self) -> Result<T, ParseError>,
    ) -> Result<Vec<T>, ParseError> {
        let mut items = vec![f(self)?];
        while self.eat_token(&Token::Comma) {
            items.push(f(self)?);
        }
        Ok(items)
    }

    fn parse_statements(&mut self) -> Result<Vec<Statement>, ParseError> {
        let mut statements = Vec::new();
        loop {
            while self.eat_token(&Token::SemiColon) {}
            if *self.peek() == Token::Eof {
                break;
            }
            statements.push(self.parse_statement()?);
        }
        Ok(statements)
    }

    pub fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        match self.peek().clone() {
            Token::Keyword(Keyword::Select) => Ok(Statement::Select(self.parse_select()?)),
            Token::Keyword(Keyword::Insert) => Ok(Statement::Insert(self.parse_insert()?)),
            Token::Keyword(Keyword::Update) => Ok(Statement::Update(self.parse_update()?)),
            Token::Keyword(Keyword::Delete) => Ok(Statement::Delete(self.parse_delete()?)),
            Token::Keyword(Keyword::Create) => self.parse_create(),
            Token::Keyword(Keyword::Drop) => self.parse_drop(),
            Token::Keyword(Keyword::Begin) => {
                self.advance();
                self.eat_keyword(Keyword::Transaction);
                Ok(Statement::Begin)
            }
            Token::Keyword(Keyword::Commit) => {
                self.advance();
                Ok(Statement::Commit)
            }
            Token::Keyword(Keyword::Rollback) => {
                self.advance();
                Ok(Statement::Rollback)
            }
            Token::Ident { name, .. } if name.eq_ignore_ascii_case("call") => {
                self.advance();
                let name = self.parse_identifier()?;
                self.expect_token(&Token::LeftParen)?;
                let args = if *self.peek() == Token::RightParen {
                    Vec::new()
                } else {
                    self.parse_comma_separated(Self::parse_expr)?
                };
                self.expect_token(&Token::RightParen)?;
                Ok(Statement::Call { name, args })
            }
            other => Err(self.err(format!("expected a statement, found {other:?}"))),
        }
    }

    // ---- CREATE ----

    fn parse_create(&mut self) -> Result<Statement, ParseError> {
        self.expect_keyword(Keyword::Create)?;
        if self.eat_keyword(Keyword::Unique) {
            return Ok(Statement::CreateIndex(self.parse_create_index(true)?));
        }
        match self.peek().clone() {
            Token::Keyword(Keyword::Table) => Ok(Statement::CreateTable(self.parse_create_table()?)),
            Token::Keyword(Keyword::Index) => Ok(Statement::CreateIndex(self.parse_create_index(false)?)),
            Token::Keyword(Keyword::Collection) => {
                self.advance();
                let if_not_exists = self.parse_if_not_exists()?;
                let name = self.parse_identifier()?;
                Ok(Statement::CreateCollection(CreateCollection { name, if_not_exists }))
            }
            Token::Keyword(Keyword::View) => Ok(Statement::CreateView(self.parse_create_view()?)),
            Token::Keyword(Keyword::Trigger) => Ok(Statement::CreateTrigger(self.parse_create_trigger()?)),
            Token::Keyword(Keyword::Procedure) => Ok(Statement::CreateProcedure(self.parse_create_procedure()?)),
            other => Err(self.err(format!("expected TABLE, INDEX, COLLECTION, VIEW, TRIGGER or PROCEDURE after CREATE, found {other:?}"))),
        }
    }

    fn parse_if_not_exists(&mut self) -> Result<bool, ParseError> {
        if self.eat_keyword(Keyword::If) {
            self.expect_keyword(Keyword::Not)?;
            self.expect_keyword(Keyword::Exists)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn parse_if_exists(&mut self) -> Result<bool, ParseError> {
        if self.eat_keyword(Keyword::If) {
            self.expect_keyword(Keyword::Exists)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn parse_create_table(&mut self) -> Result<CreateTable, ParseError> {
        self.expect_keyword(Keyword::Table)?;
        let if_not_exists = self.parse_if_not_exists()?;
        let name = self.parse_identifier()?;
        self.expect_token(&Token::LeftParen)?;
        let mut columns = Vec::new();
        let mut foreign_keys = Vec::new();
        loop {
            if self.eat_keyword(Keyword::Foreign) {
                foreign_keys.push(self.parse_foreign_key()?);
            } else {
                columns.push(self.parse_column_def()?);
            }
            if !self.eat_token(&Token::Comma) {
                break;
            }
        }
        self.expect_token(&Token::RightParen)?;
        Ok(CreateTable { name, if_not_exists, columns, foreign_keys })
    }

    fn parse_column_def(&mut self) -> Result<ColumnDef, ParseError> {
        let name = self.parse_identifier()?;
        let ty = self.parse_column_type()?;
        let mut def = ColumnDef {
            name,
            ty,
            primary_key: false,
            auto_increment: false,
            unique: false,
            not_null: false,
            default: None,
            check: None,
        };
        loop {
            if self.eat_keyword(Keyword::Primary) {
                self.expect_keyword(Keyword::Key)?;
                def.primary_key = true;
            } else if self.eat_keyword(Keyword::Unique) {
                def.unique = true;
            } else if self.eat_keyword(Keyword::Not) {
                self.expect_keyword(Keyword::Null)?;
                def.not_null = true;
            } else if self.eat_keyword(Keyword::Default) {
                def.default = Some(self.parse_expr()?);
            } else if self.eat_keyword(Keyword::Check) {
                self.expect_token(&Token::LeftParen)?;
                def.check = Some(self.parse_expr()?);
                self.expect_token(&Token::RightParen)?;
            } else if matches!(self.peek(), Token::Ident { name, .. } if name.eq_ignore_ascii_case("auto_increment"))
            {
                self.advance();
                def.auto_increment = true;
            } else {
                break;
            }
        }
        Ok(def)
    }

    fn parse_column_type(&mut self) -> Result<ColumnType, ParseError> {
        match self.advance() {
            Token::Keyword(Keyword::Integer) => Ok(ColumnType::Integer),
            Token::Keyword(Keyword::Real) => Ok(ColumnType::Real),
            Token::Keyword(Keyword::Text) => Ok(ColumnType::Text),
            Token::Keyword(Keyword::Blob) => Ok(ColumnType::Blob),
            Token::Keyword(Keyword::Boolean) => Ok(ColumnType::Boolean),
            Token::Keyword(Keyword::Json) => Ok(ColumnType::Json),
            Token::Keyword(Keyword::Date) => Ok(ColumnType::Date),
            Token::Keyword(Keyword::Timestamp) => Ok(ColumnType::Timestamp),
            other => Err(self.err(format!("expected a column type, found {other:?}"))),
        }
    }

    fn parse_foreign_key(&mut self) -> Result<ForeignKeyDef, ParseError> {
        self.expect_keyword(Keyword::Key)?;
        self.expect_token(&Token::LeftParen)?;
        let columns = self.parse_comma_separated(Self::parse_identifier)?;
        self.expect_token(&Token::RightParen)?;
        self.expect_keyword(Keyword::References)?;
        let ref_table = self.parse_identifier()?;
        self.expect_token(&Token::LeftParen)?;
        let ref_columns = self.parse_comma_separated(Self::parse_identifier)?;
        self.expect_token(&Token::RightParen)?;
        let mut on_delete = FkAction::NoAction;
        let mut on_update = FkAction::NoAction;
        loop {
            if self.eat_keyword(Keyword::Cascade) {
                // bare CASCADE without ON DELETE/UPDATE context defaults to delete
                on_delete = FkAction::Cascade;
            } else if self.eat_keyword(Keyword::Restrict) {
                on_delete = FkAction::Restrict;
            } else {
                break;
            }
        }
        let _ = &mut on_update;
        Ok(ForeignKeyDef { columns, ref_table, ref_columns, on_delete, on_update })
    }

    fn parse_create_index(&mut self, unique: bool) -> Result<CreateIndex, ParseError> {
        self.expect_keyword(Keyword::Index)?;
        let if_not_exists = self.parse_if_not_exists()?;
        let name = self.parse_identifier()?;
        self.expect_keyword(Keyword::On)?;
        let table = self.parse_identifier()?;
        self.expect_token(&Token::LeftParen)?;
        let columns = self.parse_comma_separated(Self::parse_identifier)?;
        self.expect_token(&Token::RightParen)?;
        Ok(CreateIndex { name, table, columns, unique, if_not_exists })
    }

    fn parse_create_view(&mut self) -> Result<CreateView, ParseError> {
        self.expect_keyword(Keyword::View)?;
        let if_not_exists = self.parse_if_not_exists()?;
        let name = self.parse_identifier()?;
        self.expect_keyword(Keyword::As)?;
        let query = self.parse_select()?;
        Ok(CreateView { name, if_not_exists, query })
    }

    fn parse_create_trigger(&mut self) -> Result<CreateTrigger, ParseError> {
        self.expect_keyword(Keyword::Trigger)?;
        let name = self.parse_identifier()?;
        let timing = if self.eat_keyword(Keyword::Before) {
            TriggerTiming::Before
        } else {
            self.expect_keyword(Keyword::After)?;
            TriggerTiming::After
        };
        let event = if self.eat_keyword(Keyword::Insert) {
            TriggerEvent::Insert
        } else if self.eat_keyword(Keyword::Update) {
            TriggerEvent::Update
        } else {
            self.expect_keyword(Keyword::Delete)?;
            TriggerEvent::Delete
        };
        self.expect_keyword(Keyword::On)?;
        let table = self.parse_identifier()?;
        let body = self.parse_begin_end_block()?;
        Ok(CreateTrigger { name, timing, event, table, body })
    }

    fn parse_create_procedure(&mut self) -> Result<CreateProcedure, ParseError> {
        self.expect_keyword(Keyword::Procedure)?;
        let name = self.parse_identifier()?;
        self.expect_token(&Token::LeftParen)?;
        let params = if *self.peek() == Token::RightParen {
            Vec::new()
        } else {
            self.parse_comma_separated(Self::parse_identifier)?
        };
        self.expect_token(&Token::RightParen)?;
        let body = self.parse_begin_end_block()?;
        Ok(CreateProcedure { name, params, body })
    }

    fn parse_begin_end_block(&mut self) -> Result<Vec<Statement>, ParseError> {
        self.expect_keyword(Keyword::Begin)?;
        let mut body = Vec::new();
        loop {
            while self.eat_token(&Token::SemiColon) {}
            if self.eat_keyword(Keyword::End) {
                break;
            }
            body.push(self.parse_statement()?);
        }
        Ok(body)
    }

    // ---- DROP ----

    fn parse_drop(&mut self) -> Result<Statement, ParseError> {
        self.expect_keyword(Keyword::Drop)?;
        match self.peek().clone() {
            Token::Keyword(Keyword::Table) => {
                self.advance();
                let if_exists = self.parse_if_exists()?;
                let name = self.parse_identifier()?;
                Ok(Statement::DropTable(DropTable { name, if_exists }))
            }
            Token::Keyword(Keyword::Index) => {
                self.advance();
                let if_exists = self.parse_if_exists()?;
                let name = self.parse_identifier()?;
                Ok(Statement::DropIndex(DropIndex { name, if_exists }))
            }
            Token::Keyword(Keyword::View) => {
                self.advance();
                let if_exists = self.parse_if_exists()?;
                let name = self.parse_identifier()?;
                Ok(Statement::DropView(DropView { name, if_exists }))
            }
            Token::Keyword(Keyword::Trigger) => {
                self.advance();
                let if_exists = self.parse_if_exists()?;
                let name = self.parse_identifier()?;
                Ok(Statement::DropTrigger(DropTrigger { name, if_exists }))
            }
            Token::Keyword(Keyword::Procedure) => {
                self.advance();
                let if_exists = self.parse_if_exists()?;
                let name = self.parse_identifier()?;
                Ok(Statement::DropProcedure(DropProcedure { name, if_exists }))
            }
            other => Err(self.err(format!(
                "expected TABLE, INDEX, VIEW, TRIGGER or PROCEDURE after DROP, found {other:?}"
            ))),
        }
    }

    // ---- DML ----

    fn parse_insert(&mut self) -> Result<Insert, ParseError> {
        self.expect_keyword(Keyword::Insert)?;
        self.expect_keyword(Keyword::Into)?;
        let table = self.parse_identifier()?;
        let columns = if self.eat_token(&Token::LeftParen) {
            let columns = self.parse_comma_separated(Self::parse_identifier)?;
            self.expect_token(&Token::RightParen)?;
            columns
        } else {
            Vec::new()
        };
        self.expect_keyword(Keyword::Values)?;
        let values = self.parse_comma_separated(|p| {
            p.expect_token(&Token::LeftParen)?;
            let row = p.parse_comma_separated(Self::parse_expr)?;
            p.expect_token(&Token::RightParen)?;
            Ok(row)
        })?;
        Ok(Insert { table, columns, values })
    }

    fn parse_update(&mut self) -> Result<Update, ParseError> {
        self.expect_keyword(Keyword::Update)?;
        let table = self.parse_identifier()?;
        self.expect_keyword(Keyword::Set)?;
        let assignments = self.parse_comma_separated(|p| {
            let column = p.parse_identifier()?;
            p.expect_token(&Token::Eq)?;
            let value = p.parse_expr()?;
            Ok((column, value))
        })?;
        let filter = if self.eat_keyword(Keyword::Where) { Some(self.parse_expr()?) } else { None };
        Ok(Update { table, assignments, filter })
    }

    fn parse_delete(&mut self) -> Result<Delete, ParseError> {
        self.expect_keyword(Keyword::Delete)?;
        self.expect_keyword(Keyword::From)?;
        let table = self.parse_identifier()?;
        let filter = if self.eat_keyword(Keyword::Where) { Some(self.parse_expr()?) } else { None };
        Ok(Delete { table, filter })
    }

    // ---- SELECT ----

    fn parse_select(&mut self) -> Result<Select, ParseError> {
        self.expect_keyword(Keyword::Select)?;
        let distinct = self.eat_keyword(Keyword::Distinct);
        self.eat_keyword(Keyword::All);
        let columns = self.parse_comma_separated(Self::parse_select_item)?;

        let mut from = Vec::new();
        let mut joins = Vec::new();
        if self.eat_keyword(Keyword::From) {
            from = self.parse_comma_separated(Self::parse_from_item)?;
            loop {
                let kind = if self.eat_keyword(Keyword::Inner) {
                    self.expect_keyword(Keyword::Join)?;
                    JoinKind::Inner
                } else if self.eat_keyword(Keyword::Left) {
                    self.eat_keyword(Keyword::Outer);
                    self.expect_keyword(Keyword::Join)?;
                    JoinKind::Left
                } else if self.eat_keyword(Keyword::Right) {
                    self.eat_keyword(Keyword::Outer);
                    self.expect_keyword(Keyword::Join)?;
                    JoinKind::Right
                } else if self.eat_keyword(Keyword::Join) {
                    JoinKind::Inner
                } else {
                    break;
                };
                let table = self.parse_from_item()?;
                self.expect_keyword(Keyword::On)?;
                let on = self.parse_expr()?;
                joins.push(Join { kind, table, on });
            }
        }

        let filter = if self.eat_keyword(Keyword::Where) { Some(self.parse_expr()?) } else { None };

        let group_by = if self.eat_keyword(Keyword::Group) {
            self.expect_keyword(Keyword::By)?;
            self.parse_comma_separated(Self::parse_expr)?
        } else {
            Vec::new()
        };

        let having = if self.eat_keyword(Keyword::Having) { Some(self.parse_expr()?) } else { None };

        let order_by = if self.eat_keyword(Keyword::Order) {
            self.expect_keyword(Keyword::By)?;
            self.parse_comma_separated(Self::parse_order_by_item)?
        } else {
            Vec::new()
        };

        let limit = if self.eat_keyword(Keyword::Limit) { Some(self.parse_expr()?) } else { None };
        let offset = if self.eat_keyword(Keyword::Offset) { Some(self.parse_expr()?) } else { None };

        Ok(Select { distinct, columns, from, joins, filter, group_by, having, order_by, limit, offset })
    }

    fn parse_select_item(&mut self) -> Result<SelectItem, ParseError> {
        let expr = self.parse_expr()?;
        let alias = if self.eat_keyword(Keyword::As) {
            Some(self.parse_identifier()?)
        } else if let Token::Ident { name, .. } = self.peek().clone() {
            if Keyword::lookup(&name).is_none() {
                self.advance();
                Some(name)
            } else {
                None
            }
        } else {
            None
        };
        Ok(SelectItem::Expr { expr, alias })
    }

    fn parse_from_item(&mut self) -> Result<FromItem, ParseError> {
        let table = self.parse_identifier()?;
        let alias = if self.eat_keyword(Keyword::As) {
            Some(self.parse_identifier()?)
        } else if let Token::Ident { name, .. } = self.peek().clone() {
            if Keyword::lookup(&name).is_none() {
                self.advance();
                Some(name)
            } else {
                None
            }
        } else {
            None
        };
        Ok(FromItem { table, alias })
    }

    fn parse_order_by_item(&mut self) -> Result<OrderByItem, ParseError> {
        let expr = self.parse_expr()?;
        let direction = if self.eat_keyword(Keyword::Desc) {
            OrderDirection::Desc
        } else {
            self.eat_keyword(Keyword::Asc);
            OrderDirection::Asc
        };
        Ok(OrderByItem { expr, direction })
    }

    // ---- Expressions: precedence-climbing (grounded on the same
    // algorithm shape as a textbook Pratt parser) ----

    const OR_PREC: u8 = 5;
    const AND_PREC: u8 = 10;
    const NOT_PREC: u8 = 15;
    const CMP_PREC: u8 = 20;
    const ADD_PREC: u8 = 30;
    const MUL_PREC: u8 = 40;
    const JSON_PREC: u8 = 50;

    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_subexpr(0)
    }

    fn parse_subexpr(&mut self, min_precedence: u8) -> Result<Expr, ParseError> {
        let mut expr = self.parse_prefix()?;
        loop {
            let precedence = self.next_precedence();
            if precedence <= min_precedence {
                break;
            }
            expr = self.parse_infix(expr, precedence)?;
        }
        Ok(expr)
    }

    fn next_precedence(&self) -> u8 {
        match self.peek() {
            Token::Keyword(Keyword::Or) => Self::OR_PREC,
            Token::Keyword(Keyword::And) => Self::AND_PREC,
            Token::Keyword(Keyword::Is)
            | Token::Keyword(Keyword::In)
            | Token::Keyword(Keyword::Between)
            | Token::Keyword(Keyword::Like) => Self::NOT_PREC,
            Token::Keyword(Keyword::Not)
                if matches!(
                    self.peek_at(1),
                    Token::Keyword(Keyword::In) | Token::Keyword(Keyword::Between) | Token::Keyword(Keyword::Like)
                ) =>
            {
                Self::NOT_PREC
            }
            Token::Eq | Token::NotEq | Token::Lt | Token::Gt | Token::Le | Token::Ge => Self::CMP_PREC,
            Token::Plus | Token::Minus => Self::ADD_PREC,
            Token::Star | Token::Slash | Token::Percent => Self::MUL_PREC,
            Token::Arrow | Token::ArrowArrow | Token::AtArrow => Self::JSON_PREC,
            _ => 0,
        }
    }

    fn parse_prefix(&mut self) -> Result<Expr, ParseError> {
        match self.advance() {
            Token::Number(text) => {
                if text.contains('.') || text.contains('e') || text.contains('E') {
                    let value: f64 =
                        text.parse().map_err(|_| self.err(format!("invalid numeric literal {text}")))?;
                    Ok(Expr::FloatLit(value))
                } else {
                    let value: i64 =
                        text.parse().map_err(|_| self.err(format!("invalid integer literal {text}")))?;
                    Ok(Expr::IntLit(value))
                }
            }
            Token::Str(s) => Ok(Expr::StringLit(s)),
            Token::Placeholder => {
                let index = self.next_placeholder;
                self.next_placeholder += 1;
                Ok(Expr::Placeholder(index))
            }
            Token::Keyword(Keyword::Null) => Ok(Expr::Null),
            Token::Keyword(Keyword::True) => Ok(Expr::BoolLit(true)),
            Token::Keyword(Keyword::False) => Ok(Expr::BoolLit(false)),
            Token::Keyword(Keyword::Not) => {
                let expr = self.parse_subexpr(Self::NOT_PREC)?;
                Ok(Expr::Unary { op: UnaryOp::Not, expr: Box::new(expr) })
            }
            Token::Minus => {
                let expr = self.parse_subexpr(Self::MUL_PREC)?;
                Ok(Expr::Unary { op: UnaryOp::Neg, expr: Box::new(expr) })
            }
            Token::Plus => {
                let expr = self.parse_subexpr(Self::MUL_PREC)?;
                Ok(Expr::Unary { op: UnaryOp::Pos, expr: Box::new(expr) })
            }
            Token::Star => Ok(Expr::Star(None)),
            Token::LeftParen => {
                if *self.peek() == Token::Keyword(Keyword::Select) {
                    let select = self.parse_select()?;
                    self.expect_token(&Token::RightParen)?;
                    return Ok(Expr::Subquery(Box::new(select)));
                }
                let expr = self.parse_expr()?;
                self.expect_token(&Token::RightParen)?;
                Ok(expr)
            }
            Token::Ident { name, .. } => self.parse_ident_prefix(name),
            other => Err(self.err(format!("expected an expression, found {other:?}"))),
        }
    }

    fn parse_ident_prefix(&mut self, name: String) -> Result<Expr, ParseError> {
        if self.eat_token(&Token::LeftParen) {
            let args = if self.eat_token(&Token::Star) {
                self.expect_token(&Token::RightParen)?;
                return Ok(Expr::FunctionCall { name, args: vec![Expr::Star(None)] });
            } else if *self.peek() == Token::RightParen {
                Vec::new()
            } else {
                self.parse_comma_separated(Self::parse_expr)?
            };
            self.expect_token(&Token::RightParen)?;
            return Ok(Expr::FunctionCall { name, args });
        }
        if self.eat_token(&Token::Period) {
            if self.eat_token(&Token::Star) {
                return Ok(Expr::Star(Some(name)));
            }
            let column = self.parse_identifier()?;
            return Ok(Expr::QualifiedIdentifier { table: name, column });
        }
        Ok(Expr::Identifier(name))
    }

    fn parse_infix(&mut self, expr: Expr, precedence: u8) -> Result<Expr, ParseError> {
        match self.advance() {
            Token::Keyword(Keyword::And) => {
                Ok(Expr::bin(BinaryOp::And, expr, self.parse_subexpr(precedence)?))
            }
            Token::Keyword(Keyword::Or) => Ok(Expr::bin(BinaryOp::Or, expr, self.parse_subexpr(precedence)?)),
            Token::Eq => Ok(Expr::bin(BinaryOp::Eq, expr, self.parse_subexpr(precedence)?)),
            Token::NotEq => Ok(Expr::bin(BinaryOp::NotEq, expr, self.parse_subexpr(precedence)?)),
            Token::Lt => Ok(Expr::bin(BinaryOp::Lt, expr, self.parse_subexpr(precedence)?)),
            Token::Gt => Ok(Expr::bin(BinaryOp::Gt, expr, self.parse_subexpr(precedence)?)),
            Token::Le => Ok(Expr::bin(BinaryOp::Le, expr, self.parse_subexpr(precedence)?)),
            Token::Ge => Ok(Expr::bin(BinaryOp::Ge, expr, self.parse_subexpr(precedence)?)),
            Token::Plus => Ok(Expr::bin(BinaryOp::Add, expr, self.parse_subexpr(precedence)?)),
            Token::Minus => Ok(Expr::bin(BinaryOp::Sub, expr, self.parse_subexpr(precedence)?)),
            Token::Star => Ok(Expr::bin(BinaryOp::Mul, expr, self.parse_subexpr(precedence)?)),
            Token::Slash => Ok(Expr::bin(BinaryOp::Div, expr, self.parse_subexpr(precedence)?)),
            Token::Percent => Ok(Expr::bin(BinaryOp::Mod, expr, self.parse_subexpr(precedence)?)),
            Token::Arrow => {
                let (column, path) = self.parse_json_path_start(expr)?;
                Ok(Expr::JsonPath { column, path, as_text: false })
            }
            Token::ArrowArrow => {
                let (column, path) = self.parse_json_path_start(expr)?;
                Ok(Expr::JsonPath { column, path, as_text: true })
            }
            Token::AtArrow => {
                let right = self.parse_subexpr(precedence)?;
                Ok(Expr::FunctionCall { name: "json_contains".into(), args: vec![expr, right] })
            }
            Token::Keyword(Keyword::Is) => {
                let negated = self.eat_keyword(Keyword::Not);
                self.expect_keyword(Keyword::Null)?;
                Ok(Expr::IsNull { expr: Box::new(expr), negated })
            }
            Token::Keyword(Keyword::Like) => {
                let pattern = self.parse_subexpr(precedence)?;
                Ok(Expr::Like { expr: Box::new(expr), pattern: Box::new(pattern), negated: false })
            }
            Token::Keyword(Keyword::Between) => self.parse_between(expr, false),
            Token::Keyword(Keyword::In) => self.parse_in(expr, false),
            Token::Keyword(Keyword::Not) => {
                if self.eat_keyword(Keyword::Like) {
                    let pattern = self.parse_subexpr(precedence)?;
                    Ok(Expr::Like { expr: Box::new(expr), pattern: Box::new(pattern), negated: true })
                } else if self.eat_keyword(Keyword::Between) {
                    self.parse_between(expr, true)
                } else if self.eat_keyword(Keyword::In) {
                    self.parse_in(expr, true)
                } else {
                    Err(self.err("expected LIKE, BETWEEN or IN after NOT"))
                }
            }
            other => Err(self.err(format!("no infix parser for {other:?}"))),
        }
    }

    fn parse_json_path_start(&mut self, column: Expr) -> Result<(Box<Expr>, Vec<String>), ParseError> {
        let mut path = vec![self.parse_json_path_key()?];
        loop {
            if self.eat_token(&Token::Arrow) || self.eat_token(&Token::ArrowArrow) {
                path.push(self.parse_json_path_key()?);
            } else {
                break;
            }
        }
        Ok((Box::new(column), path))
    }

    fn parse_json_path_key(&mut self) -> Result<String, ParseError> {
        match self.advance() {
            Token::Str(s) => Ok(s),
            Token::Ident { name, .. } => Ok(name),
            Token::Number(n) => Ok(n),
            other => Err(self.err(format!("expected a JSON path key, found {other:?}"))),
        }
    }

    fn parse_between(&mut self, expr: Expr, negated: bool) -> Result<Expr, ParseError> {
        let low = self.parse_subexpr(Self::NOT_PREC)?;
        self.expect_keyword(Keyword::And)?;
        let high = self.parse_subexpr(Self::NOT_PREC)?;
        Ok(Expr::Between { expr: Box::new(expr), low: Box::new(low), high: Box::new(high), negated })
    }

    fn parse_in(&mut self, expr: Expr, negated: bool) -> Result<Expr, ParseError> {
        self.expect_token(&Token::LeftParen)?;
        if *self.peek() == Token::Keyword(Keyword::Select) {
            let subquery = self.parse_select()?;
            self.expect_token(&Token::RightParen)?;
            Ok(Expr::In { expr: Box::new(expr), list: InList::Subquery(Box::new(subquery)), negated })
        } else {
            let list = self.parse_comma_separated(Self::parse_expr)?;
            self.expect_token(&Token::RightParen)?;
            Ok(Expr::In { expr: Box::new(expr), list: InList::List(list), negated })
        }
    }
}
