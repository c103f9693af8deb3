//! Recursive-descent parser and semantic analyzer: tokens to a typed AST.
//!
//! Scope discipline: the outermost scope holds globals and function
//! declarations (a function's name is declared there, holding its return
//! type, before its body is parsed, so a recursive call resolves); a
//! function body introduces exactly one new scope; nested blocks introduce
//! none.

use bumpalo::Bump;
use smallvec::SmallVec;

use crate::ast::{BinOp, LocalVariable, Node, NodeKind, Scope};
use crate::diagnostics::{err, Result};
use crate::lexer::{Token, TokenKind};
use crate::types::{self, Type, CHAR, INT};

pub struct Parser<'a> {
    arena: &'a Bump,
    source: &'a str,
    tokens: Vec<Token<'a>>,
    pos: usize,
    global_scope: &'a Scope<'a>,
    scope: &'a Scope<'a>,
}

const MAX_ARGUMENTS: usize = 6;

pub fn parse<'a>(arena: &'a Bump, source: &'a str) -> Result<&'a Node<'a>> {
    let tokens = crate::lexer::tokenize(source)?;
    let global_scope = Scope::new(arena, None);
    let mut parser = Parser {
        arena,
        source,
        tokens,
        pos: 0,
        global_scope,
        scope: global_scope,
    };
    parser.program()
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Token<'a> {
        self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token<'a> {
        let token = self.tokens[self.pos];
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn consume(&mut self, kind: TokenKind) -> Option<Token<'a>> {
        if self.peek().kind == kind {
            Some(self.advance())
        } else {
            None
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token<'a>> {
        let token = self.peek();
        if token.kind == kind {
            Ok(self.advance())
        } else {
            Err(err(self.source, token.text, "Unexpected token type."))
        }
    }

    fn expect_identifier(&mut self) -> Result<Token<'a>> {
        self.expect(TokenKind::Identifier)
    }

    fn expect_number(&mut self) -> Result<i64> {
        let token = self.peek();
        if token.kind == TokenKind::Number {
            self.advance();
            Ok(token.value)
        } else {
            Err(err(self.source, token.text, "Expected number token."))
        }
    }

    fn node(&self, kind: NodeKind<'a>, ty: Option<&'a Type<'a>>) -> &'a Node<'a> {
        Node::new(self.arena, kind, ty)
    }

    // type = ("int" | "char") "*"*
    fn parse_type(&mut self) -> Result<&'a Type<'a>> {
        let token = self.peek();
        let mut ty: &'a Type<'a> = match token.kind {
            TokenKind::Int => {
                self.advance();
                &INT
            }
            TokenKind::Char => {
                self.advance();
                &CHAR
            }
            _ => return Err(err(self.source, token.text, "Expected a type.")),
        };
        while self.consume(TokenKind::Asterisk).is_some() {
            ty = types::new_pointer(self.arena, ty);
        }
        Ok(ty)
    }

    // ("[" number "]")*, applied outermost-dimension-first around `base`.
    fn parse_array_dims(&mut self, base: &'a Type<'a>) -> Result<&'a Type<'a>> {
        let mut dims = SmallVec::<[u64; 4]>::new();
        while self.consume(TokenKind::BracketLeft).is_some() {
            let length = self.expect_number()?;
            self.expect(TokenKind::BracketRight)?;
            dims.push(length as u64);
        }
        let mut ty = base;
        for &length in dims.iter().rev() {
            ty = types::new_array(self.arena, ty, length);
        }
        Ok(ty)
    }

    // program = top_level_item*
    fn program(&mut self) -> Result<&'a Node<'a>> {
        let mut items = Vec::new();
        while self.peek().kind != TokenKind::Eof {
            items.push(self.top_level_item()?);
        }
        Ok(self.node(NodeKind::Program(items), None))
    }

    // top_level_item = type identifier (function_tail | global_tail)
    fn top_level_item(&mut self) -> Result<&'a Node<'a>> {
        let ty = self.parse_type()?;
        let identifier = self.expect_identifier()?;
        if self.peek().kind == TokenKind::ParenthesisLeft {
            self.function_tail(ty, identifier)
        } else {
            self.global_tail(ty, identifier)
        }
    }

    // global_tail = ("[" number "]")* ";"
    fn global_tail(&mut self, ty: &'a Type<'a>, name: Token<'a>) -> Result<&'a Node<'a>> {
        let ty = self.parse_array_dims(ty)?;
        self.expect(TokenKind::Semicolon)?;
        if self.global_scope.declared_here(name.text) {
            return Err(err(self.source, name.text, "Redeclaration of variable."));
        }
        let variable = self.global_scope.declare(self.arena, name.text, ty, true);
        Ok(self.node(NodeKind::GlobalVariableDefinition(variable), None))
    }

    // function_tail = "(" params? ")" block
    fn function_tail(&mut self, return_ty: &'a Type<'a>, name: Token<'a>) -> Result<&'a Node<'a>> {
        if self.global_scope.declared_here(name.text) {
            return Err(err(self.source, name.text, "Redeclaration of function."));
        }
        self.global_scope
            .declare_function(self.arena, name.text, return_ty);

        self.expect(TokenKind::ParenthesisLeft)?;
        let function_scope = Scope::new(self.arena, Some(self.global_scope));
        self.scope = function_scope;

        let mut parameters = SmallVec::<[&'a LocalVariable<'a>; 6]>::new();
        if self.peek().kind != TokenKind::ParenthesisRight {
            loop {
                let param_ty = self.parse_type()?;
                let param_name = self.expect_identifier()?;
                if self.scope.declared_here(param_name.text) {
                    return Err(err(
                        self.source,
                        param_name.text,
                        "Redeclaration of variable.",
                    ));
                }
                parameters.push(self.scope.declare(self.arena, param_name.text, param_ty, false));
                if self.consume(TokenKind::Comma).is_none() {
                    break;
                }
            }
        }
        self.expect(TokenKind::ParenthesisRight)?;
        if parameters.len() > MAX_ARGUMENTS {
            return Err(err(self.source, name.text, "Too many parameters."));
        }

        let body = self.block()?;
        self.scope = self.global_scope;

        Ok(self.node(
            NodeKind::FunctionDefinition {
                name: name.text,
                parameters,
                body,
                scope: function_scope,
            },
            None,
        ))
    }

    // statement
    //   = return_stmt | for_stmt | if_stmt | while_stmt
    //   | block | local_decl | expression ";"
    fn statement(&mut self) -> Result<&'a Node<'a>> {
        match self.peek().kind {
            TokenKind::Return => self.return_stmt(),
            TokenKind::For => self.for_stmt(),
            TokenKind::If => self.if_stmt(),
            TokenKind::While => self.while_stmt(),
            TokenKind::BraceLeft => self.block(),
            TokenKind::Int | TokenKind::Char => self.local_decl(),
            _ => {
                let e = self.expression()?;
                self.expect(TokenKind::Semicolon)?;
                Ok(e)
            }
        }
    }

    // block = "{" statement* "}"
    fn block(&mut self) -> Result<&'a Node<'a>> {
        self.expect(TokenKind::BraceLeft)?;
        let mut statements = Vec::new();
        while self.consume(TokenKind::BraceRight).is_none() {
            statements.push(self.statement()?);
        }
        Ok(self.node(NodeKind::Block(statements), None))
    }

    // local_decl = type identifier ("[" number "]")* ("=" expression)? ";"
    fn local_decl(&mut self) -> Result<&'a Node<'a>> {
        let ty = self.parse_type()?;
        let name = self.expect_identifier()?;
        let ty = self.parse_array_dims(ty)?;
        if self.scope.declared_here(name.text) {
            return Err(err(self.source, name.text, "Redeclaration of variable."));
        }
        let variable = self.scope.declare(self.arena, name.text, ty, false);
        if self.consume(TokenKind::Assign).is_some() {
            let initializer = self.expression()?;
            self.expect(TokenKind::Semicolon)?;
            let lhs = self.node(NodeKind::LocalVariable(variable), Some(ty));
            return Ok(self.node(NodeKind::Assign(lhs, initializer), Some(ty)));
        }
        self.expect(TokenKind::Semicolon)?;
        Ok(self.node(NodeKind::Block(Vec::new()), None))
    }

    // return_stmt = "return" expression ";"
    fn return_stmt(&mut self) -> Result<&'a Node<'a>> {
        self.expect(TokenKind::Return)?;
        let value = self.expression()?;
        self.expect(TokenKind::Semicolon)?;
        Ok(self.node(NodeKind::Return(value), None))
    }

    // for_stmt = "for" "(" expression? ";" expression? ";" expression? ")" statement
    fn for_stmt(&mut self) -> Result<&'a Node<'a>> {
        self.expect(TokenKind::For)?;
        self.expect(TokenKind::ParenthesisLeft)?;

        let init = if self.consume(TokenKind::Semicolon).is_some() {
            None
        } else {
            let e = self.expression()?;
            self.expect(TokenKind::Semicolon)?;
            Some(e)
        };

        let condition = if self.consume(TokenKind::Semicolon).is_some() {
            None
        } else {
            let e = self.expression()?;
            self.expect(TokenKind::Semicolon)?;
            Some(e)
        };

        let step = if self.consume(TokenKind::ParenthesisRight).is_some() {
            None
        } else {
            let e = self.expression()?;
            self.expect(TokenKind::ParenthesisRight)?;
            Some(e)
        };

        let body = self.statement()?;
        Ok(self.node(NodeKind::For(init, condition, step, body), None))
    }

    // if_stmt = "if" "(" expression ")" statement ("else" statement)?
    fn if_stmt(&mut self) -> Result<&'a Node<'a>> {
        self.expect(TokenKind::If)?;
        self.expect(TokenKind::ParenthesisLeft)?;
        let condition = self.expression()?;
        self.expect(TokenKind::ParenthesisRight)?;
        let then_branch = self.statement()?;
        let else_branch = if self.consume(TokenKind::Else).is_some() {
            Some(self.statement()?)
        } else {
            None
        };
        Ok(self.node(NodeKind::If(condition, then_branch, else_branch), None))
    }

    // while_stmt = "while" "(" expression ")" statement
    fn while_stmt(&mut self) -> Result<&'a Node<'a>> {
        self.expect(TokenKind::While)?;
        self.expect(TokenKind::ParenthesisLeft)?;
        let condition = self.expression()?;
        self.expect(TokenKind::ParenthesisRight)?;
        let body = self.statement()?;
        Ok(self.node(NodeKind::While(condition, body), None))
    }

    fn expression(&mut self) -> Result<&'a Node<'a>> {
        self.assign()
    }

    // assign = equality ("=" assign)?
    fn assign(&mut self) -> Result<&'a Node<'a>> {
        let lhs = self.equality()?;
        if let Some(token) = self.consume(TokenKind::Assign) {
            if !lhs.is_lvalue() {
                return Err(err(
                    self.source,
                    token.text,
                    "Left value in assignment must be a variable or dereference.",
                ));
            }
            let rhs = self.assign()?;
            return Ok(self.node(NodeKind::Assign(lhs, rhs), lhs.ty));
        }
        Ok(lhs)
    }

    // equality = relational (("==" | "!=") relational)*
    fn equality(&mut self) -> Result<&'a Node<'a>> {
        let mut node = self.relational()?;
        loop {
            if self.consume(TokenKind::Eq).is_some() {
                let rhs = self.relational()?;
                node = self.node(NodeKind::Binary(BinOp::Eq, node, rhs), Some(&INT));
            } else if self.consume(TokenKind::Ne).is_some() {
                let rhs = self.relational()?;
                node = self.node(NodeKind::Binary(BinOp::Ne, node, rhs), Some(&INT));
            } else {
                return Ok(node);
            }
        }
    }

    // relational = additive (("<" | "<=" | ">" | ">=") additive)*
    fn relational(&mut self) -> Result<&'a Node<'a>> {
        let mut node = self.additive()?;
        loop {
            if self.consume(TokenKind::Lt).is_some() {
                let rhs = self.additive()?;
                node = self.node(NodeKind::Binary(BinOp::Lt, node, rhs), Some(&INT));
            } else if self.consume(TokenKind::Le).is_some() {
                let rhs = self.additive()?;
                node = self.node(NodeKind::Binary(BinOp::Le, node, rhs), Some(&INT));
            } else if self.consume(TokenKind::Gt).is_some() {
                let rhs = self.additive()?;
                node = self.node(NodeKind::Binary(BinOp::Lt, rhs, node), Some(&INT));
            } else if self.consume(TokenKind::Ge).is_some() {
                let rhs = self.additive()?;
                node = self.node(NodeKind::Binary(BinOp::Le, rhs, node), Some(&INT));
            } else {
                return Ok(node);
            }
        }
    }

    // additive = multiplicative (("+" | "-") multiplicative)*
    fn additive(&mut self) -> Result<&'a Node<'a>> {
        let mut node = self.multiplicative()?;
        loop {
            if let Some(token) = self.consume(TokenKind::Plus) {
                let rhs = self.multiplicative()?;
                node = self.combine_additive(token, true, node, rhs)?;
            } else if let Some(token) = self.consume(TokenKind::Minus) {
                let rhs = self.multiplicative()?;
                node = self.combine_additive(token, false, node, rhs)?;
            } else {
                return Ok(node);
            }
        }
    }

    /// Dispatches `+`/`-` by operand type: int/int stays plain arithmetic,
    /// any combination touching a pointer or array scales by pointee size,
    /// and pointer-minus-pointer of matching pointee size yields an int.
    fn combine_additive(
        &mut self,
        token: Token<'a>,
        is_plus: bool,
        lhs: &'a Node<'a>,
        rhs: &'a Node<'a>,
    ) -> Result<&'a Node<'a>> {
        let lty = lhs.ty.expect("expression node must have a type");
        let rty = rhs.ty.expect("expression node must have a type");

        if lty.is_int() && rty.is_int() {
            let op = if is_plus { BinOp::Add } else { BinOp::Sub };
            return Ok(self.node(NodeKind::Binary(op, lhs, rhs), Some(&INT)));
        }

        if lty.is_pointer_like() && rty.is_int() {
            let pointee = lty.pointee().expect("pointer-like type has a pointee");
            let result_ty = types::new_pointer(self.arena, pointee);
            let op = if is_plus { BinOp::AddPointer } else { BinOp::SubPointer };
            return Ok(self.node(NodeKind::Binary(op, lhs, rhs), Some(result_ty)));
        }

        if is_plus && lty.is_int() && rty.is_pointer_like() {
            let pointee = rty.pointee().expect("pointer-like type has a pointee");
            let result_ty = types::new_pointer(self.arena, pointee);
            return Ok(self.node(NodeKind::Binary(BinOp::AddPointer, rhs, lhs), Some(result_ty)));
        }

        if !is_plus && lty.is_pointer_like() && rty.is_pointer_like() && types::same_pointee_size(lty, rty) {
            return Ok(self.node(NodeKind::Binary(BinOp::DiffPointer, lhs, rhs), Some(&INT)));
        }

        Err(err(self.source, token.text, "Invalid operand types for operator."))
    }

    // multiplicative = unary (("*" | "/") unary)*
    fn multiplicative(&mut self) -> Result<&'a Node<'a>> {
        let mut node = self.unary()?;
        loop {
            if self.consume(TokenKind::Asterisk).is_some() {
                let rhs = self.unary()?;
                node = self.node(NodeKind::Binary(BinOp::Mul, node, rhs), Some(&INT));
            } else if self.consume(TokenKind::Slash).is_some() {
                let rhs = self.unary()?;
                node = self.node(NodeKind::Binary(BinOp::Div, node, rhs), Some(&INT));
            } else {
                return Ok(node);
            }
        }
    }

    // unary = "+"? postfix | "-" postfix | "sizeof" unary | "*" unary | "&" unary
    fn unary(&mut self) -> Result<&'a Node<'a>> {
        if let Some(token) = self.consume(TokenKind::Minus) {
            let zero = self.node(NodeKind::Number(0), Some(&INT));
            let rhs = self.postfix()?;
            return self.combine_additive(token, false, zero, rhs);
        }
        if self.consume(TokenKind::Plus).is_some() {
            return self.postfix();
        }
        if self.consume(TokenKind::Sizeof).is_some() {
            let operand = self.unary()?;
            let size = operand.ty.expect("expression node must have a type").size();
            return Ok(self.node(NodeKind::Number(size as i64), Some(&INT)));
        }
        if self.consume(TokenKind::Asterisk).is_some() {
            let token = self.peek();
            let operand = self.unary()?;
            return self.make_dereference(token, operand);
        }
        if self.consume(TokenKind::Ampersand).is_some() {
            let token = self.peek();
            let operand = self.unary()?;
            if !operand.is_lvalue() {
                return Err(err(self.source, token.text, "Operand of '&' must be an lvalue."));
            }
            let pointee = operand.ty.expect("expression node must have a type");
            let ty = types::new_pointer(self.arena, pointee);
            return Ok(self.node(NodeKind::Address(operand), Some(ty)));
        }
        self.postfix()
    }

    fn make_dereference(&mut self, token: Token<'a>, operand: &'a Node<'a>) -> Result<&'a Node<'a>> {
        let ty = operand.ty.expect("expression node must have a type");
        let pointee = ty
            .pointee()
            .ok_or_else(|| err(self.source, token.text, "Operand of '*' must be a pointer or array."))?;
        Ok(self.node(NodeKind::Dereference(operand), Some(pointee)))
    }

    // postfix = primary ("[" expression "]")*
    fn postfix(&mut self) -> Result<&'a Node<'a>> {
        let mut node = self.primary()?;
        while let Some(token) = self.consume(TokenKind::BracketLeft) {
            let index = self.expression()?;
            self.expect(TokenKind::BracketRight)?;
            let sum = self.combine_additive(token, true, node, index)?;
            node = self.make_dereference(token, sum)?;
        }
        Ok(node)
    }

    // primary = "(" expression ")" | identifier call_tail? | number
    fn primary(&mut self) -> Result<&'a Node<'a>> {
        let token = self.peek();
        match token.kind {
            TokenKind::ParenthesisLeft => {
                self.advance();
                let e = self.expression()?;
                self.expect(TokenKind::ParenthesisRight)?;
                Ok(e)
            }
            TokenKind::Identifier => {
                self.advance();
                if self.consume(TokenKind::ParenthesisLeft).is_some() {
                    self.call_tail(token)
                } else {
                    let variable = self
                        .scope
                        .lookup(token.text)
                        .ok_or_else(|| err(self.source, token.text, "Undefined local variable."))?;
                    Ok(self.node(NodeKind::LocalVariable(variable), Some(variable.ty)))
                }
            }
            _ => {
                let value = self.expect_number()?;
                Ok(self.node(NodeKind::Number(value), Some(&INT)))
            }
        }
    }

    // call_tail = "(" (expression ("," expression)*)? ")"
    fn call_tail(&mut self, name: Token<'a>) -> Result<&'a Node<'a>> {
        let mut arguments = SmallVec::<[&'a Node<'a>; 6]>::new();
        if self.peek().kind != TokenKind::ParenthesisRight {
            loop {
                arguments.push(self.expression()?);
                if self.consume(TokenKind::Comma).is_none() {
                    break;
                }
            }
        }
        self.expect(TokenKind::ParenthesisRight)?;
        if arguments.len() > MAX_ARGUMENTS {
            return Err(err(self.source, name.text, "Too many arguments."));
        }
        let function = self
            .scope
            .lookup(name.text)
            .filter(|variable| variable.is_function)
            .ok_or_else(|| err(self.source, name.text, "Undefined function."))?;
        Ok(self.node(NodeKind::FunctionCall(name.text, arguments), Some(function.ty)))
    }
}
