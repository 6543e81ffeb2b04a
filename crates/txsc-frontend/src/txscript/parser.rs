//! Recursive-descent parser for TxScript (SPEC_FULL.md §10). Consumes the
//! token stream produced by [`super::lexer::lex`] and builds a SIR `Script`
//! tree, desugaring `assume a, b, ...;` into the leading
//! `Declaration(name="_stack", ...)` statement spec §6 requires.

use txsc_core::{CompileError, FunctionArg, Node, SirNode, SirType};

use super::lexer::Token;

struct Parser<'t> {
    tokens: &'t [super::lexer::Lexed],
    pos: usize,
}

/// Parses a complete TxScript program into an optimizer-ready statement list.
pub fn parse(source: &str) -> Result<Vec<Node>, CompileError> {
    let tokens = super::lexer::lex(source)?;
    let mut p = Parser { tokens: &tokens, pos: 0 };
    p.parse_program()
}

impl<'t> Parser<'t> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].token
    }

    fn line(&self) -> u32 {
        self.tokens[self.pos].lineno
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].token.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, tok: &Token) -> bool {
        self.peek() == tok
    }

    fn expect(&mut self, tok: Token) -> Result<(), CompileError> {
        if self.check(&tok) {
            self.advance();
            Ok(())
        } else {
            Err(CompileError::Parsing {
                line: self.line(),
                message: format!("expected {tok:?}, found {:?}", self.peek()),
            })
        }
    }

    fn expect_ident(&mut self) -> Result<String, CompileError> {
        match self.advance() {
            Token::Ident(name) => Ok(name),
            other => Err(CompileError::Parsing {
                line: self.line(),
                message: format!("expected an identifier, found {other:?}"),
            }),
        }
    }

    fn parse_program(&mut self) -> Result<Vec<Node>, CompileError> {
        let mut assumed: Vec<String> = Vec::new();
        let mut assumed_line = 1u32;
        let mut stmts = Vec::new();

        while !self.at_eof() {
            if self.check(&Token::Assume) {
                assumed_line = self.line();
                self.advance();
                loop {
                    assumed.push(self.expect_ident()?);
                    if self.check(&Token::Comma) {
                        self.advance();
                        continue;
                    }
                    break;
                }
                self.expect(Token::Semicolon)?;
                continue;
            }
            stmts.push(self.parse_stmt()?);
        }

        let mut out = Vec::with_capacity(stmts.len() + 1);
        out.push(Node::new(
            SirNode::Declaration {
                name: "_stack".to_string(),
                value: Box::new(Node::new(SirNode::Bytes(assumed.join(",").into_bytes()), assumed_line)),
                ty: SirType::Expr,
                mutable: false,
            },
            assumed_line,
        ));
        out.extend(stmts);
        Ok(out)
    }

    fn parse_block(&mut self) -> Result<Vec<Node>, CompileError> {
        self.expect(Token::LBrace)?;
        let mut stmts = Vec::new();
        while !self.check(&Token::RBrace) {
            stmts.push(self.parse_stmt()?);
        }
        self.expect(Token::RBrace)?;
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> Result<Node, CompileError> {
        let lineno = self.line();
        match self.peek().clone() {
            Token::Let | Token::Const => {
                let mutable = matches!(self.advance(), Token::Let);
                let name = self.expect_ident()?;
                self.expect(Token::Eq)?;
                let value = self.parse_expr()?;
                self.expect(Token::Semicolon)?;
                Ok(Node::new(
                    SirNode::Declaration { name, value: Box::new(value), ty: SirType::Expr, mutable },
                    lineno,
                ))
            }
            Token::Del => {
                self.advance();
                let name = self.expect_ident()?;
                self.expect(Token::Semicolon)?;
                Ok(Node::new(SirNode::Deletion(name), lineno))
            }
            Token::If => {
                self.advance();
                self.expect(Token::LParen)?;
                let test = self.parse_expr()?;
                self.expect(Token::RParen)?;
                let truebranch = self.parse_block()?;
                let falsebranch = if self.check(&Token::Else) {
                    self.advance();
                    if self.check(&Token::If) {
                        vec![self.parse_stmt()?]
                    } else {
                        self.parse_block()?
                    }
                } else {
                    Vec::new()
                };
                Ok(Node::new(SirNode::If { test: Box::new(test), truebranch, falsebranch }, lineno))
            }
            Token::Fn => {
                self.advance();
                let name = self.expect_ident()?;
                self.expect(Token::LParen)?;
                let mut args = Vec::new();
                if !self.check(&Token::RParen) {
                    loop {
                        let arg_name = self.expect_ident()?;
                        self.expect(Token::Colon)?;
                        let ty = self.parse_type()?;
                        args.push(FunctionArg { name: arg_name, ty });
                        if self.check(&Token::Comma) {
                            self.advance();
                            continue;
                        }
                        break;
                    }
                }
                self.expect(Token::RParen)?;
                let return_type = if self.check(&Token::Arrow) {
                    self.advance();
                    self.parse_type()?
                } else {
                    SirType::Expr
                };
                let body = self.parse_block()?;
                Ok(Node::new(SirNode::Function { name, return_type, args, body }, lineno))
            }
            Token::Return => {
                self.advance();
                let value = self.parse_expr()?;
                self.expect(Token::Semicolon)?;
                Ok(Node::new(SirNode::Return(Box::new(value)), lineno))
            }
            Token::Push => {
                self.advance();
                self.expect(Token::LParen)?;
                let value = self.parse_expr()?;
                self.expect(Token::RParen)?;
                self.expect(Token::Semicolon)?;
                Ok(Node::new(SirNode::Push(Box::new(value)), lineno))
            }
            Token::Verify => {
                self.advance();
                let paren = self.check(&Token::LParen);
                if paren {
                    self.advance();
                }
                let test = self.parse_expr()?;
                if paren {
                    self.expect(Token::RParen)?;
                }
                self.expect(Token::Semicolon)?;
                Ok(Node::new(SirNode::VerifyOpCode { name: "OP_VERIFY".to_string(), test: Box::new(test) }, lineno))
            }
            Token::Script => {
                self.advance();
                let stmts = self.parse_block()?;
                self.expect(Token::Semicolon)?;
                Ok(Node::new(SirNode::InnerScript(stmts), lineno))
            }
            Token::Ident(_) if *self.peek_at(1) == Token::Eq => {
                let name = self.expect_ident()?;
                self.expect(Token::Eq)?;
                let value = self.parse_expr()?;
                self.expect(Token::Semicolon)?;
                Ok(Node::new(SirNode::Assignment { name, value: Box::new(value), ty: SirType::Expr }, lineno))
            }
            _ => {
                let expr = self.parse_expr()?;
                self.expect(Token::Semicolon)?;
                Ok(expr)
            }
        }
    }

    fn parse_type(&mut self) -> Result<SirType, CompileError> {
        let lineno = self.line();
        match self.expect_ident()?.as_str() {
            "int" => Ok(SirType::Integer),
            "bytes" => Ok(SirType::ByteArray),
            other => Err(CompileError::Parsing {
                line: lineno,
                message: format!("unknown type '{other}', expected 'int' or 'bytes'"),
            }),
        }
    }

    fn parse_expr(&mut self) -> Result<Node, CompileError> {
        self.parse_binary(0)
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Node, CompileError> {
        let mut left = self.parse_unary()?;
        loop {
            let Some((prec, op)) = binary_op(self.peek()) else { break };
            if prec < min_prec {
                break;
            }
            let lineno = self.line();
            self.advance();
            let right = self.parse_binary(prec + 1)?;
            left = match op {
                BinOp::Direct(name) => Node::new(
                    SirNode::BinOpCode { name: name.to_string(), left: Box::new(left), right: Box::new(right) },
                    lineno,
                ),
                BinOp::NotEqual => {
                    let eq = Node::new(
                        SirNode::BinOpCode { name: "OP_EQUAL".to_string(), left: Box::new(left), right: Box::new(right) },
                        lineno,
                    );
                    Node::new(SirNode::UnaryOpCode { name: "OP_NOT".to_string(), operand: Box::new(eq) }, lineno)
                }
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Node, CompileError> {
        let lineno = self.line();
        match self.peek() {
            Token::Minus => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Node::new(SirNode::UnaryOpCode { name: "OP_NEGATE".to_string(), operand: Box::new(operand) }, lineno))
            }
            Token::Bang => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Node::new(SirNode::UnaryOpCode { name: "OP_NOT".to_string(), operand: Box::new(operand) }, lineno))
            }
            Token::Tilde => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Node::new(SirNode::UnaryOpCode { name: "OP_INVERT".to_string(), operand: Box::new(operand) }, lineno))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Node, CompileError> {
        let lineno = self.line();
        match self.advance() {
            Token::Int(n) => Ok(Node::new(SirNode::Int(n), lineno)),
            Token::Bytes(b) => Ok(Node::new(SirNode::Bytes(b), lineno)),
            Token::LParen => {
                let inner = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Cast => {
                self.expect(Token::LParen)?;
                let value = self.parse_expr()?;
                self.expect(Token::Comma)?;
                let as_type = self.parse_type()?;
                self.expect(Token::RParen)?;
                Ok(Node::new(SirNode::Cast { value: Box::new(value), as_type }, lineno))
            }
            Token::Ident(name) => {
                if self.check(&Token::LParen) {
                    self.advance();
                    let mut args = Vec::new();
                    if !self.check(&Token::RParen) {
                        loop {
                            args.push(self.parse_expr()?);
                            if self.check(&Token::Comma) {
                                self.advance();
                                continue;
                            }
                            break;
                        }
                    }
                    self.expect(Token::RParen)?;
                    Ok(self.build_call(name, args, lineno))
                } else {
                    Ok(Node::new(SirNode::Symbol(name), lineno))
                }
            }
            other => Err(CompileError::Parsing {
                line: lineno,
                message: format!("unexpected token {other:?} in expression"),
            }),
        }
    }

    /// Built-in opcode-backed functions lower directly to the matching
    /// `UnaryOpCode`/`BinOpCode`/`VariableArgsOpCode`; anything else is a
    /// user-defined `FunctionCall` left for the SIR optimizer to inline.
    fn build_call(&self, name: String, args: Vec<Node>, lineno: u32) -> Node {
        let kind = match builtin(&name) {
            Some(Builtin::Unary(op)) if args.len() == 1 => {
                let mut it = args.into_iter();
                SirNode::UnaryOpCode { name: op.to_string(), operand: Box::new(it.next().unwrap()) }
            }
            Some(Builtin::Binary(op)) if args.len() == 2 => {
                let mut it = args.into_iter();
                let left = Box::new(it.next().unwrap());
                let right = Box::new(it.next().unwrap());
                SirNode::BinOpCode { name: op.to_string(), left, right }
            }
            Some(Builtin::NAry(op)) => SirNode::VariableArgsOpCode { name: op.to_string(), operands: args },
            _ => SirNode::FunctionCall { name, args },
        };
        Node::new(kind, lineno)
    }
}

enum BinOp {
    Direct(&'static str),
    NotEqual,
}

fn binary_op(tok: &Token) -> Option<(u8, BinOp)> {
    Some(match tok {
        Token::OrOr => (1, BinOp::Direct("OP_BOOLOR")),
        Token::AndAnd => (2, BinOp::Direct("OP_BOOLAND")),
        Token::Pipe => (3, BinOp::Direct("OP_OR")),
        Token::Caret => (4, BinOp::Direct("OP_XOR")),
        Token::Amp => (5, BinOp::Direct("OP_AND")),
        Token::EqEq => (6, BinOp::Direct("OP_EQUAL")),
        Token::Ne => (6, BinOp::NotEqual),
        Token::Lt => (7, BinOp::Direct("OP_LESSTHAN")),
        Token::Gt => (7, BinOp::Direct("OP_GREATERTHAN")),
        Token::Le => (7, BinOp::Direct("OP_LESSTHANOREQUAL")),
        Token::Ge => (7, BinOp::Direct("OP_GREATERTHANOREQUAL")),
        Token::Shl => (8, BinOp::Direct("OP_LSHIFT")),
        Token::Shr => (8, BinOp::Direct("OP_RSHIFT")),
        Token::Plus => (9, BinOp::Direct("OP_ADD")),
        Token::Minus => (9, BinOp::Direct("OP_SUB")),
        Token::Star => (10, BinOp::Direct("OP_MUL")),
        Token::Slash => (10, BinOp::Direct("OP_DIV")),
        Token::Percent => (10, BinOp::Direct("OP_MOD")),
        _ => return None,
    })
}

enum Builtin {
    Unary(&'static str),
    Binary(&'static str),
    NAry(&'static str),
}

fn builtin(name: &str) -> Option<Builtin> {
    Some(match name {
        "hash160" => Builtin::Unary("OP_HASH160"),
        "hash256" => Builtin::Unary("OP_HASH256"),
        "sha256" => Builtin::Unary("OP_SHA256"),
        "sha1" => Builtin::Unary("OP_SHA1"),
        "ripemd160" => Builtin::Unary("OP_RIPEMD160"),
        "size" => Builtin::Unary("OP_SIZE"),
        "abs" => Builtin::Unary("OP_ABS"),
        "invert" => Builtin::Unary("OP_INVERT"),
        "checkLockTimeVerify" => Builtin::Unary("OP_CHECKLOCKTIMEVERIFY"),
        "checkSequenceVerify" => Builtin::Unary("OP_CHECKSEQUENCEVERIFY"),
        "checkSig" => Builtin::Binary("OP_CHECKSIG"),
        "min" => Builtin::Binary("OP_MIN"),
        "max" => Builtin::Binary("OP_MAX"),
        "cat" => Builtin::Binary("OP_CAT"),
        "checkMultiSig" => Builtin::NAry("OP_CHECKMULTISIG"),
        "within" => Builtin::NAry("OP_WITHIN"),
        _ => return None,
    })
}
