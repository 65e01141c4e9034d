use super::{ExitContext, PResult, Parser};
use crate::ast::{
    Access, ClassDeclaration, ConstDeclaration, ConstsDeclaration, FieldsDeclaration,
    MethodAccess, Parameter, PassingMode, ProcedureDeclaration, PropertyDeclaration, PropertyKind,
    ReDimStatement, ReDimTarget, Statement, StatementKind, VariableDeclaration,
    VariablesDeclaration,
};
use crate::syntax_error::SyntaxErrorCode;
use crate::token::{Keyword, Punctuation};

impl Parser<'_> {
    pub(crate) fn parse_dim(&mut self) -> PResult<StatementKind> {
        self.advance();
        let variables = self.parse_variable_list()?;
        Ok(StatementKind::Dim(VariablesDeclaration { variables }))
    }

    fn parse_variable_list(&mut self) -> PResult<Vec<VariableDeclaration>> {
        let mut variables = vec![self.parse_variable()?];
        while self.opt_punctuation(Punctuation::Comma) {
            variables.push(self.parse_variable()?);
        }
        Ok(variables)
    }

    /// `name`, `name()` or `name(3, 4)`; bounds must be integer literals.
    fn parse_variable(&mut self) -> PResult<VariableDeclaration> {
        let name = self.expect_identifier()?;
        let mut decl = VariableDeclaration {
            name,
            dims: Vec::new(),
            dynamic_array: false,
        };
        if self.opt_punctuation(Punctuation::LParen) {
            if self.match_punctuation(Punctuation::RParen) {
                decl.dynamic_array = true;
            } else {
                decl.dims.push(self.expect_integer()?);
                while self.opt_punctuation(Punctuation::Comma) {
                    decl.dims.push(self.expect_integer()?);
                }
            }
            self.expect_punctuation(Punctuation::RParen, SyntaxErrorCode::ExpectedRParen)?;
        }
        Ok(decl)
    }

    pub(crate) fn parse_const(&mut self, access: Option<Access>) -> PResult<StatementKind> {
        self.advance();
        let mut constants = Vec::new();
        loop {
            let name = self.expect_identifier()?;
            self.expect_punctuation(Punctuation::Equal, SyntaxErrorCode::ExpectedEqual)?;
            let value = self.parse_const_init()?;
            constants.push(ConstDeclaration { name, value });
            if !self.opt_punctuation(Punctuation::Comma) {
                break;
            }
        }
        Ok(StatementKind::Const(ConstsDeclaration { access, constants }))
    }

    pub(crate) fn parse_redim(&mut self) -> PResult<StatementKind> {
        self.advance();
        let preserve = self.opt_keyword(Keyword::Preserve);
        let mut targets = Vec::new();
        loop {
            let name = self.expect_identifier()?;
            self.expect_punctuation(Punctuation::LParen, SyntaxErrorCode::ExpectedLParen)?;
            let mut dims = vec![self.parse_expression()?];
            while self.opt_punctuation(Punctuation::Comma) {
                dims.push(self.parse_expression()?);
            }
            self.expect_punctuation(Punctuation::RParen, SyntaxErrorCode::ExpectedRParen)?;
            targets.push(ReDimTarget { name, dims });
            if !self.opt_punctuation(Punctuation::Comma) {
                break;
            }
        }
        Ok(StatementKind::ReDim(ReDimStatement { preserve, targets }))
    }

    /// `Public` / `Private` outside a class. Procedures are only accepted when
    /// the declaration starts a line at global scope.
    pub(crate) fn parse_public_or_private(&mut self, allow_procedures: bool) -> PResult<Statement> {
        let start = self.mark();
        let access = self.parse_access();
        if self.match_keyword(Keyword::Default) {
            return Err(self.error(SyntaxErrorCode::MustBeDefinedInsideClass));
        }
        if self.match_keyword(Keyword::Property) {
            return Err(self.error(SyntaxErrorCode::MustBeDefinedInsideClass));
        }
        let method_access = match access {
            Access::Public => MethodAccess::Public,
            Access::Private => MethodAccess::Private,
        };
        if self.match_keyword(Keyword::Sub) || self.match_keyword(Keyword::Function) {
            if !allow_procedures {
                return Err(self.error(SyntaxErrorCode::SyntaxError));
            }
            let kw = if self.match_keyword(Keyword::Sub) {
                Keyword::Sub
            } else {
                Keyword::Function
            };
            return self.parse_procedure(kw, method_access);
        }
        let kind = self.parse_field_or_const(access)?;
        Ok(Statement {
            kind,
            span: self.span_from(start),
        })
    }

    fn parse_access(&mut self) -> Access {
        if self.opt_keyword(Keyword::Private) {
            Access::Private
        } else {
            self.advance();
            Access::Public
        }
    }

    fn parse_field_or_const(&mut self, access: Access) -> PResult<StatementKind> {
        if self.match_keyword(Keyword::Const) {
            return self.parse_const(Some(access));
        }
        if !self.match_identifier() {
            return Err(self.error(SyntaxErrorCode::ExpectedIdentifier));
        }
        let fields = self.parse_variable_list()?;
        Ok(StatementKind::Fields(FieldsDeclaration { access, fields }))
    }

    /// `Sub` / `Function` with the keyword as the current token.
    pub(crate) fn parse_procedure(&mut self, kw: Keyword, access: MethodAccess) -> PResult<Statement> {
        let start = self.mark();
        self.advance();
        let name = self.expect_identifier()?;

        let mut has_parens = false;
        let mut parameters = Vec::new();
        if self.opt_punctuation(Punctuation::LParen) {
            has_parens = true;
            parameters = self.parse_parameter_list()?;
            self.expect_punctuation(Punctuation::RParen, SyntaxErrorCode::ExpectedRParen)?;
        }

        self.skip_comments();
        let inline = self.match_colon() || !self.match_line_termination();
        has_parens = has_parens || self.match_colon();
        self.opt_line_termination();
        if inline && !has_parens {
            return Err(self.error(SyntaxErrorCode::SyntaxError));
        }

        let body = self.parse_procedure_body(kw, inline)?;

        self.expect_keyword(Keyword::End, SyntaxErrorCode::ExpectedEnd)?;
        let end_code = if kw == Keyword::Sub {
            SyntaxErrorCode::ExpectedSub
        } else {
            SyntaxErrorCode::ExpectedFunction
        };
        self.expect_keyword(kw, end_code)?;

        let decl = ProcedureDeclaration {
            name,
            access,
            parameters,
            body,
        };
        let kind = if kw == Keyword::Sub {
            StatementKind::Sub(decl)
        } else {
            StatementKind::Function(decl)
        };
        Ok(Statement {
            kind,
            span: self.span_from(start),
        })
    }

    fn parse_procedure_body(&mut self, kw: Keyword, inline: bool) -> PResult<Vec<Statement>> {
        let saved = std::mem::replace(
            &mut self.exits,
            ExitContext {
                procedure: Some(kw),
                ..ExitContext::default()
            },
        );
        let saved_with = std::mem::take(&mut self.with_depth);
        let body = if inline {
            self.parse_multi_inline()
        } else {
            self.parse_block_until(&[Keyword::End])
        };
        self.exits = saved;
        self.with_depth = saved_with;
        body
    }

    fn parse_parameter_list(&mut self) -> PResult<Vec<Parameter>> {
        let mut params = Vec::new();
        if !(self.match_keyword(Keyword::ByRef)
            || self.match_keyword(Keyword::ByVal)
            || self.match_identifier())
        {
            return Ok(params);
        }
        params.push(self.parse_parameter()?);
        while self.opt_punctuation(Punctuation::Comma) {
            params.push(self.parse_parameter()?);
        }
        Ok(params)
    }

    fn parse_parameter(&mut self) -> PResult<Parameter> {
        let mode = if self.opt_keyword(Keyword::ByVal) {
            PassingMode::ByVal
        } else {
            self.opt_keyword(Keyword::ByRef);
            PassingMode::ByRef
        };
        let name = self.expect_identifier()?;
        let is_array = if self.opt_punctuation(Punctuation::LParen) {
            self.expect_punctuation(Punctuation::RParen, SyntaxErrorCode::ExpectedRParen)?;
            true
        } else {
            false
        };
        Ok(Parameter {
            name,
            mode,
            is_array,
        })
    }

    fn parse_property(&mut self, access: MethodAccess) -> PResult<Statement> {
        let start = self.mark();
        self.advance();
        let kind = if self.opt_keyword(Keyword::Get) {
            PropertyKind::Get
        } else if self.opt_keyword(Keyword::Let) {
            PropertyKind::Let
        } else if self.opt_keyword(Keyword::Set) {
            PropertyKind::Set
        } else {
            return Err(self.error(SyntaxErrorCode::ExpectedLetGetSet));
        };
        if access == MethodAccess::PublicDefault && kind != PropertyKind::Get {
            return Err(self.error(SyntaxErrorCode::DefaultCanOnlyBeOnPropertyGet));
        }

        let name = self.expect_identifier()?;
        let mut parameters = Vec::new();
        if self.opt_punctuation(Punctuation::LParen) {
            parameters = self.parse_parameter_list()?;
            self.expect_punctuation(Punctuation::RParen, SyntaxErrorCode::ExpectedRParen)?;
        }
        if kind != PropertyKind::Get && parameters.is_empty() {
            return Err(self.error(SyntaxErrorCode::PropertySetOrLetMustHaveArguments));
        }

        self.skip_comments();
        self.expect_line_termination()?;
        let body = self.parse_procedure_body(Keyword::Property, false)?;

        self.expect_keyword(Keyword::End, SyntaxErrorCode::ExpectedEnd)?;
        self.expect_keyword(Keyword::Property, SyntaxErrorCode::ExpectedProperty)?;

        Ok(Statement {
            kind: StatementKind::Property(PropertyDeclaration {
                kind,
                procedure: ProcedureDeclaration {
                    name,
                    access,
                    parameters,
                    body,
                },
            }),
            span: self.span_from(start),
        })
    }

    pub(crate) fn parse_class(&mut self) -> PResult<Statement> {
        let start = self.mark();
        self.advance();
        let name = self.expect_identifier()?;
        self.skip_comments();
        self.expect_line_termination()?;

        let mut members = Vec::new();
        let mut has_default = false;
        loop {
            self.skip_comments_and_newlines();
            if self.match_eof() || self.match_keyword(Keyword::End) {
                break;
            }
            members.push(self.parse_class_member(&mut has_default)?);
            self.skip_comments();
            self.expect_line_termination()?;
        }

        self.expect_keyword(Keyword::End, SyntaxErrorCode::ExpectedEnd)?;
        self.expect_keyword(Keyword::Class, SyntaxErrorCode::ExpectedClass)?;
        Ok(Statement {
            kind: StatementKind::Class(ClassDeclaration { name, members }),
            span: self.span_from(start),
        })
    }

    fn parse_class_member(&mut self, has_default: &mut bool) -> PResult<Statement> {
        let start = self.mark();
        let access = if self.match_keyword(Keyword::Public) || self.match_keyword(Keyword::Private) {
            Some(self.parse_access())
        } else {
            None
        };

        let mut is_default = false;
        if self.match_keyword(Keyword::Default) {
            if access != Some(Access::Public) {
                return Err(self.error(SyntaxErrorCode::DefaultMustAlsoSpecifyPublic));
            }
            if *has_default {
                return Err(self.error(SyntaxErrorCode::CannotHaveMultipleDefault));
            }
            self.advance();
            is_default = true;
            *has_default = true;
        }

        let method_access = match (access, is_default) {
            (_, true) => MethodAccess::PublicDefault,
            (Some(Access::Public), false) => MethodAccess::Public,
            (Some(Access::Private), false) => MethodAccess::Private,
            (None, false) => MethodAccess::None,
        };

        if self.match_keyword(Keyword::Sub) || self.match_keyword(Keyword::Function) {
            let kw = if self.match_keyword(Keyword::Sub) {
                Keyword::Sub
            } else {
                Keyword::Function
            };
            let stmt = self.parse_procedure(kw, method_access)?;
            if let StatementKind::Sub(decl) = &stmt.kind {
                let lifecycle = decl.name.eq_ignore_ascii_case("Class_Initialize")
                    || decl.name.eq_ignore_ascii_case("Class_Terminate");
                if lifecycle && !decl.parameters.is_empty() {
                    return Err(self.error(
                        SyntaxErrorCode::ClassInitializeOrTerminateDoNotHaveArguments,
                    ));
                }
            }
            return Ok(stmt);
        }
        if self.match_keyword(Keyword::Property) {
            return self.parse_property(method_access);
        }
        if is_default {
            return Err(self.error(
                SyntaxErrorCode::DefaultCanBeSpecifiedOnlyOnPropertyFunctionOrSub,
            ));
        }

        let kind = match access {
            Some(access) => self.parse_field_or_const(access)?,
            None if self.match_keyword(Keyword::Dim) => self.parse_dim()?,
            None if self.match_keyword(Keyword::Const) => self.parse_const(None)?,
            None => return Err(self.error(SyntaxErrorCode::SyntaxError)),
        };
        Ok(Statement {
            kind,
            span: self.span_from(start),
        })
    }
}
