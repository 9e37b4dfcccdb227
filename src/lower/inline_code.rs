//! Inline-code templates.
//!
//! A method with inline-code semantics is called by pasting a template in place of the call.
//! Placeholders in braces are substituted:
//!
//! * `{this}`: the receiver.
//! * `{name}`: the argument for parameter `name`.
//! * `{*name}`: the elements of a `params` array, separated by commas.
//! * `{@name}`: the value of a constant string argument, pasted as raw text.
//! * `{$Some.Type}`: the type object of a type.
//! * `{T}`: the type object for the argument of a type parameter of the method or its type.
//!
//! `{{` and `}}` stand for literal braces.

use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;

use crate::js::{Effects, JsExpr, JsStmt, VerbatimPart};
use crate::model::{GenericOwner, MethodKind, MethodRef, Type};
use crate::pos::Span;

use super::invoke::ParamValue;
use super::order::{hoist_for_order, Placement};
use super::{ExprCompiler, LResult};

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Token {
    Text(String),
    This,
    Param { index: usize, mode: ParamMode },
    Type(Type),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(super) enum ParamMode {
    Value,
    Expand,
    Literal,
}

/// Names a template may refer to.
pub(super) struct TemplateScope<'a> {
    pub params: Vec<&'a str>,
    pub has_this: bool,
    /// Type parameters in scope, with what they stand for at this call.
    pub type_params: Vec<(&'a str, Type)>,
    pub find_type: &'a dyn Fn(&str) -> Option<Type>,
}

#[derive(Debug, Clone, PartialEq)]
pub(super) struct TemplateError {
    pub message: String,
    pub suggestion: Option<String>,
}

impl TemplateError {
    fn new(message: String) -> Self { TemplateError { message, suggestion: None } }
}

pub(super) fn parse_template(text: &str, scope: &TemplateScope<'_>) -> Result<Vec<Token>, TemplateError> {
    lazy_static! {
        static ref TOKEN_RE: Regex = Regex::new(r"\{\{|\}\}|\{([^{}]*)\}|[{}]").unwrap();
    }

    let mut tokens = vec![];
    let mut text_buf = String::new();
    let mut last_end = 0;
    for caps in TOKEN_RE.captures_iter(text) {
        let whole = caps.get(0).map_or("", |m| m.as_str());
        let (start, end) = caps.get(0).map_or((0, 0), |m| (m.start(), m.end()));
        text_buf.push_str(&text[last_end..start]);
        last_end = end;

        let content = match (whole, caps.get(1)) {
            ("{{", _) => { text_buf.push('{'); continue },
            ("}}", _) => { text_buf.push('}'); continue },
            (_, Some(content)) => content.as_str(),
            (_, None) => return Err(TemplateError::new(format!("unmatched '{}' at offset {}", whole, start))),
        };

        if !text_buf.is_empty() {
            tokens.push(Token::Text(std::mem::take(&mut text_buf)));
        }
        tokens.push(parse_placeholder(content, scope)?);
    }
    text_buf.push_str(&text[last_end..]);
    if !text_buf.is_empty() {
        tokens.push(Token::Text(text_buf));
    }
    Ok(tokens)
}

fn parse_placeholder(content: &str, scope: &TemplateScope<'_>) -> Result<Token, TemplateError> {
    if content == "this" {
        return match scope.has_this {
            true => Ok(Token::This),
            false => Err(TemplateError::new("'{this}' is used, but the method has no receiver".to_owned())),
        };
    }
    if let Some(type_name) = content.strip_prefix('$') {
        return match (scope.find_type)(type_name) {
            Some(ty) => Ok(Token::Type(ty)),
            None => Err(TemplateError::new(format!("unknown type '{}'", type_name))),
        };
    }

    let (mode, name) = match content.chars().next() {
        Some('*') => (ParamMode::Expand, &content[1..]),
        Some('@') => (ParamMode::Literal, &content[1..]),
        Some(_) => (ParamMode::Value, content),
        None => return Err(TemplateError::new("empty placeholder '{}'".to_owned())),
    };
    if let Some(index) = scope.params.iter().position(|&param| param == name) {
        return Ok(Token::Param { index, mode });
    }
    if mode == ParamMode::Value {
        if let Some((_, ty)) = scope.type_params.iter().find(|(param, _)| *param == name) {
            return Ok(Token::Type(ty.clone()));
        }
    }

    let known_names = scope.params.iter().copied().chain(scope.type_params.iter().map(|(name, _)| *name));
    Err(TemplateError {
        message: format!("'{}' is not a parameter or type parameter", name),
        suggestion: suggest(name, known_names),
    })
}

/// The closest known name, if any is close enough to be a likely typo.
fn suggest<'a>(name: &str, candidates: impl Iterator<Item=&'a str>) -> Option<String> {
    let max_distance = usize::max(1, name.chars().count() / 3);
    candidates
        .map(|candidate| (strsim::levenshtein(name, candidate), candidate))
        .filter(|&(distance, _)| distance <= max_distance)
        .min_by_key(|&(distance, _)| distance)
        .map(|(_, candidate)| candidate.to_owned())
}

impl ExprCompiler<'_> {
    pub(super) fn parse_inline_code(&self, template: &str, method: &MethodRef, span: Span) -> LResult<Vec<Token>> {
        let program = self.ctx.program;
        let def = program.method(method.method);
        let declaring = program.type_def(def.declaring);

        let method_type_params = def.type_params.iter().enumerate().map(|(index, param)| {
            let ty = method.method_args.get(index).cloned().unwrap_or(Type::TypeParam {
                owner: GenericOwner::Method(method.method), index: index as u32,
            });
            (&param.name[..], ty)
        });
        let type_type_params = declaring.type_params.iter().enumerate().map(|(index, param)| {
            let ty = method.type_args.get(index).cloned().unwrap_or(Type::TypeParam {
                owner: GenericOwner::Type(def.declaring), index: index as u32,
            });
            (&param.name[..], ty)
        });

        let find_type = |name: &str| program.find_type(name).map(Type::named);
        let scope = TemplateScope {
            params: def.params.iter().map(|param| &param.name[..]).collect(),
            has_this: !def.is_static && def.kind != MethodKind::Constructor,
            type_params: method_type_params.chain(type_type_params).collect(),
            find_type: &find_type,
        };

        parse_template(template, &scope).map_err(|e| {
            let mut diag = error!(
                code="E0705",
                message("invalid inline code for '{}'", program.method_display(method.method)),
                primary(span, "{}", e.message),
                note("the template is `{}`", template),
            );
            if let Some(suggestion) = e.suggestion {
                for diagnostic in &mut diag.diagnostics {
                    diagnostic.notes.push(format!("did you mean '{}'?", suggestion));
                }
            }
            self.report(diag)
        })
    }

    /// Paste compiled arguments into a parsed template.
    pub(super) fn substitute_inline_code(
        &mut self,
        template: &[Token],
        method: &MethodRef,
        receiver: Option<JsExpr>,
        params: Vec<ParamValue>,
        span: Span,
        stmts: &mut Vec<JsStmt>,
    ) -> LResult<JsExpr> {
        let offset = receiver.is_some() as usize;
        let has_receiver = receiver.is_some();
        let mut items = receiver.into_iter()
            .chain(params.into_iter().map(ParamValue::into_expr))
            .collect::<Vec<_>>();

        let item_of = |token: &Token| match *token {
            Token::This if has_receiver => Some(0),
            Token::Param { index, mode: ParamMode::Value | ParamMode::Expand } => Some(offset + index),
            _ => None,
        };

        // constant arguments pasted as text must be read before anything is hoisted
        let mut literals = IndexMap::new();
        for token in template {
            if let Token::Param { index, mode: ParamMode::Literal } = *token {
                match &items[offset + index] {
                    JsExpr::String(text) => { literals.insert(index, text.clone()); },
                    _ => return Err(self.report(error!(
                        code="E0705",
                        message("invalid inline code for '{}'", self.ctx.program.method_display(method.method)),
                        primary(span, "argument for '{{@{}}}' is not a constant string", self.ctx.program.method(method.method).params[index].name),
                    ))),
                }
            }
        }

        let mut uses = vec![0; items.len()];
        let mut first_use = vec![usize::MAX; items.len()];
        for (position, token) in template.iter().enumerate() {
            if let Some(item) = item_of(token) {
                uses[item] += 1;
                first_use[item] = first_use[item].min(position);
            }
        }
        let placements = uses.iter().map(|&count| match count {
            0 => Placement::Discard,
            1 => Placement::Normal,
            _ => Placement::Temp,
        }).collect::<Vec<_>>();
        let mut order = (0..items.len()).collect::<Vec<_>>();
        order.sort_by_key(|&item| (first_use[item], item));
        let mut positions = vec![0; items.len()];
        for (position, &item) in order.iter().enumerate() {
            positions[item] = position;
        }
        let hoisted = hoist_for_order(&mut items, Some(&positions), Some(&placements), &Effects::default(), self.ctx.temporaries);
        stmts.extend(hoisted);

        let mut parts = vec![];
        for token in template {
            match token {
                Token::Text(text) => push_text(&mut parts, text),
                Token::This if !has_receiver => parts.push(VerbatimPart::Expr(self.this_expr.clone())),
                Token::This => parts.push(VerbatimPart::Expr(items[0].clone())),
                Token::Param { index, mode: ParamMode::Value } => parts.push(VerbatimPart::Expr(items[offset + index].clone())),
                Token::Param { index, mode: ParamMode::Expand } => match &items[offset + index] {
                    JsExpr::Array(elems) => {
                        for (i, elem) in elems.iter().enumerate() {
                            if i > 0 {
                                push_text(&mut parts, ", ");
                            }
                            parts.push(VerbatimPart::Expr(elem.clone()));
                        }
                    },
                    other => parts.push(VerbatimPart::Expr(other.clone())),
                },
                Token::Param { index, mode: ParamMode::Literal } => {
                    push_text(&mut parts, literals.get(index).map_or("", |s| &s[..]));
                },
                Token::Type(ty) => {
                    let rt = self.ctx.runtime;
                    let type_object = rt.instantiate_type(ty, &mut self.rt(stmts))?;
                    parts.push(VerbatimPart::Expr(type_object));
                },
            }
        }
        Ok(JsExpr::Verbatim(parts))
    }
}

fn push_text(parts: &mut Vec<VerbatimPart>, text: &str) {
    match parts.last_mut() {
        Some(VerbatimPart::Text(prev)) => prev.push_str(text),
        _ => parts.push(VerbatimPart::Text(text.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Primitive;

    fn scope_parse(text: &str) -> Result<Vec<Token>, TemplateError> {
        let find_type = |name: &str| match name {
            "System.Int32" => Some(Type::INT),
            _ => None,
        };
        let scope = TemplateScope {
            params: vec!["count", "items"],
            has_this: true,
            type_params: vec![("T", Type::Primitive(Primitive::String))],
            find_type: &find_type,
        };
        parse_template(text, &scope)
    }

    #[test]
    fn tokens() {
        let tokens = scope_parse("{this}.push({*items}, {count}) + {{}} + {$System.Int32} + {T}").unwrap();
        assert_eq!(tokens, vec![
            Token::This,
            Token::Text(".push(".to_owned()),
            Token::Param { index: 1, mode: ParamMode::Expand },
            Token::Text(", ".to_owned()),
            Token::Param { index: 0, mode: ParamMode::Value },
            Token::Text(") + {} + ".to_owned()),
            Token::Type(Type::INT),
            Token::Text(" + ".to_owned()),
            Token::Type(Type::STRING),
        ]);
        assert_eq!(scope_parse("{@count}").unwrap(), vec![Token::Param { index: 0, mode: ParamMode::Literal }]);
    }

    #[test]
    fn errors() {
        let err = scope_parse("f({cuont})").unwrap_err();
        assert_eq!(err.suggestion.as_deref(), Some("count"));

        assert!(scope_parse("f({count)").is_err());
        assert!(scope_parse("f(count})").is_err());
        assert!(scope_parse("{}").is_err());
        assert!(scope_parse("{$Nope}").is_err());
        assert_eq!(scope_parse("{zzzzzz}").unwrap_err().suggestion, None);
    }
}
