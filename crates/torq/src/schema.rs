//! Operator signature parsing.
//!
//! A schema is the typed signature of one overload of an operator kind,
//! written the way the upstream tracer prints it:
//!
//! ```text
//! aten::max_pool1d(Tensor self, int[1] kernel_size, int[1] stride=[], *, bool ceil_mode=False) -> (Tensor)
//! ```
//!
//! Schemas are only ever compared for identity: two schemas are equal iff
//! their canonical forms (qualified name plus normalized parameter types) are
//! textually identical. No type inference happens here.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ConversionError, ConversionResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchemaType {
    Tensor,
    Int,
    Float,
    Bool,
    Str,
    Scalar,
    ScalarType,
    NoneType,
    Any,
    List(Box<SchemaType>),
    Optional(Box<SchemaType>),
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaType::Tensor => write!(f, "Tensor"),
            SchemaType::Int => write!(f, "int"),
            SchemaType::Float => write!(f, "float"),
            SchemaType::Bool => write!(f, "bool"),
            SchemaType::Str => write!(f, "str"),
            SchemaType::Scalar => write!(f, "Scalar"),
            SchemaType::ScalarType => write!(f, "ScalarType"),
            SchemaType::NoneType => write!(f, "NoneType"),
            SchemaType::Any => write!(f, "Any"),
            // List lengths (`int[1]`) never disambiguate overloads, so the
            // canonical rendering drops them.
            SchemaType::List(elem) => write!(f, "{elem}[]"),
            SchemaType::Optional(inner) => write!(f, "{inner}?"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: SchemaType,
    pub default: Option<String>,
    pub kwarg_only: bool,
}

/// Parsed operator signature with a precomputed canonical identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    /// Qualified name including overload, e.g. `prim::min.self_int`.
    pub name: String,
    pub params: Vec<Param>,
    pub returns: Vec<SchemaType>,
    canonical: String,
}

impl Schema {
    pub fn parse(text: &str) -> ConversionResult<Schema> {
        Parser::new(text).signature().map_err(|message| ConversionError::Schema {
            text: text.to_string(),
            message,
        })
    }

    /// `name(type, type, ...)` identity string.
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// Operator kind this overload belongs to (name without overload suffix).
    pub fn kind(&self) -> &str {
        self.name.split('.').next().unwrap_or(&self.name)
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for Schema {}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

fn render_canonical(name: &str, params: &[Param]) -> String {
    let types: Vec<String> = params.iter().map(|p| p.ty.to_string()).collect();
    format!("{}({})", name, types.join(", "))
}

struct Parser<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            src: text.as_bytes(),
            pos: 0,
        }
    }

    fn signature(mut self) -> Result<Schema, String> {
        let name = self.qualified_name()?;
        self.expect(b'(')?;
        let mut params = Vec::new();
        let mut kwarg_only = false;
        self.skip_ws();
        if !self.eat(b')') {
            loop {
                self.skip_ws();
                if self.eat(b'*') {
                    kwarg_only = true;
                } else {
                    params.push(self.param(kwarg_only)?);
                }
                self.skip_ws();
                if self.eat(b',') {
                    continue;
                }
                self.expect(b')')?;
                break;
            }
        }
        let returns = self.returns()?;
        self.skip_ws();
        if self.pos != self.src.len() {
            return Err(format!("trailing input at offset {}", self.pos));
        }
        let canonical = render_canonical(&name, &params);
        Ok(Schema {
            name,
            params,
            returns,
            canonical,
        })
    }

    fn qualified_name(&mut self) -> Result<String, String> {
        self.skip_ws();
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == b'_' || c == b':' || c == b'.' {
                self.pos += 1;
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err("expected operator name".to_string());
        }
        Ok(std::str::from_utf8(&self.src[start..self.pos])
            .map_err(|_| "non-utf8 name".to_string())?
            .to_string())
    }

    fn param(&mut self, kwarg_only: bool) -> Result<Param, String> {
        let ty = self.type_expr()?;
        self.skip_ws();
        let name = self.ident()?;
        self.skip_ws();
        let default = if self.eat(b'=') {
            Some(self.default_value()?)
        } else {
            None
        };
        Ok(Param {
            name,
            ty,
            default,
            kwarg_only,
        })
    }

    fn type_expr(&mut self) -> Result<SchemaType, String> {
        self.skip_ws();
        let base = self.ident()?;
        let mut ty = match base.as_str() {
            "Tensor" => SchemaType::Tensor,
            "int" => SchemaType::Int,
            "float" => SchemaType::Float,
            "bool" => SchemaType::Bool,
            "str" => SchemaType::Str,
            "Scalar" => SchemaType::Scalar,
            "ScalarType" => SchemaType::ScalarType,
            "None" | "NoneType" => SchemaType::NoneType,
            "Any" | "t" => SchemaType::Any,
            other => return Err(format!("unknown type `{other}`")),
        };
        loop {
            if self.eat(b'[') {
                // optional fixed length, e.g. int[1]
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
                self.expect(b']')?;
                ty = SchemaType::List(Box::new(ty));
            } else if self.eat(b'?') {
                ty = SchemaType::Optional(Box::new(ty));
            } else {
                break;
            }
        }
        Ok(ty)
    }

    fn returns(&mut self) -> Result<Vec<SchemaType>, String> {
        self.skip_ws();
        if !self.eat(b'-') {
            return Ok(Vec::new());
        }
        self.expect(b'>')?;
        self.skip_ws();
        let mut returns = Vec::new();
        if self.eat(b'(') {
            self.skip_ws();
            if !self.eat(b')') {
                loop {
                    returns.push(self.type_expr()?);
                    self.skip_ws();
                    if self.eat(b',') {
                        continue;
                    }
                    self.expect(b')')?;
                    break;
                }
            }
        } else {
            returns.push(self.type_expr()?);
        }
        Ok(returns)
    }

    /// Default values are recorded verbatim; they never affect identity.
    fn default_value(&mut self) -> Result<String, String> {
        self.skip_ws();
        let start = self.pos;
        let mut depth = 0usize;
        while let Some(c) = self.peek() {
            match c {
                b'[' | b'(' => depth += 1,
                b']' | b')' if depth > 0 => depth -= 1,
                b',' | b')' if depth == 0 => break,
                _ => {}
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Err("expected default value".to_string());
        }
        Ok(std::str::from_utf8(&self.src[start..self.pos])
            .map_err(|_| "non-utf8 default".to_string())?
            .trim()
            .to_string())
    }

    fn ident(&mut self) -> Result<String, String> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == b'_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(format!("expected identifier at offset {start}"));
        }
        Ok(std::str::from_utf8(&self.src[start..self.pos])
            .map_err(|_| "non-utf8 identifier".to_string())?
            .to_string())
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn eat(&mut self, c: u8) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: u8) -> Result<(), String> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(format!(
                "expected `{}` at offset {}",
                c as char, self.pos
            ))
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }
}
