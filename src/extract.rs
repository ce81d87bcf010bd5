//! Converts a fully reduced term graph back into host values. Dispatch is
//! purely on the term's tag/extension pair; compound children are
//! re-normalized and extracted recursively. A term still carrying an
//! application, a free variable, or a bare lambda means the graph never
//! reached a closed normal form, and extraction fails rather than guessing.

use arcstr::ArcStr;
use indexmap::IndexMap;

use crate::encode::{big_int, float, tag, AccessorRegistry, StringTable};
use crate::lang::symbol::SymbolTable;
use crate::lang::value::Value;
use crate::net::{NetError, Runtime, Tag, Term};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtractError {
    Net(NetError),
    /// An application, variable, or other non-value survived reduction.
    Unreduced,
    /// A term shape outside the supported result set.
    UnsupportedShape,
    /// A constructor whose fields do not decode (bad width, dangling IDs).
    BadEncoding,
    /// The distinguished evaluation-failure constructor: a missing
    /// attribute without a fallback, or a failed assertion. The standard
    /// evaluator re-raises the real error after the fallback.
    EvaluationFailed,
}

impl From<NetError> for ExtractError {
    fn from(error: NetError) -> Self {
        ExtractError::Net(error)
    }
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Net(error) => write!(f, "{}", error),
            ExtractError::Unreduced => write!(f, "term did not reach a closed normal form"),
            ExtractError::UnsupportedShape => write!(f, "unsupported result shape"),
            ExtractError::BadEncoding => write!(f, "malformed value encoding"),
            ExtractError::EvaluationFailed => write!(f, "evaluation failure"),
        }
    }
}

impl std::error::Error for ExtractError {}

type Result<T> = std::result::Result<T, ExtractError>;

/// Extension values the extractor can turn into host values. `can_extract`
/// accepts exactly what `extract` handles; a mismatch between the two would
/// be a logic error, so both consult this one predicate.
fn extractable(ext: u32) -> bool {
    matches!(
        ext,
        tag::TRU
            | tag::FLS
            | tag::NUL
            | tag::POS
            | tag::NEG
            | tag::FLT
            | tag::STR
            | tag::CAT
            | tag::N2S
            | tag::LST
            | tag::ATS
            | tag::PTH
    )
}

pub struct Extractor<'a> {
    pub rt: &'a mut Runtime,
    pub symbols: &'a SymbolTable,
    pub strings: &'a StringTable,
    pub accessors: &'a AccessorRegistry,
}

impl<'a> Extractor<'a> {
    pub fn can_extract(&mut self, term: Term) -> bool {
        match self.rt.evaluate_wnf(term) {
            Ok(value) => match value.tag() {
                Tag::Num => true,
                Tag::Ctr => extractable(value.ext()),
                _ => false,
            },
            Err(_) => false,
        }
    }

    pub fn extract(&mut self, term: Term) -> Result<Value> {
        stacker::maybe_grow(64 * 1024, 4 * 1024 * 1024, || self.extract_inner(term))
    }

    fn extract_inner(&mut self, term: Term) -> Result<Value> {
        let value = self.rt.evaluate_wnf(term)?;
        match value.tag() {
            Tag::Num => Ok(Value::Int(big_int::decode_small(value.val()))),
            Tag::Ctr => {
                if !extractable(value.ext()) {
                    return if value.ext() == tag::ERR {
                        Err(ExtractError::EvaluationFailed)
                    } else {
                        Err(ExtractError::UnsupportedShape)
                    };
                }
                self.extract_ctor(value)
            }
            _ => Err(ExtractError::Unreduced),
        }
    }

    fn extract_ctor(&mut self, value: Term) -> Result<Value> {
        match value.ext() {
            tag::TRU => Ok(Value::Bool(true)),
            tag::FLS => Ok(Value::Bool(false)),
            tag::NUL => Ok(Value::Null),

            tag::POS | tag::NEG => {
                let (lo, hi) = self.two_words(value)?;
                big_int::combine(value.ext() == tag::NEG, lo, hi)
                    .map(Value::Int)
                    .ok_or(ExtractError::BadEncoding)
            }

            tag::FLT => {
                let (lo, hi) = self.two_words(value)?;
                Ok(Value::Float(float::combine(lo, hi)))
            }

            tag::STR => {
                let id = self.word_field(value, 0)?;
                self.strings
                    .resolve(id)
                    .map(Value::String)
                    .ok_or(ExtractError::BadEncoding)
            }

            tag::CAT | tag::N2S => {
                let mut text = String::new();
                self.flatten(value, &mut text)?;
                Ok(Value::String(ArcStr::from(text)))
            }

            tag::LST => {
                let length = self.word_field(value, 0)? as usize;
                let mut items = Vec::with_capacity(length.min(1 << 16));
                let mut spine = self.rt.get(value.slot().offset(1));
                loop {
                    let cell = self.rt.evaluate_wnf(spine)?;
                    match (cell.tag(), cell.ext()) {
                        (Tag::Ctr, tag::NIL) => break,
                        (Tag::Ctr, tag::CON) => {
                            let head = self.rt.get(cell.slot());
                            items.push(self.extract(head)?);
                            spine = self.rt.get(cell.slot().offset(1));
                        }
                        _ => return Err(ExtractError::Unreduced),
                    }
                }
                Ok(Value::List(items))
            }

            tag::ATS => {
                let mut attrs = IndexMap::new();
                let mut spine = self.rt.get(value.slot());
                loop {
                    let cell = self.rt.evaluate_wnf(spine)?;
                    match (cell.tag(), cell.ext()) {
                        (Tag::Ctr, tag::NIL) => break,
                        (Tag::Ctr, tag::CON) => {
                            let pair = self.rt.get(cell.slot());
                            let pair = self.rt.evaluate_wnf(pair)?;
                            if pair.tag() != Tag::Ctr || pair.ext() != tag::ATR {
                                return Err(ExtractError::Unreduced);
                            }
                            let key = self.word_field(pair, 0)?;
                            let symbol = self
                                .symbols
                                .from_id(key)
                                .ok_or(ExtractError::BadEncoding)?;
                            let field = self.rt.get(pair.slot().offset(1));
                            let extracted = self.extract(field)?;
                            attrs.insert(symbol, extracted);
                            spine = self.rt.get(cell.slot().offset(1));
                        }
                        _ => return Err(ExtractError::Unreduced),
                    }
                }
                Ok(Value::Attrs(attrs))
            }

            tag::PTH => {
                let (accessor_id, path_id) = self.two_words(value)?;
                let accessor = self
                    .accessors
                    .resolve(accessor_id)
                    .ok_or(ExtractError::BadEncoding)?
                    .clone();
                let path = self
                    .strings
                    .resolve(path_id)
                    .ok_or(ExtractError::BadEncoding)?;
                Ok(Value::Path { accessor, path })
            }

            _ => Err(ExtractError::UnsupportedShape),
        }
    }

    /// Flattens a lazy concatenation tree into one buffer, rendering
    /// number-to-string coercions along the way.
    fn flatten(&mut self, term: Term, out: &mut String) -> Result<()> {
        let value = self.rt.evaluate_wnf(term)?;
        if value.tag() != Tag::Ctr {
            return Err(ExtractError::UnsupportedShape);
        }
        match value.ext() {
            tag::STR => {
                let id = self.word_field(value, 0)?;
                let content = self.strings.resolve(id).ok_or(ExtractError::BadEncoding)?;
                out.push_str(&content);
                Ok(())
            }
            tag::CAT => {
                let left = self.rt.get(value.slot());
                self.flatten(left, out)?;
                let right = self.rt.get(value.slot().offset(1));
                self.flatten(right, out)
            }
            tag::N2S => {
                let inner = self.rt.get(value.slot());
                let inner = self.rt.evaluate_wnf(inner)?;
                self.render_coerced(inner, out)
            }
            _ => Err(ExtractError::UnsupportedShape),
        }
    }

    fn render_coerced(&mut self, value: Term, out: &mut String) -> Result<()> {
        use std::fmt::Write;
        match (value.tag(), value.ext()) {
            (Tag::Num, _) => {
                write!(out, "{}", big_int::decode_small(value.val())).ok();
                Ok(())
            }
            (Tag::Ctr, tag::POS) | (Tag::Ctr, tag::NEG) => {
                let (lo, hi) = self.two_words(value)?;
                let wide = big_int::combine(value.ext() == tag::NEG, lo, hi)
                    .ok_or(ExtractError::BadEncoding)?;
                write!(out, "{}", wide).ok();
                Ok(())
            }
            (Tag::Ctr, tag::FLT) => {
                let (lo, hi) = self.two_words(value)?;
                write!(out, "{:.6}", float::combine(lo, hi)).ok();
                Ok(())
            }
            (Tag::Ctr, tag::STR) => {
                let id = self.word_field(value, 0)?;
                let content = self.strings.resolve(id).ok_or(ExtractError::BadEncoding)?;
                out.push_str(&content);
                Ok(())
            }
            (Tag::Ctr, tag::CAT) | (Tag::Ctr, tag::N2S) => self.flatten(value, out),
            (Tag::Ctr, tag::PTH) => {
                let (_, path_id) = self.two_words(value)?;
                let content = self
                    .strings
                    .resolve(path_id)
                    .ok_or(ExtractError::BadEncoding)?;
                out.push_str(&content);
                Ok(())
            }
            (Tag::Ctr, tag::TRU) => {
                out.push('1');
                Ok(())
            }
            // false and null both render empty
            (Tag::Ctr, tag::FLS) | (Tag::Ctr, tag::NUL) => Ok(()),
            _ => Err(ExtractError::UnsupportedShape),
        }
    }

    /// A constructor field that must reduce to a native word.
    fn word_field(&mut self, ctor: Term, index: u32) -> Result<u32> {
        let field = self.rt.get(ctor.slot().offset(index));
        let field = self.rt.evaluate_wnf(field)?;
        if field.tag() != Tag::Num {
            return Err(ExtractError::BadEncoding);
        }
        Ok(field.val())
    }

    fn two_words(&mut self, ctor: Term) -> Result<(u32, u32)> {
        Ok((self.word_field(ctor, 0)?, self.word_field(ctor, 1)?))
    }
}
